//! IPC Layer - named-pipe transport between clients and the server
//!
//! This module provides:
//! - Fixed-width binary codec with selectable byte order
//! - Message types for every request and response
//! - FIFO endpoints
//! - Per-client session loop
//! - Server (acceptor + worker pool) and client

pub mod client;
pub mod codec;
pub mod messages;
pub mod server;
pub mod session;
pub mod transport;

pub use client::{EmsClient, EmsClientConfig};
pub use codec::{ByteOrder, WireEncoder, WireFrame, WireReader, recv_exact, send_exact};
pub use messages::{
    CLIENT_PIPE_MAX_LEN, ListResponse, MAX_RESERVATION_SIZE, OpCode, Request, ResultCode, SetupRequest, SetupResponse,
    ShowResponse, StatusResponse,
};
pub use server::{ClientHandle, Server, ServerConfig, ServerContext};
pub use session::{Session, SessionEnd, SessionState, SessionSummary};
