//! Per-client request/response loop.
//!
//! A session reads one opcode, decodes its body, runs it against the store
//! and writes exactly one response before reading the next opcode. QUIT, a
//! clean EOF or any transport failure ends it.

use std::io::{Read, Write};

use bytes::Bytes;
use log::{debug, error, info, warn};

use crate::error::{EmsError, Result};
use crate::ipc::codec::{ByteOrder, WireReader, send_exact};
use crate::ipc::messages::{ListResponse, OpCode, Request, ResultCode, ShowResponse, StatusResponse};
use crate::store::EventStore;

/// Where a session is in its request cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitOpcode,
    Dispatch,
    Respond,
}

/// Why a session ended.
#[derive(Debug)]
pub enum SessionEnd {
    /// Client sent QUIT
    Quit,
    /// Client closed its request endpoint between requests
    PeerClosed,
    /// Read or write failed mid-session
    Transport(EmsError),
}

/// Counters reported when a session ends.
#[derive(Debug)]
pub struct SessionSummary {
    pub session_id: i32,
    pub requests: usize,
    pub failures: usize,
    pub end: SessionEnd,
}

/// An encoded response and the result code it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub result: ResultCode,
    pub bytes: Bytes,
}

impl Reply {
    fn new<T>(result: &Result<T>, bytes: Bytes) -> Self {
        Self {
            result: ResultCode::from(result),
            bytes,
        }
    }
}

/// Run `request` against `store` and encode the single response it earns.
///
/// Returns `None` for QUIT, which has no response.
pub fn handle_request(session_id: i32, store: &EventStore, request: &Request, order: ByteOrder) -> Option<Reply> {
    let opcode = request.opcode();
    match request {
        Request::Create { event_id, rows, cols } => {
            let result = store.create(*event_id, *rows, *cols);
            log_outcome(session_id, opcode, &result);
            Some(Reply::new(&result, StatusResponse::new(ResultCode::from(&result)).encode(order)))
        }
        Request::Reserve { event_id, seats } => {
            let result = store.reserve(*event_id, seats);
            log_outcome(session_id, opcode, &result);
            Some(Reply::new(&result, StatusResponse::new(ResultCode::from(&result)).encode(order)))
        }
        Request::Show { event_id } => {
            let result = store.show(*event_id);
            log_outcome(session_id, opcode, &result);
            Some(Reply::new(&result, ShowResponse::from(&result).encode(order)))
        }
        Request::List => {
            let result = store.list();
            log_outcome(session_id, opcode, &result);
            Some(Reply::new(&result, ListResponse::from(&result).encode(order)))
        }
        Request::Quit => None,
    }
}

/// Failure reply for a request whose body could not be decoded.
fn failure_reply(opcode: OpCode, order: ByteOrder) -> Option<Reply> {
    let bytes = match opcode {
        OpCode::Create | OpCode::Reserve => StatusResponse::new(ResultCode::Failed).encode(order),
        OpCode::Show => ShowResponse::Failed.encode(order),
        OpCode::List => ListResponse::Failed.encode(order),
        OpCode::Setup | OpCode::Quit => return None,
    };
    Some(Reply {
        result: ResultCode::Failed,
        bytes,
    })
}

fn log_outcome<T>(session_id: i32, opcode: OpCode, result: &Result<T>) {
    match result {
        Ok(_) => debug!("[session {}] {} ok", session_id, opcode),
        Err(e) if e.is_domain() => info!("[session {}] {} failed: {}", session_id, opcode, e),
        Err(e) => error!("[session {}] {} failed: {}", session_id, opcode, e),
    }
}

/// One client session over a request reader and a response writer.
pub struct Session<'a, R, W> {
    id: i32,
    store: &'a EventStore,
    reader: WireReader<R>,
    writer: W,
    max_seats: usize,
    state: SessionState,
    pending: Option<Request>,
    reply: Option<Reply>,
    requests: usize,
    failures: usize,
}

impl<'a, R: Read, W: Write> Session<'a, R, W> {
    pub fn new(id: i32, store: &'a EventStore, reader: R, writer: W, order: ByteOrder, max_seats: usize) -> Self {
        Self {
            id,
            store,
            reader: WireReader::new(reader, order),
            writer,
            max_seats,
            state: SessionState::AwaitOpcode,
            pending: None,
            reply: None,
            requests: 0,
            failures: 0,
        }
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Drive the session until it closes.
    pub fn run(mut self) -> SessionSummary {
        info!("[session {}] started", self.id);
        let end = loop {
            match self.step() {
                Ok(None) => continue,
                Ok(Some(end)) => break end,
                Err(e) => break SessionEnd::Transport(e),
            }
        };

        match &end {
            SessionEnd::Quit => info!("[session {}] client quit", self.id),
            SessionEnd::PeerClosed => info!("[session {}] client closed its endpoint", self.id),
            SessionEnd::Transport(e) => warn!("[session {}] closed on transport error: {}", self.id, e),
        }

        SessionSummary {
            session_id: self.id,
            requests: self.requests,
            failures: self.failures,
            end,
        }
    }

    /// Advance one state. Returns `Some` once the session is over.
    fn step(&mut self) -> Result<Option<SessionEnd>> {
        match self.state {
            SessionState::AwaitOpcode => self.await_opcode(),
            SessionState::Dispatch => {
                let request = self.pending.take();
                match request {
                    Some(Request::Quit) => Ok(Some(SessionEnd::Quit)),
                    Some(request) => {
                        self.reply = handle_request(self.id, self.store, &request, self.reader.order());
                        self.state = SessionState::Respond;
                        Ok(None)
                    }
                    None => {
                        self.state = SessionState::AwaitOpcode;
                        Ok(None)
                    }
                }
            }
            SessionState::Respond => {
                if let Some(reply) = self.reply.take() {
                    if !reply.result.is_ok() {
                        self.failures += 1;
                    }
                    send_exact(&mut self.writer, &reply.bytes)?;
                }
                self.state = SessionState::AwaitOpcode;
                Ok(None)
            }
        }
    }

    fn await_opcode(&mut self) -> Result<Option<SessionEnd>> {
        let byte = match self.reader.read_opcode()? {
            Some(byte) => byte,
            None => return Ok(Some(SessionEnd::PeerClosed)),
        };

        let opcode = match OpCode::try_from(byte) {
            Ok(opcode) => opcode,
            Err(e) => {
                warn!("[session {}] dropping request: {}", self.id, e);
                return Ok(None);
            }
        };

        self.requests += 1;
        match Request::decode_body(opcode, &mut self.reader, self.max_seats) {
            Ok(request) => {
                debug!("[session {}] received {}", self.id, opcode);
                self.pending = Some(request);
                self.state = SessionState::Dispatch;
            }
            Err(e) if e.is_transport() => return Err(e),
            Err(e) => {
                warn!("[session {}] malformed {}: {}", self.id, opcode, e);
                self.reply = failure_reply(opcode, self.reader.order());
                self.state = SessionState::Respond;
            }
        }
        Ok(None)
    }
}
