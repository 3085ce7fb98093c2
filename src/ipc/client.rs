//! Reservation client.
//!
//! Creates the client's two FIFOs, announces them on the server endpoint and
//! then talks to its assigned worker one request at a time.

use std::fs::File;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::error::{EmsError, Result};
use crate::ipc::codec::{ByteOrder, WireReader, send_exact};
use crate::ipc::messages::{ListResponse, Request, ResultCode, SetupRequest, SetupResponse, ShowResponse, StatusResponse};
use crate::ipc::transport::{create_fifo, open_reader, open_writer, remove_fifo, validate_endpoint_name};
use crate::store::Seat;

/// Configuration for the reservation client.
#[derive(Debug, Clone)]
pub struct EmsClientConfig {
    /// FIFO the client writes requests to
    pub request_path: PathBuf,
    /// FIFO the client reads responses from
    pub response_path: PathBuf,
    /// Server's well-known FIFO
    pub server_path: PathBuf,
    pub byte_order: ByteOrder,
}

impl EmsClientConfig {
    pub fn new(request_path: impl Into<PathBuf>, response_path: impl Into<PathBuf>, server_path: impl Into<PathBuf>) -> Self {
        Self {
            request_path: request_path.into(),
            response_path: response_path.into(),
            server_path: server_path.into(),
            byte_order: ByteOrder::Native,
        }
    }

    pub fn with_byte_order(mut self, order: ByteOrder) -> Self {
        self.byte_order = order;
        self
    }
}

/// An established session with the server.
#[derive(Debug)]
pub struct EmsClient {
    config: EmsClientConfig,
    session_id: i32,
    writer: File,
    reader: WireReader<File>,
    closed: bool,
}

impl EmsClient {
    /// Create the client FIFOs and perform session setup.
    ///
    /// Blocks until a worker picks up the session.
    pub fn connect(config: EmsClientConfig) -> Result<Self> {
        let setup = SetupRequest::new(
            validate_endpoint_name(&config.request_path)?,
            validate_endpoint_name(&config.response_path)?,
        );
        let setup_bytes = setup.encode(config.byte_order)?;

        create_fifo(&config.request_path)?;
        if let Err(e) = create_fifo(&config.response_path) {
            let _ = remove_fifo(&config.request_path);
            return Err(e);
        }

        match Self::handshake(&config, &setup_bytes) {
            Ok((session_id, writer, reader)) => {
                info!("Connected to {} as session {}", config.server_path.display(), session_id);
                Ok(Self {
                    config,
                    session_id,
                    writer,
                    reader,
                    closed: false,
                })
            }
            Err(e) => {
                remove_endpoints(&config);
                Err(e)
            }
        }
    }

    fn handshake(config: &EmsClientConfig, setup_bytes: &[u8]) -> Result<(i32, File, WireReader<File>)> {
        {
            let mut server = open_writer(&config.server_path)?;
            send_exact(&mut server, setup_bytes)?;
        }
        debug!("SETUP sent to {}", config.server_path.display());

        let writer = open_writer(&config.request_path)?;
        let mut reader = WireReader::new(open_reader(&config.response_path)?, config.byte_order);
        let response = SetupResponse::decode(&mut reader)?;
        Ok((response.session_id, writer, reader))
    }

    pub fn session_id(&self) -> i32 {
        self.session_id
    }

    pub fn request_path(&self) -> &Path {
        &self.config.request_path
    }

    pub fn response_path(&self) -> &Path {
        &self.config.response_path
    }

    fn send(&mut self, request: &Request) -> Result<()> {
        if self.closed {
            return Err(EmsError::Transport("session already closed".into()));
        }
        send_exact(&mut self.writer, &request.encode(self.config.byte_order))
    }

    pub fn create(&mut self, event_id: u32, rows: usize, cols: usize) -> Result<ResultCode> {
        self.send(&Request::Create { event_id, rows, cols })?;
        Ok(StatusResponse::decode(&mut self.reader)?.result)
    }

    pub fn reserve(&mut self, event_id: u32, seats: &[Seat]) -> Result<ResultCode> {
        self.send(&Request::Reserve {
            event_id,
            seats: seats.to_vec(),
        })?;
        Ok(StatusResponse::decode(&mut self.reader)?.result)
    }

    pub fn show(&mut self, event_id: u32) -> Result<ShowResponse> {
        self.send(&Request::Show { event_id })?;
        ShowResponse::decode(&mut self.reader)
    }

    pub fn list(&mut self) -> Result<ListResponse> {
        self.send(&Request::List)?;
        ListResponse::decode(&mut self.reader)
    }

    /// End the session and remove the client FIFOs.
    pub fn quit(mut self) -> Result<()> {
        let result = self.send(&Request::Quit);
        self.closed = true;
        remove_endpoints(&self.config);
        info!("Session {} closed", self.session_id);
        result
    }
}

impl Drop for EmsClient {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.send(&Request::Quit) {
                warn!("Failed to send QUIT on drop: {}", e);
            }
            self.closed = true;
            remove_endpoints(&self.config);
        }
    }
}

fn remove_endpoints(config: &EmsClientConfig) {
    for path in [&config.request_path, &config.response_path] {
        if let Err(e) = remove_fifo(path) {
            warn!("{}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::messages::CLIENT_PIPE_MAX_LEN;

    #[test]
    fn test_config_new() {
        let config = EmsClientConfig::new("/tmp/req", "/tmp/resp", "/tmp/server").with_byte_order(ByteOrder::Little);
        assert_eq!(config.request_path, PathBuf::from("/tmp/req"));
        assert_eq!(config.response_path, PathBuf::from("/tmp/resp"));
        assert_eq!(config.server_path, PathBuf::from("/tmp/server"));
        assert_eq!(config.byte_order, ByteOrder::Little);
    }

    #[test]
    fn test_connect_rejects_long_endpoint_before_creating_fifos() {
        let long = format!("/tmp/{}", "r".repeat(CLIENT_PIPE_MAX_LEN));
        let config = EmsClientConfig::new(&long, "/tmp/ems-test-resp", "/tmp/ems-test-server");
        assert!(matches!(EmsClient::connect(config), Err(EmsError::EndpointName(_))));
        assert!(!Path::new(&long).exists());
    }
}
