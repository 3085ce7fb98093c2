//! Reservation server - acceptor loop plus a fixed worker pool.
//!
//! The acceptor reads SETUP requests from the well-known endpoint and
//! enqueues them on the dispatch queue. Each worker dequeues one client at a
//! time, opens that client's endpoints, replies with its session id (the
//! worker index) and serves the session to completion.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::dispatch::DispatchQueue;
use crate::error::{EmsError, Result};
use crate::ipc::codec::{ByteOrder, WireReader, send_exact};
use crate::ipc::messages::{MAX_RESERVATION_SIZE, OpCode, SetupRequest, SetupResponse};
use crate::ipc::session::{Session, SessionSummary};
use crate::ipc::transport::{ServerEndpoint, open_reader, open_writer};
use crate::store::{DEFAULT_MAX_EVENT_SEATS, EventStore};

/// Default number of workers, which is also the dispatch queue capacity.
pub const DEFAULT_WORKERS: usize = 8;

/// Configuration for the reservation server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Path of the well-known setup FIFO
    pub endpoint: PathBuf,
    /// Worker threads and dispatch queue capacity
    pub workers: usize,
    /// Simulated latency around store lookups
    pub access_delay: Duration,
    /// Largest seat count accepted in one RESERVE
    pub max_reservation_size: usize,
    /// Largest grid (rows x cols) accepted in one CREATE
    pub max_event_seats: usize,
    /// Byte order of multi-byte fields on the wire
    pub byte_order: ByteOrder,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            endpoint: PathBuf::from("/tmp/ems-server"),
            workers: DEFAULT_WORKERS,
            access_delay: Duration::from_micros(1),
            max_reservation_size: MAX_RESERVATION_SIZE,
            max_event_seats: DEFAULT_MAX_EVENT_SEATS,
            byte_order: ByteOrder::Native,
        }
    }
}

impl ServerConfig {
    /// Create config with custom endpoint path
    pub fn with_endpoint<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.endpoint = path.as_ref().to_path_buf();
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_access_delay(mut self, delay: Duration) -> Self {
        self.access_delay = delay;
        self
    }

    pub fn with_max_reservation_size(mut self, max: usize) -> Self {
        self.max_reservation_size = max;
        self
    }

    pub fn with_max_event_seats(mut self, max: usize) -> Self {
        self.max_event_seats = max;
        self
    }

    pub fn with_byte_order(mut self, order: ByteOrder) -> Self {
        self.byte_order = order;
        self
    }
}

/// A client waiting to be served, as announced by its SETUP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHandle {
    pub request_path: PathBuf,
    pub response_path: PathBuf,
}

impl From<SetupRequest> for ClientHandle {
    fn from(setup: SetupRequest) -> Self {
        Self {
            request_path: PathBuf::from(setup.request_path),
            response_path: PathBuf::from(setup.response_path),
        }
    }
}

/// State shared by the acceptor and every worker.
#[derive(Debug)]
pub struct ServerContext {
    store: EventStore,
    queue: DispatchQueue<ClientHandle>,
    config: ServerConfig,
    stopping: AtomicBool,
}

impl ServerContext {
    pub fn new(config: ServerConfig) -> Result<Self> {
        if config.max_reservation_size == 0 {
            return Err(EmsError::Config("max_reservation_size must be positive".into()));
        }
        let queue = DispatchQueue::new(config.workers)?;
        Ok(Self {
            store: EventStore::with_access_delay(config.access_delay).with_max_event_seats(config.max_event_seats),
            queue,
            config,
            stopping: AtomicBool::new(false),
        })
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    pub fn queue(&self) -> &DispatchQueue<ClientHandle> {
        &self.queue
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }
}

/// Reservation server bound to its endpoint, with workers running.
pub struct Server {
    context: Arc<ServerContext>,
    endpoint: ServerEndpoint,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Server {
    /// Create the endpoint FIFO and start the worker pool.
    pub fn bind(config: ServerConfig) -> Result<Self> {
        let endpoint_path = config.endpoint.clone();
        let context = Arc::new(ServerContext::new(config)?);
        let endpoint = ServerEndpoint::bind(endpoint_path)?;

        let mut workers = Vec::with_capacity(context.config.workers);
        for index in 0..context.config.workers {
            let session_id = i32::try_from(index)
                .map_err(|_| EmsError::Config(format!("worker count {} too large", context.config.workers)))?;
            let ctx = Arc::clone(&context);
            let handle = thread::Builder::new()
                .name(format!("ems-worker-{}", index))
                .spawn(move || worker_loop(session_id, ctx))?;
            workers.push(handle);
        }

        info!(
            "Server started with {} workers (access delay {:?})",
            context.config.workers, context.config.access_delay
        );
        Ok(Self {
            context,
            endpoint,
            workers: Mutex::new(workers),
        })
    }

    pub fn context(&self) -> &Arc<ServerContext> {
        &self.context
    }

    pub fn endpoint_path(&self) -> &Path {
        self.endpoint.path()
    }

    /// Accept SETUP requests until [`Server::shutdown`] is called.
    ///
    /// Blocks while the dispatch queue is full, which applies backpressure
    /// to clients once every worker is busy.
    pub fn run(&self) -> Result<()> {
        let order = self.context.config.byte_order;
        let mut reader = WireReader::new(self.endpoint.try_clone_reader()?, order);

        loop {
            let byte = match reader.read_opcode()? {
                Some(byte) => byte,
                None => {
                    warn!("Server endpoint closed");
                    break;
                }
            };
            if self.context.is_stopping() {
                break;
            }

            match OpCode::try_from(byte) {
                Ok(OpCode::Setup) => {}
                Ok(other) => {
                    warn!("Ignoring {} on server endpoint", other);
                    continue;
                }
                Err(e) => {
                    debug!("Ignoring byte on server endpoint: {}", e);
                    continue;
                }
            }

            let setup = match SetupRequest::decode_body(&mut reader) {
                Ok(setup) => setup,
                Err(e) if e.is_transport() => return Err(e),
                Err(e) => {
                    warn!("Malformed SETUP: {}", e);
                    continue;
                }
            };

            info!("Client connecting via {} / {}", setup.request_path, setup.response_path);
            match self.context.queue.enqueue(ClientHandle::from(setup)) {
                Ok(()) => {}
                Err(EmsError::QueueClosed) => break,
                Err(e) => return Err(e),
            }
        }

        info!("Acceptor stopped");
        Ok(())
    }

    /// Stop accepting clients and release idle workers.
    ///
    /// Workers in the middle of a session finish it first.
    pub fn shutdown(&self) -> Result<()> {
        if self.context.stopping.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let dropped = self.context.queue.close()?;
        if !dropped.is_empty() {
            warn!("Dropped {} clients waiting for a worker", dropped.len());
        }
        self.endpoint.wake()?;
        info!("Server shutting down");
        Ok(())
    }

    /// Wait for every worker thread to exit. Only returns once all sessions
    /// have ended and the queue has been closed.
    pub fn join_workers(&self) -> Result<()> {
        let handles: Vec<_> = self
            .workers
            .lock()
            .map_err(|e| EmsError::LockPoisoned(format!("worker handles: {}", e)))?
            .drain(..)
            .collect();
        for handle in handles {
            if handle.join().is_err() {
                error!("Worker thread panicked");
            }
        }
        Ok(())
    }
}

fn worker_loop(session_id: i32, ctx: Arc<ServerContext>) {
    debug!("[worker {}] ready", session_id);
    loop {
        let client = match ctx.queue.dequeue() {
            Ok(client) => client,
            Err(EmsError::QueueClosed) => break,
            Err(e) => {
                error!("[worker {}] dispatch queue failed: {}", session_id, e);
                break;
            }
        };

        match serve_client(session_id, &ctx, &client) {
            Ok(summary) => info!(
                "[worker {}] session over: {} requests, {} failed",
                session_id, summary.requests, summary.failures
            ),
            Err(e) => warn!("[worker {}] could not start session: {}", session_id, e),
        }
    }
    debug!("[worker {}] exiting", session_id);
}

/// Open the client's endpoints, announce the session id and serve it.
fn serve_client(session_id: i32, ctx: &ServerContext, client: &ClientHandle) -> Result<SessionSummary> {
    let order = ctx.config.byte_order;
    let request = open_reader(&client.request_path)?;
    let mut response = open_writer(&client.response_path)?;
    send_exact(&mut response, &SetupResponse { session_id }.encode(order))?;

    let session = Session::new(
        session_id,
        &ctx.store,
        request,
        response,
        order,
        ctx.config.max_reservation_size,
    );
    Ok(session.run())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.workers, 8);
        assert_eq!(config.access_delay, Duration::from_micros(1));
        assert_eq!(config.max_reservation_size, 256);
        assert_eq!(config.byte_order, ByteOrder::Native);
    }

    #[test]
    fn test_config_builder() {
        let config = ServerConfig::default()
            .with_endpoint("/tmp/other")
            .with_workers(2)
            .with_access_delay(Duration::ZERO)
            .with_max_reservation_size(4)
            .with_byte_order(ByteOrder::Big);
        assert_eq!(config.endpoint, PathBuf::from("/tmp/other"));
        assert_eq!(config.workers, 2);
        assert_eq!(config.access_delay, Duration::ZERO);
        assert_eq!(config.max_reservation_size, 4);
        assert_eq!(config.byte_order, ByteOrder::Big);
    }

    #[test]
    fn test_context_rejects_zero_workers() {
        let config = ServerConfig::default().with_workers(0);
        assert!(matches!(ServerContext::new(config), Err(EmsError::Config(_))));

        let config = ServerConfig::default().with_max_reservation_size(0);
        assert!(matches!(ServerContext::new(config), Err(EmsError::Config(_))));
    }

    #[test]
    fn test_context_queue_matches_workers() {
        let ctx = ServerContext::new(ServerConfig::default().with_workers(3).with_max_event_seats(50)).unwrap();
        assert_eq!(ctx.queue().capacity(), 3);
        assert!(ctx.store().is_empty().unwrap());
        assert_eq!(ctx.store().max_event_seats(), 50);
        assert!(!ctx.is_stopping());
    }

    #[test]
    fn test_client_handle_from_setup() {
        let handle = ClientHandle::from(SetupRequest::new("/tmp/req", "/tmp/resp"));
        assert_eq!(handle.request_path, PathBuf::from("/tmp/req"));
        assert_eq!(handle.response_path, PathBuf::from("/tmp/resp"));
    }

    #[test]
    fn test_shutdown_stops_acceptor_and_idle_workers() {
        let temp = TempDir::new().unwrap();
        let endpoint = temp.path().join("server");
        let server = Arc::new(Server::bind(ServerConfig::default().with_endpoint(&endpoint).with_workers(2)).unwrap());
        assert_eq!(server.endpoint_path(), endpoint.as_path());

        let acceptor = {
            let server = Arc::clone(&server);
            thread::spawn(move || server.run())
        };

        thread::sleep(Duration::from_millis(50));
        server.shutdown().unwrap();
        acceptor.join().unwrap().unwrap();
        server.join_workers().unwrap();
        assert!(server.context().queue().is_closed().unwrap());

        drop(server);
        assert!(!endpoint.exists());
    }
}
