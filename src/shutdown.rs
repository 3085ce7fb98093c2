//! Signal handling for the server process.
//!
//! SIGINT and SIGTERM trigger a one-shot shutdown callback. SIGUSR1 prints
//! every event and its seat grid to stdout and keeps running.
//!
//! The watcher runs a current-thread tokio runtime on its own OS thread so
//! the blocking acceptor and workers are left alone.

use std::io::Write;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{error, info};
use tokio::runtime::{Builder, Runtime};
use tokio::signal::unix::{Signal, SignalKind, signal};

use crate::error::Result;
use crate::ipc::server::ServerContext;
use crate::render::render_dump;
use crate::store::EventStore;

/// Which signal ended the watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    Interrupt,
    Terminate,
}

/// Render the current contents of `store` the way SIGUSR1 prints them.
pub fn dump_events(store: &EventStore) -> Result<String> {
    Ok(render_dump(&store.dump()?))
}

/// Signal handlers installed and waiting to be driven.
pub struct SignalWatcher {
    runtime: Runtime,
    interrupt: Signal,
    terminate: Signal,
    dump: Signal,
}

impl SignalWatcher {
    /// Register the handlers now, so signals arriving before
    /// [`SignalWatcher::spawn`] are not lost.
    pub fn install() -> Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        let (interrupt, terminate, dump) = runtime.block_on(async {
            Ok::<_, std::io::Error>((
                signal(SignalKind::interrupt())?,
                signal(SignalKind::terminate())?,
                signal(SignalKind::user_defined1())?,
            ))
        })?;
        Ok(Self {
            runtime,
            interrupt,
            terminate,
            dump,
        })
    }

    /// Drive the handlers on a dedicated thread.
    ///
    /// `on_shutdown` runs once, on the watcher thread, after the first
    /// SIGINT or SIGTERM.
    pub fn spawn<F>(self, context: Arc<ServerContext>, on_shutdown: F) -> Result<JoinHandle<()>>
    where
        F: FnOnce(ShutdownReason) + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name("ems-signals".to_string())
            .spawn(move || {
                let SignalWatcher {
                    runtime,
                    mut interrupt,
                    mut terminate,
                    mut dump,
                } = self;
                let reason = runtime.block_on(async {
                    loop {
                        tokio::select! {
                            _ = interrupt.recv() => break ShutdownReason::Interrupt,
                            _ = terminate.recv() => break ShutdownReason::Terminate,
                            _ = dump.recv() => print_dump(context.store()),
                        }
                    }
                });
                info!("Received {:?}, shutting down", reason);
                on_shutdown(reason);
            })?;
        Ok(handle)
    }
}

fn print_dump(store: &EventStore) {
    match dump_events(store) {
        Ok(text) => {
            let mut stdout = std::io::stdout().lock();
            if let Err(e) = stdout.write_all(text.as_bytes()).and_then(|_| stdout.flush()) {
                error!("Failed to print event dump: {}", e);
            }
        }
        Err(e) => error!("Failed to dump events: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::server::ServerConfig;
    use crate::store::Seat;
    use nix::sys::signal::{Signal as NixSignal, raise};
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_dump_events() {
        let store = EventStore::new();
        assert_eq!(dump_events(&store).unwrap(), "No events\n");

        store.create(3, 1, 2).unwrap();
        store.create(1, 1, 1).unwrap();
        store.reserve(3, &[Seat::new(1, 2)]).unwrap();
        assert_eq!(dump_events(&store).unwrap(), "Event: 3\n0 1\nEvent: 1\n0\n");
    }

    #[test]
    fn test_sigterm_runs_shutdown_callback() {
        let context = Arc::new(ServerContext::new(ServerConfig::default()).unwrap());
        let (tx, rx) = mpsc::channel();

        let watcher = SignalWatcher::install().unwrap();
        let handle = watcher
            .spawn(context, move |reason| {
                let _ = tx.send(reason);
            })
            .unwrap();

        raise(NixSignal::SIGUSR1).unwrap();
        raise(NixSignal::SIGTERM).unwrap();

        let reason = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(reason, ShutdownReason::Terminate);
        handle.join().unwrap();
    }
}
