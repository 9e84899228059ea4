//! Accept loop for inbound connections.

use std::sync::Arc;

use tokio::sync::Notify;
use tracing::{error, info};

use crate::agent::AgentSession;
use crate::socket::{Listener, Socket};

/// Builds and registers the agent session for an accepted socket.
pub type AcceptHook = Arc<dyn Fn(Arc<dyn Socket>) -> Arc<AgentSession> + Send + Sync>;

/// Listens for collectors and agents dialing in.
///
/// Each accepted socket is handed to the accept hook, which wires up the
/// session; the sessions drive themselves from there, so the server only
/// owns the accept loop. Shutdown is coordinated through `stop()`.
pub struct BridgeServer {
    shutdown: Arc<Notify>,
    running: bool,
}

impl BridgeServer {
    pub fn new() -> Self {
        Self {
            shutdown: Arc::new(Notify::new()),
            running: false,
        }
    }

    /// Start accepting connections from the provided `Listener`.
    pub fn start(&mut self, listener: Box<dyn Listener>, on_accept: AcceptHook) {
        if self.running {
            tracing::warn!("server already running, ignoring duplicate start");
            return;
        }
        self.running = true;

        let shutdown = Arc::clone(&self.shutdown);
        let addr = listener.local_addr();
        info!(%addr, "server starting");

        tokio::spawn(async move {
            Self::accept_loop(listener, on_accept, shutdown).await;
            info!(%addr, "server accept loop exited");
        });
    }

    /// Stop the accept loop. Established sessions are shut down by their
    /// registry, not here.
    pub fn stop(&mut self) {
        if self.running {
            info!("server stopping");
            self.shutdown.notify_waiters();
            self.running = false;
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    async fn accept_loop(listener: Box<dyn Listener>, on_accept: AcceptHook, shutdown: Arc<Notify>) {
        loop {
            tokio::select! {
                biased;

                _ = shutdown.notified() => {
                    info!("server shutdown signal received");
                    break;
                }

                result = listener.accept() => {
                    match result {
                        Ok(socket) => {
                            let _session = on_accept(socket);
                        }
                        Err(e) => {
                            error!("accept error: {}", e);
                            // Brief pause to avoid tight error loops.
                            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                        }
                    }
                }
            }
        }
    }
}

impl Default for BridgeServer {
    fn default() -> Self {
        Self::new()
    }
}
