//! Reversed connections.
//!
//! Some agents sit behind NAT and cannot dial in, so the bridge dials them.
//! One [`ReverseConnector`] owns one remote endpoint: connect, hand the
//! socket to the session factory, wait for the session to die, sleep, redial.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::agent::AgentSession;
use crate::socket::{Connector, Socket};

/// Fixed delay between redial attempts.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(10);

/// Builds the agent session for a freshly dialed socket; typically also
/// registers it.
pub type SessionFactory = Box<dyn Fn(Arc<dyn Socket>) -> Arc<AgentSession> + Send + Sync>;

pub struct ReverseConnector {
    addr: SocketAddr,
    connector: Arc<dyn Connector>,
    factory: SessionFactory,
    stop_tx: watch::Sender<bool>,
}

impl ReverseConnector {
    pub fn new(addr: SocketAddr, connector: Arc<dyn Connector>, factory: SessionFactory) -> Arc<Self> {
        Arc::new(Self {
            addr,
            connector,
            factory,
            stop_tx: watch::channel(false).0,
        })
    }

    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(this.run())
    }

    async fn run(self: Arc<Self>) {
        let mut stop_rx = self.stop_tx.subscribe();
        loop {
            if *stop_rx.borrow_and_update() {
                return;
            }

            match self.connector.connect(self.addr).await {
                Ok(socket) => {
                    info!(addr = %self.addr, "reversed connection established");
                    let agent = (self.factory)(socket);
                    tokio::select! {
                        _ = agent.session().wait_closed() => {
                            info!(addr = %self.addr, "reversed connection lost");
                        }
                        _ = stop_rx.changed() => {
                            agent.shutdown().await;
                            return;
                        }
                    }
                }
                Err(e) => {
                    warn!(addr = %self.addr, error = %e, "reversed connection failed");
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                _ = stop_rx.changed() => return,
            }
        }
    }

    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }
}
