//! Session ownership.
//!
//! The registry is the only strong holder of agent sessions. Removal on
//! shutdown is posted as a separate task so a session is never dropped from
//! inside its own transport completion path.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::agent::{AgentSession, AgentTargetConfig};

#[derive(Default)]
pub struct SessionRegistry {
    next_id: AtomicU64,
    sessions: DashMap<u64, Arc<AgentSession>>,
}

impl SessionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Take ownership of a session. The returned id stays valid until the
    /// session shuts down, at which point a posted task removes it.
    pub fn register(self: &Arc<Self>, agent: Arc<AgentSession>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.sessions.insert(id, Arc::clone(&agent));

        let registry = Arc::downgrade(self);
        agent.session().set_on_shutdown(Box::new(move || {
            let registry = registry.clone();
            tokio::spawn(async move {
                if let Some(registry) = registry.upgrade() {
                    registry.sessions.remove(&id);
                    debug!(id, "session removed from registry");
                }
            });
        }));
        id
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Push a new target configuration to every connected agent; unchanged
    /// sessions suppress the resend themselves.
    pub fn push_config_to_all(&self, target: &AgentTargetConfig) {
        for entry in self.sessions.iter() {
            if let Err(e) = entry.value().update_target(target.clone()) {
                debug!(id = entry.key(), error = %e, "config push skipped");
            }
        }
    }

    /// Shut down every session, typically at process exit.
    pub async fn shutdown_all(&self) {
        let sessions: Vec<_> = self
            .sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for session in sessions {
            session.shutdown().await;
        }
    }
}
