//! Pending checks indexed both ways.
//!
//! A check that could not resolve synchronously waits for telemetry or a
//! deadline, so the set is indexed by (host, service) for arrival and by
//! deadline for the timeout sweep. Every mutation goes through this facade
//! to keep the two indexes consistent.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::time::Instant;

use crate::builder::CheckResultBuilder;

#[derive(Default)]
pub(crate) struct WaitingSet {
    seq: u64,
    by_deadline: BTreeMap<(Instant, u64), Arc<CheckResultBuilder>>,
    by_entity: HashMap<(String, String), Vec<(Instant, u64)>>,
}

impl WaitingSet {
    pub fn len(&self) -> usize {
        self.by_deadline.len()
    }

    /// The sequence number disambiguates builders sharing a deadline tick.
    pub fn insert(&mut self, builder: Arc<CheckResultBuilder>) {
        self.seq += 1;
        let key = (builder.deadline(), self.seq);
        let (host, service) = builder.host_serv();
        self.by_entity
            .entry((host.to_owned(), service.to_owned()))
            .or_default()
            .push(key);
        self.by_deadline.insert(key, builder);
    }

    /// Remove and return every builder waiting on one entity.
    pub fn take_for_entity(&mut self, host: &str, service: &str) -> Vec<Arc<CheckResultBuilder>> {
        let Some(keys) = self
            .by_entity
            .remove(&(host.to_owned(), service.to_owned()))
        else {
            return Vec::new();
        };
        keys.into_iter()
            .filter_map(|key| self.by_deadline.remove(&key))
            .collect()
    }

    /// Remove and return every builder whose deadline is at or before `now`.
    pub fn pop_expired(&mut self, now: Instant) -> Vec<Arc<CheckResultBuilder>> {
        let mut expired = Vec::new();
        while let Some(entry) = self.by_deadline.first_entry() {
            let (deadline, seq) = *entry.key();
            if deadline > now {
                break;
            }
            let builder = entry.remove();
            let entity_key = {
                let (host, service) = builder.host_serv();
                (host.to_owned(), service.to_owned())
            };
            if let Some(keys) = self.by_entity.get_mut(&entity_key) {
                keys.retain(|k| *k != (deadline, seq));
                if keys.is_empty() {
                    self.by_entity.remove(&entity_key);
                }
            }
            expired.push(builder);
        }
        expired
    }
}
