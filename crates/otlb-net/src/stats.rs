//! Fleet statistics for connected agents.

use std::collections::HashMap;

use parking_lot::Mutex;

/// Grouping key for the fleet view: agents sharing a version, an OS and a
/// connection direction count together.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct AgentGroup {
    pub version: String,
    pub os: String,
    pub reversed: bool,
}

/// Connected-agent counters, grouped by [`AgentGroup`].
#[derive(Default)]
pub struct AgentStats {
    groups: Mutex<HashMap<AgentGroup, usize>>,
}

impl AgentStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, group: AgentGroup) {
        *self.groups.lock().entry(group).or_insert(0) += 1;
    }

    pub fn unregister(&self, group: &AgentGroup) {
        let mut groups = self.groups.lock();
        if let Some(count) = groups.get_mut(group) {
            *count -= 1;
            if *count == 0 {
                groups.remove(group);
            }
        }
    }

    pub fn total(&self) -> usize {
        self.groups.lock().values().sum()
    }

    /// Current counters, sorted by group for stable output.
    pub fn snapshot(&self) -> Vec<(AgentGroup, usize)> {
        let mut out: Vec<_> = self
            .groups
            .lock()
            .iter()
            .map(|(g, c)| (g.clone(), *c))
            .collect();
        out.sort();
        out
    }
}
