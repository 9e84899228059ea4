//! The shared buffer all sessions feed and all checks drain.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tracing::debug;

use crate::data_point::DataPoint;
use crate::fifo::MetricFifo;

/// Runtime-mutable fifo bounds.
///
/// Read at every insert, so a reload takes effect for subsequent points
/// without touching already-buffered ones.
pub struct FifoLimits {
    max_size: AtomicUsize,
    max_age_secs: AtomicU64,
}

pub const DEFAULT_MAX_FIFO_SIZE: usize = 2;
pub const DEFAULT_FIFO_EXPIRY_SECS: u64 = 600;

impl Default for FifoLimits {
    fn default() -> Self {
        Self {
            max_size: AtomicUsize::new(DEFAULT_MAX_FIFO_SIZE),
            max_age_secs: AtomicU64::new(DEFAULT_FIFO_EXPIRY_SECS),
        }
    }
}

impl FifoLimits {
    pub fn new(max_size: usize, max_age_secs: u64) -> Self {
        Self {
            max_size: AtomicUsize::new(max_size),
            max_age_secs: AtomicU64::new(max_age_secs),
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size.load(Ordering::Relaxed)
    }

    pub fn max_age_secs(&self) -> u64 {
        self.max_age_secs.load(Ordering::Relaxed)
    }

    pub fn update(&self, max_size: usize, max_age_secs: u64) {
        self.max_size.store(max_size, Ordering::Relaxed);
        self.max_age_secs.store(max_age_secs, Ordering::Relaxed);
    }
}

/// Metric name to fifo, for one (host, service) entity.
pub type MetricMap = BTreeMap<String, MetricFifo>;

/// `(host, service) → metric name → MetricFifo`, all under one mutex.
///
/// A single coarse lock keeps inserts from sessions and reads from check
/// builders serialized; contention is negligible at monitoring rates and the
/// coarse snapshot is exactly what result correlation needs.
#[derive(Default)]
pub struct FifoContainer {
    limits: FifoLimits,
    inner: Mutex<HashMap<(String, String), MetricMap>>,
}

impl FifoContainer {
    pub fn new(max_size: usize, max_age_secs: u64) -> Self {
        Self {
            limits: FifoLimits::new(max_size, max_age_secs),
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub fn limits(&self) -> &FifoLimits {
        &self.limits
    }

    /// Buffer a point under its owning entity and metric name.
    pub fn add_data_point(&self, host: &str, service: &str, point: DataPoint) {
        let max_size = self.limits.max_size();
        let max_age = self.limits.max_age_secs();
        let metric = point.metric_name().to_owned();
        let mut inner = self.inner.lock();
        inner
            .entry((host.to_owned(), service.to_owned()))
            .or_default()
            .entry(metric)
            .or_default()
            .add(point, max_size, max_age);
    }

    /// Run `f` against the metric map of one entity, under the container
    /// lock. The map is handed out mutably so a correlation pass can also
    /// consume the points it used. Returns `None` without calling `f` when
    /// the entity has no buffered metrics at all.
    pub fn with_fifos<R>(
        &self,
        host: &str,
        service: &str,
        f: impl FnOnce(&mut MetricMap) -> R,
    ) -> Option<R> {
        let mut inner = self.inner.lock();
        inner
            .get_mut(&(host.to_owned(), service.to_owned()))
            .map(|fifos| f(fifos))
    }

    /// Drop expired points everywhere and prune empty fifos and entities.
    pub fn clean(&self) {
        let max_age = self.limits.max_age_secs();
        let now_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        let horizon = now_ns.saturating_sub(max_age.saturating_mul(1_000_000_000));

        let mut inner = self.inner.lock();
        let before = inner.len();
        inner.retain(|_, fifos| {
            fifos.retain(|_, fifo| {
                fifo.clean_oldest(horizon);
                !fifo.is_empty()
            });
            !fifos.is_empty()
        });
        if inner.len() < before {
            debug!(pruned = before - inner.len(), "dropped idle entities");
        }
    }
}
