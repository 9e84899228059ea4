//! The bridge context: extractors, builder configs and pending checks.
//!
//! One `TelemetryBridge` ties the ingestion side (sessions pushing metric
//! batches through `on_metric`) to the scheduling side (the engine asking
//! for check results through `check`). Shared caches and the waiting set
//! live under one short-held mutex; the fifo container has its own.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use otlb_metrics::{extract_data_points, FifoContainer};
use otlb_proto::MetricRequest;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::builder::{CheckCallback, CheckResultBuilder, CheckResultBuilderConfig};
use crate::check_result::CheckResult;
use crate::config::BridgeConfig;
use crate::error::EngineError;
use crate::extractor::{self, HostServExtractor, HostServList};
use crate::waiting::WaitingSet;

#[derive(Default)]
struct Inner {
    /// Extractors cached by command line; an entry nothing else references
    /// is pruned on the next cache access.
    extractors: BTreeMap<String, Arc<dyn HostServExtractor>>,
    /// Key of the extractor that matched last; the next scan starts there.
    last_success: Option<String>,
    builder_configs: HashMap<String, Arc<CheckResultBuilderConfig>>,
    waiting: WaitingSet,
}

pub struct TelemetryBridge {
    fifos: Arc<FifoContainer>,
    allowed: Arc<HostServList>,
    inner: Mutex<Inner>,
}

impl TelemetryBridge {
    pub fn new(config: &BridgeConfig) -> Arc<Self> {
        Arc::new(Self {
            fifos: Arc::new(FifoContainer::new(config.max_fifo_size, config.fifo_expiry)),
            allowed: HostServList::new(),
            inner: Mutex::new(Inner::default()),
        })
    }

    pub fn fifos(&self) -> &Arc<FifoContainer> {
        &self.fifos
    }

    /// The (host, service) pairs telemetry may be attributed to.
    pub fn allowed(&self) -> &Arc<HostServList> {
        &self.allowed
    }

    pub fn pending_checks(&self) -> usize {
        self.inner.lock().waiting.len()
    }

    /// Get or build the extractor for a command line. Entries only the
    /// cache still references are dropped first.
    pub fn create_extractor(
        &self,
        cmdline: &str,
    ) -> Result<Arc<dyn HostServExtractor>, EngineError> {
        let mut inner = self.inner.lock();
        inner.extractors.retain(|_, e| Arc::strong_count(e) > 1);
        if let Some(existing) = inner.extractors.get(cmdline) {
            return Ok(existing.clone());
        }
        let extractor = extractor::create_extractor(cmdline, self.allowed.clone())?;
        inner
            .extractors
            .insert(cmdline.to_owned(), extractor.clone());
        Ok(extractor)
    }

    /// Get or parse the builder config for a command line.
    pub fn create_check_result_builder_config(
        &self,
        cmdline: &str,
    ) -> Result<Arc<CheckResultBuilderConfig>, EngineError> {
        let mut inner = self.inner.lock();
        if let Some(existing) = inner.builder_configs.get(cmdline) {
            return Ok(existing.clone());
        }
        let config = Arc::new(CheckResultBuilderConfig::parse(cmdline)?);
        inner
            .builder_configs
            .insert(cmdline.to_owned(), config.clone());
        Ok(config)
    }

    /// Run one check against the buffered telemetry.
    ///
    /// `Some` is a synchronous result and the callback never fires. `None`
    /// parks the check in the waiting set; the callback fires later with a
    /// real result or a timeout, exactly once.
    pub fn check(
        &self,
        cmdline: &str,
        command_id: u64,
        host: &str,
        service: &str,
        timeout: Duration,
        callback: CheckCallback,
    ) -> Result<Option<CheckResult>, EngineError> {
        let config = self.create_check_result_builder_config(cmdline)?;
        let builder = CheckResultBuilder::new(&config, command_id, host, service, timeout, callback);
        let mut inner = self.inner.lock();
        if let Some(result) = builder.sync_build(&self.fifos) {
            return Ok(Some(result));
        }
        inner.waiting.insert(builder);
        Ok(None)
    }

    /// Ingest one metric batch.
    ///
    /// Each point is attributed by scanning the cached extractors, starting
    /// at the one that matched last. Attributed points land in the fifo
    /// container and wake the checks waiting on their entity; the rest are
    /// counted and dropped.
    pub fn on_metric(&self, request: MetricRequest) {
        let mut points = Vec::new();
        extract_data_points(&request, |point| points.push(point));

        let mut inner = self.inner.lock();
        let mut touched = HashSet::new();
        let mut unmatched = 0usize;
        for point in points {
            let hit = {
                let scan: Box<dyn Iterator<Item = (&String, &Arc<dyn HostServExtractor>)>> =
                    match &inner.last_success {
                        Some(key) => Box::new(
                            inner
                                .extractors
                                .range(key.clone()..)
                                .chain(inner.extractors.range(..key.clone())),
                        ),
                        None => Box::new(inner.extractors.iter()),
                    };
                let mut hit = None;
                for (key, extractor) in scan {
                    if let Some((host, service)) = extractor.extract(&point) {
                        hit = Some((key.clone(), host, service));
                        break;
                    }
                }
                hit
            };
            match hit {
                Some((key, host, service)) => {
                    inner.last_success = Some(key);
                    self.fifos.add_data_point(&host, &service, point);
                    touched.insert((host, service));
                }
                None => unmatched += 1,
            }
        }

        if unmatched > 0 {
            // TODO(forwarding): relay unmatched points to the broker once
            // the broker-side receiver exists.
            debug!(count = unmatched, "data points matched no known entity");
        }

        let mut woken = Vec::new();
        for (host, service) in &touched {
            woken.extend(inner.waiting.take_for_entity(host, service));
        }
        drop(inner);

        // Callbacks run outside the bridge lock.
        let mut still_waiting = Vec::new();
        for builder in woken {
            if !builder.async_build(&self.fifos) {
                still_waiting.push(builder);
            }
        }
        if !still_waiting.is_empty() {
            let mut inner = self.inner.lock();
            for builder in still_waiting {
                inner.waiting.insert(builder);
            }
        }
    }

    /// Apply hot-updatable settings. Takes effect for subsequent inserts;
    /// buffered points keep the bounds they were admitted under.
    pub fn reload(&self, config: &BridgeConfig) {
        self.fifos
            .limits()
            .update(config.max_fifo_size, config.fifo_expiry);
        info!(
            max_fifo_size = config.max_fifo_size,
            fifo_expiry = config.fifo_expiry,
            "fifo limits updated"
        );
    }

    /// Drive pending-check timeouts, once per second, for the bridge
    /// lifetime.
    pub fn start_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let bridge = Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(1));
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                let expired = bridge.inner.lock().waiting.pop_expired(Instant::now());
                for builder in expired {
                    builder.on_timeout();
                }
            }
        })
    }
}
