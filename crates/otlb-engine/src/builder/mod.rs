//! Check-result builders.
//!
//! A builder turns buffered telemetry for one (host, service) into a
//! plugin-style check result. Two conventions exist for how metrics encode
//! thresholds; the `--processor=` token in the check command line selects
//! one at construction time.

mod agent;
mod nagios;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use otlb_metrics::{FifoContainer, MetricMap};
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::check_result::CheckResult;
use crate::error::EngineError;
use crate::extractor::find_arg;

/// The check-output convention used to decode buffered metrics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Processor {
    /// Telegraf's nagios plugin output re-encoded as suffixed metric names
    /// (`<cmd>_value`, `<cmd>_critical_gt`, ...) with `perfdata`/`unit`
    /// data-point attributes.
    NagiosTelegraf,
    /// The monitoring agent's native convention: anchor metric `status`,
    /// thresholds smuggled in exemplars.
    Agent,
}

/// Parsed once per distinct command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CheckResultBuilderConfig {
    pub processor: Processor,
}

impl CheckResultBuilderConfig {
    pub fn parse(cmdline: &str) -> Result<Self, EngineError> {
        match find_arg(cmdline, "processor") {
            Some("nagios_telegraf") => Ok(Self {
                processor: Processor::NagiosTelegraf,
            }),
            Some("agent") => Ok(Self {
                processor: Processor::Agent,
            }),
            _ => Err(EngineError::UnknownProcessor(cmdline.to_owned())),
        }
    }
}

/// Invoked with the result of a deferred check, exactly once.
pub type CheckCallback = Box<dyn FnOnce(CheckResult) + Send + 'static>;

/// One pending (or just-created) check.
///
/// Resolution happens exactly once: synchronously at creation, later when
/// matching telemetry arrives, or through the timeout sweep. An atomic
/// guard enforces the exactly-once contract whichever path wins.
pub struct CheckResultBuilder {
    command_id: u64,
    host: String,
    service: String,
    processor: Processor,
    deadline: Instant,
    completed: AtomicBool,
    callback: Mutex<Option<CheckCallback>>,
}

impl CheckResultBuilder {
    pub fn new(
        config: &CheckResultBuilderConfig,
        command_id: u64,
        host: impl Into<String>,
        service: impl Into<String>,
        timeout: Duration,
        callback: CheckCallback,
    ) -> Arc<Self> {
        Arc::new(Self {
            command_id,
            host: host.into(),
            service: service.into(),
            processor: config.processor,
            deadline: Instant::now() + timeout,
            completed: AtomicBool::new(false),
            callback: Mutex::new(Some(callback)),
        })
    }

    pub fn command_id(&self) -> u64 {
        self.command_id
    }

    pub fn host_serv(&self) -> (&str, &str) {
        (&self.host, &self.service)
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    fn build(&self, fifos: &mut MetricMap) -> Option<CheckResult> {
        match self.processor {
            Processor::NagiosTelegraf => nagios::build(fifos, self.command_id),
            Processor::Agent => agent::build(fifos, self.command_id),
        }
    }

    /// Attempt an immediate resolution. On success the builder is spent and
    /// the result is returned to the caller; the callback is not invoked.
    pub fn sync_build(&self, container: &FifoContainer) -> Option<CheckResult> {
        let (host, service) = (self.host.as_str(), self.service.as_str());
        let result = container.with_fifos(host, service, |fifos| self.build(fifos))??;
        if self.completed.swap(true, Ordering::AcqRel) {
            return None;
        }
        self.callback.lock().take();
        Some(result)
    }

    /// Re-attempt after new telemetry. On success the callback fires and
    /// `true` is returned; `false` means still pending.
    pub fn async_build(&self, container: &FifoContainer) -> bool {
        if self.completed.load(Ordering::Acquire) {
            return true;
        }
        let (host, service) = (self.host.as_str(), self.service.as_str());
        let Some(result) = container
            .with_fifos(host, service, |fifos| self.build(fifos))
            .flatten()
        else {
            return false;
        };
        self.complete(result);
        true
    }

    /// Deadline passed: deliver the dedicated timed-out result.
    pub fn on_timeout(&self) {
        debug!(
            command_id = self.command_id,
            host = %self.host,
            service = %self.service,
            "check timed out"
        );
        self.complete(CheckResult::timed_out(self.command_id));
    }

    fn complete(&self, result: CheckResult) {
        if self.completed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(callback) = self.callback.lock().take() {
            callback(result);
        }
    }
}

/// Warn or crit threshold assembled from lt/gt/le/ge parts.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct Bound {
    pub lt: Option<f64>,
    pub gt: Option<f64>,
    pub le: Option<f64>,
    pub ge: Option<f64>,
}

impl Bound {
    pub fn is_empty(&self) -> bool {
        self.lt.is_none() && self.gt.is_none() && self.le.is_none() && self.ge.is_none()
    }

    /// Plugin threshold syntax: `lo:hi` alerts outside the range, `@lo:hi`
    /// inside it. A missing lower bound renders as `0` for exclusive ranges
    /// and as the plugin convention's `~` for inclusive ones; a missing
    /// upper bound renders as nothing.
    pub fn render(&self, out: &mut String) {
        if self.is_empty() {
            return;
        }
        let inclusive = self.le.is_some() || self.ge.is_some();
        if inclusive {
            out.push('@');
        }
        match self.le.or(self.lt) {
            Some(lo) => out.push_str(&fmt_number(lo)),
            None if inclusive => out.push('~'),
            None => out.push('0'),
        }
        out.push(':');
        if let Some(hi) = self.ge.or(self.gt) {
            out.push_str(&fmt_number(hi));
        }
    }
}

/// One performance-data token in the making.
#[derive(Clone, Debug, Default)]
pub(crate) struct PerfData {
    pub unit: String,
    pub value: Option<f64>,
    pub warning: Bound,
    pub critical: Bound,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl PerfData {
    /// `label=value[unit];warn;crit;min;max`, empty fields kept.
    pub fn render(&self, label: &str, out: &mut String) {
        let Some(value) = self.value else { return };
        out.push_str(label);
        out.push('=');
        out.push_str(&fmt_number(value));
        out.push_str(&self.unit);
        out.push(';');
        self.warning.render(out);
        out.push(';');
        self.critical.render(out);
        out.push(';');
        if let Some(min) = self.min {
            out.push_str(&fmt_number(min));
        }
        out.push(';');
        if let Some(max) = self.max {
            out.push_str(&fmt_number(max));
        }
    }
}

/// Render a sample or threshold value; integral values print without a
/// fractional part.
pub(crate) fn fmt_number(v: f64) -> String {
    format!("{v}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use otlb_proto::{
        metric, number_data_point, ExportMetricsServiceRequest, Gauge, Metric, MetricRequest,
        NumberDataPoint, ResourceMetrics, ScopeMetrics,
    };

    const BASE_SECS: u64 = 1_700_000_000;

    /// One agent-convention batch, `status` plus a `load` sample whose
    /// value equals the batch index.
    fn timed_batch(i: u64) -> MetricRequest {
        let ts = (BASE_SECS + i) * 1_000_000_000;
        let sample = |name: &str, description: &str, value: f64| Metric {
            name: name.into(),
            description: description.into(),
            unit: String::new(),
            data: Some(metric::Data::Gauge(Gauge {
                data_points: vec![NumberDataPoint {
                    time_unix_nano: ts,
                    value: Some(number_data_point::Value::AsDouble(value)),
                    ..Default::default()
                }],
            })),
        };
        Arc::new(ExportMetricsServiceRequest {
            resource_metrics: vec![ResourceMetrics {
                resource: None,
                scope_metrics: vec![ScopeMetrics {
                    scope: None,
                    metrics: vec![sample("status", "plugin ran", 0.0), sample("load", "", i as f64)],
                    schema_url: String::new(),
                }],
                schema_url: String::new(),
            }],
        })
    }

    #[test]
    fn test_concurrent_ingest_and_sync_build() {
        let container = Arc::new(FifoContainer::new(10, u64::MAX / 1_000_000_000));
        let writer = {
            let container = Arc::clone(&container);
            std::thread::spawn(move || {
                for i in 0..300 {
                    let request = timed_batch(i);
                    otlb_metrics::extract_data_points(&request, |dp| {
                        container.add_data_point("h", "s", dp);
                    });
                }
            })
        };

        let config = CheckResultBuilderConfig {
            processor: Processor::Agent,
        };
        let mut observed = 0;
        while observed < 100 {
            let builder = CheckResultBuilder::new(
                &config,
                1,
                "h",
                "s",
                Duration::from_secs(30),
                Box::new(|_| {}),
            );
            let Some(result) = builder.sync_build(&container) else {
                continue;
            };
            observed += 1;
            // The container mutex makes every correlation a coherent
            // snapshot: the anchor and any perfdata correlated with it
            // must come from the same batch, whatever the writer is doing.
            let i = result.start_time_secs() - BASE_SECS;
            assert!(result.output.starts_with("plugin ran|"));
            if let Some(rest) = result.output.strip_prefix("plugin ran| load=") {
                let value: u64 = rest.split(';').next().unwrap().parse().unwrap();
                assert_eq!(value, i);
            }
        }
        writer.join().unwrap();
    }

    #[test]
    fn test_parse_processor() {
        assert_eq!(
            CheckResultBuilderConfig::parse("--processor=nagios_telegraf")
                .unwrap()
                .processor,
            Processor::NagiosTelegraf
        );
        assert_eq!(
            CheckResultBuilderConfig::parse("--processor=agent --extra=1")
                .unwrap()
                .processor,
            Processor::Agent
        );
    }

    #[test]
    fn test_parse_unknown_processor_fails_fast() {
        assert!(matches!(
            CheckResultBuilderConfig::parse("--processor=grpc").unwrap_err(),
            EngineError::UnknownProcessor(_)
        ));
        assert!(CheckResultBuilderConfig::parse("").is_err());
    }

    #[test]
    fn test_bound_render() {
        let mut out = String::new();
        Bound {
            lt: Some(0.0),
            gt: Some(40.0),
            ..Default::default()
        }
        .render(&mut out);
        assert_eq!(out, "0:40");

        out.clear();
        Bound {
            gt: Some(50.0),
            ..Default::default()
        }
        .render(&mut out);
        assert_eq!(out, "0:50");

        out.clear();
        Bound {
            le: Some(0.0),
            ge: Some(80.0),
            ..Default::default()
        }
        .render(&mut out);
        assert_eq!(out, "@0:80");

        out.clear();
        Bound {
            lt: Some(0.2),
            ..Default::default()
        }
        .render(&mut out);
        assert_eq!(out, "0.2:");

        // Inclusive with no lower bound covers everything up to `hi`.
        out.clear();
        Bound {
            ge: Some(75.0),
            ..Default::default()
        }
        .render(&mut out);
        assert_eq!(out, "@~:75");

        out.clear();
        Bound::default().render(&mut out);
        assert_eq!(out, "");
    }

    #[test]
    fn test_perf_data_render() {
        let mut out = String::new();
        PerfData {
            unit: "ms".into(),
            value: Some(0.022),
            warning: Bound {
                lt: Some(0.0),
                gt: Some(200.0),
                ..Default::default()
            },
            critical: Bound {
                lt: Some(0.0),
                gt: Some(500.0),
                ..Default::default()
            },
            min: Some(0.0),
            max: None,
        }
        .render("rta", &mut out);
        assert_eq!(out, "rta=0.022ms;0:200;0:500;0;");
    }

    #[test]
    fn test_fmt_number() {
        assert_eq!(fmt_number(12.0), "12");
        assert_eq!(fmt_number(0.022), "0.022");
        assert_eq!(fmt_number(0.0), "0");
    }
}
