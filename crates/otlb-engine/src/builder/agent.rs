//! The monitoring agent's native convention.
//!
//! The agent exports one metric named `status` whose value is the exit code
//! and whose description is the plugin output, plus one metric per perfdata
//! label. Thresholds and min/max ride in exemplars: the first filtered
//! attribute names the kind (`warn_gt`, `crit_le`, `min`, ...) and the
//! exemplar value carries the bound.

use otlb_metrics::MetricMap;

use crate::builder::PerfData;
use crate::check_result::{CheckResult, CheckStatus};

fn fill_from_exemplar(perf: &mut PerfData, kind: &str, value: f64) {
    match kind {
        "warn_lt" => perf.warning.lt = Some(value),
        "warn_gt" => perf.warning.gt = Some(value),
        "warn_le" => perf.warning.le = Some(value),
        "warn_ge" => perf.warning.ge = Some(value),
        "crit_lt" => perf.critical.lt = Some(value),
        "crit_gt" => perf.critical.gt = Some(value),
        "crit_le" => perf.critical.le = Some(value),
        "crit_ge" => perf.critical.ge = Some(value),
        "min" => perf.min = Some(value),
        "max" => perf.max = Some(value),
        other => {
            tracing::warn!(kind = other, "unknown exemplar kind");
        }
    }
}

/// Correlate the fifo map at the `status` metric's timestamp. `None` means
/// not ready: no `status` sample buffered yet.
pub(crate) fn build(fifos: &mut MetricMap, command_id: u64) -> Option<CheckResult> {
    let (anchor_time, exit_code, mut output) = {
        let status = fifos.get("status")?;
        let ts = status.latest()?;
        let point = status.points_at(ts).last()?;
        (ts, point.value_f64() as i64, point.description().to_owned())
    };

    output.push('|');
    for (name, fifo) in fifos.iter() {
        if name == "status" {
            continue;
        }
        for point in fifo.points_at(anchor_time) {
            let mut perf = PerfData {
                unit: point.unit().to_owned(),
                value: Some(point.value_f64()),
                ..Default::default()
            };
            for exemplar in point.exemplars() {
                if let Some(kind) = exemplar.kind() {
                    fill_from_exemplar(&mut perf, kind, exemplar.value_f64());
                }
            }
            output.push(' ');
            perf.render(name, &mut output);
        }
    }

    for fifo in fifos.values_mut() {
        fifo.clean_oldest(anchor_time);
    }
    fifos.retain(|_, fifo| !fifo.is_empty());

    Some(CheckResult {
        command_id,
        status: CheckStatus::Normal,
        exit_code,
        start_time_unix_nano: anchor_time,
        end_time_unix_nano: anchor_time,
        output,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use otlb_metrics::{DataPoint, FifoContainer};
    use otlb_proto::{
        metric, number_data_point, Exemplar, ExportMetricsServiceRequest, Gauge, Metric,
        MetricRequest, NumberDataPoint, ResourceMetrics, ScopeMetrics,
    };
    use std::sync::Arc;

    const TS: u64 = 1_718_345_061_000_000_000;

    fn agent_metric(
        name: &str,
        description: &str,
        unit: &str,
        value: f64,
        exemplars: Vec<Exemplar>,
    ) -> Metric {
        Metric {
            name: name.into(),
            description: description.into(),
            unit: unit.into(),
            data: Some(metric::Data::Gauge(Gauge {
                data_points: vec![NumberDataPoint {
                    time_unix_nano: TS,
                    exemplars,
                    value: Some(number_data_point::Value::AsDouble(value)),
                    ..Default::default()
                }],
            })),
        }
    }

    /// Mirror of a real agent export: a `status` anchor plus two perfdata
    /// metrics with exemplar thresholds.
    fn agent_request() -> MetricRequest {
        let metrics = vec![
            agent_metric(
                "status",
                "output of plugin",
                "",
                0.0,
                vec![],
            ),
            agent_metric(
                "metric",
                "",
                "",
                12.0,
                vec![
                    Exemplar::bound("crit_gt", 75.0),
                    Exemplar::bound("warn_gt", 50.0),
                ],
            ),
            agent_metric(
                "metric2",
                "",
                "ms",
                30.0,
                vec![
                    Exemplar::bound("crit_gt", 80.0),
                    Exemplar::bound("crit_lt", 75.0),
                    Exemplar::bound("warn_gt", 75.0),
                    Exemplar::bound("warn_lt", 50.0),
                    Exemplar::bound("min", 0.0),
                    Exemplar::bound("max", 100.0),
                ],
            ),
        ];
        Arc::new(ExportMetricsServiceRequest {
            resource_metrics: vec![ResourceMetrics {
                resource: None,
                scope_metrics: vec![ScopeMetrics {
                    scope: None,
                    metrics,
                    schema_url: String::new(),
                }],
                schema_url: String::new(),
            }],
        })
    }

    fn fill_container(request: &MetricRequest) -> FifoContainer {
        let container = FifoContainer::new(10, u64::MAX / 1_000_000_000);
        otlb_metrics::extract_data_points(request, |dp: DataPoint| {
            container.add_data_point("host1", "serv1", dp);
        });
        container
    }

    #[test]
    fn test_empty_map_not_ready() {
        let mut fifos = MetricMap::new();
        assert!(build(&mut fifos, 1).is_none());
    }

    #[test]
    fn test_no_status_metric_not_ready() {
        let request = agent_request();
        let container = fill_container(&request);
        let pending = container
            .with_fifos("host1", "serv1", |fifos| {
                fifos.remove("status");
                build(fifos, 1)
            })
            .unwrap();
        assert!(pending.is_none());
    }

    #[test]
    fn test_agent_output() {
        let request = agent_request();
        let container = fill_container(&request);
        let result = container
            .with_fifos("host1", "serv1", |fifos| build(fifos, 12))
            .unwrap()
            .unwrap();

        assert_eq!(result.command_id, 12);
        assert_eq!(result.status, CheckStatus::Normal);
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.start_time_secs(), 1_718_345_061);
        assert_eq!(
            result.output,
            "output of plugin| metric=12;0:50;0:75;; metric2=30ms;50:75;75:80;0;100"
        );
    }

    #[test]
    fn test_only_warn_crit_gt_default_lower_bound() {
        // A plugin declaring only upper thresholds still renders ranges,
        // with zero as the implicit lower bound.
        let request = Arc::new(ExportMetricsServiceRequest {
            resource_metrics: vec![ResourceMetrics {
                resource: None,
                scope_metrics: vec![ScopeMetrics {
                    scope: None,
                    metrics: vec![
                        agent_metric("status", "plugin ok", "", 0.0, vec![]),
                        agent_metric(
                            "metric",
                            "",
                            "",
                            12.0,
                            vec![
                                Exemplar::bound("warn_gt", 50.0),
                                Exemplar::bound("crit_gt", 75.0),
                            ],
                        ),
                    ],
                    schema_url: String::new(),
                }],
                schema_url: String::new(),
            }],
        });
        let container = fill_container(&request);
        let result = container
            .with_fifos("host1", "serv1", |fifos| build(fifos, 1))
            .unwrap()
            .unwrap();
        assert_eq!(result.output, "plugin ok| metric=12;0:50;0:75;;");
    }

    #[test]
    fn test_inclusive_thresholds_without_lower_bound() {
        let request = Arc::new(ExportMetricsServiceRequest {
            resource_metrics: vec![ResourceMetrics {
                resource: None,
                scope_metrics: vec![ScopeMetrics {
                    scope: None,
                    metrics: vec![
                        agent_metric("status", "output taratata", "", 0.0, vec![]),
                        agent_metric(
                            "metric",
                            "",
                            "",
                            12.0,
                            vec![
                                Exemplar::bound("warn_le", 0.0),
                                Exemplar::bound("warn_ge", 50.0),
                                Exemplar::bound("crit_ge", 75.0),
                            ],
                        ),
                    ],
                    schema_url: String::new(),
                }],
                schema_url: String::new(),
            }],
        });
        let container = fill_container(&request);
        let result = container
            .with_fifos("host1", "serv1", |fifos| build(fifos, 1789))
            .unwrap()
            .unwrap();
        assert_eq!(result.output, "output taratata| metric=12;@0:50;@~:75;;");
    }

    #[test]
    fn test_nonzero_exit_code() {
        let request = Arc::new(ExportMetricsServiceRequest {
            resource_metrics: vec![ResourceMetrics {
                resource: None,
                scope_metrics: vec![ScopeMetrics {
                    scope: None,
                    metrics: vec![agent_metric("status", "cpu too high", "", 2.0, vec![])],
                    schema_url: String::new(),
                }],
                schema_url: String::new(),
            }],
        });
        let container = fill_container(&request);
        let result = container
            .with_fifos("host1", "serv1", |fifos| build(fifos, 1))
            .unwrap()
            .unwrap();
        assert_eq!(result.exit_code, 2);
        assert_eq!(result.output, "cpu too high|");
    }
}
