//! Telegraf nagios convention.
//!
//! A telegraf instance running nagios plugins exports each perfdata field
//! as its own metric, named `<cmd>_<suffix>` (`check_icmp_value`,
//! `check_icmp_critical_gt`, `check_icmp_state`, ...). The perfdata label
//! and unit ride in data-point attributes, so one `<cmd>_critical_gt`
//! metric carries a point per label.

use std::collections::BTreeMap;

use otlb_metrics::MetricMap;
use otlb_proto::common::find_string;

use crate::check_result::{CheckResult, CheckStatus, STATE_TEXT};
use crate::builder::PerfData;

/// Everything after the command prefix: `check_icmp_critical_lt` yields
/// `critical_lt`, `check_icmp_state` yields `state`.
fn suffix(metric_name: &str) -> &str {
    let Some(pos) = metric_name.rfind('_') else {
        return "";
    };
    let last = &metric_name[pos + 1..];
    if matches!(last, "lt" | "gt" | "le" | "ge") && pos > 0 {
        if let Some(prev) = metric_name[..pos].rfind('_') {
            return &metric_name[prev + 1..];
        }
    }
    last
}

fn fill_from_suffix(perf: &mut PerfData, suffix: &str, value: f64) {
    match suffix {
        "value" => perf.value = Some(value),
        "warning_lt" => perf.warning.lt = Some(value),
        "warning_gt" => perf.warning.gt = Some(value),
        "warning_le" => perf.warning.le = Some(value),
        "warning_ge" => perf.warning.ge = Some(value),
        "critical_lt" => perf.critical.lt = Some(value),
        "critical_gt" => perf.critical.gt = Some(value),
        "critical_le" => perf.critical.le = Some(value),
        "critical_ge" => perf.critical.ge = Some(value),
        "min" => perf.min = Some(value),
        "max" => perf.max = Some(value),
        other => {
            tracing::warn!(suffix = other, "unknown metric suffix");
        }
    }
}

/// Correlate the fifo map at the anchor's timestamp. `None` means not
/// ready: no `_state` metric buffered yet.
pub(crate) fn build(fifos: &mut MetricMap, command_id: u64) -> Option<CheckResult> {
    let mut anchor_time = None;
    let mut exit_code = 0i64;
    for (name, fifo) in fifos.iter() {
        if suffix(name) == "state" {
            if let Some(ts) = fifo.latest() {
                if let Some(point) = fifo.points_at(ts).last() {
                    anchor_time = Some(ts);
                    exit_code = point.value_f64() as i64;
                }
            }
            break;
        }
    }
    let anchor_time = anchor_time?;

    // One metric (e.g. `<cmd>_critical_gt`) carries a point per perfdata
    // label; group by label, then fill the field the suffix names.
    let mut perfs: BTreeMap<String, PerfData> = BTreeMap::new();
    for (name, fifo) in fifos.iter() {
        let sfx = suffix(name);
        if sfx == "state" {
            continue;
        }
        for point in fifo.points_at(anchor_time) {
            let attributes = point.attributes();
            let Some(label) = find_string(attributes, "perfdata") else {
                continue;
            };
            let perf = perfs.entry(label.to_owned()).or_default();
            if let Some(unit) = find_string(attributes, "unit") {
                if !unit.is_empty() {
                    perf.unit = unit.to_owned();
                }
            }
            fill_from_suffix(perf, sfx, point.value_f64());
        }
    }

    // Consumed points are dropped; the anchor sample stays so a repeat
    // correlation at the same timestamp still succeeds.
    for fifo in fifos.values_mut() {
        fifo.clean_oldest(anchor_time);
    }
    fifos.retain(|_, fifo| !fifo.is_empty());

    let mut output = String::new();
    if (0..4).contains(&exit_code) {
        output.push_str(STATE_TEXT[exit_code as usize]);
    }
    output.push('|');
    let mut first = true;
    for (label, perf) in &perfs {
        if perf.value.is_none() {
            continue;
        }
        if !first {
            output.push(' ');
        }
        first = false;
        perf.render(label, &mut output);
    }

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
        metric, number_data_point, ExportMetricsServiceRequest, Gauge, KeyValue, Metric,
        MetricRequest, NumberDataPoint, ResourceMetrics, ScopeMetrics,
    };
    use std::sync::Arc;

    const TS: u64 = 1_707_744_430_000_000_000;

    fn telegraf_metric(name: &str, points: Vec<(f64, Vec<KeyValue>)>) -> Metric {
        Metric {
            name: name.into(),
            description: String::new(),
            unit: String::new(),
            data: Some(metric::Data::Gauge(Gauge {
                data_points: points
                    .into_iter()
                    .map(|(value, attributes)| NumberDataPoint {
                        time_unix_nano: TS,
                        attributes,
                        value: Some(number_data_point::Value::AsDouble(value)),
                        ..Default::default()
                    })
                    .collect(),
            })),
        }
    }

    fn perf_attrs(label: &str, unit: &str) -> Vec<KeyValue> {
        vec![
            KeyValue::string("host", "localhost"),
            KeyValue::string("perfdata", label),
            KeyValue::string("service", "check_icmp"),
            KeyValue::string("unit", unit),
        ]
    }

    /// Mirror of a real telegraf export for `check_icmp` against localhost.
    fn telegraf_request(crit_kind: &str) -> MetricRequest {
        let metrics = vec![
            telegraf_metric(
                &format!("check_icmp_critical_{crit_kind}t"),
                vec![
                    (500.0, perf_attrs("rta", "ms")),
                    (80.0, perf_attrs("pl", "%")),
                ],
            ),
            telegraf_metric(
                &format!(
                    "check_icmp_critical_{}",
                    if crit_kind == "g" { "lt" } else { "le" }
                ),
                vec![(0.0, perf_attrs("rta", "ms")), (0.0, perf_attrs("pl", "%"))],
            ),
            telegraf_metric(
                "check_icmp_warning_gt",
                vec![
                    (200.0, perf_attrs("rta", "ms")),
                    (40.0, perf_attrs("pl", "%")),
                ],
            ),
            telegraf_metric(
                "check_icmp_warning_lt",
                vec![(0.0, perf_attrs("rta", "ms")), (0.0, perf_attrs("pl", "%"))],
            ),
            telegraf_metric(
                "check_icmp_value",
                vec![
                    (0.022, perf_attrs("rta", "ms")),
                    (0.0, perf_attrs("pl", "%")),
                    (0.071, perf_attrs("rtmax", "ms")),
                    (0.008, perf_attrs("rtmin", "ms")),
                ],
            ),
            telegraf_metric("check_icmp_min", vec![(0.0, perf_attrs("rta", "ms"))]),
            telegraf_metric(
                "check_icmp_state",
                vec![(0.0, vec![KeyValue::string("host", "localhost")])],
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
            container.add_data_point("localhost", "check_icmp", dp);
        });
        container
    }

    #[test]
    fn test_empty_map_not_ready() {
        let mut fifos = MetricMap::new();
        assert!(build(&mut fifos, 1).is_none());
    }

    #[test]
    fn test_no_state_metric_not_ready() {
        let request = telegraf_request("g");
        let container = fill_container(&request);
        let pending = container
            .with_fifos("localhost", "check_icmp", |fifos| {
                fifos.remove("check_icmp_state");
                build(fifos, 1)
            })
            .unwrap();
        assert!(pending.is_none());
    }

    #[test]
    fn test_telegraf_output() {
        let request = telegraf_request("g");
        let container = fill_container(&request);
        let result = container
            .with_fifos("localhost", "check_icmp", |fifos| build(fifos, 7))
            .unwrap()
            .unwrap();

        assert_eq!(result.command_id, 7);
        assert_eq!(result.status, CheckStatus::Normal);
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.start_time_secs(), 1_707_744_430);
        assert_eq!(result.end_time_secs(), 1_707_744_430);
        assert_eq!(
            result.output,
            "OK|pl=0%;0:40;0:80;; rta=0.022ms;0:200;0:500;0; rtmax=0.071ms;;;; rtmin=0.008ms;;;;"
        );
    }

    #[test]
    fn test_telegraf_inclusive_critical() {
        let request = telegraf_request("g");
        // Rewrite critical_gt/critical_lt into their inclusive variants.
        let mut owned = (*request).clone();
        for sm in &mut owned.resource_metrics[0].scope_metrics {
            for metric in &mut sm.metrics {
                metric.name = metric
                    .name
                    .replace("critical_gt", "critical_ge")
                    .replace("critical_lt", "critical_le");
            }
        }
        let container = fill_container(&Arc::new(owned));
        let result = container
            .with_fifos("localhost", "check_icmp", |fifos| build(fifos, 7))
            .unwrap()
            .unwrap();

        assert_eq!(
            result.output,
            "OK|pl=0%;0:40;@0:80;; rta=0.022ms;0:200;@0:500;0; rtmax=0.071ms;;;; rtmin=0.008ms;;;;"
        );
    }

    #[test]
    fn test_suffix_extraction() {
        assert_eq!(suffix("check_icmp_critical_lt"), "critical_lt");
        assert_eq!(suffix("check_icmp_warning_ge"), "warning_ge");
        assert_eq!(suffix("check_icmp_state"), "state");
        assert_eq!(suffix("check_icmp_value"), "value");
        assert_eq!(suffix("check_icmp_min"), "min");
        assert_eq!(suffix("nounderscore"), "");
    }
}
