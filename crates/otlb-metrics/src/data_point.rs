//! Cheap views over a shared metric batch.

use otlb_proto::{Exemplar, KeyValue, Metric, MetricRequest, NumberDataPoint};

/// One numeric sample inside a received batch.
///
/// The view holds the whole request behind an `Arc` plus the path down to
/// one data point, so buffering a point never copies attribute lists and the
/// batch stays alive as long as any point from it is buffered.
#[derive(Clone)]
pub struct DataPoint {
    request: MetricRequest,
    resource_index: usize,
    scope_index: usize,
    metric_index: usize,
    point_index: usize,
}

impl DataPoint {
    pub fn new(
        request: MetricRequest,
        resource_index: usize,
        scope_index: usize,
        metric_index: usize,
        point_index: usize,
    ) -> Self {
        Self {
            request,
            resource_index,
            scope_index,
            metric_index,
            point_index,
        }
    }

    pub fn request(&self) -> &MetricRequest {
        &self.request
    }

    pub fn resource_attributes(&self) -> &[KeyValue] {
        self.request.resource_metrics[self.resource_index]
            .resource
            .as_ref()
            .map(|r| r.attributes.as_slice())
            .unwrap_or(&[])
    }

    pub fn scope_attributes(&self) -> &[KeyValue] {
        self.request.resource_metrics[self.resource_index].scope_metrics[self.scope_index]
            .scope
            .as_ref()
            .map(|s| s.attributes.as_slice())
            .unwrap_or(&[])
    }

    pub fn metric(&self) -> &Metric {
        &self.request.resource_metrics[self.resource_index].scope_metrics[self.scope_index]
            .metrics[self.metric_index]
    }

    pub fn point(&self) -> &NumberDataPoint {
        &self.metric().data_points()[self.point_index]
    }

    pub fn metric_name(&self) -> &str {
        &self.metric().name
    }

    pub fn unit(&self) -> &str {
        &self.metric().unit
    }

    pub fn description(&self) -> &str {
        &self.metric().description
    }

    pub fn attributes(&self) -> &[KeyValue] {
        &self.point().attributes
    }

    pub fn time_unix_nano(&self) -> u64 {
        self.point().time_unix_nano
    }

    pub fn value_f64(&self) -> f64 {
        self.point().value_f64()
    }

    pub fn exemplars(&self) -> &[Exemplar] {
        &self.point().exemplars
    }
}

impl std::fmt::Debug for DataPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataPoint")
            .field("metric", &self.metric_name())
            .field("time_unix_nano", &self.time_unix_nano())
            .field("value", &self.value_f64())
            .finish()
    }
}

/// Walk every number data point of a batch and hand a view of it to
/// `visitor`. Metrics whose shape carries no number points (histogram,
/// summary, unset) contribute nothing.
pub fn extract_data_points(request: &MetricRequest, mut visitor: impl FnMut(DataPoint)) {
    for (ri, rm) in request.resource_metrics.iter().enumerate() {
        for (si, sm) in rm.scope_metrics.iter().enumerate() {
            for (mi, metric) in sm.metrics.iter().enumerate() {
                for pi in 0..metric.data_points().len() {
                    visitor(DataPoint::new(request.clone(), ri, si, mi, pi));
                }
            }
        }
    }
}
