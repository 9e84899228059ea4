//! Protobuf wire types for the telemetry bridge.
//!
//! Two message families travel over the bridge's bidirectional streams:
//!
//! 1. the OpenTelemetry metrics-export request (a collector pushing
//!    metric batches), and
//! 2. the proprietary agent envelope (`MessageFromAgent` /
//!    `MessageToAgent`) carrying an `Init`, a pushed `AgentConfiguration`,
//!    or an embedded metrics-export request.
//!
//! The types are hand-written with prost derives instead of being generated
//! at build time; the field tags of the OpenTelemetry subset follow the
//! upstream `.proto` definitions so the encoding interoperates with real
//! collectors. Only the pieces the bridge consumes are modelled (gauge and
//! sum data, scalar attribute values).

pub mod agent;
pub mod collector;
pub mod common;
pub mod metrics;

pub use agent::{
    message_from_agent, message_to_agent, AgentConfiguration, AgentInfo, MessageFromAgent,
    MessageToAgent,
};
pub use collector::{ExportMetricsServiceRequest, ExportMetricsServiceResponse};
pub use common::{any_value, AnyValue, InstrumentationScope, KeyValue};
pub use metrics::{
    exemplar, metric, number_data_point, Exemplar, Gauge, Metric, NumberDataPoint, Resource,
    ResourceMetrics, ScopeMetrics, Sum,
};

/// A received metric batch, shared between every [`DataPoint`] view derived
/// from it and the acknowledgment path.
///
/// [`DataPoint`]: https://docs.rs/otlb-metrics
pub type MetricRequest = std::sync::Arc<ExportMetricsServiceRequest>;
