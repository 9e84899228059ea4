//! Check correlation engine for the telemetry bridge.
//!
//! Telemetry arrives as anonymous metric batches; scheduled checks arrive
//! as (host, service) questions. This crate attributes points to entities
//! ([`extractor`]), buffers them ([`otlb_metrics`]), turns them into
//! plugin-style check results ([`builder`]) and holds the unanswered
//! questions until telemetry or a deadline resolves them ([`TelemetryBridge`]).

pub mod bridge;
pub mod builder;
pub mod check_result;
pub mod config;
pub mod error;
pub mod extractor;
pub mod task_queue;

mod waiting;

pub use bridge::TelemetryBridge;
pub use builder::{CheckCallback, CheckResultBuilder, CheckResultBuilderConfig, Processor};
pub use check_result::{CheckResult, CheckStatus, STATE_TEXT};
pub use config::BridgeConfig;
pub use error::EngineError;
pub use extractor::{create_extractor, HostServExtractor, HostServList};
pub use task_queue::TaskQueue;
