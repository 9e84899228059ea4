//! Per-entity metric buffering.
//!
//! Telemetry arrives push-based; checks consume it pull-based. This crate
//! bridges the two with short-lived, bounded, time-ordered buffers:
//! [`DataPoint`] views over a shared batch, a [`MetricFifo`] per
//! (entity, metric) pair and the [`FifoContainer`] that owns them all under
//! a single mutex.

pub mod container;
pub mod data_point;
pub mod fifo;

pub use container::{
    FifoContainer, FifoLimits, MetricMap, DEFAULT_FIFO_EXPIRY_SECS, DEFAULT_MAX_FIFO_SIZE,
};
pub use data_point::{extract_data_points, DataPoint};
pub use fifo::MetricFifo;
