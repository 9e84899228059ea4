//! Proprietary monitoring-agent envelope.
//!
//! A connected agent (whichever side dialed) speaks a symmetric stream:
//! the agent sends `MessageFromAgent` (an `Init` handshake or a metric
//! batch), the engine sends `MessageToAgent` (a configuration push).

use crate::collector::ExportMetricsServiceRequest;

/// Handshake sent by an agent as its first message.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AgentInfo {
    /// Host the agent monitors (its identity for command lookup).
    #[prost(string, tag = "1")]
    pub host: String,
    /// Agent software version, for fleet statistics.
    #[prost(string, tag = "2")]
    pub version: String,
    /// Operating system, for fleet statistics.
    #[prost(string, tag = "3")]
    pub os: String,
    /// Whether the agent can decrypt credentials pushed in its config.
    #[prost(bool, tag = "4")]
    pub encryption_ready: bool,
}

/// Configuration pushed to an agent.
///
/// Pushed on `Init` and whenever a recomputation yields a structurally
/// different message (diff suppression happens on the whole message).
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AgentConfiguration {
    /// Per-check timeout, seconds.
    #[prost(uint32, tag = "1")]
    pub check_timeout: u32,
    /// How often the agent exports buffered metrics, seconds.
    #[prost(uint32, tag = "2")]
    pub export_period: u32,
    /// Maximum checks the agent may run concurrently.
    #[prost(uint32, tag = "3")]
    pub max_concurrent_checks: u32,
    /// Ask the agent to attach threshold exemplars to its data points.
    #[prost(bool, tag = "4")]
    pub use_exemplar: bool,
    /// Credential-encryption key (base64). Only set when the transport is
    /// encrypted and the agent signalled readiness.
    #[prost(string, tag = "5")]
    pub key: String,
    /// Credential-encryption salt (base64). Same condition as `key`.
    #[prost(string, tag = "6")]
    pub salt: String,
}

/// Agent-to-engine message.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MessageFromAgent {
    #[prost(oneof = "message_from_agent::Content", tags = "1, 2")]
    pub content: Option<message_from_agent::Content>,
}

pub mod message_from_agent {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Content {
        #[prost(message, tag = "1")]
        Init(super::AgentInfo),
        #[prost(message, tag = "2")]
        OtelRequest(super::ExportMetricsServiceRequest),
    }
}

impl MessageFromAgent {
    pub fn init(info: AgentInfo) -> Self {
        Self {
            content: Some(message_from_agent::Content::Init(info)),
        }
    }

    pub fn otel_request(request: ExportMetricsServiceRequest) -> Self {
        Self {
            content: Some(message_from_agent::Content::OtelRequest(request)),
        }
    }
}

/// Engine-to-agent message.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MessageToAgent {
    #[prost(oneof = "message_to_agent::Content", tags = "1")]
    pub content: Option<message_to_agent::Content>,
}

pub mod message_to_agent {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Content {
        #[prost(message, tag = "1")]
        Config(super::AgentConfiguration),
    }
}

impl MessageToAgent {
    pub fn config(config: AgentConfiguration) -> Self {
        Self {
            content: Some(message_to_agent::Content::Config(config)),
        }
    }
}
