//! Framed duplex transport for the telemetry bridge.
//!
//! The bridge talks to two kinds of peers over the same framing: plain
//! OpenTelemetry collectors pushing metric batches, and the proprietary
//! monitoring agent with its handshake and config-push envelope. Both
//! directions of a connection run through one [`DuplexSession`]; the
//! [`SessionRegistry`] owns the sessions, [`BridgeServer`] accepts inbound
//! peers and [`ReverseConnector`] dials NATed agents.

pub mod agent;
pub mod error;
pub mod message;
pub mod registry;
pub mod reverse;
pub mod server;
pub mod session;
pub mod socket;
pub mod stats;
pub mod tcp;

pub use agent::{AgentSession, AgentTargetConfig, MetricHandler};
pub use error::NetError;
pub use message::{
    Frame, MessageHeader, METHOD_AGENT_MESSAGE, METHOD_EXPORT, METHOD_EXPORT_ACK,
    SERVICE_AGENT, SERVICE_OTEL,
};
pub use registry::SessionRegistry;
pub use reverse::{ReverseConnector, RECONNECT_DELAY};
pub use server::{AcceptHook, BridgeServer};
pub use session::{AcceptedRole, DuplexSession, FrameDelegate, InitiatedRole, SessionRole};
pub use socket::{Connector, Listener, Socket};
pub use stats::{AgentGroup, AgentStats};
pub use tcp::{TcpAcceptor, TcpConnector, TcpSocket};
