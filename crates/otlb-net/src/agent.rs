//! Agent-facing session logic.
//!
//! An [`AgentSession`] sits on top of a [`DuplexSession`] and speaks both
//! message families: raw OpenTelemetry export frames (acked) and the
//! proprietary agent envelope (handshake + config push). Metric batches are
//! handed to a [`MetricHandler`] owned by the engine side.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::SystemTime;

use async_trait::async_trait;
use parking_lot::Mutex;
use prost::Message as _;
use tracing::{debug, info, warn};

use otlb_proto::{
    message_from_agent, AgentConfiguration, ExportMetricsServiceRequest,
    ExportMetricsServiceResponse, MessageFromAgent, MessageToAgent, MetricRequest,
};

use crate::error::NetError;
use crate::message::{
    Frame, METHOD_AGENT_MESSAGE, METHOD_EXPORT, METHOD_EXPORT_ACK, SERVICE_AGENT, SERVICE_OTEL,
};
use crate::session::{DuplexSession, FrameDelegate};
use crate::stats::{AgentGroup, AgentStats};

/// Consumer of received metric batches.
#[async_trait]
pub trait MetricHandler: Send + Sync + 'static {
    async fn on_metric(&self, request: MetricRequest);
}

/// What we want a connected agent to run with.
#[derive(Clone, Debug, PartialEq)]
pub struct AgentTargetConfig {
    pub check_timeout: u32,
    pub export_period: u32,
    pub max_concurrent_checks: u32,
    pub use_exemplar: bool,
    /// Credential-encryption material; only ever sent over an encrypted
    /// transport to a peer that declared readiness.
    pub key: Option<String>,
    pub salt: Option<String>,
}

impl Default for AgentTargetConfig {
    fn default() -> Self {
        Self {
            check_timeout: 30,
            export_period: 60,
            max_concurrent_checks: 100,
            use_exemplar: true,
            key: None,
            salt: None,
        }
    }
}

pub struct AgentSession {
    session: Arc<DuplexSession>,
    handler: Arc<dyn MetricHandler>,
    stats: Arc<AgentStats>,
    transport_encrypted: bool,
    /// Expiry of the token the peer authenticated with; re-checked on every
    /// inbound message.
    token_expiry: Option<SystemTime>,
    target: Mutex<AgentTargetConfig>,
    /// Last configuration actually sent; resends are suppressed when the
    /// recomputed message compares equal.
    last_sent: Mutex<Option<MessageToAgent>>,
    peer_ready: AtomicBool,
    registered: Mutex<Option<AgentGroup>>,
    host: Mutex<Option<String>>,
}

impl AgentSession {
    /// Wire an agent session onto a duplex session and arm the read side.
    pub fn attach(
        session: Arc<DuplexSession>,
        handler: Arc<dyn MetricHandler>,
        stats: Arc<AgentStats>,
        transport_encrypted: bool,
        token_expiry: Option<SystemTime>,
        target: AgentTargetConfig,
    ) -> Arc<Self> {
        let agent = Arc::new(Self {
            session,
            handler,
            stats,
            transport_encrypted,
            token_expiry,
            target: Mutex::new(target),
            last_sent: Mutex::new(None),
            peer_ready: AtomicBool::new(false),
            registered: Mutex::new(None),
            host: Mutex::new(None),
        });
        let delegate = Arc::downgrade(&agent) as Weak<dyn FrameDelegate>;
        agent.session.set_delegate(delegate);
        agent.session.start_read();
        agent
    }

    pub fn session(&self) -> &Arc<DuplexSession> {
        &self.session
    }

    /// Host declared in the agent's handshake, once received.
    pub fn host(&self) -> Option<String> {
        self.host.lock().clone()
    }

    pub async fn shutdown(&self) {
        self.session.shutdown().await;
    }

    /// Replace the target config and push it if it differs from the last
    /// one sent.
    pub fn update_target(&self, target: AgentTargetConfig) -> Result<(), NetError> {
        *self.target.lock() = target;
        self.push_config()
    }

    /// Compute the configuration message and send it unless it compares
    /// equal to the previous one.
    pub fn push_config(&self) -> Result<(), NetError> {
        let target = self.target.lock().clone();
        let mut config = AgentConfiguration {
            check_timeout: target.check_timeout,
            export_period: target.export_period,
            max_concurrent_checks: target.max_concurrent_checks,
            use_exemplar: target.use_exemplar,
            key: String::new(),
            salt: String::new(),
        };
        if self.transport_encrypted && self.peer_ready.load(Ordering::SeqCst) {
            config.key = target.key.unwrap_or_default();
            config.salt = target.salt.unwrap_or_default();
        }

        let msg = MessageToAgent::config(config);
        {
            let mut last = self.last_sent.lock();
            if last.as_ref() == Some(&msg) {
                debug!(peer = %self.session.peer_addr(), "agent configuration unchanged");
                return Ok(());
            }
            *last = Some(msg.clone());
        }
        info!(peer = %self.session.peer_addr(), "pushing agent configuration");
        self.session
            .write(Frame::with_message(SERVICE_AGENT, METHOD_AGENT_MESSAGE, &msg))
    }

    fn handle_init(&self, info: otlb_proto::AgentInfo) -> Result<(), NetError> {
        info!(
            host = %info.host,
            version = %info.version,
            os = %info.os,
            reversed = self.session.role().reversed(),
            "agent connected"
        );
        self.peer_ready
            .store(info.encryption_ready, Ordering::SeqCst);
        *self.host.lock() = Some(info.host);

        let group = AgentGroup {
            version: info.version,
            os: info.os,
            reversed: self.session.role().reversed(),
        };
        {
            let mut registered = self.registered.lock();
            if let Some(old) = registered.take() {
                self.stats.unregister(&old);
            }
            self.stats.register(group.clone());
            *registered = Some(group);
        }

        self.push_config()
    }

    async fn handle_export(&self, request: ExportMetricsServiceRequest) -> Result<(), NetError> {
        self.handler.on_metric(Arc::new(request)).await;
        let ack = ExportMetricsServiceResponse::default();
        self.session
            .write(Frame::with_message(SERVICE_OTEL, METHOD_EXPORT_ACK, &ack))
    }
}

#[async_trait]
impl FrameDelegate for AgentSession {
    async fn on_frame(&self, frame: Frame) -> Result<(), NetError> {
        if let Some(expiry) = self.token_expiry {
            if SystemTime::now() >= expiry {
                warn!(peer = %self.session.peer_addr(), "token expired, dropping session");
                return Err(NetError::TokenExpired);
            }
        }

        match (frame.service_id, frame.method_id) {
            (SERVICE_AGENT, METHOD_AGENT_MESSAGE) => {
                let msg = MessageFromAgent::decode(frame.body)?;
                match msg.content {
                    Some(message_from_agent::Content::Init(info)) => self.handle_init(info),
                    Some(message_from_agent::Content::OtelRequest(request)) => {
                        self.handler.on_metric(Arc::new(request)).await;
                        Ok(())
                    }
                    None => {
                        debug!(peer = %self.session.peer_addr(), "empty agent message");
                        Ok(())
                    }
                }
            }
            (SERVICE_OTEL, METHOD_EXPORT) => {
                let request = ExportMetricsServiceRequest::decode(frame.body)?;
                self.handle_export(request).await
            }
            (service_id, _) => Err(NetError::UnknownService(service_id)),
        }
    }

    fn on_closed(&self) {
        if let Some(group) = self.registered.lock().take() {
            self.stats.unregister(&group);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::MockSocket;
    use crate::session::AcceptedRole;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct RecordingHandler {
        batches: AtomicUsize,
    }

    impl RecordingHandler {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                batches: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl MetricHandler for RecordingHandler {
        async fn on_metric(&self, _request: MetricRequest) {
            self.batches.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn init_frame(encryption_ready: bool) -> Frame {
        let msg = MessageFromAgent::init(otlb_proto::AgentInfo {
            host: "srv-1".into(),
            version: "24.10".into(),
            os: "linux".into(),
            encryption_ready,
        });
        Frame::with_message(SERVICE_AGENT, METHOD_AGENT_MESSAGE, &msg)
    }

    fn export_frame() -> Frame {
        Frame::with_message(
            SERVICE_OTEL,
            METHOD_EXPORT,
            &ExportMetricsServiceRequest::default(),
        )
    }

    fn decode_config(frame: &Frame) -> AgentConfiguration {
        assert_eq!(frame.service_id, SERVICE_AGENT);
        let msg = MessageToAgent::decode(frame.body.clone()).unwrap();
        match msg.content {
            Some(otlb_proto::message_to_agent::Content::Config(config)) => config,
            None => panic!("not a config message"),
        }
    }

    fn attach(
        socket: Arc<MockSocket>,
        handler: Arc<RecordingHandler>,
        encrypted: bool,
        expiry: Option<SystemTime>,
        target: AgentTargetConfig,
    ) -> (Arc<AgentSession>, Arc<AgentStats>) {
        let stats = Arc::new(AgentStats::new());
        let session = DuplexSession::new(socket, Box::new(AcceptedRole));
        let agent = AgentSession::attach(session, handler, stats.clone(), encrypted, expiry, target);
        (agent, stats)
    }

    #[tokio::test]
    async fn test_init_pushes_config_without_credentials() {
        let socket = MockSocket::new(vec![init_frame(true)], true);
        let handler = RecordingHandler::new();
        let target = AgentTargetConfig {
            key: Some("k".into()),
            salt: Some("s".into()),
            ..Default::default()
        };
        // Plain transport: credentials must be withheld even though the
        // peer declared readiness.
        let (agent, stats) = attach(socket.clone(), handler, false, None, target);
        agent.session().wait_closed().await;

        let sent = socket.sent_frames();
        assert_eq!(sent.len(), 1);
        let config = decode_config(&sent[0]);
        assert_eq!(config.check_timeout, 30);
        assert_eq!(config.export_period, 60);
        assert_eq!(config.max_concurrent_checks, 100);
        assert!(config.key.is_empty());
        assert!(config.salt.is_empty());
        assert_eq!(agent.host(), Some("srv-1".into()));
        // Stats are released when the session dies.
        assert_eq!(stats.total(), 0);
    }

    #[tokio::test]
    async fn test_credentials_sent_when_encrypted_and_ready() {
        let socket = MockSocket::new(vec![init_frame(true)], true);
        let handler = RecordingHandler::new();
        let target = AgentTargetConfig {
            key: Some("k".into()),
            salt: Some("s".into()),
            ..Default::default()
        };
        let (agent, _) = attach(socket.clone(), handler, true, None, target);
        agent.session().wait_closed().await;

        let config = decode_config(&socket.sent_frames()[0]);
        assert_eq!(config.key, "k");
        assert_eq!(config.salt, "s");
    }

    #[tokio::test]
    async fn test_credentials_withheld_when_peer_not_ready() {
        let socket = MockSocket::new(vec![init_frame(false)], true);
        let handler = RecordingHandler::new();
        let target = AgentTargetConfig {
            key: Some("k".into()),
            salt: Some("s".into()),
            ..Default::default()
        };
        let (agent, _) = attach(socket.clone(), handler, true, None, target);
        agent.session().wait_closed().await;

        let config = decode_config(&socket.sent_frames()[0]);
        assert!(config.key.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_init_suppresses_resend() {
        let socket = MockSocket::new(vec![init_frame(true), init_frame(true)], true);
        let handler = RecordingHandler::new();
        let (agent, _) = attach(
            socket.clone(),
            handler,
            false,
            None,
            AgentTargetConfig::default(),
        );
        agent.session().wait_closed().await;

        assert_eq!(socket.sent_frames().len(), 1);
    }

    #[tokio::test]
    async fn test_update_target_pushes_changed_config() {
        let socket = MockSocket::new(vec![init_frame(true)], false);
        let handler = RecordingHandler::new();
        let (agent, _) = attach(
            socket.clone(),
            handler,
            false,
            None,
            AgentTargetConfig::default(),
        );
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut target = AgentTargetConfig::default();
        agent.update_target(target.clone()).unwrap();
        target.export_period = 90;
        agent.update_target(target).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Init push, then only the genuinely changed update.
        let sent = socket.sent_frames();
        assert_eq!(sent.len(), 2);
        assert_eq!(decode_config(&sent[1]).export_period, 90);
        agent.shutdown().await;
    }

    #[tokio::test]
    async fn test_export_is_handled_and_acked() {
        let socket = MockSocket::new(vec![export_frame()], true);
        let handler = RecordingHandler::new();
        let (agent, _) = attach(
            socket.clone(),
            handler.clone(),
            false,
            None,
            AgentTargetConfig::default(),
        );
        agent.session().wait_closed().await;

        assert_eq!(handler.batches.load(Ordering::SeqCst), 1);
        let sent = socket.sent_frames();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].service_id, SERVICE_OTEL);
        assert_eq!(sent[0].method_id, METHOD_EXPORT_ACK);
    }

    #[tokio::test]
    async fn test_expired_token_drops_session() {
        let socket = MockSocket::new(vec![init_frame(true)], false);
        let handler = RecordingHandler::new();
        let expiry = SystemTime::now() - Duration::from_secs(1);
        let (agent, _) = attach(
            socket.clone(),
            handler,
            false,
            Some(expiry),
            AgentTargetConfig::default(),
        );
        agent.session().wait_closed().await;

        assert!(socket.sent_frames().is_empty());
        assert!(!agent.session().is_alive());
    }
}
