//! Duplex session state machine.
//!
//! One session wraps one connected socket, whichever side dialed. It keeps
//! a single read in flight, serializes writes through an ordered queue, and
//! funnels every failure into one idempotent `shutdown`. Received frames go
//! to a [`FrameDelegate`] held weakly, so dropping the delegate tears the
//! session down instead of leaking it.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock, Weak};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::NetError;
use crate::message::Frame;
use crate::socket::Socket;

/// Receiver of decoded frames. An `Err` from `on_frame` shuts the session
/// down.
#[async_trait]
pub trait FrameDelegate: Send + Sync + 'static {
    async fn on_frame(&self, frame: Frame) -> Result<(), NetError>;

    /// Called once, after the session transitioned to dead.
    fn on_closed(&self) {}
}

/// Which side of the connection this session sits on.
///
/// Accepted sessions die silently; initiated (reversed) ones are redialed
/// by their owner, which also shapes how the peer is identified in logs and
/// fleet statistics.
pub trait SessionRole: Send + Sync + 'static {
    fn reversed(&self) -> bool;
    fn name(&self) -> &'static str;
}

/// The peer dialed us.
pub struct AcceptedRole;

impl SessionRole for AcceptedRole {
    fn reversed(&self) -> bool {
        false
    }
    fn name(&self) -> &'static str {
        "accepted"
    }
}

/// We dialed the peer (reversed connection).
pub struct InitiatedRole;

impl SessionRole for InitiatedRole {
    fn reversed(&self) -> bool {
        true
    }
    fn name(&self) -> &'static str {
        "reversed"
    }
}

struct State {
    alive: bool,
    read_in_flight: bool,
    write_in_flight: bool,
    write_queue: VecDeque<Bytes>,
}

pub struct DuplexSession {
    socket: Arc<dyn Socket>,
    role: Box<dyn SessionRole>,
    delegate: OnceLock<Weak<dyn FrameDelegate>>,
    state: Mutex<State>,
    closed_tx: watch::Sender<bool>,
    /// Owner-installed hook, runs once on shutdown. Owners post any removal
    /// from their own maps as a separate task, never inline.
    on_shutdown: OnceLock<Box<dyn Fn() + Send + Sync>>,
}

impl DuplexSession {
    pub fn new(socket: Arc<dyn Socket>, role: Box<dyn SessionRole>) -> Arc<Self> {
        Arc::new(Self {
            socket,
            role,
            delegate: OnceLock::new(),
            state: Mutex::new(State {
                alive: true,
                read_in_flight: false,
                write_in_flight: false,
                write_queue: VecDeque::new(),
            }),
            closed_tx: watch::channel(false).0,
            on_shutdown: OnceLock::new(),
        })
    }

    /// Install the frame receiver. Must happen before `start_read`.
    pub fn set_delegate(&self, delegate: Weak<dyn FrameDelegate>) {
        let _ = self.delegate.set(delegate);
    }

    pub fn set_on_shutdown(&self, hook: Box<dyn Fn() + Send + Sync>) {
        let _ = self.on_shutdown.set(hook);
    }

    pub fn role(&self) -> &dyn SessionRole {
        self.role.as_ref()
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.socket.peer_addr()
    }

    pub fn is_alive(&self) -> bool {
        self.state.lock().alive
    }

    /// Arm the read side. No-op while a read is already in flight or after
    /// shutdown, so callers may invoke it freely.
    pub fn start_read(self: &Arc<Self>) {
        {
            let mut st = self.state.lock();
            if !st.alive || st.read_in_flight {
                return;
            }
            st.read_in_flight = true;
        }
        let session = Arc::clone(self);
        tokio::spawn(async move {
            let result = session.socket.recv().await;
            session.on_read_done(result).await;
        });
    }

    async fn on_read_done(self: &Arc<Self>, result: Result<Bytes, NetError>) {
        self.state.lock().read_in_flight = false;

        let wire = match result {
            Ok(wire) => wire,
            Err(NetError::ConnectionClosed) => {
                debug!(peer = %self.peer_addr(), "peer closed connection");
                self.shutdown().await;
                return;
            }
            Err(e) => {
                warn!(peer = %self.peer_addr(), error = %e, "read failed");
                self.shutdown().await;
                return;
            }
        };

        let frame = match Frame::decode(&wire) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(peer = %self.peer_addr(), error = %e, "bad frame");
                self.shutdown().await;
                return;
            }
        };

        let Some(delegate) = self.delegate.get().and_then(Weak::upgrade) else {
            self.shutdown().await;
            return;
        };

        match delegate.on_frame(frame).await {
            Ok(()) => self.start_read(),
            Err(e) => {
                warn!(peer = %self.peer_addr(), error = %e, "frame handling failed");
                self.shutdown().await;
            }
        }
    }

    /// Queue a frame for sending. Writes go out in queue order, one send in
    /// flight at a time.
    pub fn write(self: &Arc<Self>, frame: Frame) -> Result<(), NetError> {
        let wire = frame.encode();
        let start = {
            let mut st = self.state.lock();
            if !st.alive {
                return Err(NetError::SessionClosed);
            }
            st.write_queue.push_back(wire);
            if st.write_in_flight {
                false
            } else {
                st.write_in_flight = true;
                true
            }
        };
        if start {
            self.pump_writes();
        }
        Ok(())
    }

    fn pump_writes(self: &Arc<Self>) {
        let next = {
            let mut st = self.state.lock();
            match st.write_queue.pop_front() {
                Some(wire) => Some(wire),
                None => {
                    st.write_in_flight = false;
                    None
                }
            }
        };
        let Some(wire) = next else { return };

        let session = Arc::clone(self);
        tokio::spawn(async move {
            match session.socket.send(wire).await {
                Ok(()) => session.pump_writes(),
                Err(e) => {
                    warn!(peer = %session.peer_addr(), error = %e, "write failed");
                    session.shutdown().await;
                }
            }
        });
    }

    /// Tear the session down. Idempotent: the first caller flips `alive`,
    /// later calls return immediately.
    pub async fn shutdown(self: &Arc<Self>) {
        {
            let mut st = self.state.lock();
            if !st.alive {
                return;
            }
            st.alive = false;
            st.write_queue.clear();
        }
        debug!(peer = %self.peer_addr(), role = self.role.name(), "session shutdown");

        self.socket.close().await;
        let _ = self.closed_tx.send(true);
        if let Some(delegate) = self.delegate.get().and_then(Weak::upgrade) {
            delegate.on_closed();
        }
        if let Some(hook) = self.on_shutdown.get() {
            hook();
        }
    }

    /// Resolve once the session is dead. Returns immediately if it already
    /// is.
    pub async fn wait_closed(&self) {
        let mut rx = self.closed_tx.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}
