//! Platform media collaborator interface
//!
//! The voice core does not negotiate ICE/DTLS/SRTP itself; it drives a
//! capability-providing peer transport through the narrow trait surface
//! below. `media::rtc` ships the production implementation backed by the
//! `webrtc` crate; tests script their own.
//!
//! Transport callbacks (candidate discovered, track received, state
//! changes) are delivered as `(Identity, TransportEvent)` messages on an
//! unbounded channel owned by the embedder, which feeds them back into
//! `ProximityVoiceController::handle_transport_event`. This keeps the
//! whole layer single-task and strictly event-ordered.

pub mod rtc;

pub use rtc::RtcMediaProvider;

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::presence::Identity;

/// Opaque handle to a platform media stream or track.
///
/// The core never inspects stream contents; it only threads handles from
/// the media collaborator to the audio graph. Implementations downcast to
/// their concrete type.
#[derive(Clone)]
pub struct StreamHandle(Arc<dyn Any + Send + Sync>);

impl StreamHandle {
    pub fn new<T: Any + Send + Sync>(inner: T) -> Self {
        Self(Arc::new(inner))
    }

    pub fn from_arc<T: Any + Send + Sync>(inner: Arc<T>) -> Self {
        Self(inner)
    }

    /// Recover the concrete stream type, if it matches
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.0).downcast::<T>().ok()
    }
}

impl fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StreamHandle(..)")
    }
}

/// Asynchronous completion delivered by a peer transport
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A local ICE candidate was discovered (serialized, opaque)
    LocalCandidate(String),
    /// The remote audio stream arrived
    RemoteStream(StreamHandle),
    /// Underlying connection state changed
    StateChange(TransportState),
}

/// Peer transport connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportState::Connecting => write!(f, "connecting"),
            TransportState::Connected => write!(f, "connected"),
            TransportState::Disconnected => write!(f, "disconnected"),
            TransportState::Failed => write!(f, "failed"),
            TransportState::Closed => write!(f, "closed"),
        }
    }
}

/// Sender half of the embedder-owned transport event channel
pub type TransportEventSender = mpsc::UnboundedSender<(Identity, TransportEvent)>;

/// Factory for local streams and peer transports
#[async_trait]
pub trait MediaProvider: Send + Sync {
    /// Acquire the local audio stream shared by all links
    async fn create_local_stream(&self) -> Result<StreamHandle>;

    /// Build a peer transport with the local stream attached.
    /// Completions are pushed onto `events`, tagged with `peer`.
    async fn create_transport(
        &self,
        peer: Identity,
        local_stream: &StreamHandle,
        stun_servers: &[String],
        events: TransportEventSender,
    ) -> Result<Box<dyn PeerTransport>>;
}

/// Description/candidate exchange primitives of one peer transport.
///
/// Descriptions and candidates are opaque serialized strings; the core
/// shuttles them between the signaling channel and the transport without
/// interpreting them.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn create_offer(&self) -> Result<String>;
    async fn create_answer(&self) -> Result<String>;
    async fn set_local_description(&self, description: &str) -> Result<()>;
    async fn set_remote_description(&self, description: &str) -> Result<()>;
    async fn add_ice_candidate(&self, candidate: &str) -> Result<()>;
    async fn close(&self) -> Result<()>;
}
