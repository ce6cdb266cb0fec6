//! Proximity-gated peer-to-peer voice for multiplayer virtual worlds
//!
//! As players move, this crate opens, maintains, and tears down direct
//! audio links to players within audible range, and renders each
//! connected peer's voice with distance- and orientation-based
//! attenuation.
//!
//! Architecture:
//! ```text
//! position snapshots --+
//! signaling envelopes -+--> ProximityVoiceController
//!                               |
//!                               +--> ConnectionPool (hysteresis, ceiling)
//!                               |        +--> PeerLink (offer/answer/candidate)
//!                               |                 +--> PeerTransport (webrtc)
//!                               |
//!                               +--> SpatialAudioEngine (gain, panning)
//!                                        +--> AudioGraph (platform)
//! ```
//!
//! Voice is best-effort relative to the primary simulation: no error in
//! this crate is a hard session failure.

pub mod config;
pub mod error;
pub mod events;
pub mod media;
pub mod presence;
pub mod spatial;
pub mod voice;

pub use config::{AudioConfig, VoiceConfig};
pub use error::{Result, VoiceError};
pub use events::{EventBus, VoiceEvent};
pub use media::{
    MediaProvider, PeerTransport, RtcMediaProvider, StreamHandle, TransportEvent,
    TransportEventSender, TransportState,
};
pub use presence::{Identity, NearbySnapshot, Player, Position};
pub use spatial::{
    AttenuationModel, AudioGraph, AudioRouteControls, NullAudioGraph, SpatialAudioEngine,
};
pub use voice::{
    ConnectionPool, EnvelopeKind, LinkRole, LinkState, PeerLink, ProximityVoiceController,
    ReconcileReport, SignalingEnvelope,
};
