//! Voice connection lifecycle
//!
//! Per-peer negotiation links, the connection pool that reconciles them
//! against proximity snapshots, and the top-level controller.

pub mod controller;
pub mod link;
pub mod pool;
pub mod signaling;

pub use controller::ProximityVoiceController;
pub use link::{LinkRole, LinkState, PeerLink};
pub use pool::{ConnectionPool, ReconcileReport};
pub use signaling::{EnvelopeKind, SignalingEnvelope};
