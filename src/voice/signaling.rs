//! Signaling envelope wire types
//!
//! Envelopes ride an external, unreliable, reorderable side channel. The
//! `data` field is opaque: a serialized session description or ICE
//! candidate produced by the peer transport.

use serde::{Deserialize, Serialize};

use crate::presence::Identity;

/// Envelope payload kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeKind {
    Offer,
    Answer,
    Candidate,
}

impl std::fmt::Display for EnvelopeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnvelopeKind::Offer => write!(f, "offer"),
            EnvelopeKind::Answer => write!(f, "answer"),
            EnvelopeKind::Candidate => write!(f, "candidate"),
        }
    }
}

/// One signaling message between two participants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalingEnvelope {
    pub from: Identity,
    pub to: Identity,
    pub kind: EnvelopeKind,
    pub data: String,
}

impl SignalingEnvelope {
    pub fn offer(from: Identity, to: Identity, data: impl Into<String>) -> Self {
        Self {
            from,
            to,
            kind: EnvelopeKind::Offer,
            data: data.into(),
        }
    }

    pub fn answer(from: Identity, to: Identity, data: impl Into<String>) -> Self {
        Self {
            from,
            to,
            kind: EnvelopeKind::Answer,
            data: data.into(),
        }
    }

    pub fn candidate(from: Identity, to: Identity, data: impl Into<String>) -> Self {
        Self {
            from,
            to,
            kind: EnvelopeKind::Candidate,
            data: data.into(),
        }
    }
}
