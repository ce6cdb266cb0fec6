//! Presence wire types: identities, poses, and nearby-player snapshots
//!
//! These mirror the payloads produced by the world data server. Snapshots
//! are full replacements: each one supersedes the previous view entirely,
//! no diffing is guaranteed by the source.

use serde::{Deserialize, Serialize};

/// Opaque stable participant key, unique within a session.
///
/// The numeric ordering is load-bearing: simultaneous-offer races are
/// resolved by comparing identities (see `voice::link`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Identity(pub i64);

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position plus heading angle (`o`, radians), as sent on the wire
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub o: f64,
}

impl Default for Position {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            o: 0.0,
        }
    }
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64, o: f64) -> Self {
        Self { x, y, z, o }
    }

    /// Squared planar (x/y) distance. Connection gating compares squared
    /// distances against squared thresholds to avoid the sqrt.
    pub fn planar_distance_sq(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    /// Planar (x/y) distance.
    pub fn planar_distance(&self, other: &Position) -> f64 {
        self.planar_distance_sq(other).sqrt()
    }

    /// Heading-derived forward vector `(cos o, sin o)`.
    pub fn forward(&self) -> (f64, f64) {
        (self.o.cos(), self.o.sin())
    }
}

/// One participant as seen in a snapshot.
///
/// The wire payload carries more (name, zone, map id); only the fields the
/// voice layer needs are kept, the rest is ignored on deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub guid: Identity,
    pub position: Position,
}

/// Full-replacement view of self plus nearby participants at one instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbySnapshot {
    pub player: Player,
    pub nearby_players: Vec<Player>,
}
