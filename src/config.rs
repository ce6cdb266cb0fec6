//! Voice layer configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VoiceError};
use crate::spatial::AttenuationModel;

/// Proximity voice configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Distance at or below which a connection is initiated
    pub connect_distance: f64,
    /// Distance above which an existing connection is torn down.
    /// Must be strictly greater than `connect_distance`; the gap is the
    /// hysteresis band that prevents open/close flicker at the boundary.
    pub disconnect_distance: f64,
    /// Maximum concurrent peer links
    pub max_peers: usize,
    /// STUN server URLs handed to the peer transport
    pub stun_servers: Vec<String>,
    /// Dwell bound for a link stuck mid-negotiation, in seconds.
    /// Expired links are closed at reconcile and rebuilt on the next
    /// cycle if the peer is still nearby.
    pub negotiation_timeout_secs: u64,
    /// Spatial audio settings
    pub audio: AudioConfig,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            connect_distance: 120.0,
            disconnect_distance: 150.0,
            max_peers: 20,
            stun_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            negotiation_timeout_secs: 10,
            audio: AudioConfig::default(),
        }
    }
}

impl VoiceConfig {
    pub fn negotiation_timeout(&self) -> Duration {
        Duration::from_secs(self.negotiation_timeout_secs)
    }

    /// Validate threshold and ceiling sanity
    pub fn validate(&self) -> Result<()> {
        if self.connect_distance <= 0.0 {
            return Err(VoiceError::Config(format!(
                "connect_distance must be positive, got {}",
                self.connect_distance
            )));
        }
        if self.disconnect_distance <= self.connect_distance {
            return Err(VoiceError::Config(format!(
                "disconnect_distance ({}) must exceed connect_distance ({}) to form a hysteresis band",
                self.disconnect_distance, self.connect_distance
            )));
        }
        if self.max_peers == 0 {
            return Err(VoiceError::Config("max_peers must be at least 1".to_string()));
        }
        self.audio.validate()
    }
}

/// Spatial audio configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Distance-to-gain model
    pub model: AttenuationModel,
    /// Reference distance for the inverse/exponential models
    pub ref_distance: f64,
    /// Distance at which the linear model reaches zero gain
    pub max_distance: f64,
    /// Rolloff factor for the inverse/exponential models
    pub rolloff: f64,
    /// Position listener and source orientation so the spatializer pans
    pub directional: bool,
    /// Time constant for smoothed proximity gain ramps, in milliseconds
    pub smoothing_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            model: AttenuationModel::Linear,
            ref_distance: 1.0,
            max_distance: 200.0,
            rolloff: 1.0,
            directional: true,
            smoothing_ms: 100,
        }
    }
}

impl AudioConfig {
    pub fn smoothing(&self) -> Duration {
        Duration::from_millis(self.smoothing_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ref_distance <= 0.0 {
            return Err(VoiceError::Config(format!(
                "ref_distance must be positive, got {}",
                self.ref_distance
            )));
        }
        if self.max_distance <= 0.0 {
            return Err(VoiceError::Config(format!(
                "max_distance must be positive, got {}",
                self.max_distance
            )));
        }
        if self.rolloff < 0.0 {
            return Err(VoiceError::Config(format!(
                "rolloff must not be negative, got {}",
                self.rolloff
            )));
        }
        Ok(())
    }
}
