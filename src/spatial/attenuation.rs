//! Distance-to-gain attenuation models

use serde::{Deserialize, Serialize};

use crate::config::AudioConfig;

/// Minimum distance fed to the inverse/exponential formulas.
/// A source on top of the listener must not divide by zero.
pub const MIN_DISTANCE: f64 = 1.0;

/// Attenuation model selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttenuationModel {
    /// `max(0, 1 - d / max_distance)`
    Linear,
    /// `ref / (ref + rolloff * (d - ref))`
    Inverse,
    /// `(d / ref) ^ -rolloff`
    Exponential,
}

impl Default for AttenuationModel {
    fn default() -> Self {
        Self::Linear
    }
}

impl std::fmt::Display for AttenuationModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttenuationModel::Linear => write!(f, "linear"),
            AttenuationModel::Inverse => write!(f, "inverse"),
            AttenuationModel::Exponential => write!(f, "exponential"),
        }
    }
}

/// Compute the proximity gain for a source at `distance`.
///
/// Always lands in `[0, 1]`, before any user-volume multiplier.
pub fn compute_gain(config: &AudioConfig, distance: f64) -> f32 {
    let gain = match config.model {
        AttenuationModel::Linear => 1.0 - distance / config.max_distance,
        AttenuationModel::Inverse => {
            let d = distance.max(MIN_DISTANCE);
            let denom = config.ref_distance + config.rolloff * (d - config.ref_distance);
            if denom <= f64::EPSILON {
                1.0
            } else {
                config.ref_distance / denom
            }
        }
        AttenuationModel::Exponential => {
            let d = distance.max(MIN_DISTANCE);
            (d / config.ref_distance).powf(-config.rolloff)
        }
    };

    gain.clamp(0.0, 1.0) as f32
}
