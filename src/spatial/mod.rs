//! Spatial audio parameter model
//!
//! Maps listener/source poses into per-peer gain and orientation
//! parameters and applies them to a platform audio graph. Each connected
//! peer gets one route:
//!
//! ```text
//! source -> userGain -> proximityGain -> spatializer -> output
//! ```
//!
//! The engine owns no network state; routes are keyed by identity only.

pub mod attenuation;

pub use attenuation::{compute_gain, AttenuationModel};

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::AudioConfig;
use crate::error::Result;
use crate::media::StreamHandle;
use crate::presence::{Identity, Position};

/// Platform audio graph: gain and 3-D positioning nodes with
/// time-scheduled parameter automation
pub trait AudioGraph: Send + Sync {
    /// Build the node chain for one remote stream
    fn build_route(
        &self,
        identity: Identity,
        stream: &StreamHandle,
    ) -> Result<Box<dyn AudioRouteControls>>;
}

/// Parameter surface of one built route
pub trait AudioRouteControls: Send {
    /// Set the user-controlled gain (mute/volume product), applied
    /// immediately
    fn set_user_gain(&mut self, gain: f32);

    /// Schedule a smoothed ramp of the proximity gain toward `gain` with
    /// the given time constant. Implementations must interpolate rather
    /// than jump; instantaneous changes click.
    fn ramp_proximity_gain(&mut self, gain: f32, time_constant: Duration);

    /// Position and orient the listener (directional mode only)
    fn set_listener(&mut self, position: [f64; 3], forward: [f64; 2]);

    /// Position and orient the source (directional mode only)
    fn set_source(&mut self, position: [f64; 3], forward: [f64; 2]);

    /// Tear the route down
    fn disconnect(&mut self);
}

/// Audio graph that discards everything, for headless deployments
/// (dedicated servers, mock clients)
pub struct NullAudioGraph;

impl AudioGraph for NullAudioGraph {
    fn build_route(
        &self,
        _identity: Identity,
        _stream: &StreamHandle,
    ) -> Result<Box<dyn AudioRouteControls>> {
        Ok(Box::new(NullRoute))
    }
}

struct NullRoute;

impl AudioRouteControls for NullRoute {
    fn set_user_gain(&mut self, _gain: f32) {}
    fn ramp_proximity_gain(&mut self, _gain: f32, _time_constant: Duration) {}
    fn set_listener(&mut self, _position: [f64; 3], _forward: [f64; 2]) {}
    fn set_source(&mut self, _position: [f64; 3], _forward: [f64; 2]) {}
    fn disconnect(&mut self) {}
}

struct AudioRoute {
    controls: Box<dyn AudioRouteControls>,
}

/// Per-peer spatial audio state
///
/// Routes exist exactly while their peer has a live remote stream; the
/// controller attaches on stream arrival and detaches on link removal.
pub struct SpatialAudioEngine {
    config: AudioConfig,
    graph: Box<dyn AudioGraph>,
    routes: HashMap<Identity, AudioRoute>,
    muted: HashSet<Identity>,
    user_volumes: HashMap<Identity, f32>,
    global_volume: f32,
}

impl SpatialAudioEngine {
    pub fn new(config: AudioConfig, graph: Box<dyn AudioGraph>) -> Self {
        Self {
            config,
            graph,
            routes: HashMap::new(),
            muted: HashSet::new(),
            user_volumes: HashMap::new(),
            global_volume: 1.0,
        }
    }

    /// Build the route for a newly available remote stream.
    /// An existing route for the identity is replaced.
    pub fn attach(&mut self, identity: Identity, stream: &StreamHandle) -> Result<()> {
        if self.detach(identity) {
            debug!(peer = %identity, "replacing existing audio route");
        }
        let mut controls = self.graph.build_route(identity, stream)?;
        controls.set_user_gain(self.user_gain(identity));
        self.routes.insert(identity, AudioRoute { controls });
        debug!(peer = %identity, "audio route attached");
        Ok(())
    }

    /// Disconnect and discard the route. Returns whether one existed.
    pub fn detach(&mut self, identity: Identity) -> bool {
        match self.routes.remove(&identity) {
            Some(mut route) => {
                route.controls.disconnect();
                debug!(peer = %identity, "audio route detached");
                true
            }
            None => false,
        }
    }

    /// Tear down every route (session teardown)
    pub fn detach_all(&mut self) {
        for (_, mut route) in self.routes.drain() {
            route.controls.disconnect();
        }
    }

    pub fn has_route(&self, identity: Identity) -> bool {
        self.routes.contains_key(&identity)
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Refresh gains and orientation for one connected peer.
    /// Called once per snapshot for every peer with a live route.
    pub fn update(&mut self, self_pos: &Position, peer_pos: &Position, identity: Identity) {
        let user_gain = self.user_gain(identity);
        let smoothing = self.config.smoothing();
        let distance = self_pos.planar_distance(peer_pos);
        let proximity_gain = attenuation::compute_gain(&self.config, distance);
        let directional = self.config.directional;

        let Some(route) = self.routes.get_mut(&identity) else {
            warn!(peer = %identity, "spatial update for peer without audio route");
            return;
        };

        route.controls.set_user_gain(user_gain);
        route.controls.ramp_proximity_gain(proximity_gain, smoothing);

        if directional {
            let (lx, ly) = self_pos.forward();
            let (sx, sy) = peer_pos.forward();
            route
                .controls
                .set_listener([self_pos.x, self_pos.y, self_pos.z], [lx, ly]);
            route
                .controls
                .set_source([peer_pos.x, peer_pos.y, peer_pos.z], [sx, sy]);
        }
    }

    /// Mute or unmute a peer. Applied immediately when a route exists.
    pub fn set_muted(&mut self, identity: Identity, muted: bool) {
        if muted {
            self.muted.insert(identity);
        } else {
            self.muted.remove(&identity);
        }
        self.apply_user_gain(identity);
    }

    pub fn is_muted(&self, identity: Identity) -> bool {
        self.muted.contains(&identity)
    }

    /// Per-peer volume in `[0, 1]`
    pub fn set_user_volume(&mut self, identity: Identity, volume: f32) {
        self.user_volumes.insert(identity, volume.clamp(0.0, 1.0));
        self.apply_user_gain(identity);
    }

    /// Global volume multiplier in `[0, 1]`, applied to every route
    pub fn set_global_volume(&mut self, volume: f32) {
        self.global_volume = volume.clamp(0.0, 1.0);
        let ids: Vec<Identity> = self.routes.keys().copied().collect();
        for identity in ids {
            self.apply_user_gain(identity);
        }
    }

    pub fn global_volume(&self) -> f32 {
        self.global_volume
    }

    fn apply_user_gain(&mut self, identity: Identity) {
        let gain = self.user_gain(identity);
        if let Some(route) = self.routes.get_mut(&identity) {
            route.controls.set_user_gain(gain);
        }
    }

    fn user_gain(&self, identity: Identity) -> f32 {
        if self.muted.contains(&identity) {
            return 0.0;
        }
        self.user_volumes.get(&identity).copied().unwrap_or(1.0) * self.global_volume
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AudioConfig;

    fn engine() -> SpatialAudioEngine {
        SpatialAudioEngine::new(AudioConfig::default(), Box::new(NullAudioGraph))
    }

    #[test]
    fn test_attach_detach_bookkeeping() {
        let mut engine = engine();
        let stream = StreamHandle::new(());
        let id = Identity(4);

        assert!(!engine.has_route(id));
        engine.attach(id, &stream).unwrap();
        assert!(engine.has_route(id));
        assert_eq!(engine.route_count(), 1);

        assert!(engine.detach(id));
        assert!(!engine.has_route(id));
        assert!(!engine.detach(id));
    }

    #[test]
    fn test_attach_replaces_existing_route() {
        let mut engine = engine();
        let stream = StreamHandle::new(());
        let id = Identity(4);

        engine.attach(id, &stream).unwrap();
        engine.attach(id, &stream).unwrap();
        assert_eq!(engine.route_count(), 1);
    }

    #[test]
    fn test_detach_all_clears_routes() {
        let mut engine = engine();
        let stream = StreamHandle::new(());
        engine.attach(Identity(1), &stream).unwrap();
        engine.attach(Identity(2), &stream).unwrap();

        engine.detach_all();
        assert_eq!(engine.route_count(), 0);
    }

    #[test]
    fn test_mute_state_tracking() {
        let mut engine = engine();
        let id = Identity(9);

        assert!(!engine.is_muted(id));
        engine.set_muted(id, true);
        assert!(engine.is_muted(id));
        assert_eq!(engine.user_gain(id), 0.0);

        engine.set_muted(id, false);
        assert_eq!(engine.user_gain(id), 1.0);
    }

    #[test]
    fn test_volumes_multiply_and_clamp() {
        let mut engine = engine();
        let id = Identity(9);

        engine.set_user_volume(id, 0.5);
        engine.set_global_volume(0.5);
        assert!((engine.user_gain(id) - 0.25).abs() < 1e-6);

        engine.set_user_volume(id, 7.0);
        assert_eq!(engine.user_volumes[&id], 1.0);
    }
}
