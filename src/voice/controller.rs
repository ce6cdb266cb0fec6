//! Top-level orchestrator
//!
//! Consumes nearby-player snapshots and inbound signaling envelopes,
//! drives the connection pool and the spatial audio engine, and emits
//! outbound envelopes plus upward events:
//!
//! ```text
//! snapshots ----------+
//! envelopes ----------+--> ProximityVoiceController
//! transport events ---+        |            |
//!                              v            v
//!                        ConnectionPool   SpatialAudioEngine
//!                              |
//!                              v
//!                          PeerLink(s)
//! ```
//!
//! All three entry points take `&mut self` and run to completion on one
//! task; platform-boundary awaits suspend only the operation at hand.
//! The embedder owns the transport-event channel and feeds completions
//! back through `handle_transport_event`, so every event is processed in
//! arrival order.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::config::VoiceConfig;
use crate::error::{Result, VoiceError};
use crate::events::{EventBus, VoiceEvent};
use crate::media::{MediaProvider, TransportEvent, TransportEventSender, TransportState};
use crate::presence::{Identity, NearbySnapshot, Position};
use crate::spatial::{AudioGraph, SpatialAudioEngine};

use super::link::LinkState;
use super::pool::ConnectionPool;
use super::signaling::{EnvelopeKind, SignalingEnvelope};

/// Proximity voice session orchestrator
pub struct ProximityVoiceController {
    self_id: Identity,
    /// Authoritative self pose from the latest snapshot
    self_pose: Option<Position>,
    pool: ConnectionPool,
    audio: SpatialAudioEngine,
    events: EventBus,
    outbound: mpsc::UnboundedSender<SignalingEnvelope>,
}

impl ProximityVoiceController {
    /// Build a controller for one session.
    ///
    /// `outbound` carries envelopes to the signaling channel
    /// (fire-and-forget). `transport_events` is the sender half of the
    /// embedder-owned channel that transports push completions onto; the
    /// embedder drains the receiver into `handle_transport_event`.
    pub fn new(
        self_id: Identity,
        config: VoiceConfig,
        media: Arc<dyn MediaProvider>,
        graph: Box<dyn AudioGraph>,
        outbound: mpsc::UnboundedSender<SignalingEnvelope>,
        transport_events: TransportEventSender,
    ) -> Result<Self> {
        config.validate()?;
        let audio = SpatialAudioEngine::new(config.audio.clone(), graph);
        let config = Arc::new(config);
        let pool = ConnectionPool::new(
            self_id,
            config,
            media,
            outbound.clone(),
            transport_events,
        );

        Ok(Self {
            self_id,
            self_pose: None,
            pool,
            audio,
            events: EventBus::new(),
            outbound,
        })
    }

    pub fn self_id(&self) -> Identity {
        self.self_id
    }

    pub fn self_pose(&self) -> Option<Position> {
        self.self_pose
    }

    /// Subscribe to upward voice events
    pub fn subscribe(&self) -> broadcast::Receiver<VoiceEvent> {
        self.events.subscribe()
    }

    pub fn audio(&self) -> &SpatialAudioEngine {
        &self.audio
    }

    pub fn audio_mut(&mut self) -> &mut SpatialAudioEngine {
        &mut self.audio
    }

    pub fn peer_count(&self) -> usize {
        self.pool.len()
    }

    pub fn link_state(&self, peer: Identity) -> Option<LinkState> {
        self.pool.link_state(peer)
    }

    pub fn connected_peers(&self) -> Vec<Identity> {
        self.pool
            .peers()
            .filter(|id| self.pool.link_state(*id) == Some(LinkState::Connected))
            .collect()
    }

    /// Process one nearby-players snapshot: reconcile the pool, then
    /// refresh spatial parameters for every peer with a live route
    pub async fn handle_snapshot(&mut self, snapshot: &NearbySnapshot) {
        if snapshot.player.guid != self.self_id {
            warn!(
                expected = %self.self_id,
                got = %snapshot.player.guid,
                "snapshot for a different identity, dropping"
            );
            return;
        }
        self.self_pose = Some(snapshot.player.position);

        let report = self.pool.reconcile(snapshot).await;
        for id in &report.closed {
            self.finish_removal(*id);
        }
        for (id, e) in &report.failed {
            self.events.publish(VoiceEvent::LinkFailed {
                identity: *id,
                reason: e.to_string(),
            });
        }

        let self_pos = snapshot.player.position;
        for peer in &snapshot.nearby_players {
            if self.audio.has_route(peer.guid) {
                self.audio.update(&self_pos, &peer.position, peer.guid);
            }
        }
    }

    /// Process one inbound signaling envelope.
    /// Unroutable envelopes are logged and dropped.
    pub async fn handle_envelope(&mut self, envelope: SignalingEnvelope) {
        if envelope.to != self.self_id {
            warn!(to = %envelope.to, from = %envelope.from, "unroutable envelope, dropping");
            return;
        }

        let from = envelope.from;
        let had_record = self.pool.contains(from);
        let result = match envelope.kind {
            EnvelopeKind::Offer => self.pool.accept_offer(&envelope).await,
            EnvelopeKind::Answer => self.pool.accept_answer(&envelope).await,
            EnvelopeKind::Candidate => self.pool.add_candidate(&envelope).await,
        };

        match result {
            Ok(()) => self.announce_if_ready(from),
            Err(e) => {
                warn!(peer = %from, error = %e, "signaling failed, link closed");
                self.events.publish(VoiceEvent::LinkFailed {
                    identity: from,
                    reason: e.to_string(),
                });
                if had_record {
                    self.finish_removal(from);
                }
            }
        }
    }

    /// Process one platform transport completion
    pub async fn handle_transport_event(&mut self, peer: Identity, event: TransportEvent) {
        match event {
            TransportEvent::LocalCandidate(data) => {
                // Discoveries for an already-closed link are stale; drop.
                if !self.pool.contains(peer) {
                    debug!(peer = %peer, "candidate for closed link, dropping");
                    return;
                }
                let _ = self
                    .outbound
                    .send(SignalingEnvelope::candidate(self.self_id, peer, data));
            }
            TransportEvent::RemoteStream(stream) => {
                self.pool.note_remote_stream(peer, stream);
                self.announce_if_ready(peer);
            }
            TransportEvent::StateChange(state) => match state {
                TransportState::Failed | TransportState::Disconnected => {
                    if self.pool.close(peer).await {
                        let error = VoiceError::TransportFailure {
                            peer,
                            reason: format!("transport state {state}"),
                        };
                        warn!(peer = %peer, error = %error, "link closed");
                        self.events.publish(VoiceEvent::LinkFailed {
                            identity: peer,
                            reason: error.to_string(),
                        });
                        self.finish_removal(peer);
                    }
                }
                TransportState::Connected => {
                    debug!(peer = %peer, "transport connected");
                    self.announce_if_ready(peer);
                }
                TransportState::Connecting | TransportState::Closed => {
                    debug!(peer = %peer, state = %state, "transport state change");
                }
            },
        }
    }

    /// Tear down every link and route
    pub async fn shutdown(&mut self) {
        info!("voice session teardown");
        for id in self.pool.close_all().await {
            self.finish_removal(id);
        }
        self.audio.detach_all();
    }

    fn announce_if_ready(&mut self, peer: Identity) {
        if let Some(stream) = self.pool.take_ready_stream(peer) {
            if let Err(e) = self.audio.attach(peer, &stream) {
                warn!(peer = %peer, error = %e, "failed to build audio route");
            }
            info!(peer = %peer, "remote voice stream ready");
            self.events.publish(VoiceEvent::RemoteStreamReady {
                identity: peer,
                stream,
            });
        }
    }

    fn finish_removal(&mut self, peer: Identity) {
        self.audio.detach(peer);
        self.events.publish(VoiceEvent::PeerDisconnected { identity: peer });
    }
}
