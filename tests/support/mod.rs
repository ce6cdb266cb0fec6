//! Shared test doubles: a scripted media provider, a recording audio
//! graph, and a controller rig wiring them together.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};

use proximity_voice::{
    AudioGraph, AudioRouteControls, Identity, MediaProvider, NearbySnapshot, PeerTransport,
    Player, Position, ProximityVoiceController, Result, SignalingEnvelope, StreamHandle,
    TransportEvent, TransportEventSender, VoiceConfig, VoiceError, VoiceEvent,
};

/// Opt-in tracing output for debugging a failing test:
/// `RUST_LOG=proximity_voice=debug cargo test -- --nocapture`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Media provider that records every transport interaction
pub struct FakeMedia {
    pub fail_local_stream: AtomicBool,
    pub fail_offer: AtomicBool,
    pub local_streams_created: AtomicUsize,
    transports: Mutex<Vec<Arc<TransportLog>>>,
}

/// Interaction log of one fake transport
pub struct TransportLog {
    pub peer: Identity,
    pub local_descriptions: Mutex<Vec<String>>,
    pub remote_descriptions: Mutex<Vec<String>>,
    pub candidates: Mutex<Vec<String>>,
    pub closed: AtomicBool,
    /// Sender the transport would push completions onto; tests use it to
    /// inject remote streams and state changes
    pub events: TransportEventSender,
}

impl FakeMedia {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            fail_local_stream: AtomicBool::new(false),
            fail_offer: AtomicBool::new(false),
            local_streams_created: AtomicUsize::new(0),
            transports: Mutex::new(Vec::new()),
        })
    }

    /// Most recent transport created for `peer`
    pub fn transport_for(&self, peer: Identity) -> Option<Arc<TransportLog>> {
        self.transports
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|t| t.peer == peer)
            .cloned()
    }

    pub fn transport_count(&self) -> usize {
        self.transports.lock().unwrap().len()
    }
}

#[async_trait]
impl MediaProvider for FakeMedia {
    async fn create_local_stream(&self) -> Result<StreamHandle> {
        if self.fail_local_stream.load(Ordering::SeqCst) {
            return Err(VoiceError::MediaUnavailable("no microphone".to_string()));
        }
        self.local_streams_created.fetch_add(1, Ordering::SeqCst);
        Ok(StreamHandle::new("local-stream"))
    }

    async fn create_transport(
        &self,
        peer: Identity,
        _local_stream: &StreamHandle,
        _stun_servers: &[String],
        events: TransportEventSender,
    ) -> Result<Box<dyn PeerTransport>> {
        let log = Arc::new(TransportLog {
            peer,
            local_descriptions: Mutex::new(Vec::new()),
            remote_descriptions: Mutex::new(Vec::new()),
            candidates: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            events,
        });
        self.transports.lock().unwrap().push(Arc::clone(&log));
        Ok(Box::new(FakeTransport {
            fail_offer: self.fail_offer.load(Ordering::SeqCst),
            log,
        }))
    }
}

struct FakeTransport {
    fail_offer: bool,
    log: Arc<TransportLog>,
}

#[async_trait]
impl PeerTransport for FakeTransport {
    async fn create_offer(&self) -> Result<String> {
        if self.fail_offer {
            return Err(VoiceError::Transport("offer refused".to_string()));
        }
        Ok(format!("offer:{}", self.log.peer))
    }

    async fn create_answer(&self) -> Result<String> {
        Ok(format!("answer:{}", self.log.peer))
    }

    async fn set_local_description(&self, description: &str) -> Result<()> {
        self.log
            .local_descriptions
            .lock()
            .unwrap()
            .push(description.to_string());
        Ok(())
    }

    async fn set_remote_description(&self, description: &str) -> Result<()> {
        if !(description.starts_with("offer:") || description.starts_with("answer:")) {
            return Err(VoiceError::Transport(format!(
                "malformed description: {description}"
            )));
        }
        self.log
            .remote_descriptions
            .lock()
            .unwrap()
            .push(description.to_string());
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: &str) -> Result<()> {
        if candidate == "bad" {
            return Err(VoiceError::Transport("malformed candidate".to_string()));
        }
        self.log
            .candidates
            .lock()
            .unwrap()
            .push(candidate.to_string());
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.log.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Audio graph that records every parameter change per route
#[derive(Clone, Default)]
pub struct FakeAudioGraph {
    inner: Arc<GraphInner>,
}

#[derive(Default)]
struct GraphInner {
    routes: Mutex<Vec<Arc<RouteLog>>>,
}

/// Parameter log of one fake audio route
pub struct RouteLog {
    pub identity: Identity,
    pub user_gains: Mutex<Vec<f32>>,
    pub proximity_ramps: Mutex<Vec<(f32, Duration)>>,
    pub listener_updates: Mutex<Vec<([f64; 3], [f64; 2])>>,
    pub source_updates: Mutex<Vec<([f64; 3], [f64; 2])>>,
    pub disconnected: AtomicBool,
}

impl RouteLog {
    pub fn last_proximity_gain(&self) -> Option<f32> {
        self.proximity_ramps.lock().unwrap().last().map(|(g, _)| *g)
    }
}

impl FakeAudioGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent route built for `identity`
    pub fn route_for(&self, identity: Identity) -> Option<Arc<RouteLog>> {
        self.inner
            .routes
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|r| r.identity == identity)
            .cloned()
    }

    pub fn route_count(&self) -> usize {
        self.inner.routes.lock().unwrap().len()
    }
}

impl AudioGraph for FakeAudioGraph {
    fn build_route(
        &self,
        identity: Identity,
        _stream: &StreamHandle,
    ) -> Result<Box<dyn AudioRouteControls>> {
        let log = Arc::new(RouteLog {
            identity,
            user_gains: Mutex::new(Vec::new()),
            proximity_ramps: Mutex::new(Vec::new()),
            listener_updates: Mutex::new(Vec::new()),
            source_updates: Mutex::new(Vec::new()),
            disconnected: AtomicBool::new(false),
        });
        self.inner.routes.lock().unwrap().push(Arc::clone(&log));
        Ok(Box::new(FakeRoute { log }))
    }
}

struct FakeRoute {
    log: Arc<RouteLog>,
}

impl AudioRouteControls for FakeRoute {
    fn set_user_gain(&mut self, gain: f32) {
        self.log.user_gains.lock().unwrap().push(gain);
    }

    fn ramp_proximity_gain(&mut self, gain: f32, time_constant: Duration) {
        self.log
            .proximity_ramps
            .lock()
            .unwrap()
            .push((gain, time_constant));
    }

    fn set_listener(&mut self, position: [f64; 3], forward: [f64; 2]) {
        self.log
            .listener_updates
            .lock()
            .unwrap()
            .push((position, forward));
    }

    fn set_source(&mut self, position: [f64; 3], forward: [f64; 2]) {
        self.log
            .source_updates
            .lock()
            .unwrap()
            .push((position, forward));
    }

    fn disconnect(&mut self) {
        self.log.disconnected.store(true, Ordering::SeqCst);
    }
}

/// One controller with its fakes and channel endpoints
pub struct Rig {
    pub controller: ProximityVoiceController,
    pub media: Arc<FakeMedia>,
    pub graph: FakeAudioGraph,
    pub outbound: mpsc::UnboundedReceiver<SignalingEnvelope>,
    pub transport_events: mpsc::UnboundedReceiver<(Identity, TransportEvent)>,
    pub events: broadcast::Receiver<VoiceEvent>,
}

impl Rig {
    pub fn new(self_id: i64) -> Self {
        Self::with_config(self_id, VoiceConfig::default())
    }

    pub fn with_config(self_id: i64, config: VoiceConfig) -> Self {
        let media = FakeMedia::new();
        let graph = FakeAudioGraph::new();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (ev_tx, ev_rx) = mpsc::unbounded_channel();

        let controller = ProximityVoiceController::new(
            Identity(self_id),
            config,
            media.clone(),
            Box::new(graph.clone()),
            out_tx,
            ev_tx,
        )
        .unwrap();
        let events = controller.subscribe();

        Self {
            controller,
            media,
            graph,
            outbound: out_rx,
            transport_events: ev_rx,
            events,
        }
    }

    pub fn drain_outbound(&mut self) -> Vec<SignalingEnvelope> {
        let mut envelopes = Vec::new();
        while let Ok(envelope) = self.outbound.try_recv() {
            envelopes.push(envelope);
        }
        envelopes
    }

    pub fn drain_events(&mut self) -> Vec<VoiceEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    /// Feed queued transport completions back into the controller
    pub async fn pump_transport_events(&mut self) {
        while let Ok((peer, event)) = self.transport_events.try_recv() {
            self.controller.handle_transport_event(peer, event).await;
        }
    }
}

pub fn pos(x: f64, y: f64) -> Position {
    Position::new(x, y, 0.0, 0.0)
}

pub fn snapshot(self_id: i64, self_pos: Position, others: &[(i64, Position)]) -> NearbySnapshot {
    NearbySnapshot {
        player: Player {
            guid: Identity(self_id),
            position: self_pos,
        },
        nearby_players: others
            .iter()
            .map(|(id, p)| Player {
                guid: Identity(*id),
                position: *p,
            })
            .collect(),
    }
}

pub fn count_disconnects(events: &[VoiceEvent], id: i64) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, VoiceEvent::PeerDisconnected { identity } if *identity == Identity(id)))
        .count()
}

pub fn count_stream_ready(events: &[VoiceEvent], id: i64) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, VoiceEvent::RemoteStreamReady { identity, .. } if *identity == Identity(id)))
        .count()
}

pub fn count_link_failed(events: &[VoiceEvent], id: i64) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, VoiceEvent::LinkFailed { identity, .. } if *identity == Identity(id)))
        .count()
}

/// Cross-deliver queued outbound envelopes between two rigs until both
/// sides go quiet
pub async fn exchange(a: &mut Rig, b: &mut Rig) {
    loop {
        let from_a = a.drain_outbound();
        let from_b = b.drain_outbound();
        if from_a.is_empty() && from_b.is_empty() {
            break;
        }
        for envelope in from_a {
            if envelope.to == b.controller.self_id() {
                b.controller.handle_envelope(envelope).await;
            }
        }
        for envelope in from_b {
            if envelope.to == a.controller.self_id() {
                a.controller.handle_envelope(envelope).await;
            }
        }
    }
}
