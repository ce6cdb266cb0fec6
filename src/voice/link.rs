//! Per-peer negotiation state machine
//!
//! One `PeerLink` wraps one peer transport and walks it through the
//! offer/answer/candidate exchange:
//!
//! ```text
//! caller:  Idle -> Offering -> AwaitingAnswer -> Connected
//! callee:  Idle -> ReceivedOffer -> Answering -> Connected
//! ```
//!
//! `Closed` is absorbing. Operations re-check the state after every await
//! on the platform boundary, so a completion landing after `close()` is a
//! no-op; that entry-state discipline, not locking, is what makes
//! interleaved events safe.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::VoiceConfig;
use crate::error::{Result, VoiceError};
use crate::media::{MediaProvider, PeerTransport, StreamHandle, TransportEventSender};
use crate::presence::Identity;

use super::signaling::SignalingEnvelope;

/// Negotiation state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Idle,
    Offering,
    AwaitingAnswer,
    ReceivedOffer,
    Answering,
    Connected,
    Closed,
}

impl LinkState {
    /// States with a bounded dwell time; a link stuck here past the
    /// configured timeout is reclaimed at reconcile
    pub fn is_negotiating(&self) -> bool {
        matches!(
            self,
            LinkState::Offering
                | LinkState::AwaitingAnswer
                | LinkState::ReceivedOffer
                | LinkState::Answering
        )
    }
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkState::Idle => write!(f, "idle"),
            LinkState::Offering => write!(f, "offering"),
            LinkState::AwaitingAnswer => write!(f, "awaiting-answer"),
            LinkState::ReceivedOffer => write!(f, "received-offer"),
            LinkState::Answering => write!(f, "answering"),
            LinkState::Connected => write!(f, "connected"),
            LinkState::Closed => write!(f, "closed"),
        }
    }
}

/// Which side initiated the link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRole {
    Caller,
    Callee,
}

/// One peer transport plus its negotiation state
pub struct PeerLink {
    self_id: Identity,
    peer: Identity,
    role: LinkRole,
    state: LinkState,
    state_since: Instant,
    config: Arc<VoiceConfig>,
    media: Arc<dyn MediaProvider>,
    local_stream: StreamHandle,
    transport: Box<dyn PeerTransport>,
    events: TransportEventSender,
    outbound: mpsc::UnboundedSender<SignalingEnvelope>,
    remote_description_set: bool,
    /// Candidates received before the remote description, flushed in
    /// arrival order once it is set
    pending_candidates: Vec<String>,
    remote_stream: Option<StreamHandle>,
    announced: bool,
}

impl PeerLink {
    /// Create the link and its transport in `Idle`
    #[allow(clippy::too_many_arguments)]
    pub async fn open(
        self_id: Identity,
        peer: Identity,
        role: LinkRole,
        config: Arc<VoiceConfig>,
        media: Arc<dyn MediaProvider>,
        local_stream: StreamHandle,
        outbound: mpsc::UnboundedSender<SignalingEnvelope>,
        events: TransportEventSender,
    ) -> Result<Self> {
        let transport = media
            .create_transport(peer, &local_stream, &config.stun_servers, events.clone())
            .await?;

        Ok(Self {
            self_id,
            peer,
            role,
            state: LinkState::Idle,
            state_since: Instant::now(),
            config,
            media,
            local_stream,
            transport,
            events,
            outbound,
            remote_description_set: false,
            pending_candidates: Vec::new(),
            remote_stream: None,
            announced: false,
        })
    }

    pub fn peer(&self) -> Identity {
        self.peer
    }

    pub fn role(&self) -> LinkRole {
        self.role
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Whether the link has dwelt in a negotiating state past `timeout`
    pub fn negotiation_expired(&self, timeout: Duration) -> bool {
        self.state.is_negotiating() && self.state_since.elapsed() > timeout
    }

    /// Create and send the local offer. Valid only from `Idle`.
    pub async fn initiate_offer(&mut self) -> Result<()> {
        if self.state != LinkState::Idle {
            return Err(self.reject(format!("offer initiation from state {}", self.state)));
        }

        self.set_state(LinkState::Offering);
        let offer = self.transport.create_offer().await?;
        if self.state == LinkState::Closed {
            return Ok(());
        }

        self.transport.set_local_description(&offer).await?;
        if self.state == LinkState::Closed {
            return Ok(());
        }

        self.set_state(LinkState::AwaitingAnswer);
        self.send(SignalingEnvelope::offer(self.self_id, self.peer, offer));
        Ok(())
    }

    /// Apply a remote offer and send back an answer.
    ///
    /// Valid from `Idle`. From `Offering`/`AwaitingAnswer` only as glare
    /// tie-break: the numerically greater identity wins the race. When the
    /// remote wins, the local offer is discarded (transport rebuilt) and
    /// the link proceeds on the callee path; when the local offer wins,
    /// the inbound offer is ignored and the remote is expected to answer
    /// ours.
    pub async fn accept_offer(&mut self, data: &str) -> Result<()> {
        match self.state {
            LinkState::Idle => {}
            LinkState::Offering | LinkState::AwaitingAnswer => {
                if self.peer > self.self_id {
                    debug!(peer = %self.peer, "glare: remote wins, discarding local offer");
                    self.restart_as_callee().await?;
                } else {
                    debug!(peer = %self.peer, "glare: local offer wins, ignoring remote offer");
                    return Ok(());
                }
            }
            other => {
                return Err(self.reject(format!("offer received in state {other}")));
            }
        }

        self.set_state(LinkState::ReceivedOffer);
        self.transport.set_remote_description(data).await?;
        if self.state == LinkState::Closed {
            return Ok(());
        }
        self.remote_description_set = true;
        self.flush_candidates().await;
        if self.state == LinkState::Closed {
            return Ok(());
        }

        self.set_state(LinkState::Answering);
        let answer = self.transport.create_answer().await?;
        if self.state == LinkState::Closed {
            return Ok(());
        }
        self.transport.set_local_description(&answer).await?;
        if self.state == LinkState::Closed {
            return Ok(());
        }

        self.set_state(LinkState::Connected);
        self.send(SignalingEnvelope::answer(self.self_id, self.peer, answer));
        Ok(())
    }

    /// Apply a remote answer. Valid only from `AwaitingAnswer`.
    pub async fn accept_answer(&mut self, data: &str) -> Result<()> {
        if self.state != LinkState::AwaitingAnswer {
            return Err(self.reject(format!("answer received in state {}", self.state)));
        }

        self.transport.set_remote_description(data).await?;
        if self.state == LinkState::Closed {
            return Ok(());
        }
        self.remote_description_set = true;
        self.flush_candidates().await;
        if self.state == LinkState::Closed {
            return Ok(());
        }

        self.set_state(LinkState::Connected);
        Ok(())
    }

    /// Apply or buffer a remote ICE candidate.
    ///
    /// Candidates arriving before the remote description are buffered and
    /// flushed in arrival order once it lands. A transport-level failure
    /// on a single candidate is contained; it does not close the link.
    pub async fn add_candidate(&mut self, data: &str) -> Result<()> {
        if self.state == LinkState::Closed {
            return Err(self.reject("candidate on closed link"));
        }

        if !self.remote_description_set {
            self.pending_candidates.push(data.to_string());
            return Ok(());
        }

        if let Err(e) = self.transport.add_ice_candidate(data).await {
            warn!(peer = %self.peer, error = %e, "dropping malformed ICE candidate");
        }
        Ok(())
    }

    async fn flush_candidates(&mut self) {
        for candidate in std::mem::take(&mut self.pending_candidates) {
            if self.state == LinkState::Closed {
                return;
            }
            if let Err(e) = self.transport.add_ice_candidate(&candidate).await {
                warn!(peer = %self.peer, error = %e, "dropping buffered ICE candidate");
            }
        }
    }

    /// Record the remote stream once the transport delivers it
    pub fn note_remote_stream(&mut self, stream: StreamHandle) {
        if self.state != LinkState::Closed {
            self.remote_stream = Some(stream);
        }
    }

    /// One-shot announcement: yields the remote stream the first time the
    /// link is `Connected` with a stream available
    pub fn take_ready_stream(&mut self) -> Option<StreamHandle> {
        if self.state == LinkState::Connected && !self.announced {
            if let Some(stream) = &self.remote_stream {
                self.announced = true;
                return Some(stream.clone());
            }
        }
        None
    }

    /// Close the link and its transport. Idempotent, absorbing.
    pub async fn close(&mut self) {
        if self.state == LinkState::Closed {
            return;
        }
        self.set_state(LinkState::Closed);
        if let Err(e) = self.transport.close().await {
            debug!(peer = %self.peer, error = %e, "transport close reported an error");
        }
    }

    /// Discard the in-flight local offer and rebuild the transport for
    /// the callee path (remote won the glare race)
    async fn restart_as_callee(&mut self) -> Result<()> {
        if let Err(e) = self.transport.close().await {
            debug!(peer = %self.peer, error = %e, "transport close reported an error");
        }
        self.transport = self
            .media
            .create_transport(
                self.peer,
                &self.local_stream,
                &self.config.stun_servers,
                self.events.clone(),
            )
            .await?;
        self.role = LinkRole::Callee;
        self.remote_description_set = false;
        // Buffered candidates belong to the discarded negotiation.
        self.pending_candidates.clear();
        self.set_state(LinkState::Idle);
        Ok(())
    }

    fn set_state(&mut self, next: LinkState) {
        debug!(peer = %self.peer, from = %self.state, to = %next, "link state change");
        self.state = next;
        self.state_since = Instant::now();
    }

    fn send(&self, envelope: SignalingEnvelope) {
        // Fire-and-forget; a torn-down signaling channel is not this
        // link's failure to report.
        let _ = self.outbound.send(envelope);
    }

    fn reject(&self, reason: impl Into<String>) -> VoiceError {
        VoiceError::NegotiationRejected {
            peer: self.peer,
            reason: reason.into(),
        }
    }
}
