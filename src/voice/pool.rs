//! Connection pool: the record map and its churn reconciliation
//!
//! Owns every `PeerLink`, keyed by remote identity — at most one record
//! per identity, never more than `max_peers` records total. The map is
//! mutated only here; other components refer to peers by identity key.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::VoiceConfig;
use crate::error::{Result, VoiceError};
use crate::media::{MediaProvider, StreamHandle, TransportEventSender};
use crate::presence::{Identity, NearbySnapshot};

use super::link::{LinkRole, LinkState, PeerLink};
use super::signaling::SignalingEnvelope;

/// Outcome of one reconcile pass
#[derive(Debug, Default)]
pub struct ReconcileReport {
    /// Peers a fresh caller-role link was opened for
    pub opened: Vec<Identity>,
    /// Peers whose record was closed and removed
    pub closed: Vec<Identity>,
    /// Peers whose open attempt failed; retried naturally on the next
    /// reconcile if still nearby
    pub failed: Vec<(Identity, VoiceError)>,
}

/// Set of active peer links, reconciled against nearby-player snapshots
pub struct ConnectionPool {
    self_id: Identity,
    config: Arc<VoiceConfig>,
    media: Arc<dyn MediaProvider>,
    /// Acquired lazily on first use; a failed acquisition is retried on
    /// the next open attempt
    local_stream: Option<StreamHandle>,
    links: HashMap<Identity, PeerLink>,
    outbound: mpsc::UnboundedSender<SignalingEnvelope>,
    transport_events: TransportEventSender,
}

impl ConnectionPool {
    pub fn new(
        self_id: Identity,
        config: Arc<VoiceConfig>,
        media: Arc<dyn MediaProvider>,
        outbound: mpsc::UnboundedSender<SignalingEnvelope>,
        transport_events: TransportEventSender,
    ) -> Self {
        Self {
            self_id,
            config,
            media,
            local_stream: None,
            links: HashMap::new(),
            outbound,
            transport_events,
        }
    }

    /// Reconcile the record set against a full-replacement snapshot.
    ///
    /// Within `connect_distance`: open a caller-role link (ceiling
    /// permitting; overflow is dropped without queueing). Beyond
    /// `disconnect_distance`, absent from the snapshot, or stuck
    /// negotiating past the timeout: close. The band between the two
    /// thresholds is hysteresis — existing links ride through it.
    pub async fn reconcile(&mut self, snapshot: &NearbySnapshot) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let self_pos = snapshot.player.position;
        let connect_sq = self.config.connect_distance * self.config.connect_distance;
        let disconnect_sq = self.config.disconnect_distance * self.config.disconnect_distance;

        for peer in &snapshot.nearby_players {
            if peer.guid == self.self_id || self.links.contains_key(&peer.guid) {
                continue;
            }
            if self_pos.planar_distance_sq(&peer.position) > connect_sq {
                continue;
            }
            if self.links.len() >= self.config.max_peers {
                debug!(
                    peer = %peer.guid,
                    ceiling = self.config.max_peers,
                    "peer ceiling reached, dropping connection request"
                );
                continue;
            }
            match self.open_caller(peer.guid).await {
                Ok(()) => report.opened.push(peer.guid),
                Err(e) => {
                    warn!(peer = %peer.guid, error = %e, "failed to open voice link");
                    report.failed.push((peer.guid, e));
                }
            }
        }

        let timeout = self.config.negotiation_timeout();
        let mut to_close = Vec::new();
        for (id, link) in &self.links {
            match snapshot.nearby_players.iter().find(|p| p.guid == *id) {
                None => to_close.push(*id),
                Some(p) if self_pos.planar_distance_sq(&p.position) > disconnect_sq => {
                    to_close.push(*id)
                }
                Some(_) if link.negotiation_expired(timeout) => {
                    debug!(peer = %id, "negotiation timed out, reclaiming link");
                    to_close.push(*id);
                }
                Some(_) => {}
            }
        }
        for id in to_close {
            if self.close(id).await {
                report.closed.push(id);
            }
        }

        report
    }

    /// Route an inbound offer to its link, creating an answering-role
    /// link for an unknown sender (ceiling permitting)
    pub async fn accept_offer(&mut self, envelope: &SignalingEnvelope) -> Result<()> {
        if !self.links.contains_key(&envelope.from) {
            if self.links.len() >= self.config.max_peers {
                debug!(peer = %envelope.from, "peer ceiling reached, dropping inbound offer");
                return Ok(());
            }
            let local = self.local_stream().await?;
            let link = PeerLink::open(
                self.self_id,
                envelope.from,
                LinkRole::Callee,
                self.config.clone(),
                self.media.clone(),
                local,
                self.outbound.clone(),
                self.transport_events.clone(),
            )
            .await?;
            self.links.insert(envelope.from, link);
        }

        let result = match self.links.get_mut(&envelope.from) {
            Some(link) => link.accept_offer(&envelope.data).await,
            None => return Ok(()),
        };
        self.reap_on_error(envelope.from, result).await
    }

    /// Route an inbound answer to its link
    pub async fn accept_answer(&mut self, envelope: &SignalingEnvelope) -> Result<()> {
        let result = match self.links.get_mut(&envelope.from) {
            Some(link) => link.accept_answer(&envelope.data).await,
            None => {
                debug!(peer = %envelope.from, "answer for unknown peer, dropping");
                return Ok(());
            }
        };
        self.reap_on_error(envelope.from, result).await
    }

    /// Route an inbound ICE candidate to its link
    pub async fn add_candidate(&mut self, envelope: &SignalingEnvelope) -> Result<()> {
        let result = match self.links.get_mut(&envelope.from) {
            Some(link) => link.add_candidate(&envelope.data).await,
            None => {
                debug!(peer = %envelope.from, "candidate for unknown peer, dropping");
                return Ok(());
            }
        };
        self.reap_on_error(envelope.from, result).await
    }

    /// Record a remote stream delivered by the transport
    pub fn note_remote_stream(&mut self, peer: Identity, stream: StreamHandle) {
        if let Some(link) = self.links.get_mut(&peer) {
            link.note_remote_stream(stream);
        }
    }

    /// One-shot (identity, stream) announcement for a link that reached
    /// `Connected` with a live remote stream
    pub fn take_ready_stream(&mut self, peer: Identity) -> Option<StreamHandle> {
        self.links.get_mut(&peer)?.take_ready_stream()
    }

    /// Close and remove one record. Returns whether it existed.
    pub async fn close(&mut self, peer: Identity) -> bool {
        match self.links.remove(&peer) {
            Some(mut link) => {
                link.close().await;
                info!(peer = %peer, "voice link closed");
                true
            }
            None => false,
        }
    }

    /// Close every record (session teardown); returns the removed peers
    pub async fn close_all(&mut self) -> Vec<Identity> {
        let peers: Vec<Identity> = self.links.keys().copied().collect();
        for peer in &peers {
            self.close(*peer).await;
        }
        peers
    }

    pub fn contains(&self, peer: Identity) -> bool {
        self.links.contains_key(&peer)
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn link_state(&self, peer: Identity) -> Option<LinkState> {
        self.links.get(&peer).map(|l| l.state())
    }

    pub fn link_role(&self, peer: Identity) -> Option<LinkRole> {
        self.links.get(&peer).map(|l| l.role())
    }

    pub fn peers(&self) -> impl Iterator<Item = Identity> + '_ {
        self.links.keys().copied()
    }

    async fn open_caller(&mut self, peer: Identity) -> Result<()> {
        let local = self.local_stream().await?;
        let mut link = PeerLink::open(
            self.self_id,
            peer,
            LinkRole::Caller,
            self.config.clone(),
            self.media.clone(),
            local,
            self.outbound.clone(),
            self.transport_events.clone(),
        )
        .await?;

        if let Err(e) = link.initiate_offer().await {
            link.close().await;
            return Err(e);
        }

        info!(peer = %peer, "voice link offering");
        self.links.insert(peer, link);
        Ok(())
    }

    async fn local_stream(&mut self) -> Result<StreamHandle> {
        if let Some(stream) = &self.local_stream {
            return Ok(stream.clone());
        }
        let stream = self
            .media
            .create_local_stream()
            .await
            .map_err(|e| match e {
                VoiceError::MediaUnavailable(_) => e,
                other => VoiceError::MediaUnavailable(other.to_string()),
            })?;
        self.local_stream = Some(stream.clone());
        Ok(stream)
    }

    /// Close the failed link and propagate the error
    async fn reap_on_error(&mut self, peer: Identity, result: Result<()>) -> Result<()> {
        if result.is_err() {
            self.close(peer).await;
        }
        result
    }
}
