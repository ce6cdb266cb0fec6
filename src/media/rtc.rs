//! `webrtc`-backed media provider
//!
//! Production implementation of [`MediaProvider`]/[`PeerTransport`]. ICE
//! gathering, DTLS and SRTP live inside the `webrtc` crate; this module
//! only adapts its surface to the narrow trait the voice core drives.
//!
//! The local stream is an Opus `TrackLocalStaticSample`. Feeding it with
//! encoded microphone audio is the embedder's job: downcast the
//! [`StreamHandle`] and call `write_sample` with 20 ms Opus packets.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS};
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use crate::error::{Result, VoiceError};
use crate::media::{
    MediaProvider, PeerTransport, StreamHandle, TransportEvent, TransportEventSender,
    TransportState,
};
use crate::presence::Identity;

/// Opus clock rate (RFC 7587)
const OPUS_CLOCK_RATE: u32 = 48000;
/// Opus channel count
const OPUS_CHANNELS: u16 = 2;

/// Media provider backed by the `webrtc` crate
pub struct RtcMediaProvider;

impl RtcMediaProvider {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RtcMediaProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaProvider for RtcMediaProvider {
    async fn create_local_stream(&self) -> Result<StreamHandle> {
        let codec = RTCRtpCodecCapability {
            mime_type: MIME_TYPE_OPUS.to_string(),
            clock_rate: OPUS_CLOCK_RATE,
            channels: OPUS_CHANNELS,
            sdp_fmtp_line: "minptime=10;useinbandfec=1".to_string(),
            rtcp_feedback: vec![],
        };

        let track = Arc::new(TrackLocalStaticSample::new(
            codec,
            "audio".to_string(),
            "proximity-voice".to_string(),
        ));

        Ok(StreamHandle::from_arc(track))
    }

    async fn create_transport(
        &self,
        peer: Identity,
        local_stream: &StreamHandle,
        stun_servers: &[String],
        events: TransportEventSender,
    ) -> Result<Box<dyn PeerTransport>> {
        // Media engine + interceptors per connection
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| VoiceError::Transport(format!("failed to register codecs: {e}")))?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)
            .map_err(|e| VoiceError::Transport(format!("failed to register interceptors: {e}")))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let ice_servers = stun_servers
            .iter()
            .map(|url| RTCIceServer {
                urls: vec![url.clone()],
                ..Default::default()
            })
            .collect();

        let rtc_config = RTCConfiguration {
            ice_servers,
            ..Default::default()
        };

        let pc = api.new_peer_connection(rtc_config).await.map_err(|e| {
            VoiceError::Transport(format!("failed to create peer connection: {e}"))
        })?;
        let pc = Arc::new(pc);

        // Attach the shared local Opus track to this link
        let track = local_stream
            .downcast::<TrackLocalStaticSample>()
            .ok_or_else(|| {
                VoiceError::MediaUnavailable("local stream is not an Opus track".to_string())
            })?;
        pc.add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| VoiceError::Transport(format!("failed to add local track: {e}")))?;

        // Trickle ICE: forward discovered candidates as serialized inits
        let tx = events.clone();
        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let tx = tx.clone();
            Box::pin(async move {
                let Some(c) = candidate else { return };
                match c.to_json() {
                    Ok(init) => match serde_json::to_string(&init) {
                        Ok(data) => {
                            debug!(peer = %peer, "local ICE candidate discovered");
                            let _ = tx.send((peer, TransportEvent::LocalCandidate(data)));
                        }
                        Err(e) => warn!(peer = %peer, error = %e, "failed to encode ICE candidate"),
                    },
                    Err(e) => warn!(peer = %peer, error = %e, "failed to serialize ICE candidate"),
                }
            })
        }));

        let tx = events.clone();
        pc.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let tx = tx.clone();
                Box::pin(async move {
                    debug!(peer = %peer, "remote track received");
                    let _ = tx.send((peer, TransportEvent::RemoteStream(StreamHandle::from_arc(track))));
                })
            },
        ));

        let tx = events;
        pc.on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
            let tx = tx.clone();
            Box::pin(async move {
                let state = match s {
                    RTCPeerConnectionState::Connecting => TransportState::Connecting,
                    RTCPeerConnectionState::Connected => TransportState::Connected,
                    RTCPeerConnectionState::Disconnected => TransportState::Disconnected,
                    RTCPeerConnectionState::Failed => TransportState::Failed,
                    RTCPeerConnectionState::Closed => TransportState::Closed,
                    _ => return,
                };
                info!(peer = %peer, state = %state, "peer transport state");
                let _ = tx.send((peer, TransportEvent::StateChange(state)));
            })
        }));

        Ok(Box::new(RtcPeerTransport { pc }))
    }
}

/// One `RTCPeerConnection` behind the transport trait
struct RtcPeerTransport {
    pc: Arc<RTCPeerConnection>,
}

#[async_trait]
impl PeerTransport for RtcPeerTransport {
    async fn create_offer(&self) -> Result<String> {
        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(|e| VoiceError::Transport(format!("failed to create offer: {e}")))?;
        Ok(serde_json::to_string(&offer)?)
    }

    async fn create_answer(&self) -> Result<String> {
        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| VoiceError::Transport(format!("failed to create answer: {e}")))?;
        Ok(serde_json::to_string(&answer)?)
    }

    async fn set_local_description(&self, description: &str) -> Result<()> {
        let desc: RTCSessionDescription = serde_json::from_str(description)?;
        self.pc
            .set_local_description(desc)
            .await
            .map_err(|e| VoiceError::Transport(format!("failed to set local description: {e}")))
    }

    async fn set_remote_description(&self, description: &str) -> Result<()> {
        let desc: RTCSessionDescription = serde_json::from_str(description)?;
        self.pc
            .set_remote_description(desc)
            .await
            .map_err(|e| VoiceError::Transport(format!("failed to set remote description: {e}")))
    }

    async fn add_ice_candidate(&self, candidate: &str) -> Result<()> {
        let init: RTCIceCandidateInit = serde_json::from_str(candidate)?;
        self.pc
            .add_ice_candidate(init)
            .await
            .map_err(|e| VoiceError::Transport(format!("failed to add ICE candidate: {e}")))
    }

    async fn close(&self) -> Result<()> {
        self.pc
            .close()
            .await
            .map_err(|e| VoiceError::Transport(format!("failed to close peer connection: {e}")))
    }
}
