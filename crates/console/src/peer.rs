use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Context;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use turret_protocol::{IceConfig, SessionDescription};
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::track::track_remote::TrackRemote;

use crate::media::{MediaPeer, PeerFactory};

/// Monotonic peer counter, for telling peers apart in logs.
static PEER_GENERATION: AtomicU64 = AtomicU64::new(0);

/// Translate the ICE section of the config into webrtc-rs servers.
pub fn ice_servers(ice: &IceConfig) -> Vec<RTCIceServer> {
    let mut servers = Vec::new();
    if !ice.stun_urls.is_empty() {
        servers.push(RTCIceServer {
            urls: ice.stun_urls.clone(),
            ..Default::default()
        });
    }
    if !ice.turn_urls.is_empty() {
        servers.push(RTCIceServer {
            urls: ice.turn_urls.clone(),
            username: ice.turn_username.clone().unwrap_or_default(),
            credential: ice.turn_credential.clone().unwrap_or_default(),
        });
    }
    servers
}

/// Builds a fresh receive-only peer for every negotiation attempt.
pub struct WebRtcPeerFactory {
    ice_servers: Vec<RTCIceServer>,
}

impl WebRtcPeerFactory {
    pub fn new(ice: &IceConfig) -> Self {
        Self {
            ice_servers: ice_servers(ice),
        }
    }
}

impl PeerFactory for WebRtcPeerFactory {
    type Peer = WebRtcPeer;

    async fn create(&mut self) -> anyhow::Result<WebRtcPeer> {
        WebRtcPeer::new(self.ice_servers.clone())
            .await
            .context("Failed to create WebRTC peer")
    }
}

pub struct WebRtcPeer {
    peer_connection: Arc<RTCPeerConnection>,
    /// Completed video frames received (RTP marker bits)
    frames: Arc<AtomicU64>,
    first_frame: watch::Receiver<bool>,
    generation: u64,
}

impl WebRtcPeer {
    async fn new(ice_servers: Vec<RTCIceServer>) -> anyhow::Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let config = RTCConfiguration {
            ice_servers,
            ..Default::default()
        };
        let peer_connection = Arc::new(api.new_peer_connection(config).await?);

        // One inbound video stream, nothing sent back
        peer_connection
            .add_transceiver_from_kind(
                RTPCodecType::Video,
                Some(RTCRtpTransceiverInit {
                    direction: RTCRtpTransceiverDirection::Recvonly,
                    send_encodings: vec![],
                }),
            )
            .await
            .context("Failed to add video transceiver")?;

        let generation = PEER_GENERATION.fetch_add(1, Ordering::Relaxed) + 1;
        let frames = Arc::new(AtomicU64::new(0));
        let (first_tx, first_rx) = watch::channel(false);
        let first_tx = Arc::new(first_tx);

        let frame_counter = Arc::clone(&frames);
        peer_connection.on_track(Box::new(move |track: Arc<TrackRemote>, _receiver, _transceiver| {
            info!(
                generation,
                codec = %track.codec().capability.mime_type,
                "Remote video track started"
            );
            let frames = Arc::clone(&frame_counter);
            let first_tx = Arc::clone(&first_tx);
            Box::pin(async move {
                tokio::spawn(read_video(track, frames, first_tx, generation));
            })
        }));

        peer_connection.on_peer_connection_state_change(Box::new(move |state| {
            match state {
                RTCPeerConnectionState::Failed | RTCPeerConnectionState::Disconnected => {
                    warn!(generation, ?state, "Video peer connection degraded");
                }
                _ => {
                    info!(generation, ?state, "Video peer connection state changed");
                }
            }
            Box::pin(async {})
        }));

        info!(generation, "WebRTC peer connection created");
        Ok(Self {
            peer_connection,
            frames,
            first_frame: first_rx,
            generation,
        })
    }
}

/// Count frames until the track ends (peer closed or stopped).
async fn read_video(
    track: Arc<TrackRemote>,
    frames: Arc<AtomicU64>,
    first_frame: Arc<watch::Sender<bool>>,
    generation: u64,
) {
    loop {
        match track.read_rtp().await {
            Ok((packet, _attributes)) => {
                if packet.header.marker && frames.fetch_add(1, Ordering::Relaxed) == 0 {
                    first_frame.send_replace(true);
                }
            }
            Err(e) => {
                debug!(generation, "Video track reader stopped: {e}");
                break;
            }
        }
    }
}

impl MediaPeer for WebRtcPeer {
    async fn create_offer(&mut self) -> anyhow::Result<SessionDescription> {
        let offer = self
            .peer_connection
            .create_offer(None)
            .await
            .context("Failed to create offer")?;

        // The offer travels in one HTTP request, so wait for all candidates
        let mut gathered = self.peer_connection.gathering_complete_promise().await;
        self.peer_connection
            .set_local_description(offer)
            .await
            .context("Failed to set local description")?;
        let _ = gathered.recv().await;

        let local = self
            .peer_connection
            .local_description()
            .await
            .context("No local description after ICE gathering")?;
        Ok(SessionDescription::offer(local.sdp))
    }

    async fn apply_answer(&mut self, answer: SessionDescription) -> anyhow::Result<()> {
        let answer =
            RTCSessionDescription::answer(answer.sdp).context("Failed to parse SDP answer")?;
        self.peer_connection
            .set_remote_description(answer)
            .await
            .context("Failed to set remote description")?;
        Ok(())
    }

    async fn first_frame(&mut self) -> anyhow::Result<()> {
        self.first_frame
            .wait_for(|seen| *seen)
            .await
            .context("Peer closed before the first video frame")?;
        Ok(())
    }

    fn playback_position(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    fn is_ready(&self) -> bool {
        self.peer_connection.connection_state() == RTCPeerConnectionState::Connected
    }

    async fn stop_tracks(&mut self) {
        for transceiver in self.peer_connection.get_transceivers().await {
            if let Err(e) = transceiver.stop().await {
                debug!(generation = self.generation, "Failed to stop transceiver: {e}");
            }
        }
    }

    async fn close(self) {
        if let Err(e) = self.peer_connection.close().await {
            warn!(generation = self.generation, "Failed to close peer connection: {e}");
        } else {
            info!(generation = self.generation, "Peer connection closed");
        }
    }
}
