//! RTC provider adapter seam
//!
//! The transport, codecs and signaling belong to an external real-time
//! communication provider. This module only describes the capability set the
//! orchestrator needs from it: client creation, join/leave, publish/subscribe,
//! local track factories, and the three participant lifecycle events.
//!
//! All provider calls are asynchronous and may suspend. Track handles are
//! synchronous: enabling, playing and closing a track never waits on the network.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{DeviceError, RtcResult};

/// Opaque identity of one party within a channel
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ParticipantId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<u32> for ParticipantId {
    fn from(id: u32) -> Self {
        Self(id.to_string())
    }
}

/// Caller-owned render target (a preview pane or a remote video tile)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SurfaceId(String);

impl SurfaceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SurfaceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SurfaceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Kind of media carried by a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Audio => write!(f, "audio"),
            MediaKind::Video => write!(f, "video"),
        }
    }
}

/// Channel profile requested from the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelMode {
    /// Every participant may publish (two-party consultations)
    #[default]
    Rtc,
    /// Broadcaster/audience split
    Live,
}

/// Video codec requested from the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    #[default]
    Vp8,
    Vp9,
    H264,
    Av1,
}

/// Configuration handed to [`RtcProvider::create_client`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RtcClientConfig {
    pub mode: ChannelMode,
    pub codec: VideoCodec,
}

/// Participant lifecycle event emitted by the provider
///
/// Events arrive independently of join/leave and may interleave with any
/// suspended orchestrator operation.
#[derive(Debug, Clone)]
pub enum RtcEvent {
    /// A remote participant started publishing a track
    UserPublished {
        participant: ParticipantId,
        kind: MediaKind,
        track: Arc<dyn RemoteTrack>,
    },
    /// A remote participant stopped publishing a track
    UserUnpublished {
        participant: ParticipantId,
        kind: MediaKind,
    },
    /// A remote participant left the channel
    UserLeft { participant: ParticipantId },
}

impl RtcEvent {
    pub fn participant(&self) -> &ParticipantId {
        match self {
            RtcEvent::UserPublished { participant, .. }
            | RtcEvent::UserUnpublished { participant, .. }
            | RtcEvent::UserLeft { participant } => participant,
        }
    }
}

/// Where a provider client delivers its [`RtcEvent`]s
pub type RtcEventSink = mpsc::UnboundedSender<RtcEvent>;

/// Entry point of the RTC provider
#[async_trait]
pub trait RtcProvider: Send + Sync {
    /// Create a fresh client; one client is never shared between sessions
    async fn create_client(&self, config: &RtcClientConfig) -> RtcResult<Arc<dyn RtcClient>>;
}

/// One provider client, exclusively owned by a call session
#[async_trait]
pub trait RtcClient: Send + Sync {
    /// Register the sink that receives participant lifecycle events
    fn set_event_sink(&self, sink: RtcEventSink);

    async fn join(
        &self,
        app_id: &str,
        channel: &str,
        token: &str,
        identity: &ParticipantId,
    ) -> RtcResult<()>;

    async fn publish(&self, tracks: &[Arc<dyn LocalTrack>]) -> RtcResult<()>;

    async fn unpublish(&self, tracks: &[Arc<dyn LocalTrack>]) -> RtcResult<()>;

    async fn subscribe(&self, participant: &ParticipantId, kind: MediaKind) -> RtcResult<()>;

    async fn leave(&self) -> RtcResult<()>;
}

/// Locally captured audio or video track
pub trait LocalTrack: Send + Sync + fmt::Debug {
    fn kind(&self) -> MediaKind;

    /// Toggle the enabled flag without unpublishing
    fn set_enabled(&self, enabled: bool) -> RtcResult<()>;

    fn is_enabled(&self) -> bool;

    /// Render the track onto a caller-supplied surface
    fn play(&self, surface: &SurfaceId) -> RtcResult<()>;

    /// Stop capture and free the device; idempotent
    fn close(&self);
}

/// Remote track received through a subscription
pub trait RemoteTrack: Send + Sync + fmt::Debug {
    fn kind(&self) -> MediaKind;

    /// Start playback; video renders onto `surface`, audio ignores it
    fn play(&self, surface: Option<&SurfaceId>) -> RtcResult<()>;

    fn stop(&self);
}

/// Local track factories; fail with [`DeviceError`] when hardware or
/// permissions are unavailable
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Acquire microphone and camera jointly, returned as `(audio, video)`
    async fn create_microphone_and_camera_tracks(
        &self,
    ) -> Result<(Arc<dyn LocalTrack>, Arc<dyn LocalTrack>), DeviceError>;

    async fn create_microphone_track(&self) -> Result<Arc<dyn LocalTrack>, DeviceError>;
}
