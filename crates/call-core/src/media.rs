//! Local Media Manager
//!
//! Acquires the local microphone and camera through an ordered fallback chain
//! and mirrors the local video onto a preview surface.
//!
//! # Fallback chain
//!
//! ```text
//! CameraAndMicrophone ──fail──▶ MicrophoneOnly ──fail──▶ ReceiveOnly
//!        │                           │                       │
//!        ▼                           ▼                       ▼
//!  LocalMedia::AudioVideo     LocalMedia::AudioOnly     LocalMedia::None
//! ```
//!
//! Each failed tier is logged as a warning and the next tier is tried. The
//! receive-only tier cannot fail, so acquisition always yields exactly one of
//! the three [`LocalMedia`] shapes and the session proceeds even without any
//! local hardware.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::DeviceError;
use crate::rtc::{LocalTrack, MediaDevices, SurfaceId};

/// One ranked acquisition strategy in the fallback chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionTier {
    /// Camera and microphone acquired jointly
    CameraAndMicrophone,
    /// Microphone only
    MicrophoneOnly,
    /// Nothing acquired; the session only receives
    ReceiveOnly,
}

impl AcquisitionTier {
    /// Default chain, receive-only last
    pub fn default_chain() -> Vec<AcquisitionTier> {
        vec![
            AcquisitionTier::CameraAndMicrophone,
            AcquisitionTier::MicrophoneOnly,
            AcquisitionTier::ReceiveOnly,
        ]
    }
}

impl fmt::Display for AcquisitionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcquisitionTier::CameraAndMicrophone => write!(f, "camera+microphone"),
            AcquisitionTier::MicrophoneOnly => write!(f, "microphone"),
            AcquisitionTier::ReceiveOnly => write!(f, "receive-only"),
        }
    }
}

/// What the session is publishing, shown as the `Connected` sub-state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishTier {
    AudioVideo,
    AudioOnly,
    None,
}

impl fmt::Display for PublishTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishTier::AudioVideo => write!(f, "av"),
            PublishTier::AudioOnly => write!(f, "audio"),
            PublishTier::None => write!(f, "none"),
        }
    }
}

/// A tier that failed during acquisition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierFailure {
    pub tier: AcquisitionTier,
    pub error: DeviceError,
}

/// Local tracks owned by one call session
///
/// Holds at most one audio and one video track. Releasing closes every track
/// and leaves the value as [`LocalMedia::None`], so a second release is a no-op.
///
/// The value is the sole owner of its tracks and cannot be cloned:
///
/// ```compile_fail
/// fn shared<T: Clone>() {}
/// shared::<telecare_call_core::LocalMedia>();
/// ```
#[derive(Debug, Default)]
pub enum LocalMedia {
    AudioVideo {
        audio: Arc<dyn LocalTrack>,
        video: Arc<dyn LocalTrack>,
    },
    AudioOnly {
        audio: Arc<dyn LocalTrack>,
    },
    #[default]
    None,
}

impl LocalMedia {
    pub fn tier(&self) -> PublishTier {
        match self {
            LocalMedia::AudioVideo { .. } => PublishTier::AudioVideo,
            LocalMedia::AudioOnly { .. } => PublishTier::AudioOnly,
            LocalMedia::None => PublishTier::None,
        }
    }

    pub fn audio(&self) -> Option<&Arc<dyn LocalTrack>> {
        match self {
            LocalMedia::AudioVideo { audio, .. } | LocalMedia::AudioOnly { audio } => Some(audio),
            LocalMedia::None => None,
        }
    }

    pub fn video(&self) -> Option<&Arc<dyn LocalTrack>> {
        match self {
            LocalMedia::AudioVideo { video, .. } => Some(video),
            _ => None,
        }
    }

    /// Tracks in publish order (audio first)
    pub fn tracks(&self) -> Vec<Arc<dyn LocalTrack>> {
        match self {
            LocalMedia::AudioVideo { audio, video } => vec![audio.clone(), video.clone()],
            LocalMedia::AudioOnly { audio } => vec![audio.clone()],
            LocalMedia::None => Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, LocalMedia::None)
    }

    /// Close every held track and reset to `None`; returns how many were closed
    pub fn release(&mut self) -> usize {
        let tracks = std::mem::take(self).tracks();
        for track in &tracks {
            track.close();
        }
        tracks.len()
    }
}

/// Acquires local media through the configured fallback chain
#[derive(Clone)]
pub struct LocalMediaManager {
    devices: Arc<dyn MediaDevices>,
    tiers: Vec<AcquisitionTier>,
}

impl fmt::Debug for LocalMediaManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalMediaManager")
            .field("devices", &"<media devices>")
            .field("tiers", &self.tiers)
            .finish()
    }
}

impl LocalMediaManager {
    /// Create a manager using the default chain
    pub fn new(devices: Arc<dyn MediaDevices>) -> Self {
        Self::with_tiers(devices, AcquisitionTier::default_chain())
    }

    /// Create a manager with a custom chain
    ///
    /// Duplicates are dropped and `ReceiveOnly` is always moved to the end,
    /// so a chain like `[MicrophoneOnly]` still terminates receive-only.
    pub fn with_tiers(devices: Arc<dyn MediaDevices>, tiers: Vec<AcquisitionTier>) -> Self {
        let mut chain = Vec::with_capacity(tiers.len() + 1);
        for tier in tiers {
            if tier != AcquisitionTier::ReceiveOnly && !chain.contains(&tier) {
                chain.push(tier);
            }
        }
        chain.push(AcquisitionTier::ReceiveOnly);
        Self { devices, tiers: chain }
    }

    pub fn tiers(&self) -> &[AcquisitionTier] {
        &self.tiers
    }

    /// Acquire local media; never fails past the receive-only tier
    pub async fn acquire(&self) -> LocalMedia {
        self.acquire_with_report().await.0
    }

    /// Acquire local media and report every tier that failed on the way
    pub async fn acquire_with_report(&self) -> (LocalMedia, Vec<TierFailure>) {
        let mut failures = Vec::new();

        for &tier in &self.tiers {
            match self.try_tier(tier).await {
                Ok(media) => {
                    info!("Local media acquired via {} tier", tier);
                    return (media, failures);
                }
                Err(error) => {
                    warn!("Failed to acquire {} tier: {}", tier, error);
                    failures.push(TierFailure { tier, error });
                }
            }
        }

        (LocalMedia::None, failures)
    }

    async fn try_tier(&self, tier: AcquisitionTier) -> Result<LocalMedia, DeviceError> {
        match tier {
            AcquisitionTier::CameraAndMicrophone => {
                let (audio, video) = self.devices.create_microphone_and_camera_tracks().await?;
                Ok(LocalMedia::AudioVideo { audio, video })
            }
            AcquisitionTier::MicrophoneOnly => {
                let audio = self.devices.create_microphone_track().await?;
                Ok(LocalMedia::AudioOnly { audio })
            }
            AcquisitionTier::ReceiveOnly => {
                info!("No local audio/video devices available; joining receive-only");
                Ok(LocalMedia::None)
            }
        }
    }

    /// Release local media; safe on already-released values
    pub fn release(media: &mut LocalMedia) -> usize {
        let released = media.release();
        if released > 0 {
            debug!("Released {} local track(s)", released);
        }
        released
    }

    /// Mirror the local video (if any) onto a preview surface
    ///
    /// Returns `false` when there is no video track or playback failed.
    pub fn mirror_preview(media: &LocalMedia, surface: &SurfaceId) -> bool {
        let Some(video) = media.video() else {
            return false;
        };
        match video.play(surface) {
            Ok(()) => {
                debug!("Local preview mirrored to {}", surface);
                true
            }
            Err(e) => {
                warn!("Failed to mirror local preview to {}: {}", surface, e);
                false
            }
        }
    }
}
