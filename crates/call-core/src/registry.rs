//! Remote Participant Registry
//!
//! Tracks the remote parties currently publishing media and routes their
//! tracks to playback. The registry is a plain map mutated by the session's
//! event handlers, which run one at a time, so it carries no locking of its own.
//!
//! Entries follow the provider's events:
//!
//! - published video: entry created or updated, `has_video = true`, track
//!   routed to the participant's surface
//! - published audio: entry created or updated, `has_audio = true`, track
//!   played immediately
//! - unpublished: flag cleared, entry kept (video may be paused while audio
//!   continues)
//! - left: entry removed unconditionally

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::rtc::{MediaKind, ParticipantId, RemoteTrack, SurfaceId};

/// Resolves the caller-supplied video surface for a remote participant
pub trait RemoteSurfaces: Send + Sync {
    fn surface_for(&self, participant: &ParticipantId) -> Option<SurfaceId>;
}

/// Surfaces named `{prefix}{identity}`, e.g. `remote-4242`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixedSurfaces {
    prefix: String,
}

impl PrefixedSurfaces {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }
}

impl Default for PrefixedSurfaces {
    fn default() -> Self {
        Self::new("remote-")
    }
}

impl RemoteSurfaces for PrefixedSurfaces {
    fn surface_for(&self, participant: &ParticipantId) -> Option<SurfaceId> {
        Some(SurfaceId::new(format!("{}{}", self.prefix, participant)))
    }
}

/// One other party in the channel
///
/// The registry only holds references to the remote tracks so it can request
/// playback or stop it. The provider owns the media.
#[derive(Debug, Clone)]
pub struct RemoteParticipant {
    pub identity: ParticipantId,
    pub has_video: bool,
    pub has_audio: bool,
    pub first_seen_at: DateTime<Utc>,
    video_track: Option<Arc<dyn RemoteTrack>>,
    audio_track: Option<Arc<dyn RemoteTrack>>,
}

impl RemoteParticipant {
    fn new(identity: ParticipantId) -> Self {
        Self {
            identity,
            has_video: false,
            has_audio: false,
            first_seen_at: Utc::now(),
            video_track: None,
            audio_track: None,
        }
    }

    pub fn video_track(&self) -> Option<&Arc<dyn RemoteTrack>> {
        self.video_track.as_ref()
    }

    pub fn audio_track(&self) -> Option<&Arc<dyn RemoteTrack>> {
        self.audio_track.as_ref()
    }

    pub fn info(&self) -> RemoteParticipantInfo {
        RemoteParticipantInfo {
            identity: self.identity.clone(),
            has_video: self.has_video,
            has_audio: self.has_audio,
        }
    }

    fn stop_all(&mut self) {
        if let Some(track) = self.video_track.take() {
            track.stop();
        }
        if let Some(track) = self.audio_track.take() {
            track.stop();
        }
        self.has_video = false;
        self.has_audio = false;
    }
}

/// Serializable view of a remote participant for UI rendering
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteParticipantInfo {
    pub identity: ParticipantId,
    pub has_video: bool,
    pub has_audio: bool,
}

/// Outcome of applying one provider event to the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryChange {
    Added(RemoteParticipantInfo),
    Updated(RemoteParticipantInfo),
    Removed(ParticipantId),
    Unchanged,
}

/// Set of remote participants keyed by identity
#[derive(Debug, Default)]
pub struct RemoteParticipantRegistry {
    participants: HashMap<ParticipantId, RemoteParticipant>,
    local_identity: Option<ParticipantId>,
}

impl RemoteParticipantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events carrying this identity are never recorded
    pub fn set_local_identity(&mut self, identity: ParticipantId) {
        self.participants.remove(&identity);
        self.local_identity = Some(identity);
    }

    pub fn is_local(&self, identity: &ParticipantId) -> bool {
        self.local_identity.as_ref() == Some(identity)
    }

    /// Record a subscribed track and start its playback
    ///
    /// Video is routed to `surface`; without one the entry is still updated
    /// but nothing is rendered. Audio plays immediately.
    pub fn on_published(
        &mut self,
        identity: ParticipantId,
        kind: MediaKind,
        track: Arc<dyn RemoteTrack>,
        surface: Option<&SurfaceId>,
    ) -> RegistryChange {
        if self.is_local(&identity) {
            return RegistryChange::Unchanged;
        }

        let playback = match kind {
            MediaKind::Video => match surface {
                Some(surface) => track.play(Some(surface)),
                None => {
                    debug!("No surface for participant {}; video not rendered", identity);
                    Ok(())
                }
            },
            MediaKind::Audio => track.play(None),
        };
        if let Err(e) = playback {
            warn!("Failed to play remote {} track of {}: {}", kind, identity, e);
        }

        let existed = self.participants.contains_key(&identity);
        let participant = self
            .participants
            .entry(identity.clone())
            .or_insert_with(|| RemoteParticipant::new(identity));

        let previous = match kind {
            MediaKind::Video => {
                participant.has_video = true;
                participant.video_track.replace(track.clone())
            }
            MediaKind::Audio => {
                participant.has_audio = true;
                participant.audio_track.replace(track.clone())
            }
        };
        if let Some(previous) = previous {
            if !Arc::ptr_eq(&previous, &track) {
                previous.stop();
            }
        }

        if existed {
            RegistryChange::Updated(participant.info())
        } else {
            RegistryChange::Added(participant.info())
        }
    }

    /// Clear the flag for `kind`; the entry persists until the participant leaves
    pub fn on_unpublished(&mut self, identity: &ParticipantId, kind: MediaKind) -> RegistryChange {
        let Some(participant) = self.participants.get_mut(identity) else {
            return RegistryChange::Unchanged;
        };

        let track = match kind {
            MediaKind::Video => {
                participant.has_video = false;
                participant.video_track.take()
            }
            MediaKind::Audio => {
                participant.has_audio = false;
                participant.audio_track.take()
            }
        };
        if let Some(track) = track {
            track.stop();
        }

        RegistryChange::Updated(participant.info())
    }

    /// Remove the participant unconditionally
    pub fn on_left(&mut self, identity: &ParticipantId) -> RegistryChange {
        match self.participants.remove(identity) {
            Some(mut participant) => {
                participant.stop_all();
                RegistryChange::Removed(participant.identity)
            }
            None => RegistryChange::Unchanged,
        }
    }

    pub fn get(&self, identity: &ParticipantId) -> Option<&RemoteParticipant> {
        self.participants.get(identity)
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Participants sorted by identity
    pub fn infos(&self) -> Vec<RemoteParticipantInfo> {
        let mut infos: Vec<_> = self.participants.values().map(RemoteParticipant::info).collect();
        infos.sort_by(|a, b| a.identity.cmp(&b.identity));
        infos
    }

    /// Stop every remote track and forget all participants
    pub fn clear(&mut self) -> usize {
        let count = self.participants.len();
        for (_, mut participant) in self.participants.drain() {
            participant.stop_all();
        }
        count
    }
}
