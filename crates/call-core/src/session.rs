//! Call Session Orchestrator
//!
//! [`CallSession`] ties the provider client, the local media manager and the
//! remote participant registry together and owns the session state machine.
//!
//! # State machine
//!
//! ```text
//!            start()              join ok + media + publish
//!   Idle ──────────────▶ Joining ───────────────────────────▶ Connected(tier)
//!    │                      │  │                                    │
//!    │ end()/cancel()       │  │ join rejected                      │ end()/cancel()
//!    ▼                      │  ▼                                    ▼
//!  Ended ◀──────────────────┼─ Failed                            Leaving ──▶ Ended
//!                           │                                       ▲
//!                           └──── cancelled while joining ──────────┘
//! ```
//!
//! # Cancellation
//!
//! The session carries a single `cancelled` flag that is set at most once and
//! never cleared. It is checked after every suspension point of
//! [`start`](CallSession::start) and at the top of every provider event
//! handler. Once set, the only provider calls issued are teardown calls: a
//! `join` that resolves after cancellation is immediately reversed with
//! `leave`, and media acquired after cancellation is released instead of
//! published.
//!
//! # Concurrency
//!
//! Session state lives behind a `parking_lot` mutex that is never held across
//! an `.await`. Provider events are dispatched by a background pump one at a
//! time; a dispatch lock keeps handlers from overlapping even when
//! [`handle_event`](CallSession::handle_event) is also driven directly.

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::CallConfig;
use crate::error::{CallError, CallResult, JoinError, RtcError, TeardownError, TeardownStep};
use crate::events::SessionEvent;
use crate::lifecycle::{CallRecordApi, CallRecordId, LifecycleReporter};
use crate::media::{LocalMedia, LocalMediaManager, PublishTier};
use crate::registry::{
    PrefixedSurfaces, RegistryChange, RemoteParticipantInfo, RemoteParticipantRegistry,
    RemoteSurfaces,
};
use crate::rtc::{
    LocalTrack, MediaDevices, MediaKind, ParticipantId, RemoteTrack, RtcClient, RtcEvent,
    RtcProvider,
};

/// Unique identifier of one call session, used in logs and events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Orchestrator state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallState {
    Idle,
    Joining,
    /// Joined and publishing the given tier; the tier is display-only
    Connected(PublishTier),
    Leaving,
    Ended,
    /// Provider rejected the join; start a fresh session to retry
    Failed,
}

impl CallState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Ended | CallState::Failed)
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, CallState::Connected(_))
    }

    pub fn publish_tier(&self) -> Option<PublishTier> {
        match self {
            CallState::Connected(tier) => Some(*tier),
            _ => None,
        }
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallState::Idle => write!(f, "Idle"),
            CallState::Joining => write!(f, "Joining"),
            CallState::Connected(tier) => write!(f, "Connected({})", tier),
            CallState::Leaving => write!(f, "Leaving"),
            CallState::Ended => write!(f, "Ended"),
            CallState::Failed => write!(f, "Failed"),
        }
    }
}

/// Credentials and identifiers needed to enter a channel
///
/// Created once per call attempt and never mutated.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinDescriptor {
    app_id: String,
    channel: String,
    token: String,
    identity: ParticipantId,
}

impl JoinDescriptor {
    pub fn new(
        app_id: impl Into<String>,
        channel: impl Into<String>,
        token: impl Into<String>,
        identity: impl Into<ParticipantId>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            channel: channel.into(),
            token: token.into(),
            identity: identity.into(),
        }
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn identity(&self) -> &ParticipantId {
        &self.identity
    }
}

impl fmt::Debug for JoinDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinDescriptor")
            .field("app_id", &self.app_id)
            .field("channel", &self.channel)
            .field("token", &"<redacted>")
            .field("identity", &self.identity)
            .finish()
    }
}

/// What a teardown did; errors are informational only
#[derive(Debug, Clone, Default)]
pub struct TeardownReport {
    pub errors: Vec<TeardownError>,
    pub released_tracks: usize,
    pub left: bool,
    /// `None` when no call start had been reported
    pub end_reported: Option<bool>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Point-in-time view of a session for UI rendering
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub state: CallState,
    pub remote_participants: Vec<RemoteParticipantInfo>,
    /// `None` without a local audio track
    pub audio_enabled: Option<bool>,
    /// `None` without a local video track
    pub video_enabled: Option<bool>,
    pub cancelled: bool,
}

impl SessionSnapshot {
    /// Still setting up ("Connecting...")
    pub fn is_connecting(&self) -> bool {
        matches!(self.state, CallState::Idle | CallState::Joining)
    }

    /// Connected but nobody else is publishing yet
    pub fn is_waiting_for_remote(&self) -> bool {
        self.state.is_connected() && self.remote_participants.is_empty()
    }
}

/// Mutable session state; guarded by `Inner::slot`
struct Slot {
    state: CallState,
    descriptor: Option<JoinDescriptor>,
    client: Option<Arc<dyn RtcClient>>,
    joined: bool,
    media: LocalMedia,
    published: Vec<Arc<dyn LocalTrack>>,
    registry: RemoteParticipantRegistry,
    start_report: Option<JoinHandle<bool>>,
    pump: Option<JoinHandle<()>>,
}

struct Inner {
    id: SessionId,
    config: CallConfig,
    provider: Arc<dyn RtcProvider>,
    media: LocalMediaManager,
    surfaces: Arc<dyn RemoteSurfaces>,
    lifecycle: Option<(LifecycleReporter, CallRecordId)>,
    slot: Mutex<Slot>,
    cancelled: AtomicBool,
    dispatch: tokio::sync::Mutex<()>,
    events: broadcast::Sender<SessionEvent>,
    state_tx: watch::Sender<CallState>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let slot = self.slot.get_mut();
        if let Some(pump) = slot.pump.take() {
            pump.abort();
        }
        let released = slot.media.release();
        if !slot.state.is_terminal() && slot.state != CallState::Idle {
            warn!(
                "Session {} dropped while {}; released {} local track(s) without leaving",
                self.id, slot.state, released
            );
        }
    }
}

/// Builder for [`CallSession`]
pub struct CallSessionBuilder {
    provider: Arc<dyn RtcProvider>,
    devices: Arc<dyn MediaDevices>,
    config: CallConfig,
    surfaces: Arc<dyn RemoteSurfaces>,
    lifecycle: Option<(Arc<dyn CallRecordApi>, CallRecordId)>,
}

impl CallSessionBuilder {
    pub fn config(mut self, config: CallConfig) -> Self {
        self.config = config;
        self
    }

    /// Where remote video is rendered; defaults to `remote-{identity}`
    pub fn surfaces(mut self, surfaces: Arc<dyn RemoteSurfaces>) -> Self {
        self.surfaces = surfaces;
        self
    }

    /// Report call start/end for this backend call record
    pub fn lifecycle(mut self, api: Arc<dyn CallRecordApi>, call_id: CallRecordId) -> Self {
        self.lifecycle = Some((api, call_id));
        self
    }

    pub fn build(self) -> CallSession {
        let (events, _) = broadcast::channel(self.config.event_capacity());
        let (state_tx, _) = watch::channel(CallState::Idle);
        let media =
            LocalMediaManager::with_tiers(self.devices, self.config.acquisition_tiers.clone());
        let timeout = self.config.report_timeout();
        let lifecycle = self
            .lifecycle
            .map(|(api, call_id)| (LifecycleReporter::new(api).with_timeout(timeout), call_id));

        CallSession {
            inner: Arc::new(Inner {
                id: SessionId::new(),
                config: self.config,
                provider: self.provider,
                media,
                surfaces: self.surfaces,
                lifecycle,
                slot: Mutex::new(Slot {
                    state: CallState::Idle,
                    descriptor: None,
                    client: None,
                    joined: false,
                    media: LocalMedia::None,
                    published: Vec::new(),
                    registry: RemoteParticipantRegistry::new(),
                    start_report: None,
                    pump: None,
                }),
                cancelled: AtomicBool::new(false),
                dispatch: tokio::sync::Mutex::new(()),
                events,
                state_tx,
            }),
        }
    }
}

/// A two-party audio/video call session
///
/// Cheap to clone; all clones drive the same session.
#[derive(Clone)]
pub struct CallSession {
    inner: Arc<Inner>,
}

impl fmt::Debug for CallSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallSession")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl CallSession {
    pub fn builder(
        provider: Arc<dyn RtcProvider>,
        devices: Arc<dyn MediaDevices>,
    ) -> CallSessionBuilder {
        CallSessionBuilder {
            provider,
            devices,
            config: CallConfig::default(),
            surfaces: Arc::new(PrefixedSurfaces::default()),
            lifecycle: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.inner.id
    }

    pub fn state(&self) -> CallState {
        self.inner.slot.lock().state
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &CallConfig {
        &self.inner.config
    }

    pub fn descriptor(&self) -> Option<JoinDescriptor> {
        self.inner.slot.lock().descriptor.clone()
    }

    pub fn call_record(&self) -> Option<&CallRecordId> {
        self.inner.lifecycle.as_ref().map(|(_, call_id)| call_id)
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Watch the current state
    pub fn watch_state(&self) -> watch::Receiver<CallState> {
        self.inner.state_tx.subscribe()
    }

    /// Resolve once the session is `Ended` or `Failed`
    pub async fn wait_until_terminal(&self) -> CallState {
        let mut states = self.watch_state();
        loop {
            let state = *states.borrow_and_update();
            if state.is_terminal() {
                return state;
            }
            if states.changed().await.is_err() {
                return self.state();
            }
        }
    }

    pub fn remote_participants(&self) -> Vec<RemoteParticipantInfo> {
        self.inner.slot.lock().registry.infos()
    }

    pub fn is_audio_enabled(&self) -> Option<bool> {
        self.inner.slot.lock().media.audio().map(|track| track.is_enabled())
    }

    pub fn is_video_enabled(&self) -> Option<bool> {
        self.inner.slot.lock().media.video().map(|track| track.is_enabled())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let slot = self.inner.slot.lock();
        SessionSnapshot {
            session_id: self.inner.id,
            state: slot.state,
            remote_participants: slot.registry.infos(),
            audio_enabled: slot.media.audio().map(|track| track.is_enabled()),
            video_enabled: slot.media.video().map(|track| track.is_enabled()),
            cancelled: self.is_cancelled(),
        }
    }

    /// Guard that cancels the session when dropped
    pub fn guard(&self) -> SessionGuard {
        SessionGuard {
            session: self.clone(),
            armed: true,
        }
    }

    /// Join the channel, acquire local media and publish it
    ///
    /// Returns the publishing tier reached. Device failures degrade the tier
    /// instead of failing; only a rejected join is an error, and it leaves the
    /// session `Failed`. A session cancelled while this call is in flight is
    /// torn down before the call returns [`CallError::Cancelled`].
    ///
    /// Setup runs on a task owned by the session. Dropping this future or
    /// aborting the caller's task leaves setup running; it still honors a
    /// later `end`, `cancel` or guard drop.
    ///
    /// # Errors
    ///
    /// * `CallError::InvalidState` - the session was already started or ended
    /// * `CallError::Join` - the provider rejected the join
    /// * `CallError::Cancelled` - the consumer cancelled before `Connected`
    pub async fn start(&self, descriptor: JoinDescriptor) -> CallResult<PublishTier> {
        {
            let mut slot = self.inner.slot.lock();
            if slot.state != CallState::Idle {
                return Err(CallError::invalid_state("start", slot.state));
            }
            slot.registry.set_local_identity(descriptor.identity().clone());
            slot.descriptor = Some(descriptor.clone());
            self.transition(&mut slot, CallState::Joining);
        }
        info!(
            "Session {} joining channel {} as {}",
            self.inner.id,
            descriptor.channel(),
            descriptor.identity()
        );

        let setup = tokio::spawn(self.clone().run_setup(descriptor));
        match setup.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => {
                error!("Session {} setup task did not complete: {}", self.inner.id, e);
                Err(CallError::Cancelled)
            }
        }
    }

    /// Everything `start` does after `Joining`, on a task the session owns
    ///
    /// Dropping the `start` future does not stop this task, so a join that
    /// resolves after the caller went away is still reversed.
    async fn run_setup(self, descriptor: JoinDescriptor) -> CallResult<PublishTier> {
        let client = match self.inner.provider.create_client(&self.inner.config.client).await {
            Ok(client) => client,
            Err(source) => return Err(self.fail_join(&descriptor, source)),
        };
        let (sink, events) = mpsc::unbounded_channel();
        client.set_event_sink(sink);
        {
            let pump = self.spawn_event_pump(events);
            let mut slot = self.inner.slot.lock();
            slot.client = Some(client.clone());
            slot.pump = Some(pump);
        }
        if self.is_cancelled() {
            return Err(self.abandon_start("client creation").await);
        }

        if let Err(source) = client
            .join(
                descriptor.app_id(),
                descriptor.channel(),
                descriptor.token(),
                descriptor.identity(),
            )
            .await
        {
            return Err(self.fail_join(&descriptor, source));
        }
        self.inner.slot.lock().joined = true;
        info!("Session {} joined channel {}", self.inner.id, descriptor.channel());
        if self.is_cancelled() {
            return Err(self.abandon_start("join").await);
        }

        let (media, failures) = self.inner.media.acquire_with_report().await;
        let mut tier = media.tier();
        self.inner.slot.lock().media = media;
        if !failures.is_empty() {
            self.emit(SessionEvent::MediaDegraded {
                session_id: self.inner.id,
                tier,
                failures,
            });
        }
        if self.is_cancelled() {
            return Err(self.abandon_start("media acquisition").await);
        }

        let tracks = {
            let slot = self.inner.slot.lock();
            if let Some(surface) = &self.inner.config.local_preview {
                LocalMediaManager::mirror_preview(&slot.media, surface);
            }
            slot.media.tracks()
        };
        if !tracks.is_empty() {
            match client.publish(&tracks).await {
                Ok(()) => {
                    debug!("Session {} published {} local track(s)", self.inner.id, tracks.len());
                    self.inner.slot.lock().published = tracks;
                }
                Err(e) => {
                    warn!(
                        "Session {} failed to publish local tracks, continuing receive-only: {}",
                        self.inner.id, e
                    );
                    let mut media = std::mem::take(&mut self.inner.slot.lock().media);
                    LocalMediaManager::release(&mut media);
                    tier = PublishTier::None;
                }
            }
            if self.is_cancelled() {
                return Err(self.abandon_start("publish").await);
            }
        }

        let connected = {
            let mut slot = self.inner.slot.lock();
            if self.is_cancelled() {
                false
            } else {
                self.transition(&mut slot, CallState::Connected(tier));
                if let Some((reporter, call_id)) = &self.inner.lifecycle {
                    slot.start_report = Some(reporter.spawn_report_start(call_id.clone()));
                }
                true
            }
        };
        if !connected {
            return Err(self.abandon_start("connect").await);
        }

        Ok(tier)
    }

    /// End the call: release local media, unpublish, leave, report the end
    ///
    /// Idempotent. Called while `Joining`, it only marks the session cancelled
    /// and the in-flight [`start`](Self::start) reverses itself.
    pub async fn end(&self) -> TeardownReport {
        self.shutdown("ended by caller").await
    }

    /// Cancel the session because its consumer went away
    pub async fn cancel(&self) -> TeardownReport {
        self.shutdown("consumer cancelled").await
    }

    /// Cancel without awaiting; teardown runs on the current runtime if needed
    pub fn cancel_detached(&self) {
        self.mark_cancelled();
        if self.end_if_idle() {
            return;
        }
        if !self.state().is_connected() {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let session = self.clone();
                runtime.spawn(async move {
                    session.teardown("consumer dropped").await;
                });
            }
            Err(_) => warn!(
                "No async runtime available; session {} could not leave its channel",
                self.inner.id
            ),
        }
    }

    /// Mute or unmute the local microphone without unpublishing
    ///
    /// Returns `Ok(false)` when there is no local audio track.
    pub fn set_audio_enabled(&self, enabled: bool) -> CallResult<bool> {
        self.set_track_enabled(MediaKind::Audio, enabled)
    }

    /// Turn the local camera on or off without unpublishing
    ///
    /// Returns `Ok(false)` when there is no local video track.
    pub fn set_video_enabled(&self, enabled: bool) -> CallResult<bool> {
        self.set_track_enabled(MediaKind::Video, enabled)
    }

    /// Apply one provider event to the session
    ///
    /// No-op once the session is cancelled, leaving or ended, and before the
    /// join has resolved.
    pub async fn handle_event(&self, event: RtcEvent) {
        let _turn = self.inner.dispatch.lock().await;

        if !self.accepts_events() {
            debug!(
                "Session {} ignoring event for {} while {}",
                self.inner.id,
                event.participant(),
                self.state()
            );
            return;
        }

        match event {
            RtcEvent::UserPublished { participant, kind, track } => {
                self.on_user_published(participant, kind, track).await;
            }
            RtcEvent::UserUnpublished { participant, kind } => {
                let change = {
                    let mut slot = self.inner.slot.lock();
                    self.accepts_events_locked(&slot)
                        .then(|| slot.registry.on_unpublished(&participant, kind))
                };
                if let Some(change) = change {
                    self.emit_change(change);
                }
            }
            RtcEvent::UserLeft { participant } => {
                let change = {
                    let mut slot = self.inner.slot.lock();
                    self.accepts_events_locked(&slot)
                        .then(|| slot.registry.on_left(&participant))
                };
                if let Some(change) = change {
                    self.emit_change(change);
                }
            }
        }
    }

    async fn on_user_published(
        &self,
        participant: ParticipantId,
        kind: MediaKind,
        track: Arc<dyn RemoteTrack>,
    ) {
        let client = {
            let slot = self.inner.slot.lock();
            if slot.registry.is_local(&participant) {
                debug!("Session {} ignoring its own {} track", self.inner.id, kind);
                return;
            }
            slot.client.clone()
        };
        let Some(client) = client else {
            return;
        };

        if let Err(e) = client.subscribe(&participant, kind).await {
            warn!(
                "Session {} failed to subscribe to {} of {}: {}",
                self.inner.id, kind, participant, e
            );
            return;
        }

        let surface = match kind {
            MediaKind::Video => self.inner.surfaces.surface_for(&participant),
            MediaKind::Audio => None,
        };
        let change = {
            let mut slot = self.inner.slot.lock();
            self.accepts_events_locked(&slot).then(|| {
                slot.registry
                    .on_published(participant.clone(), kind, track.clone(), surface.as_ref())
            })
        };
        match change {
            Some(change) => self.emit_change(change),
            None => {
                debug!(
                    "Session {} closed while subscribing to {}; dropping {} track",
                    self.inner.id, participant, kind
                );
                track.stop();
            }
        }
    }

    fn set_track_enabled(&self, kind: MediaKind, enabled: bool) -> CallResult<bool> {
        let operation = match kind {
            MediaKind::Audio => "toggle audio",
            MediaKind::Video => "toggle video",
        };
        let slot = self.inner.slot.lock();
        if !slot.state.is_connected() {
            return Err(CallError::invalid_state(operation, slot.state));
        }
        let track = match kind {
            MediaKind::Audio => slot.media.audio(),
            MediaKind::Video => slot.media.video(),
        };
        let Some(track) = track else {
            debug!("Session {} has no local {} track to toggle", self.inner.id, kind);
            return Ok(false);
        };

        track
            .set_enabled(enabled)
            .map_err(|source| CallError::Track { kind, source })?;
        info!(
            "Session {} local {} {}",
            self.inner.id,
            kind,
            if enabled { "enabled" } else { "disabled" }
        );
        self.emit(SessionEvent::LocalTrackToggled {
            session_id: self.inner.id,
            kind,
            enabled,
        });
        Ok(true)
    }

    async fn shutdown(&self, reason: &'static str) -> TeardownReport {
        self.mark_cancelled();
        if self.end_if_idle() {
            return TeardownReport::default();
        }
        match self.state() {
            CallState::Connected(_) => self.teardown(reason).await,
            CallState::Joining => {
                debug!(
                    "Session {} {} while joining; the setup task reverses itself",
                    self.inner.id, reason
                );
                TeardownReport::default()
            }
            _ => TeardownReport::default(),
        }
    }

    /// `Idle -> Ended`; nothing was acquired so nothing needs releasing
    fn end_if_idle(&self) -> bool {
        let mut slot = self.inner.slot.lock();
        if slot.state != CallState::Idle {
            return false;
        }
        self.transition(&mut slot, CallState::Ended);
        self.emit(SessionEvent::Ended {
            session_id: self.inner.id,
            teardown_errors: 0,
        });
        true
    }

    fn mark_cancelled(&self) {
        if !self.inner.cancelled.swap(true, Ordering::SeqCst) {
            info!("Session {} cancelled", self.inner.id);
        }
    }

    fn fail_join(&self, descriptor: &JoinDescriptor, source: RtcError) -> CallError {
        error!(
            "Session {} failed to join channel {}: {}",
            self.inner.id,
            descriptor.channel(),
            source
        );
        let mut slot = self.inner.slot.lock();
        slot.client = None;
        if let Some(pump) = slot.pump.take() {
            pump.abort();
        }
        self.transition(&mut slot, CallState::Failed);
        CallError::Join(JoinError {
            channel: descriptor.channel().to_string(),
            source,
        })
    }

    async fn abandon_start(&self, stage: &'static str) -> CallError {
        info!(
            "Session {} cancelled during {}; reversing setup",
            self.inner.id, stage
        );
        self.teardown("cancelled during setup").await;
        CallError::Cancelled
    }

    /// Release local media, unpublish, leave, then report the call end
    ///
    /// Runs at most once: the `Leaving` transition is the idempotency gate.
    async fn teardown(&self, reason: &str) -> TeardownReport {
        let (client, joined, mut media, published, start_report) = {
            let mut slot = self.inner.slot.lock();
            if matches!(
                slot.state,
                CallState::Leaving | CallState::Ended | CallState::Failed
            ) {
                return TeardownReport::default();
            }
            self.transition(&mut slot, CallState::Leaving);
            (
                slot.client.take(),
                slot.joined,
                std::mem::take(&mut slot.media),
                std::mem::take(&mut slot.published),
                slot.start_report.take(),
            )
        };
        info!("Session {} leaving: {}", self.inner.id, reason);

        let mut report = TeardownReport {
            released_tracks: LocalMediaManager::release(&mut media),
            ..Default::default()
        };

        if let Some(client) = client {
            if !published.is_empty() {
                if let Err(e) = client.unpublish(&published).await {
                    warn!("Session {} failed to unpublish: {}", self.inner.id, e);
                    report.errors.push(TeardownError::new(TeardownStep::Unpublish, e));
                }
            }
            if joined {
                match client.leave().await {
                    Ok(()) => report.left = true,
                    Err(e) => {
                        warn!("Session {} failed to leave channel: {}", self.inner.id, e);
                        report.errors.push(TeardownError::new(TeardownStep::Leave, e));
                    }
                }
            }
        }

        if let (Some(start_report), Some((reporter, call_id))) =
            (start_report, &self.inner.lifecycle)
        {
            // keep the backend's start/end order
            let _ = start_report.await;
            report.end_reported = Some(reporter.report_end(call_id).await);
        }

        {
            let mut slot = self.inner.slot.lock();
            let stopped = slot.registry.clear();
            if stopped > 0 {
                debug!("Session {} stopped {} remote participant(s)", self.inner.id, stopped);
            }
            if let Some(pump) = slot.pump.take() {
                pump.abort();
            }
            self.transition(&mut slot, CallState::Ended);
        }
        self.emit(SessionEvent::Ended {
            session_id: self.inner.id,
            teardown_errors: report.errors.len(),
        });

        report
    }

    fn accepts_events(&self) -> bool {
        let slot = self.inner.slot.lock();
        self.accepts_events_locked(&slot)
    }

    fn accepts_events_locked(&self, slot: &Slot) -> bool {
        !self.is_cancelled()
            && slot.joined
            && matches!(slot.state, CallState::Joining | CallState::Connected(_))
    }

    fn spawn_event_pump(&self, mut events: mpsc::UnboundedReceiver<RtcEvent>) -> JoinHandle<()> {
        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                CallSession { inner }.handle_event(event).await;
            }
        })
    }

    fn transition(&self, slot: &mut Slot, next: CallState) {
        let previous = slot.state;
        if previous == next {
            return;
        }
        slot.state = next;
        info!("Session {} state {} -> {}", self.inner.id, previous, next);
        self.inner.state_tx.send_replace(next);
        self.emit(SessionEvent::StateChanged {
            session_id: self.inner.id,
            previous,
            current: next,
            timestamp: Utc::now(),
        });
    }

    fn emit_change(&self, change: RegistryChange) {
        match change {
            RegistryChange::Added(participant) => {
                info!(
                    "Session {} remote participant {} joined",
                    self.inner.id, participant.identity
                );
                self.emit(SessionEvent::ParticipantUpdated {
                    session_id: self.inner.id,
                    participant,
                });
            }
            RegistryChange::Updated(participant) => {
                self.emit(SessionEvent::ParticipantUpdated {
                    session_id: self.inner.id,
                    participant,
                });
            }
            RegistryChange::Removed(identity) => {
                info!("Session {} remote participant {} left", self.inner.id, identity);
                self.emit(SessionEvent::ParticipantLeft {
                    session_id: self.inner.id,
                    identity,
                });
            }
            RegistryChange::Unchanged => {}
        }
    }

    fn emit(&self, event: SessionEvent) {
        // no subscribers is fine
        let _ = self.inner.events.send(event);
    }
}

/// Cancels its session when dropped
///
/// Hold one for as long as the screen showing the call exists; dropping it
/// mid-setup reverses the setup, dropping it while connected leaves the channel.
pub struct SessionGuard {
    session: CallSession,
    armed: bool,
}

impl SessionGuard {
    pub fn session(&self) -> &CallSession {
        &self.session
    }

    /// Give up the guard without cancelling
    pub fn disarm(mut self) -> CallSession {
        self.armed = false;
        self.session.clone()
    }
}

impl Deref for SessionGuard {
    type Target = CallSession;

    fn deref(&self) -> &CallSession {
        &self.session
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.armed {
            self.session.cancel_detached();
        }
    }
}
