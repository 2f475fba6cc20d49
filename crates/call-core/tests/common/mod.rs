//! Recording fakes of the RTC provider, local devices and backend
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{oneshot, Notify};

use telecare_call_core::{
    CallRecordApi, CallRecordId, CallSession, CallSessionBuilder, CallTicket, DeviceError,
    JoinDescriptor, LocalTrack, MediaDevices, MediaKind, ParticipantId, RemoteTrack, RtcClient,
    RtcClientConfig, RtcError, RtcEvent, RtcEventSink, RtcProvider, RtcResult, SurfaceId,
    TokenError, TokenIssuer,
};

/// Route session logs to the test output; `RUST_LOG` picks the level
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn descriptor() -> JoinDescriptor {
    JoinDescriptor::new("app-1", "consult-1", "token-1", "patient-7")
}

/// Poll `condition` until it holds or a second has passed
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

#[derive(Debug)]
pub struct FakeLocalTrack {
    pub kind: MediaKind,
    pub enabled: AtomicBool,
    pub closed: AtomicUsize,
    pub played_on: Mutex<Vec<SurfaceId>>,
}

impl FakeLocalTrack {
    pub fn new(kind: MediaKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            enabled: AtomicBool::new(true),
            closed: AtomicUsize::new(0),
            played_on: Mutex::new(Vec::new()),
        })
    }

    pub fn close_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

impl LocalTrack for FakeLocalTrack {
    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn set_enabled(&self, enabled: bool) -> RtcResult<()> {
        self.enabled.store(enabled, Ordering::SeqCst);
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn play(&self, surface: &SurfaceId) -> RtcResult<()> {
        self.played_on.lock().push(surface.clone());
        Ok(())
    }

    fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug)]
pub struct FakeRemoteTrack {
    pub kind: MediaKind,
    pub played_on: Mutex<Vec<Option<SurfaceId>>>,
    pub stopped: AtomicBool,
}

impl FakeRemoteTrack {
    pub fn new(kind: MediaKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            played_on: Mutex::new(Vec::new()),
            stopped: AtomicBool::new(false),
        })
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl RemoteTrack for FakeRemoteTrack {
    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn play(&self, surface: Option<&SurfaceId>) -> RtcResult<()> {
        self.played_on.lock().push(surface.cloned());
        Ok(())
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

pub fn published(participant: &str, track: Arc<FakeRemoteTrack>) -> RtcEvent {
    RtcEvent::UserPublished {
        participant: ParticipantId::from(participant),
        kind: track.kind,
        track,
    }
}

pub fn unpublished(participant: &str, kind: MediaKind) -> RtcEvent {
    RtcEvent::UserUnpublished {
        participant: ParticipantId::from(participant),
        kind,
    }
}

pub fn left(participant: &str) -> RtcEvent {
    RtcEvent::UserLeft {
        participant: ParticipantId::from(participant),
    }
}

/// Provider client that records every call it receives
#[derive(Default)]
pub struct FakeClient {
    calls: Mutex<Vec<String>>,
    sink: Mutex<Option<RtcEventSink>>,
    join_gate: Mutex<Option<oneshot::Receiver<RtcResult<()>>>>,
    leave_gate: Mutex<Option<oneshot::Receiver<()>>>,
    join_error: Mutex<Option<RtcError>>,
    fail_publish: AtomicBool,
    fail_leave: AtomicBool,
    pub join_entered: Notify,
    pub leave_entered: Notify,
}

impl FakeClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Hold `join` until the returned sender resolves it
    pub fn gate_join(&self) -> oneshot::Sender<RtcResult<()>> {
        let (tx, rx) = oneshot::channel();
        *self.join_gate.lock() = Some(rx);
        tx
    }

    /// Hold `leave` until the returned sender fires
    pub fn gate_leave(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.leave_gate.lock() = Some(rx);
        tx
    }

    pub fn reject_join(&self, error: RtcError) {
        *self.join_error.lock() = Some(error);
    }

    pub fn fail_publish(&self) {
        self.fail_publish.store(true, Ordering::SeqCst);
    }

    pub fn fail_leave(&self) {
        self.fail_leave.store(true, Ordering::SeqCst);
    }

    /// Deliver a provider event through the registered sink
    pub fn emit(&self, event: RtcEvent) -> bool {
        match self.sink.lock().as_ref() {
            Some(sink) => sink.send(event).is_ok(),
            None => false,
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls.lock().iter().filter(|call| call.starts_with(prefix)).count()
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl RtcClient for FakeClient {
    fn set_event_sink(&self, sink: RtcEventSink) {
        *self.sink.lock() = Some(sink);
    }

    async fn join(
        &self,
        _app_id: &str,
        channel: &str,
        _token: &str,
        identity: &ParticipantId,
    ) -> RtcResult<()> {
        self.record(format!("join:{}:{}", channel, identity));
        self.join_entered.notify_one();

        let gate = self.join_gate.lock().take();
        if let Some(gate) = gate {
            gate.await.map_err(|_| RtcError::Closed)??;
        }
        match self.join_error.lock().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn publish(&self, tracks: &[Arc<dyn LocalTrack>]) -> RtcResult<()> {
        self.record(format!("publish:{}", tracks.len()));
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(RtcError::provider("publish", "transport not ready"));
        }
        Ok(())
    }

    async fn unpublish(&self, tracks: &[Arc<dyn LocalTrack>]) -> RtcResult<()> {
        self.record(format!("unpublish:{}", tracks.len()));
        Ok(())
    }

    async fn subscribe(&self, participant: &ParticipantId, kind: MediaKind) -> RtcResult<()> {
        self.record(format!("subscribe:{}:{}", participant, kind));
        Ok(())
    }

    async fn leave(&self) -> RtcResult<()> {
        self.record("leave".to_string());
        self.leave_entered.notify_one();

        let gate = self.leave_gate.lock().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        if self.fail_leave.load(Ordering::SeqCst) {
            return Err(RtcError::provider("leave", "socket closed"));
        }
        Ok(())
    }
}

pub struct FakeProvider {
    pub client: Arc<FakeClient>,
    pub created: AtomicUsize,
    pub last_config: Mutex<Option<RtcClientConfig>>,
}

impl FakeProvider {
    pub fn new(client: Arc<FakeClient>) -> Arc<Self> {
        Arc::new(Self {
            client,
            created: AtomicUsize::new(0),
            last_config: Mutex::new(None),
        })
    }
}

#[async_trait]
impl RtcProvider for FakeProvider {
    async fn create_client(&self, config: &RtcClientConfig) -> RtcResult<Arc<dyn RtcClient>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        *self.last_config.lock() = Some(*config);
        Ok(self.client.clone())
    }
}

/// Camera and microphone that can be unplugged or held mid-acquisition
pub struct FakeDevices {
    pub camera: AtomicBool,
    pub microphone: AtomicBool,
    pub audio: Arc<FakeLocalTrack>,
    pub video: Arc<FakeLocalTrack>,
    pub requests: AtomicUsize,
    gate: Mutex<Option<oneshot::Receiver<()>>>,
    pub acquire_entered: Notify,
}

impl FakeDevices {
    pub fn new(camera: bool, microphone: bool) -> Arc<Self> {
        Arc::new(Self {
            camera: AtomicBool::new(camera),
            microphone: AtomicBool::new(microphone),
            audio: FakeLocalTrack::new(MediaKind::Audio),
            video: FakeLocalTrack::new(MediaKind::Video),
            requests: AtomicUsize::new(0),
            gate: Mutex::new(None),
            acquire_entered: Notify::new(),
        })
    }

    pub fn all() -> Arc<Self> {
        Self::new(true, true)
    }

    /// Hold the first acquisition until the returned sender fires
    pub fn gate(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.gate.lock() = Some(rx);
        tx
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    async fn enter(&self) {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.acquire_entered.notify_one();
        let gate = self.gate.lock().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
    }
}

#[async_trait]
impl MediaDevices for FakeDevices {
    async fn create_microphone_and_camera_tracks(
        &self,
    ) -> Result<(Arc<dyn LocalTrack>, Arc<dyn LocalTrack>), DeviceError> {
        self.enter().await;
        if !self.microphone.load(Ordering::SeqCst) {
            return Err(DeviceError::permission_denied("microphone"));
        }
        if !self.camera.load(Ordering::SeqCst) {
            return Err(DeviceError::unavailable("camera"));
        }
        Ok((self.audio.clone(), self.video.clone()))
    }

    async fn create_microphone_track(&self) -> Result<Arc<dyn LocalTrack>, DeviceError> {
        self.enter().await;
        if !self.microphone.load(Ordering::SeqCst) {
            return Err(DeviceError::permission_denied("microphone"));
        }
        Ok(self.audio.clone())
    }
}

/// Backend call-record endpoints that remember what was reported
#[derive(Default)]
pub struct FakeRecords {
    pub calls: Mutex<Vec<String>>,
    pub fail: AtomicBool,
}

impl FakeRecords {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl CallRecordApi for FakeRecords {
    async fn start_call(&self, call_id: &CallRecordId) -> anyhow::Result<()> {
        self.calls.lock().push(format!("start:{}", call_id));
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("backend unavailable");
        }
        Ok(())
    }

    async fn end_call(&self, call_id: &CallRecordId) -> anyhow::Result<()> {
        self.calls.lock().push(format!("end:{}", call_id));
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("backend unavailable");
        }
        Ok(())
    }
}

/// Token endpoint issuing `appt-{id}` channels
#[derive(Default)]
pub struct FakeIssuer {
    pub requests: Mutex<Vec<String>>,
    pub error: Mutex<Option<TokenError>>,
}

impl FakeIssuer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl TokenIssuer for FakeIssuer {
    async fn generate_token(&self, appointment_id: &str) -> Result<CallTicket, TokenError> {
        self.requests.lock().push(appointment_id.to_string());
        if let Some(error) = self.error.lock().clone() {
            return Err(error);
        }
        Ok(CallTicket {
            token: format!("token-{}", appointment_id),
            channel_name: format!("appt-{}", appointment_id),
            app_id: "app-1".to_string(),
            uid: ParticipantId::from(7u32),
            video_call_id: CallRecordId::new(format!("vc-{}", appointment_id)),
        })
    }
}

/// Provider, client and devices wired together
pub struct Harness {
    pub client: Arc<FakeClient>,
    pub provider: Arc<FakeProvider>,
    pub devices: Arc<FakeDevices>,
}

impl Harness {
    pub fn new(devices: Arc<FakeDevices>) -> Self {
        let client = FakeClient::new();
        Self {
            provider: FakeProvider::new(client.clone()),
            client,
            devices,
        }
    }

    pub fn builder(&self) -> CallSessionBuilder {
        CallSession::builder(self.provider.clone(), self.devices.clone())
    }

    pub fn session(&self) -> CallSession {
        self.builder().build()
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new(FakeDevices::all())
    }
}
