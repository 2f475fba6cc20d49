//! # Telecare Call Core
//!
//! Orchestrates a two-party audio/video consultation on top of an external
//! real-time communication (RTC) provider. The crate turns a bare access token
//! into a live session, degrades gracefully when camera or microphone hardware
//! is missing, keeps track of the remote party's media as it comes and goes, and
//! tears everything down cleanly even when the consumer walks away halfway
//! through setup.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────┐      ┌──────────────────────────┐
//! │      CallLauncher        │─────▶│       TokenIssuer        │ (backend)
//! │ appointment → ticket     │      └──────────────────────────┘
//! └────────────┬─────────────┘
//!              │ JoinDescriptor
//! ┌────────────▼─────────────┐      ┌──────────────────────────┐
//! │       CallSession        │─────▶│    LifecycleReporter     │ (backend)
//! │  Idle → Joining →        │      └──────────────────────────┘
//! │  Connected → Leaving →   │
//! │  Ended / Failed          │
//! └───┬──────────────────┬───┘
//!     │                  │
//! ┌───▼──────────────┐ ┌─▼────────────────────────┐
//! │ LocalMediaManager│ │ RemoteParticipantRegistry│
//! │ tiered fallback  │ │ published / left events  │
//! └───┬──────────────┘ └─┬────────────────────────┘
//!     │                  │
//! ┌───▼──────────────────▼───┐
//! │   RtcProvider / Client   │ (external adapter)
//! └──────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use telecare_call_core::{CallSession, CallConfig, JoinDescriptor, RtcProvider, MediaDevices};
//!
//! # async fn example(
//! #     provider: Arc<dyn RtcProvider>,
//! #     devices: Arc<dyn MediaDevices>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let session = CallSession::builder(provider, devices)
//!     .config(CallConfig::new().with_local_preview("local-preview"))
//!     .build();
//!
//! let descriptor = JoinDescriptor::new("app-id", "consult-42", "token", "patient-7");
//! let tier = session.start(descriptor).await?;
//! println!("publishing: {}", tier);
//!
//! session.set_audio_enabled(false)?;
//! session.end().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod launcher;
pub mod lifecycle;
pub mod media;
pub mod registry;
pub mod rtc;
pub mod session;

pub use config::CallConfig;
pub use error::{
    CallError, CallResult, DeviceError, JoinError, RtcError, RtcResult, TeardownError,
    TeardownStep, TokenError,
};
pub use events::SessionEvent;
pub use launcher::{CallLauncher, CallTicket, LaunchedCall, PreparedCall, TokenIssuer};
pub use lifecycle::{CallRecordApi, CallRecordId, LifecycleReporter};
pub use media::{AcquisitionTier, LocalMedia, LocalMediaManager, PublishTier, TierFailure};
pub use registry::{
    PrefixedSurfaces, RegistryChange, RemoteParticipant, RemoteParticipantInfo,
    RemoteParticipantRegistry, RemoteSurfaces,
};
pub use rtc::{
    ChannelMode, LocalTrack, MediaDevices, MediaKind, ParticipantId, RemoteTrack, RtcClient,
    RtcClientConfig, RtcEvent, RtcEventSink, RtcProvider, SurfaceId, VideoCodec,
};
pub use session::{
    CallSession, CallSessionBuilder, CallState, JoinDescriptor, SessionGuard, SessionId,
    SessionSnapshot, TeardownReport,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
