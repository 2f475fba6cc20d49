//! Call session configuration
//!
//! [`CallConfig`] deserializes from any serde format and every field has a
//! default, so partial documents are accepted:
//!
//! ```rust
//! use telecare_call_core::{CallConfig, AcquisitionTier};
//!
//! let config: CallConfig = serde_json::from_str(r#"{
//!     "acquisition_tiers": ["microphone_only"],
//!     "local_preview": "local-video"
//! }"#).unwrap();
//!
//! assert_eq!(config.acquisition_tiers, vec![AcquisitionTier::MicrophoneOnly]);
//! assert_eq!(config.event_buffer, 256);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::media::AcquisitionTier;
use crate::rtc::{RtcClientConfig, SurfaceId};

/// Configuration for one call session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallConfig {
    /// Passed to the provider when the client is created
    pub client: RtcClientConfig,

    /// Ordered fallback chain; receive-only is always appended
    pub acquisition_tiers: Vec<AcquisitionTier>,

    /// Surface that mirrors the local camera, if the UI has one
    pub local_preview: Option<SurfaceId>,

    /// Capacity of the session event broadcast channel
    pub event_buffer: usize,

    /// Upper bound for one best-effort lifecycle report, in milliseconds
    pub report_timeout_ms: u64,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            client: RtcClientConfig::default(),
            acquisition_tiers: vec![
                AcquisitionTier::CameraAndMicrophone,
                AcquisitionTier::MicrophoneOnly,
            ],
            local_preview: None,
            event_buffer: 256,
            report_timeout_ms: 10_000,
        }
    }
}

impl CallConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(mut self, client: RtcClientConfig) -> Self {
        self.client = client;
        self
    }

    pub fn with_acquisition_tiers(mut self, tiers: Vec<AcquisitionTier>) -> Self {
        self.acquisition_tiers = tiers;
        self
    }

    /// Join without ever touching the camera
    pub fn audio_only(self) -> Self {
        self.with_acquisition_tiers(vec![AcquisitionTier::MicrophoneOnly])
    }

    pub fn with_local_preview(mut self, surface: impl Into<SurfaceId>) -> Self {
        self.local_preview = Some(surface.into());
        self
    }

    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity;
        self
    }

    pub fn with_report_timeout(mut self, timeout: Duration) -> Self {
        self.report_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn report_timeout(&self) -> Duration {
        Duration::from_millis(self.report_timeout_ms)
    }

    /// Broadcast capacity, never zero
    pub(crate) fn event_capacity(&self) -> usize {
        self.event_buffer.max(1)
    }
}
