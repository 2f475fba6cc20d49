//! # Telecare Backend Client
//!
//! REST adapter for the backend endpoints a call session consumes: the token
//! endpoint that turns an appointment into a [`CallTicket`](telecare_call_core::CallTicket)
//! and the call-record endpoints that bracket the call with start/end marks.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use telecare_backend_client::{BackendConfig, HttpBackend};
//! use telecare_call_core::{CallLauncher, MediaDevices, RtcProvider};
//!
//! # async fn example(
//! #     provider: Arc<dyn RtcProvider>,
//! #     devices: Arc<dyn MediaDevices>,
//! # ) -> anyhow::Result<()> {
//! let backend = Arc::new(HttpBackend::new(
//!     BackendConfig::new("https://api.example.test/api").with_bearer_token("jwt"),
//! )?);
//!
//! let launcher = CallLauncher::new(backend.clone(), backend, provider, devices);
//! let call = launcher.launch("appointment-42").await?;
//! call.session.end().await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod types;

pub use client::HttpBackend;
pub use config::BackendConfig;
pub use error::{BackendError, BackendResult};
pub use types::{ApiEnvelope, CallRecordRequest, GenerateTokenRequest};
