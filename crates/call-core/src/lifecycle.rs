//! Call Lifecycle Reporter
//!
//! Best-effort bookkeeping of call start/end against the backend. A report
//! never surfaces an error to the caller and never blocks longer than the
//! configured timeout.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Backend identifier of the call record (`videoCallId`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallRecordId(String);

impl CallRecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallRecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CallRecordId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Backend call-record endpoints
#[async_trait]
pub trait CallRecordApi: Send + Sync {
    async fn start_call(&self, call_id: &CallRecordId) -> anyhow::Result<()>;

    async fn end_call(&self, call_id: &CallRecordId) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Start,
    End,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Start => write!(f, "start"),
            Phase::End => write!(f, "end"),
        }
    }
}

/// Fire-and-forget reporter over a [`CallRecordApi`]
#[derive(Clone)]
pub struct LifecycleReporter {
    api: Arc<dyn CallRecordApi>,
    timeout: Duration,
}

impl fmt::Debug for LifecycleReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleReporter")
            .field("api", &"<call record api>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl LifecycleReporter {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(api: Arc<dyn CallRecordApi>) -> Self {
        Self {
            api,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Report call start; returns whether the backend acknowledged it
    pub async fn report_start(&self, call_id: &CallRecordId) -> bool {
        self.report(Phase::Start, call_id).await
    }

    /// Report call end; returns whether the backend acknowledged it
    pub async fn report_end(&self, call_id: &CallRecordId) -> bool {
        self.report(Phase::End, call_id).await
    }

    /// Report call start on a background task
    pub fn spawn_report_start(&self, call_id: CallRecordId) -> JoinHandle<bool> {
        let reporter = self.clone();
        tokio::spawn(async move { reporter.report_start(&call_id).await })
    }

    async fn report(&self, phase: Phase, call_id: &CallRecordId) -> bool {
        let request = async {
            match phase {
                Phase::Start => self.api.start_call(call_id).await,
                Phase::End => self.api.end_call(call_id).await,
            }
        };

        match tokio::time::timeout(self.timeout, request).await {
            Ok(Ok(())) => {
                debug!("Reported call {} for {}", phase, call_id);
                true
            }
            Ok(Err(e)) => {
                warn!("Failed to report call {} for {}: {:#}", phase, call_id, e);
                false
            }
            Err(_) => {
                warn!(
                    "Reporting call {} for {} timed out after {:?}",
                    phase, call_id, self.timeout
                );
                false
            }
        }
    }
}
