//! Call launcher
//!
//! Turns an appointment into a started [`CallSession`]: request a ticket from
//! the backend token endpoint, build the join descriptor from it and start
//! the session with lifecycle reporting wired to the ticket's call record.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info};

use crate::config::CallConfig;
use crate::error::{CallResult, TokenError};
use crate::lifecycle::{CallRecordApi, CallRecordId};
use crate::media::PublishTier;
use crate::registry::{PrefixedSurfaces, RemoteSurfaces};
use crate::rtc::{MediaDevices, ParticipantId, RtcProvider};
use crate::session::{CallSession, JoinDescriptor};

/// Token endpoint response
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallTicket {
    pub token: String,
    pub channel_name: String,
    pub app_id: String,
    /// Numeric or textual; stored as text
    #[serde(deserialize_with = "uid_from_number_or_text")]
    pub uid: ParticipantId,
    pub video_call_id: CallRecordId,
}

impl CallTicket {
    pub fn descriptor(&self) -> JoinDescriptor {
        JoinDescriptor::new(
            self.app_id.clone(),
            self.channel_name.clone(),
            self.token.clone(),
            self.uid.clone(),
        )
    }
}

impl fmt::Debug for CallTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallTicket")
            .field("token", &"<redacted>")
            .field("channel_name", &self.channel_name)
            .field("app_id", &self.app_id)
            .field("uid", &self.uid)
            .field("video_call_id", &self.video_call_id)
            .finish()
    }
}

fn uid_from_number_or_text<'de, D>(deserializer: D) -> Result<ParticipantId, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Uid {
        Number(u64),
        Text(String),
    }

    Ok(match Uid::deserialize(deserializer)? {
        Uid::Number(n) => ParticipantId::new(n.to_string()),
        Uid::Text(s) => ParticipantId::new(s),
    })
}

/// Backend token endpoint
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    /// Fails with `Authorization` when the caller is not a participant of the
    /// appointment and `NotFound` when the appointment does not exist
    async fn generate_token(&self, appointment_id: &str) -> Result<CallTicket, TokenError>;
}

/// A session built from a ticket but not started yet
#[derive(Debug, Clone)]
pub struct PreparedCall {
    pub session: CallSession,
    pub ticket: CallTicket,
}

impl PreparedCall {
    pub async fn start(self) -> CallResult<LaunchedCall> {
        let tier = self.session.start(self.ticket.descriptor()).await?;
        Ok(LaunchedCall {
            session: self.session,
            ticket: self.ticket,
            tier,
        })
    }
}

/// A session that reached `Connected`
#[derive(Debug, Clone)]
pub struct LaunchedCall {
    pub session: CallSession,
    pub ticket: CallTicket,
    pub tier: PublishTier,
}

/// Appointment-to-session entry point
pub struct CallLauncher {
    issuer: Arc<dyn TokenIssuer>,
    records: Arc<dyn CallRecordApi>,
    provider: Arc<dyn RtcProvider>,
    devices: Arc<dyn MediaDevices>,
    config: CallConfig,
    surfaces: Arc<dyn RemoteSurfaces>,
}

impl fmt::Debug for CallLauncher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallLauncher").field("config", &self.config).finish()
    }
}

impl CallLauncher {
    pub fn new(
        issuer: Arc<dyn TokenIssuer>,
        records: Arc<dyn CallRecordApi>,
        provider: Arc<dyn RtcProvider>,
        devices: Arc<dyn MediaDevices>,
    ) -> Self {
        Self {
            issuer,
            records,
            provider,
            devices,
            config: CallConfig::default(),
            surfaces: Arc::new(PrefixedSurfaces::default()),
        }
    }

    pub fn with_config(mut self, config: CallConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_surfaces(mut self, surfaces: Arc<dyn RemoteSurfaces>) -> Self {
        self.surfaces = surfaces;
        self
    }

    /// Request a ticket and build an unstarted session for it
    ///
    /// Hold a [`guard`](CallSession::guard) on the returned session before
    /// starting it if the consumer may go away during setup.
    pub async fn prepare(&self, appointment_id: &str) -> CallResult<PreparedCall> {
        let appointment_id = appointment_id.trim();
        if appointment_id.is_empty() {
            return Err(TokenError::MissingAppointment.into());
        }

        debug!("Requesting call ticket for appointment {}", appointment_id);
        let ticket = self.issuer.generate_token(appointment_id).await?;
        info!(
            "Received ticket for appointment {} (channel {}, call record {})",
            appointment_id, ticket.channel_name, ticket.video_call_id
        );

        let session = CallSession::builder(self.provider.clone(), self.devices.clone())
            .config(self.config.clone())
            .surfaces(self.surfaces.clone())
            .lifecycle(self.records.clone(), ticket.video_call_id.clone())
            .build();

        Ok(PreparedCall { session, ticket })
    }

    /// Request a ticket and start the session; token errors create no session
    pub async fn launch(&self, appointment_id: &str) -> CallResult<LaunchedCall> {
        self.prepare(appointment_id).await?.start().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticket_accepts_numeric_uid() {
        let ticket: CallTicket = serde_json::from_str(
            r#"{"token":"t","channelName":"appt-9","appId":"app","uid":4242,"videoCallId":"vc-9"}"#,
        )
        .unwrap();

        assert_eq!(ticket.uid, ParticipantId::from("4242"));
        let descriptor = ticket.descriptor();
        assert_eq!(descriptor.channel(), "appt-9");
        assert_eq!(descriptor.identity().as_str(), "4242");
    }

    #[test]
    fn test_ticket_accepts_text_uid_and_hides_token() {
        let ticket: CallTicket = serde_json::from_value(serde_json::json!({
            "token": "secret",
            "channelName": "c",
            "appId": "a",
            "uid": "patient-1",
            "videoCallId": "vc"
        }))
        .unwrap();

        assert_eq!(ticket.uid.as_str(), "patient-1");
        assert!(!format!("{:?}", ticket).contains("secret"));
    }
}
