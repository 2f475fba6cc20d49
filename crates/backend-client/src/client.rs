//! HTTP client for the video-call endpoints

use std::fmt;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use telecare_call_core::{CallRecordApi, CallRecordId, CallTicket, TokenError, TokenIssuer};
use tracing::{debug, warn};

use crate::config::BackendConfig;
use crate::error::{BackendError, BackendResult};
use crate::types::{ApiEnvelope, CallRecordRequest, ErrorBody, GenerateTokenRequest};

/// `reqwest`-backed token issuer and call-record reporter
#[derive(Clone)]
pub struct HttpBackend {
    http: reqwest::Client,
    config: BackendConfig,
}

impl fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpBackend")
            .field("base_url", &self.config.base_url)
            .field("authenticated", &self.config.bearer_token.is_some())
            .field("request_timeout", &self.config.request_timeout)
            .finish()
    }
}

impl HttpBackend {
    pub fn new(config: BackendConfig) -> BackendResult<Self> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { http, config })
    }

    pub fn from_env() -> BackendResult<Self> {
        Self::new(BackendConfig::from_env()?)
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// `POST /video-calls/token`
    pub async fn request_token(&self, appointment_id: &str) -> BackendResult<CallTicket> {
        self.post("video-calls/token", &GenerateTokenRequest { appointment_id })
            .await?
            .ok_or_else(|| BackendError::decode("token response carried no data"))
    }

    /// `POST /video-calls/start`
    pub async fn mark_started(&self, call_id: &CallRecordId) -> BackendResult<()> {
        self.post_call_record("video-calls/start", call_id).await
    }

    /// `POST /video-calls/end`
    pub async fn mark_ended(&self, call_id: &CallRecordId) -> BackendResult<()> {
        self.post_call_record("video-calls/end", call_id).await
    }

    async fn post_call_record(&self, path: &str, call_id: &CallRecordId) -> BackendResult<()> {
        let body = CallRecordRequest {
            video_call_id: call_id.as_str(),
        };
        self.post::<_, serde_json::Value>(path, &body).await.map(|_| ())
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> BackendResult<Option<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.config.endpoint(path);
        debug!("POST {}", url);

        let mut request = self.http.post(&url).json(body);
        if let Some(token) = &self.config.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let fallback = status.canonical_reason().unwrap_or("request failed");
            let message = serde_json::from_str::<ErrorBody>(&text)
                .unwrap_or_default()
                .message_or(fallback);
            warn!("POST {} failed with HTTP {}: {}", url, status.as_u16(), message);
            return Err(BackendError::from_status(status.as_u16(), message));
        }

        let envelope: ApiEnvelope<T> = serde_json::from_str(&text)
            .map_err(|e| BackendError::decode(format!("{}: {}", path, e)))?;
        if !envelope.success {
            let message = envelope
                .message
                .unwrap_or_else(|| "request was not successful".to_string());
            warn!("POST {} rejected: {}", url, message);
            return Err(BackendError::Rejected { message });
        }

        Ok(envelope.data)
    }
}

#[async_trait]
impl TokenIssuer for HttpBackend {
    async fn generate_token(&self, appointment_id: &str) -> Result<CallTicket, TokenError> {
        self.request_token(appointment_id)
            .await
            .map_err(|e| e.into_token_error(appointment_id))
    }
}

#[async_trait]
impl CallRecordApi for HttpBackend {
    async fn start_call(&self, call_id: &CallRecordId) -> anyhow::Result<()> {
        Ok(self.mark_started(call_id).await?)
    }

    async fn end_call(&self, call_id: &CallRecordId) -> anyhow::Result<()> {
        Ok(self.mark_ended(call_id).await?)
    }
}
