//! Wire types of the video-call endpoints

use serde::{Deserialize, Serialize};

/// Response envelope shared by every endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    #[serde(default = "Option::default")]
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateTokenRequest<'a> {
    pub appointment_id: &'a str,
}

/// Body of both `/video-calls/start` and `/video-calls/end`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRecordRequest<'a> {
    pub video_call_id: &'a str,
}

/// Body of an error response; every field is optional
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ErrorBody {
    pub(crate) fn message_or(self, fallback: &str) -> String {
        self.message
            .or(self.error)
            .unwrap_or_else(|| fallback.to_string())
    }
}
