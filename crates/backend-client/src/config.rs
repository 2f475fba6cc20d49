//! Backend client configuration

use std::time::Duration;

use crate::error::{BackendError, BackendResult};

pub const API_URL_ENV: &str = "TELECARE_API_URL";
pub const API_TOKEN_ENV: &str = "TELECARE_API_TOKEN";
pub const API_TIMEOUT_ENV: &str = "TELECARE_API_TIMEOUT_SECS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    /// API root, e.g. `http://localhost:5000/api`
    pub base_url: String,
    /// Sent as `Authorization: Bearer ...` when set
    pub bearer_token: Option<String>,
    pub request_timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000/api".to_string(),
            bearer_token: None,
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl BackendConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Read `TELECARE_API_URL`, `TELECARE_API_TOKEN` and
    /// `TELECARE_API_TIMEOUT_SECS`; unset variables keep their defaults
    pub fn from_env() -> BackendResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> BackendResult<Self> {
        let mut config = Self::default();

        if let Some(url) = lookup(API_URL_ENV) {
            config.base_url = url;
        }
        if let Some(token) = lookup(API_TOKEN_ENV).filter(|t| !t.is_empty()) {
            config.bearer_token = Some(token);
        }
        if let Some(secs) = lookup(API_TIMEOUT_ENV) {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                BackendError::configuration(format!(
                    "{} must be whole seconds, got {:?}",
                    API_TIMEOUT_ENV, secs
                ))
            })?;
            config.request_timeout = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> BackendResult<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(BackendError::configuration(format!(
                "base URL must be http(s), got {:?}",
                self.base_url
            )));
        }
        if self.request_timeout.is_zero() {
            return Err(BackendError::configuration("request timeout must be non-zero"));
        }
        Ok(())
    }

    /// `{base_url}/{path}` without doubled slashes
    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_env_overrides_defaults() {
        let config = BackendConfig::from_lookup(lookup(&[
            (API_URL_ENV, "https://api.example.test/api/"),
            (API_TOKEN_ENV, "jwt"),
            (API_TIMEOUT_ENV, "3"),
        ]))
        .unwrap();

        assert_eq!(config.bearer_token.as_deref(), Some("jwt"));
        assert_eq!(config.request_timeout, Duration::from_secs(3));
        assert_eq!(
            config.endpoint("/video-calls/token"),
            "https://api.example.test/api/video-calls/token"
        );
    }

    #[test]
    fn test_empty_env_keeps_defaults() {
        let config = BackendConfig::from_lookup(lookup(&[(API_TOKEN_ENV, "")])).unwrap();
        assert_eq!(config, BackendConfig::default());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(BackendConfig::from_lookup(lookup(&[(API_TIMEOUT_ENV, "soon")])).is_err());
        assert!(BackendConfig::from_lookup(lookup(&[(API_TIMEOUT_ENV, "0")])).is_err());
        assert!(BackendConfig::from_lookup(lookup(&[(API_URL_ENV, "localhost:5000")])).is_err());
    }
}
