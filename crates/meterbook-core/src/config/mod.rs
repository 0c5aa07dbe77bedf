//! Sync configuration for client apps.
//!
//! `SyncSettings` is read from a JSON file and then overridden from the
//! environment. The group code and endpoint are safe to store; the bearer
//! token is accepted from the file for convenience but never logged.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::sync::{
    HttpTransport, SchedulerConfig, DEFAULT_DEBOUNCE, DEFAULT_REQUEST_TIMEOUT,
    DEFAULT_SYNC_INTERVAL,
};
use crate::util::{is_http_url, normalize_text_option};

pub const ENDPOINT_ENV: &str = "METERBOOK_ENDPOINT";
pub const GROUP_ENV: &str = "METERBOOK_GROUP";
pub const TOKEN_ENV: &str = "METERBOOK_SYNC_TOKEN";

/// User-editable sync settings.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct SyncSettings {
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Family/partner code shared by every device in the group
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default)]
    pub interval_secs: Option<u64>,
    #[serde(default)]
    pub debounce_ms: Option<u64>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl std::fmt::Debug for SyncSettings {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SyncSettings")
            .field("endpoint", &self.endpoint)
            .field("group_id", &self.group_id)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("interval_secs", &self.interval_secs)
            .field("debounce_ms", &self.debounce_ms)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl SyncSettings {
    /// Parse and validate settings JSON.
    pub fn parse(payload: &str) -> Result<Self> {
        let settings = serde_json::from_str::<Self>(payload)?;
        settings.normalized()
    }

    /// Load settings from `path`; a missing file yields defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        match std::fs::read_to_string(path.as_ref()) {
            Ok(payload) => Self::parse(&payload),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(error) => Err(error.into()),
        }
    }

    /// Write settings to `path` as pretty JSON, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut payload = serde_json::to_string_pretty(self)?;
        payload.push('\n');
        std::fs::write(path, payload)?;
        Ok(())
    }

    /// Apply `METERBOOK_*` overrides from the process environment.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup (environment, test fixtures).
    #[must_use]
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(endpoint) = normalize_text_option(lookup(ENDPOINT_ENV)) {
            self.endpoint = Some(endpoint);
        }
        if let Some(group_id) = normalize_text_option(lookup(GROUP_ENV)) {
            self.group_id = Some(group_id);
        }
        if let Some(token) = normalize_text_option(lookup(TOKEN_ENV)) {
            self.token = Some(token);
        }
        self
    }

    /// Trim values, drop empties and validate the endpoint scheme.
    pub fn normalized(self) -> Result<Self> {
        let endpoint = normalize_text_option(self.endpoint)
            .map(|endpoint| {
                if is_http_url(&endpoint) {
                    Ok(endpoint.trim_end_matches('/').to_string())
                } else {
                    Err(Error::Validation(
                        "endpoint must include http:// or https://".to_string(),
                    ))
                }
            })
            .transpose()?;

        if self.interval_secs == Some(0) {
            return Err(Error::Validation(
                "interval_secs must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            endpoint,
            group_id: normalize_text_option(self.group_id),
            token: normalize_text_option(self.token),
            ..self
        })
    }

    #[must_use]
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            interval: self
                .interval_secs
                .map_or(DEFAULT_SYNC_INTERVAL, Duration::from_secs),
            debounce: self
                .debounce_ms
                .map_or(DEFAULT_DEBOUNCE, Duration::from_millis),
        }
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout_secs
            .map_or(DEFAULT_REQUEST_TIMEOUT, Duration::from_secs)
    }

    /// HTTP transport for the configured endpoint, if any.
    pub fn http_transport(&self) -> Result<Option<HttpTransport>> {
        self.endpoint
            .as_ref()
            .map(|endpoint| {
                HttpTransport::new(endpoint.clone(), self.token.clone(), self.request_timeout())
                    .map_err(Error::from)
            })
            .transpose()
    }
}
