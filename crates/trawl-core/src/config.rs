use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::headers::Headers;
use crate::job::{Auth, Body, BodyEncoding, Method};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Engine-wide request defaults.
///
/// Read-only once handed to an engine; every job falls back to these for the
/// request fields it leaves unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineDefaults {
    pub headers: Headers,
    pub method: Method,
    #[serde(with = "crate::util::millis")]
    pub timeout: Option<Duration>,
    pub auth: Option<Auth>,
    pub body: Option<Body>,
    #[serde(alias = "bodyType")]
    pub body_encoding: Option<BodyEncoding>,
}

impl Default for EngineDefaults {
    fn default() -> Self {
        Self {
            headers: Headers::new(),
            method: Method::Get,
            timeout: Some(DEFAULT_TIMEOUT),
            auth: None,
            body: None,
            body_encoding: None,
        }
    }
}

impl EngineDefaults {
    /// Read defaults from environment variables.
    ///
    /// - `TRAWL_TIMEOUT_MS` (optional, defaults to 30000)
    /// - `TRAWL_USER_AGENT` (optional)
    /// - `TRAWL_METHOD` (optional, defaults to GET)
    pub fn from_env() -> Result<Self, AppError> {
        let mut defaults = Self::default();

        if let Ok(raw) = std::env::var("TRAWL_TIMEOUT_MS") {
            let millis: u64 = raw.parse().map_err(|_| {
                AppError::ConfigError(format!(
                    "Invalid TRAWL_TIMEOUT_MS '{raw}': must be a positive integer"
                ))
            })?;
            if millis == 0 {
                return Err(AppError::ConfigError(
                    "TRAWL_TIMEOUT_MS must be at least 1".into(),
                ));
            }
            defaults.timeout = Some(Duration::from_millis(millis));
        }

        if let Ok(agent) = std::env::var("TRAWL_USER_AGENT") {
            defaults.headers.insert("user-agent", agent);
        }

        if let Ok(raw) = std::env::var("TRAWL_METHOD") {
            defaults.method = raw.parse().map_err(AppError::ConfigError)?;
        }

        Ok(defaults)
    }

    /// Load defaults from a JSON file. Missing keys keep their default value.
    pub fn from_json_file(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::ConfigError(format!(
                "Failed to read defaults file {}: {e}",
                path.display()
            ))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            AppError::ConfigError(format!(
                "Invalid JSON in defaults file {}: {e}",
                path.display()
            ))
        })
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_auth(mut self, auth: Auth) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_body_encoding(mut self, encoding: BodyEncoding) -> Self {
        self.body_encoding = Some(encoding);
        self
    }
}
