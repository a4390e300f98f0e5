use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use url::ParseError;

#[derive(Debug, Error)]
pub enum PrerenderError {
    #[error("Load failed: {url}")]
    LoadFailed { url: String },

    #[error("Script evaluation failed: {0}")]
    Script(String),

    #[error("Unexpected script result: {0}")]
    UnexpectedValue(String),

    #[error("Page at {url} did not signal readiness within {timeout:?}")]
    ReadinessTimeout { url: String, timeout: Duration },

    #[error("Rendering engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("Page has been closed")]
    PageClosed,

    #[error("A navigation is already in flight; wait() for it before opening another address")]
    NavigationInFlight,

    #[error("No navigation in flight; open() an address before wait()")]
    NoNavigation,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] ParseError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Config parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

impl PrerenderError {
    pub fn load_failed(url: impl Into<String>) -> Self {
        PrerenderError::LoadFailed { url: url.into() }
    }

    pub fn script(message: impl Into<String>) -> Self {
        PrerenderError::Script(message.into())
    }

    pub fn engine_unavailable(message: impl Into<String>) -> Self {
        PrerenderError::EngineUnavailable(message.into())
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            PrerenderError::LoadFailed { .. } => ErrorCategory::Load,
            PrerenderError::Script(_) | PrerenderError::UnexpectedValue(_) => ErrorCategory::Script,
            PrerenderError::ReadinessTimeout { .. } => ErrorCategory::Timeout,
            PrerenderError::EngineUnavailable(_) => ErrorCategory::Engine,
            PrerenderError::PageClosed
            | PrerenderError::NavigationInFlight
            | PrerenderError::NoNavigation => ErrorCategory::Usage,
            PrerenderError::Io(_) => ErrorCategory::Io,
            PrerenderError::InvalidUrl(_)
            | PrerenderError::Config(_)
            | PrerenderError::TomlParse(_) => ErrorCategory::Config,
        }
    }

    pub fn to_payload(&self) -> ErrorPayload {
        let remediation = match self {
            PrerenderError::LoadFailed { .. } => {
                "Check that the target application is running and reachable from this host."
            }
            PrerenderError::Script(_) | PrerenderError::UnexpectedValue(_) => {
                "Inspect the page's JavaScript console; the snapshot scripts must run without throwing."
            }
            PrerenderError::ReadinessTimeout { .. } => {
                "Make sure the page sets window.$renderStaticReady = true, increase --wait, or pass --unfinished."
            }
            PrerenderError::EngineUnavailable(msg) => {
                if msg.to_ascii_lowercase().contains("chromium feature") {
                    "Rebuild with `--features chromium` to enable the headless Chromium engine."
                } else {
                    "Verify Chromium is installed (or pass --chrome PATH); try --no-sandbox inside containers."
                }
            }
            PrerenderError::PageClosed
            | PrerenderError::NavigationInFlight
            | PrerenderError::NoNavigation => {
                "Pair every open() with wait() and do not use a session after close()."
            }
            PrerenderError::Io(_) => "Check that the bind address is free and that output can be written.",
            PrerenderError::InvalidUrl(_) => {
                "Verify the target URL includes http(s):// (e.g., http://localhost:3000)."
            }
            PrerenderError::Config(_) | PrerenderError::TomlParse(_) => {
                "Check the config file and flags (e.g., --wait 3s, --redirect-prefixes /static,/api)."
            }
        };
        ErrorPayload::new(self.category(), self.to_string(), remediation)
    }
}

pub type Result<T> = std::result::Result<T, PrerenderError>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Load,
    Script,
    Timeout,
    Engine,
    Usage,
    Config,
    Io,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub category: ErrorCategory,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

impl ErrorPayload {
    pub fn new(category: ErrorCategory, message: String, remediation: impl Into<String>) -> Self {
        Self {
            category,
            message,
            remediation: Some(remediation.into()),
        }
    }
}
