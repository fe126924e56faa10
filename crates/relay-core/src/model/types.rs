use std::fmt;

/// Model parameters that come from configuration and are fixed per process.
#[derive(Clone, Debug, PartialEq)]
pub struct CompletionSettings {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
}

/// Normalized request for a single-turn completion.
///
/// The prompt is the only message; the system prompt travels as a separate
/// field and is never concatenated into it.
#[derive(Clone, Debug, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    pub model: String,
}

impl CompletionRequest {
    pub fn new(settings: &CompletionSettings, prompt: &str, system_prompt: Option<&str>) -> Self {
        Self {
            prompt: prompt.to_string(),
            system_prompt: system_prompt
                .filter(|s| !s.trim().is_empty())
                .map(str::to_string),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            model: settings.model.clone(),
        }
    }
}

/// Whether a failed call is worth retrying.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// Network failures, timeouts, 5xx.
    Transient,
    /// 4xx and responses that violate the API contract.
    Permanent,
}

impl fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiErrorKind::Transient => f.write_str("transient"),
            ApiErrorKind::Permanent => f.write_str("permanent"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{kind} error{}: {message}", status_suffix(.status))]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (status {s})")).unwrap_or_default()
}

impl ApiError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: ApiErrorKind::Transient,
            status: None,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: ApiErrorKind::Permanent,
            status: None,
            message: message.into(),
        }
    }

    /// Classify an HTTP error status: 5xx is transient, everything else permanent.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let kind = if (500..600).contains(&status) {
            ApiErrorKind::Transient
        } else {
            ApiErrorKind::Permanent
        };
        Self {
            kind,
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind == ApiErrorKind::Transient
    }
}
