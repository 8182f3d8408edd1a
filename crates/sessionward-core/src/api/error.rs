use serde_json::Value;
use thiserror::Error;

use crate::transport::TransportError;

/// Runtime failure of an authentication attempt or an API call.
///
/// `Clone` so a single authentication failure can be handed to every call
/// that was waiting on it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("Authentication not needed - client uses an API token")]
    NotNeeded,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("API error (status {status}): {}", render_body(.body))]
    Api { status: u16, body: Value },

    #[error("Invalid response: {0}")]
    Decode(String),

    #[error("Authentication attempt ended without an outcome")]
    Abandoned,
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Truncate a response body to avoid logging excessive data
fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY_LENGTH;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
}

fn render_body(body: &Value) -> String {
    match body {
        Value::String(text) => truncate_body(text),
        other => truncate_body(&other.to_string()),
    }
}

impl ApiError {
    /// Build the error for a non-2xx response. A body that is not JSON is
    /// kept verbatim as a JSON string.
    pub fn from_status(status: u16, body: &str) -> Self {
        let body = if body.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()))
        };
        ApiError::Api { status, body }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self.status(), Some(401) | Some(403))
    }
}

impl From<TransportError> for ApiError {
    fn from(err: TransportError) -> Self {
        ApiError::Transport(err.0)
    }
}

// ============================================================================
// Tests
// ============================================================================
