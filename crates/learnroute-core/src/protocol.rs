//! Caller-visible error wire shape.
//!
//! Every failed request answers with the same envelope so clients can branch
//! on `error.code` without inspecting the HTTP status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Error shape returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorShape {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Top-level error body: `{ "error": {...}, "timestamp": "..." }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorShape,
    pub timestamp: DateTime<Utc>,
}

impl ErrorBody {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorShape {
                code: code.into(),
                message: message.into(),
                details: None,
            },
            timestamp: Utc::now(),
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.error.details = Some(details);
        self
    }
}
