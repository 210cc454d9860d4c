//! Webhook payload schema and validation.
//!
//! Fields are validated eagerly, before any store mutation, and a failure
//! names the offending field. Whitespace around string fields is stripped
//! first, so `" m1 "` and `"m1"` are the same message id.

use serde::Deserialize;
use thiserror::Error;

/// Maximum accepted length of the message text, in characters.
const MAX_TEXT_CHARS: usize = 4096;

/// Body of a `POST /webhook` call.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct WebhookPayload {
    pub message_id: String,
    #[serde(rename = "from")]
    pub from_msisdn: String,
    #[serde(rename = "to")]
    pub to_msisdn: String,
    pub ts: String,
    #[serde(default)]
    pub text: Option<String>,
}

/// Validation failure for a webhook payload, by field.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("invalid payload: {0}")]
    Malformed(String),

    #[error("message_id must be non-empty")]
    EmptyMessageId,

    #[error("from must be E.164-like")]
    BadFrom,

    #[error("to must be E.164-like")]
    BadTo,

    #[error("ts must end with Z")]
    BadTimestamp,

    #[error("text must be at most 4096 characters")]
    TextTooLong,
}

impl WebhookPayload {
    /// Trim and validate every field, returning the normalized payload.
    pub fn validate(mut self) -> Result<Self, PayloadError> {
        self.message_id = self.message_id.trim().to_string();
        self.from_msisdn = self.from_msisdn.trim().to_string();
        self.to_msisdn = self.to_msisdn.trim().to_string();
        self.ts = self.ts.trim().to_string();

        if self.message_id.is_empty() {
            return Err(PayloadError::EmptyMessageId);
        }
        if !is_msisdn(&self.from_msisdn) {
            return Err(PayloadError::BadFrom);
        }
        if !is_msisdn(&self.to_msisdn) {
            return Err(PayloadError::BadTo);
        }
        if !self.ts.ends_with('Z') {
            return Err(PayloadError::BadTimestamp);
        }
        if let Some(text) = &self.text {
            if text.chars().count() > MAX_TEXT_CHARS {
                return Err(PayloadError::TextTooLong);
            }
        }

        Ok(self)
    }
}

/// `+` followed by one or more digits.
fn is_msisdn(value: &str) -> bool {
    match value.strip_prefix('+') {
        Some(digits) => !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}
