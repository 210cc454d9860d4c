//! Web server module: routing, instrumentation, and endpoint handlers.
//!
//! Request flow for ingestion:
//! - Verify the HMAC signature over the raw body
//! - Validate the payload fields
//! - Insert into the message store (idempotent on `message_id`)
//! - Record the outcome in the metrics registry
//!
//! Query endpoints and probes skip verification and read straight through.

pub mod handlers;
pub mod payload;

pub use handlers::{
    app_router, AppError, AppState, HealthResponse, MessagesParams, WebhookAck, SIGNATURE_HEADER,
};
pub use payload::{PayloadError, WebhookPayload};
