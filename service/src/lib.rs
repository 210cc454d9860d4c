//! MsgVault - durable recorder for signed inbound-message webhooks.
//!
//! This library provides the modules behind the `msgvault-server` binary:
//! - `signature`: HMAC-SHA256 verification of webhook calls
//! - `store`: SQLite-backed message persistence with idempotent inserts
//! - `metrics`: in-process request counters and latency histograms
//! - `web`: axum router and handlers wiring the above together
//!
//! ## Architecture
//!
//! ```text
//! Webhook → Signature check → Validation → SQLite insert → Metrics → Ack
//! ```

pub mod config;
pub mod metrics;
pub mod signature;
pub mod store;
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use metrics::{Metrics, WebhookOutcome};
pub use store::{InsertOutcome, MessageStore, NewMessage};
pub use web::{app_router, AppState};
