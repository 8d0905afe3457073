#![deny(missing_docs)]
//! Oxide LINE bot library.
//!
//! Webhook ingress, event dispatch, media handling and artifact cleanup for
//! a LINE Messaging API bot backed by an OpenAI-compatible completion service.

/// Event handling, media pipeline and cleanup sweep.
pub mod bot;
/// Configuration management.
pub mod config;
/// LINE Messaging API types and client.
pub mod line;
/// Completion providers.
pub mod llm;
/// HTTP routes.
pub mod server;
/// Public tunnel fallback.
pub mod tunnel;
