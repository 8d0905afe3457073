/// Downloaded-artifact layout and public URLs
pub mod artifacts;
/// Event routing and batch handling
pub mod dispatcher;
/// Handler error type
pub mod error;
/// Per-kind event and message handlers
pub mod handlers;
/// Message content downloads
pub mod media;
/// Scheduled artifact cleanup
pub mod sweep;
/// Preview generation
pub mod transcode;

pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use error::BotError;
pub use handlers::BotContext;
