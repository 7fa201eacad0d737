// src/notify/mod.rs
pub mod discord;
pub mod embed;

use crate::error::SinkError;
use crate::types::NormalizedPost;

pub use discord::DiscordNotifier;

/// Delivery side of the relay.
///
/// The poll engine calls `deliver_post` and then, for posts with more than
/// one media item, `deliver_extra_media`. Any `Err` counts as a failed
/// delivery; the engine never panics on it.
#[async_trait::async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver_post(&self, post: &NormalizedPost) -> Result<(), SinkError>;

    async fn deliver_extra_media(&self, post: &NormalizedPost) -> Result<(), SinkError>;

    /// Operational warning (failing handle, degraded auth).
    async fn send_alert(&self, title: &str, body: &str) -> Result<(), SinkError>;

    /// Release the underlying channel on shutdown.
    async fn close(&self) {}
}
