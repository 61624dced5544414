//! Notification channel from the backend to the presentation surface.
//!
//! Delivery is one-way and ordered per connection, with no acknowledgement
//! and no replay after a reconnect: messages sent while disconnected are
//! lost. The presentation surface corroborates against the server-reported
//! `updatedAt` stamp (see [`crate::store::CacheEntry::is_behind`]) and falls
//! back to a full refetch when it detects a gap.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::directive::Directive;

/// One directive batch addressed to the presentation surface's replica.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectiveBatchNotification {
    /// Provider the pull request belongs to.
    pub provider_id: String,
    /// The opaque logical pull request id, exactly as the caller holds it.
    pub pull_request_id: String,
    /// The ordered directive batch to apply.
    pub directives: Vec<Directive>,
}

/// Errors surfaced while publishing a notification.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NotifyError {
    /// The channel to the presentation surface is unavailable.
    #[error("notification channel unavailable: {message}")]
    ChannelUnavailable {
        /// Error detail from the channel.
        message: String,
    },
}

/// Ordered, at-least-once delivery channel to the presentation surface.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationBus: Send + Sync {
    /// Publishes one directive batch.
    async fn publish(&self, notification: DirectiveBatchNotification) -> Result<(), NotifyError>;
}
