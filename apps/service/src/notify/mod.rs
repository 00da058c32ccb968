/// Outbound notifications
///
/// The engine only knows the [`Notifier`] trait; SMTP delivery lives in
/// [`email`] and the message wording in [`templates`].
pub mod email;
pub mod templates;

use thiserror::Error;

pub use email::EmailNotifier;

/// A subject and body destined for the configured recipient list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub subject: String,
    pub body: String,
}

impl Notification {
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self { subject: subject.into(), body: body.into() }
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("invalid email address {address:?}: {source}")]
    Address {
        address: String,
        #[source]
        source: lettre::address::AddressError,
    },
    #[error("failed to build message: {0}")]
    Build(#[from] lettre::error::Error),
    #[error("SMTP delivery failed: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
    #[error("no recipients configured")]
    NoRecipients,
}

/// Delivers notifications to a fixed recipient list.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}
