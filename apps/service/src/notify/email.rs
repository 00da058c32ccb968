use std::time::Duration;

use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, info};

use super::{Notification, Notifier, NotifyError};
use crate::config::{EmailConfig, TlsMode};

const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

/// SMTP notifier sending one message per notification to every recipient.
pub struct EmailNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    recipients: Vec<Mailbox>,
}

impl EmailNotifier {
    /// Build the transport and parse every address up front, so a bad
    /// mailbox fails at startup instead of at the first recovery.
    ///
    /// Must be called from within a Tokio runtime: the pooled transport
    /// spawns its connection pool task when built.
    pub fn from_config(config: &EmailConfig) -> Result<Self, NotifyError> {
        if config.recipients.is_empty() {
            return Err(NotifyError::NoRecipients);
        }

        let from = parse_mailbox(&config.sender().unwrap_or_default())?;
        let recipients =
            config.recipients.iter().map(|r| parse_mailbox(r)).collect::<Result<Vec<_>, _>>()?;

        let mut builder = match config.tls {
            TlsMode::Implicit => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?,
            TlsMode::Starttls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?,
            TlsMode::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host),
        }
        .port(config.port)
        .timeout(Some(SMTP_TIMEOUT));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        debug!(host = %config.host, port = config.port, tls = %config.tls, "SMTP transport configured");

        Ok(Self { transport: builder.build(), from, recipients })
    }

    /// Render a notification into a message addressed to every recipient.
    pub fn build_message(&self, notification: &Notification) -> Result<Message, NotifyError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(notification.subject.clone())
            .header(ContentType::TEXT_PLAIN);

        for recipient in &self.recipients {
            builder = builder.to(recipient.clone());
        }

        Ok(builder.body(notification.body.clone())?)
    }
}

#[async_trait::async_trait]
impl Notifier for EmailNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let message = self.build_message(notification)?;
        let response = self.transport.send(message).await?;

        info!(
            subject = %notification.subject,
            recipients = self.recipients.len(),
            code = %response.code(),
            "email sent"
        );
        Ok(())
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, NotifyError> {
    address
        .parse::<Mailbox>()
        .map_err(|source| NotifyError::Address { address: address.to_string(), source })
}
