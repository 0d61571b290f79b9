//! Transactional notifications.
//!
//! Composes the four notification kinds and hands them to a [`Transport`],
//! but only after the [`AbuseGuard`] allowed them. Rendering and delivery
//! belong to the transport.

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use serde_json::json;

use crate::Result;
use crate::addresslog::{LogReason, LogStore};
use crate::clock::Clock;
use crate::config::Config;
use crate::guard::{AbuseGuard, SendOutcome};
use crate::provision::AccountId;

/// Errors reported by a transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The relay refused the message.
    #[error("Rejected: {0}")]
    Rejected(String),

    /// The relay could not be reached.
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// The transport did not answer in time.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

/// Notification kinds and their templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Template {
    /// Nudge an unknown sender to register.
    NotRegistered,
    /// Tell a sender their mail was dropped.
    WrongRecipient,
    /// Ask a new secondary address to activate itself.
    Activation,
    /// Ask an existing user to confirm joining another account.
    Connection,
}

impl Template {
    /// Template identifier handed to the renderer.
    #[must_use]
    pub const fn id(&self) -> &'static str {
        match self {
            Self::NotRegistered => "mails/messages/not_registered_mail.txt",
            Self::WrongRecipient => "mails/messages/wrong_recipient_mail.txt",
            Self::Activation => "mails/messages/activation_mail.txt",
            Self::Connection => "mails/messages/connection_mail.txt",
        }
    }

    /// Guard flow that gates this notification.
    #[must_use]
    pub const fn reason(&self) -> LogReason {
        match self {
            Self::NotRegistered => LogReason::NotRegistered,
            Self::WrongRecipient => LogReason::WrongRecipient,
            Self::Activation | Self::Connection => LogReason::SpamGuard,
        }
    }

    /// Subject line for a site host.
    #[must_use]
    pub fn subject(&self, host: &str) -> String {
        match self {
            Self::NotRegistered => format!("Register at {host}!"),
            Self::WrongRecipient => format!("Your mail on {host} was deleted!"),
            Self::Activation => format!("Activate your address on {host}"),
            Self::Connection => format!("Confirm your address on {host}"),
        }
    }
}

/// A notification ready for rendering and delivery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    /// Template to render.
    pub template: Template,
    /// Sender address.
    pub sender: String,
    /// Recipient address.
    pub recipient: String,
    /// Subject line.
    pub subject: String,
    /// Values for the template.
    pub context: serde_json::Value,
}

/// Delivery of notifications.
pub trait Transport: Send + Sync {
    /// Render and deliver one notification.
    fn send(
        &self,
        notification: &Notification,
    ) -> impl Future<Output = std::result::Result<(), TransportError>> + Send;
}

/// Guard-gated sender for the four notification kinds.
pub struct NotificationDispatcher<S, C, T> {
    guard: AbuseGuard<S, C>,
    transport: T,
    site_url: String,
    host: String,
    sender: String,
    timeout: Duration,
}

impl<S: LogStore, C: Clock, T: Transport> NotificationDispatcher<S, C, T> {
    /// Create a dispatcher with site details from `config`.
    pub fn new(guard: AbuseGuard<S, C>, transport: T, config: &Config) -> Self {
        Self {
            guard,
            transport,
            site_url: config.site_url.clone(),
            host: config.host().to_string(),
            sender: config.sender.clone(),
            timeout: config.transport_timeout(),
        }
    }

    /// The guard gating this dispatcher.
    pub const fn guard(&self) -> &AbuseGuard<S, C> {
        &self.guard
    }

    /// The underlying transport.
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Build a notification for `recipient` with extra template values.
    ///
    /// `recipient` and `host` are always part of the context.
    #[must_use]
    pub fn compose(
        &self,
        template: Template,
        recipient: &str,
        extra: serde_json::Value,
    ) -> Notification {
        let mut context = json!({
            "recipient": recipient,
            "host": self.host,
        });
        if let (Some(context), serde_json::Value::Object(extra)) = (context.as_object_mut(), extra)
        {
            context.extend(extra);
        }

        Notification {
            template,
            sender: self.sender.clone(),
            recipient: recipient.to_string(),
            subject: template.subject(&self.host),
            context,
        }
    }

    /// Invite an unregistered sender to sign up. Sent at most once per address.
    ///
    /// # Errors
    ///
    /// Returns an error if the log store or the transport fails.
    pub async fn send_registration_mail(&self, recipient: &str) -> Result<SendOutcome> {
        let notification = self.compose(
            Template::NotRegistered,
            recipient,
            json!({ "url": self.site_url }),
        );
        self.dispatch(notification).await
    }

    /// Tell a sender their mail was deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the log store or the transport fails.
    pub async fn send_wrong_recipient_mail(&self, recipient: &str) -> Result<SendOutcome> {
        let notification = self.compose(Template::WrongRecipient, recipient, json!({}));
        self.dispatch(notification).await
    }

    /// Send the activation mail for an additional address.
    ///
    /// # Errors
    ///
    /// Returns an error if the log store or the transport fails.
    pub async fn send_activation_mail(&self, key: &str, recipient: &str) -> Result<SendOutcome> {
        let notification = self.compose(Template::Activation, recipient, json!({ "key": key }));
        self.dispatch(notification).await
    }

    /// Ask an existing user to confirm the connection to `account_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the log store or the transport fails.
    pub async fn send_connection_mail(
        &self,
        key: &str,
        recipient: &str,
        account_id: AccountId,
    ) -> Result<SendOutcome> {
        let notification = self.compose(
            Template::Connection,
            recipient,
            json!({ "key": key, "account_id": account_id.0 }),
        );
        self.dispatch(notification).await
    }

    async fn dispatch(&self, notification: Notification) -> Result<SendOutcome> {
        self.guard
            .attempt_send(
                &notification.recipient,
                notification.template.reason(),
                || self.deliver(&notification),
            )
            .await
    }

    async fn deliver(&self, notification: &Notification) -> std::result::Result<(), TransportError> {
        tokio::time::timeout(self.timeout, self.transport.send(notification))
            .await
            .map_err(|_| TransportError::Timeout(self.timeout))?
    }
}
