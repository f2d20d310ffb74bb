//! Mail errors

use std::{io, path::PathBuf, time::Duration};

use css_inline::InlineError;
use lettre::address::AddressError;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use super::{EmailAddress, Message};

/// Errors returned to the caller of [`MailSender::submit`](super::MailSender::submit).
///
/// The rejected message is handed back so the caller decides what happens to it.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// Shutdown has begun and the dispatcher accepts no new work
    #[error("the mail dispatcher is shutting down")]
    ShuttingDown(Box<Message>),

    /// The queue stayed full for the whole submission timeout
    #[error("the mail queue is full")]
    QueueFull(Box<Message>),
}

impl SubmitError {
    /// Returns the message that was not accepted
    pub fn into_message(self) -> Message {
        match self {
            Self::ShuttingDown(message) | Self::QueueFull(message) => *message,
        }
    }
}

/// Errors raised while rendering a template
#[derive(Debug, Error)]
pub enum RenderError {
    /// No template with this name exists
    #[error("unknown template \"{0}\"")]
    UnknownTemplate(String),

    /// The template engine failed
    #[error("template rendering failed")]
    TemplateError(#[source] askama::Error),

    /// CSS could not be inlined into the rendered markup
    #[error("could not inline CSS")]
    InlineError(#[source] InlineError),
}

impl From<askama::Error> for RenderError {
    fn from(err: askama::Error) -> Self {
        debug!("askama::Error -> RenderError");

        RenderError::TemplateError(err)
    }
}

impl From<InlineError> for RenderError {
    fn from(err: InlineError) -> Self {
        debug!("InlineError -> RenderError");

        RenderError::InlineError(err)
    }
}

/// Errors raised by a [`MailTransport`](super::MailTransport)
#[derive(Debug, Error)]
pub enum TransportError {
    /// An address could not be used by the transport
    #[error("invalid email address")]
    InvalidEmail,

    /// The message could not be assembled
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// The server rejected the message or could not be reached
    #[error("an error occurred while sending the email")]
    SendError(#[source] anyhow::Error),
}

impl From<AddressError> for TransportError {
    fn from(_err: AddressError) -> Self {
        TransportError::InvalidEmail
    }
}

impl From<lettre::error::Error> for TransportError {
    fn from(err: lettre::error::Error) -> Self {
        TransportError::InvalidMessage(err.to_string())
    }
}

impl From<lettre::transport::smtp::Error> for TransportError {
    fn from(err: lettre::transport::smtp::Error) -> Self {
        TransportError::SendError(err.into())
    }
}

/// Why a single message could not be delivered
#[derive(Debug, Error)]
pub enum DeliveryFailure {
    /// The body could not be rendered
    #[error("could not render the message body")]
    Render(#[from] RenderError),

    /// An attachment could not be read
    #[error("could not read attachment {}", .path.display())]
    Attachment {
        /// The attachment's path
        path: PathBuf,

        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The transport failed
    #[error("could not transmit the message")]
    Transport(#[from] TransportError),

    /// The transport panicked while sending
    #[error("the transport panicked: {0}")]
    Panicked(String),

    /// The transport did not finish in time
    #[error("the transport did not respond within {0:?}")]
    Timeout(Duration),
}

/// A failed delivery, reported on the dispatcher's error stream
#[derive(Debug, Error)]
#[error("failed to deliver message {message_id} (\"{subject}\") to {to}")]
pub struct DeliveryError {
    /// The message's id
    pub message_id: Uuid,

    /// The message's recipient
    pub to: EmailAddress,

    /// The message's subject
    pub subject: String,

    /// What went wrong
    #[source]
    pub failure: DeliveryFailure,
}

impl DeliveryError {
    /// Creates a delivery error for `message`
    pub fn new(message: &Message, failure: impl Into<DeliveryFailure>) -> Self {
        Self {
            message_id: message.id,
            to: message.to.clone(),
            subject: message.subject.clone(),
            failure: failure.into(),
        }
    }
}
