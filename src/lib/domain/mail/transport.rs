//! Mail transport seam

use async_trait::async_trait;
use uuid::Uuid;

#[cfg(test)]
use mockall::mock;

use super::{EmailAddress, TransportError};

/// The body of an outgoing email
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Content {
    /// A `text/plain` body
    Plain(String),

    /// A `text/html` body
    Html(String),

    /// HTML with a plain text alternative
    Alternative {
        /// The plain text version
        plain: String,

        /// The HTML version
        html: String,
    },
}

/// An attachment read into memory
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadedAttachment {
    /// The file name shown to the recipient
    pub name: String,

    /// The MIME type of the attachment
    pub content_type: String,

    /// The file contents
    pub body: Vec<u8>,
}

/// A fully resolved email, ready to be handed to a transport
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingEmail {
    /// Id of the message this email was built from
    pub message_id: Uuid,

    /// The sender
    pub from: EmailAddress,

    /// The sender's display name
    pub from_name: Option<String>,

    /// The recipient
    pub to: EmailAddress,

    /// The subject
    pub subject: String,

    /// The body
    pub content: Content,

    /// Attachments in order
    pub attachments: Vec<LoadedAttachment>,
}

/// Delivers emails
#[async_trait]
pub trait MailTransport: Send + Sync + 'static {
    /// Transmits `email`.
    ///
    /// # Returns
    /// A [`Result`] indicating success or failure.
    async fn send(&self, email: &OutgoingEmail) -> Result<(), TransportError>;
}

#[cfg(test)]
mock! {
    pub MailTransport {}

    #[async_trait]
    impl MailTransport for MailTransport {
        async fn send(&self, email: &OutgoingEmail) -> Result<(), TransportError>;
    }
}
