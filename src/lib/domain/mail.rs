//! Outbound mail: messages, the background dispatcher and its seams.

mod dispatcher;
mod email_address;
mod errors;
mod message;
mod submissions;
mod templates;
mod transport;

pub use dispatcher::{DeliveryStats, Dispatcher, DispatcherConfig, ErrorReports, MailSender};
pub use email_address::{EmailAddress, EmailAddressError};
pub use errors::{DeliveryError, DeliveryFailure, RenderError, SubmitError, TransportError};
pub use message::{Attachment, Message, Payload};
pub use submissions::Submissions;
pub use templates::{RenderedBody, TemplateRenderer};
pub use transport::{Content, LoadedAttachment, MailTransport, OutgoingEmail};

#[cfg(test)]
pub mod tests {
    pub use super::templates::MockTemplateRenderer;
    pub use super::transport::{tests::RecordingTransport, MockMailTransport};
}
