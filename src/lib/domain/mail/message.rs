//! Email message

use std::path::{Path, PathBuf};

use uuid::Uuid;

use super::EmailAddress;

/// The data carried by a [`Message`].
///
/// Without a template the payload is sent as the body verbatim. With a
/// template it is the input the template is rendered with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload {
    /// Plain text
    PlainText(String),

    /// Pre-rendered HTML markup
    Rendered(String),
}

impl Payload {
    /// The payload's text, whatever its kind
    pub fn as_str(&self) -> &str {
        match self {
            Self::PlainText(text) | Self::Rendered(text) => text,
        }
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self::PlainText(text.to_string())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self::PlainText(text)
    }
}

/// A file to attach to a [`Message`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    /// The file name shown to the recipient
    pub name: String,

    /// Where the file is read from when the message is delivered
    pub path: PathBuf,
}

/// A unit of work for the mail dispatcher
#[derive(Clone, Debug)]
pub struct Message {
    /// Identifies the message in logs and delivery errors
    pub id: Uuid,

    /// The sender, defaults to the configured sender address
    pub from: Option<EmailAddress>,

    /// The sender's display name, defaults to the configured sender name
    pub from_name: Option<String>,

    /// The recipient
    pub to: EmailAddress,

    /// The subject
    pub subject: String,

    /// The body, or the template input when `template` is set
    pub data: Payload,

    /// Name of the template used to render `data`
    pub template: Option<String>,

    /// Files attached in order
    pub attachments: Vec<Attachment>,
}

impl Message {
    /// Creates a message sent from the configured sender with `data` as its body
    pub fn new(to: EmailAddress, subject: &str, data: impl Into<Payload>) -> Self {
        Self {
            id: Uuid::now_v7(),
            from: None,
            from_name: None,
            to,
            subject: subject.to_string(),
            data: data.into(),
            template: None,
            attachments: Vec::new(),
        }
    }

    /// Sets the sender address
    pub fn with_from(mut self, from: EmailAddress) -> Self {
        self.from = Some(from);
        self
    }

    /// Sets the sender's display name
    pub fn with_from_name(mut self, name: &str) -> Self {
        self.from_name = Some(name.to_string());
        self
    }

    /// Renders `data` through the named template. An empty name clears the template.
    pub fn with_template(mut self, template: &str) -> Self {
        self.template = Some(template.to_string()).filter(|name| !name.is_empty());
        self
    }

    /// Attaches the file at `path` under `name`
    pub fn with_attachment(mut self, name: &str, path: impl Into<PathBuf>) -> Self {
        self.attachments.push(Attachment {
            name: name.to_string(),
            path: path.into(),
        });
        self
    }

    /// Attaches the file at `path` under its own file name
    pub fn with_attachment_file(self, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());

        self.with_attachment(&name, path)
    }
}
