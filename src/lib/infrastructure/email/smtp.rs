//! SMTP mail transport implementation

use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use clap::{Parser, ValueEnum};
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::{
        authentication::Credentials,
        client::{Tls, TlsParameters},
        extension::ClientId,
    },
    Address, AsyncSmtpTransport, AsyncTransport, Tokio1Executor,
};
use tracing::debug;

use crate::domain::mail::{Content, MailTransport, OutgoingEmail, TransportError};

/// How the connection to the SMTP server is secured
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Encryption {
    /// Plain text, for local relays and mail catchers
    #[default]
    None,

    /// Upgrade a plain connection with STARTTLS
    #[value(name = "starttls", alias = "tls")]
    StartTls,

    /// Connect over TLS from the start
    #[value(name = "ssl", alias = "wrapper")]
    Ssl,
}

/// SMTP configuration
#[derive(Clone, Parser)]
pub struct SmtpConfig {
    /// The SMTP host
    #[arg(long = "smtp-host", env = "SMTP_HOST", default_value = "localhost")]
    pub host: String,

    /// The SMTP port
    #[arg(long = "smtp-port", env = "SMTP_PORT", default_value = "1025")]
    pub port: u16,

    /// The domain announced to the SMTP server
    #[arg(long = "smtp-domain", env = "SMTP_DOMAIN", default_value = "localhost")]
    pub domain: String,

    /// The SMTP username
    #[arg(long = "smtp-user", env = "SMTP_USER")]
    pub username: Option<String>,

    /// The SMTP password
    #[arg(long = "smtp-password", env = "SMTP_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Connection security
    #[arg(
        long = "smtp-encryption",
        env = "SMTP_ENCRYPTION",
        value_enum,
        default_value_t = Encryption::None
    )]
    pub encryption: Encryption,

    /// Verify the TLS certificate
    #[arg(long = "smtp-verify-tls", env = "SMTP_VERIFY_TLS", default_value = "true")]
    pub verify_tls: bool,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1025,
            domain: "localhost".to_string(),
            username: None,
            password: None,
            encryption: Encryption::None,
            verify_tls: true,
        }
    }
}

impl fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("domain", &self.domain)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[redacted]"))
            .field("encryption", &self.encryption)
            .field("verify_tls", &self.verify_tls)
            .finish()
    }
}

/// SMTP mailer
#[derive(Clone)]
pub struct SmtpMailer {
    host: String,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    /// Create a new SMTP mailer.
    ///
    /// No connection is made until the first email is sent.
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let mut relay = match config.encryption {
            Encryption::None => {
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
            }
            Encryption::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
            }
            Encryption::Ssl => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?,
        }
        .port(config.port)
        .hello_name(ClientId::Domain(config.domain.clone()));

        if !config.verify_tls && config.encryption != Encryption::None {
            let parameters = TlsParameters::builder(config.host.clone())
                .dangerous_accept_invalid_certs(true)
                .build()?;

            relay = relay.tls(match config.encryption {
                Encryption::Ssl => Tls::Wrapper(parameters),
                _ => Tls::Required(parameters),
            });
        }

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            relay = relay.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            host: config.host.clone(),
            transport: relay.build(),
        })
    }
}

impl fmt::Debug for SmtpMailer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpMailer")
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

/// Converts an [`OutgoingEmail`] into a MIME message
pub fn build_message(email: &OutgoingEmail) -> Result<lettre::Message, TransportError> {
    let from = Mailbox::new(
        email.from_name.clone(),
        email.from.as_str().parse::<Address>()?,
    );
    let to = Mailbox::new(None, email.to.as_str().parse::<Address>()?);

    let builder = lettre::Message::builder()
        .from(from)
        .to(to)
        .subject(email.subject.clone());

    if email.attachments.is_empty() {
        let message = match &email.content {
            Content::Plain(text) => builder.singlepart(SinglePart::plain(text.clone()))?,
            Content::Html(html) => builder.singlepart(SinglePart::html(html.clone()))?,
            Content::Alternative { plain, html } => builder.multipart(
                MultiPart::alternative_plain_html(plain.clone(), html.clone()),
            )?,
        };

        return Ok(message);
    }

    let mut mixed = match &email.content {
        Content::Plain(text) => MultiPart::mixed().singlepart(SinglePart::plain(text.clone())),
        Content::Html(html) => MultiPart::mixed().singlepart(SinglePart::html(html.clone())),
        Content::Alternative { plain, html } => MultiPart::mixed().multipart(
            MultiPart::alternative_plain_html(plain.clone(), html.clone()),
        ),
    };

    for attachment in &email.attachments {
        let content_type = ContentType::parse(&attachment.content_type).map_err(|_| {
            TransportError::InvalidMessage(format!(
                "invalid content type \"{}\"",
                attachment.content_type
            ))
        })?;

        mixed = mixed.singlepart(
            lettre::message::Attachment::new(attachment.name.clone())
                .body(attachment.body.clone(), content_type),
        );
    }

    Ok(builder.multipart(mixed)?)
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), TransportError> {
        let message = build_message(email)?;

        debug!(message_id = %email.message_id, host = %self.host, "sending email");

        self.transport.send(message).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;
    use uuid::Uuid;

    use crate::domain::mail::{EmailAddress, LoadedAttachment};

    use super::*;

    fn email(content: Content) -> OutgoingEmail {
        OutgoingEmail {
            message_id: Uuid::now_v7(),
            from: EmailAddress::new("info@some.com").unwrap(),
            from_name: Some("Info".to_string()),
            to: EmailAddress::new("a@example.com").unwrap(),
            subject: "test".to_string(),
            content,
            attachments: Vec::new(),
        }
    }

    #[test]
    fn test_plain_text_message() -> TestResult {
        let message = build_message(&email(Content::Plain("hello".to_string())))?;
        let formatted = String::from_utf8(message.formatted())?;

        assert!(formatted.contains("From: Info <info@some.com>"));
        assert!(formatted.contains("To: a@example.com"));
        assert!(formatted.contains("Subject: test"));
        assert!(formatted.contains("Content-Type: text/plain"));
        assert!(formatted.contains("hello"));

        assert_eq!(
            message.envelope().to(),
            &["a@example.com".parse::<Address>()?]
        );

        Ok(())
    }

    #[test]
    fn test_alternative_message() -> TestResult {
        let message = build_message(&email(Content::Alternative {
            plain: "Activate: http://localhost/activate".to_string(),
            html: "<a href=\"http://localhost/activate\">Activate</a>".to_string(),
        }))?;
        let formatted = String::from_utf8(message.formatted())?;

        assert!(formatted.contains("multipart/alternative"));
        assert!(formatted.contains("Content-Type: text/plain"));
        assert!(formatted.contains("Content-Type: text/html"));

        Ok(())
    }

    #[test]
    fn test_message_with_attachment() -> TestResult {
        let mut email = email(Content::Html("<p>Your invoice</p>".to_string()));
        email.attachments.push(LoadedAttachment {
            name: "invoice.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            body: b"%PDF-1.4".to_vec(),
        });

        let message = build_message(&email)?;
        let formatted = String::from_utf8(message.formatted())?;

        assert!(formatted.contains("multipart/mixed"));
        assert!(formatted.contains("Content-Type: application/pdf"));
        assert!(formatted.contains("invoice.pdf"));

        Ok(())
    }

    #[test]
    fn test_invalid_attachment_content_type() {
        let mut email = email(Content::Plain("hello".to_string()));
        email.attachments.push(LoadedAttachment {
            name: "broken".to_string(),
            content_type: "not a mime type".to_string(),
            body: Vec::new(),
        });

        let result = build_message(&email);

        assert!(matches!(result, Err(TransportError::InvalidMessage(_))));
    }

    #[tokio::test]
    async fn test_mailer_builds_for_every_encryption() -> TestResult {
        for encryption in [Encryption::None, Encryption::StartTls, Encryption::Ssl] {
            let config = SmtpConfig {
                encryption,
                verify_tls: false,
                username: Some("user".to_string()),
                password: Some("secret".to_string()),
                ..SmtpConfig::default()
            };

            let mailer = SmtpMailer::new(&config)?;

            assert!(format!("{mailer:?}").contains("localhost"));
            assert!(!format!("{config:?}").contains("secret"));
        }

        Ok(())
    }

    #[test]
    fn test_encryption_accepts_legacy_names() -> TestResult {
        assert_eq!(Encryption::from_str("none", true)?, Encryption::None);
        assert_eq!(Encryption::from_str("tls", true)?, Encryption::StartTls);
        assert_eq!(Encryption::from_str("ssl", true)?, Encryption::Ssl);

        Ok(())
    }
}
