//! Email templates

use askama::Template;

use crate::domain::mail::{RenderError, RenderedBody, TemplateRenderer};

/// Name of the account activation template. Its input is the signed activation link.
pub const CONFIRMATION_EMAIL: &str = "confirmation-email";

/// Name of the subscription notice template. Its input is the notice text.
pub const SUBSCRIBED_EMAIL: &str = "subscribed-email";

#[derive(Debug, Template)]
#[template(path = "mail/confirmation-email.html")]
struct ConfirmationEmailHtml<'a> {
    link: &'a str,
}

#[derive(Debug, Template)]
#[template(path = "mail/confirmation-email.txt")]
struct ConfirmationEmailPlain<'a> {
    link: &'a str,
}

#[derive(Debug, Template)]
#[template(path = "mail/subscribed-email.html")]
struct SubscribedEmailHtml<'a> {
    notice: &'a str,
}

#[derive(Debug, Template)]
#[template(path = "mail/subscribed-email.txt")]
struct SubscribedEmailPlain<'a> {
    notice: &'a str,
}

/// Renders the application's compiled-in email templates
#[derive(Clone, Copy, Debug, Default)]
pub struct MailTemplates;

impl TemplateRenderer for MailTemplates {
    fn render(&self, name: &str, data: &str) -> Result<RenderedBody, RenderError> {
        match name {
            CONFIRMATION_EMAIL => render_pair(
                ConfirmationEmailHtml { link: data },
                ConfirmationEmailPlain { link: data },
            ),
            SUBSCRIBED_EMAIL => render_pair(
                SubscribedEmailHtml { notice: data },
                SubscribedEmailPlain { notice: data },
            ),
            _ => Err(RenderError::UnknownTemplate(name.to_string())),
        }
    }
}

/// Renders the HTML version with its CSS inlined alongside the plain text version
fn render_pair(html: impl Template, plain: impl Template) -> Result<RenderedBody, RenderError> {
    Ok(RenderedBody {
        html: css_inline::inline(&html.render()?)?,
        plain: plain.render()?,
    })
}
