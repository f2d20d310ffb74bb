//! Template rendering seam

#[cfg(test)]
use mockall::mock;

use super::RenderError;

/// A rendered email body with HTML and plain text alternatives
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedBody {
    /// The HTML version of the email
    pub html: String,

    /// The plain text version of the email
    pub plain: String,
}

/// Renders named email templates
pub trait TemplateRenderer: Send + Sync + 'static {
    /// Renders the template called `name` with `data` as its input.
    ///
    /// # Returns
    /// - [`Ok`] with the HTML and plain text bodies.
    /// - [`Err`] with [`RenderError::UnknownTemplate`] if no template is called `name`.
    fn render(&self, name: &str, data: &str) -> Result<RenderedBody, RenderError>;
}

#[cfg(test)]
mock! {
    pub TemplateRenderer {}

    impl TemplateRenderer for TemplateRenderer {
        fn render(&self, name: &str, data: &str) -> Result<RenderedBody, RenderError>;
    }
}
