//! Application state module

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::{mail::MailSender, tokens::TokenSigner};

/// Application configuration
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// The base URL of the application
    pub base_url: String,
}

/// Global application state
#[derive(Clone, Debug)]
pub struct AppState {
    /// The time the server started
    pub start_time: DateTime<Utc>,

    /// The application configuration
    pub config: AppConfig,

    /// Queues outbound mail
    pub mail: MailSender,

    /// Signs and verifies activation links
    pub tokens: Arc<TokenSigner>,
}

impl AppState {
    /// Create a new application state
    pub fn new(config: AppConfig, mail: MailSender, tokens: TokenSigner) -> Self {
        Self {
            start_time: Utc::now(),
            config,
            mail,
            tokens: Arc::new(tokens),
        }
    }
}
