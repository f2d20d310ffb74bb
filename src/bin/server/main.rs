#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    missing_docs,
    rustdoc::broken_intra_doc_links,
    rustdoc::missing_crate_level_docs
)]

//! REST API and mail dispatcher for the application

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use signup_mailer::{
    domain::{
        lifecycle::{Lifecycle, TracingErrorSink},
        mail::DispatcherConfig,
        tokens::{TokenConfig, TokenSigner},
    },
    infrastructure::{
        email::{
            smtp::{SmtpConfig, SmtpMailer},
            templates::MailTemplates,
        },
        http::{
            state::{AppConfig, AppState},
            HttpServer, HttpServerConfig,
        },
        signal::shutdown_signal,
    },
};
use tracing::info;

/// Command-line arguments / environment variables
#[derive(Debug, Parser)]
pub struct Args {
    /// The HTTP server configuration
    #[clap(flatten)]
    pub server: HttpServerConfig,

    /// The SMTP relay configuration
    #[clap(flatten)]
    pub smtp: SmtpConfig,

    /// The mail queue configuration
    #[clap(flatten)]
    pub dispatcher: DispatcherConfig,

    /// The activation link signing configuration
    #[clap(flatten)]
    pub tokens: TokenConfig,
}

#[mutants::skip]
#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let tokens = TokenSigner::from_config(&args.tokens).context("invalid token configuration")?;
    let mailer = SmtpMailer::new(&args.smtp)?;

    let lifecycle = Lifecycle::start(
        &args.dispatcher,
        Arc::new(mailer),
        Arc::new(MailTemplates),
        TracingErrorSink,
    )
    .context("invalid mail configuration")?;

    let config = AppConfig {
        base_url: args.server.base_url.clone(),
    };
    let state = AppState::new(config, lifecycle.sender(), tokens);

    // HTTP requests finish submitting before the mail queue closes
    let served = HttpServer::new(&args.server, state)?
        .serve_until(shutdown_signal(), Duration::from_secs(10))
        .await;

    let report = lifecycle.shutdown().await?;

    info!(
        delivered = report.delivered,
        failed = report.failed,
        errors_reported = report.errors_reported,
        "shutdown complete"
    );

    served
}
