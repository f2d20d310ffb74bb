//! HTTP Server

use std::{
    future::Future,
    net::{Ipv4Addr, SocketAddr, TcpListener},
    time::Duration,
};

use anyhow::{Context, Result};
use axum::{extract::Request, Router};
use axum_server::Handle;
use clap::Parser;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::{debug, info, info_span, warn};

use handlers::{panic_handler, v1};
use state::AppState;

pub mod errors;
pub mod handlers;
pub mod open_api;
pub mod state;

/// Configuration for the HTTP server.
#[derive(Debug, Clone, PartialEq, Eq, Parser)]
pub struct HttpServerConfig {
    /// The port to listen on
    #[arg(long = "http-port", env = "HTTP_PORT", default_value = "3000")]
    pub port: u16,

    /// The externally visible base URL, used to build activation links
    #[arg(long = "base-url", env = "BASE_URL", default_value = "http://localhost:3000")]
    pub base_url: String,
}

/// The application's HTTP server
#[derive(Debug)]
pub struct HttpServer {
    router: Router,
    listener: TcpListener,
    handle: Handle,
}

impl HttpServer {
    /// Returns a new HTTP server bound to the port specified in `config`.
    pub fn new(config: &HttpServerConfig, state: AppState) -> Result<Self> {
        let address = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port));
        let listener = TcpListener::bind(address)
            .with_context(|| format!("failed to listen on {}", config.port))?;
        listener
            .set_nonblocking(true)
            .context("failed to make listener non-blocking")?;

        Ok(Self {
            router: router(state),
            listener,
            handle: Handle::new(),
        })
    }

    /// A handle for shutting the server down from another task
    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }

    /// Runs the HTTP server until its handle requests a graceful shutdown.
    #[mutants::skip]
    pub async fn run(self) -> Result<()> {
        debug!(
            "HTTP server listening on {}",
            self.listener
                .local_addr()
                .context("failed to get local address")?
        );

        axum_server::from_tcp(self.listener)
            .handle(self.handle)
            .serve(self.router.into_make_service())
            .await
            .context("server error")?;

        info!("HTTP server stopped");

        Ok(())
    }

    /// Serves until `signal` resolves, then shuts down gracefully.
    ///
    /// Returns early if the server stops on its own, so a failed server does
    /// not leave the process waiting for a signal that may never come.
    pub async fn serve_until(
        self,
        signal: impl Future<Output = ()>,
        grace: Duration,
    ) -> Result<()> {
        let handle = self.handle();
        let mut server = tokio::spawn(self.run());

        let result = tokio::select! {
            _ = signal => {
                handle.graceful_shutdown(Some(grace));
                server.await
            }
            result = &mut server => {
                warn!("HTTP server stopped before shutdown was requested");
                result
            }
        };

        result.context("HTTP server task failed")?
    }
}

/// Create the application's router
pub fn router(state: AppState) -> Router {
    let trace_layer = TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
        let uri = request.uri().to_string();
        info_span!("http_request", method = ?request.method(), uri)
    });

    Router::new()
        .nest("/api/v1", v1::router())
        .layer(CatchPanicLayer::custom(panic_handler))
        .layer(trace_layer)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::future;

    use testresult::TestResult;
    use tokio::time::timeout;

    use super::{state::tests::test_state, *};

    fn config() -> HttpServerConfig {
        HttpServerConfig {
            port: 0,
            base_url: "https://example.com".to_string(),
        }
    }

    #[tokio::test]
    async fn test_serve_until_stops_on_signal() -> TestResult {
        let (state, _inbox) = test_state();
        let server = HttpServer::new(&config(), state)?;

        timeout(
            Duration::from_secs(5),
            server.serve_until(future::ready(()), Duration::from_secs(1)),
        )
        .await??;

        Ok(())
    }

    #[tokio::test]
    async fn test_serve_until_returns_when_server_stops_first() -> TestResult {
        let (state, _inbox) = test_state();
        let server = HttpServer::new(&config(), state)?;

        server.handle().shutdown();

        timeout(
            Duration::from_secs(5),
            server.serve_until(future::pending(), Duration::from_secs(1)),
        )
        .await??;

        Ok(())
    }
}
