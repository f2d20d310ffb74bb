//! Process lifecycle
//!
//! Starts the mail dispatcher together with the task draining its error
//! stream, and tears both down in a fixed order on shutdown:
//!
//! 1. refuse new submissions and wait for those in flight to be queued,
//! 2. stop the dispatcher, which closes its queue and drains it,
//! 3. join the worker, which closes the error stream,
//! 4. join the error drain once every failure has been reported.

use std::{future::Future, sync::Arc};

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::domain::mail::{
    DeliveryError, Dispatcher, DispatcherConfig, EmailAddressError, ErrorReports, MailSender,
    MailTransport, TemplateRenderer,
};

/// Receives delivery failures reported by the dispatcher
pub trait DeliveryErrorSink: Send + Sync + 'static {
    /// Records a single failure
    fn report(&self, error: &DeliveryError);
}

/// Logs delivery failures with `tracing`
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingErrorSink;

impl DeliveryErrorSink for TracingErrorSink {
    fn report(&self, err: &DeliveryError) {
        error!(
            message_id = %err.message_id,
            to = %err.to,
            error.cause_chain = ?err.failure,
            error.message = %err,
            "failed to deliver message"
        );
    }
}

/// What happened to the mail queue during shutdown
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Messages delivered over the dispatcher's lifetime
    pub delivered: usize,

    /// Messages that failed over the dispatcher's lifetime
    pub failed: usize,

    /// Failures handed to the error sink
    pub errors_reported: usize,
}

/// Owns the background mail tasks of the process
#[derive(Debug)]
pub struct Lifecycle {
    dispatcher: Dispatcher,
    sender: MailSender,
    error_drain: JoinHandle<usize>,
}

impl Lifecycle {
    /// Starts the dispatcher worker and the error drain on the current runtime
    pub fn start<T, R, S>(
        config: &DispatcherConfig,
        transport: Arc<T>,
        renderer: Arc<R>,
        sink: S,
    ) -> Result<Self, EmailAddressError>
    where
        T: MailTransport,
        R: TemplateRenderer,
        S: DeliveryErrorSink,
    {
        let (dispatcher, sender, errors) = Dispatcher::start(config, transport, renderer)?;

        Ok(Self {
            dispatcher,
            sender,
            error_drain: tokio::spawn(drain_errors(errors, sink)),
        })
    }

    /// A handle for submitting messages
    pub fn sender(&self) -> MailSender {
        self.sender.clone()
    }

    /// Waits for `signal` to resolve, then shuts down
    pub async fn run_until(self, signal: impl Future<Output = ()>) -> Result<ShutdownReport> {
        signal.await;

        info!("termination requested");

        self.shutdown().await
    }

    /// Shuts the mail tasks down.
    ///
    /// Messages submitted before this is called are delivered or reported
    /// before it returns. Submissions made afterwards are rejected.
    pub async fn shutdown(self) -> Result<ShutdownReport> {
        info!(
            in_flight = self.sender.submissions().in_flight(),
            "waiting for mail submissions in flight"
        );

        self.sender.submissions().close_and_wait().await;

        let stats = self
            .dispatcher
            .stop()
            .await
            .context("mail dispatcher worker failed")?;

        let errors_reported = self
            .error_drain
            .await
            .context("delivery error drain failed")?;

        info!(
            delivered = stats.delivered,
            failed = stats.failed,
            "mail tasks stopped"
        );

        Ok(ShutdownReport {
            delivered: stats.delivered,
            failed: stats.failed,
            errors_reported,
        })
    }
}

async fn drain_errors(mut errors: ErrorReports, sink: impl DeliveryErrorSink) -> usize {
    let mut reported = 0;

    while let Some(err) = errors.next().await {
        sink.report(&err);
        reported += 1;
    }

    reported
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use testresult::TestResult;
    use tokio::sync::{
        mpsc::{unbounded_channel, UnboundedSender},
        oneshot,
    };
    use uuid::Uuid;

    use crate::domain::mail::{
        tests::{MockMailTransport, MockTemplateRenderer, RecordingTransport},
        EmailAddress, Message, SubmitError, TransportError,
    };

    use super::*;

    #[derive(Debug)]
    struct ChannelSink(UnboundedSender<Uuid>);

    impl DeliveryErrorSink for ChannelSink {
        fn report(&self, error: &DeliveryError) {
            let _ = self.0.send(error.message_id);
        }
    }

    fn message(subject: &str) -> Message {
        Message::new(EmailAddress::new("a@example.com").unwrap(), subject, "hello")
    }

    #[tokio::test]
    async fn test_shutdown_delivers_everything_submitted_before_it() -> TestResult {
        let (transport, mut sent) = RecordingTransport::new();
        let transport = transport.with_delay(Duration::from_millis(2));

        let lifecycle = Lifecycle::start(
            &DispatcherConfig::default(),
            Arc::new(transport),
            Arc::new(MockTemplateRenderer::new()),
            TracingErrorSink,
        )?;

        let sender = lifecycle.sender();

        for i in 0..10 {
            sender.submit(message(&format!("message {i}"))).await?;
        }

        let report = lifecycle.shutdown().await?;

        assert_eq!(
            report,
            ShutdownReport {
                delivered: 10,
                failed: 0,
                errors_reported: 0
            }
        );

        let mut count = 0;
        while sent.try_recv().is_ok() {
            count += 1;
        }
        assert_eq!(count, 10);

        Ok(())
    }

    #[tokio::test]
    async fn test_submissions_after_shutdown_are_rejected() -> TestResult {
        let (transport, _sent) = RecordingTransport::new();

        let lifecycle = Lifecycle::start(
            &DispatcherConfig::default(),
            Arc::new(transport),
            Arc::new(MockTemplateRenderer::new()),
            TracingErrorSink,
        )?;

        let sender = lifecycle.sender();

        lifecycle.shutdown().await?;

        let result = sender.submit(message("late")).await;

        assert!(matches!(result, Err(SubmitError::ShuttingDown(_))));

        Ok(())
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_submissions_in_flight() -> TestResult {
        let (transport, _sent) = RecordingTransport::new();

        let lifecycle = Lifecycle::start(
            &DispatcherConfig::default(),
            Arc::new(transport),
            Arc::new(MockTemplateRenderer::new()),
            TracingErrorSink,
        )?;

        let submissions = lifecycle.sender().submissions().clone();
        let guard = submissions.begin();

        let shutdown = tokio::spawn(lifecycle.shutdown());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!shutdown.is_finished());

        drop(guard);

        tokio::time::timeout(Duration::from_secs(1), shutdown).await???;

        Ok(())
    }

    #[tokio::test]
    async fn test_failures_reach_the_sink_before_shutdown_returns() -> TestResult {
        let mut transport = MockMailTransport::new();

        transport
            .expect_send()
            .returning(|_| Err(TransportError::InvalidMessage("no body".to_string())));

        let (tx, mut reported) = unbounded_channel();

        let lifecycle = Lifecycle::start(
            &DispatcherConfig::default(),
            Arc::new(transport),
            Arc::new(MockTemplateRenderer::new()),
            ChannelSink(tx),
        )?;

        let first = message("first");
        let second = message("second");
        let ids = vec![first.id, second.id];

        let sender = lifecycle.sender();
        sender.submit(first).await?;
        sender.submit(second).await?;

        let report = lifecycle.shutdown().await?;

        assert_eq!(report.failed, 2);
        assert_eq!(report.errors_reported, 2);

        let mut received = Vec::new();
        while let Ok(id) = reported.try_recv() {
            received.push(id);
        }
        assert_eq!(received, ids);

        Ok(())
    }

    #[tokio::test]
    async fn test_run_until_shuts_down_on_signal() -> TestResult {
        let (transport, mut sent) = RecordingTransport::new();

        let lifecycle = Lifecycle::start(
            &DispatcherConfig::default(),
            Arc::new(transport),
            Arc::new(MockTemplateRenderer::new()),
            TracingErrorSink,
        )?;

        let sender = lifecycle.sender();
        let (terminate, terminated) = oneshot::channel::<()>();

        let running = tokio::spawn(lifecycle.run_until(async {
            let _ = terminated.await;
        }));

        sender.submit(message("before signal")).await?;
        terminate.send(()).map_err(|_| "lifecycle stopped early")?;

        let report = running.await??;

        assert_eq!(report.delivered, 1);
        assert_eq!(
            sent.recv().await.map(|email| email.subject),
            Some("before signal".to_string())
        );

        Ok(())
    }
}
