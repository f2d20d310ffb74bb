//! Mail dispatcher
//!
//! Decouples request handling from SMTP delivery. Producers hand [`Message`]s
//! to a [`MailSender`], which queues them on a bounded channel. A single
//! background worker takes them off the queue in order, renders them, loads
//! their attachments and hands them to the [`MailTransport`]. Failures are
//! never returned to the producer: they are pushed onto [`ErrorReports`].

use std::{num::ParseIntError, path::Path, sync::Arc, time::Duration};

use clap::Parser;
use tokio::{
    sync::{
        mpsc::{self, error::SendTimeoutError, UnboundedReceiver, UnboundedSender},
        oneshot,
    },
    task::{JoinError, JoinHandle},
    time::timeout,
};
use tracing::{debug, info, warn, Instrument};

use super::{
    Attachment, Content, DeliveryError, DeliveryFailure, EmailAddress, EmailAddressError,
    LoadedAttachment, MailTransport, Message, OutgoingEmail, Payload, RenderError, SubmitError,
    Submissions, TemplateRenderer,
};

fn parse_seconds(raw: &str) -> Result<Duration, ParseIntError> {
    Ok(Duration::from_secs(raw.parse()?))
}

/// Mail dispatcher configuration
#[derive(Clone, Debug, Parser)]
pub struct DispatcherConfig {
    /// Number of messages that can wait for delivery before submissions block
    #[arg(long = "mail-queue-capacity", env = "MAIL_QUEUE_CAPACITY", default_value = "100")]
    pub queue_capacity: usize,

    /// How long a single transport call may take, in seconds
    #[arg(
        long = "mail-send-timeout-secs",
        env = "MAIL_SEND_TIMEOUT_SECS",
        default_value = "30",
        value_parser = parse_seconds
    )]
    pub send_timeout: Duration,

    /// Sender address for messages that don't set one
    #[arg(
        long = "mail-from-address",
        env = "MAIL_FROM_ADDRESS",
        default_value = "info@example.com"
    )]
    pub from_address: String,

    /// Sender name for messages that don't set one
    #[arg(long = "mail-from-name", env = "MAIL_FROM_NAME", default_value = "Info")]
    pub from_name: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 100,
            send_timeout: Duration::from_secs(30),
            from_address: "info@example.com".to_string(),
            from_name: "Info".to_string(),
        }
    }
}

/// Counts of messages handled by the worker
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    /// Messages the transport accepted
    pub delivered: usize,

    /// Messages reported as delivery errors
    pub failed: usize,
}

/// Submits messages to the dispatcher's queue
#[derive(Clone, Debug)]
pub struct MailSender {
    queue: mpsc::Sender<Message>,
    submissions: Submissions,
}

impl MailSender {
    /// Queues `message` for delivery.
    ///
    /// Waits for a free slot when the queue is full. Once accepted, a
    /// message is either delivered or reported on [`ErrorReports`].
    ///
    /// # Returns
    /// - [`Ok`] once the message is queued.
    /// - [`Err`] with [`SubmitError::ShuttingDown`] and the message itself once
    ///   shutdown has begun. Such messages are never delivered.
    pub async fn submit(&self, message: Message) -> Result<(), SubmitError> {
        let Some(_guard) = self.submissions.begin() else {
            warn!(message_id = %message.id, "rejecting message, shutdown in progress");
            return Err(SubmitError::ShuttingDown(Box::new(message)));
        };

        let message_id = message.id;

        self.queue
            .send(message)
            .await
            .map_err(|err| SubmitError::ShuttingDown(Box::new(err.0)))?;

        debug!(%message_id, "message queued");

        Ok(())
    }

    /// Queues `message`, giving up if no slot frees within `wait`.
    ///
    /// # Returns
    /// - [`Err`] with [`SubmitError::QueueFull`] and the message if the queue
    ///   stayed full.
    /// - [`Err`] with [`SubmitError::ShuttingDown`] once shutdown has begun.
    pub async fn submit_timeout(
        &self,
        message: Message,
        wait: Duration,
    ) -> Result<(), SubmitError> {
        let Some(_guard) = self.submissions.begin() else {
            return Err(SubmitError::ShuttingDown(Box::new(message)));
        };

        match self.queue.send_timeout(message, wait).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(message)) => {
                Err(SubmitError::QueueFull(Box::new(message)))
            }
            Err(SendTimeoutError::Closed(message)) => {
                Err(SubmitError::ShuttingDown(Box::new(message)))
            }
        }
    }

    /// The tracker counting this sender's submissions in flight
    pub fn submissions(&self) -> &Submissions {
        &self.submissions
    }
}

/// The stream of delivery failures.
///
/// Exactly one consumer should drain it for the lifetime of the process.
#[derive(Debug)]
pub struct ErrorReports {
    errors: UnboundedReceiver<DeliveryError>,
}

impl ErrorReports {
    /// Waits for the next delivery failure.
    ///
    /// Returns [`None`] once the worker has stopped and every failure has
    /// been received.
    pub async fn next(&mut self) -> Option<DeliveryError> {
        self.errors.recv().await
    }
}

/// Handle to the running dispatcher worker
#[derive(Debug)]
pub struct Dispatcher {
    stop: oneshot::Sender<()>,
    worker: JoinHandle<DeliveryStats>,
}

impl Dispatcher {
    /// Starts the worker on the current Tokio runtime.
    ///
    /// # Returns
    /// The dispatcher handle, a [`MailSender`] for producers and the
    /// [`ErrorReports`] stream, or an error if the configured sender address
    /// is not valid.
    pub fn start<T, R>(
        config: &DispatcherConfig,
        transport: Arc<T>,
        renderer: Arc<R>,
    ) -> Result<(Self, MailSender, ErrorReports), EmailAddressError>
    where
        T: MailTransport,
        R: TemplateRenderer,
    {
        let from = EmailAddress::new(&config.from_address)?;

        let (queue, inbox) = mpsc::channel(config.queue_capacity.max(1));
        let (errors_tx, errors) = mpsc::unbounded_channel();
        let (stop, stop_rx) = oneshot::channel();

        let worker = Worker {
            inbox,
            transport,
            renderer,
            errors: errors_tx,
            from,
            from_name: config.from_name.clone(),
            send_timeout: config.send_timeout,
            stats: DeliveryStats::default(),
        };

        info!(capacity = config.queue_capacity, "starting mail dispatcher");

        let dispatcher = Self {
            stop,
            worker: tokio::spawn(worker.run(stop_rx)),
        };

        let sender = MailSender {
            queue,
            submissions: Submissions::new(),
        };

        Ok((dispatcher, sender, ErrorReports { errors }))
    }

    /// Stops the worker and waits for it to finish.
    ///
    /// The queue is closed first, so later submissions fail with
    /// [`SubmitError::ShuttingDown`]. Messages already queued are still
    /// delivered. The error stream ends once the worker has finished.
    pub async fn stop(self) -> Result<DeliveryStats, JoinError> {
        debug!("stopping mail dispatcher");

        // the worker may already have exited because every sender was dropped
        let _ = self.stop.send(());

        self.worker.await
    }
}

struct Worker<T, R> {
    inbox: mpsc::Receiver<Message>,
    transport: Arc<T>,
    renderer: Arc<R>,
    errors: UnboundedSender<DeliveryError>,
    from: EmailAddress,
    from_name: String,
    send_timeout: Duration,
    stats: DeliveryStats,
}

impl<T, R> Worker<T, R>
where
    T: MailTransport,
    R: TemplateRenderer,
{
    async fn run(mut self, mut stop: oneshot::Receiver<()>) -> DeliveryStats {
        loop {
            tokio::select! {
                biased;

                _ = &mut stop => break,
                message = self.inbox.recv() => match message {
                    Some(message) => self.process(message).await,
                    None => {
                        debug!("all mail senders dropped");
                        return self.stats;
                    }
                },
            }
        }

        self.inbox.close();

        while let Some(message) = self.inbox.recv().await {
            self.process(message).await;
        }

        info!(
            delivered = self.stats.delivered,
            failed = self.stats.failed,
            "mail dispatcher drained"
        );

        self.stats
    }

    async fn process(&mut self, message: Message) {
        match self.deliver(&message).await {
            Ok(()) => {
                self.stats.delivered += 1;
                info!(message_id = %message.id, "message delivered");
            }
            Err(failure) => {
                self.stats.failed += 1;

                if self.errors.send(DeliveryError::new(&message, failure)).is_err() {
                    warn!(message_id = %message.id, "delivery error dropped, nobody is listening");
                }
            }
        }
    }

    #[tracing::instrument(name = "Deliver message", skip_all, fields(message_id = %message.id))]
    async fn deliver(&self, message: &Message) -> Result<(), DeliveryFailure> {
        let content = self.resolve_body(message)?;
        let attachments = load_attachments(&message.attachments).await?;

        let email = OutgoingEmail {
            message_id: message.id,
            from: message.from.clone().unwrap_or_else(|| self.from.clone()),
            from_name: message
                .from_name
                .clone()
                .or_else(|| Some(self.from_name.clone()).filter(|name| !name.is_empty())),
            to: message.to.clone(),
            subject: message.subject.clone(),
            content,
            attachments,
        };

        // a panicking transport must not take the worker down with it
        let transport = Arc::clone(&self.transport);
        let mut send =
            tokio::spawn(async move { transport.send(&email).await }.in_current_span());

        match timeout(self.send_timeout, &mut send).await {
            Ok(Ok(result)) => Ok(result?),
            Ok(Err(err)) => Err(DeliveryFailure::Panicked(panic_details(err))),
            Err(_) => {
                send.abort();
                Err(DeliveryFailure::Timeout(self.send_timeout))
            }
        }
    }

    fn resolve_body(&self, message: &Message) -> Result<Content, RenderError> {
        match (&message.template, &message.data) {
            (Some(template), data) => {
                let body = self.renderer.render(template, data.as_str())?;

                Ok(Content::Alternative {
                    plain: body.plain,
                    html: body.html,
                })
            }
            (None, Payload::PlainText(text)) => Ok(Content::Plain(text.clone())),
            (None, Payload::Rendered(markup)) => Ok(Content::Html(markup.clone())),
        }
    }
}

async fn load_attachments(
    attachments: &[Attachment],
) -> Result<Vec<LoadedAttachment>, DeliveryFailure> {
    let mut loaded = Vec::with_capacity(attachments.len());

    for attachment in attachments {
        let body = tokio::fs::read(&attachment.path)
            .await
            .map_err(|source| DeliveryFailure::Attachment {
                path: attachment.path.clone(),
                source,
            })?;

        loaded.push(LoadedAttachment {
            name: attachment.name.clone(),
            content_type: content_type_for(&attachment.name).to_string(),
            body,
        });
    }

    Ok(loaded)
}

fn panic_details(err: JoinError) -> String {
    let Ok(panic) = err.try_into_panic() else {
        return "transport task was cancelled".to_string();
    };

    if let Some(details) = panic.downcast_ref::<String>() {
        details.clone()
    } else if let Some(details) = panic.downcast_ref::<&str>() {
        details.to_string()
    } else {
        "transport panicked".to_string()
    }
}

fn content_type_for(name: &str) -> &'static str {
    let extension = Path::new(name)
        .extension()
        .map(|extension| extension.to_string_lossy().to_ascii_lowercase());

    match extension.as_deref() {
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain",
        Some("csv") => "text/csv",
        Some("htm" | "html") => "text/html",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
impl MailSender {
    /// A sender whose queue is read directly by the test instead of a worker
    pub(crate) fn detached(capacity: usize) -> (Self, mpsc::Receiver<Message>) {
        let (queue, inbox) = mpsc::channel(capacity);

        (
            Self {
                queue,
                submissions: Submissions::new(),
            },
            inbox,
        )
    }
}
