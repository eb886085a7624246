//! NATS JetStream transport.
//!
//! One file-backed stream carries all platform traffic under the
//! `ccm.>` subject space. Each service runs a durable pull consumer
//! bound to its inbound subjects with explicit acks and an ack window
//! of one, so messages are processed sequentially and redelivered if
//! the handler fails.

use async_nats::jetstream;
use async_nats::jetstream::consumer::pull::Config as PullConfig;
use async_nats::jetstream::consumer::AckPolicy;
use async_nats::jetstream::AckKind;
use async_trait::async_trait;
use futures::StreamExt;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::{InboundEvent, SUBJECT_PREFIX};
use crate::infra::{EventPublisher, Result, ServiceError};

/// Stream holding all platform events.
pub const STREAM_NAME: &str = "CCM_EVENTS";

/// Connect to a NATS server.
pub async fn connect(url: &str) -> Result<async_nats::Client> {
    async_nats::connect(url)
        .await
        .map_err(|e| ServiceError::Bus(format!("failed to connect to NATS at {url}: {e}")))
}

/// Ensure the platform stream exists (create if missing).
pub async fn ensure_stream(js: &jetstream::Context) -> Result<jetstream::stream::Stream> {
    match js.get_stream(STREAM_NAME).await {
        Ok(stream) => Ok(stream),
        Err(_) => {
            let config = jetstream::stream::Config {
                name: STREAM_NAME.to_string(),
                subjects: vec![format!("{SUBJECT_PREFIX}.>")],
                storage: jetstream::stream::StorageType::File,
                retention: jetstream::stream::RetentionPolicy::Limits,
                ..Default::default()
            };
            js.create_stream(config)
                .await
                .map_err(|e| ServiceError::Bus(format!("failed to create stream {STREAM_NAME}: {e}")))
        }
    }
}

/// JetStream-backed event publisher.
pub struct EventBus {
    js: jetstream::Context,
}

impl EventBus {
    pub async fn new(client: async_nats::Client) -> Result<Self> {
        let js = jetstream::new(client);
        ensure_stream(&js).await?;
        Ok(Self { js })
    }
}

#[async_trait]
impl EventPublisher for EventBus {
    async fn publish_raw(&self, subject: &str, payload: &serde_json::Value) -> Result<()> {
        let body = serde_json::to_vec(payload)
            .map_err(|e| ServiceError::Internal(format!("event serialization failed: {e}")))?;

        // Waiting for the server ack confirms the message is persisted
        // in the stream, not just handed to the socket.
        let ack = self
            .js
            .publish(subject.to_string(), body.into())
            .await
            .map_err(|e| ServiceError::Bus(format!("publish to {subject} failed: {e}")))?;
        ack.await
            .map_err(|e| ServiceError::Bus(format!("publish ack for {subject} failed: {e}")))?;

        debug!(subject, "Event published");
        Ok(())
    }
}

/// What a service does with each decoded inbound event.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: InboundEvent) -> Result<()>;
}

/// Durable pull consumer bound to a fixed set of subjects.
pub struct EventConsumer {
    js: jetstream::Context,
    durable_name: String,
    subjects: Vec<String>,
}

impl EventConsumer {
    pub fn new(
        client: async_nats::Client,
        durable_name: impl Into<String>,
        subjects: Vec<String>,
    ) -> Self {
        Self {
            js: jetstream::new(client),
            durable_name: durable_name.into(),
            subjects,
        }
    }

    /// Consume messages until the task is aborted at shutdown.
    ///
    /// Ack discipline:
    /// - handler success: ack.
    /// - handler error: nak, the server redelivers.
    /// - unknown event kind or undecodable body: ack immediately, a
    ///   retry can never succeed and must not poison the queue.
    pub async fn run(self, handler: std::sync::Arc<dyn EventHandler>) -> Result<()> {
        let stream = ensure_stream(&self.js).await?;

        let consumer = stream
            .get_or_create_consumer(
                &self.durable_name,
                PullConfig {
                    durable_name: Some(self.durable_name.clone()),
                    filter_subjects: self.subjects.clone(),
                    ack_policy: AckPolicy::Explicit,
                    // Sequential processing: at most one unacked message
                    // in flight per consumer.
                    max_ack_pending: 1,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| {
                ServiceError::Bus(format!(
                    "failed to create consumer {}: {e}",
                    self.durable_name
                ))
            })?;

        info!(
            consumer = %self.durable_name,
            subjects = ?self.subjects,
            "Event consumer started"
        );

        let mut messages = consumer
            .messages()
            .await
            .map_err(|e| ServiceError::Bus(format!("failed to open message stream: {e}")))?;

        while let Some(message) = messages.next().await {
            let message = match message {
                Ok(m) => m,
                Err(e) => {
                    error!(error = %e, "Message stream error");
                    continue;
                }
            };
            self.dispatch(&handler, &message).await;
        }

        warn!(consumer = %self.durable_name, "Message stream ended");
        Ok(())
    }

    #[instrument(skip(self, handler, message), fields(consumer = %self.durable_name, subject = %message.subject))]
    async fn dispatch(
        &self,
        handler: &std::sync::Arc<dyn EventHandler>,
        message: &jetstream::Message,
    ) {
        let event = match InboundEvent::decode(&message.payload) {
            Ok(InboundEvent::Unknown { event_type }) => {
                warn!(event_type, "Unknown event kind; acknowledging without retry");
                ack(message).await;
                return;
            }
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Undecodable message; acknowledging without retry");
                ack(message).await;
                return;
            }
        };

        match handler.handle(event).await {
            Ok(()) => ack(message).await,
            Err(e) => {
                error!(error = %e, "Event handler failed; requeueing");
                if let Err(nak_err) = message.ack_with(AckKind::Nak(None)).await {
                    error!(error = %nak_err, "Failed to nak message");
                }
            }
        }
    }
}

async fn ack(message: &jetstream::Message) {
    if let Err(e) = message.ack().await {
        error!(error = %e, "Failed to ack message");
    }
}
