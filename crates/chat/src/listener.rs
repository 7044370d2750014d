use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::events::{ChatEvent, EventContext, EventHandler};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport ack failed: {0}")]
    Acknowledge(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// Inbound side of a chat platform connection.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    /// `Ok(None)` means the stream closed cleanly.
    async fn next_event(&self) -> Result<Option<ChatEvent>, TransportError>;
    async fn acknowledge(&self, event_id: &str) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

#[derive(Default)]
pub struct NoopEventSource;

#[async_trait]
impl EventSource for NoopEventSource {
    async fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn next_event(&self) -> Result<Option<ChatEvent>, TransportError> {
        Ok(None)
    }

    async fn acknowledge(&self, _event_id: &str) -> Result<(), TransportError> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Pumps events from a source into the handler, one task per event, and
/// reconnects with exponential backoff when the transport fails.
pub struct ListenerRunner {
    source: Arc<dyn EventSource>,
    handler: Arc<dyn EventHandler>,
    reconnect_policy: ReconnectPolicy,
}

impl ListenerRunner {
    pub fn new(
        source: Arc<dyn EventSource>,
        handler: Arc<dyn EventHandler>,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { source, handler, reconnect_policy }
    }

    pub async fn start(&self) -> Result<()> {
        for attempt in 0..=self.reconnect_policy.max_retries {
            match self.connect_and_pump(attempt).await {
                Ok(()) => return Ok(()),
                Err(transport_error) => {
                    warn!(
                        attempt,
                        max_retries = self.reconnect_policy.max_retries,
                        error = %transport_error,
                        "chat transport failed"
                    );

                    if attempt >= self.reconnect_policy.max_retries {
                        warn!(
                            max_retries = self.reconnect_policy.max_retries,
                            "chat transport retries exhausted; continuing process without crash"
                        );
                        return Ok(());
                    }

                    let delay = self.reconnect_policy.backoff(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Ok(())
    }

    async fn connect_and_pump(&self, attempt: u32) -> Result<(), TransportError> {
        info!(attempt, "opening chat transport connection");
        self.source.connect().await?;
        info!(attempt, "chat transport connected");

        let mut in_flight = JoinSet::new();
        let result = self.pump(&mut in_flight).await;

        while let Some(joined) = in_flight.join_next().await {
            if let Err(error) = joined {
                warn!(error = %error, "event task panicked or was cancelled");
            }
        }
        result
    }

    async fn pump(&self, in_flight: &mut JoinSet<()>) -> Result<(), TransportError> {
        loop {
            let Some(event) = self.source.next_event().await? else {
                info!("chat transport stream closed");
                self.source.disconnect().await?;
                return Ok(());
            };

            info!(
                event_name = "ingress.chat.event_received",
                event_id = %event.event_id,
                user_id = %event.user_id,
                channel_id = %event.channel_id,
                correlation_id = %event.event_id,
                "received chat event"
            );

            if let Err(error) = self.source.acknowledge(&event.event_id).await {
                warn!(
                    event_name = "ingress.chat.ack_sent",
                    event_id = %event.event_id,
                    correlation_id = %event.event_id,
                    error = %error,
                    "failed to acknowledge chat event"
                );
            } else {
                debug!(
                    event_name = "ingress.chat.ack_sent",
                    event_id = %event.event_id,
                    correlation_id = %event.event_id,
                    "acknowledged chat event"
                );
            }

            let handler = self.handler.clone();
            in_flight.spawn(async move {
                let context = EventContext { correlation_id: event.event_id.clone() };
                if let Err(error) = handler.handle(&event, &context).await {
                    warn!(
                        event_id = %event.event_id,
                        correlation_id = %context.correlation_id,
                        error = %error,
                        "event handling failed; continuing listener loop"
                    );
                }
            });

            while let Some(joined) = in_flight.try_join_next() {
                if let Err(error) = joined {
                    warn!(error = %error, "event task panicked or was cancelled");
                }
            }
        }
    }
}
