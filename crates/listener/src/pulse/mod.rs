//! Pulse message-bus consumption.
//!
//! A consumer pulls one delivery at a time from a [`DeliveryStream`], hands it
//! to a [`DeliveryHandler`] and acknowledges it once the handler returns,
//! whatever the outcome. Content and authenticity failures are therefore
//! never redelivered; only a crash between receipt and acknowledgement makes
//! the broker deliver the message again.
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`amqp`] | `lapin` implementation of [`DeliveryStream`] |
//! | [`hgmo`] | Handler for hg.mozilla.org changegroup notifications |
//! | [`taskcluster`] | Handler for Taskcluster task completions |

use async_trait::async_trait;
use proxy::{EventId, JobPath, ProxyError};
use thiserror::Error;
use tracing::{error, info, info_span, warn, Instrument};

pub mod amqp;
pub mod hgmo;
pub mod taskcluster;

pub use amqp::{AmqpDeliveryStream, PulseConnection, PulseSettings};
pub use hgmo::HgPushHandler;
pub use taskcluster::TaskCompletionHandler;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures of the bus transport itself.
#[derive(Debug, Error)]
pub enum PulseError {
    /// The AMQP URI could not be built from host and credentials.
    #[error("invalid pulse url {url}: {message}")]
    InvalidUrl { url: String, message: String },

    /// Connecting or opening a channel failed.
    #[error("could not connect to pulse: {0}")]
    Connect(#[source] lapin::Error),

    /// Declaring, binding or consuming from a queue failed.
    #[error("queue {queue} setup failed: {source}")]
    Queue {
        queue: String,
        #[source]
        source: lapin::Error,
    },

    /// Receiving a delivery failed.
    #[error("delivery failed: {0}")]
    Delivery(#[source] lapin::Error),

    /// Acknowledging a delivery failed.
    #[error("ack failed: {0}")]
    Ack(#[source] lapin::Error),
}

// ---------------------------------------------------------------------------
// Deliveries
// ---------------------------------------------------------------------------

/// The parts of a bus message a handler sees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusDelivery {
    /// Raw message body.
    pub body: Vec<u8>,
    /// Routing key the message was published with.
    pub routing_key: String,
    /// Exchange the message came from.
    pub exchange: String,
}

/// Acknowledges one delivery.
#[async_trait]
pub trait Acknowledge: Send + Sync {
    async fn ack(&self) -> Result<(), PulseError>;
}

/// A delivery together with the means to acknowledge it.
pub struct InboundDelivery {
    pub message: BusDelivery,
    pub acker: Box<dyn Acknowledge>,
}

/// Source of deliveries for one queue subscription.
#[async_trait]
pub trait DeliveryStream: Send {
    /// Waits for the next delivery. `None` means the subscription ended.
    async fn next_delivery(&mut self) -> Option<Result<InboundDelivery, PulseError>>;
}

/// What processing a delivery led to.
#[derive(Debug)]
pub enum DeliveryOutcome {
    /// A build was triggered.
    Triggered { job: JobPath },
    /// The delivery was not meant for this consumer.
    Ignored { reason: String },
    /// The delivery was rejected or the trigger failed.
    Dropped(ProxyError),
}

/// Turns one delivery into at most one trigger.
#[async_trait]
pub trait DeliveryHandler: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    async fn handle(&self, delivery: &BusDelivery) -> DeliveryOutcome;
}

// ---------------------------------------------------------------------------
// Consumption loop
// ---------------------------------------------------------------------------

/// Processes deliveries until the stream ends.
///
/// Each delivery is handled inside a span with a fresh [`EventId`] and
/// acknowledged exactly once, after the handler returns. Returns the first
/// transport error; the caller decides whether that ends the process.
pub async fn run_consumer<S>(mut stream: S, handler: &dyn DeliveryHandler) -> Result<(), PulseError>
where
    S: DeliveryStream,
{
    info!(consumer = handler.name(), "consumer started");
    while let Some(next) = stream.next_delivery().await {
        let InboundDelivery { message, acker } = next?;
        let event_id = EventId::new_random();
        let span = info_span!(
            "delivery",
            consumer = handler.name(),
            %event_id,
            exchange = %message.exchange,
            routing_key = %message.routing_key,
        );

        async {
            match handler.handle(&message).await {
                DeliveryOutcome::Triggered { job } => info!(%job, "delivery triggered build"),
                DeliveryOutcome::Ignored { reason } => info!(%reason, "delivery ignored"),
                DeliveryOutcome::Dropped(e) if e.is_upstream() => {
                    error!(error = %e, "delivery dropped after upstream failure")
                }
                DeliveryOutcome::Dropped(e) => warn!(error = %e, "delivery dropped"),
            }
            // Acknowledge after processing.
            acker.ack().await
        }
        .instrument(span)
        .await
        .inspect_err(|e| error!(error = %e, "failed to acknowledge delivery"))?;
    }
    info!(consumer = handler.name(), "consumer stopped");
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Routing keys of acknowledged deliveries, in ack order.
    pub(crate) type AckLog = Arc<Mutex<Vec<String>>>;

    struct RecordingAcker {
        routing_key: String,
        log: AckLog,
    }

    #[async_trait]
    impl Acknowledge for RecordingAcker {
        async fn ack(&self) -> Result<(), PulseError> {
            self.log.lock().unwrap().push(self.routing_key.clone());
            Ok(())
        }
    }

    /// Replays a fixed list of deliveries.
    pub(crate) struct InMemoryStream {
        pending: VecDeque<BusDelivery>,
        pub(crate) acks: AckLog,
    }

    impl InMemoryStream {
        pub(crate) fn new(deliveries: Vec<BusDelivery>) -> Self {
            Self {
                pending: deliveries.into(),
                acks: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl DeliveryStream for InMemoryStream {
        async fn next_delivery(&mut self) -> Option<Result<InboundDelivery, PulseError>> {
            let message = self.pending.pop_front()?;
            let acker = RecordingAcker {
                routing_key: message.routing_key.clone(),
                log: self.acks.clone(),
            };
            Some(Ok(InboundDelivery {
                message,
                acker: Box::new(acker),
            }))
        }
    }

    pub(crate) fn delivery(routing_key: &str, exchange: &str, body: &str) -> BusDelivery {
        BusDelivery {
            body: body.as_bytes().to_vec(),
            routing_key: routing_key.to_string(),
            exchange: exchange.to_string(),
        }
    }
}
