//! Inbound transports for the deployment proxy.
//!
//! Two kinds of event source feed the shared [`proxy::Dispatcher`]:
//!
//! - [`http`]: an `axum` router receiving DockerHub, GCR and GitHub webhooks
//!   and answering load-balancer heartbeats.
//!
//! - [`pulse`]: consumers of Mozilla's Pulse message bus (AMQP 0-9-1) for
//!   hg.mozilla.org pushes and Taskcluster task completions. Each consumer
//!   holds at most one unacknowledged delivery and acknowledges it only after
//!   the verify-then-trigger sequence has finished.
//!
//! ## Deployment Scenarios
//!
//! | Scenario | Sources | Notes |
//! |----------|---------|-------|
//! | Webhooks only | `http` | Pulse credentials unset |
//! | Full | `http` + both `pulse` consumers | Pulse user needs read access to both exchanges |
//! | Behind a load balancer | `http` with `X-Forwarded-For` | Only when the balancer overwrites the header |
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Transport details (routing, status codes, AMQP
//! channels, queue declaration, acknowledgement) live here. The [`proxy`]
//! crate sees only decoded [`proxy::WebhookEvent`]s.

pub mod http;
pub mod pulse;

#[cfg(test)]
mod testing;

pub use http::{build_router, RouterConfig};
pub use pulse::{
    run_consumer, Acknowledge, BusDelivery, DeliveryHandler, DeliveryOutcome, DeliveryStream,
    InboundDelivery, PulseError,
};
