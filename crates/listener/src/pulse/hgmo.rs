//! Handler for hg.mozilla.org push notifications.

use std::sync::Arc;

use async_trait::async_trait;
use proxy::{Dispatcher, HgChangegroup, PulseBinding, WebhookEvent};

use super::{BusDelivery, DeliveryHandler, DeliveryOutcome};

/// Decodes changegroup notifications and dispatches them.
pub struct HgPushHandler {
    dispatcher: Arc<Dispatcher>,
}

impl HgPushHandler {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Bindings for every watched repository, empty without an hg verifier.
    pub fn bindings(&self) -> Vec<PulseBinding> {
        self.dispatcher
            .verifiers()
            .hgmo()
            .map(|verifier| verifier.bindings())
            .unwrap_or_default()
    }
}

#[async_trait]
impl DeliveryHandler for HgPushHandler {
    fn name(&self) -> &'static str {
        "hgmo"
    }

    async fn handle(&self, delivery: &BusDelivery) -> DeliveryOutcome {
        let event = match HgChangegroup::from_delivery(&delivery.routing_key, &delivery.body) {
            Ok(message) => WebhookEvent::HgChangegroup(message),
            Err(e) => return DeliveryOutcome::Dropped(e),
        };
        match self.dispatcher.dispatch(&event).await {
            Ok(request) => DeliveryOutcome::Triggered {
                job: request.job_path,
            },
            Err(e) => DeliveryOutcome::Dropped(e),
        }
    }
}
