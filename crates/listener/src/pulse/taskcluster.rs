//! Handler for Taskcluster task completions.

use std::sync::Arc;

use async_trait::async_trait;
use proxy::{Dispatcher, PulseBinding, TaskclusterCompletion, WebhookEvent};

use super::{BusDelivery, DeliveryHandler, DeliveryOutcome};

/// Dispatches completions whose route is under the watched prefix and
/// ignores the rest.
pub struct TaskCompletionHandler {
    dispatcher: Arc<Dispatcher>,
}

impl TaskCompletionHandler {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    pub fn bindings(&self) -> Vec<PulseBinding> {
        self.dispatcher
            .verifiers()
            .taskcluster()
            .map(|verifier| vec![verifier.binding()])
            .unwrap_or_default()
    }
}

#[async_trait]
impl DeliveryHandler for TaskCompletionHandler {
    fn name(&self) -> &'static str {
        "taskcluster"
    }

    async fn handle(&self, delivery: &BusDelivery) -> DeliveryOutcome {
        let watched = self
            .dispatcher
            .verifiers()
            .taskcluster()
            .is_some_and(|verifier| verifier.accepts(&delivery.routing_key));
        if !watched {
            return DeliveryOutcome::Ignored {
                reason: format!("routing key {} is not watched", delivery.routing_key),
            };
        }

        let event = match TaskclusterCompletion::from_delivery(&delivery.routing_key, &delivery.body)
        {
            Ok(message) => WebhookEvent::TaskclusterCompletion(message),
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pulse::run_consumer;
    use crate::pulse::testing::{delivery, InMemoryStream};
    use crate::testing::RecordingJenkins;

    use std::sync::Mutex;

    use proxy::verify::TASK_COMPLETED_EXCHANGE;
    use proxy::{
        ProxyError, SlugId, TaskDefinition, TaskDefinitionApi, TaskclusterVerifier, Verifiers,
    };
    use serde_json::json;

    const TASK_ID: &str = "fN1SbArXTPSVFNUvaOlinQ";

    #[derive(Default)]
    struct FakeQueue {
        requested: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TaskDefinitionApi for FakeQueue {
        async fn task_definition(&self, task_id: &SlugId) -> Result<TaskDefinition, ProxyError> {
            self.requested.lock().unwrap().push(task_id.to_string());
            Ok(TaskDefinition {
                extra: json!({"cloudops-deploy": {"image-task-id": "Xa2SbArXTPSVFNUvaOlinQ", "variant": "prod"}}),
            })
        }
    }

    fn handler(jenkins: Arc<RecordingJenkins>, queue: Arc<FakeQueue>) -> TaskCompletionHandler {
        let verifiers =
            Verifiers::new().with_taskcluster(TaskclusterVerifier::new("cloudops.deploy.v1", queue));
        TaskCompletionHandler::new(Arc::new(Dispatcher::new(verifiers, jenkins)))
    }

    fn completed() -> String {
        json!({"status": {"taskId": TASK_ID, "state": "completed"}, "runId": 0}).to_string()
    }

    #[tokio::test]
    async fn watched_route_triggers_taskcluster_job() {
        let jenkins = Arc::new(RecordingJenkins::default());
        let outcome = handler(jenkins.clone(), Arc::new(FakeQueue::default()))
            .handle(&delivery(
                "route.cloudops.deploy.v1.myapp.prod",
                TASK_COMPLETED_EXCHANGE,
                &completed(),
            ))
            .await;

        assert!(matches!(outcome, DeliveryOutcome::Triggered { .. }));
        let requests = jenkins.requests.lock().unwrap();
        assert_eq!(
            requests[0].job_path.to_url_path(),
            "/job/taskcluster/job/myapp/job/prod"
        );
        assert_eq!(requests[0].params.get("TASK_ID"), Some(TASK_ID));
    }

    #[tokio::test]
    async fn other_routes_are_ignored_without_fetch() {
        let queue = Arc::new(FakeQueue::default());
        let outcome = handler(Arc::new(RecordingJenkins::default()), queue.clone())
            .handle(&delivery("route.someone.else", TASK_COMPLETED_EXCHANGE, &completed()))
            .await;

        assert!(matches!(outcome, DeliveryOutcome::Ignored { .. }));
        assert!(queue.requested.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn every_delivery_is_acked() {
        let jenkins = Arc::new(RecordingJenkins::default());
        let stream = InMemoryStream::new(vec![
            delivery("route.someone.else", TASK_COMPLETED_EXCHANGE, &completed()),
            delivery("route.cloudops.deploy.v1.myapp", TASK_COMPLETED_EXCHANGE, "{}"),
            delivery("route.cloudops.deploy.v1.myapp", TASK_COMPLETED_EXCHANGE, &completed()),
        ]);
        let acks = stream.acks.clone();

        run_consumer(stream, &handler(jenkins.clone(), Arc::new(FakeQueue::default())))
            .await
            .unwrap();

        assert_eq!(acks.lock().unwrap().len(), 3);
        assert_eq!(jenkins.requests.lock().unwrap().len(), 1);
    }

    #[test]
    fn binding_is_the_route_prefix_wildcard() {
        let bindings =
            handler(Arc::new(RecordingJenkins::default()), Arc::new(FakeQueue::default())).bindings();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].routing_key, "route.cloudops.deploy.v1.#");
    }
}
