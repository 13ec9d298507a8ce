//! Taskcluster task-completion verification.
//!
//! The completion message is taken at face value as far as the task id goes;
//! the deployment metadata is read from the task definition on the queue
//! service, never from the message.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{instrument, warn};

use crate::types::RAW_JSON_PARAM;
use crate::{
    CanonicalTriggerRequest, EventSource, ImageTag, JobPath, JobSegment, ProxyError,
    PulseBinding, SlugId, TaskDefinitionApi, TaskclusterCompletion, TriggerParams,
};

/// Exchange the Taskcluster queue publishes completions on.
pub const TASK_COMPLETED_EXCHANGE: &str = "exchange/taskcluster-queue/v1/task-completed";

/// Key of the deployment section in a task's `extra`.
pub const DEPLOY_EXTRA_KEY: &str = "cloudops-deploy";

/// Deployment metadata carried in `extra["cloudops-deploy"]`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeployMetadata {
    /// Task that built the image to deploy.
    #[serde(rename = "image-task-id")]
    pub image_task_id: String,
    /// Deployment variant, e.g. `prod`.
    pub variant: String,
}

impl DeployMetadata {
    /// Extracts the deployment section from a task's `extra` value.
    pub fn from_extra(extra: &serde_json::Value) -> Result<Self, ProxyError> {
        let section = extra.get(DEPLOY_EXTRA_KEY).ok_or_else(|| {
            ProxyError::validation(
                "task extra",
                DEPLOY_EXTRA_KEY,
                "deployment metadata is missing",
            )
        })?;
        Self::deserialize(section).map_err(|e| {
            ProxyError::validation("task extra", DEPLOY_EXTRA_KEY, e.to_string())
        })
    }
}

/// Verifies task completions received on `route.<prefix>.#`.
pub struct TaskclusterVerifier {
    route_prefix: String,
    queue: Arc<dyn TaskDefinitionApi>,
}

impl TaskclusterVerifier {
    /// Creates a verifier for routes under `route.<prefix>.`.
    pub fn new(prefix: &str, queue: Arc<dyn TaskDefinitionApi>) -> Self {
        Self {
            route_prefix: format!("route.{}.", prefix.trim_matches('.')),
            queue,
        }
    }

    /// The single binding this consumer needs.
    pub fn binding(&self) -> PulseBinding {
        PulseBinding {
            routing_key: format!("{}#", self.route_prefix),
            exchange_name: TASK_COMPLETED_EXCHANGE.to_string(),
        }
    }

    /// Returns `true` if `routing_key` is under the watched prefix.
    ///
    /// Other keys may legitimately arrive on a shared exchange and are
    /// ignored, not rejected.
    pub fn accepts(&self, routing_key: &str) -> bool {
        routing_key.starts_with(&self.route_prefix)
    }

    /// Fetches the task definition and builds the trigger request.
    ///
    /// Callers check [`Self::accepts`] first; a key outside the prefix is a
    /// [`ProxyError::Validation`] here.
    #[instrument(skip_all, fields(routing_key = %event.routing_key, task_id = %event.task_id))]
    pub async fn verify(
        &self,
        event: &TaskclusterCompletion,
    ) -> Result<CanonicalTriggerRequest, ProxyError> {
        let sub_route = event
            .routing_key
            .strip_prefix(&self.route_prefix)
            .filter(|route| !route.is_empty())
            .ok_or_else(|| {
                ProxyError::validation("routing key", &event.routing_key, "not under the watched prefix")
            })?;

        let mut segments = vec![JobSegment::new(EventSource::TaskclusterCompletion.as_str())?];
        for part in sub_route.split('.') {
            segments.push(JobSegment::new(part)?);
        }
        let job_path = JobPath::new(segments)?;

        let task_id = SlugId::new(&event.task_id)?;
        let definition = self.queue.task_definition(&task_id).await?;
        let deploy = DeployMetadata::from_extra(&definition.extra).inspect_err(|e| {
            warn!(error = %e, "task has no usable deployment metadata");
        })?;
        let image_task_id = SlugId::new(&deploy.image_task_id)?;
        let variant = ImageTag::new(&deploy.variant)?;

        let mut params = TriggerParams::new();
        params
            .set("TASK_ID", task_id.as_str())
            .set("IMAGE_TASK_ID", image_task_id.as_str())
            .set("VARIANT", variant.as_str())
            .set(RAW_JSON_PARAM, event.raw_payload.to_string());

        Ok(CanonicalTriggerRequest { job_path, params })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeTaskDefinitions;
    use crate::TaskDefinition;
    use serde_json::json;

    const TASK_ID: &str = "fN1SbArXTPSVFNUvaOlinQ";
    const IMAGE_TASK_ID: &str = "Xa2SbArXTPSVFNUvaOlinQ";

    fn completion(routing_key: &str) -> TaskclusterCompletion {
        TaskclusterCompletion {
            task_id: TASK_ID.to_string(),
            routing_key: routing_key.to_string(),
            raw_payload: json!({"status": {"taskId": TASK_ID}}),
        }
    }

    fn definition(extra: serde_json::Value) -> TaskDefinition {
        TaskDefinition { extra }
    }

    fn deploy_extra() -> serde_json::Value {
        json!({"cloudops-deploy": {"image-task-id": IMAGE_TASK_ID, "variant": "prod"}})
    }

    #[test]
    fn binding_watches_every_route_under_the_prefix() {
        let queue = Arc::new(FakeTaskDefinitions::missing());
        let verifier = TaskclusterVerifier::new("cloudops.deploy.v1", queue);
        assert_eq!(verifier.binding().routing_key, "route.cloudops.deploy.v1.#");
        assert_eq!(verifier.binding().exchange_name, TASK_COMPLETED_EXCHANGE);
        assert!(verifier.accepts("route.cloudops.deploy.v1.app.prod"));
        assert!(!verifier.accepts("route.other.app"));
        assert!(!verifier.accepts("route.cloudops.deploy.v10.app"));
    }

    #[tokio::test]
    async fn completion_builds_taskcluster_job() {
        let queue = Arc::new(FakeTaskDefinitions::returning(definition(deploy_extra())));
        let request = TaskclusterVerifier::new("cloudops.deploy.v1", queue.clone())
            .verify(&completion("route.cloudops.deploy.v1.myapp.stage"))
            .await
            .unwrap();

        assert_eq!(
            request.job_path.to_url_path(),
            "/job/taskcluster/job/myapp/job/stage"
        );
        assert_eq!(request.params.get("TASK_ID"), Some(TASK_ID));
        assert_eq!(request.params.get("IMAGE_TASK_ID"), Some(IMAGE_TASK_ID));
        assert_eq!(request.params.get("VARIANT"), Some("prod"));
        assert_eq!(queue.requested(), vec![TASK_ID.to_string()]);
    }

    #[tokio::test]
    async fn missing_or_malformed_metadata_fails() {
        for extra in [
            json!({}),
            json!({"cloudops-deploy": {"variant": "prod"}}),
            json!({"cloudops-deploy": {"image-task-id": "../../x", "variant": "prod"}}),
            json!({"cloudops-deploy": {"image-task-id": IMAGE_TASK_ID, "variant": "prod&x=1"}}),
        ] {
            let queue = Arc::new(FakeTaskDefinitions::returning(definition(extra.clone())));
            let result = TaskclusterVerifier::new("cloudops.deploy.v1", queue)
                .verify(&completion("route.cloudops.deploy.v1.myapp"))
                .await;
            assert!(result.is_err(), "{extra}");
        }
    }

    #[tokio::test]
    async fn fetch_failure_fails() {
        let queue = Arc::new(FakeTaskDefinitions::missing());
        let err = TaskclusterVerifier::new("cloudops.deploy.v1", queue)
            .verify(&completion("route.cloudops.deploy.v1.myapp"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::Upstream { .. }));
    }

    #[tokio::test]
    async fn hostile_task_id_or_route_never_reaches_the_queue() {
        let queue = Arc::new(FakeTaskDefinitions::returning(definition(deploy_extra())));
        let verifier = TaskclusterVerifier::new("cloudops.deploy.v1", queue.clone());

        let mut bad_task = completion("route.cloudops.deploy.v1.myapp");
        bad_task.task_id = "../../../../../../etc/x".to_string();
        assert!(verifier.verify(&bad_task).await.is_err());

        assert!(verifier
            .verify(&completion("route.cloudops.deploy.v1.my app"))
            .await
            .is_err());
        assert!(verifier
            .verify(&completion("route.cloudops.deploy.v1."))
            .await
            .is_err());
        assert!(verifier
            .verify(&completion("route.cloudops.deploy.v1.a..b"))
            .await
            .is_err());

        assert!(queue.requested().is_empty());
    }
}
