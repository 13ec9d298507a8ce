//! Taskcluster queue client.

use async_trait::async_trait;
use proxy::{ProxyError, SlugId, TaskDefinition, TaskDefinitionApi};
use tracing::debug;

use crate::UpstreamClientError;

const SERVICE: &str = "taskcluster";

/// Reads task definitions from `<root>/api/queue/v1/task/<id>`.
#[derive(Debug, Clone)]
pub struct TaskclusterQueueClient {
    root_url: String,
    http: reqwest::Client,
}

impl TaskclusterQueueClient {
    pub fn new(root_url: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            root_url: root_url.into().trim_end_matches('/').to_string(),
            http,
        }
    }

    pub async fn get_task(&self, task_id: &SlugId) -> Result<TaskDefinition, UpstreamClientError> {
        let url = format!("{}/api/queue/v1/task/{}", self.root_url, task_id);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|source| UpstreamClientError::Transport {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamClientError::Status {
                url,
                status: status.as_u16(),
            });
        }

        debug!(%url, "task definition fetched");
        response
            .json()
            .await
            .map_err(|source| UpstreamClientError::Decode { url, source })
    }
}

#[async_trait]
impl TaskDefinitionApi for TaskclusterQueueClient {
    async fn task_definition(&self, task_id: &SlugId) -> Result<TaskDefinition, ProxyError> {
        self.get_task(task_id)
            .await
            .map_err(|e| e.into_proxy_error(SERVICE))
    }
}
