//! Outbound capability traits.
//!
//! Verifiers and the dispatcher depend only on these traits. The `jenkins`
//! crate implements [`JenkinsTrigger`]; the `upstream` crate implements the
//! rest over HTTP. Implementations report every failure as a
//! [`ProxyError`], normally [`ProxyError::Upstream`].
//!
//! All calls are single-shot: implementations must not retry.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{CanonicalTriggerRequest, ProxyError, SlugId};

// ---------------------------------------------------------------------------
// Jenkins
// ---------------------------------------------------------------------------

/// Starts a parameterized Jenkins build.
#[async_trait]
pub trait JenkinsTrigger: Send + Sync {
    /// Posts `request` to `<job path>/buildWithParameters`.
    ///
    /// # Errors
    ///
    /// [`ProxyError::Validation`] if a job-path segment fails re-validation,
    /// [`ProxyError::Upstream`] for crumb, transport or status failures.
    async fn trigger(&self, request: &CanonicalTriggerRequest) -> Result<(), ProxyError>;
}

// ---------------------------------------------------------------------------
// DockerHub
// ---------------------------------------------------------------------------

/// Body posted to a DockerHub webhook callback URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallbackPayload {
    /// `success`, `failure` or `error`.
    pub state: String,
    /// Free text shown in the DockerHub UI.
    pub description: String,
    /// Name of the system reporting.
    pub context: String,
}

impl CallbackPayload {
    /// The canned success callback sent before every DockerHub trigger.
    pub fn success() -> Self {
        Self {
            state: "success".to_string(),
            description: "Push accepted for deployment".to_string(),
            context: "cloudops-deployment-proxy".to_string(),
        }
    }
}

/// Confirms a webhook with the registry that claims to have sent it.
#[async_trait]
pub trait RegistryCallback: Send + Sync {
    /// Posts `payload` to `callback_url`. Any non-2xx answer is an error.
    async fn confirm(&self, callback_url: &str, payload: &CallbackPayload) -> Result<(), ProxyError>;
}

// ---------------------------------------------------------------------------
// hg.mozilla.org pushlog
// ---------------------------------------------------------------------------

/// One push as recorded by the pushlog.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PushlogPush {
    /// Changesets of the push. With `tipsonly=1`, only the tip.
    #[serde(default)]
    pub changesets: Vec<String>,
    /// Push time, seconds since the epoch.
    pub date: i64,
    /// Pusher.
    pub user: String,
}

/// `json-pushes?version=2` response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PushlogResponse {
    /// Highest push id in the repository.
    #[serde(default)]
    pub lastpushid: u64,
    /// Pushes keyed by push id.
    #[serde(default)]
    pub pushes: HashMap<u64, PushlogPush>,
}

/// Read-only access to a repository's authoritative push log.
#[async_trait]
pub trait PushlogApi: Send + Sync {
    /// GETs `url` and decodes it. Non-200 answers are errors.
    async fn fetch_pushes(&self, url: &str) -> Result<PushlogResponse, ProxyError>;
}

// ---------------------------------------------------------------------------
// Taskcluster queue
// ---------------------------------------------------------------------------

/// The parts of a Taskcluster task definition the proxy reads.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TaskDefinition {
    /// Free-form `extra` section of the task.
    #[serde(default)]
    pub extra: Value,
}

/// Read-only access to task definitions.
#[async_trait]
pub trait TaskDefinitionApi: Send + Sync {
    /// Fetches the definition of `task_id`.
    async fn task_definition(&self, task_id: &SlugId) -> Result<TaskDefinition, ProxyError>;
}
