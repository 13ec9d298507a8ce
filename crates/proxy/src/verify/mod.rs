//! Per-source trust verification.
//!
//! Each [`WebhookEvent`] variant has exactly one verifier. A verifier either
//! rejects the event with a [`ProxyError`] or returns the
//! [`CanonicalTriggerRequest`] to send to Jenkins. Verifiers never trigger
//! builds themselves; see [`crate::dispatch`].
//!
//! | Source | Protocol |
//! |--------|----------|
//! | DockerHub | namespace allow-list, callback URL binding, registry callback |
//! | GCR | accepted action, reference grammar, project allow-list |
//! | GitHub | published hook source ranges, org allow-list |
//! | hg.mozilla.org | repo allow-list, single head and push, pushlog cross-check |
//! | Taskcluster | route prefix, task-definition fetch |

mod dockerhub;
mod gcr;
mod github;
mod hgmo;
mod taskcluster;

pub use dockerhub::DockerHubVerifier;
pub use gcr::{GcrVerifier, ACCEPTED_ACTION};
pub use github::{parse_source_ranges, GitHubVerifier};
pub use hgmo::{HgPushVerifier, HGMO_EXCHANGE};
pub use taskcluster::{
    DeployMetadata, TaskclusterVerifier, DEPLOY_EXTRA_KEY, TASK_COMPLETED_EXCHANGE,
};

use crate::{CanonicalTriggerRequest, EventSource, ProxyError, WebhookEvent};

/// The verifier table for every source the process is configured for.
///
/// Sources left unset reject their events with
/// [`ProxyError::Configuration`].
#[derive(Default)]
pub struct Verifiers {
    dockerhub: Option<DockerHubVerifier>,
    gcr: Option<GcrVerifier>,
    github: Option<GitHubVerifier>,
    hgmo: Option<HgPushVerifier>,
    taskcluster: Option<TaskclusterVerifier>,
}

impl Verifiers {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dockerhub(mut self, verifier: DockerHubVerifier) -> Self {
        self.dockerhub = Some(verifier);
        self
    }

    pub fn with_gcr(mut self, verifier: GcrVerifier) -> Self {
        self.gcr = Some(verifier);
        self
    }

    pub fn with_github(mut self, verifier: GitHubVerifier) -> Self {
        self.github = Some(verifier);
        self
    }

    pub fn with_hgmo(mut self, verifier: HgPushVerifier) -> Self {
        self.hgmo = Some(verifier);
        self
    }

    pub fn with_taskcluster(mut self, verifier: TaskclusterVerifier) -> Self {
        self.taskcluster = Some(verifier);
        self
    }

    /// The GitHub verifier, needed by the HTTP layer for the origin check.
    pub fn github(&self) -> Option<&GitHubVerifier> {
        self.github.as_ref()
    }

    pub fn hgmo(&self) -> Option<&HgPushVerifier> {
        self.hgmo.as_ref()
    }

    pub fn taskcluster(&self) -> Option<&TaskclusterVerifier> {
        self.taskcluster.as_ref()
    }

    /// Routes `event` to its source's verifier.
    pub async fn verify(&self, event: &WebhookEvent) -> Result<CanonicalTriggerRequest, ProxyError> {
        match event {
            WebhookEvent::DockerHubPush(push) => {
                Self::configured(&self.dockerhub, event.source())?.verify(push).await
            }
            WebhookEvent::GcrPush(push) => Self::configured(&self.gcr, event.source())?.verify(push),
            WebhookEvent::GitHubPush(push) => {
                Self::configured(&self.github, event.source())?.verify(push)
            }
            WebhookEvent::HgChangegroup(message) => {
                Self::configured(&self.hgmo, event.source())?.verify(message).await
            }
            WebhookEvent::TaskclusterCompletion(message) => {
                Self::configured(&self.taskcluster, event.source())?
                    .verify(message)
                    .await
            }
        }
    }

    fn configured<T>(slot: &Option<T>, source: EventSource) -> Result<&T, ProxyError> {
        slot.as_ref().ok_or_else(|| ProxyError::Configuration {
            message: format!("no verifier configured for {source}"),
        })
    }
}
