//! Verify-then-trigger sequencing.
//!
//! Every inbound transport hands its decoded [`WebhookEvent`] to
//! [`Dispatcher::dispatch`]. The Jenkins trigger is issued only when the
//! source's verifier returned a request; a rejected event never reaches
//! Jenkins.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::{CanonicalTriggerRequest, JenkinsTrigger, ProxyError, Verifiers, WebhookEvent};

/// Shared by all HTTP handlers and bus consumers of one process.
pub struct Dispatcher {
    verifiers: Verifiers,
    jenkins: Arc<dyn JenkinsTrigger>,
}

impl Dispatcher {
    pub fn new(verifiers: Verifiers, jenkins: Arc<dyn JenkinsTrigger>) -> Self {
        Self { verifiers, jenkins }
    }

    pub fn verifiers(&self) -> &Verifiers {
        &self.verifiers
    }

    /// Verifies `event` and, on success, triggers the resulting job.
    ///
    /// Returns the request that was sent. Rejections are logged at `warn`;
    /// upstream failures, during verification or the trigger, at `error`.
    /// Nothing is retried.
    pub async fn dispatch(&self, event: &WebhookEvent) -> Result<CanonicalTriggerRequest, ProxyError> {
        let source = event.source();
        let request = self.verifiers.verify(event).await.inspect_err(|e| {
            if e.is_upstream() {
                error!(%source, error = %e, "upstream failure during verification");
            } else {
                warn!(%source, error = %e, "event rejected");
            }
        })?;

        info!(%source, job = %request.job_path, "triggering jenkins job");
        self.jenkins.trigger(&request).await.inspect_err(|e| {
            error!(%source, job = %request.job_path, error = %e, "error triggering jenkins");
        })?;

        info!(%source, job = %request.job_path, "jenkins job triggered");
        Ok(request)
    }
}
