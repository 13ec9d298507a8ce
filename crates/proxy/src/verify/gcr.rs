//! GCR push-notification verification.

use tracing::{instrument, warn};

use crate::types::RAW_JSON_PARAM;
use crate::{
    AllowList, CanonicalTriggerRequest, EventSource, GcrPush, ImageDigest, ImageReference,
    ImageTag, JobPath, JobSegment, Namespace, ProxyError, ReferenceTarget, RepositoryName,
    TriggerParams,
};

/// The only GCR action that leads to a build.
pub const ACCEPTED_ACTION: &str = "INSERT";

/// Verifies GCR push notifications.
///
/// GCR pushes reach the proxy through an authenticated Pub/Sub push
/// subscription, so the checks here are structural: the action and the
/// reference grammar. A non-empty project allow-list further restricts
/// which projects may trigger builds.
pub struct GcrVerifier {
    valid_projects: AllowList,
}

impl GcrVerifier {
    /// Creates a verifier. An empty `valid_projects` permits every project.
    pub fn new(valid_projects: AllowList) -> Self {
        Self { valid_projects }
    }

    /// Checks the notification and builds the trigger request.
    #[instrument(skip_all, fields(action = %event.action))]
    pub fn verify(&self, event: &GcrPush) -> Result<CanonicalTriggerRequest, ProxyError> {
        if event.action != ACCEPTED_ACTION {
            warn!(action = %event.action, "unsupported gcr action");
            return Err(ProxyError::validation(
                "action",
                &event.action,
                format!("only {ACCEPTED_ACTION} is accepted"),
            ));
        }

        let raw_reference = event.image_reference().ok_or_else(|| {
            ProxyError::validation("image reference", "", "neither tag nor digest is set")
        })?;
        let reference = ImageReference::parse(raw_reference)?;

        if !self.valid_projects.is_empty() && !self.valid_projects.contains(&reference.project) {
            warn!(project = %reference.project, "invalid gcr project");
            return Err(ProxyError::authenticity(
                EventSource::Gcr,
                &reference.project,
                "project is not in the allow-list",
            ));
        }

        let project = Namespace::new(&reference.project)?;
        let repository = RepositoryName::new(&reference.repository)?;
        let tag_or_digest = match &reference.target {
            ReferenceTarget::Tag(tag) => ImageTag::new(tag)?.to_string(),
            ReferenceTarget::Digest(digest) => ImageDigest::new(digest)?.to_string(),
        };

        let job_path = JobPath::new(vec![
            JobSegment::new(EventSource::Gcr.as_str())?,
            JobSegment::from(&project),
            JobSegment::from(&repository),
        ])?;
        let mut params = TriggerParams::new();
        params
            .set("Tag", tag_or_digest)
            .set(RAW_JSON_PARAM, event.raw_payload.to_string());

        Ok(CanonicalTriggerRequest { job_path, params })
    }
}
