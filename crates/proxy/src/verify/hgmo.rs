//! hg.mozilla.org push verification.
//!
//! A changegroup notification is trusted only after the repository's own
//! pushlog confirms it: the push id must exist and its user, time and single
//! tip changeset must equal what the notification claims.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::types::RAW_JSON_PARAM;
use crate::{
    AllowList, CanonicalTriggerRequest, EventSource, HgChangegroup, JobPath, JobSegment,
    Namespace, ProxyError, PulseBinding, PushlogApi, RepositoryName, Revision, TriggerParams,
};

/// Exchange hg.mozilla.org publishes push notifications on.
pub const HGMO_EXCHANGE: &str = "exchange/hgpushes/v2";

/// Verifies changegroup notifications from hg.mozilla.org.
pub struct HgPushVerifier {
    valid_repos: AllowList,
    base_url: String,
    pushlog: Arc<dyn PushlogApi>,
}

impl HgPushVerifier {
    /// Creates a verifier for the allow-listed repository paths
    /// (`org/repo`) hosted under `base_url`.
    pub fn new(
        valid_repos: AllowList,
        base_url: impl Into<String>,
        pushlog: Arc<dyn PushlogApi>,
    ) -> Self {
        Self {
            valid_repos,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            pushlog,
        }
    }

    /// One binding per watched repository; the routing key is the path.
    pub fn bindings(&self) -> Vec<PulseBinding> {
        self.valid_repos
            .sorted()
            .into_iter()
            .map(|repo| PulseBinding {
                routing_key: repo.to_string(),
                exchange_name: HGMO_EXCHANGE.to_string(),
            })
            .collect()
    }

    /// Cross-checks the notification against the pushlog and builds the
    /// trigger request.
    #[instrument(skip_all, fields(routing_key = %event.routing_key))]
    pub async fn verify(
        &self,
        event: &HgChangegroup,
    ) -> Result<CanonicalTriggerRequest, ProxyError> {
        let repo_path = event.routing_key.as_str();
        if !self.valid_repos.contains(repo_path) {
            warn!(routing_key = repo_path, "unwatched repository");
            return Err(ProxyError::authenticity(
                EventSource::HgPush,
                repo_path,
                "unwatched repository",
            ));
        }

        if event.heads.len() != 1 {
            return Err(ProxyError::validation(
                "heads",
                event.heads.len().to_string(),
                format!("message has {} heads, only 1 supported", event.heads.len()),
            ));
        }
        if event.pushlog_entries.len() != 1 {
            return Err(ProxyError::validation(
                "pushlog pushes",
                event.pushlog_entries.len().to_string(),
                format!(
                    "message has {} pushlog pushes, only 1 supported",
                    event.pushlog_entries.len()
                ),
            ));
        }

        let (org, repo) = split_repo_path(repo_path)?;
        let head = Revision::new(&event.heads[0])?;

        let expected_url = format!("{}/{}", self.base_url, repo_path);
        if event.repo_url != expected_url {
            warn!(repo_url = %event.repo_url, expected = %expected_url, "repo url does not match routing key");
            return Err(ProxyError::authenticity(
                EventSource::HgPush,
                &event.repo_url,
                format!("repo url does not match routing key {repo_path}"),
            ));
        }

        let claimed = &event.pushlog_entries[0];
        let url = format!(
            "{expected_url}/json-pushes?version=2&startID={}&endID={}&tipsonly=1",
            claimed.push_id.saturating_sub(1),
            claimed.push_id
        );
        debug!(%url, "cross-checking pushlog");
        let response = self.pushlog.fetch_pushes(&url).await?;

        let Some(recorded) = response.pushes.get(&claimed.push_id) else {
            return Err(ProxyError::authenticity(
                EventSource::HgPush,
                claimed.push_id.to_string(),
                "push id not found in pushlog",
            ));
        };
        let matches = recorded.user == claimed.user
            && recorded.date == claimed.time
            && recorded.changesets.len() == 1
            && recorded.changesets[0] == head.as_str();
        if !matches {
            warn!(push_id = claimed.push_id, user = %claimed.user, "pushlog does not match message");
            return Err(ProxyError::authenticity(
                EventSource::HgPush,
                claimed.push_id.to_string(),
                "pushlog response does not match message",
            ));
        }

        let job_path = JobPath::new(vec![
            JobSegment::new(EventSource::HgPush.as_str())?,
            JobSegment::from(&org),
            JobSegment::from(&repo),
        ])?;
        let mut params = TriggerParams::new();
        params
            .set("HEAD_REPOSITORY", expected_url)
            .set("HEAD_REV", head.as_str())
            .set(RAW_JSON_PARAM, event.raw_payload.to_string());

        Ok(CanonicalTriggerRequest { job_path, params })
    }
}

fn split_repo_path(path: &str) -> Result<(Namespace, RepositoryName), ProxyError> {
    let invalid = || {
        ProxyError::validation(
            "repository path",
            path,
            "invalid hg.mozilla.org repository path",
        )
    };
    let mut parts = path.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(org), Some(repo), None) => Ok((
            Namespace::new(org).map_err(|_| invalid())?,
            RepositoryName::new(repo).map_err(|_| invalid())?,
        )),
        _ => Err(invalid()),
    }
}
