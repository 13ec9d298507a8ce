//! DockerHub trust verification.
//!
//! DockerHub offers no shared secret. Authenticity is established by posting
//! a success callback to the callback URL in the webhook; the registry only
//! accepts callbacks for hooks it actually fired, so a refused callback means
//! a spoofed or expired hook.

use std::sync::Arc;

use tracing::{instrument, warn};

use crate::types::RAW_JSON_PARAM;
use crate::{
    AllowList, CallbackPayload, CanonicalTriggerRequest, DockerHubPush, EventSource, ImageTag,
    JobPath, JobSegment, Namespace, ProxyError, RegistryCallback, RepositoryName, TriggerParams,
};

/// Verifies DockerHub push webhooks.
pub struct DockerHubVerifier {
    valid_namespaces: AllowList,
    registry_base: String,
    callback: Arc<dyn RegistryCallback>,
}

impl DockerHubVerifier {
    /// Creates a verifier.
    ///
    /// `registry_base` is the origin DockerHub callback URLs live under,
    /// e.g. `https://registry.hub.docker.com`.
    pub fn new(
        valid_namespaces: AllowList,
        registry_base: impl Into<String>,
        callback: Arc<dyn RegistryCallback>,
    ) -> Self {
        Self {
            valid_namespaces,
            registry_base: registry_base.into().trim_end_matches('/').to_string(),
            callback,
        }
    }

    /// Runs the DockerHub protocol and builds the trigger request.
    ///
    /// Order of checks:
    ///
    /// 1. namespace allow-list ([`ProxyError::Authenticity`])
    /// 2. name and tag patterns ([`ProxyError::Validation`])
    /// 3. callback URL bound to this registry, namespace and name
    ///    ([`ProxyError::Authenticity`], no outbound call made)
    /// 4. callback accepted by the registry ([`ProxyError::Authenticity`])
    #[instrument(skip_all, fields(namespace = %event.namespace, repository = %event.repo_name))]
    pub async fn verify(&self, event: &DockerHubPush) -> Result<CanonicalTriggerRequest, ProxyError> {
        if !self.valid_namespaces.contains(&event.namespace) {
            warn!(namespace = %event.namespace, "invalid namespace");
            return Err(ProxyError::authenticity(
                EventSource::DockerHub,
                &event.namespace,
                "namespace is not in the allow-list",
            ));
        }

        let namespace = Namespace::new(&event.namespace)?;
        let name = RepositoryName::new(&event.repo_name)?;
        let tag = ImageTag::new(&event.tag)?;

        let expected_prefix = format!("{}/u/{}/{}/hook/", self.registry_base, namespace, name);
        if !event.callback_url.starts_with(&expected_prefix) {
            warn!(callback_url = %event.callback_url, "callback url does not belong to the pushed repository");
            return Err(ProxyError::authenticity(
                EventSource::DockerHub,
                &event.callback_url,
                "callback url does not belong to the pushed repository",
            ));
        }

        if let Err(e) = self
            .callback
            .confirm(&event.callback_url, &CallbackPayload::success())
            .await
        {
            warn!(error = %e, callback_url = %event.callback_url, "callback refused");
            return Err(ProxyError::authenticity(
                EventSource::DockerHub,
                &event.callback_url,
                format!("registry refused the callback: {e}"),
            ));
        }

        let job_path = JobPath::new(vec![
            JobSegment::new(EventSource::DockerHub.as_str())?,
            JobSegment::from(&namespace),
            JobSegment::from(&name),
        ])?;
        let mut params = TriggerParams::new();
        params
            .set("Tag", tag.as_str())
            .set(RAW_JSON_PARAM, event.raw_payload.to_string());

        Ok(CanonicalTriggerRequest { job_path, params })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeCallback;
    use serde_json::json;

    const REGISTRY: &str = "https://registry.hub.docker.com";

    fn event() -> DockerHubPush {
        DockerHubPush {
            namespace: "mozilla".into(),
            repo_name: "testrepo".into(),
            tag: "v1.1.1".into(),
            callback_url: format!("{REGISTRY}/u/mozilla/testrepo/hook/2020202020/"),
            raw_payload: json!({"push_data": {"tag": "v1.1.1"}}),
        }
    }

    fn verifier(callback: Arc<FakeCallback>) -> DockerHubVerifier {
        DockerHubVerifier::new(["mozilla"].into_iter().collect(), REGISTRY, callback)
    }

    #[tokio::test]
    async fn valid_push_builds_dockerhub_job() {
        let callback = Arc::new(FakeCallback::accepting());
        let request = verifier(callback.clone()).verify(&event()).await.unwrap();

        assert_eq!(
            request.job_path.to_url_path(),
            "/job/dockerhub/job/mozilla/job/testrepo"
        );
        assert_eq!(request.params.get("Tag"), Some("v1.1.1"));
        assert!(request.params.get(RAW_JSON_PARAM).is_some());
        assert_eq!(callback.calls(), vec![event().callback_url]);
    }

    #[tokio::test]
    async fn unknown_namespace_is_unauthorized_without_callback() {
        let callback = Arc::new(FakeCallback::accepting());
        let mut event = event();
        event.namespace = "invalidddd".into();

        let err = verifier(callback.clone()).verify(&event).await.unwrap_err();
        assert_eq!(err.status_code(), 401);
        assert!(callback.calls().is_empty());
    }

    #[tokio::test]
    async fn callback_for_another_owner_is_unauthorized_without_callback() {
        let callback = Arc::new(FakeCallback::accepting());
        let mut event = event();
        event.callback_url = format!("{REGISTRY}/u/maliciousowner/testrepo/hook/2020202020/");

        let err = verifier(callback.clone()).verify(&event).await.unwrap_err();
        assert_eq!(err.status_code(), 401);
        assert!(callback.calls().is_empty());
    }

    #[tokio::test]
    async fn callback_on_another_host_is_unauthorized() {
        let callback = Arc::new(FakeCallback::accepting());
        let mut event = event();
        event.callback_url =
            "https://registry.hub.docker.com.evil.example/u/mozilla/testrepo/hook/1/".into();

        let err = verifier(callback.clone()).verify(&event).await.unwrap_err();
        assert_eq!(err.status_code(), 401);
        assert!(callback.calls().is_empty());
    }

    #[tokio::test]
    async fn refused_callback_is_unauthorized() {
        let callback = Arc::new(FakeCallback::refusing(403));
        let err = verifier(callback.clone()).verify(&event()).await.unwrap_err();
        assert_eq!(err.status_code(), 401);
        assert_eq!(callback.calls().len(), 1);
    }

    #[tokio::test]
    async fn invalid_name_or_tag_never_reaches_a_job_path() {
        let callback = Arc::new(FakeCallback::accepting());

        let mut bad_name = event();
        bad_name.repo_name = "abkljaiojewiojf[[[[[[{{}}{}{}".into();
        let err = verifier(callback.clone()).verify(&bad_name).await.unwrap_err();
        assert_eq!(err.status_code(), 500);
        assert!(callback.calls().is_empty());

        let mut bad_tag = event();
        bad_tag.tag = "v1.1.1[bad]".into();
        let err = verifier(callback.clone()).verify(&bad_tag).await.unwrap_err();
        assert!(matches!(err, ProxyError::Validation { field: "tag", .. }));
    }
}
