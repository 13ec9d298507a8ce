//! GitHub push-webhook verification.
//!
//! Two layers, both required: the caller's address must be inside the hook
//! ranges GitHub publishes on its meta endpoint, and the pushing repository's
//! owner must be an allow-listed organization. The address check runs before
//! the body is decoded; the organization check runs on the decoded event.

use std::net::IpAddr;
use std::sync::LazyLock;

use ipnet::IpNet;
use regex::Regex;
use tracing::{instrument, warn};

use crate::types::RAW_JSON_PARAM;
use crate::{
    AllowList, CanonicalTriggerRequest, EventSource, GitHubPush, JobPath, JobSegment, Namespace,
    ProxyError, RepositoryName, TriggerParams,
};

// Printable ASCII, no spaces, no `..`, no leading `/` or `-`.
static GIT_REF_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_][!-~]{0,254}$").expect("git ref pattern compiles")
});

/// Parses the CIDR strings published by the GitHub meta endpoint.
///
/// Returns [`ProxyError::Configuration`] naming the first unparsable entry.
pub fn parse_source_ranges(ranges: &[String]) -> Result<Vec<IpNet>, ProxyError> {
    ranges
        .iter()
        .map(|cidr| {
            cidr.trim().parse::<IpNet>().map_err(|e| ProxyError::Configuration {
                message: format!("invalid cidr {cidr}: {e}"),
            })
        })
        .collect()
}

/// Verifies GitHub push webhooks.
#[derive(Debug, Clone)]
pub struct GitHubVerifier {
    valid_orgs: AllowList,
    source_ranges: Vec<IpNet>,
}

impl GitHubVerifier {
    /// Creates a verifier from the org allow-list and the hook source ranges
    /// fetched once at startup.
    ///
    /// An empty range list is a [`ProxyError::Configuration`]: it would let
    /// every address through.
    pub fn new(valid_orgs: AllowList, source_ranges: Vec<IpNet>) -> Result<Self, ProxyError> {
        if source_ranges.is_empty() {
            return Err(ProxyError::Configuration {
                message: "no GitHub hook source ranges".to_string(),
            });
        }
        Ok(Self {
            valid_orgs,
            source_ranges,
        })
    }

    /// Checks the caller's address against every published range.
    ///
    /// `None` means the address could not be determined and is rejected.
    pub fn check_origin(&self, ip: Option<IpAddr>) -> Result<(), ProxyError> {
        let Some(ip) = ip.map(|ip| ip.to_canonical()) else {
            warn!(ip = "unknown", "received POST from unknown IP");
            return Err(ProxyError::UntrustedOrigin {
                ip: "unknown".to_string(),
            });
        };
        if self.source_ranges.iter().all(|range| range.contains(&ip)) {
            Ok(())
        } else {
            warn!(%ip, "received POST from unknown IP");
            Err(ProxyError::UntrustedOrigin { ip: ip.to_string() })
        }
    }

    /// Checks the organization and builds the trigger request.
    #[instrument(skip_all, fields(org = %event.org_login, repository = %event.repo_name))]
    pub fn verify(&self, event: &GitHubPush) -> Result<CanonicalTriggerRequest, ProxyError> {
        if !self.valid_orgs.contains(&event.org_login) {
            warn!(org = %event.org_login, "invalid org");
            return Err(ProxyError::authenticity(
                EventSource::GitHub,
                &event.org_login,
                "organization is not in the allow-list",
            ));
        }

        let org = Namespace::new(&event.org_login)?;
        let repo = RepositoryName::new(&event.repo_name)?;
        if !GIT_REF_PATTERN.is_match(&event.git_ref) || event.git_ref.contains("..") {
            return Err(ProxyError::validation(
                "ref",
                &event.git_ref,
                "not a printable git ref",
            ));
        }

        let job_path = JobPath::new(vec![
            JobSegment::new(EventSource::GitHub.as_str())?,
            JobSegment::from(&org),
            JobSegment::from(&repo),
        ])?;
        let mut params = TriggerParams::new();
        params
            .set("Ref", event.git_ref.as_str())
            .set(RAW_JSON_PARAM, event.raw_payload.to_string());

        Ok(CanonicalTriggerRequest { job_path, params })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn verifier(ranges: &[&str]) -> GitHubVerifier {
        let ranges: Vec<String> = ranges.iter().map(|r| r.to_string()).collect();
        GitHubVerifier::new(
            ["mozilla-services"].into_iter().collect(),
            parse_source_ranges(&ranges).unwrap(),
        )
        .unwrap()
    }

    fn push(org: &str, repo: &str, git_ref: &str) -> GitHubPush {
        GitHubPush {
            org_login: org.to_string(),
            repo_name: repo.to_string(),
            git_ref: git_ref.to_string(),
            raw_payload: json!({"ref": git_ref}),
        }
    }

    #[test]
    fn address_inside_every_range_is_accepted() {
        let verifier = verifier(&["192.30.252.0/22", "192.30.252.0/24"]);
        assert!(verifier
            .check_origin(Some(IpAddr::V4(Ipv4Addr::new(192, 30, 252, 10))))
            .is_ok());
    }

    #[test]
    fn address_outside_one_range_is_bad_request() {
        let verifier = verifier(&["192.30.252.0/22", "192.30.252.0/24"]);
        let err = verifier
            .check_origin(Some(IpAddr::V4(Ipv4Addr::new(192, 30, 253, 10))))
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(err.to_string().contains("192.30.253.10"));
    }

    #[test]
    fn unknown_address_is_bad_request() {
        let err = verifier(&["192.30.252.0/22"]).check_origin(None).unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn ipv4_mapped_addresses_are_normalised() {
        let mapped = IpAddr::V6(Ipv4Addr::new(192, 30, 252, 10).to_ipv6_mapped());
        assert!(verifier(&["192.30.252.0/22"]).check_origin(Some(mapped)).is_ok());
        assert!(verifier(&["192.30.252.0/22"])
            .check_origin(Some(IpAddr::V6(Ipv6Addr::LOCALHOST)))
            .is_err());
    }

    #[test]
    fn empty_range_list_is_refused() {
        let err = GitHubVerifier::new(AllowList::default(), Vec::new()).unwrap_err();
        assert!(matches!(err, ProxyError::Configuration { .. }));
    }

    #[test]
    fn unparsable_range_is_refused() {
        assert!(parse_source_ranges(&["not-a-cidr".to_string()]).is_err());
    }

    #[test]
    fn allowed_org_builds_github_job() {
        let request = verifier(&["192.30.252.0/22"])
            .verify(&push("mozilla-services", "cloudops-deployment-proxy", "refs/heads/main"))
            .unwrap();
        assert_eq!(
            request.job_path.to_url_path(),
            "/job/github/job/mozilla-services/job/cloudops-deployment-proxy"
        );
        assert_eq!(request.params.get("Ref"), Some("refs/heads/main"));
    }

    #[test]
    fn unknown_org_is_unauthorized() {
        let err = verifier(&["192.30.252.0/22"])
            .verify(&push("evil-org", "repo", "refs/heads/main"))
            .unwrap_err();
        assert_eq!(err.status_code(), 401);
        assert!(err.to_string().contains("evil-org"));
    }

    #[test]
    fn hostile_refs_and_names_are_rejected() {
        let verifier = verifier(&["192.30.252.0/22"]);
        for (repo, git_ref) in [
            ("repo", "refs/heads/../../x"),
            ("repo", "refs/heads/a b"),
            ("repo", ""),
            ("repo/../x", "refs/heads/main"),
        ] {
            let err = verifier
                .verify(&push("mozilla-services", repo, git_ref))
                .unwrap_err();
            assert_eq!(err.status_code(), 500, "{repo} {git_ref}");
        }
    }
}
