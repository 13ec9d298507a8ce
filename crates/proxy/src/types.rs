//! Shared value types for the trigger pipeline.
//!
//! Unlike the identifiers in [`crate::identifiers`], these types describe how
//! validated values are assembled: the Jenkins job path and form parameters,
//! the CSRF crumb, bus bindings and allow-lists.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::{JobSegment, ProxyError};

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// The fixed set of inbound sources. One adapter and one verifier per variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventSource {
    /// DockerHub repository push webhook.
    DockerHub,
    /// Google Container Registry push notification (Pub/Sub push delivery).
    Gcr,
    /// GitHub `push` webhook.
    GitHub,
    /// hg.mozilla.org `changegroup.1` notification on Pulse.
    HgPush,
    /// Taskcluster task-completed message on Pulse.
    TaskclusterCompletion,
}

impl EventSource {
    /// Short lowercase name used in logs and as the first job-path segment.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DockerHub => "dockerhub",
            Self::Gcr => "gcr",
            Self::GitHub => "github",
            Self::HgPush => "hgmo",
            Self::TaskclusterCompletion => "taskcluster",
        }
    }
}

impl std::fmt::Display for EventSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Trigger request
// ---------------------------------------------------------------------------

/// Ordered Jenkins job coordinates, e.g. `dockerhub / mozilla / testrepo`.
///
/// Every segment is a [`JobSegment`], so a `JobPath` can only be built from
/// values that already passed the segment allow-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPath(Vec<JobSegment>);

impl JobPath {
    /// Builds a job path from already-validated segments.
    ///
    /// Returns [`ProxyError::Validation`] if `segments` is empty.
    pub fn new(segments: Vec<JobSegment>) -> Result<Self, ProxyError> {
        if segments.is_empty() {
            return Err(ProxyError::validation(
                "job path",
                "",
                "a job path needs at least one segment",
            ));
        }
        Ok(Self(segments))
    }

    /// Validates each string as a [`JobSegment`] and builds the path.
    pub fn from_strs<I, S>(segments: I) -> Result<Self, ProxyError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let segments = segments
            .into_iter()
            .map(|s| JobSegment::new(s.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(segments)
    }

    /// Returns the segments in order.
    pub fn segments(&self) -> &[JobSegment] {
        &self.0
    }

    /// Renders the Jenkins URL path: `/job/a/job/b/job/c`.
    pub fn to_url_path(&self) -> String {
        self.0.iter().fold(String::new(), |mut path, segment| {
            path.push_str("/job/");
            path.push_str(segment.as_str());
            path
        })
    }
}

impl std::fmt::Display for JobPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_url_path())
    }
}

/// Form parameters posted to `buildWithParameters`. Keys are unique.
///
/// Backed by a `BTreeMap` so the encoded form body is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TriggerParams(BTreeMap<String, String>);

impl TriggerParams {
    /// Creates an empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key` to `value`, replacing any earlier value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Returns the value for `key`, if set.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

/// Key of the opaque parameter carrying the original payload for operators.
pub const RAW_JSON_PARAM: &str = "RawJSON";

/// A verified trigger intent: which Jenkins job to build and with what.
///
/// Only verifiers construct these, after every segment and every
/// security-sensitive parameter has passed its allow-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalTriggerRequest {
    /// Job coordinates.
    pub job_path: JobPath,
    /// Form parameters.
    pub params: TriggerParams,
}

// ---------------------------------------------------------------------------
// Jenkins CSRF crumb
// ---------------------------------------------------------------------------

/// Anti-forgery token issued by `/crumbIssuer/api/json`.
///
/// Fetched fresh for every trigger call and never cached.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JenkinsCrumb {
    /// Header the crumb must be sent in (e.g. `Jenkins-Crumb`).
    #[serde(rename = "crumbRequestField")]
    pub header_name: String,
    /// The crumb value.
    #[serde(rename = "crumb")]
    pub value: String,
}

// ---------------------------------------------------------------------------
// Message bus
// ---------------------------------------------------------------------------

/// One topic-exchange binding for a Pulse subscription.
///
/// Derived from configuration at startup; immutable for the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PulseBinding {
    /// Routing-key pattern (`*`/`#` wildcards allowed).
    pub routing_key: String,
    /// Exchange the queue is bound to.
    pub exchange_name: String,
}

// ---------------------------------------------------------------------------
// Allow-lists
// ---------------------------------------------------------------------------

/// A closed set of permitted identifiers (namespaces, orgs, projects, repos).
///
/// Built once at startup and only read afterwards, so it is shared across
/// request handlers without locking.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList(HashSet<String>);

impl AllowList {
    /// Returns `true` if `value` is permitted. Comparison is exact.
    pub fn contains(&self, value: &str) -> bool {
        self.0.contains(value)
    }

    /// Iterates the permitted values in sorted order.
    pub fn sorted(&self) -> Vec<&str> {
        let mut values: Vec<&str> = self.0.iter().map(String::as_str).collect();
        values.sort_unstable();
        values
    }

    /// Number of permitted values.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` when nothing is permitted.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for AllowList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(Into::into)
                .filter(|s: &String| !s.is_empty())
                .collect(),
        )
    }
}
