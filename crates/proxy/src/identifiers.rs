//! Allow-list validated identifiers.
//!
//! Any string derived from an inbound event that ends up in a Jenkins job path
//! or a security-sensitive form parameter is wrapped in one of these newtypes
//! first. Construction is the only place the pattern is checked, so holding a
//! value of the type is proof it passed.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ProxyError;

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

static NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9_\-]{2,255}$").expect("name pattern compiles")
});

static TAG_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9_\-\.]{1,100}$").expect("tag pattern compiles")
});

static JOB_SEGMENT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9_\-\.]{1,255}$").expect("job segment pattern compiles")
});

// algorithm:hex, as in `sha256:1d37e48f...`
static DIGEST_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]+(?:[+._\-][a-z0-9]+)*:[a-fA-F0-9]{32,256}$")
        .expect("digest pattern compiles")
});

// Taskcluster slugids: 22 url-safe base64 characters.
static SLUG_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_\-]{22}$").expect("slugid pattern compiles")
});

static REVISION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-f]{40}$").expect("revision pattern compiles"));

// ---------------------------------------------------------------------------
// Macro for pattern-checked String newtypes.
// Generates: struct, new() returning Result<Self, ProxyError>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! validated_id {
    (
        $(#[$attr:meta])*
        $name:ident, $pattern:ident, $field:literal
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub struct $name(String);

        impl $name {
            /// Validates `value` against the allow-list pattern.
            ///
            /// Returns [`ProxyError::Validation`] naming the field and the
            /// rejected value on failure.
            pub fn new(value: impl Into<String>) -> Result<Self, ProxyError> {
                let v = value.into();
                if $pattern.is_match(&v) {
                    Ok(Self(v))
                } else {
                    Err(ProxyError::validation(
                        $field,
                        v,
                        "does not match the allowed pattern",
                    ))
                }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Identifiers — names that become job-path segments
// ---------------------------------------------------------------------------

validated_id! {
    /// A registry namespace, GCR project, GitHub org or hg repository group.
    ///
    /// Letters, digits, `-` and `_`; 2 to 255 characters.
    Namespace, NAME_PATTERN, "namespace"
}

validated_id! {
    /// A repository name. Same alphabet and length as [`Namespace`].
    RepositoryName, NAME_PATTERN, "repository name"
}

validated_id! {
    /// An image tag or build variant.
    ///
    /// Letters, digits, `-`, `_` and `.`; 1 to 100 characters.
    ImageTag, TAG_PATTERN, "tag"
}

validated_id! {
    /// An image content digest in `algorithm:hex` form.
    ImageDigest, DIGEST_PATTERN, "digest"
}

validated_id! {
    /// A Taskcluster task id.
    SlugId, SLUG_ID_PATTERN, "task id"
}

validated_id! {
    /// A full 40-character hg changeset id.
    Revision, REVISION_PATTERN, "revision"
}

/// One segment of a Jenkins job path.
///
/// Letters, digits, `-`, `_` and `.`; 1 to 255 characters; never `.` or `..`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobSegment(String);

impl JobSegment {
    /// Validates `value` as a job-path segment.
    pub fn new(value: impl Into<String>) -> Result<Self, ProxyError> {
        let v = value.into();
        if !JOB_SEGMENT_PATTERN.is_match(&v) {
            return Err(ProxyError::validation(
                "job path segment",
                v,
                "does not match the allowed pattern",
            ));
        }
        if v == "." || v == ".." {
            return Err(ProxyError::validation(
                "job path segment",
                v,
                "relative path segments are not allowed",
            ));
        }
        Ok(Self(v))
    }

    /// Returns the segment as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! segment_from {
    ($($name:ident),*) => {
        $(
            impl From<&$name> for JobSegment {
                fn from(value: &$name) -> Self {
                    // The source pattern is a subset of the segment pattern.
                    Self(value.as_str().to_string())
                }
            }
        )*
    };
}

segment_from!(Namespace, RepositoryName, ImageTag);

// ---------------------------------------------------------------------------
// Identifiers — internally generated
// ---------------------------------------------------------------------------

/// Correlates every log line emitted while handling one inbound event.
///
/// Generated fresh per HTTP request or bus delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(Uuid);

impl EventId {
    /// Generates a new random event identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
