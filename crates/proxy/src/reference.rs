//! Container image reference grammar for GCR notifications.
//!
//! Accepted form: `registry-domain/project/repository(:tag|@digest)`.
//!
//! - `registry-domain` is a dotted DNS name with an optional port
//!   (`gcr.io`, `us.gcr.io`, `localhost.localdomain:5000`).
//! - `project` and `repository` are single path components. Nested
//!   repositories are rejected.
//! - A tag keeps its literal text; a digest keeps only `algorithm:hex`.
//!
//! Character classes follow the distribution reference grammar, narrowed to
//! ASCII. Anything that does not match is a [`ProxyError::Validation`].

use std::sync::LazyLock;

use regex::Regex;

use crate::ProxyError;

static REFERENCE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^(?P<registry>[a-z0-9](?:[a-z0-9\-]*[a-z0-9])?(?:\.[a-z0-9](?:[a-z0-9\-]*[a-z0-9])?)+(?::[0-9]{1,5})?)",
        r"/(?P<project>[a-z0-9](?:[a-z0-9._\-]*[a-z0-9])?)",
        r"/(?P<repository>[a-z0-9]+(?:[._\-][a-z0-9]+)*)",
        r"(?::(?P<tag>[A-Za-z0-9_][A-Za-z0-9_.\-]{0,127})",
        r"|@(?P<digest>[a-z0-9]+(?:[+._\-][a-z0-9]+)*:[a-fA-F0-9]{32,256}))$",
    ))
    .expect("image reference pattern compiles")
});

/// What an image reference points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceTarget {
    /// A mutable tag, e.g. `1.1`.
    Tag(String),
    /// A content digest, e.g. `sha256:1d37...`.
    Digest(String),
}

/// A parsed `registry/project/repository(:tag|@digest)` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// Registry host, e.g. `gcr.io`.
    pub registry: String,
    /// Project (the "domain" segment of the job path), e.g. `my-project`.
    pub project: String,
    /// Repository name, e.g. `hello-world`.
    pub repository: String,
    /// Tag or digest.
    pub target: ReferenceTarget,
}

impl ImageReference {
    /// Parses `reference`, returning [`ProxyError::Validation`] if it does not
    /// follow the grammar.
    pub fn parse(reference: &str) -> Result<Self, ProxyError> {
        let captures = REFERENCE_PATTERN.captures(reference).ok_or_else(|| {
            ProxyError::validation(
                "image reference",
                reference,
                "expected registry/project/repository:tag or @digest",
            )
        })?;

        let target = match (captures.name("tag"), captures.name("digest")) {
            (Some(tag), None) => ReferenceTarget::Tag(tag.as_str().to_string()),
            (None, Some(digest)) => ReferenceTarget::Digest(digest.as_str().to_string()),
            _ => {
                return Err(ProxyError::validation(
                    "image reference",
                    reference,
                    "exactly one of tag or digest is required",
                ))
            }
        };

        Ok(Self {
            registry: captures["registry"].to_string(),
            project: captures["project"].to_string(),
            repository: captures["repository"].to_string(),
            target,
        })
    }

    /// The tag text or the `algorithm:hex` digest.
    pub fn tag_or_digest(&self) -> &str {
        match &self.target {
            ReferenceTarget::Tag(tag) => tag,
            ReferenceTarget::Digest(digest) => digest,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_reference_round_trip() {
        let reference = ImageReference::parse("gcr.io/my-project/hello-world:1.1").unwrap();
        assert_eq!(reference.registry, "gcr.io");
        assert_eq!(reference.project, "my-project");
        assert_eq!(reference.repository, "hello-world");
        assert_eq!(reference.tag_or_digest(), "1.1");
        assert_eq!(reference.target, ReferenceTarget::Tag("1.1".into()));
    }

    #[test]
    fn digest_reference_keeps_algorithm_and_hex() {
        let reference = ImageReference::parse(
            "gcr.io/my-project/hello-world@sha256:1d37e48f9ceff6d8030570cd36286a61",
        )
        .unwrap();
        assert_eq!(reference.repository, "hello-world");
        assert_eq!(
            reference.tag_or_digest(),
            "sha256:1d37e48f9ceff6d8030570cd36286a61"
        );
    }

    #[test]
    fn regional_registries_and_ports_parse() {
        assert!(ImageReference::parse("us.gcr.io/p1/app:v2").is_ok());
        assert!(ImageReference::parse("registry.local:5000/p1/app:v2").is_ok());
    }

    #[test]
    fn malformed_references_fail() {
        for bad in [
            "hello-world:1.1",
            "gcr.io/hello-world:1.1",
            "gcr.io/my-project/nested/hello-world:1.1",
            "gcr.io/my-project/hello-world",
            "gcr.io/my-project/hello-world:",
            "gcr.io/my-project/hello-world:1.1@sha256:1d37e48f9ceff6d8030570cd36286a61",
            "gcr.io/my-project/hello-world@sha256:short",
            "gcr.io/my-project/Hello-World:1.1",
            "gcr.io/../hello-world:1.1",
            "gcr.io/my-project/hello-world:1.1\n",
        ] {
            assert!(ImageReference::parse(bad).is_err(), "{bad:?} accepted");
        }
    }
}
