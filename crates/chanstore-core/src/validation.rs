//! Input validation, quota and size enforcement for version writes.
//!
//! These checks run before any state is touched, so a failure here never
//! leaves a partial write behind.

use crate::channel::{normalize_tags, Channel};
use crate::error::ValidationError;
use crate::manifest::ManifestSyntax;
use crate::version::Location;

/// Per-channel limits enforced on every version write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Maximum number of versions a channel may hold.
    pub max_versions_per_channel: usize,
    /// Maximum materialized content size in bytes.
    pub max_content_bytes: usize,
}

/// Validate a channel or version name.
pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyName);
    }
    Ok(())
}

/// Validate and normalize a tag set.
pub fn validate_tags(tags: Vec<String>) -> Result<Vec<String>, ValidationError> {
    if tags.iter().any(|t| t.trim().is_empty()) {
        return Err(ValidationError::EmptyTag);
    }
    Ok(normalize_tags(tags))
}

/// Exactly one content source must be supplied, and in-memory content
/// must not be empty. Uploads are only measured once read.
pub fn check_content_source(content: Option<&[u8]>, has_upload: bool) -> Result<(), ValidationError> {
    match (content, has_upload) {
        (Some(_), true) => Err(ValidationError::AmbiguousContent),
        (None, false) => Err(ValidationError::MissingContent),
        (Some(bytes), false) if bytes.is_empty() => Err(ValidationError::EmptyContent),
        _ => Ok(()),
    }
}

/// Reject a name already present in the channel's index (exact match).
pub fn check_unique_version_name(channel: &Channel, name: &str) -> Result<(), ValidationError> {
    if channel.has_version_named(name) {
        return Err(ValidationError::DuplicateVersionName(name.to_string()));
    }
    Ok(())
}

/// Reject an object-store write whose name matches an existing
/// object-store version case-insensitively. Payload keys fold case, so the
/// two would share one object.
pub fn check_object_name_collision(channel: &Channel, name: &str) -> Result<(), ValidationError> {
    let folded = name.to_lowercase();
    let taken = channel
        .versions
        .iter()
        .any(|s| s.location == Location::ObjectStore && s.name.to_lowercase() == folded);
    if taken {
        return Err(ValidationError::DuplicateVersionName(name.to_string()));
    }
    Ok(())
}

/// Reject a write that would take the channel past its version quota.
pub fn check_version_quota(channel: &Channel, limits: &Limits) -> Result<(), ValidationError> {
    if channel.version_count() >= limits.max_versions_per_channel {
        return Err(ValidationError::QuotaExceeded {
            limit: limits.max_versions_per_channel,
        });
    }
    Ok(())
}

/// Check a materialized content length against the size limit.
pub fn check_content_size(len: usize, limits: &Limits) -> Result<(), ValidationError> {
    if len == 0 {
        return Err(ValidationError::EmptyContent);
    }
    if len > limits.max_content_bytes {
        return Err(ValidationError::ContentTooLarge {
            limit: limits.max_content_bytes,
        });
    }
    Ok(())
}

/// Syntax-check content as a manifest document collection.
pub fn check_manifest(
    checker: &dyn ManifestSyntax,
    content: &[u8],
) -> Result<usize, ValidationError> {
    Ok(checker.parse_all(content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::VersionSummary;
    use crate::manifest::YamlDocuments;
    use crate::types::{OrgId, VersionId};
    use crate::version::Location;
    use proptest::prelude::*;

    const LIMITS: Limits = Limits {
        max_versions_per_channel: 3,
        max_content_bytes: 16,
    };

    fn channel_with(count: u8) -> Channel {
        let mut ch = Channel::new(OrgId::new("acme"), "payments", vec![], 0);
        for i in 0..count {
            ch.append_summary(
                VersionSummary {
                    id: VersionId::from_bytes([i; 16]),
                    name: format!("v{}", i),
                    description: String::new(),
                    location: Location::Inline,
                    created_at: 0,
                },
                0,
            );
        }
        ch
    }

    #[test]
    fn test_name_must_not_be_blank() {
        assert_eq!(validate_name(""), Err(ValidationError::EmptyName));
        assert_eq!(validate_name("   "), Err(ValidationError::EmptyName));
        assert_eq!(validate_name("v1"), Ok(()));
    }

    #[test]
    fn test_content_source_exclusive() {
        assert_eq!(check_content_source(Some(b"a: 1"), false), Ok(()));
        assert_eq!(check_content_source(None, true), Ok(()));
        assert_eq!(
            check_content_source(Some(b"a: 1"), true),
            Err(ValidationError::AmbiguousContent)
        );
        assert_eq!(
            check_content_source(None, false),
            Err(ValidationError::MissingContent)
        );
    }

    #[test]
    fn test_empty_inline_content_rejected_up_front() {
        assert_eq!(
            check_content_source(Some(b""), false),
            Err(ValidationError::EmptyContent)
        );
        // Both supplied is reported as ambiguous even when one is empty.
        assert_eq!(
            check_content_source(Some(b""), true),
            Err(ValidationError::AmbiguousContent)
        );
    }

    #[test]
    fn test_quota_boundary() {
        assert!(check_version_quota(&channel_with(2), &LIMITS).is_ok());
        assert_eq!(
            check_version_quota(&channel_with(3), &LIMITS),
            Err(ValidationError::QuotaExceeded { limit: 3 })
        );
    }

    #[test]
    fn test_size_boundary() {
        assert!(check_content_size(16, &LIMITS).is_ok());
        assert_eq!(
            check_content_size(17, &LIMITS),
            Err(ValidationError::ContentTooLarge { limit: 16 })
        );
        assert_eq!(check_content_size(0, &LIMITS), Err(ValidationError::EmptyContent));
    }

    #[test]
    fn test_duplicate_name_is_exact_match() {
        let ch = channel_with(2);
        assert!(check_unique_version_name(&ch, "v1").is_err());
        assert!(check_unique_version_name(&ch, "V1").is_ok());
    }

    #[test]
    fn test_object_name_collision_folds_case() {
        let mut ch = channel_with(1);
        ch.append_summary(
            VersionSummary {
                id: VersionId::from_bytes([9; 16]),
                name: "Remote".into(),
                description: String::new(),
                location: Location::ObjectStore,
                created_at: 0,
            },
            0,
        );

        assert_eq!(
            check_object_name_collision(&ch, "REMOTE"),
            Err(ValidationError::DuplicateVersionName("REMOTE".into()))
        );
        // Inline versions have no shared object.
        assert_eq!(check_object_name_collision(&ch, "V0"), Ok(()));
        assert_eq!(check_object_name_collision(&ch, "other"), Ok(()));
    }

    #[test]
    fn test_manifest_error_carries_diagnostic() {
        let err = check_manifest(&YamlDocuments, b"{not yaml").unwrap_err();
        assert!(matches!(err, ValidationError::Manifest(d) if d.starts_with("document 1:")));
    }

    #[test]
    fn test_tags_reject_blank_entries() {
        assert_eq!(
            validate_tags(vec!["prod".into(), " ".into()]),
            Err(ValidationError::EmptyTag)
        );
    }

    proptest! {
        #[test]
        fn size_check_matches_limit(len in 1usize..64) {
            let ok = check_content_size(len, &LIMITS).is_ok();
            prop_assert_eq!(ok, len <= LIMITS.max_content_bytes);
        }
    }
}
