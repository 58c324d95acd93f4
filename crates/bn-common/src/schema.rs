//! Schema versioning for serialized networks, data sets and configs.

/// Current schema version for all JSON documents.
///
/// Follows semver: MAJOR.MINOR.PATCH
/// - MAJOR: Breaking changes (field removals, type changes)
/// - MINOR: Additive changes (new optional fields)
/// - PATCH: Bug fixes, documentation
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Check if a schema version is readable by this build.
pub fn is_compatible(version: &str) -> bool {
    major_of(SCHEMA_VERSION) == major_of(version)
}

fn major_of(version: &str) -> Option<u32> {
    version.split('.').next().and_then(|s| s.parse::<u32>().ok())
}
