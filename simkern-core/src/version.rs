//! Version contract between a simulation program and the kernel it links.
//!
//! A program built against a different major or minor version is rejected.
//! A patch difference only warns, unless one side is a development build
//! (patch number above [`DEVELOPMENT_PATCH_THRESHOLD`]).

use std::fmt;

use serde::Serialize;

use crate::config::ConfigurationError;

/// Patch numbers above this value mark development builds.
pub const DEVELOPMENT_PATCH_THRESHOLD: u32 = 89;

/// Version of this kernel.
pub const VERSION: Version = Version::new(0, 1, 0);

/// A `major.minor.patch` version triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    /// Creates a version triple.
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Returns true for development builds.
    pub fn is_development(&self) -> bool {
        self.patch > DEVELOPMENT_PATCH_THRESHOLD
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Outcome of a successful version check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionCompatibility {
    /// Both sides agree on every component
    Exact,
    /// Patch levels differ between two stable builds
    PatchMismatch,
}

/// Compares the version a program was compiled against with the linked one.
///
/// # Errors
///
/// - `ConfigurationError::VersionMismatch` - Major or minor versions differ
/// - `ConfigurationError::DevelopmentVersionMismatch` - Patch levels differ and one side is a development build
pub fn check_versions(
    compiled: Version,
    linked: Version,
) -> Result<VersionCompatibility, ConfigurationError> {
    if compiled.major != linked.major || compiled.minor != linked.minor {
        return Err(ConfigurationError::VersionMismatch { compiled, linked });
    }

    if compiled.patch == linked.patch {
        return Ok(VersionCompatibility::Exact);
    }

    if compiled.is_development() || linked.is_development() {
        return Err(ConfigurationError::DevelopmentVersionMismatch { compiled, linked });
    }

    tracing::warn!(
        "Program compiled with simkern {} but linked against simkern {}. Proceeding anyway.",
        compiled,
        linked
    );
    Ok(VersionCompatibility::PatchMismatch)
}

/// Checks a program's compile-time version against this kernel.
///
/// # Errors
///
/// See [`check_versions`].
pub fn version_check(
    major: u32,
    minor: u32,
    patch: u32,
) -> Result<VersionCompatibility, ConfigurationError> {
    check_versions(Version::new(major, minor, patch), VERSION)
}

/// Returns the `(major, minor, patch)` triple of this kernel.
pub fn version_get() -> (u32, u32, u32) {
    (VERSION.major, VERSION.minor, VERSION.patch)
}

/// Renders the kernel version as `major.minor.patch`.
pub fn version_string() -> String {
    VERSION.to_string()
}
