//! Foreign module versions and the API-generation gate.
//!
//! TensorFlow reorganised its logging and version attributes in 1.14. Code
//! that needs to pick between the two call sequences asks
//! [`is_modern_api`]; code that needs the version string itself asks
//! [`extract_version_str`], which tries each known location in order.

use std::fmt;
use std::str::FromStr;

use crate::error::{BindError, Result};
use crate::interop::{get_path, ForeignObject};

/// A `major.minor` version. Patch levels and pre-release suffixes are not
/// significant for any decision this crate makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
}

impl Version {
    /// First release with `get_logger()` and `version.VERSION`.
    pub const MODERN_API: Version = Version::new(1, 14);

    pub const fn new(major: u32, minor: u32) -> Self {
        Version { major, minor }
    }

    /// Parse a dotted version string.
    ///
    /// At least two components are required. Only the leading digits of each
    /// component count, so `"2.4.0rc1"` and `"2.5-dev"` parse as 2.4 and 2.5.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let mut parts = s.split('.');
        let major = parts.next().and_then(leading_number);
        let minor = parts.next().and_then(leading_number);
        match (major, minor) {
            (Some(major), Some(minor)) => Ok(Version { major, minor }),
            _ => Err(BindError::InvalidVersion(format!(
                "expected at least major.minor, got {s:?}"
            ))),
        }
    }
}

fn leading_number(component: &str) -> Option<u32> {
    let end = component
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(component.len());
    component[..end].parse().ok()
}

impl FromStr for Version {
    type Err = BindError;

    fn from_str(s: &str) -> Result<Self> {
        Version::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl serde::Serialize for Version {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Whether `version_str` belongs to the 1.14+ API generation.
pub fn is_modern_api(version_str: &str) -> Result<bool> {
    Ok(Version::parse(version_str)? >= Version::MODERN_API)
}

/// Attribute paths holding the version string, newest API first.
pub const VERSION_LOCATIONS: &[&str] = &["version.VERSION", "VERSION"];

/// Read the version string from the first location that yields one.
pub fn extract_version_str(module: &dyn ForeignObject) -> Result<String> {
    VERSION_LOCATIONS
        .iter()
        .find_map(|path| {
            get_path(module, path)
                .ok()
                .and_then(|v| v.as_str().ok().map(str::to_string))
        })
        .ok_or_else(|| {
            BindError::InvalidVersion(format!(
                "no version string found at any of: {}",
                VERSION_LOCATIONS.join(", ")
            ))
        })
}
