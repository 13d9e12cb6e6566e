//! Recording Header
//!
//! Versioned metadata persisted at the front of a serialized recording.
//! Compatibility: same major version required, minor within one either
//! way, patch differences always compatible.

use serde::{Deserialize, Serialize};

use crate::errors::ChronosError;
use crate::timeline::now_ms;

/// Recording format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatVersion {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
}

impl FormatVersion {
    pub const CURRENT: Self = Self {
        major: 1,
        minor: 2,
        patch: 0,
    };
}

impl std::fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Outcome of a header compatibility check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompatibilityReport {
    pub compatible: bool,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

/// Metadata describing who and what produced a recording.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingHeader {
    pub format_version: FormatVersion,
    pub tool_version: String,
    pub platform_version: String,
    pub runtime_version: String,
    pub created_at_ms: i64,
    pub app_id: String,
    pub process_name: String,
    pub checksum: Option<String>,
}

impl RecordingHeader {
    /// Header for a recording created right now by this agent build.
    pub fn new(app_id: impl Into<String>, process_name: impl Into<String>) -> Self {
        Self {
            format_version: FormatVersion::CURRENT,
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            platform_version: format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
            runtime_version: format!(
                "rust-{}",
                option_env!("CARGO_PKG_RUST_VERSION").unwrap_or("stable")
            ),
            created_at_ms: now_ms(),
            app_id: app_id.into(),
            process_name: process_name.into(),
            checksum: None,
        }
    }

    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }

    /// Check whether a recording with `other`'s version can be read by a
    /// reader at this header's version.
    pub fn check_compatibility(&self, other: &FormatVersion) -> CompatibilityReport {
        let mine = self.format_version;
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        if mine.major != other.major {
            errors.push(format!(
                "major version mismatch: reader {} vs recording {}",
                mine, other
            ));
        } else {
            let minor_gap = mine.minor.abs_diff(other.minor);
            if minor_gap > 1 {
                errors.push(format!(
                    "minor version gap of {minor_gap}: reader {} vs recording {}",
                    mine, other
                ));
            } else if minor_gap == 1 {
                warnings.push(format!(
                    "minor version differs: reader {} vs recording {}",
                    mine, other
                ));
            }
        }

        CompatibilityReport {
            compatible: errors.is_empty(),
            warnings,
            errors,
        }
    }

    /// As [`check_compatibility`], surfacing failure as a typed error.
    ///
    /// [`check_compatibility`]: Self::check_compatibility
    pub fn ensure_compatible(&self, other: &FormatVersion) -> Result<(), ChronosError> {
        let report = self.check_compatibility(other);
        if report.compatible {
            Ok(())
        } else {
            Err(ChronosError::IncompatibleRecording {
                warnings: report.warnings,
                errors: report.errors,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(major: u16, minor: u16, patch: u16) -> FormatVersion {
        FormatVersion {
            major,
            minor,
            patch,
        }
    }

    fn header() -> RecordingHeader {
        RecordingHeader::new("com.example.app", "app-main")
    }

    #[test]
    fn test_same_version_compatible() {
        let report = header().check_compatibility(&FormatVersion::CURRENT);
        assert!(report.compatible);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_patch_always_compatible() {
        let report = header().check_compatibility(&version(1, 2, 99));
        assert!(report.compatible);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_adjacent_minor_warns() {
        let report = header().check_compatibility(&version(1, 1, 0));
        assert!(report.compatible);
        assert_eq!(report.warnings.len(), 1);

        let report = header().check_compatibility(&version(1, 3, 0));
        assert!(report.compatible);
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn test_distant_minor_incompatible() {
        let report = header().check_compatibility(&version(1, 4, 0));
        assert!(!report.compatible);
        assert_eq!(report.errors.len(), 1);
    }

    #[test]
    fn test_major_mismatch_incompatible() {
        let report = header().check_compatibility(&version(2, 2, 0));
        assert!(!report.compatible);
        assert!(header().ensure_compatible(&version(2, 2, 0)).is_err());
    }

    #[test]
    fn test_header_serde_round_trip() {
        let header = header().with_checksum("deadbeef");
        let json = serde_json::to_string(&header).unwrap();
        let back: RecordingHeader = serde_json::from_str(&json).unwrap();
        assert_eq!(back.format_version, header.format_version);
        assert_eq!(back.app_id, "com.example.app");
        assert_eq!(back.checksum.as_deref(), Some("deadbeef"));
    }
}
