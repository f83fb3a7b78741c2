use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use joulebar_core::comparison::{ComparisonEntry, ComparisonTable};
use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};

/// Layout version of `comparisons.toml` this build understands.
pub const COMPARISON_FORMAT_VERSION: &str = "1.0.0";

const BUILTIN: &str = include_str!("../assets/comparisons.toml");

/// A comparison table as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComparisonTableFile {
    /// Revision of the table contents.
    pub version: String,
    pub compatibility: TableCompatibility,
    pub entries: Vec<ComparisonEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableCompatibility {
    /// Semver requirement on the file layout, e.g. `"^1.0"`.
    pub format: String,
}

impl ComparisonTableFile {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let file: Self = toml::from_str(input).context("failed to parse comparison table TOML")?;
        file.validate()?;
        Ok(file)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read comparison table at {}", path.display()))?;
        Self::from_toml_str(&raw)
            .with_context(|| format!("invalid comparison table at {}", path.display()))
    }

    /// The table shipped with the binary.
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN).context("embedded comparison table is invalid")
    }

    /// `path` when given, the embedded table otherwise.
    pub fn load(path: Option<&Path>) -> Result<ComparisonTable> {
        let file = match path {
            Some(path) => Self::from_path(path)?,
            None => Self::builtin()?,
        };
        tracing::debug!(
            version = %file.version,
            entries = file.entries.len(),
            external = path.is_some(),
            "comparison table loaded"
        );
        file.into_table()
    }

    pub fn validate(&self) -> Result<()> {
        Version::parse(&self.version)
            .with_context(|| format!("table version must be valid semver: {}", self.version))?;
        self.supports_format(COMPARISON_FORMAT_VERSION)?;
        ComparisonTable::new(self.entries.clone()).context("comparison entries are invalid")?;
        Ok(())
    }

    /// Check the file's layout requirement against a reader's format version.
    pub fn supports_format(&self, reader_format: &str) -> Result<()> {
        let requirement = VersionReq::parse(&self.compatibility.format).with_context(|| {
            format!(
                "compatibility.format must be a valid semver requirement: {}",
                self.compatibility.format
            )
        })?;
        let reader = Version::parse(reader_format)
            .with_context(|| format!("reader format must be valid semver: {reader_format}"))?;

        if !requirement.matches(&reader) {
            bail!(
                "comparison table requires format {} but this reader understands {}",
                self.compatibility.format,
                reader
            );
        }
        Ok(())
    }

    pub fn into_table(self) -> Result<ComparisonTable> {
        ComparisonTable::new(self.entries).context("comparison entries are invalid")
    }
}
