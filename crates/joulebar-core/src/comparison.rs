use serde::{Deserialize, Serialize};

use crate::error::{DashboardError, Result};

/// A relatable activity that needs roughly `threshold_joules` of energy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonEntry {
    #[serde(rename = "joules")]
    pub threshold_joules: f64,
    pub emoji: String,
    pub text: String,
}

impl ComparisonEntry {
    pub fn new(threshold_joules: f64, emoji: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            threshold_joules,
            emoji: emoji.into(),
            text: text.into(),
        }
    }
}

/// Ordered reference table used to classify cumulative energy use.
///
/// Construction validates the invariants classification relies on: the table
/// is non-empty, starts with a zero-threshold catch-all, and thresholds are
/// finite and strictly ascending.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonTable {
    entries: Vec<ComparisonEntry>,
}

impl ComparisonTable {
    pub fn new(entries: Vec<ComparisonEntry>) -> Result<Self> {
        let Some(first) = entries.first() else {
            return Err(DashboardError::InvalidArgument(
                "comparison table must not be empty".into(),
            ));
        };
        if first.threshold_joules != 0.0 {
            return Err(DashboardError::InvalidArgument(format!(
                "first comparison entry must have a threshold of 0 J, found {}",
                first.threshold_joules
            )));
        }
        if let Some(bad) = entries.iter().find(|e| !e.threshold_joules.is_finite()) {
            return Err(DashboardError::InvalidArgument(format!(
                "comparison threshold for {:?} is not finite",
                bad.text
            )));
        }
        for pair in entries.windows(2) {
            if pair[1].threshold_joules <= pair[0].threshold_joules {
                return Err(DashboardError::InvalidArgument(format!(
                    "comparison thresholds must be strictly ascending: {} ({:?}) follows {} ({:?})",
                    pair[1].threshold_joules, pair[1].text, pair[0].threshold_joules, pair[0].text
                )));
            }
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[ComparisonEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The entry with the greatest threshold not exceeding `joules`.
    ///
    /// Negative or NaN input is rejected: cumulative energy never goes below
    /// zero, so such a value means the caller's bookkeeping is broken.
    pub fn classify(&self, joules: f64) -> Result<&ComparisonEntry> {
        if joules.is_nan() || joules < 0.0 {
            return Err(DashboardError::InvalidArgument(format!(
                "cannot classify {joules} J: cumulative energy must be non-negative"
            )));
        }
        self.entries
            .iter()
            .rev()
            .find(|e| e.threshold_joules <= joules)
            .ok_or_else(|| {
                DashboardError::InvalidState("comparison table lost its zero-threshold entry".into())
            })
    }
}
