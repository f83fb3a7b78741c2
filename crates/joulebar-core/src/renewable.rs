use crate::error::{DashboardError, Result};
use crate::snapshot::{GenerationCategory, GenerationMix};

/// Renewable share of consumed energy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenewableSummary {
    /// Energy-weighted ratio over the whole window. `None` when nothing was
    /// consumed in the window.
    pub window_ratio: Option<f64>,
    /// Renewable share of grid generation in the most recent bucket.
    pub current_ratio: f64,
}

/// Renewable fraction of generation for each bucket.
///
/// A bucket with zero total generation has no defined ratio and is reported
/// as [`DashboardError::DivisionByZero`].
pub fn bucket_ratios(mix: &GenerationMix) -> Result<Vec<f64>> {
    (0..mix.len())
        .map(|i| {
            let total = mix.total_at(i);
            if total == 0.0 {
                return Err(DashboardError::DivisionByZero(format!(
                    "total generation in bucket {i} is zero"
                )));
            }
            Ok(mix.series(GenerationCategory::Renewable)[i] / total)
        })
        .collect()
}

/// Energy-weighted renewable ratio of `usage` against the grid mix.
///
/// Buckets are weighted by how much energy was used in them, so an idle
/// bucket cannot pull the result towards its own grid mix.
pub fn ratio_over_window(usage: &[f64], mix: &GenerationMix) -> Result<RenewableSummary> {
    if usage.is_empty() {
        return Err(DashboardError::InvalidArgument(
            "renewable ratio needs at least one bucket".into(),
        ));
    }
    if usage.len() != mix.len() {
        return Err(DashboardError::InvalidArgument(format!(
            "usage covers {} buckets but generation mix covers {}",
            usage.len(),
            mix.len()
        )));
    }

    let ratios = bucket_ratios(mix)?;
    let total_used: f64 = usage.iter().sum();
    let renewable_used: f64 = usage.iter().zip(&ratios).map(|(u, r)| u * r).sum();

    let window_ratio = (total_used != 0.0).then(|| renewable_used / total_used);
    let current_ratio = ratios[ratios.len() - 1];

    Ok(RenewableSummary {
        window_ratio,
        current_ratio,
    })
}
