//! Summary statistics over benchmark trials.
use std::fmt::{self, Write as _};

use indexmap::IndexMap;
use joulebar_core::delta::AGGREGATE_SOURCE;
use joulebar_core::snapshot::SourceId;
use serde::Serialize;
use statrs::statistics::{Data, Median, Statistics};

use crate::harness::BenchmarkTrial;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeriesStats {
    pub median: f64,
    /// Sample standard deviation; `None` with fewer than two samples.
    pub std_dev: Option<f64>,
    pub samples: usize,
}

impl SeriesStats {
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let median = Data::new(values.to_vec()).median();
        let std_dev = (values.len() > 1).then(|| values.iter().std_dev());
        Some(Self {
            median,
            std_dev,
            samples: values.len(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchmarkReport {
    pub trials: usize,
    pub internal: IndexMap<SourceId, SeriesStats>,
    pub external: IndexMap<SourceId, SeriesStats>,
    pub wall: Option<SeriesStats>,
    /// Only trials whose endpoint reported process clocks contribute.
    pub user: Option<SeriesStats>,
    /// Median internal aggregate over median external aggregate.
    pub internal_to_external: Option<f64>,
}

fn per_source<'a>(
    maps: impl Iterator<Item = &'a IndexMap<SourceId, f64>>,
) -> IndexMap<SourceId, SeriesStats> {
    let mut values: IndexMap<SourceId, Vec<f64>> = IndexMap::new();
    for map in maps {
        for (id, v) in map {
            values.entry(id.clone()).or_default().push(*v);
        }
    }
    values
        .into_iter()
        .filter_map(|(id, v)| SeriesStats::from_values(&v).map(|s| (id, s)))
        .collect()
}

/// The external probe's aggregate: `"all"` if it reports one, else its only
/// channel.
fn external_aggregate(external: &IndexMap<SourceId, SeriesStats>) -> Option<&SeriesStats> {
    external.get(AGGREGATE_SOURCE).or_else(|| {
        if external.len() == 1 {
            external.values().next()
        } else {
            None
        }
    })
}

fn ratio(numerator: f64, denominator: f64) -> Option<f64> {
    (denominator != 0.0 && numerator.is_finite() && denominator.is_finite())
        .then(|| numerator / denominator)
}

impl BenchmarkReport {
    pub fn from_trials(trials: &[BenchmarkTrial]) -> Self {
        let internal = per_source(trials.iter().map(|t| &t.internal_delta));
        let external = per_source(trials.iter().map(|t| &t.external_delta));
        let wall_values: Vec<f64> = trials.iter().map(|t| t.time.wall).collect();
        let user_values: Vec<f64> = trials.iter().filter_map(|t| t.time.user).collect();
        let internal_to_external = match (internal.get(AGGREGATE_SOURCE), external_aggregate(&external)) {
            (Some(i), Some(e)) => ratio(i.median, e.median),
            _ => None,
        };
        Self {
            trials: trials.len(),
            internal,
            external,
            wall: SeriesStats::from_values(&wall_values),
            user: SeriesStats::from_values(&user_values),
            internal_to_external,
        }
    }

    fn rows(&self) -> Vec<(String, SeriesStats)> {
        let internal = self
            .internal
            .iter()
            .map(|(id, s)| (format!("internal {id}"), *s));
        let external = self
            .external
            .iter()
            .map(|(id, s)| (format!("external {id}"), *s));
        let wall = self.wall.map(|s| ("time wall".to_string(), s));
        let user = self.user.map(|s| ("time user".to_string(), s));
        internal.chain(external).chain(wall).chain(user).collect()
    }

    /// Relative change of each median against `baseline`, e.g. `0.05` for
    /// 5% more. Rows missing on either side are left out.
    pub fn overhead_against(&self, baseline: &BenchmarkReport) -> IndexMap<String, f64> {
        let base: IndexMap<String, SeriesStats> = baseline.rows().into_iter().collect();
        self.rows()
            .into_iter()
            .filter_map(|(name, stats)| {
                let b = base.get(&name)?;
                ratio(stats.median, b.median).map(|r| (name, r - 1.0))
            })
            .collect()
    }

    /// Plain-text table; with `baseline`, each row also shows the change.
    pub fn render(&self, baseline: Option<&BenchmarkReport>) -> String {
        let overhead = baseline.map(|b| self.overhead_against(b)).unwrap_or_default();
        let mut out = String::new();
        let _ = writeln!(out, "{} trials", self.trials);
        for (name, stats) in self.rows() {
            let _ = write!(out, "{name:24} {:10.2}", stats.median);
            match stats.std_dev {
                Some(sd) => {
                    let _ = write!(out, " stdev {sd:8.2}");
                }
                None => {
                    let _ = write!(out, " stdev {:>8}", "-");
                }
            }
            if let Some(change) = overhead.get(&name) {
                let _ = write!(out, "  ({:+.2}%)", change * 100.0);
            }
            out.push('\n');
        }
        if let Some(r) = self.internal_to_external {
            let _ = writeln!(out, "internal/external        {r:10.3}");
        }
        out
    }
}

impl fmt::Display for BenchmarkReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::TrialTiming;

    fn trial(internal: f64, external: f64, wall: f64) -> BenchmarkTrial {
        BenchmarkTrial {
            internal_delta: [("all".to_string(), internal), ("cpu".to_string(), internal / 2.0)]
                .into_iter()
                .collect(),
            external_delta: [("mcp0ch2".to_string(), external)].into_iter().collect(),
            time: TrialTiming { wall, user: None },
        }
    }

    #[test]
    fn median_and_sample_std_dev() {
        let s = SeriesStats::from_values(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert_eq!(s.median, 4.5);
        // Sample (n - 1) standard deviation.
        assert!((s.std_dev.unwrap() - 2.138_089_935).abs() < 1e-6);
        assert_eq!(s.samples, 8);
    }

    #[test]
    fn single_sample_has_no_spread() {
        let s = SeriesStats::from_values(&[3.0]).unwrap();
        assert_eq!(s.median, 3.0);
        assert_eq!(s.std_dev, None);
        assert!(SeriesStats::from_values(&[]).is_none());
    }

    #[test]
    fn report_covers_each_source_and_wall_time() {
        let trials = vec![trial(10.0, 20.0, 1.0), trial(12.0, 24.0, 3.0), trial(14.0, 28.0, 2.0)];
        let report = BenchmarkReport::from_trials(&trials);
        assert_eq!(report.trials, 3);
        assert_eq!(report.internal["all"].median, 12.0);
        assert_eq!(report.internal["cpu"].median, 6.0);
        assert_eq!(report.external["mcp0ch2"].median, 24.0);
        assert_eq!(report.wall.unwrap().median, 2.0);
        assert_eq!(report.internal_to_external, Some(0.5));
    }

    #[test]
    fn ratio_needs_an_external_aggregate() {
        let mut t = trial(10.0, 20.0, 1.0);
        t.external_delta.insert("mcp0ch1".into(), 5.0);
        let report = BenchmarkReport::from_trials(&[t]);
        assert_eq!(report.internal_to_external, None);
    }

    #[test]
    fn empty_trials_give_empty_report() {
        let report = BenchmarkReport::from_trials(&[]);
        assert!(report.internal.is_empty());
        assert!(report.wall.is_none());
        assert_eq!(report.internal_to_external, None);
    }

    #[test]
    fn overhead_against_baseline() {
        let with = BenchmarkReport::from_trials(&[trial(11.0, 22.0, 1.1)]);
        let without = BenchmarkReport::from_trials(&[trial(10.0, 20.0, 1.0)]);
        let overhead = with.overhead_against(&without);
        assert!((overhead["internal all"] - 0.1).abs() < 1e-9);
        assert!((overhead["time wall"] - 0.1).abs() < 1e-9);
        assert!(with.render(Some(&without)).contains("(+10.00%)"));
    }

    #[test]
    fn user_time_row_only_when_reported() {
        let mut with_clock = trial(10.0, 20.0, 1.0);
        with_clock.time.user = Some(0.4);
        let report = BenchmarkReport::from_trials(&[with_clock, trial(10.0, 20.0, 1.0)]);
        let user = report.user.unwrap();
        assert_eq!(user.samples, 1);
        assert_eq!(user.median, 0.4);
        assert!(report.to_string().contains("time user"));

        let plain = BenchmarkReport::from_trials(&[trial(10.0, 20.0, 1.0)]);
        assert!(plain.user.is_none());
        assert!(!plain.to_string().contains("time user"));
    }

    #[test]
    fn render_lists_rows() {
        let report = BenchmarkReport::from_trials(&[trial(10.0, 20.0, 1.0), trial(10.0, 20.0, 1.0)]);
        let text = report.to_string();
        assert!(text.starts_with("2 trials\n"));
        assert!(text.contains("internal all"));
        assert!(text.contains("external mcp0ch2"));
        assert!(text.contains("internal/external"));
    }
}
