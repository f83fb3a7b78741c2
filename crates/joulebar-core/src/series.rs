//! Renderer-agnostic chart data for the short-term and long-term views.
//!
//! Builders are pure functions of their inputs: calling them twice with the
//! same snapshot yields identical series.
use std::fmt;
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::activity::ActivityHistory;
use crate::snapshot::{GenerationCategory, Snapshot, SourceId};
use crate::units::{format_energy, UnitMode};

/// Default width of one long-term bucket.
pub const DEFAULT_BUCKET_WIDTH: Duration = Duration::from_secs(15 * 60);

/// Smallest y-axis ceiling, so an idle machine still gets a usable axis.
pub const MIN_AXIS_CEILING: f64 = 10.0;

/// Colors handed to sources in the order they appear.
pub const SOURCE_PALETTE: [&str; 6] = [
    "#E76F51", "#F4A261", "#E9C46A", "#2A9D8F", "#264653", "#BD74E7",
];

pub const ACTIVITY_COLOR: &str = "#00C800";
pub const ACTIVITY_LABEL: &str = "work in progress";

fn category_color(category: GenerationCategory) -> &'static str {
    match category {
        GenerationCategory::Renewable => "#9FC131",
        GenerationCategory::NonRenewable => "#7A7A7A",
        GenerationCategory::Storage => "#5DA9E9",
        GenerationCategory::Unknown => "#CCCCCC",
    }
}

/// Which chart the dashboard shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChartMode {
    #[default]
    ShortTerm,
    LongTerm,
}

impl ChartMode {
    pub fn toggle(self) -> Self {
        match self {
            ChartMode::ShortTerm => ChartMode::LongTerm,
            ChartMode::LongTerm => ChartMode::ShortTerm,
        }
    }
}

impl fmt::Display for ChartMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChartMode::ShortTerm => write!(f, "short-term"),
            ChartMode::LongTerm => write!(f, "long-term"),
        }
    }
}

/// How a renderer should draw a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetStyle {
    Line,
    /// Filled step band (the activity overlay).
    SteppedFill,
    /// Filled proportional background band (the generation mix).
    StackedFill,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub label: String,
    pub color: String,
    pub values: Vec<f64>,
    pub style: DatasetStyle,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartSeries {
    pub labels: Vec<String>,
    pub datasets: Vec<Dataset>,
    /// Fixed y-axis ceiling chosen for this frame.
    pub y_max: f64,
}

/// Inputs shared by both builders.
#[derive(Debug, Clone, Copy)]
pub struct SeriesOptions<'a> {
    pub unit_mode: UnitMode,
    /// Since-start totals used in dataset labels; sources missing here fall
    /// back to the snapshot's raw cumulative value.
    pub totals: Option<&'a IndexMap<SourceId, f64>>,
    pub activity: Option<&'a ActivityHistory>,
    pub bucket_width: Duration,
}

impl Default for SeriesOptions<'_> {
    fn default() -> Self {
        Self {
            unit_mode: UnitMode::Joule,
            totals: None,
            activity: None,
            bucket_width: DEFAULT_BUCKET_WIDTH,
        }
    }
}

/// Scale the observed maximum up by 20% and round to the nearest ten.
///
/// Rounding keeps the axis from jittering between frames.
pub fn axis_ceiling(observed_max: f64) -> f64 {
    let ceiling = ((observed_max * 1.2) / 10.0).round() * 10.0;
    if ceiling.is_finite() {
        ceiling.max(MIN_AXIS_CEILING)
    } else {
        MIN_AXIS_CEILING
    }
}

/// Label for a bucket `buckets_back` steps before the most recent one.
///
/// Returns values like `"-0:00h"`, `"-1:45h"`.
pub fn bucket_label(buckets_back: usize, width: Duration) -> String {
    let minutes = buckets_back as u64 * width.as_secs() / 60;
    format!("-{}:{:02}h", minutes / 60, minutes % 60)
}

fn palette_color(index: usize) -> String {
    SOURCE_PALETTE[index % SOURCE_PALETTE.len()].to_string()
}

fn max_value<'a>(values: impl Iterator<Item = &'a f64>) -> f64 {
    values.copied().filter(|v| v.is_finite()).fold(0.0, f64::max)
}

fn total_for(snapshot: &Snapshot, opts: &SeriesOptions<'_>, id: &str) -> f64 {
    opts.totals
        .and_then(|t| t.get(id).copied())
        .or_else(|| snapshot.joules(id))
        .unwrap_or(0.0)
}

/// Right-align the activity history with a window of `len` samples.
fn activity_band(history: &ActivityHistory, len: usize, y_max: f64) -> Vec<f64> {
    let skip = history.len().saturating_sub(len);
    let mut values: Vec<f64> = history
        .samples()
        .skip(skip)
        .map(|running| if running { y_max } else { 0.0 })
        .collect();
    if values.len() < len {
        let mut padded = vec![0.0; len - values.len()];
        padded.append(&mut values);
        values = padded;
    }
    values
}

/// Rolling per-second power chart, one line per source.
///
/// Returns `None` when the snapshot carries no short-term window.
pub fn build_short_term(snapshot: &Snapshot, opts: &SeriesOptions<'_>) -> Option<ChartSeries> {
    if !snapshot.has_short_term() {
        return None;
    }

    let mut datasets = Vec::with_capacity(snapshot.sources.len() + 1);
    let mut len = 0;
    for (idx, (id, reading)) in snapshot.sources.iter().enumerate() {
        let values = reading.watts_over_time.clone()?;
        len = values.len();
        datasets.push(Dataset {
            label: format!(
                "{} ({})",
                reading.name,
                format_energy(total_for(snapshot, opts, id), opts.unit_mode)
            ),
            color: palette_color(idx),
            values,
            style: DatasetStyle::Line,
        });
    }

    let y_max = axis_ceiling(max_value(datasets.iter().flat_map(|d| d.values.iter())));
    let labels = (0..len).map(|i| format!("-{}s", len - i)).collect();

    if let Some(history) = opts.activity {
        datasets.push(Dataset {
            label: ACTIVITY_LABEL.to_string(),
            color: ACTIVITY_COLOR.to_string(),
            values: activity_band(history, len, y_max),
            style: DatasetStyle::SteppedFill,
        });
    }

    Some(ChartSeries {
        labels,
        datasets,
        y_max,
    })
}

/// Bucketed history chart with the generation mix as a stacked background.
///
/// Each generation band is the running sum of its category and all
/// higher-priority ones, rescaled per bucket so the top of the stack meets
/// the y-axis ceiling. Buckets with no generation data render as zero.
/// Returns `None` when the snapshot carries no long-term history.
pub fn build_long_term(snapshot: &Snapshot, opts: &SeriesOptions<'_>) -> Option<ChartSeries> {
    if !snapshot.has_long_term() {
        return None;
    }

    let mut datasets = Vec::with_capacity(snapshot.sources.len() + GenerationCategory::PRIORITY.len());
    let mut len = 0;
    for (idx, (_, reading)) in snapshot.sources.iter().enumerate() {
        let values = reading.long_term_joules.clone()?;
        len = values.len();
        let window_total: f64 = values.iter().sum();
        datasets.push(Dataset {
            label: format!(
                "{} ({})",
                reading.name,
                format_energy(window_total, opts.unit_mode)
            ),
            color: palette_color(idx),
            values,
            style: DatasetStyle::Line,
        });
    }

    let y_max = axis_ceiling(max_value(datasets.iter().flat_map(|d| d.values.iter())));
    let labels = (0..len)
        .map(|i| bucket_label(len - 1 - i, opts.bucket_width))
        .collect();

    if let Some(mix) = &snapshot.generation_mix {
        let mut running = vec![0.0; mix.len()];
        let totals: Vec<f64> = (0..mix.len()).map(|i| mix.total_at(i)).collect();
        for category in GenerationCategory::PRIORITY {
            let values = running
                .iter_mut()
                .zip(mix.series(category))
                .zip(&totals)
                .map(|((acc, value), total)| {
                    *acc += value;
                    if *total == 0.0 {
                        0.0
                    } else {
                        *acc / total * y_max
                    }
                })
                .collect();
            datasets.push(Dataset {
                label: category.label().to_string(),
                color: category_color(category).to_string(),
                values,
                style: DatasetStyle::StackedFill,
            });
        }
    }

    Some(ChartSeries {
        labels,
        datasets,
        y_max,
    })
}

/// Build the chart for `mode`, or `None` if the snapshot can't support it.
pub fn build(mode: ChartMode, snapshot: &Snapshot, opts: &SeriesOptions<'_>) -> Option<ChartSeries> {
    match mode {
        ChartMode::ShortTerm => build_short_term(snapshot, opts),
        ChartMode::LongTerm => build_long_term(snapshot, opts),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{ExecutionEvent, WorkHandle};
    use crate::snapshot::{GenerationMix, SourceReading};
    use std::time::Instant;

    fn reading(name: &str, joules: f64, window: &[f64], history: &[f64]) -> SourceReading {
        SourceReading {
            name: name.into(),
            joules,
            watts: window.last().copied(),
            watts_over_time: Some(window.to_vec()),
            long_term_joules: Some(history.to_vec()),
        }
    }

    fn snapshot() -> Snapshot {
        Snapshot::new(Instant::now())
            .with_source("all", reading("all", 900.0, &[10.0, 20.0, 41.0], &[100.0, 300.0]))
            .with_source("cpu", reading("CPU", 600.0, &[5.0, 15.0, 30.0], &[60.0, 200.0]))
    }

    #[test]
    fn axis_ceiling_rounds_to_tens() {
        assert_eq!(axis_ceiling(41.0), 50.0);
        assert_eq!(axis_ceiling(100.0), 120.0);
        assert_eq!(axis_ceiling(44.0), 50.0);
        assert_eq!(axis_ceiling(0.0), MIN_AXIS_CEILING);
        assert_eq!(axis_ceiling(f64::NAN), MIN_AXIS_CEILING);
    }

    #[test]
    fn bucket_labels_count_back() {
        let w = Duration::from_secs(15 * 60);
        assert_eq!(bucket_label(0, w), "-0:00h");
        assert_eq!(bucket_label(1, w), "-0:15h");
        assert_eq!(bucket_label(7, w), "-1:45h");
        assert_eq!(bucket_label(96, w), "-24:00h");
    }

    #[test]
    fn short_term_labels_and_datasets() {
        let series = build_short_term(&snapshot(), &SeriesOptions::default()).unwrap();
        assert_eq!(series.labels, vec!["-3s", "-2s", "-1s"]);
        assert_eq!(series.datasets.len(), 2);
        assert_eq!(series.datasets[0].values, vec![10.0, 20.0, 41.0]);
        assert_eq!(series.datasets[0].color, SOURCE_PALETTE[0]);
        assert!(series.datasets[1].label.starts_with("CPU ("));
        assert_eq!(series.y_max, 50.0);
    }

    #[test]
    fn short_term_label_uses_since_start_totals() {
        let totals: IndexMap<SourceId, f64> = [("all".to_string(), 1500.0)].into_iter().collect();
        let opts = SeriesOptions {
            totals: Some(&totals),
            ..SeriesOptions::default()
        };
        let series = build_short_term(&snapshot(), &opts).unwrap();
        assert_eq!(series.datasets[0].label, "all (1.5\u{202f}kJ)");
    }

    #[test]
    fn short_term_is_idempotent() {
        let snap = snapshot();
        let mut history = ActivityHistory::new(5);
        history.observe(&ExecutionEvent::started(WorkHandle::new("x")));
        history.tick();
        let opts = SeriesOptions {
            activity: Some(&history),
            ..SeriesOptions::default()
        };
        let first = build_short_term(&snap, &opts);
        let second = build_short_term(&snap, &opts);
        assert_eq!(first, second);
    }

    #[test]
    fn activity_band_is_right_aligned_and_scaled() {
        let mut history = ActivityHistory::new(5);
        history.tick();
        history.observe(&ExecutionEvent::started(WorkHandle::new("x")));
        history.tick();
        let opts = SeriesOptions {
            activity: Some(&history),
            ..SeriesOptions::default()
        };
        let series = build_short_term(&snapshot(), &opts).unwrap();
        let band = series.datasets.last().unwrap();
        assert_eq!(band.style, DatasetStyle::SteppedFill);
        assert_eq!(band.values, vec![0.0, 0.0, 50.0]);
    }

    #[test]
    fn short_activity_history_is_left_padded() {
        let mut history = ActivityHistory::new(1);
        history.observe(&ExecutionEvent::started(WorkHandle::new("x")));
        history.tick();
        let band = activity_band(&history, 3, 20.0);
        assert_eq!(band, vec![0.0, 0.0, 20.0]);
    }

    #[test]
    fn short_term_unavailable_without_window() {
        let snap = Snapshot::new(Instant::now()).with_source("all", SourceReading::new("all", 1.0));
        assert!(build_short_term(&snap, &SeriesOptions::default()).is_none());
        assert!(build(ChartMode::LongTerm, &snap, &SeriesOptions::default()).is_none());
    }

    #[test]
    fn long_term_stack_is_cumulative_and_rescaled() {
        let snap = snapshot().with_generation_mix(GenerationMix {
            renewable: vec![1.0, 0.0],
            non_renewable: vec![1.0, 0.0],
            storage: vec![1.0, 0.0],
            unknown: vec![1.0, 0.0],
        });
        let series = build_long_term(&snap, &SeriesOptions::default()).unwrap();
        assert_eq!(series.labels, vec!["-0:15h", "-0:00h"]);
        assert_eq!(series.y_max, 360.0);

        let bands: Vec<_> = series
            .datasets
            .iter()
            .filter(|d| d.style == DatasetStyle::StackedFill)
            .collect();
        assert_eq!(bands.len(), 4);
        assert_eq!(bands[0].label, "renewable");
        assert_eq!(bands[0].values, vec![90.0, 0.0]);
        assert_eq!(bands[1].values, vec![180.0, 0.0]);
        assert_eq!(bands[2].values, vec![270.0, 0.0]);
        assert_eq!(bands[3].values, vec![360.0, 0.0]);
    }

    #[test]
    fn long_term_without_mix_has_only_usage() {
        let series = build_long_term(&snapshot(), &SeriesOptions::default()).unwrap();
        assert_eq!(series.datasets.len(), 2);
        assert!(series.datasets[0].label.starts_with("all (400.0"));
    }

    #[test]
    fn long_term_respects_bucket_width() {
        let opts = SeriesOptions {
            bucket_width: Duration::from_secs(60 * 60),
            ..SeriesOptions::default()
        };
        let series = build_long_term(&snapshot(), &opts).unwrap();
        assert_eq!(series.labels, vec!["-1:00h", "-0:00h"]);
    }
}
