//! Point-in-time energy readings and the JSON payloads they are decoded from.
//!
//! The metrics endpoint has served several payload shapes over time. The
//! richest one nests per-source `usage` objects next to a `generation` mix;
//! older deployments served flat `joulesUsedBy*` totals. Both decode into the
//! same [`Snapshot`], with absent optional fields left as `None`.
use std::time::Instant;

use indexmap::IndexMap;
use serde::Deserialize;

/// Identifier of an energy source as reported by the endpoint (`"all"`, `"cpu"`, ...).
pub type SourceId = String;

/// Generation categories in stacking priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenerationCategory {
    Renewable,
    NonRenewable,
    Storage,
    Unknown,
}

impl GenerationCategory {
    /// Categories ordered from the bottom of the stack to the top.
    pub const PRIORITY: [GenerationCategory; 4] = [
        GenerationCategory::Renewable,
        GenerationCategory::NonRenewable,
        GenerationCategory::Storage,
        GenerationCategory::Unknown,
    ];

    pub fn label(self) -> &'static str {
        match self {
            GenerationCategory::Renewable => "renewable",
            GenerationCategory::NonRenewable => "non-renewable",
            GenerationCategory::Storage => "storage",
            GenerationCategory::Unknown => "unknown",
        }
    }
}

/// Per-bucket grid generation magnitudes, aligned with `long_term_joules`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GenerationMix {
    pub renewable: Vec<f64>,
    pub non_renewable: Vec<f64>,
    pub storage: Vec<f64>,
    pub unknown: Vec<f64>,
}

impl GenerationMix {
    pub fn series(&self, category: GenerationCategory) -> &[f64] {
        match category {
            GenerationCategory::Renewable => &self.renewable,
            GenerationCategory::NonRenewable => &self.non_renewable,
            GenerationCategory::Storage => &self.storage,
            GenerationCategory::Unknown => &self.unknown,
        }
    }

    /// Number of buckets covered by the mix.
    pub fn len(&self) -> usize {
        self.renewable.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum of every category at bucket `i`.
    pub fn total_at(&self, i: usize) -> f64 {
        GenerationCategory::PRIORITY
            .iter()
            .map(|&c| self.series(c).get(i).copied().unwrap_or(0.0))
            .sum()
    }

    /// Keep the first `buckets` entries of every category.
    fn truncated(mut self, buckets: usize) -> Self {
        for series in [
            &mut self.renewable,
            &mut self.non_renewable,
            &mut self.storage,
            &mut self.unknown,
        ] {
            series.truncate(buckets);
        }
        self
    }

    /// Fill categories the endpoint left out with zeros and check that every
    /// category covers the same number of buckets.
    fn normalized(mut self) -> Option<Self> {
        let len = GenerationCategory::PRIORITY
            .iter()
            .map(|&c| self.series(c).len())
            .max()
            .unwrap_or(0);
        for series in [
            &mut self.renewable,
            &mut self.non_renewable,
            &mut self.storage,
            &mut self.unknown,
        ] {
            if series.is_empty() {
                series.resize(len, 0.0);
            } else if series.len() != len {
                return None;
            }
        }
        Some(self)
    }
}

/// Everything the endpoint reported about a single source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceReading {
    /// Display name, falling back to the source id.
    pub name: String,
    /// Cumulative joules since the measuring process started.
    pub joules: f64,
    pub watts: Option<f64>,
    /// Recent per-second power samples, oldest first.
    pub watts_over_time: Option<Vec<f64>>,
    /// Joules per long-term bucket, oldest first.
    pub long_term_joules: Option<Vec<f64>>,
}

impl SourceReading {
    pub fn new(name: impl Into<String>, joules: f64) -> Self {
        Self {
            name: name.into(),
            joules,
            watts: None,
            watts_over_time: None,
            long_term_joules: None,
        }
    }
}

/// Cumulative clock readings of the measuring process, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ProcessTime {
    pub wall: f64,
    pub user: f64,
}

/// A single polled reading of cumulative and instantaneous metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// When the reading was received.
    pub timestamp: Instant,
    /// Readings keyed by source id, in the order the endpoint listed them.
    pub sources: IndexMap<SourceId, SourceReading>,
    pub generation_mix: Option<GenerationMix>,
    /// Endpoint-reported process clocks, when the endpoint serves them.
    pub process_time: Option<ProcessTime>,
}

impl Snapshot {
    pub fn new(timestamp: Instant) -> Self {
        Self {
            timestamp,
            sources: IndexMap::new(),
            generation_mix: None,
            process_time: None,
        }
    }

    pub fn with_process_time(mut self, time: ProcessTime) -> Self {
        self.process_time = Some(time);
        self
    }

    /// Builder used heavily by tests and by the flat legacy schema.
    pub fn with_source(mut self, id: &str, reading: SourceReading) -> Self {
        self.sources.insert(id.to_string(), reading);
        self
    }

    pub fn with_generation_mix(mut self, mix: GenerationMix) -> Self {
        self.generation_mix = Some(mix);
        self
    }

    pub fn joules(&self, source: &str) -> Option<f64> {
        self.sources.get(source).map(|r| r.joules)
    }

    pub fn watts(&self, source: &str) -> Option<f64> {
        self.sources.get(source).and_then(|r| r.watts)
    }

    /// Cumulative joules for every source.
    pub fn per_source_joules(&self) -> IndexMap<SourceId, f64> {
        self.sources
            .iter()
            .map(|(id, r)| (id.clone(), r.joules))
            .collect()
    }

    /// True when every source carries a short-term power window.
    pub fn has_short_term(&self) -> bool {
        !self.sources.is_empty() && self.sources.values().all(|r| r.watts_over_time.is_some())
    }

    /// True when every source carries bucketed long-term totals.
    pub fn has_long_term(&self) -> bool {
        !self.sources.is_empty() && self.sources.values().all(|r| r.long_term_joules.is_some())
    }

    /// Drop optional series whose lengths disagree across sources, so that
    /// chart builders can rely on aligned data.
    fn align(mut self) -> Self {
        if !lengths_agree(self.sources.values().map(|r| r.watts_over_time.as_ref())) {
            tracing::warn!("wattsOverTime lengths differ between sources; short-term window dropped");
            for r in self.sources.values_mut() {
                r.watts_over_time = None;
            }
        }

        if !lengths_agree(self.sources.values().map(|r| r.long_term_joules.as_ref())) {
            tracing::warn!("longTermJoules lengths differ between sources; long-term history dropped");
            for r in self.sources.values_mut() {
                r.long_term_joules = None;
            }
        }

        if let Some(mix) = self.generation_mix.take() {
            let buckets = self
                .sources
                .values()
                .find_map(|r| r.long_term_joules.as_ref().map(Vec::len));
            match (mix.normalized(), buckets) {
                (Some(mix), None) => self.generation_mix = Some(mix),
                (Some(mix), Some(n)) if mix.len() >= n => {
                    self.generation_mix = Some(mix.truncated(n));
                }
                _ => tracing::warn!("generation mix is not aligned with long-term buckets; dropped"),
            }
        }

        self
    }
}

fn lengths_agree<'a>(series: impl Iterator<Item = Option<&'a Vec<f64>>>) -> bool {
    let mut expected = None;
    for s in series.flatten() {
        match expected {
            None => expected = Some(s.len()),
            Some(n) if n != s.len() => return false,
            Some(_) => {}
        }
    }
    true
}

/// Any payload shape the metrics endpoint (or the benchmark probe) has served.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum MetricsPayload {
    Nested(NestedPayload),
    Flat(FlatPayload),
}

#[derive(Debug, Deserialize)]
pub struct NestedPayload {
    pub usage: IndexMap<SourceId, UsagePayload>,
    #[serde(default)]
    pub generation: Option<GenerationPayload>,
    #[serde(default)]
    pub time: Option<ProcessTime>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsagePayload {
    #[serde(default)]
    pub name: Option<String>,
    pub joules: f64,
    #[serde(default)]
    pub watts: Option<f64>,
    #[serde(default)]
    pub watts_over_time: Option<Vec<f64>>,
    #[serde(default)]
    pub long_term_joules: Option<Vec<f64>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationPayload {
    #[serde(default)]
    pub renewable: Vec<f64>,
    #[serde(default)]
    pub non_renewable: Vec<f64>,
    #[serde(default)]
    pub storage: Vec<f64>,
    #[serde(default)]
    pub unknown: Vec<f64>,
}

/// Flat totals served by the earliest endpoint generation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatPayload {
    pub joules_used_by_all: f64,
    #[serde(default)]
    pub joules_used_by_cpu: Option<f64>,
    #[serde(default)]
    pub joules_used_by_ram: Option<f64>,
    #[serde(default)]
    pub joules_used_by_gpu: Option<f64>,
}

impl MetricsPayload {
    /// Decode a JSON body.
    pub fn from_slice(body: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(body)
    }

    /// Stamp the payload with its receive time.
    pub fn into_snapshot(self, timestamp: Instant) -> Snapshot {
        match self {
            MetricsPayload::Nested(payload) => {
                let mut snapshot = Snapshot::new(timestamp);
                for (id, usage) in payload.usage {
                    let reading = SourceReading {
                        name: usage.name.unwrap_or_else(|| id.clone()),
                        joules: usage.joules,
                        watts: usage.watts,
                        watts_over_time: usage.watts_over_time,
                        long_term_joules: usage.long_term_joules,
                    };
                    snapshot.sources.insert(id, reading);
                }
                snapshot.generation_mix = payload.generation.map(|g| GenerationMix {
                    renewable: g.renewable,
                    non_renewable: g.non_renewable,
                    storage: g.storage,
                    unknown: g.unknown,
                });
                snapshot.process_time = payload.time;
                snapshot.align()
            }
            MetricsPayload::Flat(flat) => {
                let mut snapshot = Snapshot::new(timestamp)
                    .with_source("all", SourceReading::new("all", flat.joules_used_by_all));
                for (id, name, joules) in [
                    ("cpu", "CPU", flat.joules_used_by_cpu),
                    ("ram", "RAM", flat.joules_used_by_ram),
                    ("gpu", "GPU", flat.joules_used_by_gpu),
                ] {
                    if let Some(joules) = joules {
                        snapshot = snapshot.with_source(id, SourceReading::new(name, joules));
                    }
                }
                snapshot
            }
        }
    }
}
