use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use joulebar_core::activity::DEFAULT_ACTIVITY_SAMPLES;
use joulebar_core::series::ChartMode;
use joulebar_core::units::UnitMode;
use reqwest::Url;
use serde::{Deserialize, Serialize};

/// Environment variable naming a config file.
pub const CONFIG_ENV: &str = "JOULEBAR_CONFIG";

/// Settings file loaded from `config.toml`.
///
/// Every section is optional; an empty file yields the defaults.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DashboardConfig {
    pub endpoint: EndpointSection,
    pub probe: ProbeSection,
    pub poll: PollSection,
    pub chart: ChartSection,
    pub units: UnitsSection,
    pub benchmark: BenchmarkSection,
    pub comparisons: ComparisonsSection,
}

/// The server exposing `api/energy-metrics/v1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EndpointSection {
    pub base_url: String,
    pub timeout_ms: u64,
}

impl Default for EndpointSection {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8888/".into(),
            timeout_ms: 2000,
        }
    }
}

/// The external measurement probe used by benchmarks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProbeSection {
    pub port: u16,
}

impl Default for ProbeSection {
    fn default() -> Self {
        Self { port: 35396 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PollSection {
    pub interval_ms: u64,
}

impl Default for PollSection {
    fn default() -> Self {
        Self { interval_ms: 1000 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChartSection {
    pub bucket_minutes: u64,
    pub activity_samples: usize,
    pub default_mode: ChartMode,
}

impl Default for ChartSection {
    fn default() -> Self {
        Self {
            bucket_minutes: 15,
            activity_samples: DEFAULT_ACTIVITY_SAMPLES,
            default_mode: ChartMode::ShortTerm,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UnitsSection {
    pub default: UnitMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BenchmarkSection {
    pub trials: usize,
}

impl Default for BenchmarkSection {
    fn default() -> Self {
        Self { trials: 10 }
    }
}

/// Optional replacement for the embedded comparison table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ComparisonsSection {
    pub path: Option<PathBuf>,
}

impl DashboardConfig {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: Self = toml::from_str(input).context("failed to parse config TOML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        let mut config = Self::from_toml_str(&raw)
            .with_context(|| format!("invalid config at {}", path.display()))?;
        config.resolve_relative_paths(path);
        Ok(config)
    }

    /// Load from `explicit`, else `JOULEBAR_CONFIG`, else the user config
    /// directory. A missing default file is not an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_path(path);
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Self::from_path(Path::new(&path));
        }
        match default_path() {
            Some(path) if path.is_file() => Self::from_path(&path),
            _ => {
                tracing::debug!("no config file found; using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.endpoint.base_url.trim().is_empty() {
            bail!("endpoint.base_url must not be empty");
        }
        self.base_url()?;
        validate_positive("endpoint.timeout_ms", self.endpoint.timeout_ms)?;
        validate_positive("poll.interval_ms", self.poll.interval_ms)?;
        validate_positive("chart.bucket_minutes", self.chart.bucket_minutes)?;
        if self.chart.bucket_minutes.checked_mul(60).is_none() {
            bail!(
                "chart.bucket_minutes is too large: {}",
                self.chart.bucket_minutes
            );
        }
        if self.probe.port == 0 {
            bail!("probe.port must be a fixed port");
        }
        if self.benchmark.trials == 0 {
            bail!("benchmark.trials must be at least 1");
        }
        if let Some(path) = &self.comparisons.path {
            if path.as_os_str().is_empty() {
                bail!("comparisons.path must not be empty when set");
            }
        }
        Ok(())
    }

    /// Base URL with a trailing slash, so relative joins keep the last
    /// path segment.
    pub fn base_url(&self) -> Result<Url> {
        let raw = self.endpoint.base_url.trim();
        let mut url = Url::parse(raw)
            .with_context(|| format!("endpoint.base_url is not a valid URL: {raw}"))?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.endpoint.timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll.interval_ms)
    }

    pub fn bucket_width(&self) -> Duration {
        Duration::from_secs(self.chart.bucket_minutes.saturating_mul(60))
    }

    fn resolve_relative_paths(&mut self, config_path: &Path) {
        let Some(base) = config_path.parent() else {
            return;
        };
        if let Some(path) = self.comparisons.path.as_mut() {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
}

/// `<config_dir>/joulebar/config.toml`.
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("joulebar").join("config.toml"))
}

fn validate_positive(field: &str, value: u64) -> Result<()> {
    if value == 0 {
        bail!("{field} must be greater than zero");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
[endpoint]
base_url = "http://127.0.0.1:9999/lab"
timeout_ms = 500

[probe]
port = 4000

[poll]
interval_ms = 250

[chart]
bucket_minutes = 30
activity_samples = 60
default_mode = "long-term"

[units]
default = "watt-hour"

[benchmark]
trials = 3

[comparisons]
path = "tables/custom.toml"
"#;

    #[test]
    fn empty_file_gives_defaults() {
        let config = DashboardConfig::from_toml_str("").unwrap();
        assert_eq!(config, DashboardConfig::default());
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.bucket_width(), Duration::from_secs(900));
        assert_eq!(config.probe.port, 35396);
        assert_eq!(config.benchmark.trials, 10);
    }

    #[test]
    fn parses_every_section() {
        let config = DashboardConfig::from_toml_str(FULL).unwrap();
        assert_eq!(config.endpoint.timeout_ms, 500);
        assert_eq!(config.chart.default_mode, ChartMode::LongTerm);
        assert_eq!(config.units.default, UnitMode::WattHour);
        assert_eq!(config.chart.activity_samples, 60);
        assert_eq!(config.bucket_width(), Duration::from_secs(1800));
    }

    #[test]
    fn base_url_gains_trailing_slash() {
        let config = DashboardConfig::from_toml_str(FULL).unwrap();
        let url = config.base_url().unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:9999/lab/");
        assert_eq!(
            url.join("api/energy-metrics/v1").unwrap().as_str(),
            "http://127.0.0.1:9999/lab/api/energy-metrics/v1"
        );
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config = DashboardConfig::from_toml_str("[chart]\nbucket_minutes = 5\n").unwrap();
        assert_eq!(config.chart.bucket_minutes, 5);
        assert_eq!(config.chart.activity_samples, DEFAULT_ACTIVITY_SAMPLES);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let err = DashboardConfig::from_toml_str("[poll]\ninterval_ms = 0\n")
            .unwrap_err()
            .to_string();
        assert!(err.contains("poll.interval_ms must be greater than zero"));
    }

    #[test]
    fn oversized_bucket_is_rejected() {
        let toml = format!("[chart]\nbucket_minutes = {}\n", u64::MAX / 2);
        let err = DashboardConfig::from_toml_str(&toml).unwrap_err().to_string();
        assert!(err.contains("chart.bucket_minutes is too large"));
    }

    #[test]
    fn zero_trials_are_rejected() {
        let err = DashboardConfig::from_toml_str("[benchmark]\ntrials = 0\n")
            .unwrap_err()
            .to_string();
        assert!(err.contains("benchmark.trials"));
    }

    #[test]
    fn invalid_url_is_rejected() {
        let err = DashboardConfig::from_toml_str("[endpoint]\nbase_url = \"not a url\"\n")
            .unwrap_err()
            .to_string();
        assert!(err.contains("endpoint.base_url is not a valid URL"));
    }

    #[test]
    fn unknown_field_is_rejected() {
        let err = DashboardConfig::from_toml_str("[poll]\ninterval = 5\n")
            .unwrap_err()
            .to_string();
        assert!(err.contains("failed to parse config TOML"));
    }

    #[test]
    fn comparisons_path_resolves_against_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, FULL).unwrap();
        let config = DashboardConfig::from_path(&path).unwrap();
        assert_eq!(
            config.comparisons.path.unwrap(),
            dir.path().join("tables/custom.toml")
        );
    }

    #[test]
    fn explicit_path_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("joulebar.toml");
        fs::write(&path, "[probe]\nport = 1234\n").unwrap();
        let config = DashboardConfig::load(Some(&path)).unwrap();
        assert_eq!(config.probe.port, 1234);
    }
}
