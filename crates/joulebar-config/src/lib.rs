//! On-disk configuration for joulebar.
//!
//! Two schemas live here: the dashboard settings file and the versioned
//! comparison table. Runtime crates receive already-validated values.

pub mod comparisons;
pub mod dashboard;

pub use comparisons::{ComparisonTableFile, TableCompatibility, COMPARISON_FORMAT_VERSION};
pub use dashboard::{
    BenchmarkSection, ChartSection, ComparisonsSection, DashboardConfig, EndpointSection,
    PollSection, ProbeSection, UnitsSection, CONFIG_ENV,
};
