use crate::error::{DashboardError, Result};
use crate::series::{ChartMode, ChartSeries};
use crate::units::UnitMode;

/// Identity of a chart instance on the rendering surface.
pub type ChartId = u64;

/// A chart that currently exists on the rendering surface.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundChart {
    pub id: ChartId,
    pub mode: ChartMode,
    /// Latest data pushed into the chart, replaced in place on update.
    pub data: Option<ChartSeries>,
}

/// `NoChart` until the first frame, then bound to exactly one mode.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ChartBinding {
    #[default]
    NoChart,
    ChartBound(BoundChart),
}

/// What a [`ChartBinding::rebind`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rebind {
    /// A new chart instance was created (first frame or mode change).
    Created(ChartId),
    /// The existing instance already had the requested mode.
    Kept(ChartId),
}

impl ChartBinding {
    /// Make sure a chart for `mode` exists, recreating it only when the mode
    /// differs from the bound one.
    pub fn rebind(&mut self, mode: ChartMode, next_id: &mut ChartId) -> Rebind {
        if let ChartBinding::ChartBound(chart) = self {
            if chart.mode == mode {
                return Rebind::Kept(chart.id);
            }
        }
        let id = *next_id;
        *next_id += 1;
        *self = ChartBinding::ChartBound(BoundChart {
            id,
            mode,
            data: None,
        });
        Rebind::Created(id)
    }

    /// Replace the bound chart's data in place.
    pub fn update(&mut self, series: ChartSeries) -> Result<()> {
        match self {
            ChartBinding::NoChart => Err(DashboardError::InvalidState(
                "cannot update chart data before a chart is bound".into(),
            )),
            ChartBinding::ChartBound(chart) => {
                chart.data = Some(series);
                Ok(())
            }
        }
    }

    pub fn bound(&self) -> Option<&BoundChart> {
        match self {
            ChartBinding::NoChart => None,
            ChartBinding::ChartBound(chart) => Some(chart),
        }
    }

    /// Tear down the chart, e.g. when the data source went away.
    pub fn unbind(&mut self) {
        *self = ChartBinding::NoChart;
    }
}

/// Per-dashboard display state toggled by the user.
///
/// One session per dashboard instance; nothing here is global.
#[derive(Debug, Clone, Default)]
pub struct DisplaySession {
    pub unit_mode: UnitMode,
    pub chart_mode: ChartMode,
    chart: ChartBinding,
    next_chart_id: ChartId,
}

impl DisplaySession {
    pub fn new(unit_mode: UnitMode, chart_mode: ChartMode) -> Self {
        Self {
            unit_mode,
            chart_mode,
            ..Self::default()
        }
    }

    pub fn toggle_units(&mut self) -> UnitMode {
        self.unit_mode = self.unit_mode.toggle();
        self.unit_mode
    }

    pub fn toggle_chart_mode(&mut self) -> ChartMode {
        self.chart_mode = self.chart_mode.toggle();
        self.chart_mode
    }

    /// Hand a freshly built series to the chart for the current mode.
    pub fn present(&mut self, series: ChartSeries) -> Rebind {
        let rebind = self.chart.rebind(self.chart_mode, &mut self.next_chart_id);
        if let Err(err) = self.chart.update(series) {
            // rebind always leaves a bound chart behind
            tracing::error!(error = %err, "chart update after rebind failed");
        }
        rebind
    }

    pub fn chart(&self) -> &ChartBinding {
        &self.chart
    }

    pub fn clear_chart(&mut self) {
        self.chart.unbind();
    }
}
