use ratatui::layout::{Constraint, Layout, Rect};

#[derive(Debug, Clone, Copy)]
pub struct DashboardRects {
    pub top: Rect,
    pub summary: Rect,
    pub chart: Rect,
    pub logs: Rect,
    pub footer: Rect,
}

/// Split the screen into the dashboard's horizontal bands.
///
/// The log strip shrinks first when the terminal is short; the chart keeps
/// at least a few rows.
pub fn dashboard_layout(area: Rect, log_lines: u16) -> DashboardRects {
    let fixed = 1 + 5 + 1;
    let spare = area.height.saturating_sub(fixed + 6);
    let logs_height = if log_lines == 0 {
        0
    } else {
        (log_lines + 2).min(spare)
    };

    let rows = Layout::vertical([
        Constraint::Length(1),           // title bar
        Constraint::Length(5),           // summary
        Constraint::Min(3),              // chart
        Constraint::Length(logs_height), // log strip
        Constraint::Length(1),           // key hints
    ])
    .split(area);

    DashboardRects {
        top: rows[0],
        summary: rows[1],
        chart: rows[2],
        logs: rows[3],
        footer: rows[4],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bands_cover_the_screen() {
        let area = Rect::new(0, 0, 100, 40);
        let r = dashboard_layout(area, 4);
        assert_eq!(r.top.height, 1);
        assert_eq!(r.summary.height, 5);
        assert_eq!(r.logs.height, 6);
        assert_eq!(r.footer.y, 39);
        assert_eq!(
            r.top.height + r.summary.height + r.chart.height + r.logs.height + r.footer.height,
            40
        );
    }

    #[test]
    fn short_terminal_drops_log_strip_first() {
        let r = dashboard_layout(Rect::new(0, 0, 80, 12), 4);
        assert_eq!(r.logs.height, 0);
        assert!(r.chart.height >= 3);
    }

    #[test]
    fn no_log_lines_means_no_strip() {
        let r = dashboard_layout(Rect::new(0, 0, 80, 40), 0);
        assert_eq!(r.logs.height, 0);
    }
}
