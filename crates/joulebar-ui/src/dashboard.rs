use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph},
    Frame,
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use joulebar_core::dashboard::{DisplayText, PENDING};
use joulebar_core::logging::LogLine;
use joulebar_core::series::{ChartMode, ChartSeries};
use joulebar_core::units::UnitMode;

use crate::chart::render_chart;
use crate::layout::dashboard_layout;

/// Everything one frame needs.
pub struct DashboardView<'a> {
    pub endpoint: &'a str,
    pub text: Option<&'a DisplayText>,
    pub unit_mode: UnitMode,
    pub chart_mode: ChartMode,
    pub chart: Option<&'a ChartSeries>,
    /// Last poll result in a few words ("ok", "fetch failed", ...).
    pub status: &'a str,
    pub paused: bool,
    pub benchmark: Option<&'a str>,
    pub logs: &'a [LogLine],
}

/// Truncate `text` to `width` display columns, adding an ellipsis if cut.
pub fn fit_width(text: &str, width: usize) -> String {
    if text.width() <= width {
        return text.to_string();
    }
    if width == 0 {
        return String::new();
    }
    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let w = ch.width().unwrap_or(0);
        if used + w + 1 > width {
            break;
        }
        out.push(ch);
        used += w;
    }
    out.push('…');
    out
}

fn level_color(line: &LogLine) -> Color {
    match line.level.as_str() {
        "ERROR" => Color::Red,
        "WARN" => Color::Yellow,
        "INFO" => Color::Green,
        _ => Color::DarkGray,
    }
}

fn render_top(f: &mut Frame, area: Rect, view: &DashboardView<'_>) {
    let mut spans = vec![
        Span::styled(
            " JOULEBAR ",
            Style::default()
                .fg(Color::Black)
                .bg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!(" {} | {} ", view.endpoint, view.status)),
    ];
    if view.paused {
        spans.push(Span::styled(" PAUSED ", Style::default().fg(Color::Black).bg(Color::Gray)));
    }
    if let Some(bench) = view.benchmark {
        spans.push(Span::styled(
            format!(" bench: {bench} "),
            Style::default().fg(Color::Cyan),
        ));
    }
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_summary(f: &mut Frame, area: Rect, view: &DashboardView<'_>) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" Since start ({}) ", view.unit_mode));
    let inner = block.inner(area);
    f.render_widget(block, area);
    if inner.width == 0 || inner.height == 0 {
        return;
    }

    let cols = Layout::horizontal([Constraint::Percentage(40), Constraint::Percentage(60)]).split(inner);

    let (now, total, renewable_window, renewable_now, emoji, comparison) = match view.text {
        Some(t) => (
            t.now.as_str(),
            t.total.as_str(),
            t.renewable_window.as_str(),
            t.renewable_now.as_str(),
            t.emoji.as_str(),
            t.comparison.as_str(),
        ),
        None => (PENDING, PENDING, PENDING, PENDING, "", "waiting for the first snapshot"),
    };

    let bold = Style::default().add_modifier(Modifier::BOLD);
    let left = Text::from(vec![
        Line::from(vec![Span::raw("Now    "), Span::styled(now.to_string(), bold)]),
        Line::from(vec![Span::raw("Total  "), Span::styled(total.to_string(), bold)]),
        Line::from(vec![
            Span::raw("Green  "),
            Span::styled(renewable_window.to_string(), Style::default().fg(Color::Green)),
            Span::raw(format!(" (grid now {renewable_now})")),
        ]),
    ]);
    f.render_widget(Paragraph::new(left), cols[0]);

    let width = cols[1].width as usize;
    let right = Text::from(vec![
        Line::from("Enough energy to"),
        Line::from(fit_width(&format!("{emoji} {comparison}"), width)),
    ]);
    f.render_widget(Paragraph::new(right), cols[1]);
}

fn render_logs(f: &mut Frame, area: Rect, logs: &[LogLine]) {
    if area.height == 0 {
        return;
    }
    let block = Block::default().borders(Borders::TOP).title(" Log ");
    let inner = block.inner(area);
    f.render_widget(block, area);

    let visible = inner.height as usize;
    let skip = logs.len().saturating_sub(visible);
    let width = inner.width as usize;
    let lines: Vec<Line> = logs
        .iter()
        .skip(skip)
        .map(|l| {
            Line::from(vec![
                Span::styled(format!("{:>5} ", l.level.as_str()), Style::default().fg(level_color(l))),
                Span::raw(fit_width(&l.text, width.saturating_sub(6))),
            ])
        })
        .collect();
    f.render_widget(Paragraph::new(lines), inner);
}

fn render_footer(f: &mut Frame, area: Rect, view: &DashboardView<'_>) {
    let hints = format!(
        " u units [{}]  m chart [{}]  r reset  p pause  b bench  q quit",
        view.unit_mode, view.chart_mode
    );
    f.render_widget(
        Paragraph::new(Line::from(hints)).style(Style::default().fg(Color::DarkGray)),
        area,
    );
}

/// Draw the whole dashboard into `area`.
pub fn render_dashboard(f: &mut Frame, area: Rect, view: DashboardView<'_>) {
    let rects = dashboard_layout(area, view.logs.len().min(6) as u16);
    render_top(f, rects.top, &view);
    render_summary(f, rects.summary, &view);
    render_chart(f, rects.chart, view.chart_mode, view.chart);
    render_logs(f, rects.logs, view.logs);
    render_footer(f, rects.footer, &view);
}
