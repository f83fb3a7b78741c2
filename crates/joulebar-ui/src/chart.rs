use ratatui::{
    layout::Rect,
    style::{Color, Style},
    symbols,
    text::Line,
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType, Paragraph},
    Frame,
};

use joulebar_core::series::{ChartMode, ChartSeries, Dataset as SeriesDataset, DatasetStyle};

/// Parse `#RRGGBB` into a terminal color.
pub fn parse_hex_color(hex: &str) -> Option<Color> {
    let digits = hex.strip_prefix('#')?;
    if digits.len() != 6 || !digits.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok();
    Some(Color::Rgb(channel(0)?, channel(2)?, channel(4)?))
}

fn points(values: &[f64]) -> Vec<(f64, f64)> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| (i as f64, if v.is_finite() { *v } else { 0.0 }))
        .collect()
}

/// Draw order: generation bands from the tallest down so each lower band
/// paints over the one above it, then the activity band, then the lines.
fn draw_order(series: &ChartSeries) -> Vec<&SeriesDataset> {
    let mut stacked: Vec<_> = series
        .datasets
        .iter()
        .filter(|d| d.style == DatasetStyle::StackedFill)
        .collect();
    stacked.reverse();
    let fills = series
        .datasets
        .iter()
        .filter(|d| d.style == DatasetStyle::SteppedFill);
    let lines = series.datasets.iter().filter(|d| d.style == DatasetStyle::Line);
    stacked.into_iter().chain(fills).chain(lines).collect()
}

/// First, middle and last labels, which is all an x-axis has room for.
fn axis_labels(labels: &[String]) -> Vec<Line<'static>> {
    match labels.len() {
        0 => Vec::new(),
        1 | 2 => labels.iter().cloned().map(Line::from).collect(),
        n => [0, n / 2, n - 1]
            .into_iter()
            .map(|i| Line::from(labels[i].clone()))
            .collect(),
    }
}

fn title(mode: ChartMode) -> &'static str {
    match mode {
        ChartMode::ShortTerm => " Power, last seconds (W) ",
        ChartMode::LongTerm => " Energy per bucket, with grid mix ",
    }
}

pub fn render_chart(f: &mut Frame, area: Rect, mode: ChartMode, series: Option<&ChartSeries>) {
    let block = Block::default().borders(Borders::ALL).title(title(mode));
    let Some(series) = series.filter(|s| !s.labels.is_empty()) else {
        let hint = Paragraph::new("No data for this chart yet")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        f.render_widget(hint, area);
        return;
    };

    let ordered = draw_order(series);
    let data: Vec<Vec<(f64, f64)>> = ordered.iter().map(|d| points(&d.values)).collect();
    let datasets: Vec<Dataset<'_>> = ordered
        .iter()
        .zip(&data)
        .map(|(d, pts)| {
            let (graph_type, marker) = match d.style {
                DatasetStyle::Line => (GraphType::Line, symbols::Marker::Braille),
                DatasetStyle::SteppedFill | DatasetStyle::StackedFill => {
                    (GraphType::Bar, symbols::Marker::Block)
                }
            };
            Dataset::default()
                .name(d.label.clone())
                .graph_type(graph_type)
                .marker(marker)
                .style(Style::default().fg(parse_hex_color(&d.color).unwrap_or(Color::White)))
                .data(pts)
        })
        .collect();

    let x_max = series.labels.len().saturating_sub(1).max(1) as f64;
    let chart = Chart::new(datasets)
        .block(block)
        .x_axis(
            Axis::default()
                .bounds([0.0, x_max])
                .labels(axis_labels(&series.labels)),
        )
        .y_axis(Axis::default().bounds([0.0, series.y_max]).labels(vec![
            Line::from("0"),
            Line::from(format!("{:.0}", series.y_max / 2.0)),
            Line::from(format!("{:.0}", series.y_max)),
        ]));
    f.render_widget(chart, area);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(label: &str, style: DatasetStyle) -> SeriesDataset {
        SeriesDataset {
            label: label.into(),
            color: "#000000".into(),
            values: vec![1.0],
            style,
        }
    }

    #[test]
    fn hex_colors_parse() {
        assert_eq!(parse_hex_color("#E76F51"), Some(Color::Rgb(0xE7, 0x6F, 0x51)));
        assert_eq!(parse_hex_color("#00c800"), Some(Color::Rgb(0, 200, 0)));
        assert_eq!(parse_hex_color("E76F51"), None);
        assert_eq!(parse_hex_color("#E76F5"), None);
        assert_eq!(parse_hex_color("#GGGGGG"), None);
    }

    #[test]
    fn stacked_bands_draw_tallest_first_and_lines_last() {
        let series = ChartSeries {
            labels: vec!["-0:00h".into()],
            datasets: vec![
                dataset("all", DatasetStyle::Line),
                dataset("renewable", DatasetStyle::StackedFill),
                dataset("unknown", DatasetStyle::StackedFill),
                dataset("work in progress", DatasetStyle::SteppedFill),
            ],
            y_max: 10.0,
        };
        let order: Vec<_> = draw_order(&series).iter().map(|d| d.label.as_str()).collect();
        assert_eq!(order, vec!["unknown", "renewable", "work in progress", "all"]);
    }

    #[test]
    fn axis_labels_pick_ends_and_middle() {
        let labels: Vec<String> = (1..=5).rev().map(|i| format!("-{i}s")).collect();
        let picked: Vec<String> = axis_labels(&labels).iter().map(|l| l.to_string()).collect();
        assert_eq!(picked, vec!["-5s", "-3s", "-1s"]);
    }

    #[test]
    fn non_finite_points_are_flattened() {
        assert_eq!(points(&[1.0, f64::NAN]), vec![(0.0, 1.0), (1.0, 0.0)]);
    }
}
