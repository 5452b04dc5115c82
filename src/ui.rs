use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType, Paragraph},
    Frame,
};
use crate::app::{App, AppState};
use crate::simulation::SimulationRecord;

/// Cloud points `(volatility, return)` split into low, middle and high Sharpe terciles.
pub fn sharpe_terciles(record: &SimulationRecord) -> [Vec<(f64, f64)>; 3] {
    let mut sorted = record.sharpes();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mut buckets: [Vec<(f64, f64)>; 3] = Default::default();
    if sorted.is_empty() {
        return buckets;
    }
    let lower = sorted[sorted.len() / 3];
    let upper = sorted[2 * sorted.len() / 3];

    for s in &record.stats {
        let point = (s.annual_volatility, s.annual_return);
        let bucket = if s.sharpe < lower {
            0
        } else if s.sharpe < upper {
            1
        } else {
            2
        };
        buckets[bucket].push(point);
    }
    buckets
}

fn scatter<'a>(name: &'a str, color: Color, marker: symbols::Marker, data: &'a [(f64, f64)]) -> Dataset<'a> {
    Dataset::default()
        .name(name)
        .marker(marker)
        .graph_type(GraphType::Scatter)
        .style(Style::default().fg(color))
        .data(data)
}

/// Padded `[min, max]` over all values; falls back to `[0, 1]` when empty.
fn padded_bounds(values: impl Iterator<Item = f64>) -> [f64; 2] {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !lo.is_finite() || !hi.is_finite() {
        return [0.0, 1.0];
    }
    let pad = ((hi - lo) * 0.05).max(1e-3);
    [lo - pad, hi + pad]
}

pub fn render(f: &mut Frame, app: &App) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(f.area());

    render_header(f, app, layout[0]);
    render_dashboard(f, app, layout[1]);
    render_footer(f, layout[2]);
}

fn render_header(f: &mut Frame, app: &App, area: Rect) {
    let report = &app.report;
    let mut spans = vec![
        Span::styled(" Frontier TUI ", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::raw(" | "),
        Span::styled(
            format!("{} assets", report.symbols.len()),
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        ),
        Span::raw(" | "),
        Span::styled(
            format!("{} portfolios", report.simulation.len()),
            Style::default().fg(Color::Yellow),
        ),
    ];

    if let (Some(first), Some(last)) = (report.first_date, report.last_date) {
        spans.push(Span::raw(" | "));
        spans.push(Span::styled(
            format!("{} .. {}", first, last),
            Style::default().fg(Color::Gray),
        ));
    }

    let header = Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL));
    f.render_widget(header, area);
}

fn render_footer(f: &mut Frame, area: Rect) {
    let footer = Paragraph::new(Line::from(vec![
        Span::styled(" Controls: ", Style::default().fg(Color::Gray)),
        Span::styled("Tab: switch portfolio | q/Esc: quit", Style::default().fg(Color::White)),
    ]))
    .block(Block::default().borders(Borders::ALL));

    f.render_widget(footer, area);
}

fn render_dashboard(f: &mut Frame, app: &App, area: Rect) {
    let report = &app.report;
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(72), Constraint::Percentage(28)])
        .split(area);

    let [low, mid, high] = sharpe_terciles(&report.simulation);
    let max_sharpe = [(report.max_sharpe.stats.annual_volatility, report.max_sharpe.stats.annual_return)];
    let min_vol = [(
        report.min_volatility.stats.annual_volatility,
        report.min_volatility.stats.annual_return,
    )];

    let datasets = vec![
        scatter("Low Sharpe", Color::Red, symbols::Marker::Braille, &low),
        scatter("Mid Sharpe", Color::Yellow, symbols::Marker::Braille, &mid),
        scatter("High Sharpe", Color::Green, symbols::Marker::Braille, &high),
        scatter("Max Sharpe", Color::Magenta, symbols::Marker::Block, &max_sharpe),
        scatter("Min Volatility", Color::Cyan, symbols::Marker::Block, &min_vol),
    ];

    let optimal = [report.max_sharpe.stats, report.min_volatility.stats];
    let all_stats = || report.simulation.stats.iter().chain(optimal.iter());
    let x_bounds = padded_bounds(all_stats().map(|s| s.annual_volatility));
    let y_bounds = padded_bounds(all_stats().map(|s| s.annual_return));

    let axis_labels = |[lo, hi]: [f64; 2]| {
        vec![
            Span::styled(format!("{:.1}%", lo * 100.0), Style::default().fg(Color::Gray)),
            Span::styled(format!("{:.1}%", (lo + hi) * 50.0), Style::default().fg(Color::Gray)),
            Span::styled(format!("{:.1}%", hi * 100.0), Style::default().fg(Color::Gray)),
        ]
    };

    let chart = Chart::new(datasets)
        .block(
            Block::default()
                .title(Span::styled(
                    " Efficient Frontier (Monte Carlo) ",
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                ))
                .borders(Borders::ALL),
        )
        .x_axis(
            Axis::default()
                .title("Volatility")
                .style(Style::default().fg(Color::Gray))
                .bounds(x_bounds)
                .labels(axis_labels(x_bounds)),
        )
        .y_axis(
            Axis::default()
                .title("Return")
                .style(Style::default().fg(Color::Gray))
                .bounds(y_bounds)
                .labels(axis_labels(y_bounds)),
        );

    f.render_widget(chart, chunks[0]);
    render_details(f, app, chunks[1]);
}

fn render_details(f: &mut Frame, app: &App, area: Rect) {
    let portfolio = app.selected();
    let accent = match app.state {
        AppState::MaxSharpe => Color::Magenta,
        AppState::MinVolatility => Color::Cyan,
    };

    let mut lines = vec![
        Line::from(Span::styled(
            portfolio.name.clone(),
            Style::default().fg(accent).add_modifier(Modifier::BOLD),
        )),
        Line::from(format!("Return:     {:+.2}%", portfolio.stats.annual_return * 100.0)),
        Line::from(format!("Volatility: {:.2}%", portfolio.stats.annual_volatility * 100.0)),
        Line::from(format!("Sharpe:     {:.4}", portfolio.stats.sharpe)),
        Line::from(""),
        Line::from(Span::styled("Weights", Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))),
    ];

    for (symbol, weight) in portfolio.significant_weights(&app.report.symbols) {
        lines.push(Line::from(format!("{:<8} {:>6.2}%", symbol, weight * 100.0)));
    }

    let details = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Details"))
        .style(Style::default().fg(Color::White));

    f.render_widget(details, area);
}
