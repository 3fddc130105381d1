//! Ratatui-based terminal UI.
//!
//! Series list on the left; observed vs fitted chart and the coefficient table
//! of the selected series on the right. `m` toggles immediate/windowed effects,
//! `k` switches between OLS and the day-of-week mixed model (needs weather).

use std::io;
use std::time::Duration;

use chrono::{Datelike, NaiveDate};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Terminal,
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph},
};

use crate::app::pipeline::{RunOutput, load_inputs, run_fit};
use crate::cli::TuiArgs;
use crate::config::FileConfig;
use crate::data::{SampleConfig, generate_sample};
use crate::domain::{EffectMode, InterventionSchedule, ModelKind, ObservationTable, SeriesFit};
use crate::error::AppError;
use crate::fit::{FitOptions, MixedOptions};
use crate::report::format::fmt_num;

mod plotters_chart;

use plotters_chart::FitPlottersChart;

/// Start the TUI.
pub fn run(args: TuiArgs, config: &FileConfig) -> Result<(), AppError> {
    // Load before touching the terminal so input errors print normally.
    let mut app = App::new(&args, config)?;

    let _guard = TerminalGuard::new()?;
    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend)
        .map_err(|e| AppError::new(4, format!("Failed to initialize terminal: {e}")))?;

    app.event_loop(&mut terminal)
}

/// Ensures the terminal is restored (raw mode, alternate screen) on exit.
struct TerminalGuard;

impl TerminalGuard {
    fn new() -> Result<Self, AppError> {
        enable_raw_mode().map_err(|e| AppError::new(4, format!("Failed to enable raw mode: {e}")))?;
        if let Err(e) = execute!(io::stdout(), EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(AppError::new(4, format!("Failed to enter alternate screen: {e}")));
        }
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
    }
}

struct App {
    table: ObservationTable,
    schedule: InterventionSchedule,
    source: String,
    mode: EffectMode,
    kind: ModelKind,
    mixed: MixedOptions,
    selected: usize,
    status: String,
    run: Option<RunOutput>,
}

impl App {
    fn new(args: &TuiArgs, config: &FileConfig) -> Result<Self, AppError> {
        let schedule = config.schedule(args.phases)?;
        let (table, source) = match &args.transport {
            Some(path) => (
                load_inputs(path, args.weather.as_deref())?,
                path.display().to_string(),
            ),
            None => {
                let sample = generate_sample(&schedule, &SampleConfig::default())?;
                (
                    sample.table.join_weather(&sample.weather)?,
                    "synthetic sample".to_string(),
                )
            }
        };
        if table.series.is_empty() {
            return Err(AppError::new(3, "The transport table has no series to model."));
        }

        let mut app = Self {
            table,
            schedule,
            source,
            mode: args.mode,
            kind: ModelKind::Ols,
            mixed: config.mixed_options(),
            selected: 0,
            status: String::new(),
            run: None,
        };
        app.refit();
        Ok(app)
    }

    fn event_loop<B: ratatui::backend::Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<(), AppError> {
        let mut needs_redraw = true;
        loop {
            if needs_redraw {
                terminal
                    .draw(|f| self.draw(f))
                    .map_err(|e| AppError::new(4, format!("Terminal draw error: {e}")))?;
                needs_redraw = false;
            }

            if !event::poll(Duration::from_millis(100))
                .map_err(|e| AppError::new(4, format!("Event poll error: {e}")))?
            {
                continue;
            }

            match event::read().map_err(|e| AppError::new(4, format!("Event read error: {e}")))? {
                Event::Key(key) => {
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }
                    if self.handle_key(key.code) {
                        break;
                    }
                    needs_redraw = true;
                }
                Event::Resize(_, _) => {
                    needs_redraw = true;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Returns `true` to quit.
    fn handle_key(&mut self, code: KeyCode) -> bool {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => return true,
            KeyCode::Up => {
                if self.selected > 0 {
                    self.selected -= 1;
                    self.on_selection_change();
                }
            }
            KeyCode::Down => {
                if self.selected + 1 < self.table.series.len() {
                    self.selected += 1;
                    self.on_selection_change();
                }
            }
            KeyCode::Char('m') => {
                self.mode = self.mode.toggle();
                self.refit();
            }
            KeyCode::Char('k') => {
                if self.table.temperature_excess.is_none() {
                    self.status = "Mixed model needs weather data (--weather).".to_string();
                } else {
                    self.kind = match self.kind {
                        ModelKind::Ols => ModelKind::MixedDayOfWeek,
                        ModelKind::MixedDayOfWeek => ModelKind::Ols,
                    };
                    self.refit();
                }
            }
            _ => {}
        }
        false
    }

    fn on_selection_change(&mut self) {
        // OLS fits cover every series; the mixed model is fitted on demand.
        if self.kind == ModelKind::MixedDayOfWeek {
            self.refit();
        }
    }

    fn selected_name(&self) -> &str {
        &self.table.series[self.selected].name
    }

    fn refit(&mut self) {
        let (opts, series) = match self.kind {
            ModelKind::Ols => (FitOptions::ols(), Vec::new()),
            ModelKind::MixedDayOfWeek => (
                FitOptions {
                    mixed: self.mixed,
                    ..FitOptions::mixed()
                },
                vec![self.selected_name().to_string()],
            ),
        };
        match run_fit(&self.table, &self.schedule, self.mode, &opts, &series) {
            Ok(run) => {
                self.status = format!("{} | {} effects", self.kind.display_name(), self.mode.display_name());
                self.run = Some(run);
            }
            Err(err) => {
                self.status = err.message().to_string();
                self.run = None;
            }
        }
    }

    fn selected_fit(&self) -> Option<&SeriesFit> {
        self.run.as_ref()?.fit(self.selected_name())
    }

    fn draw(&mut self, frame: &mut ratatui::Frame<'_>) {
        let size = frame.area();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(4), Constraint::Min(0), Constraint::Length(3)])
            .split(size);

        self.draw_header(frame, chunks[0]);
        self.draw_body(frame, chunks[1]);
        self.draw_footer(frame, chunks[2]);
    }

    fn draw_header(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let span = match (self.table.first_date(), self.table.last_date()) {
            (Some(a), Some(b)) => format!("{a} .. {b}"),
            _ => "-".to_string(),
        };
        let lines = vec![
            Line::from(vec![
                Span::styled("its", Style::default().fg(Color::Cyan)),
                Span::raw(" - interrupted time series, UK transport"),
            ]),
            Line::from(Span::styled(
                format!(
                    "data: {} | {} rows | {span} | model: {} | effects: {}",
                    self.source,
                    self.table.n_rows(),
                    self.kind.display_name(),
                    self.mode.display_name()
                ),
                Style::default().fg(Color::Gray),
            )),
        ];
        let p = Paragraph::new(Text::from(lines)).block(Block::default().borders(Borders::ALL));
        frame.render_widget(p, area);
    }

    fn draw_body(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let cols = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(22), Constraint::Min(0)])
            .split(area);
        self.draw_series_list(frame, cols[0]);

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(0), Constraint::Length(12)])
            .split(cols[1]);
        self.draw_chart(frame, rows[0]);
        self.draw_coefficients(frame, rows[1]);
    }

    fn draw_series_list(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let items: Vec<ListItem> = self
            .table
            .series
            .iter()
            .map(|s| ListItem::new(s.name.clone()))
            .collect();
        let list = List::new(items)
            .block(Block::default().title("Series").borders(Borders::ALL))
            .highlight_style(Style::default().fg(Color::Black).bg(Color::White))
            .highlight_symbol("» ");
        let mut state = ListState::default();
        state.select(Some(self.selected));
        frame.render_stateful_widget(list, area, &mut state);
    }

    fn draw_chart(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let block = Block::default()
            .title(format!("{}: observed vs fitted", self.selected_name()))
            .borders(Borders::ALL);
        let inner = block.inner(area);
        frame.render_widget(block, area);
        frame.render_widget(Clear, inner);

        let Some(fit) = self.selected_fit() else {
            frame.render_widget(
                Paragraph::new("No fit available.").style(Style::default().fg(Color::Yellow)),
                inner,
            );
            return;
        };
        let Some(model) = &fit.model else {
            frame.render_widget(
                Paragraph::new("Too few observations to fit this series.")
                    .style(Style::default().fg(Color::Yellow)),
                inner,
            );
            return;
        };

        let data = chart_series(&self.table, &self.schedule, &model.rows, &model.observed, &model.fitted);
        let (chart_rect, insets) = chart_layout(inner);
        let widget = FitPlottersChart {
            fitted: &data.fitted,
            observed: &data.observed,
            events: &data.events,
            x_bounds: data.x_bounds,
            y_bounds: data.y_bounds,
            x_label: "date",
            y_label: "volume".to_string(),
            fmt_x: fmt_axis_date,
            fmt_y: fmt_axis_y,
        };
        frame.render_widget(widget, chart_rect);
        if let Some(insets) = insets {
            draw_axis_ticks(frame, inner, chart_rect, insets, data.x_bounds, data.y_bounds);
        }
    }

    fn draw_coefficients(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let block = Block::default().title("Coefficients (95% CI)").borders(Borders::ALL);
        let Some(fit) = self.selected_fit() else {
            frame.render_widget(Paragraph::new("").block(block), area);
            return;
        };

        let mut lines = vec![Line::from(Span::styled(
            format!("{:<28} {:>10} {:>10} {:>10}", "covariate", "mean", "low", "high"),
            Style::default().add_modifier(Modifier::BOLD),
        ))];
        for e in &fit.aligned {
            let significant = e.is_modeled() && (e.low > 0.0 || e.high < 0.0);
            let style = if !e.is_modeled() {
                Style::default().fg(Color::DarkGray)
            } else if significant {
                Style::default().fg(Color::Green)
            } else {
                Style::default()
            };
            lines.push(Line::from(Span::styled(
                format!(
                    "{:<28} {:>10} {:>10} {:>10}",
                    e.name,
                    fmt_num(e.mean, 4),
                    fmt_num(e.low, 4),
                    fmt_num(e.high, 4)
                ),
                style,
            )));
        }
        frame.render_widget(Paragraph::new(Text::from(lines)).block(block), area);
    }

    fn draw_footer(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let help = "↑/↓ series  m effect mode  k OLS/mixed  q quit";
        let line = Line::from(vec![
            Span::styled(help, Style::default().fg(Color::Gray)),
            Span::raw(" | "),
            Span::styled(&self.status, Style::default().fg(Color::Yellow)),
        ]);
        let p = Paragraph::new(line).block(Block::default().borders(Borders::ALL));
        frame.render_widget(p, area);
    }
}

struct ChartData {
    fitted: Vec<(f64, f64)>,
    observed: Vec<(f64, f64)>,
    events: Vec<f64>,
    x_bounds: [f64; 2],
    y_bounds: [f64; 2],
}

/// x is the day number (days since 0001-01-01) so tick labels can show dates.
fn chart_series(
    table: &ObservationTable,
    schedule: &InterventionSchedule,
    rows: &[usize],
    observed: &[f64],
    fitted: &[f64],
) -> ChartData {
    let x: Vec<f64> = rows
        .iter()
        .map(|&r| table.dates[r].num_days_from_ce() as f64)
        .collect();
    let observed: Vec<(f64, f64)> = x.iter().copied().zip(observed.iter().copied()).collect();
    let fitted: Vec<(f64, f64)> = x.iter().copied().zip(fitted.iter().copied()).collect();
    let events = schedule
        .events()
        .iter()
        .map(|e| e.date.num_days_from_ce() as f64)
        .collect();

    let (x_min, x_max) = x
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let x_bounds = if x_min.is_finite() && x_max > x_min {
        [x_min, x_max]
    } else {
        [x_min - 1.0, x_min + 1.0]
    };

    let (mut y_min, mut y_max) = (f64::INFINITY, f64::NEG_INFINITY);
    for &(_, y) in observed.iter().chain(&fitted) {
        if y.is_finite() {
            y_min = y_min.min(y);
            y_max = y_max.max(y);
        }
    }
    if !y_min.is_finite() || !y_max.is_finite() || y_max <= y_min {
        y_min = 0.0;
        y_max = 1.0;
    }
    let pad = ((y_max - y_min).abs() * 0.05).max(1e-12);

    ChartData {
        fitted,
        observed,
        events,
        x_bounds,
        y_bounds: [y_min - pad, y_max + pad],
    }
}

fn fmt_axis_date(v: f64) -> String {
    NaiveDate::from_num_days_from_ce_opt(v.round() as i32)
        .map(|d| d.format("%d-%b").to_string())
        .unwrap_or_default()
}

fn fmt_axis_y(v: f64) -> String {
    format!("{v:.2}")
}

#[derive(Debug, Clone, Copy)]
struct AxisInsets {
    left: u16,
    right: u16,
    top: u16,
    bottom: u16,
}

fn chart_layout(inner: Rect) -> (Rect, Option<AxisInsets>) {
    let insets = AxisInsets {
        left: 8,
        right: 2,
        top: 1,
        bottom: 2,
    };

    if inner.width <= insets.left + insets.right + 10
        || inner.height <= insets.top + insets.bottom + 5
    {
        return (inner, None);
    }

    let rect = Rect {
        x: inner.x + insets.left,
        y: inner.y + insets.top,
        width: inner.width - insets.left - insets.right,
        height: inner.height - insets.top - insets.bottom,
    };

    (rect, Some(insets))
}

fn draw_axis_ticks(
    frame: &mut ratatui::Frame<'_>,
    inner: Rect,
    chart: Rect,
    insets: AxisInsets,
    x_bounds: [f64; 2],
    y_bounds: [f64; 2],
) {
    let ticks = 5usize;
    let style = Style::default().fg(Color::Gray);

    for i in 0..ticks {
        let u = i as f64 / (ticks as f64 - 1.0);
        let x_val = x_bounds[0] + u * (x_bounds[1] - x_bounds[0]);
        let x = chart.x + ((chart.width - 1) as f64 * u).round() as u16;
        let label = fmt_axis_date(x_val);
        let label_len = label.len() as u16;
        let start = x.saturating_sub(label_len / 2);
        let y = chart.y + chart.height;
        if y >= inner.y + inner.height - 1 {
            continue;
        }
        frame.render_widget(
            Paragraph::new(label).style(style),
            Rect {
                x: start,
                y,
                width: label_len,
                height: 1,
            },
        );
    }

    for i in 0..ticks {
        let u = i as f64 / (ticks as f64 - 1.0);
        let y_val = y_bounds[0] + u * (y_bounds[1] - y_bounds[0]);
        let y = chart.y + (chart.height - 1) - ((chart.height - 1) as f64 * u).round() as u16;
        let label = fmt_axis_y(y_val);
        let label_len = label.len() as u16;
        let x = inner.x + insets.left.saturating_sub(1);
        let start = x.saturating_sub(label_len);
        if start < inner.x {
            continue;
        }
        frame.render_widget(
            Paragraph::new(label).style(style),
            Rect {
                x: start,
                y,
                width: label_len,
                height: 1,
            },
        );
    }

    let x_label = Paragraph::new("date")
        .alignment(Alignment::Center)
        .style(Style::default().fg(Color::Gray));
    let x_rect = Rect {
        x: chart.x,
        y: chart.y + chart.height + 1,
        width: chart.width,
        height: 1,
    };
    if x_rect.y < inner.y + inner.height {
        frame.render_widget(x_label, x_rect);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PhaseVariant;

    #[test]
    fn date_axis_labels_round_trip() {
        let d = NaiveDate::from_ymd_opt(2020, 3, 23).unwrap();
        assert_eq!(fmt_axis_date(d.num_days_from_ce() as f64), "23-Mar");
    }

    #[test]
    fn chart_bounds_cover_the_data() {
        let schedule = PhaseVariant::Standard.schedule().unwrap();
        let sample = generate_sample(&schedule, &SampleConfig::default()).unwrap();
        let rows: Vec<usize> = (0..10).collect();
        let observed: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let fitted = vec![4.5; 10];
        let data = chart_series(&sample.table, &schedule, &rows, &observed, &fitted);
        assert!(data.x_bounds[0] < data.x_bounds[1]);
        assert!(data.y_bounds[0] < 0.0 && data.y_bounds[1] > 9.0);
        assert_eq!(data.events.len(), 3);
    }

    #[test]
    fn mode_toggle_refits() {
        let args = TuiArgs {
            transport: None,
            weather: None,
            phases: None,
            mode: EffectMode::Immediate,
        };
        let mut app = App::new(&args, &FileConfig::default()).unwrap();
        assert!(app.selected_fit().is_some());
        assert!(!app.handle_key(KeyCode::Char('m')));
        assert_eq!(app.run.as_ref().unwrap().mode(), EffectMode::Windowed);
        assert!(app.handle_key(KeyCode::Char('q')));
    }
}
