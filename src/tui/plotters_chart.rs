//! Plotters-powered observed-vs-fitted chart widget for Ratatui.
//!
//! We render Plotters output into the Ratatui buffer using `plotters-ratatui-backend`.

use plotters::prelude::*;
use plotters_ratatui_backend::widget_fn;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Style},
    widgets::Widget,
};

/// A render-only chart description; series and bounds are computed by the caller.
pub struct FitPlottersChart<'a> {
    /// Fitted values as a line.
    pub fitted: &'a [(f64, f64)],
    /// Observed values as dots.
    pub observed: &'a [(f64, f64)],
    /// Intervention dates (x positions), drawn as vertical markers.
    pub events: &'a [f64],
    pub x_bounds: [f64; 2],
    pub y_bounds: [f64; 2],
    pub x_label: &'a str,
    pub y_label: String,
    pub fmt_x: fn(f64) -> String,
    pub fmt_y: fn(f64) -> String,
}

impl Widget for FitPlottersChart<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.width < 20 || area.height < 8 {
            buf.set_string(
                area.x,
                area.y,
                "Chart area too small (resize terminal).",
                Style::default().fg(Color::Yellow),
            );
            return;
        }

        let [x0, x1] = self.x_bounds;
        let [y0, y1] = self.y_bounds;
        if !(x0.is_finite() && x1.is_finite() && y0.is_finite() && y1.is_finite()) || x1 <= x0 || y1 <= y0 {
            return;
        }

        let widget = widget_fn(move |root| {
            let mut chart = ChartBuilder::on(&root)
                .margin(1)
                // Terminal cells are low-res, so keep label areas compact.
                .set_label_area_size(LabelAreaPosition::Left, 6)
                .set_label_area_size(LabelAreaPosition::Bottom, 3)
                .build_cartesian_2d(x0..x1, y0..y1)?;

            chart
                .configure_mesh()
                .disable_x_mesh()
                .disable_y_mesh()
                .x_desc(self.x_label)
                .y_desc(&self.y_label)
                .x_labels(5)
                .y_labels(5)
                .x_label_formatter(&|v| (self.fmt_x)(*v))
                .y_label_formatter(&|v| (self.fmt_y)(*v))
                .label_style(("sans-serif", 10).into_font().color(&WHITE))
                .axis_style(&WHITE)
                .bold_line_style(&WHITE)
                .draw()?;

            let event_color = RGBColor(255, 200, 0);
            let fitted_color = RGBColor(0, 255, 255);

            for &x in self.events.iter().filter(|&&x| x > x0 && x < x1) {
                chart.draw_series(LineSeries::new([(x, y0), (x, y1)], &event_color))?;
            }

            chart.draw_series(
                self.observed
                    .iter()
                    .filter(|(_, y)| y.is_finite())
                    .map(|&(x, y)| Pixel::new((x, y), WHITE)),
            )?;

            // Circle markers are avoided: the backend maps their radii to huge
            // canvas shapes. Pixels read fine in a terminal.
            chart.draw_series(LineSeries::new(self.fitted.iter().copied(), &fitted_color))?;

            Ok(())
        });

        widget.render(area, buf);
    }
}
