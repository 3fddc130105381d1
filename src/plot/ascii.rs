//! ASCII plotting for terminal output and text reports.
//!
//! Fixed-size character grid, deterministic output. A chart is a stack of
//! layers drawn in order, so later layers overwrite earlier ones:
//! - `Mark::Line`: consecutive points joined by line segments (only into blank cells)
//! - `Mark::Points`: one glyph per point

use chrono::NaiveDate;

/// How a layer is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
    Points(char),
    Line(char),
}

/// One drawable data set.
#[derive(Debug, Clone, Copy)]
pub struct Layer<'a> {
    pub data: &'a [(f64, f64)],
    pub mark: Mark,
}

impl<'a> Layer<'a> {
    pub fn points(data: &'a [(f64, f64)], glyph: char) -> Self {
        Self {
            data,
            mark: Mark::Points(glyph),
        }
    }

    pub fn line(data: &'a [(f64, f64)], glyph: char) -> Self {
        Self {
            data,
            mark: Mark::Line(glyph),
        }
    }
}

/// Render layers on a `width x height` grid below a one-line header.
///
/// Non-finite points are skipped. Axis ranges cover every finite point.
pub fn render_layers(header: &str, layers: &[Layer<'_>], width: usize, height: usize) -> String {
    let width = width.max(10);
    let height = height.max(5);

    let (x_min, x_max) = axis_range(layers, |p| p.0).unwrap_or((0.0, 1.0));
    let (y_min, y_max) = axis_range(layers, |p| p.1).unwrap_or((0.0, 1.0));
    let (y_min, y_max) = pad_range(y_min, y_max, 0.05);

    let mut grid = vec![vec![' '; width]; height];
    let frame = Frame {
        x_min,
        x_max,
        y_min,
        y_max,
        width,
        height,
    };
    for layer in layers {
        match layer.mark {
            Mark::Line(ch) => draw_polyline(&mut grid, layer.data, &frame, ch),
            Mark::Points(ch) => {
                for &(x, y) in layer.data.iter().filter(|p| p.0.is_finite() && p.1.is_finite()) {
                    grid[frame.row(y)][frame.col(x)] = ch;
                }
            }
        }
    }

    let mut out = String::new();
    out.push_str(&format!(
        "{header} | x=[{x_min:.3}, {x_max:.3}] | y=[{y_min:.3}, {y_max:.3}]\n"
    ));
    for row in grid {
        out.push_str(&row.into_iter().collect::<String>());
        out.push('\n');
    }
    out
}

/// Observed (`o`) vs fitted (`-`) values over calendar dates.
pub fn render_series_plot(
    title: &str,
    dates: &[NaiveDate],
    observed: &[f64],
    fitted: &[f64],
    width: usize,
    height: usize,
) -> String {
    let Some(&origin) = dates.first() else {
        return format!("Plot: {title} (no data)\n");
    };
    let x: Vec<f64> = dates
        .iter()
        .map(|&d| (d - origin).num_days() as f64)
        .collect();
    let obs: Vec<(f64, f64)> = x.iter().copied().zip(observed.iter().copied()).collect();
    let fit: Vec<(f64, f64)> = x.iter().copied().zip(fitted.iter().copied()).collect();

    let last = dates.last().copied().unwrap_or(origin);
    let header = format!("Plot: {title} {origin}..{last} (x = days)");
    render_layers(
        &header,
        &[Layer::line(&fit, '-'), Layer::points(&obs, 'o')],
        width,
        height,
    )
}

struct Frame {
    x_min: f64,
    x_max: f64,
    y_min: f64,
    y_max: f64,
    width: usize,
    height: usize,
}

impl Frame {
    fn col(&self, x: f64) -> usize {
        map_x(x, self.x_min, self.x_max, self.width)
    }

    fn row(&self, y: f64) -> usize {
        map_y(y, self.y_min, self.y_max, self.height)
    }
}

fn axis_range(layers: &[Layer<'_>], pick: impl Fn(&(f64, f64)) -> f64) -> Option<(f64, f64)> {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for layer in layers {
        for p in layer.data.iter().filter(|p| p.0.is_finite() && p.1.is_finite()) {
            let v = pick(p);
            min = min.min(v);
            max = max.max(v);
        }
    }
    if min.is_finite() && max.is_finite() && max > min {
        Some((min, max))
    } else if min.is_finite() {
        Some((min - 0.5, min + 0.5))
    } else {
        None
    }
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = (span * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(x: f64, x_min: f64, x_max: f64, width: usize) -> usize {
    let width = width.max(2);
    let u = ((x - x_min) / (x_max - x_min)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(y: f64, y_min: f64, y_max: f64, height: usize) -> usize {
    let height = height.max(2);
    let u = ((y - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
    // y=top is max -> row 0
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

fn draw_polyline(grid: &mut [Vec<char>], data: &[(f64, f64)], frame: &Frame, ch: char) {
    let mut prev: Option<(usize, usize)> = None;
    for &(x, y) in data {
        if !(x.is_finite() && y.is_finite()) {
            // Gaps break the line.
            prev = None;
            continue;
        }
        let cx = frame.col(x);
        let cy = frame.row(y);
        match prev {
            Some((x0, y0)) => draw_line(grid, x0, y0, cx, cy, ch),
            None => {
                if grid[cy][cx] == ' ' {
                    grid[cy][cx] = ch;
                }
            }
        }
        prev = Some((cx, cy));
    }
}

/// Integer line drawing (Bresenham-ish).
fn draw_line(grid: &mut [Vec<char>], x0: usize, y0: usize, x1: usize, y1: usize, ch: char) {
    let mut x0 = x0 as isize;
    let mut y0 = y0 as isize;
    let x1 = x1 as isize;
    let y1 = y1 as isize;

    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if y0 >= 0
            && (y0 as usize) < grid.len()
            && x0 >= 0
            && (x0 as usize) < grid[0].len()
            && grid[y0 as usize][x0 as usize] == ' '
        {
            grid[y0 as usize][x0 as usize] = ch;
        }

        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plot_golden_snapshot_small() {
        let obs = [(1.0, 100.0), (10.0, 110.0)];
        let fit = [(1.0, 100.0), (10.0, 100.0)];
        let txt = render_layers(
            "Plot: test",
            &[Layer::line(&fit, '-'), Layer::points(&obs, 'o')],
            10,
            5,
        );
        let expected = concat!(
            "Plot: test | x=[1.000, 10.000] | y=[99.500, 110.500]\n",
            "         o\n",
            "          \n",
            "          \n",
            "          \n",
            "o---------\n",
        );
        assert_eq!(txt, expected);
    }

    #[test]
    fn series_plot_skips_missing_values() {
        let d0 = NaiveDate::from_ymd_opt(2020, 3, 1).unwrap();
        let dates: Vec<NaiveDate> = (0..4).map(|i| d0 + chrono::Duration::days(i)).collect();
        let txt = render_series_plot(
            "Cars",
            &dates,
            &[1.0, f64::NAN, 3.0, 4.0],
            &[1.0, 2.0, 3.0, 4.0],
            20,
            6,
        );
        assert!(txt.starts_with("Plot: Cars 2020-03-01..2020-03-04"));
        let marks = txt.lines().skip(1).flat_map(|l| l.chars()).filter(|&c| c == 'o').count();
        assert_eq!(marks, 3);
    }

    #[test]
    fn empty_series_plot_has_placeholder() {
        assert_eq!(render_series_plot("X", &[], &[], &[], 10, 5), "Plot: X (no data)\n");
    }
}
