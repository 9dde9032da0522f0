//! ASCII plotting for terminal output.
//!
//! Fixed-size grid, deterministic output (golden tests rely on it).
//!
//! Plot elements:
//! - normal probability pairs (expected score, observed deviation): `o`
//! - reference line `y = x`: `-`

use crate::model::NormalProbabilityPlot;

/// Render the normal probability plot of a model's normalised deviations.
///
/// Both axes share one range so a well-described error model puts the points
/// on the diagonal.
pub fn render_normal_probability_plot(plot: &NormalProbabilityPlot, width: usize, height: usize) -> String {
    let width = width.max(10);
    let height = height.max(5);

    let Some((lo, hi)) = value_range(plot) else {
        return "Plot: normal probability | n=0 (no deviations to plot)\n".to_string();
    };
    let (lo, hi) = pad_range(lo, hi, 0.05);

    let mut grid = vec![vec![' '; width]; height];

    // Reference line first so points overlay it.
    draw_line(
        &mut grid,
        map_x(lo, lo, hi, width),
        map_y(lo, lo, hi, height),
        map_x(hi, lo, hi, width),
        map_y(hi, lo, hi, height),
        '-',
    );

    for (&x, &y) in plot.expected.iter().zip(&plot.observed) {
        grid[map_y(y, lo, hi, height)][map_x(x, lo, hi, width)] = 'o';
    }

    let mut out = String::new();
    out.push_str(&format!(
        "Plot: normal probability | n={} | range=[{lo:.2}, {hi:.2}]\n",
        plot.len()
    ));
    for row in grid {
        out.push_str(&row.into_iter().collect::<String>());
        out.push('\n');
    }
    out
}

fn value_range(plot: &NormalProbabilityPlot) -> Option<(f64, f64)> {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for &v in plot.expected.iter().chain(&plot.observed) {
        if v.is_finite() {
            min = min.min(v);
            max = max.max(v);
        }
    }
    (min.is_finite() && max.is_finite() && max > min).then_some((min, max))
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = (span * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(x: f64, min: f64, max: f64, width: usize) -> usize {
    let width = width.max(2);
    let u = ((x - min) / (max - min)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(y: f64, min: f64, max: f64, height: usize) -> usize {
    let height = height.max(2);
    let u = ((y - min) / (max - min)).clamp(0.0, 1.0);
    // max at row 0
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

/// Integer line drawing (Bresenham).
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
