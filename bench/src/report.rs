//! CSV and PNG output for a finished benchmark.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::Context;
use image::{ImageFormat, Rgb, RgbImage};

use crate::benchmark::LevelSummary;

pub const CSV_HEADER: &str = "Concurrency Level,Average TTFC,Average RTF";

const PLOT_WIDTH: u32 = 1000;
const PLOT_HEIGHT: u32 = 500;
const MARGIN: i64 = 50;
const MARKER_RADIUS: i64 = 4;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const AXIS: Rgb<u8> = Rgb([0, 0, 0]);
const TTFC_COLOR: Rgb<u8> = Rgb([31, 119, 180]);
const RTF_COLOR: Rgb<u8> = Rgb([255, 127, 14]);

fn format_value(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else if value == f64::INFINITY {
        "inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-inf".to_string()
    } else {
        format!("{value:?}")
    }
}

pub fn csv_string(summaries: &[LevelSummary]) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push_str("\r\n");
    for summary in summaries {
        let _ = write!(
            out,
            "{},{},{}\r\n",
            summary.level,
            format_value(summary.mean_ttfc),
            format_value(summary.mean_rtf)
        );
    }
    out
}

/// One row per level, in the order given.
pub fn write_csv(path: &Path, summaries: &[LevelSummary]) -> anyhow::Result<()> {
    std::fs::write(path, csv_string(summaries))
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// Two side-by-side line charts: mean TTFC and mean RTF against the
/// concurrency level. Levels without a finite value leave a gap.
pub fn render_plot(path: &Path, summaries: &[LevelSummary]) -> anyhow::Result<()> {
    let img = plot_image(summaries);
    img.save_with_format(path, ImageFormat::Png)
        .with_context(|| format!("Failed to write {}", path.display()))
}

pub fn plot_image(summaries: &[LevelSummary]) -> RgbImage {
    let mut img = RgbImage::from_pixel(PLOT_WIDTH, PLOT_HEIGHT, BACKGROUND);
    let panel_width = PLOT_WIDTH as i64 / 2;

    let levels: Vec<f64> = summaries.iter().map(|s| s.level as f64).collect();
    let ttfc: Vec<f64> = summaries.iter().map(|s| s.mean_ttfc).collect();
    let rtf: Vec<f64> = summaries.iter().map(|s| s.mean_rtf).collect();

    draw_panel(&mut img, 0, panel_width, &levels, &ttfc, TTFC_COLOR);
    draw_panel(&mut img, panel_width, panel_width, &levels, &rtf, RTF_COLOR);
    img
}

/// Pixel-space rectangle of one chart.
struct Frame {
    left: i64,
    right: i64,
    top: i64,
    bottom: i64,
}

impl Frame {
    fn project(&self, x: f64, y: f64, x_range: (f64, f64), y_max: f64) -> (i64, i64) {
        let (x_min, x_max) = x_range;
        let x_frac = if x_max > x_min {
            (x - x_min) / (x_max - x_min)
        } else {
            0.5
        };
        let y_frac = if y_max > 0.0 { y / y_max } else { 0.0 };
        let px = self.left + (x_frac * (self.right - self.left) as f64).round() as i64;
        let py = self.bottom - (y_frac * (self.bottom - self.top) as f64).round() as i64;
        (px, py)
    }
}

fn draw_panel(img: &mut RgbImage, offset: i64, width: i64, xs: &[f64], ys: &[f64], color: Rgb<u8>) {
    let frame = Frame {
        left: offset + MARGIN,
        right: offset + width - MARGIN / 2,
        top: MARGIN / 2,
        bottom: PLOT_HEIGHT as i64 - MARGIN,
    };

    draw_line(img, (frame.left, frame.bottom), (frame.right, frame.bottom), AXIS);
    draw_line(img, (frame.left, frame.top), (frame.left, frame.bottom), AXIS);

    let x_range = (
        xs.iter().copied().fold(f64::INFINITY, f64::min),
        xs.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    );
    let y_max = ys
        .iter()
        .copied()
        .filter(|y| y.is_finite())
        .fold(0.0_f64, f64::max)
        * 1.1;

    let mut previous: Option<(i64, i64)> = None;
    for (&x, &y) in xs.iter().zip(ys) {
        let tick = frame.project(x, 0.0, x_range, y_max);
        draw_line(img, (tick.0, frame.bottom), (tick.0, frame.bottom + 5), AXIS);

        if !y.is_finite() {
            previous = None;
            continue;
        }
        let point = frame.project(x, y, x_range, y_max);
        if let Some(prev) = previous {
            draw_line(img, prev, point, color);
        }
        draw_marker(img, point, color);
        previous = Some(point);
    }
}

fn put(img: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && x < img.width() as i64 && y < img.height() as i64 {
        img.put_pixel(x as u32, y as u32, color);
    }
}

// Bresenham
fn draw_line(img: &mut RgbImage, from: (i64, i64), to: (i64, i64), color: Rgb<u8>) {
    let (mut x, mut y) = from;
    let dx = (to.0 - x).abs();
    let dy = -(to.1 - y).abs();
    let sx = if x < to.0 { 1 } else { -1 };
    let sy = if y < to.1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        put(img, x, y, color);
        if x == to.0 && y == to.1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

fn draw_marker(img: &mut RgbImage, center: (i64, i64), color: Rgb<u8>) {
    let r = MARKER_RADIUS;
    for dy in -r..=r {
        for dx in -r..=r {
            if dx * dx + dy * dy <= r * r {
                put(img, center.0 + dx, center.1 + dy, color);
            }
        }
    }
}
