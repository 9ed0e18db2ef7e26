use std::ops::Range;
use std::path::Path;

use analysis::{PlotPoint, TargetLine};
use anyhow::Result;
use model::{Point2, TargetStrategy, Track};
use plotters::coord::types::RangedCoordf64;
use plotters::coord::Shift;
use plotters::prelude::*;

use crate::commands::HeatmapMode;

const HEATMAP_SIZE: (u32, u32) = (1200, 800);
const PANEL_SIZE: u32 = 480;
const PAD: f64 = 0.15;

type Chart<'a, 'b> = ChartContext<'a, SVGBackend<'b>, Cartesian2d<RangedCoordf64, RangedCoordf64>>;

/// One target-angle diagram: the line that was computed plus the targets to
/// draw on it.
pub struct AnglePanel {
    pub line: TargetLine,
    pub targets: Vec<(TargetStrategy, Point2, f64)>,
}

fn strategy_color(s: TargetStrategy) -> RGBColor {
    match s {
        TargetStrategy::Endpoint => CYAN,
        TargetStrategy::Average => GREEN,
        TargetStrategy::WeightedAverage => MAGENTA,
    }
}

fn bounds<'p>(points: impl IntoIterator<Item = &'p Point2>) -> (Range<f64>, Range<f64>) {
    let (mut x0, mut x1, mut y0, mut y1) = (f64::MAX, f64::MIN, f64::MAX, f64::MIN);
    for p in points {
        x0 = x0.min(p.x);
        x1 = x1.max(p.x);
        y0 = y0.min(p.y);
        y1 = y1.max(p.y);
    }
    if x0 > x1 {
        return (0.0..1.0, 0.0..1.0);
    }
    let pad = ((x1 - x0).max(y1 - y0) * PAD).max(0.25);
    (x0 - pad..x1 + pad, y0 - pad..y1 + pad)
}

fn in_bounds(p: &Point2, xr: &Range<f64>, yr: &Range<f64>) -> bool {
    xr.contains(&p.x) && yr.contains(&p.y)
}

/// Hue runs from blue at `lo` to red at `hi`.
fn heat_color(v: f64, lo: f64, hi: f64) -> HSLColor {
    let t = if hi > lo { ((v - lo) / (hi - lo)).clamp(0.0, 1.0) } else { 0.5 };
    HSLColor((1.0 - t) * 240.0 / 360.0, 0.9, 0.5)
}

fn draw_waypoints(
    chart: &mut Chart<'_, '_>,
    track: &Track,
    xr: &Range<f64>,
    yr: &Range<f64>,
    size: u32,
) -> Result<()> {
    chart.draw_series(
        track
            .waypoints()
            .iter()
            .filter(|p| in_bounds(p, xr, yr))
            .map(|p| Circle::new((p.x, p.y), size, BLUE.mix(0.6).filled())),
    )?;
    Ok(())
}

pub fn draw_heatmap(
    path: &Path,
    track: &Track,
    points: &[PlotPoint],
    mode: HeatmapMode,
) -> Result<()> {
    let value = |p: &PlotPoint| match mode {
        HeatmapMode::Reward => p.reward,
        _ => p.speed,
    };
    let lo = points.iter().map(value).fold(f64::INFINITY, f64::min);
    let hi = points.iter().map(value).fold(f64::NEG_INFINITY, f64::max);

    let positions: Vec<Point2> = points.iter().map(|p| Point2::new(p.x, p.y)).collect();
    let (xr, yr) = bounds(track.waypoints().iter().chain(positions.iter()));

    let root = SVGBackend::new(path, HEATMAP_SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(format!("{} {} ({:.2} .. {:.2})", track.name, mode, lo, hi), ("sans-serif", 22))
        .margin(10)
        .x_label_area_size(30)
        .y_label_area_size(40)
        .build_cartesian_2d(xr.clone(), yr.clone())?;
    chart.configure_mesh().light_line_style(WHITE.mix(0.7)).draw()?;

    draw_waypoints(&mut chart, track, &xr, &yr, 3)?;
    chart.draw_series(
        points
            .iter()
            .map(|p| Circle::new((p.x, p.y), 2, heat_color(value(p), lo, hi).filled())),
    )?;
    root.present()?;
    Ok(())
}

fn draw_panel(
    area: &DrawingArea<SVGBackend<'_>, Shift>,
    track: &Track,
    panel: &AnglePanel,
) -> Result<()> {
    let line = &panel.line;
    let mut extent: Vec<Point2> = line.window.clone();
    extent.push(line.origin);
    extent.extend(panel.targets.iter().map(|(_, p, _)| *p));
    let (xr, yr) = bounds(&extent);

    let mut chart = ChartBuilder::on(area)
        .caption(
            format!(
                "wp {} {} n={} {:.1}°",
                line.index, line.spec.strategy, line.spec.lookahead, line.heading
            ),
            ("sans-serif", 14),
        )
        .margin(6)
        .x_label_area_size(20)
        .y_label_area_size(30)
        .build_cartesian_2d(xr.clone(), yr.clone())?;
    chart.configure_mesh().x_labels(4).y_labels(4).draw()?;

    draw_waypoints(&mut chart, track, &xr, &yr, 2)?;
    chart.draw_series(line.window.iter().map(|p| Circle::new((p.x, p.y), 3, RED.filled())))?;
    let first = line.window[0];
    chart.draw_series(std::iter::once(Cross::new((first.x, first.y), 6, BLACK.stroke_width(2))))?;

    // origin as a small square
    let d = (xr.end - xr.start) * 0.01;
    let o = line.origin;
    chart.draw_series(std::iter::once(Rectangle::new(
        [(o.x - d, o.y - d), (o.x + d, o.y + d)],
        RED.filled(),
    )))?;

    for &(strategy, target, _) in &panel.targets {
        chart.draw_series(std::iter::once(PathElement::new(
            vec![(o.x, o.y), (target.x, target.y)],
            strategy_color(strategy).stroke_width(2),
        )))?;
    }
    Ok(())
}

/// Lays the panels out on a near-square grid and writes them as one SVG.
pub fn draw_angle_page(path: &Path, track: &Track, panels: &[AnglePanel]) -> Result<()> {
    let n = panels.len().max(1);
    let cols = (n as f64).sqrt().ceil() as usize;
    let rows = n.div_ceil(cols);
    let size = (PANEL_SIZE * cols as u32, PANEL_SIZE * rows as u32);

    let root = SVGBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE)?;
    for (area, panel) in root.split_evenly((rows, cols)).iter().zip(panels) {
        draw_panel(area, track, panel)?;
    }
    root.present()?;
    Ok(())
}
