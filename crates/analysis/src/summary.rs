use model::*;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

#[derive(Clone, Copy, Serialize, Debug, PartialEq)]
pub struct LapStat {
    pub episode: u32,
    pub lap_time: f64,
    pub steps: u32,
}

impl LapStat {
    pub fn of(ep: &Episode) -> Self {
        Self { episode: ep.episode, lap_time: ep.lap_time(), steps: ep.steps() }
    }
}

#[derive(Clone, Copy, Serialize, Debug, PartialEq)]
pub struct MetricStats {
    pub mean: f64,
    pub stddev: f64,
    pub min: LapStat,
    pub max: LapStat,
}

#[derive(Clone, Serialize, Debug, PartialEq)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RunSummary {
    NoData {
        off_track: usize,
    },
    Stats {
        completed: usize,
        off_track: usize,
        laps: Vec<LapStat>,
        lap_time: MetricStats,
        steps: MetricStats,
    },
}

impl RunSummary {
    pub fn completed(&self) -> usize {
        match self {
            RunSummary::NoData { .. } => 0,
            RunSummary::Stats { completed, .. } => *completed,
        }
    }

    pub fn off_track(&self) -> usize {
        match self {
            RunSummary::NoData { off_track } | RunSummary::Stats { off_track, .. } => *off_track,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

pub fn summarize(episodes: &[Episode], off_track: usize) -> RunSummary {
    let laps: Vec<LapStat> = episodes.iter().map(LapStat::of).collect();
    let (Some(lap_time), Some(steps)) = (
        metric(&laps, |l| l.lap_time),
        metric(&laps, |l| l.steps as f64),
    ) else {
        return RunSummary::NoData { off_track };
    };
    RunSummary::Stats { completed: laps.len(), off_track, laps, lap_time, steps }
}

/// Mean, population stddev and the first min/max lap for one metric.
fn metric(laps: &[LapStat], f: impl Fn(&LapStat) -> f64) -> Option<MetricStats> {
    let first = laps.first()?;
    let values: Vec<f64> = laps.iter().map(&f).collect();
    let (mut min, mut max) = (first, first);
    for l in &laps[1..] {
        if f(l) < f(min) {
            min = l;
        }
        if f(l) > f(max) {
            max = l;
        }
    }
    Some(MetricStats { mean: mean(&values), stddev: stddev(&values), min: *min, max: *max })
}

fn mean(v: &[f64]) -> f64 {
    v.iter().sum::<f64>() / (v.len() as f64)
}

fn stddev(v: &[f64]) -> f64 {
    if v.is_empty() {
        return 0.0;
    }
    let m = mean(v);
    let var = v.iter().map(|x| {
        let d = *x - m;
        d * d
    }).sum::<f64>() / (v.len() as f64);
    var.sqrt()
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Analyzing {} episodes...", self.completed() + self.off_track())?;
        writeln!(f, "\tlap_complete episodes = {}", self.completed())?;
        writeln!(f, "\toff_track episodes = {} (ignored for analysis)", self.off_track())?;
        match self {
            RunSummary::NoData { .. } => writeln!(f, "\tNO DATA COLLECTED"),
            RunSummary::Stats { lap_time, steps, .. } => {
                writeln!(
                    f,
                    "\tAverage lap time = {:.2}s (stddev {:.4})",
                    lap_time.mean, lap_time.stddev
                )?;
                writeln!(
                    f,
                    "\tMin lap time = {:.2}s ({} steps, episode {})",
                    lap_time.min.lap_time, lap_time.min.steps, lap_time.min.episode
                )?;
                writeln!(
                    f,
                    "\tMax lap time = {:.2}s ({} steps, episode {})",
                    lap_time.max.lap_time, lap_time.max.steps, lap_time.max.episode
                )?;
                writeln!(f, "\tAverage steps = {:.1} (stddev {:.4})", steps.mean, steps.stddev)?;
                writeln!(
                    f,
                    "\tMin steps = {} ({:.2}s, episode {})",
                    steps.min.steps, steps.min.lap_time, steps.min.episode
                )?;
                writeln!(
                    f,
                    "\tMax steps = {} ({:.2}s, episode {})",
                    steps.max.steps, steps.max.lap_time, steps.max.episode
                )
            }
        }
    }
}

/// Flattened per-sample values used by heatmaps.
#[derive(Clone, Copy, Serialize, Debug, PartialEq)]
pub struct PlotPoint {
    pub x: f64,
    pub y: f64,
    pub waypoint: usize,
    pub speed: f64,
    pub reward: f64,
}

pub fn plot_points(episodes: &[Episode]) -> Vec<PlotPoint> {
    episodes
        .iter()
        .flat_map(|ep| ep.samples.iter())
        .map(|s| PlotPoint {
            x: s.x,
            y: s.y,
            waypoint: s.closest_waypoint,
            speed: s.speed,
            reward: s.reward,
        })
        .collect()
}
