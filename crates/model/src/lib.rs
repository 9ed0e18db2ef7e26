//! Plain data types shared by the simlog crates: track geometry, per-waypoint
//! target configuration and the parsed simulation samples.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

impl Point2 {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Point2) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Signed bearing in degrees (-180..=180) from `self` towards `other`.
    pub fn bearing_to(&self, other: &Point2) -> f64 {
        (other.y - self.y).atan2(other.x - self.x).to_degrees()
    }
}

/// How the reference heading for a waypoint is derived from its lookahead window.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TargetStrategy {
    #[serde(alias = "end")]
    Endpoint,
    #[serde(alias = "avg")]
    Average,
    #[serde(alias = "wtd_avg")]
    WeightedAverage,
}

impl TargetStrategy {
    pub const ALL: [TargetStrategy; 3] = [
        TargetStrategy::Endpoint,
        TargetStrategy::Average,
        TargetStrategy::WeightedAverage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TargetStrategy::Endpoint => "endpoint",
            TargetStrategy::Average => "average",
            TargetStrategy::WeightedAverage => "weighted_average",
        }
    }

    /// Smallest window that still yields a usable target. Bearings are only
    /// taken from the third window point onwards, so averaging needs three.
    pub fn min_lookahead(&self) -> usize {
        match self {
            TargetStrategy::Endpoint => 1,
            TargetStrategy::Average | TargetStrategy::WeightedAverage => 3,
        }
    }
}

impl fmt::Display for TargetStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetStrategy {
    type Err = TrackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "endpoint" | "end" => Ok(TargetStrategy::Endpoint),
            "average" | "avg" => Ok(TargetStrategy::Average),
            "weighted_average" | "wtd_avg" => Ok(TargetStrategy::WeightedAverage),
            other => Err(TrackError::UnknownStrategy(other.to_string())),
        }
    }
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct TargetSpec {
    pub strategy: TargetStrategy,
    pub lookahead: usize,
}

/// Inclusive waypoint index range sharing one [`TargetSpec`].
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct TargetRange {
    pub start: usize,
    pub end: usize,
    pub strategy: TargetStrategy,
    pub lookahead: usize,
}

impl TargetRange {
    pub fn spec(&self) -> TargetSpec {
        TargetSpec {
            strategy: self.strategy,
            lookahead: self.lookahead,
        }
    }

    pub fn contains(&self, index: usize) -> bool {
        self.start <= index && index <= self.end
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TrackError {
    #[error("a track needs at least 3 waypoints, got {0}")]
    TooFewWaypoints(usize),
    #[error("target range {start}..={end} is inverted")]
    InvertedRange { start: usize, end: usize },
    #[error("target range {start}..={end} overlaps the range ending at {prev_end}")]
    Overlap { start: usize, end: usize, prev_end: usize },
    #[error("no target range covers waypoints {from}..={to}")]
    Gap { from: usize, to: usize },
    #[error("target range {start}..={end} runs past the last waypoint ({last})")]
    OutOfBounds { start: usize, end: usize, last: usize },
    #[error("target range {start}..={end}: {strategy} needs a lookahead of at least {min}, got {lookahead}")]
    LookaheadTooSmall {
        start: usize,
        end: usize,
        strategy: TargetStrategy,
        lookahead: usize,
        min: usize,
    },
    #[error("target range {start}..={end}: lookahead {lookahead} exceeds the {count} waypoints of the track")]
    LookaheadTooLarge {
        start: usize,
        end: usize,
        lookahead: usize,
        count: usize,
    },
    #[error("target table was built for {table} waypoints but the track has {waypoints}")]
    CountMismatch { waypoints: usize, table: usize },
    #[error("no target range covers waypoint index {0}")]
    Uncovered(usize),
    #[error("unknown target strategy '{0}' (expected endpoint, average or weighted_average)")]
    UnknownStrategy(String),
}

/// Sorted, validated set of [`TargetRange`]s partitioning `0..waypoint_count`.
#[derive(Clone, Debug, PartialEq)]
pub struct TargetSpecTable {
    ranges: Vec<TargetRange>,
    waypoint_count: usize,
}

impl TargetSpecTable {
    /// Validates that the ranges cover every waypoint index exactly once and
    /// that each lookahead is usable for its strategy.
    pub fn new(mut ranges: Vec<TargetRange>, waypoint_count: usize) -> Result<Self, TrackError> {
        if waypoint_count < 3 {
            return Err(TrackError::TooFewWaypoints(waypoint_count));
        }
        ranges.sort_by_key(|r| r.start);

        let mut next = 0usize;
        for r in &ranges {
            if r.end < r.start {
                return Err(TrackError::InvertedRange { start: r.start, end: r.end });
            }
            if r.start < next {
                return Err(TrackError::Overlap { start: r.start, end: r.end, prev_end: next - 1 });
            }
            if r.start > next {
                return Err(TrackError::Gap { from: next, to: r.start - 1 });
            }
            if r.end >= waypoint_count {
                return Err(TrackError::OutOfBounds {
                    start: r.start,
                    end: r.end,
                    last: waypoint_count - 1,
                });
            }
            let min = r.strategy.min_lookahead();
            if r.lookahead < min {
                return Err(TrackError::LookaheadTooSmall {
                    start: r.start,
                    end: r.end,
                    strategy: r.strategy,
                    lookahead: r.lookahead,
                    min,
                });
            }
            if r.lookahead > waypoint_count {
                return Err(TrackError::LookaheadTooLarge {
                    start: r.start,
                    end: r.end,
                    lookahead: r.lookahead,
                    count: waypoint_count,
                });
            }
            next = r.end + 1;
        }
        if next < waypoint_count {
            return Err(TrackError::Gap { from: next, to: waypoint_count - 1 });
        }

        Ok(Self { ranges, waypoint_count })
    }

    /// Same spec for every waypoint.
    pub fn uniform(spec: TargetSpec, waypoint_count: usize) -> Result<Self, TrackError> {
        let end = waypoint_count.saturating_sub(1);
        Self::new(
            vec![TargetRange { start: 0, end, strategy: spec.strategy, lookahead: spec.lookahead }],
            waypoint_count,
        )
    }

    pub fn resolve(&self, index: usize) -> Result<TargetSpec, TrackError> {
        let pos = self.ranges.partition_point(|r| r.end < index);
        match self.ranges.get(pos) {
            Some(r) if r.contains(index) => Ok(r.spec()),
            _ => Err(TrackError::Uncovered(index)),
        }
    }

    pub fn ranges(&self) -> &[TargetRange] {
        &self.ranges
    }

    pub fn waypoint_count(&self) -> usize {
        self.waypoint_count
    }
}

/// On-disk track description, validated into a [`Track`].
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct TrackConfig {
    pub name: String,
    #[serde(default)]
    pub waypoints: Vec<Point2>,
    #[serde(default)]
    pub targets: Vec<TargetRange>,
}

impl TrackConfig {
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}

/// Closed loop of waypoints plus its per-waypoint target configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct Track {
    pub name: String,
    waypoints: Vec<Point2>,
    targets: TargetSpecTable,
}

impl Track {
    pub fn new(
        name: impl Into<String>,
        waypoints: Vec<Point2>,
        targets: TargetSpecTable,
    ) -> Result<Self, TrackError> {
        if waypoints.len() != targets.waypoint_count() {
            return Err(TrackError::CountMismatch {
                waypoints: waypoints.len(),
                table: targets.waypoint_count(),
            });
        }
        Ok(Self { name: name.into(), waypoints, targets })
    }

    pub fn from_config(cfg: TrackConfig) -> Result<Self, TrackError> {
        let targets = TargetSpecTable::new(cfg.targets, cfg.waypoints.len())?;
        Self::new(cfg.name, cfg.waypoints, targets)
    }

    pub fn to_config(&self) -> TrackConfig {
        TrackConfig {
            name: self.name.clone(),
            waypoints: self.waypoints.clone(),
            targets: self.targets.ranges().to_vec(),
        }
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    pub fn waypoints(&self) -> &[Point2] {
        &self.waypoints
    }

    pub fn targets(&self) -> &TargetSpecTable {
        &self.targets
    }

    /// Waypoint at `index`, wrapping past the end of the lap.
    pub fn waypoint(&self, index: usize) -> Point2 {
        self.waypoints[index % self.waypoints.len()]
    }

    /// The waypoint before `index`; the last one for index 0.
    pub fn previous(&self, index: usize) -> Point2 {
        let n = self.waypoints.len();
        self.waypoints[(index % n + n - 1) % n]
    }

    /// Reduces a simulator waypoint index, which keeps counting past one lap.
    pub fn wrap_index(&self, raw: usize) -> usize {
        raw % self.waypoints.len()
    }
}

/// Step status reported in the last trace field.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(from = "String", into = "String")]
pub enum StepStatus {
    LapComplete,
    OffTrack,
    Other(String),
}

impl StepStatus {
    pub fn as_str(&self) -> &str {
        match self {
            StepStatus::LapComplete => "lap_complete",
            StepStatus::OffTrack => "off_track",
            StepStatus::Other(s) => s,
        }
    }
}

impl From<&str> for StepStatus {
    fn from(s: &str) -> Self {
        match s {
            "lap_complete" => StepStatus::LapComplete,
            "off_track" => StepStatus::OffTrack,
            other => StepStatus::Other(other.to_string()),
        }
    }
}

impl From<String> for StepStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "lap_complete" => StepStatus::LapComplete,
            "off_track" => StepStatus::OffTrack,
            _ => StepStatus::Other(s),
        }
    }
}

impl From<StepStatus> for String {
    fn from(s: StepStatus) -> Self {
        match s {
            StepStatus::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One simulation step of a completed episode.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Sample {
    pub episode: u32,
    pub step: u32,
    pub x: f64,
    pub y: f64,
    pub heading: f64,
    pub steering: f64,
    pub speed: f64,
    pub action: i64,
    pub reward: f64,
    pub job_completed: bool,
    pub all_wheels_on_track: bool,
    pub progress: f64,
    /// Already reduced modulo the track's waypoint count.
    pub closest_waypoint: usize,
    pub track_length: f64,
    pub time: f64,
    pub status: StepStatus,
    pub best_heading: f64,
    pub direction_diff: f64,
}

impl Sample {
    pub fn position(&self) -> Point2 {
        Point2::new(self.x, self.y)
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Episode {
    pub episode: u32,
    #[serde(default)]
    pub samples: Vec<Sample>,
}

impl Episode {
    pub fn lap_time(&self) -> f64 {
        match (self.samples.first(), self.samples.last()) {
            (Some(a), Some(b)) => b.time - a.time,
            _ => 0.0,
        }
    }

    pub fn steps(&self) -> u32 {
        self.samples.last().map(|s| s.step).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(start: usize, end: usize, strategy: TargetStrategy, lookahead: usize) -> TargetRange {
        TargetRange { start, end, strategy, lookahead }
    }

    #[test]
    fn test_resolve_finds_containing_range() {
        let table = TargetSpecTable::new(
            vec![
                range(5, 9, TargetStrategy::WeightedAverage, 4),
                range(0, 4, TargetStrategy::Average, 3),
            ],
            10,
        )
        .unwrap();

        assert_eq!(table.resolve(0).unwrap().strategy, TargetStrategy::Average);
        assert_eq!(table.resolve(4).unwrap().strategy, TargetStrategy::Average);
        assert_eq!(table.resolve(5).unwrap().strategy, TargetStrategy::WeightedAverage);
        assert_eq!(table.resolve(9).unwrap().lookahead, 4);
        assert_eq!(table.resolve(10), Err(TrackError::Uncovered(10)));
    }

    #[test]
    fn test_gaps_and_overlaps_are_rejected() {
        let gap = TargetSpecTable::new(
            vec![
                range(0, 3, TargetStrategy::Endpoint, 2),
                range(5, 9, TargetStrategy::Endpoint, 2),
            ],
            10,
        );
        assert_eq!(gap, Err(TrackError::Gap { from: 4, to: 4 }));

        let tail = TargetSpecTable::new(vec![range(0, 7, TargetStrategy::Endpoint, 2)], 10);
        assert_eq!(tail, Err(TrackError::Gap { from: 8, to: 9 }));

        let overlap = TargetSpecTable::new(
            vec![
                range(0, 5, TargetStrategy::Endpoint, 2),
                range(5, 9, TargetStrategy::Endpoint, 2),
            ],
            10,
        );
        assert!(matches!(overlap, Err(TrackError::Overlap { start: 5, .. })));

        let past_end = TargetSpecTable::new(vec![range(0, 10, TargetStrategy::Endpoint, 2)], 10);
        assert!(matches!(past_end, Err(TrackError::OutOfBounds { .. })));
    }

    #[test]
    fn test_lookahead_limits() {
        let small = TargetSpecTable::new(vec![range(0, 4, TargetStrategy::Average, 2)], 5);
        assert!(matches!(small, Err(TrackError::LookaheadTooSmall { min: 3, .. })));

        let large = TargetSpecTable::new(vec![range(0, 4, TargetStrategy::Endpoint, 6)], 5);
        assert!(matches!(large, Err(TrackError::LookaheadTooLarge { count: 5, .. })));
    }

    #[test]
    fn test_strategy_tags() {
        assert_eq!("avg".parse::<TargetStrategy>().unwrap(), TargetStrategy::Average);
        assert_eq!("wtd_avg".parse::<TargetStrategy>().unwrap(), TargetStrategy::WeightedAverage);
        assert_eq!("endpoint".parse::<TargetStrategy>().unwrap(), TargetStrategy::Endpoint);
        assert_eq!(
            "median".parse::<TargetStrategy>(),
            Err(TrackError::UnknownStrategy("median".into()))
        );

        let r: TargetRange =
            serde_json::from_str(r#"{"start":0,"end":3,"strategy":"end","lookahead":2}"#).unwrap();
        assert_eq!(r.strategy, TargetStrategy::Endpoint);
        let bad = serde_json::from_str::<TargetRange>(
            r#"{"start":0,"end":3,"strategy":"mean","lookahead":2}"#,
        );
        assert!(bad.is_err());
    }

    #[test]
    fn test_track_wraps_indices() {
        let cfg = TrackConfig::from_json_str(
            r#"{
                "name": "square",
                "waypoints": [{"x":0,"y":0},{"x":1,"y":0},{"x":1,"y":1},{"x":0,"y":1}],
                "targets": [{"start":0,"end":3,"strategy":"endpoint","lookahead":2}]
            }"#,
        )
        .unwrap();
        let track = Track::from_config(cfg).unwrap();

        assert_eq!(track.len(), 4);
        assert_eq!(track.previous(0), Point2::new(0.0, 1.0));
        assert_eq!(track.previous(2), Point2::new(1.0, 0.0));
        assert_eq!(track.waypoint(5), Point2::new(1.0, 0.0));
        assert_eq!(track.wrap_index(73), 1);
        assert_eq!(track.to_config().targets.len(), 1);
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(StepStatus::from("lap_complete"), StepStatus::LapComplete);
        assert_eq!(StepStatus::from("off_track"), StepStatus::OffTrack);
        assert_eq!(StepStatus::from("in_progress"), StepStatus::Other("in_progress".into()));
        assert_eq!(String::from(StepStatus::OffTrack), "off_track");
        assert_eq!(StepStatus::Other("crashed".into()).to_string(), "crashed");
    }

    #[test]
    fn test_bearing_and_distance() {
        let a = Point2::new(0.0, 0.0);
        assert!((a.bearing_to(&Point2::new(0.0, 1.0)) - 90.0).abs() < 1e-12);
        assert!((a.bearing_to(&Point2::new(-1.0, -1.0)) + 135.0).abs() < 1e-12);
        assert!((a.distance_to(&Point2::new(3.0, 4.0)) - 5.0).abs() < 1e-12);
    }
}
