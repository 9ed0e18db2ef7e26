use model::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::angles::{self, AngleMean};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TargetError {
    #[error(transparent)]
    Track(#[from] TrackError),
    #[error("{strategy} at waypoint {index} has no bearings to average (lookahead {lookahead})")]
    NoBearings {
        index: usize,
        strategy: TargetStrategy,
        lookahead: usize,
    },
    #[error("mismatch size: {waypoints} waypoints but {targets} target points")]
    CountMismatch { waypoints: usize, targets: usize },
    #[error("reference table has no target points")]
    Empty,
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
pub struct TargetOptions {
    /// Exponent applied to the bearing position for weighted averages.
    pub weight_power: f64,
    pub mean: AngleMean,
}

impl Default for TargetOptions {
    fn default() -> Self {
        Self { weight_power: 2.0, mean: AngleMean::Unwrapped }
    }
}

/// Waypoint indices `start, start+1, ..` of length `lookahead`, wrapping past
/// the end of the lap.
pub fn window_indices(start: usize, lookahead: usize, count: usize) -> Vec<usize> {
    (0..lookahead).map(|k| (start + k) % count).collect()
}

/// Everything computed for one waypoint: the window, the bearings it yielded
/// and the resulting target.
#[derive(Clone, Serialize, Debug, PartialEq)]
pub struct TargetLine {
    pub index: usize,
    pub spec: TargetSpec,
    /// Position the bearings are measured from.
    pub origin: Point2,
    pub window: Vec<Point2>,
    pub window_indices: Vec<usize>,
    /// Unsigned bearings to the window points from the third onwards.
    pub bearings: Vec<f64>,
    /// Distance from `origin` to the last window point.
    pub length: f64,
    pub target: Point2,
    /// Signed heading from `origin` to `target`.
    pub heading: f64,
}

impl TargetLine {
    pub fn last_point(&self) -> Point2 {
        self.window[self.window.len() - 1]
    }
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
pub struct TargetPoint {
    pub index: usize,
    pub point: Point2,
    pub heading: f64,
}

/// One target point per waypoint, consulted read-only while annotating samples.
#[derive(Clone, Serialize, Debug, PartialEq)]
pub struct ReferenceTable {
    targets: Vec<TargetPoint>,
}

impl ReferenceTable {
    pub fn new(targets: Vec<TargetPoint>, waypoints: usize) -> Result<Self, TargetError> {
        if waypoints == 0 {
            return Err(TargetError::Empty);
        }
        if targets.len() != waypoints {
            return Err(TargetError::CountMismatch { waypoints, targets: targets.len() });
        }
        Ok(Self { targets })
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn targets(&self) -> &[TargetPoint] {
        &self.targets
    }

    pub fn get(&self, waypoint: usize) -> Option<&TargetPoint> {
        self.targets.get(waypoint)
    }

    /// Signed bearing from `position` to the target of `waypoint`.
    pub fn best_heading(&self, waypoint: usize, position: Point2) -> f64 {
        let target = &self.targets[waypoint % self.targets.len()];
        position.bearing_to(&target.point)
    }

    /// Fills `best_heading` and `direction_diff` from the sample's position,
    /// heading and (already reduced) closest waypoint.
    pub fn annotate(&self, sample: &mut Sample) {
        let best = self.best_heading(sample.closest_waypoint, sample.position());
        sample.best_heading = best;
        sample.direction_diff = angles::direction_diff(sample.heading, best);
    }
}

pub struct TargetGenerator<'a> {
    track: &'a Track,
    options: TargetOptions,
}

impl<'a> TargetGenerator<'a> {
    pub fn new(track: &'a Track, options: TargetOptions) -> Self {
        Self { track, options }
    }

    pub fn track(&self) -> &Track {
        self.track
    }

    /// Target for waypoint `index` seen from `origin`.
    pub fn target_for(&self, index: usize, origin: Point2) -> Result<TargetLine, TargetError> {
        let spec = self.track.targets().resolve(index)?;
        let window_indices = window_indices(index, spec.lookahead, self.track.len());
        let window: Vec<Point2> = window_indices.iter().map(|&i| self.track.waypoint(i)).collect();
        let bearings: Vec<f64> = window
            .iter()
            .skip(2)
            .map(|p| angles::to_unsigned(origin.bearing_to(p)))
            .collect();
        let last = window[window.len() - 1];
        let length = origin.distance_to(&last);

        let (target, heading) = self
            .resolve_strategy(spec.strategy, origin, last, length, &bearings)
            .ok_or(TargetError::NoBearings {
                index,
                strategy: spec.strategy,
                lookahead: spec.lookahead,
            })?;

        Ok(TargetLine {
            index,
            spec,
            origin,
            window,
            window_indices,
            bearings,
            length,
            target,
            heading,
        })
    }

    /// Target for a logged car position; `raw_index` may run past one lap.
    pub fn from_position(
        &self,
        raw_index: usize,
        position: Point2,
    ) -> Result<TargetLine, TargetError> {
        self.target_for(self.track.wrap_index(raw_index), position)
    }

    /// Target using the previous waypoint as a stand-in for the car.
    pub fn static_line(&self, index: usize) -> Result<TargetLine, TargetError> {
        self.target_for(index, self.track.previous(index))
    }

    pub fn reference_lines(&self) -> Result<Vec<TargetLine>, TargetError> {
        (0..self.track.len()).map(|i| self.static_line(i)).collect()
    }

    pub fn reference_table(&self) -> Result<ReferenceTable, TargetError> {
        let lines = self.reference_lines()?;
        let targets: Vec<TargetPoint> = lines
            .iter()
            .map(|l| TargetPoint { index: l.index, point: l.target, heading: l.heading })
            .collect();
        debug!(
            track = %self.track.name,
            targets = targets.len(),
            mean = ?self.options.mean,
            "built reference table"
        );
        ReferenceTable::new(targets, self.track.len())
    }

    /// The target each strategy would produce for `line`'s window, whichever
    /// strategy the line was configured with.
    pub fn candidates(&self, line: &TargetLine) -> Vec<(TargetStrategy, Point2, f64)> {
        TargetStrategy::ALL
            .iter()
            .filter_map(|&s| {
                let last = line.last_point();
                self.resolve_strategy(s, line.origin, last, line.length, &line.bearings)
                    .map(|(p, h)| (s, p, h))
            })
            .collect()
    }

    fn resolve_strategy(
        &self,
        strategy: TargetStrategy,
        origin: Point2,
        last: Point2,
        length: f64,
        bearings: &[f64],
    ) -> Option<(Point2, f64)> {
        let mean = match strategy {
            TargetStrategy::Endpoint => return Some((last, origin.bearing_to(&last))),
            TargetStrategy::Average => angles::average(bearings, self.options.mean)?,
            TargetStrategy::WeightedAverage => {
                angles::weighted_average(bearings, self.options.weight_power, self.options.mean)?
            }
        };
        let heading = angles::to_signed(mean);
        Some((project(origin, heading, length), heading))
    }
}

/// Point `length` away from `origin` along the signed `heading`.
pub fn project(origin: Point2, heading: f64, length: f64) -> Point2 {
    let rad = heading.to_radians();
    Point2::new(origin.x + length * rad.cos(), origin.y + length * rad.sin())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(strategy: TargetStrategy, lookahead: usize) -> Track {
        let waypoints = vec![
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(1.0, 1.0),
            Point2::new(0.0, 1.0),
        ];
        let table = TargetSpecTable::uniform(TargetSpec { strategy, lookahead }, 4).unwrap();
        Track::new("square", waypoints, table).unwrap()
    }

    fn line_track(n: usize, strategy: TargetStrategy, lookahead: usize) -> Track {
        let waypoints = (0..n).map(|i| Point2::new(i as f64, 0.0)).collect();
        let table = TargetSpecTable::uniform(TargetSpec { strategy, lookahead }, n).unwrap();
        Track::new("line", waypoints, table).unwrap()
    }

    #[test]
    fn test_window_wraps_at_lap_end() {
        assert_eq!(window_indices(4, 3, 5), vec![4, 0, 1]);
        assert_eq!(window_indices(1, 3, 5), vec![1, 2, 3]);
        assert_eq!(window_indices(3, 5, 5), vec![3, 4, 0, 1, 2]);
    }

    #[test]
    fn test_endpoint_on_unit_square() {
        let track = square(TargetStrategy::Endpoint, 2);
        let gen = TargetGenerator::new(&track, TargetOptions::default());

        let line = gen.static_line(0).unwrap();
        assert_eq!(line.window_indices, vec![0, 1]);
        assert_eq!(line.origin, Point2::new(0.0, 1.0));
        assert_eq!(line.target, Point2::new(1.0, 0.0));
        assert!((line.heading + 45.0).abs() < 1e-9);
        assert!(line.bearings.is_empty());

        let table = gen.reference_table().unwrap();
        assert_eq!(table.len(), track.len());
        assert_eq!(table.get(3).unwrap().point, Point2::new(0.0, 0.0));
    }

    #[test]
    fn test_last_index_window_uses_lap_start() {
        let track = line_track(5, TargetStrategy::Endpoint, 3);
        let gen = TargetGenerator::new(&track, TargetOptions::default());
        let line = gen.static_line(4).unwrap();
        assert_eq!(line.window_indices, vec![4, 0, 1]);
        assert_eq!(line.target, Point2::new(1.0, 0.0));
        assert_eq!(line.origin, Point2::new(3.0, 0.0));
    }

    #[test]
    fn test_average_projects_to_farthest_distance() {
        // from the centre, waypoints 2 and 3 sit at 45° and 135°
        let track = square(TargetStrategy::Average, 4);
        let gen = TargetGenerator::new(&track, TargetOptions::default());
        let line = gen.target_for(0, Point2::new(0.5, 0.5)).unwrap();
        assert_eq!(line.window_indices, vec![0, 1, 2, 3]);
        assert_eq!(line.bearings.len(), 2);
        assert!((line.bearings[0] - 45.0).abs() < 1e-9);
        assert!((line.bearings[1] - 135.0).abs() < 1e-9);
        assert!((line.heading - 90.0).abs() < 1e-9);
        let expected = project(Point2::new(0.5, 0.5), 90.0, 0.5f64.sqrt());
        assert!((line.target.x - expected.x).abs() < 1e-12);
        assert!((line.target.y - expected.y).abs() < 1e-12);
        assert!((line.length - 0.5f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_weighted_average_leans_to_far_points() {
        let track = square(TargetStrategy::WeightedAverage, 4);
        let gen = TargetGenerator::new(&track, TargetOptions::default());
        let line = gen.target_for(0, Point2::new(0.5, 0.5)).unwrap();
        // weights 0 and 1: all weight on the last bearing
        assert!((line.heading - 135.0).abs() < 1e-9);
    }

    #[test]
    fn test_heading_is_signed_after_averaging() {
        // origin below the track so bearings land around 300°
        let track = line_track(6, TargetStrategy::Average, 4);
        let gen = TargetGenerator::new(&track, TargetOptions::default());
        let line = gen.target_for(0, Point2::new(0.0, 3.0)).unwrap();
        assert!(line.heading < 0.0 && line.heading > -90.0);
    }

    #[test]
    fn test_candidates_cover_all_strategies() {
        let track = square(TargetStrategy::Average, 4);
        let gen = TargetGenerator::new(&track, TargetOptions::default());
        let line = gen.static_line(1).unwrap();
        let c = gen.candidates(&line);
        assert_eq!(c.len(), 3);
        let avg = c.iter().find(|(s, _, _)| *s == TargetStrategy::Average).unwrap();
        assert_eq!(avg.1, line.target);
    }

    #[test]
    fn test_from_position_reduces_raw_index() {
        let track = line_track(5, TargetStrategy::Endpoint, 2);
        let gen = TargetGenerator::new(&track, TargetOptions::default());
        let line = gen.from_position(7, Point2::new(0.0, 0.0)).unwrap();
        assert_eq!(line.index, 2);
        assert_eq!(line.target, Point2::new(3.0, 0.0));
    }

    #[test]
    fn test_reference_table_size_is_checked() {
        let t = vec![TargetPoint { index: 0, point: Point2::new(0.0, 0.0), heading: 0.0 }];
        assert_eq!(
            ReferenceTable::new(t, 2),
            Err(TargetError::CountMismatch { waypoints: 2, targets: 1 })
        );
    }

    #[test]
    fn test_reference_table_rejects_empty() {
        assert_eq!(ReferenceTable::new(vec![], 0), Err(TargetError::Empty));
    }

    #[test]
    fn test_annotate_sample() {
        let track = square(TargetStrategy::Endpoint, 2);
        let table = TargetGenerator::new(&track, TargetOptions::default())
            .reference_table()
            .unwrap();
        let mut s = Sample {
            episode: 1,
            step: 1,
            x: 0.0,
            y: 0.0,
            heading: 179.0,
            steering: 0.0,
            speed: 1.0,
            action: 0,
            reward: 1.0,
            job_completed: false,
            all_wheels_on_track: true,
            progress: 0.0,
            closest_waypoint: 2,
            track_length: 4.0,
            time: 0.0,
            status: StepStatus::Other("in_progress".into()),
            best_heading: 0.0,
            direction_diff: 0.0,
        };
        // target of waypoint 2 is waypoint 3 at (0,1): straight up
        table.annotate(&mut s);
        assert!((s.best_heading - 90.0).abs() < 1e-9);
        assert!((s.direction_diff - 89.0).abs() < 1e-9);
    }
}
