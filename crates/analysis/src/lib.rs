//! Target geometry, angle math and lap aggregation over parsed simulation logs.

pub mod angles;
pub mod summary;
pub mod targets;

pub use angles::{direction_diff, AngleMean};
pub use summary::{plot_points, summarize, LapStat, MetricStats, PlotPoint, RunSummary};
pub use targets::{
    project, window_indices, ReferenceTable, TargetError, TargetGenerator, TargetLine,
    TargetOptions, TargetPoint,
};
