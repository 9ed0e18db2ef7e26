use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use analysis::{plot_points, summarize, AngleMean, TargetGenerator, TargetLine, TargetOptions};
use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use ingest::{sniff_log_file, ParsedLog, SimLogParser};
use model::{Point2, TargetStrategy, Track};
use tracing::{info, warn};

use crate::render::{self, AnglePanel};

/// Rejects files that are not simulation logs before any parsing starts.
fn log_file(s: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(s);
    sniff_log_file(&path).map_err(|e| e.to_string())?;
    Ok(path)
}

#[derive(clap::Args, Debug)]
pub struct TrackArgs {
    /// Built-in track name or path to a track JSON file
    #[arg(long, default_value = iox::DEFAULT_TRACK)]
    pub track: String,

    /// Average bearings without unwrapping across 0°/360°, as older reference
    /// tables were generated
    #[arg(long)]
    pub naive_mean: bool,
}

impl TrackArgs {
    fn load(&self) -> Result<Track> {
        iox::resolve_track(&self.track)
    }

    fn options(&self) -> TargetOptions {
        TargetOptions {
            mean: if self.naive_mean { AngleMean::Naive } else { AngleMean::Unwrapped },
            ..TargetOptions::default()
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Csv,
    Ndjson,
}

#[derive(clap::Args, Debug)]
pub struct SummaryArgs {
    /// Simulation log containing 'SIM_TRACE_LOG' and 'Reset' lines
    #[arg(value_parser = log_file)]
    pub log: PathBuf,

    #[command(flatten)]
    pub track: TrackArgs,

    /// Where to write the sample table (defaults to the log path with a .csv extension)
    #[arg(long)]
    pub export: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = ExportFormat::Csv)]
    pub format: ExportFormat,

    /// Skip writing the sample table
    #[arg(long)]
    pub no_export: bool,

    /// Print one line per completed lap
    #[arg(long)]
    pub laps: bool,

    /// Print the summary as JSON
    #[arg(long)]
    pub json: bool,
}

fn parse_log(track: &Track, options: TargetOptions, log: &Path) -> Result<ParsedLog> {
    let table = TargetGenerator::new(track, options).reference_table()?;
    let parsed = SimLogParser::new(&table)
        .parse_file(log)
        .with_context(|| format!("parse {}", log.display()))?;
    Ok(parsed)
}

pub fn summary(args: SummaryArgs) -> Result<()> {
    let track = args.track.load()?;
    let parsed = parse_log(&track, args.track.options(), &args.log)?;
    let report = summarize(&parsed.episodes, parsed.off_track);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report.to_json()?)?);
    } else {
        print!("{report}");
        if args.laps {
            for ep in &parsed.episodes {
                println!(
                    "episode: {}, steps: {}, lap_time={:.3}",
                    ep.episode,
                    ep.steps(),
                    ep.lap_time()
                );
            }
        }
    }

    if parsed.episodes.is_empty() {
        warn!(log = %args.log.display(), "no completed laps, nothing exported");
        return Ok(());
    }
    if args.no_export {
        return Ok(());
    }
    let path = args.export.unwrap_or_else(|| match args.format {
        ExportFormat::Csv => iox::default_export_path(&args.log),
        ExportFormat::Ndjson => args.log.with_extension("ndjson"),
    });
    let rows = match args.format {
        ExportFormat::Csv => iox::export_csv(&parsed.episodes, &path)?,
        ExportFormat::Ndjson => iox::export_ndjson(&parsed.episodes, &path)?,
    };
    eprintln!("exported {} samples to {}", rows, path.display());
    Ok(())
}

#[derive(clap::Args, Debug)]
pub struct TargetsArgs {
    #[command(flatten)]
    pub track: TrackArgs,

    /// Print the reference table as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn targets(args: TargetsArgs) -> Result<()> {
    let track = args.track.load()?;
    let gen = TargetGenerator::new(&track, args.track.options());
    let lines = gen.reference_lines()?;
    let table = gen.reference_table()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&table)?);
        return Ok(());
    }
    println!("{} ({} waypoints)", track.name, track.len());
    println!(
        "{:>5}  {:<16} {:>4}  {:>10} {:>10}  {:>9}",
        "idx", "strategy", "n", "target_x", "target_y", "heading"
    );
    for l in &lines {
        println!(
            "{:>5}  {:<16} {:>4}  {:>10.5} {:>10.5}  {:>9.3}",
            l.index, l.spec.strategy, l.spec.lookahead, l.target.x, l.target.y, l.heading
        );
    }
    Ok(())
}

/// Heatmap colouring. The empty string selects target-angle diagrams instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeatmapMode {
    Off,
    Speed,
    Reward,
}

impl FromStr for HeatmapMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "" => Ok(HeatmapMode::Off),
            "speed" => Ok(HeatmapMode::Speed),
            "reward" => Ok(HeatmapMode::Reward),
            _ => Err(format!("invalid heatmap '{s}', value must be '', 'Reward' or 'Speed'")),
        }
    }
}

impl fmt::Display for HeatmapMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HeatmapMode::Off => "",
            HeatmapMode::Speed => "speed",
            HeatmapMode::Reward => "reward",
        })
    }
}

#[derive(clap::Args, Debug)]
pub struct PlotArgs {
    /// Simulation log; without it the static reference targets are drawn
    #[arg(value_parser = log_file)]
    pub log: Option<PathBuf>,

    #[command(flatten)]
    pub track: TrackArgs,

    /// '', 'speed' or 'reward' (case-insensitive)
    #[arg(long, default_value = "", value_parser = HeatmapMode::from_str)]
    pub heatmap: HeatmapMode,

    /// Diagrams per page
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
    pub group: u16,

    /// Draw the endpoint, average and weighted average targets on every diagram
    #[arg(long)]
    pub show_all: bool,

    /// Draw only the lookahead window, without target lines. Overrides --show-all
    #[arg(long)]
    pub hide_angles: bool,

    /// Output directory
    #[arg(long, default_value = "plots")]
    pub out: PathBuf,
}

pub fn plot(args: PlotArgs) -> Result<()> {
    let track = args.track.load()?;
    let options = args.track.options();
    std::fs::create_dir_all(&args.out)
        .with_context(|| format!("create {}", args.out.display()))?;

    let parsed = match &args.log {
        Some(log) => Some(parse_log(&track, options, log)?),
        None => None,
    };

    if args.heatmap != HeatmapMode::Off {
        let Some(parsed) = parsed else {
            bail!("a {} heatmap needs a log file", args.heatmap);
        };
        let points = plot_points(&parsed.episodes);
        if points.is_empty() {
            warn!("no completed laps, nothing to plot");
            return Ok(());
        }
        let path = args.out.join(format!("{}_heatmap.svg", args.heatmap));
        render::draw_heatmap(&path, &track, &points, args.heatmap)?;
        info!(path = %path.display(), points = points.len(), "wrote heatmap");
        eprintln!("wrote {}", path.display());
        return Ok(());
    }

    let gen = TargetGenerator::new(&track, options);
    let lines: Vec<TargetLine> = match &parsed {
        Some(p) => p
            .episodes
            .iter()
            .flat_map(|ep| ep.samples.iter())
            .map(|s| gen.from_position(s.closest_waypoint, s.position()))
            .collect::<Result<_, _>>()?,
        None => gen.reference_lines()?,
    };
    if lines.is_empty() {
        warn!("no completed laps, nothing to plot");
        return Ok(());
    }

    let panels: Vec<AnglePanel> = lines
        .into_iter()
        .map(|line| AnglePanel {
            targets: panel_targets(&gen, &line, args.show_all, args.hide_angles),
            line,
        })
        .collect();

    let group = usize::from(args.group);
    let pages = panels.len().div_ceil(group);
    for (page, chunk) in panels.chunks(group).enumerate() {
        let path = args.out.join(format!("angles_{:04}.svg", page));
        render::draw_angle_page(&path, &track, chunk)?;
    }
    info!(pages, panels = panels.len(), out = %args.out.display(), "wrote angle diagrams");
    eprintln!("wrote {} pages to {}", pages, args.out.display());
    Ok(())
}

fn panel_targets(
    gen: &TargetGenerator<'_>,
    line: &TargetLine,
    show_all: bool,
    hide_angles: bool,
) -> Vec<(TargetStrategy, Point2, f64)> {
    if hide_angles {
        vec![]
    } else if show_all {
        gen.candidates(line)
    } else {
        vec![(line.spec.strategy, line.target, line.heading)]
    }
}
