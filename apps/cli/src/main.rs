mod commands;
mod render;

use clap::{Parser, Subcommand};
use commands::{PlotArgs, SummaryArgs, TargetsArgs};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Analyse AWS DeepRacer simulation logs", long_about = None)]
pub struct Args {
    /// Log verbosity (-v info, -vv debug, -vvv trace). RUST_LOG overrides it.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Parse a log, report lap statistics and export the samples
    Summary(SummaryArgs),
    /// Print the per-waypoint reference targets of a track
    Targets(TargetsArgs),
    /// Render heatmaps or target-angle diagrams as SVG
    Plot(PlotArgs),
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    match args.command {
        Command::Summary(a) => commands::summary(a),
        Command::Targets(a) => commands::targets(a),
        Command::Plot(a) => commands::plot(a),
    }
}
