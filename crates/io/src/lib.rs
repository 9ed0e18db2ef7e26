use anyhow::{bail, Context, Result};
use std::io::{BufRead, Write};
use std::{fs::File, path::{Path, PathBuf}};
use model::*;
use tracing::info;

/// Tracks shipped with the tool, as JSON `TrackConfig` documents.
pub const BUILTIN_TRACKS: &[(&str, &str)] = &[
    ("reinvent2018", include_str!("../tracks/reinvent2018.json")),
];

pub const DEFAULT_TRACK: &str = "reinvent2018";

pub fn builtin_track(name: &str) -> Result<Track> {
    let Some((_, json)) = BUILTIN_TRACKS.iter().find(|(n, _)| n.eq_ignore_ascii_case(name)) else {
        let known: Vec<&str> = BUILTIN_TRACKS.iter().map(|(n, _)| *n).collect();
        bail!("unknown track '{}' (built-in tracks: {})", name, known.join(", "));
    };
    parse_track(json).with_context(|| format!("built-in track {}", name))
}

pub fn load_track(path: &Path) -> Result<Track> {
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("read track {}", path.display()))?;
    parse_track(&s).with_context(|| format!("track file {}", path.display()))
}

/// A built-in track name, or else a path to a track JSON file.
pub fn resolve_track(arg: &str) -> Result<Track> {
    if BUILTIN_TRACKS.iter().any(|(n, _)| n.eq_ignore_ascii_case(arg)) {
        return builtin_track(arg);
    }
    let path = Path::new(arg);
    if !path.is_file() {
        bail!("'{}' is neither a built-in track nor a track file", arg);
    }
    load_track(path)
}

fn parse_track(json: &str) -> Result<Track> {
    let cfg = TrackConfig::from_json_str(json)?;
    Ok(Track::from_config(cfg)?)
}

pub fn save_track(track: &Track, path: &Path) -> Result<()> {
    let f = File::create(path)?;
    let mut w = std::io::BufWriter::new(f);
    serde_json::to_writer_pretty(&mut w, &track.to_config())?;
    w.flush()?;
    Ok(())
}

/// Export next to the log: same stem, `.csv` extension.
pub fn default_export_path(log: &Path) -> PathBuf {
    log.with_extension("csv")
}

/// Writes one row per sample. Returns the row count; nothing is created when
/// there are no samples.
pub fn export_csv(episodes: &[Episode], path: &Path) -> Result<usize> {
    let rows = sample_count(episodes);
    if rows == 0 {
        return Ok(0);
    }
    let mut w = csv::Writer::from_path(path)
        .with_context(|| format!("create {}", path.display()))?;
    for ep in episodes {
        for s in &ep.samples {
            w.serialize(s)?;
        }
    }
    w.flush()?;
    info!(path = %path.display(), rows, "exported samples");
    Ok(rows)
}

/// Reads rows written by [`export_csv`], regrouping consecutive rows of the
/// same episode.
pub fn import_csv(path: &Path) -> Result<Vec<Episode>> {
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("open {}", path.display()))?;
    let mut episodes = Vec::<Episode>::new();
    let mut current: Option<Episode> = None;
    for rec in rdr.deserialize() {
        let s: Sample = rec?;
        if current.as_ref().map(|e| e.episode) != Some(s.episode) {
            if let Some(e) = current.take() { episodes.push(e); }
            current = Some(Episode { episode: s.episode, samples: vec![] });
        }
        if let Some(e) = &mut current {
            e.samples.push(s);
        }
    }
    if let Some(e) = current.take() { episodes.push(e); }
    Ok(episodes)
}

pub fn export_ndjson(episodes: &[Episode], path: &Path) -> Result<usize> {
    let rows = sample_count(episodes);
    if rows == 0 {
        return Ok(0);
    }
    let f = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut w = std::io::BufWriter::new(f);
    for ep in episodes {
        let s = serde_json::to_string(ep)?;
        writeln!(w, "{}", s)?;
    }
    w.flush()?;
    info!(path = %path.display(), episodes = episodes.len(), "exported episodes");
    Ok(rows)
}

pub fn import_ndjson(path: &Path) -> Result<Vec<Episode>> {
    let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let rdr = std::io::BufReader::new(f);
    let mut episodes = vec![];
    for line in rdr.lines() {
        let s = line?;
        if s.trim().is_empty() {
            continue;
        }
        episodes.push(serde_json::from_str(&s)?);
    }
    Ok(episodes)
}

fn sample_count(episodes: &[Episode]) -> usize {
    episodes.iter().map(|e| e.samples.len()).sum()
}
