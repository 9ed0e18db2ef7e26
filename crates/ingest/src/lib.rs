//! Rebuilds completed-lap episodes from a DeepRacer simulation log.
//!
//! The log is free text; an episode starts at a `Reset agent` line and each
//! step is a `SIM_TRACE_LOG:` line carrying 16 comma separated fields. Only
//! episodes ending in `lap_complete` are kept.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

use analysis::ReferenceTable;
use model::{Episode, Sample, StepStatus};
use tracing::{debug, info, trace};

pub const RESET_MARKER: &str = "Reset agent";
pub const TRACE_MARKER: &str = "SIM_TRACE_LOG:";

/// Trace payload layout, in log order.
pub const FIELD_NAMES: [&str; 16] = [
    "episode",
    "step",
    "x",
    "y",
    "heading",
    "steering",
    "speed",
    "action",
    "reward",
    "job_completed",
    "all_wheels_on_track",
    "progress",
    "closest_waypoint",
    "track_length",
    "time",
    "status",
];

const STATUS: usize = 15;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("line {line}: expected {expected} trace fields, found {found}")]
    FieldCount { line: usize, expected: usize, found: usize },
    #[error("line {line}: field '{field}' is not a number: '{value}'")]
    Number { line: usize, field: &'static str, value: String },
    #[error("line {line}: field '{field}' must be 'True' or 'False', got '{value}'")]
    Boolean { line: usize, field: &'static str, value: String },
    #[error("'{path}' is an invalid log file: {reason}")]
    InvalidLogFile { path: String, reason: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Maps the simulator's boolean spelling. Anything else means the log is corrupt.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "True" => Some(true),
        "False" => Some(false),
        _ => None,
    }
}

/// Checks that `path` is a file that looks like a simulation log before any
/// parsing is attempted.
pub fn sniff_log_file(path: &Path) -> Result<(), IngestError> {
    let invalid = |reason: &str| IngestError::InvalidLogFile {
        path: path.display().to_string(),
        reason: reason.to_string(),
    };
    if !path.is_file() {
        return Err(invalid("not a file"));
    }
    let contains = |line: &[u8], needle: &[u8]| line.windows(needle.len()).any(|w| w == needle);
    let mut reader = BufReader::new(File::open(path)?);
    let mut line = Vec::new();
    let (mut trace_seen, mut reset_seen) = (false, false);
    while reader.read_until(b'\n', &mut line)? > 0 {
        trace_seen |= contains(&line, b"SIM_TRACE_LOG");
        reset_seen |= contains(&line, b"Reset");
        if trace_seen && reset_seen {
            return Ok(());
        }
        line.clear();
    }
    Err(invalid("should contain the key words 'SIM_TRACE_LOG' and 'Reset'"))
}

/// One buffered trace line: field count checked, values still text.
#[derive(Clone, Debug)]
struct RawRecord {
    line: usize,
    fields: Vec<String>,
    status: StepStatus,
}

impl RawRecord {
    /// `None` when the line carries no trace payload.
    fn parse(text: &str, line: usize) -> Result<Option<Self>, IngestError> {
        let Some((_, payload)) = text.split_once(TRACE_MARKER) else {
            return Ok(None);
        };
        let fields: Vec<String> = payload.trim().split(',').map(str::to_string).collect();
        if fields.len() != FIELD_NAMES.len() {
            return Err(IngestError::FieldCount {
                line,
                expected: FIELD_NAMES.len(),
                found: fields.len(),
            });
        }
        let status = StepStatus::from(fields[STATUS].as_str());
        Ok(Some(Self { line, fields, status }))
    }

    fn raw(&self, idx: usize) -> &str {
        &self.fields[idx]
    }

    fn float(&self, idx: usize) -> Result<f64, IngestError> {
        f64::from_str(self.raw(idx)).map_err(|_| self.number_error(idx))
    }

    /// Integer field; a float spelling with no fractional part is accepted.
    fn int<T: TryFrom<i64>>(&self, idx: usize) -> Result<T, IngestError> {
        let raw = self.raw(idx);
        let v = match i64::from_str(raw) {
            Ok(v) => v,
            Err(_) => match f64::from_str(raw) {
                Ok(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => f as i64,
                _ => return Err(self.number_error(idx)),
            },
        };
        T::try_from(v).map_err(|_| self.number_error(idx))
    }

    fn boolean(&self, idx: usize) -> Result<bool, IngestError> {
        parse_bool(self.raw(idx)).ok_or_else(|| IngestError::Boolean {
            line: self.line,
            field: FIELD_NAMES[idx],
            value: self.raw(idx).to_string(),
        })
    }

    fn number_error(&self, idx: usize) -> IngestError {
        IngestError::Number {
            line: self.line,
            field: FIELD_NAMES[idx],
            value: self.raw(idx).to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParsedLog {
    pub episodes: Vec<Episode>,
    pub off_track: usize,
    /// Episodes still open when the log ended. Diagnostic only.
    pub abandoned: usize,
}

enum State {
    Idle,
    InEpisode(Vec<RawRecord>),
}

pub struct SimLogParser<'a> {
    reference: &'a ReferenceTable,
}

impl<'a> SimLogParser<'a> {
    pub fn new(reference: &'a ReferenceTable) -> Self {
        Self { reference }
    }

    pub fn parse_file(&self, path: &Path) -> Result<ParsedLog, IngestError> {
        let parsed = {
            let f = File::open(path)?;
            self.parse_reader(BufReader::new(f))?
        };
        info!(
            log = %path.display(),
            lap_complete = parsed.episodes.len(),
            off_track = parsed.off_track,
            abandoned = parsed.abandoned,
            "parsed simulation log"
        );
        Ok(parsed)
    }

    pub fn parse_str(&self, text: &str) -> Result<ParsedLog, IngestError> {
        self.parse_reader(text.as_bytes())
    }

    pub fn parse_reader<R: BufRead>(&self, reader: R) -> Result<ParsedLog, IngestError> {
        let mut out = ParsedLog::default();
        let mut state = State::Idle;
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            state = self.advance(state, &line, i + 1, &mut out)?;
        }
        if let State::InEpisode(buffer) = state {
            debug!(records = buffer.len(), "log ended inside an episode, dropping it");
            out.abandoned += 1;
        }
        Ok(out)
    }

    fn advance(
        &self,
        state: State,
        line: &str,
        line_no: usize,
        out: &mut ParsedLog,
    ) -> Result<State, IngestError> {
        let mut buffer = match state {
            State::Idle => {
                if line.contains(RESET_MARKER) {
                    return Ok(State::InEpisode(Vec::new()));
                }
                if line.contains(TRACE_MARKER) {
                    trace!(line = line_no, "trace line outside an episode");
                }
                return Ok(State::Idle);
            }
            State::InEpisode(buffer) => buffer,
        };

        let Some(record) = RawRecord::parse(line, line_no)? else {
            return Ok(State::InEpisode(buffer));
        };
        match record.status {
            StepStatus::OffTrack => {
                out.off_track += 1;
                debug!(line = line_no, records = buffer.len(), "episode went off track");
                Ok(State::Idle)
            }
            StepStatus::LapComplete => {
                buffer.push(record);
                let episode = self.finalize(&buffer)?;
                debug!(
                    episode = episode.episode,
                    steps = episode.steps(),
                    lap_time = episode.lap_time(),
                    "lap complete"
                );
                out.episodes.push(episode);
                Ok(State::Idle)
            }
            StepStatus::Other(_) => {
                buffer.push(record);
                Ok(State::InEpisode(buffer))
            }
        }
    }

    fn finalize(&self, records: &[RawRecord]) -> Result<Episode, IngestError> {
        let samples = records
            .iter()
            .map(|r| self.to_sample(r))
            .collect::<Result<Vec<_>, _>>()?;
        let episode = samples.first().map(|s| s.episode).unwrap_or_default();
        Ok(Episode { episode, samples })
    }

    fn to_sample(&self, r: &RawRecord) -> Result<Sample, IngestError> {
        let raw_waypoint: usize = r.int(12)?;
        let mut sample = Sample {
            episode: r.int(0)?,
            step: r.int(1)?,
            x: r.float(2)?,
            y: r.float(3)?,
            heading: r.float(4)?,
            steering: r.float(5)?,
            speed: r.float(6)?,
            action: r.int(7)?,
            reward: r.float(8)?,
            job_completed: r.boolean(9)?,
            all_wheels_on_track: r.boolean(10)?,
            progress: r.float(11)?,
            closest_waypoint: raw_waypoint % self.reference.len(),
            track_length: r.float(13)?,
            time: r.float(14)?,
            status: r.status.clone(),
            best_heading: 0.0,
            direction_diff: 0.0,
        };
        self.reference.annotate(&mut sample);
        Ok(sample)
    }
}
