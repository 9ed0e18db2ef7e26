use std::path::PathBuf;

use analysis::{summarize, RunSummary, TargetGenerator, TargetOptions};
use model::{Point2, TargetRange, TargetSpecTable, TargetStrategy, Track};
use simlog_ingest::{sniff_log_file, IngestError, SimLogParser};

fn oval(n: usize) -> Track {
    let waypoints: Vec<Point2> = (0..n)
        .map(|i| {
            let a = i as f64 / n as f64 * std::f64::consts::TAU;
            Point2::new(4.0 + 3.0 * a.cos(), 2.5 + 2.0 * a.sin())
        })
        .collect();
    let ranges = vec![
        TargetRange { start: 0, end: 9, strategy: TargetStrategy::Average, lookahead: 5 },
        TargetRange { start: 10, end: 14, strategy: TargetStrategy::WeightedAverage, lookahead: 6 },
        TargetRange { start: 15, end: n - 1, strategy: TargetStrategy::Endpoint, lookahead: 4 },
    ];
    let table = TargetSpecTable::new(ranges, n).unwrap();
    Track::new("oval", waypoints, table).unwrap()
}

fn write_episode(out: &mut String, track: &Track, episode: u32, steps: u32, dt: f64, last: &str) {
    out.push_str(&format!("INFO:simulation_worker:Reset agent (episode {episode})\n"));
    for s in 1..=steps {
        let wp = (s as usize * 2) % (track.len() * 2);
        let p = track.waypoint(wp);
        let status = if s == steps { last } else { "in_progress" };
        out.push_str(&format!(
            "SIM_TRACE_LOG:{episode},{s},{x:.4},{y:.4},{h:.2},0.0,2.0,1,1.0,False,True,{pr:.2},{wp},17.71,{t:.3},{status}\n",
            x = p.x,
            y = p.y,
            h = (s as f64 * 17.0) % 360.0 - 180.0,
            pr = s as f64,
            t = 50.0 + s as f64 * dt,
        ));
    }
}

fn temp_log(name: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("simlog-{}-{name}.log", std::process::id()));
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_log_to_summary() {
    let track = oval(24);
    let table = TargetGenerator::new(&track, TargetOptions::default()).reference_table().unwrap();
    assert_eq!(table.len(), 24);

    let mut log = String::from("INFO: starting simulation\n\n");
    write_episode(&mut log, &track, 0, 12, 0.1, "off_track");
    write_episode(&mut log, &track, 1, 30, 0.1, "lap_complete");
    write_episode(&mut log, &track, 2, 20, 0.2, "lap_complete");
    write_episode(&mut log, &track, 3, 7, 0.1, "in_progress");

    let path = temp_log("pipeline", &log);
    sniff_log_file(&path).unwrap();
    let parsed = SimLogParser::new(&table).parse_file(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(parsed.episodes.len(), 2);
    assert_eq!(parsed.off_track, 1);
    assert_eq!(parsed.abandoned, 1);
    for ep in &parsed.episodes {
        for s in &ep.samples {
            assert!(s.closest_waypoint < track.len());
            assert!((0.0..=180.0).contains(&s.direction_diff));
        }
    }

    let summary = summarize(&parsed.episodes, parsed.off_track);
    let RunSummary::Stats { completed, lap_time, steps, .. } = summary else {
        panic!("expected stats");
    };
    assert_eq!(completed, 2);
    assert!((lap_time.mean - 3.35).abs() < 1e-6);
    assert_eq!(lap_time.min.episode, 1);
    assert_eq!(steps.max.steps, 30);
    assert!((steps.stddev - 5.0).abs() < 1e-9);
}

#[test]
fn test_sniff_rejects_other_files() {
    let path = temp_log("not-a-sim-log", "time,x,y\n0,1,2\n");
    let err = sniff_log_file(&path).unwrap_err();
    std::fs::remove_file(&path).ok();
    assert!(matches!(err, IngestError::InvalidLogFile { .. }));

    let dir = std::env::temp_dir();
    assert!(matches!(sniff_log_file(&dir), Err(IngestError::InvalidLogFile { .. })));
}

#[test]
fn test_sniff_scans_lines_until_both_markers() {
    // markers on separate lines, binary noise after them
    let name = format!("simlog-{}-binary-tail.log", std::process::id());
    let path = std::env::temp_dir().join(name);
    let mut bytes = b"INFO:rl_coach:Reset agent\nnoise\nSIM_TRACE_LOG:0,1\n".to_vec();
    bytes.extend_from_slice(&[0xff, 0xfe, 0x00, b'\n']);
    std::fs::write(&path, &bytes).unwrap();
    let ok = sniff_log_file(&path);
    std::fs::remove_file(&path).ok();
    assert!(ok.is_ok());

    let path = temp_log("reset-only", "Reset agent\nReset agent\n");
    let err = sniff_log_file(&path);
    std::fs::remove_file(&path).ok();
    assert!(matches!(err, Err(IngestError::InvalidLogFile { .. })));
}
