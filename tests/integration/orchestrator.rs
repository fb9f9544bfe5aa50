// Integration tests for the batch orchestrator
//
// The encoder is replaced by a shell script and the prober by an in-memory
// fake, so these run without ffmpeg installed.

use kuroenc::config::EncoderOptions;
use kuroenc::engine::{EncodeError, EncoderSource, Orchestrator, WorkerMessage};
use std::path::PathBuf;
use tempfile::TempDir;

use crate::common::helpers::*;

fn orchestrator(options: EncoderOptions, probe: FakeProbe, encoder: PathBuf) -> Orchestrator {
    Orchestrator::new(options, Box::new(probe), EncoderSource::Path(encoder))
}

// ============================================================================
// Configuration and discovery failures
// ============================================================================

#[test]
fn test_invalid_options_report_every_problem() {
    let options = EncoderOptions {
        single_file: true,
        ..EncoderOptions::new("", "")
    };
    let orch = orchestrator(options, FakeProbe::new(), PathBuf::from("/unused"));

    match orch.run(|_| {}) {
        Err(EncodeError::ConfigValidation(errors)) => {
            assert_eq!(errors.len(), 3, "errors: {:?}", errors);
        }
        other => panic!("expected ConfigValidation, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_file_index_out_of_range_aborts_before_encoding() {
    let temp = TempDir::new().unwrap();
    touch_videos(temp.path(), &["a.mkv", "b.mkv"]);

    let probe = FakeProbe::new();
    let probe_calls = probe.calls.clone();

    let options = EncoderOptions {
        single_file: true,
        file_index: Some(5),
        ..EncoderOptions::new(temp.path(), "out")
    };
    let orch = orchestrator(options, probe, PathBuf::from("/nonexistent/ffmpeg"));

    let mut events = Vec::new();
    let result = orch.run(|msg| events.push(msg));

    assert!(matches!(
        result,
        Err(EncodeError::FileIndexOutOfRange { index: 5, count: 2 })
    ));
    assert!(events.is_empty());
    assert_eq!(probe_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[test]
fn test_missing_encoder_binary_is_fatal() {
    let temp = TempDir::new().unwrap();
    touch_videos(temp.path(), &["a.mkv", "b.mkv"]);

    let options = EncoderOptions::new(temp.path(), "out");
    let orch = orchestrator(options, FakeProbe::new(), temp.path().join("no-such-encoder"));

    let mut started = 0;
    let result = orch.run(|msg| {
        if matches!(msg, WorkerMessage::JobStarted { .. }) {
            started += 1;
        }
    });

    match result {
        Err(EncodeError::Launch { source, .. }) => {
            assert_eq!(source.kind(), std::io::ErrorKind::NotFound)
        }
        other => panic!("expected Launch error, got {:?}", other.map(|_| ())),
    }
    assert_eq!(started, 1, "the run stops at the first file");
}

#[test]
fn test_empty_folder_is_an_empty_run() {
    let temp = TempDir::new().unwrap();
    let options = EncoderOptions::new(temp.path(), "out");
    let orch = orchestrator(options, FakeProbe::new(), PathBuf::from("/unused"));

    let summary = orch.run(|_| {}).unwrap();

    assert_eq!(summary.completed, 0);
    assert!(summary.failed.is_empty());
    assert!(temp.path().join("out").is_dir(), "output folder is still created");
}

// ============================================================================
// Encoding with a fake encoder
// ============================================================================

#[cfg(unix)]
#[test]
fn test_encodes_every_file_in_name_order() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("src");
    std::fs::create_dir(&source).unwrap();
    touch_videos(&source, &["b.mp4", "a.mkv", "notes.txt"]);

    let args_log = temp.path().join("args.log");
    let encoder = write_fake_encoder(temp.path(), &succeeding_encoder_body(&args_log));

    let options = EncoderOptions::new(&source, "encoded");
    let orch = orchestrator(options, FakeProbe::new(), encoder);

    let mut events = Vec::new();
    let summary = orch.run(|msg| events.push(msg)).unwrap();

    assert_eq!(summary.completed, 2);
    assert!(summary.failed.is_empty());
    assert!(!summary.cancelled);

    let output_dir = source.join("encoded");
    assert!(output_dir.join("a.mkv").is_file());
    assert!(output_dir.join("b.mkv").is_file(), "mp4 input becomes mkv output");

    let started: Vec<(String, usize)> = events
        .iter()
        .filter_map(|m| match m {
            WorkerMessage::JobStarted {
                input, position, ..
            } => Some((
                input.file_name().unwrap().to_string_lossy().into_owned(),
                *position,
            )),
            _ => None,
        })
        .collect();
    assert_eq!(
        started,
        vec![("a.mkv".to_string(), 0), ("b.mp4".to_string(), 1)]
    );
    assert!(matches!(
        events[0],
        WorkerMessage::RunStarted { total_files: 2 }
    ));

    // Two updates per file, each strictly above the last
    let fractions: Vec<f64> = events
        .iter()
        .filter_map(|m| match m {
            WorkerMessage::Progress(update) => Some(update.fraction),
            _ => None,
        })
        .collect();
    assert_eq!(fractions, vec![0.25, 0.5, 0.25, 0.5]);

    let last_status = events.iter().rev().find_map(|m| match m {
        WorkerMessage::Progress(update) => Some(update.status.clone()),
        _ => None,
    });
    assert_eq!(last_status.as_deref(), Some("x2.50"));

    let completed = events
        .iter()
        .filter(|m| matches!(m, WorkerMessage::JobCompleted { success: true, .. }))
        .count();
    assert_eq!(completed, 2);

    let args = std::fs::read_to_string(&args_log).unwrap();
    let first = args.lines().next().unwrap();
    assert!(first.contains("-map 0 -map -0:a -map 0:a:1 -map -0:s -map 0:s:1"));
    assert!(first.contains("-vf scale=1280:720"));
    assert!(first.contains("-frames:0 2880"));

    let debug_log = std::fs::read_to_string(output_dir.join("kuroenc.log")).unwrap();
    assert_eq!(debug_log.matches("[start]").count(), 2);
}

#[cfg(unix)]
#[test]
fn test_subtitle_override_and_resolution() {
    let temp = TempDir::new().unwrap();
    touch_videos(temp.path(), &["ep01.mkv"]);

    let args_log = temp.path().join("args.log");
    let encoder = write_fake_encoder(temp.path(), &succeeding_encoder_body(&args_log));

    let options = EncoderOptions {
        subtitle_track: Some(7),
        resolution: 1080,
        threads: 6,
        crf: 20.0,
        ..EncoderOptions::new(temp.path(), temp.path().join("out"))
    };
    let orch = orchestrator(options, FakeProbe::new(), encoder);
    orch.run(|_| {}).unwrap();

    let args = std::fs::read_to_string(&args_log).unwrap();
    assert!(args.contains("-map 0:s:7"));
    assert!(!args.contains("-vf"), "1080p source fits a 1080 target");
    assert!(args.contains("-threads 6"));
    assert!(args.contains("-crf 20 "));
}

#[cfg(unix)]
#[test]
fn test_single_file_mode_encodes_only_the_selected_file() {
    let temp = TempDir::new().unwrap();
    touch_videos(temp.path(), &["a.mkv", "b.mkv", "c.mkv"]);

    let args_log = temp.path().join("args.log");
    let encoder = write_fake_encoder(temp.path(), &succeeding_encoder_body(&args_log));

    let options = EncoderOptions {
        single_file: true,
        file_index: Some(1),
        ..EncoderOptions::new(temp.path(), "out")
    };
    let summary = orchestrator(options, FakeProbe::new(), encoder)
        .run(|_| {})
        .unwrap();

    assert_eq!(summary.completed, 1);
    let args = std::fs::read_to_string(&args_log).unwrap();
    assert_eq!(args.lines().count(), 1);
    assert!(args.contains("b.mkv"));
}

#[cfg(unix)]
#[test]
fn test_probe_failure_skips_only_that_file() {
    let temp = TempDir::new().unwrap();
    touch_videos(temp.path(), &["a.mkv", "broken.mkv", "c.mkv"]);

    let args_log = temp.path().join("args.log");
    let encoder = write_fake_encoder(temp.path(), &succeeding_encoder_body(&args_log));

    let probe = FakeProbe::new().with_broken("broken.mkv");
    let options = EncoderOptions::new(temp.path(), "out");

    let mut failed_events = Vec::new();
    let summary = orchestrator(options, probe, encoder)
        .run(|msg| {
            if let WorkerMessage::JobFailed { input, .. } = msg {
                failed_events.push(input);
            }
        })
        .unwrap();

    assert_eq!(summary.completed, 2);
    assert_eq!(summary.failed.len(), 1);
    assert!(summary.failed[0].path.ends_with("broken.mkv"));
    assert!(summary.failed[0].reason.contains("unsupported container"));
    assert_eq!(failed_events.len(), 1);
}

#[cfg(unix)]
#[test]
fn test_encoder_failure_is_logged_and_run_continues() {
    let temp = TempDir::new().unwrap();
    touch_videos(temp.path(), &["a.mkv", "b.mkv"]);

    let encoder = write_fake_encoder(
        temp.path(),
        "echo \"Unknown encoder 'libx265'\" >&2\nexit 1",
    );

    let options = EncoderOptions::new(temp.path(), "out");
    let mut completions = Vec::new();
    let summary = orchestrator(options, FakeProbe::new(), encoder)
        .run(|msg| {
            if let WorkerMessage::JobCompleted { success, .. } = msg {
                completions.push(success);
            }
        })
        .unwrap();

    assert_eq!(summary.completed, 0);
    assert_eq!(summary.failed.len(), 2);
    assert_eq!(completions, vec![false, false]);

    let debug_log = std::fs::read_to_string(temp.path().join("out").join("kuroenc.log")).unwrap();
    assert_eq!(debug_log.matches("[failed]").count(), 2);
    assert!(debug_log.contains("Unknown encoder 'libx265'"));
}

#[test]
fn test_plan_all_probes_without_encoding() {
    let temp = TempDir::new().unwrap();
    touch_videos(temp.path(), &["a.mkv", "broken.mkv"]);

    let probe = FakeProbe::new().with_broken("broken.mkv");
    let options = EncoderOptions::new(temp.path(), "out");
    let orch = orchestrator(options, probe, PathBuf::from("/nonexistent/ffmpeg"));

    let planned = orch.plan_all().unwrap();

    assert_eq!(planned.len(), 2);
    let plan = planned[0].1.as_ref().unwrap();
    assert_eq!(plan.audio_track, Some(1));
    assert_eq!(plan.subtitle_track, Some(1));
    assert_eq!(plan.output_path, temp.path().join("out").join("a.mkv"));
    assert!(planned[1].1.is_err());
    assert!(!temp.path().join("out").exists(), "planning leaves the disk alone");
}
