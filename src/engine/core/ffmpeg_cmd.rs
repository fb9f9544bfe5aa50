use super::plan::EncodePlan;
use super::types::{EncodeProcessHandle, EncodeState, ProgressParser, ProgressUpdate};
use crate::config::EncoderOptions;
use crate::engine::EncodeError;
use crate::engine::worker::ShutdownHandle;
use std::ffi::OsString;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use tracing::{debug, warn};
use uuid::Uuid;

const AUDIO_CODEC: &str = "aac";
const VIDEO_CODEC: &str = "libx265";
const VIDEO_PRESET: &str = "fast";
const PIXEL_FORMAT: &str = "yuv420p";

/// Result of supervising one encoder process
#[derive(Debug)]
pub struct EncodeReport {
    pub handle: EncodeProcessHandle,
    /// Exit status as reported by the encoder; None if it was never reaped
    pub exit_status: Option<ExitStatus>,
    /// Last stderr lines, for diagnostics
    pub stderr_tail: String,
    pub error: Option<String>,
}

impl EncodeReport {
    pub fn state(&self) -> EncodeState {
        self.handle.state
    }
}

/// Encoder arguments for one plan, in the order ffmpeg expects them.
///
/// Paths are separate arguments; no shell is involved so embedded spaces
/// survive untouched.
pub fn encode_args(plan: &EncodePlan, options: &EncoderOptions) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        OsString::from("-i"),
        plan.input_path.clone().into_os_string(),
    ];

    let mut rest: Vec<String> = vec![
        "-hide_banner".to_string(),
        "-y".to_string(),
        "-threads".to_string(),
        options.threads.to_string(),
        "-map".to_string(),
        "0".to_string(),
    ];
    rest.extend(plan.audio_map_args());
    rest.extend(plan.subtitle_map_args());

    rest.extend([
        "-c:s".to_string(),
        "copy".to_string(),
        "-c:a".to_string(),
        AUDIO_CODEC.to_string(),
        "-b:a".to_string(),
        format!("{}k", options.audio_bitrate),
    ]);

    if let Some(filter) = plan.scale_filter() {
        rest.push("-vf".to_string());
        rest.push(filter);
    }

    rest.extend([
        "-c:v".to_string(),
        VIDEO_CODEC.to_string(),
        "-preset".to_string(),
        VIDEO_PRESET.to_string(),
        "-crf".to_string(),
        options.crf.to_string(),
        "-pix_fmt".to_string(),
        PIXEL_FORMAT.to_string(),
        format!("-frames:{}", plan.video_stream_index),
        plan.frame_count.to_string(),
    ]);

    args.extend(rest.into_iter().map(OsString::from));
    args.push(plan.output_path.clone().into_os_string());
    args
}

/// Build the encoder command for a plan; does not execute it
pub fn build_encode_cmd(encoder: &Path, plan: &EncodePlan, options: &EncoderOptions) -> Command {
    let mut cmd = Command::new(encoder);
    cmd.args(encode_args(plan, options));
    cmd
}

/// Format a command as a shell-safe string for display and logs
pub fn format_encode_cmd(cmd: &Command) -> String {
    let parts: Vec<String> = std::iter::once(cmd.get_program())
        .chain(cmd.get_args())
        .map(|s| s.to_string_lossy().into_owned())
        .collect();

    shlex::try_join(parts.iter().map(String::as_str)).unwrap_or_else(|_| {
        // NUL bytes can't be quoted; fall back to naive quoting
        parts
            .iter()
            .map(|p| {
                if p.contains(' ') {
                    format!("\"{}\"", p)
                } else {
                    p.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    })
}

/// Spawn the encoder and supervise it until it exits or is killed.
///
/// `on_progress` is called with strictly increasing fractions. The process
/// is registered with `shutdown` for its whole lifetime, so a shutdown
/// request kills it no matter how far it got.
pub fn run_encode<F>(
    mut cmd: Command,
    input: &Path,
    duration_s: f64,
    shutdown: &ShutdownHandle,
    job_id: Uuid,
    mut on_progress: F,
) -> Result<EncodeReport, EncodeError>
where
    F: FnMut(&ProgressUpdate),
{
    let mut handle = EncodeProcessHandle::new(job_id);

    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::null());
    cmd.stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(|source| EncodeError::Launch {
        path: input.to_path_buf(),
        source,
    })?;
    handle.pid = Some(child.id());
    let stderr = child.stderr.take();

    if !shutdown.register(handle.job_id, child) {
        debug!("Shutdown requested before {} started", input.display());
        handle.state = EncodeState::Killed;
        return Ok(EncodeReport {
            handle,
            exit_status: None,
            stderr_tail: String::new(),
            error: None,
        });
    }
    handle.state = EncodeState::Running;

    let mut parser = ProgressParser::new(duration_s);

    if let Some(stderr) = stderr {
        // ffmpeg redraws its status line with '\r', so split on both terminators
        for chunk in BufReader::new(stderr).split(b'\r').map_while(Result::ok) {
            let text = String::from_utf8_lossy(&chunk);
            for line in text.lines() {
                if let Some(fraction) = parser.parse_line(line) {
                    handle.progress = fraction;
                    handle.speed = parser.speed;
                    on_progress(&ProgressUpdate {
                        job_id: handle.job_id,
                        fraction,
                        speed: parser.speed,
                        status: handle.status_text(),
                    });
                }
            }
        }
    } else {
        warn!("Encoder stderr was not captured for {}", input.display());
    }
    handle.speed = parser.speed;

    let (exit_status, error) = match shutdown.reap(handle.job_id) {
        Ok(status) => (status, None),
        Err(e) => (None, Some(format!("Failed to wait for encoder: {}", e))),
    };

    handle.state = match (&exit_status, &error) {
        (_, Some(_)) => EncodeState::Failed,
        (Some(status), None) if shutdown.is_requested() && !status.success() => {
            EncodeState::Killed
        }
        (Some(_), None) => EncodeState::Completed,
        (None, None) if shutdown.is_requested() => EncodeState::Killed,
        (None, None) => EncodeState::Failed,
    };

    Ok(EncodeReport {
        handle,
        exit_status,
        stderr_tail: parser.stderr_tail(),
        error,
    })
}
