use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::PathBuf;
use uuid::Uuid;

/// How many trailing stderr lines are kept for failure reports
const STDERR_TAIL_LINES: usize = 10;

/// A source video found during discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaFile {
    pub path: PathBuf,
}

impl MediaFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// An audio or subtitle track as reported by the prober
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MediaTrack {
    /// Position among tracks of the same kind (the N in `0:a:N`)
    pub index: usize,
    /// Absolute stream index in the container
    pub stream_index: u32,
    /// Full language name ("Japanese", "English"); empty when unknown
    pub language: String,
    /// Track title; empty when unknown
    pub name: String,
}

impl MediaTrack {
    pub fn new(index: usize, language: &str, name: &str) -> Self {
        Self {
            index,
            stream_index: index as u32,
            language: language.to_string(),
            name: name.to_string(),
        }
    }
}

pub type AudioTrack = MediaTrack;
pub type SubtitleTrack = MediaTrack;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    /// Duration of the best video stream in seconds
    pub duration_s: f64,
    /// 0-based container index of the best video stream
    pub video_stream_index: u32,
    pub audio_tracks: Vec<AudioTrack>,
    pub subtitle_tracks: Vec<SubtitleTrack>,
}

impl ProbeResult {
    /// 1-based stream number of the best video stream
    pub fn video_stream_number(&self) -> u32 {
        self.video_stream_index + 1
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EncodeState {
    Starting,
    Running,
    Completed,
    Failed,
    Killed,
}

/// Live view of one running encoder invocation
#[derive(Debug, Clone)]
pub struct EncodeProcessHandle {
    pub job_id: Uuid,
    pub pid: Option<u32>,
    pub state: EncodeState,
    pub progress: f64,
    pub speed: Option<f64>,
}

impl EncodeProcessHandle {
    pub fn new(job_id: Uuid) -> Self {
        Self {
            job_id,
            pid: None,
            state: EncodeState::Starting,
            progress: 0.0,
            speed: None,
        }
    }

    /// Short status string shown next to the progress fraction
    pub fn status_text(&self) -> String {
        match self.speed {
            Some(speed) => format!("x{:.2}", speed),
            None => String::new(),
        }
    }
}

/// Progress notification forwarded to the caller
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub job_id: Uuid,
    /// Fraction in [0, 1]; never decreases within one job
    pub fraction: f64,
    pub speed: Option<f64>,
    pub status: String,
}

/// Parser for ffmpeg's human-readable stderr status lines.
///
/// Lines look like
/// `frame= 1234 fps= 48 q=28.0 size= 10240kB time=00:00:51.46 bitrate=1629.9kbits/s speed=2.01x`.
/// Only `time=` and `speed=` are consumed.
#[derive(Debug, Clone)]
pub struct ProgressParser {
    duration_s: f64,
    last_reported: f64,
    pub out_time_s: Option<f64>,
    pub speed: Option<f64>,
    tail: VecDeque<String>,
}

impl ProgressParser {
    pub fn new(duration_s: f64) -> Self {
        Self {
            duration_s,
            last_reported: 0.0,
            out_time_s: None,
            speed: None,
            tail: VecDeque::with_capacity(STDERR_TAIL_LINES),
        }
    }

    /// Parse a single stderr line.
    ///
    /// Returns the new progress fraction only when it is strictly greater
    /// than the last one returned.
    pub fn parse_line(&mut self, line: &str) -> Option<f64> {
        if !line.trim().is_empty() {
            if self.tail.len() == STDERR_TAIL_LINES {
                self.tail.pop_front();
            }
            self.tail.push_back(line.to_string());
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();

        for (i, token) in tokens.iter().enumerate() {
            if let Some(rest) = token.strip_prefix("speed=") {
                // "speed= 1.5x" splits the value into its own token
                let raw = if rest.is_empty() {
                    tokens.get(i + 1).copied().unwrap_or_default()
                } else {
                    rest
                };
                if let Some(speed) = parse_speed(raw) {
                    self.speed = Some(speed);
                }
                break;
            }
        }

        let elapsed = tokens
            .iter()
            .find_map(|t| t.strip_prefix("time="))
            .and_then(parse_clock)?;
        self.out_time_s = Some(elapsed);

        let fraction = self.fraction_for(elapsed);
        if fraction > self.last_reported {
            self.last_reported = fraction;
            Some(fraction)
        } else {
            None
        }
    }

    /// Highest fraction reported so far
    pub fn progress(&self) -> f64 {
        self.last_reported
    }

    /// Last stderr lines, oldest first
    pub fn stderr_tail(&self) -> String {
        self.tail.iter().cloned().collect::<Vec<_>>().join("\n")
    }

    fn fraction_for(&self, elapsed_s: f64) -> f64 {
        if self.duration_s <= 0.0 {
            return 0.0;
        }
        (elapsed_s / self.duration_s).clamp(0.0, 1.0)
    }
}

/// Parse "2.01x" style speed values; the unit suffix is one character
fn parse_speed(raw: &str) -> Option<f64> {
    let mut chars = raw.chars();
    chars.next_back()?;
    chars.as_str().parse::<f64>().ok().filter(|s| s.is_finite())
}

/// Parse a clock duration like `01:02:03.45` into seconds.
///
/// Negative values (ffmpeg prints `-00:00:00.02` at startup) and `N/A` yield `None`.
pub fn parse_clock(raw: &str) -> Option<f64> {
    if raw.starts_with('-') {
        return None;
    }

    let mut parts = raw.split(':');
    let (h, m, s) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }

    let hours: u64 = h.parse().ok()?;
    let minutes: u64 = m.parse().ok()?;
    let seconds: f64 = s.parse().ok()?;
    if minutes >= 60 || !(0.0..60.0).contains(&seconds) {
        return None;
    }

    let whole = hours.checked_mul(3600)?.checked_add(minutes * 60)?;
    Some(whole as f64 + seconds)
}
