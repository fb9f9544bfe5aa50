// Input probing using ffprobe

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use super::EncodeError;
use super::core::{MediaTrack, ProbeResult, parse_clock};

/// Narrow view of the metadata prober the pipeline depends on
pub trait MediaProbe {
    fn probe(&self, path: &Path) -> Result<ProbeResult, EncodeError>;
}

/// `MediaProbe` backed by the ffprobe binary
#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    program: PathBuf,
}

impl FfprobeProbe {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for FfprobeProbe {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

impl MediaProbe for FfprobeProbe {
    fn probe(&self, path: &Path) -> Result<ProbeResult, EncodeError> {
        let output = Command::new(&self.program)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .output()
            .map_err(|e| {
                EncodeError::probe(
                    path,
                    format!("failed to run {}: {}", self.program.display(), e),
                )
            })?;

        if !output.status.success() {
            return Err(EncodeError::probe(
                path,
                format!(
                    "ffprobe exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }

        parse_ffprobe_output(&String::from_utf8_lossy(&output.stdout), path)
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    index: u32,
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    duration: Option<String>,
    #[serde(default)]
    tags: HashMap<String, String>,
    #[serde(default)]
    disposition: HashMap<String, i64>,
}

impl FfprobeStream {
    fn kind(&self) -> &str {
        self.codec_type.as_deref().unwrap_or_default()
    }

    /// Tag lookup ignoring key case (Matroska writes `DURATION`, MP4 `duration`)
    fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    fn is_attached_pic(&self) -> bool {
        self.disposition.get("attached_pic").copied().unwrap_or(0) != 0
    }

    fn area(&self) -> u64 {
        u64::from(self.width.unwrap_or(0)) * u64::from(self.height.unwrap_or(0))
    }

    fn duration_s(&self) -> Option<f64> {
        self.duration
            .as_deref()
            .and_then(|d| d.parse::<f64>().ok())
            .or_else(|| self.tag("DURATION").and_then(parse_clock))
            .filter(|d| d.is_finite() && *d > 0.0)
    }

    fn frame_rate(&self) -> Option<f64> {
        [self.r_frame_rate.as_deref(), self.avg_frame_rate.as_deref()]
            .into_iter()
            .flatten()
            .find_map(parse_fraction)
    }

    fn to_track(&self, position: usize) -> MediaTrack {
        MediaTrack {
            index: position,
            stream_index: self.index,
            language: self.tag("language").map(language_name).unwrap_or_default(),
            name: self.tag("title").unwrap_or_default().to_string(),
        }
    }
}

/// Build a `ProbeResult` from `ffprobe -show_format -show_streams` JSON
pub fn parse_ffprobe_output(json: &str, path: &Path) -> Result<ProbeResult, EncodeError> {
    let probe: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| EncodeError::probe(path, format!("failed to parse ffprobe JSON: {}", e)))?;

    // Largest picture wins; cover art is not a video track
    let mut best: Option<&FfprobeStream> = None;
    for stream in probe
        .streams
        .iter()
        .filter(|s| s.kind() == "video" && !s.is_attached_pic())
    {
        if best.is_none_or(|b| stream.area() > b.area()) {
            best = Some(stream);
        }
    }
    let video = best.ok_or_else(|| EncodeError::probe(path, "no video stream found"))?;

    let (width, height) = match (video.width, video.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(EncodeError::probe(path, "video stream has no dimensions")),
    };

    let frame_rate = video
        .frame_rate()
        .ok_or_else(|| EncodeError::probe(path, "video stream has no usable frame rate"))?;

    let duration_s = video
        .duration_s()
        .or_else(|| {
            probe
                .format
                .as_ref()
                .and_then(|f| f.duration.as_deref())
                .and_then(|d| d.parse::<f64>().ok())
                .filter(|d| d.is_finite() && *d > 0.0)
        })
        .ok_or_else(|| EncodeError::probe(path, "no duration found"))?;

    let tracks_of = |kind: &str| -> Vec<MediaTrack> {
        probe
            .streams
            .iter()
            .filter(|s| s.kind() == kind)
            .enumerate()
            .map(|(i, s)| s.to_track(i))
            .collect()
    };

    Ok(ProbeResult {
        width,
        height,
        frame_rate,
        duration_s,
        video_stream_index: video.index,
        audio_tracks: tracks_of("audio"),
        subtitle_tracks: tracks_of("subtitle"),
    })
}

/// Parse a fraction string like "30000/1001" to f64
fn parse_fraction(s: &str) -> Option<f64> {
    let (numerator, denominator) = s.split_once('/')?;
    let numerator: f64 = numerator.parse().ok()?;
    let denominator: f64 = denominator.parse().ok()?;

    if denominator == 0.0 || numerator <= 0.0 {
        return None;
    }

    Some(numerator / denominator)
}

/// Map ISO 639 codes to the English language names the track selector expects.
///
/// Unknown codes are passed through unchanged; "und" means unknown.
pub fn language_name(code: &str) -> String {
    let name = match code.trim().to_ascii_lowercase().as_str() {
        "" | "und" | "zxx" | "mis" => "",
        "jpn" | "ja" => "Japanese",
        "eng" | "en" => "English",
        "ger" | "deu" | "de" => "German",
        "fre" | "fra" | "fr" => "French",
        "spa" | "es" => "Spanish",
        "ita" | "it" => "Italian",
        "por" | "pt" => "Portuguese",
        "rus" | "ru" => "Russian",
        "chi" | "zho" | "zh" => "Chinese",
        "kor" | "ko" => "Korean",
        "ara" | "ar" => "Arabic",
        "pol" | "pl" => "Polish",
        "dut" | "nld" | "nl" => "Dutch",
        "swe" | "sv" => "Swedish",
        "tha" | "th" => "Thai",
        "vie" | "vi" => "Vietnamese",
        "ind" | "id" => "Indonesian",
        "may" | "msa" | "ms" => "Malay",
        "hin" | "hi" => "Hindi",
        "tur" | "tr" => "Turkish",
        _ => return code.trim().to_string(),
    };
    name.to_string()
}
