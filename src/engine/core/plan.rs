// Per-file encode planning: output path, scaling, stream maps, frame limit

use super::tracks::{select_audio_track, select_subtitle_track};
use super::types::{MediaFile, ProbeResult};
use crate::config::EncoderOptions;
use crate::engine::EncodeError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Container of every encoded file
pub const OUTPUT_EXTENSION: &str = "mkv";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scale {
    pub width: u32,
    pub height: u32,
}

impl Scale {
    pub fn filter(&self) -> String {
        format!("scale={}:{}", self.width, self.height)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodePlan {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// None when the source already fits the target height
    pub scale: Option<Scale>,
    pub audio_track: Option<usize>,
    /// None when the source has no subtitles
    pub subtitle_track: Option<usize>,
    pub frame_count: u64,
    pub video_stream_index: u32,
    pub duration_s: f64,
}

impl EncodePlan {
    /// Drop every audio stream, then re-add the selected one
    pub fn audio_map_args(&self) -> Vec<String> {
        let mut args = vec!["-map".to_string(), "-0:a".to_string()];
        if let Some(track) = self.audio_track {
            args.push("-map".to_string());
            args.push(format!("0:a:{}", track));
        }
        args
    }

    /// Same isolation for subtitles; empty when there are none
    pub fn subtitle_map_args(&self) -> Vec<String> {
        match self.subtitle_track {
            Some(track) => vec![
                "-map".to_string(),
                "-0:s".to_string(),
                "-map".to_string(),
                format!("0:s:{}", track),
            ],
            None => Vec::new(),
        }
    }

    pub fn scale_filter(&self) -> Option<String> {
        self.scale.map(|s| s.filter())
    }

    /// Create the output directory (recursively) before anything is spawned
    pub fn ensure_output_dir(&self) -> Result<(), EncodeError> {
        match self.output_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                fs::create_dir_all(parent).map_err(|e| {
                    EncodeError::io(
                        format!("Failed to create output directory {}", parent.display()),
                        e,
                    )
                })
            }
            _ => Ok(()),
        }
    }
}

/// Compute the encode plan for one file
pub fn build_plan(
    options: &EncoderOptions,
    output_dir: &Path,
    file: &MediaFile,
    probe: &ProbeResult,
) -> EncodePlan {
    let scale = if probe.height <= options.resolution {
        None
    } else {
        Some(target_scale(probe.width, probe.height, options.resolution))
    };

    let subtitle_track = if probe.subtitle_tracks.is_empty() {
        None
    } else {
        options
            .subtitle_track
            .map(|t| t as usize)
            .or_else(|| select_subtitle_track(&probe.subtitle_tracks))
    };

    EncodePlan {
        input_path: file.path.clone(),
        output_path: output_path_for(output_dir, &file.path),
        scale,
        audio_track: select_audio_track(&probe.audio_tracks),
        subtitle_track,
        frame_count: frame_count(probe.duration_s, probe.frame_rate),
        video_stream_index: probe.video_stream_index,
        duration_s: probe.duration_s,
    }
}

/// `output_dir/<stem>.mkv`
pub fn output_path_for(output_dir: &Path, input: &Path) -> PathBuf {
    let file_name = input
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("output"));
    output_dir.join(file_name.with_extension(OUTPUT_EXTENSION))
}

/// Scale to `min(height, max_height)`, keeping aspect ratio and rounding width up.
///
/// libx265 rejects odd widths; 1279 is what a 720p target yields for
/// common near-16:9 sources, so it is bumped to 1280.
pub fn target_scale(width: u32, height: u32, max_height: u32) -> Scale {
    let target_height = height.min(max_height);
    let target_width = if height == 0 {
        width
    } else {
        let numerator = u64::from(target_height) * u64::from(width);
        numerator.div_ceil(u64::from(height)) as u32
    };

    let target_width = if target_width == 1279 {
        1280
    } else {
        target_width
    };

    Scale {
        width: target_width,
        height: target_height,
    }
}

/// Total frames to encode; limits the run when container duration drifts
pub fn frame_count(duration_s: f64, frame_rate: f64) -> u64 {
    let frames = (duration_s * frame_rate).ceil();
    if frames.is_finite() && frames > 0.0 {
        frames as u64
    } else {
        0
    }
}
