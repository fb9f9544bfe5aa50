use clap::Parser;
use std::ffi::OsString;
use std::path::PathBuf;

/// Single-dash switches accepted by older scripts, and the long flag each one means
pub const LEGACY_SWITCHES: &[(&str, &str)] = &[
    ("-sf", "--source-folder"),
    ("-of", "--output-folder"),
    ("-sid", "--subtitle-track"),
    ("-aid", "--audio-track"),
    ("-r", "--resolution"),
];

#[derive(Parser, Debug)]
#[command(name = "kuroenc")]
#[command(
    about = "Batch re-encode a folder of videos to HEVC/AAC Matroska",
    long_about = None,
    version
)]
pub struct Cli {
    /// Folder containing the videos to encode
    #[arg(long = "source-folder", visible_alias = "source", alias = "sf", value_name = "DIR")]
    pub source_folder: PathBuf,

    /// Where encoded files are written; relative paths are resolved against the source folder
    #[arg(long = "output-folder", visible_alias = "output", alias = "of", value_name = "DIR")]
    pub output_folder: PathBuf,

    /// Subtitle track to keep instead of the automatic choice
    #[arg(long = "subtitle-track", alias = "sid", value_name = "N")]
    pub subtitle_track: Option<u32>,

    /// Accepted for compatibility; the audio track is always chosen automatically
    #[arg(long = "audio-track", alias = "aid", value_name = "N")]
    pub audio_track: Option<u32>,

    /// Maximum output height
    #[arg(long, visible_alias = "res", alias = "r", value_name = "HEIGHT")]
    pub resolution: Option<u32>,

    /// Encoder threads (0 lets the encoder decide)
    #[arg(long)]
    pub threads: Option<u32>,

    /// Audio bitrate in kbps
    #[arg(long)]
    pub bitrate: Option<u32>,

    /// x265 constant rate factor
    #[arg(long)]
    pub crf: Option<f32>,

    /// Encode only the file at --file-index
    #[arg(long)]
    pub single_file: bool,

    /// 0-based position of the file in name order
    #[arg(long, value_name = "N")]
    pub file_index: Option<usize>,

    /// Use this encoder binary instead of downloading one
    #[arg(long, value_name = "PATH")]
    pub encoder: Option<PathBuf>,

    /// Probe and print encoder commands without encoding
    #[arg(long)]
    pub dry_run: bool,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Config file to use instead of the default location
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

/// Rewrite legacy single-dash switches to their long forms.
///
/// Only exact matches are rewritten, so `-rfoo` or `--r` pass through untouched.
pub fn normalize_args<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    args.into_iter()
        .map(Into::into)
        .map(|arg| {
            let replacement = arg.to_str().and_then(|s| {
                LEGACY_SWITCHES
                    .iter()
                    .find(|(legacy, _)| legacy.eq_ignore_ascii_case(s))
                    .map(|(_, long)| OsString::from(*long))
            });
            replacement.unwrap_or(arg)
        })
        .collect()
}

pub fn parse() -> Cli {
    Cli::parse_from(normalize_args(std::env::args_os()))
}
