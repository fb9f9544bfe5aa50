mod ffmpeg_cmd;
mod log;
mod plan;
mod scan;
mod tracks;
mod types;

pub use ffmpeg_cmd::{EncodeReport, build_encode_cmd, encode_args, format_encode_cmd, run_encode};
pub use log::{DEBUG_LOG_NAME, write_debug_log};
pub use plan::{
    EncodePlan, OUTPUT_EXTENSION, Scale, build_plan, frame_count, output_path_for, target_scale,
};
pub use scan::{discover, is_video_file, select_single};
pub use tracks::{select_audio_track, select_subtitle_track};
pub use types::{
    AudioTrack, EncodeProcessHandle, EncodeState, MediaFile, MediaTrack, ProbeResult,
    ProgressParser, ProgressUpdate, SubtitleTrack, parse_clock,
};
