// Audio / subtitle track selection heuristics

use super::types::{AudioTrack, SubtitleTrack};

const PREFERRED_AUDIO_LANGUAGE: &str = "Japanese";
const SUBTITLE_LANGUAGE: &str = "English";

/// Pick the audio track to keep.
///
/// A single track is always kept. Otherwise the first Japanese track wins,
/// falling back to the container default (index 0).
pub fn select_audio_track(tracks: &[AudioTrack]) -> Option<usize> {
    match tracks.len() {
        0 => None,
        1 => Some(0),
        _ => Some(
            tracks
                .iter()
                .position(|t| t.language == PREFERRED_AUDIO_LANGUAGE)
                .unwrap_or(0),
        ),
    }
}

/// Pick the subtitle track to keep.
///
/// English tracks named "Full" win immediately. The first English
/// "Signs"/"Songs" track is remembered as a fallback. A fallback at
/// index 0 is indistinguishable from "no fallback" and resolves to the
/// default track either way.
pub fn select_subtitle_track(tracks: &[SubtitleTrack]) -> Option<usize> {
    match tracks.len() {
        0 => return None,
        1 => return Some(0),
        _ => {}
    }

    let mut candidate: Option<usize> = None;

    for (i, track) in tracks.iter().enumerate() {
        if track.language != SUBTITLE_LANGUAGE {
            continue;
        }

        if contains_ignore_case(&track.name, "signs") || contains_ignore_case(&track.name, "songs")
        {
            candidate.get_or_insert(i);
            continue;
        }

        if contains_ignore_case(&track.name, "full") {
            return Some(i);
        }
    }

    match candidate {
        Some(i) if i > 0 => Some(i),
        _ => Some(0),
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}
