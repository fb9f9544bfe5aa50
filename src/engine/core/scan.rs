use super::types::MediaFile;
use crate::engine::EncodeError;
use std::path::Path;
use walkdir::WalkDir;

/// Container extensions picked up from the source folder
const VIDEO_EXTENSIONS: &[&str] = &["mkv", "mp4", "webm", "avi", "ogm"];

/// Check if a path has a video file extension
pub fn is_video_file(path: &Path) -> bool {
    if let Some(ext) = path.extension() {
        if let Some(ext_str) = ext.to_str() {
            return VIDEO_EXTENSIONS.contains(&ext_str.to_lowercase().as_str());
        }
    }
    false
}

/// List the video files directly inside `root`, sorted by file name.
///
/// Subdirectories are not descended into.
pub fn discover(root: &Path) -> Result<Vec<MediaFile>, EncodeError> {
    let root = std::path::absolute(root).map_err(|e| {
        EncodeError::io(format!("Failed to resolve {}", root.display()), e)
    })?;

    let mut files = Vec::new();
    for entry in WalkDir::new(&root)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| {
            let context = format!("Failed to read {}", root.display());
            let source = e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("filesystem loop"));
            EncodeError::io(context, source)
        })?;

        let path = entry.path();
        if path.is_file() && is_video_file(path) {
            files.push(MediaFile::new(path));
        }
    }

    Ok(files)
}

/// Narrow the list to the file at `index` in discovery order
pub fn select_single(files: Vec<MediaFile>, index: usize) -> Result<MediaFile, EncodeError> {
    let count = files.len();
    files
        .into_iter()
        .nth(index)
        .ok_or(EncodeError::FileIndexOutOfRange { index, count })
}
