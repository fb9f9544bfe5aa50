#![allow(dead_code)] // Not every test module uses every helper

use anyhow::Result;
use kuroenc::engine::{EncodeError, MediaProbe, MediaTrack, ProbeResult, ToolSource};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// 1080p, two minutes at 24 fps, English + Japanese audio, Signs + Full subtitles
pub fn sample_probe() -> ProbeResult {
    ProbeResult {
        width: 1920,
        height: 1080,
        frame_rate: 24.0,
        duration_s: 120.0,
        video_stream_index: 0,
        audio_tracks: vec![
            MediaTrack::new(0, "English", "Stereo"),
            MediaTrack::new(1, "Japanese", ""),
        ],
        subtitle_tracks: vec![
            MediaTrack::new(0, "English", "Signs & Songs"),
            MediaTrack::new(1, "English", "Full Subtitles"),
        ],
    }
}

/// `MediaProbe` that answers from memory.
///
/// Files listed in `broken` fail to probe; everything else gets `default`
/// unless an entry exists in `by_name`.
#[derive(Clone)]
pub struct FakeProbe {
    pub default: ProbeResult,
    pub by_name: HashMap<String, ProbeResult>,
    pub broken: Vec<String>,
    pub calls: Arc<AtomicUsize>,
}

impl FakeProbe {
    pub fn new() -> Self {
        Self {
            default: sample_probe(),
            by_name: HashMap::new(),
            broken: Vec::new(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_broken(mut self, name: &str) -> Self {
        self.broken.push(name.to_string());
        self
    }
}

impl MediaProbe for FakeProbe {
    fn probe(&self, path: &Path) -> Result<ProbeResult, EncodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if self.broken.contains(&name) {
            return Err(EncodeError::probe(path, "unsupported container"));
        }

        Ok(self.by_name.get(&name).cloned().unwrap_or_else(|| self.default.clone()))
    }
}

/// `ToolSource` serving a zip that holds `payload` as `bin/ffmpeg`
pub struct FakeToolSource {
    pub version: Option<String>,
    pub payload: Vec<u8>,
    pub version_checks: Arc<AtomicUsize>,
    pub downloads: Arc<AtomicUsize>,
}

impl FakeToolSource {
    pub fn new(version: Option<&str>, payload: &[u8]) -> Self {
        Self {
            version: version.map(str::to_string),
            payload: payload.to_vec(),
            version_checks: Arc::new(AtomicUsize::new(0)),
            downloads: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl ToolSource for FakeToolSource {
    fn remote_version(&self) -> Result<String> {
        self.version_checks.fetch_add(1, Ordering::SeqCst);
        self.version
            .clone()
            .ok_or_else(|| anyhow::anyhow!("connection refused"))
    }

    fn download_archive(&self, dest: &Path) -> Result<()> {
        self.downloads.fetch_add(1, Ordering::SeqCst);

        let mut zip = zip::ZipWriter::new(fs::File::create(dest)?);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        zip.start_file("ffmpeg-release-essentials/bin/ffmpeg", options)?;
        zip.write_all(&self.payload)?;
        zip.finish()?;
        Ok(())
    }
}

/// Create empty files with the given names in `dir`
pub fn touch_videos(dir: &Path, names: &[&str]) -> Vec<PathBuf> {
    names
        .iter()
        .map(|name| {
            let path = dir.join(name);
            fs::write(&path, b"not really a video").unwrap();
            path
        })
        .collect()
}

/// Shell script standing in for the encoder.
///
/// `body` runs after `$out` has been set to the last argument (the output path).
pub fn fake_encoder_script(body: &str) -> String {
    format!(
        "#!/bin/sh\n[ \"$1\" = \"--ready\" ] && exit 0\nfor out; do :; done\n{}\n",
        body
    )
}

/// Write an executable fake encoder into `dir`
#[cfg(unix)]
pub fn write_fake_encoder(dir: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("fake-ffmpeg");
    fs::write(&path, fake_encoder_script(body)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    wait_until_executable(&path);
    path
}

/// A freshly written script can briefly fail with ETXTBSY while another test
/// thread forks; retry until it runs.
#[cfg(unix)]
pub fn wait_until_executable(path: &Path) {
    const ETXTBSY: i32 = 26;

    for _ in 0..100 {
        match std::process::Command::new(path).arg("--ready").status() {
            Ok(_) => return,
            Err(e) if e.raw_os_error() == Some(ETXTBSY) => {
                std::thread::sleep(std::time::Duration::from_millis(10))
            }
            Err(e) => panic!("{} is not runnable: {}", path.display(), e),
        }
    }
    panic!("{} stayed busy", path.display());
}

/// Encoder that reports two progress lines, records its arguments, writes the output and succeeds
pub fn succeeding_encoder_body(args_log: &Path) -> String {
    format!(
        "echo \"frame=  720 fps=48 q=28.0 size=1024kB time=00:00:30.00 bitrate=N/A speed=2.00x\" >&2\n\
         printf 'frame= 1440 fps=48 q=28.0 size=2048kB time=00:01:00.00 bitrate=N/A speed= 2.5x\\r' >&2\n\
         echo \"$@\" >> '{}'\n\
         : > \"$out\"\n\
         exit 0",
        args_log.display()
    )
}
