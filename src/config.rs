// Global configuration management

use crate::engine::EncodeError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub defaults: DefaultsConfig,

    #[serde(default)]
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Maximum output height; sources taller than this are downscaled
    #[serde(default = "default_resolution")]
    pub resolution: u32,

    /// Encoder thread count (0 lets ffmpeg decide)
    #[serde(default)]
    pub threads: u32,

    /// AAC bitrate in kbps
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: u32,

    /// x265 constant rate factor
    #[serde(default = "default_crf")]
    pub crf: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Where the provisioned encoder and its version marker live
    #[serde(default)]
    pub dir: Option<PathBuf>,

    #[serde(default = "default_version_url")]
    pub version_url: String,

    #[serde(default = "default_archive_url")]
    pub archive_url: String,

    /// Executable name looked up inside the downloaded archive
    #[serde(default = "default_executable")]
    pub executable: String,

    /// ffprobe binary used for media probing
    #[serde(default = "default_ffprobe")]
    pub ffprobe: PathBuf,
}

fn default_resolution() -> u32 {
    720
}

fn default_audio_bitrate() -> u32 {
    128
}

fn default_crf() -> f32 {
    18.0
}

fn default_version_url() -> String {
    "https://www.gyan.dev/ffmpeg/builds/release-version".to_string()
}

fn default_archive_url() -> String {
    "https://www.gyan.dev/ffmpeg/builds/ffmpeg-release-essentials.zip".to_string()
}

fn default_executable() -> String {
    format!("ffmpeg{}", std::env::consts::EXE_SUFFIX)
}

fn default_ffprobe() -> PathBuf {
    PathBuf::from("ffprobe")
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            resolution: default_resolution(),
            threads: 0,
            audio_bitrate: default_audio_bitrate(),
            crf: default_crf(),
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            dir: None,
            version_url: default_version_url(),
            archive_url: default_archive_url(),
            executable: default_executable(),
            ffprobe: default_ffprobe(),
        }
    }
}

impl ToolsConfig {
    /// Tools directory, falling back to the per-user data directory
    pub fn resolved_dir(&self) -> Result<PathBuf> {
        match &self.dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(dirs::data_local_dir()
                .context("Could not determine local data directory")?
                .join("kuroenc")
                .join("tools")),
        }
    }
}

impl Config {
    /// Get the path to the config file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = if cfg!(target_os = "macos") {
            dirs::home_dir()
                .context("Could not determine home directory")?
                .join(".config")
                .join("kuroenc")
        } else {
            dirs::config_dir()
                .context("Could not determine config directory")?
                .join("kuroenc")
        };

        Ok(config_dir.join("config.toml"))
    }

    /// Load config from the default location, creating it if it doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            return Self::load_from(&config_path);
        }

        let config = Config::default();

        // Not being able to persist the defaults is not worth failing over
        if let Err(e) = config.save() {
            tracing::warn!("Could not create default config file: {:#}", e);
        }

        Ok(config)
    }

    /// Load config from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save config to disk
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))
    }
}

/// Immutable options for one batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderOptions {
    pub source_folder: PathBuf,
    pub output_folder: PathBuf,
    /// Replaces the selected subtitle track when the file has subtitles
    pub subtitle_track: Option<u32>,
    /// Accepted for compatibility; audio selection is never overridden
    pub audio_track: Option<u32>,
    pub resolution: u32,
    pub threads: u32,
    pub audio_bitrate: u32,
    pub crf: f32,
    pub single_file: bool,
    pub file_index: Option<usize>,
}

impl EncoderOptions {
    /// Options with the built-in defaults for everything but the folders
    pub fn new(source_folder: impl Into<PathBuf>, output_folder: impl Into<PathBuf>) -> Self {
        Self::with_defaults(source_folder, output_folder, &DefaultsConfig::default())
    }

    pub fn with_defaults(
        source_folder: impl Into<PathBuf>,
        output_folder: impl Into<PathBuf>,
        defaults: &DefaultsConfig,
    ) -> Self {
        Self {
            source_folder: source_folder.into(),
            output_folder: output_folder.into(),
            subtitle_track: None,
            audio_track: None,
            resolution: defaults.resolution,
            threads: defaults.threads,
            audio_bitrate: defaults.audio_bitrate,
            crf: defaults.crf,
            single_file: false,
            file_index: None,
        }
    }

    /// Check every invariant and report all violations at once
    pub fn validate(&self) -> Result<(), EncodeError> {
        let mut errors = Vec::new();

        if is_blank(&self.source_folder) {
            errors.push("Source Folder should not be empty".to_string());
        } else if !self.source_folder.is_dir() {
            errors.push(format!(
                "Source Folder must be a valid path: {}",
                self.source_folder.display()
            ));
        }

        if is_blank(&self.output_folder) {
            errors.push("Output Folder should not be empty".to_string());
        }

        if self.single_file && self.file_index.is_none() {
            errors.push("File Index must be provided when using Single File mode".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(EncodeError::ConfigValidation(errors))
        }
    }

    /// Output folder as an absolute path; relative paths hang off the source folder
    pub fn resolved_output_folder(&self) -> Result<PathBuf, EncodeError> {
        let joined = if self.output_folder.is_absolute() {
            self.output_folder.clone()
        } else {
            self.source_folder.join(&self.output_folder)
        };

        std::path::absolute(&joined).map_err(|e| {
            EncodeError::io(
                format!("Failed to resolve output folder {}", joined.display()),
                e,
            )
        })
    }
}

fn is_blank(path: &Path) -> bool {
    path.as_os_str().to_string_lossy().trim().is_empty()
}
