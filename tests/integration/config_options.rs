// Tests for config file handling and option resolution

use kuroenc::config::{Config, EncoderOptions};
use kuroenc::engine::EncodeError;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_partial_config_file_keeps_other_defaults() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.toml");
    fs::write(
        &path,
        "[defaults]\nresolution = 480\ncrf = 23.5\n\n[tools]\nffprobe = \"/opt/ffmpeg/ffprobe\"\n",
    )
    .unwrap();

    let config = Config::load_from(&path).unwrap();

    assert_eq!(config.defaults.resolution, 480);
    assert_eq!(config.defaults.crf, 23.5);
    assert_eq!(config.defaults.audio_bitrate, 128);
    assert_eq!(config.defaults.threads, 0);
    assert_eq!(config.tools.ffprobe.to_str(), Some("/opt/ffmpeg/ffprobe"));
    assert!(config.tools.archive_url.ends_with(".zip"));
}

#[test]
fn test_malformed_config_file_is_an_error() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.toml");
    fs::write(&path, "[defaults\nresolution = ").unwrap();

    let err = Config::load_from(&path).unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to parse config file"));
}

#[test]
fn test_options_take_config_defaults() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.toml");
    fs::write(&path, "[defaults]\nthreads = 8\naudio_bitrate = 96\n").unwrap();
    let config = Config::load_from(&path).unwrap();

    let options = EncoderOptions::with_defaults("/in", "/out", &config.defaults);

    assert_eq!(options.threads, 8);
    assert_eq!(options.audio_bitrate, 96);
    assert_eq!(options.resolution, 720);
    assert_eq!(options.subtitle_track, None);
    assert!(!options.single_file);
}

#[test]
fn test_source_folder_must_exist() {
    let temp = TempDir::new().unwrap();
    let options = EncoderOptions::new(temp.path().join("missing"), "out");

    match options.validate() {
        Err(EncodeError::ConfigValidation(errors)) => {
            assert_eq!(errors.len(), 1);
            assert!(errors[0].contains("valid path"));
        }
        other => panic!("expected ConfigValidation, got {:?}", other),
    }
}

#[test]
fn test_relative_output_folder_hangs_off_source() {
    let temp = TempDir::new().unwrap();
    let options = EncoderOptions::new(temp.path(), "encoded/720p");

    assert_eq!(
        options.resolved_output_folder().unwrap(),
        temp.path().join("encoded").join("720p")
    );
}
