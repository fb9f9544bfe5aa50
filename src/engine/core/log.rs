use anyhow::Result;
use chrono::Local;
use std::io::Write;
use std::path::Path;

/// Name of the plain-text log kept next to the encoded files
pub const DEBUG_LOG_NAME: &str = "kuroenc.log";

/// Append a timestamped entry to `kuroenc.log` in `dir`, creating it if needed
pub fn write_debug_log(dir: &Path, message: &str) -> Result<()> {
    use std::fs::OpenOptions;

    let log_path = dir.join(DEBUG_LOG_NAME);
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;

    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
    writeln!(file, "[{}] {}", timestamp, message)?;
    Ok(())
}
