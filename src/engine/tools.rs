// Encoder binary provisioning: version check, download, extraction

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::EncodeError;

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
const VERSION_TIMEOUT: Duration = Duration::from_secs(30);

/// Remote origin of the encoder build
pub trait ToolSource {
    /// Latest published version string
    fn remote_version(&self) -> Result<String>;

    /// Download the build archive to `dest`
    fn download_archive(&self, dest: &Path) -> Result<()>;
}

/// `ToolSource` that talks to a static HTTP build server
#[derive(Debug, Clone)]
pub struct HttpToolSource {
    version_url: String,
    archive_url: String,
    client: reqwest::blocking::Client,
}

impl HttpToolSource {
    pub fn new(version_url: impl Into<String>, archive_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            version_url: version_url.into(),
            archive_url: archive_url.into(),
            client,
        })
    }
}

impl ToolSource for HttpToolSource {
    fn remote_version(&self) -> Result<String> {
        let body = self
            .client
            .get(&self.version_url)
            .timeout(VERSION_TIMEOUT)
            .send()
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("GET {}", self.version_url))?
            .text()
            .context("Failed to read version response")?;

        Ok(body.trim().to_string())
    }

    fn download_archive(&self, dest: &Path) -> Result<()> {
        info!("Downloading {}", self.archive_url);

        let mut response = self
            .client
            .get(&self.archive_url)
            .send()
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("GET {}", self.archive_url))?;

        let mut file =
            File::create(dest).with_context(|| format!("Failed to create {}", dest.display()))?;
        let bytes = response
            .copy_to(&mut file)
            .with_context(|| format!("Failed to write {}", dest.display()))?;

        debug!("Downloaded {} bytes to {}", bytes, dest.display());
        Ok(())
    }
}

/// Snapshot of what is installed locally versus what is published
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolBinaryState {
    pub binary_path: PathBuf,
    /// Version recorded when the binary was extracted
    pub local_version: Option<String>,
    pub remote_version: Option<String>,
}

impl ToolBinaryState {
    pub fn is_current(&self) -> bool {
        match (&self.local_version, &self.remote_version) {
            (Some(local), Some(remote)) => versions_match(local, remote),
            _ => false,
        }
    }
}

/// Keeps a locally cached encoder binary in step with the remote build
pub struct ToolProvisioner {
    tools_dir: PathBuf,
    executable: String,
    source: Box<dyn ToolSource + Send>,
}

impl ToolProvisioner {
    pub fn new(
        tools_dir: impl Into<PathBuf>,
        executable: impl Into<String>,
        source: Box<dyn ToolSource + Send>,
    ) -> Self {
        Self {
            tools_dir: tools_dir.into(),
            executable: executable.into(),
            source,
        }
    }

    pub fn binary_path(&self) -> PathBuf {
        self.tools_dir.join(&self.executable)
    }

    /// Plain-text file holding the version of the extracted binary
    pub fn version_path(&self) -> PathBuf {
        self.binary_path().with_extension("version")
    }

    fn archive_path(&self) -> PathBuf {
        self.binary_path().with_extension("zip")
    }

    fn local_version(&self) -> Option<String> {
        if !self.binary_path().is_file() {
            return None;
        }
        fs::read_to_string(self.version_path())
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// Local and remote versions; a failed remote lookup is reported as `None`
    pub fn state(&self) -> ToolBinaryState {
        let remote_version = match self.source.remote_version() {
            Ok(version) => Some(version),
            Err(e) => {
                debug!("Remote version lookup failed: {:#}", e);
                None
            }
        };

        ToolBinaryState {
            binary_path: self.binary_path(),
            local_version: self.local_version(),
            remote_version,
        }
    }

    /// Return a usable encoder binary, downloading a fresh build when the
    /// local one is missing or out of date.
    ///
    /// When the version check fails but a binary is already installed, the
    /// installed binary is used.
    pub fn ensure_binary(&self) -> Result<PathBuf, EncodeError> {
        let binary = self.binary_path();
        let local = self.local_version();

        let remote = match self.source.remote_version() {
            Ok(version) => version,
            Err(e) if binary.is_file() => {
                warn!(
                    "Could not check for encoder updates ({:#}); using {}",
                    e,
                    binary.display()
                );
                return Ok(binary);
            }
            Err(e) => return Err(EncodeError::ToolFetch(format!("{:#}", e))),
        };

        if let Some(local) = &local {
            if versions_match(local, &remote) {
                debug!("Encoder {} is up to date", local);
                return Ok(binary);
            }
            info!("Updating encoder {} -> {}", local, remote);
        } else {
            info!("Installing encoder {}", remote);
        }

        self.install(&remote)
            .map_err(|e| EncodeError::ToolFetch(format!("{:#}", e)))?;

        Ok(binary)
    }

    fn install(&self, version: &str) -> Result<()> {
        fs::create_dir_all(&self.tools_dir)
            .with_context(|| format!("Failed to create {}", self.tools_dir.display()))?;

        let archive = self.archive_path();
        self.source.download_archive(&archive)?;

        extract_executable(&archive, &self.executable, &self.binary_path())?;
        fs::write(self.version_path(), version).with_context(|| {
            format!(
                "Failed to write version marker {}",
                self.version_path().display()
            )
        })?;

        if let Err(e) = fs::remove_file(&archive) {
            warn!("Could not remove {}: {}", archive.display(), e);
        }

        info!("Installed {}", self.binary_path().display());
        Ok(())
    }
}

fn versions_match(local: &str, remote: &str) -> bool {
    local.trim().eq_ignore_ascii_case(remote.trim())
}

/// Copy the first archive file entry whose name ends with `executable` to
/// `dest`, ignoring case.
///
/// Build archives nest the binary under a versioned folder, so the whole
/// entry path is matched on its suffix.
pub fn extract_executable(archive: &Path, executable: &str, dest: &Path) -> Result<()> {
    let file =
        File::open(archive).with_context(|| format!("Failed to open {}", archive.display()))?;
    let mut zip = zip::ZipArchive::new(file)
        .with_context(|| format!("{} is not a valid zip archive", archive.display()))?;

    let wanted = executable.to_lowercase();

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        if !entry.is_file() {
            continue;
        }

        if !entry.name().to_lowercase().ends_with(&wanted) {
            continue;
        }

        debug!("Extracting {} from {}", entry.name(), archive.display());

        // Write beside the target first so a half-written binary is never picked up
        let partial = dest.with_extension("partial");
        {
            let mut out = File::create(&partial)
                .with_context(|| format!("Failed to create {}", partial.display()))?;
            io::copy(&mut entry, &mut out)
                .with_context(|| format!("Failed to extract {}", executable))?;
        }
        make_executable(&partial)?;
        fs::rename(&partial, dest)
            .with_context(|| format!("Failed to move binary to {}", dest.display()))?;

        return Ok(());
    }

    anyhow::bail!("{} not found in {}", executable, archive.display())
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .with_context(|| format!("Failed to mark {} executable", path.display()))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}
