// Background batch worker, process registry and shutdown protocol

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, ExitStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::probe::MediaProbe;
use super::tools::ToolProvisioner;
use super::{
    EncodeError, EncodePlan, EncodeReport, EncodeState, MediaFile, ProgressUpdate, build_encode_cmd,
    build_plan, discover, format_encode_cmd, run_encode, select_single, write_debug_log,
};
use crate::config::EncoderOptions;

/// How often a finished encoder is polled for its exit status
const REAP_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Message from the worker to whoever drives the UI
#[derive(Debug, Clone)]
pub enum WorkerMessage {
    /// Discovery finished; `total_files` will be attempted
    RunStarted { total_files: usize },

    /// Encoder spawned for a file
    JobStarted {
        job_id: Uuid,
        input: PathBuf,
        position: usize,
        total: usize,
    },

    /// Progress update during encoding
    Progress(ProgressUpdate),

    /// Encoder exited on its own
    JobCompleted {
        job_id: Uuid,
        input: PathBuf,
        output: PathBuf,
        success: bool,
    },

    /// File was skipped or the encoder could not be supervised
    JobFailed { input: PathBuf, error: String },

    /// Encoder was killed by a shutdown request
    JobKilled { job_id: Uuid, input: PathBuf },
}

/// Running encoder processes, keyed by job id.
///
/// Kill and reap both go through the same lock, so a shutdown racing a
/// natural exit either kills a live child or finds nothing to kill.
#[derive(Debug, Clone, Default)]
pub struct ProcessRegistry {
    inner: Arc<Mutex<HashMap<Uuid, Child>>>,
}

impl ProcessRegistry {
    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Child>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of processes not yet reaped
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forcefully kill every registered process; returns how many were signalled
    pub fn kill_all(&self) -> usize {
        let mut processes = self.lock();
        let mut killed = 0;

        for (job_id, child) in processes.iter_mut() {
            match child.kill() {
                Ok(()) => {
                    debug!("Killed encoder {} (pid {})", job_id, child.id());
                    killed += 1;
                }
                // Already exited; nothing to do
                Err(e) => debug!("Encoder {} could not be killed: {}", job_id, e),
            }
        }

        killed
    }
}

/// Cloneable handle that requests shutdown and tracks running encoders
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle {
    requested: Arc<AtomicBool>,
    registry: ProcessRegistry,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop starting new files and kill whatever is running.
    ///
    /// Safe to call repeatedly and from any thread.
    pub fn shutdown(&self) {
        self.requested.store(true, Ordering::SeqCst);
        let killed = self.registry.kill_all();
        if killed > 0 {
            info!("Killed {} running encoder process(es)", killed);
        }
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    /// Track a freshly spawned child.
    ///
    /// Returns false (after killing and reaping the child) when shutdown was
    /// already requested.
    pub fn register(&self, job_id: Uuid, mut child: Child) -> bool {
        let mut processes = self.registry.lock();

        if self.is_requested() {
            drop(processes);
            let _ = child.kill();
            let _ = child.wait();
            return false;
        }

        processes.insert(job_id, child);
        true
    }

    /// Wait for a registered child to exit and remove it from the registry.
    ///
    /// The lock is only held while polling, so `shutdown` can kill the child
    /// at any point until it has been reaped.
    pub fn reap(&self, job_id: Uuid) -> io::Result<Option<ExitStatus>> {
        loop {
            {
                let mut processes = self.registry.lock();
                let Some(child) = processes.get_mut(&job_id) else {
                    return Ok(None);
                };

                match child.try_wait() {
                    Ok(Some(status)) => {
                        processes.remove(&job_id);
                        return Ok(Some(status));
                    }
                    Ok(None) => {}
                    Err(e) => {
                        processes.remove(&job_id);
                        return Err(e);
                    }
                }
            }

            thread::sleep(REAP_POLL_INTERVAL);
        }
    }
}

/// Where the encoder binary comes from
pub enum EncoderSource {
    /// Download / refresh through the provisioner
    Provision(ToolProvisioner),
    /// Use this binary as-is
    Path(PathBuf),
}

impl EncoderSource {
    /// Where the binary is or will be, without provisioning it
    pub fn binary_path(&self) -> PathBuf {
        match self {
            EncoderSource::Provision(provisioner) => provisioner.binary_path(),
            EncoderSource::Path(path) => path.clone(),
        }
    }

    fn resolve(&self) -> Result<PathBuf, EncodeError> {
        match self {
            EncoderSource::Provision(provisioner) => provisioner.ensure_binary(),
            EncoderSource::Path(path) => Ok(path.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of one batch run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Encoder exited with success
    pub completed: usize,
    pub failed: Vec<FileFailure>,
    pub killed: usize,
    /// Files never started because of shutdown
    pub skipped: usize,
    pub cancelled: bool,
}

/// Drives a whole batch, one file at a time
pub struct Orchestrator {
    options: EncoderOptions,
    probe: Box<dyn MediaProbe + Send>,
    encoder: EncoderSource,
    shutdown: ShutdownHandle,
}

impl Orchestrator {
    pub fn new(
        options: EncoderOptions,
        probe: Box<dyn MediaProbe + Send>,
        encoder: EncoderSource,
    ) -> Self {
        Self {
            options,
            probe,
            encoder,
            shutdown: ShutdownHandle::new(),
        }
    }

    pub fn options(&self) -> &EncoderOptions {
        &self.options
    }

    pub fn encoder(&self) -> &EncoderSource {
        &self.encoder
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Run the batch on a background thread, streaming messages over a channel
    pub fn spawn(self) -> (JoinHandle<Result<RunSummary, EncodeError>>, Receiver<WorkerMessage>) {
        let (tx, rx) = mpsc::channel();

        let handle = thread::spawn(move || {
            self.run(|msg| {
                let _ = tx.send(msg);
            })
        });

        (handle, rx)
    }

    /// Validate the options and list the files this run will attempt.
    ///
    /// Returns the files in encode order and the absolute output folder. Nothing
    /// is written to disk.
    pub fn prepare(&self) -> Result<(Vec<MediaFile>, PathBuf), EncodeError> {
        self.options.validate()?;

        if let Some(track) = self.options.audio_track {
            warn!(
                "Audio track override ({}) is not supported; using automatic selection",
                track
            );
        }

        let source = &self.options.source_folder;
        debug!(
            "Searching {} for *.[mkv|mp4|webm|avi|ogm] files",
            source.display()
        );
        let mut files = discover(source)?;
        info!("Found {} files in {}", files.len(), source.display());

        if self.options.single_file {
            let index = self.options.file_index.ok_or_else(|| {
                EncodeError::ConfigValidation(vec![
                    "File Index must be provided when using Single File mode".to_string(),
                ])
            })?;

            files = match select_single(files, index) {
                Ok(file) => vec![file],
                Err(e) => {
                    error!("{}", e);
                    return Err(e);
                }
            };
        }

        let output_dir = self.options.resolved_output_folder()?;
        Ok((files, output_dir))
    }

    /// Probe and plan every file without provisioning or encoding anything
    pub fn plan_all(&self) -> Result<Vec<(MediaFile, Result<EncodePlan, EncodeError>)>, EncodeError> {
        let (files, output_dir) = self.prepare()?;

        Ok(files
            .into_iter()
            .map(|file| {
                let plan = self
                    .probe
                    .probe(&file.path)
                    .map(|probe| build_plan(&self.options, &output_dir, &file, &probe));
                (file, plan)
            })
            .collect())
    }

    /// Validate, discover, provision, then encode each file in order
    pub fn run<F>(&self, mut on_event: F) -> Result<RunSummary, EncodeError>
    where
        F: FnMut(WorkerMessage),
    {
        let (files, output_dir) = self.prepare()?;
        create_output_folder(&output_dir)?;

        let mut summary = RunSummary::default();

        if self.shutdown.is_requested() {
            summary.cancelled = true;
            summary.skipped = files.len();
            return Ok(summary);
        }

        let encoder = self.encoder.resolve()?;
        let total = files.len();
        on_event(WorkerMessage::RunStarted { total_files: total });

        for (position, file) in files.iter().enumerate() {
            if self.shutdown.is_requested() {
                info!("Shutdown requested; skipping {} remaining file(s)", total - position);
                summary.cancelled = true;
                summary.skipped = total - position;
                break;
            }

            match self.encode_file(&encoder, &output_dir, file, position, total, &mut on_event) {
                Ok((report, output)) => {
                    self.record(&mut summary, &output_dir, file, output, report, &mut on_event)
                }
                Err(e) if e.is_per_file() => {
                    error!("{}", e);
                    on_event(WorkerMessage::JobFailed {
                        input: file.path.clone(),
                        error: e.to_string(),
                    });
                    summary.failed.push(FileFailure {
                        path: file.path.clone(),
                        reason: e.to_string(),
                    });
                }
                Err(e) => {
                    error!("{}", e);
                    return Err(e);
                }
            }
        }

        Ok(summary)
    }

    fn encode_file<F>(
        &self,
        encoder: &Path,
        output_dir: &Path,
        file: &MediaFile,
        position: usize,
        total: usize,
        on_event: &mut F,
    ) -> Result<(EncodeReport, PathBuf), EncodeError>
    where
        F: FnMut(WorkerMessage),
    {
        let probe = self.probe.probe(&file.path)?;
        debug!(
            "{}: {}x{} @ {:.3} fps, {:.1}s, {} audio / {} subtitle track(s)",
            file.file_name(),
            probe.width,
            probe.height,
            probe.frame_rate,
            probe.duration_s,
            probe.audio_tracks.len(),
            probe.subtitle_tracks.len()
        );

        let plan = build_plan(&self.options, output_dir, file, &probe);
        plan.ensure_output_dir()?;

        let cmd = build_encode_cmd(encoder, &plan, &self.options);
        let cmdline = format_encode_cmd(&cmd);
        debug!("Starting ffmpeg with the following arguments: {}", cmdline);
        write_debug_log(output_dir, &format!("[start] {}", cmdline)).ok();

        let job_id = Uuid::new_v4();
        info!(
            "[{}/{}] Encoding {} -> {}",
            position + 1,
            total,
            file.file_name(),
            plan.output_path.display()
        );
        on_event(WorkerMessage::JobStarted {
            job_id,
            input: file.path.clone(),
            position,
            total,
        });

        let report = run_encode(cmd, &file.path, plan.duration_s, &self.shutdown, job_id, |update| {
            on_event(WorkerMessage::Progress(update.clone()))
        })?;

        Ok((report, plan.output_path))
    }

    fn record<F>(
        &self,
        summary: &mut RunSummary,
        output_dir: &Path,
        file: &MediaFile,
        output: PathBuf,
        report: EncodeReport,
        on_event: &mut F,
    ) where
        F: FnMut(WorkerMessage),
    {
        let job_id = report.handle.job_id;

        match report.state() {
            EncodeState::Killed => {
                warn!("Encoding of {} was killed", file.path.display());
                summary.killed += 1;
                on_event(WorkerMessage::JobKilled {
                    job_id,
                    input: file.path.clone(),
                });
            }
            EncodeState::Completed => {
                let success = report.exit_status.is_some_and(|s| s.success());
                if success {
                    info!("Finished {}", output.display());
                    summary.completed += 1;
                } else {
                    let status = report
                        .exit_status
                        .map(|s| s.to_string())
                        .unwrap_or_default();
                    warn!(
                        "Encoder exited with {} for {}:\n{}",
                        status,
                        file.path.display(),
                        report.stderr_tail
                    );
                    write_debug_log(
                        output_dir,
                        &format!(
                            "[failed] {} ({})\n{}",
                            file.path.display(),
                            status,
                            report.stderr_tail
                        ),
                    )
                    .ok();
                    summary.failed.push(FileFailure {
                        path: file.path.clone(),
                        reason: format!("encoder exited with {}", status),
                    });
                }
                on_event(WorkerMessage::JobCompleted {
                    job_id,
                    input: file.path.clone(),
                    output,
                    success,
                });
            }
            EncodeState::Failed | EncodeState::Starting | EncodeState::Running => {
                let reason = report
                    .error
                    .unwrap_or_else(|| "encoder exit status unavailable".to_string());
                error!("Encoding of {} failed: {}", file.path.display(), reason);
                on_event(WorkerMessage::JobFailed {
                    input: file.path.clone(),
                    error: reason.clone(),
                });
                summary.failed.push(FileFailure {
                    path: file.path.clone(),
                    reason,
                });
            }
        }
    }
}

fn create_output_folder(dir: &Path) -> Result<(), EncodeError> {
    if dir.exists() {
        return Ok(());
    }

    info!("Creating output folder {}", dir.display());
    fs::create_dir_all(dir)
        .map_err(|e| EncodeError::io(format!("Failed to create output folder {}", dir.display()), e))
}
