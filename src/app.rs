use crate::cli::Cli;
use anyhow::{Context, Result};
use kuroenc::config::{Config, EncoderOptions};
use kuroenc::engine::{
    self, EncoderSource, FfprobeProbe, HttpToolSource, Orchestrator, RunSummary, ShutdownHandle,
    ToolProvisioner, WorkerMessage,
};
use std::io::{IsTerminal, Write};
use std::process;
use tracing::warn;
use tracing_subscriber::EnvFilter;

pub fn run(cli: Cli) {
    init_tracing(cli.verbose);

    if let Err(e) = execute(cli) {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "kuroenc=debug"
    } else {
        "kuroenc=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    match &cli.config {
        Some(path) => Config::load_from(path),
        None => Ok(Config::load().unwrap_or_else(|e| {
            warn!("Using built-in defaults: {:#}", e);
            Config::default()
        })),
    }
}

/// CLI values win over the config file, which wins over built-in defaults
fn build_options(cli: &Cli, config: &Config) -> EncoderOptions {
    let mut options = EncoderOptions::with_defaults(
        &cli.source_folder,
        &cli.output_folder,
        &config.defaults,
    );

    options.subtitle_track = cli.subtitle_track;
    options.audio_track = cli.audio_track;
    options.single_file = cli.single_file;
    options.file_index = cli.file_index;

    if let Some(resolution) = cli.resolution {
        options.resolution = resolution;
    }
    if let Some(threads) = cli.threads {
        options.threads = threads;
    }
    if let Some(bitrate) = cli.bitrate {
        options.audio_bitrate = bitrate;
    }
    if let Some(crf) = cli.crf {
        options.crf = crf;
    }

    options
}

fn build_orchestrator(cli: &Cli, config: &Config) -> Result<Orchestrator> {
    let options = build_options(cli, config);
    let probe = FfprobeProbe::new(&config.tools.ffprobe);

    let encoder = match &cli.encoder {
        Some(path) => EncoderSource::Path(path.clone()),
        None => {
            let source = HttpToolSource::new(&config.tools.version_url, &config.tools.archive_url)?;
            EncoderSource::Provision(ToolProvisioner::new(
                config.tools.resolved_dir()?,
                &config.tools.executable,
                Box::new(source),
            ))
        }
    };

    Ok(Orchestrator::new(options, Box::new(probe), encoder))
}

fn execute(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let orchestrator = build_orchestrator(&cli, &config)?;

    if cli.dry_run {
        return dry_run(&orchestrator);
    }

    install_signal_handler(orchestrator.shutdown_handle());

    let (handle, rx) = orchestrator.spawn();
    let mut progress = ProgressLine::new();

    for msg in rx {
        progress.handle(&msg);
    }
    progress.finish();

    let summary = handle
        .join()
        .map_err(|_| anyhow::anyhow!("Encoder worker thread panicked"))??;

    print_summary(&summary);
    Ok(())
}

fn dry_run(orchestrator: &Orchestrator) -> Result<()> {
    let encoder = orchestrator.encoder().binary_path();
    let planned = orchestrator.plan_all()?;

    for (file, plan) in &planned {
        match plan {
            Ok(plan) => {
                let cmd = engine::build_encode_cmd(&encoder, plan, orchestrator.options());
                println!("{}", engine::format_encode_cmd(&cmd));
            }
            Err(e) => println!("# {}: {}", file.path.display(), e),
        }
    }
    println!("Total files: {}", planned.len());

    Ok(())
}

/// Single-line progress readout, only drawn when stdout is a terminal
struct ProgressLine {
    interactive: bool,
    label: String,
    drawn: bool,
}

impl ProgressLine {
    fn new() -> Self {
        Self {
            interactive: std::io::stdout().is_terminal(),
            label: String::new(),
            drawn: false,
        }
    }

    fn handle(&mut self, msg: &WorkerMessage) {
        match msg {
            WorkerMessage::RunStarted { total_files } => {
                println!("Encoding {} file(s)", total_files);
            }
            WorkerMessage::JobStarted {
                input,
                position,
                total,
                ..
            } => {
                let name = input
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                self.label = format!("[{}/{}] {}", position + 1, total, name);
                self.draw(0.0, "");
            }
            WorkerMessage::Progress(update) => self.draw(update.fraction, &update.status),
            WorkerMessage::JobCompleted {
                output, success, ..
            } => {
                self.clear();
                if *success {
                    println!("{} -> {}", self.label, output.display());
                } else {
                    println!("{} failed", self.label);
                }
            }
            WorkerMessage::JobFailed { input, error } => {
                self.clear();
                println!("{} failed: {}", input.display(), error);
            }
            WorkerMessage::JobKilled { .. } => {
                self.clear();
                println!("{} killed", self.label);
            }
        }
    }

    fn draw(&mut self, fraction: f64, status: &str) {
        if !self.interactive {
            return;
        }
        let mut stdout = std::io::stdout().lock();
        let _ = write!(
            stdout,
            "\r{} {:5.1}% {:<8}",
            self.label,
            fraction * 100.0,
            status
        );
        let _ = stdout.flush();
        self.drawn = true;
    }

    fn clear(&mut self) {
        if self.drawn {
            println!();
            self.drawn = false;
        }
    }

    fn finish(&mut self) {
        self.clear();
    }
}

fn print_summary(summary: &RunSummary) {
    println!(
        "Done: {} completed, {} failed, {} killed, {} skipped",
        summary.completed,
        summary.failed.len(),
        summary.killed,
        summary.skipped
    );
    for failure in &summary.failed {
        println!("  {}: {}", failure.path.display(), failure.reason);
    }
}

/// Route Ctrl-C and SIGTERM into a cooperative shutdown of the batch
fn install_signal_handler(shutdown: ShutdownHandle) {
    let installed = ctrlc::set_handler(move || {
        warn!("Interrupted; stopping encoder");
        shutdown.shutdown();
    });

    if let Err(e) = installed.context("Failed to install signal handler") {
        warn!("{:#}", e);
    }
}
