//! Thin CLI front-end over the posting engine: `run` batch-posts a file or
//! directory once and exits; `watch` polls a directory indefinitely, posting
//! new stable files as they appear.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use usenet_poster::config::{Config, WatcherConfig};
use usenet_poster::queue::Queue;
use usenet_poster::types::Priority;
use usenet_poster::watcher::Watcher;
use usenet_poster::{Processor, run_with_shutdown};

#[derive(Parser, Debug)]
#[command(name = "usenet-poster")]
#[command(version, about = "Segment, yEnc-encode, post, and verify large files as NZBs")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    args: RunArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Batch-post a file or directory once and exit (default)
    Run(RunArgs),
    /// Continuously watch a directory and post new stable files as they appear
    Watch(RunArgs),
}

#[derive(clap::Args, Debug, Clone, Default)]
struct RunArgs {
    /// Path to the JSON configuration document
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Directory to scan (or watch) for files to post
    #[arg(short = 'd', long = "dir", value_name = "DIR")]
    dir: Option<PathBuf>,

    /// Single file to post; takes precedence over --dir
    #[arg(short = 'i', long = "input", value_name = "FILE")]
    input: Option<PathBuf>,

    /// Directory NZB outputs are rebased under
    #[arg(short = 'o', long = "output", value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Verbose (debug-level) logging
    #[arg(short = 'v', long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(args: &RunArgs) -> Result<Config, ExitCode> {
    let Some(path) = &args.config else {
        eprintln!("error: --config <path> is required");
        return Err(ExitCode::from(1));
    };
    let mut config = Config::load(path).map_err(|e| {
        eprintln!("error: {e}");
        ExitCode::from(1)
    })?;
    if let Some(dir) = &args.output_dir {
        config.queue.output_dir = Some(dir.clone());
    }
    Ok(config)
}

fn collect_batch_paths(args: &RunArgs) -> Result<Vec<PathBuf>, String> {
    if let Some(input) = &args.input {
        return Ok(vec![input.clone()]);
    }
    let Some(dir) = &args.dir else {
        return Err("one of -i <file> or -d <dir> is required".into());
    };
    let mut files = Vec::new();
    let entries =
        std::fs::read_dir(dir).map_err(|e| format!("failed to read {}: {e}", dir.display()))?;
    for entry in entries {
        let entry = entry.map_err(|e| e.to_string())?;
        if entry.file_type().map_err(|e| e.to_string())?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

async fn run_batch(config: Config, args: RunArgs) -> ExitCode {
    let paths = match collect_batch_paths(&args) {
        Ok(paths) if !paths.is_empty() => paths,
        Ok(_) => {
            eprintln!("error: no files found to post");
            return ExitCode::from(1);
        }
        Err(message) => {
            eprintln!("error: {message}");
            return ExitCode::from(1);
        }
    };

    let queue = match Queue::open(&config.queue.database_path).await {
        Ok(queue) => queue,
        Err(e) => {
            eprintln!("error: failed to open queue database: {e}");
            return ExitCode::from(1);
        }
    };

    let cancel = CancellationToken::new();
    let processor = match Processor::new(config, queue, cancel.clone()) {
        Ok(processor) => Arc::new(processor),
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(1);
        }
    };

    let baseline_errors = match processor.queue_stats().await {
        Ok(stats) => stats.error,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(1);
        }
    };

    let mut enqueue_failures = 0usize;
    for path in &paths {
        let size = match std::fs::metadata(path) {
            Ok(metadata) => metadata.len(),
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "failed to stat file");
                enqueue_failures += 1;
                continue;
            }
        };
        if let Err(e) = processor.add_file(path.clone(), size, Priority::Normal).await {
            tracing::error!(path = %path.display(), error = %e, "failed to enqueue file");
            enqueue_failures += 1;
        }
    }

    let run_handle = tokio::spawn(processor.clone().run());

    loop {
        match processor.queue_stats().await {
            Ok(stats) if stats.pending == 0 && stats.running == 0 => break,
            Ok(_) => tokio::time::sleep(Duration::from_millis(500)).await,
            Err(e) => {
                tracing::error!(error = %e, "failed to poll queue stats");
                break;
            }
        }
    }

    processor.shutdown();
    let _ = run_handle.await;

    let final_errors = match processor.queue_stats().await {
        Ok(stats) => stats.error,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(1);
        }
    };

    if enqueue_failures > 0 || final_errors > baseline_errors {
        ExitCode::from(2)
    } else {
        ExitCode::SUCCESS
    }
}

async fn run_watch(mut config: Config, args: RunArgs) -> ExitCode {
    let Some(dir) = args
        .dir
        .clone()
        .or_else(|| config.watcher.as_ref().map(|w| w.watch_dir.clone()))
    else {
        eprintln!("error: watch mode requires -d <dir> or a configured watcher.watch_dir");
        return ExitCode::from(1);
    };

    let watcher_config = config.watcher.get_or_insert_with(|| WatcherConfig {
        watch_dir: dir.clone(),
        check_interval: Duration::from_secs(10),
        ignore_patterns: Vec::new(),
        min_file_size: 0,
        size_threshold: 0,
        ignore_schedule: None,
        follow_symlinks: false,
        single_nzb_per_folder: false,
    });
    watcher_config.watch_dir = dir;

    if let Err(e) = config.validate() {
        eprintln!("error: {e}");
        return ExitCode::from(1);
    }

    let queue = match Queue::open(&config.queue.database_path).await {
        Ok(queue) => queue,
        Err(e) => {
            eprintln!("error: failed to open queue database: {e}");
            return ExitCode::from(1);
        }
    };

    let watcher_config = config
        .watcher
        .clone()
        .expect("set above before validate");

    let cancel = CancellationToken::new();
    let processor = match Processor::new(config, queue, cancel.clone()) {
        Ok(processor) => Arc::new(processor),
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(1);
        }
    };

    let watcher = match Watcher::new(watcher_config, processor.clone()) {
        Ok(watcher) => watcher,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(1);
        }
    };
    let watcher_task = tokio::spawn(watcher.run(cancel.clone()));

    if let Err(e) = run_with_shutdown(processor).await {
        eprintln!("error: {e}");
        return ExitCode::from(1);
    }
    let _ = watcher_task.await;
    ExitCode::SUCCESS
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let (watch_mode, args) = match cli.command {
        Some(Command::Watch(args)) => (true, args),
        Some(Command::Run(args)) => (false, args),
        None => (false, cli.args),
    };

    init_tracing(args.verbose);

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(code) => return code,
    };

    if watch_mode {
        run_watch(config, args).await
    } else {
        run_batch(config, args).await
    }
}
