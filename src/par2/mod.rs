//! PAR2 orchestrator (C7): drives the external `par2` tool to produce
//! recovery volumes for a set of source files.
//!
//! Grounded in the CLI-subprocess pattern used for PAR2 verification/repair
//! elsewhere in the corpus (`which` for binary discovery, `tokio::process`
//! for execution), generalized from verify/repair to volume creation with
//! progress parsing and cooperative cancellation.

mod progress;

use crate::config::Par2Config;
use crate::error::{Error, Par2Error, Result};
use crate::types::{ProgressEntry, ProgressKind};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub use progress::parse_progress_percent;

/// Drives `par2 create` against one job's source files.
pub struct Par2Orchestrator {
    binary_path: PathBuf,
    config: Par2Config,
}

impl Par2Orchestrator {
    /// Locate the `par2` binary in `PATH` and bind it to `config`.
    pub fn from_config(config: Par2Config) -> Result<Self> {
        let binary_path =
            which::which("par2").map_err(|_| Error::Par2Failed(Par2Error::BinaryNotFound))?;
        Ok(Self {
            binary_path,
            config,
        })
    }

    /// Build recovery volumes for `files` (the first is the main file the
    /// `.par2` index is named after). Returns the paths of every volume
    /// produced, in the order `par2` reports them.
    ///
    /// Progress updates (0.0-100.0) are sent to `progress_tx` as they're
    /// parsed from the tool's stdout, tagged [`ProgressKind::Par2Generation`].
    /// Cancelling `cancel` kills the subprocess and its process group.
    pub async fn create(
        &self,
        files: &[PathBuf],
        progress_tx: Option<mpsc::Sender<ProgressEntry>>,
        cancel: &CancellationToken,
    ) -> Result<Vec<PathBuf>> {
        let Some(main_file) = files.first() else {
            return Err(Error::InvalidJob(
                "par2 create requires at least one source file".into(),
            ));
        };

        std::fs::create_dir_all(&self.config.temp_dir)?;
        let index_path = self.index_path(main_file);

        let mut command = Command::new(&self.binary_path);
        command
            .arg("c")
            .arg(format!("-r{}", self.config.redundancy))
            .arg(format!("-s{}", self.config.volume_size));
        if self.config.max_input_slices > 0 {
            command.arg(format!("-t{}", self.config.max_input_slices));
        }
        for extra in &self.config.extra_options {
            command.arg(extra);
        }
        command.arg(&index_path);
        for file in files {
            command.arg(file);
        }
        command
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            unsafe {
                command.pre_exec(|| {
                    libc::setpgid(0, 0);
                    Ok(())
                });
            }
        }

        let mut child = command
            .spawn()
            .map_err(|e| Error::Par2Failed(Par2Error::ToolFailed {
                status: -1,
                stderr: e.to_string(),
            }))?;

        let stdout = child.stdout.take();
        let progress_task = stdout.map(|stdout| {
            let progress_tx = progress_tx.clone();
            let main_file_name = main_file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if let (Some(percent), Some(tx)) =
                        (parse_progress_percent(&line), progress_tx.as_ref())
                    {
                        let _ = tx
                            .send(ProgressEntry {
                                kind: ProgressKind::Par2Generation,
                                description: main_file_name.clone(),
                                current_bytes: 0,
                                total_bytes: 0,
                                percent,
                                seconds_elapsed: 0,
                                seconds_left: None,
                                kbps: 0.0,
                                is_started: true,
                                is_paused: false,
                            })
                            .await;
                    }
                }
            })
        });

        let stderr_task = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                let mut collected = String::new();
                while let Ok(Some(line)) = lines.next_line().await {
                    collected.push_str(&line);
                    collected.push('\n');
                }
                collected
            })
        });

        let wait_result = tokio::select! {
            status = child.wait() => WaitOutcome::Exited(status),
            () = cancel.cancelled() => {
                kill_process_group(&mut child).await;
                WaitOutcome::Cancelled
            }
        };

        if let Some(task) = progress_task {
            let _ = task.await;
        }
        let stderr_text = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        match wait_result {
            WaitOutcome::Cancelled => Err(Error::Cancelled),
            WaitOutcome::Exited(Ok(status)) if status.success() => {
                self.collect_volumes(main_file)
            }
            WaitOutcome::Exited(Ok(status)) => Err(Error::Par2Failed(Par2Error::ToolFailed {
                status: status.code().unwrap_or(-1),
                stderr: stderr_text,
            })),
            WaitOutcome::Exited(Err(e)) => Err(Error::Par2Failed(Par2Error::ToolFailed {
                status: -1,
                stderr: e.to_string(),
            })),
        }
    }

    /// Remove every PAR2 output (index + volumes) for `main_file`'s job,
    /// retrying briefly since some filesystems hold brief locks after the
    /// tool exits.
    pub async fn cleanup(&self, main_file: &Path) -> Result<()> {
        let volumes = self.collect_volumes(main_file).unwrap_or_default();
        let index = self.index_path(main_file);
        for path in volumes.into_iter().chain(std::iter::once(index)) {
            if !path.exists() {
                continue;
            }
            let mut last_err = None;
            for attempt in 0..5 {
                match std::fs::remove_file(&path) {
                    Ok(()) => {
                        last_err = None;
                        break;
                    }
                    Err(e) => {
                        last_err = Some(e);
                        tokio::time::sleep(std::time::Duration::from_millis(
                            50 * (attempt + 1) as u64,
                        ))
                        .await;
                    }
                }
            }
            if let Some(e) = last_err {
                return Err(Error::Par2Failed(Par2Error::CleanupFailed {
                    path,
                    reason: e.to_string(),
                }));
            }
        }
        Ok(())
    }

    fn index_path(&self, main_file: &Path) -> PathBuf {
        let stem = main_file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "recovery".to_string());
        self.config.temp_dir.join(format!("{stem}.par2"))
    }

    fn collect_volumes(&self, main_file: &Path) -> Result<Vec<PathBuf>> {
        let stem = main_file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "recovery".to_string());
        let prefix = format!("{stem}.");
        let mut volumes = Vec::new();
        for entry in std::fs::read_dir(&self.config.temp_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(&prefix) && name.ends_with(".par2") {
                volumes.push(entry.path());
            }
        }
        volumes.sort();
        Ok(volumes)
    }
}

enum WaitOutcome {
    Exited(std::io::Result<std::process::ExitStatus>),
    Cancelled,
}

#[cfg(unix)]
async fn kill_process_group(child: &mut Child) {
    if let Some(pid) = child.id() {
        unsafe {
            libc::kill(-(pid as i32), libc::SIGTERM);
        }
    }
    let _ = child.kill().await;
}

#[cfg(not(unix))]
async fn kill_process_group(child: &mut Child) {
    let _ = child.kill().await;
}
