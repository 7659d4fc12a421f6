//! Processor (C10): dequeues jobs from the persistent [`Queue`] and drives
//! each through the full posting pipeline — segment, encode, post, verify,
//! PAR2, NZB — bounded by `max_concurrent_uploads` concurrent jobs.
//!
//! Owns exactly the things no other module does: how many jobs run at once,
//! whether dequeuing is currently paused, and the in-memory snapshot of
//! what's running right now. Everything else is delegated to its peers
//! (Poster, Verifier, Par2Orchestrator, NzbBuilder) which know nothing about
//! the queue or about each other.

mod hook;

use crate::config::{Config, ConfigUpdate, ProviderConfig};
use crate::error::{Error, Result};
use crate::nzb::NzbBuilder;
use crate::par2::Par2Orchestrator;
use crate::pool::{LeaseKind, Pool};
use crate::poster::Poster;
use crate::provider::ProviderConnection;
use crate::queue::{FileJob, Queue, QueueStats};
use crate::speed_limiter::SpeedLimiter;
use crate::types::{
    Event, JobId, Priority, ProgressEntry, ProviderHealth, ProviderTestResult, QueueItem,
    RunningJobDetails, Status,
};
use crate::verifier::Verifier;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, RwLock, Semaphore, broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Sentinel prefix marking a pseudo-path enqueued by the watcher's
/// `single_nzb_per_folder` mode: everything directly inside the named
/// directory becomes one multi-file NZB.
const FOLDER_PREFIX: &str = "FOLDER:";

const EVENT_CHANNEL_CAPACITY: usize = 256;
const DEQUEUE_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Drives jobs from [`Queue`] through segmentation, posting, verification,
/// PAR2, and NZB generation.
pub struct Processor {
    queue: Queue,
    pool: Pool,
    config: RwLock<Config>,
    speed_limiter: SpeedLimiter,
    par2: Option<Arc<Par2Orchestrator>>,
    events_tx: broadcast::Sender<Event>,
    running: RwLock<HashMap<JobId, RunningJobDetails>>,
    paused: Arc<AtomicBool>,
    concurrency: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl Processor {
    /// Build a processor bound to `queue`, with its own connection pool and,
    /// if PAR2 is enabled, a [`Par2Orchestrator`] resolved against `PATH`
    /// up front so a missing binary fails fast at startup rather than on the
    /// first job.
    pub fn new(config: Config, queue: Queue, cancel: CancellationToken) -> Result<Self> {
        let pool = Pool::new(&config.providers, config.pool.clone());
        let speed_limiter = SpeedLimiter::new(non_zero(config.posting.throttle_rate));
        let par2 = if config.par2.enabled {
            Some(Arc::new(Par2Orchestrator::from_config(
                config.par2.clone(),
            )?))
        } else {
            None
        };
        let concurrency = Arc::new(Semaphore::new(config.queue.max_concurrent_uploads.max(1)));
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            queue,
            pool,
            config: RwLock::new(config),
            speed_limiter,
            par2,
            events_tx,
            running: RwLock::new(HashMap::new()),
            paused: Arc::new(AtomicBool::new(false)),
            concurrency,
            cancel,
        })
    }

    /// Subscribe to lifecycle and operational events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events_tx.subscribe()
    }

    /// Whether dequeuing is currently paused.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    /// Pause dequeuing new jobs. Jobs already in flight run to completion.
    pub fn pause(&self) {
        if !self.paused.swap(true, Ordering::Relaxed) {
            let _ = self.events_tx.send(Event::Paused { reason: None });
        }
    }

    /// Resume dequeuing.
    pub fn resume(&self) {
        if self.paused.swap(false, Ordering::Relaxed) {
            let _ = self.events_tx.send(Event::Resumed);
        }
    }

    /// Signal the dequeue loop to stop. Jobs already in flight run to
    /// completion; [`Processor::run`] returns once its current iteration
    /// observes the cancellation.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    async fn auto_pause(&self, reason: String) {
        if !self.paused.swap(true, Ordering::Relaxed) {
            warn!(%reason, "auto-pausing");
            let _ = self.events_tx.send(Event::Paused {
                reason: Some(reason),
            });
        }
    }

    /// Snapshot of every job currently processing.
    pub async fn running_jobs(&self) -> Vec<RunningJobDetails> {
        self.running.read().await.values().cloned().collect()
    }

    /// Whether `path` is the source of a job currently processing.
    ///
    /// Used by the watcher and manual re-enqueue paths to avoid
    /// double-submitting a file that's already mid-flight.
    pub async fn is_path_being_processed(&self, path: &Path) -> bool {
        self.running.read().await.values().any(|j| j.path == path)
    }

    /// Snapshot the current configuration, for the REST front-end's config
    /// endpoint.
    pub async fn current_config(&self) -> Config {
        self.config.read().await.clone()
    }

    /// Apply a partial, hot-reloadable configuration change.
    pub async fn update_config(&self, update: ConfigUpdate) -> Result<()> {
        let mut config = self.config.write().await;
        if let Some(throttle) = update.throttle_rate {
            config.posting.throttle_rate = throttle.unwrap_or(0);
            self.speed_limiter
                .set_limit(non_zero(config.posting.throttle_rate));
        }
        if let Some(providers) = update.providers {
            config.providers = providers;
            self.pool.reconfigure(&config.providers).await;
        }
        Ok(())
    }

    /// Current queue row counts, overlaid with the in-memory running count.
    pub async fn queue_stats(&self) -> Result<QueueStats> {
        let mut stats = self.queue.stats().await?;
        stats.running = self.running.read().await.len() as i64;
        Ok(stats)
    }

    /// Enqueue a file (or `FOLDER:`-prefixed folder pseudo-path) for
    /// posting. Idempotent on `path` per [`Queue::add_file`]; emits
    /// [`Event::Queued`] on first insertion.
    pub async fn add_file(&self, path: PathBuf, size: u64, priority: Priority) -> Result<JobId> {
        let job = FileJob {
            path,
            size,
            priority,
        };
        let name = job_display_name(&job);
        let id = self.queue.add_file(job).await?;
        let _ = self.events_tx.send(Event::Queued { id, name });
        Ok(id)
    }

    /// Merged view of every job across `pending`, `completed`, `errored`,
    /// and the in-memory running set, for the REST front-end's queue
    /// listing. Rows currently dequeued (running) live in none of the three
    /// persisted tables, so they are synthesized from [`Processor::running_jobs`].
    pub async fn queue_items(&self) -> Result<Vec<QueueItem>> {
        let mut items = Vec::new();

        for row in self.queue.list_pending().await? {
            items.push(QueueItem {
                id: row.id,
                path: PathBuf::from(&row.path),
                file_name: job_display_name(&row.job()),
                size: row.size as u64,
                status: Status::Pending,
                retry_count: row.retry_count as u32,
                priority: Priority::from_i32(row.priority),
                error_message: None,
                created_at: timestamp(row.created_at),
                updated_at: timestamp(row.created_at),
                completed_at: None,
                nzb_path: None,
            });
        }

        for job in self.running.read().await.values() {
            items.push(QueueItem {
                id: job.job_id,
                path: job.path.clone(),
                file_name: job.file_name.clone(),
                size: job.size,
                status: Status::Running,
                retry_count: 0,
                priority: Priority::Normal,
                error_message: None,
                created_at: chrono::Utc::now(),
                updated_at: chrono::Utc::now(),
                completed_at: None,
                nzb_path: None,
            });
        }

        for row in self.queue.list_completed().await? {
            items.push(QueueItem {
                id: row.id,
                path: PathBuf::from(&row.path),
                file_name: Path::new(&row.path)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| row.path.clone()),
                size: row.size as u64,
                status: Status::Complete,
                retry_count: 0,
                priority: Priority::from_i32(row.priority),
                error_message: None,
                created_at: timestamp(row.created_at),
                updated_at: timestamp(row.completed_at),
                completed_at: Some(timestamp(row.completed_at)),
                nzb_path: Some(PathBuf::from(&row.nzb_path)),
            });
        }

        for row in self.queue.list_errored().await? {
            items.push(QueueItem {
                id: row.id,
                path: PathBuf::from(&row.path),
                file_name: Path::new(&row.path)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| row.path.clone()),
                size: row.size as u64,
                status: Status::Error,
                retry_count: row.retry_count as u32,
                priority: Priority::from_i32(row.priority),
                error_message: Some(row.error_message.clone()),
                created_at: timestamp(row.created_at),
                updated_at: timestamp(row.errored_at),
                completed_at: None,
                nzb_path: None,
            });
        }

        Ok(items)
    }

    /// Move an errored job back to `pending` with `retry_count` reset to 0.
    pub async fn retry_job(&self, id: JobId) -> Result<()> {
        self.queue.retry_errored(id).await
    }

    /// Remove a job by id from whichever table it currently lives in.
    pub async fn remove_job(&self, id: JobId) -> Result<()> {
        self.queue.remove(id).await
    }

    /// Re-prioritize a pending job.
    pub async fn set_priority(&self, id: JobId, priority: Priority) -> Result<()> {
        self.queue.set_priority(id, priority).await
    }

    /// Point-in-time health snapshot of every configured provider's bucket.
    pub async fn provider_health(&self) -> Vec<ProviderHealth> {
        self.pool.health_snapshot().await
    }

    /// One-shot connectivity probe against a provider configuration, without
    /// touching the pool (does not consume or park a lease).
    pub async fn test_provider(&self, config: &ProviderConfig) -> ProviderTestResult {
        let provider = format!("{}:{}", config.host, config.port);
        let started = std::time::Instant::now();
        match ProviderConnection::connect(config).await {
            Ok(conn) => {
                conn.close().await;
                ProviderTestResult {
                    provider,
                    success: true,
                    message: "connected".into(),
                    latency_ms: Some(started.elapsed().as_millis() as u64),
                }
            }
            Err(e) => ProviderTestResult {
                provider,
                success: false,
                message: e.to_string(),
                latency_ms: None,
            },
        }
    }

    /// Run the dequeue loop until the processor's cancellation token fires.
    /// Spawns one task per job, bounded by `max_concurrent_uploads`
    /// concurrently; each task carries its own permit and releases it on
    /// completion.
    pub async fn run(self: Arc<Self>) {
        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            if self.paused.load(Ordering::Relaxed) {
                tokio::time::sleep(DEQUEUE_POLL_INTERVAL).await;
                continue;
            }

            if self.pool.all_backed_off(LeaseKind::Post).await {
                self.auto_pause("all posting providers are backed off".into())
                    .await;
                continue;
            }

            let permit = tokio::select! {
                p = self.concurrency.clone().acquire_owned() => match p {
                    Ok(p) => p,
                    Err(_) => break,
                },
                () = self.cancel.cancelled() => break,
            };

            match self.queue.receive().await {
                Ok(Some((id, job))) => {
                    let this = self.clone();
                    tokio::spawn(async move {
                        this.process_one(id, job, permit).await;
                    });
                }
                Ok(None) => {
                    drop(permit);
                    tokio::time::sleep(DEQUEUE_POLL_INTERVAL).await;
                }
                Err(e) => {
                    drop(permit);
                    error!(error = %e, "failed to dequeue next job");
                    tokio::time::sleep(DEQUEUE_POLL_INTERVAL).await;
                }
            }
        }
    }

    async fn process_one(self: Arc<Self>, id: JobId, job: FileJob, _permit: OwnedSemaphorePermit) {
        let files = match files_for_job(&job) {
            Ok(files) => files,
            Err(e) => {
                error!(job_id = %id, error = %e, "failed to resolve job source files");
                let _ = self.queue.mark_error(id, &job, &e.to_string(), 0).await;
                let _ = self.events_tx.send(Event::Errored {
                    id,
                    message: e.to_string(),
                });
                return;
            }
        };
        let display_name = job_display_name(&job);

        self.running.write().await.insert(
            id,
            RunningJobDetails {
                job_id: id,
                file_name: display_name.clone(),
                size: job.size,
                path: job.path.clone(),
                progress_list: Vec::new(),
            },
        );
        let _ = self.events_tx.send(Event::Started {
            id,
            name: display_name,
        });

        let result = self.run_pipeline(id, &job, &files).await;

        self.running.write().await.remove(&id);

        match result {
            Ok(nzb_path) => {
                info!(job_id = %id, nzb_path = %nzb_path.display(), "job completed");
                if let Err(e) = self
                    .queue
                    .complete(id, &nzb_path.to_string_lossy(), &job)
                    .await
                {
                    error!(job_id = %id, error = %e, "failed to record completion");
                }
                let _ = self.events_tx.send(Event::Completed {
                    id,
                    nzb_path: nzb_path.clone(),
                });

                let hook_config = {
                    let config = self.config.read().await;
                    if config.queue.delete_original_file {
                        remove_job_source(&job);
                    }
                    config.post_upload_script.clone()
                };
                if let Err(e) = hook::run(&hook_config, &nzb_path).await {
                    warn!(job_id = %id, error = %e, "post-upload hook failed");
                }
            }
            Err(e) => {
                error!(job_id = %id, error = %e, "job failed");
                if let Err(qe) = self.queue.mark_error(id, &job, &e.to_string(), 0).await {
                    error!(job_id = %id, error = %qe, "failed to record job error");
                }
                let _ = self.events_tx.send(Event::Errored {
                    id,
                    message: e.to_string(),
                });
            }
        }
    }

    async fn run_pipeline(self: &Arc<Self>, id: JobId, job: &FileJob, files: &[PathBuf]) -> Result<PathBuf> {
        let config = self.config.read().await.clone();

        let worker_count: usize = config
            .providers
            .iter()
            .filter(|p| p.enabled && !p.check_only)
            .map(|p| p.max_connections)
            .sum::<usize>()
            .max(1);

        let poster = Poster::new(
            self.pool.clone(),
            config.posting.clone(),
            self.speed_limiter.clone(),
            worker_count,
            self.paused.clone(),
        );

        let nzb_builder = Arc::new(NzbBuilder::new(config.posting.from.clone()));
        let (progress_tx, progress_rx) = mpsc::channel(32);
        let progress_task = self.spawn_progress_collector(id, progress_rx);

        // PAR2 volumes join the posting set up front in safe (`wait_for_par2`)
        // mode; in parallel mode they're generated alongside the main posting
        // run and posted afterward, degrading gracefully if generation fails.
        let mut post_files: Vec<PathBuf> = files.to_vec();
        let mut par2_handle = None;

        if let Some(par2) = self.par2.clone() {
            if config.par2.wait_for_par2 {
                let volumes = par2.create(files, Some(progress_tx.clone()), &self.cancel).await?;
                post_files.extend(volumes);
            } else {
                let files = files.to_vec();
                let progress_tx = progress_tx.clone();
                let cancel = self.cancel.clone();
                par2_handle = Some(tokio::spawn(async move {
                    par2.create(&files, Some(progress_tx), &cancel).await
                }));
            }
        }

        let (verification_tx, verify_task) = if config.post_check.enabled {
            let (tx, rx) = mpsc::channel(worker_count * 4);
            let verifier = Verifier::new(
                self.pool.clone(),
                config.posting.clone(),
                config.post_check.clone(),
                self.speed_limiter.clone(),
                self.paused.clone(),
            );
            let verifier_cancel = self.cancel.clone();
            let verifier_nzb = nzb_builder.clone();
            let task = tokio::spawn(async move {
                verifier.run(rx, verifier_nzb, &verifier_cancel).await
            });
            (Some(tx), Some(task))
        } else {
            (None, None)
        };

        let post_outcome = poster
            .post(
                &post_files,
                &nzb_builder,
                verification_tx,
                Some(progress_tx.clone()),
                &self.cancel,
            )
            .await?;

        drop(progress_tx);
        let _ = progress_task.await;

        if let Some(task) = verify_task {
            let outcome = task.await.unwrap_or_default();
            if outcome.permanent_failures > 0 {
                warn!(
                    job_id = %id,
                    failures = outcome.permanent_failures,
                    "some articles failed permanent verification"
                );
            }
        }

        if post_outcome.article_errors > 0 && nzb_builder.article_count() == 0 {
            return Err(Error::ArticleRejected {
                provider: "all".into(),
                code: 0,
                text: format!("{} articles failed to post", post_outcome.article_errors),
            });
        }

        if let Some(handle) = par2_handle {
            match handle.await {
                Ok(Ok(volumes)) => {
                    if let Err(e) = poster.post(&volumes, &nzb_builder, None, None, &self.cancel).await {
                        warn!(job_id = %id, error = %e, "posting PAR2 volumes failed; job completes without recovery data");
                        let _ = self.events_tx.send(Event::Par2Degraded {
                            id,
                            reason: e.to_string(),
                        });
                    }
                }
                Ok(Err(e)) => {
                    warn!(job_id = %id, error = %e, "PAR2 generation failed; job completes without recovery data");
                    let _ = self.events_tx.send(Event::Par2Degraded {
                        id,
                        reason: e.to_string(),
                    });
                }
                Err(e) => {
                    warn!(job_id = %id, error = %e, "PAR2 task panicked");
                }
            }
        }

        let output_base = nzb_output_base(job, files, &config);
        let nzb_path = nzb_builder.generate(&output_base, &config.nzb_compression)?;

        if let (Some(par2), Some(main_file)) = (self.par2.as_ref(), files.first()) {
            if let Err(e) = par2.cleanup(main_file).await {
                warn!(job_id = %id, error = %e, "failed to clean up par2 temporary outputs");
            }
        }

        Ok(nzb_path)
    }

    fn spawn_progress_collector(
        self: &Arc<Self>,
        id: JobId,
        mut rx: mpsc::Receiver<ProgressEntry>,
    ) -> tokio::task::JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            while let Some(entry) = rx.recv().await {
                let mut running = this.running.write().await;
                if let Some(details) = running.get_mut(&id) {
                    match details.progress_list.iter_mut().find(|p| p.kind == entry.kind) {
                        Some(existing) => *existing = entry,
                        None => details.progress_list.push(entry),
                    }
                }
            }
        })
    }
}

fn files_for_job(job: &FileJob) -> Result<Vec<PathBuf>> {
    let path_str = job.path.to_string_lossy();
    let Some(dir) = path_str.strip_prefix(FOLDER_PREFIX) else {
        return Ok(vec![job.path.clone()]);
    };

    let dir = PathBuf::from(dir);
    let mut files = Vec::new();
    for entry in std::fs::read_dir(&dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    if files.is_empty() {
        return Err(Error::InvalidJob(format!(
            "{} contains no regular files to post",
            dir.display()
        )));
    }
    Ok(files)
}

fn timestamp(unix_secs: i64) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::from_timestamp(unix_secs, 0).unwrap_or_else(chrono::Utc::now)
}

fn job_display_name(job: &FileJob) -> String {
    let path_str = job.path.to_string_lossy();
    let real = path_str.strip_prefix(FOLDER_PREFIX).unwrap_or(&path_str);
    Path::new(real)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| real.to_string())
}

fn remove_job_source(job: &FileJob) {
    let path_str = job.path.to_string_lossy();
    if let Some(dir) = path_str.strip_prefix(FOLDER_PREFIX) {
        let _ = std::fs::remove_dir_all(dir);
    } else if let Err(e) = std::fs::remove_file(&job.path) {
        warn!(path = %job.path.display(), error = %e, "failed to delete source after completion");
    }
}

fn nzb_output_base(job: &FileJob, files: &[PathBuf], config: &Config) -> PathBuf {
    let path_str = job.path.to_string_lossy();
    let source_base = if let Some(dir) = path_str.strip_prefix(FOLDER_PREFIX) {
        PathBuf::from(dir)
    } else {
        files
            .first()
            .cloned()
            .unwrap_or_else(|| job.path.clone())
            .with_extension("")
    };

    let Some(output_dir) = &config.queue.output_dir else {
        return source_base;
    };

    let root = config.watcher.as_ref().map(|w| w.watch_dir.as_path());
    let flattened = source_base
        .file_name()
        .map(Path::new)
        .unwrap_or(&source_base);
    let relative = root
        .and_then(|r| source_base.strip_prefix(r).ok())
        .unwrap_or(flattened);
    output_dir.join(relative)
}

fn non_zero(rate: u64) -> Option<u64> {
    if rate == 0 { None } else { Some(rate) }
}
