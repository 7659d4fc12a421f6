//! Poster (C5): segments, encodes, and posts files through the connection pool.
//!
//! A producer task reads one file sequentially through its [`Segmenter`] (the
//! only way to keep disk I/O one part ahead of the slowest worker) and
//! dispatches encoded articles over a bounded channel to a pool of worker
//! tasks, each of which leases a connection, posts, and retries transient
//! failures with the shared backoff combinator.
//!
//! Poster and [`crate::verifier::Verifier`] are peers, not a call hierarchy:
//! they communicate only through the [`crate::verifier::VerificationRequest`]
//! channel, never through a back-reference.

use crate::article::{Article, ArticleFactory};
use crate::config::PostingConfig;
use crate::error::Result;
use crate::nzb::NzbBuilder;
use crate::pool::{LeaseKind, Pool};
use crate::provider::PostReceipt;
use crate::retry::with_retry;
use crate::segmenter::Segmenter;
use crate::speed_limiter::SpeedLimiter;
use crate::types::{ProgressEntry, ProgressKind};
use crate::verifier::VerificationRequest;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

/// How often a paused worker re-checks whether it can dispatch again.
const PAUSE_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Tallies across one `post()` call (may span several files).
#[derive(Clone, Copy, Debug, Default)]
pub struct PostOutcome {
    /// Articles successfully posted and acknowledged
    pub articles_posted: u32,
    /// Articles that exhausted their retry budget and failed permanently
    pub article_errors: u32,
}

/// Drives the producer/worker posting pipeline against one job's files.
pub struct Poster {
    pool: Pool,
    posting_config: PostingConfig,
    speed_limiter: SpeedLimiter,
    worker_count: usize,
    pause: Arc<AtomicBool>,
}

impl Poster {
    /// Build a poster bound to `pool`, with `worker_count` concurrent posting
    /// workers (normally the sum of `max_connections` across enabled,
    /// non-`check_only` providers). `pause` is the processor's shared pause
    /// flag: workers block before dispatching the next article while it's
    /// set, so a pause issued mid-job takes effect without waiting for the
    /// job to finish.
    pub fn new(
        pool: Pool,
        posting_config: PostingConfig,
        speed_limiter: SpeedLimiter,
        worker_count: usize,
        pause: Arc<AtomicBool>,
    ) -> Self {
        Self {
            pool,
            posting_config,
            speed_limiter,
            worker_count: worker_count.max(1),
            pause,
        }
    }

    /// Post every file, in order, accumulating successful placements into
    /// `nzb_builder`. Article-level permanent failures are tallied in the
    /// returned [`PostOutcome`] rather than aborting the run — whether that
    /// tally makes the job unusable is the Processor's call, not the
    /// Poster's.
    pub async fn post(
        &self,
        files: &[PathBuf],
        nzb_builder: &Arc<NzbBuilder>,
        verification_tx: Option<mpsc::Sender<VerificationRequest>>,
        progress_tx: Option<mpsc::Sender<ProgressEntry>>,
        cancel: &CancellationToken,
    ) -> Result<PostOutcome> {
        let factory = Arc::new(ArticleFactory::new(
            self.posting_config.obfuscation_policy,
            self.posting_config.message_id_format,
            self.posting_config.from.clone(),
            self.host_suffix(),
        ));

        let mut total = PostOutcome::default();
        for file in files {
            if cancel.is_cancelled() {
                return Err(crate::error::Error::Cancelled);
            }
            let outcome = self
                .post_one_file(
                    file,
                    &factory,
                    nzb_builder,
                    verification_tx.clone(),
                    progress_tx.clone(),
                    cancel,
                )
                .await?;
            total.articles_posted += outcome.articles_posted;
            total.article_errors += outcome.article_errors;
        }
        Ok(total)
    }

    fn host_suffix(&self) -> String {
        self.posting_config
            .newsgroups
            .first()
            .cloned()
            .unwrap_or_else(|| "usenet-poster".to_string())
    }

    async fn post_one_file(
        &self,
        file: &Path,
        factory: &Arc<ArticleFactory>,
        nzb_builder: &Arc<NzbBuilder>,
        verification_tx: Option<mpsc::Sender<VerificationRequest>>,
        progress_tx: Option<mpsc::Sender<ProgressEntry>>,
        cancel: &CancellationToken,
    ) -> Result<PostOutcome> {
        let mut segmenter = Segmenter::open(
            file,
            self.posting_config.article_size_in_bytes,
            &self.posting_config.newsgroups,
            self.posting_config.group_policy,
        )
        .await?;
        let total_parts = segmenter.total_parts();
        let file_size = segmenter.plan().file_size;
        let file_name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let (tx, rx) = mpsc::channel(self.worker_count);
        let rx = Arc::new(Mutex::new(rx));

        let producer_cancel = cancel.clone();
        let producer_factory = factory.clone();
        let line_length = 128;
        let producer = tokio::spawn(async move {
            loop {
                if producer_cancel.is_cancelled() {
                    break;
                }
                match segmenter.next_article(&producer_factory, line_length).await {
                    Ok(Some(encoded)) => {
                        if tx.send(encoded).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(_) => break,
                }
            }
        });

        let retry_config = self.posting_config.retry_config();
        let started = std::time::Instant::now();
        let bytes_done = Arc::new(std::sync::atomic::AtomicU64::new(0));

        let mut workers = Vec::with_capacity(self.worker_count);
        for _ in 0..self.worker_count {
            let rx = rx.clone();
            let pool = self.pool.clone();
            let speed_limiter = self.speed_limiter.clone();
            let retry_config = retry_config.clone();
            let nzb_builder = nzb_builder.clone();
            let verification_tx = verification_tx.clone();
            let progress_tx = progress_tx.clone();
            let cancel = cancel.clone();
            let file_name = file_name.clone();
            let bytes_done = bytes_done.clone();
            let pause = self.pause.clone();

            workers.push(tokio::spawn(async move {
                let mut posted = 0u32;
                let mut errors = 0u32;
                loop {
                    let next = {
                        let mut guard = rx.lock().await;
                        guard.recv().await
                    };
                    let Some(encoded) = next else { break };
                    if cancel.is_cancelled() {
                        break;
                    }

                    wait_while_paused(&pause, &cancel).await;
                    if cancel.is_cancelled() {
                        break;
                    }

                    let result = post_article_with_retry(
                        &pool,
                        &retry_config,
                        &speed_limiter,
                        &encoded.article,
                        &encoded.body,
                    )
                    .await;

                    match result {
                        Ok(receipt) => {
                            posted += 1;
                            nzb_builder.add_article(&encoded.article, &receipt, encoded.crc32);
                            bytes_done.fetch_add(encoded.article.size, std::sync::atomic::Ordering::Relaxed);
                            if let Some(tx) = &verification_tx {
                                let _ = tx
                                    .send(VerificationRequest {
                                        article: encoded.article.clone(),
                                        receipt,
                                        crc32: encoded.crc32,
                                        body: encoded.body.clone(),
                                    })
                                    .await;
                            }
                            if let Some(tx) = &progress_tx {
                                let elapsed = started.elapsed().as_secs();
                                let done = bytes_done.load(std::sync::atomic::Ordering::Relaxed);
                                let percent = if file_size > 0 {
                                    (done as f64 / file_size as f64 * 100.0) as f32
                                } else {
                                    100.0
                                };
                                let _ = tx
                                    .send(ProgressEntry {
                                        kind: ProgressKind::Uploading,
                                        description: file_name.clone(),
                                        current_bytes: done,
                                        total_bytes: file_size,
                                        percent,
                                        seconds_elapsed: elapsed,
                                        seconds_left: None,
                                        kbps: if elapsed > 0 {
                                            done as f64 / 1024.0 / elapsed as f64
                                        } else {
                                            0.0
                                        },
                                        is_started: true,
                                        is_paused: false,
                                    })
                                    .await;
                            }
                        }
                        Err(_) => {
                            errors += 1;
                        }
                    }
                }
                (posted, errors)
            }));
        }

        let _ = producer.await;
        let mut total = PostOutcome::default();
        for worker in workers {
            if let Ok((posted, errors)) = worker.await {
                total.articles_posted += posted;
                total.article_errors += errors;
            }
        }

        let _ = total_parts;
        Ok(total)
    }
}

/// Block while `pause` is set, polling every [`PAUSE_POLL_INTERVAL`], so the
/// processor's pause takes effect before the next article is dispatched
/// rather than only before the next job is dequeued.
async fn wait_while_paused(pause: &AtomicBool, cancel: &CancellationToken) {
    while pause.load(Ordering::Relaxed) {
        if cancel.is_cancelled() {
            return;
        }
        tokio::time::sleep(PAUSE_POLL_INTERVAL).await;
    }
}

/// Lease a posting connection, send `POST`, and retry transient failures
/// with the configured backoff. Shared with [`crate::verifier`]'s repost
/// path so both peers post an article the same way.
pub(crate) async fn post_article_with_retry(
    pool: &Pool,
    retry_config: &crate::config::RetryConfig,
    speed_limiter: &SpeedLimiter,
    article: &Article,
    body: &[u8],
) -> Result<PostReceipt> {
    with_retry(retry_config, || async {
        speed_limiter.acquire(body.len() as u64).await;
        let mut lease = pool.lease(LeaseKind::Post).await?;
        let headers = build_headers(article);
        match lease.conn_mut().post(&headers, body, &article.message_id).await {
            Ok(receipt) => {
                lease.release().await;
                Ok(receipt)
            }
            Err(e) => {
                lease.discard();
                Err(e)
            }
        }
    })
    .await
}

fn build_headers(article: &Article) -> nntp_rs::Headers {
    let mut headers = nntp_rs::Headers::new();
    headers.insert("From", article.from.clone());
    headers.insert("Newsgroups", article.newsgroups.join(","));
    headers.insert("Subject", article.subject.clone());
    headers.insert("Message-ID", format!("<{}>", article.message_id));
    headers.insert("Date", article.date.to_rfc2822());
    for (key, value) in &article.extra_headers {
        headers.insert(key.as_str(), value.clone());
    }
    headers
}
