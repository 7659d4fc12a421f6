//! Verifier (C6): confirms posted articles propagated, and reposts those
//! that didn't.
//!
//! Runs concurrently with the Poster, never blocking its producer: articles
//! arrive over a channel as soon as their `POST` is acknowledged, and the
//! Verifier's own `STAT`/repost loop proceeds independently.
//! Shares the single-article posting primitive with [`crate::poster`] rather
//! than calling back into it, keeping the two as channel-connected peers.

use crate::article::Article;
use crate::config::{PostingConfig, PostCheckConfig};
use crate::error::{Error, Result};
use crate::nzb::NzbBuilder;
use crate::pool::{LeaseKind, Pool};
use crate::poster::post_article_with_retry;
use crate::provider::{PostReceipt, StatOutcome};
use crate::speed_limiter::SpeedLimiter;
use crate::types::CheckedAgainst;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// How often a paused verifier re-checks whether it can verify/repost again.
const PAUSE_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// One article awaiting `STAT` verification, carrying everything needed to
/// repost it without returning to the source file.
pub struct VerificationRequest {
    /// The posted article's metadata
    pub article: Article,
    /// The receipt from its successful `POST`
    pub receipt: PostReceipt,
    /// CRC32 of the pre-encoded segment, for the NZB record on repost
    pub crc32: u32,
    /// The exact framed yEnc body that was posted, kept in case of repost
    pub body: Vec<u8>,
}

/// Tallies across one verification run.
#[derive(Clone, Copy, Debug, Default)]
pub struct VerificationOutcome {
    /// Articles confirmed present on first or later `STAT`
    pub articles_checked: u32,
    /// Reposts issued after a missing or failed `STAT`
    pub reposts: u32,
    /// Articles that exhausted `max_reposts` and failed permanently
    pub permanent_failures: u32,
    /// Which pool this run's `STAT` calls were drawn from, once the run has
    /// consumed at least one request. `None` for a run that never looked.
    pub checked_against: Option<CheckedAgainst>,
}

/// Drives post-upload `STAT` verification and repost-on-miss for one job.
pub struct Verifier {
    pool: Pool,
    posting_config: PostingConfig,
    post_check: PostCheckConfig,
    speed_limiter: SpeedLimiter,
    pause: Arc<AtomicBool>,
}

impl Verifier {
    /// Build a verifier bound to `pool`. `posting_config` supplies the
    /// repost retry schedule; `post_check` supplies the verification delay
    /// and repost budget. `pause` is the processor's shared pause flag,
    /// checked before every `STAT` and before every repost.
    pub fn new(
        pool: Pool,
        posting_config: PostingConfig,
        post_check: PostCheckConfig,
        speed_limiter: SpeedLimiter,
        pause: Arc<AtomicBool>,
    ) -> Self {
        Self {
            pool,
            posting_config,
            post_check,
            speed_limiter,
            pause,
        }
    }

    /// Consume verification requests from `rx` until the channel closes or
    /// `cancel` fires, recording every confirmed (or successfully reposted)
    /// article into `nzb_builder`.
    pub async fn run(
        &self,
        mut rx: mpsc::Receiver<VerificationRequest>,
        nzb_builder: Arc<NzbBuilder>,
        cancel: &CancellationToken,
    ) -> VerificationOutcome {
        let mut outcome = VerificationOutcome::default();
        outcome.checked_against = Some(if self.pool.checking_is_dedicated().await {
            CheckedAgainst::Dedicated
        } else {
            CheckedAgainst::PostingFallback
        });
        loop {
            let next = tokio::select! {
                req = rx.recv() => req,
                () = cancel.cancelled() => None,
            };
            let Some(request) = next else { break };

            match self.verify_with_reposts(request, &nzb_builder, cancel).await {
                VerifyResult::Checked => outcome.articles_checked += 1,
                VerifyResult::Reposted { attempts } => {
                    outcome.articles_checked += 1;
                    outcome.reposts += attempts;
                }
                VerifyResult::PermanentFailure => outcome.permanent_failures += 1,
            }
        }
        outcome
    }

    async fn verify_with_reposts(
        &self,
        mut request: VerificationRequest,
        nzb_builder: &Arc<NzbBuilder>,
        cancel: &CancellationToken,
    ) -> VerifyResult {
        let mut attempts = 0u32;
        loop {
            tokio::time::sleep(self.post_check.delay).await;

            wait_while_paused(&self.pause, cancel).await;

            let stat_result = self.stat_once(&request).await;
            match stat_result {
                Ok(StatOutcome::Found) => {
                    return if attempts == 0 {
                        VerifyResult::Checked
                    } else {
                        VerifyResult::Reposted { attempts }
                    };
                }
                Ok(StatOutcome::NotFound) | Err(_) => {
                    if attempts >= self.post_check.max_reposts {
                        return VerifyResult::PermanentFailure;
                    }
                    attempts += 1;

                    wait_while_paused(&self.pause, cancel).await;

                    match post_article_with_retry(
                        &self.pool,
                        &self.posting_config.retry_config(),
                        &self.speed_limiter,
                        &request.article,
                        &request.body,
                    )
                    .await
                    {
                        Ok(new_receipt) => {
                            nzb_builder.add_article(&request.article, &new_receipt, request.crc32);
                            request.receipt = new_receipt;
                        }
                        Err(_) => return VerifyResult::PermanentFailure,
                    }
                }
            }
        }
    }

    async fn stat_once(&self, request: &VerificationRequest) -> Result<StatOutcome> {
        let mut lease = self.pool.lease(LeaseKind::Stat).await?;
        let result = lease
            .conn_mut()
            .stat(&request.receipt.message_id, &request.article.newsgroups)
            .await;
        match result {
            Ok(outcome) => {
                lease.release().await;
                Ok(outcome)
            }
            Err(e) => {
                lease.discard();
                Err(e)
            }
        }
    }
}

enum VerifyResult {
    Checked,
    Reposted { attempts: u32 },
    PermanentFailure,
}

/// Block while `pause` is set, so a pause issued mid-job is honored before
/// the next `STAT` or repost rather than only once the verifier's request
/// channel drains.
async fn wait_while_paused(pause: &AtomicBool, cancel: &CancellationToken) {
    while pause.load(Ordering::Relaxed) {
        if cancel.is_cancelled() {
            return;
        }
        tokio::time::sleep(PAUSE_POLL_INTERVAL).await;
    }
}
