//! Connection pool (C2): multiplexes [`ProviderConnection`]s over providers,
//! grants exclusive leases, and runs background health/reaping.
//!
//! Exposes two logical pools over the same bucket set:
//! a **posting** pool (enabled, non-`check_only` providers) and a **checking**
//! pool (enabled, `check_only` providers; aliases the posting pool when empty).

use crate::config::{PoolConfig, ProviderConfig};
use crate::error::{Error, Result, TransportError};
use crate::provider::{ProviderConnection, ProviderId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};
use tokio::time::timeout;

/// Which logical pool a lease is drawn from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LeaseKind {
    /// A lease for `POST`, drawn from the posting pool
    Post,
    /// A lease for `STAT`, drawn from the checking pool
    Stat,
}

impl LeaseKind {
    fn label(self) -> &'static str {
        match self {
            LeaseKind::Post => "post",
            LeaseKind::Stat => "stat",
        }
    }
}

/// One provider's bucket: its config, a semaphore bounding concurrent leases
/// at `max_connections`, a pool of idle connections, and a back-off gate.
struct Bucket {
    config: ProviderConfig,
    semaphore: Arc<Semaphore>,
    idle: Mutex<Vec<ProviderConnection>>,
    backoff_until: Mutex<Option<Instant>>,
}

impl Bucket {
    fn new(config: ProviderConfig) -> Self {
        let permits = config.max_connections;
        Self {
            config,
            semaphore: Arc::new(Semaphore::new(permits)),
            idle: Mutex::new(Vec::new()),
            backoff_until: Mutex::new(None),
        }
    }

    async fn is_backed_off(&self) -> bool {
        match *self.backoff_until.lock().await {
            Some(until) => Instant::now() < until,
            None => false,
        }
    }

    async fn demote(&self, duration: Duration) {
        *self.backoff_until.lock().await = Some(Instant::now() + duration);
    }
}

/// A leased connection. Dropping it without calling [`Lease::release`] or
/// [`Lease::discard`] returns the connection to its bucket's idle pool — the
/// scoped-resource guarantee every caller gets for free.
pub struct Lease {
    provider_id: ProviderId,
    conn: Option<ProviderConnection>,
    pool: Pool,
    permit: Option<tokio::sync::OwnedSemaphorePermit>,
}

impl Lease {
    /// The provider this lease's connection belongs to.
    pub fn provider_id(&self) -> &ProviderId {
        &self.provider_id
    }

    /// Borrow the underlying connection.
    pub fn conn_mut(&mut self) -> &mut ProviderConnection {
        self.conn.as_mut().expect("lease connection taken twice")
    }

    /// Return the connection to its bucket's idle pool (the common path
    /// after a successful `POST`/`STAT`).
    pub async fn release(mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.return_connection(conn).await;
        }
    }

    /// Discard the connection without returning it (it became `Broken`, or
    /// the caller wants a fresh one on the next lease).
    pub fn discard(mut self) {
        self.conn.take();
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            let pool = self.pool.clone();
            tokio::spawn(async move {
                pool.return_connection(conn).await;
            });
        }
    }
}

struct PoolInner {
    buckets: HashMap<ProviderId, Arc<Bucket>>,
    check_only: HashMap<ProviderId, Arc<Bucket>>,
    config: PoolConfig,
}

/// The connection pool. Cheaply cloneable; all state lives behind an `Arc`.
///
/// The pool is an explicit runtime object, constructed after config load and
/// destroyed after the processor has quiesced — never an ambient singleton.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<Mutex<PoolInner>>,
}

impl Pool {
    /// Build posting and checking buckets from the configured providers.
    ///
    /// The checking pool is every enabled `check_only` provider; if that set
    /// is empty, checking aliases the posting pool.
    pub fn new(providers: &[ProviderConfig], config: PoolConfig) -> Self {
        let mut posting = HashMap::new();
        let mut checking = HashMap::new();

        for provider in providers {
            if !provider.enabled {
                continue;
            }
            let id = ProviderId::from(provider);
            let bucket = Arc::new(Bucket::new(provider.clone()));
            if provider.check_only {
                checking.insert(id, bucket);
            } else {
                posting.insert(id, bucket);
            }
        }

        if checking.is_empty() {
            checking = posting.clone();
        }

        Self {
            inner: Arc::new(Mutex::new(PoolInner {
                buckets: posting,
                check_only: checking,
                config,
            })),
        }
    }

    /// Hot-reconfigure the provider set. Buckets for identity-unchanged
    /// providers are retained; changed/added/removed providers get fresh
    /// buckets. Active leases complete against their old bucket, since the
    /// bucket `Arc` they hold is untouched by this swap.
    pub async fn reconfigure(&self, providers: &[ProviderConfig]) {
        let mut guard = self.inner.lock().await;
        let mut new_posting = HashMap::new();
        let mut new_checking = HashMap::new();

        for provider in providers {
            if !provider.enabled {
                continue;
            }
            let id = ProviderId::from(provider);
            let existing = guard.buckets.get(&id).or_else(|| guard.check_only.get(&id));
            let bucket = match existing {
                Some(b) if b.config.max_connections == provider.max_connections => b.clone(),
                _ => Arc::new(Bucket::new(provider.clone())),
            };
            if provider.check_only {
                new_checking.insert(id, bucket);
            } else {
                new_posting.insert(id, bucket);
            }
        }

        if new_checking.is_empty() {
            new_checking = new_posting.clone();
        }

        guard.buckets = new_posting;
        guard.check_only = new_checking;
    }

    /// Lease a connection for `POST` or `STAT`, waiting on a bounded fair
    /// queue (one semaphore per bucket) up to the configured timeout.
    pub async fn lease(&self, kind: LeaseKind) -> Result<Lease> {
        let (buckets, lease_timeout) = {
            let guard = self.inner.lock().await;
            let buckets: Vec<Arc<Bucket>> = match kind {
                LeaseKind::Post => guard.buckets.values().cloned().collect(),
                LeaseKind::Stat => guard.check_only.values().cloned().collect(),
            };
            (buckets, guard.config.lease_timeout)
        };

        if buckets.is_empty() {
            return Err(Error::Transport(TransportError::LeaseTimeout {
                waited_secs: 0,
                kind: kind.label(),
            }));
        }

        let attempt = self.lease_from_buckets(&buckets, kind);
        let started = Instant::now();
        let leased = match lease_timeout {
            Some(d) => timeout(d, attempt).await.map_err(|_| {
                Error::Transport(TransportError::LeaseTimeout {
                    waited_secs: started.elapsed().as_secs(),
                    kind: kind.label(),
                })
            })?,
            None => attempt.await,
        };
        leased
    }

    /// Race every eligible bucket's semaphore; the first to grant a permit
    /// wins. Skips buckets currently in back-off.
    async fn lease_from_buckets(&self, buckets: &[Arc<Bucket>], _kind: LeaseKind) -> Result<Lease> {
        use futures::stream::{FuturesUnordered, StreamExt};

        let mut pending = FuturesUnordered::new();
        for bucket in buckets {
            let bucket = bucket.clone();
            pending.push(async move {
                if bucket.is_backed_off().await {
                    // Never resolves for a backed-off bucket; another bucket wins instead.
                    std::future::pending::<()>().await;
                }
                let permit = bucket.semaphore.clone().acquire_owned().await;
                (bucket, permit)
            });
        }

        let (bucket, permit) = pending
            .next()
            .await
            .expect("at least one bucket was provided");
        let permit = permit.map_err(|_| {
            Error::Transport(TransportError::Reset {
                provider: bucket.config.host.clone(),
                reason: "semaphore closed".into(),
            })
        })?;

        let mut idle = bucket.idle.lock().await;
        let conn = if let Some(existing) = idle.pop() {
            drop(idle);
            existing
        } else {
            drop(idle);
            ProviderConnection::connect(&bucket.config).await?
        };

        let provider_id = conn.provider_id().clone();
        Ok(Lease {
            provider_id,
            conn: Some(conn),
            pool: self.clone(),
            permit: Some(permit),
        })
    }

    /// Return a connection to its bucket: discard if `Broken` or past its
    /// idle/TTL bounds, otherwise park it for reuse.
    async fn return_connection(&self, conn: ProviderConnection) {
        let id = conn.provider_id().clone();
        let guard = self.inner.lock().await;
        let bucket = guard
            .buckets
            .get(&id)
            .or_else(|| guard.check_only.get(&id))
            .cloned();
        drop(guard);

        let Some(bucket) = bucket else { return };

        let expired = conn.age() > Duration::from_secs(bucket.config.max_ttl_seconds)
            || conn.idle_for() > Duration::from_secs(bucket.config.max_idle_seconds);

        if !conn.is_alive() || expired {
            conn.close().await;
            return;
        }
        bucket.idle.lock().await.push(conn);
    }

    /// Demote a provider after an `AuthFailure`: it will not be leased from
    /// again until `backoff` elapses.
    pub async fn demote_provider(&self, provider_id: &ProviderId, backoff: Duration) {
        let guard = self.inner.lock().await;
        if let Some(bucket) = guard
            .buckets
            .get(provider_id)
            .or_else(|| guard.check_only.get(provider_id))
        {
            bucket.demote(backoff).await;
        }
    }

    /// Run a background health-check/reap pass: for every idle connection
    /// exceeding its idle/TTL bound, close it; for the rest, leave it parked.
    /// Intended to be driven by a `tokio::time::interval` loop at
    /// `health_check_interval`.
    pub async fn reap_idle(&self) {
        let buckets: Vec<Arc<Bucket>> = {
            let guard = self.inner.lock().await;
            guard
                .buckets
                .values()
                .chain(guard.check_only.values())
                .cloned()
                .collect()
        };

        for bucket in buckets {
            let mut idle = bucket.idle.lock().await;
            let mut keep = Vec::with_capacity(idle.len());
            for conn in idle.drain(..) {
                let expired = conn.age() > Duration::from_secs(bucket.config.max_ttl_seconds)
                    || conn.idle_for() > Duration::from_secs(bucket.config.max_idle_seconds);
                if expired || !conn.is_alive() {
                    conn.close().await;
                } else {
                    keep.push(conn);
                }
            }
            *idle = keep;
        }
    }

    /// Whether the checking pool is backed by its own dedicated `check_only`
    /// providers, as opposed to aliasing the posting pool. Verifiers surface
    /// this alongside their tallies so operators can tell a `STAT` against a
    /// neutral third party from one that shares load with posting.
    pub async fn checking_is_dedicated(&self) -> bool {
        let guard = self.inner.lock().await;
        guard
            .check_only
            .keys()
            .any(|id| !guard.buckets.contains_key(id))
            || (!guard.check_only.is_empty() && guard.buckets.is_empty())
    }

    /// Point-in-time health snapshot of every bucket, for the REST
    /// front-end's provider health endpoint. A provider present in both the
    /// posting and checking maps (the sole-provider aliasing case) is
    /// reported once, with role `Both`.
    pub async fn health_snapshot(&self) -> Vec<crate::types::ProviderHealth> {
        use crate::types::{ProviderHealth, ProviderRole};

        let guard = self.inner.lock().await;
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();

        for (id, bucket) in guard.buckets.iter().chain(guard.check_only.iter()) {
            if !seen.insert(id.clone()) {
                continue;
            }
            let posting = guard.buckets.contains_key(id);
            let checking = guard.check_only.contains_key(id);
            let role = match (posting, checking) {
                (true, true) => ProviderRole::Both,
                (true, false) => ProviderRole::Posting,
                (false, true) => ProviderRole::CheckOnly,
                (false, false) => continue,
            };
            let max_connections = bucket.config.max_connections;
            let available = bucket.semaphore.available_permits();
            out.push(ProviderHealth {
                provider: id.to_string(),
                role,
                max_connections,
                active_connections: max_connections.saturating_sub(available),
                backed_off: bucket.is_backed_off().await,
            });
        }

        out
    }

    /// Whether every provider participating in `kind`'s pool is currently
    /// back off (candidate signal for the Processor's auto-pause).
    pub async fn all_backed_off(&self, kind: LeaseKind) -> bool {
        let buckets: Vec<Arc<Bucket>> = {
            let guard = self.inner.lock().await;
            match kind {
                LeaseKind::Post => guard.buckets.values().cloned().collect(),
                LeaseKind::Stat => guard.check_only.values().cloned().collect(),
            }
        };
        if buckets.is_empty() {
            return true;
        }
        for bucket in &buckets {
            if !bucket.is_backed_off().await {
                return false;
            }
        }
        true
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn provider(host: &str, max_connections: usize, check_only: bool) -> ProviderConfig {
        ProviderConfig {
            host: host.into(),
            max_connections,
            check_only,
            ..ProviderConfig::default()
        }
    }

    #[tokio::test]
    async fn checking_pool_aliases_posting_pool_when_no_dedicated_checkers() {
        let providers = vec![provider("a.example.com", 2, false)];
        let pool = Pool::new(&providers, PoolConfig::default());
        let guard = pool.inner.lock().await;
        assert_eq!(guard.buckets.len(), 1);
        assert_eq!(guard.check_only.len(), 1);
        assert!(guard.buckets.keys().eq(guard.check_only.keys()));
    }

    #[tokio::test]
    async fn dedicated_check_only_provider_is_excluded_from_posting_pool() {
        let providers = vec![
            provider("posting.example.com", 2, false),
            provider("checker.example.com", 1, true),
        ];
        let pool = Pool::new(&providers, PoolConfig::default());
        let guard = pool.inner.lock().await;
        assert_eq!(guard.buckets.len(), 1);
        assert_eq!(guard.check_only.len(), 1);
        assert!(
            guard
                .buckets
                .keys()
                .all(|id| id.host() == "posting.example.com")
        );
    }

    #[tokio::test]
    async fn disabled_providers_are_excluded_entirely() {
        let providers = vec![ProviderConfig {
            enabled: false,
            ..provider("disabled.example.com", 2, false)
        }];
        let pool = Pool::new(&providers, PoolConfig::default());
        let guard = pool.inner.lock().await;
        assert!(guard.buckets.is_empty());
    }

    #[tokio::test]
    async fn lease_with_no_eligible_providers_fails_fast() {
        let pool = Pool::new(&[], PoolConfig::default());
        let result = pool.lease(LeaseKind::Post).await;
        assert!(matches!(
            result,
            Err(Error::Transport(TransportError::LeaseTimeout { .. }))
        ));
    }

    #[tokio::test]
    async fn demoted_provider_is_marked_backed_off() {
        let providers = vec![provider("a.example.com", 1, false)];
        let pool = Pool::new(&providers, PoolConfig::default());
        let id = ProviderId::from(&providers[0]);
        assert!(!pool.all_backed_off(LeaseKind::Post).await);
        pool.demote_provider(&id, Duration::from_secs(60)).await;
        assert!(pool.all_backed_off(LeaseKind::Post).await);
    }

    #[tokio::test]
    async fn reconfigure_retains_bucket_for_unchanged_provider() {
        let providers = vec![provider("a.example.com", 2, false)];
        let pool = Pool::new(&providers, PoolConfig::default());
        let id = ProviderId::from(&providers[0]);
        let before = {
            let guard = pool.inner.lock().await;
            Arc::as_ptr(guard.buckets.get(&id).unwrap()) as usize
        };

        pool.reconfigure(&providers).await;

        let after = {
            let guard = pool.inner.lock().await;
            Arc::as_ptr(guard.buckets.get(&id).unwrap()) as usize
        };
        assert_eq!(before, after, "unchanged provider must keep its bucket (hot reconfig)");
    }

    #[tokio::test]
    async fn reconfigure_rebuilds_bucket_when_capacity_changes() {
        let providers = vec![provider("a.example.com", 2, false)];
        let pool = Pool::new(&providers, PoolConfig::default());
        let id = ProviderId::from(&providers[0]);
        let before = {
            let guard = pool.inner.lock().await;
            Arc::as_ptr(guard.buckets.get(&id).unwrap()) as usize
        };

        let changed = vec![provider("a.example.com", 5, false)];
        pool.reconfigure(&changed).await;

        let after = {
            let guard = pool.inner.lock().await;
            Arc::as_ptr(guard.buckets.get(&id).unwrap()) as usize
        };
        assert_ne!(before, after, "capacity change must rebuild the bucket");
    }
}
