//! Provider connection (C1): one authenticated NNTP session.
//!
//! Wraps [`nntp_rs::NntpClient`] with the posting-engine's own error taxonomy
//! and the narrow `post`/`stat` surface the pool and poster need. Mirrors the
//! connectivity-testing pattern used elsewhere in the corpus
//! (`NntpClient::connect` + `authenticate`), generalized from a read-only test
//! probe to the full posting session lifecycle.

use crate::config::ProviderConfig;
use crate::error::{Error, Result, TransportError};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// A provider's identity, independent of its current connections.
///
/// Two providers are the same identity iff host, port, and tls agree;
/// credentials and capacity may be rotated without changing identity.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ProviderId {
    host: String,
    port: u16,
}

impl ProviderId {
    /// Build the identity for a provider configuration.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// The provider's host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The provider's port.
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl From<&ProviderConfig> for ProviderId {
    fn from(config: &ProviderConfig) -> Self {
        Self::new(config.host.clone(), config.port)
    }
}

/// Outcome of a `STAT` query.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatOutcome {
    /// The server reported the article present (223)
    Found,
    /// The server reported the article absent (430)
    NotFound,
}

/// Receipt for a successfully accepted `POST`.
#[derive(Clone, Debug)]
pub struct PostReceipt {
    /// The message-ID the server accepted (normally identical to the one sent)
    pub message_id: String,
}

/// A live NNTP session against one provider.
///
/// State machine: `Unconnected -> Connecting -> Idle ->
/// Busy -> Idle | Broken`. Any transport error drives the session to
/// `Broken`; callers observe this via [`ProviderConnection::is_alive`] and the
/// pool discards it rather than returning it to its bucket.
pub struct ProviderConnection {
    id: ProviderId,
    client: nntp_rs::NntpClient,
    created_at: Instant,
    last_used: Instant,
    broken: bool,
    health_counter: u64,
}

impl ProviderConnection {
    /// Establish a new session: TCP/TLS connect, then authenticate if credentials are configured.
    pub async fn connect(config: &ProviderConfig) -> Result<Self> {
        let id = ProviderId::from(config);
        let server_config: nntp_rs::ServerConfig = config.clone().into();
        let has_credentials = config.username.is_some();

        let mut client = nntp_rs::NntpClient::connect(Arc::new(server_config))
            .await
            .map_err(|e| transport_error(&id, e))?;

        if has_credentials {
            client.authenticate().await.map_err(|e| Error::AuthFailure {
                provider: id.to_string(),
                message: e.to_string(),
            })?;
        }

        let now = Instant::now();
        Ok(Self {
            id,
            client,
            created_at: now,
            last_used: now,
            broken: false,
            health_counter: 0,
        })
    }

    /// The provider identity this session belongs to.
    pub fn provider_id(&self) -> &ProviderId {
        &self.id
    }

    /// How long this session has been open.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// How long since this session was last used.
    pub fn idle_for(&self) -> Duration {
        self.last_used.elapsed()
    }

    /// Whether the session is usable; false once any transport error has occurred.
    pub fn is_alive(&self) -> bool {
        !self.broken
    }

    /// Post a single article. Returns the accepted message-ID on success.
    pub async fn post(
        &mut self,
        headers: &nntp_rs::Headers,
        body: &[u8],
        message_id: &str,
    ) -> Result<PostReceipt> {
        self.last_used = Instant::now();

        match self.client.post(headers, body).await {
            Ok(()) => {
                self.health_counter += 1;
                Ok(PostReceipt {
                    message_id: message_id.to_string(),
                })
            }
            Err(e) => {
                let classified = classify_post_error(&self.id, e);
                if matches!(classified, Error::Transport(_) | Error::AuthFailure { .. }) {
                    self.broken = true;
                }
                Err(classified)
            }
        }
    }

    /// Query whether an article is present on this server.
    pub async fn stat(&mut self, message_id: &str, groups: &[String]) -> Result<StatOutcome> {
        self.last_used = Instant::now();

        match self.client.stat(message_id, groups).await {
            Ok(true) => {
                self.health_counter += 1;
                Ok(StatOutcome::Found)
            }
            Ok(false) => {
                self.health_counter += 1;
                Ok(StatOutcome::NotFound)
            }
            Err(e) => {
                let classified = transport_error(&self.id, e);
                self.broken = true;
                Err(classified)
            }
        }
    }

    /// Close the session gracefully (`QUIT`).
    pub async fn close(mut self) {
        let _ = self.client.quit().await;
    }
}

fn transport_error(id: &ProviderId, error: nntp_rs::NntpError) -> Error {
    Error::Transport(TransportError::Reset {
        provider: id.to_string(),
        reason: error.to_string(),
    })
}

fn classify_post_error(id: &ProviderId, error: nntp_rs::NntpError) -> Error {
    let text = error.to_string();
    let lower = text.to_ascii_lowercase();

    if lower.contains("auth") || lower.contains("permission denied") || lower.contains("441") {
        Error::AuthFailure {
            provider: id.to_string(),
            message: text,
        }
    } else if lower.contains("rate") || lower.contains("too many") || lower.contains("502") {
        Error::RateLimited {
            provider: id.to_string(),
        }
    } else if lower.contains("reject")
        || lower.contains("not allowed")
        || lower.contains("440")
        || lower.contains("441")
    {
        Error::ArticleRejected {
            provider: id.to_string(),
            code: 441,
            text,
        }
    } else {
        Error::Transport(TransportError::Reset {
            provider: id.to_string(),
            reason: text,
        })
    }
}

/// Monotonic, process-wide counter used to seed message-ID generation.
///
/// Kept separate from any single provider so IDs stay unique across the
/// whole posting run regardless of which connection generated them.
pub static MESSAGE_ID_COUNTER: AtomicAtomicCounter = AtomicAtomicCounter::new();

/// Thin wrapper so the counter can live as a `static` without `std::sync::atomic`
/// boilerplate at every call site.
pub struct AtomicAtomicCounter(AtomicU64);

impl AtomicAtomicCounter {
    const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Fetch and increment the counter.
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_id_formats_as_host_colon_port() {
        let id = ProviderId::new("news.example.com", 563);
        assert_eq!(id.to_string(), "news.example.com:563");
    }

    #[test]
    fn provider_id_from_config_copies_host_and_port() {
        let config = ProviderConfig {
            host: "news.example.com".into(),
            port: 119,
            ..ProviderConfig::default()
        };
        let id = ProviderId::from(&config);
        assert_eq!(id.host(), "news.example.com");
        assert_eq!(id.port(), 119);
    }

    #[test]
    fn message_id_counter_increases_monotonically() {
        let a = MESSAGE_ID_COUNTER.next();
        let b = MESSAGE_ID_COUNTER.next();
        assert!(b > a);
    }
}
