//! Test configuration helpers for loading .env credentials and creating test processors

use std::sync::Arc;
use tempfile::TempDir;
use usenet_poster::config::ProviderConfig;
use usenet_poster::queue::Queue;
use usenet_poster::{Config, Processor};

/// Error type for test configuration
#[derive(Debug)]
pub struct ConfigError(pub String);

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Config error: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}

/// Load NNTP provider configuration from environment variables
///
/// Required environment variables:
/// - `NNTP_HOST` - Server hostname
/// - `NNTP_USERNAME` - Authentication username
/// - `NNTP_PASSWORD` - Authentication password
///
/// Optional environment variables:
/// - `NNTP_PORT_SSL` - TLS port (default: 563)
/// - `NNTP_CONNECTIONS` - Number of connections (default: 4)
pub fn load_provider_config() -> Result<ProviderConfig, ConfigError> {
    dotenvy::dotenv().ok();

    let host = std::env::var("NNTP_HOST")
        .map_err(|_| ConfigError("NNTP_HOST not set in environment".to_string()))?;

    let port: u16 = std::env::var("NNTP_PORT_SSL")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(563);

    let username = std::env::var("NNTP_USERNAME")
        .map_err(|_| ConfigError("NNTP_USERNAME not set in environment".to_string()))?;

    let password = std::env::var("NNTP_PASSWORD")
        .map_err(|_| ConfigError("NNTP_PASSWORD not set in environment".to_string()))?;

    let max_connections: usize = std::env::var("NNTP_CONNECTIONS")
        .ok()
        .and_then(|c| c.parse().ok())
        .unwrap_or(4);

    Ok(ProviderConfig {
        host,
        port,
        tls: true,
        username: Some(username),
        password: Some(password),
        max_connections,
        ..ProviderConfig::default()
    })
}

/// Load provider config with invalid password for auth failure tests
pub fn load_provider_config_bad_password() -> Result<ProviderConfig, ConfigError> {
    let mut config = load_provider_config()?;
    config.password = Some("invalid_password_12345".to_string());
    Ok(config)
}

fn posting_config(provider: ProviderConfig, temp_dir: &TempDir) -> Config {
    let mut config = Config {
        providers: vec![provider],
        ..Config::default()
    };
    config.posting.newsgroups = vec!["alt.binaries.test".into()];
    config.queue.database_path = temp_dir.path().join("test.db");
    config
}

/// Create a Processor configured against a real, live NNTP provider.
///
/// Returns the processor and temp directory (keep `temp_dir` alive for the
/// test's duration — it backs the queue database).
pub async fn create_live_processor() -> Result<(Arc<Processor>, TempDir), ConfigError> {
    let provider = load_provider_config()?;
    let temp_dir = tempfile::tempdir()
        .map_err(|e| ConfigError(format!("Failed to create temp dir: {e}")))?;

    let config = posting_config(provider, &temp_dir);
    let queue = Queue::open(&config.queue.database_path)
        .await
        .map_err(|e| ConfigError(format!("Failed to open queue: {e}")))?;

    let processor = Processor::new(config, queue, Default::default())
        .map_err(|e| ConfigError(format!("Failed to create processor: {e}")))?;

    Ok((Arc::new(processor), temp_dir))
}

/// Create a Processor with bad credentials for auth-failure tests.
pub async fn create_processor_bad_auth() -> Result<(Arc<Processor>, TempDir), ConfigError> {
    let provider = load_provider_config_bad_password()?;
    let temp_dir = tempfile::tempdir()
        .map_err(|e| ConfigError(format!("Failed to create temp dir: {e}")))?;

    let config = posting_config(provider, &temp_dir);
    let queue = Queue::open(&config.queue.database_path)
        .await
        .map_err(|e| ConfigError(format!("Failed to open queue: {e}")))?;

    let processor = Processor::new(config, queue, Default::default())
        .map_err(|e| ConfigError(format!("Failed to create processor: {e}")))?;

    Ok((Arc::new(processor), temp_dir))
}

/// Create a Processor against a local Docker-hosted NNTP test server.
#[cfg(feature = "docker-tests")]
pub async fn create_docker_processor(
    host: &str,
    port: u16,
) -> Result<(Arc<Processor>, TempDir), ConfigError> {
    let temp_dir = tempfile::tempdir()
        .map_err(|e| ConfigError(format!("Failed to create temp dir: {e}")))?;

    let provider = ProviderConfig {
        host: host.to_string(),
        port,
        tls: false, // local Docker servers typically skip TLS
        max_connections: 2,
        ..ProviderConfig::default()
    };

    let config = posting_config(provider, &temp_dir);
    let queue = Queue::open(&config.queue.database_path)
        .await
        .map_err(|e| ConfigError(format!("Failed to open queue: {e}")))?;

    let processor = Processor::new(config, queue, Default::default())
        .map_err(|e| ConfigError(format!("Failed to create processor: {e}")))?;

    Ok((Arc::new(processor), temp_dir))
}

/// Check if live test credentials are available
pub fn has_live_credentials() -> bool {
    dotenvy::dotenv().ok();
    std::env::var("NNTP_HOST").is_ok()
        && std::env::var("NNTP_USERNAME").is_ok()
        && std::env::var("NNTP_PASSWORD").is_ok()
}

/// Skip test if credentials are not available
#[macro_export]
macro_rules! skip_if_no_credentials {
    () => {
        if !$crate::common::has_live_credentials() {
            eprintln!("Skipping test: NNTP credentials not found in .env");
            return;
        }
    };
}
