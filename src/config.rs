//! Configuration types for usenet-poster

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf, time::Duration};
use utoipa::ToSchema;

/// Top-level configuration.
///
/// Composed from independently testable sub-configs via `#[serde(flatten)]`
/// so the on-disk JSON/TOML shape stays flat while the Rust types stay small.
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct Config {
    /// NNTP provider configurations (at least one required)
    pub providers: Vec<ProviderConfig>,

    /// Connection pool leasing, health checks, and reaping
    #[serde(default)]
    pub pool: PoolConfig,

    /// Segmentation, encoding, and posting behavior
    #[serde(flatten)]
    pub posting: PostingConfig,

    /// Post-upload `STAT` verification
    #[serde(flatten)]
    pub post_check: PostCheckConfig,

    /// PAR2 recovery-volume generation
    #[serde(flatten)]
    pub par2: Par2Config,

    /// NZB compression
    #[serde(flatten)]
    pub nzb_compression: NzbCompressionConfig,

    /// Persistent queue and processor concurrency
    pub queue: QueueConfig,

    /// Directory watcher (absent = watching disabled)
    #[serde(default)]
    pub watcher: Option<WatcherConfig>,

    /// Post-upload hook script
    #[serde(flatten)]
    pub post_upload_script: PostUploadScriptConfig,

    /// Optional REST front-end
    #[serde(default)]
    pub api: ApiConfig,
}

impl Config {
    /// Validate the configuration, returning the first structural violation found.
    ///
    /// Called before any pool or processor is constructed.
    pub fn validate(&self) -> Result<(), Error> {
        if self.providers.is_empty() {
            return Err(Error::ConfigInvalid {
                message: "at least one provider is required".into(),
                key: Some("providers".into()),
            });
        }
        for (i, provider) in self.providers.iter().enumerate() {
            if provider.max_connections == 0 {
                return Err(Error::ConfigInvalid {
                    message: "max_connections must be >= 1".into(),
                    key: Some(format!("providers[{i}].max_connections")),
                });
            }
        }
        if self.posting.article_size_in_bytes == 0 {
            return Err(Error::ConfigInvalid {
                message: "article_size_in_bytes must be > 0".into(),
                key: Some("posting.article_size_in_bytes".into()),
            });
        }
        if self.posting.newsgroups.is_empty() {
            return Err(Error::ConfigInvalid {
                message: "at least one newsgroup is required".into(),
                key: Some("posting.newsgroups".into()),
            });
        }
        if self.nzb_compression.enabled {
            let (min, max) = self.nzb_compression.codec.level_range();
            if !(min..=max).contains(&self.nzb_compression.level) {
                return Err(Error::ConfigInvalid {
                    message: format!(
                        "level {} out of range {min}..={max} for codec {:?}",
                        self.nzb_compression.level, self.nzb_compression.codec
                    ),
                    key: Some("nzb_compression.level".into()),
                });
            }
        }
        if self.queue.max_concurrent_uploads == 0 {
            return Err(Error::ConfigInvalid {
                message: "max_concurrent_uploads must be >= 1".into(),
                key: Some("queue.max_concurrent_uploads".into()),
            });
        }
        if let Some(watcher) = &self.watcher {
            for pattern in &watcher.ignore_patterns {
                if globset::Glob::new(pattern).is_err() {
                    return Err(Error::ConfigInvalid {
                        message: format!("invalid ignore pattern: {pattern}"),
                        key: Some("watcher.ignore_patterns".into()),
                    });
                }
            }
            if let Some(schedule) = &watcher.ignore_schedule {
                if parse_clock_time(&schedule.start_time).is_none()
                    || parse_clock_time(&schedule.end_time).is_none()
                {
                    return Err(Error::ConfigInvalid {
                        message: "ignore_schedule times must be \"HH:MM\"".into(),
                        key: Some("watcher.ignore_schedule".into()),
                    });
                }
            }
        }
        Ok(())
    }

    /// Load and validate a configuration document from disk.
    ///
    /// The on-disk format is JSON, matching the shape produced by
    /// `serde_json::to_string_pretty` on this type. Used by the CLI
    /// front-end's `--config` flag.
    pub fn load(path: &std::path::Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text).map_err(|e| Error::ConfigInvalid {
            message: format!("failed to parse {}: {e}", path.display()),
            key: None,
        })?;
        config.validate()?;
        Ok(config)
    }
}

fn parse_clock_time(s: &str) -> Option<chrono::NaiveTime> {
    chrono::NaiveTime::parse_from_str(s, "%H:%M").ok()
}

/// Identity and capacity for a single NNTP provider.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ProviderConfig {
    /// Server hostname
    pub host: String,

    /// Server port (typically 119 for unencrypted, 563 for TLS)
    pub port: u16,

    /// Use TLS (implicit TLS, not STARTTLS)
    #[serde(default)]
    pub tls: bool,

    /// Skip certificate verification (default: false; never forwarded as true silently)
    #[serde(default)]
    pub insecure_tls: bool,

    /// Username for authentication
    #[serde(default)]
    pub username: Option<String>,

    /// Password for authentication
    #[serde(default)]
    pub password: Option<String>,

    /// Number of connections to maintain (default: 10)
    #[serde(default = "default_connections")]
    pub max_connections: usize,

    /// Idle connections older than this are reaped (default: 300)
    #[serde(default = "default_max_idle_seconds")]
    pub max_idle_seconds: u64,

    /// Connections are recycled once they exceed this total lifetime (default: 3600)
    #[serde(default = "default_max_ttl_seconds")]
    pub max_ttl_seconds: u64,

    /// Optional SOCKS5 proxy URL (credentials inline)
    #[serde(default)]
    pub proxy_url: Option<String>,

    /// Whether this provider participates at all (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Restrict this provider to `STAT` verification only, never posting (default: false)
    #[serde(default)]
    pub check_only: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 563,
            tls: true,
            insecure_tls: false,
            username: None,
            password: None,
            max_connections: default_connections(),
            max_idle_seconds: default_max_idle_seconds(),
            max_ttl_seconds: default_max_ttl_seconds(),
            proxy_url: None,
            enabled: true,
            check_only: false,
        }
    }
}

// Conversion from our ProviderConfig to nntp-rs's ServerConfig
impl From<ProviderConfig> for nntp_rs::ServerConfig {
    fn from(config: ProviderConfig) -> Self {
        nntp_rs::ServerConfig {
            host: config.host,
            port: config.port,
            tls: config.tls,
            allow_insecure_tls: config.insecure_tls,
            username: config.username.unwrap_or_default(),
            password: config.password.unwrap_or_default(),
        }
    }
}

/// Connection pool leasing, health checks, and reaping.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct PoolConfig {
    /// Interval between background health checks of idle connections (default: 60s)
    #[serde(default = "default_health_check_interval", with = "duration_serde")]
    pub health_check_interval: Duration,

    /// How long a caller waits for a lease before giving up (default: 30s; None = wait forever)
    #[serde(default = "default_lease_timeout", with = "optional_duration_serde")]
    pub lease_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            health_check_interval: default_health_check_interval(),
            lease_timeout: default_lease_timeout(),
        }
    }
}

fn default_health_check_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_lease_timeout() -> Option<Duration> {
    Some(Duration::from_secs(30))
}

/// Segmentation, encoding, and posting behavior.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct PostingConfig {
    /// Size of each article's pre-encoded body, in bytes (default: 750000)
    #[serde(default = "default_article_size")]
    pub article_size_in_bytes: u64,

    /// Maximum retries per article before treating it as a permanent failure (default: 5)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay before the first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub retry_delay: Duration,

    /// Global throughput cap in bytes/sec across all posting connections (0 = unlimited)
    #[serde(default)]
    pub throttle_rate: u64,

    /// Subject/filename/from/date obfuscation level
    #[serde(default)]
    pub obfuscation_policy: ObfuscationPolicy,

    /// Newsgroup assignment strategy
    #[serde(default)]
    pub group_policy: GroupPolicy,

    /// Message-ID generation scheme
    #[serde(default)]
    pub message_id_format: MessageIdFormat,

    /// From header value (subject to obfuscation_policy)
    #[serde(default = "default_from")]
    pub from: String,

    /// Newsgroups to post to (at least one required)
    pub newsgroups: Vec<String>,
}

impl Default for PostingConfig {
    fn default() -> Self {
        Self {
            article_size_in_bytes: default_article_size(),
            max_retries: default_max_retries(),
            retry_delay: default_initial_delay(),
            throttle_rate: 0,
            obfuscation_policy: ObfuscationPolicy::default(),
            group_policy: GroupPolicy::default(),
            message_id_format: MessageIdFormat::default(),
            from: default_from(),
            newsgroups: Vec::new(),
        }
    }
}

impl PostingConfig {
    /// Build the generic retry combinator's config from the posting-specific fields.
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_retries,
            initial_delay: self.retry_delay,
            max_delay: Duration::from_secs(60).max(self.retry_delay),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Obfuscation level applied to subject, file name, from, date, and the yEnc header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ObfuscationPolicy {
    /// Randomize everything: subject, filenames (per-article yEnc header too), from, date
    Full,
    /// Randomize subject and filenames but keep a stable From and real Date (default)
    #[default]
    Partial,
    /// Post real metadata unchanged
    None,
}

impl ObfuscationPolicy {
    /// Convert to integer for persistence in the queue's job_data_blob.
    pub fn to_i32(self) -> i32 {
        match self {
            ObfuscationPolicy::Full => 0,
            ObfuscationPolicy::Partial => 1,
            ObfuscationPolicy::None => 2,
        }
    }

    /// Convert from integer, falling back to `Partial` on unrecognized values.
    pub fn from_i32(value: i32) -> Self {
        match value {
            0 => ObfuscationPolicy::Full,
            1 => ObfuscationPolicy::Partial,
            2 => ObfuscationPolicy::None,
            _ => ObfuscationPolicy::Partial,
        }
    }
}

/// Newsgroup assignment strategy for the Segmenter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GroupPolicy {
    /// Assign the full configured newsgroup list to every article (default)
    #[default]
    All,
    /// Select one group pseudo-randomly per file; all of a file's parts share it
    EachFile,
}

impl GroupPolicy {
    /// Convert to integer for persistence.
    pub fn to_i32(self) -> i32 {
        match self {
            GroupPolicy::All => 0,
            GroupPolicy::EachFile => 1,
        }
    }

    /// Convert from integer, falling back to `All` on unrecognized values.
    pub fn from_i32(value: i32) -> Self {
        match value {
            0 => GroupPolicy::All,
            1 => GroupPolicy::EachFile,
            _ => GroupPolicy::All,
        }
    }
}

/// Message-ID generation scheme.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MessageIdFormat {
    /// 32 base36 characters plus a fixed host suffix (default)
    #[default]
    Random,
    /// Length-prefixed, tag-carrying format; adds an NGX header
    Ngx,
}

impl MessageIdFormat {
    /// Convert to integer for persistence.
    pub fn to_i32(self) -> i32 {
        match self {
            MessageIdFormat::Random => 0,
            MessageIdFormat::Ngx => 1,
        }
    }

    /// Convert from integer, falling back to `Random` on unrecognized values.
    pub fn from_i32(value: i32) -> Self {
        match value {
            0 => MessageIdFormat::Random,
            1 => MessageIdFormat::Ngx,
            _ => MessageIdFormat::Random,
        }
    }
}

/// Post-upload `STAT` verification configuration.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct PostCheckConfig {
    /// Enable post-upload verification (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Delay between a successful POST and its STAT check (default: 2 seconds)
    #[serde(default = "default_check_delay", with = "duration_serde")]
    pub delay: Duration,

    /// Maximum reposts of a single missing article (default: 3)
    #[serde(default = "default_max_reposts")]
    pub max_reposts: u32,
}

impl Default for PostCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            delay: default_check_delay(),
            max_reposts: default_max_reposts(),
        }
    }
}

/// PAR2 recovery-volume generation configuration.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct Par2Config {
    /// Enable PAR2 generation (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Redundancy percentage passed to the external tool (default: 10)
    #[serde(default = "default_redundancy")]
    pub redundancy: u32,

    /// Target size of each recovery volume, in bytes (default: article_size_in_bytes * 10)
    #[serde(default = "default_volume_size")]
    pub volume_size: u64,

    /// Maximum input file slices (par2's `-t` equivalent), 0 = tool default
    #[serde(default)]
    pub max_input_slices: u32,

    /// Additional raw arguments forwarded to the external tool
    #[serde(default)]
    pub extra_options: Vec<String>,

    /// Scratch directory for PAR2 outputs before the NZB is finalized
    #[serde(default = "default_par2_temp_dir")]
    pub temp_dir: PathBuf,

    /// Run PAR2 to completion before posting begins (default: true, safe mode)
    #[serde(default = "default_true")]
    pub wait_for_par2: bool,

    /// Obfuscation policy applied to generated PAR2 file names
    #[serde(default)]
    pub obfuscation_policy: ObfuscationPolicy,
}

impl Default for Par2Config {
    fn default() -> Self {
        Self {
            enabled: true,
            redundancy: default_redundancy(),
            volume_size: default_volume_size(),
            max_input_slices: 0,
            extra_options: Vec::new(),
            temp_dir: default_par2_temp_dir(),
            wait_for_par2: true,
            obfuscation_policy: ObfuscationPolicy::default(),
        }
    }
}

/// NZB document compression configuration.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct NzbCompressionConfig {
    /// Enable compression of the generated NZB document (default: false)
    #[serde(default)]
    pub enabled: bool,

    /// Compression codec
    #[serde(default)]
    pub codec: NzbCodec,

    /// Codec-specific compression level (see `NzbCodec::level_range`)
    #[serde(default = "default_nzb_level")]
    pub level: i32,

    /// Keep `.nzb` as the base extension before appending the codec's suffix (default: true)
    #[serde(default = "default_true")]
    pub maintain_original_extension: bool,
}

impl Default for NzbCompressionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            codec: NzbCodec::default(),
            level: default_nzb_level(),
            maintain_original_extension: true,
        }
    }
}

/// NZB compression codec.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NzbCodec {
    /// Zstandard, levels 1-22, default 3 (default codec)
    #[default]
    Zstd,
    /// Brotli, levels 0-11, default 4
    Brotli,
    /// Deflate via zip, levels 0-9, default 6
    Zip,
}

impl NzbCodec {
    /// Convert to integer for persistence.
    pub fn to_i32(self) -> i32 {
        match self {
            NzbCodec::Zstd => 0,
            NzbCodec::Brotli => 1,
            NzbCodec::Zip => 2,
        }
    }

    /// Convert from integer, falling back to `Zstd` on unrecognized values.
    pub fn from_i32(value: i32) -> Self {
        match value {
            0 => NzbCodec::Zstd,
            1 => NzbCodec::Brotli,
            2 => NzbCodec::Zip,
            _ => NzbCodec::Zstd,
        }
    }

    /// The valid (min, max) compression-level range for this codec.
    pub fn level_range(self) -> (i32, i32) {
        match self {
            NzbCodec::Zstd => (1, 22),
            NzbCodec::Brotli => (0, 11),
            NzbCodec::Zip => (0, 9),
        }
    }

    /// The filename suffix this codec appends after `.nzb`.
    pub fn extension(self) -> &'static str {
        match self {
            NzbCodec::Zstd => "zst",
            NzbCodec::Brotli => "br",
            NzbCodec::Zip => "zip",
        }
    }
}

fn default_nzb_level() -> i32 {
    3
}

/// Persistent queue and processor concurrency configuration.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct QueueConfig {
    /// SQLite database path (default: "./usenet-poster.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Maximum concurrently-processing jobs (default: 3)
    #[serde(default = "default_max_concurrent_uploads")]
    pub max_concurrent_uploads: usize,

    /// Delete the source file after a job completes successfully (default: false)
    #[serde(default)]
    pub delete_original_file: bool,

    /// Root directory for NZB output. When unset, each NZB is written
    /// alongside its source file. When set, output paths are rebased under
    /// this directory, preserving the path relative to `watcher.watch_dir`
    /// (or flattened to the basename if the source isn't under it).
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            max_concurrent_uploads: default_max_concurrent_uploads(),
            delete_original_file: false,
            output_dir: None,
        }
    }
}

/// Directory watcher configuration.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct WatcherConfig {
    /// Directory to poll for stable new files
    pub watch_dir: PathBuf,

    /// Poll interval (default: 10 seconds)
    #[serde(default = "default_check_interval", with = "duration_serde")]
    pub check_interval: Duration,

    /// Glob patterns for files to ignore
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// Minimum file size to consider (default: 0, no minimum)
    #[serde(default)]
    pub min_file_size: u64,

    /// Files at or above this size get individual treatment vs. batching (default: 0, disabled)
    #[serde(default)]
    pub size_threshold: u64,

    /// Time-of-day window during which the watcher skips scans entirely
    #[serde(default)]
    pub ignore_schedule: Option<ScheduleWindow>,

    /// Follow symlinked files/directories (default: false)
    #[serde(default)]
    pub follow_symlinks: bool,

    /// Enqueue each subfolder as a single multi-file NZB job (default: false)
    #[serde(default)]
    pub single_nzb_per_folder: bool,
}

/// A `[start_time, end_time]` window on a 24-hour clock, possibly straddling midnight.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ScheduleWindow {
    /// Start time, "HH:MM"
    pub start_time: String,
    /// End time, "HH:MM"
    pub end_time: String,
}

impl ScheduleWindow {
    /// Whether `now` falls inside this window. Invalid `HH:MM` strings
    /// (should have been rejected by [`Config::validate`]) are treated as
    /// never-match rather than panicking.
    pub fn contains(&self, now: chrono::NaiveTime) -> bool {
        let (Some(start), Some(end)) = (
            parse_clock_time(&self.start_time),
            parse_clock_time(&self.end_time),
        ) else {
            return false;
        };
        if start <= end {
            now >= start && now <= end
        } else {
            now >= start || now <= end
        }
    }
}

/// Post-upload hook script configuration.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct PostUploadScriptConfig {
    /// Enable the post-upload hook (default: false)
    #[serde(default)]
    pub enabled: bool,

    /// Command to run; `{nzb_path}` is substituted with the generated NZB's path
    #[serde(default)]
    pub command: Option<String>,

    /// Per-attempt timeout (default: 300 seconds)
    #[serde(default = "default_script_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// Maximum retry attempts (default: 3)
    #[serde(default = "default_hook_max_retries")]
    pub max_retries: u32,

    /// Base delay before the first retry (default: 5 seconds)
    #[serde(default = "default_hook_retry_delay", with = "duration_serde")]
    pub retry_delay: Duration,

    /// Total time budget across all retries, after which the hook is abandoned (default: 1 hour)
    #[serde(default = "default_max_retry_duration", with = "duration_serde")]
    pub max_retry_duration: Duration,
}

impl Default for PostUploadScriptConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            command: None,
            timeout: default_script_timeout(),
            max_retries: default_hook_max_retries(),
            retry_delay: default_hook_retry_delay(),
            max_retry_duration: default_max_retry_duration(),
        }
    }
}

impl PostUploadScriptConfig {
    /// Build the generic retry combinator's config from the hook-specific fields.
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_retries,
            initial_delay: self.retry_delay,
            max_delay: self.max_retry_duration,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Retry configuration for transient failures.
///
/// Shared by the Poster's per-article retry, the Verifier's repost scheduling,
/// and the Processor's hook retries — the single generic shape consumed by
/// [`crate::retry::with_retry`].
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// REST front-end configuration (optional, see).
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiConfig {
    /// Address to bind to (default: 127.0.0.1:8780), overridden by HOST/PORT env vars
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Optional API key for authentication
    #[serde(default)]
    pub api_key: Option<String>,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Enable Swagger UI at /swagger-ui (default: true)
    #[serde(default = "default_true")]
    pub swagger_ui: bool,

    /// Per-IP request rate limiting
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            api_key: None,
            cors_enabled: true,
            cors_origins: default_cors_origins(),
            swagger_ui: true,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

/// Per-IP token-bucket rate limiting for the REST front-end.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RateLimitConfig {
    /// Enable rate limiting (default: false)
    #[serde(default)]
    pub enabled: bool,

    /// Sustained requests per second allowed per client IP (default: 10)
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,

    /// Burst capacity above the sustained rate (default: 20)
    #[serde(default = "default_burst_size")]
    pub burst_size: u32,

    /// Path prefixes exempt from rate limiting (e.g. `/health`)
    #[serde(default = "default_exempt_paths")]
    pub exempt_paths: Vec<String>,

    /// Client IPs exempt from rate limiting
    #[serde(default)]
    pub exempt_ips: Vec<std::net::IpAddr>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            requests_per_second: default_requests_per_second(),
            burst_size: default_burst_size(),
            exempt_paths: default_exempt_paths(),
            exempt_ips: Vec::new(),
        }
    }
}

fn default_requests_per_second() -> u32 {
    10
}

fn default_burst_size() -> u32 {
    20
}

fn default_exempt_paths() -> Vec<String> {
    vec!["/health".into(), "/openapi.json".into()]
}

// Default value functions

fn default_connections() -> usize {
    10
}

fn default_max_idle_seconds() -> u64 {
    300
}

fn default_max_ttl_seconds() -> u64 {
    3600
}

fn default_true() -> bool {
    true
}

fn default_article_size() -> u64 {
    750_000
}

fn default_max_retries() -> u32 {
    5
}

fn default_from() -> String {
    "poster@example.com".to_string()
}

fn default_check_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_max_reposts() -> u32 {
    3
}

fn default_redundancy() -> u32 {
    10
}

fn default_volume_size() -> u64 {
    default_article_size() * 10
}

fn default_par2_temp_dir() -> PathBuf {
    std::env::temp_dir().join("usenet-poster-par2")
}

fn default_database_path() -> PathBuf {
    PathBuf::from("usenet-poster.db")
}

fn default_max_concurrent_uploads() -> usize {
    3
}

fn default_check_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_script_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_hook_max_retries() -> u32 {
    3
}

fn default_hook_retry_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_max_retry_duration() -> Duration {
    Duration::from_secs(3600)
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8780))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".into()]
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Optional Duration serialization helper
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}

/// Configuration update for runtime-changeable settings.
///
/// Only fields safe to change while the engine is running are included here.
/// Fields requiring restart (database_path, watch_dir, providers' identity) are
/// handled through full provider-set reconciliation instead, not this struct.
/// Uses the double-`Option` pattern to distinguish "untouched" from
/// "explicitly cleared" from "explicitly set": see the tests below.
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct ConfigUpdate {
    /// Global throughput cap in bytes/sec (None = unlimited)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub throttle_rate: Option<Option<u64>>,

    /// Replace the full provider set (hot reconfiguration, see)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub providers: Option<Vec<ProviderConfig>>,
}
