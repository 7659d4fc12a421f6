//! Article model, message-ID generation, and obfuscation policy (C3).

use crate::config::{MessageIdFormat, ObfuscationPolicy};
use crate::provider::MESSAGE_ID_COUNTER;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;
use sha2::{Digest, Sha256};

const BASE36_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// One segment of a file, ready to be yEnc-encoded and posted.
///
/// Invariants: `1 <= part_number <= total_parts`; across a
/// file, `[offset, offset+size)` for all parts covers `[0, file_size)` with no
/// gaps or overlap.
#[derive(Clone, Debug)]
pub struct Article {
    /// Globally unique message-ID, without the angle brackets
    pub message_id: String,
    /// Subject line (possibly obfuscated)
    pub subject: String,
    /// From header value (possibly obfuscated)
    pub from: String,
    /// Newsgroups this article is posted to
    pub newsgroups: Vec<String>,
    /// Post date (possibly randomized within the last 6 hours)
    pub date: DateTime<Utc>,
    /// 1-based part number within the file
    pub part_number: u32,
    /// Total parts for the file
    pub total_parts: u32,
    /// File name as it appears in the subject/yEnc header (possibly obfuscated)
    pub file_name: String,
    /// The real, un-obfuscated file name
    pub original_name: String,
    /// Byte offset into the source file where this part begins
    pub offset: u64,
    /// Size in bytes of this part's pre-encoded body
    pub size: u64,
    /// Total size in bytes of the source file
    pub file_size: u64,
    /// SHA-256 of the pre-encoded bytes
    pub body_hash: [u8; 32],
    /// Additional headers (e.g. the NGX tag header in `ngx` message-ID mode)
    pub extra_headers: Vec<(String, String)>,
}

impl Article {
    /// Validate the part's offset/size bounds against its declared file_size.
    pub fn covers_valid_range(&self) -> bool {
        self.part_number >= 1
            && self.part_number <= self.total_parts
            && self.offset.saturating_add(self.size) <= self.file_size
    }
}

/// Per-job article factory: applies an obfuscation policy and message-ID
/// format consistently across every article of a run.
pub struct ArticleFactory {
    obfuscation: ObfuscationPolicy,
    message_id_format: MessageIdFormat,
    host_suffix: String,
    configured_from: String,
    /// A from value stable for the whole job, used by `partial` obfuscation.
    stable_from: String,
}

impl ArticleFactory {
    /// Build a factory for one posting job.
    pub fn new(
        obfuscation: ObfuscationPolicy,
        message_id_format: MessageIdFormat,
        configured_from: String,
        host_suffix: impl Into<String>,
    ) -> Self {
        Self {
            obfuscation,
            message_id_format,
            stable_from: random_from(&configured_from),
            configured_from,
            host_suffix: host_suffix.into(),
        }
    }

    /// Generate a message-ID per the factory's configured format.
    ///
    /// `random` mode: 32 base36 characters plus the provider host suffix.
    /// `ngx` mode: the same random core, tagged so the poster knows to add
    /// the corresponding NGX header.
    pub fn generate_message_id(&self) -> String {
        let mut rng = rand::thread_rng();
        let counter = MESSAGE_ID_COUNTER.next();
        let root: u64 = rng.gen();
        let mut core = String::with_capacity(32);
        let mut seed = counter ^ root;
        for _ in 0..32 {
            let idx = (seed % BASE36_ALPHABET.len() as u64) as usize;
            core.push(BASE36_ALPHABET[idx] as char);
            seed = seed.rotate_left(5).wrapping_add(rng.r#gen::<u8>() as u64);
        }
        format!("{core}@{}", self.host_suffix)
    }

    /// Whether this factory's format requires an NGX header on every article.
    pub fn needs_ngx_header(&self) -> bool {
        matches!(self.message_id_format, MessageIdFormat::Ngx)
    }

    /// Subject line for a given (real) file name and part.
    pub fn subject(&self, real_name: &str, part_number: u32, total_parts: u32) -> String {
        match self.obfuscation {
            ObfuscationPolicy::None => {
                format!("{real_name} ({part_number}/{total_parts})")
            }
            ObfuscationPolicy::Full | ObfuscationPolicy::Partial => {
                format!(
                    "{} ({part_number}/{total_parts})",
                    random_token(24)
                )
            }
        }
    }

    /// File name as it should appear in the subject and yEnc header.
    ///
    /// `full`: a fresh random token per *article*.
    /// `partial`: one random token per *file*, shared across all its parts — callers
    /// must pass the same `file_token` for every part of a file.
    pub fn file_name(&self, real_name: &str, file_token: &str) -> String {
        match self.obfuscation {
            ObfuscationPolicy::None => real_name.to_string(),
            ObfuscationPolicy::Full => random_token(16),
            ObfuscationPolicy::Partial => file_token.to_string(),
        }
    }

    /// A random token to reuse as the stable per-file obfuscated name (`partial` mode).
    pub fn new_file_token(&self) -> String {
        random_token(16)
    }

    /// From header value for an article.
    ///
    /// `full` generates a fresh random address on every call, so each article
    /// of a job gets its own; `configured_from` plays no part here, it only
    /// governs `none` and the `partial` job-stable address.
    pub fn from(&self) -> String {
        match self.obfuscation {
            ObfuscationPolicy::None => {
                if self.configured_from.is_empty() {
                    "poster@example.com".to_string()
                } else {
                    self.configured_from.clone()
                }
            }
            ObfuscationPolicy::Partial => self.stable_from.clone(),
            ObfuscationPolicy::Full => random_address(),
        }
    }

    /// Date header value for an article.
    pub fn date(&self) -> DateTime<Utc> {
        match self.obfuscation {
            ObfuscationPolicy::Full => {
                let mut rng = rand::thread_rng();
                let back_secs = rng.gen_range(0..6 * 3600);
                Utc::now() - ChronoDuration::seconds(back_secs)
            }
            ObfuscationPolicy::Partial | ObfuscationPolicy::None => Utc::now(),
        }
    }
}

fn random_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

fn random_from(configured: &str) -> String {
    if !configured.is_empty() {
        return configured.to_string();
    }
    random_address()
}

/// A freshly generated, never-reused From address.
fn random_address() -> String {
    format!("{}@example.com", random_token(10))
}

/// Compute the SHA-256 of a byte slice, as stored in [`Article::body_hash`].
pub fn hash_bytes(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}
