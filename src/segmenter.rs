//! Segmenter (C4): turns one file into an ordered sequence of [`Article`]s.
//!
//! Reads the underlying file lazily through a positioned reader so encoding
//! can proceed concurrently with disk I/O without holding more than one
//! article body per worker in memory.

use crate::article::ArticleFactory;
use crate::config::GroupPolicy;
use crate::error::{Error, Result};
use crate::yenc;
use rand::Rng;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};

/// Plan for one file: how many parts, and which newsgroups they'll carry.
///
/// Computed up front so the Poster can size its channel and progress totals
/// before any bytes are read.
#[derive(Clone, Debug)]
pub struct SegmentPlan {
    /// Total size of the source file, in bytes
    pub file_size: u64,
    /// Number of parts this file will be split into
    pub total_parts: u32,
    /// Size of each part (the last part may be shorter)
    pub article_size: u64,
    /// Newsgroups assigned to every part of this file
    pub groups: Vec<String>,
}

impl SegmentPlan {
    /// Compute a plan for a file of `file_size` bytes under the given article
    /// size and group policy. `file_size == 0` is rejected by the caller
    /// before this is invoked.
    pub fn new(
        file_size: u64,
        article_size: u64,
        configured_groups: &[String],
        group_policy: GroupPolicy,
    ) -> Self {
        let total_parts = file_size.div_ceil(article_size).max(1) as u32;
        let groups = match group_policy {
            GroupPolicy::All => configured_groups.to_vec(),
            GroupPolicy::EachFile => {
                let idx = if configured_groups.is_empty() {
                    0
                } else {
                    rand::thread_rng().gen_range(0..configured_groups.len())
                };
                configured_groups
                    .get(idx)
                    .cloned()
                    .into_iter()
                    .collect::<Vec<_>>()
            }
        };
        Self {
            file_size,
            total_parts,
            article_size,
            groups,
        }
    }

    /// Offset and size of part `n` (1-based).
    pub fn part_range(&self, part_number: u32) -> (u64, u64) {
        let offset = (part_number as u64 - 1) * self.article_size;
        let size = self.article_size.min(self.file_size - offset);
        (offset, size)
    }
}

/// One part read from disk and yEnc-encoded, ready to hand to a Poster worker.
pub struct EncodedArticle {
    /// The article's metadata (message-ID, headers, hash, etc.)
    pub article: crate::article::Article,
    /// The framed yEnc body, ready for `POST`
    pub body: Vec<u8>,
    /// CRC32 of the pre-encoded segment bytes, carried into the NZB record
    pub crc32: u32,
}

/// Reads one file through a positioned handle, producing encoded articles on demand.
///
/// Intentionally sequential and pull-based: the Poster's producer task calls
/// [`Segmenter::next_article`] in a loop and dispatches each result to a
/// worker, so disk reads and article encoding are never more than one part
/// ahead of the slowest worker (backpressure).
pub struct Segmenter {
    file: File,
    plan: SegmentPlan,
    next_part: u32,
    file_name: String,
    original_name: String,
    file_token: String,
}

impl Segmenter {
    /// Open `path` and compute its segmentation plan.
    pub async fn open(
        path: &Path,
        article_size: u64,
        configured_groups: &[String],
        group_policy: GroupPolicy,
    ) -> Result<Self> {
        let file = File::open(path).await?;
        let metadata = file.metadata().await?;
        let file_size = metadata.len();
        if file_size == 0 {
            return Err(Error::InvalidJob(format!(
                "{} is empty; zero-byte files produce no articles and are rejected",
                path.display()
            )));
        }
        let plan = SegmentPlan::new(file_size, article_size, configured_groups, group_policy);
        let original_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unnamed".to_string());
        Ok(Self {
            file,
            plan,
            next_part: 1,
            file_name: original_name.clone(),
            original_name,
            file_token: String::new(),
        })
    }

    /// The plan computed for this file.
    pub fn plan(&self) -> &SegmentPlan {
        &self.plan
    }

    /// Total number of parts this file will produce.
    pub fn total_parts(&self) -> u32 {
        self.plan.total_parts
    }

    /// Read, hash, and yEnc-encode the next part, advancing internal state.
    /// Returns `Ok(None)` once every part has been produced.
    pub async fn next_article(
        &mut self,
        factory: &ArticleFactory,
        line_length: usize,
    ) -> Result<Option<EncodedArticle>> {
        if self.next_part > self.plan.total_parts {
            return Ok(None);
        }
        let part_number = self.next_part;
        self.next_part += 1;

        let (offset, size) = self.plan.part_range(part_number);
        self.file.seek(SeekFrom::Start(offset)).await?;
        let mut buf = vec![0u8; size as usize];
        self.file.read_exact(&mut buf).await?;

        if self.file_token.is_empty() {
            self.file_token = factory.new_file_token();
        }
        let obfuscated_name = factory.file_name(&self.original_name, &self.file_token);
        self.file_name = obfuscated_name.clone();

        let header = yenc::YencHeader {
            part_number,
            total_parts: self.plan.total_parts,
            total_size: self.plan.file_size,
            part_size: size,
            part_begin: offset + 1,
            part_end: offset + size,
            name: &obfuscated_name,
            line_length,
        };
        let encoded = yenc::encode_part(&buf, &header);
        let body_hash = crate::article::hash_bytes(&buf);

        let mut extra_headers = Vec::new();
        if factory.needs_ngx_header() {
            extra_headers.push((
                "X-Ngx".to_string(),
                format!("{}/{}", part_number, self.plan.total_parts),
            ));
        }

        let article = crate::article::Article {
            message_id: factory.generate_message_id(),
            subject: factory.subject(&self.original_name, part_number, self.plan.total_parts),
            from: factory.from(),
            newsgroups: self.plan.groups.clone(),
            date: factory.date(),
            part_number,
            total_parts: self.plan.total_parts,
            file_name: obfuscated_name,
            original_name: self.original_name.clone(),
            offset,
            size,
            file_size: self.plan.file_size,
            body_hash,
            extra_headers,
        };

        Ok(Some(EncodedArticle {
            article,
            body: encoded.bytes,
            crc32: encoded.crc32,
        }))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MessageIdFormat, ObfuscationPolicy};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_file(bytes: &[u8]) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(bytes).unwrap();
        f.flush().unwrap();
        f
    }

    fn factory() -> ArticleFactory {
        ArticleFactory::new(
            ObfuscationPolicy::None,
            MessageIdFormat::Random,
            "poster@example.com".into(),
            "news.example.com",
        )
    }

    #[test]
    fn plan_computes_ceil_division_part_count() {
        let plan = SegmentPlan::new(2_097_152, 750_000, &["alt.test".into()], GroupPolicy::All);
        assert_eq!(plan.total_parts, 3);
        assert_eq!(plan.part_range(1), (0, 750_000));
        assert_eq!(plan.part_range(2), (750_000, 750_000));
        assert_eq!(plan.part_range(3), (1_500_000, 597_152));
    }

    #[test]
    fn exact_multiple_produces_no_short_tail() {
        let plan = SegmentPlan::new(1_500_000, 750_000, &["alt.test".into()], GroupPolicy::All);
        assert_eq!(plan.total_parts, 2);
        assert_eq!(plan.part_range(2).1, 750_000);
    }

    #[test]
    fn parts_are_contiguous_and_cover_whole_file() {
        let plan = SegmentPlan::new(1_000_003, 100_000, &["alt.test".into()], GroupPolicy::All);
        let mut covered = 0u64;
        for n in 1..=plan.total_parts {
            let (offset, size) = plan.part_range(n);
            assert_eq!(offset, covered, "part {n} must start where the previous ended");
            covered += size;
        }
        assert_eq!(covered, plan.file_size);
    }

    #[tokio::test]
    async fn empty_file_is_rejected() {
        let f = write_file(b"");
        let result =
            Segmenter::open(f.path(), 750_000, &["alt.test".into()], GroupPolicy::All).await;
        assert!(matches!(result, Err(Error::InvalidJob(_))));
    }

    #[tokio::test]
    async fn segments_reproduce_original_bytes_in_order() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let f = write_file(&data);
        let mut seg = Segmenter::open(f.path(), 4_000, &["alt.test".into()], GroupPolicy::All)
            .await
            .unwrap();
        assert_eq!(seg.total_parts(), 3);

        let fac = factory();
        let mut reassembled = Vec::new();
        let mut last_part = 0u32;
        while let Some(encoded) = seg.next_article(&fac, 128).await.unwrap() {
            assert_eq!(encoded.article.part_number, last_part + 1);
            last_part = encoded.article.part_number;
            assert!(encoded.article.covers_valid_range());
            let decoded = yenc::decode_body(&encoded.body);
            reassembled.extend_from_slice(&decoded);
        }
        assert_eq!(reassembled, data);
        assert_eq!(last_part, 3);
    }

    #[tokio::test]
    async fn each_file_group_policy_picks_one_group_shared_by_all_parts() {
        let data = vec![7u8; 3000];
        let f = write_file(&data);
        let groups = vec!["alt.a".to_string(), "alt.b".to_string(), "alt.c".to_string()];
        let mut seg = Segmenter::open(f.path(), 1000, &groups, GroupPolicy::EachFile)
            .await
            .unwrap();
        let fac = factory();
        let mut seen_groups = std::collections::HashSet::new();
        while let Some(encoded) = seg.next_article(&fac, 128).await.unwrap() {
            assert_eq!(encoded.article.newsgroups.len(), 1);
            seen_groups.insert(encoded.article.newsgroups[0].clone());
        }
        assert_eq!(seen_groups.len(), 1, "all parts of a file share one group");
    }
}
