//! NZB builder (C8): accumulates successful article placements and emits a
//! valid NZB document, optionally compressed.
//!
//! Thread-safe: the Poster's workers append concurrently from many tasks, and
//! the Processor calls [`NzbBuilder::generate`] once every segment of a job
//! has a terminal outcome.

use crate::article::Article;
use crate::config::{NzbCodec, NzbCompressionConfig};
use crate::error::{Error, Result};
use crate::provider::PostReceipt;
use crate::types::NzbRecord;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesStart, BytesText, Event as XmlEvent};
use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Accumulates [`NzbRecord`]s and per-file content hashes for one job.
pub struct NzbBuilder {
    poster: String,
    records: Mutex<Vec<NzbRecord>>,
    file_hashes: Mutex<HashMap<String, String>>,
}

impl NzbBuilder {
    /// Start a new builder for a job posted under the given `From` identity.
    pub fn new(poster: impl Into<String>) -> Self {
        Self {
            poster: poster.into(),
            records: Mutex::new(Vec::new()),
            file_hashes: Mutex::new(HashMap::new()),
        }
    }

    /// Record a successfully posted article.
    ///
    /// Invariant: only call this for a message-ID the provider actually
    /// acknowledged. Upserts by `(file_name, part_number)` — a repost of a
    /// part that failed verification replaces the earlier record for that
    /// same part rather than adding a second `<segment>`, so only the
    /// accepted message-ID ever reaches [`Self::generate`].
    pub fn add_article(&self, article: &Article, receipt: &PostReceipt, crc32: u32) {
        let record = NzbRecord {
            subject: article.subject.clone(),
            from: article.from.clone(),
            date: article.date,
            groups: article.newsgroups.clone(),
            poster: self.poster.clone(),
            file_name: article.file_name.clone(),
            part_number: article.part_number,
            total_parts: article.total_parts,
            message_id: receipt.message_id.clone(),
            byte_count: article.size,
            crc32: Some(crc32),
        };
        let mut records = self.records.lock().expect("nzb builder lock poisoned");
        match records
            .iter_mut()
            .find(|r| r.file_name == record.file_name && r.part_number == record.part_number)
        {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
    }

    /// Record the SHA-256 of a source file, keyed by its original (real) name.
    pub fn add_file_hash(&self, original_name: impl Into<String>, sha256: [u8; 32]) {
        let hex = sha256.iter().map(|b| format!("{b:02x}")).collect::<String>();
        self.file_hashes
            .lock()
            .expect("nzb builder lock poisoned")
            .insert(original_name.into(), hex);
    }

    /// Number of articles recorded so far.
    pub fn article_count(&self) -> usize {
        self.records.lock().expect("nzb builder lock poisoned").len()
    }

    /// Group records by file name, sort each group by part number, and emit
    /// a well-formed NZB document at `output_path_base` (optionally
    /// compressed per `compression`). Returns the final path written.
    pub fn generate(
        &self,
        output_path_base: &Path,
        compression: &NzbCompressionConfig,
    ) -> Result<PathBuf> {
        let records = self.records.lock().expect("nzb builder lock poisoned");
        let xml = render_nzb(&records)?;
        drop(records);

        if let Some(parent) = output_path_base.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let base = if compression.maintain_original_extension {
            ensure_extension(output_path_base, "nzb")
        } else {
            output_path_base.to_path_buf()
        };

        if !compression.enabled {
            std::fs::write(&base, &xml)?;
            return Ok(base);
        }

        let compressed = compress(&xml, compression)?;
        let final_path = with_appended_extension(&base, compression.codec.extension());
        std::fs::write(&final_path, &compressed)?;
        Ok(final_path)
    }
}

/// Group records by file name preserving first-seen file order, sorting each
/// group's parts ascending, and serialize to an NZB XML document.
fn render_nzb(records: &[NzbRecord]) -> Result<Vec<u8>> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<&NzbRecord>> = HashMap::new();
    for record in records {
        groups
            .entry(record.file_name.clone())
            .or_insert_with(|| {
                order.push(record.file_name.clone());
                Vec::new()
            })
            .push(record);
    }
    for parts in groups.values_mut() {
        parts.sort_by_key(|r| r.part_number);
    }

    let mut buf = Vec::new();
    let mut writer = Writer::new_with_indent(Cursor::new(&mut buf), b' ', 2);
    writer
        .write_event(XmlEvent::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
        .map_err(xml_err)?;

    let mut nzb = BytesStart::new("nzb");
    nzb.push_attribute(("xmlns", "http://www.newzbin.com/DTD/2003/nzb"));
    writer.write_event(XmlEvent::Start(nzb)).map_err(xml_err)?;

    for file_name in &order {
        let parts = groups.get(file_name).expect("group exists for every ordered name");
        let Some(first) = parts.first() else { continue };

        let mut file_el = BytesStart::new("file");
        file_el.push_attribute(("poster", first.poster.as_str()));
        file_el.push_attribute(("date", first.date.timestamp().to_string().as_str()));
        let subject = format!("{file_name} ({}/{})", first.part_number, first.total_parts);
        file_el.push_attribute(("subject", subject.as_str()));
        writer.write_event(XmlEvent::Start(file_el)).map_err(xml_err)?;

        writer
            .write_event(XmlEvent::Start(BytesStart::new("groups")))
            .map_err(xml_err)?;
        let mut seen_groups = std::collections::HashSet::new();
        for record in parts {
            for group in &record.groups {
                if seen_groups.insert(group.clone()) {
                    writer
                        .write_event(XmlEvent::Start(BytesStart::new("group")))
                        .map_err(xml_err)?;
                    writer
                        .write_event(XmlEvent::Text(BytesText::new(group)))
                        .map_err(xml_err)?;
                    writer
                        .write_event(XmlEvent::End(quick_xml::events::BytesEnd::new("group")))
                        .map_err(xml_err)?;
                }
            }
        }
        writer
            .write_event(XmlEvent::End(quick_xml::events::BytesEnd::new("groups")))
            .map_err(xml_err)?;

        writer
            .write_event(XmlEvent::Start(BytesStart::new("segments")))
            .map_err(xml_err)?;
        for record in parts {
            let mut segment = BytesStart::new("segment");
            let bytes = record.byte_count.to_string();
            let number = record.part_number.to_string();
            segment.push_attribute(("bytes", bytes.as_str()));
            segment.push_attribute(("number", number.as_str()));
            writer.write_event(XmlEvent::Start(segment)).map_err(xml_err)?;
            writer
                .write_event(XmlEvent::Text(BytesText::new(&record.message_id)))
                .map_err(xml_err)?;
            writer
                .write_event(XmlEvent::End(quick_xml::events::BytesEnd::new("segment")))
                .map_err(xml_err)?;
        }
        writer
            .write_event(XmlEvent::End(quick_xml::events::BytesEnd::new("segments")))
            .map_err(xml_err)?;

        writer
            .write_event(XmlEvent::End(quick_xml::events::BytesEnd::new("file")))
            .map_err(xml_err)?;
    }

    writer
        .write_event(XmlEvent::End(quick_xml::events::BytesEnd::new("nzb")))
        .map_err(xml_err)?;

    Ok(buf)
}

fn xml_err(e: quick_xml::Error) -> Error {
    Error::Other(format!("NZB XML serialization failed: {e}"))
}

fn ensure_extension(path: &Path, ext: &str) -> PathBuf {
    if path.extension().and_then(|e| e.to_str()) == Some(ext) {
        path.to_path_buf()
    } else {
        let mut owned = path.to_path_buf();
        let file_name = owned
            .file_name()
            .map(|n| format!("{}.{ext}", n.to_string_lossy()))
            .unwrap_or_else(|| format!("output.{ext}"));
        owned.set_file_name(file_name);
        owned
    }
}

fn with_appended_extension(path: &Path, ext: &str) -> PathBuf {
    let mut owned = path.to_path_buf();
    let file_name = owned
        .file_name()
        .map(|n| format!("{}.{ext}", n.to_string_lossy()))
        .unwrap_or_else(|| format!("output.{ext}"));
    owned.set_file_name(file_name);
    owned
}

fn compress(xml: &[u8], compression: &NzbCompressionConfig) -> Result<Vec<u8>> {
    match compression.codec {
        NzbCodec::Zstd => {
            zstd::stream::encode_all(xml, compression.level).map_err(Error::Io)
        }
        NzbCodec::Brotli => {
            let mut out = Vec::new();
            let params = brotli::enc::BrotliEncoderParams {
                quality: compression.level,
                ..Default::default()
            };
            brotli::BrotliCompress(&mut Cursor::new(xml), &mut out, &params).map_err(Error::Io)?;
            Ok(out)
        }
        NzbCodec::Zip => {
            let mut out = Vec::new();
            {
                let cursor = Cursor::new(&mut out);
                let mut zip = zip::ZipWriter::new(cursor);
                let options = zip::write::FileOptions::default()
                    .compression_method(zip::CompressionMethod::Deflated)
                    .compression_level(Some(compression.level));
                zip.start_file("output.nzb", options)
                    .map_err(|e| Error::Other(format!("zip write failed: {e}")))?;
                use std::io::Write;
                zip.write_all(xml)?;
                zip.finish()
                    .map_err(|e| Error::Other(format!("zip finish failed: {e}")))?;
            }
            Ok(out)
        }
    }
}
