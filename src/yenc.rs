//! yEnc codec (C3): the classic +42 transform with critical-character escaping.
//!
//! Encoding and CRC32 are computed in a single pass over the input with O(1)
//! extra state. This module only encodes — the engine never decodes yEnc
//! itself (decoding a reference implementation's output is exercised only by
//! tests, via [`decode_body`]).

const ESCAPE: u8 = b'=';
const LINE_LENGTH: usize = 128;

/// Header fields for a single yEnc part (`=ybegin`/`=ypart`/`=yend`).
#[derive(Clone, Debug)]
pub struct YencHeader<'a> {
    /// 1-based part number
    pub part_number: u32,
    /// Total parts for this file
    pub total_parts: u32,
    /// Total size in bytes of the whole (unencoded) file
    pub total_size: u64,
    /// Size in bytes of this part's (unencoded) body
    pub part_size: u64,
    /// Byte offset (1-based, inclusive) of this part's first byte in the file
    pub part_begin: u64,
    /// Byte offset (1-based, inclusive) of this part's last byte in the file
    pub part_end: u64,
    /// The (possibly obfuscated) file name carried in the yEnc header
    pub name: &'a str,
    /// Line length used when wrapping encoded output
    pub line_length: usize,
}

/// The fully framed wire-form body: `=ybegin` .. encoded data .. `=yend`.
pub struct EncodedBody {
    /// Complete body bytes, ready to be written after the dot-stuffing pass
    pub bytes: Vec<u8>,
    /// CRC32 of the *pre-encoded* bytes, carried in the `=yend pcrc32=` field
    pub crc32: u32,
}

/// Encode one part's raw bytes into a framed yEnc body.
///
/// Single pass: each byte is transformed and escaped as it is pushed into the
/// output buffer, and folded into a running CRC32 accumulator at the same
/// time, so the whole operation never holds more than one copy of `data` plus
/// its (slightly larger) encoded form in memory.
pub fn encode_part(data: &[u8], header: &YencHeader<'_>) -> EncodedBody {
    let mut out = Vec::with_capacity(data.len() + data.len() / 32 + 128);

    out.extend_from_slice(
        format!(
            "=ybegin part={} total={} line={} size={} name={}\r\n",
            header.part_number, header.total_parts, header.line_length, header.total_size, header.name
        )
        .as_bytes(),
    );
    if header.total_parts > 1 {
        out.extend_from_slice(
            format!(
                "=ypart begin={} end={}\r\n",
                header.part_begin, header.part_end
            )
            .as_bytes(),
        );
    }

    let mut hasher = crc32fast::Hasher::new();
    let mut col = 0usize;
    for &byte in data {
        hasher.update(std::slice::from_ref(&byte));
        let encoded = byte.wrapping_add(42);
        if needs_escape(encoded) {
            out.push(ESCAPE);
            out.push(encoded.wrapping_add(64));
            col += 2;
        } else {
            out.push(encoded);
            col += 1;
        }
        if col >= header.line_length {
            out.extend_from_slice(b"\r\n");
            col = 0;
        }
    }
    if col > 0 {
        out.extend_from_slice(b"\r\n");
    }

    let crc32 = hasher.finalize();
    out.extend_from_slice(
        format!(
            "=yend size={} part={} pcrc32={:08x}\r\n",
            data.len(),
            header.part_number,
            crc32
        )
        .as_bytes(),
    );

    EncodedBody { bytes: out, crc32 }
}

/// A byte is "critical" and must be escaped iff its encoded value is NUL,
/// LF, CR, or the escape character itself.
fn needs_escape(encoded: u8) -> bool {
    matches!(encoded, 0x00 | 0x0a | 0x0d | ESCAPE)
}

/// Decode a single-part yEnc body back to raw bytes, for round-trip tests
/// against a standard-conformant reference decoder.
#[cfg(test)]
pub fn decode_body(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len());
    let mut lines = body.split(|&b| b == b'\n');
    let mut escaped = false;
    for line in &mut lines {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.starts_with(b"=ybegin") || line.starts_with(b"=ypart") {
            continue;
        }
        if line.starts_with(b"=yend") {
            break;
        }
        for &b in line {
            if escaped {
                out.push(b.wrapping_sub(64).wrapping_sub(42));
                escaped = false;
            } else if b == ESCAPE {
                escaped = true;
            } else {
                out.push(b.wrapping_sub(42));
            }
        }
    }
    out
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn header(part_size: u64) -> YencHeader<'static> {
        YencHeader {
            part_number: 1,
            total_parts: 1,
            total_size: part_size,
            part_size,
            part_begin: 1,
            part_end: part_size,
            name: "test.bin",
            line_length: LINE_LENGTH,
        }
    }

    #[test]
    fn round_trip_reproduces_original_bytes() {
        let data: Vec<u8> = (0..=255u8).cycle().take(5000).collect();
        let h = header(data.len() as u64);
        let encoded = encode_part(&data, &h);
        let decoded = decode_body(&encoded.bytes);
        assert_eq!(decoded, data);
    }

    #[test]
    fn round_trip_handles_all_critical_bytes() {
        // Bytes that, after +42, land exactly on NUL/LF/CR/'='.
        let data = vec![
            0u8.wrapping_sub(42),
            10u8.wrapping_sub(42),
            13u8.wrapping_sub(42),
            b'='.wrapping_sub(42),
        ];
        let h = header(data.len() as u64);
        let encoded = encode_part(&data, &h);
        assert_eq!(decode_body(&encoded.bytes), data);
    }

    #[test]
    fn crc32_matches_reference_hasher() {
        let data = b"the quick brown fox jumps over the lazy dog".to_vec();
        let h = header(data.len() as u64);
        let encoded = encode_part(&data, &h);
        let mut reference = crc32fast::Hasher::new();
        reference.update(&data);
        assert_eq!(encoded.crc32, reference.finalize());
    }

    #[test]
    fn header_carries_part_metadata() {
        let data = vec![1, 2, 3];
        let h = YencHeader {
            part_number: 2,
            total_parts: 5,
            total_size: 1000,
            part_size: 3,
            part_begin: 301,
            part_end: 303,
            name: "movie.mkv",
            line_length: LINE_LENGTH,
        };
        let encoded = encode_part(&data, &h);
        let text = String::from_utf8_lossy(&encoded.bytes);
        assert!(text.contains("part=2 total=5"));
        assert!(text.contains("begin=301 end=303"));
        assert!(text.contains("name=movie.mkv"));
    }

    #[test]
    fn empty_data_produces_only_headers() {
        let h = header(0);
        let encoded = encode_part(&[], &h);
        let text = String::from_utf8_lossy(&encoded.bytes);
        assert!(text.starts_with("=ybegin"));
        assert!(text.trim_end().ends_with(&format!("pcrc32={:08x}", encoded.crc32)));
    }

    #[test]
    fn long_lines_are_wrapped_at_line_length() {
        let data = vec![b'A'.wrapping_sub(42); 1000];
        let h = header(data.len() as u64);
        let encoded = encode_part(&data, &h);
        for line in encoded.bytes.split(|&b| b == b'\n') {
            assert!(line.len() <= LINE_LENGTH + 2);
        }
    }
}
