//! Source-file generators for posting integration tests

use std::path::{Path, PathBuf};

/// Deterministic filler content, large enough to span multiple articles at
/// small `article_size_in_bytes` test configurations.
pub const TEST_ARTICLE_CONTENT: &[u8] = b"This is test content for usenet-poster integration tests.\n\
    Line 2 of the test content.\n\
    Line 3 with some special chars: !@#$%^&*()\n";

/// Write `size` bytes of repeating, non-zero filler to `dir/name` and return
/// the full path. Non-zero content keeps the yEnc +42 transform exercising
/// the full byte range rather than always hitting the same escape case.
pub fn write_test_file(dir: &Path, name: &str, size: u64) -> PathBuf {
    let path = dir.join(name);
    let content: Vec<u8> = (0..size).map(|i| (i % 251) as u8 + 1).collect();
    std::fs::write(&path, content).expect("failed to write test fixture file");
    path
}

/// Write several numbered sibling files under `dir`, for folder-mode
/// (`FOLDER:`-prefixed) job tests.
pub fn write_test_folder(dir: &Path, file_count: usize, size_each: u64) -> PathBuf {
    for i in 0..file_count {
        write_test_file(dir, &format!("part-{i:02}.bin"), size_each);
    }
    dir.to_path_buf()
}
