//! Custom test assertions for posting integration tests

use std::path::{Path, PathBuf};
use std::time::Duration;
use usenet_poster::types::{Event, JobId};
use usenet_poster::Processor;

/// Result of waiting for a job to reach a terminal state
#[derive(Debug)]
pub enum WaitResult {
    /// The job completed and its NZB was written to the returned path
    Completed(PathBuf),
    /// The job errored out with the recorded message
    Errored(String),
    /// Timeout waiting for a terminal event
    Timeout,
    /// Event channel closed unexpectedly
    ChannelClosed,
}

/// Wait for a job to reach a terminal state (`Completed` or `Errored`).
pub async fn wait_for_completion(processor: &Processor, id: JobId, timeout: Duration) -> WaitResult {
    let mut events = processor.subscribe();

    let result = tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(Event::Completed { id: event_id, nzb_path }) if event_id == id => {
                    return WaitResult::Completed(nzb_path);
                }
                Ok(Event::Errored { id: event_id, message }) if event_id == id => {
                    return WaitResult::Errored(message);
                }
                Ok(_) => continue,
                Err(_) => return WaitResult::ChannelClosed,
            }
        }
    })
    .await;

    result.unwrap_or(WaitResult::Timeout)
}

/// Wait for a job to start processing (`Event::Started`).
pub async fn wait_for_started(processor: &Processor, id: JobId, timeout: Duration) -> bool {
    let mut events = processor.subscribe();

    let result = tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(Event::Started { id: event_id, .. }) if event_id == id => return true,
                Ok(Event::Errored { id: event_id, .. }) if event_id == id => return false,
                Ok(_) => continue,
                Err(_) => return false,
            }
        }
    })
    .await;

    result.unwrap_or(false)
}

/// Wait for a specific event matching `predicate`.
pub async fn wait_for_event<F>(processor: &Processor, timeout: Duration, predicate: F) -> Option<Event>
where
    F: Fn(&Event) -> bool,
{
    let mut events = processor.subscribe();

    let result = tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return Some(event),
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
    })
    .await;

    result.ok().flatten()
}

/// Collect events until `stop_predicate` matches or the timeout elapses.
pub async fn collect_events_until<F>(processor: &Processor, timeout: Duration, stop_predicate: F) -> Vec<Event>
where
    F: Fn(&Event) -> bool,
{
    let mut events = processor.subscribe();
    let mut collected = Vec::new();

    let _ = tokio::time::timeout(timeout, async {
        while let Ok(event) = events.recv().await {
            let should_stop = stop_predicate(&event);
            collected.push(event);
            if should_stop {
                break;
            }
        }
    })
    .await;

    collected
}

/// Assert that a job completed successfully, returning its NZB path.
pub async fn assert_job_completed(processor: &Processor, id: JobId, timeout: Duration) -> PathBuf {
    match wait_for_completion(processor, id, timeout).await {
        WaitResult::Completed(path) => path,
        WaitResult::Errored(message) => panic!("job {id} errored: {message}"),
        WaitResult::Timeout => panic!("timeout waiting for job {id} to complete"),
        WaitResult::ChannelClosed => panic!("event channel closed while waiting for job {id}"),
    }
}

/// Assert that a job errored, optionally checking the message content.
pub async fn assert_job_errored(
    processor: &Processor,
    id: JobId,
    timeout: Duration,
    expected_message_contains: Option<&str>,
) {
    match wait_for_completion(processor, id, timeout).await {
        WaitResult::Errored(message) => {
            if let Some(expected) = expected_message_contains {
                assert!(
                    message.contains(expected),
                    "expected error to contain '{expected}', got: {message}"
                );
            }
        }
        WaitResult::Completed(_) => panic!("expected job {id} to error, but it completed"),
        WaitResult::Timeout => panic!("timeout waiting for job {id} to error"),
        WaitResult::ChannelClosed => panic!("event channel closed while waiting for job {id}"),
    }
}

/// Assert that an NZB file exists and parses as well-formed XML with at
/// least one `<file>` entry.
pub fn assert_nzb_valid(path: &Path) {
    assert!(path.exists(), "expected NZB at {path:?} to exist");
    let text = std::fs::read_to_string(path).expect("failed to read NZB file");
    let mut reader = quick_xml::Reader::from_str(&text);
    let mut file_count = 0;
    loop {
        match reader.read_event() {
            Ok(quick_xml::events::Event::Start(e)) if e.name().as_ref() == b"file" => {
                file_count += 1;
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => panic!("malformed NZB at {path:?}: {e}"),
            _ => {}
        }
    }
    assert!(file_count > 0, "expected NZB at {path:?} to contain at least one <file>");
}

/// Assert that files exist in a directory.
pub fn assert_files_exist(dir: &Path, expected_files: &[&str]) {
    for filename in expected_files {
        let path = dir.join(filename);
        assert!(path.exists(), "expected file '{filename}' to exist in {dir:?}");
    }
}

/// Assert that a directory is not empty.
pub fn assert_dir_not_empty(dir: &Path) {
    assert!(dir.exists(), "directory {dir:?} does not exist");
    let entries: Vec<_> = std::fs::read_dir(dir).expect("failed to read directory").collect();
    assert!(!entries.is_empty(), "expected directory {dir:?} to contain files, but it's empty");
}
