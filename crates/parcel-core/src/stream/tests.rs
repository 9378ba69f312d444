use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::checksum::md5_hex;
use crate::retry::{ErrorKind, RetryPolicy};
use crate::segmenter::Interval;
use crate::transport::memory::{Fault, MemoryTransport};
use crate::worker::Completion;

const URL: &str = "https://api.example.org/data/abc-123";

fn body(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
    }
}

fn small_chunks() -> StreamOptions {
    StreamOptions {
        http_chunk_size: 128,
        ..StreamOptions::default()
    }
}

fn ready_stream(
    dir: &Path,
    transport: &Arc<MemoryTransport>,
    options: StreamOptions,
    cancel: CancelToken,
) -> DownloadStream {
    let mut stream = DownloadStream::new(URL, dir, None, transport.clone(), options, cancel);
    stream.init().unwrap();
    stream.setup_file().unwrap();
    stream
}

fn chunks(rx: &mpsc::Receiver<Completion>) -> Vec<Interval> {
    rx.try_iter()
        .filter_map(|c| match c {
            Completion::Chunk(iv) => Some(iv),
            Completion::TaskDone(_) => None,
        })
        .collect()
}

#[test]
fn init_resolves_metadata_and_layout() {
    let dir = tempfile::tempdir().unwrap();
    let data = body(1000);
    let transport = Arc::new(MemoryTransport::new(data.clone()));
    let mut stream = DownloadStream::new(
        URL,
        dir.path(),
        Some("secret".into()),
        transport,
        StreamOptions::default(),
        CancelToken::new(),
    );
    stream.init().unwrap();
    assert_eq!(stream.name(), "data.bin");
    assert_eq!(stream.size(), Some(1000));
    assert_eq!(stream.md5sum(), Some(md5_hex(&data).as_str()));
    assert_eq!(stream.directory(), dir.path().join("abc-123"));
    assert_eq!(stream.path(), dir.path().join("abc-123").join("data.bin"));
    assert_eq!(
        stream.temp_path(),
        dir.path().join("abc-123").join("data.bin.partial")
    );
    assert_eq!(
        stream.state_path(),
        dir.path().join("abc-123").join("logs").join("data.bin.parcel")
    );
    assert!(stream.state_directory().is_dir());
    assert_eq!(
        stream.headers().get("X-Auth-Token").map(String::as_str),
        Some("secret")
    );
}

#[test]
fn md5_from_elsewhere_only_fills_a_gap() {
    let dir = tempfile::tempdir().unwrap();
    let mut mt = MemoryTransport::new(body(10));
    mt.md5 = None;
    let transport = Arc::new(mt);
    let mut stream = DownloadStream::new(
        URL,
        dir.path(),
        None,
        transport,
        StreamOptions::default(),
        CancelToken::new(),
    );
    stream.init().unwrap();
    stream.set_md5sum_if_missing(Some("a".repeat(32)));
    stream.set_md5sum_if_missing(Some("b".repeat(32)));
    assert_eq!(stream.md5sum(), Some("a".repeat(32).as_str()));
}

#[test]
fn segment_reports_chunks_with_md5() {
    let dir = tempfile::tempdir().unwrap();
    let data = body(1000);
    let transport = Arc::new(MemoryTransport::new(data.clone()));
    let stream = ready_stream(dir.path(), &transport, small_chunks(), CancelToken::new());
    let (tx, rx) = mpsc::channel();

    let n = stream
        .write_segment(Interval::new(0, 1000), &tx, &fast_policy(6))
        .unwrap();
    assert_eq!(n, 1000);

    let reported = chunks(&rx);
    assert_eq!(reported.len(), 8);
    let mut next = 0;
    for iv in &reported {
        assert_eq!(iv.begin, next);
        let slice = &data[iv.begin as usize..iv.end as usize];
        assert_eq!(iv.md5sum.as_deref(), Some(md5_hex(slice).as_str()));
        next = iv.end;
    }
    assert_eq!(next, 1000);
    assert_eq!(std::fs::read(stream.temp_path()).unwrap(), data);
}

#[test]
fn segment_hashing_can_be_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(MemoryTransport::new(body(300)));
    let options = StreamOptions {
        check_segment_md5sums: false,
        ..small_chunks()
    };
    let stream = ready_stream(dir.path(), &transport, options, CancelToken::new());
    let (tx, rx) = mpsc::channel();
    stream
        .write_segment(Interval::new(0, 300), &tx, &fast_policy(1))
        .unwrap();
    assert!(chunks(&rx).iter().all(|iv| iv.md5sum.is_none()));
}

#[test]
fn failed_request_retries_only_the_remainder() {
    let dir = tempfile::tempdir().unwrap();
    let data = body(1000);
    let transport = Arc::new(MemoryTransport::new(data.clone()));
    transport.push_fault(Fault::FailAfter(300));
    let stream = ready_stream(dir.path(), &transport, small_chunks(), CancelToken::new());
    let (tx, rx) = mpsc::channel();

    let n = stream
        .write_segment(Interval::new(0, 1000), &tx, &fast_policy(6))
        .unwrap();
    assert_eq!(n, 1000);
    assert_eq!(transport.requests(), vec![Some(0..1000), Some(300..1000)]);
    assert_eq!(std::fs::read(stream.temp_path()).unwrap(), data);

    let reported: u64 = chunks(&rx).iter().map(Interval::len).sum();
    assert_eq!(reported, 1000);
}

#[test]
fn short_body_is_treated_as_transient() {
    let dir = tempfile::tempdir().unwrap();
    let data = body(1000);
    let transport = Arc::new(MemoryTransport::new(data.clone()));
    transport.push_fault(Fault::Truncate(500));
    let stream = ready_stream(dir.path(), &transport, small_chunks(), CancelToken::new());
    let (tx, _rx) = mpsc::channel();

    stream
        .write_segment(Interval::new(0, 1000), &tx, &fast_policy(6))
        .unwrap();
    assert_eq!(transport.requests(), vec![Some(0..1000), Some(500..1000)]);
    assert_eq!(std::fs::read(stream.temp_path()).unwrap(), data);
}

#[test]
fn overlong_body_never_writes_past_the_interval() {
    let dir = tempfile::tempdir().unwrap();
    let data = body(1000);
    let transport = Arc::new(MemoryTransport::new(data.clone()));
    transport.push_fault(Fault::Overlong(50));
    let stream = ready_stream(dir.path(), &transport, small_chunks(), CancelToken::new());
    let (tx, _rx) = mpsc::channel();

    let n = stream
        .write_segment(Interval::new(0, 500), &tx, &fast_policy(6))
        .unwrap();
    assert_eq!(n, 500);
    assert_eq!(transport.requests(), vec![Some(0..500)]);
    let on_disk = std::fs::read(stream.temp_path()).unwrap();
    assert_eq!(&on_disk[..500], &data[..500]);
    assert!(on_disk[500..].iter().all(|&b| b == 0));
}

#[test]
fn gives_up_after_max_attempts() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(MemoryTransport::new(body(1000)));
    for _ in 0..3 {
        transport.push_fault(Fault::FailAfter(10));
    }
    let stream = ready_stream(dir.path(), &transport, small_chunks(), CancelToken::new());
    let (tx, rx) = mpsc::channel();

    let err = stream
        .write_segment(Interval::new(0, 1000), &tx, &fast_policy(3))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transient);
    assert_eq!(
        transport.requests(),
        vec![Some(0..1000), Some(10..1000), Some(20..1000)]
    );
    let reported: u64 = chunks(&rx).iter().map(Interval::len).sum();
    assert_eq!(reported, 30);
}

#[test]
fn not_found_is_not_retried() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(MemoryTransport::new(body(1000)));
    transport.push_fault(Fault::Status(404));
    let stream = ready_stream(dir.path(), &transport, small_chunks(), CancelToken::new());
    let (tx, _rx) = mpsc::channel();

    let err = stream
        .write_segment(Interval::new(0, 1000), &tx, &fast_policy(6))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(transport.requests().len(), 1);
}

#[test]
fn cancelled_stream_makes_no_requests() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(MemoryTransport::new(body(1000)));
    let cancel = CancelToken::new();
    let stream = ready_stream(dir.path(), &transport, small_chunks(), cancel.clone());
    cancel.cancel();
    let (tx, _rx) = mpsc::channel();

    let err = stream
        .write_segment(Interval::new(0, 1000), &tx, &fast_policy(6))
        .unwrap_err();
    assert!(matches!(err, TransferError::Cancelled));
    assert!(transport.requests().is_empty());
}

#[test]
fn closed_completion_channel_stops_the_segment() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(MemoryTransport::new(body(1000)));
    let stream = ready_stream(dir.path(), &transport, small_chunks(), CancelToken::new());
    let (tx, rx) = mpsc::channel();
    drop(rx);

    let err = stream
        .write_segment(Interval::new(0, 1000), &tx, &fast_policy(6))
        .unwrap_err();
    assert!(matches!(err, TransferError::Cancelled));
    assert_eq!(transport.requests().len(), 1);
}

fn download_and_finalize(stream: &mut DownloadStream) {
    let size = stream.size().unwrap();
    let (tx, _rx) = mpsc::channel();
    stream
        .write_segment(Interval::new(0, size), &tx, &fast_policy(1))
        .unwrap();
    stream.finalize().unwrap();
}

#[test]
fn finalize_renames_and_validation_passes() {
    let dir = tempfile::tempdir().unwrap();
    let data = body(700);
    let transport = Arc::new(MemoryTransport::new(data.clone()));
    let mut stream = ready_stream(dir.path(), &transport, small_chunks(), CancelToken::new());
    download_and_finalize(&mut stream);

    assert!(!stream.temp_path().exists());
    assert_eq!(std::fs::read(stream.path()).unwrap(), data);
    stream.validate_whole_file().unwrap();
}

#[test]
fn validation_detects_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let mut mt = MemoryTransport::new(body(700));
    mt.md5 = Some("0".repeat(32));
    let transport = Arc::new(mt);
    let mut stream = ready_stream(dir.path(), &transport, small_chunks(), CancelToken::new());
    download_and_finalize(&mut stream);

    let err = stream.validate_whole_file().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IntegrityMismatch);
    assert!(err.to_string().contains("mismatch"));
}

#[test]
fn validation_without_reference_md5_fails() {
    let dir = tempfile::tempdir().unwrap();
    let mut mt = MemoryTransport::new(body(700));
    mt.md5 = None;
    let transport = Arc::new(mt);
    let mut stream = ready_stream(dir.path(), &transport, small_chunks(), CancelToken::new());
    download_and_finalize(&mut stream);

    let err = stream.validate_whole_file().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IntegrityMismatch);
}

#[test]
fn validation_can_be_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let mut mt = MemoryTransport::new(body(700));
    mt.md5 = Some("0".repeat(32));
    let transport = Arc::new(mt);
    let options = StreamOptions {
        check_file_md5sum: false,
        ..small_chunks()
    };
    let mut stream = ready_stream(dir.path(), &transport, options, CancelToken::new());
    download_and_finalize(&mut stream);
    stream.validate_whole_file().unwrap();
}

#[test]
fn unknown_size_downloads_whole_body_without_md5_check() {
    let dir = tempfile::tempdir().unwrap();
    let data = body(450);
    let mut mt = MemoryTransport::new(data.clone());
    mt.send_length = false;
    mt.md5 = Some("0".repeat(32));
    let transport = Arc::new(mt);
    let mut stream = ready_stream(dir.path(), &transport, small_chunks(), CancelToken::new());
    assert_eq!(stream.size(), None);
    assert!(!stream.options().check_file_md5sum);

    assert_eq!(stream.download_whole().unwrap(), 450);
    assert_eq!(transport.requests(), vec![None]);
    stream.finalize().unwrap();
    assert_eq!(std::fs::read(stream.path()).unwrap(), data);
    stream.validate_whole_file().unwrap();
}

#[test]
fn write_without_setup_is_a_storage_error() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(MemoryTransport::new(body(10)));
    let mut stream = DownloadStream::new(
        URL,
        dir.path(),
        None,
        transport.clone(),
        StreamOptions::default(),
        CancelToken::new(),
    );
    stream.init().unwrap();
    let (tx, _rx) = mpsc::channel();
    let err = stream
        .write_segment(Interval::new(0, 10), &tx, &fast_policy(1))
        .unwrap_err();
    assert!(matches!(err, TransferError::Storage(_)));
    assert!(transport.requests().is_empty());
}
