mod common;

use anyhow::Result;
use common::{init_tracing, mem_lines};
use readall::io::fs::MemoryFileSystem;
use readall::io::lines::TextLinesFactory;
use readall::testing::{FailingFactory, FailurePoint, InstrumentedFactory, numbered_lines};
use readall::{
    ByteRange, CancelToken, ConcurrencyLimiter, FileHandle, IngestError, RangeReader,
    ReadOutcome, ReadStatus, RecordSource, RecordSourceFactory, SkipFailures, SourceInput,
    WorkItem, split_into_ranges,
};
use std::sync::{Arc, Mutex};
use std::thread;

fn reader_over(
    fs: &MemoryFileSystem,
    factory: impl RecordSourceFactory<String> + 'static,
    limiter: &Arc<ConcurrencyLimiter>,
) -> RangeReader<String> {
    RangeReader::<String>::new(factory)
        .with_file_system(Arc::new(fs.clone()))
        .with_limiter(Arc::clone(limiter))
}

#[test]
fn open_failure_with_lenient_policy_yields_nothing() -> Result<()> {
    init_tracing();
    let fs = MemoryFileSystem::new();
    let file = mem_lines(&fs, "mem/a.txt", &["one", "two"]);
    let limiter = ConcurrencyLimiter::new(1);
    let reader = reader_over(
        &fs,
        FailingFactory::new(TextLinesFactory, FailurePoint::Open),
        &limiter,
    )
    .with_exception_policy(Arc::new(SkipFailures));

    let mut seen = Vec::new();
    let outcome = reader.read_into(WorkItem::whole_file(file), |line| seen.push(line))?;

    assert_eq!(
        outcome,
        ReadOutcome {
            status: ReadStatus::FailedHandled,
            records: 0
        }
    );
    assert!(seen.is_empty());
    assert_eq!(limiter.available(), 1);
    let snap = reader.metrics().snapshot();
    assert_eq!(snap.items_failed_handled, 1);
    assert_eq!(snap.sources_opened, 0);
    Ok(())
}

#[test]
fn open_failure_with_default_policy_is_surfaced() -> Result<()> {
    let fs = MemoryFileSystem::new();
    let file = mem_lines(&fs, "mem/a.txt", &["one"]);
    let limiter = ConcurrencyLimiter::new(1);
    let reader = reader_over(
        &fs,
        FailingFactory::new(TextLinesFactory, FailurePoint::Open),
        &limiter,
    );

    let results: Vec<_> = reader.read(WorkItem::whole_file(file)).collect();
    assert_eq!(results.len(), 1);
    match &results[0] {
        Err(IngestError::Open { path, range, cause }) => {
            assert_eq!(path, "mem/a.txt");
            assert_eq!(*range, ByteRange::new(0, 4));
            assert!(cause.to_string().contains("injected open failure"));
        }
        other => panic!("expected an open failure, got {other:?}"),
    }

    // The permit went back before the error was yielded.
    let permit = limiter.try_acquire();
    assert!(permit.is_some());
    assert_eq!(reader.metrics().snapshot().items_failed_fatal, 1);
    Ok(())
}

#[test]
fn missing_file_is_an_open_failure() {
    let fs = MemoryFileSystem::new();
    let limiter = ConcurrencyLimiter::new(1);
    let reader = reader_over(&fs, TextLinesFactory, &limiter);

    let err = reader
        .read_into(WorkItem::whole_file(FileHandle::new("mem/gone.txt", 10)), drop)
        .unwrap_err();
    assert!(matches!(err, IngestError::Open { .. }));
    assert!(err.is_source_failure());
    assert_eq!(limiter.available(), 1);
}

#[test]
fn handled_read_failure_keeps_earlier_records() -> Result<()> {
    let fs = MemoryFileSystem::new();
    let lines = numbered_lines(10);
    let file = mem_lines(&fs, "mem/a.txt", &lines);
    let limiter = ConcurrencyLimiter::new(1);
    let reader = reader_over(
        &fs,
        FailingFactory::new(TextLinesFactory, FailurePoint::AfterRecords(3)),
        &limiter,
    )
    .with_exception_policy(Arc::new(SkipFailures));

    let mut seen = Vec::new();
    let outcome = reader.read_into(WorkItem::whole_file(file), |line| seen.push(line))?;

    assert_eq!(outcome.status, ReadStatus::FailedHandled);
    assert_eq!(outcome.records, 3);
    assert_eq!(seen, lines[..3]);
    assert_eq!(limiter.available(), 1);
    assert_eq!(reader.metrics().open_sources(), 0);
    Ok(())
}

#[test]
fn rethrown_read_failure_follows_the_records_read_so_far() {
    let fs = MemoryFileSystem::new();
    let lines = numbered_lines(10);
    let file = mem_lines(&fs, "mem/a.txt", &lines);
    let limiter = ConcurrencyLimiter::new(1);
    let reader = reader_over(
        &fs,
        FailingFactory::new(TextLinesFactory, FailurePoint::AfterRecords(3)),
        &limiter,
    );

    let mut records = reader.read(WorkItem::whole_file(file));
    for expected in &lines[..3] {
        assert_eq!(records.next().map(Result::ok), Some(Some(expected.clone())));
    }
    assert!(matches!(records.next(), Some(Err(IngestError::Read { .. }))));
    assert!(records.next().is_none());
    assert_eq!(limiter.available(), 1);
}

#[test]
fn close_failure_goes_through_the_policy() -> Result<()> {
    let fs = MemoryFileSystem::new();
    let file = mem_lines(&fs, "mem/a.txt", &["a", "b"]);
    let limiter = ConcurrencyLimiter::new(1);

    let strict = reader_over(
        &fs,
        FailingFactory::new(TextLinesFactory, FailurePoint::Close),
        &limiter,
    );
    let results: Vec<_> = strict.read(WorkItem::whole_file(file.clone())).collect();
    assert_eq!(results.len(), 3);
    assert!(matches!(results[2], Err(IngestError::Read { .. })));

    let lenient = strict.with_exception_policy(Arc::new(SkipFailures));
    let outcome = lenient.read_into(WorkItem::whole_file(file), drop)?;
    assert_eq!(outcome.status, ReadStatus::FailedHandled);
    assert_eq!(outcome.records, 2);
    assert_eq!(limiter.available(), 1);
    Ok(())
}

#[test]
fn policy_sees_the_failing_file_and_range() -> Result<()> {
    let fs = MemoryFileSystem::new();
    let text = "x".repeat(40) + "\n";
    let size = fs.insert("mem/a.txt", text.repeat(10));
    let file = FileHandle::new("mem/a.txt", size);
    let limiter = ConcurrencyLimiter::new(2);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    let reader = reader_over(
        &fs,
        FailingFactory::new(TextLinesFactory, FailurePoint::Open),
        &limiter,
    )
    .with_exception_policy(Arc::new(
        move |file: &FileHandle, range: &ByteRange, _err: &anyhow::Error| {
            log.lock().unwrap().push((file.path().to_string(), *range));
            false
        },
    ));

    for item in split_into_ranges(&file, 100)? {
        reader.read_into(item, drop)?;
    }
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 5);
    assert_eq!(seen[1], ("mem/a.txt".to_string(), ByteRange::new(100, 200)));
    Ok(())
}

#[test]
fn cancelled_before_start_never_opens() {
    let fs = MemoryFileSystem::new();
    let file = mem_lines(&fs, "mem/a.txt", &["a"]);
    let limiter = ConcurrencyLimiter::new(1);
    let token = CancelToken::new();
    token.cancel();
    let factory = InstrumentedFactory::new(TextLinesFactory);
    let stats = factory.stats();
    let reader = reader_over(&fs, factory, &limiter).with_cancel_token(token);

    let err = reader.read_into(WorkItem::whole_file(file), drop).unwrap_err();
    assert!(matches!(err, IngestError::Cancelled { .. }));
    assert_eq!(stats.created(), 0);
    assert_eq!(limiter.available(), 1);
    assert_eq!(reader.metrics().snapshot().items_cancelled, 1);
}

#[test]
fn cancellation_mid_read_closes_and_releases() {
    let fs = MemoryFileSystem::new();
    let file = mem_lines(&fs, "mem/a.txt", &numbered_lines(20));
    let limiter = ConcurrencyLimiter::new(1);
    let token = CancelToken::new();
    let factory = InstrumentedFactory::new(TextLinesFactory);
    let stats = factory.stats();
    let reader = reader_over(&fs, factory, &limiter).with_cancel_token(token.clone());

    let mut records = reader.read(WorkItem::whole_file(file));
    assert!(matches!(records.next(), Some(Ok(_))));
    assert!(matches!(records.next(), Some(Ok(_))));
    assert_eq!(limiter.available(), 0);
    assert_eq!(stats.live(), 1);

    token.cancel();
    assert!(matches!(records.next(), Some(Err(IngestError::Cancelled { .. }))));
    assert!(records.next().is_none());
    assert_eq!(records.records(), 2);
    assert_eq!(stats.live(), 0);
    assert_eq!(limiter.available(), 1);
}

#[test]
fn cancellation_while_waiting_for_a_permit() {
    let fs = MemoryFileSystem::new();
    let file = mem_lines(&fs, "mem/a.txt", &["a"]);
    let limiter = ConcurrencyLimiter::new(1);
    let held = limiter.acquire();
    let token = CancelToken::new();
    let reader = reader_over(&fs, TextLinesFactory, &limiter).with_cancel_token(token.clone());

    let worker = thread::spawn(move || reader.read_into(WorkItem::whole_file(file), drop));
    while limiter.waiting() == 0 {
        thread::yield_now();
    }
    token.cancel();

    let result = worker.join().unwrap();
    assert!(matches!(result, Err(IngestError::Cancelled { .. })));
    assert_eq!(limiter.waiting(), 0);
    drop(held);
    assert_eq!(limiter.available(), 1);
}

#[test]
fn dropping_records_early_releases_the_permit() {
    let fs = MemoryFileSystem::new();
    let file = mem_lines(&fs, "mem/a.txt", &numbered_lines(10));
    let limiter = ConcurrencyLimiter::new(1);
    let factory = InstrumentedFactory::new(TextLinesFactory);
    let stats = factory.stats();
    let reader = reader_over(&fs, factory, &limiter);

    let mut records = reader.read(WorkItem::whole_file(file));
    assert!(records.next().is_some());
    drop(records);

    assert_eq!(stats.closed(), 1);
    assert_eq!(stats.live(), 0);
    assert_eq!(limiter.available(), 1);
    assert_eq!(reader.metrics().open_sources(), 0);
}

#[test]
fn line_ranges_read_every_line_exactly_once() -> Result<()> {
    let fs = MemoryFileSystem::new();
    let mut lines = numbered_lines(40);
    lines.insert(7, String::new());
    lines.insert(8, String::new());
    let file = mem_lines(&fs, "mem/a.txt", &lines);
    let limiter = ConcurrencyLimiter::new(4);
    let reader = reader_over(&fs, TextLinesFactory, &limiter);

    for bundle in [1u64, 2, 3, 5, 7, 16, 64, 1_000] {
        let mut got = Vec::new();
        for item in split_into_ranges(&file, bundle)? {
            reader.read_into(item, |line| got.push(line))?;
        }
        assert_eq!(got, lines, "bundle={bundle}");
    }
    assert_eq!(limiter.available(), 4);
    Ok(())
}

#[test]
fn last_line_without_newline_and_crlf_endings() -> Result<()> {
    let fs = MemoryFileSystem::new();
    let size = fs.insert("mem/crlf.txt", "alpha\r\nbeta\r\n\r\ngamma");
    let file = FileHandle::new("mem/crlf.txt", size);
    let limiter = ConcurrencyLimiter::new(1);
    let reader = reader_over(&fs, TextLinesFactory, &limiter);

    for bundle in [1u64, 4, 9, 100] {
        let mut got = Vec::new();
        for item in split_into_ranges(&file, bundle)? {
            reader.read_into(item, |line| got.push(line))?;
        }
        assert_eq!(got, vec!["alpha", "beta", "", "gamma"], "bundle={bundle}");
    }
    Ok(())
}

/// Line source that cannot start mid-file.
struct WholeFileLines;

impl RecordSourceFactory<String> for WholeFileLines {
    fn create(&self, path: &str, input: SourceInput) -> Result<Box<dyn RecordSource<String>>> {
        TextLinesFactory.create(path, input)
    }
}

#[test]
fn whole_file_source_reads_once_and_skips_later_ranges() -> Result<()> {
    let fs = MemoryFileSystem::new();
    let lines = numbered_lines(12);
    let file = mem_lines(&fs, "mem/a.txt", &lines);
    let limiter = ConcurrencyLimiter::new(1);
    let reader = reader_over(&fs, WholeFileLines, &limiter);

    let items = split_into_ranges(&file, 16)?;
    assert!(items.len() > 1);

    let mut got = Vec::new();
    let mut statuses = Vec::new();
    for item in items {
        statuses.push(reader.read_into(item, |line| got.push(line))?.status);
    }
    assert_eq!(got, lines);
    assert_eq!(statuses[0], ReadStatus::Completed);
    assert!(statuses[1..].iter().all(|s| *s == ReadStatus::Skipped));
    assert_eq!(
        reader.metrics().snapshot().items_skipped,
        statuses.len() as u64 - 1
    );
    Ok(())
}

#[test]
fn empty_file_is_read_as_one_empty_item() -> Result<()> {
    let fs = MemoryFileSystem::new();
    let size = fs.insert("mem/empty.txt", "");
    let file = FileHandle::new("mem/empty.txt", size);
    let limiter = ConcurrencyLimiter::new(1);
    let reader = reader_over(&fs, TextLinesFactory, &limiter);

    let items = split_into_ranges(&file, 64)?;
    assert_eq!(items.len(), 1);
    let outcome = reader.read_into(items[0].clone(), drop)?;
    assert_eq!(outcome.status, ReadStatus::Completed);
    assert_eq!(outcome.records, 0);
    assert_eq!(reader.metrics().snapshot().sources_opened, 1);
    Ok(())
}
