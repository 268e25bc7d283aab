mod common;

use anyhow::Result;
use common::{init_tracing, mem_lines};
use mark_flaky_tests::flaky;
use readall::io::fs::MemoryFileSystem;
use readall::io::lines::TextLinesFactory;
use readall::testing::{InstrumentedFactory, OpenStats, tagged_lines};
use readall::{ConcurrencyLimiter, FileHandle, ReadAll, ReadAllConfig};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

fn twenty_five_files(fs: &MemoryFileSystem) -> Vec<FileHandle> {
    (0..25)
        .map(|i| mem_lines(fs, &format!("mem/{i}.txt"), &tagged_lines(&i.to_string(), 5)))
        .collect()
}

fn read_under_limit(
    permits: usize,
    delay: Duration,
) -> Result<(usize, Arc<OpenStats>, Arc<ConcurrencyLimiter>)> {
    let fs = MemoryFileSystem::new();
    let files = twenty_five_files(&fs);
    let factory = InstrumentedFactory::new(TextLinesFactory).with_record_delay(delay);
    let stats = factory.stats();
    let limiter = ConcurrencyLimiter::new(permits);

    let read = ReadAll::<String>::new(factory, ReadAllConfig::default().with_parallelism(16))?
        .with_file_system(Arc::new(fs))
        .with_limiter(Arc::clone(&limiter));
    let lines = read.collect(files.into_iter().map(Ok))?;
    assert!(read.metrics().peak_open_sources() <= permits);
    Ok((lines.len(), stats, limiter))
}

#[test]
fn twenty_five_items_under_limit_of_ten_complete() -> Result<()> {
    init_tracing();
    let (records, stats, limiter) = read_under_limit(10, Duration::from_millis(1))?;

    assert_eq!(records, 125);
    assert_eq!(stats.created(), 25);
    assert_eq!(stats.closed(), 25);
    assert_eq!(stats.live(), 0);
    assert!(stats.peak() <= 10, "peak {} exceeded the limit", stats.peak());
    assert_eq!(limiter.available(), 10);
    assert_eq!(limiter.waiting(), 0);
    Ok(())
}

#[test]
fn single_permit_serialises_sources() -> Result<()> {
    let (records, stats, limiter) = read_under_limit(1, Duration::ZERO)?;
    assert_eq!(records, 125);
    assert_eq!(stats.peak(), 1);
    assert_eq!(limiter.available(), 1);
    Ok(())
}

// Saturation depends on scheduling, so a slow machine may miss it on one attempt.
#[flaky]
#[test]
fn limit_is_reached_under_load() {
    let (_, stats, _) = read_under_limit(10, Duration::from_millis(5)).unwrap();
    assert_eq!(stats.peak(), 10);
}

#[test]
fn raw_permits_never_exceed_capacity() {
    let limiter = ConcurrencyLimiter::new(4);
    let in_use = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..32)
        .map(|_| {
            let limiter = Arc::clone(&limiter);
            let in_use = Arc::clone(&in_use);
            let peak = Arc::clone(&peak);
            thread::spawn(move || {
                for _ in 0..10 {
                    let _permit = limiter.acquire();
                    let now = in_use.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::yield_now();
                    in_use.fetch_sub(1, Ordering::SeqCst);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert!(peak.load(Ordering::SeqCst) <= 4);
    assert_eq!(limiter.available(), 4);
    assert_eq!(limiter.in_use(), 0);
}

#[test]
fn permit_is_returned_when_holder_panics() {
    let limiter = ConcurrencyLimiter::new(2);
    let l = Arc::clone(&limiter);
    let outcome = thread::spawn(move || {
        let _permit = l.acquire();
        panic!("worker failed while holding a permit");
    })
    .join();

    assert!(outcome.is_err());
    assert_eq!(limiter.available(), 2);
}

#[test]
fn released_permit_wakes_a_blocked_waiter() {
    let limiter = ConcurrencyLimiter::new(1);
    let held = limiter.acquire();
    let l = Arc::clone(&limiter);
    let waiter = thread::spawn(move || {
        let permit = l.acquire();
        drop(permit);
    });
    while limiter.waiting() == 0 {
        thread::yield_now();
    }
    held.release();
    waiter.join().unwrap();
    assert_eq!(limiter.available(), 1);
}

#[test]
fn global_limiter_is_shared() {
    let a = ConcurrencyLimiter::global();
    let b = ConcurrencyLimiter::global();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(a.capacity(), 10);
}

#[test]
fn shared_pools_are_keyed_by_capacity() {
    let a = ConcurrencyLimiter::shared(3);
    let b = ConcurrencyLimiter::shared(3);
    let c = ConcurrencyLimiter::shared(4);
    assert!(Arc::ptr_eq(&a, &b));
    assert!(!Arc::ptr_eq(&a, &c));
    assert_eq!(c.capacity(), 4);

    let held = a.acquire();
    assert_eq!(b.available(), 2);
    assert_eq!(c.available(), 4);
    drop(held);
}

#[test]
fn configured_limit_holds_after_another_transform_exists() -> Result<()> {
    init_tracing();
    let _first = ReadAll::<String>::new(TextLinesFactory, ReadAllConfig::default())?;

    let fs = MemoryFileSystem::new();
    let files = twenty_five_files(&fs);
    let factory =
        InstrumentedFactory::new(TextLinesFactory).with_record_delay(Duration::from_millis(5));
    let stats = factory.stats();
    let config = ReadAllConfig::default()
        .with_concurrency_limit(2)
        .with_parallelism(16);
    let read = ReadAll::<String>::new(factory, config)?.with_file_system(Arc::new(fs));

    assert_eq!(read.limiter().capacity(), 2);
    let lines = read.collect(files.into_iter().map(Ok))?;
    assert_eq!(lines.len(), 125);
    assert!(stats.peak() <= 2, "configured limit 2 but peak {}", stats.peak());
    assert_eq!(stats.live(), 0);
    Ok(())
}

#[test]
fn transforms_with_the_same_limit_share_a_pool() -> Result<()> {
    let config = ReadAllConfig::default().with_concurrency_limit(6);
    let a = ReadAll::<String>::new(TextLinesFactory, config.clone())?;
    let b = ReadAll::<String>::new(TextLinesFactory, config)?;
    let c = ReadAll::<String>::new(
        TextLinesFactory,
        ReadAllConfig::default().with_concurrency_limit(5),
    )?;
    assert!(Arc::ptr_eq(a.limiter(), b.limiter()));
    assert!(!Arc::ptr_eq(a.limiter(), c.limiter()));
    assert_eq!(c.limiter().capacity(), 5);
    Ok(())
}
