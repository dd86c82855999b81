mod common;

use {
    chrono::{DateTime, FixedOffset},
    common::{payloads, ManualClock},
    daily_roller::{Clock, DailyLogger, DailyLoggerBuilder, OverflowPolicy, RotationPolicy},
    std::{
        collections::HashSet,
        sync::{
            atomic::{AtomicU64, Ordering},
            Arc,
        },
        thread,
        time::Duration,
    },
};

const LAUNCHED: &str = "Logging thread successfully launched";
const WRITERS: usize = 500;

fn numbered(lines: &[String]) -> Vec<usize> {
    lines
        .iter()
        .filter(|line| line.as_str() != LAUNCHED)
        .map(|line| {
            line.strip_prefix("concurrent message ")
                .and_then(|n| n.parse().ok())
                .unwrap_or_else(|| panic!("unexpected line {line:?}"))
        })
        .collect()
}

#[test]
fn concurrent_writes_then_immediate_stop_do_not_crash() {
    let dir = tempfile::tempdir().unwrap();
    let logger = Arc::new(DailyLogger::new("not_all_make_it", dir.path(), 0o644, 0o755));
    logger.start().unwrap();

    let handles: Vec<_> = (0..WRITERS)
        .map(|i| {
            let logger = logger.clone();
            thread::spawn(move || logger.write_normal(format!("concurrent message {i}")))
        })
        .collect();
    logger.stop_and_wait().unwrap();
    for handle in handles {
        handle.join().unwrap();
    }

    let lines = payloads(&logger.current_log_path());
    assert_eq!(lines[0], LAUNCHED);
    let numbers = numbered(&lines);
    assert!(numbers.len() <= WRITERS);
    let unique: HashSet<_> = numbers.iter().collect();
    assert_eq!(unique.len(), numbers.len(), "a message was written twice");
    assert!(numbers.iter().all(|n| *n < WRITERS));
}

#[test]
fn concurrent_writes_all_persist_when_they_finish_before_stop() {
    let dir = tempfile::tempdir().unwrap();
    let logger = Arc::new(DailyLogger::new("all_make_it", dir.path(), 0o644, 0o755));
    logger.start().unwrap();

    let handles: Vec<_> = (0..WRITERS)
        .map(|i| {
            let logger = logger.clone();
            thread::spawn(move || logger.write_normal(format!("concurrent message {i}")))
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    logger.stop_and_wait().unwrap();

    let lines = payloads(&logger.current_log_path());
    let mut numbers = numbered(&lines);
    numbers.sort_unstable();
    assert_eq!(numbers, (0..WRITERS).collect::<Vec<_>>());
    assert_eq!(logger.stats().written, WRITERS as u64 + 1);
    assert_eq!(logger.stats().dropped, 0);
}

#[test]
fn small_channel_blocks_instead_of_dropping() {
    let dir = tempfile::tempdir().unwrap();
    let logger = Arc::new(
        DailyLoggerBuilder::new(dir.path(), "backpressure")
            .channel_capacity(2)
            .overflow(OverflowPolicy::Block)
            .build()
            .unwrap(),
    );
    logger.start().unwrap();

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let logger = logger.clone();
            thread::spawn(move || {
                for i in 0..50 {
                    logger.write_normal(format!("concurrent message {}", t * 50 + i));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    logger.stop_and_wait().unwrap();

    assert_eq!(numbered(&payloads(&logger.current_log_path())).len(), 400);
    assert_eq!(logger.stats().dropped, 0);
}

#[test]
fn drop_and_count_accounts_for_every_message() {
    let dir = tempfile::tempdir().unwrap();
    let logger = Arc::new(
        DailyLoggerBuilder::new(dir.path(), "lossy")
            .channel_capacity(1)
            .overflow(OverflowPolicy::DropAndCount)
            .build()
            .unwrap(),
    );
    logger.start().unwrap();

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let logger = logger.clone();
            thread::spawn(move || {
                for i in 0..250 {
                    logger.write_normal(format!("concurrent message {}", t * 250 + i));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    logger.stop_and_wait().unwrap();

    let stats = logger.stats();
    let persisted = numbered(&payloads(&logger.current_log_path())).len() as u64;
    // The launch line went in before any producer could fill the channel.
    assert_eq!(persisted + stats.dropped, 1000);
    assert_eq!(stats.written, persisted + 1);
}

#[test]
fn per_producer_order_survives_a_rotation() {
    let dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::at(2024, 2, 28, 23, 0, 0);
    let logger = Arc::new(
        DailyLoggerBuilder::new(dir.path(), "ordered_roll")
            .clock(clock.clone())
            .channel_capacity(8)
            .build()
            .unwrap(),
    );
    logger.start().unwrap();

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let logger = logger.clone();
            thread::spawn(move || {
                for i in 0..100 {
                    logger.write_normal(format!("producer {t} #{i}"));
                }
            })
        })
        .collect();
    clock.set(2024, 2, 29, 0, 0, 1);
    for handle in handles {
        handle.join().unwrap();
    }
    logger.write_normal("after join");
    logger.stop_and_wait().unwrap();

    let policy = RotationPolicy::new(dir.path(), "ordered_roll");
    let files = policy.list_files().unwrap();
    let mut all = Vec::new();
    for file in &files {
        all.extend(payloads(file));
    }
    assert_eq!(all.last().map(String::as_str), Some("after join"));
    for t in 0..4 {
        let prefix = format!("producer {t} #");
        let seen: Vec<usize> = all
            .iter()
            .filter_map(|line| line.strip_prefix(&prefix))
            .map(|n| n.parse().unwrap())
            .collect();
        assert_eq!(seen, (0..100).collect::<Vec<_>>());
    }
}

/// Counts readings taken outside the writer thread. A producer reads the
/// clock exactly once per write that got past the run-state check.
#[derive(Debug, Clone)]
struct ProducerReadClock {
    inner: ManualClock,
    producer_reads: Arc<AtomicU64>,
}

impl Clock for ProducerReadClock {
    fn now(&self) -> DateTime<FixedOffset> {
        if thread::current().name() != Some("daily-roller") {
            self.producer_reads.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.now()
    }
}

#[test]
fn writes_racing_stop_are_written_or_counted_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let clock = ProducerReadClock {
        inner: ManualClock::at(2024, 7, 1, 12, 0, 0),
        producer_reads: Arc::new(AtomicU64::new(0)),
    };
    let logger = Arc::new(
        DailyLoggerBuilder::new(dir.path(), "racing_stop")
            .clock(clock.clone())
            .channel_capacity(16)
            .build()
            .unwrap(),
    );
    logger.start().unwrap();
    clock.producer_reads.store(0, Ordering::SeqCst);

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let logger = logger.clone();
            thread::spawn(move || {
                for i in 0..2000 {
                    logger.write_normal(format!("concurrent message {}", t * 2000 + i));
                }
            })
        })
        .collect();
    thread::sleep(Duration::from_millis(5));
    logger.stop_and_wait().unwrap();
    for handle in handles {
        handle.join().unwrap();
    }

    let stats = logger.stats();
    let persisted = numbered(&payloads(&logger.current_log_path())).len() as u64;
    assert_eq!(stats.written, persisted + 1);
    assert_eq!(persisted + stats.dropped, clock.producer_reads.load(Ordering::SeqCst));
}
