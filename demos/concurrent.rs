use {
    daily_roller::{DailyLoggerBuilder, OverflowPolicy},
    std::{sync::Arc, thread, time::Instant},
};

/// Many producers sharing one logger; only the writer thread touches the file.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let start = Instant::now();
    let logger = Arc::new(
        DailyLoggerBuilder::new("./logs", "concurrent")
            .channel_capacity(256)
            .overflow(OverflowPolicy::DropAndCount) // Producers never wait on disk
            .build()?,
    );
    logger.start()?;

    let producers: Vec<_> = (0..8)
        .map(|worker| {
            let logger = logger.clone();
            thread::spawn(move || {
                for i in 1..=10_000 {
                    logger.write_normal(format!("worker {worker} entry #{i}"));
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().map_err(|_| "producer panicked")?;
    }
    logger.stop_and_wait()?;

    let stats = logger.stats();
    println!(
        "Done logging in {:?}: {} lines written, {} dropped",
        start.elapsed(),
        stats.written,
        stats.dropped
    );
    Ok(())
}
