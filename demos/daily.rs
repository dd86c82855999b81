use daily_roller::{DailyLoggerBuilder, TimeZone};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logger = DailyLoggerBuilder::new("./logs", "daily")
        .time_zone(TimeZone::UTC) // Switch files at UTC midnight
        .max_keep_files(7) // Keep one week of logs
        .build()?;

    logger.start()?;
    logger.write_normal("System startup - UTC day boundaries will be used for rotation");
    logger.write_normal("Configuration loaded successfully");
    logger.write_normal("Server listening on port 8080");
    logger.stop_and_wait()?;

    println!("Wrote {}", logger.current_log_path().display());
    Ok(())
}
