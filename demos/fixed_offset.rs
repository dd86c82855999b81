use {
    chrono::FixedOffset,
    daily_roller::{DailyLoggerBuilder, TimeZone},
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Days roll over at midnight UTC+8 regardless of the host's time zone.
    let offset = FixedOffset::east_opt(8 * 3600).ok_or("invalid offset")?;
    let logger = DailyLoggerBuilder::new("./logs", "shanghai")
        .time_zone(TimeZone::Fix(offset))
        .file_mode(0o640) // Owner rw, group r, others none
        .directory_mode(0o750)
        .build()?;

    logger.start()?;
    for error_code in &[500, 502, 503, 504] {
        logger.write_normal(format!(
            "Error {error_code}: Server encountered an internal error, please try again later"
        ));
    }
    logger.stop_and_wait()?;

    for file in logger.log_files()? {
        println!("{}", file.display());
    }
    Ok(())
}
