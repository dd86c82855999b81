use {daily_roller::DailyLogger, tracing_subscriber::util::SubscriberInitExt};

const CONFIG: &str = r#"
log_file_name = "configured"
directory_log_path = "./logs/configured"
file_permissions = 0o644
folder_permissions = 0o755
max_keep_files = 14
"#;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // The logger's own diagnostics (start, rotation, failures) go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter("daily_roller=debug")
        .with_target(false)
        .finish()
        .try_init()?;

    let config_path = std::env::args()
        .nth(1)
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("daily-roller-demo.toml"));
    if !config_path.exists() {
        std::fs::write(&config_path, CONFIG)?;
    }

    let logger = DailyLogger::from_config(&config_path)?;
    logger.start()?;
    logger.write_normal(format!("Loaded configuration from {}", config_path.display()));
    logger.stop_and_wait()?;

    Ok(())
}
