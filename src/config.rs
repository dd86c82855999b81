//! File-based configuration.

use {
    crate::{DailyLoggerBuilder, DailyLoggerError},
    serde::Deserialize,
    std::{
        fs,
        path::{Path, PathBuf},
    },
};

/// Logger settings read from a TOML file.
///
/// ```toml
/// log_file_name = "server"
/// directory_log_path = "/var/log/server"
/// file_permissions = 0o640
/// folder_permissions = 0o750
/// # optional
/// max_keep_files = 30
/// channel_capacity = 4096
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggerConfig {
    /// Base name shared by every day file.
    pub log_file_name: String,
    /// Directory holding the day files; created if missing.
    pub directory_log_path: PathBuf,
    /// Permission bits of created files.
    pub file_permissions: u32,
    /// Permission bits of created directories.
    pub folder_permissions: u32,
    /// Newest day files to keep. All are kept when absent.
    #[serde(default)]
    pub max_keep_files: Option<usize>,
    /// Capacity of the inbound channel.
    #[serde(default)]
    pub channel_capacity: Option<usize>,
}

impl LoggerConfig {
    /// Read and parse a configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DailyLoggerError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|err| DailyLoggerError::ConfigRead(path.to_path_buf(), err.to_string()))?;
        let config = Self::parse(&content)?;
        tracing::debug!(path = %path.display(), log_file_name = %config.log_file_name, "loaded logger config");
        Ok(config)
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self, DailyLoggerError> {
        toml::from_str(content).map_err(|err| DailyLoggerError::ConfigParse(err.to_string()))
    }

    /// A builder preloaded with these settings.
    pub fn builder(&self) -> DailyLoggerBuilder {
        let mut builder = DailyLoggerBuilder::new(&self.directory_log_path, &self.log_file_name)
            .file_mode(self.file_permissions)
            .directory_mode(self.folder_permissions);
        if let Some(max_keep_files) = self.max_keep_files {
            builder = builder.max_keep_files(max_keep_files);
        }
        if let Some(channel_capacity) = self.channel_capacity {
            builder = builder.channel_capacity(channel_capacity);
        }
        builder
    }
}
