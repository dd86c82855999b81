//! Day-boundary detection and day-stamped file naming.
//!
//! Everything here is a pure function of the configured directory, the base
//! name and a timestamp, apart from [`RotationPolicy::list_files`] and
//! retention, which read the log directory.

use {
    crate::DailyLoggerError,
    chrono::{DateTime, FixedOffset, Local, NaiveDate, Utc},
    regex::Regex,
    std::{
        fmt::Debug,
        fs,
        io,
        path::{Path, PathBuf},
    },
};

/// Extension of every file produced by the logger.
pub const LOG_EXTENSION: &str = "log";

/// `chrono` format of the day stamp that prefixes every file name.
const DAY_STAMP: &str = "%Y-%m-%d";

/// Specifies the time zone in which calendar days are counted.
///
/// This setting affects:
/// - When the day boundary is crossed (midnight in the selected time zone)
/// - The day stamp in log file names
/// - The date-time prefix of every log line
///
/// # Examples
/// ```
/// use daily_roller::TimeZone;
/// use chrono::FixedOffset;
///
/// let utc = TimeZone::UTC;
/// let local = TimeZone::Local;
/// // UTC+8, regardless of where the process runs
/// let shanghai = TimeZone::Fix(FixedOffset::east_opt(8 * 3600).unwrap());
/// ```
#[derive(Debug, Clone, Default)]
pub enum TimeZone {
    /// Use UTC. Best for distributed systems deployed across regions.
    UTC,
    /// Use the system's local time zone, re-evaluated on every reading so
    /// daylight saving changes are followed.
    #[default]
    Local,
    /// Use a fixed offset from UTC.
    Fix(FixedOffset),
}

impl TimeZone {
    /// Current wall-clock time expressed in this time zone.
    pub fn now(&self) -> DateTime<FixedOffset> {
        match self {
            TimeZone::UTC => Utc::now().fixed_offset(),
            TimeZone::Local => Local::now().fixed_offset(),
            TimeZone::Fix(offset) => Utc::now().with_timezone(offset),
        }
    }
}

/// Source of "now" for both day-boundary detection and line stamps.
///
/// The logger reads the clock from producer threads (to detect a new day)
/// and from the writer thread (to stamp lines), so implementations must be
/// shareable across threads.
pub trait Clock: Debug + Send + Sync + 'static {
    /// Current time, with the offset that defines the calendar day.
    fn now(&self) -> DateTime<FixedOffset>;
}

/// The wall clock, read in a given [`TimeZone`].
#[derive(Debug, Clone, Default)]
pub struct SystemClock {
    time_zone: TimeZone,
}

impl SystemClock {
    /// Create a wall clock for the given time zone.
    pub fn new(time_zone: TimeZone) -> Self {
        SystemClock { time_zone }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        self.time_zone.now()
    }
}

/// Decides when a new file is due and what it is called.
///
/// Files are named `<directory>/<YYYY-MM-DD>_<base name>.log`. The day stamp
/// has day resolution and is zero padded, so two different days never map to
/// the same name and lexical order of names is chronological order.
#[derive(Debug, Clone)]
pub struct RotationPolicy {
    directory: PathBuf,
    base_name: String,
}

impl RotationPolicy {
    /// Create a policy for files named after `base_name` inside `directory`.
    pub fn new<P: AsRef<Path>>(directory: P, base_name: &str) -> Self {
        RotationPolicy {
            directory: directory.as_ref().to_path_buf(),
            base_name: base_name.to_string(),
        }
    }

    /// The directory holding the day files.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// The base name shared by every day file.
    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    /// Whether `now` falls on a different calendar day than `day_marker`.
    ///
    /// Only the date component is compared; the time of day never matters.
    pub fn needs_rotation(day_marker: NaiveDate, now: &DateTime<FixedOffset>) -> bool {
        now.date_naive() != day_marker
    }

    /// Path of the file holding the lines written on `day`.
    pub fn file_name(&self, day: NaiveDate) -> PathBuf {
        self.directory.join(format!(
            "{}_{}.{LOG_EXTENSION}",
            day.format(DAY_STAMP),
            self.base_name
        ))
    }

    /// Pattern matching the bare file names produced by [`Self::file_name`].
    fn file_pattern(&self) -> Result<Regex, DailyLoggerError> {
        Regex::new(&format!(
            r"^\d{{4}}-\d{{2}}-\d{{2}}_{}\.{LOG_EXTENSION}$",
            regex::escape(&self.base_name)
        ))
        .map_err(|err| DailyLoggerError::InternalError(err.to_string()))
    }

    /// List the existing day files for this base name, oldest first.
    ///
    /// A missing directory yields an empty list. Files of other base names
    /// and sub-directories are ignored.
    pub fn list_files(&self) -> Result<Vec<PathBuf>, DailyLoggerError> {
        let file_pattern = self.file_pattern()?;
        let entries = match fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(DailyLoggerError::FileIOError(err)),
        };

        let mut all_log_files = Vec::new();
        for entry in entries.flatten() {
            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }
            if let Some(file_name) = entry.file_name().to_str() {
                if file_pattern.is_match(file_name) {
                    all_log_files.push(entry.path());
                }
            }
        }

        all_log_files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(all_log_files)
    }

    /// Remove the oldest day files so at most `max_keep_files` remain.
    ///
    /// `current` is never removed, even when the clock has gone backwards and
    /// it is not the newest file. Returns the number of files removed.
    pub(crate) fn apply_retention(&self, max_keep_files: usize, current: &Path) -> Result<usize, DailyLoggerError> {
        let all_log_files = self.list_files()?;
        if all_log_files.len() <= max_keep_files {
            return Ok(0);
        }

        let mut removed = 0;
        for path in all_log_files.iter().take(all_log_files.len() - max_keep_files) {
            if path == current {
                continue;
            }
            match fs::remove_file(path) {
                Ok(()) => {
                    tracing::debug!(path = %path.display(), "removed old log file");
                    removed += 1;
                }
                Err(err) => {
                    tracing::warn!(path = %path.display(), %err, "failed to remove old log file");
                }
            }
        }
        Ok(removed)
    }
}
