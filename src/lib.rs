//! # daily-roller
//!
//! daily-roller writes log lines to one file per calendar day. Producers hand
//! their lines to a [`DailyLogger`], which forwards them over a bounded
//! channel to a single background thread; that thread owns the open file,
//! stamps every line with the date and time, switches to a fresh file when
//! the day changes, and drains whatever is still queued when asked to stop.
//!
//! Files are named `<directory>/<YYYY-MM-DD>_<base name>.log`. The day
//! boundary is evaluated in a configurable [`TimeZone`] and checked on every
//! write, so a file is only ever switched by the first write of a new day.
//!
//! ## Example
//!
//! ```rust
//! use daily_roller::{DailyLoggerBuilder, OverflowPolicy, TimeZone};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//! #   let dir = tempfile::tempdir()?;
//! #   let log_dir = dir.path();
//!     let logger = DailyLoggerBuilder::new(log_dir, "server")
//!         .time_zone(TimeZone::UTC) // Switch files at UTC midnight
//!         .file_mode(0o640)
//!         .max_keep_files(7) // Keep one week of logs
//!         .overflow(OverflowPolicy::Block)
//!         .build()?;
//!
//!     logger.start()?;
//!     logger.write_normal("Server listening on port 8080");
//!     logger.stop_and_wait()?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Lifecycle
//!
//! A logger is created stopped and never touches the disk until
//! [`DailyLogger::start`]. Writes issued before `start` or after
//! [`DailyLogger::stop`] are discarded without error. A stopped logger cannot
//! be started again; create a new one instead.
//!
//! A message with [`Severity::Fatal`] terminates the process with exit status
//! 1 once its line has been written and synced.
mod config;
mod rotation;
mod writer;

pub use {
    config::LoggerConfig,
    rotation::{Clock, RotationPolicy, SystemClock, TimeZone, LOG_EXTENSION},
    writer::{Message, Severity, WriterStats},
};

use {
    chrono::NaiveDate,
    crossbeam_channel::{bounded, Sender},
    std::{
        fmt,
        path::{Path, PathBuf},
        sync::{
            atomic::{AtomicU8, Ordering},
            Arc, Mutex, OnceLock, PoisonError,
        },
        thread::{self, JoinHandle},
    },
    writer::{Counters, Event, FileModes, FileTarget, Writer, LAUNCHED_LINE},
};

/// Inbound channel capacity used unless configured otherwise.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Permission bits of newly created log files unless configured otherwise.
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// Permission bits of newly created log directories unless configured
/// otherwise.
pub const DEFAULT_DIRECTORY_MODE: u32 = 0o755;

const WRITER_THREAD_NAME: &str = "daily-roller";

/// What a write does when the inbound channel is full.
///
/// Day rotations are always enqueued as if under [`OverflowPolicy::Block`],
/// so a rotation is never lost.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Wait for the writer to make room. No message is lost while the logger
    /// is running, at the cost of back-pressure on producers.
    #[default]
    Block,
    /// Discard the message and count it in [`WriterStats::dropped`]. Writes
    /// never wait.
    DropAndCount,
}

/// Where a [`DailyLogger`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RunState {
    /// Created, writer not spawned yet.
    NotStarted = 0,
    /// Writer is live and accepting messages.
    Running = 1,
    /// Stop was requested; the writer drains what was queued and exits.
    Stopped = 2,
}

impl RunState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => RunState::NotStarted,
            1 => RunState::Running,
            _ => RunState::Stopped,
        }
    }
}

/// Errors that can occur when configuring or starting a logger.
#[derive(Debug, thiserror::Error)]
pub enum DailyLoggerError {
    #[error("Failed to read config file '{0}': {1}")]
    ConfigRead(PathBuf, String),
    #[error("Failed to parse config: {0}")]
    ConfigParse(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Failed to create directory '{0}': {1}")]
    CreateDirectoryFailed(PathBuf, String),
    #[error("Failed to create file '{0}': {1}")]
    CreateFileFailed(PathBuf, String),
    #[error("Failed to set file permissions for '{path}': {error}")]
    SetFilePermissionsError { path: PathBuf, error: String },
    #[error("Failed to spawn writer thread: {0}")]
    SpawnFailed(std::io::Error),
    #[error("Logger was stopped and cannot be started again")]
    AlreadyStopped,
    #[error("Writer thread panicked")]
    WriterPanicked,
    #[error("File IO error: {0}")]
    FileIOError(#[from] std::io::Error),
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Settings shared by the builder and the logger.
#[derive(Clone)]
struct DailyLoggerMeta {
    /// Directory and base name of the day files.
    policy: RotationPolicy,
    /// Permissions of created files and directories.
    modes: FileModes,
    /// Source of "now"; its offset defines the calendar day.
    clock: Arc<dyn Clock>,
    /// Capacity of the inbound channel.
    channel_capacity: usize,
    /// Behaviour of writes when the channel is full.
    overflow: OverflowPolicy,
    /// Newest day files to keep; `None` keeps everything.
    max_keep_files: Option<usize>,
}

impl DailyLoggerMeta {
    fn new<P: AsRef<Path>>(directory: P, base_name: &str) -> Self {
        DailyLoggerMeta {
            policy: RotationPolicy::new(directory, base_name),
            modes: FileModes {
                file: DEFAULT_FILE_MODE,
                directory: DEFAULT_DIRECTORY_MODE,
            },
            clock: Arc::new(SystemClock::default()),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            overflow: OverflowPolicy::default(),
            max_keep_files: None,
        }
    }
}

/// Provides a fluent interface for configuring [`DailyLogger`] instances.
///
/// # Default Configuration
///
/// * Local system time zone
/// * Files `0o644`, directories `0o755`
/// * Channel capacity [`DEFAULT_CHANNEL_CAPACITY`], blocking when full
/// * Keep all historical files
///
/// # Examples
///
/// ```rust
/// use daily_roller::{DailyLoggerBuilder, OverflowPolicy, TimeZone};
/// use chrono::FixedOffset;
///
/// let logger = DailyLoggerBuilder::new("./logs", "worker")
///     .time_zone(TimeZone::Fix(FixedOffset::east_opt(9 * 3600).unwrap()))
///     .channel_capacity(64)
///     .overflow(OverflowPolicy::DropAndCount) // Never stall producers
///     .build()
///     .unwrap();
/// ```
pub struct DailyLoggerBuilder {
    meta: DailyLoggerMeta,
}

impl DailyLoggerBuilder {
    /// Create a builder for files named after `base_name` inside `directory`.
    pub fn new<P: AsRef<Path>>(directory: P, base_name: &str) -> Self {
        DailyLoggerBuilder {
            meta: DailyLoggerMeta::new(directory, base_name),
        }
    }

    /// Set the time zone in which calendar days are counted.
    pub fn time_zone(self, time_zone: TimeZone) -> Self {
        self.clock(SystemClock::new(time_zone))
    }

    /// Replace the wall clock, e.g. to drive day boundaries in tests.
    pub fn clock<C: Clock>(self, clock: C) -> Self {
        Self {
            meta: DailyLoggerMeta {
                clock: Arc::new(clock),
                ..self.meta
            },
        }
    }

    /// Set the permission bits of created log files (Unix-like systems only).
    pub fn file_mode(self, mode: u32) -> Self {
        Self {
            meta: DailyLoggerMeta {
                modes: FileModes {
                    file: mode,
                    ..self.meta.modes
                },
                ..self.meta
            },
        }
    }

    /// Set the permission bits of created directories (Unix-like systems
    /// only).
    pub fn directory_mode(self, mode: u32) -> Self {
        Self {
            meta: DailyLoggerMeta {
                modes: FileModes {
                    directory: mode,
                    ..self.meta.modes
                },
                ..self.meta
            },
        }
    }

    /// Set the capacity of the inbound channel. Must be at least 1.
    pub fn channel_capacity(self, channel_capacity: usize) -> Self {
        Self {
            meta: DailyLoggerMeta {
                channel_capacity,
                ..self.meta
            },
        }
    }

    /// Set what writes do when the inbound channel is full.
    pub fn overflow(self, overflow: OverflowPolicy) -> Self {
        Self {
            meta: DailyLoggerMeta { overflow, ..self.meta },
        }
    }

    /// Set the maximum number of day files to keep. Older files are removed
    /// when the writer starts and after every rotation.
    pub fn max_keep_files(self, max_keep_files: usize) -> Self {
        Self {
            meta: DailyLoggerMeta {
                max_keep_files: Some(max_keep_files),
                ..self.meta
            },
        }
    }

    /// Build the logger. Nothing is created on disk until
    /// [`DailyLogger::start`].
    pub fn build(self) -> Result<DailyLogger, DailyLoggerError> {
        if self.meta.channel_capacity == 0 {
            return Err(DailyLoggerError::InvalidConfig(
                "channel capacity must be at least 1".to_string(),
            ));
        }
        if self.meta.max_keep_files == Some(0) {
            return Err(DailyLoggerError::InvalidConfig(
                "max_keep_files must be at least 1".to_string(),
            ));
        }
        Ok(DailyLogger::from_meta(self.meta))
    }
}

/// Start and stop transitions, serialized by a mutex.
#[derive(Default)]
struct Lifecycle {
    stop: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

/// A day-rotating file logger backed by one background writer thread.
///
/// All methods take `&self`; share the logger between threads with an
/// [`Arc`]. Writes never report success or failure: they return as soon as
/// the message is handed to the writer. Use [`DailyLogger::stats`] to monitor
/// failures.
pub struct DailyLogger {
    meta: DailyLoggerMeta,
    /// A [`RunState`], read lock-free by every write.
    state: AtomicU8,
    /// Calendar day of the file the writer is expected to be on.
    day_marker: Mutex<NaiveDate>,
    events: OnceLock<Sender<Event>>,
    lifecycle: Mutex<Lifecycle>,
    counters: Arc<Counters>,
}

impl fmt::Debug for DailyLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DailyLogger")
            .field("directory", &self.meta.policy.directory())
            .field("base_name", &self.meta.policy.base_name())
            .field("state", &self.run_state())
            .finish_non_exhaustive()
    }
}

impl DailyLogger {
    /// Create a logger with explicit permissions and defaults for everything
    /// else. See [`DailyLoggerBuilder`] for the other settings.
    pub fn new<P: AsRef<Path>>(base_name: &str, directory: P, file_mode: u32, directory_mode: u32) -> Self {
        let mut meta = DailyLoggerMeta::new(directory, base_name);
        meta.modes = FileModes {
            file: file_mode,
            directory: directory_mode,
        };
        Self::from_meta(meta)
    }

    /// Create a logger from a TOML configuration file.
    ///
    /// Fails if the file is missing or malformed; no logger is created then.
    pub fn from_config<P: AsRef<Path>>(path: P) -> Result<Self, DailyLoggerError> {
        LoggerConfig::load(path)?.builder().build()
    }

    fn from_meta(meta: DailyLoggerMeta) -> Self {
        let today = meta.clock.now().date_naive();
        DailyLogger {
            meta,
            state: AtomicU8::new(RunState::NotStarted as u8),
            day_marker: Mutex::new(today),
            events: OnceLock::new(),
            lifecycle: Mutex::new(Lifecycle::default()),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Current lifecycle state.
    pub fn run_state(&self) -> RunState {
        RunState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Open today's file and spawn the writer thread.
    ///
    /// Does nothing if the logger is already running. The directory and file
    /// are created before this returns, so I/O problems are reported here and
    /// leave the logger not running. Once the writer is live, the line
    /// `Logging thread successfully launched` is queued as the first line.
    pub fn start(&self) -> Result<(), DailyLoggerError> {
        let mut lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        match self.run_state() {
            RunState::Running => return Ok(()),
            RunState::Stopped => return Err(DailyLoggerError::AlreadyStopped),
            RunState::NotStarted => {}
        }

        let today = self.meta.clock.now().date_naive();
        *self.day_marker.lock().unwrap_or_else(PoisonError::into_inner) = today;

        let target = FileTarget::open_for_day(&self.meta.policy, today, self.meta.modes)?;
        let path = target.path().to_path_buf();
        let writer = Writer::new(
            self.meta.policy.clone(),
            self.meta.modes,
            self.meta.clock.clone(),
            self.meta.max_keep_files,
            target,
            self.counters.clone(),
        );

        let (events_tx, events_rx) = bounded(self.meta.channel_capacity);
        let (stop_tx, stop_rx) = bounded(1);
        let worker = thread::Builder::new()
            .name(WRITER_THREAD_NAME.to_string())
            .spawn(move || writer.run(events_rx, stop_rx))
            .map_err(DailyLoggerError::SpawnFailed)?;

        let events = self.events.get_or_init(|| events_tx);
        lifecycle.stop = Some(stop_tx);
        lifecycle.worker = Some(worker);
        self.state.store(RunState::Running as u8, Ordering::Release);

        self.enqueue(events, Event::Write(Message::normal(LAUNCHED_LINE)));
        tracing::info!(path = %path.display(), "daily logger started");
        Ok(())
    }

    /// Ask the writer to drain what is queued and exit. Returns immediately.
    ///
    /// Does nothing unless the logger is running. Messages that race with
    /// the stop may be lost; they are counted in [`WriterStats::dropped`].
    pub fn stop(&self) {
        let lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        if self.run_state() != RunState::Running {
            return;
        }
        self.state.store(RunState::Stopped as u8, Ordering::Release);
        if let Some(stop) = &lifecycle.stop {
            // The writer may already be gone after a fatal write.
            let _ = stop.try_send(());
        }
        tracing::debug!("daily logger stop requested");
    }

    /// Stop, then wait until the writer has drained its queue and closed the
    /// file.
    ///
    /// Safe to call on a logger that never started, or more than once.
    pub fn stop_and_wait(&self) -> Result<(), DailyLoggerError> {
        self.stop();
        let worker = self
            .lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .worker
            .take();
        match worker {
            Some(worker) => worker.join().map_err(|_| DailyLoggerError::WriterPanicked),
            None => Ok(()),
        }
    }

    /// Queue a line. Does nothing unless the logger is running.
    pub fn write_normal(&self, text: impl Into<String>) {
        self.write(Message::normal(text));
    }

    /// Queue a line, then terminate the process once it is written.
    ///
    /// Does nothing unless the logger is running.
    pub fn write_fatal(&self, text: impl Into<String>) {
        self.write(Message::fatal(text));
    }

    /// Queue a message. Does nothing unless the logger is running.
    ///
    /// If the calendar day changed since the last write, the writer is told
    /// to switch files first, so this message opens the new file.
    pub fn write(&self, message: Message) {
        if self.run_state() != RunState::Running {
            return;
        }
        let Some(events) = self.events.get() else {
            return;
        };
        self.rotate_if_new_day(events);
        self.enqueue(events, Event::Write(message));
    }

    /// Compare today's date with the day marker and queue a rotation if the
    /// day moved on.
    ///
    /// The marker lock is held across the send, so any producer that sees
    /// the new marker enqueues after the rotation event.
    fn rotate_if_new_day(&self, events: &Sender<Event>) {
        let now = self.meta.clock.now();
        let mut day_marker = self.day_marker.lock().unwrap_or_else(PoisonError::into_inner);
        if RotationPolicy::needs_rotation(*day_marker, &now) {
            tracing::debug!(from = %*day_marker, to = %now.date_naive(), "calendar day changed");
            *day_marker = now.date_naive();
            if events.send(Event::Rotate(now)).is_err() {
                tracing::debug!("writer gone, rotation not delivered");
            }
        }
    }

    fn enqueue(&self, events: &Sender<Event>, event: Event) {
        let delivered = match self.meta.overflow {
            OverflowPolicy::Block => events.send(event).is_ok(),
            OverflowPolicy::DropAndCount => events.try_send(event).is_ok(),
        };
        if !delivered {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Snapshot of the writer's counters.
    pub fn stats(&self) -> WriterStats {
        self.counters.snapshot()
    }

    /// Path of the file for the current day marker.
    pub fn current_log_path(&self) -> PathBuf {
        let day_marker = *self.day_marker.lock().unwrap_or_else(PoisonError::into_inner);
        self.meta.policy.file_name(day_marker)
    }

    /// Existing day files for this logger's base name, oldest first.
    pub fn log_files(&self) -> Result<Vec<PathBuf>, DailyLoggerError> {
        self.meta.policy.list_files()
    }
}

impl Drop for DailyLogger {
    fn drop(&mut self) {
        if let Err(err) = self.stop_and_wait() {
            tracing::warn!(%err, "daily logger writer did not shut down cleanly");
        }
    }
}
