//! The background writer thread and the file it owns.
//!
//! A single [`Writer`] runs on a dedicated thread. It is the only code that
//! ever opens, writes or closes a log file, so the file needs no locking and a
//! rotation can never split a line across two files.

use {
    crate::{
        rotation::{Clock, RotationPolicy},
        DailyLoggerError,
    },
    chrono::{DateTime, FixedOffset, NaiveDate},
    crossbeam_channel::{select, Receiver},
    std::{
        fs::{self, Permissions},
        io::{self, Write as _},
        path::{Path, PathBuf},
        sync::{
            atomic::{AtomicU64, Ordering},
            Arc,
        },
    },
};

#[cfg(unix)]
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt, PermissionsExt};

/// `chrono` format of the stamp that prefixes every line.
const LINE_STAMP: &str = "%Y/%m/%d %H:%M:%S";

/// First line written after a successful start.
pub(crate) const LAUNCHED_LINE: &str = "Logging thread successfully launched";

/// How the writer reacts once a message is on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Write the line and carry on.
    Normal,
    /// Write the line, sync the file, then terminate the process with exit
    /// status 1.
    Fatal,
}

/// A single log line on its way to the writer thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    severity: Severity,
    payload: String,
}

impl Message {
    /// Create a message with the given severity.
    pub fn new(severity: Severity, payload: impl Into<String>) -> Self {
        Message {
            severity,
            payload: payload.into(),
        }
    }

    /// A message that is written and forgotten.
    pub fn normal(payload: impl Into<String>) -> Self {
        Self::new(Severity::Normal, payload)
    }

    /// A message that terminates the process once written.
    pub fn fatal(payload: impl Into<String>) -> Self {
        Self::new(Severity::Fatal, payload)
    }

    /// The severity tag.
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// The text written after the line stamp.
    pub fn payload(&self) -> &str {
        &self.payload
    }
}

/// What travels over the inbound channel.
///
/// Rotation is an in-band event so it keeps its place relative to the
/// messages sent before and after it.
#[derive(Debug)]
pub(crate) enum Event {
    Write(Message),
    Rotate(DateTime<FixedOffset>),
}

/// Permission bits applied to created files and directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FileModes {
    pub(crate) file: u32,
    pub(crate) directory: u32,
}

/// Snapshot of the writer's counters.
///
/// Write and rotation failures are never reported to producers; these
/// counters are the way to monitor them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    /// Lines appended to a log file, including the writer's own notices.
    pub written: u64,
    /// Messages discarded because the channel was full under
    /// [`crate::OverflowPolicy::DropAndCount`], or because they raced past a
    /// stop and found the writer gone. A message that slips in between the
    /// final drain and the writer letting go of the channel may be lost
    /// without being counted.
    pub dropped: u64,
    /// Lines that could not be appended.
    pub write_failures: u64,
    /// New-day files that could not be opened.
    pub rotation_failures: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) written: AtomicU64,
    pub(crate) dropped: AtomicU64,
    pub(crate) write_failures: AtomicU64,
    pub(crate) rotation_failures: AtomicU64,
}

impl Counters {
    pub(crate) fn snapshot(&self) -> WriterStats {
        WriterStats {
            written: self.written.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            rotation_failures: self.rotation_failures.load(Ordering::Relaxed),
        }
    }
}

/// An open, append-only day file.
#[derive(Debug)]
pub(crate) struct FileTarget {
    path: PathBuf,
    file: fs::File,
}

impl FileTarget {
    /// Open the file for `day`, creating the directory and the file with the
    /// configured permissions when they do not exist yet.
    pub(crate) fn open_for_day(
        policy: &RotationPolicy,
        day: NaiveDate,
        modes: FileModes,
    ) -> Result<Self, DailyLoggerError> {
        create_directory(policy.directory(), modes.directory)?;
        Self::open(&policy.file_name(day), modes.file)
    }

    fn open(path: &Path, file_mode: u32) -> Result<Self, DailyLoggerError> {
        let existed = path.exists();

        let mut open_options = fs::OpenOptions::new();
        open_options.append(true).create(true);
        #[cfg(unix)]
        open_options.mode(file_mode);

        let file = open_options
            .open(path)
            .map_err(|err| DailyLoggerError::CreateFileFailed(path.to_path_buf(), err.to_string()))?;

        // The umask may have narrowed the creation mode.
        if !existed {
            set_permissions(path, file_mode)?;
        }

        Ok(FileTarget {
            path: path.to_path_buf(),
            file,
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Append one stamped line with a single write call.
    fn write_line(&mut self, stamp: &DateTime<FixedOffset>, payload: &str) -> io::Result<()> {
        let payload = payload.strip_suffix('\n').unwrap_or(payload);
        let line = format!("{} {payload}\n", stamp.format(LINE_STAMP));
        self.file.write_all(line.as_bytes())
    }

    fn sync(&mut self) -> io::Result<()> {
        self.file.flush()?;
        self.file.sync_all()
    }

    fn close(mut self) -> io::Result<()> {
        self.sync()
    }
}

fn create_directory(directory: &Path, mode: u32) -> Result<(), DailyLoggerError> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(mode);
    #[cfg(not(unix))]
    let _ = mode;

    builder
        .create(directory)
        .map_err(|err| DailyLoggerError::CreateDirectoryFailed(directory.to_path_buf(), err.to_string()))
}

fn set_permissions(path: &Path, mode: u32) -> Result<(), DailyLoggerError> {
    #[cfg(unix)]
    {
        fs::set_permissions(path, Permissions::from_mode(mode)).map_err(|err| {
            DailyLoggerError::SetFilePermissionsError {
                path: path.to_path_buf(),
                error: err.to_string(),
            }
        })?;
    }
    #[cfg(not(unix))]
    {
        let _ = (path, mode);
        tracing::debug!("file permissions are not applied on non-Unix platforms");
    }
    Ok(())
}

/// State owned by the writer thread.
pub(crate) struct Writer {
    policy: RotationPolicy,
    modes: FileModes,
    clock: Arc<dyn Clock>,
    max_keep_files: Option<usize>,
    target: FileTarget,
    counters: Arc<Counters>,
    /// Set after the first failed write; later failures are only counted.
    write_failed: bool,
}

impl Writer {
    pub(crate) fn new(
        policy: RotationPolicy,
        modes: FileModes,
        clock: Arc<dyn Clock>,
        max_keep_files: Option<usize>,
        target: FileTarget,
        counters: Arc<Counters>,
    ) -> Self {
        Writer {
            policy,
            modes,
            clock,
            max_keep_files,
            target,
            counters,
            write_failed: false,
        }
    }

    /// Serve events until a stop signal arrives, then drain and close.
    ///
    /// A disconnected channel on either side counts as a stop.
    pub(crate) fn run(mut self, events: Receiver<Event>, stop: Receiver<()>) {
        tracing::debug!(path = %self.target.path().display(), "writer thread running");
        self.apply_retention();

        loop {
            select! {
                recv(events) -> event => match event {
                    Ok(event) => self.handle(event),
                    Err(_) => break,
                },
                recv(stop) -> _ => break,
            }
        }

        let drained = self.drain(&events);
        // Later sends fail at the producer and are counted as dropped.
        drop(events);
        let path = self.target.path().to_path_buf();
        if let Err(err) = self.target.close() {
            tracing::warn!(path = %path.display(), %err, "failed to sync log file on close");
        }
        tracing::debug!(drained, path = %path.display(), "writer thread terminated");
    }

    /// Handle whatever is already queued without waiting for new arrivals.
    fn drain(&mut self, events: &Receiver<Event>) -> usize {
        let mut drained = 0;
        while let Ok(event) = events.try_recv() {
            self.handle(event);
            drained += 1;
        }
        drained
    }

    fn handle(&mut self, event: Event) {
        match event {
            Event::Write(message) => self.write(message),
            Event::Rotate(now) => self.rotate(now),
        }
    }

    fn write(&mut self, message: Message) {
        self.append(message.payload());

        if message.severity() == Severity::Fatal {
            if let Err(err) = self.target.sync() {
                tracing::warn!(path = %self.target.path().display(), %err, "failed to sync log file");
            }
            tracing::error!(payload = message.payload(), "fatal message logged, terminating process");
            std::process::exit(1);
        }
    }

    fn append(&mut self, payload: &str) {
        let now = self.clock.now();
        match self.target.write_line(&now, payload) {
            Ok(()) => {
                self.counters.written.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                self.counters.write_failures.fetch_add(1, Ordering::Relaxed);
                if !self.write_failed {
                    self.write_failed = true;
                    tracing::error!(
                        path = %self.target.path().display(),
                        %err,
                        "failed to append log line; further failures are only counted"
                    );
                }
            }
        }
    }

    /// Switch to the file for the day of `now`.
    ///
    /// The new file is opened before the old one is closed, so a failure
    /// leaves the current file in service.
    fn rotate(&mut self, now: DateTime<FixedOffset>) {
        let new_path = self.policy.file_name(now.date_naive());
        if new_path == self.target.path() {
            return;
        }

        let new_target = match FileTarget::open_for_day(&self.policy, now.date_naive(), self.modes) {
            Ok(target) => target,
            Err(err) => {
                self.counters.rotation_failures.fetch_add(1, Ordering::Relaxed);
                tracing::error!(path = %new_path.display(), %err, "failed to open new day's log file");
                self.append(&format!(
                    "Logging thread failed to switch to {}, staying on this file: {err}",
                    new_path.display()
                ));
                return;
            }
        };

        self.append(&format!("Logging thread switching to new file {}", new_path.display()));
        let old_target = std::mem::replace(&mut self.target, new_target);
        let old_path = old_target.path().to_path_buf();
        if let Err(err) = old_target.close() {
            tracing::warn!(path = %old_path.display(), %err, "failed to sync log file on rotation");
        }
        self.write_failed = false;
        tracing::info!(from = %old_path.display(), to = %new_path.display(), "rotated log file");

        self.apply_retention();
    }

    fn apply_retention(&self) {
        let Some(max_keep_files) = self.max_keep_files else {
            return;
        };
        match self.policy.apply_retention(max_keep_files, self.target.path()) {
            Ok(0) => {}
            Ok(removed) => tracing::debug!(removed, "applied log file retention"),
            Err(err) => tracing::warn!(%err, "failed to apply log file retention"),
        }
    }
}
