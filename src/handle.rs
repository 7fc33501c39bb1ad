use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use time::{OffsetDateTime, UtcOffset};
use time::macros::format_description;
use tracing::{debug, error, info, warn};
use tracing_subscriber::fmt::MakeWriter;

use crate::policy::describe;
use crate::{
    Clock, Error, FileLogConfig, HandleBuilder, Reporter, Result, RetentionScanner, RotationGuard,
    RotationPolicy, ScanReport, naming,
};

/// Severity of a line written through a [`Handle`].
///
/// A handle writes every line at or below its own level; `None` silences all
/// leveled output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Level {
    None,
    #[default]
    Error,
    Info,
    Debug,
}

impl Level {
    fn tag(self) -> &'static str {
        match self {
            Level::None => "",
            Level::Error => "ERROR ",
            Level::Info => "INFO ",
            Level::Debug => "DEBUG ",
        }
    }
}

impl From<&str> for Level {
    /// Unknown names fall back to `Error`.
    fn from(name: &str) -> Self {
        match name.trim().to_ascii_uppercase().as_str() {
            "NONE" => Level::None,
            "INFO" => Level::Info,
            "DEBUG" => Level::Debug,
            _ => Level::Error,
        }
    }
}

/// Whether the handle writes into the file itself or only manages a file
/// written by another process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    Attached,
    Detached,
}

/// Which parts of the timestamp start each line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineFlags {
    pub date: bool,
    pub time: bool,
}

impl Default for LineFlags {
    fn default() -> Self {
        Self {
            date: true,
            time: true,
        }
    }
}

/// State of the live file, protected by the handle's mutex.
#[derive(Debug)]
struct State {
    /// Always refers to the file currently named `path`.
    file: Option<File>,
    prefix: String,
    flags: LineFlags,
}

pub(crate) type Opener = fn(&Path) -> io::Result<File>;

/// One logical log file: its live descriptor, the line writer on top of it,
/// and the rotation of both.
#[derive(Debug)]
pub struct Handle {
    path: PathBuf,
    name: String,
    level: Level,
    verbose: bool,
    mode: Mode,
    clock: Clock,
    reporter: Reporter,
    opener: Opener,
    state: Mutex<State>,
}

/// An open handle together with the workers rotating it.
#[derive(Debug)]
pub struct ManagedLog {
    pub handle: Arc<Handle>,
    pub rotation: Option<RotationGuard>,
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

fn default_prefix(name: &str) -> String {
    if name.is_empty() {
        String::new()
    } else {
        format!("{}: ", name)
    }
}

impl Handle {
    pub fn builder(path: impl Into<PathBuf>) -> HandleBuilder {
        HandleBuilder::new(path)
    }

    /// Open the file described by `config`, write a start line, and start
    /// rotating it if `config.rotate` is set.
    pub fn open(config: &FileLogConfig) -> Result<ManagedLog> {
        let handle = Arc::new(HandleBuilder::from_config(config).open()?);

        let rotation = if config.rotate {
            let guard = handle.setup_rotation(config.rotation.clone())?;
            handle.println("Started");
            Some(guard)
        } else {
            handle.println("Started, no log rotation selected");
            None
        };

        Ok(ManagedLog { handle, rotation })
    }

    pub(crate) fn attached(
        path: PathBuf,
        name: String,
        level: Level,
        verbose: bool,
        clock: Clock,
        reporter: Reporter,
    ) -> Result<Self> {
        let open_error = |source| Error::Open {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(open_error)?;
        }
        let file = open_append(&path).map_err(open_error)?;

        Ok(Self {
            state: Mutex::new(State {
                file: Some(file),
                prefix: default_prefix(&name),
                flags: LineFlags::default(),
            }),
            path,
            name,
            level,
            verbose,
            mode: Mode::Attached,
            clock,
            reporter,
            opener: open_append,
        })
    }

    pub(crate) fn detached(path: PathBuf, clock: Clock, reporter: Reporter) -> Self {
        Self {
            state: Mutex::new(State {
                file: None,
                prefix: String::new(),
                flags: LineFlags::default(),
            }),
            path,
            name: String::new(),
            level: Level::None,
            verbose: false,
            mode: Mode::Detached,
            clock,
            reporter,
            opener: open_append,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_opener(mut self, opener: Opener) -> Self {
        self.opener = opener;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    /// Whether a live file is currently attached. `false` for detached
    /// handles and after a failed rotation.
    pub fn is_attached(&self) -> bool {
        self.lock().file.is_some()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Override the prefix written before every line. Kept across rotations.
    pub fn set_prefix(&self, prefix: impl Into<String>) {
        self.lock().prefix = prefix.into();
    }

    /// Choose which timestamp parts start each line. Kept across rotations.
    pub fn set_flags(&self, flags: LineFlags) {
        self.lock().flags = flags;
    }

    /// Write `message` at `level`. Error lines carry the caller's location.
    #[track_caller]
    pub fn log(&self, level: Level, message: fmt::Arguments<'_>) {
        if level == Level::None || level > self.level {
            return;
        }
        let line = if level == Level::Error {
            let caller = Location::caller();
            let file = Path::new(caller.file())
                .file_name()
                .map(|name| name.to_string_lossy())
                .unwrap_or_default();
            format!("{}:{} {}{}", file, caller.line(), level.tag(), message)
        } else {
            format!("{}{}", level.tag(), message)
        };
        self.write_line(&line);
    }

    #[track_caller]
    pub fn error(&self, message: impl fmt::Display) {
        self.log(Level::Error, format_args!("{}", message));
    }

    pub fn info(&self, message: impl fmt::Display) {
        self.log(Level::Info, format_args!("{}", message));
    }

    pub fn debug(&self, message: impl fmt::Display) {
        self.log(Level::Debug, format_args!("{}", message));
    }

    /// Write `message` regardless of level.
    pub fn println(&self, message: impl fmt::Display) {
        self.write_line(&message.to_string());
    }

    /// Write an audit line `<remote>: <action> - <result>` regardless of level.
    pub fn print_call(
        &self,
        remote: impl fmt::Display,
        action: impl fmt::Display,
        result: impl fmt::Display,
    ) {
        self.write_line(&format!("{}: {} - {}", remote, action, result));
    }

    /// Write one `<prefix>YYYY/MM/DD HH:MM:SS <message>` line. A no-op while no
    /// live file is attached.
    fn write_line(&self, message: &str) {
        let now = self.clock.now();
        let result = {
            let mut state = self.lock();
            let State {
                file,
                prefix,
                flags,
            } = &mut *state;
            let Some(file) = file.as_mut() else {
                return;
            };
            file.write_all(format_line(prefix, *flags, now, message).as_bytes())
        };

        if let Err(err) = result {
            self.reporter
                .in_scope(|| warn!(path = %self.path.display(), error = %err, "failed to write log line"));
        }
        if self.verbose {
            self.reporter
                .in_scope(|| info!(target: "rotatelog::echo", "{}", message.trim_end()));
        }
    }

    /// Write raw bytes to the live file, dropping them while detached.
    fn write_raw(&self, buf: &[u8]) -> io::Result<usize> {
        if let Some(file) = self.lock().file.as_mut() {
            file.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush_raw(&self) -> io::Result<()> {
        match self.lock().file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }

    /// A [`Write`] implementation that appends to this handle's live file.
    pub fn writer(self: &Arc<Self>) -> HandleWriter {
        HandleWriter {
            handle: Arc::clone(self),
        }
    }

    /// Move the live file aside under a timestamped name and start a fresh one.
    ///
    /// Returns the rotated name, or `None` if there was nothing to rotate.
    /// Rotated names always carry a UTC timestamp.
    pub fn rotate(&self) -> Result<Option<PathBuf>> {
        let now = self.clock.now().to_offset(UtcOffset::UTC);
        let rotated = naming::encode(&self.path, now)?;
        let outcome = self.rotate_locked(&rotated);

        // Reported only after the lock is released: the reporter may itself
        // write into this handle.
        match &outcome {
            Ok(Some(rotated)) => self.reporter.in_scope(|| {
                info!(path = %self.path.display(), rotated = %rotated.display(), "rotated log file")
            }),
            Ok(None) => self
                .reporter
                .in_scope(|| debug!(path = %self.path.display(), "nothing to rotate")),
            Err(_) => {}
        }
        outcome
    }

    fn rotate_locked(&self, rotated: &Path) -> Result<Option<PathBuf>> {
        let mut state = self.lock();

        if let Some(mut file) = state.file.take() {
            file.flush()
                .and_then(|()| file.sync_all())
                .map_err(|source| Error::Close {
                    path: self.path.clone(),
                    source,
                })?;
        }

        let moved = if rotated.exists() || naming::encode_compressed(rotated).exists() {
            // Second rotation within the same second; keep the earlier copy.
            false
        } else {
            match fs::rename(&self.path, rotated) {
                Ok(()) => true,
                Err(err) if err.kind() == io::ErrorKind::NotFound => false,
                Err(source) => {
                    return Err(Error::Rename {
                        from: self.path.clone(),
                        to: rotated.to_path_buf(),
                        source,
                    });
                }
            }
        };

        let reopen_error = |source| {
            if moved {
                Error::ReopenAfterRotate {
                    path: self.path.clone(),
                    rotated: rotated.to_path_buf(),
                    source,
                }
            } else {
                Error::Open {
                    path: self.path.clone(),
                    source,
                }
            }
        };

        let file = (self.opener)(&self.path).map_err(reopen_error)?;
        if self.mode == Mode::Attached {
            state.file = Some(file);
        }

        Ok(moved.then(|| rotated.to_path_buf()))
    }

    /// Apply `policy`'s retention rules to this file's rotated copies.
    pub fn scan(&self, policy: &RotationPolicy) -> ScanReport {
        RetentionScanner::new(policy, &self.reporter).scan(&self.path, self.clock.now())
    }

    /// What a firing trigger does: rotate, report the outcome, then scan.
    pub fn rotate_and_scan(&self, policy: &RotationPolicy) -> ScanReport {
        if let Err(err) = self.rotate() {
            if err.is_severe() {
                self.reporter.in_scope(|| error!(error = %err, "log rotation left the file without a sink"));
            } else {
                self.reporter.in_scope(|| warn!(error = %err, "log rotation failed, retrying on next trigger"));
            }
        }
        self.scan(policy)
    }

    /// Start rotating this file according to `policy`.
    ///
    /// Announces the policy, warns when rotated copies would be kept forever,
    /// runs one retention scan, then spawns the size, age and retention
    /// workers the policy asks for. Rotation stops when the returned guard is
    /// stopped or dropped.
    pub fn setup_rotation(self: &Arc<Self>, policy: RotationPolicy) -> Result<RotationGuard> {
        let path = self.path.display().to_string();

        if let Some(bytes) = policy.size_threshold {
            self.reporter
                .in_scope(|| info!(path = %path, bytes, "starting size-based rotation"));
            self.info(format_args!("Log will rotate after about {} bytes", bytes));
        }
        if let Some(every) = policy.age_threshold {
            let every = describe(every);
            self.reporter
                .in_scope(|| info!(path = %path, every = %every, "starting age-based rotation"));
            self.info(format_args!("Log will rotate after {}", every));
        }

        self.reporter.in_scope(|| {
            if let Some(keep) = policy.retention {
                info!(path = %path, "rotated files will be removed after {}", describe(keep));
            }
            if let Some(max_files) = policy.max_files {
                info!(path = %path, "max {} rotated files will be kept", max_files);
            }
            if let Some(uncompressed) = policy.compress_after {
                info!(path = %path, "will start to compress after {} rotations", uncompressed);
            }
            if policy.keeps_forever() {
                warn!(
                    path = %path,
                    "rotated logs will be kept forever; set keep and/or max_files_keep for this file"
                );
            }
        });

        self.scan(&policy);
        RotationGuard::start(Arc::clone(self), policy)
    }
}

fn format_line(prefix: &str, flags: LineFlags, now: OffsetDateTime, message: &str) -> String {
    let mut line = String::from(prefix);
    if flags.date {
        let date = now.format(format_description!("[year]/[month]/[day] "));
        line.push_str(&date.unwrap_or_default());
    }
    if flags.time {
        let time = now.format(format_description!("[hour]:[minute]:[second] "));
        line.push_str(&time.unwrap_or_default());
    }
    line.push_str(message);
    if !line.ends_with('\n') {
        line.push('\n');
    }
    line
}

/// Owned writer over a shared [`Handle`], usable as a `tracing` writer.
#[derive(Debug, Clone)]
pub struct HandleWriter {
    handle: Arc<Handle>,
}

impl Write for HandleWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.handle.write_raw(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.handle.flush_raw()
    }
}

impl<'a> MakeWriter<'a> for HandleWriter {
    type Writer = HandleWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
