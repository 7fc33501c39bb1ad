//! Builder pattern for opening log handles.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rotatelog::{Handle, Level, RotationPolicy};
//!
//! let handle = Arc::new(
//!     Handle::builder("/var/log/app.log")
//!         .with_name("app")
//!         .with_level(Level::Info)
//!         .open()?,
//! );
//! let _rotation = handle.setup_rotation(RotationPolicy::size(10 * 1024 * 1024, 5))?;
//!
//! handle.info("service started");
//! # Ok::<(), rotatelog::Error>(())
//! ```

use std::path::PathBuf;

use crate::{Clock, FileLogConfig, Handle, Level, Reporter, Result};

/// A builder for configuring and opening a [`Handle`].
#[derive(Debug, Clone)]
pub struct HandleBuilder {
    path: PathBuf,
    name: String,
    level: Level,
    verbose: bool,
    clock: Clock,
    reporter: Reporter,
}

impl HandleBuilder {
    /// Create a builder for the live file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            name: String::new(),
            level: Level::default(),
            verbose: false,
            clock: Clock::default(),
            reporter: Reporter::default(),
        }
    }

    /// Create a builder from an existing file configuration.
    pub fn from_config(config: &FileLogConfig) -> Self {
        Self::new(config.path.clone())
            .with_name(config.name.clone())
            .with_level(Level::from(config.level.as_str()))
            .with_verbose(config.verbose)
    }

    /// Set the name written as `<name>: ` before every line.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the most verbose level that is written.
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Echo every written line to the reporter.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Use `clock` for rotation names, line timestamps and retention.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Send the handle's diagnostics to `reporter`.
    pub fn with_reporter(mut self, reporter: Reporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// Open (or create) the live file for append.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Open`](crate::Error::Open) if the file or its parent
    /// directories cannot be created.
    pub fn open(self) -> Result<Handle> {
        Handle::attached(
            self.path,
            self.name,
            self.level,
            self.verbose,
            self.clock,
            self.reporter,
        )
    }

    /// Build a handle that manages a file written by another process.
    ///
    /// The handle never holds the file open; after a rotation it only
    /// re-creates an empty file at the original path.
    pub fn detached(self) -> Handle {
        let Self {
            path,
            clock,
            reporter,
            ..
        } = self;
        Handle::detached(path, clock, reporter)
    }
}
