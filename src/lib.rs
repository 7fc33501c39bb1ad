//! # Rotatelog
//!
//! Log file rotation with retention, compression and an optional daemon.
//!
//! ## Features
//!
//! - Rotation by size or by age, renaming the live file to
//!   `<name>.<RFC3339 timestamp>` and reopening it in place
//! - Retention by age and count, gzip compression of older copies
//! - A leveled line writer that stays consistent across rotations
//! - Detached handles for files written by other processes
//! - Integration with the `tracing` ecosystem
//!
//! ## Example
//!
//! ```rust,no_run
//! use rotatelog::{FileLogConfig, Handle, RotationPolicy};
//!
//! let config = FileLogConfig::new("/var/log/app.log")
//!     .with_name("app")
//!     .with_level("INFO")
//!     .with_rotation(RotationPolicy::size(10 * 1024 * 1024, 5));
//! let log = Handle::open(&config)?;
//!
//! log.handle.info("listening on :8080");
//! # Ok::<(), rotatelog::Error>(())
//! ```

pub mod builder;
pub mod clock;
pub mod config;
pub mod error;
pub mod handle;
pub mod naming;
pub mod policy;
pub mod report;
pub mod scanner;
pub mod tracing_init;
pub mod trigger;

pub use builder::HandleBuilder;
pub use clock::{Clock, ManualClock};
pub use config::{DaemonConfig, FileLogConfig, LogConfig};
pub use error::{Error, Result};
pub use handle::{Handle, HandleWriter, Level, LineFlags, ManagedLog};
pub use policy::RotationPolicy;
pub use report::Reporter;
pub use scanner::{RetentionScanner, RotatedFile, ScanReport};
pub use tracing_init::{init_logging, shutdown_logging};
pub use trigger::RotationGuard;
