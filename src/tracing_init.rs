use std::sync::{Mutex, PoisonError};

use once_cell::sync::Lazy;
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{Error, FileLogConfig, Handle, LogConfig, ManagedLog, Result};

/// Keeps the non-blocking worker and the rotated diagnostics file alive.
static LOG_GUARD: Lazy<Mutex<Option<(WorkerGuard, ManagedLog)>>> = Lazy::new(|| Mutex::new(None));

/// Initialize logging with the given configuration and optional CLI verbosity override.
///
/// When `config.file` is set, diagnostics are also written through a [`Handle`],
/// so the process's own log rotates like any other managed file.
pub fn init_logging(config: &LogConfig, cli_verbose: Option<u8>) -> Result<()> {
    let log_spec = effective_log_spec(config, cli_verbose);
    let env_filter = EnvFilter::try_new(&log_spec).map_err(|e| Error::Init(e.to_string()))?;
    let json = config.format == "json";

    let console_layer = config
        .console
        .then(|| fmt_layer(json, std::io::stderr, cfg!(feature = "ansi")));

    let (file_layer, file_guard) = match &config.file {
        Some(file_config) => {
            let (writer, guard) = file_writer(file_config)?;
            (Some(fmt_layer(json, writer, false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::Init(e.to_string()))?;

    if let Some(guard) = file_guard {
        *LOG_GUARD.lock().unwrap_or_else(PoisonError::into_inner) = Some(guard);
    }
    Ok(())
}

/// Flush pending file output and stop rotating the diagnostics file.
pub fn shutdown_logging() {
    let taken = LOG_GUARD
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
    drop(taken);
}

fn file_writer(
    file_config: &FileLogConfig,
) -> Result<(
    tracing_appender::non_blocking::NonBlocking,
    (WorkerGuard, ManagedLog),
)> {
    let log = Handle::open(file_config)?;
    let (non_blocking, guard) = tracing_appender::non_blocking(log.handle.writer());
    Ok((non_blocking, (guard, log)))
}

fn fmt_layer<S, W>(json: bool, writer: W, ansi: bool) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false);

    if json {
        layer.json().boxed()
    } else {
        layer.boxed()
    }
}

/// Determine the effective log specification, considering config and CLI overrides.
fn effective_log_spec(config: &LogConfig, cli_verbose: Option<u8>) -> String {
    // RUST_LOG takes precedence over everything
    if let Ok(rust_log) = std::env::var("RUST_LOG")
        && !rust_log.is_empty()
    {
        return rust_log;
    }

    if let Some(verbose) = cli_verbose {
        return match verbose {
            0 => config.level.clone(),
            1 => format!("{},rotatelog=info", config.level),
            2 => format!("{},rotatelog=debug", config.level),
            _ => "trace".to_string(),
        };
    }

    if config.level.is_empty() {
        "warn,rotatelog=warn".to_string()
    } else {
        format!("{},rotatelog={}", config.level, config.level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Serializes tests that touch RUST_LOG.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn with_rust_log<T>(value: &str, f: impl FnOnce() -> T) -> T {
        let _lock = ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        let prev = std::env::var_os("RUST_LOG");
        unsafe {
            std::env::set_var("RUST_LOG", value);
        }
        let result = f();
        unsafe {
            match prev {
                Some(v) => std::env::set_var("RUST_LOG", v),
                None => std::env::remove_var("RUST_LOG"),
            }
        }
        result
    }

    #[test]
    fn rust_log_overrides_config_level() {
        let cfg = LogConfig::new().with_level("info");
        assert_eq!(with_rust_log("trace", || effective_log_spec(&cfg, None)), "trace");
        assert_eq!(
            with_rust_log("debug", || effective_log_spec(&cfg, Some(2))),
            "debug"
        );
    }

    #[test]
    fn cfg_level_used_when_rust_log_empty() {
        let cfg = LogConfig::new().with_level("error");
        with_rust_log("", || {
            assert_eq!(effective_log_spec(&cfg, None), "error,rotatelog=error");
            assert_eq!(effective_log_spec(&cfg, Some(0)), "error");
            assert_eq!(effective_log_spec(&cfg, Some(1)), "error,rotatelog=info");
            assert_eq!(effective_log_spec(&cfg, Some(2)), "error,rotatelog=debug");
            assert_eq!(effective_log_spec(&cfg, Some(3)), "trace");
            assert_eq!(effective_log_spec(&cfg, Some(7)), "trace");
        });
    }

    #[test]
    fn test_effective_log_spec_with_empty_config_level() {
        let cfg = LogConfig::new().with_level("");
        assert_eq!(
            with_rust_log("", || effective_log_spec(&cfg, None)),
            "warn,rotatelog=warn"
        );
    }

    #[test]
    fn test_invalid_filter_is_init_error() {
        let cfg = LogConfig::new().with_level("rotatelog=loud");
        let result = with_rust_log("", || init_logging(&cfg, None));
        assert!(matches!(result, Err(Error::Init(_))));
    }

    #[test]
    fn test_init_logging_console_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rotatelog.log");
        let cfg = LogConfig::new()
            .with_console(true)
            .with_file(FileLogConfig::new(&path).with_name("rotatelog"));

        // The global subscriber may already be installed by another test.
        let result = init_logging(&cfg, None);
        assert!(result.is_ok() || matches!(result, Err(Error::Init(_))));
        shutdown_logging();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("rotatelog: "));
        assert!(content.contains("Started, no log rotation selected"));
    }
}
