use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use crate::{Error, Handle, Reporter, Result, RotationGuard, RotationPolicy};

/// Configuration for the process's own diagnostics
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Enable console logging
    #[serde(default)]
    pub console: bool,
    /// Console log level (e.g., "warn", "debug")
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format ("text" or "json")
    #[serde(default = "default_format")]
    pub format: String,
    /// Write diagnostics into a rotated file as well
    pub file: Option<FileLogConfig>,
}

impl LogConfig {
    /// Create a new LogConfig with defaults
    pub fn new() -> Self {
        Self {
            console: false,
            level: default_log_level(),
            format: default_format(),
            file: None,
        }
    }

    /// Enable console logging
    pub fn with_console(mut self, console: bool) -> Self {
        self.console = console;
        self
    }

    /// Set log level
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Set log format
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    /// Set file logging configuration
    pub fn with_file(mut self, file: FileLogConfig) -> Self {
        self.file = Some(file);
        self
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_format() -> String {
    "text".to_string()
}

fn default_file_level() -> String {
    "ERROR".to_string()
}

/// Configuration for a log file written through a [`Handle`]
#[derive(Debug, Clone, Deserialize)]
pub struct FileLogConfig {
    /// Path to the live log file
    pub path: PathBuf,
    /// Written as `<name>: ` before every line
    #[serde(default)]
    pub name: String,
    /// "ERROR", "INFO", "DEBUG" or "NONE"
    #[serde(default = "default_file_level")]
    pub level: String,
    /// Echo every line to the diagnostics sink
    #[serde(default)]
    pub verbose: bool,
    /// Start rotation workers when the file is opened
    #[serde(default)]
    pub rotate: bool,
    #[serde(default)]
    pub rotation: RotationPolicy,
}

impl FileLogConfig {
    /// Create a new FileLogConfig without rotation
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            name: String::new(),
            level: default_file_level(),
            verbose: false,
            rotate: false,
            rotation: RotationPolicy::default(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Rotate the file under `rotation`
    pub fn with_rotation(mut self, rotation: RotationPolicy) -> Self {
        self.rotate = true;
        self.rotation = rotation;
        self
    }
}

/// Files managed by the daemon, keyed by the path of each live file.
///
/// ```json
/// {
///   "/var/log/app.log": { "size": "10M", "max_files_keep": 5, "compress": 1 },
///   "/var/log/audit.log": { "days": 1, "keep": 30 }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct DaemonConfig {
    pub files: BTreeMap<PathBuf, RotationPolicy>,
}

impl DaemonConfig {
    /// Load a config file. Files ending in `.toml` are read as TOML, anything
    /// else as JSON.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        let parsed = if path.extension().is_some_and(|ext| ext == "toml") {
            Self::from_toml_str(&content)
        } else {
            Self::from_json_str(&content)
        };
        parsed.map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// A config managing the single file at `path`.
    pub fn single(path: impl Into<PathBuf>, policy: RotationPolicy) -> Self {
        Self {
            files: BTreeMap::from([(path.into(), policy)]),
        }
    }

    /// Start rotating every configured file with a detached handle.
    ///
    /// A policy without a size or age trigger still gets its startup
    /// retention scan; its guard simply holds no workers.
    pub fn start(&self, reporter: &Reporter) -> Result<Vec<RotationGuard>> {
        let mut guards = Vec::with_capacity(self.files.len());
        for (path, policy) in &self.files {
            if !policy.rotates() {
                reporter.in_scope(|| {
                    tracing::info!(path = %path.display(), "no size or days given, only applying retention")
                });
            }
            let handle = Arc::new(
                Handle::builder(path)
                    .with_reporter(reporter.clone())
                    .detached(),
            );
            guards.push(handle.setup_rotation(policy.clone())?);
        }
        Ok(guards)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_log_config_new() {
        let config = LogConfig::new();
        assert!(!config.console);
        assert_eq!(config.level, "warn");
        assert_eq!(config.format, "text");
        assert!(config.file.is_none());
    }

    #[test]
    fn test_log_config_builders() {
        let config = LogConfig::new()
            .with_console(true)
            .with_level("debug")
            .with_format("json")
            .with_file(FileLogConfig::new("rotatelog.log"));
        assert!(config.console);
        assert_eq!(config.level, "debug");
        assert_eq!(config.format, "json");
        assert_eq!(
            config.file.as_ref().unwrap().path,
            PathBuf::from("rotatelog.log")
        );
    }

    #[test]
    fn test_file_log_config_new() {
        let config = FileLogConfig::new("test.log");
        assert_eq!(config.path, PathBuf::from("test.log"));
        assert_eq!(config.level, "ERROR");
        assert!(!config.rotate);
        assert_eq!(config.rotation, RotationPolicy::default());
    }

    #[test]
    fn test_file_log_config_with_rotation_enables_rotate() {
        let config = FileLogConfig::new("test.log").with_rotation(RotationPolicy::size(1024, 5));
        assert!(config.rotate);
        assert_eq!(config.rotation, RotationPolicy::size(1024, 5));
    }

    #[test]
    fn test_log_config_from_yaml() {
        let yaml = r#"
console: true
file:
  path: /var/log/rotatelog.log
  name: rotatelog
  level: INFO
  rotate: true
  rotation:
    size: 1M
    max_files_keep: 3
"#;
        let config: LogConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.console);
        assert_eq!(config.level, "warn");
        let file = config.file.unwrap();
        assert_eq!(file.name, "rotatelog");
        assert!(file.rotate);
        assert_eq!(file.rotation.size_threshold, Some(1024 * 1024));
        assert_eq!(file.rotation.max_files, Some(3));
    }

    #[test]
    fn test_daemon_config_from_json() {
        let config = DaemonConfig::from_json_str(
            r#"{
                "/var/log/app.log": { "size": "10M", "max_files_keep": 5, "compress": 1 },
                "/var/log/audit.log": { "days": 1, "keep": 30, "compress": -1 }
            }"#,
        )
        .unwrap();
        assert_eq!(config.files.len(), 2);

        let app = &config.files[Path::new("/var/log/app.log")];
        assert_eq!(app.size_threshold, Some(10 * 1024 * 1024));
        assert_eq!(app.max_files, Some(5));
        assert_eq!(app.compress_after, Some(1));

        let audit = &config.files[Path::new("/var/log/audit.log")];
        assert_eq!(audit.age_threshold, Some(Duration::from_secs(86_400)));
        assert_eq!(audit.retention, Some(Duration::from_secs(30 * 86_400)));
        assert_eq!(audit.compress_after, None);
    }

    #[test]
    fn test_daemon_config_from_toml() {
        let config = DaemonConfig::from_toml_str(
            r#"
["/var/log/app.log"]
size = 2048
max_files_keep = 2
"#,
        )
        .unwrap();
        assert_eq!(
            config,
            DaemonConfig::single("/var/log/app.log", RotationPolicy::size(2048, 2))
        );
    }

    #[test]
    fn test_daemon_config_from_path_picks_format_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("rotatelog.json");
        fs::write(&json, r#"{"app.log": {"size": 100}}"#).unwrap();
        let toml = dir.path().join("rotatelog.toml");
        fs::write(&toml, "[\"app.log\"]\nsize = 100\n").unwrap();

        assert_eq!(
            DaemonConfig::from_path(&json).unwrap(),
            DaemonConfig::from_path(&toml).unwrap()
        );
    }

    #[test]
    fn test_daemon_config_errors() {
        assert!(matches!(
            DaemonConfig::from_json_str(r#"{"app.log": {"size": "ten"}}"#),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            DaemonConfig::from_path("/nonexistent/rotatelog.json"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_daemon_start_manages_files_without_trigger() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = DaemonConfig::single(
            dir.path().join("app.log"),
            RotationPolicy::size(1024, 2).with_poll_interval(Duration::from_secs(3600)),
        );
        config
            .files
            .insert(dir.path().join("idle.log"), RotationPolicy::default());

        let guards = config.start(&Reporter::default()).unwrap();
        assert_eq!(guards.len(), 2);
        assert_eq!(guards.iter().map(RotationGuard::workers).sum::<usize>(), 1);
    }

    #[test]
    fn test_daemon_start_applies_retention_without_trigger() {
        let dir = tempfile::tempdir().unwrap();
        let expired = dir.path().join("app.log.2020-01-01T00:00:00Z");
        fs::write(&expired, b"old").unwrap();

        let config = DaemonConfig::from_json_str(&format!(
            r#"{{ {:?}: {{ "keep": 1, "compress": -1 }} }}"#,
            dir.path().join("app.log").to_str().unwrap()
        ))
        .unwrap();
        let guards = config.start(&Reporter::default()).unwrap();

        assert_eq!(guards.len(), 1);
        assert!(!expired.exists());
    }

    #[test]
    fn test_daemon_start_warns_when_kept_forever() {
        let dir = tempfile::tempdir().unwrap();
        let (reporter, captured) = crate::report::capture::reporter();
        let config = DaemonConfig::from_json_str(&format!(
            r#"{{ {:?}: {{ "keep": 0, "max_files_keep": 0 }} }}"#,
            dir.path().join("app.log").to_str().unwrap()
        ))
        .unwrap();

        let guards = config.start(&reporter).unwrap();
        assert_eq!(guards.len(), 1);
        let output = captured.contents();
        assert!(output.contains("WARN"), "{output}");
        assert!(output.contains("kept forever"), "{output}");
    }
}
