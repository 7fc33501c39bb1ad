use std::time::Duration;

use serde::Deserialize;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Default interval between two size checks of the live file.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Parse a size string with an optional unit (B/K/M/G, case-insensitive),
/// defaulting to bytes if no unit is given.
fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let Some(last) = s.chars().last() else {
        return Err("empty size string".to_string());
    };

    let (num_str, unit) = if last.is_alphabetic() {
        (&s[..s.len() - last.len_utf8()], last.to_ascii_uppercase())
    } else {
        (s, 'B')
    };

    let num: u64 = num_str
        .trim()
        .parse()
        .map_err(|_| format!("invalid number: {}", num_str))?;

    let multiplier = match unit {
        'B' => 1,
        'K' => 1024,
        'M' => 1024 * 1024,
        'G' => 1024 * 1024 * 1024,
        _ => return Err(format!("invalid unit: {}, supported: B/K/M/G", unit)),
    };

    num.checked_mul(multiplier)
        .ok_or_else(|| "size too large".to_string())
}

/// Size value that can be a byte count or a string with units.
#[derive(Deserialize)]
#[serde(untagged)]
enum SizeValue {
    Number(i64),
    String(String),
}

impl SizeValue {
    fn to_bytes(&self) -> Result<u64, String> {
        match self {
            SizeValue::Number(n) => Ok(u64::try_from(*n).unwrap_or(0)),
            SizeValue::String(s) => parse_size(s),
        }
    }
}

/// Policy as written in a config file. Non-positive values mean "disabled",
/// and `compress` defaults to `0` (compress every rotated copy).
#[derive(Deserialize)]
struct RawPolicy {
    #[serde(default)]
    size: Option<SizeValue>,
    #[serde(default)]
    days: i64,
    #[serde(default)]
    keep: i64,
    #[serde(default)]
    max_files_keep: i64,
    #[serde(default)]
    compress: i64,
    #[serde(default)]
    poll_interval: Option<u64>,
    #[serde(default)]
    scan_interval: Option<u64>,
}

fn days(n: i64, field: &str) -> Result<Option<Duration>, String> {
    if n <= 0 {
        return Ok(None);
    }
    (n as u64)
        .checked_mul(SECS_PER_DAY)
        .map(|secs| Some(Duration::from_secs(secs)))
        .ok_or_else(|| format!("{} is too large: {}", field, n))
}

fn seconds(n: Option<u64>, field: &str) -> Result<Option<Duration>, String> {
    match n {
        None => Ok(None),
        Some(0) => Err(format!("{} must be at least 1 second", field)),
        Some(secs) => Ok(Some(Duration::from_secs(secs))),
    }
}

impl TryFrom<RawPolicy> for RotationPolicy {
    type Error = String;

    fn try_from(raw: RawPolicy) -> Result<Self, Self::Error> {
        let size_threshold = match raw.size {
            Some(size) => Some(size.to_bytes()?).filter(|bytes| *bytes > 0),
            None => None,
        };

        Ok(Self {
            size_threshold,
            age_threshold: days(raw.days, "days")?,
            retention: days(raw.keep, "keep")?,
            max_files: u64::try_from(raw.max_files_keep).ok().filter(|n| *n > 0),
            compress_after: u64::try_from(raw.compress).ok(),
            poll_interval: seconds(raw.poll_interval, "poll_interval")?
                .unwrap_or(DEFAULT_POLL_INTERVAL),
            scan_interval: seconds(raw.scan_interval, "scan_interval")?,
        })
    }
}

/// Rotation and retention policy for one log file.
///
/// In config files the policy is written as
/// `{size, days, keep, max_files_keep, compress, poll_interval, scan_interval}`:
/// `days` is the age threshold and `keep` the retention age, both in days;
/// `compress` is the number of newest rotated copies left uncompressed, `-1`
/// disables compression; intervals are in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawPolicy")]
pub struct RotationPolicy {
    /// Rotate once the live file grows beyond this many bytes.
    pub size_threshold: Option<u64>,
    /// Rotate unconditionally every time this much time has passed.
    pub age_threshold: Option<Duration>,
    /// Delete rotated copies older than this.
    pub retention: Option<Duration>,
    /// Keep at most this many rotated copies.
    pub max_files: Option<u64>,
    /// Leave the newest `n` rotated copies uncompressed, gzip the rest.
    /// `None` never compresses.
    pub compress_after: Option<u64>,
    /// How often the size trigger stats the live file.
    pub poll_interval: Duration,
    /// Run retention on its own timer, independently of rotations.
    pub scan_interval: Option<Duration>,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            size_threshold: None,
            age_threshold: None,
            retention: None,
            max_files: None,
            compress_after: Some(0),
            poll_interval: DEFAULT_POLL_INTERVAL,
            scan_interval: None,
        }
    }
}

impl RotationPolicy {
    /// Create a size-based policy keeping at most `max_files` rotated copies.
    pub fn size(max_size: u64, max_files: u64) -> Self {
        Self::default()
            .with_size_threshold(max_size)
            .with_max_files(max_files)
    }

    /// Create an age-based policy.
    pub fn age(every: Duration) -> Self {
        Self::default().with_age_threshold(every)
    }

    pub fn with_size_threshold(mut self, bytes: u64) -> Self {
        self.size_threshold = Some(bytes).filter(|b| *b > 0);
        self
    }

    pub fn with_age_threshold(mut self, every: Duration) -> Self {
        self.age_threshold = Some(every).filter(|d| !d.is_zero());
        self
    }

    pub fn with_retention(mut self, keep: Duration) -> Self {
        self.retention = Some(keep).filter(|d| !d.is_zero());
        self
    }

    pub fn with_max_files(mut self, max_files: u64) -> Self {
        self.max_files = Some(max_files).filter(|n| *n > 0);
        self
    }

    pub fn with_compress_after(mut self, uncompressed: u64) -> Self {
        self.compress_after = Some(uncompressed);
        self
    }

    pub fn without_compression(mut self) -> Self {
        self.compress_after = None;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_scan_interval(mut self, interval: Duration) -> Self {
        self.scan_interval = Some(interval).filter(|d| !d.is_zero());
        self
    }

    /// Whether any trigger will ever rotate the file.
    pub fn rotates(&self) -> bool {
        self.size_threshold.is_some() || self.age_threshold.is_some()
    }

    /// Whether rotated copies accumulate without bound.
    pub fn keeps_forever(&self) -> bool {
        self.retention.is_none() && self.max_files.is_none()
    }
}

/// Render a duration the way policies are configured: whole days when possible.
pub(crate) fn describe(duration: Duration) -> String {
    let secs = duration.as_secs();
    match secs / SECS_PER_DAY {
        1 if secs % SECS_PER_DAY == 0 => "1 day".to_string(),
        n if n > 0 && secs % SECS_PER_DAY == 0 => format!("{} days", n),
        _ => format!("{:?}", duration),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: Duration = Duration::from_secs(SECS_PER_DAY);

    #[test]
    fn test_parse_size_units() {
        assert_eq!(parse_size("10"), Ok(10));
        assert_eq!(parse_size("10b"), Ok(10));
        assert_eq!(parse_size("5K"), Ok(5 * 1024));
        assert_eq!(parse_size("2m"), Ok(2 * 1024 * 1024));
        assert_eq!(parse_size(" 1G "), Ok(1024 * 1024 * 1024));
        assert!(parse_size("").is_err());
        assert!(parse_size("12T").is_err());
        assert!(parse_size("lots").is_err());
        assert!(parse_size("99999999999999G").is_err());
    }

    #[test]
    fn test_policy_deserialize_json() {
        let json = r#"{"size": 1048576, "days": 1, "keep": 7, "max_files_keep": 5, "compress": 2}"#;
        let policy: RotationPolicy = serde_json::from_str(json).unwrap();
        assert_eq!(policy.size_threshold, Some(1024 * 1024));
        assert_eq!(policy.age_threshold, Some(DAY));
        assert_eq!(policy.retention, Some(7 * DAY));
        assert_eq!(policy.max_files, Some(5));
        assert_eq!(policy.compress_after, Some(2));
        assert_eq!(policy.poll_interval, DEFAULT_POLL_INTERVAL);
        assert_eq!(policy.scan_interval, None);
    }

    #[test]
    fn test_policy_deserialize_defaults() {
        let policy: RotationPolicy = serde_json::from_str("{}").unwrap();
        assert_eq!(policy, RotationPolicy::default());
        assert!(!policy.rotates());
        assert!(policy.keeps_forever());
        assert_eq!(policy.compress_after, Some(0));
    }

    #[test]
    fn test_policy_deserialize_disabled_values() {
        let json = r#"{"size": 0, "days": -1, "keep": 0, "max_files_keep": -3, "compress": -1}"#;
        let policy: RotationPolicy = serde_json::from_str(json).unwrap();
        assert_eq!(policy.size_threshold, None);
        assert_eq!(policy.age_threshold, None);
        assert_eq!(policy.retention, None);
        assert_eq!(policy.max_files, None);
        assert_eq!(policy.compress_after, None);
    }

    #[test]
    fn test_policy_deserialize_yaml_with_units() {
        let yaml = r#"
size: "10M"
keep: 30
compress: 1
poll_interval: 5
scan_interval: 3600
"#;
        let policy: RotationPolicy = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(policy.size_threshold, Some(10 * 1024 * 1024));
        assert_eq!(policy.retention, Some(30 * DAY));
        assert_eq!(policy.compress_after, Some(1));
        assert_eq!(policy.poll_interval, Duration::from_secs(5));
        assert_eq!(policy.scan_interval, Some(Duration::from_secs(3600)));
    }

    #[test]
    fn test_policy_rejects_bad_values() {
        assert!(serde_json::from_str::<RotationPolicy>(r#"{"size": "3X"}"#).is_err());
        assert!(serde_json::from_str::<RotationPolicy>(r#"{"poll_interval": 0}"#).is_err());
        assert!(serde_json::from_str::<RotationPolicy>(r#"{"days": 9223372036854775807}"#).is_err());
    }

    #[test]
    fn test_policy_constructors() {
        let policy = RotationPolicy::size(1024, 3);
        assert_eq!(policy.size_threshold, Some(1024));
        assert_eq!(policy.max_files, Some(3));
        assert!(policy.rotates());
        assert!(!policy.keeps_forever());

        let policy = RotationPolicy::age(DAY)
            .with_retention(7 * DAY)
            .without_compression();
        assert_eq!(policy.age_threshold, Some(DAY));
        assert_eq!(policy.compress_after, None);
        assert!(!policy.keeps_forever());

        let policy = RotationPolicy::default()
            .with_size_threshold(0)
            .with_max_files(0);
        assert!(!policy.rotates());
        assert!(policy.keeps_forever());
    }

    #[test]
    fn test_describe() {
        assert_eq!(describe(DAY), "1 day");
        assert_eq!(describe(3 * DAY), "3 days");
        assert_eq!(describe(Duration::from_secs(90)), "90s");
    }
}
