//! Rotated-file naming: `<base>.<RFC3339 timestamp>[.gz]`.
//!
//! The timestamp embedded in the name is the instant of rotation and is the
//! only source of truth for a rotated file's age. Filesystem metadata is never
//! consulted, so copies and restores keep their place in the retention order.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::Result;

/// Suffix appended to a rotated file once it has been gzip-compressed.
pub const COMPRESSED_SUFFIX: &str = ".gz";

/// Timestamp and compression state recovered from a rotated file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decoded {
    pub timestamp: OffsetDateTime,
    pub compressed: bool,
}

/// Name under which `base` is moved aside when rotated at `timestamp`.
///
/// Sub-second precision is dropped so names look like
/// `app.log.2026-10-16T09:30:00+02:00`.
pub fn encode(base: &Path, timestamp: OffsetDateTime) -> Result<PathBuf> {
    let whole_seconds = timestamp - time::Duration::nanoseconds(i64::from(timestamp.nanosecond()));
    let stamp = whole_seconds.format(&Rfc3339)?;

    let mut name = OsString::from(base.as_os_str());
    name.push(".");
    name.push(stamp);
    Ok(PathBuf::from(name))
}

/// Name of the gzip copy of a rotated file.
pub fn encode_compressed(rotated: &Path) -> PathBuf {
    let mut name = OsString::from(rotated.as_os_str());
    name.push(COMPRESSED_SUFFIX);
    PathBuf::from(name)
}

/// Recover the rotation timestamp from `candidate`, a file name sitting next
/// to the live file named `base_name`.
///
/// Returns `None` for anything that is not a rotated copy of `base_name`:
/// other files sharing the prefix, or suffixes that are not RFC3339.
pub fn decode(candidate: &str, base_name: &str) -> Option<Decoded> {
    let rest = candidate.strip_prefix(base_name)?.strip_prefix('.')?;
    let (stamp, compressed) = match rest.strip_suffix(COMPRESSED_SUFFIX) {
        Some(stamp) => (stamp, true),
        None => (rest, false),
    };

    let timestamp = OffsetDateTime::parse(stamp, &Rfc3339).ok()?;
    Some(Decoded {
        timestamp,
        compressed,
    })
}
