//! Retention: expiry, compression and max-count trimming of rotated copies.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::naming::{self, Decoded};
use crate::{Error, Reporter, Result, RotationPolicy};

/// A rotated copy of a live log file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotatedFile {
    pub path: PathBuf,
    /// Rotation instant, parsed from the file name.
    pub timestamp: OffsetDateTime,
    pub compressed: bool,
}

/// What a single scan did.
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Copies removed because they outlived the retention age.
    pub expired: Vec<PathBuf>,
    /// Copies replaced by their `.gz` counterpart (original paths).
    pub compressed: Vec<PathBuf>,
    /// Copies removed to stay within the maximum file count.
    pub trimmed: Vec<PathBuf>,
    /// Per-entry failures; none of them stopped the scan.
    pub errors: Vec<Error>,
}

/// Applies a [`RotationPolicy`] to the rotated copies of one live file.
#[derive(Debug, Clone, Copy)]
pub struct RetentionScanner<'a> {
    policy: &'a RotationPolicy,
    reporter: &'a Reporter,
}

impl<'a> RetentionScanner<'a> {
    pub fn new(policy: &'a RotationPolicy, reporter: &'a Reporter) -> Self {
        Self { policy, reporter }
    }

    /// Expire, compress, then trim the rotated copies of `base_path`.
    pub fn scan(&self, base_path: &Path, now: OffsetDateTime) -> ScanReport {
        let mut report = ScanReport::default();
        let mut files = list_rotated(base_path, &mut report.errors);

        if let Some(retention) = self.policy.retention {
            let retention = time::Duration::try_from(retention).unwrap_or(time::Duration::MAX);
            files.retain(|file| {
                if now - file.timestamp <= retention {
                    return true;
                }
                match remove_if_exists(&file.path) {
                    Ok(()) => {
                        self.reporter.in_scope(|| {
                            info!(path = %file.path.display(), "removed rotated log past retention age")
                        });
                        report.expired.push(file.path.clone());
                        false
                    }
                    Err(source) => {
                        report.errors.push(Error::Remove {
                            path: file.path.clone(),
                            source,
                        });
                        true
                    }
                }
            });
        }

        if let Some(uncompressed) = self.policy.compress_after {
            let count = files.len().saturating_sub(to_usize(uncompressed));
            for file in files.iter_mut().take(count).filter(|file| !file.compressed) {
                match gzip_compress(&file.path) {
                    Ok(Some(compressed)) => {
                        self.reporter
                            .in_scope(|| debug!(path = %file.path.display(), "gzipped rotated log"));
                        report.compressed.push(std::mem::replace(&mut file.path, compressed));
                        file.compressed = true;
                    }
                    Ok(None) => {}
                    Err(err) => {
                        self.reporter.in_scope(|| warn!(error = %err, "skipping compression"));
                        report.errors.push(err);
                    }
                }
            }
        }

        if let Some(max_files) = self.policy.max_files {
            let excess = files.len().saturating_sub(to_usize(max_files));
            for file in files.iter().take(excess) {
                match remove_if_exists(&file.path) {
                    Ok(()) => {
                        self.reporter.in_scope(|| {
                            info!(
                                path = %file.path.display(),
                                max_files,
                                "removed rotated log over file limit"
                            )
                        });
                        report.trimmed.push(file.path.clone());
                    }
                    Err(source) => report.errors.push(Error::Remove {
                        path: file.path.clone(),
                        source,
                    }),
                }
            }
        }

        // Compression failures were already reported as they happened.
        for err in report
            .errors
            .iter()
            .filter(|err| !matches!(err, Error::Compression { .. }))
        {
            self.reporter.in_scope(|| warn!(error = %err, "retention scan error"));
        }
        report
    }
}

fn to_usize(n: u64) -> usize {
    usize::try_from(n).unwrap_or(usize::MAX)
}

/// Directory holding `base_path`, `.` for bare file names.
fn directory_of(base_path: &Path) -> &Path {
    match base_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Rotated copies of `base_path`, oldest first.
///
/// Entries that cannot be read or whose name does not decode are skipped;
/// read failures are recorded in `errors`.
pub fn list_rotated(base_path: &Path, errors: &mut Vec<Error>) -> Vec<RotatedFile> {
    let Some(base_name) = base_path.file_name().and_then(|name| name.to_str()) else {
        return Vec::new();
    };
    let dir = directory_of(base_path);

    let read_dir = match fs::read_dir(dir) {
        Ok(read_dir) => read_dir,
        Err(source) => {
            errors.push(Error::Walk {
                path: dir.to_path_buf(),
                source,
            });
            return Vec::new();
        }
    };

    let mut files = read_dir
        .filter_map(|entry| {
            let entry = match entry {
                Ok(entry) => entry,
                Err(source) => {
                    errors.push(Error::Walk {
                        path: dir.to_path_buf(),
                        source,
                    });
                    return None;
                }
            };

            let filename = entry.file_name();
            // Rotated names are always UTF-8; anything else is foreign.
            let filename = filename.to_str()?;
            let Decoded {
                timestamp,
                compressed,
            } = naming::decode(filename, base_name)?;

            match entry.file_type() {
                Ok(file_type) if file_type.is_dir() => None,
                Ok(_) => Some(RotatedFile {
                    path: dir.join(filename),
                    timestamp,
                    compressed,
                }),
                Err(source) => {
                    errors.push(Error::Stat {
                        path: entry.path(),
                        source,
                    });
                    None
                }
            }
        })
        .collect::<Vec<_>>();

    files.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.path.cmp(&b.path))
    });
    files
}

/// Remove `path`; a file that is already gone is not an error.
fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}

/// Replace `path` with a gzip copy at `<path>.gz`.
///
/// Returns `None` if `path` disappeared before it could be read.
fn gzip_compress(path: &Path) -> Result<Option<PathBuf>> {
    let compression_error = |source: io::Error| Error::Compression {
        path: path.to_path_buf(),
        source,
    };

    let infile = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(compression_error(err)),
    };

    let target = naming::encode_compressed(path);
    let written = File::create(&target).and_then(|outfile| {
        let mut encoder = GzEncoder::new(BufWriter::new(outfile), Compression::default());
        io::copy(&mut BufReader::new(infile), &mut encoder)?;
        encoder.finish()?.into_inner().map_err(|err| err.into_error())?.sync_all()
    });

    if let Err(err) = written {
        let _ = fs::remove_file(&target);
        return Err(compression_error(err));
    }

    remove_if_exists(path).map_err(compression_error)?;
    Ok(Some(target))
}
