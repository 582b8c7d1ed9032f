//! Rotated-log archival
//!
//! Once the number of rotated logs reaches the backup limit they are
//! concatenated in timestamp order into one dated archive, zstd-compressed,
//! and removed. An archive for the same date must not already exist; the
//! uncompressed intermediate never survives, and on failure the source
//! rotations are left in place so the next run can retry.

use anyhow::{bail, Context, Result};
use chrono::Local;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default number of rotated logs kept before archival kicks in
pub const DEFAULT_MAX_BACKUPS: usize = 24;

/// Whether a file name is a rotated access log (`access-<14 digits>.log`)
fn is_rotated_log_name(name: &str) -> bool {
    name.strip_prefix("access-")
        .and_then(|rest| rest.strip_suffix(".log"))
        .map(|stamp| stamp.len() == 14 && stamp.bytes().all(|b| b.is_ascii_digit()))
        .unwrap_or(false)
}

/// List rotated access logs in a directory
fn list_rotated_logs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut logs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if is_rotated_log_name(name) {
                logs.push(entry.path());
            }
        }
    }
    Ok(logs)
}

/// Archive rotated logs once at least `max_backups` of them exist.
///
/// Sorting is lexicographic, which is chronological for the fixed-width
/// timestamp names. Fails without touching anything if today's compressed
/// archive already exists.
pub fn archive_rotated_logs(dir: &Path, max_backups: usize) -> Result<()> {
    let mut sources = list_rotated_logs(dir)?;
    if sources.len() < max_backups {
        debug!(
            "{} rotated logs below backup limit {}, skipping archive",
            sources.len(),
            max_backups
        );
        return Ok(());
    }
    sources.sort();

    let date = Local::now().format("%Y%m%d");
    let archive_path = dir.join(format!("archived-access-{}.log", date));
    let compressed_path = dir.join(format!("archived-access-{}.log.zst", date));

    if compressed_path.exists() {
        bail!("Archive {} already exists", compressed_path.display());
    }

    match build_archive(&sources, &archive_path, &compressed_path) {
        Ok(()) => {
            for source in &sources {
                fs::remove_file(source)
                    .with_context(|| format!("Failed to remove {}", source.display()))?;
            }
            info!(
                "Archived {} rotated logs into {}",
                sources.len(),
                compressed_path.display()
            );
            Ok(())
        }
        Err(e) => {
            // Sources stay for a retry; only the intermediate is cleaned up.
            let _ = fs::remove_file(&archive_path);
            Err(e)
        }
    }
}

/// Concatenate sources into the intermediate, compress it, drop the
/// intermediate
fn build_archive(sources: &[PathBuf], archive_path: &Path, compressed_path: &Path) -> Result<()> {
    let mut archive = File::create(archive_path)
        .with_context(|| format!("Failed to create {}", archive_path.display()))?;
    for source in sources {
        let mut src = File::open(source)
            .with_context(|| format!("Failed to open {}", source.display()))?;
        io::copy(&mut src, &mut archive)?;
    }
    drop(archive);

    let src = File::open(archive_path)?;
    let dst = File::create(compressed_path)
        .with_context(|| format!("Failed to create {}", compressed_path.display()))?;
    zstd::stream::copy_encode(src, dst, 0)
        .with_context(|| format!("Failed to compress {}", archive_path.display()))?;

    fs::remove_file(archive_path)?;
    Ok(())
}
