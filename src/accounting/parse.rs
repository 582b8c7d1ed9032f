//! Rotated access-log parsing
//!
//! Aggregates one rotated log into per-user byte totals. A line is eight
//! whitespace-separated fields: a two-token timestamp stamp, the remote
//! address, the username, the session's RFC 3339 time, the destination, and
//! the read/write byte counts. Anything else is skipped with a warning.

use anyhow::Result;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::warn;

/// Field count of a well-formed access-log line
const RECORD_FIELDS: usize = 8;
/// Index of the username field
const FIELD_USERNAME: usize = 3;
/// Index of the bytes-read field
const FIELD_READ_BYTES: usize = 6;
/// Index of the bytes-written field
const FIELD_WRITE_BYTES: usize = 7;

/// Parse a rotated access log into `username -> total bytes`.
///
/// The total is the sum of read and write bytes across all of the user's
/// records in this file.
pub fn parse_rotated_log(path: &Path) -> Result<HashMap<String, u64>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let mut stats: HashMap<String, u64> = HashMap::new();
    for line in reader.lines() {
        let line = line?;
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != RECORD_FIELDS {
            warn!("Skipping malformed access-log line: {}", line);
            continue;
        }

        let read_bytes: u64 = match fields[FIELD_READ_BYTES].parse() {
            Ok(n) => n,
            Err(e) => {
                warn!("Error parsing bytes read in {:?}: {}", line, e);
                continue;
            }
        };
        let write_bytes: u64 = match fields[FIELD_WRITE_BYTES].parse() {
            Ok(n) => n,
            Err(e) => {
                warn!("Error parsing bytes written in {:?}: {}", line, e);
                continue;
            }
        };

        *stats.entry(fields[FIELD_USERNAME].to_string()).or_insert(0) +=
            read_bytes + write_bytes;
    }

    Ok(stats)
}
