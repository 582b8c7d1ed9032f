//! Access log
//!
//! One line per finished session, appended to a live `access.log`. The sink
//! serializes writers and rotation through a single lock, so a record written
//! while the file is being renamed lands in either the rotated file or the
//! fresh one, never nowhere.
//!
//! Line layout: a `YYYY/MM/DD HH:MM:SS` stamp (two tokens) followed by the
//! six record tokens, eight whitespace-separated fields in total. The
//! accounting parser depends on that shape.

use chrono::{DateTime, Local, SecondsFormat};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// One finished SOCKS5 session
#[derive(Debug, Clone)]
pub struct AccessRecord {
    /// Client address the session arrived from
    pub remote: SocketAddr,
    /// Authenticated username (`-` for anonymous sessions)
    pub username: String,
    /// Moment the session finished
    pub timestamp: DateTime<Local>,
    /// Destination exactly as requested, rendered `host:port`
    pub destination: String,
    /// Bytes read from the client during the relay
    pub read_bytes: u64,
    /// Bytes written to the client during the relay
    pub write_bytes: u64,
}

impl fmt::Display for AccessRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {}",
            self.remote,
            self.username,
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.destination,
            self.read_bytes,
            self.write_bytes,
        )
    }
}

struct Sink {
    file: File,
    path: PathBuf,
}

/// Append-only, rotation-aware access log sink
pub struct AccessLogger {
    inner: Mutex<Sink>,
}

impl AccessLogger {
    /// Open (or create) the live log file in append mode
    pub fn open<P: Into<PathBuf>>(path: P) -> io::Result<Self> {
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(AccessLogger {
            inner: Mutex::new(Sink { file, path }),
        })
    }

    /// Path of the live log file
    pub fn path(&self) -> PathBuf {
        self.inner.lock().unwrap().path.clone()
    }

    /// Append one record as one line
    pub fn append(&self, record: &AccessRecord) -> io::Result<()> {
        let line = format!(
            "{} {}\n",
            record.timestamp.format("%Y/%m/%d %H:%M:%S"),
            record
        );
        let mut sink = self.inner.lock().unwrap();
        sink.file.write_all(line.as_bytes())?;
        sink.file.flush()
    }

    /// Rotate the live file away and reopen a fresh one at the same path.
    ///
    /// The rename and the reopen happen under the writers' lock; the rename
    /// is same-filesystem. On rename failure the old handle stays in place.
    pub fn rotate_to(&self, rotated_path: &Path) -> io::Result<()> {
        let mut sink = self.inner.lock().unwrap();
        sink.file.flush()?;
        std::fs::rename(&sink.path, rotated_path)?;
        sink.file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&sink.path)?;
        Ok(())
    }
}
