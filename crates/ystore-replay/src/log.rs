//! Replay log file I/O.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use xxhash_rust::xxh3::xxh3_64;
use ystore_error::{Result, StoreError};
use ystore_types::encoding::{append_bytes, append_str, append_u64_le, read_bytes, read_str, read_u64_le};
use ystore_types::Timestamp;

/// One stored notification.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ReplayEntry {
    pub timestamp: Timestamp,
    pub xpath: String,
    /// Serialized notification content.
    pub payload: Vec<u8>,
}

impl ReplayEntry {
    fn encode(&self) -> Vec<u8> {
        let mut body = Vec::new();
        append_u64_le(&mut body, self.timestamp.as_nanos());
        append_str(&mut body, &self.xpath);
        append_bytes(&mut body, &self.payload);

        let mut framed = Vec::with_capacity(body.len() + 12);
        append_bytes(&mut framed, &body);
        append_u64_le(&mut framed, xxh3_64(&body));
        framed
    }

    /// Decode one record at `*cursor`. `Ok(None)` means a clean or torn
    /// end of log.
    fn decode(bytes: &[u8], cursor: &mut usize) -> Option<Self> {
        let start = *cursor;
        let body = read_bytes(bytes, cursor)?;
        let mut c2 = *cursor;
        let stored = read_u64_le(bytes, &mut c2)?;
        if xxh3_64(body) != stored {
            warn!(offset = start, "replay record checksum mismatch; truncating log view");
            return None;
        }
        let mut b = 0_usize;
        let timestamp = Timestamp::from_nanos(read_u64_le(body, &mut b)?);
        let xpath = read_str(body, &mut b)?.to_owned();
        let payload = read_bytes(body, &mut b)?.to_vec();
        *cursor = c2;
        Some(Self {
            timestamp,
            xpath,
            payload,
        })
    }
}

/// The per-module append-only notification log.
pub struct ReplayLog {
    path: PathBuf,
}

impl ReplayLog {
    /// Open (creating the directory if needed) the log for `module`.
    pub fn open(dir: &Path, module: &str) -> Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            path: dir.join(format!("{module}.ntf")),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one notification. The write is a single `write_all` of the
    /// framed record, so a crash can only tear the tail record.
    pub fn append(&self, entry: &ReplayEntry) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(&entry.encode())?;
        debug!(path = %self.path.display(), xpath = %entry.xpath, "appended replay entry");
        Ok(())
    }

    /// Iterate entries with `t0 <= timestamp <= t1` (either bound may be
    /// open). Entries are yielded in append order.
    pub fn iter_range(
        &self,
        t0: Option<Timestamp>,
        t1: Option<Timestamp>,
    ) -> Result<ReplayIter> {
        let bytes = match File::open(&self.path) {
            Ok(mut f) => {
                let mut buf = Vec::new();
                f.read_to_end(&mut buf)?;
                buf
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(StoreError::Io(e)),
        };
        Ok(ReplayIter {
            bytes,
            cursor: 0,
            t0,
            t1,
        })
    }

    /// Remove the log file (module removal).
    pub fn destroy(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }
}

/// Iterator over a time window of the log.
pub struct ReplayIter {
    bytes: Vec<u8>,
    cursor: usize,
    t0: Option<Timestamp>,
    t1: Option<Timestamp>,
}

impl Iterator for ReplayIter {
    type Item = ReplayEntry;

    fn next(&mut self) -> Option<ReplayEntry> {
        loop {
            let entry = ReplayEntry::decode(&self.bytes, &mut self.cursor)?;
            if self.t0.is_some_and(|t0| entry.timestamp < t0) {
                continue;
            }
            if self.t1.is_some_and(|t1| entry.timestamp > t1) {
                // Entries are appended in time order; past the upper bound
                // nothing further can match.
                return None;
            }
            return Some(entry);
        }
    }
}
