//! The dynamic extension region: a growable pool for variable-length
//! metadata referenced from the main region by offset.
//!
//! The pool is append-only within a generation; nothing is ever edited in
//! place, so readers can never observe a torn entry. Reclamation happens
//! by compacting live entries into a fresh pool when the store
//! materializes a new generation.

use ystore_error::{Result, StoreError};
use ystore_types::encoding::{append_bytes, read_u32_le_at};
use ystore_types::Generation;

/// A stable reference into the extension region.
///
/// Offsets are only meaningful together with the generation they were
/// created under; a reader holding an offset from an older generation gets
/// a *region corrupt* error instead of silently reading relocated bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ExtRef {
    pub generation: Generation,
    pub offset: u32,
    pub len: u32,
}

impl ExtRef {
    /// A reference to nothing (empty payload at offset 0).
    #[must_use]
    pub const fn empty(generation: Generation) -> Self {
        Self {
            generation,
            offset: 0,
            len: 0,
        }
    }
}

/// The append-only extension pool for one generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtRegion {
    generation: Generation,
    bytes: Vec<u8>,
}

impl ExtRegion {
    #[must_use]
    pub fn new(generation: Generation) -> Self {
        Self {
            generation,
            bytes: Vec::new(),
        }
    }

    /// Rebuild from serialized bytes (attach path).
    #[must_use]
    pub fn from_bytes(generation: Generation, bytes: Vec<u8>) -> Self {
        Self { generation, bytes }
    }

    #[must_use]
    pub const fn generation(&self) -> Generation {
        self.generation
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Append raw bytes, returning their stable reference.
    pub fn append(&mut self, payload: &[u8]) -> Result<ExtRef> {
        let offset = u32::try_from(self.bytes.len())
            .map_err(|_| StoreError::RegionCorrupt {
                detail: "extension region exceeds 4 GiB".to_owned(),
            })?;
        let len = u32::try_from(payload.len()).map_err(|_| StoreError::RegionCorrupt {
            detail: "extension entry exceeds 4 GiB".to_owned(),
        })?;
        // Length-prefixed so a sweep over the pool can skip entries.
        append_bytes(&mut self.bytes, payload);
        Ok(ExtRef {
            generation: self.generation,
            offset,
            len,
        })
    }

    /// Append a UTF-8 string.
    pub fn append_str(&mut self, s: &str) -> Result<ExtRef> {
        self.append(s.as_bytes())
    }

    /// Resolve a reference, verifying its generation and bounds.
    pub fn get(&self, r: ExtRef) -> Result<&[u8]> {
        if r.generation != self.generation {
            return Err(StoreError::RegionCorrupt {
                detail: format!(
                    "extension reference from generation {} read under generation {}",
                    r.generation, self.generation
                ),
            });
        }
        if r.len == 0 {
            return Ok(&[]);
        }
        let off = r.offset as usize;
        let stored_len = read_u32_le_at(&self.bytes, off).ok_or_else(|| truncated(r))?;
        if stored_len != r.len {
            return Err(StoreError::RegionCorrupt {
                detail: format!(
                    "extension entry at offset {} has length {stored_len}, reference says {}",
                    r.offset, r.len
                ),
            });
        }
        self.bytes
            .get(off + 4..off + 4 + r.len as usize)
            .ok_or_else(|| truncated(r))
    }

    /// Resolve a reference as UTF-8.
    pub fn get_str(&self, r: ExtRef) -> Result<&str> {
        std::str::from_utf8(self.get(r)?).map_err(|_| StoreError::RegionCorrupt {
            detail: format!("extension entry at offset {} is not UTF-8", r.offset),
        })
    }

    /// Compact live entries into a pool for the next generation.
    ///
    /// `live` lists the references still in use; the returned remap gives
    /// each old reference its location in the new pool, in input order.
    pub fn compact(&self, next: Generation, live: &[ExtRef]) -> Result<(ExtRegion, Vec<ExtRef>)> {
        let mut out = ExtRegion::new(next);
        let mut remap = Vec::with_capacity(live.len());
        for &r in live {
            let payload = self.get(r)?.to_vec();
            remap.push(out.append(&payload)?);
        }
        Ok((out, remap))
    }
}

fn truncated(r: ExtRef) -> StoreError {
    StoreError::RegionCorrupt {
        detail: format!(
            "extension reference {}+{} is out of bounds",
            r.offset, r.len
        ),
    }
}
