//! The main shared metadata region.
//!
//! A fixed-layout 128-byte header followed by the module table and the
//! extension pool. The header carries the layout version, the generation
//! counter, the creator pid, and id allocators; an xxh3_64 checksum covers
//! the immutable fields.
//!
//! Module entries are fixed-size: every variable-length field (name,
//! revision, owner, group, plugin names, the feature array) lives in the
//! extension pool and is referenced by `(offset, len)`. A metadata rewrite
//! appends fresh strings and repoints the entries — nothing in the pool is
//! ever edited in place, so a concurrent reader can never observe a torn
//! entry. The garbage this leaves behind is reclaimed when a new
//! generation is materialized into a freshly compacted pool.
//!
//! The in-process fast path uses native atomics for the counters.
//! Serialization to and from the on-disk byte form uses explicit
//! `to_le_bytes`/`from_le_bytes` at computed offsets; cross-process attach
//! goes through [`MainRegion::load`] and readers detect staleness by
//! rechecking the generation after a read. The region is never edited in
//! place across generations: a schema-affecting change builds the whole
//! new layout and swaps it in with an atomic rename.

use std::fs;
use std::path::{Path as FsPath, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use tracing::{debug, info};
use xxhash_rust::xxh3::xxh3_64;
use ystore_error::{Result, StoreError};
use ystore_types::encoding::{
    append_bytes, append_u32_le, append_u64_le, read_bytes, read_u32_le, read_u64_le,
    read_u32_le_at, read_u64_le_at, write_u64_le_at,
};
use ystore_types::{DatastoreKind, EventId, Generation};

use crate::ext_region::{ExtRef, ExtRegion};

// ---------------------------------------------------------------------------
// Wire-format offsets
// ---------------------------------------------------------------------------

/// Byte offsets and sizes of the main-region header.
mod offsets {
    /// `[u8;8]` — `"YSTRSHM\0"`.
    pub const MAGIC: usize = 0;
    pub const MAGIC_LEN: usize = 8;

    /// `u32` — layout version.
    pub const VERSION: usize = 8;

    /// `u32` — creator pid.
    pub const CREATOR_PID: usize = 12;

    /// `u64` — generation counter.
    pub const GENERATION: usize = 16;

    /// `u64` — next transaction event id (atomic counter).
    pub const NEXT_EVENT_ID: usize = 24;

    /// `u32` — next session id (atomic counter).
    pub const NEXT_SESSION_ID: usize = 32;

    /// `u32` — next connection id (atomic counter).
    pub const NEXT_CONNECTION_ID: usize = 36;

    /// `u64` — xxh3_64 over the immutable fields (magic..creator_pid).
    pub const LAYOUT_CHECKSUM: usize = 40;

    /// `[u8;80]` — reserved padding to 128 bytes.
    pub const _PADDING: usize = 48;

    /// Total header size in bytes.
    pub const HEADER_SIZE: usize = 128;
}

/// Magic bytes identifying a valid yangstore main region.
const MAGIC: [u8; 8] = *b"YSTRSHM\0";

/// Current layout version.
const LAYOUT_VERSION: u32 = 1;

/// Module entry flag: notification replay enabled.
const MODF_REPLAY: u32 = 1;

/// Module entry flag: module is implemented (not import-only).
const MODF_IMPLEMENTED: u32 = 2;

// ---------------------------------------------------------------------------
// ModuleMeta
// ---------------------------------------------------------------------------

/// The resolved, in-process view of one installed module's metadata.
///
/// On the wire the entry is fixed-size; every string here is resolved
/// from its extension-pool reference at load time.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ModuleMeta {
    pub name: String,
    pub revision: Option<String>,
    pub owner: String,
    pub group: String,
    /// Unix permission bits for the module's datastore files.
    pub perm: u32,
    pub replay_enabled: bool,
    pub implemented: bool,
    /// Datastore plugin name per kind, indexed by `DatastoreKind::to_u8`.
    pub plugins: [String; 3],
    /// Features the schema defines, in definition order.
    pub features: Vec<String>,
    /// Bitset over `features`: bit i set means `features[i]` is enabled.
    pub enabled_features: u64,
    /// SHA-256 of the module's compiled schema, pinning content identity.
    pub content_hash: [u8; 32],
}

impl ModuleMeta {
    /// Whether `feature` (by index) is enabled.
    #[must_use]
    pub fn feature_enabled(&self, feature: &str) -> bool {
        self.features
            .iter()
            .position(|f| f == feature)
            .is_some_and(|i| i < 64 && self.enabled_features & (1 << i) != 0)
    }

    /// Names of the currently enabled features.
    #[must_use]
    pub fn enabled_feature_names(&self) -> Vec<String> {
        self.features
            .iter()
            .enumerate()
            .filter(|(i, _)| *i < 64 && self.enabled_features & (1 << i) != 0)
            .map(|(_, f)| f.clone())
            .collect()
    }

    /// The plugin configured for `kind`.
    #[must_use]
    pub fn plugin_for(&self, kind: DatastoreKind) -> &str {
        &self.plugins[kind.to_u8() as usize]
    }

    fn flags(&self) -> u32 {
        let mut f = 0;
        if self.replay_enabled {
            f |= MODF_REPLAY;
        }
        if self.implemented {
            f |= MODF_IMPLEMENTED;
        }
        f
    }
}

// ---------------------------------------------------------------------------
// ModuleEntry — the fixed-size wire form
// ---------------------------------------------------------------------------

/// One fixed-size module-table entry: fixed fields plus extension-pool
/// references for everything variable-length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ModuleEntry {
    name: ExtRef,
    /// `len == 0` means no revision.
    revision: ExtRef,
    owner: ExtRef,
    group: ExtRef,
    perm: u32,
    flags: u32,
    plugins: [ExtRef; 3],
    /// A packed array in the pool: `count(4)` then `count` pairs of
    /// `(offset(4), len(4))`, each pointing at one feature name.
    features: ExtRef,
    enabled_features: u64,
    content_hash: [u8; 32],
}

/// Append one string to the pool; the empty string encodes as the null
/// reference (used for `revision: None`).
fn append_opt_str(ext: &mut ExtRegion, s: Option<&str>) -> Result<ExtRef> {
    match s {
        Some(s) if !s.is_empty() => ext.append_str(s),
        _ => Ok(ExtRef::empty(ext.generation())),
    }
}

/// Encode one module's metadata into the pool, returning its entry.
fn encode_entry(ext: &mut ExtRegion, meta: &ModuleMeta) -> Result<ModuleEntry> {
    let name = ext.append_str(&meta.name)?;
    let revision = append_opt_str(ext, meta.revision.as_deref())?;
    let owner = ext.append_str(&meta.owner)?;
    let group = ext.append_str(&meta.group)?;
    let mut plugins = [ExtRef::empty(ext.generation()); 3];
    for (slot, plugin) in plugins.iter_mut().zip(&meta.plugins) {
        *slot = ext.append_str(plugin)?;
    }

    // The feature names first, then the array referencing them, so the
    // array's own reference is a single fixed field in the entry.
    let mut feature_refs = Vec::with_capacity(meta.features.len());
    for feature in &meta.features {
        feature_refs.push(ext.append_str(feature)?);
    }
    let mut packed = Vec::with_capacity(4 + feature_refs.len() * 8);
    append_u32_le(&mut packed, u32::try_from(feature_refs.len()).unwrap_or(0));
    for r in &feature_refs {
        append_u32_le(&mut packed, r.offset);
        append_u32_le(&mut packed, r.len);
    }
    let features = ext.append(&packed)?;

    Ok(ModuleEntry {
        name,
        revision,
        owner,
        group,
        perm: meta.perm,
        flags: meta.flags(),
        plugins,
        features,
        enabled_features: meta.enabled_features,
        content_hash: meta.content_hash,
    })
}

/// Resolve an entry's references back into the in-process view.
fn resolve_entry(ext: &ExtRegion, entry: &ModuleEntry) -> Result<ModuleMeta> {
    let name = ext.get_str(entry.name)?.to_owned();
    let revision = if entry.revision.len == 0 {
        None
    } else {
        Some(ext.get_str(entry.revision)?.to_owned())
    };
    let owner = ext.get_str(entry.owner)?.to_owned();
    let group = ext.get_str(entry.group)?.to_owned();
    let mut plugins: [String; 3] = Default::default();
    for (slot, r) in plugins.iter_mut().zip(&entry.plugins) {
        *slot = ext.get_str(*r)?.to_owned();
    }

    let packed = ext.get(entry.features)?;
    let mut cursor = 0;
    let count = read_u32_le(packed, &mut cursor).ok_or_else(|| feature_array_corrupt())?;
    let mut features = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let offset = read_u32_le(packed, &mut cursor).ok_or_else(|| feature_array_corrupt())?;
        let len = read_u32_le(packed, &mut cursor).ok_or_else(|| feature_array_corrupt())?;
        let r = ExtRef {
            generation: ext.generation(),
            offset,
            len,
        };
        features.push(ext.get_str(r)?.to_owned());
    }

    Ok(ModuleMeta {
        name,
        revision,
        owner,
        group,
        perm: entry.perm,
        replay_enabled: entry.flags & MODF_REPLAY != 0,
        implemented: entry.flags & MODF_IMPLEMENTED != 0,
        plugins,
        features,
        enabled_features: entry.enabled_features,
        content_hash: entry.content_hash,
    })
}

fn feature_array_corrupt() -> StoreError {
    StoreError::RegionCorrupt {
        detail: "module feature array truncated".to_owned(),
    }
}

fn write_ref(buf: &mut Vec<u8>, r: ExtRef) {
    append_u32_le(buf, r.offset);
    append_u32_le(buf, r.len);
}

fn read_ref(bytes: &[u8], cursor: &mut usize, generation: Generation) -> Option<ExtRef> {
    let offset = read_u32_le(bytes, cursor)?;
    let len = read_u32_le(bytes, cursor)?;
    Some(ExtRef {
        generation,
        offset,
        len,
    })
}

fn write_entry(buf: &mut Vec<u8>, e: &ModuleEntry) {
    write_ref(buf, e.name);
    write_ref(buf, e.revision);
    write_ref(buf, e.owner);
    write_ref(buf, e.group);
    append_u32_le(buf, e.perm);
    append_u32_le(buf, e.flags);
    for r in e.plugins {
        write_ref(buf, r);
    }
    write_ref(buf, e.features);
    append_u64_le(buf, e.enabled_features);
    buf.extend_from_slice(&e.content_hash);
}

fn read_entry(bytes: &[u8], cursor: &mut usize, generation: Generation) -> Option<ModuleEntry> {
    let name = read_ref(bytes, cursor, generation)?;
    let revision = read_ref(bytes, cursor, generation)?;
    let owner = read_ref(bytes, cursor, generation)?;
    let group = read_ref(bytes, cursor, generation)?;
    let perm = read_u32_le(bytes, cursor)?;
    let flags = read_u32_le(bytes, cursor)?;
    let mut plugins = [ExtRef::empty(generation); 3];
    for slot in &mut plugins {
        *slot = read_ref(bytes, cursor, generation)?;
    }
    let features = read_ref(bytes, cursor, generation)?;
    let enabled_features = read_u64_le(bytes, cursor)?;
    let mut content_hash = [0_u8; 32];
    content_hash.copy_from_slice(bytes.get(*cursor..*cursor + 32)?);
    *cursor += 32;
    Some(ModuleEntry {
        name,
        revision,
        owner,
        group,
        perm,
        flags,
        plugins,
        features,
        enabled_features,
        content_hash,
    })
}

// ---------------------------------------------------------------------------
// DeferredOp
// ---------------------------------------------------------------------------

/// A schema-affecting operation queued until a new generation can be
/// materialized (no in-place schema mutation under live sessions).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DeferredOp {
    /// Install a module; payload is the serialized compiled schema.
    Install {
        name: String,
        schema_json: String,
        enabled_features: Vec<String>,
    },
    /// Remove a module.
    Remove { name: String },
    /// Replace a module's schema with a newer revision.
    Update { name: String, schema_json: String },
    /// Toggle a feature.
    SetFeature {
        module: String,
        feature: String,
        enable: bool,
    },
}

impl DeferredOp {
    /// The module this operation targets.
    #[must_use]
    pub fn module(&self) -> &str {
        match self {
            Self::Install { name, .. } | Self::Remove { name } | Self::Update { name, .. } => name,
            Self::SetFeature { module, .. } => module,
        }
    }
}

// ---------------------------------------------------------------------------
// MainRegion
// ---------------------------------------------------------------------------

/// The main metadata region of one store instance.
pub struct MainRegion {
    path: PathBuf,
    generation: Generation,
    creator_pid: u32,
    next_event_id: AtomicU64,
    next_session_id: AtomicU32,
    next_connection_id: AtomicU32,
    /// Fixed-size wire entries; strings resolve through `ext`.
    entries: Vec<ModuleEntry>,
    /// The resolved view, kept in lockstep with `entries`.
    modules: Vec<ModuleMeta>,
    ext: ExtRegion,
    deferred: Vec<DeferredOp>,
}

impl MainRegion {
    /// Total header size in bytes.
    pub const HEADER_SIZE: usize = offsets::HEADER_SIZE;

    /// Create a fresh region at `dir/main.shm` (first process wins).
    pub fn create(dir: &FsPath) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let region = Self {
            path: dir.join("main.shm"),
            generation: Generation::FIRST,
            creator_pid: std::process::id(),
            next_event_id: AtomicU64::new(1),
            next_session_id: AtomicU32::new(1),
            next_connection_id: AtomicU32::new(1),
            entries: Vec::new(),
            modules: Vec::new(),
            ext: ExtRegion::new(Generation::FIRST),
            deferred: Vec::new(),
        };
        region.persist()?;
        info!(path = %region.path.display(), "created main region");
        Ok(region)
    }

    /// Attach to an existing region, or create it when absent.
    pub fn create_or_attach(dir: &FsPath) -> Result<Self> {
        let path = dir.join("main.shm");
        if path.exists() {
            Self::load(&path)
        } else {
            Self::create(dir)
        }
    }

    /// Load and verify the on-disk form.
    pub fn load(path: &FsPath) -> Result<Self> {
        let bytes = fs::read(path)?;
        Self::from_bytes(path.to_owned(), &bytes)
    }

    #[must_use]
    pub const fn generation(&self) -> Generation {
        self.generation
    }

    #[must_use]
    pub const fn creator_pid(&self) -> u32 {
        self.creator_pid
    }

    #[must_use]
    pub fn path(&self) -> &FsPath {
        &self.path
    }

    /// The extension pool backing this region's module table.
    #[must_use]
    pub fn ext(&self) -> &ExtRegion {
        &self.ext
    }

    /// Allocate the next transaction event id.
    pub fn next_event_id(&self) -> EventId {
        EventId::new(self.next_event_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Allocate the next session id.
    pub fn next_session_id(&self) -> u32 {
        self.next_session_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Allocate the next connection id.
    pub fn next_connection_id(&self) -> u32 {
        self.next_connection_id.fetch_add(1, Ordering::Relaxed)
    }

    // --- module table ---

    #[must_use]
    pub fn modules(&self) -> &[ModuleMeta] {
        &self.modules
    }

    /// Look up a module by name.
    pub fn module(&self, name: &str) -> Result<&ModuleMeta> {
        self.modules
            .iter()
            .find(|m| m.name == name)
            .ok_or_else(|| StoreError::unknown_module(name))
    }

    /// Module names in deterministic (lexicographic) order.
    #[must_use]
    pub fn module_names_sorted(&self) -> Vec<String> {
        let mut names: Vec<String> = self.modules.iter().map(|m| m.name.clone()).collect();
        names.sort();
        names
    }

    // --- deferred schema-affecting operations ---

    #[must_use]
    pub fn deferred(&self) -> &[DeferredOp] {
        &self.deferred
    }

    /// Queue a schema-affecting operation for the next generation.
    pub fn push_deferred(&mut self, op: DeferredOp) -> Result<()> {
        debug!(module = op.module(), "queued deferred schema operation");
        self.deferred.push(op);
        self.persist()
    }

    /// Drop queued operations targeting `module` (cancel-update path).
    pub fn cancel_deferred(&mut self, module: &str) -> Result<usize> {
        let before = self.deferred.len();
        self.deferred.retain(|op| op.module() != module);
        let dropped = before - self.deferred.len();
        if dropped > 0 {
            self.persist()?;
        }
        Ok(dropped)
    }

    /// Materialize a new generation: apply the module-table rewrite
    /// produced by the caller, clear the deferred queue, bump the
    /// generation, compact the extension pool, and atomically swap the
    /// on-disk form.
    pub fn materialize(&mut self, new_modules: Vec<ModuleMeta>) -> Result<Generation> {
        self.modules = new_modules;
        self.deferred.clear();
        self.generation = self.generation.next();
        // A fresh pool for the new generation: only live strings survive.
        self.ext = ExtRegion::new(self.generation);
        self.rewrite_entries()?;
        self.persist()?;
        info!(
            generation = %self.generation,
            ext_bytes = self.ext.len(),
            "materialized new main-region generation"
        );
        Ok(self.generation)
    }

    /// Rewrite module metadata without a generation bump (replay flag,
    /// ownership, permissions — nothing a live schema context depends on).
    ///
    /// The rewrite appends replacement strings and repoints the entries;
    /// superseded pool bytes stay behind as garbage until the next
    /// generation compacts them away.
    pub fn update_meta(&mut self, f: impl FnOnce(&mut Vec<ModuleMeta>)) -> Result<()> {
        f(&mut self.modules);
        self.rewrite_entries()?;
        self.persist()
    }

    /// Re-encode every module into the extension pool.
    fn rewrite_entries(&mut self) -> Result<()> {
        let mut entries = Vec::with_capacity(self.modules.len());
        for meta in &self.modules {
            entries.push(encode_entry(&mut self.ext, meta)?);
        }
        self.entries = entries;
        Ok(())
    }

    /// Re-read the on-disk generation without loading the full region.
    pub fn on_disk_generation(&self) -> Result<Generation> {
        let bytes = fs::read(&self.path)?;
        let gen = read_u64_le_at(&bytes, offsets::GENERATION).ok_or_else(|| {
            StoreError::RegionCorrupt {
                detail: "main region too small for header".to_owned(),
            }
        })?;
        Ok(Generation::new(gen))
    }

    /// Reload self from disk when another process advanced the region.
    pub fn refresh(&mut self) -> Result<bool> {
        let on_disk = self.on_disk_generation()?;
        if on_disk == self.generation {
            return Ok(false);
        }
        debug!(
            old = %self.generation,
            new = %on_disk,
            "main region changed on disk; reloading"
        );
        let fresh = Self::load(&self.path)?;
        *self = fresh;
        Ok(true)
    }

    // --- serialization ---

    /// Serialize the full region: header, fixed-size module entries, the
    /// extension pool, and the deferred queue.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0_u8; offsets::HEADER_SIZE];
        buf[offsets::MAGIC..offsets::MAGIC + offsets::MAGIC_LEN].copy_from_slice(&MAGIC);
        buf[offsets::VERSION..offsets::VERSION + 4].copy_from_slice(&LAYOUT_VERSION.to_le_bytes());
        buf[offsets::CREATOR_PID..offsets::CREATOR_PID + 4]
            .copy_from_slice(&self.creator_pid.to_le_bytes());
        write_u64_le_at(&mut buf, offsets::GENERATION, self.generation.get());
        write_u64_le_at(
            &mut buf,
            offsets::NEXT_EVENT_ID,
            self.next_event_id.load(Ordering::Relaxed),
        );
        buf[offsets::NEXT_SESSION_ID..offsets::NEXT_SESSION_ID + 4]
            .copy_from_slice(&self.next_session_id.load(Ordering::Relaxed).to_le_bytes());
        buf[offsets::NEXT_CONNECTION_ID..offsets::NEXT_CONNECTION_ID + 4]
            .copy_from_slice(&self.next_connection_id.load(Ordering::Relaxed).to_le_bytes());
        let checksum = xxh3_64(&buf[..offsets::GENERATION]);
        write_u64_le_at(&mut buf, offsets::LAYOUT_CHECKSUM, checksum);

        append_u32_le(&mut buf, u32::try_from(self.entries.len()).unwrap_or(0));
        for entry in &self.entries {
            write_entry(&mut buf, entry);
        }
        append_bytes(&mut buf, self.ext.as_bytes());
        append_u32_le(&mut buf, u32::try_from(self.deferred.len()).unwrap_or(0));
        for op in &self.deferred {
            let json = serde_json::to_vec(op).unwrap_or_default();
            append_bytes(&mut buf, &json);
        }
        buf
    }

    fn from_bytes(path: PathBuf, bytes: &[u8]) -> Result<Self> {
        if bytes.len() < offsets::HEADER_SIZE {
            return Err(StoreError::RegionCorrupt {
                detail: format!(
                    "main region is {} bytes, header needs {}",
                    bytes.len(),
                    offsets::HEADER_SIZE
                ),
            });
        }
        if bytes[offsets::MAGIC..offsets::MAGIC + offsets::MAGIC_LEN] != MAGIC {
            return Err(StoreError::RegionCorrupt {
                detail: "bad magic in main region".to_owned(),
            });
        }
        let version = read_u32_le_at(bytes, offsets::VERSION).unwrap_or(0);
        if version != LAYOUT_VERSION {
            return Err(StoreError::RegionCorrupt {
                detail: format!("unsupported main-region layout version {version}"),
            });
        }
        let stored_checksum = read_u64_le_at(bytes, offsets::LAYOUT_CHECKSUM).unwrap_or(0);
        let computed = xxh3_64(&bytes[..offsets::GENERATION]);
        if stored_checksum != computed {
            return Err(StoreError::RegionCorrupt {
                detail: "main-region header checksum mismatch".to_owned(),
            });
        }

        let creator_pid = read_u32_le_at(bytes, offsets::CREATOR_PID).unwrap_or(0);
        let generation =
            Generation::new(read_u64_le_at(bytes, offsets::GENERATION).unwrap_or(0));
        let next_event_id = read_u64_le_at(bytes, offsets::NEXT_EVENT_ID).unwrap_or(1);
        let next_session_id = read_u32_le_at(bytes, offsets::NEXT_SESSION_ID).unwrap_or(1);
        let next_connection_id = read_u32_le_at(bytes, offsets::NEXT_CONNECTION_ID).unwrap_or(1);

        let mut cursor = offsets::HEADER_SIZE;
        let module_count = read_u32_le(bytes, &mut cursor).ok_or_else(body_truncated)?;
        let mut entries = Vec::with_capacity(module_count as usize);
        for _ in 0..module_count {
            entries.push(read_entry(bytes, &mut cursor, generation).ok_or_else(body_truncated)?);
        }
        let ext_bytes = read_bytes(bytes, &mut cursor).ok_or_else(body_truncated)?;
        let ext = ExtRegion::from_bytes(generation, ext_bytes.to_vec());
        let mut modules = Vec::with_capacity(entries.len());
        for entry in &entries {
            modules.push(resolve_entry(&ext, entry)?);
        }

        let deferred_count = read_u32_le(bytes, &mut cursor).ok_or_else(body_truncated)?;
        let mut deferred = Vec::with_capacity(deferred_count as usize);
        for _ in 0..deferred_count {
            let json = read_bytes(bytes, &mut cursor).ok_or_else(body_truncated)?;
            let op: DeferredOp =
                serde_json::from_slice(json).map_err(|e| StoreError::RegionCorrupt {
                    detail: format!("malformed deferred operation: {e}"),
                })?;
            deferred.push(op);
        }

        Ok(Self {
            path,
            generation,
            creator_pid,
            next_event_id: AtomicU64::new(next_event_id),
            next_session_id: AtomicU32::new(next_session_id),
            next_connection_id: AtomicU32::new(next_connection_id),
            entries,
            modules,
            ext,
            deferred,
        })
    }

    /// Write the region to disk: write-to-temp then atomic rename, so an
    /// attaching process never observes a half-written table.
    pub fn persist(&self) -> Result<()> {
        let tmp = self.path.with_extension("shm.tmp");
        fs::write(&tmp, self.to_bytes())?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn body_truncated() -> StoreError {
    StoreError::RegionCorrupt {
        detail: "main region body truncated".to_owned(),
    }
}

/// Compute the content hash for a serialized schema.
#[must_use]
pub fn schema_content_hash(schema_json: &str) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(schema_json.as_bytes());
    hasher.finalize().into()
}
