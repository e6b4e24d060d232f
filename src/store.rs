//! The persistent, memory-mapped store (spec §2, §4.E, §9).
//!
//! `original_source/src/rtl/database.{hpp,cpp}` opens a single memory-mapped
//! file, pre-loads a cache of space pointers at startup, and hands out
//! `ensure_space`/`get_space`/`destroy_space` against that cache — the
//! original's cache is never evicted on `destroy_space`, a latent bug called
//! out in spec §9 and fixed here (`destroy_space` removes the entry from
//! every index, full stop).
//!
//! There is no persistent mmap-backed container anywhere in the teacher
//! repo, so the on-disk layout is grounded instead on
//! `other_examples/6ae3d726_YoKONCy-PEDSA__src-storage.rs.rs`: a fixed
//! header plus a sequence of records, mapped read-write with `memmap2` and
//! cast through `bytemuck` wherever the data is a homogeneous run of fixed-
//! width words (the fingerprint and semantic-vector arrays — the actual "SDM
//! heap" spec emphasizes). The original's "the file IS the heap" model
//! relied on in-place `boost::interprocess` objects and const-cast mutation
//! through the mapping, which spec §9 explicitly flags as unsound to carry
//! forward as-is; this store instead keeps the authoritative working set as
//! plain in-memory [`Space`]s (safe, and exactly the append-only positional
//! arena §9 recommends) and treats the mapped file as a durable *image* of
//! that state: `open` deserializes it in, `flush`/`close` serialize it back
//! out. The mapping is still real — growth, shrink-on-compact and the sanity
//! probe all operate on the live `MmapMut`, not a side file.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use bytemuck::{Pod, Zeroable};
use memmap2::MmapMut;
use parking_lot::{Mutex, RwLock};

use crate::config::{Dimensions, GrowPolicy, StoreOptions};
use crate::error::{Error, Result};
use crate::fingerprint::Fingerprint;
use crate::prng::IndexRandomizer;
use crate::space::Space;
use crate::symbol::Symbol;

const MAGIC: u64 = 0x5344_4D5F_4152_4E41; // "SDM_ARNA"
const FORMAT_VERSION: u32 = 1;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct Header {
    magic: u64,
    version: u32,
    dims_d: u32,
    dims_k: u32,
    _pad: u32,
    used_bytes: u64,
}

/// The embedded store: one backing file, any number of named spaces.
pub struct Store {
    path: PathBuf,
    dims: Dimensions,
    max_size: u64,
    on_out_of_memory: GrowPolicy,
    compact_on_close: bool,
    read_only: bool,
    file: Mutex<File>,
    mmap: Mutex<Option<MmapMut>>,
    capacity: Mutex<u64>,
    spaces: RwLock<std::collections::HashMap<String, Space>>,
    prng: Mutex<IndexRandomizer>,
}

impl Store {
    /// Open (or create) the store's backing file per `options`.
    ///
    /// `options.initial_size == 0` against an existing file opens read-only
    /// (spec §6); against a non-existent file it is an error, since there is
    /// nothing to map.
    pub fn open(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let exists = path.exists();

        if !exists && options.initial_size == 0 {
            return Err(Error::Runtime(format!(
                "cannot open nonexistent store {} with initial_size=0",
                path.display()
            )));
        }

        let read_only = options.initial_size == 0 && exists;

        let file = OpenOptions::new()
            .read(true)
            .write(!read_only)
            .create(!exists)
            .truncate(false)
            .open(&path)?;

        let current_len = file.metadata()?.len();
        if !exists {
            file.set_len(options.initial_size.max(Header::BYTES as u64))?;
        } else if current_len < Header::BYTES as u64 {
            return Err(Error::Runtime(format!(
                "{} is too small to hold a store header",
                path.display()
            )));
        }

        let capacity = file.metadata()?.len();
        let mut mmap = unsafe { MmapMut::map_mut(&file) }.map_err(Error::Io)?;

        let (dims, spaces) = if exists && current_len > Header::BYTES as u64 {
            let header = Header::read_from(&mmap);
            if header.magic != MAGIC {
                return Err(Error::Runtime(format!(
                    "{} is not a valid store file",
                    path.display()
                )));
            }
            let dims = Dimensions::new(header.dims_d, header.dims_k)?;
            let spaces = deserialize_spaces(&mmap[Header::BYTES..], dims)?;
            (dims, spaces)
        } else {
            let dims = options.dimensions;
            if !exists {
                // A brand-new file has no header yet; write one now so
                // `sane()` reports a freshly created empty store as valid
                // rather than reading back an all-zero magic.
                let header = Header {
                    magic: MAGIC,
                    version: FORMAT_VERSION,
                    dims_d: dims.d,
                    dims_k: dims.k,
                    _pad: 0,
                    used_bytes: Header::BYTES as u64,
                };
                mmap[..Header::BYTES].copy_from_slice(bytemuck::bytes_of(&header));
                mmap.flush().map_err(Error::Io)?;
            }
            (dims, std::collections::HashMap::new())
        };

        let store = Self {
            path,
            dims,
            max_size: options.max_size,
            on_out_of_memory: options.on_out_of_memory,
            compact_on_close: options.compact_on_close,
            read_only,
            file: Mutex::new(file),
            mmap: Mutex::new(Some(mmap)),
            capacity: Mutex::new(capacity),
            spaces: RwLock::new(spaces),
            prng: Mutex::new(match options.prng_seed {
                Some(seed) => IndexRandomizer::new(seed),
                None => IndexRandomizer::from_entropy(),
            }),
        };

        tracing::debug!(path = %store.path.display(), d = dims.d, k = dims.k, "store opened");
        Ok(store)
    }

    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        self.dims
    }

    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// All existing space names, in no particular order (spec §4.E).
    pub fn named_spaces(&self) -> Vec<String> {
        self.spaces.read().keys().cloned().collect()
    }

    /// Number of symbols in a space, or `MissingSpace` if it doesn't exist.
    pub fn space_cardinality(&self, space: &str) -> Result<usize> {
        self.spaces
            .read()
            .get(space)
            .map(Space::len)
            .ok_or_else(|| Error::MissingSpace(space.to_string()))
    }

    /// Fetch a space by name without creating it (read-only cache lookup,
    /// spec §4.E).
    pub fn with_space<T>(&self, space: &str, f: impl FnOnce(&Space) -> T) -> Result<T> {
        let guard = self.spaces.read();
        let s = guard
            .get(space)
            .ok_or_else(|| Error::MissingSpace(space.to_string()))?;
        Ok(f(s))
    }

    /// Fetch or create a space, then run `f` against it with write access.
    pub fn with_space_mut<T>(
        &self,
        space: &str,
        f: impl FnOnce(&mut Space) -> T,
    ) -> Result<T> {
        self.ensure_no_read_only()?;
        let mut guard = self.spaces.write();
        let s = guard
            .entry(space.to_string())
            .or_insert_with(|| Space::new(space, self.dims));
        Ok(f(s))
    }

    /// Remove a space and every index pointing into it. Unlike the
    /// original's `destroy_space` (spec §9), this *does* evict the space
    /// from the cache, so a dangling reference can never be handed out
    /// afterwards.
    pub fn destroy_space(&self, space: &str) -> Result<()> {
        self.ensure_no_read_only()?;
        let removed = self.spaces.write().remove(space);
        if removed.is_none() {
            return Err(Error::MissingSpace(space.to_string()));
        }
        tracing::info!(space, "space destroyed");
        Ok(())
    }

    /// Mint a fresh fingerprint from the store's PRNG.
    pub(crate) fn fresh_fingerprint(&self) -> Fingerprint {
        self.prng.lock().shuffle(self.dims)
    }

    fn ensure_no_read_only(&self) -> Result<()> {
        if self.read_only {
            return Err(Error::Runtime(format!(
                "{} is open read-only",
                self.path.display()
            )));
        }
        Ok(())
    }

    /// Current mapped capacity in bytes.
    pub fn size(&self) -> u64 {
        *self.capacity.lock()
    }

    /// Bytes the arena would need to serialize its current contents.
    pub fn used(&self) -> u64 {
        Header::BYTES as u64 + serialized_len(&self.spaces.read())
    }

    pub fn free(&self) -> u64 {
        self.size().saturating_sub(self.used())
    }

    pub fn can_grow(&self) -> bool {
        self.size() < self.max_size
    }

    /// Sanity probe: the header magic still reads back correctly.
    pub fn sane(&self) -> bool {
        match self.mmap.lock().as_ref() {
            Some(mmap) if mmap.len() >= Header::BYTES => Header::read_from(mmap).magic == MAGIC,
            _ => false,
        }
    }

    /// Grow the backing file per `policy`, remap, and update capacity.
    pub fn grow(&self, requested: u64) -> Result<()> {
        self.ensure_no_read_only()?;
        let policy = self.on_out_of_memory;
        let current = self.size();
        let target = match policy {
            GrowPolicy::Fail => {
                return Err(Error::OutOfMemory {
                    requested,
                    available: self.free(),
                })
            }
            GrowPolicy::GrowBy(bytes) => current + bytes.max(requested),
            GrowPolicy::GrowToMax => self.max_size.max(current + requested),
        };
        if target > self.max_size {
            return Err(Error::OutOfMemory {
                requested,
                available: self.free(),
            });
        }
        self.remap_to(target)?;
        tracing::info!(from = current, to = target, "store grown");
        Ok(())
    }

    /// Shrink the file to exactly what the current contents need
    /// (`compact_on_close` / explicit compaction, spec §4.E).
    pub fn compact(&self) -> Result<()> {
        self.ensure_no_read_only()?;
        let needed = self.used().max(Header::BYTES as u64);
        self.remap_to(needed)?;
        tracing::info!(to = needed, "store compacted");
        Ok(())
    }

    fn remap_to(&self, new_len: u64) -> Result<()> {
        let file = self.file.lock();
        file.set_len(new_len)?;
        let mmap = unsafe { MmapMut::map_mut(&*file) }.map_err(Error::Io)?;
        *self.mmap.lock() = Some(mmap);
        *self.capacity.lock() = new_len;
        Ok(())
    }

    /// Serialize the in-memory spaces back into the mapping and flush to
    /// disk. Per spec §7 ("flush only if heap is sane; silently skip if
    /// not"), a failed sanity probe is not an error — it's a silent no-op.
    pub fn flush(&self) -> Result<()> {
        self.ensure_no_read_only()?;
        if !self.sane() {
            tracing::warn!(path = %self.path.display(), "heap failed sanity check, skipping flush");
            return Ok(());
        }
        let spaces = self.spaces.read();
        let needed = Header::BYTES as u64 + serialized_len(&spaces);
        if needed > self.size() {
            drop(spaces);
            self.grow(needed - self.size())?;
        }
        let spaces = self.spaces.read();
        let mut mmap_guard = self.mmap.lock();
        let mmap = mmap_guard
            .as_mut()
            .ok_or_else(|| Error::Runtime("store has no active mapping".into()))?;

        let header = Header {
            magic: MAGIC,
            version: FORMAT_VERSION,
            dims_d: self.dims.d,
            dims_k: self.dims.k,
            _pad: 0,
            used_bytes: needed,
        };
        mmap[..Header::BYTES].copy_from_slice(bytemuck::bytes_of(&header));
        let mut cursor = Header::BYTES;
        serialize_spaces(&spaces, &mut mmap[cursor..]);
        cursor += serialized_len(&spaces) as usize;
        let _ = cursor;
        mmap.flush().map_err(Error::Io)?;
        tracing::debug!(bytes = needed, "store flushed");
        Ok(())
    }

    /// Flush and, if `compact_on_close`, shrink the file to fit before the
    /// store is dropped.
    pub fn close(self) -> Result<()> {
        self.flush()?;
        if self.compact_on_close {
            self.compact()?;
        }
        Ok(())
    }
}

impl Drop for Store {
    /// Spec §3/§7: the durability invariant only holds "provided the
    /// destructor flush completes," and that flush itself only runs "if the
    /// heap is sane." Mirrors `database::~database()`
    /// (`original_source/src/rtl/database.cpp`), which gates its own
    /// destructor flush on `check_heap_sanity()`. A caller that already
    /// called `close()` explicitly just pays for a second, harmless,
    /// idempotent flush here.
    fn drop(&mut self) {
        if self.read_only {
            return;
        }
        if !self.sane() {
            tracing::warn!(
                path = %self.path.display(),
                "heap failed sanity check, skipping destructor flush"
            );
            return;
        }
        if let Err(e) = self.flush() {
            tracing::warn!(path = %self.path.display(), error = %e, "destructor flush failed");
        }
    }
}

impl Header {
    const BYTES: usize = std::mem::size_of::<Header>();

    fn read_from(bytes: &[u8]) -> Self {
        *bytemuck::from_bytes(&bytes[..Self::BYTES])
    }
}

// --- wire format for the space/symbol catalog ----------------------------
//
// A flat byte stream following the header: space_count:u64, then per space
// name_len:u64 + name bytes (padded to 8) + symbol_count:u64, then per
// symbol name_len:u64 + name bytes (padded to 8) + k:u64 + fingerprint
// indices (u32 each, padded to 8) + words:u64 + vector words (u64 each,
// already 8-aligned) + dither:u64 (f32 bits, widened) + refcount:u64 +
// instance:u64. Every length-prefixed field is padded to an 8-byte boundary
// so that the ensuing fixed-width numeric run can, in principle, be cast
// with `bytemuck::cast_slice` without an alignment fault — the corpus's
// `other_examples` PEDSA file follows the same "pad to keep runs aligned"
// convention for its own SoA layout.

fn pad8(n: usize) -> usize {
    (n + 7) & !7
}

fn write_u64(buf: &mut [u8], offset: &mut usize, value: u64) {
    buf[*offset..*offset + 8].copy_from_slice(&value.to_le_bytes());
    *offset += 8;
}

fn read_u64(buf: &[u8], offset: &mut usize) -> u64 {
    let v = u64::from_le_bytes(buf[*offset..*offset + 8].try_into().unwrap());
    *offset += 8;
    v
}

fn write_bytes_padded(buf: &mut [u8], offset: &mut usize, bytes: &[u8]) {
    write_u64(buf, offset, bytes.len() as u64);
    let padded = pad8(bytes.len());
    buf[*offset..*offset + bytes.len()].copy_from_slice(bytes);
    for b in &mut buf[*offset + bytes.len()..*offset + padded] {
        *b = 0;
    }
    *offset += padded;
}

fn read_bytes_padded(buf: &[u8], offset: &mut usize) -> Vec<u8> {
    let len = read_u64(buf, offset) as usize;
    let padded = pad8(len);
    let out = buf[*offset..*offset + len].to_vec();
    *offset += padded;
    out
}

fn serialized_len(spaces: &std::collections::HashMap<String, Space>) -> u64 {
    let mut n = 8u64; // space_count
    for space in spaces.values() {
        n += 8 + pad8(space.name().len()) as u64;
        n += 8; // symbol_count
        for symbol in space.iter() {
            n += 8 + pad8(symbol.name().len()) as u64;
            n += 8 + pad8(symbol.fingerprint().len() * 4) as u64;
            n += 8 + (symbol.vector().len() * 8) as u64;
            n += 8 + 8 + 8; // dither, refcount, instance
        }
    }
    n
}

fn serialize_spaces(spaces: &std::collections::HashMap<String, Space>, out: &mut [u8]) {
    let mut offset = 0usize;
    write_u64(out, &mut offset, spaces.len() as u64);
    for space in spaces.values() {
        write_bytes_padded(out, &mut offset, space.name().as_bytes());
        write_u64(out, &mut offset, space.len() as u64);
        for symbol in space.iter() {
            write_bytes_padded(out, &mut offset, symbol.name().as_bytes());
            let idx_bytes: Vec<u8> = symbol
                .fingerprint()
                .indices()
                .iter()
                .flat_map(|i| i.to_le_bytes())
                .collect();
            write_bytes_padded(out, &mut offset, &idx_bytes);
            let vec_bytes: Vec<u8> = symbol
                .vector()
                .iter()
                .flat_map(|w| w.to_le_bytes())
                .collect();
            write_bytes_padded(out, &mut offset, &vec_bytes);
            write_u64(out, &mut offset, u64::from(symbol.dither().to_bits()));
            write_u64(out, &mut offset, symbol.refcount());
            write_u64(out, &mut offset, symbol.instance());
        }
    }
}

fn deserialize_spaces(
    buf: &[u8],
    dims: Dimensions,
) -> Result<std::collections::HashMap<String, Space>> {
    let mut offset = 0usize;
    let mut out = std::collections::HashMap::new();
    if buf.len() < 8 {
        return Ok(out);
    }
    let space_count = read_u64(buf, &mut offset);
    for _ in 0..space_count {
        let name = String::from_utf8(read_bytes_padded(buf, &mut offset))
            .map_err(|e| Error::Runtime(format!("corrupt space name: {e}")))?;
        let mut space = Space::new(&name, dims);
        let symbol_count = read_u64(buf, &mut offset);
        for _ in 0..symbol_count {
            let sym_name = String::from_utf8(read_bytes_padded(buf, &mut offset))
                .map_err(|e| Error::Runtime(format!("corrupt symbol name: {e}")))?;
            let idx_bytes = read_bytes_padded(buf, &mut offset);
            let indices: Vec<u32> = idx_bytes
                .chunks_exact(4)
                .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
                .collect();
            let vec_bytes = read_bytes_padded(buf, &mut offset);
            let words: Vec<u64> = vec_bytes
                .chunks_exact(8)
                .map(|c| u64::from_le_bytes(c.try_into().unwrap()))
                .collect();
            let dither = f32::from_bits(read_u64(buf, &mut offset) as u32);
            let refcount = read_u64(buf, &mut offset);
            let instance = read_u64(buf, &mut offset);

            let fingerprint = Fingerprint::from_indices(indices);
            let position = space
                .insert_new(&sym_name, fingerprint)
                .expect("freshly deserialized names are unique");
            let sym: &mut Symbol = space.at_mut(position).expect("just inserted");
            sym.set_dither(dither);
            restore_vector(sym, &words);
            for _ in 0..refcount {
                sym.bump_refcount();
            }
            for _ in 0..instance {
                sym.bump_instance();
            }
        }
        out.insert(name, space);
    }
    Ok(out)
}

/// Restore a learned vector into a freshly constructed (all-zero) symbol by
/// re-setting every bit the serialized words carried. Goes through the
/// public bit-level API rather than touching the word array directly so
/// there is exactly one code path that mutates a symbol's vector; this only
/// runs once per symbol at store-open time, never on the learning hot path.
fn restore_vector(sym: &mut Symbol, words: &[u64]) {
    let target_len = sym.vector().len();
    for (word_idx, word) in words.iter().enumerate().take(target_len) {
        for bit in 0..64u32 {
            if word & (1u64 << bit) != 0 {
                sym.set_bits(&[(word_idx as u32) * 64 + bit]);
            }
        }
    }
}
