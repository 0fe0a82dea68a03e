//! Block data cache: fixed-size file content chunks keyed by `(path, block_index)`,
//! stored under a hash-partitioned directory tree with size-bounded LRU eviction.
//!
//! On-disk layout: `cache_root/blocks/XX/YY/HHHHHHHHHHHHHHHH-IDX`, where `XX`/`YY`
//! are the top two bytes of a DJB2 hash of the path and `HHHHHHHHHHHHHHHH` is its
//! full 64-bit hex. Two distinct paths can hash to the same `(XX, YY, hash, idx)`
//! triple; each block file carries an 8-byte FNV-1a trailer of its owning path so
//! a collision is detected as a miss on read instead of serving aliased bytes.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

use tracing::{debug, warn};

use crate::error::{CacheError, Result};

pub const DEFAULT_BLOCK_SIZE: u64 = 262_144;
const TRAILER_LEN: u64 = 8;

/// DJB2 hash over raw path bytes, as specified: `h = 5381; h = ((h<<5)+h)+c`.
fn djb2_hash(path: &str) -> u64 {
    let mut hash: u64 = 5381;
    for &b in path.as_bytes() {
        hash = hash.wrapping_shl(5).wrapping_add(hash).wrapping_add(b as u64);
    }
    hash
}

/// FNV-1a hash over the full path, used only as an aliasing trailer — a
/// second, independent hash so a DJB2 collision is very unlikely to also
/// collide here.
fn fnv1a_hash(path: &str) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
    let mut hash = OFFSET_BASIS;
    for &b in path.as_bytes() {
        hash ^= b as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

struct BlockInfo {
    path: PathBuf,
    atime: SystemTime,
    size: u64,
}

/// Size-bounded, LRU-evicted on-disk block cache.
pub struct BlockStore {
    blocks_dir: PathBuf,
    block_size: u64,
    max_cache_size: u64,
    current_cache_size: Mutex<u64>,
    debug: bool,
}

impl BlockStore {
    /// Open (creating if absent) the block store rooted at `cache_root/blocks`.
    /// Walks the existing tree once to establish `current_cache_size`.
    pub fn open(cache_root: &Path, block_size: u64, max_cache_size: u64, debug: bool) -> Result<Self> {
        let blocks_dir = cache_root.join("blocks");
        fs::create_dir_all(&blocks_dir)?;
        set_mode(&blocks_dir, 0o700);

        let block_size = if block_size == 0 { DEFAULT_BLOCK_SIZE } else { block_size };

        let store = Self {
            blocks_dir,
            block_size,
            max_cache_size,
            current_cache_size: Mutex::new(0),
            debug,
        };

        let current = store.scan_all_blocks()?.iter().map(|b| b.size).sum();
        *store.current_cache_size.lock().unwrap() = current;

        if debug {
            debug!(
                blocks_dir = %store.blocks_dir.display(),
                block_size,
                max_cache_size,
                current,
                "block store initialized"
            );
        }

        Ok(store)
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    fn bucket_dir(&self, hash: u64) -> PathBuf {
        let h1 = (hash >> 8) & 0xFF;
        let h2 = hash & 0xFF;
        self.blocks_dir.join(format!("{:02x}", h1)).join(format!("{:02x}", h2))
    }

    fn block_path(&self, path: &str, block_idx: u64) -> PathBuf {
        let hash = djb2_hash(path);
        self.bucket_dir(hash).join(format!("{:016x}-{}", hash, block_idx))
    }

    pub fn block_exists(&self, path: &str, block_idx: u64) -> bool {
        if path.is_empty() {
            return false;
        }
        let block_path = self.block_path(path, block_idx);
        match fs::metadata(&block_path) {
            Ok(meta) => meta.len() >= TRAILER_LEN && self.trailer_matches(&block_path, path),
            Err(_) => false,
        }
    }

    fn trailer_matches(&self, block_path: &Path, path: &str) -> bool {
        let mut file = match File::open(block_path) {
            Ok(f) => f,
            Err(_) => return false,
        };
        let mut trailer = [0u8; TRAILER_LEN as usize];
        if file.seek(SeekFrom::End(-(TRAILER_LEN as i64))).is_err() {
            return false;
        }
        if file.read_exact(&mut trailer).is_err() {
            return false;
        }
        u64::from_le_bytes(trailer) == fnv1a_hash(path)
    }

    /// Positional read of up to `size` bytes at `offset` within the block.
    /// Returns the number of bytes read (short reads at block end are legitimate).
    pub fn block_read(&self, path: &str, block_idx: u64, buf: &mut [u8], size: usize, offset: u64) -> Result<usize> {
        if path.is_empty() {
            return Err(CacheError::Input("path must not be empty".into()));
        }
        if size > buf.len() {
            return Err(CacheError::Input("size exceeds buffer length".into()));
        }
        let block_path = self.block_path(path, block_idx);
        let mut file = File::open(&block_path).map_err(|_| CacheError::NotFound)?;

        let total_len = file.metadata()?.len();
        if total_len < TRAILER_LEN {
            return Err(CacheError::NotFound);
        }
        let payload_len = total_len - TRAILER_LEN;

        if !self.trailer_matches(&block_path, path) {
            if self.debug {
                warn!(path, block_idx, "block trailer mismatch, treating as miss");
            }
            return Err(CacheError::NotFound);
        }

        if offset >= payload_len {
            return Ok(0);
        }
        let want = (size as u64).min(payload_len - offset) as usize;
        file.seek(SeekFrom::Start(offset))?;
        let n = file.read(&mut buf[..want])?;

        if self.debug && n > 0 {
            debug!(path, block_idx, bytes_read = n, "block read");
        }
        Ok(n)
    }

    /// Write `buf[0..size]` as the contents of this block, replacing any prior
    /// contents. Triggers eviction to the low-water mark if this write pushes
    /// `current_cache_size` over `max_cache_size`.
    pub fn block_write(&self, path: &str, block_idx: u64, buf: &[u8], size: usize) -> Result<()> {
        if path.is_empty() {
            return Err(CacheError::Input("path must not be empty".into()));
        }
        if size > buf.len() {
            return Err(CacheError::Input("size exceeds buffer length".into()));
        }

        let block_path = self.block_path(path, block_idx);
        if let Some(bucket2) = block_path.parent() {
            fs::create_dir_all(bucket2)?;
            set_mode(bucket2, 0o700);
            if let Some(bucket1) = bucket2.parent() {
                set_mode(bucket1, 0o700);
            }
        }

        // Subtract any prior block's size before overwriting, so re-writing an
        // existing block doesn't double-count it against the budget.
        let prior_size = fs::metadata(&block_path).map(|m| m.len().saturating_sub(TRAILER_LEN)).unwrap_or(0);

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&block_path)?;
        file.write_all(&buf[..size])?;
        file.write_all(&fnv1a_hash(path).to_le_bytes())?;
        drop(file);
        set_mode(&block_path, 0o600);

        {
            let mut current = self.current_cache_size.lock().unwrap();
            *current = current.saturating_sub(prior_size) + size as u64;

            if self.max_cache_size > 0 && *current > self.max_cache_size {
                let target = (self.max_cache_size as f64 * 0.9).floor() as u64;
                self.evict_locked(&mut current, target)?;
            }
        }

        if self.debug {
            debug!(path, block_idx, size, "block write");
        }
        Ok(())
    }

    /// Invalidate every block file in `[floor(start/block_size), floor((start+len)/block_size)]`.
    pub fn block_invalidate_range(&self, path: &str, start_offset: u64, length: u64) -> Result<()> {
        if path.is_empty() {
            return Err(CacheError::Input("path must not be empty".into()));
        }
        if length == 0 {
            return Ok(());
        }
        let start_block = start_offset / self.block_size;
        let end_block = (start_offset + length) / self.block_size;

        let mut removed = 0u64;
        for idx in start_block..=end_block {
            let block_path = self.block_path(path, idx);
            if let Ok(meta) = fs::metadata(&block_path) {
                if fs::remove_file(&block_path).is_ok() {
                    removed += meta.len().saturating_sub(TRAILER_LEN);
                }
            }
        }
        if removed > 0 {
            let mut current = self.current_cache_size.lock().unwrap();
            *current = current.saturating_sub(removed);
        }
        if self.debug {
            debug!(path, start_block, end_block, "block range invalidated");
        }
        Ok(())
    }

    /// Remove every block belonging to `path` by scanning its hash bucket.
    pub fn block_invalidate_file(&self, path: &str) -> Result<()> {
        if path.is_empty() {
            return Err(CacheError::Input("path must not be empty".into()));
        }
        let hash = djb2_hash(path);
        let bucket = self.bucket_dir(hash);
        let prefix = format!("{:016x}-", hash);

        let mut removed = 0u64;
        if let Ok(read_dir) = fs::read_dir(&bucket) {
            for entry in read_dir.flatten() {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                if name.starts_with('.') || !name.starts_with(&prefix) {
                    continue;
                }
                if let Ok(meta) = entry.metadata() {
                    if fs::remove_file(entry.path()).is_ok() {
                        removed += meta.len().saturating_sub(TRAILER_LEN);
                    }
                }
            }
        }
        if removed > 0 {
            let mut current = self.current_cache_size.lock().unwrap();
            *current = current.saturating_sub(removed);
        }
        if self.debug {
            debug!(path, "file invalidated");
        }
        Ok(())
    }

    pub fn block_get_stats(&self) -> (u64, u64) {
        (*self.current_cache_size.lock().unwrap(), self.max_cache_size)
    }

    /// Full three-level directory walk (`XX/YY/file`), skipping dotfiles,
    /// recording `(path, atime, size)` for every block file found.
    fn scan_all_blocks(&self) -> Result<Vec<BlockInfo>> {
        let mut blocks = Vec::new();
        let Ok(level1) = fs::read_dir(&self.blocks_dir) else {
            return Ok(blocks);
        };
        for l1 in level1.flatten() {
            if starts_with_dot(&l1.file_name()) || !l1.path().is_dir() {
                continue;
            }
            let Ok(level2) = fs::read_dir(l1.path()) else { continue };
            for l2 in level2.flatten() {
                if starts_with_dot(&l2.file_name()) || !l2.path().is_dir() {
                    continue;
                }
                let Ok(level3) = fs::read_dir(l2.path()) else { continue };
                for file in level3.flatten() {
                    if starts_with_dot(&file.file_name()) {
                        continue;
                    }
                    let Ok(meta) = file.metadata() else { continue };
                    if !meta.is_file() {
                        continue;
                    }
                    let atime = meta.accessed().unwrap_or(SystemTime::UNIX_EPOCH);
                    blocks.push(BlockInfo {
                        path: file.path(),
                        atime,
                        size: meta.len().saturating_sub(TRAILER_LEN),
                    });
                }
            }
        }
        Ok(blocks)
    }

    /// Evict oldest-accessed blocks (stable sort ascending by atime) until
    /// `current - evicted <= target`. Called with the cache-size lock held.
    fn evict_locked(&self, current: &mut u64, target: u64) -> Result<()> {
        let mut blocks = self.scan_all_blocks()?;
        blocks.sort_by(|a, b| a.atime.cmp(&b.atime));

        let mut evicted_size = 0u64;
        let mut evicted_count = 0u64;
        for block in &blocks {
            if current.saturating_sub(evicted_size) <= target {
                break;
            }
            match fs::remove_file(&block.path) {
                Ok(()) => {
                    evicted_size += block.size;
                    evicted_count += 1;
                }
                Err(_) => continue, // external removal or permission error: skip, don't double-count
            }
        }

        *current = current.saturating_sub(evicted_size);

        if self.debug && evicted_count > 0 {
            debug!(evicted_count, evicted_size, current = *current, target, "block eviction completed");
        }
        Ok(())
    }
}

fn starts_with_dot(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    let _ = fs::set_permissions(path, fs::Permissions::from_mode(mode));
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) {}
