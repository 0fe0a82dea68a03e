//! Coherency arbiter: stateless functions comparing cached metadata against a
//! fresh backend snapshot and invalidating stale state. Takes the metadata
//! and block stores by reference rather than owning them (see SPEC_FULL.md
//! §4.C / §9 "Cycle-free ownership").

use tracing::debug;

use crate::block_store::BlockStore;
use crate::error::Result;
use crate::meta_store::{BackendStat, MetaEntry, MetaStore};

/// File metadata is valid iff cached `mtime` and `size` match the backend's.
/// The TTL freshness flag from `meta_lookup` is orthogonal: it controls
/// whether coherency need be re-checked at all, not whether this comparison
/// agrees with the snapshot.
pub fn validate_meta(cached: &MetaEntry, backend: &BackendStat) -> bool {
    cached.mtime == backend.mtime && cached.size == backend.size
}

/// A directory listing is valid iff its cached mtime matches the backend's.
pub fn validate_dir(cached_dir_mtime: i64, backend_mtime: i64) -> bool {
    cached_dir_mtime == backend_mtime
}

/// On a cached-vs-backend mismatch, invalidate the metadata entry and (when a
/// block store is attached) every block cached for `path`. Idempotent: a
/// second call with the same snapshot against an already-invalidated path is
/// a no-op, since `meta_lookup` will simply miss.
pub fn check_and_invalidate(
    meta: &MetaStore,
    block: Option<&BlockStore>,
    path: &str,
    backend_stat: &BackendStat,
) -> Result<()> {
    let Some((cached, _valid)) = meta.meta_lookup(path)? else {
        return Ok(());
    };

    if !validate_meta(&cached, backend_stat) {
        debug!(path, "coherency mismatch, invalidating");
        meta.meta_invalidate(path)?;
        if let Some(block) = block {
            block.block_invalidate_file(path)?;
        }
    }

    Ok(())
}
