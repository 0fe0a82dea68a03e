//! CacheFS cache engine: a block data cache, a metadata cache, and a
//! coherency arbiter that keeps the two honest against a mutable backend.
//!
//! This crate is the core engine only. A filesystem frontend (translating
//! `open`/`read`/`readdir` into calls here) and a backend adapter (fetching
//! bytes and stats from the authoritative store) are external collaborators
//! and are not implemented by this crate.

pub mod block_store;
pub mod coherency;
pub mod config;
pub mod error;
pub mod meta_store;

pub use block_store::BlockStore;
pub use coherency::check_and_invalidate;
pub use config::EngineConfig;
pub use error::{CacheError, Result};
pub use meta_store::{BackendStat, DirEntry, DirListing, EntryKind, MetaEntry, MetaStore};

/// The two long-lived store handles a frontend needs. Bundled for
/// convenience only — coherency still takes both stores by reference rather
/// than this struct owning the relationship (see SPEC_FULL.md §9).
pub struct Engine {
    pub blocks: BlockStore,
    pub meta: MetaStore,
}

impl Engine {
    pub fn open(config: &EngineConfig) -> Result<Self> {
        let blocks = BlockStore::open(&config.cache_root, config.block_size, config.max_cache_size, config.debug)?;
        let meta = MetaStore::open(&config.cache_root, config.meta_ttl, config.dir_ttl, config.debug)?;
        Ok(Self { blocks, meta })
    }

    /// Convenience wrapper around [`coherency::check_and_invalidate`] using
    /// this engine's own stores.
    pub fn check_and_invalidate(&self, path: &str, backend_stat: &BackendStat) -> Result<()> {
        coherency::check_and_invalidate(&self.meta, Some(&self.blocks), path, backend_stat)
    }
}
