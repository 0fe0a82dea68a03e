//! End-to-end seed scenarios (spec.md §8, S1-S6), driving the block store,
//! metadata store, and coherency arbiter together the way a filesystem
//! frontend would, against a small in-test fake backend snapshot.

use cachefs::{check_and_invalidate, BackendStat, BlockStore, DirEntry, EntryKind, MetaStore};

struct FakeBackend {
    size: u64,
    mtime: i64,
    contents: Vec<u8>,
}

impl FakeBackend {
    fn stat(&self) -> BackendStat {
        BackendStat {
            is_dir: false,
            size: self.size,
            mtime: self.mtime,
            ctime: self.mtime,
            mode: 0o100644,
            uid: 1000,
            gid: 1000,
            ino: 7,
        }
    }
}

fn populate_block(blocks: &BlockStore, path: &str, idx: u64, backend: &FakeBackend, block_size: u64) {
    let start = (idx * block_size) as usize;
    let end = (start + block_size as usize).min(backend.contents.len());
    let chunk = &backend.contents[start..end];
    blocks.block_write(path, idx, chunk, chunk.len()).unwrap();
}

/// S1: read-miss then hit.
#[test]
fn s1_read_miss_then_hit() {
    let dir = tempfile::tempdir().unwrap();
    let meta = MetaStore::open(dir.path(), 60, 5, false).unwrap();
    let blocks = BlockStore::open(dir.path(), 4, 0, false).unwrap();

    let backend = FakeBackend { size: 8, mtime: 100, contents: b"abcdefgh".to_vec() };

    // getattr: miss -> meta_store
    assert!(meta.meta_lookup("/a").unwrap().is_none());
    meta.meta_store("/a", &backend.stat()).unwrap();

    // read(0, 8): blocks 0 and 1 missing -> populate from backend
    assert!(!blocks.block_exists("/a", 0));
    assert!(!blocks.block_exists("/a", 1));
    populate_block(&blocks, "/a", 0, &backend, 4);
    populate_block(&blocks, "/a", 1, &backend, 4);

    // subsequent read(2, 4) satisfied entirely from cache: bytes 2..6 = "cdef"
    let mut out = Vec::new();
    let mut buf = [0u8; 4];
    let n = blocks.block_read("/a", 0, &mut buf, 4, 2).unwrap();
    out.extend_from_slice(&buf[..n]);
    let mut buf = [0u8; 4];
    let n = blocks.block_read("/a", 1, &mut buf, 2, 0).unwrap();
    out.extend_from_slice(&buf[..n]);
    assert_eq!(out, b"cdef");
}

/// S2: coherency invalidates on a backend change.
#[test]
fn s2_coherency_invalidates() {
    let dir = tempfile::tempdir().unwrap();
    let meta = MetaStore::open(dir.path(), 60, 5, false).unwrap();
    let blocks = BlockStore::open(dir.path(), 4, 0, false).unwrap();

    let old_backend = FakeBackend { size: 8, mtime: 100, contents: b"abcdefgh".to_vec() };
    meta.meta_store("/a", &old_backend.stat()).unwrap();
    populate_block(&blocks, "/a", 0, &old_backend, 4);
    populate_block(&blocks, "/a", 1, &old_backend, 4);

    let new_backend = FakeBackend { size: 4, mtime: 200, contents: b"wxyz".to_vec() };
    check_and_invalidate(&meta, Some(&blocks), "/a", &new_backend.stat()).unwrap();

    assert!(meta.meta_lookup("/a").unwrap().is_none());
    assert!(!blocks.block_exists("/a", 0));
    assert!(!blocks.block_exists("/a", 1));
}

/// S3: LRU eviction under budget.
#[test]
fn s3_lru_eviction_under_budget() {
    let dir = tempfile::tempdir().unwrap();
    let blocks = BlockStore::open(dir.path(), 1024, 3072, false).unwrap();
    let chunk = vec![1u8; 1024];

    blocks.block_write("/p1", 0, &chunk, 1024).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(15));
    blocks.block_write("/p2", 0, &chunk, 1024).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(15));
    blocks.block_write("/p3", 0, &chunk, 1024).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(15));

    // All three fit exactly at 3072. Writing a fourth overshoots budget.
    blocks.block_write("/p4", 0, &chunk, 1024).unwrap();

    assert!(!blocks.block_exists("/p1", 0)); // oldest, evicted
    assert!(blocks.block_exists("/p2", 0));
    assert!(blocks.block_exists("/p3", 0));
    assert!(blocks.block_exists("/p4", 0));
    let (current, _) = blocks.block_get_stats();
    assert!(current <= 3072);
}

/// S4: partial block at file end.
#[test]
fn s4_partial_block_at_file_end() {
    let dir = tempfile::tempdir().unwrap();
    let blocks = BlockStore::open(dir.path(), 4, 0, false).unwrap();

    blocks.block_write("/b", 0, b"abcd", 4).unwrap();
    blocks.block_write("/b", 1, b"ef", 2).unwrap();

    let mut buf = [0u8; 4];
    let n = blocks.block_read("/b", 1, &mut buf, 4, 0).unwrap();
    assert_eq!(n, 2);
    assert_eq!(&buf[..2], b"ef");
}

/// S5: range invalidation.
#[test]
fn s5_range_invalidation() {
    let dir = tempfile::tempdir().unwrap();
    let blocks = BlockStore::open(dir.path(), 10, 0, false).unwrap();

    blocks.block_write("/c", 0, &[1u8; 10], 10).unwrap();
    blocks.block_write("/c", 1, &[2u8; 10], 10).unwrap();
    blocks.block_write("/c", 2, &[3u8; 10], 10).unwrap();
    let (before, _) = blocks.block_get_stats();
    assert_eq!(before, 30);

    blocks.block_invalidate_range("/c", 5, 12).unwrap(); // blocks 0..=1

    assert!(!blocks.block_exists("/c", 0));
    assert!(!blocks.block_exists("/c", 1));
    assert!(blocks.block_exists("/c", 2));
    let (after, _) = blocks.block_get_stats();
    assert_eq!(after, 10);
}

/// S6: negative entry and its TTL.
#[test]
fn s6_negative_entry() {
    let dir = tempfile::tempdir().unwrap();
    let meta = MetaStore::open(dir.path(), 60, 5, false).unwrap();

    meta.meta_store_negative("/missing").unwrap();
    let (entry, valid) = meta.meta_lookup("/missing").unwrap().unwrap();
    assert_eq!(entry.kind, EntryKind::Negative);
    assert!(valid);
}

/// Directory round-trip through the frontend's readdir path: miss, populate,
/// hit, never partial.
#[test]
fn readdir_populate_then_hit() {
    let dir = tempfile::tempdir().unwrap();
    let meta = MetaStore::open(dir.path(), 60, 5, false).unwrap();

    assert!(meta.dir_lookup("/docs").unwrap().is_none());

    let entries = vec![
        DirEntry { name: "a.txt".into(), kind: EntryKind::File },
        DirEntry { name: "sub".into(), kind: EntryKind::Dir },
    ];
    meta.dir_store("/docs", &entries, 42).unwrap();

    let listing = meta.dir_lookup("/docs").unwrap().unwrap();
    assert_eq!(listing.entries.len(), 2);
    assert_eq!(listing.dir_mtime, 42);
    assert!(listing.valid);
}
