//! Metadata store: per-path attribute records and per-directory listings with
//! TTL, persisted in a SQLite database under `cache_root/metadata.db`.
//!
//! Two tables, as specified: `metadata` (one row per path) and `dir_entries`
//! (one row per directory entry, keyed by `(dir_path, entry_name)`). A
//! directory's listing is reconstructed by selecting all `dir_entries` rows
//! for its path, ordered by `entry_name`.

use std::path::Path;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::error::Result;

/// Entry kind, shared between file metadata and directory entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    Negative,
}

impl EntryKind {
    fn to_i64(self) -> i64 {
        match self {
            EntryKind::File => 0,
            EntryKind::Dir => 1,
            EntryKind::Negative => 2,
        }
    }

    fn from_i64(v: i64) -> Self {
        match v {
            1 => EntryKind::Dir,
            2 => EntryKind::Negative,
            _ => EntryKind::File,
        }
    }
}

/// A backend attribute snapshot used to populate a positive metadata entry.
#[derive(Debug, Clone, Copy)]
pub struct BackendStat {
    pub is_dir: bool,
    pub size: u64,
    pub mtime: i64,
    pub ctime: i64,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub ino: u64,
}

/// A cached metadata record.
#[derive(Debug, Clone, PartialEq)]
pub struct MetaEntry {
    pub kind: EntryKind,
    pub size: u64,
    pub mtime: i64,
    pub ctime: i64,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub ino: u64,
    pub cached_at: i64,
    pub valid_until: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
}

#[derive(Debug, Clone)]
pub struct DirListing {
    pub entries: Vec<DirEntry>,
    pub dir_mtime: i64,
    pub valid: bool,
}

fn now_secs() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}

pub struct MetaStore {
    conn: Mutex<Connection>,
    meta_ttl: i64,
    dir_ttl: i64,
    debug: bool,
}

impl MetaStore {
    pub fn open(cache_root: &Path, meta_ttl: i64, dir_ttl: i64, debug: bool) -> Result<Self> {
        std::fs::create_dir_all(cache_root)?;
        let db_path = cache_root.join("metadata.db");
        let conn = Connection::open(db_path)?;

        conn.busy_timeout(std::time::Duration::from_millis(100))?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA temp_store=MEMORY;
             CREATE TABLE IF NOT EXISTS metadata (
                 path TEXT PRIMARY KEY,
                 type INTEGER NOT NULL,
                 size INTEGER NOT NULL,
                 mtime INTEGER NOT NULL,
                 ctime INTEGER NOT NULL,
                 mode INTEGER NOT NULL,
                 uid INTEGER NOT NULL,
                 gid INTEGER NOT NULL,
                 ino INTEGER NOT NULL,
                 cached_at INTEGER NOT NULL,
                 valid_until INTEGER NOT NULL
             );
             CREATE TABLE IF NOT EXISTS dir_entries (
                 dir_path TEXT NOT NULL,
                 entry_name TEXT NOT NULL,
                 entry_type INTEGER NOT NULL,
                 dir_mtime INTEGER NOT NULL,
                 cached_at INTEGER NOT NULL,
                 valid_until INTEGER NOT NULL,
                 PRIMARY KEY (dir_path, entry_name)
             );",
        )?;

        if debug {
            debug!(meta_ttl, dir_ttl, "metadata store initialized");
        }

        Ok(Self {
            conn: Mutex::new(conn),
            meta_ttl,
            dir_ttl,
            debug,
        })
    }

    /// Returns the record if present, with a freshness flag (`now < valid_until`).
    /// Both fresh and stale hits return the record; the caller decides what to do.
    pub fn meta_lookup(&self, path: &str) -> Result<Option<(MetaEntry, bool)>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT type, size, mtime, ctime, mode, uid, gid, ino, cached_at, valid_until
                 FROM metadata WHERE path = ?1",
                params![path],
                |r| {
                    Ok(MetaEntry {
                        kind: EntryKind::from_i64(r.get(0)?),
                        size: r.get::<_, i64>(1)? as u64,
                        mtime: r.get(2)?,
                        ctime: r.get(3)?,
                        mode: r.get::<_, i64>(4)? as u32,
                        uid: r.get::<_, i64>(5)? as u32,
                        gid: r.get::<_, i64>(6)? as u32,
                        ino: r.get::<_, i64>(7)? as u64,
                        cached_at: r.get(8)?,
                        valid_until: r.get(9)?,
                    })
                },
            )
            .optional()?;

        Ok(row.map(|entry| {
            let valid = now_secs() < entry.valid_until;
            (entry, valid)
        }))
    }

    /// Upsert a positive entry from a fresh backend stat.
    pub fn meta_store(&self, path: &str, stat: &BackendStat) -> Result<()> {
        let now = now_secs();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO metadata
             (path, type, size, mtime, ctime, mode, uid, gid, ino, cached_at, valid_until)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                path,
                if stat.is_dir { EntryKind::Dir } else { EntryKind::File }.to_i64(),
                stat.size as i64,
                stat.mtime,
                stat.ctime,
                stat.mode,
                stat.uid,
                stat.gid,
                stat.ino as i64,
                now,
                now + self.meta_ttl,
            ],
        )?;
        if self.debug {
            debug!(path, "metadata stored");
        }
        Ok(())
    }

    /// Store a negative entry ("backend confirmed no entry at this path").
    /// Uses `meta_ttl`, the same TTL as positive entries (see SPEC_FULL.md §4.B).
    pub fn meta_store_negative(&self, path: &str) -> Result<()> {
        let now = now_secs();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO metadata
             (path, type, size, mtime, ctime, mode, uid, gid, ino, cached_at, valid_until)
             VALUES (?1, ?2, 0, 0, 0, 0, 0, 0, 0, ?3, ?4)",
            params![path, EntryKind::Negative.to_i64(), now, now + self.meta_ttl],
        )?;
        if self.debug {
            debug!(path, "negative entry stored");
        }
        Ok(())
    }

    pub fn meta_invalidate(&self, path: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM metadata WHERE path = ?1", params![path])?;
        if self.debug {
            debug!(path, "metadata invalidated");
        }
        Ok(())
    }

    /// Returns the directory's listing in `entry_name` order, with the
    /// shared `dir_mtime`/`valid` taken from the (now-uniform) `valid_until`
    /// column, or `None` on a miss. Never returns a partial listing.
    pub fn dir_lookup(&self, path: &str) -> Result<Option<DirListing>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT entry_name, entry_type, dir_mtime, valid_until
             FROM dir_entries WHERE dir_path = ?1 ORDER BY entry_name",
        )?;
        let mut rows = stmt.query(params![path])?;

        let mut entries = Vec::new();
        let mut dir_mtime = 0i64;
        let mut valid_until = 0i64;
        let mut first = true;
        while let Some(row) = rows.next()? {
            let name: String = row.get(0)?;
            let entry_type: i64 = row.get(1)?;
            if first {
                dir_mtime = row.get(2)?;
                valid_until = row.get(3)?;
                first = false;
            }
            entries.push(DirEntry {
                name,
                kind: EntryKind::from_i64(entry_type),
            });
        }

        if entries.is_empty() {
            return Ok(None);
        }
        Ok(Some(DirListing {
            entries,
            dir_mtime,
            valid: now_secs() < valid_until,
        }))
    }

    /// Atomically replace a directory's listing: delete all rows for `path`,
    /// then insert the new set, all in one transaction, sharing a single
    /// `valid_until` across every row (resolves the "dir listing validity"
    /// open question: see SPEC_FULL.md §9).
    pub fn dir_store(&self, path: &str, entries: &[DirEntry], dir_mtime: i64) -> Result<()> {
        let now = now_secs();
        let valid_until = now + self.dir_ttl;

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM dir_entries WHERE dir_path = ?1", params![path])?;
        for entry in entries {
            tx.execute(
                "INSERT OR REPLACE INTO dir_entries
                 (dir_path, entry_name, entry_type, dir_mtime, cached_at, valid_until)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![path, entry.name, entry.kind.to_i64(), dir_mtime, now, valid_until],
            )?;
        }
        tx.commit()?;

        if self.debug {
            debug!(path, entries = entries.len(), "directory listing stored");
        }
        Ok(())
    }

    pub fn dir_invalidate(&self, path: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM dir_entries WHERE dir_path = ?1", params![path])?;
        if self.debug {
            debug!(path, "directory listing invalidated");
        }
        Ok(())
    }
}
