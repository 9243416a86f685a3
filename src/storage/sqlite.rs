// src/storage/sqlite.rs

//! SQLite-backed store with create-or-update sync per record kind.
//!
//! Every record kind follows the same shape: look up by natural key, insert
//! with a fresh surrogate id when absent, update only the mutable fields
//! when changed. The `SyncEntity` trait captures that shape once; the four
//! `sync_*` methods only supply the per-kind queries.

use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{BuildingRecord, FloorRecord, PageRecord, ReplyRecord};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS building_record (
    id TEXT PRIMARY KEY,
    bsn INTEGER NOT NULL,
    sna INTEGER NOT NULL,
    building_title TEXT NOT NULL,
    last_page_index INTEGER NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (bsn, sna)
);
CREATE TABLE IF NOT EXISTS page_record (
    pid TEXT PRIMARY KEY,
    bid TEXT NOT NULL,
    page_index INTEGER NOT NULL,
    UNIQUE (bid, page_index),
    FOREIGN KEY (bid) REFERENCES building_record(id)
);
CREATE TABLE IF NOT EXISTS floor_record (
    fid TEXT PRIMARY KEY,
    bid TEXT NOT NULL,
    pid TEXT NOT NULL,
    floor_index INTEGER NOT NULL,
    author_name TEXT NOT NULL,
    author_id TEXT NOT NULL,
    content TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (bid, floor_index),
    FOREIGN KEY (bid) REFERENCES building_record(id)
);
CREATE TABLE IF NOT EXISTS reply_record (
    fid TEXT NOT NULL,
    reply_index INTEGER NOT NULL,
    author_name TEXT NOT NULL,
    author_id TEXT NOT NULL,
    content TEXT NOT NULL,
    PRIMARY KEY (fid, reply_index),
    FOREIGN KEY (fid) REFERENCES floor_record(fid)
);
"#;

/// A persisted row found by natural-key lookup: its surrogate id plus the
/// mutable fields as stored.
struct Existing<F> {
    id: String,
    fields: F,
}

/// The create-or-update shape shared by every record kind.
trait SyncEntity {
    /// Mutable fields as persisted, for change comparison.
    type Fields;

    /// Natural-key lookup; `Ok(None)` is the expected insert branch.
    fn find(&self, conn: &Connection) -> rusqlite::Result<Option<Existing<Self::Fields>>>;

    fn changed(&self, fields: &Self::Fields) -> bool;

    /// Insert, assigning the surrogate id; returns the id.
    fn insert(&self, conn: &Connection) -> rusqlite::Result<String>;

    /// Update strictly the mutable fields; keys and ids are never rewritten.
    fn update(&self, conn: &Connection, id: &str) -> rusqlite::Result<()>;
}

fn upsert<E: SyncEntity>(conn: &Connection, entity: &E) -> Result<String> {
    match entity.find(conn)? {
        None => Ok(entity.insert(conn)?),
        Some(existing) => {
            if entity.changed(&existing.fields) {
                entity.update(conn, &existing.id)?;
            }
            Ok(existing.id)
        }
    }
}

fn fresh_id() -> String {
    Uuid::new_v4().to_string()
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

// --- Per-kind candidates ---

struct BuildingCandidate<'a> {
    building: &'a BuildingRecord,
}

impl SyncEntity for BuildingCandidate<'_> {
    type Fields = (String, u32);

    fn find(&self, conn: &Connection) -> rusqlite::Result<Option<Existing<Self::Fields>>> {
        conn.query_row(
            "SELECT id, building_title, last_page_index FROM building_record
             WHERE bsn = ?1 AND sna = ?2",
            params![self.building.bsn, self.building.sna],
            |row| {
                Ok(Existing {
                    id: row.get(0)?,
                    fields: (row.get(1)?, row.get(2)?),
                })
            },
        )
        .optional()
    }

    fn changed(&self, (title, last_page_index): &Self::Fields) -> bool {
        *title != self.building.title || *last_page_index != self.building.last_page_index
    }

    fn insert(&self, conn: &Connection) -> rusqlite::Result<String> {
        let id = fresh_id();
        conn.execute(
            "INSERT INTO building_record (id, bsn, sna, building_title, last_page_index, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id,
                self.building.bsn,
                self.building.sna,
                self.building.title,
                self.building.last_page_index,
                now(),
            ],
        )?;
        Ok(id)
    }

    fn update(&self, conn: &Connection, id: &str) -> rusqlite::Result<()> {
        conn.execute(
            "UPDATE building_record SET building_title = ?1, last_page_index = ?2, updated_at = ?3
             WHERE id = ?4",
            params![
                self.building.title,
                self.building.last_page_index,
                now(),
                id
            ],
        )?;
        Ok(())
    }
}

struct PageCandidate<'a> {
    bid: &'a str,
    page: &'a PageRecord,
}

impl SyncEntity for PageCandidate<'_> {
    type Fields = ();

    fn find(&self, conn: &Connection) -> rusqlite::Result<Option<Existing<()>>> {
        conn.query_row(
            "SELECT pid FROM page_record WHERE bid = ?1 AND page_index = ?2",
            params![self.bid, self.page.page_index],
            |row| {
                Ok(Existing {
                    id: row.get(0)?,
                    fields: (),
                })
            },
        )
        .optional()
    }

    // A page has no mutable fields; its floor list is rebuilt each scrape.
    fn changed(&self, _fields: &()) -> bool {
        false
    }

    fn insert(&self, conn: &Connection) -> rusqlite::Result<String> {
        let id = fresh_id();
        conn.execute(
            "INSERT INTO page_record (pid, bid, page_index) VALUES (?1, ?2, ?3)",
            params![id, self.bid, self.page.page_index],
        )?;
        Ok(id)
    }

    fn update(&self, _conn: &Connection, _id: &str) -> rusqlite::Result<()> {
        Ok(())
    }
}

struct FloorCandidate<'a> {
    bid: &'a str,
    pid: &'a str,
    floor: &'a FloorRecord,
}

impl SyncEntity for FloorCandidate<'_> {
    type Fields = String;

    fn find(&self, conn: &Connection) -> rusqlite::Result<Option<Existing<String>>> {
        conn.query_row(
            "SELECT fid, content FROM floor_record WHERE bid = ?1 AND floor_index = ?2",
            params![self.bid, self.floor.floor_index],
            |row| {
                Ok(Existing {
                    id: row.get(0)?,
                    fields: row.get(1)?,
                })
            },
        )
        .optional()
    }

    fn changed(&self, content: &String) -> bool {
        *content != self.floor.content
    }

    fn insert(&self, conn: &Connection) -> rusqlite::Result<String> {
        let id = fresh_id();
        conn.execute(
            "INSERT INTO floor_record (fid, bid, pid, floor_index, author_name, author_id, content, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                id,
                self.bid,
                self.pid,
                self.floor.floor_index,
                self.floor.author_name,
                self.floor.author_id,
                self.floor.content,
                now(),
            ],
        )?;
        Ok(id)
    }

    fn update(&self, conn: &Connection, id: &str) -> rusqlite::Result<()> {
        conn.execute(
            "UPDATE floor_record SET content = ?1, updated_at = ?2 WHERE fid = ?3",
            params![self.floor.content, now(), id],
        )?;
        Ok(())
    }
}

struct ReplyCandidate<'a> {
    fid: &'a str,
    reply: &'a ReplyRecord,
}

impl SyncEntity for ReplyCandidate<'_> {
    type Fields = (String, String, String);

    fn find(&self, conn: &Connection) -> rusqlite::Result<Option<Existing<Self::Fields>>> {
        conn.query_row(
            "SELECT author_name, author_id, content FROM reply_record
             WHERE fid = ?1 AND reply_index = ?2",
            params![self.fid, self.reply.reply_index],
            |row| {
                Ok(Existing {
                    // No surrogate: a reply is keyed by its parents.
                    id: self.fid.to_string(),
                    fields: (row.get(0)?, row.get(1)?, row.get(2)?),
                })
            },
        )
        .optional()
    }

    fn changed(&self, (author_name, author_id, content): &Self::Fields) -> bool {
        *author_name != self.reply.author_name
            || *author_id != self.reply.author_id
            || *content != self.reply.content
    }

    fn insert(&self, conn: &Connection) -> rusqlite::Result<String> {
        conn.execute(
            "INSERT INTO reply_record (fid, reply_index, author_name, author_id, content)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                self.fid,
                self.reply.reply_index,
                self.reply.author_name,
                self.reply.author_id,
                self.reply.content,
            ],
        )?;
        Ok(self.fid.to_string())
    }

    fn update(&self, conn: &Connection, _id: &str) -> rusqlite::Result<()> {
        conn.execute(
            "UPDATE reply_record SET author_name = ?1, author_id = ?2, content = ?3
             WHERE fid = ?4 AND reply_index = ?5",
            params![
                self.reply.author_name,
                self.reply.author_id,
                self.reply.content,
                self.fid,
                self.reply.reply_index,
            ],
        )?;
        Ok(())
    }
}

/// Counts from one `sync_building_tree` run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub pages: usize,
    pub floors: usize,
    pub replies: usize,
    pub failures: usize,
}

/// SQLite store; the only writer of durable state.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database file and bootstrap the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // The connection lock is held across lookup+write, so concurrent
    // same-key upserts are serialized.
    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        f(&conn)
    }

    /// Create or refresh the building row; returns its surrogate id.
    pub fn sync_building(&self, building: &BuildingRecord) -> Result<String> {
        self.with_conn(|conn| upsert(conn, &BuildingCandidate { building }))
    }

    /// Create the page row when absent; returns its surrogate id.
    pub fn sync_page(&self, bid: &str, page: &PageRecord) -> Result<String> {
        self.with_conn(|conn| upsert(conn, &PageCandidate { bid, page }))
    }

    /// Create or refresh a floor row; returns its surrogate id.
    pub fn sync_floor(&self, bid: &str, pid: &str, floor: &FloorRecord) -> Result<String> {
        self.with_conn(|conn| upsert(conn, &FloorCandidate { bid, pid, floor }))
    }

    /// Create or refresh a reply row, keyed by (floor, reply index).
    pub fn sync_reply(&self, fid: &str, reply: &ReplyRecord) -> Result<()> {
        self.with_conn(|conn| upsert(conn, &ReplyCandidate { fid, reply }).map(|_| ()))
    }

    /// Sync a whole scraped building: pages in index order, floors in
    /// document order, each floor before its replies (replies reference the
    /// floor's generated id).
    ///
    /// A failed floor skips only its own replies; siblings are still
    /// attempted. A building failure aborts, since every other row needs
    /// its id.
    pub fn sync_building_tree(&self, building: &BuildingRecord) -> Result<SyncOutcome> {
        let bid = self.sync_building(building)?;
        let mut outcome = SyncOutcome::default();

        for page in &building.pages {
            let pid = match self.sync_page(&bid, page) {
                Ok(pid) => pid,
                Err(e) => {
                    log::error!("page {} sync failed: {e}", page.page_index);
                    outcome.failures += 1;
                    continue;
                }
            };
            outcome.pages += 1;

            for floor in &page.floors {
                let fid = match self.sync_floor(&bid, &pid, floor) {
                    Ok(fid) => fid,
                    Err(e) => {
                        log::error!("floor {} sync failed: {e}", floor.floor_index);
                        outcome.failures += 1;
                        continue;
                    }
                };
                outcome.floors += 1;

                for reply in &floor.replies {
                    match self.sync_reply(&fid, reply) {
                        Ok(()) => outcome.replies += 1,
                        Err(e) => {
                            log::error!(
                                "reply {}/{} sync failed: {e}",
                                floor.floor_index,
                                reply.reply_index
                            );
                            outcome.failures += 1;
                        }
                    }
                }
            }
        }

        log::info!(
            "synced building bsn={} snA={}: {} pages, {} floors, {} replies, {} failures",
            building.bsn,
            building.sna,
            outcome.pages,
            outcome.floors,
            outcome.replies,
            outcome.failures
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(index: u32, content: &str) -> ReplyRecord {
        ReplyRecord {
            reply_index: index,
            author_name: "replier".to_string(),
            author_id: "replier01".to_string(),
            content: content.to_string(),
        }
    }

    fn floor(index: u32, content: &str, replies: Vec<ReplyRecord>) -> FloorRecord {
        FloorRecord {
            floor_index: index,
            author_name: "poster".to_string(),
            author_id: "poster01".to_string(),
            content: content.to_string(),
            replies,
        }
    }

    fn building() -> BuildingRecord {
        BuildingRecord {
            bsn: 60076,
            sna: 8292214,
            title: "test building".to_string(),
            last_page_index: 2,
            poster_floor: None,
            pages: vec![
                PageRecord {
                    bsn: 60076,
                    sna: 8292214,
                    page_index: 1,
                    floors: vec![
                        floor(1, "<p>first</p>", vec![reply(0, "hi"), reply(1, "yo")]),
                        floor(2, "<p>second</p>", vec![]),
                    ],
                },
                PageRecord {
                    bsn: 60076,
                    sna: 8292214,
                    page_index: 2,
                    floors: vec![floor(3, "<p>third</p>", vec![])],
                },
            ],
        }
    }

    fn count(store: &SqliteStore, sql: &str) -> i64 {
        store
            .with_conn(|conn| Ok(conn.query_row(sql, [], |row| row.get(0))?))
            .unwrap()
    }

    #[test]
    fn repeated_sync_is_idempotent_and_keeps_ids() {
        let store = SqliteStore::open_in_memory().unwrap();
        let b = building();

        let bid1 = store.sync_building(&b).unwrap();
        let bid2 = store.sync_building(&b).unwrap();
        assert_eq!(bid1, bid2);
        assert_eq!(count(&store, "SELECT COUNT(*) FROM building_record"), 1);
    }

    #[test]
    fn identical_resync_issues_no_write() {
        let store = SqliteStore::open_in_memory().unwrap();
        let b = building();
        store.sync_building(&b).unwrap();

        // Plant a sentinel timestamp; an unchanged candidate must not touch it.
        store
            .with_conn(|conn| {
                conn.execute("UPDATE building_record SET updated_at = 'sentinel'", [])?;
                Ok(())
            })
            .unwrap();

        store.sync_building(&b).unwrap();
        let stamp: String = store
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT updated_at FROM building_record", [], |row| {
                    row.get(0)
                })?)
            })
            .unwrap();
        assert_eq!(stamp, "sentinel");
    }

    #[test]
    fn changed_mutable_fields_update_in_place() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut b = building();

        let bid1 = store.sync_building(&b).unwrap();
        b.title = "renamed".to_string();
        b.last_page_index = 5;
        let bid2 = store.sync_building(&b).unwrap();

        assert_eq!(bid1, bid2);
        let (title, pages): (String, u32) = store
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT building_title, last_page_index FROM building_record",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )?)
            })
            .unwrap();
        assert_eq!(title, "renamed");
        assert_eq!(pages, 5);
    }

    #[test]
    fn floor_edit_preserves_fid_and_rewrites_content() {
        let store = SqliteStore::open_in_memory().unwrap();
        let b = building();
        let bid = store.sync_building(&b).unwrap();
        let pid = store.sync_page(&bid, &b.pages[0]).unwrap();

        let original = floor(1, "<p>before</p>", vec![]);
        let fid1 = store.sync_floor(&bid, &pid, &original).unwrap();

        let edited = floor(1, "<p>after</p>", vec![]);
        let fid2 = store.sync_floor(&bid, &pid, &edited).unwrap();

        assert_eq!(fid1, fid2);
        let content: String = store
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT content FROM floor_record WHERE fid = ?1",
                    params![fid1],
                    |row| row.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(content, "<p>after</p>");
        assert_eq!(count(&store, "SELECT COUNT(*) FROM floor_record"), 1);
    }

    #[test]
    fn reply_upsert_is_keyed_by_floor_and_index() {
        let store = SqliteStore::open_in_memory().unwrap();
        let b = building();
        let bid = store.sync_building(&b).unwrap();
        let pid = store.sync_page(&bid, &b.pages[0]).unwrap();
        let fid = store.sync_floor(&bid, &pid, &b.pages[0].floors[0]).unwrap();

        store.sync_reply(&fid, &reply(0, "hello")).unwrap();
        store.sync_reply(&fid, &reply(0, "hello edited")).unwrap();

        assert_eq!(count(&store, "SELECT COUNT(*) FROM reply_record"), 1);
        let content: String = store
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT content FROM reply_record WHERE fid = ?1 AND reply_index = 0",
                    params![fid],
                    |row| row.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(content, "hello edited");
    }

    #[test]
    fn tree_sync_counts_and_is_idempotent() {
        let store = SqliteStore::open_in_memory().unwrap();
        let b = building();

        let outcome = store.sync_building_tree(&b).unwrap();
        assert_eq!(
            outcome,
            SyncOutcome {
                pages: 2,
                floors: 3,
                replies: 2,
                failures: 0,
            }
        );

        let again = store.sync_building_tree(&b).unwrap();
        assert_eq!(again, outcome);

        assert_eq!(count(&store, "SELECT COUNT(*) FROM building_record"), 1);
        assert_eq!(count(&store, "SELECT COUNT(*) FROM page_record"), 2);
        assert_eq!(count(&store, "SELECT COUNT(*) FROM floor_record"), 3);
        assert_eq!(count(&store, "SELECT COUNT(*) FROM reply_record"), 2);
    }

    #[test]
    fn open_creates_parent_directory() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("nested/dir/building.db");
        let store = SqliteStore::open(&path).unwrap();
        store.sync_building(&building()).unwrap();
        assert!(path.exists());
    }
}
