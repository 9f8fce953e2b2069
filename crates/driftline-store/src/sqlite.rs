//! SQLite-backed `StoreBackend`, mirroring `less_db`'s `SqliteBackend`:
//! one `documents` table holding current state, one `changes` table holding
//! the append-only change feed ordered by an autoincrement `seq`.

use std::cell::RefCell;
use std::path::Path;

use parking_lot::ReentrantMutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use crate::error::{Result, StoreError};
use crate::traits::StoreBackend;
use crate::types::{ChangeRecord, Document, Selector};

pub struct SqliteStore {
    conn: ReentrantMutex<RefCell<Connection>>,
}

impl SqliteStore {
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(sqlite_err)?;
        Self::from_connection(conn)
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(sqlite_err)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                deleted INTEGER NOT NULL,
                rev TEXT NOT NULL,
                data TEXT NOT NULL,
                PRIMARY KEY (collection, id)
            );
            CREATE INDEX IF NOT EXISTS idx_documents_updated_at ON documents(updated_at);
            CREATE INDEX IF NOT EXISTS idx_documents_deleted ON documents(deleted);
            CREATE TABLE IF NOT EXISTS changes (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                deleted INTEGER NOT NULL,
                doc TEXT NOT NULL
            );",
        )
        .map_err(sqlite_err)?;

        Ok(Self {
            conn: ReentrantMutex::new(RefCell::new(conn)),
        })
    }

    fn row_to_document(collection: &str, id: &str, created_at: String, updated_at: String, deleted: i64, rev: String, data: String) -> Result<Document> {
        Ok(Document {
            id: id.to_string(),
            collection: collection.to_string(),
            created_at,
            updated_at,
            deleted: deleted != 0,
            rev,
            data: serde_json::from_str(&data)?,
        })
    }

    fn get_locked(conn: &Connection, collection: &str, id: &str) -> Result<Option<Document>> {
        conn.query_row(
            "SELECT created_at, updated_at, deleted, rev, data FROM documents WHERE collection = ?1 AND id = ?2",
            params![collection, id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            },
        )
        .optional()
        .map_err(sqlite_err)?
        .map(|(created_at, updated_at, deleted, rev, data)| {
            Self::row_to_document(collection, id, created_at, updated_at, deleted, rev, data)
        })
        .transpose()
    }

    fn put_locked(conn: &Connection, doc: &Document) -> Result<()> {
        conn.execute(
            "INSERT INTO documents (collection, id, created_at, updated_at, deleted, rev, data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(collection, id) DO UPDATE SET
                updated_at = excluded.updated_at,
                deleted = excluded.deleted,
                rev = excluded.rev,
                data = excluded.data",
            params![
                doc.collection,
                doc.id,
                doc.created_at,
                doc.updated_at,
                doc.deleted as i64,
                doc.rev,
                serde_json::to_string(&doc.data)?,
            ],
        )
        .map_err(sqlite_err)?;

        conn.execute(
            "INSERT INTO changes (collection, id, deleted, doc) VALUES (?1, ?2, ?3, ?4)",
            params![
                doc.collection,
                doc.id,
                doc.deleted as i64,
                serde_json::to_string(doc)?,
            ],
        )
        .map_err(sqlite_err)?;

        Ok(())
    }
}

fn sqlite_err(e: rusqlite::Error) -> StoreError {
    StoreError::Sqlite(e.to_string())
}

impl StoreBackend for SqliteStore {
    fn insert(&self, collection: &str, id: Option<&str>, data: Value) -> Result<Document> {
        let guard = self.conn.lock();
        let conn = guard.borrow();

        let id = id.map(str::to_string).unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        if let Some(existing) = Self::get_locked(&conn, collection, &id)? {
            if !existing.deleted {
                return Err(StoreError::DocumentAlreadyExists {
                    collection: collection.to_string(),
                    id,
                });
            }
        }

        let now = Document::now_iso();
        let doc = Document {
            id,
            collection: collection.to_string(),
            created_at: now.clone(),
            updated_at: now,
            deleted: false,
            rev: Document::next_rev(None),
            data,
        };
        Self::put_locked(&conn, &doc)?;
        Ok(doc)
    }

    fn find_one(&self, collection: &str, field: &str, value: &Value) -> Result<Option<Document>> {
        let selector = Selector::new().eq(field, value.clone());
        Ok(self.find(collection, &selector, Some(1))?.into_iter().next())
    }

    fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let guard = self.conn.lock();
        let conn = guard.borrow();
        Self::get_locked(&conn, collection, id)
    }

    fn find(&self, collection: &str, selector: &Selector, limit: Option<usize>) -> Result<Vec<Document>> {
        let guard = self.conn.lock();
        let conn = guard.borrow();

        let mut stmt = conn
            .prepare("SELECT id, created_at, updated_at, deleted, rev, data FROM documents WHERE collection = ?1 ORDER BY id")
            .map_err(sqlite_err)?;
        let rows = stmt
            .query_map(params![collection], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })
            .map_err(sqlite_err)?;

        let mut results = Vec::new();
        for row in rows {
            let (id, created_at, updated_at, deleted, rev, data) = row.map_err(sqlite_err)?;
            let doc = Self::row_to_document(collection, &id, created_at, updated_at, deleted, rev, data)?;
            if selector.matches(&doc) {
                results.push(doc);
                if let Some(limit) = limit {
                    if results.len() >= limit {
                        break;
                    }
                }
            }
        }
        Ok(results)
    }

    fn patch(&self, collection: &str, id: &str, partial: Value) -> Result<Document> {
        let guard = self.conn.lock();
        let conn = guard.borrow();

        let existing = Self::get_locked(&conn, collection, id)?.ok_or_else(|| StoreError::DocumentNotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        })?;

        let merged_data = match (&existing.data, &partial) {
            (Value::Object(base), Value::Object(patch)) => {
                let mut merged = base.clone();
                for (k, v) in patch {
                    merged.insert(k.clone(), v.clone());
                }
                Value::Object(merged)
            }
            _ => partial,
        };

        let updated = Document {
            updated_at: Document::now_iso(),
            rev: Document::next_rev(Some(&existing.rev)),
            data: merged_data,
            ..existing
        };
        Self::put_locked(&conn, &updated)?;
        Ok(updated)
    }

    fn bulk_insert(&self, collection: &str, docs: Vec<(Option<String>, Value)>) -> Result<Vec<Document>> {
        docs.into_iter()
            .map(|(id, data)| self.insert(collection, id.as_deref(), data))
            .collect()
    }

    fn soft_delete(&self, collection: &str, id: &str) -> Result<Document> {
        let guard = self.conn.lock();
        let conn = guard.borrow();
        let existing = Self::get_locked(&conn, collection, id)?.ok_or_else(|| StoreError::DocumentNotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        })?;
        let updated = Document {
            deleted: true,
            updated_at: Document::now_iso(),
            rev: Document::next_rev(Some(&existing.rev)),
            ..existing
        };
        Self::put_locked(&conn, &updated)?;
        Ok(updated)
    }

    fn changes(&self, collection: &str, since: i64, limit: usize) -> Result<Vec<ChangeRecord>> {
        let guard = self.conn.lock();
        let conn = guard.borrow();

        let mut stmt = conn
            .prepare(
                "SELECT seq, id, deleted, doc FROM changes
                 WHERE collection = ?1 AND seq > ?2 ORDER BY seq LIMIT ?3",
            )
            .map_err(sqlite_err)?;
        let rows = stmt
            .query_map(params![collection, since, limit as i64], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .map_err(sqlite_err)?;

        let mut out = Vec::new();
        for row in rows {
            let (seq, id, deleted, doc_json) = row.map_err(sqlite_err)?;
            out.push(ChangeRecord {
                seq,
                collection: collection.to_string(),
                id,
                deleted: deleted != 0,
                doc: serde_json::from_str(&doc_json)?,
            });
        }
        Ok(out)
    }

    fn count(&self, collection: &str) -> Result<usize> {
        let guard = self.conn.lock();
        let conn = guard.borrow();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM documents WHERE collection = ?1 AND deleted = 0",
                params![collection],
                |row| row.get(0),
            )
            .map_err(sqlite_err)?;
        Ok(count as usize)
    }

    fn transaction(&self, f: &mut dyn FnMut() -> Result<()>) -> Result<()> {
        let guard = self.conn.lock();
        let conn = guard.borrow();
        conn.execute_batch("BEGIN").map_err(sqlite_err)?;

        match f() {
            Ok(()) => {
                conn.execute_batch("COMMIT").map_err(sqlite_err)?;
                Ok(())
            }
            Err(err) => {
                conn.execute_batch("ROLLBACK").map_err(sqlite_err)?;
                Err(err)
            }
        }
    }
}
