use super::store::{CacheEntry, CacheRecord, CacheStore};
use crate::error::CacheError;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

/// Embedded-database cache store; one row per source file.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, CacheError> {
        if let Some(parent) = db_path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self, CacheError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, CacheError> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_tables()?;
        Ok(store)
    }

    fn initialize_tables(&self) -> Result<(), CacheError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute(
            "CREATE TABLE IF NOT EXISTS module_cache (
                path TEXT PRIMARY KEY,
                skip INTEGER NOT NULL DEFAULT 0,
                byte_length INTEGER,
                name TEXT,
                module_type TEXT,
                cached_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;
        Ok(())
    }

    fn row_to_record(key: &str, row: &Row) -> rusqlite::Result<Result<CacheRecord, CacheError>> {
        let skip: bool = row.get(0)?;
        if skip {
            return Ok(Ok(CacheRecord::Skip));
        }

        let byte_length: Option<i64> = row.get(1)?;
        let name: Option<String> = row.get(2)?;
        let module_type: Option<String> = row.get(3)?;
        let cached_at: String = row.get(4)?;

        let corrupt = |reason: &str| CacheError::Corrupt {
            key: key.to_string(),
            reason: reason.to_string(),
        };

        let record = match (byte_length, name, module_type) {
            (Some(len), Some(name), Some(module_type)) if len >= 0 => {
                match chrono::DateTime::parse_from_rfc3339(&cached_at) {
                    Ok(at) => Ok(CacheRecord::Module(CacheEntry {
                        byte_length: len as u64,
                        name,
                        module_type,
                        cached_at: at.with_timezone(&chrono::Utc),
                    })),
                    Err(_) => Err(corrupt("unparseable timestamp")),
                }
            }
            _ => Err(corrupt("incomplete module row")),
        };
        Ok(record)
    }
}

impl CacheStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<CacheRecord>, CacheError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let mut stmt = conn.prepare(
            "SELECT skip, byte_length, name, module_type, cached_at
             FROM module_cache WHERE path = ?1",
        )?;

        let record = stmt
            .query_row(params![key], |row| Self::row_to_record(key, row))
            .optional()?;

        record.transpose()
    }

    fn put(&self, key: &str, record: &CacheRecord) -> Result<(), CacheError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        match record {
            CacheRecord::Module(entry) => {
                conn.execute(
                    "INSERT OR REPLACE INTO module_cache
                     (path, skip, byte_length, name, module_type, cached_at)
                     VALUES (?1, 0, ?2, ?3, ?4, ?5)",
                    params![
                        key,
                        entry.byte_length as i64,
                        entry.name,
                        entry.module_type,
                        entry.cached_at.to_rfc3339(),
                    ],
                )?;
            }
            CacheRecord::Skip => {
                conn.execute(
                    "INSERT OR REPLACE INTO module_cache
                     (path, skip, byte_length, name, module_type, cached_at)
                     VALUES (?1, 1, NULL, NULL, NULL, ?2)",
                    params![key, chrono::Utc::now().to_rfc3339()],
                )?;
            }
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, CacheError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let removed = conn.execute("DELETE FROM module_cache WHERE path = ?1", params![key])?;
        Ok(removed > 0)
    }

    fn clear(&self) -> Result<(), CacheError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute("DELETE FROM module_cache", [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_sqlite_store_round_trips_records() {
        let store = SqliteStore::in_memory().unwrap();
        let key = "/music/dope.mod";
        let entry = CacheEntry {
            byte_length: 4242,
            name: "dope".to_string(),
            module_type: "Protracker (M.K.)".to_string(),
            cached_at: Utc::now(),
        };

        assert_eq!(store.get(key).unwrap(), None);
        store.put(key, &CacheRecord::Module(entry.clone())).unwrap();
        assert_eq!(store.get(key).unwrap(), Some(CacheRecord::Module(entry)));

        store.put(key, &CacheRecord::Skip).unwrap();
        assert_eq!(store.get(key).unwrap(), Some(CacheRecord::Skip));

        assert!(store.remove(key).unwrap());
        assert_eq!(store.get(key).unwrap(), None);
    }

    #[test]
    fn test_sqlite_store_flags_incomplete_rows() {
        let store = SqliteStore::in_memory().unwrap();
        {
            let conn = store.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO module_cache (path, skip, byte_length) VALUES ('/x.xm', 0, 12)",
                [],
            )
            .unwrap();
        }
        assert!(matches!(store.get("/x.xm"), Err(CacheError::Corrupt { .. })));
    }

    #[test]
    fn test_sqlite_store_persists_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("nested").join("cache.db");
        {
            let store = SqliteStore::new(&db).unwrap();
            store.put("/a.it", &CacheRecord::Skip).unwrap();
        }
        let reopened = SqliteStore::new(&db).unwrap();
        assert_eq!(reopened.get("/a.it").unwrap(), Some(CacheRecord::Skip));
        reopened.clear().unwrap();
        assert_eq!(reopened.get("/a.it").unwrap(), None);
    }
}
