//! SQLite message store.
//!
//! One writer connection and one reader connection, each behind an async mutex and used from
//! blocking threads. WAL journaling lets reads proceed while a write is in flight.
//! Each row keeps the full record as JSON plus the columns needed for lookup and ordering.
//!
//! The store timeout bounds only the wait for a connection. Once a statement has been handed
//! to a blocking thread it runs to completion (bounded by SQLite's busy timeout), so a
//! `Timeout` error always means nothing was written.

use async_trait::async_trait;
use rusqlite::{params, Connection, ErrorCode, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{MessageStore, StoreError};
use crate::message::Message;

const SCHEMA_VERSION: i64 = 1;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SqliteMessageStore {
    path: PathBuf,
    writer: Arc<Mutex<Connection>>,
    reader: Arc<Mutex<Connection>>,
    timeout: Duration,
}

impl SqliteMessageStore {
    /// Open (creating if needed) the database at `path` and ensure the schema exists.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Self::open_with_timeout(path, DEFAULT_TIMEOUT)
    }

    /// As `open`, with `timeout` bounding both the wait for a connection and SQLite's busy wait.
    pub fn open_with_timeout(path: &Path, timeout: Duration) -> Result<Self, StoreError> {
        if path.as_os_str().is_empty() {
            return Err(StoreError::Io("store path must not be empty".to_string()));
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Io(e.to_string()))?;
        }
        let mut writer = open_connection(path, timeout)?;
        initialize_schema(&mut writer)?;
        let reader = open_connection(path, timeout)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: Arc::new(Mutex::new(writer)),
            reader: Arc::new(Mutex::new(reader)),
            timeout,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait for a connection; giving up here is always safe because no work has started.
    async fn acquire(
        &self,
        conn: &Arc<Mutex<Connection>>,
    ) -> Result<OwnedMutexGuard<Connection>, StoreError> {
        tokio::time::timeout(self.timeout, conn.clone().lock_owned())
            .await
            .map_err(|_| StoreError::Timeout(self.timeout))
    }
}

fn db_err(err: rusqlite::Error) -> StoreError {
    StoreError::Db(err.to_string())
}

fn open_connection(path: &Path, timeout: Duration) -> Result<Connection, StoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(path, flags).map_err(db_err)?;
    connection
        .execute_batch("PRAGMA journal_mode = WAL;")
        .map_err(db_err)?;
    connection
        .execute_batch("PRAGMA synchronous = NORMAL;")
        .map_err(db_err)?;
    connection
        .busy_timeout(timeout)
        .map_err(db_err)?;
    Ok(connection)
}

/// Create tables on first open; refuse databases written by a newer schema.
fn initialize_schema(connection: &mut Connection) -> Result<(), StoreError> {
    let tx = connection.transaction().map_err(db_err)?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(db_err)?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| {
            row.get(0)
        })
        .optional()
        .map_err(db_err)?;
    match version {
        None => {
            tx.execute(
                "INSERT INTO store_meta (version) VALUES (?1)",
                params![SCHEMA_VERSION],
            )
            .map_err(db_err)?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS messages (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    id TEXT NOT NULL UNIQUE,
                    received_at_us INTEGER NOT NULL,
                    from_email TEXT NOT NULL,
                    record_json TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_messages_recent
                    ON messages (received_at_us DESC, seq DESC);",
            )
            .map_err(db_err)?;
        }
        Some(v) if v == SCHEMA_VERSION => {}
        Some(v) => {
            return Err(StoreError::Db(format!(
                "unsupported store schema version {} (expected {})",
                v, SCHEMA_VERSION
            )));
        }
    }
    tx.commit().map_err(db_err)
}

fn decode(json: String) -> Result<Message, StoreError> {
    serde_json::from_str(&json).map_err(|e| StoreError::Corrupt(e.to_string()))
}

/// Run `f` on a blocking thread with an already-acquired connection. The task is detached from
/// the caller, so dropping the returned future does not stop `f`.
async fn run_blocking<T, F>(mut conn: OwnedMutexGuard<Connection>, f: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&mut *conn))
        .await
        .map_err(|e| StoreError::Io(format!("store task failed: {}", e)))?
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn insert(&self, message: &Message) -> Result<(), StoreError> {
        let json = serde_json::to_string(message).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let id = message.id.clone();
        let received_at_us = message.received_at.timestamp_micros();
        let from_email = message.from_email.clone();
        let conn = self.acquire(&self.writer).await?;
        run_blocking(conn, move |conn| {
            let result = conn.execute(
                "INSERT INTO messages (id, received_at_us, from_email, record_json)
                 VALUES (?1, ?2, ?3, ?4)",
                params![id, received_at_us, from_email, json],
            );
            match result {
                Ok(_) => Ok(()),
                Err(rusqlite::Error::SqliteFailure(err, _))
                    if err.code == ErrorCode::ConstraintViolation =>
                {
                    Err(StoreError::Conflict(id))
                }
                Err(err) => Err(db_err(err)),
            }
        })
        .await
    }

    async fn get(&self, id: &str) -> Result<Option<Message>, StoreError> {
        let id = id.to_string();
        let conn = self.acquire(&self.reader).await?;
        let json: Option<String> = run_blocking(conn, move |conn| {
            conn.query_row(
                "SELECT record_json FROM messages WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)
        })
        .await?;
        json.map(decode).transpose()
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<Message>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let conn = self.acquire(&self.reader).await?;
        let rows: Vec<String> = run_blocking(conn, move |conn| {
            let mut stmt = conn
                .prepare_cached(
                    "SELECT record_json FROM messages
                     ORDER BY received_at_us DESC, seq DESC
                     LIMIT ?1",
                )
                .map_err(db_err)?;
            let rows = stmt
                .query_map(params![limit], |row| row.get::<_, String>(0))
                .map_err(db_err)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(db_err)?;
            Ok(rows)
        })
        .await?;
        rows.into_iter().map(decode).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{build_fallback, classify_output};
    use crate::message::Envelope;
    use chrono::{Duration, TimeZone, Utc};

    fn envelope(text: &str) -> Envelope {
        Envelope {
            from_raw: "Jane <jane@x.com>".to_string(),
            from_email: "jane@x.com".to_string(),
            subject: "Pickup".to_string(),
            raw_text: text.to_string(),
        }
    }

    fn open_temp() -> (tempfile::TempDir, SqliteMessageStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteMessageStore::open(&dir.path().join("nested").join("messages.db")).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn round_trip_is_field_for_field_equal() {
        let (_dir, store) = open_temp();
        let fields = classify_output(
            r#"{"summary":"Pickup time change requested","responseNeeded":true,
                "neededToKnow":["Pickup at 5pm"],
                "replyOptions":{"boundary":"Noted.","cooperative":"Yes, 5pm works."},
                "flags":[{"type":"pressure","severity":2}],
                "dates":["2024-05-03"],"requestedChanges":[{"what":"pickup","to":"17:00"}]}"#,
        );
        let m = Message::new(envelope("Can you get him at 5?"), fields);
        store.insert(&m).await.unwrap();
        let back = store.get(&m.id).await.unwrap();
        assert_eq!(back.as_ref(), Some(&m));
        let listed = store.list_recent(10).await.unwrap();
        assert_eq!(listed, vec![m]);
    }

    #[tokio::test]
    async fn duplicate_insert_is_conflict_and_keeps_original() {
        let (_dir, store) = open_temp();
        let m = Message::new(envelope("one"), build_fallback("", "", "one", "ai_error"));
        store.insert(&m).await.unwrap();
        let mut dup = m.clone();
        dup.raw_text = "changed".to_string();
        assert!(matches!(store.insert(&dup).await, Err(StoreError::Conflict(_))));
        assert_eq!(store.get(&m.id).await.unwrap().unwrap().raw_text, "one");
    }

    #[tokio::test]
    async fn listing_is_descending_by_received_at() {
        let (_dir, store) = open_temp();
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let mut inserted = Vec::new();
        for i in 0..5 {
            let text = format!("message {}", i);
            let m = Message::with_time(
                envelope(&text),
                build_fallback("", "", &text, "ai_error"),
                base + Duration::minutes(i),
            );
            store.insert(&m).await.unwrap();
            inserted.push(m.id);
        }
        let listed: Vec<String> = store
            .list_recent(3)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        inserted.reverse();
        assert_eq!(listed, inserted[..3].to_vec());
    }

    #[tokio::test]
    async fn equal_timestamps_list_later_insertion_first() {
        let (_dir, store) = open_temp();
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let mut ids = Vec::new();
        for text in ["first", "second", "third"] {
            let m = Message::with_time(envelope(text), build_fallback("", "", text, "ai_error"), at);
            store.insert(&m).await.unwrap();
            ids.push(m.id);
        }
        let later = Message::with_time(
            envelope("later"),
            build_fallback("", "", "later", "ai_error"),
            at + Duration::seconds(1),
        );
        store.insert(&later).await.unwrap();

        let listed: Vec<String> = store
            .list_recent(10)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(
            listed,
            vec![later.id, ids[2].clone(), ids[1].clone(), ids[0].clone()]
        );
    }

    #[tokio::test]
    async fn write_timeout_persists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteMessageStore::open_with_timeout(
            &dir.path().join("messages.db"),
            std::time::Duration::from_millis(50),
        )
        .unwrap();
        let busy = store.writer.clone().lock_owned().await;
        let m = Message::new(envelope("late"), build_fallback("", "", "late", "ai_error"));
        assert!(matches!(store.insert(&m).await, Err(StoreError::Timeout(_))));

        drop(busy);
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert!(store.list_recent(10).await.unwrap().is_empty());
        store.insert(&m).await.unwrap();
        assert_eq!(store.list_recent(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn ingest_failing_on_store_timeout_leaves_no_record() {
        use crate::llm::{Classifier, ClassifyError};
        use crate::pipeline::{InboundRequest, IngestError, IngestionPipeline, PipelineOptions};
        use async_trait::async_trait;

        struct Canned;

        #[async_trait]
        impl Classifier for Canned {
            fn name(&self) -> &str {
                "canned"
            }

            async fn classify(&self, _from: &str, _subject: &str, _text: &str)
                -> Result<String, ClassifyError> {
                Ok(r#"{"summary":"ok"}"#.to_string())
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            SqliteMessageStore::open_with_timeout(
                &dir.path().join("messages.db"),
                std::time::Duration::from_millis(50),
            )
            .unwrap(),
        );
        let pipeline =
            IngestionPipeline::new(Arc::new(Canned), store.clone(), PipelineOptions::default());

        let busy = store.writer.clone().lock_owned().await;
        let result = pipeline
            .ingest(InboundRequest {
                from: "jane@x.com".to_string(),
                subject: "Pickup".to_string(),
                text: "Can you get him at 5?".to_string(),
            })
            .await;
        assert!(matches!(
            result,
            Err(IngestError::Store(StoreError::Timeout(_)))
        ));

        drop(busy);
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert!(store.list_recent(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reopen_keeps_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("messages.db");
        let m = Message::new(envelope("persist me"), build_fallback("", "", "persist me", "ai_error"));
        {
            let store = SqliteMessageStore::open(&path).unwrap();
            store.insert(&m).await.unwrap();
        }
        let store = SqliteMessageStore::open(&path).unwrap();
        assert_eq!(store.path(), path.as_path());
        let found = store.get(&m.id).await.unwrap();
        assert_eq!(found, Some(m));
    }
}
