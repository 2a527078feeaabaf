use super::{merge_patch, stamp_write, take_or_assign_id, DocumentStore};
use crate::document::{id_key, Document, VERSION_FIELD};
use crate::error::{RefGraphError, Result};
use crate::query::Query;
use crate::registry::ModelType;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// A store persisting documents as JSON rows in a SQLite database.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let store = SqliteStore {
            conn: Mutex::new(conn),
        };
        store.initialize_tables()?;
        Ok(store)
    }

    fn initialize_tables(&self) -> Result<()> {
        self.lock()?.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS documents (
                model TEXT NOT NULL,
                id TEXT NOT NULL,
                version INTEGER NOT NULL DEFAULT 0,
                data_json TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (model, id)
            );

            CREATE INDEX IF NOT EXISTS idx_documents_model ON documents(model);
            ",
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| RefGraphError::Store("sqlite connection lock poisoned".into()))
    }

    /// Number of documents stored for `model`.
    pub fn count(&self, model: &str) -> Result<usize> {
        let count: i64 = self.lock()?.query_row(
            "SELECT COUNT(*) FROM documents WHERE model = ?1",
            params![model],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

fn parse_row(data_json: &str) -> Result<Document> {
    match serde_json::from_str::<Value>(data_json)? {
        Value::Object(doc) => Ok(doc),
        other => Err(RefGraphError::Store(format!(
            "stored document is not an object: {other}"
        ))),
    }
}

fn get_by_id(conn: &Connection, model: &str, id: &Value) -> Result<Option<Document>> {
    let data: Option<String> = conn
        .query_row(
            "SELECT data_json FROM documents WHERE model = ?1 AND id = ?2",
            params![model, id_key(id)],
            |row| row.get(0),
        )
        .optional()?;
    data.as_deref().map(parse_row).transpose()
}

fn upsert(conn: &Connection, model: &str, id: &Value, doc: &Document) -> Result<()> {
    let version = doc.get(VERSION_FIELD).and_then(Value::as_i64).unwrap_or(0);
    let data_json = serde_json::to_string(doc)?;
    conn.execute(
        "INSERT INTO documents (model, id, version, data_json) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(model, id) DO UPDATE SET
             version = excluded.version,
             data_json = excluded.data_json,
             updated_at = datetime('now')",
        params![model, id_key(id), version, data_json],
    )?;
    Ok(())
}

#[async_trait::async_trait]
impl DocumentStore for SqliteStore {
    async fn find(&self, model: &ModelType, query: &Query) -> Result<Vec<Document>> {
        let conn = self.lock()?;

        let rows: Vec<String> = match query.id_constraint() {
            Some(ids) if ids.is_empty() => return Ok(Vec::new()),
            Some(ids) => {
                let placeholders = vec!["?"; ids.len()].join(", ");
                let sql = format!(
                    "SELECT data_json FROM documents WHERE model = ? AND id IN ({placeholders}) ORDER BY rowid"
                );
                let mut bind = vec![model.name().to_string()];
                bind.extend(ids.into_iter().map(id_key));
                let mut stmt = conn.prepare(&sql)?;
                let mapped = stmt.query_map(params_from_iter(bind), |row| row.get::<_, String>(0))?;
                let rows = mapped.collect::<std::result::Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT data_json FROM documents WHERE model = ?1 ORDER BY rowid",
                )?;
                let mapped = stmt.query_map(params![model.name()], |row| row.get::<_, String>(0))?;
                let rows = mapped.collect::<std::result::Result<Vec<_>, _>>()?;
                rows
            }
        };

        let mut docs = Vec::new();
        for data_json in &rows {
            let doc = parse_row(data_json)?;
            if query.matches(&doc) {
                docs.push(doc);
            }
        }
        log::trace!("sqlite find {} -> {} row(s)", model.name(), docs.len());
        Ok(docs)
    }

    async fn find_by_id_and_update(
        &self,
        model: &ModelType,
        id: &Value,
        patch: Document,
    ) -> Result<Option<Document>> {
        let conn = self.lock()?;
        let previous = match get_by_id(&conn, model.name(), id)? {
            Some(doc) => doc,
            None => return Ok(None),
        };

        let mut doc = previous.clone();
        merge_patch(&mut doc, patch);
        stamp_write(&mut doc, Some(&previous));
        upsert(&conn, model.name(), id, &doc)?;
        Ok(Some(doc))
    }

    async fn save(&self, model: &ModelType, mut document: Document) -> Result<Document> {
        let id = take_or_assign_id(model, &mut document);
        let conn = self.lock()?;
        let previous = get_by_id(&conn, model.name(), &id)?;
        stamp_write(&mut document, previous.as_ref());
        upsert(&conn, model.name(), &id, &document)?;
        Ok(document)
    }
}
