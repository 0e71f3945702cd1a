use super::models::{Collection, Document, DocumentStoreError};
use super::schema::DOCUMENT_VERSIONED_SCHEMAS;
use super::{DocumentStore, DocumentTransaction};
use crate::sqlite_persistence::{open_in_memory_db, open_versioned_db};
use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

pub struct SqliteDocumentStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDocumentStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned_db(db_path, DOCUMENT_VERSIONED_SCHEMAS, "document")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = open_in_memory_db(DOCUMENT_VERSIONED_SCHEMAS)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Document store connection mutex is poisoned"))
    }

    fn parse_row(collection: Collection, uri: &str, raw: &str) -> Result<Document> {
        let value: Value = serde_json::from_str(raw)
            .with_context(|| format!("Record {} in {} holds invalid JSON", uri, collection))?;
        Ok(Document::try_from(value)?)
    }

    fn read_document(
        conn: &Connection,
        collection: Collection,
        uri: &str,
    ) -> Result<Option<Document>> {
        let raw: Option<String> = conn
            .query_row(
                &format!("SELECT data FROM {} WHERE uri = ?1", collection.as_str()),
                params![uri],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|raw| Self::parse_row(collection, uri, &raw))
            .transpose()
    }

    fn write_document(conn: &Connection, collection: Collection, document: &Document) -> Result<()> {
        let uri = document.uri().ok_or(DocumentStoreError::MissingUri)?;
        let data = serde_json::to_string(document)?;
        conn.execute(
            &format!(
                "INSERT INTO {} (uri, name, data, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(uri) DO UPDATE SET name = ?2, data = ?3, updated_at = ?4",
                collection.as_str()
            ),
            params![uri, document.name(), data, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

/// A transaction restricted to the collections it was opened for.
struct ScopedTransaction<'a> {
    conn: &'a Connection,
    scope: &'a [Collection],
}

impl ScopedTransaction<'_> {
    fn check_scope(&self, collection: Collection) -> Result<()> {
        if self.scope.contains(&collection) {
            Ok(())
        } else {
            Err(DocumentStoreError::OutOfScope(collection).into())
        }
    }
}

impl DocumentTransaction for ScopedTransaction<'_> {
    fn get(&mut self, collection: Collection, uri: &str) -> Result<Option<Document>> {
        self.check_scope(collection)?;
        SqliteDocumentStore::read_document(self.conn, collection, uri)
    }

    fn put(&mut self, collection: Collection, document: &Document) -> Result<()> {
        self.check_scope(collection)?;
        SqliteDocumentStore::write_document(self.conn, collection, document)
    }
}

impl DocumentStore for SqliteDocumentStore {
    fn get(&self, collection: Collection, uri: &str) -> Result<Option<Document>> {
        let conn = self.lock()?;
        Self::read_document(&conn, collection, uri)
    }

    fn put(&self, collection: Collection, document: &Document) -> Result<()> {
        let conn = self.lock()?;
        Self::write_document(&conn, collection, document)
    }

    fn all(&self, collection: Collection) -> Result<Vec<Document>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT uri, data FROM {} ORDER BY uri",
            collection.as_str()
        ))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.iter()
            .map(|(uri, raw)| Self::parse_row(collection, uri, raw))
            .collect()
    }

    fn count(&self, collection: Collection) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", collection.as_str()),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn clear(&self, collection: Collection) -> Result<usize> {
        let conn = self.lock()?;
        let deleted = conn.execute(&format!("DELETE FROM {}", collection.as_str()), [])?;
        debug!("Cleared {} record(s) from {}", deleted, collection);
        Ok(deleted)
    }

    fn transaction(
        &self,
        scope: &[Collection],
        work: &mut dyn FnMut(&mut dyn DocumentTransaction) -> Result<()>,
    ) -> Result<()> {
        let mut conn = self.lock()?;
        // Take the write lock up front so concurrent writers queue instead of
        // failing halfway through with SQLITE_BUSY.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        {
            let mut scoped = ScopedTransaction { conn: &tx, scope };
            work(&mut scoped)?;
        }
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn doc(value: Value) -> Document {
        Document::try_from(value).unwrap()
    }

    #[test]
    fn test_put_and_get() {
        let store = SqliteDocumentStore::in_memory().unwrap();
        let album = doc(json!({"uri": "local:album:1", "name": "First"}));
        store.put(Collection::Albums, &album).unwrap();

        assert_eq!(
            store.get(Collection::Albums, "local:album:1").unwrap(),
            Some(album)
        );
        assert_eq!(store.get(Collection::Albums, "local:album:2").unwrap(), None);
        assert_eq!(store.get(Collection::Tracks, "local:album:1").unwrap(), None);
    }

    #[test]
    fn test_put_overwrites_whole_record() {
        let store = SqliteDocumentStore::in_memory().unwrap();
        store
            .put(Collection::Artists, &doc(json!({"uri": "a", "name": "Old", "bio": "x"})))
            .unwrap();
        store
            .put(Collection::Artists, &doc(json!({"uri": "a", "name": "New"})))
            .unwrap();

        let stored = store.get(Collection::Artists, "a").unwrap().unwrap();
        assert_eq!(Value::from(stored), json!({"uri": "a", "name": "New"}));
        assert_eq!(store.count(Collection::Artists).unwrap(), 1);
    }

    #[test]
    fn test_put_without_uri_fails() {
        let store = SqliteDocumentStore::in_memory().unwrap();
        let err = store
            .put(Collection::Albums, &doc(json!({"name": "Nameless"})))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DocumentStoreError>(),
            Some(DocumentStoreError::MissingUri)
        ));
        assert_eq!(store.count(Collection::Albums).unwrap(), 0);
    }

    #[test]
    fn test_all_is_ordered_by_uri() {
        let store = SqliteDocumentStore::in_memory().unwrap();
        for uri in ["c", "a", "b"] {
            store
                .put(Collection::Playlists, &doc(json!({"uri": uri})))
                .unwrap();
        }

        let uris: Vec<String> = store
            .all(Collection::Playlists)
            .unwrap()
            .iter()
            .map(|d| d.uri().unwrap().to_string())
            .collect();
        assert_eq!(uris, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_clear_only_touches_one_collection() {
        let store = SqliteDocumentStore::in_memory().unwrap();
        store.put(Collection::Albums, &doc(json!({"uri": "x"}))).unwrap();
        store.put(Collection::Albums, &doc(json!({"uri": "y"}))).unwrap();
        store.put(Collection::Users, &doc(json!({"uri": "u"}))).unwrap();

        assert_eq!(store.clear(Collection::Albums).unwrap(), 2);
        assert_eq!(store.count(Collection::Albums).unwrap(), 0);
        assert_eq!(store.count(Collection::Users).unwrap(), 1);
    }

    #[test]
    fn test_transaction_commits_all_writes() {
        let store = SqliteDocumentStore::in_memory().unwrap();
        store
            .transaction(&[Collection::Albums], &mut |tx| {
                tx.put(Collection::Albums, &doc(json!({"uri": "1"})))?;
                tx.put(Collection::Albums, &doc(json!({"uri": "2"})))?;
                assert!(tx.get(Collection::Albums, "1")?.is_some());
                Ok(())
            })
            .unwrap();

        assert_eq!(store.count(Collection::Albums).unwrap(), 2);
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let store = SqliteDocumentStore::in_memory().unwrap();
        let result = store.transaction(&[Collection::Albums], &mut |tx| {
            tx.put(Collection::Albums, &doc(json!({"uri": "1"})))?;
            tx.put(Collection::Albums, &doc(json!({"name": "missing uri"})))?;
            Ok(())
        });

        assert!(result.is_err());
        assert_eq!(store.count(Collection::Albums).unwrap(), 0);
    }

    #[test]
    fn test_transaction_rejects_out_of_scope_collection() {
        let store = SqliteDocumentStore::in_memory().unwrap();
        let err = store
            .transaction(&[Collection::Albums], &mut |tx| {
                tx.put(Collection::Albums, &doc(json!({"uri": "1"})))?;
                tx.put(Collection::Tracks, &doc(json!({"uri": "t"})))?;
                Ok(())
            })
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<DocumentStoreError>(),
            Some(DocumentStoreError::OutOfScope(Collection::Tracks))
        ));
        assert_eq!(store.count(Collection::Albums).unwrap(), 0);
        assert_eq!(store.count(Collection::Tracks).unwrap(), 0);
    }

    #[test]
    fn test_records_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("iris.db");
        {
            let store = SqliteDocumentStore::new(&db_path).unwrap();
            store
                .put(Collection::Tracks, &doc(json!({"uri": "t1", "name": "Song"})))
                .unwrap();
        }

        let store = SqliteDocumentStore::new(&db_path).unwrap();
        let track = store.get(Collection::Tracks, "t1").unwrap().unwrap();
        assert_eq!(track.name(), Some("Song"));
    }
}
