use super::models::{shallow_merge, Bucket, BucketContents, BucketStoreError};
use super::schema::BUCKET_VERSIONED_SCHEMAS;
use super::BucketStore;
use crate::sqlite_persistence::{open_in_memory_db, open_versioned_db};
use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

pub struct SqliteBucketStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBucketStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned_db(db_path, BUCKET_VERSIONED_SCHEMAS, "bucket")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = open_in_memory_db(BUCKET_VERSIONED_SCHEMAS)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Bucket store connection mutex is poisoned"))
    }

    fn read_bucket(conn: &Connection, bucket: Bucket) -> Result<Option<BucketContents>> {
        let raw: Option<String> = conn
            .query_row(
                "SELECT contents FROM buckets WHERE name = ?1",
                params![bucket.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        match raw {
            None => Ok(None),
            Some(raw) => {
                let value: Value = serde_json::from_str(&raw)
                    .with_context(|| format!("Bucket {} holds invalid JSON", bucket))?;
                match value {
                    Value::Object(contents) => Ok(Some(contents)),
                    _ => Err(BucketStoreError::NotAnObject(bucket).into()),
                }
            }
        }
    }

    fn write_bucket(conn: &Connection, bucket: Bucket, contents: &BucketContents) -> Result<()> {
        let raw = serde_json::to_string(contents)?;
        conn.execute(
            "INSERT INTO buckets (name, contents, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET contents = ?2, updated_at = ?3",
            params![bucket.as_str(), raw, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

impl BucketStore for SqliteBucketStore {
    fn get_namespace(&self, bucket: Bucket) -> Result<BucketContents> {
        let conn = self.lock()?;
        Ok(Self::read_bucket(&conn, bucket)?.unwrap_or_default())
    }

    fn set_namespace(&self, bucket: Bucket, partial: &BucketContents) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut contents = Self::read_bucket(&tx, bucket)?.unwrap_or_default();
        shallow_merge(&mut contents, partial);
        Self::write_bucket(&tx, bucket, &contents)?;
        tx.commit()?;
        debug!("Merged {} field(s) into bucket {}", partial.len(), bucket);
        Ok(())
    }

    fn replace_namespace(&self, bucket: Bucket, contents: &BucketContents) -> Result<()> {
        let conn = self.lock()?;
        Self::write_bucket(&conn, bucket, contents)?;
        debug!("Replaced bucket {} ({} field(s))", bucket, contents.len());
        Ok(())
    }

    fn clear_namespace(&self, bucket: Bucket) -> Result<bool> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM buckets WHERE name = ?1",
            params![bucket.as_str()],
        )?;
        Ok(deleted > 0)
    }

    fn list_namespaces(&self) -> Result<Vec<Bucket>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT name FROM buckets ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(names
            .into_iter()
            .filter_map(|name| {
                let bucket = Bucket::parse(&name);
                if bucket.is_none() {
                    warn!("Ignoring unknown bucket {:?}", name);
                }
                bucket
            })
            .collect())
    }
}
