//! Inspection and cleanup of the persisted state, for tooling only.
//!
//! Nothing in the pipeline holds a [`Diagnostics`]; tools build one from the
//! same stores the interceptor writes to.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::bucket_store::{Bucket, BucketContents, BucketStore};
use crate::document_store::{Collection, Document, DocumentStore};

pub struct Diagnostics {
    buckets: Arc<dyn BucketStore>,
    documents: Arc<dyn DocumentStore>,
}

impl Diagnostics {
    pub fn new(buckets: Arc<dyn BucketStore>, documents: Arc<dyn DocumentStore>) -> Self {
        Self { buckets, documents }
    }

    /// Logs and returns every record of the collection.
    pub fn dump_collection(&self, collection: Collection) -> Result<Vec<Document>> {
        let documents = self.documents.all(collection)?;
        info!("{} holds {} record(s)", collection, documents.len());
        for document in &documents {
            info!("{}: {}", collection, serde_json::to_string(document)?);
        }
        Ok(documents)
    }

    /// Empties the collection. Returns the number of records removed.
    pub fn drop_collection(&self, collection: Collection) -> Result<usize> {
        let removed = self.documents.clear(collection)?;
        info!("Dropped {} record(s) from {}", removed, collection);
        Ok(removed)
    }

    pub fn get_document(&self, collection: Collection, uri: &str) -> Result<Option<Document>> {
        self.documents.get(collection, uri)
    }

    /// Logs and returns the contents of the bucket.
    pub fn dump_bucket(&self, bucket: Bucket) -> Result<BucketContents> {
        let contents = self.buckets.get_namespace(bucket)?;
        info!(
            "{}: {}",
            bucket,
            serde_json::to_string(&contents)?
        );
        Ok(contents)
    }

    /// Removes the bucket. Returns whether it held anything.
    pub fn clear_bucket(&self, bucket: Bucket) -> Result<bool> {
        let cleared = self.buckets.clear_namespace(bucket)?;
        if cleared {
            info!("Cleared bucket {}", bucket);
        } else {
            info!("Bucket {} was already empty", bucket);
        }
        Ok(cleared)
    }

    pub fn list_buckets(&self) -> Result<Vec<Bucket>> {
        self.buckets.list_namespaces()
    }

    /// Record count of every collection, in [`Collection::ALL`] order.
    pub fn collection_counts(&self) -> Result<Vec<(Collection, usize)>> {
        Collection::ALL
            .iter()
            .map(|&collection| Ok((collection, self.documents.count(collection)?)))
            .collect()
    }
}
