//! Collection-oriented document persistence.
//!
//! Records are JSON objects keyed by their `uri`. Reads and writes can be
//! grouped into a transaction scoped to a set of collections; the whole
//! transaction commits or none of it does.

mod models;
mod schema;
mod sqlite_document_store;

pub use models::*;
pub use schema::DOCUMENT_VERSIONED_SCHEMAS;
pub use sqlite_document_store::SqliteDocumentStore;

use anyhow::Result;

/// Read/write access inside a running transaction.
///
/// Touching a collection outside the transaction scope fails with
/// [`DocumentStoreError::OutOfScope`], which aborts the transaction.
pub trait DocumentTransaction {
    fn get(&mut self, collection: Collection, uri: &str) -> Result<Option<Document>>;
    fn put(&mut self, collection: Collection, document: &Document) -> Result<()>;
}

pub trait DocumentStore: Send + Sync {
    fn get(&self, collection: Collection, uri: &str) -> Result<Option<Document>>;

    /// Inserts or fully overwrites the record stored under the document's URI.
    fn put(&self, collection: Collection, document: &Document) -> Result<()>;

    /// Every record of the collection, ordered by URI.
    fn all(&self, collection: Collection) -> Result<Vec<Document>>;

    fn count(&self, collection: Collection) -> Result<usize>;

    /// Deletes every record of the collection. Returns the number removed.
    fn clear(&self, collection: Collection) -> Result<usize>;

    /// Runs `work` inside a read-write transaction spanning `scope`.
    ///
    /// Commits when `work` returns `Ok`; any error, from `work` or from the
    /// commit itself, rolls back every write made inside it. Transactions on
    /// the same store are serialized.
    fn transaction(
        &self,
        scope: &[Collection],
        work: &mut dyn FnMut(&mut dyn DocumentTransaction) -> Result<()>,
    ) -> Result<()>;
}
