//! Iris state persistence library
//!
//! Mirrors actions of a state pipeline into a bucket store and a document
//! store. The modules are public for the binaries and integration tests.

pub mod actions;
pub mod bucket_store;
pub mod config;
pub mod diagnostics;
pub mod document_store;
pub mod interceptor;
pub mod pipeline;
pub mod sqlite_persistence;

// Re-export commonly used types for convenience
pub use actions::Action;
pub use bucket_store::{Bucket, BucketStore, SqliteBucketStore};
pub use diagnostics::Diagnostics;
pub use document_store::{Collection, Document, DocumentStore, SqliteDocumentStore};
pub use interceptor::{InterceptorSettings, PersistenceInterceptor};
pub use pipeline::{Dispatcher, Reducer};
