//! Key-value persistence of named buckets.
//!
//! Each bucket is a JSON object persisted as a unit. Partial writes are
//! shallow-merged into the stored object; full replacement is a separate
//! operation used by bulk "set" actions.

mod models;
mod schema;
mod sqlite_bucket_store;

pub use models::*;
pub use schema::BUCKET_VERSIONED_SCHEMAS;
pub use sqlite_bucket_store::SqliteBucketStore;

use anyhow::Result;

#[cfg_attr(test, mockall::automock)]
pub trait BucketStore: Send + Sync {
    /// Returns the full contents of the bucket, or an empty object if it was never written.
    fn get_namespace(&self, bucket: Bucket) -> Result<BucketContents>;

    /// Shallow-merges `partial` into the stored bucket, creating it if needed.
    fn set_namespace(&self, bucket: Bucket, partial: &BucketContents) -> Result<()>;

    /// Replaces the stored bucket with `contents`.
    fn replace_namespace(&self, bucket: Bucket, contents: &BucketContents) -> Result<()>;

    /// Removes the bucket. Returns whether anything was stored.
    fn clear_namespace(&self, bucket: Bucket) -> Result<bool>;

    /// Buckets that currently hold a value.
    fn list_namespaces(&self) -> Result<Vec<Bucket>>;
}
