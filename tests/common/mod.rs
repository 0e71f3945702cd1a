//! Common test infrastructure
//!
//! Builds a full pipeline over on-disk stores in a temporary directory, so
//! tests can dispatch actions, reopen the databases, and inspect what was
//! persisted.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::TestPipeline;
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let mut pipeline = TestPipeline::open();
//!     pipeline.dispatch_json(r#"{"type": "PUSHER_SET_PORT", "port": 6681}"#);
//!     pipeline.dispatcher.flush().await;
//! }
//! ```

#![allow(dead_code)]

use std::sync::Arc;

use iris_persistence::config::{AppConfig, CliConfig};
use iris_persistence::{
    Action, Bucket, BucketStore, Collection, Diagnostics, Dispatcher, Document, DocumentStore,
    InterceptorSettings, Reducer, SqliteBucketStore, SqliteDocumentStore,
};
use serde_json::Value;
use tempfile::TempDir;

/// Reducer that remembers every action it was handed, in order.
#[derive(Default)]
pub struct RecordingReducer {
    pub seen: Vec<Action>,
}

impl RecordingReducer {
    pub fn kinds(&self) -> Vec<&'static str> {
        self.seen.iter().map(Action::kind).collect()
    }

    pub fn exceptions(&self) -> Vec<(String, String)> {
        self.seen
            .iter()
            .filter_map(|action| match action {
                Action::HandleException {
                    message,
                    description,
                } => Some((message.clone(), description.clone())),
                _ => None,
            })
            .collect()
    }
}

impl Reducer for RecordingReducer {
    fn reduce(&mut self, action: &Action) {
        self.seen.push(action.clone());
    }
}

pub struct TestPipeline {
    pub dispatcher: Dispatcher<RecordingReducer>,
    pub buckets: Arc<SqliteBucketStore>,
    pub documents: Arc<SqliteDocumentStore>,
    pub config: AppConfig,
    _temp_dir: TempDir,
}

impl TestPipeline {
    pub fn open() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let cli = CliConfig {
            db_dir: Some(temp_dir.path().to_path_buf()),
            log_actions: true,
        };
        let config = AppConfig::resolve(&cli, None).expect("Failed to resolve config");
        Self::with_config(config, temp_dir)
    }

    fn with_config(config: AppConfig, temp_dir: TempDir) -> Self {
        let buckets = Arc::new(
            SqliteBucketStore::new(config.bucket_db_path()).expect("Failed to open bucket store"),
        );
        let documents = Arc::new(
            SqliteDocumentStore::new(config.document_db_path())
                .expect("Failed to open document store"),
        );
        let dispatcher = Dispatcher::new(
            RecordingReducer::default(),
            buckets.clone(),
            documents.clone(),
            config.interceptor_settings(),
        );
        Self {
            dispatcher,
            buckets,
            documents,
            config,
            _temp_dir: temp_dir,
        }
    }

    /// Drops the stores and opens the same database files again.
    pub async fn reopen(mut self) -> Self {
        self.dispatcher.flush().await;
        let Self {
            dispatcher,
            buckets,
            documents,
            config,
            _temp_dir,
        } = self;
        drop(dispatcher);
        drop(buckets);
        drop(documents);
        Self::with_config(config, _temp_dir)
    }

    pub fn dispatch_json(&mut self, raw: &str) {
        self.dispatcher.dispatch(Action::from_json_lenient(raw));
    }

    pub fn dispatch_value(&mut self, value: Value) {
        let action = serde_json::from_value(value).expect("Invalid test action");
        self.dispatcher.dispatch(action);
    }

    pub fn bucket(&self, bucket: Bucket) -> Value {
        Value::Object(self.buckets.get_namespace(bucket).expect("Bucket read failed"))
    }

    pub fn album(&self, uri: &str) -> Option<Value> {
        self.documents
            .get(Collection::Albums, uri)
            .expect("Album read failed")
            .map(Value::from)
    }

    pub fn diagnostics(&self) -> Diagnostics {
        Diagnostics::new(self.buckets.clone(), self.documents.clone())
    }

    pub fn interceptor_settings(&self) -> InterceptorSettings {
        self.config.interceptor_settings()
    }
}

pub fn document(value: Value) -> Document {
    Document::try_from(value).expect("Test document must be an object")
}
