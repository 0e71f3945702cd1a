//! Persistence interceptor for the action pipeline.
//!
//! Every action is first handed to the next stage (the reducer), so whatever
//! gets persisted reflects the state after the action was applied. Then, for
//! the kinds listed in the dispatch table below, the matching slice of state
//! is written to the bucket store or the document store.
//!
//! Ordering: bucket writes complete before [`PersistenceInterceptor::intercept`]
//! returns. Document batches are queued to a single worker and complete
//! later, so a bucket write issued after a batch may land first. Batches
//! commit one at a time in the order they were dispatched. Use
//! [`PersistenceInterceptor::wait_idle`] to wait for outstanding batches.
//!
//! Failures never propagate to the caller. They are logged and reported as
//! `HANDLE_EXCEPTION` actions on the report channel. Failed writes are not
//! retried.

mod merge_upsert;

pub use merge_upsert::merge_upsert;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use anyhow::{anyhow, Result};
use serde_json::{json, Map, Value};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::actions::{Action, RefreshedToken, UNLOGGED_KINDS};
use crate::bucket_store::{Bucket, BucketContents, BucketStore};
use crate::document_store::{Collection, Document, DocumentStore};
use crate::pipeline::Reducer;

/// Key of the `ui` bucket holding the list of suppressed broadcasts.
pub const SUPPRESSED_BROADCASTS_KEY: &str = "suppressed_broadcasts";

#[derive(Debug, Clone, Default)]
pub struct InterceptorSettings {
    /// Log every action (except loading notifications), regardless of state.
    pub log_actions: bool,
}

enum BatchJob {
    Merge {
        collection: Collection,
        documents: Vec<Document>,
    },
    /// Answered once every job queued before it has finished.
    Barrier(oneshot::Sender<()>),
}

pub struct PersistenceInterceptor {
    buckets: Arc<dyn BucketStore>,
    documents: Arc<dyn DocumentStore>,
    reports: mpsc::UnboundedSender<Action>,
    /// Queue of the batch worker, started on the first batch submitted from
    /// inside a Tokio runtime.
    batch_queue: OnceLock<mpsc::UnboundedSender<BatchJob>>,
    pending: Arc<AtomicUsize>,
    batches: TaskTracker,
    settings: InterceptorSettings,
}

impl PersistenceInterceptor {
    pub fn new(
        buckets: Arc<dyn BucketStore>,
        documents: Arc<dyn DocumentStore>,
        reports: mpsc::UnboundedSender<Action>,
        settings: InterceptorSettings,
    ) -> Self {
        Self {
            buckets,
            documents,
            reports,
            batch_queue: OnceLock::new(),
            pending: Arc::new(AtomicUsize::new(0)),
            batches: TaskTracker::new(),
            settings,
        }
    }

    /// Forwards `action` to `next`, then persists it.
    pub fn intercept(&self, action: Action, next: &mut dyn Reducer) {
        next.reduce(&action);

        if self.settings.log_actions || next.log_actions() {
            log_action(&action);
        }

        self.persist(action);
    }

    /// Number of document batches queued or running.
    pub fn pending_batches(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Waits until every document batch submitted so far has finished.
    pub async fn wait_idle(&self) {
        let Some(queue) = self.batch_queue.get() else {
            return;
        };
        let (done_tx, done_rx) = oneshot::channel();
        if queue.send(BatchJob::Barrier(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    /// Stops accepting batches and waits for the worker to drain its queue.
    pub async fn shutdown(self) {
        let PersistenceInterceptor {
            batch_queue,
            batches,
            ..
        } = self;
        drop(batch_queue);
        batches.close();
        batches.wait().await;
        debug!("Batch worker stopped");
    }

    fn persist(&self, action: Action) {
        let kind = action.kind();
        let result = match action {
            Action::PusherConnected { connection_id } => {
                self.merge(Bucket::Pusher, json!({ "connection_id": connection_id }))
            }
            Action::PusherSetPort { port } => self.merge(Bucket::Pusher, json!({ "port": port })),
            Action::PusherUsernameChanged { username } => {
                self.merge(Bucket::Pusher, json!({ "username": username }))
            }
            Action::MopidyUriSchemesFiltered { data } => {
                self.merge(Bucket::Mopidy, json!({ "uri_schemes": data }))
            }
            Action::SpotifyImportAuthorization {
                authorization,
                data,
            }
            | Action::SpotifyAuthorizationGranted {
                authorization,
                data,
            } => self.store_authorization(kind, authorization.or(data)),
            Action::SpotifyAuthorizationRevoked => self.merge(
                Bucket::Spotify,
                json!({
                    "authorization": false,
                    "access_token": false,
                    "refresh_token": false,
                    "token_expiry": false,
                }),
            ),
            Action::SpotifyTokenRefreshed { data, provider } => {
                self.store_refreshed_token(data, provider)
            }
            Action::SpotifyMeLoaded { data } => self.merge(Bucket::Spotify, json!({ "me": data })),
            Action::CoreSet { data } => self.buckets.replace_namespace(Bucket::Core, &data),
            Action::UiSet { data } => self.buckets.replace_namespace(Bucket::Ui, &data),
            Action::MopidySet { data } => self.buckets.replace_namespace(Bucket::Mopidy, &data),
            Action::SpotifySet { data } => self.buckets.replace_namespace(Bucket::Spotify, &data),
            Action::SuppressBroadcast { key } => self.suppress_broadcast(key),
            Action::LastfmAuthorizationGranted { data } => {
                self.merge(Bucket::Lastfm, json!({ "session": data.session }))
            }
            Action::LastfmAuthorizationRevoked => {
                self.merge(Bucket::Lastfm, json!({ "session": null }))
            }
            Action::DbUpdateAlbums { albums } => {
                self.submit_batch(Collection::Albums, albums);
                Ok(())
            }
            Action::Malformed { kind, error, .. } => {
                report_failure(
                    &self.reports,
                    &format!("Failed to persist {}", kind),
                    anyhow!("malformed payload: {}", error),
                );
                return;
            }
            Action::StartLoading { .. }
            | Action::StopLoading { .. }
            | Action::HandleException { .. }
            | Action::Unrecognized => return,
        };

        if let Err(err) = result {
            report_failure(&self.reports, &format!("Failed to persist {}", kind), err);
        }
    }

    fn merge(&self, bucket: Bucket, partial: Value) -> Result<()> {
        self.buckets.set_namespace(bucket, &into_contents(partial))
    }

    fn store_authorization(&self, kind: &str, authorization: Option<Value>) -> Result<()> {
        let Some(authorization) = authorization else {
            warn!("{} carried no authorization, nothing to store", kind);
            return Ok(());
        };

        let mut partial = Map::new();
        for field in ["access_token", "refresh_token", "token_expiry"] {
            if let Some(value) = authorization.get(field) {
                partial.insert(field.to_string(), value.clone());
            }
        }
        partial.insert("authorization".to_string(), authorization);
        self.buckets.set_namespace(Bucket::Spotify, &partial)
    }

    fn store_refreshed_token(&self, token: RefreshedToken, provider: Option<String>) -> Result<()> {
        let mut partial = Map::new();
        if let Some(access_token) = token.access_token {
            partial.insert("access_token".to_string(), access_token);
        }
        if let Some(token_expiry) = token.token_expiry {
            partial.insert("token_expiry".to_string(), token_expiry);
        }
        if let Some(provider) = provider {
            partial.insert("provider".to_string(), Value::String(provider));
        }
        self.buckets.set_namespace(Bucket::Spotify, &partial)
    }

    fn suppress_broadcast(&self, key: String) -> Result<()> {
        let ui = self.buckets.get_namespace(Bucket::Ui)?;
        let mut suppressed = match ui.get(SUPPRESSED_BROADCASTS_KEY) {
            Some(Value::Array(keys)) => keys.clone(),
            Some(other) => {
                warn!(
                    "Replacing non-list {} value {}",
                    SUPPRESSED_BROADCASTS_KEY, other
                );
                Vec::new()
            }
            None => Vec::new(),
        };
        suppressed.push(Value::String(key));

        let mut partial = Map::new();
        partial.insert(
            SUPPRESSED_BROADCASTS_KEY.to_string(),
            Value::Array(suppressed),
        );
        self.buckets.set_namespace(Bucket::Ui, &partial)
    }

    /// Queues a merge-upsert batch for the worker. Falls back to running it
    /// inline when the worker is not started and there is no Tokio runtime
    /// to start it on.
    fn submit_batch(&self, collection: Collection, documents: Vec<Document>) {
        let queue = match self.batch_queue.get() {
            Some(queue) => queue,
            None => match Handle::try_current() {
                Ok(handle) => self
                    .batch_queue
                    .get_or_init(|| self.spawn_batch_worker(&handle)),
                Err(_) => {
                    debug!("No async runtime available, merging {} inline", collection);
                    run_batch(self.documents.as_ref(), collection, &documents, &self.reports);
                    return;
                }
            },
        };

        self.pending.fetch_add(1, Ordering::SeqCst);
        if queue
            .send(BatchJob::Merge {
                collection,
                documents,
            })
            .is_err()
        {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            report_failure(
                &self.reports,
                &format!("Failed to update {} table", collection),
                anyhow!("batch worker is not running"),
            );
        }
    }

    fn spawn_batch_worker(&self, handle: &Handle) -> mpsc::UnboundedSender<BatchJob> {
        let (queue_tx, mut queue_rx) = mpsc::unbounded_channel::<BatchJob>();
        let store = Arc::clone(&self.documents);
        let reports = self.reports.clone();
        let pending = Arc::clone(&self.pending);

        self.batches.spawn_on(
            async move {
                debug!("Batch worker started");
                while let Some(job) = queue_rx.recv().await {
                    match job {
                        BatchJob::Merge {
                            collection,
                            documents,
                        } => {
                            let store = Arc::clone(&store);
                            let job_reports = reports.clone();
                            let outcome = tokio::task::spawn_blocking(move || {
                                run_batch(store.as_ref(), collection, &documents, &job_reports)
                            })
                            .await;
                            if let Err(err) = outcome {
                                report_failure(
                                    &reports,
                                    &format!("Failed to update {} table", collection),
                                    anyhow::Error::new(err),
                                );
                            }
                            pending.fetch_sub(1, Ordering::SeqCst);
                        }
                        BatchJob::Barrier(done) => {
                            let _ = done.send(());
                        }
                    }
                }
            },
            handle,
        );

        queue_tx
    }
}

fn run_batch(
    store: &dyn DocumentStore,
    collection: Collection,
    documents: &[Document],
    reports: &mpsc::UnboundedSender<Action>,
) {
    match merge_upsert(store, collection, documents) {
        Ok(written) => debug!("Merged {} record(s) into {}", written, collection),
        Err(err) => report_failure(
            reports,
            &format!("Failed to update {} table", collection),
            err.context(format!("batch of {} record(s) rolled back", documents.len())),
        ),
    }
}

fn into_contents(value: Value) -> BucketContents {
    match value {
        Value::Object(contents) => contents,
        _ => BucketContents::new(),
    }
}

fn log_action(action: &Action) {
    if UNLOGGED_KINDS.contains(&action.kind()) {
        return;
    }
    match serde_json::to_string(action) {
        Ok(serialized) => info!("Action {}", serialized),
        Err(_) => info!("Action {:?}", action),
    }
}

fn report_failure(reports: &mpsc::UnboundedSender<Action>, message: &str, err: anyhow::Error) {
    error!("{}: {:#}", message, err);
    if reports.send(Action::exception(message, &err)).is_err() {
        warn!("Report channel closed, dropping failure report: {}", message);
    }
}
