//! Wires the persistence interceptor in front of a reducer.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use crate::actions::Action;
use crate::bucket_store::BucketStore;
use crate::document_store::DocumentStore;
use crate::interceptor::{InterceptorSettings, PersistenceInterceptor};

/// The next stage after the interceptor: applies actions to in-memory state.
pub trait Reducer: Send {
    fn reduce(&mut self, action: &Action);

    /// Whether the current state asks for every action to be logged.
    fn log_actions(&self) -> bool {
        false
    }
}

pub struct Dispatcher<R: Reducer> {
    reducer: R,
    interceptor: PersistenceInterceptor,
    reports: mpsc::UnboundedReceiver<Action>,
}

impl<R: Reducer> Dispatcher<R> {
    pub fn new(
        reducer: R,
        buckets: Arc<dyn BucketStore>,
        documents: Arc<dyn DocumentStore>,
        settings: InterceptorSettings,
    ) -> Self {
        let (report_tx, report_rx) = mpsc::unbounded_channel();
        Self {
            reducer,
            interceptor: PersistenceInterceptor::new(buckets, documents, report_tx, settings),
            reports: report_rx,
        }
    }

    pub fn dispatch(&mut self, action: Action) {
        self.interceptor.intercept(action, &mut self.reducer);
    }

    /// Dispatches every failure reported so far. Returns how many there were.
    pub fn drain_reports(&mut self) -> usize {
        let mut drained = 0;
        while let Ok(report) = self.reports.try_recv() {
            self.dispatch(report);
            drained += 1;
        }
        if drained > 0 {
            debug!("Dispatched {} failure report(s)", drained);
        }
        drained
    }

    /// Waits for background batches, then dispatches their failure reports.
    pub async fn flush(&mut self) -> usize {
        self.interceptor.wait_idle().await;
        self.drain_reports()
    }

    pub fn reducer(&self) -> &R {
        &self.reducer
    }

    pub fn interceptor(&self) -> &PersistenceInterceptor {
        &self.interceptor
    }

    pub fn into_reducer(self) -> R {
        self.reducer
    }

    /// Finishes queued batches, dispatches their reports, and stops the
    /// batch worker. Returns the reducer.
    pub async fn shutdown(mut self) -> R {
        self.flush().await;
        let Dispatcher {
            mut reducer,
            interceptor,
            mut reports,
        } = self;
        interceptor.shutdown().await;
        // Anything reported after the last flush goes straight to the reducer.
        while let Ok(report) = reports.try_recv() {
            reducer.reduce(&report);
        }
        reducer
    }
}
