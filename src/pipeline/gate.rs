//! Queue plumbing shared by the pipeline stages.
//!
//! A stage is a pool of workers reading from one queue and writing to the
//! next. [`SharedReceiver`] lets every worker of a pool pull from the same
//! bounded queue, and [`StageGate`] closes the downstream queue once the
//! last worker of the pool has exited.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};

/// Receiving end of a queue, shared by all workers of a pool.
pub struct SharedReceiver<T> {
    inner: Arc<Mutex<mpsc::Receiver<T>>>,
}

impl<T> Clone for SharedReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> SharedReceiver<T> {
    pub fn new(rx: mpsc::Receiver<T>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(rx)),
        }
    }

    /// Take the next item.
    ///
    /// Returns `None` once the queue is closed and empty, or as soon as the
    /// run is cancelled. Items still queued at cancellation are dropped.
    pub async fn recv(&self, cancel: &CancellationToken) -> Option<T> {
        let mut rx = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            guard = self.inner.lock() => guard,
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            item = rx.recv() => item,
        }
    }
}

/// Stage completion gate.
///
/// Owns the workers of one stage. [`StageGate::close_when_done`] hands the
/// gate a sender for the downstream queue; the gate drops it only after
/// every worker has exited, so the queue closes exactly when the stage has
/// nothing more to produce. The first worker error cancels the run.
pub struct StageGate {
    stage: &'static str,
    workers: JoinSet<Result<()>>,
    cancel: CancellationToken,
}

impl StageGate {
    pub fn new(stage: &'static str, cancel: CancellationToken) -> Self {
        Self {
            stage,
            workers: JoinSet::new(),
            cancel,
        }
    }

    pub fn spawn<F>(&mut self, worker: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        self.workers.spawn(worker);
    }

    /// Watch the workers in the background and close `downstream` once they
    /// have all exited. Resolves to the first worker error, if any.
    ///
    /// Workers must hold their own clones of `downstream`; the queue closes
    /// when the last clone is dropped.
    pub fn close_when_done<T>(self, downstream: mpsc::Sender<T>) -> JoinHandle<Result<()>>
    where
        T: Send + 'static,
    {
        let Self {
            stage,
            mut workers,
            cancel,
        } = self;

        tokio::spawn(async move {
            let mut first_error: Option<AppError> = None;

            while let Some(joined) = workers.join_next().await {
                let outcome = joined.map_err(AppError::from).and_then(|result| result);
                if let Err(e) = outcome {
                    tracing::error!(stage, error = %e, "Worker failed, cancelling run");
                    cancel.cancel();
                    first_error.get_or_insert(e);
                }
            }

            drop(downstream);
            tracing::debug!(stage, "All workers exited, downstream queue closed");

            match first_error {
                Some(e) => Err(e),
                None => Ok(()),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_gate_closes_downstream_after_all_workers() {
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel::<usize>(4);
        let mut gate = StageGate::new("test", cancel);

        for i in 0..3 {
            let tx = tx.clone();
            gate.spawn(async move {
                tx.send(i).await.ok();
                Ok(())
            });
        }

        let watcher = gate.close_when_done(tx);

        let mut seen = Vec::new();
        while let Some(i) = rx.recv().await {
            seen.push(i);
        }
        seen.sort();
        assert_eq!(seen, vec![0, 1, 2]);
        assert!(watcher.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_gate_reports_first_error_and_cancels() {
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel::<()>(1);
        let mut gate = StageGate::new("test", cancel.clone());

        gate.spawn(async { Err(AppError::GitHubApi("boom".to_string())) });
        let waiter = cancel.clone();
        gate.spawn(async move {
            waiter.cancelled().await;
            Ok(())
        });

        let watcher = gate.close_when_done(tx);
        assert!(rx.recv().await.is_none());

        let err = watcher.await.unwrap().unwrap_err();
        assert!(err.to_string().contains("boom"));
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_shared_receiver_splits_items_between_workers() {
        let (tx, rx) = mpsc::channel::<usize>(2);
        let shared = SharedReceiver::new(rx);
        let cancel = CancellationToken::new();

        let mut handles = Vec::new();
        for _ in 0..2 {
            let shared = shared.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                let mut got = Vec::new();
                while let Some(i) = shared.recv(&cancel).await {
                    got.push(i);
                }
                got
            }));
        }

        for i in 0..10 {
            tx.send(i).await.unwrap();
        }
        drop(tx);

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.await.unwrap());
        }
        all.sort();
        assert_eq!(all, (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_shared_receiver_stops_on_cancel() {
        let (tx, rx) = mpsc::channel::<usize>(2);
        let shared = SharedReceiver::new(rx);
        let cancel = CancellationToken::new();

        tx.send(1).await.unwrap();
        cancel.cancel();

        assert_eq!(shared.recv(&cancel).await, None);
    }
}
