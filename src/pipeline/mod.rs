//! The flush pipeline.
//!
//! ```text
//! fetch ─▶ feeder ─▶ [input] ─▶ enrich × N ─▶ [classified] ─▶ delete × N ─▶ [results] ─▶ sink
//! ```
//!
//! Fetching runs to completion before any worker starts. Every queue is
//! bounded to the worker count, so a slow stage throttles the ones before
//! it. Each pool sits behind a [`gate::StageGate`] that closes the next
//! queue once the whole pool has exited.

pub mod delete;
pub mod enrich;
pub mod fetcher;
pub mod gate;


use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::PolicyConfig;
use crate::error::{AppError, Result};
use crate::platform::types::{Notification, PullRequestDetail};
use crate::platform::NotificationService;

use gate::{SharedReceiver, StageGate};

/// Outcome for a single notification.
///
/// Classification flags are set by the enrichment stage and `was_deleted`
/// by the filter-delete stage; none of them is ever cleared. In a dry run
/// `was_deleted` reports what would have been deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationResult {
    pub notification: Notification,
    pub pull_request: Option<PullRequestDetail>,
    pub was_read: bool,
    pub is_bot_authored: bool,
    pub is_closed_pr: bool,
    pub was_deleted: bool,
}

impl NotificationResult {
    pub fn new(notification: Notification) -> Self {
        Self {
            notification,
            pull_request: None,
            was_read: false,
            is_bot_authored: false,
            is_closed_pr: false,
            was_deleted: false,
        }
    }
}

/// Lifecycle of one run. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RunState {
    Idle,
    Fetching,
    Processing,
    /// The sink has seen the end of the results queue; the pipeline tasks
    /// have not been joined yet.
    Draining,
    Finished,
}

/// Orchestrates one run: fetch, then the two worker pools.
pub struct Pipeline {
    service: Arc<dyn NotificationService>,
    policy: Arc<PolicyConfig>,
    cancel: CancellationToken,
    state: RunState,
}

impl Pipeline {
    pub fn new(
        service: Arc<dyn NotificationService>,
        policy: PolicyConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            service,
            policy: Arc::new(policy),
            cancel,
            state: RunState::Idle,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Fetch then process. The returned stream yields the results.
    pub async fn run(mut self) -> Result<ResultStream> {
        let notifications = self.fetch().await?;
        self.process(notifications)
    }

    /// Load the notifications to process.
    pub async fn fetch(&mut self) -> Result<Vec<Notification>> {
        if self.state != RunState::Idle {
            return Err(AppError::Pipeline(format!(
                "Cannot fetch in state {:?}",
                self.state
            )));
        }
        self.state = RunState::Fetching;

        fetcher::fetch_notifications(self.service.as_ref(), &self.policy, &self.cancel).await
    }

    /// Start the feeder, both pools and their gates over `notifications`.
    ///
    /// Must be called from within a tokio runtime.
    /// From here on the run's state is reported by [`ResultStream::state`].
    pub fn process(self, notifications: Vec<Notification>) -> Result<ResultStream> {
        self.policy.validate()?;

        let workers = self.policy.workers;
        let total = notifications.len();

        let (input_tx, input_rx) = mpsc::channel::<Notification>(workers);
        let (classified_tx, classified_rx) = mpsc::channel::<NotificationResult>(workers);
        let (results_tx, results_rx) = mpsc::channel::<NotificationResult>(workers);

        let feeder = spawn_feeder(notifications, input_tx, self.cancel.clone());

        let input = SharedReceiver::new(input_rx);
        let mut enrich_gate = StageGate::new("enrich", self.cancel.clone());
        for worker in 0..workers {
            enrich_gate.spawn(enrich::run_worker(
                worker,
                Arc::clone(&self.service),
                Arc::clone(&self.policy),
                input.clone(),
                classified_tx.clone(),
                self.cancel.clone(),
            ));
        }
        drop(input);

        let classified = SharedReceiver::new(classified_rx);
        let mut delete_gate = StageGate::new("filter-delete", self.cancel.clone());
        for worker in 0..workers {
            delete_gate.spawn(delete::run_worker(
                worker,
                Arc::clone(&self.service),
                Arc::clone(&self.policy),
                classified.clone(),
                results_tx.clone(),
                self.cancel.clone(),
            ));
        }
        drop(classified);

        tracing::info!(
            total,
            workers,
            dry_run = self.policy.dry_run,
            "Processing notifications"
        );

        let enrich_done = enrich_gate.close_when_done(classified_tx);
        let delete_done = delete_gate.close_when_done(results_tx);

        Ok(ResultStream {
            results: results_rx,
            feeder: Some(feeder),
            enrich_done: Some(enrich_done),
            delete_done: Some(delete_done),
            cancel: self.cancel,
            total,
            drained: false,
            finished: false,
        })
    }
}

fn spawn_feeder(
    notifications: Vec<Notification>,
    input: mpsc::Sender<Notification>,
    cancel: CancellationToken,
) -> JoinHandle<Result<()>> {
    tokio::spawn(async move {
        for notification in notifications {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("Run cancelled, no more notifications will be queued");
                    break;
                }
                sent = input.send(notification) => {
                    if sent.is_err() {
                        break;
                    }
                }
            }
        }
        Ok(())
    })
}

/// Pull side of the results queue.
///
/// Read with [`ResultStream::next`] until it returns `None`, then call
/// [`ResultStream::finish`] to learn whether the run succeeded. Dropping the
/// stream before the end cancels the run.
pub struct ResultStream {
    results: mpsc::Receiver<NotificationResult>,
    feeder: Option<JoinHandle<Result<()>>>,
    enrich_done: Option<JoinHandle<Result<()>>>,
    delete_done: Option<JoinHandle<Result<()>>>,
    cancel: CancellationToken,
    total: usize,
    drained: bool,
    finished: bool,
}

impl ResultStream {
    /// Number of notifications that entered the pipeline.
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn state(&self) -> RunState {
        if self.finished {
            RunState::Finished
        } else if self.drained {
            RunState::Draining
        } else {
            RunState::Processing
        }
    }

    /// Next result, or `None` once every worker has exited and the queue is
    /// empty.
    pub async fn next(&mut self) -> Option<NotificationResult> {
        let next = self.results.recv().await;
        if next.is_none() {
            self.drained = true;
        }
        next
    }

    /// Stop the run. Workers finish the notification they hold and no new
    /// ones are picked up; keep calling [`ResultStream::next`] to receive
    /// the results still in flight.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for all pipeline tasks and return the first failure, if any.
    ///
    /// Called before the end of the stream, this cancels the run and
    /// discards the results still in flight, logging any that were deleted.
    pub async fn finish(&mut self) -> Result<()> {
        if !self.drained {
            self.cancel.cancel();

            let mut discarded = 0usize;
            while let Some(result) = self.results.recv().await {
                discarded += 1;
                if result.was_deleted {
                    tracing::warn!(
                        id = %result.notification.id,
                        repo = %result.notification.repository,
                        title = %result.notification.subject.title,
                        "Notification deleted but not reported"
                    );
                }
            }
            self.drained = true;
            tracing::debug!(discarded, "Discarded unread results");
        }

        let mut first_error: Option<AppError> = None;
        for handle in [
            self.feeder.take(),
            self.enrich_done.take(),
            self.delete_done.take(),
        ]
        .into_iter()
        .flatten()
        {
            let outcome = handle.await.map_err(AppError::from).and_then(|r| r);
            if let Err(e) = outcome {
                first_error.get_or_insert(e);
            }
        }

        self.finished = true;
        tracing::debug!(state = ?self.state(), "Run finished");

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for ResultStream {
    fn drop(&mut self) {
        if !self.drained && !self.finished {
            self.cancel.cancel();
        }
    }
}
