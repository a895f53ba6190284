use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::PolicyConfig;
use crate::error::Result;
use crate::platform::NotificationService;

use super::gate::SharedReceiver;
use super::NotificationResult;

/// Deletion policy. Any satisfied clause deletes the notification.
///
/// Depends only on the classification flags and the policy, so evaluating
/// it again on the same result gives the same answer.
pub fn should_delete(result: &NotificationResult, policy: &PolicyConfig) -> bool {
    (result.is_bot_authored && !policy.skip_bots)
        || (result.is_closed_pr && !policy.skip_closed)
        || (result.was_read && !policy.skip_read)
}

/// Apply the policy to a classified notification and delete it unless this
/// is a dry run.
///
/// `was_deleted` is set the same way in dry runs; only the request is
/// skipped.
pub async fn apply(
    service: &dyn NotificationService,
    policy: &PolicyConfig,
    mut result: NotificationResult,
) -> Result<NotificationResult> {
    if should_delete(&result, policy) {
        result.was_deleted = true;
    }

    if result.was_deleted && !policy.dry_run {
        service.delete_notification(&result.notification.url).await?;
        tracing::info!(
            id = %result.notification.id,
            repo = %result.notification.repository,
            title = %result.notification.subject.title,
            "Deleted notification"
        );
    }

    Ok(result)
}

/// Filter-delete pool worker.
///
/// Results are always forwarded, even during cancellation, so a deletion
/// that went through is never missing from the report.
pub async fn run_worker(
    worker: usize,
    service: Arc<dyn NotificationService>,
    policy: Arc<PolicyConfig>,
    input: SharedReceiver<NotificationResult>,
    output: mpsc::Sender<NotificationResult>,
    cancel: CancellationToken,
) -> Result<()> {
    let mut deleted = 0usize;

    while let Some(result) = input.recv(&cancel).await {
        let result = apply(service.as_ref(), &policy, result).await?;
        if result.was_deleted {
            deleted += 1;
        }
        if output.send(result).await.is_err() {
            tracing::debug!(worker, "Results queue closed, stopping");
            break;
        }
    }

    tracing::debug!(worker, deleted, "Filter-delete worker finished");
    Ok(())
}
