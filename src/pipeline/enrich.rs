use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::PolicyConfig;
use crate::error::Result;
use crate::platform::types::{AuthorKind, Notification};
use crate::platform::NotificationService;

use super::gate::SharedReceiver;
use super::NotificationResult;

/// Classify one notification, looking up its pull request when it has one.
pub async fn enrich(
    service: &dyn NotificationService,
    policy: &PolicyConfig,
    notification: Notification,
) -> Result<NotificationResult> {
    let mut result = NotificationResult::new(notification);

    // Only meaningful when read notifications are eligible for deletion
    result.was_read = !result.notification.unread && !policy.skip_read;

    if !result.notification.subject.is_pull_request() {
        return Ok(result);
    }

    let Some(url) = result.notification.subject.url.clone() else {
        tracing::warn!(
            id = %result.notification.id,
            repo = %result.notification.repository,
            "Pull request notification has no subject URL, skipping lookup"
        );
        return Ok(result);
    };

    let pr = service.get_pull_request(&url).await?;
    result.is_bot_authored = pr.author_kind == AuthorKind::Bot;
    result.is_closed_pr = pr.closed;
    result.pull_request = Some(pr);

    Ok(result)
}

/// Enrichment pool worker: drains the input queue until it closes or the
/// run is cancelled.
pub async fn run_worker(
    worker: usize,
    service: Arc<dyn NotificationService>,
    policy: Arc<PolicyConfig>,
    input: SharedReceiver<Notification>,
    output: mpsc::Sender<NotificationResult>,
    cancel: CancellationToken,
) -> Result<()> {
    let mut handled = 0usize;

    while let Some(notification) = input.recv(&cancel).await {
        let result = enrich(service.as_ref(), &policy, notification).await?;
        if output.send(result).await.is_err() {
            tracing::debug!(worker, "Classified queue closed, stopping");
            break;
        }
        handled += 1;
    }

    tracing::debug!(worker, handled, "Enrichment worker finished");
    Ok(())
}
