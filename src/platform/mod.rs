pub mod github;
pub mod types;

use async_trait::async_trait;

use crate::error::Result;
use types::*;

/// The remote notification service the pipeline talks to.
///
/// Implementations must be safe to call concurrently from every worker of
/// both pools; the pipeline shares a single instance behind an `Arc`.
#[async_trait]
pub trait NotificationService: Send + Sync {
    /// List one page of notifications, read ones included, newest first.
    ///
    /// `cursor` is `None` for the first page and otherwise the `next`
    /// reference returned with the previous page.
    async fn list_notifications(&self, cursor: Option<&str>) -> Result<NotificationPage>;

    /// Fetch the pull request a notification subject points at.
    async fn get_pull_request(&self, url: &str) -> Result<PullRequestDetail>;

    /// Delete (mark as done) a notification thread.
    async fn delete_notification(&self, url: &str) -> Result<()>;
}
