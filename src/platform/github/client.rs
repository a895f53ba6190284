use async_trait::async_trait;
use octocrab::Octocrab;

use crate::config::GitHubConfig;
use crate::error::{AppError, Result};
use crate::platform::types::*;
use crate::platform::NotificationService;

use super::mapper::{self, PullRequestResponse};

/// GitHub REST implementation of [`NotificationService`].
///
/// Octocrab clients are cheap to clone and safe to share, so one instance
/// serves every worker.
pub struct GitHubService {
    client: Octocrab,
    notifications_url: String,
}

impl GitHubService {
    pub fn new(config: &GitHubConfig) -> Result<Self> {
        let token = config.resolve_token()?;

        let client = Octocrab::builder()
            .base_uri(config.api_url.as_str())
            .map_err(|e| AppError::Config(format!("Invalid GitHub API URL: {e}")))?
            .personal_token(token)
            .build()
            .map_err(|e| AppError::GitHubApi(format!("Failed to build octocrab client: {e}")))?;

        Ok(Self {
            client,
            notifications_url: format!(
                "{}/notifications?all=true",
                config.api_url.trim_end_matches('/')
            ),
        })
    }
}

#[async_trait]
impl NotificationService for GitHubService {
    async fn list_notifications(&self, cursor: Option<&str>) -> Result<NotificationPage> {
        let url = cursor.unwrap_or(self.notifications_url.as_str());
        tracing::debug!(url = %url, "Requesting notification page");

        // The raw response is needed for the Link header
        let response = self.client._get(url).await?;
        let response = octocrab::map_github_error(response).await?;

        let next = response
            .headers()
            .get("link")
            .and_then(|value| value.to_str().ok())
            .and_then(mapper::next_page_link);

        let body = self.client.body_to_string(response).await?;
        mapper::decode_page(&body, next)
    }

    async fn get_pull_request(&self, url: &str) -> Result<PullRequestDetail> {
        let pr: PullRequestResponse = self
            .client
            .get(url, None::<&()>)
            .await
            .map_err(|e| AppError::GitHubApi(format!("Failed to fetch pull request {url}: {e}")))?;

        Ok(mapper::map_pull_request(pr))
    }

    async fn delete_notification(&self, url: &str) -> Result<()> {
        // Returns 205 with an empty body, so skip deserialization
        let response = self.client._delete(url, None::<&()>).await?;
        octocrab::map_github_error(response)
            .await
            .map_err(|e| AppError::GitHubApi(format!("Failed to delete notification {url}: {e}")))?;

        Ok(())
    }
}
