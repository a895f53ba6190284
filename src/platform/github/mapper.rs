use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::Result;
use crate::platform::types;

// --- Wire types ---

#[derive(Debug, Deserialize)]
pub struct NotificationResponse {
    pub id: String,
    pub reason: String,
    pub url: String,
    pub unread: bool,
    pub updated_at: DateTime<Utc>,
    pub repository: RepositoryResponse,
    pub subject: SubjectResponse,
}

#[derive(Debug, Deserialize)]
pub struct RepositoryResponse {
    pub full_name: String,
}

#[derive(Debug, Deserialize)]
pub struct SubjectResponse {
    pub title: String,
    pub url: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Deserialize)]
pub struct PullRequestResponse {
    pub state: String,
    pub user: UserResponse,
}

#[derive(Debug, Deserialize)]
pub struct UserResponse {
    pub login: String,
    #[serde(rename = "type")]
    pub kind: String,
}

// --- Mapping ---

/// Map a notification payload to our platform Notification type.
pub fn map_notification(n: NotificationResponse) -> types::Notification {
    types::Notification {
        id: n.id,
        reason: n.reason,
        url: n.url,
        unread: n.unread,
        updated_at: n.updated_at,
        repository: n.repository.full_name,
        subject: types::Subject {
            title: n.subject.title,
            url: n.subject.url,
            kind: n.subject.kind,
        },
    }
}

/// Decode one page of the notification listing.
pub fn decode_page(body: &str, next: Option<String>) -> Result<types::NotificationPage> {
    let batch: Vec<NotificationResponse> = serde_json::from_str(body)?;
    Ok(types::NotificationPage {
        notifications: batch.into_iter().map(map_notification).collect(),
        next,
    })
}

pub fn map_pull_request(pr: PullRequestResponse) -> types::PullRequestDetail {
    let author_kind = if pr.user.kind == "Bot" {
        types::AuthorKind::Bot
    } else {
        types::AuthorKind::Human
    };

    types::PullRequestDetail {
        closed: pr.state == "closed",
        author_login: pr.user.login,
        author_kind,
    }
}

/// Extract the `rel="next"` target from a `Link` header.
///
/// The header is a comma-separated list of `<url>; rel="..."` entries.
pub fn next_page_link(header: &str) -> Option<String> {
    header.split(',').find_map(|entry| {
        let mut parts = entry.split(';');
        let target = parts
            .next()?
            .trim()
            .strip_prefix('<')?
            .strip_suffix('>')?;

        let is_next = parts.any(|param| {
            param
                .trim()
                .strip_prefix("rel=")
                .map(|rel| rel.trim_matches('"').split_whitespace().any(|r| r == "next"))
                .unwrap_or(false)
        });

        is_next.then(|| target.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    #[test]
    fn test_next_page_link_among_several() {
        let header = r#"<https://api.github.com/notifications?all=true&page=2>; rel="next", <https://api.github.com/notifications?all=true&page=9>; rel="last""#;
        assert_eq!(
            next_page_link(header).as_deref(),
            Some("https://api.github.com/notifications?all=true&page=2")
        );
    }

    #[test]
    fn test_next_page_link_not_first_entry() {
        let header = r#"<https://api.github.com/notifications?page=1>; rel="prev", <https://api.github.com/notifications?page=3>; rel="next""#;
        assert_eq!(
            next_page_link(header).as_deref(),
            Some("https://api.github.com/notifications?page=3")
        );
    }

    #[test]
    fn test_next_page_link_absent_on_last_page() {
        let header = r#"<https://api.github.com/notifications?page=1>; rel="first", <https://api.github.com/notifications?page=8>; rel="prev""#;
        assert_eq!(next_page_link(header), None);
        assert_eq!(next_page_link(""), None);
    }

    #[test]
    fn test_map_notification_payload() {
        let json = r#"{
            "id": "123",
            "reason": "review_requested",
            "url": "https://api.github.com/notifications/threads/123",
            "unread": false,
            "updated_at": "2024-05-01T12:00:00Z",
            "last_read_at": null,
            "repository": { "full_name": "octo/widgets", "private": false },
            "subject": {
                "title": "Bump serde",
                "url": "https://api.github.com/repos/octo/widgets/pulls/7",
                "latest_comment_url": null,
                "type": "PullRequest"
            }
        }"#;
        let raw: NotificationResponse = serde_json::from_str(json).unwrap();
        let n = map_notification(raw);

        assert_eq!(n.id, "123");
        assert_eq!(n.reason, "review_requested");
        assert!(!n.unread);
        assert_eq!(n.repository, "octo/widgets");
        assert!(n.subject.is_pull_request());
        assert_eq!(
            n.subject.url.as_deref(),
            Some("https://api.github.com/repos/octo/widgets/pulls/7")
        );
        assert_eq!(n.updated_at.to_rfc3339(), "2024-05-01T12:00:00+00:00");
    }

    #[test]
    fn test_decode_page_keeps_cursor() {
        let body = r#"[{
            "id": "1",
            "reason": "mention",
            "url": "https://api.github.com/notifications/threads/1",
            "unread": true,
            "updated_at": "2024-05-01T12:00:00Z",
            "repository": { "full_name": "octo/widgets" },
            "subject": { "title": "Crash on start", "url": null, "type": "Issue" }
        }]"#;
        let page = decode_page(body, Some("https://api.github.com/notifications?page=2".to_string()))
            .unwrap();

        assert_eq!(page.notifications.len(), 1);
        assert_eq!(page.notifications[0].subject.url, None);
        assert_eq!(
            page.next.as_deref(),
            Some("https://api.github.com/notifications?page=2")
        );
        assert!(decode_page("[]", None).unwrap().notifications.is_empty());
    }

    #[test]
    fn test_decode_page_rejects_malformed_body() {
        let err = decode_page(r#"{"message": "Bad credentials"}"#, None).unwrap_err();
        assert!(matches!(err, AppError::Decode(_)));

        let err = decode_page("<html>", None).unwrap_err();
        assert!(matches!(err, AppError::Decode(_)));
    }

    #[test]
    fn test_map_pull_request_bot_and_state() {
        let json = r#"{ "state": "closed", "merged": true, "user": { "login": "dependabot[bot]", "type": "Bot" } }"#;
        let pr = map_pull_request(serde_json::from_str(json).unwrap());
        assert!(pr.closed);
        assert_eq!(pr.author_kind, types::AuthorKind::Bot);
        assert_eq!(pr.author_login, "dependabot[bot]");

        let json = r#"{ "state": "open", "user": { "login": "octocat", "type": "User" } }"#;
        let pr = map_pull_request(serde_json::from_str(json).unwrap());
        assert!(!pr.closed);
        assert_eq!(pr.author_kind, types::AuthorKind::Human);
    }
}
