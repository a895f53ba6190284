use chrono::{DateTime, Utc};

/// Subject type GitHub reports for pull request notifications.
pub const PULL_REQUEST_KIND: &str = "PullRequest";

/// A single notification thread from the inbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: String,
    pub reason: String,
    /// API URL of the notification thread; deletes go here.
    pub url: String,
    pub unread: bool,
    pub updated_at: DateTime<Utc>,
    pub repository: String,
    pub subject: Subject,
}

/// The issue, pull request, release etc. a notification is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub title: String,
    /// API URL of the subject. Absent for some kinds (e.g. discussions).
    pub url: Option<String>,
    pub kind: String,
}

impl Subject {
    pub fn is_pull_request(&self) -> bool {
        self.kind == PULL_REQUEST_KIND
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorKind {
    Human,
    Bot,
}

/// The slice of a pull request the deletion policy cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestDetail {
    /// Closed or merged.
    pub closed: bool,
    pub author_login: String,
    pub author_kind: AuthorKind,
}

/// One page of the notification listing.
#[derive(Debug, Clone, Default)]
pub struct NotificationPage {
    pub notifications: Vec<Notification>,
    /// Reference to the following page, if any.
    pub next: Option<String>,
}
