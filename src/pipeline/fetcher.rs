use tokio_util::sync::CancellationToken;

use crate::config::PolicyConfig;
use crate::error::Result;
use crate::platform::types::Notification;
use crate::platform::NotificationService;

/// Counts consecutive read notifications to decide when to stop paging.
///
/// Notifications arrive most recently updated first, so a long run of read
/// ones means everything older has already been seen.
#[derive(Debug, Clone)]
pub struct ReadStreak {
    current: usize,
    halt_after: usize,
}

impl ReadStreak {
    /// `halt_after == 0` disables the cutoff.
    pub fn new(halt_after: usize) -> Self {
        Self {
            current: 0,
            halt_after,
        }
    }

    /// Record an accepted notification. Returns `true` when the streak has
    /// reached the cutoff and nothing after it should be fetched.
    pub fn observe(&mut self, unread: bool) -> bool {
        if unread {
            self.current = 0;
            return false;
        }

        self.current += 1;
        self.halt_after > 0 && self.current >= self.halt_after
    }

    pub fn current(&self) -> usize {
        self.current
    }
}

/// Fetch every notification page in order, stopping early on a long read
/// streak or when the run is cancelled.
///
/// Any request or decoding failure aborts the fetch; a partial list is
/// never returned on error.
pub async fn fetch_notifications(
    service: &dyn NotificationService,
    policy: &PolicyConfig,
    cancel: &CancellationToken,
) -> Result<Vec<Notification>> {
    let mut streak = ReadStreak::new(policy.halt_after);
    let mut notifications = Vec::new();
    let mut cursor: Option<String> = None;
    let mut pages = 0usize;

    'pages: loop {
        let page = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::warn!(
                    pages,
                    count = notifications.len(),
                    "Fetch cancelled, keeping notifications loaded so far"
                );
                break 'pages;
            }
            page = service.list_notifications(cursor.as_deref()) => page?,
        };
        pages += 1;

        tracing::debug!(
            page = pages,
            count = page.notifications.len(),
            has_next = page.next.is_some(),
            "Fetched notification page"
        );

        for notification in page.notifications {
            let halt = streak.observe(notification.unread);
            notifications.push(notification);
            if halt {
                tracing::info!(
                    streak = streak.current(),
                    count = notifications.len(),
                    "Read streak reached halt threshold, not fetching older notifications"
                );
                break 'pages;
            }
        }

        match page.next {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    tracing::info!(pages, count = notifications.len(), "Loaded notifications");
    Ok(notifications)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_streak_halts_on_threshold() {
        let mut streak = ReadStreak::new(2);
        assert!(!streak.observe(true));
        assert!(!streak.observe(false));
        assert!(streak.observe(false));
    }

    #[test]
    fn test_unread_resets_streak() {
        let mut streak = ReadStreak::new(3);
        assert!(!streak.observe(false));
        assert!(!streak.observe(false));
        assert!(!streak.observe(true));
        assert_eq!(streak.current(), 0);
        assert!(!streak.observe(false));
        assert!(!streak.observe(false));
        assert!(streak.observe(false));
    }

    #[test]
    fn test_zero_threshold_never_halts() {
        let mut streak = ReadStreak::new(0);
        for _ in 0..1000 {
            assert!(!streak.observe(false));
        }
        assert_eq!(streak.current(), 1000);
    }
}
