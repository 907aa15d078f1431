// Session lifecycle events

use tokio::sync::broadcast;

use crate::error::RefreshError;

/// Capacity of the session event channel
const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Why a session ended
#[derive(Debug, Clone, PartialEq)]
pub enum TerminationReason {
    /// Explicit logout
    LoggedOut,

    /// The access token could not be renewed
    RefreshFailed(RefreshError),
}

/// Event broadcast to the application shell
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Credentials were cleared; the shell should send the user to `login_url`
    Terminated {
        reason: TerminationReason,
        login_url: String,
    },
}

/// Broadcast handle for session events
///
/// Subscribers may observe one termination per failed request when several
/// requests fail at once, so handling must be idempotent.
#[derive(Debug, Clone)]
pub struct SessionEvents {
    sender: broadcast::Sender<SessionEvent>,
    login_url: String,
}

impl SessionEvents {
    pub fn new(login_url: impl Into<String>) -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            sender,
            login_url: login_url.into(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    pub fn login_url(&self) -> &str {
        &self.login_url
    }

    /// Broadcast a session termination
    pub fn terminated(&self, reason: TerminationReason) {
        tracing::warn!(reason = ?reason, login_url = %self.login_url, "Session terminated");

        let event = SessionEvent::Terminated {
            reason,
            login_url: self.login_url.clone(),
        };

        if self.sender.send(event).is_err() {
            tracing::debug!("No subscribers for session events");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_termination() {
        let events = SessionEvents::new("/login");
        let mut rx = events.subscribe();

        events.terminated(TerminationReason::RefreshFailed(RefreshError::NoRefreshToken));

        let event = rx.recv().await.unwrap();
        assert_eq!(
            event,
            SessionEvent::Terminated {
                reason: TerminationReason::RefreshFailed(RefreshError::NoRefreshToken),
                login_url: "/login".to_string(),
            }
        );
    }

    #[test]
    fn test_terminated_without_subscribers() {
        let events = SessionEvents::new("/login");
        events.terminated(TerminationReason::LoggedOut);
        assert_eq!(events.login_url(), "/login");
    }
}
