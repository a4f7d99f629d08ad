//! Outbound notifications
//!
//! Use cases enqueue [`Notification`]s on an unbounded channel and move on;
//! a background [`NotificationWorker`] hands them to a transport. Neither
//! enqueueing nor delivery failures ever reach the triggering request.

use serde::Serialize;
use tokio::sync::mpsc;

/// A message for one recipient
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    VerifyEmail {
        to: String,
        first_name: String,
        link: String,
    },
    PasswordReset {
        to: String,
        link: String,
    },
    AccountApproved {
        to: String,
    },
    AccountRejected {
        to: String,
        reason: Option<String>,
    },
    AccountBlocked {
        to: String,
        reason: Option<String>,
    },
    AccountUnblocked {
        to: String,
    },
    RoleChanged {
        to: String,
        old_role: String,
        new_role: String,
        reason: Option<String>,
    },
    StagedAccepted {
        to: String,
    },
    StagedRejected {
        to: String,
    },
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::VerifyEmail { .. } => "verify_email",
            Self::PasswordReset { .. } => "password_reset",
            Self::AccountApproved { .. } => "account_approved",
            Self::AccountRejected { .. } => "account_rejected",
            Self::AccountBlocked { .. } => "account_blocked",
            Self::AccountUnblocked { .. } => "account_unblocked",
            Self::RoleChanged { .. } => "role_changed",
            Self::StagedAccepted { .. } => "staged_accepted",
            Self::StagedRejected { .. } => "staged_rejected",
        }
    }

    pub fn recipient(&self) -> &str {
        match self {
            Self::VerifyEmail { to, .. }
            | Self::PasswordReset { to, .. }
            | Self::AccountApproved { to }
            | Self::AccountRejected { to, .. }
            | Self::AccountBlocked { to, .. }
            | Self::AccountUnblocked { to }
            | Self::RoleChanged { to, .. }
            | Self::StagedAccepted { to }
            | Self::StagedRejected { to } => to,
        }
    }
}

// Links carry one-time tokens
impl std::fmt::Debug for Notification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notification")
            .field("kind", &self.kind())
            .field("to", &self.recipient())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("Notification delivery failed: {0}")]
    Delivery(String),
}

/// Delivery backend
#[trait_variant::make(NotificationTransport: Send)]
pub trait LocalNotificationTransport {
    async fn deliver(&self, notification: &Notification) -> Result<(), NotificationError>;
}

/// Fire-and-forget handle held by the use cases
#[derive(Debug, Clone)]
pub struct NotificationSender {
    tx: mpsc::UnboundedSender<Notification>,
}

pub type NotificationReceiver = mpsc::UnboundedReceiver<Notification>;

impl NotificationSender {
    pub fn channel() -> (Self, NotificationReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, notification: Notification) {
        let kind = notification.kind();
        if self.tx.send(notification).is_err() {
            tracing::warn!(kind, "Notification worker stopped; notification dropped");
        }
    }
}

/// Drains the channel into a transport until every sender is gone
pub struct NotificationWorker<T> {
    rx: NotificationReceiver,
    transport: T,
}

impl<T> NotificationWorker<T>
where
    T: NotificationTransport + Sync,
{
    pub fn new(rx: NotificationReceiver, transport: T) -> Self {
        Self { rx, transport }
    }

    pub async fn run(mut self) {
        while let Some(notification) = self.rx.recv().await {
            match self.transport.deliver(&notification).await {
                Ok(()) => tracing::debug!(kind = notification.kind(), "Notification delivered"),
                Err(e) => tracing::warn!(
                    error = %e,
                    kind = notification.kind(),
                    "Notification delivery failed"
                ),
            }
        }
        tracing::info!("Notification worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Recording {
        delivered: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    impl NotificationTransport for Recording {
        async fn deliver(&self, notification: &Notification) -> Result<(), NotificationError> {
            if self.fail {
                return Err(NotificationError::Delivery("relay down".into()));
            }
            self.delivered
                .lock()
                .unwrap()
                .push(notification.recipient().to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_worker_drains_until_senders_drop() {
        let (sender, rx) = NotificationSender::channel();
        let transport = Recording::default();
        sender.send(Notification::AccountApproved {
            to: "a@example.com".into(),
        });
        sender.send(Notification::AccountUnblocked {
            to: "b@example.com".into(),
        });
        drop(sender);

        NotificationWorker::new(rx, transport.clone()).run().await;
        assert_eq!(
            *transport.delivered.lock().unwrap(),
            vec!["a@example.com", "b@example.com"]
        );
    }

    #[tokio::test]
    async fn test_delivery_failure_is_swallowed() {
        let (sender, rx) = NotificationSender::channel();
        sender.send(Notification::StagedRejected {
            to: "c@example.com".into(),
        });
        drop(sender);

        let transport = Recording {
            fail: true,
            ..Default::default()
        };
        NotificationWorker::new(rx, transport).run().await;
    }

    #[test]
    fn test_send_without_worker_does_not_panic() {
        let (sender, rx) = NotificationSender::channel();
        drop(rx);
        sender.send(Notification::AccountApproved {
            to: "d@example.com".into(),
        });
    }

    #[test]
    fn test_debug_hides_links() {
        let n = Notification::PasswordReset {
            to: "e@example.com".into(),
            link: "https://shop/reset?token=deadbeef".into(),
        };
        assert!(!format!("{n:?}").contains("deadbeef"));
        assert_eq!(serde_json::to_value(&n).unwrap()["kind"], "password_reset");
    }
}
