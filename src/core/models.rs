use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Maximum number of messages SQS hands back from a single receive call.
pub const RECEIVE_MAX_MESSAGES: i32 = 10;
/// Long-poll wait for at least one message to arrive.
pub const RECEIVE_WAIT_TIME: Duration = Duration::from_secs(10);
/// Upper bound on the whole receive operation, including the long poll.
pub const RECEIVE_TIMEOUT: Duration = Duration::from_secs(30);

/// A message pulled off the dead letter queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub message_id: Option<String>,
    pub body: Option<String>,
    pub receipt_handle: Option<String>,
}

impl QueueMessage {
    /// Body text, if present and not blank.
    #[must_use]
    pub fn non_empty_body(&self) -> Option<&str> {
        self.body.as_deref().filter(|b| !b.trim().is_empty())
    }
}

/// Parameters of a single receive call against the dead letter queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveRequest {
    pub max_messages: i32,
    pub wait_time: Duration,
    pub timeout: Duration,
}

impl ReceiveRequest {
    /// The receive used by every redrive run: 10 messages, 10s wait, 30s timeout.
    #[must_use]
    pub const fn redrive() -> Self {
        Self {
            max_messages: RECEIVE_MAX_MESSAGES,
            wait_time: RECEIVE_WAIT_TIME,
            timeout: RECEIVE_TIMEOUT,
        }
    }
}

/// What happened to one received message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum MessageOutcome {
    /// Invoked and removed from the queue.
    Redriven,
    SkippedEmptyBody,
    InvalidPayload(String),
    /// The message stays on the queue and is picked up by a later run.
    InvocationFailed(String),
    /// The target ran but the message could not be acknowledged; it will be redriven again.
    DeleteFailed(String),
}

impl MessageOutcome {
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            MessageOutcome::InvalidPayload(_)
                | MessageOutcome::InvocationFailed(_)
                | MessageOutcome::DeleteFailed(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageReport {
    pub message_id: Option<String>,
    #[serde(flatten)]
    pub outcome: MessageOutcome,
}

/// Result of one redrive run, one entry per received message in receive order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RedriveReport {
    pub received: usize,
    pub messages: Vec<MessageReport>,
}

impl RedriveReport {
    #[must_use]
    pub fn redriven(&self) -> usize {
        self.count(|o| matches!(o, MessageOutcome::Redriven))
    }

    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, MessageOutcome::SkippedEmptyBody))
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(MessageOutcome::is_failure)
    }

    fn count(&self, pred: impl Fn(&MessageOutcome) -> bool) -> usize {
        self.messages.iter().filter(|m| pred(&m.outcome)).count()
    }
}
