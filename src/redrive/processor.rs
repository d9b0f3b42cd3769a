use futures::stream::{self, StreamExt};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::clients::{DeadLetterQueue, FunctionInvoker};
use crate::core::config::{DeleteMode, RedriveConfig};
use crate::core::models::{
    MessageOutcome, MessageReport, QueueMessage, ReceiveRequest, RedriveReport,
};
use crate::errors::RedriveError;

/// Per-message state before acknowledgement.
enum Pending {
    Settled(MessageOutcome),
    /// Invoked successfully; waiting for the batch delete.
    AwaitingDelete,
}

/// Drains one batch of the dead letter queue into the target function.
pub struct Redriver<Q, I> {
    config: RedriveConfig,
    queue: Q,
    invoker: I,
}

impl<Q, I> Redriver<Q, I>
where
    Q: DeadLetterQueue,
    I: FunctionInvoker,
{
    pub fn new(config: RedriveConfig, queue: Q, invoker: I) -> Self {
        Self {
            config,
            queue,
            invoker,
        }
    }

    #[must_use]
    pub fn config(&self) -> &RedriveConfig {
        &self.config
    }

    #[must_use]
    pub fn queue(&self) -> &Q {
        &self.queue
    }

    #[must_use]
    pub fn invoker(&self) -> &I {
        &self.invoker
    }

    /// Receives up to ten messages and redrives each one.
    ///
    /// A message is deleted only after its invocation returned without error.
    /// Per-message problems are recorded in the report; only a failed receive
    /// is returned as an error.
    ///
    /// # Errors
    ///
    /// Returns `RedriveError::ReceiveError` or `RedriveError::ReceiveTimeout`
    /// if the queue could not be read.
    pub async fn run_batch(&self) -> Result<RedriveReport, RedriveError> {
        self.check_backlog().await;

        let messages = self.queue.receive(&ReceiveRequest::redrive()).await?;
        if messages.is_empty() {
            info!("Dead letter queue is empty, nothing to redrive");
            return Ok(RedriveReport::default());
        }

        let inline_delete = self.config.delete_mode == DeleteMode::Single;
        let pending: Vec<Pending> = stream::iter(messages.iter())
            .map(|message| self.process_message(message, inline_delete))
            .buffered(self.config.max_concurrency.max(1))
            .collect()
            .await;

        let outcomes = if inline_delete {
            pending
                .into_iter()
                .map(|p| match p {
                    Pending::Settled(outcome) => outcome,
                    Pending::AwaitingDelete => MessageOutcome::Redriven,
                })
                .collect()
        } else {
            self.delete_invoked(&messages, pending).await
        };

        let report = RedriveReport {
            received: messages.len(),
            messages: messages
                .iter()
                .zip(outcomes)
                .map(|(message, outcome)| {
                    log_outcome(message, &outcome);
                    MessageReport {
                        message_id: message.message_id.clone(),
                        outcome,
                    }
                })
                .collect(),
        };

        info!(
            received = report.received,
            redriven = report.redriven(),
            skipped = report.skipped(),
            failed = report.failed(),
            "Redrive batch finished"
        );
        Ok(report)
    }

    async fn process_message(&self, message: &QueueMessage, inline_delete: bool) -> Pending {
        let Some(body) = message.non_empty_body() else {
            return Pending::Settled(MessageOutcome::SkippedEmptyBody);
        };

        #[cfg(feature = "debug-logs")]
        debug!(message_id = ?message.message_id, body = %body, "Redriving message");

        let payload = match reserialize(body) {
            Ok(payload) => payload,
            Err(e) => return Pending::Settled(MessageOutcome::InvalidPayload(e.to_string())),
        };

        if let Err(e) = self
            .invoker
            .invoke(&self.config.target_function, payload)
            .await
        {
            return Pending::Settled(MessageOutcome::InvocationFailed(e.to_string()));
        }

        if !inline_delete {
            return Pending::AwaitingDelete;
        }

        let Some(receipt) = message.receipt_handle.as_deref() else {
            return Pending::Settled(missing_receipt());
        };
        match self.queue.delete(receipt).await {
            Ok(()) => Pending::Settled(MessageOutcome::Redriven),
            Err(e) => Pending::Settled(MessageOutcome::DeleteFailed(e.to_string())),
        }
    }

    /// Acknowledges every successfully invoked message with one batch delete.
    async fn delete_invoked(
        &self,
        messages: &[QueueMessage],
        pending: Vec<Pending>,
    ) -> Vec<MessageOutcome> {
        let mut outcomes = Vec::with_capacity(pending.len());
        let mut positions = Vec::new();
        let mut receipts = Vec::new();

        for (idx, (message, state)) in messages.iter().zip(pending).enumerate() {
            match state {
                Pending::Settled(outcome) => outcomes.push(outcome),
                Pending::AwaitingDelete => match &message.receipt_handle {
                    Some(receipt) => {
                        positions.push(idx);
                        receipts.push(receipt.clone());
                        outcomes.push(MessageOutcome::Redriven);
                    }
                    None => outcomes.push(missing_receipt()),
                },
            }
        }

        if receipts.is_empty() {
            return outcomes;
        }

        let results = self.queue.delete_batch(&receipts).await;
        for (idx, result) in positions.into_iter().zip(results) {
            if let (Err(e), Some(slot)) = (result, outcomes.get_mut(idx)) {
                *slot = MessageOutcome::DeleteFailed(e.to_string());
            }
        }

        outcomes
    }

    async fn check_backlog(&self) {
        if self.config.backlog_threshold.is_none() {
            return;
        }
        let alarm = self.config.queue_policy().backlog_alarm;

        match self.queue.approximate_depth().await {
            Ok(Some(depth)) if alarm.is_breached(depth) => {
                warn!(
                    depth,
                    threshold = alarm.threshold,
                    queue_url = %self.config.queue_url,
                    "Dead letter queue backlog at or above alarm threshold"
                );
            }
            Ok(depth) => debug!(?depth, "Dead letter queue backlog below threshold"),
            Err(e) => warn!("Failed to read dead letter queue depth: {}", e),
        }
    }
}

/// Parses the body as JSON and serializes it again for the invocation payload.
fn reserialize(body: &str) -> Result<Vec<u8>, RedriveError> {
    let value: Value = serde_json::from_str(body)?;
    Ok(serde_json::to_vec(&value)?)
}

fn missing_receipt() -> MessageOutcome {
    MessageOutcome::DeleteFailed("message has no receipt handle".to_string())
}

fn log_outcome(message: &QueueMessage, outcome: &MessageOutcome) {
    let message_id = message.message_id.as_deref().unwrap_or("<unknown>");
    match outcome {
        MessageOutcome::Redriven => debug!(message_id, "Message redriven"),
        MessageOutcome::SkippedEmptyBody => info!(message_id, "Skipped message with empty body"),
        MessageOutcome::InvalidPayload(reason) => {
            error!(message_id, reason = %reason, "Message body is not valid JSON, left on queue");
        }
        MessageOutcome::InvocationFailed(reason) => {
            error!(message_id, reason = %reason, "Target invocation failed, left on queue");
        }
        MessageOutcome::DeleteFailed(reason) => {
            error!(
                message_id,
                reason = %reason,
                "Message redriven but not deleted, it will be redriven again"
            );
        }
    }
}
