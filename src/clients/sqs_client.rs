//! Dead letter queue access over Amazon SQS

use async_trait::async_trait;
use aws_sdk_sqs::Client as SqsClient;
use aws_sdk_sqs::error::DisplayErrorContext;
use aws_sdk_sqs::types::{DeleteMessageBatchRequestEntry, Message, QueueAttributeName};
use tracing::{debug, info};

use crate::core::models::{QueueMessage, ReceiveRequest};
use crate::core::policy::{DeadLetterQueuePolicy, merge_ssl_enforcement};
use crate::errors::RedriveError;

/// SQS accepts at most ten entries per batch request.
const DELETE_BATCH_LIMIT: usize = 10;

/// The queue operations a redrive run needs.
#[async_trait]
pub trait DeadLetterQueue: Send + Sync {
    async fn receive(&self, request: &ReceiveRequest) -> Result<Vec<QueueMessage>, RedriveError>;

    async fn delete(&self, receipt_handle: &str) -> Result<(), RedriveError>;

    /// Deletes several messages. The result has one entry per receipt handle, in input order.
    async fn delete_batch(&self, receipt_handles: &[String]) -> Vec<Result<(), RedriveError>> {
        let mut results = Vec::with_capacity(receipt_handles.len());
        for handle in receipt_handles {
            results.push(self.delete(handle).await);
        }
        results
    }

    /// Approximate number of visible messages, if the queue reports it.
    async fn approximate_depth(&self) -> Result<Option<u64>, RedriveError>;
}

pub struct SqsDeadLetterQueue {
    client: SqsClient,
    queue_url: String,
}

impl SqsDeadLetterQueue {
    pub fn new(client: SqsClient, queue_url: impl Into<String>) -> Self {
        Self {
            client,
            queue_url: queue_url.into(),
        }
    }

    #[must_use]
    pub fn queue_url(&self) -> &str {
        &self.queue_url
    }

    /// Re-applies retention, visibility and encryption, and adds the TLS-only
    /// statement to the queue's existing access policy.
    ///
    /// # Errors
    ///
    /// Returns `RedriveError::PolicyError` if reading the current attributes,
    /// merging the access policy or writing the attributes fails.
    pub async fn apply_policy(&self, policy: &DeadLetterQueuePolicy) -> Result<(), RedriveError> {
        let mut attributes = policy.queue_attributes();

        if policy.enforce_ssl {
            let (arn, current) = self.arn_and_access_policy().await?;
            if let Some(merged) = merge_ssl_enforcement(current.as_deref(), &arn)? {
                attributes.insert(QueueAttributeName::Policy, merged.to_string());
            } else {
                debug!(queue_url = %self.queue_url, "Queue policy already denies insecure transport");
            }
        }

        self.client
            .set_queue_attributes()
            .queue_url(&self.queue_url)
            .set_attributes(Some(attributes))
            .send()
            .await
            .map_err(|e| {
                RedriveError::PolicyError(format!("set_queue_attributes: {}", DisplayErrorContext(e)))
            })?;

        info!(queue_url = %self.queue_url, "Applied dead letter queue policy");
        Ok(())
    }

    async fn arn_and_access_policy(&self) -> Result<(String, Option<String>), RedriveError> {
        let output = self
            .client
            .get_queue_attributes()
            .queue_url(&self.queue_url)
            .attribute_names(QueueAttributeName::QueueArn)
            .attribute_names(QueueAttributeName::Policy)
            .send()
            .await
            .map_err(|e| {
                RedriveError::PolicyError(format!("get_queue_attributes: {}", DisplayErrorContext(e)))
            })?;

        let mut attrs = output.attributes.unwrap_or_default();
        let arn = attrs
            .remove(&QueueAttributeName::QueueArn)
            .ok_or_else(|| RedriveError::PolicyError("queue did not report its ARN".to_string()))?;
        Ok((arn, attrs.remove(&QueueAttributeName::Policy)))
    }
}

impl From<Message> for QueueMessage {
    fn from(message: Message) -> Self {
        Self {
            message_id: message.message_id,
            body: message.body,
            receipt_handle: message.receipt_handle,
        }
    }
}

#[async_trait]
impl DeadLetterQueue for SqsDeadLetterQueue {
    async fn receive(&self, request: &ReceiveRequest) -> Result<Vec<QueueMessage>, RedriveError> {
        let wait_secs = i32::try_from(request.wait_time.as_secs()).unwrap_or(i32::MAX);
        let call = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(request.max_messages)
            .wait_time_seconds(wait_secs)
            .send();

        let output = tokio::time::timeout(request.timeout, call)
            .await
            .map_err(|_| RedriveError::ReceiveTimeout(request.timeout))?
            .map_err(|e| RedriveError::ReceiveError(DisplayErrorContext(e).to_string()))?;

        let messages: Vec<QueueMessage> = output
            .messages
            .unwrap_or_default()
            .into_iter()
            .map(QueueMessage::from)
            .collect();

        debug!(count = messages.len(), "Received messages from dead letter queue");
        Ok(messages)
    }

    async fn delete(&self, receipt_handle: &str) -> Result<(), RedriveError> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| RedriveError::DeleteError(DisplayErrorContext(e).to_string()))?;
        Ok(())
    }

    async fn delete_batch(&self, receipt_handles: &[String]) -> Vec<Result<(), RedriveError>> {
        let mut results = Vec::with_capacity(receipt_handles.len());

        for (n, chunk) in receipt_handles.chunks(DELETE_BATCH_LIMIT).enumerate() {
            results.extend(self.delete_chunk(n * DELETE_BATCH_LIMIT, chunk).await);
        }

        results
    }

    async fn approximate_depth(&self) -> Result<Option<u64>, RedriveError> {
        let output = self
            .client
            .get_queue_attributes()
            .queue_url(&self.queue_url)
            .attribute_names(QueueAttributeName::ApproximateNumberOfMessages)
            .send()
            .await
            .map_err(|e| RedriveError::ReceiveError(DisplayErrorContext(e).to_string()))?;

        Ok(output
            .attributes
            .as_ref()
            .and_then(|attrs| attrs.get(&QueueAttributeName::ApproximateNumberOfMessages))
            .and_then(|v| v.parse::<u64>().ok()))
    }
}

impl SqsDeadLetterQueue {
    /// Entry ids are the receipt's position in the whole batch, `offset` being
    /// the position of the chunk's first receipt.
    async fn delete_chunk(&self, offset: usize, chunk: &[String]) -> Vec<Result<(), RedriveError>> {
        let mut entries = Vec::with_capacity(chunk.len());
        for (idx, handle) in chunk.iter().enumerate() {
            match DeleteMessageBatchRequestEntry::builder()
                .id((offset + idx).to_string())
                .receipt_handle(handle)
                .build()
            {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    let reason = format!("invalid batch entry: {e}");
                    return chunk
                        .iter()
                        .map(|_| Err(RedriveError::DeleteError(reason.clone())))
                        .collect();
                }
            }
        }

        let output = match self
            .client
            .delete_message_batch()
            .queue_url(&self.queue_url)
            .set_entries(Some(entries))
            .send()
            .await
        {
            Ok(output) => output,
            Err(e) => {
                let reason = DisplayErrorContext(e).to_string();
                return chunk
                    .iter()
                    .map(|_| Err(RedriveError::DeleteError(reason.clone())))
                    .collect();
            }
        };

        let mut results: Vec<Result<(), RedriveError>> = chunk.iter().map(|_| Ok(())).collect();
        for failure in output.failed() {
            let Some(slot) = failure
                .id()
                .parse::<usize>()
                .ok()
                .and_then(|id| id.checked_sub(offset))
                .and_then(|idx| results.get_mut(idx))
            else {
                continue;
            };
            *slot = Err(RedriveError::DeleteError(format!(
                "{}: {}",
                failure.code(),
                failure.message().unwrap_or("no message")
            )));
        }

        results
    }
}
