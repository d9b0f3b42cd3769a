//! Organisation defaults for dead letter queues.
//!
//! The processor re-applies them when `REDRIVE_ENFORCE_QUEUE_POLICY` is set
//! and uses the backlog threshold for its depth check.

use std::collections::HashMap;
use std::time::Duration;

use aws_sdk_sqs::types::QueueAttributeName;
use serde_json::{Value, json};

use crate::errors::RedriveError;

/// SQS-managed KMS key used when no customer key is supplied.
pub const SQS_MANAGED_KEY_ALIAS: &str = "alias/aws/sqs";

/// `Sid` of the statement denying requests made without TLS.
pub const SSL_ENFORCEMENT_SID: &str = "DenyInsecureTransport";

const RETENTION: Duration = Duration::from_secs(14 * 24 * 60 * 60);
const VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);
const BACKLOG_THRESHOLD: u64 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueEncryption {
    KmsManaged,
    Kms(String),
}

impl QueueEncryption {
    #[must_use]
    pub fn key_id(&self) -> &str {
        match self {
            QueueEncryption::KmsManaged => SQS_MANAGED_KEY_ALIAS,
            QueueEncryption::Kms(key) => key,
        }
    }
}

/// Number of visible messages at which the backlog is worth a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BacklogAlarm {
    pub threshold: u64,
}

impl Default for BacklogAlarm {
    fn default() -> Self {
        Self {
            threshold: BACKLOG_THRESHOLD,
        }
    }
}

impl BacklogAlarm {
    /// Greater-than-or-equal comparison.
    #[must_use]
    pub fn is_breached(&self, visible_messages: u64) -> bool {
        visible_messages >= self.threshold
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetterQueuePolicy {
    pub retention: Duration,
    pub visibility_timeout: Duration,
    pub encryption: QueueEncryption,
    pub enforce_ssl: bool,
    pub backlog_alarm: BacklogAlarm,
}

impl Default for DeadLetterQueuePolicy {
    fn default() -> Self {
        Self {
            retention: RETENTION,
            visibility_timeout: VISIBILITY_TIMEOUT,
            encryption: QueueEncryption::KmsManaged,
            enforce_ssl: true,
            backlog_alarm: BacklogAlarm::default(),
        }
    }
}

impl DeadLetterQueuePolicy {
    #[must_use]
    pub fn with_kms_key(mut self, key_id: impl Into<String>) -> Self {
        self.encryption = QueueEncryption::Kms(key_id.into());
        self
    }

    #[must_use]
    pub fn with_alarm_threshold(mut self, threshold: u64) -> Self {
        self.backlog_alarm.threshold = threshold;
        self
    }

    /// SQS attributes for `SetQueueAttributes`. The access policy depends on
    /// the queue's current policy and is merged separately, see
    /// [`merge_ssl_enforcement`].
    #[must_use]
    pub fn queue_attributes(&self) -> HashMap<QueueAttributeName, String> {
        HashMap::from([
            (
                QueueAttributeName::MessageRetentionPeriod,
                self.retention.as_secs().to_string(),
            ),
            (
                QueueAttributeName::VisibilityTimeout,
                self.visibility_timeout.as_secs().to_string(),
            ),
            (
                QueueAttributeName::KmsMasterKeyId,
                self.encryption.key_id().to_string(),
            ),
        ])
    }
}

/// Statement denying any request to `queue_arn` not made over TLS.
#[must_use]
pub fn ssl_enforcement_statement(queue_arn: &str) -> Value {
    json!({
        "Sid": SSL_ENFORCEMENT_SID,
        "Effect": "Deny",
        "Principal": { "AWS": "*" },
        "Action": "sqs:*",
        "Resource": queue_arn,
        "Condition": { "Bool": { "aws:SecureTransport": "false" } }
    })
}

fn denies_insecure_transport(statement: &Value) -> bool {
    statement["Sid"] == SSL_ENFORCEMENT_SID
        || (statement["Effect"] == "Deny"
            && statement["Condition"]["Bool"]["aws:SecureTransport"] == "false")
}

/// Adds the TLS-only statement to an existing queue access policy.
///
/// Returns `None` when the policy already denies insecure transport, so the
/// caller can leave the attribute untouched.
///
/// # Errors
///
/// Returns `RedriveError::PolicyError` if `existing` is not a JSON policy
/// document.
pub fn merge_ssl_enforcement(
    existing: Option<&str>,
    queue_arn: &str,
) -> Result<Option<Value>, RedriveError> {
    let mut document = match existing.filter(|p| !p.trim().is_empty()) {
        Some(raw) => serde_json::from_str::<Value>(raw)
            .map_err(|e| RedriveError::PolicyError(format!("existing queue policy: {e}")))?,
        None => json!({ "Version": "2012-10-17", "Statement": [] }),
    };

    let Some(root) = document.as_object_mut() else {
        return Err(RedriveError::PolicyError(
            "existing queue policy is not a JSON object".to_string(),
        ));
    };

    // A single statement may be written without the surrounding array.
    let statements = match root.remove("Statement") {
        Some(Value::Array(list)) => list,
        Some(Value::Null) | None => Vec::new(),
        Some(single) => vec![single],
    };

    if statements.iter().any(denies_insecure_transport) {
        return Ok(None);
    }

    let mut statements = statements;
    statements.push(ssl_enforcement_statement(queue_arn));
    root.entry("Version").or_insert_with(|| json!("2012-10-17"));
    root.insert("Statement".to_string(), Value::Array(statements));

    Ok(Some(document))
}
