use std::env;

use crate::core::policy::DeadLetterQueuePolicy;
use crate::errors::RedriveError;

pub const DLQ_URL: &str = "DLQ_URL";
pub const LAMBDA_DESTINATION_ARN: &str = "LAMBDA_DESTINATION_ARN";
pub const DELETE_MODE: &str = "REDRIVE_DELETE_MODE";
pub const MAX_CONCURRENCY: &str = "REDRIVE_MAX_CONCURRENCY";
pub const BACKLOG_THRESHOLD: &str = "REDRIVE_BACKLOG_THRESHOLD";
pub const ENFORCE_QUEUE_POLICY: &str = "REDRIVE_ENFORCE_QUEUE_POLICY";
pub const KMS_KEY_ID: &str = "REDRIVE_KMS_KEY_ID";
pub const KEEP_ON_FUNCTION_ERROR: &str = "REDRIVE_KEEP_ON_FUNCTION_ERROR";

const MAX_CONCURRENCY_LIMIT: usize = 10;

/// How successfully redriven messages are acknowledged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeleteMode {
    /// One `DeleteMessage` call right after each invocation.
    #[default]
    Single,
    /// One `DeleteMessageBatch` call after every invocation in the batch has finished.
    Batch,
}

impl DeleteMode {
    fn parse(raw: &str) -> Result<Self, RedriveError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(DeleteMode::Single),
            "batch" => Ok(DeleteMode::Batch),
            other => Err(RedriveError::ConfigError(format!(
                "{DELETE_MODE}: expected `single` or `batch`, got `{other}`"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RedriveConfig {
    pub queue_url: String,
    pub target_function: String,
    pub delete_mode: DeleteMode,
    pub max_concurrency: usize,
    pub backlog_threshold: Option<u64>,
    pub enforce_queue_policy: bool,
    pub kms_key_id: Option<String>,
    /// Keep the message when the target ran but reported `FunctionError`.
    pub keep_on_function_error: bool,
}

impl RedriveConfig {
    /// Minimal config with every optional setting at its default.
    pub fn new(queue_url: impl Into<String>, target_function: impl Into<String>) -> Self {
        Self {
            queue_url: queue_url.into(),
            target_function: target_function.into(),
            delete_mode: DeleteMode::default(),
            max_concurrency: 1,
            backlog_threshold: None,
            enforce_queue_policy: false,
            kms_key_id: None,
            keep_on_function_error: false,
        }
    }

    /// # Errors
    ///
    /// Returns `RedriveError::ConfigError` if a required variable is missing
    /// or an optional one cannot be parsed.
    pub fn from_env() -> Result<Self, RedriveError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`RedriveConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, RedriveError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let queue_url = get(DLQ_URL)
            .ok_or_else(|| RedriveError::ConfigError(format!("missing {DLQ_URL}")))?;
        let target_function = get(LAMBDA_DESTINATION_ARN).ok_or_else(|| {
            RedriveError::ConfigError(format!("missing {LAMBDA_DESTINATION_ARN}"))
        })?;

        let delete_mode = get(DELETE_MODE)
            .map(|v| DeleteMode::parse(&v))
            .transpose()?
            .unwrap_or_default();

        let max_concurrency = match get(MAX_CONCURRENCY) {
            Some(raw) => match raw.parse::<usize>() {
                Ok(n) if (1..=MAX_CONCURRENCY_LIMIT).contains(&n) => n,
                _ => {
                    return Err(RedriveError::ConfigError(format!(
                        "{MAX_CONCURRENCY}: expected 1..={MAX_CONCURRENCY_LIMIT}, got `{raw}`"
                    )));
                }
            },
            None => 1,
        };

        let backlog_threshold = match get(BACKLOG_THRESHOLD) {
            Some(raw) => match raw.parse::<u64>() {
                Ok(n) if n > 0 => Some(n),
                _ => {
                    return Err(RedriveError::ConfigError(format!(
                        "{BACKLOG_THRESHOLD}: expected a positive integer, got `{raw}`"
                    )));
                }
            },
            None => None,
        };

        let flag = |key: &str| match get(key) {
            Some(raw) => raw.parse::<bool>().map_err(|_| {
                RedriveError::ConfigError(format!("{key}: expected `true` or `false`, got `{raw}`"))
            }),
            None => Ok(false),
        };
        let enforce_queue_policy = flag(ENFORCE_QUEUE_POLICY)?;
        let keep_on_function_error = flag(KEEP_ON_FUNCTION_ERROR)?;

        Ok(Self {
            queue_url,
            target_function,
            delete_mode,
            max_concurrency,
            backlog_threshold,
            enforce_queue_policy,
            kms_key_id: get(KMS_KEY_ID),
            keep_on_function_error,
        })
    }

    /// Queue policy matching this config's encryption and alarm settings.
    #[must_use]
    pub fn queue_policy(&self) -> DeadLetterQueuePolicy {
        let mut policy = DeadLetterQueuePolicy::default();
        if let Some(key) = &self.kms_key_id {
            policy = policy.with_kms_key(key.clone());
        }
        if let Some(threshold) = self.backlog_threshold {
            policy = policy.with_alarm_threshold(threshold);
        }
        policy
    }
}
