//! Synchronous invocation of the redrive target

use async_trait::async_trait;
use aws_sdk_lambda::Client as LambdaClient;
use aws_sdk_lambda::error::DisplayErrorContext;
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::InvocationType;
use tracing::{debug, warn};

use crate::errors::RedriveError;

#[async_trait]
pub trait FunctionInvoker: Send + Sync {
    /// Invokes `target` with `payload` and waits for the function to finish.
    async fn invoke(&self, target: &str, payload: Vec<u8>) -> Result<(), RedriveError>;
}

pub struct LambdaInvoker {
    client: LambdaClient,
    keep_on_function_error: bool,
}

impl LambdaInvoker {
    pub fn new(client: LambdaClient) -> Self {
        Self {
            client,
            keep_on_function_error: false,
        }
    }

    /// When set, a response carrying `FunctionError` counts as a failed
    /// invocation and the message stays on the queue. By default only a
    /// failed `Invoke` call does.
    #[must_use]
    pub fn keep_on_function_error(mut self, keep: bool) -> Self {
        self.keep_on_function_error = keep;
        self
    }
}

#[async_trait]
impl FunctionInvoker for LambdaInvoker {
    async fn invoke(&self, target: &str, payload: Vec<u8>) -> Result<(), RedriveError> {
        let output = self
            .client
            .invoke()
            .function_name(target)
            .invocation_type(InvocationType::RequestResponse)
            .payload(Blob::new(payload))
            .send()
            .await
            .map_err(|e| RedriveError::InvokeError(DisplayErrorContext(e).to_string()))?;

        // The call itself succeeds when the function throws; the error is only
        // visible in `FunctionError` and the response payload.
        if let Some(kind) = output.function_error() {
            let detail = output
                .payload()
                .map(|p| String::from_utf8_lossy(p.as_ref()).into_owned())
                .unwrap_or_default();
            if self.keep_on_function_error {
                return Err(RedriveError::FunctionError(format!("{kind}: {detail}")));
            }
            warn!(
                target_function = %target,
                function_error = %kind,
                payload = %detail,
                "Target function reported an error; message will still be deleted"
            );
            return Ok(());
        }

        debug!(
            target_function = %target,
            status_code = output.status_code(),
            "Target function invoked"
        );
        Ok(())
    }
}
