use lambda_runtime::{Error, LambdaEvent};
use serde_json::Value;
use tracing::{error, info};
use uuid::Uuid;

use super::processor::Redriver;
use crate::clients::{DeadLetterQueue, FunctionInvoker};
use crate::core::models::RedriveReport;

/// Lambda handler for the redrive entrypoint. Runs one batch per invocation.
///
/// A queue that cannot be read is logged and reported as an empty run; the
/// next scheduled invocation polls again.
///
/// # Errors
///
/// Never fails after cold start; the `Result` is what `lambda_runtime` expects.
#[tracing::instrument(
    level = "info",
    skip(redriver, event),
    fields(run_id = %Uuid::new_v4(), request_id = %event.context.request_id)
)]
pub async fn function_handler<Q, I>(
    redriver: &Redriver<Q, I>,
    event: LambdaEvent<Value>,
) -> Result<RedriveReport, Error>
where
    Q: DeadLetterQueue,
    I: FunctionInvoker,
{
    info!(
        target_function = %redriver.config().target_function,
        "Redrive invocation received"
    );

    match redriver.run_batch().await {
        Ok(report) => Ok(report),
        Err(e) => {
            error!("Redrive batch failed: {}", e);
            Ok(RedriveReport::default())
        }
    }
}

pub use self::function_handler as handler;
