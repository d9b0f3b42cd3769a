// Lambda bootstrap entry point for the DLQ redrive function

use aws_config::BehaviorVersion;
use dlq_redrive::clients::{LambdaInvoker, SqsDeadLetterQueue};
use dlq_redrive::core::config::RedriveConfig;
use dlq_redrive::redrive::{Redriver, handler};
use lambda_runtime::{Error, run, service_fn};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Error> {
    dlq_redrive::setup_logging();

    // Validated once per cold start; a missing variable stops the function
    // before it touches the queue.
    let config = RedriveConfig::from_env().map_err(|e| {
        error!("Config error: {}", e);
        Error::from(e)
    })?;

    let shared = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let queue = SqsDeadLetterQueue::new(aws_sdk_sqs::Client::new(&shared), &config.queue_url);
    let invoker = LambdaInvoker::new(aws_sdk_lambda::Client::new(&shared))
        .keep_on_function_error(config.keep_on_function_error);

    if config.enforce_queue_policy {
        if let Err(e) = queue.apply_policy(&config.queue_policy()).await {
            error!("Failed to enforce dead letter queue policy: {}", e);
        }
    }

    info!(
        queue_url = %config.queue_url,
        target_function = %config.target_function,
        delete_mode = ?config.delete_mode,
        max_concurrency = config.max_concurrency,
        keep_on_function_error = config.keep_on_function_error,
        "Redrive function initialised"
    );

    let redriver = Redriver::new(config, queue, invoker);
    let redriver = &redriver;
    run(service_fn(move |event| async move { handler(redriver, event).await })).await
}
