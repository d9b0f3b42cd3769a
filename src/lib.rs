//! DLQ redrive - drains a dead letter queue back into the function that failed it.
//!
//! A scheduled (or manually triggered) Lambda receives up to ten messages from
//! an SQS dead letter queue, invokes the original Lambda function once per
//! message with the message body, and deletes each message only after that
//! invocation succeeded. Anything that fails stays on the queue for the next run.
//!
//! # Architecture
//!
//! The system uses:
//! - AWS Lambda for serverless execution
//! - SQS as the dead letter queue (`aws-sdk-sqs`)
//! - Synchronous `RequestResponse` invocations of the target (`aws-sdk-lambda`)
//! - Tokio for async runtime
//!
//! # Example
//!
//! ```no_run
//! use dlq_redrive::clients::{LambdaInvoker, SqsDeadLetterQueue};
//! use dlq_redrive::core::config::RedriveConfig;
//! use dlq_redrive::redrive::Redriver;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     dlq_redrive::setup_logging();
//!
//!     let config = RedriveConfig::new(
//!         "https://sqs.eu-west-1.amazonaws.com/123456789012/orders--dlq",
//!         "arn:aws:lambda:eu-west-1:123456789012:function:orders",
//!     );
//!     let shared = aws_config::load_from_env().await;
//!     let queue = SqsDeadLetterQueue::new(aws_sdk_sqs::Client::new(&shared), &config.queue_url);
//!     let invoker = LambdaInvoker::new(aws_sdk_lambda::Client::new(&shared));
//!
//!     let report = Redriver::new(config, queue, invoker).run_batch().await?;
//!     println!("Redrove {} of {} messages", report.redriven(), report.received);
//!     Ok(())
//! }
//! ```

pub mod clients;
pub mod core;
pub mod errors;
pub mod redrive;

/// Configure structured logging with JSON format for AWS Lambda environments.
///
/// This function sets up tracing-subscriber with a JSON formatter suitable for
/// `CloudWatch` Logs integration. The level comes from `RUST_LOG` and defaults
/// to `info`. Calling it more than once is harmless.
///
/// # Example
///
/// ```
/// dlq_redrive::setup_logging();
/// ```
pub fn setup_logging() {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().json().with_target(true);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}
