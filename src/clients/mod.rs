//! Client modules for external API interactions

pub mod lambda_client;
pub mod sqs_client;

pub use lambda_client::{FunctionInvoker, LambdaInvoker};
pub use sqs_client::{DeadLetterQueue, SqsDeadLetterQueue};
