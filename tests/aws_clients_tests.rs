use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use aws_sdk_lambda::Client as LambdaClient;
use aws_sdk_lambda::operation::invoke::{InvokeError, InvokeOutput};
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::InvocationType;
use aws_sdk_lambda::types::error::ResourceNotFoundException;
use aws_sdk_sqs::Client as SqsClient;
use aws_sdk_sqs::operation::delete_message_batch::DeleteMessageBatchOutput;
use aws_sdk_sqs::operation::get_queue_attributes::GetQueueAttributesOutput;
use aws_sdk_sqs::operation::receive_message::{ReceiveMessageError, ReceiveMessageOutput};
use aws_sdk_sqs::operation::set_queue_attributes::SetQueueAttributesOutput;
use aws_sdk_sqs::types::error::QueueDoesNotExist;
use aws_sdk_sqs::types::{
    BatchResultErrorEntry, DeleteMessageBatchResultEntry, Message, QueueAttributeName,
};
use aws_smithy_http_client::test_util::NeverClient;
use aws_smithy_mocks::{RuleMode, mock, mock_client};
use dlq_redrive::clients::{DeadLetterQueue, FunctionInvoker, LambdaInvoker, SqsDeadLetterQueue};
use dlq_redrive::core::models::ReceiveRequest;
use dlq_redrive::core::policy::{
    DeadLetterQueuePolicy, SSL_ENFORCEMENT_SID, ssl_enforcement_statement,
};
use dlq_redrive::errors::RedriveError;
use serde_json::{Value, json};

const QUEUE_URL: &str = "https://sqs.eu-west-1.amazonaws.com/123456789012/orders--dlq";
const QUEUE_ARN: &str = "arn:aws:sqs:eu-west-1:123456789012:orders--dlq";
const TARGET: &str = "arn:aws:lambda:eu-west-1:123456789012:function:orders";

type Attributes = HashMap<QueueAttributeName, String>;

#[tokio::test]
async fn test_receive_uses_redrive_parameters_and_maps_messages() {
    let rule = mock!(SqsClient::receive_message)
        .match_requests(|req| {
            req.queue_url() == Some(QUEUE_URL)
                && req.max_number_of_messages() == Some(10)
                && req.wait_time_seconds() == Some(10)
        })
        .then_output(|| {
            ReceiveMessageOutput::builder()
                .messages(
                    Message::builder()
                        .message_id("m-1")
                        .body(r#"{"test": "message"}"#)
                        .receipt_handle("receipt-1")
                        .build(),
                )
                .messages(Message::builder().message_id("m-2").build())
                .build()
        });
    let queue = SqsDeadLetterQueue::new(mock_client!(aws_sdk_sqs, &[&rule]), QUEUE_URL);

    let messages = queue.receive(&ReceiveRequest::redrive()).await.unwrap();

    assert_eq!(rule.num_calls(), 1);
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].message_id.as_deref(), Some("m-1"));
    assert_eq!(messages[0].body.as_deref(), Some(r#"{"test": "message"}"#));
    assert_eq!(messages[0].receipt_handle.as_deref(), Some("receipt-1"));
    assert_eq!(messages[1].body, None);
    assert_eq!(messages[1].receipt_handle, None);
}

#[tokio::test]
async fn test_receive_without_messages_is_empty() {
    let rule = mock!(SqsClient::receive_message)
        .then_output(|| ReceiveMessageOutput::builder().build());
    let queue = SqsDeadLetterQueue::new(mock_client!(aws_sdk_sqs, &[&rule]), QUEUE_URL);

    let messages = queue.receive(&ReceiveRequest::redrive()).await.unwrap();

    assert!(messages.is_empty());
}

#[tokio::test]
async fn test_receive_failure_maps_to_receive_error() {
    let rule = mock!(SqsClient::receive_message).then_error(|| {
        ReceiveMessageError::QueueDoesNotExist(QueueDoesNotExist::builder().build())
    });
    let queue = SqsDeadLetterQueue::new(mock_client!(aws_sdk_sqs, &[&rule]), QUEUE_URL);

    let err = queue.receive(&ReceiveRequest::redrive()).await.unwrap_err();

    assert!(matches!(err, RedriveError::ReceiveError(_)), "{err:?}");
}

#[tokio::test]
async fn test_receive_gives_up_after_timeout() {
    let http_client = NeverClient::new();
    let config = aws_sdk_sqs::Config::builder()
        .with_test_defaults_v2()
        .http_client(http_client.clone())
        .build();
    let queue = SqsDeadLetterQueue::new(SqsClient::from_conf(config), QUEUE_URL);
    let request = ReceiveRequest {
        timeout: Duration::from_millis(50),
        ..ReceiveRequest::redrive()
    };

    let err = queue.receive(&request).await.unwrap_err();

    match err {
        RedriveError::ReceiveTimeout(after) => assert_eq!(after, Duration::from_millis(50)),
        other => panic!("Unexpected error: {other:?}"),
    }
    assert_eq!(http_client.num_calls(), 1);
}

#[tokio::test]
async fn test_batch_delete_maps_entry_failures_across_chunks() {
    let chunk_sizes = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&chunk_sizes);
    let rule = mock!(SqsClient::delete_message_batch).then_compute_output(move |req| {
        seen.lock().unwrap().push(req.entries().len());

        let mut successful = Vec::new();
        let mut failed = Vec::new();
        for entry in req.entries() {
            assert_eq!(entry.receipt_handle(), format!("receipt-{}", entry.id()));
            if entry.id() == "1" {
                failed.push(
                    BatchResultErrorEntry::builder()
                        .id(entry.id())
                        .sender_fault(true)
                        .code("ReceiptHandleIsInvalid")
                        .message("The receipt handle has expired")
                        .build()
                        .unwrap(),
                );
            } else {
                successful.push(
                    DeleteMessageBatchResultEntry::builder()
                        .id(entry.id())
                        .build()
                        .unwrap(),
                );
            }
        }
        DeleteMessageBatchOutput::builder()
            .set_successful(Some(successful))
            .set_failed(Some(failed))
            .build()
            .unwrap()
    });
    let queue = SqsDeadLetterQueue::new(
        mock_client!(aws_sdk_sqs, RuleMode::MatchAny, &[&rule]),
        QUEUE_URL,
    );
    let receipts: Vec<String> = (0..12).map(|n| format!("receipt-{n}")).collect();

    let results = queue.delete_batch(&receipts).await;

    assert_eq!(*chunk_sizes.lock().unwrap(), vec![10, 2]);
    assert_eq!(results.len(), 12);
    assert!(results[0].is_ok());
    match &results[1] {
        Err(RedriveError::DeleteError(reason)) => {
            assert!(reason.contains("ReceiptHandleIsInvalid"), "{reason}");
        }
        other => panic!("Unexpected result: {other:?}"),
    }
    assert!(results[2..].iter().all(Result::is_ok));
}

fn depth_queue(reported: Option<&'static str>) -> SqsDeadLetterQueue {
    let rule = mock!(SqsClient::get_queue_attributes)
        .match_requests(|req| {
            req.attribute_names() == [QueueAttributeName::ApproximateNumberOfMessages]
        })
        .then_output(move || {
            let mut output = GetQueueAttributesOutput::builder();
            if let Some(value) = reported {
                output = output.attributes(QueueAttributeName::ApproximateNumberOfMessages, value);
            }
            output.build()
        });
    SqsDeadLetterQueue::new(mock_client!(aws_sdk_sqs, &[&rule]), QUEUE_URL)
}

#[tokio::test]
async fn test_approximate_depth_parsing() {
    assert_eq!(depth_queue(Some("12")).approximate_depth().await.unwrap(), Some(12));
    assert_eq!(depth_queue(Some("0")).approximate_depth().await.unwrap(), Some(0));
    assert_eq!(depth_queue(Some("lots")).approximate_depth().await.unwrap(), None);
    assert_eq!(depth_queue(None).approximate_depth().await.unwrap(), None);
}

/// Queue whose access policy is `existing`; the attributes written by
/// `SetQueueAttributes` end up in the returned slot.
fn policy_queue(existing: Option<Value>) -> (SqsDeadLetterQueue, Arc<Mutex<Option<Attributes>>>) {
    let written = Arc::new(Mutex::new(None));

    let read = mock!(SqsClient::get_queue_attributes)
        .match_requests(|req| {
            req.attribute_names().contains(&QueueAttributeName::QueueArn)
                && req.attribute_names().contains(&QueueAttributeName::Policy)
        })
        .then_output(move || {
            let mut output =
                GetQueueAttributesOutput::builder().attributes(QueueAttributeName::QueueArn, QUEUE_ARN);
            if let Some(policy) = &existing {
                output = output.attributes(QueueAttributeName::Policy, policy.to_string());
            }
            output.build()
        });

    let slot = Arc::clone(&written);
    let write = mock!(SqsClient::set_queue_attributes)
        .match_requests(|req| req.queue_url() == Some(QUEUE_URL))
        .then_compute_output(move |req| {
            *slot.lock().unwrap() = req.attributes().cloned();
            SetQueueAttributesOutput::builder().build()
        });

    let client = mock_client!(aws_sdk_sqs, RuleMode::MatchAny, &[&read, &write]);
    (SqsDeadLetterQueue::new(client, QUEUE_URL), written)
}

#[tokio::test]
async fn test_apply_policy_merges_into_existing_access_policy() {
    let allow_topic = json!({
        "Sid": "AllowOrdersTopic",
        "Effect": "Allow",
        "Principal": { "Service": "sns.amazonaws.com" },
        "Action": "sqs:SendMessage",
        "Resource": QUEUE_ARN
    });
    let (queue, written) = policy_queue(Some(json!({
        "Version": "2012-10-17",
        "Statement": [allow_topic.clone()]
    })));

    queue
        .apply_policy(&DeadLetterQueuePolicy::default())
        .await
        .unwrap();

    let attrs = written.lock().unwrap().clone().unwrap();
    assert_eq!(
        attrs.get(&QueueAttributeName::MessageRetentionPeriod).map(String::as_str),
        Some("1209600")
    );
    let policy: Value = serde_json::from_str(&attrs[&QueueAttributeName::Policy]).unwrap();
    assert_eq!(
        policy["Statement"],
        json!([allow_topic, ssl_enforcement_statement(QUEUE_ARN)])
    );
}

#[tokio::test]
async fn test_apply_policy_leaves_enforced_access_policy_alone() {
    let (queue, written) = policy_queue(Some(json!({
        "Version": "2012-10-17",
        "Statement": [ssl_enforcement_statement(QUEUE_ARN)]
    })));

    queue
        .apply_policy(&DeadLetterQueuePolicy::default())
        .await
        .unwrap();

    let attrs = written.lock().unwrap().clone().unwrap();
    assert!(!attrs.contains_key(&QueueAttributeName::Policy));
    assert!(attrs.contains_key(&QueueAttributeName::KmsMasterKeyId));
}

#[tokio::test]
async fn test_apply_policy_on_queue_without_access_policy() {
    let (queue, written) = policy_queue(None);

    queue
        .apply_policy(&DeadLetterQueuePolicy::default())
        .await
        .unwrap();

    let attrs = written.lock().unwrap().clone().unwrap();
    let policy: Value = serde_json::from_str(&attrs[&QueueAttributeName::Policy]).unwrap();
    assert_eq!(policy["Statement"][0]["Sid"], SSL_ENFORCEMENT_SID);
    assert_eq!(policy["Statement"].as_array().map(Vec::len), Some(1));
}

fn function_error_client() -> LambdaClient {
    let rule = mock!(LambdaClient::invoke).then_output(|| {
        InvokeOutput::builder()
            .status_code(200)
            .function_error("Unhandled")
            .payload(Blob::new(r#"{"errorMessage":"boom"}"#))
            .build()
    });
    mock_client!(aws_sdk_lambda, &[&rule])
}

#[tokio::test]
async fn test_invoke_sends_payload_synchronously() {
    let rule = mock!(LambdaClient::invoke)
        .match_requests(|req| {
            req.function_name() == Some(TARGET)
                && req.invocation_type() == Some(&InvocationType::RequestResponse)
                && req.payload().map(|p| p.as_ref()) == Some(br#"{"n":1}"#.as_slice())
        })
        .then_output(|| InvokeOutput::builder().status_code(200).build());
    let invoker = LambdaInvoker::new(mock_client!(aws_sdk_lambda, &[&rule]));

    invoker.invoke(TARGET, br#"{"n":1}"#.to_vec()).await.unwrap();

    assert_eq!(rule.num_calls(), 1);
}

#[tokio::test]
async fn test_function_error_still_counts_as_delivered_by_default() {
    let invoker = LambdaInvoker::new(function_error_client());

    assert!(invoker.invoke(TARGET, b"{}".to_vec()).await.is_ok());
}

#[tokio::test]
async fn test_function_error_fails_when_keeping_messages() {
    let invoker = LambdaInvoker::new(function_error_client()).keep_on_function_error(true);

    match invoker.invoke(TARGET, b"{}".to_vec()).await {
        Err(RedriveError::FunctionError(detail)) => {
            assert!(detail.starts_with("Unhandled"), "{detail}");
            assert!(detail.contains("boom"), "{detail}");
        }
        other => panic!("Unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn test_invoke_api_failure_maps_to_invoke_error() {
    let rule = mock!(LambdaClient::invoke).then_error(|| {
        InvokeError::ResourceNotFoundException(ResourceNotFoundException::builder().build())
    });
    let invoker = LambdaInvoker::new(mock_client!(aws_sdk_lambda, &[&rule]));

    let err = invoker.invoke(TARGET, b"{}".to_vec()).await.unwrap_err();

    assert!(matches!(err, RedriveError::InvokeError(_)), "{err:?}");
}
