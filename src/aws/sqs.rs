// src/aws/sqs.rs
// SQS queue forwarder.

use async_trait::async_trait;
use aws_sdk_sqs::error::DisplayErrorContext;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::common::{ForwardError, Item};
use crate::forwarder::{Forwarder, ForwarderKind};

/// Type tag of the SQS forwarder in the mapping file.
pub const TYPE: &str = "SQS";

#[async_trait]
pub trait QueueSender: Send + Sync {
    /// Send `body` to the queue, returning the message id.
    async fn send_message(&self, queue_url: &str, body: &str) -> Result<String, ForwardError>;
}

/// SQS client adapter.
#[derive(Clone)]
pub struct AwsSqs {
    inner: aws_sdk_sqs::Client,
}

impl AwsSqs {
    pub fn new(inner: aws_sdk_sqs::Client) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl QueueSender for AwsSqs {
    #[instrument(level = "debug", skip(self, body))]
    async fn send_message(&self, queue_url: &str, body: &str) -> Result<String, ForwardError> {
        let resp = self
            .inner
            .send_message()
            .queue_url(queue_url)
            .message_body(body)
            .send()
            .await
            .map_err(|e| ForwardError::Queue {
                target: queue_url.to_string(),
                reason: DisplayErrorContext(&e).to_string(),
            })?;
        Ok(resp.message_id().unwrap_or_default().to_string())
    }
}

pub struct SqsForwarder {
    name: String,
    queue_url: String,
    client: Arc<dyn QueueSender>,
}

impl SqsForwarder {
    /// The queue is the item's `target`, or its `queue` field when unset.
    pub fn new(item: &Item, client: Arc<dyn QueueSender>) -> Self {
        Self {
            name: item.name.clone(),
            queue_url: item.target_or(&item.queue_name).to_string(),
            client,
        }
    }

    pub fn queue_url(&self) -> &str {
        &self.queue_url
    }
}

#[async_trait]
impl Forwarder for SqsForwarder {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ForwarderKind {
        ForwarderKind::Queue
    }

    async fn push(&self, message: &str) -> Result<(), ForwardError> {
        if message.is_empty() {
            return Err(ForwardError::EmptyMessage);
        }

        let message_id = self.client.send_message(&self.queue_url, message).await?;
        debug!(
            forwarder = %self.name,
            queue = %self.queue_url,
            message_id = %message_id,
            "Sent message to SQS"
        );
        Ok(())
    }
}
