// src/aws/sns.rs
// SNS topic forwarder.

use async_trait::async_trait;
use aws_sdk_sns::error::DisplayErrorContext;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::common::{ForwardError, Item};
use crate::forwarder::{Forwarder, ForwarderKind};

/// Type tag of the SNS forwarder in the mapping file.
pub const TYPE: &str = "SNS";

#[async_trait]
pub trait TopicPublisher: Send + Sync {
    /// Publish `message` to the topic, returning the message id.
    async fn publish(&self, topic_arn: &str, message: &str) -> Result<String, ForwardError>;
}

/// SNS client adapter.
#[derive(Clone)]
pub struct AwsSns {
    inner: aws_sdk_sns::Client,
}

impl AwsSns {
    pub fn new(inner: aws_sdk_sns::Client) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl TopicPublisher for AwsSns {
    #[instrument(level = "debug", skip(self, message))]
    async fn publish(&self, topic_arn: &str, message: &str) -> Result<String, ForwardError> {
        let resp = self
            .inner
            .publish()
            .topic_arn(topic_arn)
            .message(message)
            .send()
            .await
            .map_err(|e| ForwardError::Topic {
                target: topic_arn.to_string(),
                reason: DisplayErrorContext(&e).to_string(),
            })?;
        Ok(resp.message_id().unwrap_or_default().to_string())
    }
}

pub struct SnsForwarder {
    name: String,
    topic_arn: String,
    client: Arc<dyn TopicPublisher>,
}

impl SnsForwarder {
    /// The topic is the item's `target`, or its `topic` field when unset.
    pub fn new(item: &Item, client: Arc<dyn TopicPublisher>) -> Self {
        Self {
            name: item.name.clone(),
            topic_arn: item.target_or(&item.exchange_name).to_string(),
            client,
        }
    }

    pub fn topic_arn(&self) -> &str {
        &self.topic_arn
    }
}

#[async_trait]
impl Forwarder for SnsForwarder {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ForwarderKind {
        ForwarderKind::Topic
    }

    async fn push(&self, message: &str) -> Result<(), ForwardError> {
        if message.is_empty() {
            return Err(ForwardError::EmptyMessage);
        }

        let message_id = self.client.publish(&self.topic_arn, message).await?;
        debug!(
            forwarder = %self.name,
            topic = %self.topic_arn,
            message_id = %message_id,
            "Published message to SNS"
        );
        Ok(())
    }
}
