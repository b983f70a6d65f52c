// src/aws/mod.rs
// AWS-backed forwarders.
// Each forwarder talks to its service through a small client trait so the
// push path can be exercised without AWS. The `Aws*` adapters implement
// those traits on top of the SDK clients.

pub mod lambda;
pub mod sns;
pub mod sqs;

use aws_config::{BehaviorVersion, Region, SdkConfig};
use std::sync::Arc;
use tracing::debug;

pub use lambda::{AwsLambda, FunctionInvoker, LambdaForwarder};
pub use sns::{AwsSns, SnsForwarder, TopicPublisher};
pub use sqs::{AwsSqs, QueueSender, SqsForwarder};

/// Region and endpoint overrides for the AWS clients.
#[derive(Debug, Clone, Default)]
pub struct AwsSettings {
    pub region: Option<String>,
    pub sns_endpoint: Option<String>,
    pub sqs_endpoint: Option<String>,
    pub lambda_endpoint: Option<String>,
}

/// Shared service clients handed to every forwarder of the matching type.
#[derive(Clone)]
pub struct AwsClients {
    pub sns: Arc<dyn TopicPublisher>,
    pub sqs: Arc<dyn QueueSender>,
    pub lambda: Arc<dyn FunctionInvoker>,
}

impl AwsClients {
    /// Resolve credentials and region from the default provider chain.
    pub async fn load(settings: &AwsSettings) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &settings.region {
            loader = loader.region(Region::new(region.clone()));
        }
        let shared = loader.load().await;
        debug!(region = ?shared.region(), "Loaded AWS configuration");

        Self::from_sdk_config(&shared, settings)
    }

    /// Build the clients from an already resolved configuration. Makes no
    /// network calls.
    pub fn from_sdk_config(shared: &SdkConfig, settings: &AwsSettings) -> Self {
        let mut sns = aws_sdk_sns::config::Builder::from(shared);
        if let Some(endpoint) = &settings.sns_endpoint {
            sns = sns.endpoint_url(endpoint);
        }

        let mut sqs = aws_sdk_sqs::config::Builder::from(shared);
        if let Some(endpoint) = &settings.sqs_endpoint {
            sqs = sqs.endpoint_url(endpoint);
        }

        let mut lambda = aws_sdk_lambda::config::Builder::from(shared);
        if let Some(endpoint) = &settings.lambda_endpoint {
            lambda = lambda.endpoint_url(endpoint);
        }

        Self {
            sns: Arc::new(AwsSns::new(aws_sdk_sns::Client::from_conf(sns.build()))),
            sqs: Arc::new(AwsSqs::new(aws_sdk_sqs::Client::from_conf(sqs.build()))),
            lambda: Arc::new(AwsLambda::new(aws_sdk_lambda::Client::from_conf(
                lambda.build(),
            ))),
        }
    }
}
