// src/aws/lambda.rs
// Lambda function forwarder. Each message becomes one synchronous invocation.

use async_trait::async_trait;
use aws_sdk_lambda::error::DisplayErrorContext;
use aws_sdk_lambda::primitives::Blob;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::common::{ForwardError, Item};
use crate::forwarder::{Forwarder, ForwarderKind};

/// Type tag of the Lambda forwarder in the mapping file.
pub const TYPE: &str = "Lambda";

#[async_trait]
pub trait FunctionInvoker: Send + Sync {
    /// Invoke the function with `payload`, returning the status code.
    async fn invoke(&self, function: &str, payload: &str) -> Result<i32, ForwardError>;
}

/// Lambda client adapter.
#[derive(Clone)]
pub struct AwsLambda {
    inner: aws_sdk_lambda::Client,
}

impl AwsLambda {
    pub fn new(inner: aws_sdk_lambda::Client) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl FunctionInvoker for AwsLambda {
    #[instrument(level = "debug", skip(self, payload))]
    async fn invoke(&self, function: &str, payload: &str) -> Result<i32, ForwardError> {
        let resp = self
            .inner
            .invoke()
            .function_name(function)
            .payload(Blob::new(payload.as_bytes()))
            .send()
            .await
            .map_err(|e| ForwardError::Function {
                target: function.to_string(),
                reason: DisplayErrorContext(&e).to_string(),
            })?;

        // Handled and unhandled function errors still come back as a 200.
        if let Some(function_error) = resp.function_error() {
            return Err(ForwardError::Function {
                target: function.to_string(),
                reason: function_error.to_string(),
            });
        }
        Ok(resp.status_code())
    }
}

pub struct LambdaForwarder {
    name: String,
    function: String,
    client: Arc<dyn FunctionInvoker>,
}

impl LambdaForwarder {
    /// The function is the item's `target`, or its name when unset.
    pub fn new(item: &Item, client: Arc<dyn FunctionInvoker>) -> Self {
        Self {
            name: item.name.clone(),
            function: item.target_or(&item.name).to_string(),
            client,
        }
    }

    pub fn function(&self) -> &str {
        &self.function
    }
}

#[async_trait]
impl Forwarder for LambdaForwarder {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ForwarderKind {
        ForwarderKind::Function
    }

    async fn push(&self, message: &str) -> Result<(), ForwardError> {
        if message.is_empty() {
            return Err(ForwardError::EmptyMessage);
        }

        let status = self.client.invoke(&self.function, message).await?;
        debug!(
            forwarder = %self.name,
            function = %self.function,
            status,
            "Invoked Lambda function"
        );
        Ok(())
    }
}
