// src/mapping/helper.rs
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::aws::{self, AwsClients, LambdaForwarder, SnsForwarder, SqsForwarder};
use crate::common::Item;
use crate::consumer::Consumer;
use crate::forwarder::{ErrorForwarder, Forwarder};
use crate::rabbitmq::{self, ConsumerSettings, RabbitConsumer};

/// Turns mapping items into consumers and forwarders.
pub trait Helper: Send + Sync {
    /// `None` when no consumer is registered for `item.kind`.
    fn create_consumer(&self, item: &Item) -> Option<Arc<dyn Consumer>>;

    /// An [`ErrorForwarder`] when no forwarder is registered for `item.kind`.
    fn create_forwarder(&self, item: &Item) -> Arc<dyn Forwarder>;
}

pub type ConsumerConstructor = Box<dyn Fn(&Item) -> Arc<dyn Consumer> + Send + Sync>;
pub type ForwarderConstructor = Box<dyn Fn(&Item) -> Arc<dyn Forwarder> + Send + Sync>;

/// Type-tag keyed constructor table.
#[derive(Default)]
pub struct Registry {
    consumers: HashMap<String, ConsumerConstructor>,
    forwarders: HashMap<String, ForwarderConstructor>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// RabbitMQ consumers plus SNS, SQS and Lambda forwarders.
    pub fn with_defaults(clients: AwsClients, settings: ConsumerSettings) -> Self {
        let mut registry = Self::new();

        registry.register_consumer(rabbitmq::TYPE, move |item: &Item| -> Arc<dyn Consumer> {
            Arc::new(RabbitConsumer::new(item, settings.clone()))
        });

        let sns = clients.sns;
        registry.register_forwarder(aws::sns::TYPE, move |item: &Item| -> Arc<dyn Forwarder> {
            Arc::new(SnsForwarder::new(item, sns.clone()))
        });

        let sqs = clients.sqs;
        registry.register_forwarder(aws::sqs::TYPE, move |item: &Item| -> Arc<dyn Forwarder> {
            Arc::new(SqsForwarder::new(item, sqs.clone()))
        });

        let lambda = clients.lambda;
        registry.register_forwarder(aws::lambda::TYPE, move |item: &Item| -> Arc<dyn Forwarder> {
            Arc::new(LambdaForwarder::new(item, lambda.clone()))
        });

        registry
    }

    /// Registering an existing tag replaces its constructor.
    pub fn register_consumer<F>(&mut self, kind: impl Into<String>, constructor: F) -> &mut Self
    where
        F: Fn(&Item) -> Arc<dyn Consumer> + Send + Sync + 'static,
    {
        self.consumers.insert(kind.into(), Box::new(constructor));
        self
    }

    pub fn register_forwarder<F>(&mut self, kind: impl Into<String>, constructor: F) -> &mut Self
    where
        F: Fn(&Item) -> Arc<dyn Forwarder> + Send + Sync + 'static,
    {
        self.forwarders.insert(kind.into(), Box::new(constructor));
        self
    }

    pub fn consumer_types(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.consumers.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    pub fn forwarder_types(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.forwarders.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}

impl Helper for Registry {
    fn create_consumer(&self, item: &Item) -> Option<Arc<dyn Consumer>> {
        match self.consumers.get(&item.kind) {
            Some(constructor) => Some(constructor(item)),
            None => {
                warn!(consumer = %item.name, "No consumer registered for type '{}'", item.kind);
                None
            }
        }
    }

    fn create_forwarder(&self, item: &Item) -> Arc<dyn Forwarder> {
        match self.forwarders.get(&item.kind) {
            Some(constructor) => constructor(item),
            None => {
                warn!(forwarder = %item.name, "No forwarder registered for type '{}'", item.kind);
                Arc::new(ErrorForwarder::new(item.kind.clone()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::{testing::offline_sdk_config, AwsSettings};
    use crate::common::ForwardError;
    use crate::forwarder::ForwarderKind;

    fn registry() -> Registry {
        let clients = AwsClients::from_sdk_config(&offline_sdk_config(), &AwsSettings::default());
        Registry::with_defaults(clients, ConsumerSettings::default())
    }

    #[test]
    fn test_create_consumer() {
        let item = Item::new("RabbitMQ", "test-rabbit")
            .with_connection("url")
            .with_exchange("topic")
            .with_queue("test-queue")
            .with_routing_key("#");

        let consumer = registry().create_consumer(&item).expect("consumer");
        assert_eq!(consumer.name(), "test-rabbit");
    }

    #[test]
    fn test_create_consumer_unknown_type() {
        let item = Item::new("Kafka", "test-kafka");
        assert!(registry().create_consumer(&item).is_none());
    }

    #[test]
    fn test_create_forwarder_variants() {
        let registry = registry();

        let sns = registry.create_forwarder(&Item::new("SNS", "test-sns").with_exchange("topic"));
        assert_eq!(sns.name(), "test-sns");
        assert_eq!(sns.kind(), ForwarderKind::Topic);

        let sqs = registry.create_forwarder(&Item::new("SQS", "test-sqs").with_queue("test-queue"));
        assert_eq!(sqs.name(), "test-sqs");
        assert_eq!(sqs.kind(), ForwarderKind::Queue);

        let lambda = registry.create_forwarder(&Item::new("Lambda", "test-lambda"));
        assert_eq!(lambda.name(), "test-lambda");
        assert_eq!(lambda.kind(), ForwarderKind::Function);
    }

    #[tokio::test]
    async fn test_create_forwarder_unknown_type_fails_on_push() {
        let forwarder = registry().create_forwarder(&Item::new("Kinesis", "test-kinesis"));
        assert_eq!(forwarder.kind(), ForwarderKind::Unresolved);
        assert!(matches!(
            forwarder.push("message").await,
            Err(ForwardError::UnknownType(_))
        ));
    }

    #[test]
    fn test_register_custom_variant() {
        let mut registry = Registry::new();
        registry.register_forwarder("Null", |_item: &Item| -> Arc<dyn Forwarder> {
            Arc::new(ErrorForwarder::new("Null"))
        });

        assert_eq!(registry.forwarder_types(), vec!["Null"]);
        assert!(registry.consumer_types().is_empty());
        assert_eq!(
            registry.create_forwarder(&Item::new("Null", "n")).name(),
            ErrorForwarder::NAME
        );
    }

    #[test]
    fn test_default_types() {
        let registry = registry();
        assert_eq!(registry.consumer_types(), vec!["RabbitMQ"]);
        assert_eq!(registry.forwarder_types(), vec!["Lambda", "SNS", "SQS"]);
    }
}
