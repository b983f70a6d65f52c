// src/rabbitmq/mod.rs
// RabbitMQ implementation of the consumer capability

pub mod connection;
pub mod consumer;

// Re-export specific items to simplify imports elsewhere
pub use connection::BrokerSession;
pub use consumer::{ConsumerSettings, RabbitConsumer, TYPE};
