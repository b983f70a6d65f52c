// src/lib.rs
// Forwards messages from RabbitMQ queues to AWS SNS topics, SQS queues and
// Lambda functions.
// A JSON mapping file declares consumer/forwarder pairs. `mapping` turns it
// into live objects through a pluggable `mapping::Helper`, and
// `supervisor` keeps each pair running, restarting it when it fails.

pub mod aws;
pub mod common;
pub mod config;
pub mod consumer;
pub mod forwarder;
pub mod mapping;
pub mod rabbitmq;
pub mod supervisor;

pub use common::{ConfigError, ConsumerError, ForwardError, Item, MappingError, PairEntry};
pub use config::Config;
pub use consumer::Consumer;
pub use forwarder::{ErrorForwarder, Forwarder, ForwarderKind};
pub use mapping::{Helper, Mapping, MappingLoader, Pair, Registry};
pub use supervisor::{HealthReport, PairState, Supervisor, SupervisorSettings};
