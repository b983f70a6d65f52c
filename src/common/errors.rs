// src/common/errors.rs

use std::path::PathBuf;

use lapin::Error as LapinError;
use serde_json::Error as SerdeError;
use thiserror::Error;
use tokio::time::error::Elapsed;

/// Failures while turning the mapping file into consumer/forwarder pairs.
#[derive(Debug, Error)]
pub enum MappingError {
    #[error("Failed to read mapping file {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Mapping file {path} contains invalid JSON or missing required fields: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: SerdeError,
    },

    #[error("Unknown consumer type '{kind}' for consumer '{name}'")]
    UnknownConsumerType { name: String, kind: String },

    #[error("Unknown forwarder type '{kind}' for forwarder '{name}'")]
    UnknownForwarderType { name: String, kind: String },

    #[error("Consumer name '{0}' is used by more than one mapping entry")]
    DuplicateConsumer(String),
}

/// A single message could not be delivered downstream.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("Message is empty")]
    EmptyMessage,

    #[error("No forwarder registered for type '{0}'")]
    UnknownType(String),

    #[error("Failed to publish to topic {target}: {reason}")]
    Topic { target: String, reason: String },

    #[error("Failed to send to queue {target}: {reason}")]
    Queue { target: String, reason: String },

    #[error("Failed to invoke function {target}: {reason}")]
    Function { target: String, reason: String },
}

/// Errors that end a consumer run.
#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("RabbitMQ connection error: {0}")]
    Connection(#[from] LapinError),

    #[error("Failed to declare {0}")]
    Topology(String),

    #[error("Connection timeout: {0}")]
    Timeout(String),

    #[error("Delivery stream closed by the broker")]
    StreamClosed,
}

impl From<Elapsed> for ConsumerError {
    fn from(_: Elapsed) -> Self {
        ConsumerError::Timeout("Connection timed out".to_string())
    }
}

/// Process configuration read from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Environment variable {0} is not set")]
    Missing(&'static str),

    #[error("Environment variable {name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}
