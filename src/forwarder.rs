// src/forwarder.rs
use async_trait::async_trait;
use std::fmt;

use crate::common::ForwardError;

/// Which kind of destination a forwarder delivers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwarderKind {
    Topic,
    Queue,
    Function,
    /// Placeholder for an item whose type has no registered forwarder.
    Unresolved,
}

impl fmt::Display for ForwarderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ForwarderKind::Topic => "topic",
            ForwarderKind::Queue => "queue",
            ForwarderKind::Function => "function",
            ForwarderKind::Unresolved => "unresolved",
        };
        f.write_str(label)
    }
}

/// Delivers one message payload to a downstream endpoint.
///
/// Implementations must tolerate concurrent `push` calls, since one
/// forwarder may be shared by several consumers.
#[async_trait]
pub trait Forwarder: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> ForwarderKind;

    async fn push(&self, message: &str) -> Result<(), ForwardError>;
}

/// Returned for an item whose type has no forwarder. Every push fails.
#[derive(Debug, Clone)]
pub struct ErrorForwarder {
    kind: String,
}

impl ErrorForwarder {
    pub const NAME: &'static str = "error-forwarder";

    pub fn new(kind: impl Into<String>) -> Self {
        Self { kind: kind.into() }
    }
}

#[async_trait]
impl Forwarder for ErrorForwarder {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn kind(&self) -> ForwarderKind {
        ForwarderKind::Unresolved
    }

    async fn push(&self, _message: &str) -> Result<(), ForwardError> {
        Err(ForwardError::UnknownType(self.kind.clone()))
    }
}
