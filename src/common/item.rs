// src/common/item.rs
use serde::{Deserialize, Serialize};

/// Declarative description of one consumer or forwarder endpoint.
///
/// The JSON keys follow the mapping file format: `type`, `name`,
/// `connection`, `topic`, `queue`, `routing` and `target`. Everything but
/// `type` and `name` may be omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    #[serde(rename = "type")]
    pub kind: String,

    pub name: String,

    #[serde(rename = "connection", default)]
    pub connection_url: String,

    #[serde(rename = "topic", default)]
    pub exchange_name: String,

    #[serde(rename = "queue", default)]
    pub queue_name: String,

    #[serde(rename = "routing", default)]
    pub routing_key: String,

    /// Destination address (topic ARN, queue URL, function name).
    #[serde(default)]
    pub target: String,
}

impl Item {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_connection(mut self, url: impl Into<String>) -> Self {
        self.connection_url = url.into();
        self
    }

    pub fn with_exchange(mut self, exchange: impl Into<String>) -> Self {
        self.exchange_name = exchange.into();
        self
    }

    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue_name = queue.into();
        self
    }

    pub fn with_routing_key(mut self, routing_key: impl Into<String>) -> Self {
        self.routing_key = routing_key.into();
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    /// Routing keys to bind; a comma separated `routing` field yields several.
    /// An empty field binds with the empty key.
    pub fn routing_keys(&self) -> Vec<String> {
        let keys: Vec<String> = self
            .routing_key
            .split(',')
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(str::to_string)
            .collect();

        if keys.is_empty() {
            vec![String::new()]
        } else {
            keys
        }
    }

    /// `target` when set, otherwise the given fallback field.
    pub fn target_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        if self.target.is_empty() {
            fallback
        } else {
            &self.target
        }
    }
}

/// One element of the mapping file: a consumer side and a forwarder side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairEntry {
    pub source: Item,
    pub destination: Item,
}
