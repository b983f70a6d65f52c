// src/rabbitmq/connection.rs
use lapin::{Channel, Connection, ConnectionProperties};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::common::ConsumerError;

/// One broker connection with the single channel a consumer reads from.
pub struct BrokerSession {
    connection: Connection,
    channel: Channel,
}

impl BrokerSession {
    /// Connect to `uri` and open a channel, giving up after `connect_timeout`.
    pub async fn open(uri: &str, connect_timeout: Duration) -> Result<Self, ConsumerError> {
        debug!("Connecting to RabbitMQ with timeout {:?}", connect_timeout);

        let (connection, channel) = timeout(connect_timeout, async {
            let connection = Connection::connect(uri, ConnectionProperties::default()).await?;
            let channel = connection.create_channel().await?;
            Ok::<_, lapin::Error>((connection, channel))
        })
        .await??;

        info!(channel_id = channel.id(), "Connected to RabbitMQ");
        Ok(Self { connection, channel })
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Check if the channel and its connection are in a healthy state
    pub fn is_connected(&self) -> bool {
        self.connection.status().connected() && self.channel.status().connected()
    }

    /// Close channel and connection, logging rather than failing.
    pub async fn close(self) {
        if self.channel.status().connected() {
            if let Err(e) = self.channel.close(200, "Closing consumer").await {
                warn!("Failed to close channel: {}", e);
            }
        }

        if self.connection.status().connected() {
            if let Err(e) = self.connection.close(200, "Closing connection").await {
                warn!("Failed to close connection: {}", e);
            }
        }
    }
}
