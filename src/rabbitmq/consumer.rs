// src/rabbitmq/consumer.rs
use async_trait::async_trait;
use futures::StreamExt;
use lapin::{
    message::Delivery,
    options::*,
    types::{AMQPValue, FieldTable},
    Channel, ExchangeKind,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::connection::BrokerSession;
use crate::common::{ConsumerError, Item};
use crate::consumer::{serve_checks_during, unless_stopped, Consumer, HealthChecks, StopSignal};
use crate::forwarder::Forwarder;

/// Type tag of the RabbitMQ consumer in the mapping file.
pub const TYPE: &str = "RabbitMQ";

const DEAD_LETTER_SUFFIX: &str = "-dead-letter";

/// Broker-side options shared by every RabbitMQ consumer.
#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    /// Number of unacknowledged messages allowed (0 means unlimited)
    pub prefetch_count: u16,
    pub connect_timeout: Duration,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            prefetch_count: 10,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Consumes one queue bound to a topic exchange and pushes every delivery to
/// its forwarder. Rejected deliveries end up in `<queue>-dead-letter`.
#[derive(Debug, Clone)]
pub struct RabbitConsumer {
    name: String,
    connection_url: String,
    exchange: String,
    queue: String,
    routing_keys: Vec<String>,
    settings: ConsumerSettings,
}

impl RabbitConsumer {
    /// Binds the item's fields. No connection is made until `start`.
    pub fn new(item: &Item, settings: ConsumerSettings) -> Self {
        Self {
            name: item.name.clone(),
            connection_url: item.connection_url.clone(),
            exchange: item.exchange_name.clone(),
            queue: item.queue_name.clone(),
            routing_keys: item.routing_keys(),
            settings,
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn dead_letter_name(&self) -> String {
        format!("{}{}", self.queue, DEAD_LETTER_SUFFIX)
    }

    async fn declare_topology(&self, channel: &Channel) -> Result<(), ConsumerError> {
        let dead_letter = self.dead_letter_name();
        channel
            .exchange_declare(
                &dead_letter,
                ExchangeKind::Fanout,
                durable_exchange(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| ConsumerError::Topology(format!("exchange {}: {}", dead_letter, e)))?;
        channel
            .queue_declare(&dead_letter, durable_queue(), FieldTable::default())
            .await
            .map_err(|e| ConsumerError::Topology(format!("queue {}: {}", dead_letter, e)))?;
        channel
            .queue_bind(
                &dead_letter,
                &dead_letter,
                "",
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| ConsumerError::Topology(format!("binding {}: {}", dead_letter, e)))?;

        let mut arguments = FieldTable::default();
        arguments.insert(
            "x-dead-letter-exchange".into(),
            AMQPValue::LongString(dead_letter.clone().into()),
        );
        let queue = channel
            .queue_declare(&self.queue, durable_queue(), arguments)
            .await
            .map_err(|e| ConsumerError::Topology(format!("queue {}: {}", self.queue, e)))?;

        info!(
            consumer = %self.name,
            "Queue '{}' declared with {} messages",
            self.queue,
            queue.message_count()
        );

        // The default exchange routes by queue name and takes no bindings.
        if !self.exchange.is_empty() {
            channel
                .exchange_declare(
                    &self.exchange,
                    ExchangeKind::Topic,
                    durable_exchange(),
                    FieldTable::default(),
                )
                .await
                .map_err(|e| {
                    ConsumerError::Topology(format!("exchange {}: {}", self.exchange, e))
                })?;

            for routing_key in &self.routing_keys {
                channel
                    .queue_bind(
                        &self.queue,
                        &self.exchange,
                        routing_key,
                        QueueBindOptions::default(),
                        FieldTable::default(),
                    )
                    .await
                    .map_err(|e| {
                        ConsumerError::Topology(format!(
                            "binding {} -> {} ({}): {}",
                            self.exchange, self.queue, routing_key, e
                        ))
                    })?;
            }
        }

        channel
            .basic_qos(self.settings.prefetch_count, BasicQosOptions::default())
            .await?;

        Ok(())
    }

    /// Connect, declare the topology and subscribe. Every step after the
    /// connect shares one `connect_timeout`; the session is closed on failure.
    async fn open_session(
        &self,
    ) -> Result<(BrokerSession, lapin::Consumer, String), ConsumerError> {
        let session =
            BrokerSession::open(&self.connection_url, self.settings.connect_timeout).await?;

        match timeout(self.settings.connect_timeout, self.subscribe(session.channel())).await {
            Ok(Ok((deliveries, consumer_tag))) => Ok((session, deliveries, consumer_tag)),
            Ok(Err(e)) => {
                session.close().await;
                Err(e)
            }
            Err(_) => {
                session.close().await;
                Err(ConsumerError::Timeout(format!(
                    "Setting up queue {} timed out",
                    self.queue
                )))
            }
        }
    }

    async fn subscribe(&self, channel: &Channel) -> Result<(lapin::Consumer, String), ConsumerError> {
        self.declare_topology(channel).await?;

        let consumer_tag = format!("{}-{}", self.name, Uuid::new_v4());
        let deliveries = channel
            .basic_consume(
                &self.queue,
                &consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        Ok((deliveries, consumer_tag))
    }

    async fn forward(&self, forwarder: &dyn Forwarder, delivery: Delivery) {
        let message = String::from_utf8_lossy(&delivery.data);

        match forwarder.push(&message).await {
            Ok(()) => {
                debug!(
                    consumer = %self.name,
                    forwarder = %forwarder.name(),
                    "Message forwarded"
                );
                if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                    error!(consumer = %self.name, "Failed to acknowledge message: {}", e);
                }
            }
            Err(e) => {
                error!(
                    consumer = %self.name,
                    forwarder = %forwarder.name(),
                    "Could not forward message: {}",
                    e
                );
                if let Err(e) = delivery
                    .reject(BasicRejectOptions { requeue: false })
                    .await
                {
                    error!(consumer = %self.name, "Failed to reject message: {}", e);
                }
            }
        }
    }
}

fn durable_exchange() -> ExchangeDeclareOptions {
    ExchangeDeclareOptions {
        durable: true,
        ..ExchangeDeclareOptions::default()
    }
}

fn durable_queue() -> QueueDeclareOptions {
    QueueDeclareOptions {
        durable: true,
        ..QueueDeclareOptions::default()
    }
}

#[async_trait]
impl Consumer for RabbitConsumer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(
        &self,
        forwarder: Arc<dyn Forwarder>,
        checks: &mut HealthChecks,
        mut stop: StopSignal,
    ) -> Result<(), ConsumerError> {
        let opened = unless_stopped(self.open_session(), checks, &mut stop).await;
        let (session, mut deliveries, consumer_tag) = match opened {
            Some(opened) => opened?,
            None => {
                info!(consumer = %self.name, "Stop requested before consuming started");
                return Ok(());
            }
        };

        info!(
            consumer = %self.name,
            forwarder = %forwarder.name(),
            queue = %self.queue,
            "Started consuming"
        );

        loop {
            tokio::select! {
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
                Some(reply) = checks.recv() => {
                    let _ = reply.send(session.is_connected());
                }
                delivery = deliveries.next() => {
                    match delivery {
                        Some(Ok(delivery)) => {
                            let forwarding = self.forward(forwarder.as_ref(), delivery);
                            serve_checks_during(forwarding, checks, || session.is_connected())
                                .await;
                        }
                        Some(Err(e)) => {
                            error!(consumer = %self.name, "Error receiving message: {}", e);
                            session.close().await;
                            return Err(e.into());
                        }
                        None => {
                            warn!(consumer = %self.name, "Delivery stream ended");
                            session.close().await;
                            return Err(ConsumerError::StreamClosed);
                        }
                    }
                }
            }
        }

        info!(consumer = %self.name, "Stop requested, closing consumer");
        if let Err(e) = session
            .channel()
            .basic_cancel(&consumer_tag, BasicCancelOptions::default())
            .await
        {
            warn!(consumer = %self.name, "Failed to cancel consumer: {}", e);
        }
        session.close().await;

        Ok(())
    }
}
