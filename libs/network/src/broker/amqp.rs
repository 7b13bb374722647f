//! RabbitMQ adapter over `lapin`

use super::{
    Acknowledge, BrokerChannel, ConnectOptions, Delivery, DeliveryStream, ExchangeKind, ExchangeOptions,
    MessageProperties, QueueOptions,
};
use crate::{Result, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, ExchangeDeclareOptions, QueueBindOptions,
    QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};

pub struct AmqpChannel {
    connection: Connection,
    channel: Channel,
}

impl AmqpChannel {
    pub async fn connect(url: &str, options: &ConnectOptions) -> Result<Self> {
        let mut properties = ConnectionProperties::default();
        if let Some(name) = &options.connection_name {
            properties = properties.with_connection_name(name.clone().into());
        }

        let connection = Connection::connect(url, properties)
            .await
            .map_err(|e| TransportError::connection_with_source("AMQP connect failed", None, e))?;
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| TransportError::channel_with_source("create_channel", e))?;

        Ok(Self { connection, channel })
    }
}

fn to_lapin_kind(kind: ExchangeKind) -> lapin::ExchangeKind {
    match kind {
        ExchangeKind::Topic => lapin::ExchangeKind::Topic,
        ExchangeKind::Fanout => lapin::ExchangeKind::Fanout,
        ExchangeKind::Direct => lapin::ExchangeKind::Direct,
    }
}

fn to_basic_properties(properties: &MessageProperties) -> BasicProperties {
    let mut basic = BasicProperties::default();
    if let Some(correlation_id) = &properties.correlation_id {
        basic = basic.with_correlation_id(correlation_id.clone().into());
    }
    if let Some(reply_to) = &properties.reply_to {
        basic = basic.with_reply_to(reply_to.clone().into());
    }
    if let Some(content_type) = &properties.content_type {
        basic = basic.with_content_type(content_type.clone().into());
    }
    basic
}

fn from_basic_properties(basic: &BasicProperties) -> MessageProperties {
    MessageProperties {
        correlation_id: basic.correlation_id().as_ref().map(|s| s.as_str().to_string()),
        reply_to: basic.reply_to().as_ref().map(|s| s.as_str().to_string()),
        content_type: basic.content_type().as_ref().map(|s| s.as_str().to_string()),
    }
}

struct LapinAcker(lapin::acker::Acker);

#[async_trait]
impl Acknowledge for LapinAcker {
    async fn ack(&self) -> Result<()> {
        self.0
            .ack(BasicAckOptions::default())
            .await
            .map_err(|e| TransportError::channel_with_source("basic_ack", e))
    }
}

#[async_trait]
impl BrokerChannel for AmqpChannel {
    async fn declare_exchange(&self, name: &str, kind: ExchangeKind, options: ExchangeOptions) -> Result<()> {
        self.channel
            .exchange_declare(
                name,
                to_lapin_kind(kind),
                ExchangeDeclareOptions {
                    durable: options.durable,
                    ..ExchangeDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| TransportError::channel_with_source("exchange_declare", e))
    }

    async fn declare_queue(&self, name: &str, options: QueueOptions) -> Result<()> {
        self.channel
            .queue_declare(
                name,
                QueueDeclareOptions {
                    durable: options.durable,
                    exclusive: options.exclusive,
                    auto_delete: options.auto_delete,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map(|_| ())
            .map_err(|e| TransportError::channel_with_source("queue_declare", e))
    }

    async fn bind_queue(&self, queue: &str, exchange: &str, routing_key: &str) -> Result<()> {
        self.channel
            .queue_bind(queue, exchange, routing_key, QueueBindOptions::default(), FieldTable::default())
            .await
            .map_err(|e| TransportError::channel_with_source("queue_bind", e))
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: Bytes,
        properties: MessageProperties,
    ) -> Result<()> {
        self.channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                &payload,
                to_basic_properties(&properties),
            )
            .await
            .map(|_confirm| ())
            .map_err(|e| TransportError::channel_with_source("basic_publish", e))
    }

    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream> {
        let consumer = self
            .channel
            .basic_consume(queue, consumer_tag, BasicConsumeOptions::default(), FieldTable::default())
            .await
            .map_err(|e| TransportError::channel_with_source("basic_consume", e))?;

        let stream = consumer.map(|item| {
            item.map(|delivery| {
                Delivery::new(
                    delivery.delivery_tag,
                    delivery.exchange.as_str(),
                    delivery.routing_key.as_str(),
                    Bytes::from(delivery.data),
                    from_basic_properties(&delivery.properties),
                )
                .with_acker(Box::new(LapinAcker(delivery.acker)))
            })
            .map_err(|e| TransportError::channel_with_source("consume", e))
        });
        Ok(stream.boxed())
    }

    async fn close(&self) -> Result<()> {
        self.channel
            .close(200, "closing")
            .await
            .map_err(|e| TransportError::channel_with_source("channel_close", e))?;
        self.connection
            .close(200, "closing")
            .await
            .map_err(|e| TransportError::channel_with_source("connection_close", e))
    }

    fn is_open(&self) -> bool {
        self.connection.status().connected()
    }
}
