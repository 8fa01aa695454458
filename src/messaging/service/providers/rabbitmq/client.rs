//! lapin-backed transport.

use async_trait::async_trait;
use futures::future::join_all;
use lapin::options::{BasicPublishOptions, ConfirmSelectOptions, ExchangeDeclareOptions};
use lapin::publisher_confirm::{Confirmation, PublisherConfirm};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use tracing::{info, warn};

use super::AmqpMessage;
use crate::config::RabbitmqConfig;
use crate::messaging::service::BrokerTransport;
use crate::messaging::TransportError;

const REPLY_SUCCESS: u16 = 200;

/// One connection and one confirm-mode channel
#[derive(Debug)]
pub struct LapinTransport {
    connection: Connection,
    channel: Channel,
}

impl LapinTransport {
    pub async fn connect(config: &RabbitmqConfig) -> Result<Self, TransportError> {
        let properties = ConnectionProperties::default()
            .with_connection_name(config.connection_name.clone().into());

        let connection = tokio::time::timeout(
            config.connection_timeout(),
            Connection::connect(&config.url, properties),
        )
        .await
        .map_err(|_| {
            TransportError::connection(format!(
                "connection to {} timed out after {}s",
                config.redacted_url(),
                config.connection_timeout_seconds
            ))
        })?
        .map_err(|e| {
            TransportError::connection(format!(
                "connection to {} failed: {e}",
                config.redacted_url()
            ))
        })?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| TransportError::connection(format!("channel creation failed: {e}")))?;

        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| TransportError::connection(format!("confirm mode failed: {e}")))?;

        channel
            .exchange_declare(
                &config.exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                TransportError::rejected(format!(
                    "exchange '{}' declaration failed: {e}",
                    config.exchange
                ))
            })?;

        info!(
            url = %config.redacted_url(),
            exchange = %config.exchange,
            "RabbitMQ connection established"
        );

        Ok(Self {
            connection,
            channel,
        })
    }

    fn ensure_connected(&self) -> Result<(), TransportError> {
        if self.channel.status().connected() {
            Ok(())
        } else {
            Err(TransportError::connection("channel is not connected"))
        }
    }

    async fn start_publish(&self, message: AmqpMessage) -> Result<PublisherConfirm, TransportError> {
        let properties = BasicProperties::default()
            .with_content_type(message.content_type.into())
            .with_kind(message.kind.into())
            .with_message_id(message.message_id.into())
            .with_timestamp(message.timestamp)
            .with_delivery_mode(message.delivery_mode);

        self.channel
            .basic_publish(
                &message.exchange,
                &message.routing_key,
                BasicPublishOptions::default(),
                &message.body,
                properties,
            )
            .await
            .map_err(classify)
    }
}

async fn await_confirm(confirm: PublisherConfirm) -> Result<(), TransportError> {
    match confirm.await.map_err(classify)? {
        Confirmation::Nack(_) => Err(TransportError::rejected(
            "broker negatively acknowledged the message",
        )),
        _ => Ok(()),
    }
}

fn classify(error: lapin::Error) -> TransportError {
    match error {
        lapin::Error::InvalidChannelState(_)
        | lapin::Error::InvalidConnectionState(_)
        | lapin::Error::IOError(_) => TransportError::connection(error.to_string()),
        other => TransportError::rejected(other.to_string()),
    }
}

#[async_trait]
impl BrokerTransport for LapinTransport {
    type Message = AmqpMessage;

    async fn send(&self, message: AmqpMessage) -> Result<(), TransportError> {
        self.ensure_connected()?;
        let confirm = self.start_publish(message).await?;
        await_confirm(confirm).await
    }

    async fn send_batch(&self, messages: Vec<AmqpMessage>) -> Result<(), TransportError> {
        self.ensure_connected()?;

        let mut confirms = Vec::with_capacity(messages.len());
        for message in messages {
            confirms.push(self.start_publish(message).await?);
        }

        let results = join_all(confirms.into_iter().map(await_confirm)).await;
        results.into_iter().collect()
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.channel.status().connected() {
            if let Err(e) = self.channel.close(REPLY_SUCCESS, "closing").await {
                warn!(error = %e, "RabbitMQ channel close failed");
            }
        }
        if self.connection.status().connected() {
            self.connection
                .close(REPLY_SUCCESS, "closing")
                .await
                .map_err(classify)?;
        }
        info!("RabbitMQ connection closed");
        Ok(())
    }
}
