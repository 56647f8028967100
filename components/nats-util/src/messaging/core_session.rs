// Local crates
use crate::messaging::{
    models::{DeliveryPosition, RawMessage, Subscription},
    transport::{Error, Transport},
};

// External crates
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use tracing::debug;

/// Core mode: subscribe and publish straight on the connection.
#[derive(Debug, Clone)]
pub struct CoreSession {
    client: async_nats::Client,
}

impl CoreSession {
    pub fn new(client: async_nats::Client) -> Self {
        Self { client }
    }
}

impl Transport for CoreSession {
    async fn subscribe(
        &self,
        subject: &str,
        position: DeliveryPosition,
    ) -> Result<Subscription, Error> {
        ignore_position(position);
        let subscriber = self.client.subscribe(subject.to_string()).await?;
        Ok(Subscription::new(subject, None, into_messages(subscriber, None)))
    }

    async fn subscribe_grouped(
        &self,
        subject: &str,
        group: &str,
        position: DeliveryPosition,
    ) -> Result<Subscription, Error> {
        ignore_position(position);
        let subscriber = self
            .client
            .queue_subscribe(subject.to_string(), group.to_string())
            .await?;
        Ok(Subscription::new(
            subject,
            Some(group.to_string()),
            into_messages(subscriber, Some(group.to_string())),
        ))
    }

    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), Error> {
        self.client.publish(subject.to_string(), payload).await?;
        Ok(())
    }

    async fn close(self) -> Result<(), Error> {
        self.client.flush().await?;
        debug!("Core session flushed");
        Ok(())
    }
}

// Core NATS keeps no log to seek into.
fn ignore_position(position: DeliveryPosition) {
    if position != DeliveryPosition::New {
        debug!(?position, "Delivery position ignored in core mode");
    }
}

fn into_messages(
    subscriber: async_nats::Subscriber,
    group: Option<String>,
) -> BoxStream<'static, Result<RawMessage, Error>> {
    subscriber
        .map(move |message| {
            Ok(RawMessage {
                payload: message.payload,
                subject: message.subject.to_string(),
                group: group.clone(),
            })
        })
        .boxed()
}
