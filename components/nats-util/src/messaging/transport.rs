// Local crates
use crate::messaging::models::{DeliveryPosition, Subscription, TransportError};

// External crates
use bytes::Bytes;

/// Errors that can occur while talking to NATS in either delivery mode.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Failed to establish the connection to the servers.
    #[error("Failed to connect to NATS: {0}")]
    Connect(#[from] async_nats::ConnectError),
    /// The stream backing a streaming session could not be found.
    #[error("Failed to establish streaming session on stream '{stream}': {source}")]
    Session {
        stream: String,
        #[source]
        source: async_nats::jetstream::context::GetStreamError,
    },
    /// Core subscription was rejected.
    #[error(transparent)]
    Subscribe(#[from] async_nats::SubscribeError),
    /// Streaming consumer could not be created.
    #[error(transparent)]
    Consumer(#[from] async_nats::jetstream::stream::ConsumerError),
    /// A durable group consumer exists but filters another subject.
    #[error("Consumer '{consumer}' filters '{filter}', not '{subject}'")]
    ConsumerMismatch {
        consumer: String,
        subject: String,
        filter: String,
    },
    /// Streaming consumer could not start delivering.
    #[error(transparent)]
    ConsumerStream(#[from] async_nats::jetstream::consumer::StreamError),
    /// Core publish failed.
    #[error(transparent)]
    Publish(#[from] async_nats::PublishError),
    /// Streaming publish failed or was not acknowledged.
    #[error(transparent)]
    StreamPublish(#[from] async_nats::jetstream::context::PublishError),
    /// Flushing pending data on close failed.
    #[error(transparent)]
    Flush(#[from] async_nats::client::FlushError),
    /// Error while a message was being delivered on a live subscription.
    #[error("Delivery failed: {0}")]
    Delivery(String),
    /// Asynchronous error reported by the connection.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// The capability set shared by core and streaming sessions. Selected once at
/// startup; everything downstream only sees this trait.
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Subscribe so that every message on `subject` reaches this subscriber.
    async fn subscribe(
        &self,
        subject: &str,
        position: DeliveryPosition,
    ) -> Result<Subscription, Error>;

    /// Subscribe as a member of `group`; each message reaches one member only.
    async fn subscribe_grouped(
        &self,
        subject: &str,
        group: &str,
        position: DeliveryPosition,
    ) -> Result<Subscription, Error>;

    /// Publish a single payload on `subject`.
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), Error>;

    /// Flush and tear down the session.
    async fn close(self) -> Result<(), Error>
    where
        Self: Sized;
}
