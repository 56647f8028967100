// Local crates
use crate::messaging::{
    models::{DeliveryPosition, RawMessage, Subscription},
    transport::{Error, Transport},
};

// External crates
use async_nats::jetstream::{self, consumer::DeliverPolicy, consumer::pull};
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// How long the server keeps an ephemeral listener consumer once nobody pulls
/// from it anymore.
const EPHEMERAL_INACTIVE_THRESHOLD: Duration = Duration::from_secs(30);

/// The cursor a new streaming consumer starts from.
pub fn deliver_policy(position: DeliveryPosition) -> DeliverPolicy {
    match position {
        DeliveryPosition::All => DeliverPolicy::All,
        DeliveryPosition::Last => DeliverPolicy::Last,
        DeliveryPosition::New => DeliverPolicy::New,
    }
}

/// Durable consumer name shared by the members of `group` on `subject`.
/// Consumer names cannot hold `.`, `*`, `>` or whitespace, so anything outside
/// `[A-Za-z0-9_-]` becomes `_`.
pub fn durable_name(subject: &str, group: &str) -> String {
    let sanitize = |part: &str| -> String {
        part.chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect()
    };
    format!("{}__{}", sanitize(group), sanitize(subject))
}

// Sanitising can map two subjects onto one name; the stored filter tells them apart.
fn ensure_filter(consumer: &str, subject: &str, filter: &str) -> Result<(), Error> {
    if filter == subject {
        return Ok(());
    }
    Err(Error::ConsumerMismatch {
        consumer: consumer.to_string(),
        subject: subject.to_string(),
        filter: filter.to_string(),
    })
}

/// Streaming mode: a JetStream session layered on the core connection. The
/// cluster ID names the stream that persists the subjects and the client ID
/// identifies this session on the consumers it creates.
pub struct StreamingSession {
    client: async_nats::Client,
    context: jetstream::Context,
    stream: jetstream::stream::Stream,
    cluster_id: String,
    client_id: String,
}

impl std::fmt::Debug for StreamingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingSession")
            .field("cluster_id", &self.cluster_id)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

impl StreamingSession {
    /// Open the session over an existing connection. Fails when the stream
    /// named by `cluster_id` does not exist.
    #[instrument(name = "messaging::streaming::establish", skip(client), level = "debug")]
    pub async fn establish(
        client: async_nats::Client,
        cluster_id: &str,
        client_id: &str,
    ) -> Result<Self, Error> {
        let context = jetstream::new(client.clone());
        let stream = context
            .get_stream(cluster_id)
            .await
            .map_err(|source| Error::Session {
                stream: cluster_id.to_string(),
                source,
            })?;

        info!(cluster_id, client_id, "Streaming session established");

        Ok(Self {
            client,
            context,
            stream,
            cluster_id: cluster_id.to_string(),
            client_id: client_id.to_string(),
        })
    }

    fn consumer_config(&self, subject: &str, position: DeliveryPosition) -> pull::Config {
        pull::Config {
            description: Some(format!("nats-util session {}", self.client_id)),
            deliver_policy: deliver_policy(position),
            filter_subject: subject.to_string(),
            ..Default::default()
        }
    }
}

impl Transport for StreamingSession {
    async fn subscribe(
        &self,
        subject: &str,
        position: DeliveryPosition,
    ) -> Result<Subscription, Error> {
        let config = pull::Config {
            inactive_threshold: EPHEMERAL_INACTIVE_THRESHOLD,
            ..self.consumer_config(subject, position)
        };
        let consumer = self.stream.create_consumer(config).await?;
        let messages = consumer.messages().await?;

        debug!(subject, ?position, "Ephemeral streaming consumer created");
        Ok(Subscription::new(subject, None, into_messages(messages, None)))
    }

    async fn subscribe_grouped(
        &self,
        subject: &str,
        group: &str,
        position: DeliveryPosition,
    ) -> Result<Subscription, Error> {
        // Every member binds to the same durable consumer, so the server hands
        // each message to exactly one of them. The position only applies when
        // the consumer is first created.
        let name = durable_name(subject, group);
        let config = pull::Config {
            durable_name: Some(name.clone()),
            ..self.consumer_config(subject, position)
        };
        let consumer = self.stream.get_or_create_consumer(&name, config).await?;
        ensure_filter(&name, subject, &consumer.cached_info().config.filter_subject)?;
        let messages = consumer.messages().await?;

        debug!(subject, group, consumer = %name, ?position, "Shared streaming consumer bound");
        Ok(Subscription::new(
            subject,
            Some(group.to_string()),
            into_messages(messages, Some(group.to_string())),
        ))
    }

    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), Error> {
        let ack = self.context.publish(subject.to_string(), payload).await?.await?;
        debug!(stream = %ack.stream, sequence = ack.sequence, "Publish acknowledged");
        Ok(())
    }

    async fn close(self) -> Result<(), Error> {
        self.client.flush().await?;
        debug!(client_id = %self.client_id, "Streaming session closed");
        Ok(())
    }
}

fn into_messages(
    messages: pull::Stream,
    group: Option<String>,
) -> BoxStream<'static, Result<RawMessage, Error>> {
    messages
        .then(move |delivery| {
            let group = group.clone();
            async move {
                let message = delivery.map_err(|e| Error::Delivery(e.to_string()))?;
                if let Err(e) = message.ack().await {
                    warn!(error = %e, subject = %message.subject, "Failed to acknowledge streaming message");
                }
                Ok(RawMessage {
                    payload: message.payload.clone(),
                    subject: message.subject.to_string(),
                    group,
                })
            }
        })
        .boxed()
}
