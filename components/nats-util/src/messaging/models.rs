// Local crates
use crate::messaging::transport::Error;

// External crates
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;

/// Who we are and what we talk to, as given on the command line. Built once
/// per command and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub subject: String,
    pub group: Option<String>,
    pub cluster_id: Option<String>,
    pub client_id: String,
}

impl ConnectionParams {
    /// Empty `group` and `cluster_id` strings mean "not set".
    pub fn new(
        subject: impl Into<String>,
        group: Option<String>,
        cluster_id: Option<String>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            group: group.filter(|g| !g.is_empty()),
            cluster_id: cluster_id.filter(|c| !c.is_empty()),
            client_id: client_id.into(),
        }
    }
}

/// Delivery model selected for a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionMode {
    /// Plain at-most-once NATS.
    Core,
    /// Durable delivery through the stream named by the cluster ID.
    Streaming { cluster_id: String },
}

impl SessionMode {
    /// The cluster ID alone decides the mode.
    pub fn for_params(params: &ConnectionParams) -> Self {
        match &params.cluster_id {
            Some(cluster_id) => SessionMode::Streaming {
                cluster_id: cluster_id.clone(),
            },
            None => SessionMode::Core,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionMode::Core => "core",
            SessionMode::Streaming { .. } => "streaming",
        }
    }
}

/// Where a new streaming subscription starts reading. Core subscriptions
/// always behave as `New`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryPosition {
    /// Only messages published from now on.
    #[default]
    New,
    /// The most recent message, then live traffic.
    Last,
    /// Everything the stream still retains.
    All,
}

impl DeliveryPosition {
    /// Map an operator supplied intent onto a position. Unknown values fall
    /// back to `New` so newer position names do not break older builds.
    pub fn from_intent(intent: &str) -> Self {
        match intent.trim().to_ascii_lowercase().as_str() {
            "all" => DeliveryPosition::All,
            "last" => DeliveryPosition::Last,
            "new" => DeliveryPosition::New,
            other => {
                tracing::debug!(delivery = %other, "Unknown delivery position, using new");
                DeliveryPosition::New
            }
        }
    }
}

/// One delivered message, reduced to what the printer needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub payload: Bytes,
    pub subject: String,
    pub group: Option<String>,
}

/// A live subscription. Dropping it releases the underlying subscription.
pub struct Subscription {
    pub subject: String,
    pub group: Option<String>,
    messages: BoxStream<'static, Result<RawMessage, Error>>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("subject", &self.subject)
            .field("group", &self.group)
            .finish_non_exhaustive()
    }
}

impl Subscription {
    pub fn new(
        subject: impl Into<String>,
        group: Option<String>,
        messages: BoxStream<'static, Result<RawMessage, Error>>,
    ) -> Self {
        Self {
            subject: subject.into(),
            group,
            messages,
        }
    }

    /// Next delivered message, `None` once the subscription is closed.
    pub async fn next_message(&mut self) -> Option<Result<RawMessage, Error>> {
        self.messages.next().await
    }
}

/// Asynchronous error reported by the connection outside of any
/// request/response exchange.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The server sent an `-ERR`.
    #[error("server error: {0}")]
    Server(String),
    /// The client reported an error on the connection.
    #[error("client error: {0}")]
    Client(String),
    /// The client dropped messages for a subscription that could not keep up.
    #[error("slow consumer on subscription {0}")]
    SlowConsumer(u64),
}
