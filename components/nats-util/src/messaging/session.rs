// Local crates
use crate::messaging::{
    core_session::CoreSession,
    models::{ConnectionParams, DeliveryPosition, SessionMode, Subscription},
    streaming_session::StreamingSession,
    transport::{Error, Transport},
};

// External crates
use bytes::Bytes;
use tracing::{info, instrument};

/// The session a command runs against, chosen once from its parameters.
#[derive(Debug)]
pub enum Session {
    Core(CoreSession),
    Streaming(StreamingSession),
}

impl Session {
    /// Pick core or streaming mode for `params` and set the session up on top
    /// of `client`. Streaming setup failures are returned, not retried.
    #[instrument(
        name = "messaging::session::select",
        skip_all,
        level = "debug",
        fields(subject = %params.subject)
    )]
    pub async fn select(params: &ConnectionParams, client: async_nats::Client) -> Result<Self, Error> {
        let mode = SessionMode::for_params(params);
        let mode_name = mode.as_str();
        match mode {
            SessionMode::Core => {
                info!(mode = mode_name, "Using NATS core delivery");
                Ok(Session::Core(CoreSession::new(client)))
            }
            SessionMode::Streaming { cluster_id } => {
                info!(
                    mode = mode_name,
                    cluster_id = %cluster_id,
                    client_id = %params.client_id,
                    "Connecting to NATS streaming"
                );
                let session =
                    StreamingSession::establish(client, &cluster_id, &params.client_id).await?;
                Ok(Session::Streaming(session))
            }
        }
    }

    pub fn mode_name(&self) -> &'static str {
        match self {
            Session::Core(_) => "core",
            Session::Streaming(_) => "streaming",
        }
    }
}

impl Transport for Session {
    async fn subscribe(
        &self,
        subject: &str,
        position: DeliveryPosition,
    ) -> Result<Subscription, Error> {
        match self {
            Session::Core(session) => session.subscribe(subject, position).await,
            Session::Streaming(session) => session.subscribe(subject, position).await,
        }
    }

    async fn subscribe_grouped(
        &self,
        subject: &str,
        group: &str,
        position: DeliveryPosition,
    ) -> Result<Subscription, Error> {
        match self {
            Session::Core(session) => session.subscribe_grouped(subject, group, position).await,
            Session::Streaming(session) => {
                session.subscribe_grouped(subject, group, position).await
            }
        }
    }

    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), Error> {
        match self {
            Session::Core(session) => session.publish(subject, payload).await,
            Session::Streaming(session) => session.publish(subject, payload).await,
        }
    }

    async fn close(self) -> Result<(), Error> {
        match self {
            Session::Core(session) => session.close().await,
            Session::Streaming(session) => session.close().await,
        }
    }
}
