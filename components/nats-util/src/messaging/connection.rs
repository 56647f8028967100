// Local crates
use crate::helpers::load_config::NatsConfig;
use crate::messaging::{models::TransportError, transport::Error};

// External crates
use async_nats::{ConnectOptions, Event};
use tokio::sync::mpsc;
use tracing::{debug, error, instrument};

/// Connection name reported to the server.
const CLIENT_NAME: &str = "nats-util";

/// A live core connection plus the channel its asynchronous errors land on.
#[derive(Debug)]
pub struct Connection {
    pub client: async_nats::Client,
    pub transport_errors: mpsc::UnboundedReceiver<TransportError>,
}

/// Connect to the configured servers, over TLS when TLS material is set.
#[instrument(
    name = "messaging::connect",
    skip_all,
    level = "debug",
    fields(servers = %config.server_string())
)]
pub async fn connect(config: &NatsConfig) -> Result<Connection, Error> {
    let (errors_tx, errors_rx) = mpsc::unbounded_channel();

    let mut options = ConnectOptions::new().name(CLIENT_NAME);

    if let Some(tls) = &config.tls {
        options = options.require_tls(true);
        for ca_file in &tls.ca_files {
            options = options.add_root_certificates(ca_file.clone());
        }
        if let Some((cert, key)) = tls.client_identity() {
            options = options.add_client_certificate(cert.to_path_buf(), key.to_path_buf());
        }
    }

    options = options.event_callback(move |event| {
        let errors_tx = errors_tx.clone();
        async move {
            match classify_event(&event) {
                Some(err) => {
                    error!(error = %err, component = "error-logger", "Error reported by NATS connection");
                    let _ = errors_tx.send(err);
                }
                None => debug!(event = %event, "NATS connection event"),
            }
        }
    });

    debug!(nats_conf = ?config, "Connecting to NATS");
    let client = options.connect(config.server_string()).await?;
    debug!("Connected to NATS");

    Ok(Connection {
        client,
        transport_errors: errors_rx,
    })
}

/// Connection events that end a listen session.
fn classify_event(event: &Event) -> Option<TransportError> {
    match event {
        Event::ServerError(err) => Some(TransportError::Server(err.to_string())),
        Event::ClientError(err) => Some(TransportError::Client(err.to_string())),
        Event::SlowConsumer(sid) => Some(TransportError::SlowConsumer(*sid)),
        _ => None,
    }
}
