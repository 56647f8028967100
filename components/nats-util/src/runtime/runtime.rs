// Local crates
use crate::{
    cli::cli::{ListenArgs, SendArgs},
    helpers::{completion::Completion, load_config::NatsConfig},
    listener::{
        drain::{spawn_drain, DrainOptions},
        subscribe::subscribe,
    },
    messaging::{
        connection::{connect, Connection},
        models::{ConnectionParams, DeliveryPosition, TransportError},
        session::Session,
        transport::Transport,
    },
    publisher::publisher::{publish_interactive, read_payload, replay_payload},
};

// External crates
use anyhow::{anyhow, Context, Result};
use bytes::Bytes;
use tokio::{io::BufReader, signal, sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Connect, subscribe and print messages until the listen session ends. The
/// session is closed whichever way that happens.
#[instrument(name = "runtime::listen", skip_all, fields(subject = %args.subject))]
pub async fn run_listen(config: &NatsConfig, args: &ListenArgs) -> Result<()> {
    let params = args.connection_params();

    let Connection {
        client,
        transport_errors,
    } = connect(config).await.context("Failed to connect to nats")?;

    let session = Session::select(&params, client)
        .await
        .context("Failed to connect to NATS streaming")?;
    info!(mode = session.mode_name(), "Session ready");

    let position = DeliveryPosition::from_intent(&args.delivery);
    listen(
        session,
        &params,
        position,
        args.drain_options(),
        transport_errors,
    )
    .await
}

/// Publish from a file or from stdin, then flush and close the session.
#[instrument(name = "runtime::send", skip_all, fields(subject = %args.subject))]
pub async fn run_send(config: &NatsConfig, args: &SendArgs) -> Result<()> {
    let params = args.connection_params();

    // read the file before touching the network so a bad path fails fast
    let payload = match &args.file {
        Some(path) => Some(read_payload(path).await?),
        None => None,
    };

    let Connection { client, .. } = connect(config).await.context("Failed to connect to nats")?;

    let session = Session::select(&params, client)
        .await
        .context("Failed to connect to NATS streaming")?;

    send(session, &params, payload, args.times).await
}

/// Listen on `transport`, then close it whatever the outcome.
async fn listen<T: Transport>(
    transport: T,
    params: &ConnectionParams,
    position: DeliveryPosition,
    options: DrainOptions,
    transport_errors: mpsc::UnboundedReceiver<TransportError>,
) -> Result<()> {
    let outcome = listen_on(&transport, params, position, options, transport_errors).await;

    if let Err(e) = transport.close().await {
        warn!(error = %e, "Failed to close session");
    }
    outcome
}

/// Publish on `transport`, then flush and close it whatever the outcome.
async fn send<T: Transport>(
    transport: T,
    params: &ConnectionParams,
    payload: Option<Bytes>,
    times: u32,
) -> Result<()> {
    let outcome = send_on(&transport, params, payload, times).await;
    let closed = transport
        .close()
        .await
        .context("Failed to flush published messages");

    outcome.and(closed)
}

async fn listen_on<T: Transport>(
    transport: &T,
    params: &ConnectionParams,
    position: DeliveryPosition,
    options: DrainOptions,
    transport_errors: mpsc::UnboundedReceiver<TransportError>,
) -> Result<()> {
    let subscription = subscribe(transport, params, position)
        .await
        .context("Failed to subscribe")?;

    let cancel = CancellationToken::new();
    let ctrl_c = spawn_ctrl_c(cancel.clone());

    info!(limit = ?options.limit, max_wait = ?options.max_wait, "Starting to listen");
    let signal = spawn_drain(subscription, transport_errors, options, cancel);
    let completion = signal.wait().await;
    ctrl_c.abort();

    match completion {
        Completion::Done => {
            info!("Stopped listening");
            Ok(())
        }
        Completion::Failed(e) => Err(e).context("Error while processing message"),
        Completion::Abandoned => Err(anyhow!("Listener stopped without reporting an outcome")),
    }
}

async fn send_on<T: Transport>(
    transport: &T,
    params: &ConnectionParams,
    payload: Option<Bytes>,
    times: u32,
) -> Result<()> {
    match payload {
        Some(payload) => {
            replay_payload(transport, &params.subject, payload, times).await?;
        }
        None => {
            let stdin = BufReader::new(tokio::io::stdin());
            let mut stdout = std::io::stdout();
            publish_interactive(transport, &params.subject, stdin, &mut stdout).await?;
        }
    }
    Ok(())
}

fn spawn_ctrl_c(cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C signal");
            return;
        }
        info!("Ctrl+C signal detected, stopping");
        cancel.cancel();
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::memory::MemoryTransport;
    use std::time::Duration;

    fn params(group: Option<&str>) -> ConnectionParams {
        ConnectionParams::new("orders", group.map(str::to_string), None, "tester")
    }

    #[tokio::test]
    async fn test_listen_returns_once_limit_is_reached() {
        let broker = MemoryTransport::new();
        let publisher = broker.clone();
        let feeder = tokio::spawn(async move {
            loop {
                let _ = publisher.publish("orders", Bytes::from_static(b"tick")).await;
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });

        let (_tx, rx) = mpsc::unbounded_channel();
        let result = listen(
            broker.clone(),
            &params(Some("workers")),
            DeliveryPosition::Last,
            DrainOptions::new(false, 2, None),
            rx,
        )
        .await;
        feeder.abort();

        assert!(result.is_ok());
        assert_eq!(broker.positions(), vec![DeliveryPosition::Last]);
        assert!(broker.is_closed());
    }

    #[tokio::test]
    async fn test_listen_fails_on_transport_error() {
        let broker = MemoryTransport::new();
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(TransportError::Server("Authorization Violation".to_string()))
            .unwrap();

        let result = listen(
            broker.clone(),
            &params(None),
            DeliveryPosition::New,
            DrainOptions::default(),
            rx,
        )
        .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_listen_fails_when_subscribe_is_rejected() {
        let broker = MemoryTransport::new();
        broker.reject_subscribe();
        let (_tx, rx) = mpsc::unbounded_channel();

        let result = listen(
            broker.clone(),
            &params(None),
            DeliveryPosition::New,
            DrainOptions::default(),
            rx,
        )
        .await;

        assert!(result.is_err());
        assert!(broker.is_closed());
    }

    #[tokio::test]
    async fn test_listen_stops_after_max_wait() {
        let broker = MemoryTransport::new();
        let (_tx, rx) = mpsc::unbounded_channel();

        let result = listen(
            broker.clone(),
            &params(None),
            DeliveryPosition::New,
            DrainOptions::new(false, 0, Some(Duration::from_millis(50))),
            rx,
        )
        .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_send_replays_file_payload() {
        let broker = MemoryTransport::new();
        let payload = Bytes::from_static(b"B");

        send(broker.clone(), &params(None), Some(payload.clone()), 3)
            .await
            .unwrap();

        assert!(broker.is_closed());
        assert_eq!(
            broker.published(),
            vec![
                ("orders".to_string(), payload.clone()),
                ("orders".to_string(), payload.clone()),
                ("orders".to_string(), payload),
            ]
        );
    }

    #[tokio::test]
    async fn test_send_replay_failure_is_fatal() {
        let broker = MemoryTransport::new();
        broker.reject_publish_at(0);

        let result = send(
            broker.clone(),
            &params(None),
            Some(Bytes::from_static(b"B")),
            3,
        )
        .await;

        assert!(result.is_err());
        assert!(broker.published().is_empty());
        assert!(broker.is_closed());
    }
}
