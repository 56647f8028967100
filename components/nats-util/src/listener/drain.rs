// Local crates
use crate::helpers::completion::{completion_channel, CompletionSignal};
use crate::listener::format::render_payload;
use crate::messaging::{
    models::{RawMessage, Subscription, TransportError},
    transport::Error,
};

// External crates
use std::io::Write;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Knobs of a single listen session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainOptions {
    /// Pretty print payloads that parse as JSON objects.
    pub parse_json: bool,
    /// Stop after this many messages. `None` listens forever.
    pub limit: Option<u64>,
    /// Stop once no message arrived for this long. `None` waits forever.
    pub max_wait: Option<Duration>,
}

impl DrainOptions {
    /// Build options from raw CLI values; a limit of zero or below means no limit.
    pub fn new(parse_json: bool, limit: i64, max_wait: Option<Duration>) -> Self {
        Self {
            parse_json,
            limit: u64::try_from(limit).ok().filter(|limit| *limit > 0),
            max_wait,
        }
    }
}

/// Terminal errors of a listen session.
#[derive(thiserror::Error, Debug)]
pub enum DrainError {
    /// The connection reported an asynchronous error.
    #[error("Error while processing messages: {0}")]
    Transport(#[from] TransportError),
    /// The subscription failed to deliver a message.
    #[error(transparent)]
    Delivery(#[from] Error),
    /// The subscription ended underneath us.
    #[error("Subscription on '{0}' was closed")]
    SubscriptionClosed(String),
    /// Writing to the output failed.
    #[error("Failed to write message: {0}")]
    Output(#[from] std::io::Error),
}

enum Next {
    Message(RawMessage),
    Failed(Error),
    Closed,
    Idle,
}

async fn next_within(subscription: &mut Subscription, max_wait: Option<Duration>) -> Next {
    let next = match max_wait {
        Some(wait) => match tokio::time::timeout(wait, subscription.next_message()).await {
            Ok(next) => next,
            Err(_) => return Next::Idle,
        },
        None => subscription.next_message().await,
    };

    match next {
        Some(Ok(message)) => Next::Message(message),
        Some(Err(e)) => Next::Failed(e),
        None => Next::Closed,
    }
}

/// Print every message of `subscription` to `out`, one message at a time in
/// delivery order, until cancelled, the limit or max wait is hit, or something
/// fails. Returns the number of messages printed.
#[instrument(
    name = "listener::drain",
    skip_all,
    level = "debug",
    fields(subject = %subscription.subject, group = ?subscription.group)
)]
pub async fn drain<W: Write>(
    mut subscription: Subscription,
    mut transport_errors: mpsc::UnboundedReceiver<TransportError>,
    options: &DrainOptions,
    out: &mut W,
    cancel: &CancellationToken,
) -> Result<u64, DrainError> {
    let mut received: u64 = 0;

    loop {
        let next = tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                info!(received, "Listening cancelled");
                return Ok(received);
            },

            Some(err) = transport_errors.recv() => {
                return Err(DrainError::Transport(err));
            },

            next = next_within(&mut subscription, options.max_wait) => next,
        };

        match next {
            Next::Message(message) => {
                let text = render_payload(&message.subject, &message.payload, options.parse_json);
                writeln!(out, "{text}")?;
                out.flush()?;

                received += 1;
                if options.limit.is_some_and(|limit| received >= limit) {
                    info!(received, "Message limit reached");
                    return Ok(received);
                }
            }
            Next::Failed(e) => return Err(DrainError::Delivery(e)),
            Next::Closed => return Err(DrainError::SubscriptionClosed(subscription.subject)),
            Next::Idle => {
                info!(received, max_wait = ?options.max_wait, "No message within max wait");
                return Ok(received);
            }
        }
    }
}

/// Run `drain` against stdout on a background task. The returned signal
/// receives exactly one outcome when the task stops.
pub fn spawn_drain(
    subscription: Subscription,
    transport_errors: mpsc::UnboundedReceiver<TransportError>,
    options: DrainOptions,
    cancel: CancellationToken,
) -> CompletionSignal<DrainError> {
    let (completer, signal) = completion_channel();

    tokio::spawn(async move {
        let mut stdout = std::io::stdout();
        match drain(subscription, transport_errors, &options, &mut stdout, &cancel).await {
            Ok(received) => {
                debug!(received, "Drain finished");
                completer.complete(None);
            }
            Err(e) => completer.complete(Some(e)),
        }
    });

    signal
}
