// External crates
use tokio::sync::oneshot;
use tracing::instrument;

/// How a background task finished, as observed by the waiting side.
#[derive(Debug)]
pub enum Completion<E> {
    /// The task finished without error.
    Done,
    /// The task reported a terminal error.
    Failed(E),
    /// The task went away without reporting anything (panic or abort).
    Abandoned,
}

/// Writing half of a completion signal. Consumed by `complete`, so at most one
/// value can ever be written.
#[derive(Debug)]
pub struct Completer<E> {
    tx: oneshot::Sender<Option<E>>,
}

/// Reading half of a completion signal. The foreground command blocks on
/// `wait` exactly once.
#[derive(Debug)]
pub struct CompletionSignal<E> {
    rx: oneshot::Receiver<Option<E>>,
}

/// Create a linked completer and signal.
#[instrument(
    name = "nats_util_completion_channel",
    target = "helpers::completion",
    level = "trace"
)]
pub fn completion_channel<E>() -> (Completer<E>, CompletionSignal<E>) {
    tracing::trace!("Creating completion signal");
    let (tx, rx) = oneshot::channel();
    (Completer { tx }, CompletionSignal { rx })
}

impl<E> Completer<E> {
    /// Write the terminal outcome, `None` meaning a clean finish.
    pub fn complete(self, outcome: Option<E>) {
        // Receiver already gone means nobody waits for the outcome anymore.
        let _ = self.tx.send(outcome);
    }
}

impl<E> CompletionSignal<E> {
    /// Block until the completer writes its outcome or is dropped.
    pub async fn wait(self) -> Completion<E> {
        tracing::trace!("Waiting for completion signal");
        match self.rx.await {
            Ok(None) => Completion::Done,
            Ok(Some(err)) => Completion::Failed(err),
            Err(_) => Completion::Abandoned,
        }
    }
}
