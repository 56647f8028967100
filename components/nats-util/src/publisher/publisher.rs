// Local crates
use crate::messaging::transport::{Error, Transport};

// External crates
use bytes::Bytes;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, instrument, warn};

const PROMPT: &str = "Enter message: ";

/// Errors that can occur while sending messages.
#[derive(thiserror::Error, Debug)]
pub enum PublishError {
    /// The payload file could not be read.
    #[error("Failed to read data from file {path:?}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// One publish of a file replay failed; the rest of the batch is abandoned.
    #[error("Publish {attempt} of {times} on '{subject}' failed: {source}")]
    Replay {
        subject: String,
        attempt: u32,
        times: u32,
        #[source]
        source: Error,
    },
    /// Reading the next interactive message failed.
    #[error("Failed to read data from stdin: {0}")]
    ReadInput(#[source] std::io::Error),
    /// Writing the interactive prompt failed.
    #[error("Failed to write prompt: {0}")]
    Prompt(#[source] std::io::Error),
}

/// Read the whole payload file once.
pub async fn read_payload(path: &Path) -> Result<Bytes, PublishError> {
    let data = tokio::fs::read(path)
        .await
        .map_err(|source| PublishError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
    debug!(path = %path.display(), bytes = data.len(), "Payload file read");
    Ok(Bytes::from(data))
}

/// Publish the same payload `times` times, in sequence. The first failure
/// aborts the batch.
#[instrument(
    name = "publisher::replay",
    skip(transport, payload),
    level = "debug",
    fields(bytes = payload.len())
)]
pub async fn replay_payload<T: Transport>(
    transport: &T,
    subject: &str,
    payload: Bytes,
    times: u32,
) -> Result<(), PublishError> {
    for attempt in 1..=times {
        transport
            .publish(subject, payload.clone())
            .await
            .map_err(|source| PublishError::Replay {
                subject: subject.to_string(),
                attempt,
                times,
                source,
            })?;
    }

    info!(subject, times, bytes = payload.len(), "Payload published");
    Ok(())
}

/// Prompt for messages on `input` and publish each line until the input ends.
/// Failed publishes are logged and skipped. Returns how many were sent.
#[instrument(name = "publisher::interactive", skip(transport, input, prompt), level = "debug")]
pub async fn publish_interactive<T, R, W>(
    transport: &T,
    subject: &str,
    mut input: R,
    prompt: &mut W,
) -> Result<u64, PublishError>
where
    T: Transport,
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut line: Vec<u8> = Vec::new();
    let mut sent = 0;

    loop {
        write!(prompt, "{PROMPT}").map_err(PublishError::Prompt)?;
        prompt.flush().map_err(PublishError::Prompt)?;

        line.clear();
        let read = input
            .read_until(b'\n', &mut line)
            .await
            .map_err(PublishError::ReadInput)?;
        if read == 0 {
            info!(sent, "End of input");
            return Ok(sent);
        }

        let message = strip_line_terminator(&line);
        match transport
            .publish(subject, Bytes::copy_from_slice(message))
            .await
        {
            Ok(()) => sent += 1,
            Err(e) => warn!(error = %e, subject, "Failed to publish message"),
        }
    }
}

// Lines are raw bytes; non UTF-8 input is published unchanged.
fn strip_line_terminator(line: &[u8]) -> &[u8] {
    match line.strip_suffix(b"\n") {
        Some(line) => line.strip_suffix(b"\r").unwrap_or(line),
        None => line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::memory::MemoryTransport;

    #[tokio::test]
    async fn test_replay_publishes_payload_times() {
        let broker = MemoryTransport::new();
        let payload = Bytes::from_static(b"{\"id\": 1}\n");

        replay_payload(&broker, "orders", payload.clone(), 3)
            .await
            .unwrap();

        let published = broker.published();
        assert_eq!(published.len(), 3);
        for (subject, data) in published {
            assert_eq!(subject, "orders");
            assert_eq!(data, payload);
        }
    }

    #[tokio::test]
    async fn test_replay_stops_on_first_failure() {
        let broker = MemoryTransport::new();
        broker.reject_publish_at(1);

        let result = replay_payload(&broker, "orders", Bytes::from_static(b"x"), 5).await;

        assert!(matches!(
            result,
            Err(PublishError::Replay { attempt: 2, times: 5, .. })
        ));
        assert_eq!(broker.published().len(), 1);
    }

    #[tokio::test]
    async fn test_read_payload_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"raw bytes\r\n").unwrap();

        let payload = read_payload(file.path()).await.unwrap();
        assert_eq!(payload, Bytes::from_static(b"raw bytes\r\n"));
    }

    #[tokio::test]
    async fn test_read_payload_missing_file() {
        let result = read_payload(Path::new("/no/such/payload.json")).await;
        assert!(matches!(result, Err(PublishError::ReadFile { .. })));
    }

    #[tokio::test]
    async fn test_interactive_publishes_each_line() {
        let broker = MemoryTransport::new();
        let input: &[u8] = b"one\ntwo\r\n\nthree";
        let mut prompt: Vec<u8> = Vec::new();

        let sent = publish_interactive(&broker, "chat", input, &mut prompt)
            .await
            .unwrap();

        assert_eq!(sent, 4);
        let payloads: Vec<Bytes> = broker.published().into_iter().map(|(_, p)| p).collect();
        assert_eq!(
            payloads,
            vec![
                Bytes::from_static(b"one"),
                Bytes::from_static(b"two"),
                Bytes::from_static(b""),
                Bytes::from_static(b"three"),
            ]
        );
        assert_eq!(String::from_utf8(prompt).unwrap(), PROMPT.repeat(5));
    }

    #[tokio::test]
    async fn test_interactive_keeps_going_after_failed_publish() {
        let broker = MemoryTransport::new();
        broker.reject_publish_at(0);
        let input: &[u8] = b"lost\nkept\n";
        let mut prompt: Vec<u8> = Vec::new();

        let sent = publish_interactive(&broker, "chat", input, &mut prompt)
            .await
            .unwrap();

        assert_eq!(sent, 1);
        assert_eq!(
            broker.published(),
            vec![("chat".to_string(), Bytes::from_static(b"kept"))]
        );
    }

    #[tokio::test]
    async fn test_interactive_publishes_non_utf8_lines_verbatim() {
        let broker = MemoryTransport::new();
        let input: &[u8] = b"ok\n\xff\xfe bin\nafter\n";
        let mut prompt: Vec<u8> = Vec::new();

        let sent = publish_interactive(&broker, "chat", input, &mut prompt)
            .await
            .unwrap();

        assert_eq!(sent, 3);
        let payloads: Vec<Bytes> = broker.published().into_iter().map(|(_, p)| p).collect();
        assert_eq!(
            payloads,
            vec![
                Bytes::from_static(b"ok"),
                Bytes::from_static(b"\xff\xfe bin"),
                Bytes::from_static(b"after"),
            ]
        );
    }

    #[test]
    fn test_strip_line_terminator() {
        assert_eq!(strip_line_terminator(b"a\n"), b"a");
        assert_eq!(strip_line_terminator(b"a\r\n"), b"a");
        assert_eq!(strip_line_terminator(b"a"), b"a");
        assert_eq!(strip_line_terminator(b"a\r"), b"a\r");
        assert_eq!(strip_line_terminator(b"\xff\r\n"), b"\xff");
    }
}
