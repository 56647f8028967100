//! In-process stand-in for a NATS server, used by the tests of everything that
//! sits on top of [`Transport`].

// Local crates
use crate::messaging::{
    models::{DeliveryPosition, RawMessage, Subscription, TransportError},
    transport::{Error, Transport},
};

// External crates
use bytes::Bytes;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

type Delivery = mpsc::UnboundedSender<Result<RawMessage, Error>>;

#[derive(Debug, Default)]
struct QueueGroup {
    members: Vec<Delivery>,
    next: usize,
}

#[derive(Debug, Default)]
struct BrokerState {
    plain: Vec<(String, Delivery)>,
    groups: HashMap<(String, String), QueueGroup>,
    published: Vec<(String, Bytes)>,
    positions: Vec<DeliveryPosition>,
    reject_publish_at: Option<usize>,
    reject_subscribe: bool,
    closed: bool,
}

/// Shared handle onto the in-memory broker. Clones talk to the same broker.
#[derive(Debug, Default, Clone)]
pub struct MemoryTransport {
    state: Arc<Mutex<BrokerState>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every publish seen so far, in order.
    pub fn published(&self) -> Vec<(String, Bytes)> {
        self.state.lock().unwrap().published.clone()
    }

    /// Positions requested by subscribe calls, in order.
    pub fn positions(&self) -> Vec<DeliveryPosition> {
        self.state.lock().unwrap().positions.clone()
    }

    /// Make the publish with this zero based index fail.
    pub fn reject_publish_at(&self, index: usize) {
        self.state.lock().unwrap().reject_publish_at = Some(index);
    }

    /// Make every subscribe call fail.
    pub fn reject_subscribe(&self) {
        self.state.lock().unwrap().reject_subscribe = true;
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    /// Push a delivery error to every subscriber of `subject`.
    pub fn fail_deliveries(&self, subject: &str) {
        let state = self.state.lock().unwrap();
        let targets = state
            .plain
            .iter()
            .filter(|(s, _)| s == subject)
            .map(|(_, tx)| tx)
            .chain(
                state
                    .groups
                    .iter()
                    .filter(|((s, _), _)| s == subject)
                    .flat_map(|(_, group)| group.members.iter()),
            );
        for tx in targets {
            let _ = tx.send(Err(Error::Delivery("injected failure".to_string())));
        }
    }

    /// Drop every subscription, ending their message streams.
    pub fn close_subscriptions(&self) {
        let mut state = self.state.lock().unwrap();
        state.plain.clear();
        state.groups.clear();
    }

    fn register(
        &self,
        subject: &str,
        group: Option<&str>,
        position: DeliveryPosition,
    ) -> Result<Subscription, Error> {
        let mut state = self.state.lock().unwrap();
        if state.reject_subscribe {
            return Err(Error::Transport(TransportError::Server(
                "Permissions Violation for Subscription".to_string(),
            )));
        }
        state.positions.push(position);

        let (tx, rx) = mpsc::unbounded_channel();
        match group {
            Some(group) => state
                .groups
                .entry((subject.to_string(), group.to_string()))
                .or_default()
                .members
                .push(tx),
            None => state.plain.push((subject.to_string(), tx)),
        }

        Ok(Subscription::new(
            subject,
            group.map(str::to_string),
            UnboundedReceiverStream::new(rx).boxed(),
        ))
    }
}

impl Transport for MemoryTransport {
    async fn subscribe(
        &self,
        subject: &str,
        position: DeliveryPosition,
    ) -> Result<Subscription, Error> {
        self.register(subject, None, position)
    }

    async fn subscribe_grouped(
        &self,
        subject: &str,
        group: &str,
        position: DeliveryPosition,
    ) -> Result<Subscription, Error> {
        self.register(subject, Some(group), position)
    }

    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        if state.reject_publish_at == Some(state.published.len()) {
            state.reject_publish_at = None;
            return Err(Error::Transport(TransportError::Client(
                "publish rejected".to_string(),
            )));
        }
        state.published.push((subject.to_string(), payload.clone()));

        let message = |group: Option<&str>| RawMessage {
            payload: payload.clone(),
            subject: subject.to_string(),
            group: group.map(str::to_string),
        };

        for (_, tx) in state.plain.iter().filter(|(s, _)| s == subject) {
            let _ = tx.send(Ok(message(None)));
        }

        // one member per group, round robin, skipping members that went away
        for ((s, name), group) in state.groups.iter_mut() {
            if s != subject {
                continue;
            }
            group.members.retain(|tx| !tx.is_closed());
            if group.members.is_empty() {
                continue;
            }
            let index = group.next % group.members.len();
            group.next = group.next.wrapping_add(1);
            let _ = group.members[index].send(Ok(message(Some(name.as_str()))));
        }

        Ok(())
    }

    async fn close(self) -> Result<(), Error> {
        self.state.lock().unwrap().closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    async fn drain_now(subscription: &mut Subscription) -> Vec<RawMessage> {
        let mut seen = Vec::new();
        while let Ok(Some(Ok(message))) =
            timeout(Duration::from_millis(20), subscription.next_message()).await
        {
            seen.push(message);
        }
        seen
    }

    #[tokio::test]
    async fn test_plain_subscribers_all_receive() {
        let broker = MemoryTransport::new();
        let mut first = broker.subscribe("orders", DeliveryPosition::New).await.unwrap();
        let mut second = broker.subscribe("orders", DeliveryPosition::New).await.unwrap();

        broker.publish("orders", Bytes::from_static(b"one")).await.unwrap();
        broker.publish("other", Bytes::from_static(b"ignored")).await.unwrap();

        assert_eq!(drain_now(&mut first).await.len(), 1);
        assert_eq!(drain_now(&mut second).await.len(), 1);
    }

    #[tokio::test]
    async fn test_queue_group_delivers_each_message_once() {
        let broker = MemoryTransport::new();
        let mut first = broker
            .subscribe_grouped("orders", "workers", DeliveryPosition::New)
            .await
            .unwrap();
        let mut second = broker
            .subscribe_grouped("orders", "workers", DeliveryPosition::New)
            .await
            .unwrap();

        for i in 0..200 {
            broker
                .publish("orders", Bytes::from(format!("msg-{i}")))
                .await
                .unwrap();
        }

        let first_seen = drain_now(&mut first).await;
        let second_seen = drain_now(&mut second).await;

        assert_eq!(first_seen.len() + second_seen.len(), 200);
        assert!(!first_seen.is_empty());
        assert!(!second_seen.is_empty());
        for message in &first_seen {
            assert!(!second_seen.iter().any(|other| other.payload == message.payload));
            assert_eq!(message.group.as_deref(), Some("workers"));
        }
    }
}
