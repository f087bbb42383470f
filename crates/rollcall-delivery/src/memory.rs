//! In-memory broker for tests and single-process deployments.
//!
//! Uses a channel as the work queue. Nothing survives the process.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

use rollcall_core::{Clock, SystemClock};

use crate::broker::Broker;
use crate::error::{DeliveryError, Result};
use crate::messages::{DeadLetter, Delivery, DeliveryTag, Topology};

struct Message {
    tag: DeliveryTag,
    payload: Vec<u8>,
}

#[derive(Default)]
struct MemoryState {
    next_tag: u64,
    ready: usize,
    unacked: HashMap<DeliveryTag, Vec<u8>>,
    dead: Vec<DeadLetter>,
}

/// A process-local broker.
pub struct MemoryBroker {
    topology: Topology,
    tx: mpsc::UnboundedSender<Message>,
    rx: AsyncMutex<mpsc::UnboundedReceiver<Message>>,
    state: Mutex<MemoryState>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::with_topology(Topology::default())
    }

    pub fn with_topology(topology: Topology) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            topology,
            tx,
            rx: AsyncMutex::new(rx),
            state: Mutex::new(MemoryState::default()),
        }
    }

    fn state(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|e| DeliveryError::LockPoisoned(e.to_string()))
    }

    /// Messages handed out and not yet settled.
    pub fn unacked_len(&self) -> usize {
        self.state().map(|s| s.unacked.len()).unwrap_or(0)
    }

    fn take(&self, message: Message) -> Result<Delivery> {
        let mut state = self.state()?;
        state.ready = state.ready.saturating_sub(1);
        state.unacked.insert(message.tag, message.payload.clone());
        Ok(Delivery {
            tag: message.tag,
            payload: message.payload,
            redelivered: false,
        })
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    fn topology(&self) -> &Topology {
        &self.topology
    }

    async fn publish_raw(&self, payload: Vec<u8>) -> Result<()> {
        let tag = {
            let mut state = self.state()?;
            state.next_tag += 1;
            state.ready += 1;
            DeliveryTag(state.next_tag)
        };
        self.tx
            .send(Message { tag, payload })
            .map_err(|_| DeliveryError::Closed)?;
        tracing::trace!(queue = %self.topology.queue, tag = tag.0, "published");
        Ok(())
    }

    async fn receive(&self) -> Result<Delivery> {
        let message = {
            let mut rx = self.rx.lock().await;
            rx.recv().await.ok_or(DeliveryError::Closed)?
        };
        self.take(message)
    }

    async fn try_receive(&self) -> Result<Option<Delivery>> {
        let message = {
            let mut rx = self.rx.lock().await;
            match rx.try_recv() {
                Ok(message) => message,
                Err(mpsc::error::TryRecvError::Empty) => return Ok(None),
                Err(mpsc::error::TryRecvError::Disconnected) => return Err(DeliveryError::Closed),
            }
        };
        self.take(message).map(Some)
    }

    async fn ack(&self, tag: DeliveryTag) -> Result<()> {
        let mut state = self.state()?;
        state
            .unacked
            .remove(&tag)
            .map(|_| ())
            .ok_or(DeliveryError::UnknownDelivery(tag.0))
    }

    async fn nack(&self, tag: DeliveryTag, reason: &str) -> Result<()> {
        let mut state = self.state()?;
        let payload = state
            .unacked
            .remove(&tag)
            .ok_or(DeliveryError::UnknownDelivery(tag.0))?;
        state.dead.push(DeadLetter {
            payload,
            reason: reason.to_string(),
            dead_lettered_at: SystemClock.now_millis(),
        });
        tracing::debug!(
            exchange = %self.topology.dead_letter_exchange,
            routing_key = %self.topology.dead_letter_routing_key,
            tag = tag.0,
            "dead-lettered"
        );
        Ok(())
    }

    async fn ready_len(&self) -> Result<usize> {
        Ok(self.state()?.ready)
    }

    async fn dead_letters(&self) -> Result<Vec<DeadLetter>> {
        Ok(self.state()?.dead.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::DeliveryTask;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_fifo_and_ack() {
        let broker = MemoryBroker::new();
        for i in 0..3 {
            broker
                .publish(&DeliveryTask::notification(format!("{i}@x"), "s", "b"))
                .await
                .unwrap();
        }
        assert_eq!(broker.ready_len().await.unwrap(), 3);

        let first = broker.receive().await.unwrap();
        let task = DeliveryTask::from_json(&first.payload).unwrap();
        assert_eq!(task.to, "0@x");
        assert_eq!(broker.unacked_len(), 1);

        broker.ack(first.tag).await.unwrap();
        assert_eq!(broker.unacked_len(), 0);
        assert_eq!(broker.ready_len().await.unwrap(), 2);
        assert!(broker.dead_letters().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_nack_routes_to_dead_letters() {
        let broker = MemoryBroker::new();
        broker.publish_raw(b"garbage".to_vec()).await.unwrap();

        let d = broker.receive().await.unwrap();
        broker.nack(d.tag, "malformed").await.unwrap();

        let dead = broker.dead_letters().await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].payload, b"garbage");
        assert_eq!(dead[0].reason, "malformed");
        assert!(dead[0].task().is_none());
        assert_eq!(broker.ready_len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_settling_twice_fails() {
        let broker = MemoryBroker::new();
        broker.publish_raw(b"{}".to_vec()).await.unwrap();
        let d = broker.receive().await.unwrap();
        broker.ack(d.tag).await.unwrap();

        assert!(matches!(
            broker.ack(d.tag).await,
            Err(DeliveryError::UnknownDelivery(_))
        ));
        assert!(matches!(
            broker.nack(d.tag, "x").await,
            Err(DeliveryError::UnknownDelivery(_))
        ));
    }

    #[tokio::test]
    async fn test_receive_waits_for_publish() {
        let broker = Arc::new(MemoryBroker::new());
        let consumer = {
            let broker = broker.clone();
            tokio::spawn(async move { broker.receive().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        broker.publish_raw(b"late".to_vec()).await.unwrap();

        let d = consumer.await.unwrap().unwrap();
        assert_eq!(d.payload, b"late");
    }
}
