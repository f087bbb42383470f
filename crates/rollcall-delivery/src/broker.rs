//! Message broker abstraction.
//!
//! A broker holds one work queue and one dead-letter queue. Consumers
//! receive a message, then settle it exactly once: `ack` removes it,
//! `nack` routes it to the dead-letter queue without requeueing. A durable
//! broker redelivers messages whose consumer never settled them.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{DeliveryError, Result};
use crate::messages::{DeadLetter, Delivery, DeliveryTag, DeliveryTask, Topology};

/// A work queue with dead-lettering.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Broker: Send + Sync {
    /// Queue names this broker serves.
    fn topology(&self) -> &Topology;

    /// Enqueue a raw payload on the work queue.
    async fn publish_raw(&self, payload: Vec<u8>) -> Result<()>;

    /// Enqueue a task.
    async fn publish(&self, task: &DeliveryTask) -> Result<()> {
        let payload = task.to_json()?;
        self.publish_raw(payload).await
    }

    /// Receive the next message, waiting until one is available.
    async fn receive(&self) -> Result<Delivery>;

    /// Take the next message if one is ready now.
    async fn try_receive(&self) -> Result<Option<Delivery>>;

    /// Receive with timeout.
    ///
    /// Returns None if the timeout expires before a message is available.
    async fn receive_timeout(&self, timeout: Duration) -> Result<Option<Delivery>> {
        match tokio::time::timeout(timeout, self.receive()).await {
            Ok(delivery) => delivery.map(Some),
            Err(_) => Ok(None),
        }
    }

    /// Settle a delivery as done.
    async fn ack(&self, tag: DeliveryTag) -> Result<()>;

    /// Reject a delivery. It moves to the dead-letter queue.
    async fn nack(&self, tag: DeliveryTag, reason: &str) -> Result<()>;

    /// Messages waiting on the work queue.
    async fn ready_len(&self) -> Result<usize>;

    /// Contents of the dead-letter queue, oldest first.
    async fn dead_letters(&self) -> Result<Vec<DeadLetter>>;
}

/// Open the broker named by a queue URL.
///
/// `memory://` gives a process-local broker; `sqlite://<path>` a durable
/// one backed by a database file.
pub fn connect(url: &str, topology: Topology) -> Result<Arc<dyn Broker>> {
    if url == "memory://" || url == "memory:" {
        return Ok(Arc::new(crate::memory::MemoryBroker::with_topology(topology)));
    }
    if let Some(path) = url.strip_prefix("sqlite://") {
        if path.is_empty() {
            return Err(DeliveryError::InvalidQueueUrl(url.to_string()));
        }
        let broker = crate::sqlite::SqliteBroker::open(path, topology)?;
        return Ok(Arc::new(broker));
    }
    Err(DeliveryError::InvalidQueueUrl(url.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_memory() {
        let broker = connect("memory://", Topology::default()).unwrap();
        assert_eq!(broker.topology().queue, "email_queue");
        assert_eq!(broker.ready_len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_connect_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("queue.db").display());
        let broker = connect(&url, Topology::default()).unwrap();
        broker
            .publish(&DeliveryTask::notification("a@b.c", "s", "b"))
            .await
            .unwrap();
        assert_eq!(broker.ready_len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_connect_rejects_unknown_scheme() {
        for url in ["amqp://localhost", "sqlite://", ""] {
            let err = connect(url, Topology::default()).err().unwrap();
            assert!(matches!(err, DeliveryError::InvalidQueueUrl(_)), "{url}");
        }
    }

    #[tokio::test]
    async fn test_receive_timeout_on_empty_queue() {
        let broker = connect("memory://", Topology::default()).unwrap();
        let got = broker
            .receive_timeout(Duration::from_millis(20))
            .await
            .unwrap();
        assert!(got.is_none());
    }
}
