//! # Rollcall Delivery
//!
//! Asynchronous delivery of certificates and notifications.
//!
//! ## Overview
//!
//! Producers publish [`DeliveryTask`]s to a [`Broker`]. A [`Worker`]
//! consumes them one at a time and hands each to a [`Mailer`]. A message is
//! acked once sent; any failure (bad payload, mailer error, timeout) sends
//! it to the dead-letter queue instead of back onto the work queue.
//!
//! ## Key Types
//!
//! - [`Broker`] - Work queue with dead-lettering
//! - [`MemoryBroker`] / [`SqliteBroker`] - Process-local and durable brokers
//! - [`Worker`] - The consumer loop
//! - [`DeliveryObserver`] - Hook for settled messages
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rollcall_delivery::{LogMailer, MemoryBroker, Worker, WorkerConfig};
//!
//! # async fn example() -> rollcall_delivery::Result<()> {
//! let broker = Arc::new(MemoryBroker::new());
//! let worker = Worker::new(broker, Arc::new(LogMailer::new()), WorkerConfig::default());
//! let (_stop, shutdown) = tokio::sync::watch::channel(false);
//! let report = worker.run(shutdown).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Queue Topology
//!
//! | Name | Role |
//! |------|------|
//! | `email_queue` | Work queue |
//! | `dlx_exchange` | Receives rejected messages |
//! | `dlq_key` | Routes rejected messages to the dead-letter queue |
//! | `email_dlq` | Dead-letter queue |

pub mod broker;
pub mod error;
pub mod mailer;
pub mod memory;
pub mod messages;
pub mod observer;
pub mod sqlite;
pub mod worker;

pub use broker::{connect, Broker};
pub use error::{DeliveryError, Result};
pub use mailer::{LogMailer, Mailer};
pub use memory::MemoryBroker;
pub use messages::{
    DeadLetter, Delivery, DeliveryTag, DeliveryTask, Topology, DEAD_LETTER_EXCHANGE,
    DEAD_LETTER_QUEUE, DEAD_LETTER_ROUTING_KEY, MAIN_QUEUE,
};
pub use observer::{DeliveryObserver, NoopObserver};
pub use sqlite::{SqliteBroker, DEFAULT_LEASE, DEFAULT_POLL_INTERVAL};
pub use worker::{Settlement, Worker, WorkerConfig, WorkerReport};
