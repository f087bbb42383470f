//! The delivery worker.
//!
//! Consumes the work queue one message at a time. Each message is decoded,
//! handed to the mailer under a timeout, then settled: ack on success,
//! nack (dead-letter, no requeue) on any failure.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::broker::Broker;
use crate::error::{DeliveryError, Result};
use crate::mailer::Mailer;
use crate::messages::{Delivery, DeliveryTag, DeliveryTask};
use crate::observer::{DeliveryObserver, NoopObserver};

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Upper bound on one mailer call.
    pub delivery_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            delivery_timeout: Duration::from_secs(30),
        }
    }
}

/// Counts of what a worker run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerReport {
    /// Messages sent and acked.
    pub delivered: usize,
    /// Messages the mailer failed or timed out on.
    pub failed: usize,
    /// Payloads that were not valid tasks.
    pub malformed: usize,
}

impl WorkerReport {
    pub fn dead_lettered(&self) -> usize {
        self.failed + self.malformed
    }
}

/// How one message was settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    Delivered,
    Failed { reason: String },
    Malformed { reason: String },
}

/// Drains a broker through a mailer.
pub struct Worker<B: Broker + ?Sized, M: Mailer + ?Sized> {
    broker: Arc<B>,
    mailer: Arc<M>,
    observer: Arc<dyn DeliveryObserver>,
    config: WorkerConfig,
}

impl<B: Broker + ?Sized, M: Mailer + ?Sized> Worker<B, M> {
    pub fn new(broker: Arc<B>, mailer: Arc<M>, config: WorkerConfig) -> Self {
        Self {
            broker,
            mailer,
            observer: Arc::new(NoopObserver),
            config,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn DeliveryObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Consume until `shutdown` turns true or its sender goes away.
    ///
    /// A message being handled when shutdown is signalled is finished and
    /// settled first.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<WorkerReport> {
        let mut report = WorkerReport::default();
        tracing::info!(queue = %self.broker.topology().queue, "worker started");

        loop {
            if *shutdown.borrow() {
                break;
            }
            let delivery = tokio::select! {
                _ = shutdown.changed() => break,
                delivery = self.broker.receive() => delivery?,
            };
            self.handle(delivery, &mut report).await?;
        }

        tracing::info!(
            delivered = report.delivered,
            failed = report.failed,
            malformed = report.malformed,
            "worker stopped"
        );
        Ok(report)
    }

    /// Handle everything currently queued, then return.
    pub async fn drain(&self) -> Result<WorkerReport> {
        let mut report = WorkerReport::default();
        while let Some(delivery) = self.broker.try_receive().await? {
            self.handle(delivery, &mut report).await?;
        }
        Ok(report)
    }

    /// Process and settle one delivery.
    pub async fn handle(
        &self,
        delivery: Delivery,
        report: &mut WorkerReport,
    ) -> Result<Settlement> {
        let task = match DeliveryTask::from_json(&delivery.payload) {
            Ok(task) => task,
            Err(e) => {
                let reason = format!("malformed task: {}", e);
                tracing::error!(tag = delivery.tag.0, %reason, "rejecting message");
                self.settled(delivery.tag, self.broker.nack(delivery.tag, &reason).await)?;
                self.observer.dead_lettered(None, &reason).await;
                report.malformed += 1;
                return Ok(Settlement::Malformed { reason });
            }
        };

        if delivery.redelivered {
            tracing::debug!(tag = delivery.tag.0, to = %task.to, "redelivered message");
        }

        let outcome =
            tokio::time::timeout(self.config.delivery_timeout, self.mailer.send(&task)).await;
        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some(format!(
                "delivery timed out after {:?}",
                self.config.delivery_timeout
            )),
        };

        match failure {
            None => {
                self.settled(delivery.tag, self.broker.ack(delivery.tag).await)?;
                self.observer.delivered(&task).await;
                report.delivered += 1;
                Ok(Settlement::Delivered)
            }
            Some(reason) => {
                tracing::error!(tag = delivery.tag.0, to = %task.to, %reason, "delivery failed");
                self.settled(delivery.tag, self.broker.nack(delivery.tag, &reason).await)?;
                self.observer.dead_lettered(Some(&task), &reason).await;
                report.failed += 1;
                Ok(Settlement::Failed { reason })
            }
        }
    }

    /// A message another consumer already settled is not fatal.
    fn settled(&self, tag: DeliveryTag, outcome: Result<()>) -> Result<()> {
        match outcome {
            Err(DeliveryError::UnknownDelivery(_)) => {
                tracing::warn!(tag = tag.0, "message was already settled elsewhere");
                Ok(())
            }
            other => other,
        }
    }
}
