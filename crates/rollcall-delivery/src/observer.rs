//! Hooks for the outcome of each delivery.

use async_trait::async_trait;

use crate::messages::DeliveryTask;

/// Told how each message the worker handled ended.
///
/// Calls happen after the broker has settled the message. Observers must
/// not fail the worker; they log their own errors.
#[async_trait]
pub trait DeliveryObserver: Send + Sync {
    async fn delivered(&self, task: &DeliveryTask);

    /// `task` is None when the payload could not be decoded.
    async fn dead_lettered(&self, task: Option<&DeliveryTask>, reason: &str);
}

/// Ignores every outcome.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

#[async_trait]
impl DeliveryObserver for NoopObserver {
    async fn delivered(&self, _task: &DeliveryTask) {}

    async fn dead_lettered(&self, _task: Option<&DeliveryTask>, _reason: &str) {}
}
