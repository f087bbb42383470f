//! Delivery confirmation back into the ledger.

use std::sync::Arc;

use async_trait::async_trait;

use rollcall_core::{Clock, DeliveryStatus, SystemClock};
use rollcall_delivery::{DeliveryObserver, DeliveryTask};
use rollcall_store::Store;

/// Marks enrollments `Delivered` or `Failed` as the worker settles their
/// certificate messages. Tasks without an enrollment are ignored.
pub struct LedgerObserver<S: Store + ?Sized> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S: Store + ?Sized> LedgerObserver<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    async fn mark(&self, task: &DeliveryTask, status: DeliveryStatus) {
        let Some(id) = task.enrollment else {
            return;
        };
        let enrollment = match self.store.get_enrollment(id).await {
            Ok(Some(enrollment)) => enrollment,
            Ok(None) => {
                tracing::warn!(enrollment = %id, "delivery settled for a removed enrollment");
                return;
            }
            Err(e) => {
                tracing::error!(enrollment = %id, error = %e, "could not load enrollment");
                return;
            }
        };

        let result = self
            .store
            .set_delivery_status(
                enrollment.event_id,
                &enrollment.participant_id,
                status,
                self.clock.now_millis(),
            )
            .await;
        match result {
            Ok(updated) => tracing::info!(
                event = %enrollment.event_id,
                participant = %enrollment.participant_id,
                status = status.as_str(),
                updated,
                "delivery status recorded"
            ),
            Err(e) => tracing::error!(enrollment = %id, error = %e, "could not record delivery status"),
        }
    }
}

#[async_trait]
impl<S: Store + ?Sized + 'static> DeliveryObserver for LedgerObserver<S> {
    async fn delivered(&self, task: &DeliveryTask) {
        self.mark(task, DeliveryStatus::Delivered).await;
    }

    async fn dead_lettered(&self, task: Option<&DeliveryTask>, _reason: &str) {
        if let Some(task) = task {
            self.mark(task, DeliveryStatus::Failed).await;
        }
    }
}
