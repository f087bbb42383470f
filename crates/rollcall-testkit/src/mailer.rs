//! Mailers for tests.

use std::sync::Mutex;

use async_trait::async_trait;

use rollcall_delivery::{DeliveryError, DeliveryTask, Mailer, Result};

/// Records every task it is asked to send.
///
/// Recipients listed with [`RecordingMailer::fail_for`] are refused;
/// recipients listed with [`RecordingMailer::stall_for`] never complete.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<DeliveryTask>>,
    failing: Mutex<Vec<String>>,
    stalling: Mutex<Vec<String>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, to: &str) {
        self.failing.lock().expect("mailer lock").push(to.to_string());
    }

    pub fn stall_for(&self, to: &str) {
        self.stalling.lock().expect("mailer lock").push(to.to_string());
    }

    /// Tasks sent so far, in order.
    pub fn sent(&self) -> Vec<DeliveryTask> {
        self.sent.lock().expect("mailer lock").clone()
    }

    pub fn recipients(&self) -> Vec<String> {
        self.sent().into_iter().map(|t| t.to).collect()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, task: &DeliveryTask) -> Result<()> {
        let fails = self.failing.lock().expect("mailer lock").contains(&task.to);
        if fails {
            return Err(DeliveryError::Mail(format!("refused recipient {}", task.to)));
        }
        let stalls = self.stalling.lock().expect("mailer lock").contains(&task.to);
        if stalls {
            std::future::pending::<()>().await;
        }
        self.sent.lock().expect("mailer lock").push(task.clone());
        Ok(())
    }
}
