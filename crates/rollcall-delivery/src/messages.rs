//! Delivery task messages and queue topology.

use serde::{Deserialize, Serialize};

use rollcall_core::EnrollmentId;

use crate::error::Result;

/// Main work queue.
pub const MAIN_QUEUE: &str = "email_queue";
/// Exchange that receives rejected messages.
pub const DEAD_LETTER_EXCHANGE: &str = "dlx_exchange";
/// Routing key binding the dead-letter exchange to its queue.
pub const DEAD_LETTER_ROUTING_KEY: &str = "dlq_key";
/// Queue holding rejected messages.
pub const DEAD_LETTER_QUEUE: &str = "email_dlq";

/// Names of the queues a broker declares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    pub queue: String,
    pub dead_letter_exchange: String,
    pub dead_letter_routing_key: String,
    pub dead_letter_queue: String,
}

impl Default for Topology {
    fn default() -> Self {
        Self {
            queue: MAIN_QUEUE.to_string(),
            dead_letter_exchange: DEAD_LETTER_EXCHANGE.to_string(),
            dead_letter_routing_key: DEAD_LETTER_ROUTING_KEY.to_string(),
            dead_letter_queue: DEAD_LETTER_QUEUE.to_string(),
        }
    }
}

/// One outbound notification.
///
/// Wire form is JSON: `{"to", "subject", "body", "attachment"}`, plus an
/// `enrollment` field when the task confirms a certificate delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryTask {
    pub to: String,
    pub subject: String,
    pub body: String,
    /// Reference to a stored document, if any.
    #[serde(default)]
    pub attachment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrollment: Option<EnrollmentId>,
}

impl DeliveryTask {
    /// A plain notification with no attachment.
    pub fn notification(
        to: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
            attachment: None,
            enrollment: None,
        }
    }

    pub fn with_attachment(mut self, reference: impl Into<String>) -> Self {
        self.attachment = Some(reference.into());
        self
    }

    pub fn for_enrollment(mut self, enrollment: EnrollmentId) -> Self {
        self.enrollment = Some(enrollment);
        self
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Broker-assigned identifier of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeliveryTag(pub u64);

/// A message handed to a consumer, awaiting ack or nack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub tag: DeliveryTag,
    pub payload: Vec<u8>,
    /// The message was handed out before and never settled.
    pub redelivered: bool,
}

/// A message rejected by a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    pub payload: Vec<u8>,
    pub reason: String,
    /// Unix ms.
    pub dead_lettered_at: i64,
}

impl DeadLetter {
    /// The task, if the payload is well formed.
    pub fn task(&self) -> Option<DeliveryTask> {
        DeliveryTask::from_json(&self.payload).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format_matches_queue_contract() {
        let task = DeliveryTask::notification("ana@example.org", "Certificado", "Segue anexo")
            .with_attachment("cert_1_123.svg");
        let json: serde_json::Value = serde_json::from_slice(&task.to_json().unwrap()).unwrap();

        assert_eq!(json["to"], "ana@example.org");
        assert_eq!(json["attachment"], "cert_1_123.svg");
        assert!(json.get("enrollment").is_none());
    }

    #[test]
    fn test_accepts_minimal_payload() {
        let task =
            DeliveryTask::from_json(br#"{"to":"a@b.c","subject":"s","body":"b"}"#).unwrap();
        assert_eq!(task.attachment, None);
        assert_eq!(task.enrollment, None);
    }

    #[test]
    fn test_enrollment_roundtrip() {
        let task = DeliveryTask::notification("a@b.c", "s", "b").for_enrollment(EnrollmentId(9));
        let back = DeliveryTask::from_json(&task.to_json().unwrap()).unwrap();
        assert_eq!(back.enrollment, Some(EnrollmentId(9)));
    }

    #[test]
    fn test_rejects_missing_fields() {
        assert!(DeliveryTask::from_json(br#"{"to":"a@b.c"}"#).is_err());
        assert!(DeliveryTask::from_json(b"not json").is_err());
    }

    #[test]
    fn test_default_topology() {
        let t = Topology::default();
        assert_eq!(t.queue, "email_queue");
        assert_eq!(t.dead_letter_queue, "email_dlq");
        assert_eq!(t.dead_letter_exchange, "dlx_exchange");
        assert_eq!(t.dead_letter_routing_key, "dlq_key");
    }
}
