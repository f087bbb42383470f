//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::Arc;

use rollcall_certificate::{CertificateRenderer, MemoryDocumentStore};
use rollcall_core::{
    Capacity, Clock, EventKind, GeoPoint, ManualClock, NewActivity, NewEvent, Participant,
    ParticipantId, ServerSecret, TokenCodec,
};
use rollcall_delivery::MemoryBroker;
use rollcall_store::MemoryStore;

/// Secret shared by fixtures and golden vectors.
pub const TEST_SECRET: &[u8] = b"rollcall-test-secret-0001";

/// Public base URL used by fixture renderers.
pub const TEST_BASE_URL: &str = "https://eventos.example.org";

/// 2026-05-20T12:00:10Z, ten seconds into a token window.
pub const TEST_NOW: i64 = 1_779_278_410_000;

/// In-memory collaborators and a pinned clock.
pub struct TestFixture {
    pub store: MemoryStore,
    pub codec: TokenCodec,
    pub clock: Arc<ManualClock>,
    pub broker: Arc<MemoryBroker>,
    pub documents: Arc<MemoryDocumentStore>,
}

impl TestFixture {
    pub fn new() -> Self {
        Self {
            store: MemoryStore::new(),
            codec: test_codec(),
            clock: Arc::new(ManualClock::new(TEST_NOW)),
            broker: Arc::new(MemoryBroker::new()),
            documents: Arc::new(MemoryDocumentStore::new()),
        }
    }

    /// A renderer writing into this fixture's document store.
    pub fn renderer(&self) -> CertificateRenderer {
        CertificateRenderer::new(TEST_BASE_URL, self.documents.clone())
    }

    pub fn now(&self) -> i64 {
        self.clock.now_millis()
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// The codec for [`TEST_SECRET`].
pub fn test_codec() -> TokenCodec {
    let secret = ServerSecret::new(TEST_SECRET.to_vec()).expect("test secret is long enough");
    TokenCodec::new(&secret).expect("test secret is a valid key")
}

/// A directory entry with an address derived from the id.
pub fn participant(id: &str, name: &str) -> Participant {
    Participant {
        id: ParticipantId::new(id),
        name: name.to_string(),
        email: Some(format!("{}@example.org", id)),
    }
}

/// A directory entry with no email.
pub fn participant_without_email(id: &str, name: &str) -> Participant {
    Participant {
        id: ParticipantId::new(id),
        name: name.to_string(),
        email: None,
    }
}

/// An event starting on 2026-05-20, with an empty share token.
pub fn new_event(name: &str, kind: EventKind) -> NewEvent {
    NewEvent {
        owner: "organizer".to_string(),
        name: name.to_string(),
        description: String::new(),
        kind,
        start_date: Some("2026-05-20".to_string()),
        start_time: Some("09:00".to_string()),
        end_date: Some("2026-05-21".to_string()),
        end_time: Some("18:00".to_string()),
        share_token: String::new(),
        geofence: None,
    }
}

/// A regular activity requiring registration.
pub fn new_activity(name: &str, hours: u32, capacity: Capacity) -> NewActivity {
    NewActivity {
        name: name.to_string(),
        speaker: "Speaker".to_string(),
        location: "Auditório".to_string(),
        description: String::new(),
        date: Some("2026-05-20".to_string()),
        time: Some("10:00".to_string()),
        hours,
        capacity,
        geofence: None,
        fast_checkin: false,
    }
}

/// São Paulo, Praça da Sé.
pub fn campus() -> GeoPoint {
    GeoPoint {
        lat: -23.5503,
        lon: -46.6342,
    }
}
