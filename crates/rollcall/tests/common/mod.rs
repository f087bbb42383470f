#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use rollcall::certificate::MemoryDocumentStore;
use rollcall::core::{
    Activity, Capacity, Clock, Event, EventKind, ManualClock, NewActivity, Participant, ParticipantId,
};
use rollcall::delivery::{Broker, MemoryBroker};
use rollcall::store::MemoryStore;
use rollcall::Rollcall;
use rollcall_testkit::fixtures::{new_activity, new_event, participant};
use rollcall_testkit::TestFixture;

pub struct Harness {
    pub service: Rollcall<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub broker: Arc<MemoryBroker>,
    pub documents: Arc<MemoryDocumentStore>,
}

impl Harness {
    pub fn new() -> Self {
        let broker = Arc::new(MemoryBroker::new());
        Self::with_queue(broker.clone(), broker)
    }

    /// The service publishes through `queue`; `broker` is what tests inspect.
    pub fn with_queue(broker: Arc<MemoryBroker>, queue: Arc<dyn Broker>) -> Self {
        let fixture = TestFixture::new();
        let renderer = fixture.renderer();
        let TestFixture {
            store,
            codec,
            clock,
            documents,
            ..
        } = fixture;

        let service = Rollcall::new(store, codec, renderer, queue).with_clock(clock.clone());
        Self {
            service,
            clock,
            broker,
            documents,
        }
    }

    pub fn with_notifications() -> Self {
        let mut h = Self::new();
        h.service = h.service.with_notifications(true);
        h
    }

    pub fn clock_now(&self) -> i64 {
        self.clock.now_millis()
    }

    pub fn advance(&self, secs: u64) {
        self.clock.advance(Duration::from_secs(secs));
    }

    /// Add `participant_<n>` entries with emails to the directory.
    pub async fn people(&self, n: usize) -> Vec<ParticipantId> {
        let mut ids = Vec::with_capacity(n);
        for i in 0..n {
            let p = participant(&format!("{:011}", i + 1), &format!("Participant {}", i + 1));
            self.service.upsert_participant(&p).await.unwrap();
            ids.push(p.id);
        }
        ids
    }

    pub async fn add(&self, p: &Participant) -> ParticipantId {
        self.service.upsert_participant(p).await.unwrap();
        p.id.clone()
    }

    /// A standard event with the given activities.
    pub async fn standard_event(&self, activities: Vec<NewActivity>) -> (Event, Vec<Activity>) {
        self.service
            .create_event(new_event("Semana de Tecnologia", EventKind::Standard), activities)
            .await
            .unwrap()
    }

    /// A standard event with one activity of the given capacity and hours.
    pub async fn single_activity(&self, hours: u32, capacity: Capacity) -> (Event, Activity) {
        let (event, mut activities) = self
            .standard_event(vec![new_activity("Palestra", hours, capacity)])
            .await;
        (event, activities.remove(0))
    }

    /// A fast event; returns its single check-in activity.
    pub async fn fast_event(&self) -> (Event, Activity) {
        let (event, mut activities) = self
            .service
            .create_event(new_event("Aula Magna", EventKind::Fast), vec![])
            .await
            .unwrap();
        (event, activities.remove(0))
    }
}
