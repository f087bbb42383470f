//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use rollcall_core::{
    Activity, ActivityId, Background, CertificateTemplate, DeliveryStatus, Enrollment,
    EnrollmentId, Event, EventId, EventStatus, GeoPoint, NewActivity, NewEvent, Participant,
    ParticipantId, VerificationHash,
};

use crate::error::{Result, StoreError};
use crate::traits::{ConfirmOutcome, HashAssignment, RegisterOutcome, Store};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock; every
/// mutating operation holds the write lock for its whole duration.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    participants: HashMap<ParticipantId, Participant>,
    events: BTreeMap<EventId, Event>,
    activities: BTreeMap<ActivityId, Activity>,
    enrollments: BTreeMap<EnrollmentId, Enrollment>,

    /// Pair index: (activity, participant) -> enrollment.
    pairs: HashMap<(ActivityId, ParticipantId), EnrollmentId>,

    next_event: i64,
    next_activity: i64,
    next_enrollment: i64,
}

impl MemoryStoreInner {
    fn insert_activity(&mut self, event: EventId, activity: &NewActivity) -> Activity {
        self.next_activity += 1;
        let created = Activity {
            id: ActivityId(self.next_activity),
            event_id: event,
            name: activity.name.clone(),
            speaker: activity.speaker.clone(),
            location: activity.location.clone(),
            description: activity.description.clone(),
            date: activity.date.clone(),
            time: activity.time.clone(),
            hours: activity.hours,
            capacity: activity.capacity,
            geofence: activity.geofence,
            fast_checkin: activity.fast_checkin,
        };
        self.activities.insert(created.id, created.clone());
        created
    }

    fn enrolled_count(&self, activity: ActivityId) -> u64 {
        self.enrollments
            .values()
            .filter(|e| e.activity_id == activity)
            .count() as u64
    }

    fn insert_enrollment_if_room(
        &mut self,
        activity: &Activity,
        participant: &ParticipantId,
        name: &str,
        attended: bool,
        location: Option<GeoPoint>,
        now: i64,
    ) -> Option<Enrollment> {
        if !activity.capacity.admits(self.enrolled_count(activity.id)) {
            return None;
        }

        self.next_enrollment += 1;
        let enrollment = Enrollment {
            id: EnrollmentId(self.next_enrollment),
            activity_id: activity.id,
            event_id: activity.event_id,
            participant_id: participant.clone(),
            participant_name: name.to_string(),
            attended,
            alternate_address: None,
            verification_hash: None,
            checkin_location: location,
            delivery_status: DeliveryStatus::Pending,
            delivered_at: None,
            created_at: now,
        };
        self.pairs
            .insert((activity.id, participant.clone()), enrollment.id);
        self.enrollments.insert(enrollment.id, enrollment.clone());
        Some(enrollment)
    }

    fn pair(&self, activity: ActivityId, participant: &ParticipantId) -> Option<&Enrollment> {
        self.pairs
            .get(&(activity, participant.clone()))
            .and_then(|id| self.enrollments.get(id))
    }

    /// Delete one enrollment. Its verification hash, if any, moves to the
    /// pair's next enrollment, attended ones first.
    fn remove(&mut self, id: EnrollmentId) -> bool {
        let Some(removed) = self.enrollments.remove(&id) else {
            return false;
        };
        self.pairs
            .remove(&(removed.activity_id, removed.participant_id.clone()));

        if let Some(hash) = removed.verification_hash {
            let heir = self
                .enrollments
                .values_mut()
                .filter(|e| {
                    e.event_id == removed.event_id && e.participant_id == removed.participant_id
                })
                .min_by_key(|e| (!e.attended, e.id));
            if let Some(heir) = heir {
                heir.verification_hash = Some(hash);
            }
        }
        true
    }
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn upsert_participant(&self, participant: &Participant) -> Result<()> {
        let mut inner = self.write()?;
        inner
            .participants
            .insert(participant.id.clone(), participant.clone());
        Ok(())
    }

    async fn get_participant(&self, id: &ParticipantId) -> Result<Option<Participant>> {
        Ok(self.read()?.participants.get(id).cloned())
    }

    async fn create_event(
        &self,
        event: &NewEvent,
        activities: &[NewActivity],
    ) -> Result<(Event, Vec<Activity>)> {
        let mut inner = self.write()?;

        inner.next_event += 1;
        let stored = Event {
            id: EventId(inner.next_event),
            owner: event.owner.clone(),
            name: event.name.clone(),
            description: event.description.clone(),
            kind: event.kind,
            start_date: event.start_date.clone(),
            start_time: event.start_time.clone(),
            end_date: event.end_date.clone(),
            end_time: event.end_time.clone(),
            share_token: event.share_token.clone(),
            status: EventStatus::Open,
            geofence: event.geofence,
            background: None,
            template: None,
        };
        inner.events.insert(stored.id, stored.clone());

        let created = activities
            .iter()
            .map(|a| inner.insert_activity(stored.id, a))
            .collect();

        Ok((stored, created))
    }

    async fn get_event(&self, id: EventId) -> Result<Option<Event>> {
        Ok(self.read()?.events.get(&id).cloned())
    }

    async fn update_certificate_config(
        &self,
        id: EventId,
        background: Option<&Background>,
        template: Option<&CertificateTemplate>,
    ) -> Result<bool> {
        let mut inner = self.write()?;
        match inner.events.get_mut(&id) {
            Some(event) => {
                event.background = background.cloned();
                event.template = template.cloned();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn add_activity(
        &self,
        event: EventId,
        activity: &NewActivity,
    ) -> Result<Option<Activity>> {
        let mut inner = self.write()?;
        if !inner.events.contains_key(&event) {
            return Ok(None);
        }
        Ok(Some(inner.insert_activity(event, activity)))
    }

    async fn get_activity(&self, id: ActivityId) -> Result<Option<Activity>> {
        Ok(self.read()?.activities.get(&id).cloned())
    }

    async fn list_activities(&self, event: EventId) -> Result<Vec<Activity>> {
        Ok(self
            .read()?
            .activities
            .values()
            .filter(|a| a.event_id == event)
            .cloned()
            .collect())
    }

    async fn register(
        &self,
        activity: ActivityId,
        participant: &ParticipantId,
        name: &str,
        now: i64,
    ) -> Result<RegisterOutcome> {
        let mut inner = self.write()?;

        let Some(slot) = inner.activities.get(&activity).cloned() else {
            return Ok(RegisterOutcome::ActivityNotFound);
        };
        if let Some(existing) = inner.pair(activity, participant) {
            return Ok(RegisterOutcome::AlreadyRegistered(existing.clone()));
        }

        Ok(
            match inner.insert_enrollment_if_room(&slot, participant, name, false, None, now) {
                Some(enrollment) => RegisterOutcome::Registered(enrollment),
                None => RegisterOutcome::CapacityExceeded,
            },
        )
    }

    async fn withdraw(&self, activity: ActivityId, participant: &ParticipantId) -> Result<bool> {
        let mut inner = self.write()?;
        let id = inner
            .pair(activity, participant)
            .filter(|e| !e.attended)
            .map(|e| e.id);
        Ok(id.map(|id| inner.remove(id)).unwrap_or(false))
    }

    async fn confirm_attendance(
        &self,
        activity: ActivityId,
        participant: &ParticipantId,
        name: &str,
        location: Option<GeoPoint>,
        now: i64,
    ) -> Result<ConfirmOutcome> {
        let mut inner = self.write()?;

        let Some(slot) = inner.activities.get(&activity).cloned() else {
            return Ok(ConfirmOutcome::ActivityNotFound);
        };

        let existing = inner.pair(activity, participant).map(|e| e.id);
        match existing {
            Some(id) => {
                let Some(enrollment) = inner.enrollments.get_mut(&id) else {
                    return Err(StoreError::InvalidData(format!("enrollment {} vanished", id)));
                };
                let already_attended = enrollment.attended;
                if !already_attended {
                    enrollment.attended = true;
                    if location.is_some() {
                        enrollment.checkin_location = location;
                    }
                }
                Ok(ConfirmOutcome::Confirmed {
                    enrollment: enrollment.clone(),
                    already_attended,
                })
            }
            None if slot.fast_checkin => Ok(
                match inner.insert_enrollment_if_room(&slot, participant, name, true, location, now)
                {
                    Some(enrollment) => ConfirmOutcome::AutoEnrolled(enrollment),
                    None => ConfirmOutcome::CapacityExceeded,
                },
            ),
            None => Ok(ConfirmOutcome::NotEnrolled),
        }
    }

    async fn set_attendance(&self, id: EnrollmentId, attended: bool) -> Result<Option<Enrollment>> {
        let mut inner = self.write()?;
        Ok(inner.enrollments.get_mut(&id).map(|e| {
            e.attended = attended;
            e.clone()
        }))
    }

    async fn get_enrollment(&self, id: EnrollmentId) -> Result<Option<Enrollment>> {
        Ok(self.read()?.enrollments.get(&id).cloned())
    }

    async fn find_enrollment(
        &self,
        activity: ActivityId,
        participant: &ParticipantId,
    ) -> Result<Option<Enrollment>> {
        Ok(self.read()?.pair(activity, participant).cloned())
    }

    async fn list_event_enrollments(&self, event: EventId) -> Result<Vec<Enrollment>> {
        Ok(self
            .read()?
            .enrollments
            .values()
            .filter(|e| e.event_id == event)
            .cloned()
            .collect())
    }

    async fn remove_enrollment(&self, id: EnrollmentId) -> Result<bool> {
        Ok(self.write()?.remove(id))
    }

    async fn set_alternate_address(
        &self,
        id: EnrollmentId,
        address: Option<&str>,
    ) -> Result<bool> {
        let mut inner = self.write()?;
        match inner.enrollments.get_mut(&id) {
            Some(e) => {
                e.alternate_address = address.map(str::to_string);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn assign_verification_hash(
        &self,
        event: EventId,
        participant: &ParticipantId,
        candidate: &VerificationHash,
    ) -> Result<HashAssignment> {
        let mut inner = self.write()?;

        let of_pair = |e: &&Enrollment| e.event_id == event && &e.participant_id == participant;

        if let Some(existing) = inner
            .enrollments
            .values()
            .filter(of_pair)
            .find_map(|e| e.verification_hash.clone())
        {
            return Ok(HashAssignment::Existing(existing));
        }

        let Some(anchor) = inner
            .enrollments
            .values()
            .filter(of_pair)
            .find(|e| e.attended)
            .map(|e| e.id)
        else {
            return Ok(HashAssignment::NoAttendance);
        };

        if inner
            .enrollments
            .values()
            .any(|e| e.verification_hash.as_ref() == Some(candidate))
        {
            return Ok(HashAssignment::Collision);
        }

        if let Some(e) = inner.enrollments.get_mut(&anchor) {
            e.verification_hash = Some(candidate.clone());
        }
        Ok(HashAssignment::Assigned(candidate.clone()))
    }

    async fn find_by_verification_hash(
        &self,
        hash: &VerificationHash,
    ) -> Result<Option<Enrollment>> {
        Ok(self
            .read()?
            .enrollments
            .values()
            .find(|e| e.verification_hash.as_ref() == Some(hash))
            .cloned())
    }

    async fn set_delivery_status(
        &self,
        event: EventId,
        participant: &ParticipantId,
        status: DeliveryStatus,
        at: i64,
    ) -> Result<usize> {
        let mut inner = self.write()?;
        let mut updated = 0;
        for e in inner.enrollments.values_mut() {
            if e.event_id == event && &e.participant_id == participant && e.attended {
                e.delivery_status = status;
                e.delivered_at = Some(at);
                updated += 1;
            }
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rollcall_core::{Capacity, EventKind};
    use std::sync::Arc;

    fn fixture_event() -> NewEvent {
        NewEvent {
            owner: "o".into(),
            name: "Event".into(),
            description: String::new(),
            kind: EventKind::Standard,
            start_date: None,
            start_time: None,
            end_date: None,
            end_time: None,
            share_token: "tok".into(),
            geofence: None,
        }
    }

    fn fixture_activity(capacity: Capacity) -> NewActivity {
        NewActivity {
            name: "Talk".into(),
            speaker: String::new(),
            location: String::new(),
            description: String::new(),
            date: None,
            time: None,
            hours: 2,
            capacity,
            geofence: None,
            fast_checkin: false,
        }
    }

    #[tokio::test]
    async fn test_capacity_one_under_contention() {
        let store = Arc::new(MemoryStore::new());
        let (_, activities) = store
            .create_event(&fixture_event(), &[fixture_activity(Capacity::Limited(1))])
            .await
            .unwrap();
        let activity = activities[0].id;

        let a = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .register(activity, &ParticipantId::new("a"), "A", 0)
                    .await
                    .unwrap()
            })
        };
        let b = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .register(activity, &ParticipantId::new("b"), "B", 0)
                    .await
                    .unwrap()
            })
        };

        let outcomes = [a.await.unwrap(), b.await.unwrap()];
        let exceeded = outcomes
            .iter()
            .filter(|o| **o == RegisterOutcome::CapacityExceeded)
            .count();
        assert_eq!(exceeded, 1);
    }

    #[tokio::test]
    async fn test_withdraw_then_reregister() {
        let store = MemoryStore::new();
        let (_, activities) = store
            .create_event(&fixture_event(), &[fixture_activity(Capacity::Unlimited)])
            .await
            .unwrap();
        let p = ParticipantId::new("p");

        store.register(activities[0].id, &p, "P", 0).await.unwrap();
        assert!(store.withdraw(activities[0].id, &p).await.unwrap());
        assert!(store.find_enrollment(activities[0].id, &p).await.unwrap().is_none());
        assert!(matches!(
            store.register(activities[0].id, &p, "P", 0).await.unwrap(),
            RegisterOutcome::Registered(_)
        ));
    }

    #[tokio::test]
    async fn test_hash_is_stable_across_candidates() {
        let store = MemoryStore::new();
        let (event, activities) = store
            .create_event(&fixture_event(), &[fixture_activity(Capacity::Unlimited)])
            .await
            .unwrap();
        let p = ParticipantId::new("p");
        store.register(activities[0].id, &p, "P", 0).await.unwrap();
        store
            .confirm_attendance(activities[0].id, &p, "P", None, 0)
            .await
            .unwrap();

        let h1 = VerificationHash::parse("1111111111111111").unwrap();
        let h2 = VerificationHash::parse("2222222222222222").unwrap();
        assert_eq!(
            store.assign_verification_hash(event.id, &p, &h1).await.unwrap(),
            HashAssignment::Assigned(h1.clone())
        );
        assert_eq!(
            store.assign_verification_hash(event.id, &p, &h2).await.unwrap(),
            HashAssignment::Existing(h1)
        );
    }
    async fn attended_pair(store: &MemoryStore) -> (EventId, Vec<ActivityId>, ParticipantId) {
        let (event, activities) = store
            .create_event(
                &fixture_event(),
                &[
                    fixture_activity(Capacity::Unlimited),
                    fixture_activity(Capacity::Unlimited),
                ],
            )
            .await
            .unwrap();
        let p = ParticipantId::new("p");
        for activity in &activities {
            store.register(activity.id, &p, "P", 0).await.unwrap();
            store
                .confirm_attendance(activity.id, &p, "P", None, 0)
                .await
                .unwrap();
        }
        (event.id, activities.iter().map(|a| a.id).collect(), p)
    }

    #[tokio::test]
    async fn test_withdraw_leaves_attended_enrollments() {
        let store = MemoryStore::new();
        let (event, activities, p) = attended_pair(&store).await;
        let hash = VerificationHash::parse("ABCDEF0123456789").unwrap();
        store.assign_verification_hash(event, &p, &hash).await.unwrap();

        assert!(!store.withdraw(activities[0], &p).await.unwrap());
        assert!(store.find_enrollment(activities[0], &p).await.unwrap().is_some());
        assert_eq!(
            store.find_by_verification_hash(&hash).await.unwrap().map(|e| e.activity_id),
            Some(activities[0])
        );
    }

    #[tokio::test]
    async fn test_removal_hands_hash_to_the_next_enrollment() {
        let store = MemoryStore::new();
        let (event, activities, p) = attended_pair(&store).await;
        let hash = VerificationHash::parse("ABCDEF0123456789").unwrap();
        store.assign_verification_hash(event, &p, &hash).await.unwrap();

        let anchor = store.find_enrollment(activities[0], &p).await.unwrap().unwrap();
        assert!(store.remove_enrollment(anchor.id).await.unwrap());

        let heir = store.find_by_verification_hash(&hash).await.unwrap().unwrap();
        assert_eq!(heir.activity_id, activities[1]);
        let other = VerificationHash::parse("2222222222222222").unwrap();
        assert_eq!(
            store.assign_verification_hash(event, &p, &other).await.unwrap(),
            HashAssignment::Existing(hash)
        );
    }

    #[derive(Debug, Clone)]
    enum Op {
        Register(usize),
        Withdraw(usize),
        Attend(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..6usize).prop_map(Op::Register),
            (0..6usize).prop_map(Op::Withdraw),
            (0..6usize).prop_map(Op::Attend),
        ]
    }

    proptest! {
        #[test]
        fn prop_ledger_tracks_seats_and_attendance(ops in proptest::collection::vec(op(), 1..40)) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let store = MemoryStore::new();
                let (event, activities) = store
                    .create_event(&fixture_event(), &[fixture_activity(Capacity::Limited(3))])
                    .await
                    .unwrap();
                let activity = activities[0].id;
                let pid = |i: usize| ParticipantId::new(format!("p{}", i));
                // participant -> attended
                let mut seats: BTreeMap<usize, bool> = BTreeMap::new();

                for op in ops {
                    match op {
                        Op::Register(i) => match store.register(activity, &pid(i), "P", 0).await.unwrap() {
                            RegisterOutcome::Registered(_) => {
                                assert!(!seats.contains_key(&i));
                                assert!(seats.len() < 3);
                                seats.insert(i, false);
                            }
                            RegisterOutcome::AlreadyRegistered(_) => assert!(seats.contains_key(&i)),
                            RegisterOutcome::CapacityExceeded => {
                                assert!(!seats.contains_key(&i));
                                assert_eq!(seats.len(), 3);
                            }
                            RegisterOutcome::ActivityNotFound => panic!("activity vanished"),
                        },
                        Op::Withdraw(i) => {
                            let removed = store.withdraw(activity, &pid(i)).await.unwrap();
                            assert_eq!(removed, seats.get(&i) == Some(&false));
                            if removed {
                                seats.remove(&i);
                            }
                        }
                        Op::Attend(i) => {
                            store
                                .confirm_attendance(activity, &pid(i), "P", None, 0)
                                .await
                                .unwrap();
                            if let Some(attended) = seats.get_mut(&i) {
                                *attended = true;
                            }
                        }
                    }

                    let stored = store.list_event_enrollments(event.id).await.unwrap();
                    assert_eq!(stored.len(), seats.len());
                    assert_eq!(
                        stored.iter().filter(|e| e.attended).count(),
                        seats.values().filter(|a| **a).count()
                    );
                }
            });
        }
    }
}
