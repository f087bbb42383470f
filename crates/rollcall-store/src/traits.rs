//! Store trait: the abstract interface for ledger persistence.
//!
//! This trait keeps the service storage-agnostic. Implementations include
//! SQLite (primary) and in-memory (for tests).

use std::collections::BTreeMap;

use async_trait::async_trait;
use rollcall_core::{
    Activity, ActivityId, Background, CertificateTemplate, DeliveryStatus, Enrollment,
    EnrollmentId, Event, EventId, GeoPoint, NewActivity, NewEvent, Participant, ParticipantId,
    VerificationHash,
};

use crate::error::Result;

/// Result of a registration attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum RegisterOutcome {
    /// A new enrollment was created.
    Registered(Enrollment),
    /// The participant was already enrolled (idempotent - not an error).
    AlreadyRegistered(Enrollment),
    /// The activity's capacity is exhausted.
    CapacityExceeded,
    /// No such activity.
    ActivityNotFound,
}

/// Result of an attendance confirmation.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfirmOutcome {
    /// An existing enrollment is marked attended.
    Confirmed {
        enrollment: Enrollment,
        /// The flag was already set; nothing changed.
        already_attended: bool,
    },
    /// No enrollment existed and the activity is a fast check-in: a new
    /// attended enrollment was created.
    AutoEnrolled(Enrollment),
    /// No enrollment and the activity requires registration.
    NotEnrolled,
    /// Auto-enrollment was refused because the activity is full.
    CapacityExceeded,
    /// No such activity.
    ActivityNotFound,
}

/// Result of binding a verification hash to an (event, participant) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashAssignment {
    /// The pair already had a hash; it is returned unchanged.
    Existing(VerificationHash),
    /// The candidate was persisted.
    Assigned(VerificationHash),
    /// The candidate is already bound to another pair.
    Collision,
    /// The participant attended nothing in this event.
    NoAttendance,
}

/// The Store trait: async interface for ledger persistence.
///
/// All methods are async to support both sync (SQLite) and async backends.
/// For SQLite, we use `spawn_blocking` internally to avoid blocking the runtime.
///
/// # Design Notes
///
/// - **Atomic capacity**: `register` checks capacity and inserts as one unit
///   per activity, so a finite capacity is never exceeded.
/// - **Idempotent confirmation**: confirming an attended enrollment is a no-op.
/// - **Durable hash**: `assign_verification_hash` never replaces an existing
///   hash for the same (event, participant).
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Participant Directory
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert or update a participant's name and email.
    async fn upsert_participant(&self, participant: &Participant) -> Result<()>;

    async fn get_participant(&self, id: &ParticipantId) -> Result<Option<Participant>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Events and Activities
    // ─────────────────────────────────────────────────────────────────────────

    /// Create an event together with its initial activities in one transaction.
    async fn create_event(
        &self,
        event: &NewEvent,
        activities: &[NewActivity],
    ) -> Result<(Event, Vec<Activity>)>;

    async fn get_event(&self, id: EventId) -> Result<Option<Event>>;

    /// Replace the certificate background and template of an event.
    ///
    /// Returns `false` if the event does not exist.
    async fn update_certificate_config(
        &self,
        id: EventId,
        background: Option<&Background>,
        template: Option<&CertificateTemplate>,
    ) -> Result<bool>;

    /// Add an activity to an existing event. `None` if the event is unknown.
    async fn add_activity(&self, event: EventId, activity: &NewActivity)
        -> Result<Option<Activity>>;

    async fn get_activity(&self, id: ActivityId) -> Result<Option<Activity>>;

    /// Activities of an event, ordered by id.
    async fn list_activities(&self, event: EventId) -> Result<Vec<Activity>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Enrollment Ledger
    // ─────────────────────────────────────────────────────────────────────────

    /// Register a participant, recording `name` as the display-name snapshot.
    async fn register(
        &self,
        activity: ActivityId,
        participant: &ParticipantId,
        name: &str,
        now: i64,
    ) -> Result<RegisterOutcome>;

    /// Delete a registration that has not been attended. Returns whether a
    /// row was removed; attended enrollments are left alone.
    async fn withdraw(&self, activity: ActivityId, participant: &ParticipantId) -> Result<bool>;

    /// Mark attendance, auto-enrolling on fast check-in activities.
    async fn confirm_attendance(
        &self,
        activity: ActivityId,
        participant: &ParticipantId,
        name: &str,
        location: Option<GeoPoint>,
        now: i64,
    ) -> Result<ConfirmOutcome>;

    /// Administrative override of the attendance flag.
    async fn set_attendance(&self, id: EnrollmentId, attended: bool) -> Result<Option<Enrollment>>;

    async fn get_enrollment(&self, id: EnrollmentId) -> Result<Option<Enrollment>>;

    async fn find_enrollment(
        &self,
        activity: ActivityId,
        participant: &ParticipantId,
    ) -> Result<Option<Enrollment>>;

    /// All enrollments of an event, ordered by id.
    async fn list_event_enrollments(&self, event: EventId) -> Result<Vec<Enrollment>>;

    /// Explicit administrative removal, attended or not.
    ///
    /// A verification hash on the removed row passes to another enrollment
    /// of the same pair when one remains, so the certificate keeps verifying.
    async fn remove_enrollment(&self, id: EnrollmentId) -> Result<bool>;

    async fn set_alternate_address(&self, id: EnrollmentId, address: Option<&str>)
        -> Result<bool>;

    // ─────────────────────────────────────────────────────────────────────────
    // Certificates and Delivery
    // ─────────────────────────────────────────────────────────────────────────

    /// Bind `candidate` to the (event, participant) pair unless it already has
    /// a hash. The hash is stored on the pair's earliest attended enrollment.
    async fn assign_verification_hash(
        &self,
        event: EventId,
        participant: &ParticipantId,
        candidate: &VerificationHash,
    ) -> Result<HashAssignment>;

    async fn find_by_verification_hash(
        &self,
        hash: &VerificationHash,
    ) -> Result<Option<Enrollment>>;

    /// Set the delivery status of every attended enrollment of the pair.
    ///
    /// Returns the number of enrollments updated.
    async fn set_delivery_status(
        &self,
        event: EventId,
        participant: &ParticipantId,
        status: DeliveryStatus,
        at: i64,
    ) -> Result<usize>;
}

/// Attended enrollments of one participant in one event.
#[derive(Debug, Clone, PartialEq)]
pub struct Attendance {
    pub participant_id: ParticipantId,
    /// Attended enrollments, ordered by id. Never empty.
    pub enrollments: Vec<Enrollment>,
    /// Sum of the workload hours of the attended activities.
    pub hours: u32,
}

impl Attendance {
    /// The enrollment that carries the pair's verification hash.
    pub fn anchor(&self) -> &Enrollment {
        &self.enrollments[0]
    }

    /// The hash already bound to the pair, if any.
    pub fn verification_hash(&self) -> Option<&VerificationHash> {
        self.enrollments
            .iter()
            .find_map(|e| e.verification_hash.as_ref())
    }
}

/// Extension trait for common store patterns.
pub trait StoreExt: Store {
    /// Attended enrollments of every participant in an event, with hours.
    fn event_attendance(
        &self,
        event: EventId,
    ) -> impl std::future::Future<Output = Result<BTreeMap<ParticipantId, Attendance>>> + Send;

    /// Attended enrollments of one participant in an event.
    fn participant_attendance(
        &self,
        event: EventId,
        participant: &ParticipantId,
    ) -> impl std::future::Future<Output = Result<Option<Attendance>>> + Send;
}

impl<S: Store + ?Sized> StoreExt for S {
    async fn event_attendance(&self, event: EventId) -> Result<BTreeMap<ParticipantId, Attendance>> {
        let hours: BTreeMap<ActivityId, u32> = self
            .list_activities(event)
            .await?
            .into_iter()
            .map(|a| (a.id, a.hours))
            .collect();

        let mut by_participant: BTreeMap<ParticipantId, Attendance> = BTreeMap::new();
        for enrollment in self.list_event_enrollments(event).await? {
            if !enrollment.attended {
                continue;
            }
            let activity_hours = hours.get(&enrollment.activity_id).copied().unwrap_or(0);
            let entry = by_participant
                .entry(enrollment.participant_id.clone())
                .or_insert_with(|| Attendance {
                    participant_id: enrollment.participant_id.clone(),
                    enrollments: Vec::new(),
                    hours: 0,
                });
            entry.hours = entry.hours.saturating_add(activity_hours);
            entry.enrollments.push(enrollment);
        }

        Ok(by_participant)
    }

    async fn participant_attendance(
        &self,
        event: EventId,
        participant: &ParticipantId,
    ) -> Result<Option<Attendance>> {
        let mut all = self.event_attendance(event).await?;
        Ok(all.remove(participant))
    }
}
