//! The Rollcall service: one entry point over the ledger, the certificate
//! renderer and the delivery queue.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use rollcall_certificate::{
    format_date, Certificate, CertificateRenderer, FsDocumentStore, RenderError,
};
use rollcall_core::{
    Activity, ActivityId, Background, CertificateTemplate, CheckinPayload, Clock, DeliveryStatus,
    Enrollment, EnrollmentId, Event, EventId, EventKind, GeoPoint, NewActivity, NewEvent,
    Participant, ParticipantId, SystemClock, TokenCodec, VerificationHash, generate_share_token,
};
use rollcall_delivery::{Broker, DeliveryTask, Topology};
use rollcall_store::{Attendance, ConfirmOutcome, RegisterOutcome, Store, StoreExt};

use crate::config::RollcallConfig;
use crate::error::{Result, RollcallError};
use crate::notify;
use crate::observer::LedgerObserver;
use crate::report::{
    ActivityReport, BatchReport, CheckIn, EventReport, Registration, ReportLine, RosterEntry,
    Verification,
};

/// The main service struct.
///
/// Provides:
/// - Event and activity setup
/// - Registration, withdrawal and QR check-in
/// - Certificate issuance and public verification
/// - Queued certificate delivery and broadcasts
pub struct Rollcall<S: Store> {
    store: Arc<S>,
    codec: TokenCodec,
    renderer: CertificateRenderer,
    broker: Arc<dyn Broker>,
    clock: Arc<dyn Clock>,
    notify_participants: bool,
}

impl<S: Store> Rollcall<S> {
    pub fn new(
        store: S,
        codec: TokenCodec,
        renderer: CertificateRenderer,
        broker: Arc<dyn Broker>,
    ) -> Self {
        Self {
            store: Arc::new(store),
            codec,
            renderer,
            broker,
            clock: Arc::new(SystemClock),
            notify_participants: false,
        }
    }

    /// Build a service from validated configuration.
    ///
    /// Opens the document directory and the broker named by `queue_url`.
    pub async fn from_config(config: &RollcallConfig, store: S) -> Result<Self> {
        config.validate()?;
        let documents = FsDocumentStore::open(&config.documents_dir).await?;
        let renderer = CertificateRenderer::new(config.public_base_url.clone(), Arc::new(documents));
        let broker = rollcall_delivery::connect(&config.queue_url, Topology::default())?;
        Ok(Self::new(store, config.token_codec()?, renderer, broker)
            .with_notifications(config.notify_participants))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Enqueue registration and attendance notifications.
    pub fn with_notifications(mut self, enabled: bool) -> Self {
        self.notify_participants = enabled;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn broker(&self) -> &Arc<dyn Broker> {
        &self.broker
    }

    pub fn renderer(&self) -> &CertificateRenderer {
        &self.renderer
    }

    /// An observer that records worker outcomes on this service's ledger.
    pub fn ledger_observer(&self) -> LedgerObserver<S>
    where
        S: 'static,
    {
        LedgerObserver::new(self.store.clone()).with_clock(self.clock.clone())
    }

    fn now(&self) -> i64 {
        self.clock.now_millis()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lookups
    // ─────────────────────────────────────────────────────────────────────────

    async fn event(&self, id: EventId) -> Result<Event> {
        self.store
            .get_event(id)
            .await?
            .ok_or_else(|| RollcallError::NotFound(format!("event {}", id)))
    }

    async fn activity(&self, id: ActivityId) -> Result<Activity> {
        self.store
            .get_activity(id)
            .await?
            .ok_or_else(|| RollcallError::NotFound(format!("activity {}", id)))
    }

    async fn enrollment(&self, id: EnrollmentId) -> Result<Enrollment> {
        self.store
            .get_enrollment(id)
            .await?
            .ok_or_else(|| RollcallError::NotFound(format!("enrollment {}", id)))
    }

    async fn participant(&self, id: &ParticipantId) -> Result<Participant> {
        self.store
            .get_participant(id)
            .await?
            .ok_or_else(|| RollcallError::NotFound(format!("participant {}", id)))
    }

    /// The activity's geofence, falling back to its event's.
    async fn geofence_of(&self, activity: &Activity) -> Result<Option<GeoPoint>> {
        if activity.geofence.is_some() {
            return Ok(activity.geofence);
        }
        Ok(self
            .store
            .get_event(activity.event_id)
            .await?
            .and_then(|e| e.geofence))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Setup
    // ─────────────────────────────────────────────────────────────────────────

    /// Add or update a directory entry.
    pub async fn upsert_participant(&self, participant: &Participant) -> Result<()> {
        Ok(self.store.upsert_participant(participant).await?)
    }

    /// Create an event.
    ///
    /// A fast event always gets exactly one fast check-in activity and
    /// ignores `activities`. An empty share token is replaced by a random one.
    pub async fn create_event(
        &self,
        mut event: NewEvent,
        activities: Vec<NewActivity>,
    ) -> Result<(Event, Vec<Activity>)> {
        if event.share_token.is_empty() {
            event.share_token = generate_share_token();
        }
        let activities = match event.kind {
            EventKind::Fast => vec![NewActivity::fast_checkin_for(&event)],
            EventKind::Standard => activities,
        };

        let (event, activities) = self.store.create_event(&event, &activities).await?;
        tracing::info!(event = %event.id, kind = event.kind.as_str(), activities = activities.len(), "event created");
        Ok((event, activities))
    }

    pub async fn get_event(&self, id: EventId) -> Result<Event> {
        self.event(id).await
    }

    pub async fn list_activities(&self, event: EventId) -> Result<Vec<Activity>> {
        self.event(event).await?;
        Ok(self.store.list_activities(event).await?)
    }

    pub async fn add_activity(&self, event: EventId, activity: &NewActivity) -> Result<Activity> {
        self.store
            .add_activity(event, activity)
            .await?
            .ok_or_else(|| RollcallError::NotFound(format!("event {}", event)))
    }

    /// Replace the certificate background and template of an event.
    pub async fn update_certificate_config(
        &self,
        event: EventId,
        background: Option<&Background>,
        template: Option<&CertificateTemplate>,
    ) -> Result<()> {
        if !self
            .store
            .update_certificate_config(event, background, template)
            .await?
        {
            return Err(RollcallError::NotFound(format!("event {}", event)));
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Enrollment Ledger
    // ─────────────────────────────────────────────────────────────────────────

    /// Register a participant for an activity.
    ///
    /// Registering twice returns the existing enrollment.
    pub async fn register(
        &self,
        activity: ActivityId,
        participant: &ParticipantId,
    ) -> Result<Registration> {
        let person = self.participant(participant).await?;
        let outcome = self
            .store
            .register(activity, participant, &person.name, self.now())
            .await?;

        match outcome {
            RegisterOutcome::Registered(enrollment) => {
                tracing::info!(activity = %activity, participant = %participant, "registered");
                if let Some(email) = &person.email {
                    let act = self.activity(activity).await?;
                    let event = self.event(act.event_id).await?;
                    self.notify(notify::registration(email, &person.name, &act, &event))
                        .await;
                }
                Ok(Registration {
                    enrollment,
                    created: true,
                })
            }
            RegisterOutcome::AlreadyRegistered(enrollment) => Ok(Registration {
                enrollment,
                created: false,
            }),
            RegisterOutcome::CapacityExceeded => {
                tracing::info!(activity = %activity, participant = %participant, "registration refused, activity full");
                Err(RollcallError::CapacityExceeded(activity))
            }
            RegisterOutcome::ActivityNotFound => {
                Err(RollcallError::NotFound(format!("activity {}", activity)))
            }
        }
    }

    /// Withdraw a registration. Returns false if there was none or it was
    /// already attended; attended records go only through `remove_enrollment`.
    pub async fn withdraw(&self, activity: ActivityId, participant: &ParticipantId) -> Result<bool> {
        let removed = self.store.withdraw(activity, participant).await?;
        if removed {
            tracing::info!(activity = %activity, participant = %participant, "withdrawn");
        }
        Ok(removed)
    }

    /// Build the code a presenter displays for `activity` right now.
    pub async fn presenter_code(&self, activity: ActivityId) -> Result<CheckinPayload> {
        let activity = self.activity(activity).await?;
        Ok(CheckinPayload {
            event_id: activity.event_id,
            activity_id: activity.id,
            token: self.codec.issue(activity.id, self.now()),
        })
    }

    /// Confirm attendance from a scanned QR string.
    ///
    /// Every token problem surfaces as [`RollcallError::InvalidToken`].
    pub async fn check_in(
        &self,
        participant: &ParticipantId,
        scanned: &str,
        location: Option<GeoPoint>,
    ) -> Result<CheckIn> {
        let payload: CheckinPayload = scanned.parse().map_err(|e| {
            tracing::warn!(participant = %participant, error = %e, "rejected malformed check-in code");
            RollcallError::InvalidToken
        })?;

        let activity = self.activity(payload.activity_id).await?;
        if activity.event_id != payload.event_id {
            tracing::warn!(
                participant = %participant,
                activity = %activity.id,
                claimed_event = %payload.event_id,
                "rejected check-in code for another event"
            );
            return Err(RollcallError::InvalidToken);
        }
        if !self
            .codec
            .verify(activity.id, payload.token.as_str(), self.now())
        {
            tracing::warn!(participant = %participant, activity = %activity.id, "rejected expired check-in code");
            return Err(RollcallError::InvalidToken);
        }

        self.confirm(&activity, participant, location).await
    }

    /// Confirm attendance without a token.
    ///
    /// Fast check-in activities enroll the participant on the spot.
    pub async fn confirm_attendance(
        &self,
        activity: ActivityId,
        participant: &ParticipantId,
        event: EventId,
        location: Option<GeoPoint>,
    ) -> Result<CheckIn> {
        let activity = self.activity(activity).await?;
        if activity.event_id != event {
            return Err(RollcallError::NotFound(format!(
                "activity {} in event {}",
                activity.id, event
            )));
        }
        self.confirm(&activity, participant, location).await
    }

    async fn confirm(
        &self,
        activity: &Activity,
        participant: &ParticipantId,
        location: Option<GeoPoint>,
    ) -> Result<CheckIn> {
        let person = self.participant(participant).await?;
        let outcome = self
            .store
            .confirm_attendance(activity.id, participant, &person.name, location, self.now())
            .await?;

        let (enrollment, auto_enrolled, already_attended) = match outcome {
            ConfirmOutcome::Confirmed {
                enrollment,
                already_attended,
            } => (enrollment, false, already_attended),
            ConfirmOutcome::AutoEnrolled(enrollment) => (enrollment, true, false),
            ConfirmOutcome::NotEnrolled => {
                return Err(RollcallError::NotEnrolled {
                    activity: activity.id,
                    participant: participant.clone(),
                })
            }
            ConfirmOutcome::CapacityExceeded => {
                return Err(RollcallError::CapacityExceeded(activity.id))
            }
            ConfirmOutcome::ActivityNotFound => {
                return Err(RollcallError::NotFound(format!("activity {}", activity.id)))
            }
        };

        let fence = self.geofence_of(activity).await?;
        let distance_m = match (location, fence) {
            (Some(at), Some(fence)) => Some(at.distance_m(&fence)),
            _ => None,
        };

        if !already_attended {
            tracing::info!(
                activity = %activity.id,
                participant = %participant,
                auto_enrolled,
                distance_m,
                "attendance confirmed"
            );
            if let Some(email) = &person.email {
                self.notify(notify::attendance(email, &person.name, activity))
                    .await;
            }
        }

        Ok(CheckIn {
            enrollment,
            auto_enrolled,
            already_attended,
            distance_m,
        })
    }

    /// Administrative override of the attendance flag. No token, no capacity.
    pub async fn toggle_attendance_manual(
        &self,
        enrollment: EnrollmentId,
        attended: bool,
    ) -> Result<Enrollment> {
        let updated = self
            .store
            .set_attendance(enrollment, attended)
            .await?
            .ok_or_else(|| RollcallError::NotFound(format!("enrollment {}", enrollment)))?;
        tracing::info!(enrollment = %enrollment, attended, "attendance set manually");
        Ok(updated)
    }

    /// Delete an enrollment.
    pub async fn remove_enrollment(&self, enrollment: EnrollmentId) -> Result<()> {
        if !self.store.remove_enrollment(enrollment).await? {
            return Err(RollcallError::NotFound(format!("enrollment {}", enrollment)));
        }
        tracing::info!(enrollment = %enrollment, "enrollment removed");
        Ok(())
    }

    /// Set or clear the certificate address of an enrollment. Blank clears.
    pub async fn set_alternate_address(
        &self,
        enrollment: EnrollmentId,
        address: Option<&str>,
    ) -> Result<()> {
        let address = address.map(str::trim).filter(|a| !a.is_empty());
        if !self.store.set_alternate_address(enrollment, address).await? {
            return Err(RollcallError::NotFound(format!("enrollment {}", enrollment)));
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reports
    // ─────────────────────────────────────────────────────────────────────────

    /// Enrollments of an event per activity, with check-in distances.
    pub async fn event_report(&self, event: EventId) -> Result<EventReport> {
        let event = self.event(event).await?;
        let activities = self.store.list_activities(event.id).await?;

        let mut by_activity: BTreeMap<ActivityId, Vec<Enrollment>> = BTreeMap::new();
        for enrollment in self.store.list_event_enrollments(event.id).await? {
            by_activity
                .entry(enrollment.activity_id)
                .or_default()
                .push(enrollment);
        }

        let activities = activities
            .into_iter()
            .map(|activity| {
                let fence = activity.geofence.or(event.geofence);
                let lines = by_activity
                    .remove(&activity.id)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|enrollment| {
                        let distance_m = match (enrollment.checkin_location, fence) {
                            (Some(at), Some(fence)) => Some(at.distance_m(&fence)),
                            _ => None,
                        };
                        ReportLine {
                            enrollment,
                            distance_m,
                        }
                    })
                    .collect();
                ActivityReport { activity, lines }
            })
            .collect();

        Ok(EventReport { event, activities })
    }

    /// Attended participants of an event with their delivery state.
    pub async fn delivery_roster(&self, event: EventId) -> Result<Vec<RosterEntry>> {
        self.event(event).await?;
        let mut roster = Vec::new();
        for (participant_id, attendance) in self.store.event_attendance(event).await? {
            let address = self.address_for(&attendance).await?;
            let anchor = attendance.anchor();
            roster.push(RosterEntry {
                name: anchor.participant_name.clone(),
                enrollment_id: anchor.id,
                address,
                hours: attendance.hours,
                verification_hash: attendance.verification_hash().cloned(),
                delivery_status: anchor.delivery_status,
                delivered_at: anchor.delivered_at,
                participant_id,
            });
        }
        Ok(roster)
    }

    async fn address_for(&self, attendance: &Attendance) -> Result<Option<String>> {
        if let Some(alt) = attendance
            .enrollments
            .iter()
            .find_map(|e| e.alternate_address.clone())
        {
            return Ok(Some(alt));
        }
        Ok(self
            .store
            .get_participant(&attendance.participant_id)
            .await?
            .and_then(|p| p.email))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Certificates
    // ─────────────────────────────────────────────────────────────────────────

    /// Issue (or re-issue) the certificate behind an enrollment.
    pub async fn certificate(&self, enrollment: EnrollmentId) -> Result<Certificate> {
        let enrollment = self.enrollment(enrollment).await?;
        let event = self.event(enrollment.event_id).await?;
        Ok(self
            .renderer
            .issue(self.store.as_ref(), &event, &enrollment.participant_id)
            .await?)
    }

    /// Re-issue the certificate that carries `hash`.
    pub async fn certificate_by_hash(&self, hash: &str) -> Result<Certificate> {
        let enrollment = self
            .enrollment_by_hash(hash)
            .await?
            .ok_or_else(|| RollcallError::NotFound(format!("certificate {}", hash.trim())))?;
        let event = self.event(enrollment.event_id).await?;
        Ok(self
            .renderer
            .issue(self.store.as_ref(), &event, &enrollment.participant_id)
            .await?)
    }

    async fn enrollment_by_hash(&self, hash: &str) -> Result<Option<Enrollment>> {
        let Ok(hash) = VerificationHash::parse(&hash.trim().to_ascii_uppercase()) else {
            return Ok(None);
        };
        Ok(self.store.find_by_verification_hash(&hash).await?)
    }

    /// Public lookup of a verification hash. `None` if it is unknown.
    pub async fn verify_hash(&self, hash: &str) -> Result<Option<Verification>> {
        let Some(enrollment) = self.enrollment_by_hash(hash).await? else {
            return Ok(None);
        };
        let Some(event) = self.store.get_event(enrollment.event_id).await? else {
            return Ok(None);
        };
        let hours = self
            .store
            .participant_attendance(event.id, &enrollment.participant_id)
            .await?
            .map(|a| a.hours)
            .unwrap_or(0);

        Ok(Some(Verification {
            participant_name: enrollment.participant_name,
            event_name: event.name,
            date: event.start_date.as_deref().map(format_date).unwrap_or_default(),
            hours,
        }))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Delivery
    // ─────────────────────────────────────────────────────────────────────────

    /// Render and enqueue one certificate per attended participant.
    ///
    /// Running it again sends again. Store errors abort the batch; render and
    /// enqueue failures are counted and the batch continues.
    pub async fn send_all(&self, event: EventId) -> Result<BatchReport> {
        let event = self.event(event).await?;
        let mut report = BatchReport::default();

        for (participant, attendance) in self.store.event_attendance(event.id).await? {
            let Some(address) = self.address_for(&attendance).await? else {
                report.skipped_no_address += 1;
                continue;
            };
            let name = attendance.anchor().participant_name.clone();

            let certificate = match self.renderer.issue(self.store.as_ref(), &event, &participant).await {
                Ok(certificate) => certificate,
                Err(RenderError::Store(e)) => return Err(e.into()),
                Err(e) => {
                    tracing::error!(event = %event.id, participant = %participant, error = %e, "certificate render failed");
                    report.failed += 1;
                    continue;
                }
            };

            let anchor = attendance.anchor();
            let task = notify::certificate(&address, &name, &event)
                .with_attachment(certificate.key.as_str())
                .for_enrollment(anchor.id);
            match self.enqueue_certificate(anchor, &task).await {
                Ok(()) => report.queued += 1,
                Err(RollcallError::Delivery(_)) => report.failed += 1,
                Err(e) => return Err(e),
            }
        }

        tracing::info!(
            event = %event.id,
            queued = report.queued,
            skipped = report.skipped_no_address,
            failed = report.failed,
            "certificate batch enqueued"
        );
        Ok(report)
    }

    /// Render and enqueue the certificate of one enrollment again.
    ///
    /// Goes to the enrollment's alternate address if set, else the
    /// participant's email.
    pub async fn resend(&self, enrollment: EnrollmentId) -> Result<Certificate> {
        let enrollment = self.enrollment(enrollment).await?;
        let event = self.event(enrollment.event_id).await?;
        let person = self.participant(&enrollment.participant_id).await?;

        let address = enrollment
            .alternate_address
            .clone()
            .or(person.email)
            .ok_or_else(|| {
                RollcallError::NotFound(format!("address for enrollment {}", enrollment.id))
            })?;

        let certificate = self
            .renderer
            .issue(self.store.as_ref(), &event, &enrollment.participant_id)
            .await?;

        let attendance = self
            .store
            .participant_attendance(event.id, &enrollment.participant_id)
            .await?
            .ok_or_else(|| {
                RollcallError::RenderPrecondition(format!(
                    "participant {} has no attendance in event {}",
                    enrollment.participant_id, event.id
                ))
            })?;

        let task = notify::resend(&address, &enrollment.participant_name, &event)
            .with_attachment(certificate.key.as_str())
            .for_enrollment(enrollment.id);
        self.enqueue_certificate(attendance.anchor(), &task).await?;
        tracing::info!(enrollment = %enrollment.id, "certificate resend enqueued");
        Ok(certificate)
    }

    /// Mark the pair `Enqueued`, then publish.
    ///
    /// The worker may settle the task before `publish` returns, so the mark
    /// comes first. If the broker refuses the task, the status the anchor
    /// had before is put back and the broker error returned.
    async fn enqueue_certificate(&self, anchor: &Enrollment, task: &DeliveryTask) -> Result<()> {
        let (event, participant) = (anchor.event_id, &anchor.participant_id);
        let now = self.now();
        self.store
            .set_delivery_status(event, participant, DeliveryStatus::Enqueued, now)
            .await?;

        if let Err(e) = self.broker.publish(task).await {
            tracing::warn!(event = %event, participant = %participant, error = %e, "certificate enqueue failed");
            self.store
                .set_delivery_status(
                    event,
                    participant,
                    anchor.delivery_status,
                    anchor.delivered_at.unwrap_or(now),
                )
                .await?;
            return Err(e.into());
        }
        Ok(())
    }

    /// Send a message to every distinct enrolled participant with an email.
    ///
    /// Returns the number of messages enqueued.
    pub async fn broadcast(&self, event: EventId, subject: &str, body: &str) -> Result<usize> {
        self.event(event).await?;
        let participants: BTreeSet<ParticipantId> = self
            .store
            .list_event_enrollments(event)
            .await?
            .into_iter()
            .map(|e| e.participant_id)
            .collect();

        let mut sent = 0;
        for id in participants {
            let Some(email) = self.store.get_participant(&id).await?.and_then(|p| p.email) else {
                continue;
            };
            self.broker
                .publish(&notify::broadcast(&email, subject, body))
                .await?;
            sent += 1;
        }
        tracing::info!(event = %event, sent, "broadcast enqueued");
        Ok(sent)
    }

    /// Enqueue a notification if enabled. Failures are logged only.
    async fn notify(&self, task: DeliveryTask) {
        if !self.notify_participants {
            return;
        }
        if let Err(e) = self.broker.publish(&task).await {
            tracing::warn!(to = %task.to, error = %e, "notification enqueue failed");
        }
    }
}
