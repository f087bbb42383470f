//! SQLite implementation of the Store trait.
//!
//! This is the primary storage backend for Rollcall. It uses rusqlite with
//! bundled SQLite, wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

use rollcall_core::{
    Activity, ActivityId, Background, Capacity, CertificateTemplate, CoreError, DeliveryStatus,
    Enrollment, EnrollmentId, Event, EventId, EventKind, EventStatus, GeoPoint, NewActivity,
    NewEvent, Participant, ParticipantId, VerificationHash,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{ConfirmOutcome, HashAssignment, RegisterOutcome, Store};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking operation on the connection off the async runtime.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row mapping
// ─────────────────────────────────────────────────────────────────────────────

const EVENT_COLUMNS: &str = "event_id, owner, name, description, kind, start_date, start_time,
    end_date, end_time, share_token, status, geo_lat, geo_lon, background_ref,
    background_width, background_height, template";

const ACTIVITY_COLUMNS: &str = "activity_id, event_id, name, speaker, location, description,
    date, time, hours, capacity, geo_lat, geo_lon, fast_checkin";

const ENROLLMENT_COLUMNS: &str = "enrollment_id, activity_id, event_id, participant_id,
    participant_name, attended, alternate_address, verification_hash, checkin_lat,
    checkin_lon, delivery_status, delivered_at, created_at";

fn invalid_column(row: &Row<'_>, column: &str, e: CoreError) -> rusqlite::Error {
    let idx = row.as_ref().column_index(column).unwrap_or(0);
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn row_to_event(row: &Row<'_>) -> rusqlite::Result<Event> {
    let kind: String = row.get("kind")?;
    let status: String = row.get("status")?;
    let template: Option<String> = row.get("template")?;

    let background = match row.get::<_, Option<String>>("background_ref")? {
        Some(reference) => Some(Background {
            reference,
            width_px: row.get::<_, Option<u32>>("background_width")?.unwrap_or(0),
            height_px: row.get::<_, Option<u32>>("background_height")?.unwrap_or(0),
        }),
        None => None,
    };

    Ok(Event {
        id: EventId(row.get("event_id")?),
        owner: row.get("owner")?,
        name: row.get("name")?,
        description: row.get("description")?,
        kind: EventKind::parse(&kind).map_err(|e| invalid_column(row, "kind", e))?,
        start_date: row.get("start_date")?,
        start_time: row.get("start_time")?,
        end_date: row.get("end_date")?,
        end_time: row.get("end_time")?,
        share_token: row.get("share_token")?,
        status: EventStatus::parse(&status).map_err(|e| invalid_column(row, "status", e))?,
        geofence: GeoPoint::from_parts(row.get("geo_lat")?, row.get("geo_lon")?),
        background,
        template: template
            .map(|json| CertificateTemplate::from_json(&json))
            .transpose()
            .map_err(|e| invalid_column(row, "template", e))?,
    })
}

fn row_to_activity(row: &Row<'_>) -> rusqlite::Result<Activity> {
    Ok(Activity {
        id: ActivityId(row.get("activity_id")?),
        event_id: EventId(row.get("event_id")?),
        name: row.get("name")?,
        speaker: row.get("speaker")?,
        location: row.get("location")?,
        description: row.get("description")?,
        date: row.get("date")?,
        time: row.get("time")?,
        hours: row.get("hours")?,
        capacity: Capacity::from_column(row.get("capacity")?),
        geofence: GeoPoint::from_parts(row.get("geo_lat")?, row.get("geo_lon")?),
        fast_checkin: row.get("fast_checkin")?,
    })
}

fn row_to_enrollment(row: &Row<'_>) -> rusqlite::Result<Enrollment> {
    let hash: Option<String> = row.get("verification_hash")?;
    let status: String = row.get("delivery_status")?;

    Ok(Enrollment {
        id: EnrollmentId(row.get("enrollment_id")?),
        activity_id: ActivityId(row.get("activity_id")?),
        event_id: EventId(row.get("event_id")?),
        participant_id: ParticipantId::new(row.get::<_, String>("participant_id")?),
        participant_name: row.get("participant_name")?,
        attended: row.get("attended")?,
        alternate_address: row.get("alternate_address")?,
        verification_hash: hash
            .map(|h| VerificationHash::parse(&h))
            .transpose()
            .map_err(|e| invalid_column(row, "verification_hash", e))?,
        checkin_location: GeoPoint::from_parts(row.get("checkin_lat")?, row.get("checkin_lon")?),
        delivery_status: DeliveryStatus::parse(&status)
            .map_err(|e| invalid_column(row, "delivery_status", e))?,
        delivered_at: row.get("delivered_at")?,
        created_at: row.get("created_at")?,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Blocking helpers (run inside `run` or a transaction)
// ─────────────────────────────────────────────────────────────────────────────

fn event_by_id(conn: &Connection, id: EventId) -> Result<Option<Event>> {
    conn.query_row(
        &format!("SELECT {} FROM events WHERE event_id = ?1", EVENT_COLUMNS),
        params![id.get()],
        row_to_event,
    )
    .optional()
    .map_err(StoreError::from)
}

fn activity_by_id(conn: &Connection, id: ActivityId) -> Result<Option<Activity>> {
    conn.query_row(
        &format!("SELECT {} FROM activities WHERE activity_id = ?1", ACTIVITY_COLUMNS),
        params![id.get()],
        row_to_activity,
    )
    .optional()
    .map_err(StoreError::from)
}

fn enrollment_by_id(conn: &Connection, id: EnrollmentId) -> Result<Option<Enrollment>> {
    conn.query_row(
        &format!("SELECT {} FROM enrollments WHERE enrollment_id = ?1", ENROLLMENT_COLUMNS),
        params![id.get()],
        row_to_enrollment,
    )
    .optional()
    .map_err(StoreError::from)
}

fn enrollment_by_pair(
    conn: &Connection,
    activity: ActivityId,
    participant: &ParticipantId,
) -> Result<Option<Enrollment>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM enrollments WHERE activity_id = ?1 AND participant_id = ?2",
            ENROLLMENT_COLUMNS
        ),
        params![activity.get(), participant.as_str()],
        row_to_enrollment,
    )
    .optional()
    .map_err(StoreError::from)
}

fn reload_enrollment(conn: &Connection, id: EnrollmentId) -> Result<Enrollment> {
    enrollment_by_id(conn, id)?
        .ok_or_else(|| StoreError::InvalidData(format!("enrollment {} vanished", id)))
}

fn insert_activity(conn: &Connection, event: EventId, activity: &NewActivity) -> Result<Activity> {
    conn.execute(
        "INSERT INTO activities (
            event_id, name, speaker, location, description, date, time,
            hours, capacity, geo_lat, geo_lon, fast_checkin
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            event.get(),
            activity.name,
            activity.speaker,
            activity.location,
            activity.description,
            activity.date,
            activity.time,
            activity.hours,
            activity.capacity.to_column(),
            activity.geofence.map(|g| g.lat),
            activity.geofence.map(|g| g.lon),
            activity.fast_checkin,
        ],
    )?;
    let id = ActivityId(conn.last_insert_rowid());
    activity_by_id(conn, id)?
        .ok_or_else(|| StoreError::InvalidData(format!("activity {} vanished", id)))
}

/// Insert an enrollment only if the activity has room.
///
/// The capacity test and the insert are one statement; callers hold an
/// `IMMEDIATE` transaction so the count cannot move underneath it.
fn insert_enrollment_if_room(
    conn: &Connection,
    activity: &Activity,
    participant: &ParticipantId,
    name: &str,
    attended: bool,
    location: Option<GeoPoint>,
    now: i64,
) -> Result<Option<EnrollmentId>> {
    let inserted = conn.execute(
        "INSERT INTO enrollments (
            activity_id, event_id, participant_id, participant_name, attended,
            checkin_lat, checkin_lon, delivery_status, created_at
        )
        SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', ?8
        WHERE ?9 < 0 OR (SELECT COUNT(*) FROM enrollments WHERE activity_id = ?1) < ?9",
        params![
            activity.id.get(),
            activity.event_id.get(),
            participant.as_str(),
            name,
            attended,
            location.map(|g| g.lat),
            location.map(|g| g.lon),
            now,
            activity.capacity.to_column(),
        ],
    )?;

    if inserted == 0 {
        return Ok(None);
    }
    Ok(Some(EnrollmentId(conn.last_insert_rowid())))
}

/// Delete an enrollment, handing its verification hash to the pair's next
/// enrollment, attended ones first.
fn delete_enrollment(conn: &Connection, enrollment: &Enrollment) -> Result<()> {
    conn.execute(
        "DELETE FROM enrollments WHERE enrollment_id = ?1",
        params![enrollment.id.get()],
    )?;
    if let Some(hash) = &enrollment.verification_hash {
        conn.execute(
            "UPDATE enrollments SET verification_hash = ?1
             WHERE enrollment_id = (
                 SELECT enrollment_id FROM enrollments
                 WHERE event_id = ?2 AND participant_id = ?3
                 ORDER BY attended DESC, enrollment_id
                 LIMIT 1
             )",
            params![
                hash.as_str(),
                enrollment.event_id.get(),
                enrollment.participant_id.as_str()
            ],
        )?;
    }
    Ok(())
}

#[async_trait]
impl Store for SqliteStore {
    async fn upsert_participant(&self, participant: &Participant) -> Result<()> {
        let participant = participant.clone();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO participants (participant_id, name, email) VALUES (?1, ?2, ?3)
                 ON CONFLICT(participant_id) DO UPDATE SET name = excluded.name, email = excluded.email",
                params![participant.id.as_str(), participant.name, participant.email],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_participant(&self, id: &ParticipantId) -> Result<Option<Participant>> {
        let id = id.clone();
        self.run(move |conn| {
            conn.query_row(
                "SELECT participant_id, name, email FROM participants WHERE participant_id = ?1",
                params![id.as_str()],
                |row| {
                    Ok(Participant {
                        id: ParticipantId::new(row.get::<_, String>(0)?),
                        name: row.get(1)?,
                        email: row.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn create_event(
        &self,
        event: &NewEvent,
        activities: &[NewActivity],
    ) -> Result<(Event, Vec<Activity>)> {
        let event = event.clone();
        let activities = activities.to_vec();

        self.run(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO events (
                    owner, name, description, kind, start_date, start_time,
                    end_date, end_time, share_token, status, geo_lat, geo_lon
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    event.owner,
                    event.name,
                    event.description,
                    event.kind.as_str(),
                    event.start_date,
                    event.start_time,
                    event.end_date,
                    event.end_time,
                    event.share_token,
                    EventStatus::Open.as_str(),
                    event.geofence.map(|g| g.lat),
                    event.geofence.map(|g| g.lon),
                ],
            )?;
            let event_id = EventId(tx.last_insert_rowid());

            let created = activities
                .iter()
                .map(|a| insert_activity(&tx, event_id, a))
                .collect::<Result<Vec<_>>>()?;

            let stored = event_by_id(&tx, event_id)?
                .ok_or_else(|| StoreError::InvalidData(format!("event {} vanished", event_id)))?;
            tx.commit()?;

            tracing::debug!(event = %event_id, activities = created.len(), "event created");
            Ok((stored, created))
        })
        .await
    }

    async fn get_event(&self, id: EventId) -> Result<Option<Event>> {
        self.run(move |conn| event_by_id(conn, id)).await
    }

    async fn update_certificate_config(
        &self,
        id: EventId,
        background: Option<&Background>,
        template: Option<&CertificateTemplate>,
    ) -> Result<bool> {
        let background = background.cloned();
        let template = template.map(CertificateTemplate::to_json).transpose()?;

        self.run(move |conn| {
            let updated = conn.execute(
                "UPDATE events SET background_ref = ?1, background_width = ?2,
                    background_height = ?3, template = ?4
                 WHERE event_id = ?5",
                params![
                    background.as_ref().map(|b| b.reference.as_str()),
                    background.as_ref().map(|b| b.width_px),
                    background.as_ref().map(|b| b.height_px),
                    template,
                    id.get(),
                ],
            )?;
            Ok(updated > 0)
        })
        .await
    }

    async fn add_activity(
        &self,
        event: EventId,
        activity: &NewActivity,
    ) -> Result<Option<Activity>> {
        let activity = activity.clone();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            if event_by_id(&tx, event)?.is_none() {
                return Ok(None);
            }
            let created = insert_activity(&tx, event, &activity)?;
            tx.commit()?;
            Ok(Some(created))
        })
        .await
    }

    async fn get_activity(&self, id: ActivityId) -> Result<Option<Activity>> {
        self.run(move |conn| activity_by_id(conn, id)).await
    }

    async fn list_activities(&self, event: EventId) -> Result<Vec<Activity>> {
        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM activities WHERE event_id = ?1 ORDER BY activity_id",
                ACTIVITY_COLUMNS
            ))?;
            let activities = stmt
                .query_map(params![event.get()], row_to_activity)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(activities)
        })
        .await
    }

    async fn register(
        &self,
        activity: ActivityId,
        participant: &ParticipantId,
        name: &str,
        now: i64,
    ) -> Result<RegisterOutcome> {
        let participant = participant.clone();
        let name = name.to_string();

        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let Some(slot) = activity_by_id(&tx, activity)? else {
                return Ok(RegisterOutcome::ActivityNotFound);
            };
            if let Some(existing) = enrollment_by_pair(&tx, activity, &participant)? {
                return Ok(RegisterOutcome::AlreadyRegistered(existing));
            }

            let outcome =
                match insert_enrollment_if_room(&tx, &slot, &participant, &name, false, None, now)? {
                    Some(id) => RegisterOutcome::Registered(reload_enrollment(&tx, id)?),
                    None => RegisterOutcome::CapacityExceeded,
                };
            tx.commit()?;
            Ok(outcome)
        })
        .await
    }

    async fn withdraw(&self, activity: ActivityId, participant: &ParticipantId) -> Result<bool> {
        let participant = participant.clone();
        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let Some(enrollment) = enrollment_by_pair(&tx, activity, &participant)?
                .filter(|e| !e.attended)
            else {
                return Ok(false);
            };
            delete_enrollment(&tx, &enrollment)?;
            tx.commit()?;
            Ok(true)
        })
        .await
    }

    async fn confirm_attendance(
        &self,
        activity: ActivityId,
        participant: &ParticipantId,
        name: &str,
        location: Option<GeoPoint>,
        now: i64,
    ) -> Result<ConfirmOutcome> {
        let participant = participant.clone();
        let name = name.to_string();

        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let Some(slot) = activity_by_id(&tx, activity)? else {
                return Ok(ConfirmOutcome::ActivityNotFound);
            };

            let outcome = match enrollment_by_pair(&tx, activity, &participant)? {
                Some(enrollment) if enrollment.attended => ConfirmOutcome::Confirmed {
                    enrollment,
                    already_attended: true,
                },
                Some(enrollment) => {
                    tx.execute(
                        "UPDATE enrollments SET attended = 1,
                            checkin_lat = COALESCE(?1, checkin_lat),
                            checkin_lon = COALESCE(?2, checkin_lon)
                         WHERE enrollment_id = ?3 AND attended = 0",
                        params![
                            location.map(|g| g.lat),
                            location.map(|g| g.lon),
                            enrollment.id.get()
                        ],
                    )?;
                    ConfirmOutcome::Confirmed {
                        enrollment: reload_enrollment(&tx, enrollment.id)?,
                        already_attended: false,
                    }
                }
                None if slot.fast_checkin => {
                    match insert_enrollment_if_room(
                        &tx,
                        &slot,
                        &participant,
                        &name,
                        true,
                        location,
                        now,
                    )? {
                        Some(id) => ConfirmOutcome::AutoEnrolled(reload_enrollment(&tx, id)?),
                        None => ConfirmOutcome::CapacityExceeded,
                    }
                }
                None => ConfirmOutcome::NotEnrolled,
            };

            tx.commit()?;
            Ok(outcome)
        })
        .await
    }

    async fn set_attendance(&self, id: EnrollmentId, attended: bool) -> Result<Option<Enrollment>> {
        self.run(move |conn| {
            let updated = conn.execute(
                "UPDATE enrollments SET attended = ?1 WHERE enrollment_id = ?2",
                params![attended, id.get()],
            )?;
            if updated == 0 {
                return Ok(None);
            }
            enrollment_by_id(conn, id)
        })
        .await
    }

    async fn get_enrollment(&self, id: EnrollmentId) -> Result<Option<Enrollment>> {
        self.run(move |conn| enrollment_by_id(conn, id)).await
    }

    async fn find_enrollment(
        &self,
        activity: ActivityId,
        participant: &ParticipantId,
    ) -> Result<Option<Enrollment>> {
        let participant = participant.clone();
        self.run(move |conn| enrollment_by_pair(conn, activity, &participant))
            .await
    }

    async fn list_event_enrollments(&self, event: EventId) -> Result<Vec<Enrollment>> {
        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM enrollments WHERE event_id = ?1 ORDER BY enrollment_id",
                ENROLLMENT_COLUMNS
            ))?;
            let enrollments = stmt
                .query_map(params![event.get()], row_to_enrollment)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(enrollments)
        })
        .await
    }

    async fn remove_enrollment(&self, id: EnrollmentId) -> Result<bool> {
        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let Some(enrollment) = enrollment_by_id(&tx, id)? else {
                return Ok(false);
            };
            delete_enrollment(&tx, &enrollment)?;
            tx.commit()?;
            Ok(true)
        })
        .await
    }

    async fn set_alternate_address(
        &self,
        id: EnrollmentId,
        address: Option<&str>,
    ) -> Result<bool> {
        let address = address.map(str::to_string);
        self.run(move |conn| {
            let updated = conn.execute(
                "UPDATE enrollments SET alternate_address = ?1 WHERE enrollment_id = ?2",
                params![address, id.get()],
            )?;
            Ok(updated > 0)
        })
        .await
    }

    async fn assign_verification_hash(
        &self,
        event: EventId,
        participant: &ParticipantId,
        candidate: &VerificationHash,
    ) -> Result<HashAssignment> {
        let participant = participant.clone();
        let candidate = candidate.clone();

        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let existing: Option<String> = tx
                .query_row(
                    "SELECT verification_hash FROM enrollments
                     WHERE event_id = ?1 AND participant_id = ?2 AND verification_hash IS NOT NULL
                     ORDER BY enrollment_id LIMIT 1",
                    params![event.get(), participant.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(existing) = existing {
                return Ok(HashAssignment::Existing(VerificationHash::parse(&existing)?));
            }

            let anchor: Option<i64> = tx
                .query_row(
                    "SELECT enrollment_id FROM enrollments
                     WHERE event_id = ?1 AND participant_id = ?2 AND attended = 1
                     ORDER BY enrollment_id LIMIT 1",
                    params![event.get(), participant.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(anchor) = anchor else {
                return Ok(HashAssignment::NoAttendance);
            };

            let taken: Option<i64> = tx
                .query_row(
                    "SELECT enrollment_id FROM enrollments WHERE verification_hash = ?1",
                    params![candidate.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            if taken.is_some() {
                return Ok(HashAssignment::Collision);
            }

            tx.execute(
                "UPDATE enrollments SET verification_hash = ?1
                 WHERE enrollment_id = ?2 AND verification_hash IS NULL",
                params![candidate.as_str(), anchor],
            )?;
            tx.commit()?;

            tracing::debug!(event = %event, participant = %participant, "verification hash assigned");
            Ok(HashAssignment::Assigned(candidate))
        })
        .await
    }

    async fn find_by_verification_hash(
        &self,
        hash: &VerificationHash,
    ) -> Result<Option<Enrollment>> {
        let hash = hash.clone();
        self.run(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {} FROM enrollments WHERE verification_hash = ?1",
                    ENROLLMENT_COLUMNS
                ),
                params![hash.as_str()],
                row_to_enrollment,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn set_delivery_status(
        &self,
        event: EventId,
        participant: &ParticipantId,
        status: DeliveryStatus,
        at: i64,
    ) -> Result<usize> {
        let participant = participant.clone();
        self.run(move |conn| {
            let updated = conn.execute(
                "UPDATE enrollments SET delivery_status = ?1, delivered_at = ?2
                 WHERE event_id = ?3 AND participant_id = ?4 AND attended = 1",
                params![status.as_str(), at, event.get(), participant.as_str()],
            )?;
            Ok(updated)
        })
        .await
    }
}
