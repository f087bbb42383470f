//! Result and report types returned by the service.

use rollcall_core::{
    Activity, DeliveryStatus, Enrollment, EnrollmentId, Event, ParticipantId, VerificationHash,
};

/// Outcome of a registration request.
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub enrollment: Enrollment,
    /// False when the participant was already registered.
    pub created: bool,
}

/// Outcome of a successful attendance confirmation.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckIn {
    pub enrollment: Enrollment,
    /// The enrollment was created by this check-in.
    pub auto_enrolled: bool,
    /// Attendance was already confirmed; nothing changed.
    pub already_attended: bool,
    /// Meters from the geofence center, when both points are known.
    pub distance_m: Option<f64>,
}

/// One enrollment line of an event report.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportLine {
    pub enrollment: Enrollment,
    pub distance_m: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActivityReport {
    pub activity: Activity,
    pub lines: Vec<ReportLine>,
}

impl ActivityReport {
    pub fn attended(&self) -> usize {
        self.lines.iter().filter(|l| l.enrollment.attended).count()
    }
}

/// Enrollments of an event, grouped by activity.
#[derive(Debug, Clone, PartialEq)]
pub struct EventReport {
    pub event: Event,
    pub activities: Vec<ActivityReport>,
}

/// Certificate delivery state of one attended participant.
#[derive(Debug, Clone, PartialEq)]
pub struct RosterEntry {
    pub participant_id: ParticipantId,
    pub name: String,
    /// Enrollment that carries the pair's verification hash.
    pub enrollment_id: EnrollmentId,
    /// Alternate address if one is set, else the directory email.
    pub address: Option<String>,
    pub hours: u32,
    pub verification_hash: Option<VerificationHash>,
    pub delivery_status: DeliveryStatus,
    pub delivered_at: Option<i64>,
}

/// Counts from a batch certificate run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Certificates rendered and enqueued.
    pub queued: usize,
    /// Attended participants with no address to send to.
    pub skipped_no_address: usize,
    /// Participants whose render or enqueue failed.
    pub failed: usize,
}

/// Public confirmation that a certificate is genuine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub participant_name: String,
    pub event_name: String,
    /// `DD/MM/YYYY`, empty when the event has no start date.
    pub date: String,
    pub hours: u32,
}
