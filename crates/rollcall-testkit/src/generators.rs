//! Proptest generators for property-based testing.

use proptest::prelude::*;

use rollcall_core::{ActivityId, GeoPoint, ParticipantId, WINDOW_MILLIS};

/// A positive activity id.
pub fn activity_id() -> impl Strategy<Value = ActivityId> {
    (1i64..1_000_000).prop_map(ActivityId)
}

/// An instant between 2020 and 2100, in unix ms.
pub fn instant() -> impl Strategy<Value = i64> {
    1_577_836_800_000i64..4_102_444_800_000
}

/// An instant at least one second into its window and one second before
/// its end.
pub fn mid_window_instant() -> impl Strategy<Value = i64> {
    (instant(), 1_000i64..WINDOW_MILLIS - 1_000)
        .prop_map(|(t, offset)| t - t.rem_euclid(WINDOW_MILLIS) + offset)
}

/// A document-number style participant id.
pub fn participant_id() -> impl Strategy<Value = ParticipantId> {
    "[0-9]{11}".prop_map(ParticipantId::new)
}

/// A valid WGS84 point.
pub fn geo_point() -> impl Strategy<Value = GeoPoint> {
    (-90.0f64..=90.0, -180.0f64..=180.0).prop_map(|(lat, lon)| GeoPoint { lat, lon })
}

/// Text a participant might type, including markup and tag-like sequences.
pub fn hostile_text() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z ]{0,40}",
        Just("<script>alert(1)</script>".to_string()),
        Just("{{HASH}} & {{NOME}}".to_string()),
        Just("\"quoted\" 'single'".to_string()),
    ]
}
