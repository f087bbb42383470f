//! Certificate issuance and public verification.

mod common;

use rollcall::core::{Capacity, EnrollmentId, Enrollment, ParticipantId};
use rollcall::RollcallError;
use rollcall_testkit::fixtures::{new_activity, participant, TEST_BASE_URL};

use common::Harness;

/// Register and mark attended without going through a token.
async fn attend(h: &Harness, activity: rollcall::core::ActivityId, who: &ParticipantId) -> Enrollment {
    let registration = h.service.register(activity, who).await.unwrap();
    h.service
        .toggle_attendance_manual(registration.enrollment.id, true)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_hash_is_stable_across_renders() {
    let h = Harness::new();
    let (_, activity) = h.single_activity(4, Capacity::Unlimited).await;
    let ids = h.people(1).await;
    let enrollment = attend(&h, activity.id, &ids[0]).await;

    let first = h.service.certificate(enrollment.id).await.unwrap();
    let second = h.service.certificate(enrollment.id).await.unwrap();

    assert_eq!(first.hash, second.hash);
    assert_eq!(first.key, second.key);
    assert_eq!(h.documents.len(), 1);
    assert_eq!(
        first.verification_url,
        format!("{}/validar/{}", TEST_BASE_URL, first.hash)
    );
}

#[tokio::test]
async fn test_hours_sum_attended_activities_only() {
    let h = Harness::new();
    let (event, activities) = h
        .standard_event(vec![
            new_activity("Abertura", 2, Capacity::Unlimited),
            new_activity("Oficina", 3, Capacity::Unlimited),
            new_activity("Encerramento", 7, Capacity::Unlimited),
        ])
        .await;
    let ids = h.people(1).await;

    let opening = attend(&h, activities[0].id, &ids[0]).await;
    attend(&h, activities[1].id, &ids[0]).await;
    // Registered but absent.
    h.service.register(activities[2].id, &ids[0]).await.unwrap();

    let certificate = h.service.certificate(opening.id).await.unwrap();
    assert_eq!(certificate.hours, 5);

    let verified = h
        .service
        .verify_hash(certificate.hash.as_str())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(verified.hours, certificate.hours);
    assert_eq!(verified.event_name, event.name);
    assert_eq!(verified.date, "20/05/2026");
}

#[tokio::test]
async fn test_any_enrollment_of_the_pair_yields_the_same_certificate() {
    let h = Harness::new();
    let (_, activities) = h
        .standard_event(vec![
            new_activity("A", 1, Capacity::Unlimited),
            new_activity("B", 1, Capacity::Unlimited),
        ])
        .await;
    let ids = h.people(1).await;
    let a = attend(&h, activities[0].id, &ids[0]).await;
    let b = attend(&h, activities[1].id, &ids[0]).await;

    let from_b = h.service.certificate(b.id).await.unwrap();
    let from_a = h.service.certificate(a.id).await.unwrap();
    assert_eq!(from_a.hash, from_b.hash);
}

#[tokio::test]
async fn test_hash_outlives_withdraw_and_removal_of_its_enrollment() {
    let h = Harness::new();
    let (_, activities) = h
        .standard_event(vec![
            new_activity("A", 2, Capacity::Unlimited),
            new_activity("B", 3, Capacity::Unlimited),
        ])
        .await;
    let ids = h.people(1).await;
    let a = attend(&h, activities[0].id, &ids[0]).await;
    let b = attend(&h, activities[1].id, &ids[0]).await;
    let issued = h.service.certificate(a.id).await.unwrap();

    assert!(!h.service.withdraw(activities[0].id, &ids[0]).await.unwrap());
    let verified = h.service.verify_hash(issued.hash.as_str()).await.unwrap().unwrap();
    assert_eq!(verified.hours, 5);

    h.service.remove_enrollment(a.id).await.unwrap();
    let verified = h.service.verify_hash(issued.hash.as_str()).await.unwrap().unwrap();
    assert_eq!(verified.hours, 3);

    let reissued = h.service.certificate(b.id).await.unwrap();
    assert_eq!(reissued.hash, issued.hash);
    assert_eq!(reissued.hours, 3);
}

#[tokio::test]
async fn test_distinct_participants_get_distinct_hashes() {
    let h = Harness::new();
    let (_, activity) = h.single_activity(1, Capacity::Unlimited).await;
    let ids = h.people(3).await;

    let mut hashes = Vec::new();
    for id in &ids {
        let enrollment = attend(&h, activity.id, id).await;
        hashes.push(h.service.certificate(enrollment.id).await.unwrap().hash);
    }
    hashes.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    hashes.dedup();
    assert_eq!(hashes.len(), 3);
    assert_eq!(h.documents.len(), 3);
}

#[tokio::test]
async fn test_certificate_requires_attendance() {
    let h = Harness::new();
    let (_, activity) = h.single_activity(2, Capacity::Unlimited).await;
    let ids = h.people(1).await;
    let registration = h.service.register(activity.id, &ids[0]).await.unwrap();

    let err = h
        .service
        .certificate(registration.enrollment.id)
        .await
        .unwrap_err();
    assert!(matches!(err, RollcallError::RenderPrecondition(_)), "{:?}", err);
    assert!(h.documents.is_empty());

    let err = h.service.certificate(EnrollmentId(404)).await.unwrap_err();
    assert!(matches!(err, RollcallError::NotFound(_)));
}

#[tokio::test]
async fn test_verify_unknown_or_malformed_hash() {
    let h = Harness::new();
    assert_eq!(h.service.verify_hash("00000000000000FF").await.unwrap(), None);
    assert_eq!(h.service.verify_hash("not a hash").await.unwrap(), None);
    assert_eq!(h.service.verify_hash("").await.unwrap(), None);

    let err = h
        .service
        .certificate_by_hash("00000000000000FF")
        .await
        .unwrap_err();
    assert!(matches!(err, RollcallError::NotFound(_)));
}

#[tokio::test]
async fn test_verify_accepts_lower_case_and_whitespace() {
    let h = Harness::new();
    let (_, activity) = h.single_activity(2, Capacity::Unlimited).await;
    let ids = h.people(1).await;
    let enrollment = attend(&h, activity.id, &ids[0]).await;
    let certificate = h.service.certificate(enrollment.id).await.unwrap();

    let typed = format!("  {}  ", certificate.hash.as_str().to_ascii_lowercase());
    let verified = h.service.verify_hash(&typed).await.unwrap().unwrap();
    assert_eq!(verified.participant_name, "Participant 1");

    let again = h.service.certificate_by_hash(&typed).await.unwrap();
    assert_eq!(again.hash, certificate.hash);
}

#[tokio::test]
async fn test_hash_appears_on_roster_and_enrollment() {
    let h = Harness::new();
    let (event, activity) = h.single_activity(2, Capacity::Unlimited).await;
    let ids = h.people(2).await;
    let first = attend(&h, activity.id, &ids[0]).await;
    attend(&h, activity.id, &ids[1]).await;

    let certificate = h.service.certificate(first.id).await.unwrap();
    let roster = h.service.delivery_roster(event.id).await.unwrap();
    assert_eq!(roster.len(), 2);

    let mine = roster.iter().find(|r| r.participant_id == ids[0]).unwrap();
    assert_eq!(mine.verification_hash.as_ref(), Some(&certificate.hash));
    assert_eq!(mine.enrollment_id, first.id);
    assert_eq!(mine.hours, 2);

    let theirs = roster.iter().find(|r| r.participant_id == ids[1]).unwrap();
    assert_eq!(theirs.verification_hash, None);
}

#[tokio::test]
async fn test_rendered_names_are_escaped() {
    let h = Harness::new();
    let (_, activity) = h.single_activity(2, Capacity::Unlimited).await;
    let who = h
        .add(&participant("12345678901", "<script>alert(1)</script>"))
        .await;
    let enrollment = attend(&h, activity.id, &who).await;

    let certificate = h.service.certificate(enrollment.id).await.unwrap();
    assert!(!certificate.svg.contains("<script>"));
    assert!(certificate.svg.contains("&lt;script&gt;"));
}
