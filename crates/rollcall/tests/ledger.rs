//! Enrollment ledger: registration, capacity and event setup.

mod common;

use std::sync::Arc;

use rollcall::core::{ActivityId, Capacity, EnrollmentId, EventId, EventKind};
use rollcall::delivery::Broker;
use rollcall::RollcallError;
use rollcall_testkit::fixtures::{new_activity, new_event, participant, participant_without_email};

use common::Harness;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_registrations_respect_capacity() {
    let h = Harness::new();
    let (event, activity) = h.single_activity(2, Capacity::Limited(5)).await;
    let ids = h.people(40).await;
    let activity_id = activity.id;
    let service = Arc::new(h.service);

    let mut handles = Vec::new();
    for id in ids {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service.register(activity_id, &id).await
        }));
    }

    let mut admitted = 0;
    let mut refused = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(registration) => {
                assert!(registration.created);
                admitted += 1;
            }
            Err(RollcallError::CapacityExceeded(full)) => {
                assert_eq!(full, activity_id);
                refused += 1;
            }
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(admitted, 5);
    assert_eq!(refused, 35);

    let report = service.event_report(event.id).await.unwrap();
    assert_eq!(report.activities[0].lines.len(), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_last_seat_goes_to_exactly_one() {
    for _ in 0..20 {
        let h = Harness::new();
        let (_, activity) = h.single_activity(1, Capacity::Limited(1)).await;
        let ids = h.people(2).await;
        let activity_id = activity.id;
        let service = Arc::new(h.service);

        let a = {
            let service = service.clone();
            let id = ids[0].clone();
            tokio::spawn(async move { service.register(activity_id, &id).await })
        };
        let b = {
            let service = service.clone();
            let id = ids[1].clone();
            tokio::spawn(async move { service.register(activity_id, &id).await })
        };

        let outcomes = [a.await.unwrap(), b.await.unwrap()];
        let ok = outcomes.iter().filter(|o| o.is_ok()).count();
        let full = outcomes
            .iter()
            .filter(|o| matches!(o, Err(RollcallError::CapacityExceeded(_))))
            .count();
        assert_eq!((ok, full), (1, 1));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_fast_check_ins_enroll_once_each() {
    let h = Harness::new();
    let (event, activity) = h.fast_event().await;
    let ids = h.people(10).await;
    let (event_id, activity_id) = (event.id, activity.id);
    let service = Arc::new(h.service);

    let mut handles = Vec::new();
    for id in ids.iter().chain(ids.iter()).cloned() {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service
                .confirm_attendance(activity_id, &id, event_id, None)
                .await
        }));
    }
    let mut created = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap().auto_enrolled {
            created += 1;
        }
    }

    assert_eq!(created, 10);
    let report = service.event_report(event_id).await.unwrap();
    assert_eq!(report.activities[0].lines.len(), 10);
    assert_eq!(report.activities[0].attended(), 10);
}

#[tokio::test]
async fn test_register_is_idempotent() {
    let h = Harness::new();
    let (_, activity) = h.single_activity(2, Capacity::Limited(1)).await;
    let ids = h.people(1).await;

    let first = h.service.register(activity.id, &ids[0]).await.unwrap();
    let second = h.service.register(activity.id, &ids[0]).await.unwrap();

    assert!(first.created);
    assert!(!second.created);
    assert_eq!(first.enrollment.id, second.enrollment.id);
}

#[tokio::test]
async fn test_withdraw_frees_a_seat() {
    let h = Harness::new();
    let (_, activity) = h.single_activity(2, Capacity::Limited(1)).await;
    let ids = h.people(2).await;

    h.service.register(activity.id, &ids[0]).await.unwrap();
    let err = h.service.register(activity.id, &ids[1]).await.unwrap_err();
    assert!(matches!(err, RollcallError::CapacityExceeded(_)));

    assert!(h.service.withdraw(activity.id, &ids[0]).await.unwrap());
    assert!(!h.service.withdraw(activity.id, &ids[0]).await.unwrap());
    assert!(h.service.register(activity.id, &ids[1]).await.unwrap().created);
}

#[tokio::test]
async fn test_register_unknown_activity_or_participant() {
    let h = Harness::new();
    let (_, activity) = h.single_activity(2, Capacity::Unlimited).await;
    let ids = h.people(1).await;

    let err = h.service.register(ActivityId(404), &ids[0]).await.unwrap_err();
    assert!(matches!(err, RollcallError::NotFound(_)));

    let stranger = participant("00000000000", "Sem Cadastro").id;
    let err = h.service.register(activity.id, &stranger).await.unwrap_err();
    assert!(matches!(err, RollcallError::NotFound(_)));
}

#[tokio::test]
async fn test_fast_event_has_single_check_in_activity() {
    let h = Harness::new();
    let (event, activities) = h
        .service
        .create_event(
            new_event("Aula Magna", EventKind::Fast),
            vec![new_activity("Ignored", 8, Capacity::Limited(3))],
        )
        .await
        .unwrap();

    assert_eq!(event.kind, EventKind::Fast);
    assert_eq!(activities.len(), 1);
    assert!(activities[0].fast_checkin);
    assert_eq!(activities[0].hours, 0);
    assert_eq!(
        h.service.list_activities(event.id).await.unwrap(),
        activities
    );
}

#[tokio::test]
async fn test_create_event_generates_share_token() {
    let h = Harness::new();
    let (a, _) = h.standard_event(vec![]).await;
    let (b, _) = h.standard_event(vec![]).await;

    assert!(!a.share_token.is_empty());
    assert_ne!(a.share_token, b.share_token);

    let mut chosen = new_event("Com Token", EventKind::Standard);
    chosen.share_token = "abc123".to_string();
    let (c, _) = h.service.create_event(chosen, vec![]).await.unwrap();
    assert_eq!(c.share_token, "abc123");
    assert_eq!(h.service.get_event(c.id).await.unwrap(), c);
}

#[tokio::test]
async fn test_add_activity() {
    let h = Harness::new();
    let (event, _) = h.standard_event(vec![]).await;

    let added = h
        .service
        .add_activity(event.id, &new_activity("Mesa Redonda", 3, Capacity::Unlimited))
        .await
        .unwrap();
    assert_eq!(added.event_id, event.id);
    assert_eq!(h.service.list_activities(event.id).await.unwrap(), vec![added]);

    let err = h
        .service
        .add_activity(EventId(404), &new_activity("x", 1, Capacity::Unlimited))
        .await
        .unwrap_err();
    assert!(matches!(err, RollcallError::NotFound(_)));

    let err = h.service.list_activities(EventId(404)).await.unwrap_err();
    assert!(matches!(err, RollcallError::NotFound(_)));
}

#[tokio::test]
async fn test_update_certificate_config_unknown_event() {
    let h = Harness::new();
    let err = h
        .service
        .update_certificate_config(EventId(404), None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, RollcallError::NotFound(_)));
}

#[tokio::test]
async fn test_remove_enrollment() {
    let h = Harness::new();
    let (event, activity) = h.single_activity(2, Capacity::Unlimited).await;
    let ids = h.people(1).await;
    let registration = h.service.register(activity.id, &ids[0]).await.unwrap();

    h.service
        .remove_enrollment(registration.enrollment.id)
        .await
        .unwrap();
    let err = h
        .service
        .remove_enrollment(registration.enrollment.id)
        .await
        .unwrap_err();
    assert!(matches!(err, RollcallError::NotFound(_)));

    let report = h.service.event_report(event.id).await.unwrap();
    assert!(report.activities[0].lines.is_empty());
}

#[tokio::test]
async fn test_alternate_address_blank_clears() {
    let h = Harness::new();
    let (event, activity) = h.single_activity(2, Capacity::Unlimited).await;
    let ids = h.people(1).await;
    let enrollment = h
        .service
        .register(activity.id, &ids[0])
        .await
        .unwrap()
        .enrollment
        .id;
    h.service
        .toggle_attendance_manual(enrollment, true)
        .await
        .unwrap();

    h.service
        .set_alternate_address(enrollment, Some("  outro@example.net "))
        .await
        .unwrap();
    let roster = h.service.delivery_roster(event.id).await.unwrap();
    assert_eq!(roster[0].address.as_deref(), Some("outro@example.net"));

    h.service
        .set_alternate_address(enrollment, Some("   "))
        .await
        .unwrap();
    let roster = h.service.delivery_roster(event.id).await.unwrap();
    assert_eq!(
        roster[0].address.as_deref(),
        Some("00000000001@example.org")
    );

    let err = h
        .service
        .set_alternate_address(EnrollmentId(404), Some("x@y"))
        .await
        .unwrap_err();
    assert!(matches!(err, RollcallError::NotFound(_)));
}

#[tokio::test]
async fn test_notifications_follow_setting() {
    let quiet = Harness::new();
    let (_, activity) = quiet.single_activity(2, Capacity::Unlimited).await;
    let ids = quiet.people(1).await;
    quiet.service.register(activity.id, &ids[0]).await.unwrap();
    assert_eq!(quiet.broker.ready_len().await.unwrap(), 0);

    let h = Harness::with_notifications();
    let (_, activity) = h.single_activity(2, Capacity::Unlimited).await;
    let ids = h.people(1).await;
    let mute = h
        .add(&participant_without_email("55555555555", "Sem Email"))
        .await;

    h.service.register(activity.id, &ids[0]).await.unwrap();
    h.service.register(activity.id, &mute).await.unwrap();
    // Registering again sends nothing new.
    h.service.register(activity.id, &ids[0]).await.unwrap();
    assert_eq!(h.broker.ready_len().await.unwrap(), 1);

    let code = h.service.presenter_code(activity.id).await.unwrap().to_string();
    h.service.check_in(&ids[0], &code, None).await.unwrap();
    h.service.check_in(&ids[0], &code, None).await.unwrap();
    assert_eq!(h.broker.ready_len().await.unwrap(), 2);

    let first = h.broker.try_receive().await.unwrap().unwrap();
    let task = rollcall::delivery::DeliveryTask::from_json(&first.payload).unwrap();
    assert_eq!(task.to, "00000000001@example.org");
    assert!(task.attachment.is_none());
}
