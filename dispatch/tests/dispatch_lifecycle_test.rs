//! Integration tests for the case lifecycle
//!
//! Drives real cases through the coordinator's public API, from intake
//! through triage, dispatch, rejections, timeouts, escalation, and
//! dispatcher override, validating the state machine and the audit
//! trail the event journal keeps alongside it.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use dispatch::{
    Case, CaseStatus, DispatchConfig, DispatchCoordinator, DispatchError, EscalationReason,
    EventBus, EventHistory, EventStats, MemoryStore, NotificationOutcome, OverrideRequest,
    RankedHospital, RecordingNotifier, ResponseDisposition, SharedDispatchCoordinator,
    VitalSigns,
};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

fn test_config() -> DispatchConfig {
    DispatchConfig {
        max_save_retries: 3,
        ..Default::default()
    }
}

fn build_coordinator() -> (SharedDispatchCoordinator, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let bus = EventBus::with_journal(store.clone()).shared();
    let coordinator = DispatchCoordinator::new(
        store.clone(),
        bus,
        Arc::new(RecordingNotifier::new()),
        test_config(),
    )
    .shared();
    (coordinator, store)
}

/// SpO₂ of 80 classifies at the top tier (acuity 1).
fn hypoxic_vitals() -> VitalSigns {
    VitalSigns::default().with_spo2(80.0)
}

/// All readings in normal range classify at the default tier (acuity 4).
fn stable_vitals() -> VitalSigns {
    VitalSigns::default()
        .with_heart_rate(78.0)
        .with_spo2(98.0)
        .with_respiratory_rate(16.0)
}

fn hospitals() -> Vec<RankedHospital> {
    vec![
        RankedHospital::new("hosp-a", "Mercy General", 90.0).with_eta(8.0),
        RankedHospital::new("hosp-b", "St. Luke's", 80.0).with_eta(6.0),
        RankedHospital::new("hosp-c", "County Trauma Center", 70.0).with_eta(12.0),
    ]
}

async fn triaged_case(
    coordinator: &SharedDispatchCoordinator,
    vitals: &VitalSigns,
    now: DateTime<Utc>,
) -> Case {
    let case = coordinator.create_case(now).await.unwrap();
    coordinator.triage_case(&case.id, vitals, now).await.unwrap();
    coordinator.get_case(&case.id).await.unwrap()
}

/// Test: one rejection escalates an acuity-1 case (limit is 1)
#[tokio::test]
async fn test_single_rejection_escalates_highest_acuity() {
    let (coordinator, _) = build_coordinator();
    let now = t0();

    let case = triaged_case(&coordinator, &hypoxic_vitals(), now).await;
    assert_eq!(case.acuity_level, Some(1));
    assert_eq!(case.status, CaseStatus::Triaged);

    coordinator
        .dispatch_case(&case.id, &hospitals()[0], now)
        .await
        .unwrap();

    let disposition = coordinator
        .record_hospital_response(&case.id, "hosp-a", false, now + Duration::seconds(10))
        .await
        .unwrap();
    assert_eq!(
        disposition,
        ResponseDisposition::Escalated(EscalationReason::Rejections)
    );

    let case = coordinator.get_case(&case.id).await.unwrap();
    assert_eq!(case.status, CaseStatus::EscalationRequired);
    assert_eq!(case.escalation_reason, Some(EscalationReason::Rejections));
    assert_eq!(case.rejection_count, 1);
}

/// Test: an acuity-4 case survives a rejection, then escalates when the
/// second hospital lets its 120-second window lapse
#[tokio::test]
async fn test_low_acuity_rejection_then_timeout() {
    let (coordinator, _) = build_coordinator();
    let now = t0();

    let case = triaged_case(&coordinator, &stable_vitals(), now).await;
    assert_eq!(case.acuity_level, Some(4));

    // First hospital declines ten seconds in. Limit for acuity 4 is
    // three rejections, so the case just frees up for the next try.
    coordinator
        .dispatch_case(&case.id, &hospitals()[0], now)
        .await
        .unwrap();
    let disposition = coordinator
        .record_hospital_response(&case.id, "hosp-a", false, now + Duration::seconds(10))
        .await
        .unwrap();
    assert_eq!(disposition, ResponseDisposition::ReadyForRedispatch);
    assert_eq!(
        coordinator.get_case(&case.id).await.unwrap().status,
        CaseStatus::Dispatched
    );

    // Second hospital never answers.
    let second_sent = now + Duration::seconds(20);
    coordinator
        .dispatch_case(&case.id, &hospitals()[1], second_sent)
        .await
        .unwrap();

    // One second before the deadline the sweep leaves it alone.
    let report = coordinator
        .sweep_expired(second_sent + Duration::seconds(119))
        .await
        .unwrap();
    assert!(report.expired.is_empty());

    // One second past the deadline it expires and escalates.
    let report = coordinator
        .sweep_expired(second_sent + Duration::seconds(121))
        .await
        .unwrap();
    assert_eq!(report.expired, vec![case.id.clone()]);

    let case = coordinator.get_case(&case.id).await.unwrap();
    assert_eq!(case.status, CaseStatus::EscalationRequired);
    assert_eq!(case.escalation_reason, Some(EscalationReason::Timeout));
    // A timeout is not a rejection.
    assert_eq!(case.rejection_count, 1);
    assert_eq!(
        case.notifications[1].outcome,
        NotificationOutcome::TimedOut
    );
}

/// Test: expiry is refused while the window is open and accepted at the
/// exact deadline
#[tokio::test]
async fn test_expiry_boundary_is_exact() {
    let (coordinator, _) = build_coordinator();
    let now = t0();

    // Acuity 1 runs a 30-second window.
    let case = triaged_case(&coordinator, &hypoxic_vitals(), now).await;
    coordinator
        .dispatch_case(&case.id, &hospitals()[0], now)
        .await
        .unwrap();

    let err = coordinator
        .expire_case(&case.id, now + Duration::seconds(29))
        .await
        .unwrap_err();
    match err {
        DispatchError::DeadlineNotReached {
            remaining_seconds, ..
        } => assert_eq!(remaining_seconds, 1),
        other => panic!("expected DeadlineNotReached, got: {other}"),
    }

    let outcome = coordinator
        .expire_case(&case.id, now + Duration::seconds(30))
        .await
        .unwrap();
    assert_eq!(outcome.waited_seconds, 30);
    assert_eq!(outcome.reason, EscalationReason::Timeout);
}

/// Test: a rejection that lands after the deadline reports both breaches
#[tokio::test]
async fn test_late_rejection_reports_both_breaches() {
    let (coordinator, _) = build_coordinator();
    let now = t0();

    let case = triaged_case(&coordinator, &hypoxic_vitals(), now).await;
    coordinator
        .dispatch_case(&case.id, &hospitals()[0], now)
        .await
        .unwrap();

    // The answer arrives 45 seconds into a 30-second window, so the
    // rejection limit and the time limit are breached together.
    let disposition = coordinator
        .record_hospital_response(&case.id, "hosp-a", false, now + Duration::seconds(45))
        .await
        .unwrap();
    assert_eq!(
        disposition,
        ResponseDisposition::Escalated(EscalationReason::Both)
    );

    let case = coordinator.get_case(&case.id).await.unwrap();
    assert_eq!(case.escalation_reason, Some(EscalationReason::Both));
}

/// Test: an accepted case is settled; neither expiry nor a second
/// response can touch its window, and the refusal names both states
#[tokio::test]
async fn test_acceptance_settles_the_response_window() {
    let (coordinator, _) = build_coordinator();
    let now = t0();

    let case = triaged_case(&coordinator, &stable_vitals(), now).await;
    coordinator
        .dispatch_case(&case.id, &hospitals()[0], now)
        .await
        .unwrap();
    coordinator
        .record_hospital_response(&case.id, "hosp-a", true, now + Duration::seconds(15))
        .await
        .unwrap();

    let case = coordinator.get_case(&case.id).await.unwrap();
    assert_eq!(case.status, CaseStatus::Accepted);
    assert_eq!(case.assigned_hospital_id.as_deref(), Some("hosp-a"));

    let err = coordinator
        .expire_case(&case.id, now + Duration::seconds(500))
        .await
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("Accepted"), "got: {message}");
    assert!(message.contains("AwaitingResponse"), "got: {message}");

    let err = coordinator
        .record_hospital_response(&case.id, "hosp-a", false, now + Duration::seconds(20))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::InvalidTransition { .. }));
}

/// Test: a response from a hospital that was never notified is refused
#[tokio::test]
async fn test_response_from_wrong_hospital_is_refused() {
    let (coordinator, _) = build_coordinator();
    let now = t0();

    let case = triaged_case(&coordinator, &stable_vitals(), now).await;
    coordinator
        .dispatch_case(&case.id, &hospitals()[0], now)
        .await
        .unwrap();

    let err = coordinator
        .record_hospital_response(&case.id, "hosp-b", true, now + Duration::seconds(5))
        .await
        .unwrap_err();
    match err {
        DispatchError::HospitalMismatch { expected, got, .. } => {
            assert_eq!(expected, "hosp-a");
            assert_eq!(got, "hosp-b");
        }
        other => panic!("expected HospitalMismatch, got: {other}"),
    }

    // The real hospital can still answer.
    coordinator
        .record_hospital_response(&case.id, "hosp-a", true, now + Duration::seconds(10))
        .await
        .unwrap();
}

/// Test: an escalated case runs through override, enroute, and
/// completion; the override is recorded once and only once
#[tokio::test]
async fn test_override_carries_case_to_completion() {
    let (coordinator, store) = build_coordinator();
    let now = t0();

    let case = triaged_case(&coordinator, &hypoxic_vitals(), now).await;
    coordinator
        .dispatch_case(&case.id, &hospitals()[0], now)
        .await
        .unwrap();
    coordinator
        .record_hospital_response(&case.id, "hosp-a", false, now + Duration::seconds(10))
        .await
        .unwrap();

    let request = OverrideRequest {
        hospital_id: "hosp-c".to_string(),
        hospital_name: "County Trauma Center".to_string(),
        score: 70.0,
        reason: "only open trauma bay in range".to_string(),
        actor: "dispatcher-7".to_string(),
    };
    let record = coordinator
        .confirm_override(&case.id, &request, now + Duration::seconds(40))
        .await
        .unwrap();
    assert_eq!(record.new_hospital_id, "hosp-c");

    let case_after = coordinator.get_case(&case.id).await.unwrap();
    assert_eq!(case_after.status, CaseStatus::DispatcherOverride);
    assert_eq!(case_after.assigned_hospital_id.as_deref(), Some("hosp-c"));

    use dispatch::CaseStore;
    let stored = store.get_override(&case.id).await.unwrap().unwrap();
    assert_eq!(stored.actor, "dispatcher-7");

    // Overrides are single-use.
    let err = coordinator
        .confirm_override(&case.id, &request, now + Duration::seconds(50))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::InvalidTransition { .. }));

    coordinator
        .mark_enroute(&case.id, now + Duration::seconds(60))
        .await
        .unwrap();
    let done = coordinator
        .complete_case(&case.id, now + Duration::seconds(900))
        .await
        .unwrap();
    assert_eq!(done.status, CaseStatus::Completed);

    // Terminal means terminal.
    let err = coordinator
        .dispatch_case(&done.id, &hospitals()[1], now + Duration::seconds(910))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::InvalidTransition { .. }));
}

/// Test: the journal keeps the whole story and the stats add up
#[tokio::test]
async fn test_event_journal_records_full_history() {
    let (coordinator, store) = build_coordinator();
    let now = t0();

    let case = triaged_case(&coordinator, &stable_vitals(), now).await;
    coordinator
        .dispatch_case(&case.id, &hospitals()[0], now)
        .await
        .unwrap();
    coordinator
        .record_hospital_response(&case.id, "hosp-a", false, now + Duration::seconds(10))
        .await
        .unwrap();
    coordinator
        .dispatch_case(&case.id, &hospitals()[1], now + Duration::seconds(20))
        .await
        .unwrap();
    coordinator
        .record_hospital_response(&case.id, "hosp-b", true, now + Duration::seconds(40))
        .await
        .unwrap();
    coordinator
        .mark_enroute(&case.id, now + Duration::seconds(60))
        .await
        .unwrap();
    coordinator
        .complete_case(&case.id, now + Duration::seconds(600))
        .await
        .unwrap();

    let history = EventHistory::new(store);
    let events = history.get_case_events(&case.id).await.unwrap();
    let types: Vec<&str> = events.iter().map(|e| e.event_type()).collect();
    assert_eq!(
        types,
        vec![
            "case_created",
            "triage_completed",
            "hospital_notified",
            "response_recorded",
            "hospital_notified",
            "response_recorded",
            "case_closed",
        ]
    );

    let stats = EventStats::from_events(&events);
    assert_eq!(stats.total_events, 7);
    assert_eq!(stats.unique_cases, 1);
    assert_eq!(stats.dispatches, 2);
    assert_eq!(stats.rejections, 1);
    assert_eq!(stats.acceptances, 1);
    assert_eq!(stats.timeouts, 0);
    assert_eq!(stats.escalations, 0);
}

/// Test: re-ranking after a rejection penalizes the rejecting hospital
/// and keeps its original score for audit
#[tokio::test]
async fn test_rerank_after_rejection_demotes_rejector() {
    let (coordinator, _) = build_coordinator();
    let now = t0();

    let case = triaged_case(&coordinator, &stable_vitals(), now).await;
    coordinator
        .dispatch_case(&case.id, &hospitals()[0], now)
        .await
        .unwrap();
    coordinator
        .record_hospital_response(&case.id, "hosp-a", false, now + Duration::seconds(10))
        .await
        .unwrap();

    let candidates = vec![
        RankedHospital::new("hosp-a", "Mercy General", 90.0),
        RankedHospital::new("hosp-b", "St. Luke's", 80.0).disqualified(),
        RankedHospital::new("hosp-c", "County Trauma Center", 70.0),
    ];
    let ranked = coordinator.rank_candidates(&case.id, &candidates).await.unwrap();

    let ids: Vec<&str> = ranked.iter().map(|h| h.hospital_id.as_str()).collect();
    assert_eq!(ids, vec!["hosp-c", "hosp-a", "hosp-b"]);
    assert!((ranked[1].score - 76.5).abs() < f64::EPSILON);
    assert_eq!(ranked[1].original_score, Some(90.0));
    assert!(ranked[2].disqualified);
}

/// Test: acuity-2 case tolerates exactly one rejection before the
/// second one escalates
#[tokio::test]
async fn test_acuity_two_escalates_on_second_rejection() {
    let (coordinator, _) = build_coordinator();
    let now = t0();

    // Heart rate above 130 lands in tier 2.
    let vitals = VitalSigns::default().with_heart_rate(140.0);
    let case = triaged_case(&coordinator, &vitals, now).await;
    assert_eq!(case.acuity_level, Some(2));

    coordinator
        .dispatch_case(&case.id, &hospitals()[0], now)
        .await
        .unwrap();
    let first = coordinator
        .record_hospital_response(&case.id, "hosp-a", false, now + Duration::seconds(10))
        .await
        .unwrap();
    assert_eq!(first, ResponseDisposition::ReadyForRedispatch);

    coordinator
        .dispatch_case(&case.id, &hospitals()[1], now + Duration::seconds(20))
        .await
        .unwrap();
    let second = coordinator
        .record_hospital_response(&case.id, "hosp-b", false, now + Duration::seconds(30))
        .await
        .unwrap();
    assert_eq!(
        second,
        ResponseDisposition::Escalated(EscalationReason::Rejections)
    );
}

/// Test: the version counter climbs with every persisted step
#[tokio::test]
async fn test_versions_climb_through_the_lifecycle() {
    let (coordinator, _) = build_coordinator();
    let now = t0();

    let case = coordinator.create_case(now).await.unwrap();
    assert_eq!(case.version, 1);

    coordinator
        .triage_case(&case.id, &stable_vitals(), now)
        .await
        .unwrap();
    assert_eq!(coordinator.get_case(&case.id).await.unwrap().version, 2);

    coordinator
        .dispatch_case(&case.id, &hospitals()[0], now)
        .await
        .unwrap();
    assert_eq!(coordinator.get_case(&case.id).await.unwrap().version, 3);

    coordinator
        .record_hospital_response(&case.id, "hosp-a", true, now + Duration::seconds(5))
        .await
        .unwrap();
    assert_eq!(coordinator.get_case(&case.id).await.unwrap().version, 4);
}
