//! Clinician review of pending requests and direct limit adjustment.

use aidguard::app::commands::{LimitAdjustment, ReviewAction, Requester};
use aidguard::app::ports::ProfileStore;
use aidguard::error::{DoseError, ReviewError};
use aidguard::journal::{Actor, DoseKind, DoseStatus, RecordRef};

use crate::mocks::{PATIENT, harness, limits};

#[test]
fn approved_basal_becomes_active_and_raises_ceiling() {
    let h = harness(limits(1.2, 1.0, 5.0));
    let d = h.engine.request_basal_change(PATIENT, &Requester::Patient, 1.3).unwrap();
    assert!(!d.is_auto_approved());
    assert_eq!(h.engine.profiles().dose_limits(PATIENT).unwrap().active_basal_rate, 1.0);

    let res = h.engine.resolve(PATIENT, d.record_ref(), ReviewAction::Approve, "dr_lee").unwrap();
    assert_eq!(res.record.status, DoseStatus::Approved);
    assert_eq!(res.record.kind, DoseKind::BasalChange);
    assert_eq!(res.record.resolves, Some(d.record_ref()));
    assert_eq!(res.record.actor, Actor::Clinician("dr_lee".into()));
    assert_eq!(res.record.previous_rate, Some(1.0));

    let l = h.engine.profiles().dose_limits(PATIENT).unwrap();
    assert_eq!(l.active_basal_rate, 1.3);
    assert_eq!(l.self_service_basal_max, 1.3);
    assert!(h.engine.pending_requests(PATIENT).unwrap().is_empty());
}

#[test]
fn approval_never_lowers_ceiling() {
    let h = harness(limits(1.2, 1.0, 5.0));
    let d = h.engine.request_basal_change(PATIENT, &Requester::Patient, 1.3).unwrap();
    h.engine
        .adjust_limits(
            PATIENT,
            "dr_lee",
            LimitAdjustment {
                self_service_basal_max: Some(2.0),
                ..LimitAdjustment::default()
            },
        )
        .unwrap();

    h.engine.resolve(PATIENT, d.record_ref(), ReviewAction::Approve, "dr_lee").unwrap();
    let l = h.engine.profiles().dose_limits(PATIENT).unwrap();
    assert_eq!(l.active_basal_rate, 1.3);
    assert_eq!(l.self_service_basal_max, 2.0);
}

#[test]
fn denial_appends_record_only() {
    let h = harness(limits(1.2, 1.0, 5.0));
    let d = h.engine.request_basal_change(PATIENT, &Requester::Patient, 1.4).unwrap();
    let res = h.engine.resolve(PATIENT, d.record_ref(), ReviewAction::Deny, "dr_lee").unwrap();
    assert_eq!(res.record.status, DoseStatus::Denied);
    assert_eq!(h.engine.profiles().dose_limits(PATIENT).unwrap(), limits(1.2, 1.0, 5.0));
    assert!(h.engine.pending_requests(PATIENT).unwrap().is_empty());
    assert_eq!(h.engine.dose_history(PATIENT).unwrap().len(), 2);
}

#[test]
fn approved_bolus_counts_toward_window() {
    let h = harness(limits(1.2, 1.0, 5.0));
    h.engine.request_bolus(PATIENT, &Requester::Patient, 3.0).unwrap();
    let pending = h.engine.request_bolus(PATIENT, &Requester::Patient, 3.0).unwrap();
    assert_eq!(h.engine.bolus_allowance(PATIENT).unwrap().approved_in_window, 3.0);

    h.engine.resolve(PATIENT, pending.record_ref(), ReviewAction::Approve, "dr").unwrap();
    let a = h.engine.bolus_allowance(PATIENT).unwrap();
    assert_eq!(a.approved_in_window, 6.0);
    assert_eq!(a.remaining, 0.0);
    assert!(!h.engine.request_bolus(PATIENT, &Requester::Patient, 0.5).unwrap().is_auto_approved());
}

#[test]
fn denied_bolus_does_not_count() {
    let h = harness(limits(1.2, 1.0, 5.0));
    h.engine.request_bolus(PATIENT, &Requester::Patient, 3.0).unwrap();
    let pending = h.engine.request_bolus(PATIENT, &Requester::Patient, 3.0).unwrap();
    h.engine.resolve(PATIENT, pending.record_ref(), ReviewAction::Deny, "dr").unwrap();
    assert_eq!(h.engine.bolus_allowance(PATIENT).unwrap().approved_in_window, 3.0);
}

#[test]
fn bolus_approval_refused_while_suspended_but_denial_allowed() {
    let h = harness(limits(1.2, 1.0, 2.0));
    let pending = h.engine.request_bolus(PATIENT, &Requester::Patient, 2.5).unwrap();
    h.suspension.update(PATIENT, 40.0);

    assert!(matches!(
        h.engine.resolve(PATIENT, pending.record_ref(), ReviewAction::Approve, "dr"),
        Err(DoseError::SuspensionActive { .. })
    ));
    assert_eq!(h.engine.pending_requests(PATIENT).unwrap().len(), 1);
    assert!(h.engine.resolve(PATIENT, pending.record_ref(), ReviewAction::Deny, "dr").is_ok());
}

#[test]
fn invalid_review_targets_are_rejected() {
    let h = harness(limits(1.2, 1.0, 5.0));
    let auto = h.engine.request_bolus(PATIENT, &Requester::Patient, 1.0).unwrap();
    let pending = h.engine.request_basal_change(PATIENT, &Requester::Patient, 1.3).unwrap();

    assert!(matches!(
        h.engine.resolve(PATIENT, RecordRef(99), ReviewAction::Approve, "dr"),
        Err(DoseError::Review(ReviewError::UnknownRecord(RecordRef(99))))
    ));
    assert!(matches!(
        h.engine.resolve(PATIENT, auto.record_ref(), ReviewAction::Approve, "dr"),
        Err(DoseError::Review(ReviewError::NotPending(_)))
    ));

    let res = h.engine.resolve(PATIENT, pending.record_ref(), ReviewAction::Deny, "dr").unwrap();
    assert!(matches!(
        h.engine.resolve(PATIENT, pending.record_ref(), ReviewAction::Approve, "dr"),
        Err(DoseError::Review(ReviewError::AlreadyResolved(_)))
    ));
    assert!(matches!(
        h.engine.resolve(PATIENT, res.seq, ReviewAction::Approve, "dr"),
        Err(DoseError::Review(ReviewError::NotPending(_)))
    ));
    assert_eq!(h.engine.dose_history(PATIENT).unwrap().len(), 3);
}

#[test]
fn pending_view_lists_oldest_first() {
    let h = harness(limits(1.2, 1.0, 1.0));
    h.engine.request_bolus(PATIENT, &Requester::Patient, 1.2).unwrap();
    h.engine.request_basal_change(PATIENT, &Requester::Patient, 1.4).unwrap();
    let pending = h.engine.pending_requests(PATIENT).unwrap();
    let kinds: Vec<DoseKind> = pending.iter().map(|e| e.record.kind).collect();
    assert_eq!(kinds, vec![DoseKind::Bolus, DoseKind::BasalChange]);
    assert!(pending[0].seq < pending[1].seq);
}

#[test]
fn limit_adjustment_is_audited_and_bounded() {
    let h = harness(limits(1.2, 1.0, 5.0));
    let l = h
        .engine
        .adjust_limits(
            PATIENT,
            "dr",
            LimitAdjustment {
                self_service_basal_max: Some(10.0),
                bolus_daily_cap: Some(0.1),
            },
        )
        .unwrap();
    assert_eq!(l.self_service_basal_max, 10.0);
    assert_eq!(l.self_service_bolus_daily_cap, 0.1);
    assert!(h.audit.tags().contains(&"limits"));

    let too_high = LimitAdjustment {
        self_service_basal_max: Some(10.5),
        ..LimitAdjustment::default()
    };
    assert!(h.engine.adjust_limits(PATIENT, "dr", too_high).is_err());
    assert!(h.engine.adjust_limits("ghost", "dr", LimitAdjustment::default()).is_err());
}
