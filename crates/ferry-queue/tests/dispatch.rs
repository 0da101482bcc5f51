//! Integration tests for dispatch, slot accounting and completion.
//!
//! No tokio runtime is running here, so the dispatcher task is never
//! spawned and every dispatch happens through `dispatch_tick()`. That keeps
//! each step deterministic.

mod common;

use std::sync::{Arc, Mutex};

use ferry_queue::{
    Event, EventName, FileErrorReason, GlobalStatus, QueueError, TransferManager,
    TransferOutcome, UnitId, UnitStatus, UploadErrorKind,
};
use tokio_test::{assert_err, assert_ok};

use common::events::EventLog;
use common::units::ManualFactory;
use common::{config, files};

fn setup_with(
    factory: ManualFactory,
    max: usize,
    n: usize,
) -> (TransferManager, Arc<ManualFactory>, EventLog, Vec<UnitId>) {
    let factory = Arc::new(factory);
    let manager = TransferManager::new(config(max), factory.clone());
    let log = EventLog::attach(manager.bus());
    let ids = manager.add_files(files(n));
    (manager, factory, log, ids)
}

fn setup(max: usize, n: usize) -> (TransferManager, Arc<ManualFactory>, EventLog, Vec<UnitId>) {
    setup_with(ManualFactory::default(), max, n)
}

fn status(manager: &TransferManager, id: UnitId) -> UnitStatus {
    manager.unit(id).expect("unit is registered").status
}

fn assert_slot_invariant(manager: &TransferManager) {
    let snapshot = manager.snapshot();
    assert!(snapshot.slots <= snapshot.max_connections);
    assert!(snapshot.active_count() <= snapshot.max_connections);
    assert!(snapshot.active_count() + snapshot.slots <= snapshot.max_connections);
}

#[test]
fn test_two_slots_three_units() {
    let (manager, factory, _log, ids) = setup(2, 3);
    let (a, b, c) = (ids[0], ids[1], ids[2]);

    manager.enqueue_all();
    assert_eq!(manager.dispatch_tick(), 2);

    let snapshot = manager.snapshot();
    assert_eq!(snapshot.slots, 0);
    assert_eq!(snapshot.queued, vec![c]);
    assert_eq!(status(&manager, a), UnitStatus::Active);
    assert_eq!(status(&manager, b), UnitStatus::Active);
    assert_eq!(status(&manager, c), UnitStatus::Queued);

    factory.done(a);
    assert_eq!(manager.snapshot().slots, 1);
    assert_eq!(status(&manager, c), UnitStatus::Queued);

    assert_eq!(manager.dispatch_tick(), 1);
    assert_eq!(status(&manager, c), UnitStatus::Active);
    assert_eq!(manager.snapshot().slots, 0);
    assert_eq!(factory.unit(c).starts(), 1);
}

#[test]
fn test_slot_invariant_holds_through_a_busy_run() {
    let (manager, factory, _log, ids) = setup(3, 8);
    assert_slot_invariant(&manager);

    manager.enqueue_all();
    for round in 0..ids.len() {
        manager.dispatch_tick();
        assert_slot_invariant(&manager);

        let active: Vec<UnitId> = manager
            .units()
            .into_iter()
            .filter(|u| u.status == UnitStatus::Active)
            .map(|u| u.id)
            .collect();
        if let Some(id) = active.first() {
            if round % 3 == 0 {
                factory.fail(*id, "flaky");
            } else {
                factory.done(*id);
            }
        }
        assert_slot_invariant(&manager);
    }

    while manager.status() != GlobalStatus::Done {
        manager.dispatch_tick();
        for unit in manager.units() {
            if unit.status == UnitStatus::Active {
                factory.done(unit.id);
            }
        }
        assert_slot_invariant(&manager);
    }
    assert_eq!(manager.snapshot().slots, 3);
}

#[test]
fn test_event_sequence_for_single_file() {
    let factory = Arc::new(ManualFactory::default());
    let manager = TransferManager::new(config(1), factory.clone());
    let log = EventLog::attach(manager.bus());

    let ids = manager.add_files(files(1));
    manager.start_upload();
    manager.dispatch_tick();
    factory.unit(ids[0]).finish(TransferOutcome::Done {
        message: Some("stored".into()),
    });

    assert_eq!(
        log.names(),
        vec![
            EventName::Select,
            EventName::BeforeUpload,
            EventName::Start,
            EventName::BeforeUploadFile,
            EventName::StartFile,
            EventName::FinishFile,
            EventName::Finish,
        ]
    );

    let finish_file = log.named(EventName::FinishFile);
    assert!(matches!(
        &finish_file[0],
        Event::FinishFile { unit, message: Some(m) } if unit.status == UnitStatus::Done && m == "stored"
    ));
}

#[test]
fn test_finish_subscribers_run_once_in_order() {
    let (manager, factory, log, ids) = setup(2, 2);
    let calls = Arc::new(Mutex::new(Vec::new()));

    for tag in [1, 2] {
        let calls = Arc::clone(&calls);
        assert_ok!(manager.on("finish", move |event: &Event| {
            if let Event::Finish { file_names, .. } = event {
                calls.lock().unwrap().push((tag, file_names.clone()));
            }
        }));
    }

    manager.enqueue_all();
    manager.dispatch_tick();
    factory.done(ids[0]);
    assert!(calls.lock().unwrap().is_empty());
    factory.fail(ids[1], "connection reset");

    let expected: Vec<String> = vec!["file0.bin".into(), "file1.bin".into()];
    assert_eq!(
        *calls.lock().unwrap(),
        vec![(1, expected.clone()), (2, expected)]
    );
    assert_eq!(log.count(EventName::Finish), 1);
    assert_eq!(manager.status(), GlobalStatus::Done);
    assert!(!manager.is_uploading());

    // Nothing left to do: no second finish.
    manager.dispatch_tick();
    manager.stop_all();
    assert_eq!(log.count(EventName::Finish), 1);
}

#[test]
fn test_finish_names_match_registry_size() {
    let (manager, factory, log, ids) = setup(4, 4);
    manager.enqueue_all();
    manager.dispatch_tick();
    for id in &ids {
        factory.done(*id);
    }

    let finish = log.named(EventName::Finish);
    let Event::Finish {
        file_names,
        registry,
    } = &finish[0]
    else {
        panic!("expected finish");
    };
    assert_eq!(file_names.len(), manager.units().len());
    assert_eq!(registry.len(), 4);
    assert!(registry.iter().all(|u| u.status == UnitStatus::Done));
}

#[test]
fn test_enqueue_all_with_nothing_pending() {
    let factory = Arc::new(ManualFactory::default());
    let manager = TransferManager::new(config(1), factory);
    let log = EventLog::attach(manager.bus());

    manager.enqueue_all();
    assert_eq!(log.all(), vec![Event::error(UploadErrorKind::NoFiles)]);
    assert!(manager.is_idle());
}

#[test]
fn test_enqueue_all_after_run_keeps_done_status() {
    let (manager, factory, log, ids) = setup(1, 1);
    manager.enqueue_all();
    manager.dispatch_tick();
    factory.done(ids[0]);
    assert_eq!(manager.status(), GlobalStatus::Done);

    log.clear();
    manager.enqueue_all();
    assert_eq!(log.names(), vec![EventName::Error]);
    assert_eq!(manager.status(), GlobalStatus::Done);
}

#[test]
fn test_before_upload_veto_aborts_run() {
    let (manager, _factory, log, ids) = setup(2, 2);
    assert_ok!(manager.on("beforeUpload", |_: &Event| false));
    log.clear();

    manager.enqueue_all();

    assert_eq!(log.named(EventName::Error), vec![Event::error(UploadErrorKind::Aborted)]);
    assert_eq!(log.count(EventName::Start), 0);
    assert!(manager.snapshot().queued.is_empty());
    assert!(ids.iter().all(|id| status(&manager, *id) == UnitStatus::Ready));
    assert_eq!(manager.dispatch_tick(), 0);
}

#[test]
fn test_before_upload_true_reply_does_not_veto() {
    let (manager, _factory, log, _ids) = setup(1, 1);
    assert_ok!(manager.on("beforeUpload", |_: &Event| true));

    manager.enqueue_all();
    assert_eq!(log.count(EventName::Start), 1);
    assert_eq!(manager.snapshot().queued.len(), 1);
}

#[test]
fn test_before_upload_file_veto_skips_unit() {
    let (manager, factory, log, ids) = setup(2, 3);
    let (a, b, c) = (ids[0], ids[1], ids[2]);
    assert_ok!(manager.on("beforeUploadFile.gate", move |event: &Event| {
        !matches!(event, Event::BeforeUploadFile { unit } if unit.id == a)
    }));

    manager.enqueue_all();
    assert_eq!(manager.dispatch_tick(), 1);
    assert_eq!(status(&manager, a), UnitStatus::Ready);
    assert_eq!(status(&manager, b), UnitStatus::Active);
    assert_eq!(manager.snapshot().queued, vec![c]);
    assert_eq!(factory.unit(a).starts(), 0);

    assert_eq!(manager.dispatch_tick(), 1);
    assert_eq!(status(&manager, c), UnitStatus::Active);

    let started: Vec<UnitId> = log
        .named(EventName::StartFile)
        .iter()
        .filter_map(|e| match e {
            Event::StartFile { unit } => Some(unit.id),
            _ => None,
        })
        .collect();
    assert_eq!(started, vec![b, c]);

    // Once the gate is removed the unit can go again.
    assert_eq!(assert_ok!(manager.off("beforeUploadFile.gate")), 1);
    assert_ok!(manager.enqueue_file(a));
    factory.done(b);
    assert_eq!(manager.dispatch_tick(), 1);
    assert_eq!(status(&manager, a), UnitStatus::Active);
}

#[test]
fn test_disabled_unit_keeps_its_place() {
    let (manager, _factory, _log, ids) = setup(2, 2);
    let (a, b) = (ids[0], ids[1]);
    assert_ok!(manager.set_disabled(a, true));

    manager.enqueue_all();
    assert_eq!(manager.dispatch_tick(), 1);
    assert_eq!(status(&manager, a), UnitStatus::Queued);
    assert_eq!(status(&manager, b), UnitStatus::Active);
    assert_eq!(manager.snapshot().queued, vec![a]);

    assert_ok!(manager.set_disabled(a, false));
    assert_eq!(manager.dispatch_tick(), 1);
    assert_eq!(status(&manager, a), UnitStatus::Active);
}

#[test]
fn test_disabling_active_unit_stops_it() {
    let (manager, factory, _log, ids) = setup(1, 2);
    let (a, b) = (ids[0], ids[1]);
    manager.enqueue_all();
    assert_eq!(manager.dispatch_tick(), 1);

    assert_ok!(manager.set_disabled(a, true));
    let unit = manager.unit(a).expect("unit is registered");
    assert_eq!(unit.status, UnitStatus::Ready);
    assert!(unit.disabled);
    assert_eq!(factory.unit(a).stops(), 1);
    assert_slot_invariant(&manager);

    // The slot is still held until the unit reports.
    assert_eq!(manager.dispatch_tick(), 0);
    factory.unit(a).finish(TransferOutcome::Stopped);
    assert_eq!(status(&manager, a), UnitStatus::Ready);

    assert_eq!(manager.dispatch_tick(), 1);
    assert_eq!(status(&manager, b), UnitStatus::Active);
    assert_eq!(factory.unit(a).starts(), 1);
}

#[test]
fn test_disabling_queued_unit_does_not_stop_anything() {
    let (manager, factory, _log, ids) = setup(1, 2);
    manager.enqueue_all();
    manager.dispatch_tick();

    assert_ok!(manager.set_disabled(ids[1], true));
    assert_eq!(status(&manager, ids[1]), UnitStatus::Queued);
    assert_eq!(status(&manager, ids[0]), UnitStatus::Active);
    assert_eq!(factory.unit(ids[0]).stops(), 0);
}

#[test]
fn test_tick_from_before_upload_file_handler_skips_reserved_units() {
    let (manager, factory, log, ids) = setup(2, 2);
    let nested = Arc::new(Mutex::new(Vec::new()));
    let reentrant = manager.clone();
    let results = Arc::clone(&nested);
    assert_ok!(manager.on("beforeUploadFile.nested", move |_: &Event| {
        results.lock().unwrap().push(reentrant.dispatch_tick());
    }));

    manager.enqueue_all();
    assert_eq!(manager.dispatch_tick(), 2);

    assert_eq!(log.count(EventName::BeforeUploadFile), 2);
    assert_eq!(*nested.lock().unwrap(), vec![0, 0]);
    for id in &ids {
        assert_eq!(status(&manager, *id), UnitStatus::Active);
        assert_eq!(factory.unit(*id).starts(), 1);
    }
    assert_slot_invariant(&manager);
}

#[test]
fn test_vetoed_units_are_offered_again_after_reenqueue() {
    let (manager, _factory, log, ids) = setup(1, 1);
    assert_ok!(manager.on("beforeUploadFile.gate", |_: &Event| false));

    manager.enqueue_all();
    assert_eq!(manager.dispatch_tick(), 0);
    assert_eq!(status(&manager, ids[0]), UnitStatus::Ready);

    assert_eq!(assert_ok!(manager.off("beforeUploadFile.gate")), 1);
    assert_ok!(manager.enqueue_file(ids[0]));
    assert_eq!(manager.dispatch_tick(), 1);
    assert_eq!(log.count(EventName::BeforeUploadFile), 2);
}

#[test]
fn test_check_hold_and_release() {
    let (manager, _factory, _log, ids) = setup(1, 1);
    let a = ids[0];
    assert_ok!(manager.hold_for_check(a));

    // CHECK counts as pending and is queued, but not dispatched.
    manager.enqueue_all();
    assert_eq!(manager.dispatch_tick(), 0);
    assert_eq!(status(&manager, a), UnitStatus::Check);

    assert_ok!(manager.release_check(a));
    assert_eq!(status(&manager, a), UnitStatus::Queued);
    assert_eq!(manager.dispatch_tick(), 1);

    assert!(matches!(
        manager.hold_for_check(a),
        Err(QueueError::NotPending {
            status: UnitStatus::Active,
            ..
        })
    ));
}

#[test]
fn test_failed_transfer_reports_error_file_then_finish() {
    let (manager, factory, log, ids) = setup(1, 1);
    manager.enqueue_all();
    manager.dispatch_tick();
    factory.fail(ids[0], "boom");

    assert_eq!(status(&manager, ids[0]), UnitStatus::Error);
    let errors = log.named(EventName::ErrorFile);
    assert_eq!(errors.len(), 1);
    assert!(matches!(
        &errors[0],
        Event::ErrorFile {
            id: Some(id),
            reason: FileErrorReason::Transfer { message: Some(m) },
            ..
        } if *id == ids[0] && m == "boom"
    ));
    assert_eq!(log.count(EventName::Finish), 1);
    assert_eq!(manager.snapshot().slots, 1);
}

#[test]
fn test_abandoned_handle_fails_the_unit() {
    let (manager, factory, _log, ids) = setup(1, 1);
    manager.enqueue_all();
    manager.dispatch_tick();

    drop(factory.unit(ids[0]).take_handle());

    assert_eq!(status(&manager, ids[0]), UnitStatus::Error);
    assert_eq!(manager.snapshot().slots, 1);
}

#[test]
fn test_stop_all_when_idle_is_noop() {
    let (manager, factory, log, ids) = setup(2, 2);
    log.clear();
    let before = manager.snapshot();

    manager.stop_all();
    manager.stop_upload();

    assert!(log.all().is_empty());
    assert_eq!(manager.snapshot(), before);
    assert!(ids.iter().all(|id| factory.unit(*id).stops() == 0));
}

#[test]
fn test_stop_all_leaves_queue_alone() {
    let (manager, factory, log, ids) = setup(2, 3);
    let (a, b, c) = (ids[0], ids[1], ids[2]);
    manager.enqueue_all();
    manager.dispatch_tick();
    log.clear();

    manager.stop_all();
    assert!(log.all().is_empty());
    assert_eq!(status(&manager, a), UnitStatus::Ready);
    assert_eq!(status(&manager, b), UnitStatus::Ready);
    assert_eq!(factory.unit(a).stops(), 1);
    assert_eq!(factory.unit(b).stops(), 1);

    // Slots come back only once the units acknowledge.
    assert_eq!(manager.snapshot().slots, 0);
    assert_eq!(manager.snapshot().queued, vec![c]);
    assert_eq!(manager.dispatch_tick(), 0);

    factory.unit(a).finish(TransferOutcome::Stopped);
    factory.unit(b).finish(TransferOutcome::Stopped);
    assert_eq!(manager.snapshot().slots, 2);
    assert_eq!(status(&manager, a), UnitStatus::Ready);
    assert_eq!(log.count(EventName::FinishFile), 0);

    assert_eq!(manager.dispatch_tick(), 1);
    assert_eq!(status(&manager, c), UnitStatus::Active);
}

#[test]
fn test_stale_report_only_releases_slot() {
    let (manager, factory, log, ids) = setup(2, 1);
    let a = ids[0];
    manager.enqueue_all();
    manager.dispatch_tick();
    let first_run = factory.unit(a).take_handle();

    assert_ok!(manager.stop_unit(a));
    assert_eq!(status(&manager, a), UnitStatus::Ready);
    assert_eq!(manager.snapshot().slots, 1);

    assert_ok!(manager.enqueue_file(a));
    assert_eq!(manager.dispatch_tick(), 1);
    assert_eq!(manager.snapshot().slots, 0);

    first_run.done(None);
    assert_eq!(status(&manager, a), UnitStatus::Active);
    assert_eq!(manager.snapshot().slots, 1);
    assert_eq!(log.count(EventName::FinishFile), 0);

    factory.done(a);
    assert_eq!(status(&manager, a), UnitStatus::Done);
    assert_eq!(manager.snapshot().slots, 2);
    assert_eq!(log.count(EventName::Finish), 1);
}

#[test]
fn test_stop_unit_reporting_immediately() {
    let (manager, factory, _log, ids) = setup_with(ManualFactory::reporting_on_stop(), 1, 2);
    manager.enqueue_all();
    manager.dispatch_tick();

    assert_ok!(manager.stop_unit(ids[0]));
    assert_eq!(manager.snapshot().slots, 1);
    assert_eq!(factory.unit(ids[0]).stops(), 1);

    // A queued unit simply leaves the queue.
    assert_ok!(manager.stop_unit(ids[1]));
    assert_eq!(status(&manager, ids[1]), UnitStatus::Ready);
    assert!(manager.snapshot().queued.is_empty());
    assert_eq!(factory.unit(ids[1]).stops(), 0);
}

#[test]
fn test_remove_active_unit() {
    let (manager, factory, _log, ids) = setup(1, 2);
    let (a, b) = (ids[0], ids[1]);
    manager.enqueue_all();
    manager.dispatch_tick();

    let removed = assert_ok!(manager.remove_unit(a));
    assert_eq!(removed.id, a);
    assert!(manager.unit(a).is_none());
    assert_eq!(manager.units().len(), 1);
    assert_eq!(factory.unit(a).stops(), 1);

    assert_eq!(manager.snapshot().slots, 0);
    factory.unit(a).finish(TransferOutcome::Stopped);
    assert_eq!(manager.snapshot().slots, 1);

    assert_eq!(manager.dispatch_tick(), 1);
    assert_eq!(status(&manager, b), UnitStatus::Active);
}

#[test]
fn test_remove_last_pending_unit_settles_run() {
    let (manager, factory, log, ids) = setup(2, 2);
    assert_ok!(manager.set_disabled(ids[1], true));
    manager.enqueue_all();
    manager.dispatch_tick();
    factory.done(ids[0]);
    assert_eq!(log.count(EventName::Finish), 0);

    assert_ok!(manager.remove_unit(ids[1]));
    assert_eq!(log.count(EventName::Finish), 1);
    assert_eq!(manager.status(), GlobalStatus::Done);
}

#[test]
fn test_clear_all_resets_manager() {
    let (manager, factory, _log, ids) = setup(1, 3);
    manager.enqueue_all();
    manager.dispatch_tick();

    manager.clear_queue();
    assert!(!manager.has_files());
    assert!(manager.is_idle());
    assert!(manager.snapshot().queued.is_empty());
    assert_eq!(factory.unit(ids[0]).stops(), 1);
    assert_eq!(factory.unit(ids[1]).stops(), 0);

    // The manager stays usable and ids are never reused.
    let new_ids = manager.add_files(files(1));
    assert!(new_ids[0] > ids[2]);
}

#[test]
fn test_unknown_and_non_pending_units() {
    let (manager, _factory, _log, ids) = setup(1, 1);
    let missing = UnitId::new(999);

    assert_eq!(
        assert_err!(manager.enqueue_file(missing)),
        QueueError::UnknownUnit(missing)
    );
    assert_err!(manager.stop_unit(missing));
    assert_err!(manager.remove_unit(missing));
    assert_err!(manager.set_disabled(missing, true));

    assert_ok!(manager.enqueue_file(ids[0]));
    assert_ok!(manager.enqueue_file(ids[0]));
    assert_eq!(manager.snapshot().queued.len(), 1);

    manager.dispatch_tick();
    assert!(matches!(
        manager.enqueue_file(ids[0]),
        Err(QueueError::NotPending { .. })
    ));
}

#[test]
fn test_progress_events() {
    let (manager, factory, log, ids) = setup(2, 2);
    manager.enqueue_all();
    manager.dispatch_tick();

    factory.unit(ids[0]).progress(50);
    assert!(matches!(
        log.named(EventName::ProgressFile).last(),
        Some(Event::ProgressFile { loaded: 50, total: 100, .. })
    ));
    let Some(Event::Progress {
        loaded,
        total,
        percent,
    }) = log.named(EventName::Progress).last().cloned()
    else {
        panic!("expected aggregate progress");
    };
    assert_eq!((loaded, total), (50, 200));
    assert!((percent - 25.0).abs() < 1e-9);

    factory.done(ids[0]);
    factory.unit(ids[1]).progress(100);
    let Some(Event::Progress { loaded, percent, .. }) = log.named(EventName::Progress).last().cloned()
    else {
        panic!("expected aggregate progress");
    };
    assert_eq!(loaded, 200);
    assert!((percent - 100.0).abs() < 1e-9);
}
