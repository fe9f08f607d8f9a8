//! Exchange, delivery workflow, and snapshot persistence of engine state.

use chrono::NaiveDate;
use conductdb::clock::FixedClock;
use conductdb::engine::{
    EngineError, ExchangeRequest, IngestRequest, Requester, RuleEngine,
};
use conductdb::model::{RecordId, Semester};
use conductdb::notify::NullNotifier;
use conductdb::store::{MemoryStore, Query, RecordStore};

type TestEngine = RuleEngine<MemoryStore, FixedClock, NullNotifier>;

fn engine() -> TestEngine {
    let clock = FixedClock::at_date(NaiveDate::from_ymd_opt(2025, 12, 1).unwrap());
    RuleEngine::new(MemoryStore::new(), clock, NullNotifier)
}

fn ingest(engine: &TestEngine, record_type: &str, day: u32) -> RecordId {
    engine
        .ingest(IngestRequest {
            record_type: record_type.into(),
            student: "Li".into(),
            class: "10A".into(),
            semester: Semester::new("2025 Fall"),
            recorded_by: "Ms Wong".into(),
            date: NaiveDate::from_ymd_opt(2025, 11, day).unwrap(),
            reason: None,
            source: None,
            prefer_execution: false,
        })
        .unwrap()
        .record_id
}

fn exchange(engine: &TestEngine, record_type: &str, count: usize) -> Result<conductdb::engine::ExchangeOutcome, EngineError> {
    engine.exchange(ExchangeRequest {
        record_type: record_type.into(),
        student: "Li".into(),
        class: "10A".into(),
        semester: Semester::new("2025 Fall"),
        count,
        prefer_execution: false,
    })
}

// ==== exchange ====

#[test]
fn test_ten_praises_exchange_into_one_credit() {
    let engine = engine();
    for day in 1..=10 {
        ingest(&engine, "dorm_praise", day);
    }
    let outcome = exchange(&engine, "dorm_praise", 1).unwrap();
    assert_eq!(outcome.reward_ids.len(), 1);
    assert_eq!(outcome.sources_consumed, 10);
    assert_eq!(
        engine
            .store()
            .count(&Query::behavioral().consumed(false))
            .unwrap(),
        0
    );
}

#[test]
fn test_partial_pool_rejects_the_whole_exchange() {
    let engine = engine();
    for day in 1..=11 {
        ingest(&engine, "dorm_praise", day);
    }
    // Two credits need 20 praises; having 11 mints nothing
    let err = exchange(&engine, "dorm_praise", 2).unwrap_err();
    assert!(matches!(
        err,
        EngineError::InsufficientSources {
            needed: 20,
            available: 11,
            ..
        }
    ));
    assert_eq!(engine.store().count(&Query::rewards()).unwrap(), 0);
    assert_eq!(
        engine
            .store()
            .count(&Query::behavioral().consumed(false))
            .unwrap(),
        11
    );
}

#[test]
fn test_each_credit_links_its_own_batch() {
    let engine = engine();
    for day in 1..=12 {
        ingest(&engine, "teaching_reward_ticket", day);
    }
    let outcome = exchange(&engine, "teaching_reward_ticket", 2).unwrap();
    assert_eq!(outcome.reward_ids.len(), 2);

    for credit_id in &outcome.reward_ids {
        let batch = engine
            .store()
            .find(&Query::behavioral().derived_id(*credit_id))
            .unwrap();
        assert_eq!(batch.len(), 6);
    }
}

#[test]
fn test_demerit_sources_cannot_be_exchanged() {
    let engine = engine();
    ingest(&engine, "tardy", 1);
    let err = exchange(&engine, "tardy", 1).unwrap_err();
    assert!(matches!(err, EngineError::InvalidRecordType(_)));
}

// ==== delivery workflow ====

#[test]
fn test_execution_and_delivery_are_separate_steps() {
    let engine = engine();
    let demerit_id = ingest(&engine, "demerit", 1);

    engine.execute_demerit(demerit_id).unwrap();
    let executed = engine.store().get(demerit_id).unwrap().unwrap();
    let d = executed.as_demerit().unwrap();
    assert!(d.executed);
    assert!(!d.delivered);

    engine.deliver_demerit(demerit_id, "Homeroom").unwrap();
    let delivered = engine.store().get(demerit_id).unwrap().unwrap();
    let d = delivered.as_demerit().unwrap();
    assert!(d.delivered);
    assert_eq!(d.delivered_by.as_deref(), Some("Homeroom"));
    assert!(d.delivered_at.is_some());
}

#[test]
fn test_delivered_records_are_immutable() {
    let engine = engine();
    let demerit_id = ingest(&engine, "demerit", 1);
    let credit_id = ingest(&engine, "reward", 2);
    engine.deliver_demerit(demerit_id, "Homeroom").unwrap();
    engine.deliver_reward(credit_id, "Homeroom").unwrap();

    assert!(matches!(
        engine.execute_demerit(demerit_id).unwrap_err(),
        EngineError::Forbidden(_)
    ));
    assert!(matches!(
        engine.deliver_demerit(demerit_id, "Anyone").unwrap_err(),
        EngineError::Forbidden(_)
    ));
    assert!(matches!(
        engine.deliver_reward(credit_id, "Anyone").unwrap_err(),
        EngineError::Forbidden(_)
    ));
    assert!(matches!(
        engine
            .withdraw(
                demerit_id,
                &Requester {
                    name: "Registrar".into(),
                    is_admin: true
                }
            )
            .unwrap_err(),
        EngineError::Forbidden(_)
    ));
}

// ==== persistence ====

#[test]
fn test_engine_state_survives_a_snapshot_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("records.snap");

    let first = engine();
    ingest(&first, "tardy", 1);
    ingest(&first, "tardy", 2);
    ingest(&first, "reward", 3);
    first.store().save_snapshot(&path).unwrap();

    let restored = MemoryStore::load_snapshot(&path).unwrap();
    let clock = FixedClock::at_date(NaiveDate::from_ymd_opt(2025, 12, 2).unwrap());
    let second = RuleEngine::new(restored, clock, NullNotifier);

    // Derived state is intact: one demerit holding one credit
    let demerits = second.store().find(&Query::demerits()).unwrap();
    assert_eq!(demerits.len(), 1);
    assert_eq!(demerits[0].as_demerit().unwrap().reward_ids.len(), 1);

    // And the engine keeps operating on it: another tardy pair folds
    ingest(&second, "tardy", 4);
    ingest(&second, "tardy", 5);
    assert_eq!(second.store().count(&Query::demerits()).unwrap(), 2);
}
