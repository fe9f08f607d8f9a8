//! Offset invariants: credits attach to the right demerit, in the right
//! order, and never to delivered or fully written-off ones.

use chrono::NaiveDate;
use conductdb::clock::FixedClock;
use conductdb::engine::{EngineError, IngestRequest, RuleEngine};
use conductdb::model::{RecordId, Semester};
use conductdb::notify::NullNotifier;
use conductdb::store::{MemoryStore, Query, RecordStore, SortOrder};

type TestEngine = RuleEngine<MemoryStore, FixedClock, NullNotifier>;

fn engine() -> TestEngine {
    let clock = FixedClock::at_date(NaiveDate::from_ymd_opt(2025, 10, 15).unwrap());
    RuleEngine::new(MemoryStore::new(), clock, NullNotifier)
}

fn request(record_type: &str, day: u32, prefer_execution: bool) -> IngestRequest {
    IngestRequest {
        record_type: record_type.into(),
        student: "Li".into(),
        class: "10A".into(),
        semester: Semester::new("2025 Fall"),
        recorded_by: "Ms Wong".into(),
        date: NaiveDate::from_ymd_opt(2025, 10, day).unwrap(),
        reason: None,
        source: None,
        prefer_execution,
    }
}

fn direct_demerit(engine: &TestEngine, day: u32) -> RecordId {
    engine.ingest(request("demerit", day, false)).unwrap().record_id
}

fn reward(engine: &TestEngine, day: u32, prefer_execution: bool) -> conductdb::engine::IngestOutcome {
    engine
        .ingest(request("reward", day, prefer_execution))
        .unwrap()
}

// ==== lifecycle of one demerit ====

#[test]
fn test_three_credits_resolve_one_demerit() {
    let engine = engine();
    let demerit_id = direct_demerit(&engine, 1);

    let first = reward(&engine, 2, true).offset.unwrap();
    assert_eq!(first.demerit_id, demerit_id);
    assert_eq!(first.rewards_attached, 1);
    assert!(!first.executed_now);

    let second = reward(&engine, 3, true).offset.unwrap();
    assert_eq!(second.rewards_attached, 2);
    assert!(second.executed_now);

    let third = reward(&engine, 4, true).offset.unwrap();
    assert_eq!(third.rewards_attached, 3);
    assert!(third.record_offset_now);

    let stored = engine.store().get(demerit_id).unwrap().unwrap();
    let d = stored.as_demerit().unwrap();
    assert!(d.executed);
    assert!(d.record_offset);
    assert_eq!(d.reward_ids.len(), 3);

    // A fourth credit has nothing left to offset
    let err = engine.ingest(request("reward", 5, true)).unwrap_err();
    assert!(matches!(err, EngineError::NoEligibleDemerit));
}

#[test]
fn test_credit_and_demerit_point_at_each_other() {
    let engine = engine();
    let demerit_id = direct_demerit(&engine, 1);
    let outcome = reward(&engine, 2, true);

    let credit = engine.store().get(outcome.record_id).unwrap().unwrap();
    let r = credit.as_reward().unwrap();
    assert!(r.consumed);
    assert_eq!(r.offset_demerit_id, Some(demerit_id));

    let demerit = engine.store().get(demerit_id).unwrap().unwrap();
    assert_eq!(
        demerit.as_demerit().unwrap().reward_ids,
        vec![outcome.record_id]
    );
}

// ==== target selection across demerits ====

#[test]
fn test_prefer_execution_finishes_a_started_demerit_first() {
    let engine = engine();
    let started = direct_demerit(&engine, 1);
    let fresh = direct_demerit(&engine, 2);
    reward(&engine, 3, true);

    // The next preferring-execution credit goes to the demerit that
    // already holds one, not the older untouched one.
    let pass = reward(&engine, 4, true).offset.unwrap();
    assert_eq!(pass.demerit_id, started);
    assert!(pass.executed_now);

    let untouched = engine.store().get(fresh).unwrap().unwrap();
    assert!(untouched.as_demerit().unwrap().reward_ids.is_empty());
}

#[test]
fn test_prefer_record_finishes_the_nearest_write_off() {
    let engine = engine();
    let near = direct_demerit(&engine, 1);
    let fresh = direct_demerit(&engine, 2);
    reward(&engine, 3, true);
    reward(&engine, 4, true);
    // `near` now holds two credits and is executed

    let pass = reward(&engine, 5, false).offset.unwrap();
    assert_eq!(pass.demerit_id, near);
    assert!(pass.record_offset_now);

    let untouched = engine.store().get(fresh).unwrap().unwrap();
    assert!(untouched.as_demerit().unwrap().reward_ids.is_empty());
}

#[test]
fn test_oldest_demerit_wins_within_a_tier() {
    let engine = engine();
    let older = direct_demerit(&engine, 1);
    direct_demerit(&engine, 2);

    let pass = reward(&engine, 3, true).offset.unwrap();
    assert_eq!(pass.demerit_id, older);
}

#[test]
fn test_delivered_demerits_never_absorb_credits() {
    let engine = engine();
    let delivered = direct_demerit(&engine, 1);
    let open = direct_demerit(&engine, 2);
    engine.deliver_demerit(delivered, "Homeroom").unwrap();

    let pass = reward(&engine, 3, true).offset.unwrap();
    assert_eq!(pass.demerit_id, open);
}

// ==== eligibility gate ====

#[test]
fn test_reward_is_rejected_when_everything_is_written_off() {
    let engine = engine();
    direct_demerit(&engine, 1);
    reward(&engine, 2, true);
    reward(&engine, 3, true);
    reward(&engine, 4, true);

    let err = engine.ingest(request("reward", 5, false)).unwrap_err();
    assert!(matches!(err, EngineError::NoEligibleDemerit));
    assert_eq!(engine.store().count(&Query::rewards()).unwrap(), 3);
}

#[test]
fn test_executed_but_not_written_off_still_accepts_credits() {
    let engine = engine();
    let demerit_id = direct_demerit(&engine, 1);
    engine.execute_demerit(demerit_id).unwrap();

    // Execution by enforcement leaves the record itself open
    let pass = reward(&engine, 2, false).offset.unwrap();
    assert_eq!(pass.demerit_id, demerit_id);
    assert_eq!(pass.rewards_attached, 1);
}

#[test]
fn test_eligibility_is_per_semester() {
    let engine = engine();
    direct_demerit(&engine, 1);

    let err = engine
        .ingest(IngestRequest {
            record_type: "reward".into(),
            student: "Li".into(),
            class: "10A".into(),
            semester: Semester::new("2026 Spring"),
            recorded_by: "Ms Wong".into(),
            date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            reason: None,
            source: None,
            prefer_execution: true,
        })
        .unwrap_err();
    assert!(matches!(err, EngineError::NoEligibleDemerit));
}

// ==== banked credits ====

#[test]
fn test_freed_credit_stays_banked_until_spent_again() {
    let engine = engine();
    // Accumulated demerit via two tardies, then fully offset it
    engine.ingest(request("tardy", 1, false)).unwrap();
    engine.ingest(request("tardy", 2, false)).unwrap();
    let demerit_id = engine
        .store()
        .find(&Query::demerits().sort(SortOrder::DateAsc))
        .unwrap()
        .remove(0)
        .id();
    let credit_id = reward(&engine, 3, true).record_id;

    // Withdrawing the demerit frees the credit without consuming it
    let admin = conductdb::engine::Requester {
        name: "Registrar".into(),
        is_admin: true,
    };
    engine.withdraw(demerit_id, &admin).unwrap();
    let freed = engine.store().get(credit_id).unwrap().unwrap();
    assert!(!freed.as_reward().unwrap().consumed);

    // A fresh demerit does not spend the banked credit on its own;
    // banked credits wait for the next insertion's pass.
    let fresh = direct_demerit(&engine, 4);
    let banked = engine.store().get(credit_id).unwrap().unwrap();
    assert!(!banked.as_reward().unwrap().consumed);

    // The next credit's pass targets the fresh demerit normally
    let pass = reward(&engine, 5, true).offset.unwrap();
    assert_eq!(pass.demerit_id, fresh);
}
