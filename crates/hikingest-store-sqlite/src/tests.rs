//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::NaiveDate;
use hikingest_core::{
  cell::{Cell, RawRow},
  entity::{ConflictMode, EntityKind},
  ledger::{RunCounts, RunOutcome, RunStatus, StepTiming},
  normalize::normalize_row,
  record::{DedupKey, Record, Value},
  store::ReportStore,
};
use uuid::Uuid;

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn raw(pairs: &[(&'static str, &str)]) -> RawRow {
  pairs
    .iter()
    .map(|&(field, v)| (field, if v.is_empty() { Cell::Empty } else { Cell::Text(v.into()) }))
    .collect()
}

fn camera(name: &str, code: &str, network: &str) -> Record {
  normalize_row(
    EntityKind::CameraStatus.schema(),
    &raw(&[("camera_name", name), ("device_code", code), ("network_status", network)]),
  )
  .expect("valid camera row")
}

fn alarm(name: &str, when: &str, priority: &str) -> Record {
  normalize_row(
    EntityKind::AlarmEvent.schema(),
    &raw(&[
      ("name", name),
      ("triggering_time", when),
      ("source", "Door 3"),
      ("region", "Lobby"),
      ("trigger_event", "Intrusion"),
      ("priority", priority),
    ]),
  )
  .expect("valid alarm row")
}

// ─── Ledger ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn begin_run_records_in_progress() {
  let s = store().await;
  let run = s
    .begin_run(EntityKind::CameraStatus, "Camera_1.xlsx".into())
    .await
    .unwrap();
  assert_eq!(run.status, RunStatus::InProgress);
  assert!(run.finished_at.is_none());

  let fetched = s.get_run(run.run_id).await.unwrap().expect("run exists");
  assert_eq!(fetched.run_id, run.run_id);
  assert_eq!(fetched.entity, EntityKind::CameraStatus);
  assert_eq!(fetched.file_name, "Camera_1.xlsx");
  assert_eq!(fetched.status, RunStatus::InProgress);
  assert_eq!(fetched.counts, RunCounts::default());
}

#[tokio::test]
async fn get_run_missing_returns_none() {
  let s = store().await;
  assert!(s.get_run(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn finish_ok_stamps_counts_and_end_time() {
  let s = store().await;
  let run = s.begin_run(EntityKind::AlarmEvent, "a.xlsx".into()).await.unwrap();
  let counts = RunCounts {
    total_rows:       3,
    total_inserted:   1,
    total_duplicates: 1,
    total_skipped:    1,
  };

  let done = s.finish_run(run.run_id, RunOutcome::Ok(counts)).await.unwrap();
  assert_eq!(done.status, RunStatus::Ok);
  assert_eq!(done.counts, counts);
  assert!(done.error.is_none());
  let finished = done.finished_at.expect("finished_at set");
  assert!(finished >= run.started_at);
}

#[tokio::test]
async fn finish_error_keeps_counts_and_stores_message() {
  let s = store().await;
  let run = s.begin_run(EntityKind::AlarmEvent, "a.xlsx".into()).await.unwrap();
  let done = s
    .finish_run(run.run_id, RunOutcome::Error("header row not found".into()))
    .await
    .unwrap();
  assert_eq!(done.status, RunStatus::Error);
  assert_eq!(done.error.as_deref(), Some("header row not found"));
  assert_eq!(done.counts, RunCounts::default());
  assert!(done.finished_at.is_some());
}

#[tokio::test]
async fn finalized_run_cannot_transition_again() {
  let s = store().await;
  let run = s.begin_run(EntityKind::IpSpeaker, "s.xlsx".into()).await.unwrap();
  s.finish_run(run.run_id, RunOutcome::Ok(RunCounts::default()))
    .await
    .unwrap();

  let err = s
    .finish_run(run.run_id, RunOutcome::Error("late".into()))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::RunAlreadyFinalized(id) if id == run.run_id));

  let fetched = s.get_run(run.run_id).await.unwrap().unwrap();
  assert_eq!(fetched.status, RunStatus::Ok);
  assert!(fetched.error.is_none());
}

#[tokio::test]
async fn finish_unknown_run_is_not_found() {
  let s = store().await;
  let id = Uuid::new_v4();
  let err = s
    .finish_run(id, RunOutcome::Ok(RunCounts::default()))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::RunNotFound(x) if x == id));
}

#[tokio::test]
async fn list_runs_is_newest_first_and_limited() {
  let s = store().await;
  let mut ids = Vec::new();
  for i in 0..4 {
    let run = s
      .begin_run(EntityKind::CameraStatus, format!("Camera_{i}.xlsx"))
      .await
      .unwrap();
    ids.push(run.run_id);
  }

  let runs = s.list_runs(3).await.unwrap();
  assert_eq!(runs.len(), 3);
  assert_eq!(runs[0].run_id, ids[3]);
  assert_eq!(runs[2].run_id, ids[1]);
}

#[tokio::test]
async fn steps_are_returned_in_order() {
  let s = store().await;
  let run = s.begin_run(EntityKind::CameraStatus, "c.xlsx".into()).await.unwrap();
  let steps = vec![
    StepTiming { step_no: 2, label: "upsert".into(), step_secs: 0.5, total_secs: 1.5 },
    StepTiming { step_no: 1, label: "extract".into(), step_secs: 1.0, total_secs: 1.0 },
  ];
  s.record_steps(run.run_id, steps).await.unwrap();

  let fetched = s.get_steps(run.run_id).await.unwrap();
  assert_eq!(fetched.len(), 2);
  assert_eq!(fetched[0].label, "extract");
  assert_eq!(fetched[1].step_no, 2);
  assert_eq!(fetched[1].total_secs, 1.5);
}

#[tokio::test]
async fn steps_for_unknown_run_are_rejected() {
  let s = store().await;
  let err = s.record_steps(Uuid::new_v4(), vec![]).await.unwrap_err();
  assert!(matches!(err, Error::RunNotFound(_)));
}

// ─── Upsert ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn reloading_the_same_batch_inserts_nothing() {
  let s = store().await;
  let batch = vec![camera("Gate 1", "CH-01", "Online"), camera("Gate 2", "CH-02", "Online")];

  let r1 = s.begin_run(EntityKind::CameraStatus, "c.xlsx".into()).await.unwrap();
  let first = s
    .upsert(EntityKind::CameraStatus, r1.run_id, batch.clone(), ConflictMode::Skip)
    .await
    .unwrap();
  assert_eq!((first.attempted, first.inserted, first.conflicted), (2, 2, 0));

  let r2 = s.begin_run(EntityKind::CameraStatus, "c.xlsx".into()).await.unwrap();
  let second = s
    .upsert(EntityKind::CameraStatus, r2.run_id, batch, ConflictMode::Skip)
    .await
    .unwrap();
  assert_eq!((second.attempted, second.inserted, second.conflicted), (2, 0, 2));
  assert_eq!(s.count_records(EntityKind::CameraStatus).await.unwrap(), 2);
}

#[tokio::test]
async fn skip_leaves_existing_rows_untouched() {
  let s = store().await;
  let r1 = s.begin_run(EntityKind::CameraStatus, "1.xlsx".into()).await.unwrap();
  let r2 = s.begin_run(EntityKind::CameraStatus, "2.xlsx".into()).await.unwrap();

  s.upsert(EntityKind::CameraStatus, r1.run_id, vec![camera("Gate 1", "CH-01", "Online")], ConflictMode::Skip)
    .await
    .unwrap();
  let newer = camera("Gate 1", "CH-01", "Offline");
  s.upsert(EntityKind::CameraStatus, r2.run_id, vec![newer.clone()], ConflictMode::Skip)
    .await
    .unwrap();

  let stored = s
    .get_record(EntityKind::CameraStatus, newer.dedup_key)
    .await
    .unwrap()
    .expect("row exists");
  assert_eq!(stored.run_id, r1.run_id);
  assert_eq!(stored.record.get("network_status"), Some(&Value::Text("Online".into())));
}

#[tokio::test]
async fn refresh_overwrites_non_key_fields() {
  let s = store().await;
  let r1 = s.begin_run(EntityKind::CameraStatus, "1.xlsx".into()).await.unwrap();
  let r2 = s.begin_run(EntityKind::CameraStatus, "2.xlsx".into()).await.unwrap();

  s.upsert(EntityKind::CameraStatus, r1.run_id, vec![camera("Gate 1", "CH-01", "Online")], ConflictMode::Refresh)
    .await
    .unwrap();
  let before = s
    .get_record(EntityKind::CameraStatus, camera("Gate 1", "CH-01", "").dedup_key)
    .await
    .unwrap()
    .unwrap();

  let newer = camera("Gate 1", "CH-01", "Offline");
  let counts = s
    .upsert(EntityKind::CameraStatus, r2.run_id, vec![newer.clone()], ConflictMode::Refresh)
    .await
    .unwrap();
  assert_eq!((counts.inserted, counts.conflicted), (0, 1));

  let after = s
    .get_record(EntityKind::CameraStatus, newer.dedup_key.clone())
    .await
    .unwrap()
    .unwrap();
  assert_eq!(after.record, newer);
  assert_eq!(after.run_id, r2.run_id);
  assert_eq!(after.created_at, before.created_at);
  assert!(after.updated_at >= before.updated_at);
  assert_eq!(s.count_records(EntityKind::CameraStatus).await.unwrap(), 1);
}

#[tokio::test]
async fn alarm_rows_keep_timestamp_and_period() {
  let s = store().await;
  let run = s.begin_run(EntityKind::AlarmEvent, "Alarm_Report.xlsx".into()).await.unwrap();
  let rec = alarm("Motion", "15/03/2024 14:22:10", "High");
  s.upsert(EntityKind::AlarmEvent, run.run_id, vec![rec.clone()], ConflictMode::Skip)
    .await
    .unwrap();

  let stored = s
    .get_record(EntityKind::AlarmEvent, rec.dedup_key.clone())
    .await
    .unwrap()
    .unwrap();
  let when = NaiveDate::from_ymd_opt(2024, 3, 15)
    .unwrap()
    .and_hms_opt(14, 22, 10)
    .unwrap();
  assert_eq!(stored.record.get("triggering_time"), Some(&Value::Timestamp(when)));
  assert_eq!(stored.record.period, Some(20240315));
  assert_eq!(stored.record, rec);
}

#[tokio::test]
async fn chunked_batches_report_exact_counts() {
  let s = store().await.with_chunk_size(2).unwrap();
  let run = s.begin_run(EntityKind::CameraStatus, "c.xlsx".into()).await.unwrap();

  let first: Vec<Record> = (0..5)
    .map(|i| camera(&format!("Cam {i}"), &format!("CH-{i}"), "Online"))
    .collect();
  let counts = s
    .upsert(EntityKind::CameraStatus, run.run_id, first, ConflictMode::Skip)
    .await
    .unwrap();
  assert_eq!(counts.inserted, 5);

  let second: Vec<Record> = (0..7)
    .map(|i| camera(&format!("Cam {i}"), &format!("CH-{i}"), "Online"))
    .collect();
  let counts = s
    .upsert(EntityKind::CameraStatus, run.run_id, second, ConflictMode::Skip)
    .await
    .unwrap();
  assert_eq!((counts.attempted, counts.inserted, counts.conflicted), (7, 2, 5));
  assert_eq!(s.count_records(EntityKind::CameraStatus).await.unwrap(), 7);
}

#[tokio::test]
async fn constraint_violation_rolls_back_the_whole_batch() {
  let s = store().await.with_chunk_size(2).unwrap();
  let run = s.begin_run(EntityKind::AlarmEvent, "a.xlsx".into()).await.unwrap();

  let schema = EntityKind::AlarmEvent.schema();
  let mut nameless = alarm("placeholder", "2024-03-15 10:00:00", "Low");
  nameless.values[schema.position("name").unwrap()] = Value::Null;
  nameless.dedup_key = DedupKey::from_hex("0".repeat(DedupKey::LEN));

  let batch = vec![
    alarm("Motion", "2024-03-15 10:00:00", "Low"),
    alarm("Motion", "2024-03-15 11:00:00", "Low"),
    nameless,
  ];
  let err = s
    .upsert(EntityKind::AlarmEvent, run.run_id, batch, ConflictMode::Skip)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::ConstraintViolation(_)), "got {err:?}");
  assert_eq!(s.count_records(EntityKind::AlarmEvent).await.unwrap(), 0);
}

#[tokio::test]
async fn upsert_against_unknown_run_is_a_constraint_violation() {
  let s = store().await;
  let err = s
    .upsert(
      EntityKind::CameraStatus,
      Uuid::new_v4(),
      vec![camera("Gate 1", "CH-01", "Online")],
      ConflictMode::Skip,
    )
    .await
    .unwrap_err();
  assert!(matches!(err, Error::ConstraintViolation(_)), "got {err:?}");
  assert_eq!(s.count_records(EntityKind::CameraStatus).await.unwrap(), 0);
}

#[tokio::test]
async fn records_of_another_entity_are_rejected() {
  let s = store().await;
  let run = s.begin_run(EntityKind::AlarmEvent, "a.xlsx".into()).await.unwrap();
  let err = s
    .upsert(
      EntityKind::AlarmEvent,
      run.run_id,
      vec![camera("Gate 1", "CH-01", "Online")],
      ConflictMode::Skip,
    )
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    Error::EntityMismatch { expected: EntityKind::AlarmEvent, found: EntityKind::CameraStatus }
  ));
}

#[tokio::test]
async fn empty_batch_is_a_no_op() {
  let s = store().await;
  let run = s.begin_run(EntityKind::IpSpeaker, "s.xlsx".into()).await.unwrap();
  let counts = s
    .upsert(EntityKind::IpSpeaker, run.run_id, vec![], ConflictMode::Refresh)
    .await
    .unwrap();
  assert_eq!(counts.attempted, 0);
  assert_eq!(s.count_records(EntityKind::IpSpeaker).await.unwrap(), 0);
}

#[tokio::test]
async fn zero_chunk_size_is_rejected() {
  let s = store().await;
  assert!(matches!(s.with_chunk_size(0), Err(Error::InvalidChunkSize)));
}

#[tokio::test]
async fn get_record_missing_returns_none() {
  let s = store().await;
  let key = DedupKey::from_hex("f".repeat(DedupKey::LEN));
  assert!(s.get_record(EntityKind::EncodingDevice, key).await.unwrap().is_none());
}
