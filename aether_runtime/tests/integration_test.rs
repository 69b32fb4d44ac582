//! Integration tests for aether_runtime.
//!
//! All tests use temporary directories for isolation.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;

use num_bigint::BigInt;

use aether_kernel::config::ModelConfig;
use aether_kernel::disk_engine::DiskToppleEngine;
use aether_kernel::engine::ToppleEngine;
use aether_kernel::hashing::grid_hash;
use aether_kernel::{Automaton, Coordinates, Evolving, Family, Grid};

use aether_runtime::checkpoint_log::CheckpointLog;
use aether_runtime::drift;
use aether_runtime::rerun;
use aether_runtime::session::{self, Session, SharedSession, CHECKPOINT_LOG_FILE};
use aether_runtime::snapshot::{self, GRID_FILE, PROPERTIES_FILE};
use aether_runtime::RuntimeError;

/// Create a temp directory for a test.
fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir()
        .join("aether_runtime_tests")
        .join(name);
    if dir.exists() {
        fs::remove_dir_all(&dir).ok();
    }
    fs::create_dir_all(&dir).expect("Failed to create temp dir");
    dir
}

/// Keeps changing for well over a hundred steps.
fn long_running(scratch: &Path) -> ModelConfig {
    ModelConfig::single_source(2, Family::Aether, -3000).scratch_dir(scratch)
}

fn run_steps<M: Evolving>(model: &mut M, steps: usize) {
    for _ in 0..steps {
        model.step().expect("step");
    }
}

fn assert_same_cells<A: Automaton + ?Sized, B: Automaton + ?Sized>(a: &A, b: &B) {
    let report = drift::compare_models(a, b).expect("compare");
    assert!(report.is_identical(), "models drifted: {:?}", report);
}

// ─────────────────────────────────────────────────────────────
// Test 1: backup_restores_on_both_backends
// ─────────────────────────────────────────────────────────────

#[test]
fn backup_restores_on_both_backends() {
    let dir = temp_dir("backup_both_backends");
    let mut model = ToppleEngine::<i64>::new(long_running(&dir)).expect("engine");
    run_steps(&mut model, 12);

    let backups = dir.join("backups");
    let target = snapshot::backup(&model, &backups, "b12").expect("backup");
    assert!(target.join(GRID_FILE).is_file());
    assert!(target.join(PROPERTIES_FILE).is_file());

    let memory = snapshot::restore_memory::<i64>(&backups, "b12").expect("restore memory");
    let disk = snapshot::restore_disk::<i64>(&backups, "b12").expect("restore disk");
    assert_eq!(memory.current_step(), 12);
    assert_eq!(disk.current_step(), 12);
    assert_eq!(disk.side(), model.side());

    let whole = model.whole_grid();
    let memory_whole = memory.whole_grid();
    let disk_whole = disk.whole_grid();
    let edge = model.side() as i64;
    for point in [[0, 0], [1, -2], [-3, 4], [edge - 1, 0], [-edge + 1, edge - 1]] {
        if point.iter().any(|x| x.abs() >= edge) {
            continue;
        }
        let coordinates = Coordinates::new(point.to_vec());
        let expected = whole.value_at(&coordinates).expect("original");
        assert_eq!(memory_whole.value_at(&coordinates).expect("memory"), expected);
        assert_eq!(disk_whole.value_at(&coordinates).expect("disk"), expected);
    }
    assert_same_cells(&model, &memory);
    assert_same_cells(&model, &disk);
}

// ─────────────────────────────────────────────────────────────
// Test 2: restored_models_keep_evolving_identically
// ─────────────────────────────────────────────────────────────

#[test]
fn restored_models_keep_evolving_identically() {
    let dir = temp_dir("restore_parity");
    let mut original = ToppleEngine::<i64>::new(long_running(&dir)).expect("engine");
    run_steps(&mut original, 5);
    let backups = dir.join("backups");
    snapshot::backup(&original, &backups, "b5").expect("backup");

    let mut memory = snapshot::restore_memory::<BigInt>(&backups, "b5").expect("restore memory");
    let mut disk = snapshot::restore_disk::<i64>(&backups, "b5").expect("restore disk");
    for _ in 0..10 {
        let changed = original.step().expect("step original");
        assert_eq!(memory.step().expect("step memory"), changed);
        assert_eq!(disk.step().expect("step disk"), changed);
    }
    let hash = grid_hash(&original).expect("hash");
    assert_eq!(grid_hash(&memory).expect("hash"), hash);
    assert_eq!(grid_hash(&disk).expect("hash"), hash);
}

// ─────────────────────────────────────────────────────────────
// Test 3: stable_state_survives_backup
// ─────────────────────────────────────────────────────────────

#[test]
fn stable_state_survives_backup() {
    let dir = temp_dir("stable_backup");
    let config = ModelConfig::single_source(2, Family::Sunflower, 30);
    let mut model = ToppleEngine::<i64>::new(config).expect("engine");
    let mut steps = 0;
    while !model.is_stable() {
        model.step().expect("step");
        steps += 1;
        assert!(steps < 50, "sunflower 30 should settle quickly");
    }
    snapshot::backup(&model, &dir, "stable").expect("backup");

    let mut restored = snapshot::restore_memory::<i64>(&dir, "stable").expect("restore");
    assert!(restored.is_stable());
    assert_eq!(restored.current_step(), model.current_step());
    assert!(!restored.step().expect("step"));
    assert_eq!(restored.current_step(), model.current_step());
}

// ─────────────────────────────────────────────────────────────
// Test 4: tampered_backups_are_rejected
// ─────────────────────────────────────────────────────────────

#[test]
fn tampered_backups_are_rejected() {
    let dir = temp_dir("tampered_backup");
    let mut model = ToppleEngine::<i64>::new(long_running(&dir)).expect("engine");
    run_steps(&mut model, 7);

    // flipped byte in the grid
    let target = snapshot::backup(&model, &dir, "grid").expect("backup");
    let grid_path = target.join(GRID_FILE);
    let mut bytes = fs::read(&grid_path).expect("read grid");
    let last = bytes.len() - 1;
    bytes[last] ^= 0x01;
    fs::write(&grid_path, &bytes).expect("write grid");
    match snapshot::restore_memory::<i64>(&dir, "grid") {
        Err(RuntimeError::HashMismatch { .. }) => {}
        other => panic!("expected hash mismatch, got {:?}", other.map(|m| m.current_step())),
    }

    // recorded model hash rewritten
    let target = snapshot::backup(&model, &dir, "props").expect("backup");
    let properties_path = target.join(PROPERTIES_FILE);
    let mut properties: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&properties_path).expect("read")).expect("parse");
    properties["hash"] = serde_json::Value::String("0".repeat(64));
    let edited = serde_json::to_string_pretty(&properties).expect("encode");
    fs::write(&properties_path, edited).expect("write");
    match snapshot::restore_disk::<i64>(&dir, "props") {
        Err(RuntimeError::HashMismatch { expected, .. }) => assert_eq!(expected, "0".repeat(64)),
        other => panic!("expected hash mismatch, got {:?}", other.map(|m| m.current_step())),
    }

    // unknown field
    let target = snapshot::backup(&model, &dir, "extra").expect("backup");
    let properties_path = target.join(PROPERTIES_FILE);
    let mut properties: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&properties_path).expect("read")).expect("parse");
    properties["comment"] = serde_json::Value::String("hand edited".to_string());
    fs::write(&properties_path, properties.to_string()).expect("write");
    assert!(matches!(
        snapshot::read_properties(&dir, "extra"),
        Err(RuntimeError::SnapshotCorrupt { .. })
    ));
}

// ─────────────────────────────────────────────────────────────
// Test 5: incomplete_backups_are_not_listed
// ─────────────────────────────────────────────────────────────

#[test]
fn incomplete_backups_are_not_listed() {
    let dir = temp_dir("incomplete_backup");
    let config = ModelConfig::single_source(3, Family::Aether, 99);
    let model = ToppleEngine::<i64>::new(config).expect("engine");
    snapshot::backup(&model, &dir, "b").expect("backup");
    let target = snapshot::backup(&model, &dir, "a").expect("backup");
    assert_eq!(snapshot::list_backups(&dir).expect("list"), vec!["a", "b"]);

    fs::remove_file(target.join(PROPERTIES_FILE)).expect("remove properties");
    assert_eq!(snapshot::list_backups(&dir).expect("list"), vec!["b"]);
    assert!(snapshot::list_backups(&dir.join("missing")).expect("list").is_empty());
}

// ─────────────────────────────────────────────────────────────
// Test 6: session_resumes_from_latest_backup
// ─────────────────────────────────────────────────────────────

#[test]
fn session_resumes_from_latest_backup() {
    let dir = temp_dir("session_resume");
    let model = ToppleEngine::<i64>::new(long_running(&dir)).expect("engine");
    let mut session = Session::create(&dir, "s", model, 3).expect("create session");
    assert_eq!(session.run(7).expect("run"), 7);
    let hash = session.current_hash().expect("hash");
    assert_eq!(session.log().last_sequence(), 7);
    assert_eq!(
        snapshot::list_backups(&session.backups_dir()).expect("list"),
        vec![session::backup_name(3), session::backup_name(6)]
    );
    drop(session);

    // a session directory with checkpoints cannot be created again
    let fresh = ToppleEngine::<i64>::new(long_running(&dir)).expect("engine");
    assert!(Session::create(&dir, "s", fresh, 3).is_err());

    let resumed = Session::resume(&dir, "s", 3, |backups, name| {
        snapshot::restore_memory_with::<BigInt, _>(backups, name, |config| config.workers(2))
    })
    .expect("resume in memory");
    assert_eq!(resumed.current_step(), 7);
    assert_eq!(resumed.current_hash().expect("hash"), hash);
    drop(resumed);

    let mut resumed =
        Session::resume(&dir, "s", 3, |backups, name| snapshot::restore_disk::<i64>(backups, name))
            .expect("resume on disk");
    assert_eq!(resumed.current_step(), 7);
    assert_eq!(resumed.current_hash().expect("hash"), hash);

    // continues the same log
    assert!(resumed.advance().expect("advance"));
    let record = resumed.log().last_record().expect("record").clone();
    assert_eq!(record.sequence, 8);
    assert_eq!(record.step, 8);
    assert!(record.last_flushed_layer.is_some());
    assert_eq!(record.side, resumed.model().side());
}

// ─────────────────────────────────────────────────────────────
// Test 7: resume_detects_divergent_log
// ─────────────────────────────────────────────────────────────

#[test]
fn resume_detects_divergent_log() {
    let dir = temp_dir("session_divergent");
    let model = ToppleEngine::<i64>::new(long_running(&dir)).expect("engine");
    let mut session = Session::create(&dir, "s", model, 2).expect("create session");
    session.run(3).expect("run");
    drop(session);

    // restoring a different configuration must not match the log
    let result = Session::resume(&dir, "s", 2, |_, _| {
        let mut other =
            ToppleEngine::<i64>::new(ModelConfig::single_source(2, Family::Aether, -2999))?;
        run_steps(&mut other, 2);
        Ok(other)
    });
    assert!(matches!(result, Err(RuntimeError::HashMismatch { .. })));
}

// ─────────────────────────────────────────────────────────────
// Test 8: shared_session_serializes_threads
// ─────────────────────────────────────────────────────────────

#[test]
fn shared_session_serializes_threads() {
    let dir = temp_dir("shared_session");
    let model = ToppleEngine::<i64>::new(long_running(&dir)).expect("engine");
    let shared =
        SharedSession::new(Session::create(&dir, "shared", model, 0).expect("create session"));

    thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..5 {
                    assert!(shared.advance().expect("advance"));
                }
            });
        }
    });

    assert_eq!(shared.current_step(), 20);
    let hash = shared.current_hash().expect("hash");
    let session = shared.into_inner();
    let records = session.log().load_all().expect("load");
    assert_eq!(records.len(), 20);
    for (index, record) in records.iter().enumerate() {
        assert_eq!(record.sequence, index as u64 + 1);
        assert_eq!(record.step, index as u64 + 1);
        assert!(record.backup.is_none());
    }
    assert_eq!(rerun::rebuild_hash(&long_running(&dir), 20).expect("rebuild"), hash);
}

// ─────────────────────────────────────────────────────────────
// Test 9: rerun_verifies_checkpoint_log
// ─────────────────────────────────────────────────────────────

#[test]
fn rerun_verifies_checkpoint_log() {
    let dir = temp_dir("rerun_log");
    let config = long_running(&dir);
    let model = DiskToppleEngine::<i64>::new(config.clone()).expect("engine");
    let mut session = Session::create(&dir, "disk", model, 4).expect("create session");
    session.run(9).expect("run");

    let mut records = session.log().load_all().expect("load");
    assert_eq!(rerun::verify_records(&config, &records).expect("verify"), 9);
    assert_eq!(records[3].backup.as_ref().map(|b| b.name.as_str()), Some("step-00000004"));
    // a record only names a backup once that backup is complete
    let complete = snapshot::list_backups(&session.backups_dir()).expect("list");
    for mark in records.iter().filter_map(|r| r.backup.as_ref()) {
        assert!(complete.contains(&mark.name), "{} is incomplete", mark.name);
    }

    records[5].hash = "f".repeat(64);
    assert!(matches!(
        rerun::verify_records(&config, &records),
        Err(RuntimeError::HashMismatch { .. })
    ));

    let (rebuilt, hash) = rerun::rebuild_model(&config, 9).expect("rebuild");
    assert_eq!(hash, session.current_hash().expect("hash"));
    assert_same_cells(&rebuilt, session.model());
}

// ─────────────────────────────────────────────────────────────
// Test 10: memory_and_disk_do_not_drift
// ─────────────────────────────────────────────────────────────

#[test]
fn memory_and_disk_do_not_drift() {
    let dir = temp_dir("drift");
    for (dimension, family, value) in [
        (2, Family::Sunflower, 2000i64),
        (3, Family::Aether, -4000),
        (4, Family::Sunflower, 1500),
    ] {
        let config = ModelConfig::single_source(dimension, family, value).scratch_dir(&dir);
        let mut memory = ToppleEngine::<i64>::new(config.clone().workers(3)).expect("memory");
        let mut disk = DiskToppleEngine::<i64>::new(config).expect("disk");
        run_steps(&mut memory, 6);
        run_steps(&mut disk, 6);
        let report = drift::compare_models(&memory, &disk).expect("compare");
        assert!(report.is_identical(), "{}D {:?}: {:?}", dimension, family, report);
        assert_eq!(report.total_a, BigInt::from(value));
        assert_eq!(report.total_delta, BigInt::from(0));
    }
}

// ─────────────────────────────────────────────────────────────
// Test 11: corrupted_log_detection
// ─────────────────────────────────────────────────────────────

#[test]
fn corrupted_log_detection() {
    let dir = temp_dir("corrupted_log");
    let model = ToppleEngine::<i64>::new(long_running(&dir)).expect("engine");
    let mut session = Session::create(&dir, "s", model, 0).expect("create session");
    session.run(5).expect("run");
    let log_path = session.dir().join(CHECKPOINT_LOG_FILE);
    drop(session);

    // Corrupt the log by truncating the last frame
    let data = fs::read(&log_path).expect("read log");
    fs::write(&log_path, &data[..data.len() - 3]).expect("truncate");

    match CheckpointLog::open(&log_path) {
        Err(RuntimeError::CheckpointLogCorrupt { offset, .. }) => {
            assert!(offset > 0, "first frames are intact");
        }
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("corrupted log should not open"),
    }
}

// ─────────────────────────────────────────────────────────────
// Test 12: backups_are_listed_in_step_order
// ─────────────────────────────────────────────────────────────

#[test]
fn backups_are_listed_in_step_order() {
    let dir = temp_dir("backup_order");
    let model = ToppleEngine::<i64>::new(ModelConfig::single_source(2, Family::Aether, 5))
        .expect("engine");
    let late = session::backup_name(100_000_000);
    let early = session::backup_name(99_999_999);
    for name in [late.as_str(), "manual", early.as_str(), "step-00000002"] {
        snapshot::backup(&model, &dir, name).expect("backup");
    }

    // plain string order would put step 100000000 before step 99999999
    assert!(late < early);
    assert_eq!(
        snapshot::list_backups(&dir).expect("list"),
        vec!["manual".to_string(), "step-00000002".to_string(), early.clone(), late.clone()]
    );
    assert_eq!(snapshot::backup_step(&late), Some(100_000_000));
    assert_eq!(snapshot::backup_step("manual"), None);
}
