/*!
 * Tests for the checkpoint store
 */

use subbatch::session::{Checkpoint, CheckpointManager, JobIdentity};
use subbatch::translation::TranslatedUnit;

use crate::common::{en_fr, sample_units};

#[test]
fn test_save_shouldWriteReadableJsonDocument() {
    let dir = tempfile::tempdir().unwrap();
    let manager = CheckpointManager::new(dir.path());
    let job = JobIdentity::derive(&en_fr(), 2, &sample_units(6));
    let checkpoint = Checkpoint::new(
        &job,
        1,
        3,
        vec![TranslatedUnit::new(1, "Un"), TranslatedUnit::new(2, "Deux")],
        &en_fr(),
        2,
    );

    manager.save(&job, &checkpoint).unwrap();

    let raw = std::fs::read_to_string(manager.path_for(&job)).unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(json["job_id"], job.as_str());
    assert_eq!(json["completed_windows"], 1);
    assert_eq!(json["total_windows"], 3);
    assert_eq!(json["language_pair"], "en:fr");
    assert_eq!(json["accumulated_results"][1]["translated_text"], "Deux");
    assert!(json["timestamp"].as_i64().unwrap() > 0);
}

#[test]
fn test_checkpoints_forDifferentJobs_shouldNotCollide() {
    let dir = tempfile::tempdir().unwrap();
    let manager = CheckpointManager::new(dir.path());
    let first = JobIdentity::derive(&en_fr(), 2, &sample_units(4));
    let second = JobIdentity::derive(&en_fr(), 2, &sample_units(5));
    assert_ne!(first, second);

    manager
        .save(&first, &Checkpoint::new(&first, 1, 2, Vec::new(), &en_fr(), 2))
        .unwrap();
    manager
        .save(&second, &Checkpoint::new(&second, 2, 3, Vec::new(), &en_fr(), 2))
        .unwrap();

    assert_eq!(manager.load(&first).unwrap().unwrap().completed_windows, 1);
    assert_eq!(manager.load(&second).unwrap().unwrap().completed_windows, 2);

    manager.delete(&first).unwrap();
    assert!(manager.load(&first).unwrap().is_none());
    assert!(manager.load(&second).unwrap().is_some());
}
