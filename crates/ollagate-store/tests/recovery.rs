//! Cross-restart lifecycle tests against an on-disk store.

use ollagate_store::{Db, QueueKind, QueueStatus, QueueStore};

#[test]
fn restart_recovers_interrupted_downloads() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue.db");

    let claimed_id;
    {
        let queue = QueueStore::new(Db::open(&path).unwrap());
        queue
            .enqueue("llama2:7b", QueueKind::Native, "10.0.0.1")
            .unwrap();
        queue
            .enqueue("mistral:7b", QueueKind::Native, "10.0.0.1")
            .unwrap();
        claimed_id = queue.claim_next().unwrap().unwrap().id;
        // Process "dies" here with one row mid-download
    }

    let queue = QueueStore::new(Db::open(&path).unwrap());
    assert_eq!(queue.recover_orphans().unwrap(), 1);

    let report = queue.status().unwrap();
    assert_eq!(report.counts.downloading, 0);
    assert_eq!(report.counts.pending, 2);
    // The interrupted row kept its identity; no duplicate appeared
    assert_eq!(report.queue.len(), 2);
    assert!(report.queue.iter().any(|e| e.id == claimed_id));
}

#[test]
fn terminal_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue.db");

    {
        let queue = QueueStore::new(Db::open(&path).unwrap());
        queue
            .enqueue("llama2:7b", QueueKind::Native, "10.0.0.1")
            .unwrap();
        let entry = queue.claim_next().unwrap().unwrap();
        queue.mark_failed(entry.id, "disk full").unwrap();
    }

    let queue = QueueStore::new(Db::open(&path).unwrap());
    assert_eq!(queue.recover_orphans().unwrap(), 0);

    let report = queue.status().unwrap();
    assert_eq!(report.counts.failed, 1);
    assert_eq!(report.recent[0].status, QueueStatus::Failed);
    assert_eq!(report.recent[0].error.as_deref(), Some("disk full"));
}
