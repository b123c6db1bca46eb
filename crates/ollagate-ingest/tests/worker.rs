//! Worker lifecycle tests against mocked backend and hub services.

use httpmock::prelude::*;
use ollagate_backend::OllamaClient;
use ollagate_config::HubConfig;
use ollagate_hub::HubClient;
use ollagate_ingest::Worker;
use ollagate_store::{Db, QueueKind, QueueStatus, QueueStore};
use serde_json::json;

fn hub_cfg(server: &MockServer, cache: &std::path::Path) -> HubConfig {
    HubConfig {
        base_url: server.base_url(),
        token: None,
        cache_dir: cache.to_string_lossy().to_string(),
        ..HubConfig::default()
    }
}

#[tokio::test]
async fn empty_queue_yields_no_work() {
    let backend = MockServer::start_async().await;
    let hub = MockServer::start_async().await;
    let cache = tempfile::tempdir().unwrap();

    let queue = QueueStore::new(Db::open_in_memory().unwrap());
    let worker = Worker::new(
        queue,
        OllamaClient::new(backend.base_url()),
        HubClient::new(hub.base_url(), None),
        hub_cfg(&hub, cache.path()),
        1,
    );
    assert!(!worker.process_one().await.unwrap());
}

#[tokio::test]
async fn native_row_is_pulled_through_backend() {
    let backend = MockServer::start_async().await;
    let pull = backend
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/pull")
                .json_body(json!({"name": "llama2:7b", "stream": false}));
            then.status(200).json_body(json!({"status": "success"}));
        })
        .await;
    let hub = MockServer::start_async().await;
    let cache = tempfile::tempdir().unwrap();

    let queue = QueueStore::new(Db::open_in_memory().unwrap());
    queue
        .enqueue("llama2:7b", QueueKind::Native, "10.0.0.1")
        .unwrap();

    let worker = Worker::new(
        queue.clone(),
        OllamaClient::new(backend.base_url()),
        HubClient::new(hub.base_url(), None),
        hub_cfg(&hub, cache.path()),
        1,
    );
    assert!(worker.process_one().await.unwrap());

    pull.assert_async().await;
    let report = queue.status().unwrap();
    assert_eq!(report.counts.completed, 1);
    assert_eq!(report.counts.pending, 0);
}

#[tokio::test]
async fn backend_failure_marks_row_failed() {
    let backend = MockServer::start_async().await;
    backend
        .mock_async(|when, then| {
            when.method(POST).path("/api/pull");
            then.status(500).body("manifest unknown");
        })
        .await;
    let hub = MockServer::start_async().await;
    let cache = tempfile::tempdir().unwrap();

    let queue = QueueStore::new(Db::open_in_memory().unwrap());
    queue
        .enqueue("nosuch:model", QueueKind::Native, "10.0.0.1")
        .unwrap();

    let worker = Worker::new(
        queue.clone(),
        OllamaClient::new(backend.base_url()),
        HubClient::new(hub.base_url(), None),
        hub_cfg(&hub, cache.path()),
        1,
    );
    worker.process_one().await.unwrap();

    let report = queue.status().unwrap();
    assert_eq!(report.counts.failed, 1);
    let recent = &report.recent[0];
    assert_eq!(recent.status, QueueStatus::Failed);
    assert!(recent.error.as_deref().unwrap().contains("manifest unknown"));
}

#[tokio::test]
async fn hub_row_with_packaged_artifact_completes() {
    let hub = MockServer::start_async().await;
    hub.mock_async(|when, then| {
        when.method(GET).path("/api/models/owner/model");
        then.status(200).json_body(json!({
            "siblings": [{"rfilename": "model-Q4_K_M.gguf"}]
        }));
    })
    .await;
    hub.mock_async(|when, then| {
        when.method(GET)
            .path("/owner/model/resolve/main/model-Q4_K_M.gguf");
        then.status(200).body("gguf-bytes");
    })
    .await;

    let backend = MockServer::start_async().await;
    let create = backend
        .mock_async(|when, then| {
            when.method(POST).path("/api/create");
            then.status(200).json_body(json!({"status": "success"}));
        })
        .await;

    let cache = tempfile::tempdir().unwrap();
    let queue = QueueStore::new(Db::open_in_memory().unwrap());
    queue
        .enqueue("owner/model", QueueKind::Hub, "10.0.0.1")
        .unwrap();

    let worker = Worker::new(
        queue.clone(),
        OllamaClient::new(backend.base_url()),
        HubClient::new(hub.base_url(), None),
        hub_cfg(&hub, cache.path()),
        1,
    );
    worker.process_one().await.unwrap();

    create.assert_async().await;
    assert_eq!(queue.status().unwrap().counts.completed, 1);
    // The artifact landed in the shared gguf cache
    assert!(cache.path().join("gguf/model-Q4_K_M.gguf").exists());
}

#[tokio::test]
async fn unsupported_repo_fails_with_architecture_diagnostic() {
    let hub = MockServer::start_async().await;
    hub.mock_async(|when, then| {
        when.method(GET).path("/api/models/owner/exotic");
        then.status(200).json_body(json!({
            "siblings": [{"rfilename": "model.safetensors"}]
        }));
    })
    .await;
    hub.mock_async(|when, then| {
        when.method(GET).path("/owner/exotic/raw/main/config.json");
        then.status(200)
            .json_body(json!({"architectures": ["ExoticForCausalLM"]}));
    })
    .await;
    hub.mock_async(|when, then| {
        when.method(GET).path_matches(Regex::from(".*"));
        then.status(404);
    })
    .await;

    let backend = MockServer::start_async().await;
    let cache = tempfile::tempdir().unwrap();
    let queue = QueueStore::new(Db::open_in_memory().unwrap());
    queue
        .enqueue("owner/exotic", QueueKind::Hub, "10.0.0.1")
        .unwrap();

    let worker = Worker::new(
        queue.clone(),
        OllamaClient::new(backend.base_url()),
        HubClient::new(hub.base_url(), None),
        hub_cfg(&hub, cache.path()),
        1,
    );
    worker.process_one().await.unwrap();

    let report = queue.status().unwrap();
    assert_eq!(report.counts.failed, 1);
    assert!(report.recent[0]
        .error
        .as_deref()
        .unwrap()
        .contains("ExoticForCausalLM"));
}
