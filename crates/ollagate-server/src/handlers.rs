// Intercept and admin endpoint handlers
//
// Every handler returns an explicit GatewayError on failure; the status
// code mapping lives in error.rs.

use axum::{
    body::Bytes,
    extract::{ConnectInfo, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use ollagate_store::{EnqueueOutcome, HubSpec, QueueKind};
use serde_json::{json, Value};
use std::net::SocketAddr;
use tracing::{info, warn};

use crate::error::GatewayError;
use crate::proxy;
use crate::AppState;

type HandlerResult = Result<Response, GatewayError>;

/// First X-Forwarded-For element if present, else the socket peer address.
fn client_ip(headers: &HeaderMap, connect: Option<&ConnectInfo<SocketAddr>>) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    connect
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn parse_body(body: &Bytes) -> Result<Value, GatewayError> {
    serde_json::from_slice(body).map_err(|_| GatewayError::BadRequest("Invalid JSON".to_string()))
}

fn string_field<'a>(data: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|key| data.get(*key).and_then(Value::as_str))
        .filter(|s| !s.is_empty())
}

/// GET /api/queue
pub(crate) async fn queue_status(State(state): State<AppState>) -> HandlerResult {
    let report = state.queue.status()?;
    Ok((StatusCode::OK, Json(report)).into_response())
}

/// DELETE /api/queue - remove a pending entry by model name
pub(crate) async fn queue_delete(State(state): State<AppState>, body: Bytes) -> HandlerResult {
    let data = parse_body(&body)?;
    let model = string_field(&data, &["name", "model"])
        .ok_or_else(|| GatewayError::BadRequest("Model name required".to_string()))?;

    let removed = delete_pending_by_name(&state, model)?;
    if removed > 0 {
        Ok((
            StatusCode::OK,
            Json(json!({
                "status": "deleted",
                "message": format!("Model {} removed from queue", model),
            })),
        )
            .into_response())
    } else {
        Err(GatewayError::NotFound(format!(
            "Model {} not in queue (or already processing)",
            model
        )))
    }
}

/// Remove pending rows whose stored model, display name, or registered hub
/// name matches `name`.
fn delete_pending_by_name(state: &AppState, name: &str) -> Result<usize, GatewayError> {
    if let Some(stored) = resolve_pending_model(state, name)? {
        return Ok(state.queue.delete_pending(&stored)?);
    }
    Ok(0)
}

fn resolve_pending_model(state: &AppState, name: &str) -> Result<Option<String>, GatewayError> {
    for entry in state.queue.pending_entries()? {
        let matches = entry.model == name
            || entry.display_model() == name
            || (entry.kind == QueueKind::Hub && HubSpec::parse(&entry.model).registered_name() == name);
        if matches {
            return Ok(Some(entry.model));
        }
    }
    Ok(None)
}

/// GET /api/health - aggregate health of proxy, backend, disk, and database
pub(crate) async fn health(State(state): State<AppState>) -> HandlerResult {
    let mut overall = Health::Healthy;
    let mut checks = serde_json::Map::new();

    // The proxy is answering, by definition
    checks.insert("proxy".to_string(), json!({ "status": "ok" }));

    match state.backend.ping().await {
        Ok(()) => {
            checks.insert(
                "backend".to_string(),
                json!({ "status": "ok", "url": state.backend.base_url() }),
            );
        }
        Err(e) => {
            checks.insert(
                "backend".to_string(),
                json!({
                    "status": "error",
                    "url": state.backend.base_url(),
                    "error": e.to_string(),
                }),
            );
            overall = Health::Unhealthy;
        }
    }

    let disk = state.disk.check();
    match disk.status {
        crate::disk::DiskStatus::Critical => overall = Health::Unhealthy,
        crate::disk::DiskStatus::Warning | crate::disk::DiskStatus::Error => {
            overall = overall.min_degraded()
        }
        crate::disk::DiskStatus::Ok => {}
    }
    checks.insert("disk".to_string(), serde_json::to_value(&disk)?);

    match state.db.ping() {
        Ok(()) => {
            checks.insert("database".to_string(), json!({ "status": "ok" }));
        }
        Err(e) => {
            checks.insert(
                "database".to_string(),
                json!({ "status": "error", "error": e.to_string() }),
            );
            overall = overall.min_degraded();
        }
    }

    Ok((
        StatusCode::OK,
        Json(json!({
            "status": overall.as_str(),
            "checks": checks,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })),
    )
        .into_response())
}

#[derive(Clone, Copy, PartialEq)]
enum Health {
    Healthy,
    Degraded,
    Unhealthy,
}

impl Health {
    fn min_degraded(self) -> Self {
        match self {
            Health::Healthy => Health::Degraded,
            other => other,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Health::Healthy => "healthy",
            Health::Degraded => "degraded",
            Health::Unhealthy => "unhealthy",
        }
    }
}

/// GET /api/tags - backend catalog plus synthetic entries for queued models
pub(crate) async fn tags(State(state): State<AppState>) -> HandlerResult {
    let mut catalog = state
        .backend
        .tags()
        .await
        .map_err(|e| GatewayError::BackendUnavailable(e.to_string()))?;

    if !catalog.is_object() {
        return Err(GatewayError::Internal(anyhow::anyhow!(
            "backend catalog is not a JSON object"
        )));
    }
    if !catalog.get("models").is_some_and(Value::is_array) {
        catalog["models"] = json!([]);
    }
    let models = catalog
        .get_mut("models")
        .and_then(Value::as_array_mut)
        .expect("models array ensured above");

    // Known identifiers: every real model under both forms, plus synthetic
    // entries as they are added, so no name ever appears twice
    let mut known: std::collections::HashSet<String> = models
        .iter()
        .filter_map(|m| m.get("name").and_then(Value::as_str))
        .flat_map(|name| {
            let base = name.split(':').next().unwrap_or(name);
            [name.to_string(), base.to_string()]
        })
        .collect();

    for entry in state.queue.pending_entries()? {
        let display = entry.display_model();
        let base = display.split(':').next().unwrap_or(&display).to_string();
        if known.contains(&display) || known.contains(&base) {
            continue;
        }
        known.insert(display.clone());
        known.insert(base);

        models.push(json!({
            "name": format!("* {} [QUEUED]", display),
            "model": display,
            "modified_at": entry.created_at,
            "size": 0,
            "digest": "pending",
            "details": {
                "parent_model": "",
                "format": "pending",
                "family": "queued",
                "families": ["queued"],
                "parameter_size": "unknown",
                "quantization_level": "N/A",
            },
        }));
    }

    Ok((StatusCode::OK, Json(catalog)).into_response())
}

/// POST /api/pull - queue the download instead of running it now
pub(crate) async fn pull(
    State(state): State<AppState>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> HandlerResult {
    let data = parse_body(&body)?;
    let model = string_field(&data, &["name", "model"])
        .ok_or_else(|| GatewayError::BadRequest("Model name required".to_string()))?
        .to_string();
    let ip = client_ip(&headers, connect.as_ref());

    // Models the backend already holds are pulled straight through; a
    // failed probe is treated as "unknown" and the request still queues
    let exists = match state.backend.model_names().await {
        Ok(names) => {
            let base = model.split(':').next().unwrap_or(&model);
            names.contains(&model) || names.contains(base)
        }
        Err(e) => {
            warn!("Error checking model existence: {}", e);
            false
        }
    };
    if exists {
        info!("Model {} already exists, passing through", model);
        return Ok(proxy::forward(&state, Method::POST, "/api/pull", &headers, body).await);
    }

    let disk = state.disk.check();
    if !disk.is_ok() {
        warn!(
            "Disk space critical ({:?}%), rejecting pull request",
            disk.used_percent
        );
        return Err(GatewayError::InsufficientStorage {
            report: disk,
            threshold: state.disk.threshold_percent(),
        });
    }

    let (allowed, remaining) = state.limiter.check(&ip)?;
    if !allowed {
        warn!("Rate limit exceeded for {}", ip);
        return Err(GatewayError::QuotaExceeded {
            limit: state.limiter.limit(),
        });
    }

    match state.queue.enqueue(&model, QueueKind::Native, &ip)? {
        EnqueueOutcome::Queued { id } => {
            state.limiter.increment(&ip)?;
            Ok((
                StatusCode::ACCEPTED,
                Json(json!({
                    "status": "queued",
                    "message": format!("Model {} added to download queue", model),
                    "queue_id": id,
                    "rate_limit": {
                        "remaining": remaining.saturating_sub(1),
                        "limit": state.limiter.limit(),
                    },
                })),
            )
                .into_response())
        }
        EnqueueOutcome::AlreadyQueued => Ok((
            StatusCode::ACCEPTED,
            Json(json!({
                "status": "already_queued",
                "message": format!("Model {} is already in the download queue", model),
                "rate_limit": {
                    "remaining": remaining,
                    "limit": state.limiter.limit(),
                },
            })),
        )
            .into_response()),
    }
}

/// POST /api/hf/queue - queue a Hugging Face repository for ingestion
pub(crate) async fn hf_queue(
    State(state): State<AppState>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> HandlerResult {
    let data = parse_body(&body)?;
    let repo_id = string_field(&data, &["repo_id", "model"])
        .ok_or_else(|| GatewayError::BadRequest("repo_id required".to_string()))?
        .to_string();
    let quant = string_field(&data, &["quant"]).map(str::to_string);
    let custom_name = string_field(&data, &["name"]).map(str::to_string);
    let ip = client_ip(&headers, connect.as_ref());

    let (allowed, _remaining) = state.limiter.check(&ip)?;
    if !allowed {
        warn!("Rate limit exceeded for {}", ip);
        return Err(GatewayError::QuotaExceeded {
            limit: state.limiter.limit(),
        });
    }

    if state.queue.pending_hub_repo_exists(&repo_id)? {
        return Ok((
            StatusCode::OK,
            Json(json!({
                "status": "already_queued",
                "message": format!("HuggingFace model {} is already in queue", repo_id),
            })),
        )
            .into_response());
    }

    let spec = HubSpec {
        repo_id: repo_id.clone(),
        quant,
        name: custom_name,
    };
    match state
        .queue
        .enqueue(&spec.encode(&state.default_quant), QueueKind::Hub, &ip)?
    {
        EnqueueOutcome::Queued { id } => {
            state.limiter.increment(&ip)?;
            info!("Queued HuggingFace model {} (id={}) from {}", repo_id, id, ip);
            Ok((
                StatusCode::ACCEPTED,
                Json(json!({
                    "status": "queued",
                    "message": format!("HuggingFace model {} added to download queue", repo_id),
                    "queue_id": id,
                    "type": "huggingface",
                })),
            )
                .into_response())
        }
        EnqueueOutcome::AlreadyQueued => Ok((
            StatusCode::OK,
            Json(json!({
                "status": "already_queued",
                "message": format!("HuggingFace model {} is already in queue", repo_id),
            })),
        )
            .into_response()),
    }
}

/// DELETE /api/delete - delete a queued model locally, else pass through
pub(crate) async fn model_delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> HandlerResult {
    let data = parse_body(&body)?;
    let raw = string_field(&data, &["name", "model"])
        .ok_or_else(|| GatewayError::BadRequest("Model name required".to_string()))?;

    // Catalog clients may echo the synthetic label back at us
    let model = unwrap_queued_label(raw);

    if delete_pending_by_name(&state, &model)? > 0 {
        info!("Removed queued model {} from queue", model);
        return Ok((StatusCode::OK, Json(json!({ "status": "success" }))).into_response());
    }

    // Not ours: forward with the unwrapped name so the backend never sees
    // the synthetic label
    let clean_body = Bytes::from(serde_json::to_vec(&json!({ "name": model }))?);
    Ok(proxy::forward(&state, Method::DELETE, "/api/delete", &headers, clean_body).await)
}

/// Strip the synthetic-catalog wrapper: `"* NAME [QUEUED]"` -> `NAME`.
fn unwrap_queued_label(name: &str) -> String {
    if name.starts_with("* ") && name.contains("[QUEUED]") {
        name.replacen("* ", "", 1).replace(" [QUEUED]", "").trim().to_string()
    } else {
        name.to_string()
    }
}
