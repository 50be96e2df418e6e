//! HTTP surface of the trigger gateway.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::{error, info};
use uuid::Uuid;

use crate::domain::{RuntimeStatus, WorkflowResponse};

use super::{GatewayError, TriggerGateway};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<TriggerGateway>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

/// Build the gateway router
pub fn create_router(gateway: Arc<TriggerGateway>) -> Router {
    Router::new()
        .route(
            "/api/orchestrators/:workflow",
            get(start_instance).post(start_instance),
        )
        .route("/runtime/instances", get(list_instances))
        .route("/runtime/instances/:id", get(instance_status))
        .route("/runtime/instances/:id/result", get(instance_result))
        .route("/runtime/instances/:id/terminate", post(terminate_instance))
        .with_state(AppState { gateway })
}

/// Serve the gateway until Ctrl+C
pub async fn serve(gateway: Arc<TriggerGateway>, bind: &str) -> Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;

    info!("Gateway listening on {}", bind);

    axum::serve(listener, create_router(gateway))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Gateway server failed")?;

    info!("Gateway shutting down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Received Ctrl+C, initiating graceful shutdown");
}

/// GET|POST /api/orchestrators/:workflow
///
/// The body is optional. JSON bodies are kept as-is, anything else as a
/// string.
async fn start_instance(
    State(state): State<AppState>,
    Path(workflow): Path<String>,
    body: Bytes,
) -> Result<Response, GatewayError> {
    if workflow != state.gateway.workflow_name() {
        return Err(GatewayError::UnknownWorkflow(workflow));
    }

    let payload = if body.is_empty() {
        None
    } else {
        Some(serde_json::from_slice(&body).unwrap_or_else(|_| {
            serde_json::Value::String(String::from_utf8_lossy(&body).into_owned())
        }))
    };

    let handle = state.gateway.start(payload).await?;
    info!(instance_id = %handle.id, "Started orchestration with ID = '{}'.", handle.id);

    Ok((
        StatusCode::ACCEPTED,
        [(header::LOCATION, handle.status_query_get_uri.clone())],
        Json(handle),
    )
        .into_response())
}

/// GET /runtime/instances
async fn list_instances(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Response, GatewayError> {
    let instances = state.gateway.list(query.limit.unwrap_or(50)).await?;
    Ok(Json(instances).into_response())
}

/// GET /runtime/instances/:id
async fn instance_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, GatewayError> {
    let instance = state.gateway.status(id).await?;
    Ok(Json(instance).into_response())
}

/// GET /runtime/instances/:id/result
///
/// 202 with the snapshot while running, the workflow's own response once
/// finished, 409 if cancelled.
async fn instance_result(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, GatewayError> {
    let instance = state.gateway.status(id).await?;

    let response = match instance.response() {
        Some(response) => response.into_response(),
        None if instance.runtime_status == RuntimeStatus::Cancelled => {
            (StatusCode::CONFLICT, "Instance was cancelled").into_response()
        }
        None => (StatusCode::ACCEPTED, Json(instance)).into_response(),
    };

    Ok(response)
}

/// POST /runtime/instances/:id/terminate
async fn terminate_instance(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, GatewayError> {
    state.gateway.terminate(id).await?;
    Ok(StatusCode::ACCEPTED)
}

impl IntoResponse for WorkflowResponse {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (
            status,
            [(header::CONTENT_TYPE, self.content_type())],
            self.body_string(),
        )
            .into_response()
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            GatewayError::NotFound(_) | GatewayError::UnknownWorkflow(_) => {
                (StatusCode::NOT_FOUND, "not_found")
            }
            GatewayError::Internal(e) => {
                error!(error = %e, "Gateway request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        };

        let body = serde_json::json!({
            "error": code,
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}
