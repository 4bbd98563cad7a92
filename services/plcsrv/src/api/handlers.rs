//! HTTP handlers
//!
//! Every read endpoint performs one complete acquisition cycle through the
//! shared session; nothing is cached between requests.

use std::collections::BTreeMap;

use axum::{extract::State, response::Json};
use common::{AppError, SuccessResponse};
use serde::Serialize;
use tracing::{debug, warn};

use super::routes::AppState;
use crate::core::{AddressSpace, ReadSpan, Snapshot, TagDefinition, TagValue};

/// Device liveness
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// One space of the configured tag map
#[derive(Debug, Clone, Serialize)]
pub struct SpaceInfo {
    pub space: AddressSpace,
    pub span: Option<ReadSpan>,
    pub tags: Vec<TagDefinition>,
}

/// Device health check
///
/// @route GET /health
/// @output `Json<HealthStatus>` - `{ok: true}` when holding register 0 reads back
/// @status 200 - Always; `ok: false` with `detail` when the device is down
pub async fn health(State(state): State<AppState>) -> Json<HealthStatus> {
    let status = match state.session.probe().await {
        Ok(true) => HealthStatus {
            ok: true,
            detail: None,
        },
        Ok(false) => HealthStatus {
            ok: false,
            detail: Some("device answered with an error".to_string()),
        },
        Err(e) => {
            warn!("Health probe failed: {}", e);
            HealthStatus {
                ok: false,
                detail: Some(e.to_string()),
            }
        },
    };
    Json(status)
}

async fn acquire(state: &AppState) -> Result<Snapshot, AppError> {
    let snapshot = state.session.snapshot(&state.registry).await?;
    debug!("Served snapshot of {} tags", snapshot.len());
    Ok(snapshot)
}

fn read_at(snapshot: &Snapshot) -> serde_json::Value {
    serde_json::Value::String(snapshot.read_at.to_rfc3339())
}

/// All tag values in one flat map
///
/// @route GET /api/tags
/// @output `Json<SuccessResponse<{name: value|null}>>`
/// @status 200 - Snapshot read
/// @status 502 - The PLC rejected or garbled a read
/// @status 503 - The PLC could not be reached
pub async fn get_tags(
    State(state): State<AppState>,
) -> Result<Json<SuccessResponse<BTreeMap<String, Option<TagValue>>>>, AppError> {
    let snapshot = acquire(&state).await?;
    let stamp = read_at(&snapshot);
    Ok(Json(
        SuccessResponse::new(snapshot.flatten()).with_metadata("read_at", stamp),
    ))
}

/// Tag values grouped by address space
///
/// @route GET /api/io
/// @output `Json<SuccessResponse<{space: {name: value|null}}>>`
/// @status 200 - Snapshot read
/// @status 502 - The PLC rejected or garbled a read
/// @status 503 - The PLC could not be reached
pub async fn get_io(
    State(state): State<AppState>,
) -> Result<Json<SuccessResponse<BTreeMap<AddressSpace, BTreeMap<String, Option<TagValue>>>>>, AppError>
{
    let snapshot = acquire(&state).await?;
    let stamp = read_at(&snapshot);
    Ok(Json(
        SuccessResponse::new(snapshot.spaces).with_metadata("read_at", stamp),
    ))
}

/// Configured tags and the span each space is read with
///
/// @route GET /api/registry
/// @output `Json<SuccessResponse<Vec<SpaceInfo>>>`
/// @status 200 - Always; does not touch the device
pub async fn get_registry(
    State(state): State<AppState>,
) -> Result<Json<SuccessResponse<Vec<SpaceInfo>>>, AppError> {
    let mut spaces = Vec::new();
    for space in state.registry.spaces() {
        let span = crate::core::plan_span(space, state.registry.tags_in(space))?;
        spaces.push(SpaceInfo {
            space,
            span,
            tags: state.registry.tags_in(space).cloned().collect(),
        });
    }
    Ok(Json(
        SuccessResponse::new(spaces)
            .with_metadata("endpoint", state.session.endpoint().into())
            .with_metadata("tag_count", state.registry.len().into()),
    ))
}
