//! REST API handlers

use axum::{http::StatusCode, response::IntoResponse, Json};
use patchbay_core::{Layout, LayoutError, Plan, TaskRecord, Topology, TopologyError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// API error response
#[derive(Serialize)]
struct ApiError {
    error: String,
}

impl ApiError {
    fn new(msg: impl Into<String>) -> Self {
        Self { error: msg.into() }
    }
}

/// Request body: the layout the fabric is in now and the layout it
/// should end up in. Both are full layout documents; bound devices are
/// taken from the desired layout.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcedureRequest {
    #[serde(rename = "currentLayout")]
    pub current_layout: serde_json::Value,
    #[serde(rename = "desiredLayout")]
    pub desired_layout: serde_json::Value,
}

#[derive(Error, Debug)]
enum ProcedureError {
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error(transparent)]
    Topology(#[from] TopologyError),
}

fn generate_procedures(request: ProcedureRequest) -> Result<Vec<TaskRecord>, ProcedureError> {
    let current = Layout::from_value(request.current_layout)?;
    let desired = Layout::from_value(request.desired_layout)?;
    let bound = desired.bound_devices.clone();
    let prev = Topology::from_layout(&current, &bound)?;
    let new = Topology::from_layout(&desired, &bound)?;
    Ok(Plan::system_update_plan(&prev, &new).encode())
}

/// Generate a migration procedure transitioning the current layout into
/// the desired one
pub async fn create_migration_procedure(
    Json(request): Json<ProcedureRequest>,
) -> impl IntoResponse {
    debug!("Migration procedure requested");

    match generate_procedures(request) {
        Ok(records) => {
            info!(operations = records.len(), "Generated migration procedure");
            Json(records).into_response()
        }
        Err(e @ ProcedureError::Layout(_)) => {
            warn!(error = %e, "Rejected invalid layout");
            (StatusCode::BAD_REQUEST, Json(ApiError::new(e.to_string()))).into_response()
        }
        Err(e @ ProcedureError::Topology(_)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiError::new(e.to_string())),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(current: serde_json::Value, desired: serde_json::Value) -> ProcedureRequest {
        serde_json::from_value(json!({
            "currentLayout": current,
            "desiredLayout": desired,
        }))
        .unwrap()
    }

    #[test]
    fn test_generate_procedures_success() {
        let records = generate_procedures(request(
            json!({"nodes": []}),
            json!({"nodes": [{"device": {
                "cpu": {"deviceIDs": ["cpu-01"]},
                "memory": {"deviceIDs": ["mem-01"]}
            }}]}),
        ))
        .unwrap();

        assert_eq!(
            serde_json::to_value(records).unwrap(),
            json!([
                {"operationID": 1, "operation": "connect", "dependencies": [],
                 "targetCPUID": "cpu-01", "targetDeviceID": "mem-01"},
                {"operationID": 2, "operation": "boot", "dependencies": [1],
                 "targetDeviceID": "cpu-01"},
            ])
        );
    }

    #[test]
    fn test_generate_procedures_applies_desired_bound_devices() {
        let records = generate_procedures(request(
            json!({"nodes": [{"device": {
                "cpu": {"deviceIDs": ["cpu-01"]},
                "memory": {"deviceIDs": ["mem-01"]}
            }}]}),
            json!({
                "nodes": [{"device": {
                    "cpu": {"deviceIDs": ["cpu-01"]},
                    "memory": {"deviceIDs": ["mem-01"]}
                }}],
                "boundDevices": {"cpu-01": {"memory": ["mem-01"]}}
            }),
        ))
        .unwrap();

        assert!(records.is_empty());
    }

    #[test]
    fn test_generate_procedures_rejects_invalid_layout() {
        let err = generate_procedures(request(
            json!({"nodes": [{"device": {"memory": {"deviceIDs": ["mem-01"]}}}]}),
            json!({"nodes": []}),
        ))
        .unwrap_err();

        assert!(matches!(err, ProcedureError::Layout(_)));
    }

    #[test]
    fn test_generate_procedures_rejects_missing_nodes_key() {
        let err = generate_procedures(request(json!({"nods": []}), json!({"nodes": []})))
            .unwrap_err();

        assert!(matches!(err, ProcedureError::Layout(LayoutError::Parse(_))));
    }
}
