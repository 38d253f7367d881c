//! # Tool Dispatch
//!
//! Maps one JSON request object onto an [`EqsEngine`] call and wraps the
//! outcome in a uniform envelope:
//!
//! ```text
//! {"tool": "execute_query", "query": {...}}
//!   -> {"success": true,  "data": {...}}
//!   -> {"success": false, "error": {"kind": "...", "message": "..."}}
//! ```
//!
//! Request names are snake_case, parameter names camelCase.

use eqs_core::{
    current_timestamp, BuildOptions, EqsEngine, EqsError, ErrorKind, ErrorPayload, ObjectId, PlacementRequest,
    QueryStatus, Vec3,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "tool", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ToolRequest {
    BuildEnvironment(BuildOptions),
    ExecuteQuery {
        query: Value,
    },
    GetEnvironmentStatus,
    GetObjectDetails {
        object_ids: Vec<String>,
        #[serde(default)]
        properties: Option<Vec<String>>,
    },
    PlaceObjectAtLocation(PlacementRequest),
    UpdateDynamicObject {
        object_id: ObjectId,
        position: Vec3,
    },
    RemoveDynamicObject {
        object_id: ObjectId,
    },
    ActivateVisualization {
        query_id: String,
        #[serde(default)]
        ttl_seconds: Option<f64>,
    },
    DeactivateVisualization {
        query_id: String,
    },
    SweepVisualizations,
    ClearCache {
        #[serde(default)]
        query_id: Option<String>,
    },
}

impl ToolRequest {
    pub fn name(&self) -> &'static str {
        match self {
            ToolRequest::BuildEnvironment(_) => "build_environment",
            ToolRequest::ExecuteQuery { .. } => "execute_query",
            ToolRequest::GetEnvironmentStatus => "get_environment_status",
            ToolRequest::GetObjectDetails { .. } => "get_object_details",
            ToolRequest::PlaceObjectAtLocation(_) => "place_object_at_location",
            ToolRequest::UpdateDynamicObject { .. } => "update_dynamic_object",
            ToolRequest::RemoveDynamicObject { .. } => "remove_dynamic_object",
            ToolRequest::ActivateVisualization { .. } => "activate_visualization",
            ToolRequest::DeactivateVisualization { .. } => "deactivate_visualization",
            ToolRequest::SweepVisualizations => "sweep_visualizations",
            ToolRequest::ClearCache { .. } => "clear_cache",
        }
    }
}

/// Response envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

impl ToolResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(error: &EqsError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ErrorPayload::from(error)),
        }
    }
}

/// Parses and runs one request line.
pub fn handle_line(engine: &EqsEngine, line: &str) -> ToolResponse {
    match serde_json::from_str::<ToolRequest>(line) {
        Ok(request) => dispatch(engine, request),
        Err(e) => ToolResponse::err(&EqsError::InvalidParameter(format!("malformed request: {}", e))),
    }
}

pub fn dispatch(engine: &EqsEngine, request: ToolRequest) -> ToolResponse {
    debug!("Dispatching {}", request.name());
    let outcome: Result<Value, EqsError> = match request {
        ToolRequest::BuildEnvironment(options) => engine.build_environment(&options).map(|snapshot| {
            json!({
                "environmentHash": snapshot.hash(),
                "gridInfo": snapshot.grid().info(),
                "staticGeometryCount": snapshot.static_geometry().len(),
                "dynamicObjectsCount": snapshot.dynamic_objects().len(),
            })
        }),
        ToolRequest::ExecuteQuery { query } => {
            let result = engine.execute_query_json(query);
            // Failures still carry the full result for the caller to inspect
            let success = result.status != QueryStatus::Failure;
            let error = result.error_kind.map(|kind| ErrorPayload {
                kind,
                message: result.error_message.clone().unwrap_or_default(),
            });
            return ToolResponse {
                success,
                data: Some(to_value(&result)),
                error: if success { None } else { error },
            };
        }
        ToolRequest::GetEnvironmentStatus => Ok(to_value(&engine.environment_status())),
        ToolRequest::GetObjectDetails { object_ids, properties } => {
            let details = engine.get_object_details(&object_ids, properties.as_deref());
            Ok(json!({ "objects": details }))
        }
        ToolRequest::PlaceObjectAtLocation(request) => engine.place_object_at_location(&request).map(|p| to_value(&p)),
        ToolRequest::UpdateDynamicObject { object_id, position } => engine
            .update_dynamic_object(object_id, position)
            .map(|snapshot| json!({ "environmentHash": snapshot.hash() })),
        ToolRequest::RemoveDynamicObject { object_id } => engine
            .remove_dynamic_object(object_id)
            .map(|snapshot| json!({ "environmentHash": snapshot.hash() })),
        ToolRequest::ActivateVisualization { query_id, ttl_seconds } => engine
            .activate_visualization(&query_id, ttl_seconds)
            .map(|info| to_value(&info)),
        ToolRequest::DeactivateVisualization { query_id } => {
            Ok(json!({ "deactivated": engine.deactivate_visualization(&query_id) }))
        }
        ToolRequest::SweepVisualizations => {
            Ok(json!({ "swept": engine.sweep_visualizations(current_timestamp()) }))
        }
        ToolRequest::ClearCache { query_id } => Ok(json!({ "cleared": engine.clear_cache(query_id.as_deref()) })),
    };

    match outcome {
        Ok(data) => ToolResponse::ok(data),
        Err(e) => ToolResponse::err(&e),
    }
}

fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        json!({
            "kind": ErrorKind::QueryExecutionFailed,
            "message": format!("response serialization failed: {}", e),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use eqs_core::{EngineConfig, HostBindings, InMemoryHost, SceneDocument};
    use std::sync::Arc;

    fn engine() -> EqsEngine {
        let document: SceneDocument = serde_json::from_value(json!({
            "scenes": [{
                "name": "Main",
                "objects": [
                    {
                        "id": 1, "name": "Wall", "kind": "static", "objectType": "wall",
                        "transform": { "position": { "x": 1.5, "y": 0.5, "z": 0.5 } },
                        "bounds": { "min": { "x": 1.1, "y": 0.0, "z": 0.1 }, "max": { "x": 1.9, "y": 1.0, "z": 0.9 } }
                    },
                    {
                        "id": 2, "name": "Scout", "kind": "dynamic", "objectType": "npc",
                        "transform": { "position": { "x": 0.5, "y": 0.5, "z": 0.5 } }
                    }
                ]
            }]
        }))
        .unwrap();
        let host = Arc::new(InMemoryHost::from_document(document));
        EqsEngine::new(EngineConfig::default(), HostBindings::from_host(host))
    }

    #[test]
    fn test_request_parsing() {
        let request: ToolRequest =
            serde_json::from_str(r#"{"tool":"get_object_details","objectIds":["1","Wall"],"properties":["name"]}"#)
                .unwrap();
        assert_eq!(
            request,
            ToolRequest::GetObjectDetails {
                object_ids: vec!["1".into(), "Wall".into()],
                properties: Some(vec!["name".into()]),
            }
        );

        let request: ToolRequest = serde_json::from_str(r#"{"tool":"build_environment"}"#).unwrap();
        assert_eq!(request, ToolRequest::BuildEnvironment(BuildOptions::default()));
        assert_eq!(request.name(), "build_environment");
    }

    #[test]
    fn test_malformed_request() {
        let engine = engine();
        let response = handle_line(&engine, r#"{"tool":"launch_rockets"}"#);
        assert!(!response.success);
        assert_eq!(response.error.unwrap().kind, ErrorKind::InvalidParameter);

        let response = handle_line(&engine, "not json");
        assert!(!response.success);
    }

    #[test]
    fn test_query_before_build() {
        let engine = engine();
        let response = handle_line(&engine, r#"{"tool":"execute_query","query":{"queryId":"q"}}"#);
        assert!(!response.success);
        assert_eq!(response.error.unwrap().kind, ErrorKind::EnvironmentNotInitialized);
        assert_eq!(response.data.unwrap()["status"], "Failure");
    }

    #[test]
    fn test_build_then_query_then_status() {
        let engine = engine();
        let built = handle_line(&engine, r#"{"tool":"build_environment"}"#);
        assert!(built.success, "{:?}", built.error);
        assert_eq!(built.data.unwrap()["staticGeometryCount"], 1);

        let response = handle_line(
            &engine,
            r#"{"tool":"execute_query","query":{
                "queryId":"open",
                "conditions":[{"type":"staticOccupancy","parameters":{"occupied":false}}],
                "desiredResultCount":2
            }}"#,
        );
        assert!(response.success, "{:?}", response.error);
        let data = response.data.unwrap();
        assert_eq!(data["results"].as_array().unwrap().len(), 2);

        let status = handle_line(&engine, r#"{"tool":"get_environment_status"}"#);
        let status = status.data.unwrap();
        assert_eq!(status["isInitialized"], true);
        assert_eq!(status["cachedQueriesCount"], 1);
        assert_eq!(status["dynamicObjectsCount"], 1);
    }

    #[test]
    fn test_error_envelopes() {
        let engine = engine();
        handle_line(&engine, r#"{"tool":"build_environment"}"#);

        let response = handle_line(&engine, r#"{"tool":"activate_visualization","queryId":"never-ran"}"#);
        assert_eq!(response.error.unwrap().kind, ErrorKind::NoQueryResults);

        let response = handle_line(
            &engine,
            r#"{"tool":"place_object_at_location","template":"Ghost","position":{"x":0.0,"y":0.0,"z":0.0}}"#,
        );
        assert_eq!(response.error.unwrap().kind, ErrorKind::PrefabNotFound);

        let response = handle_line(
            &engine,
            r#"{"tool":"update_dynamic_object","objectId":1,"position":{"x":0.0,"y":0.0,"z":0.0}}"#,
        );
        assert_eq!(response.error.unwrap().kind, ErrorKind::ObjectNotFound);
    }

    #[test]
    fn test_object_details_and_cache_clear() {
        let engine = engine();
        let response = handle_line(&engine, r#"{"tool":"get_object_details","objectIds":["999999","Scout"]}"#);
        assert!(response.success);
        let objects = response.data.unwrap()["objects"].clone();
        assert_eq!(objects[0]["exists"], false);
        assert_eq!(objects[1]["exists"], true);

        let response = handle_line(&engine, r#"{"tool":"clear_cache"}"#);
        assert_eq!(response.data.unwrap()["cleared"], 0);
    }
}
