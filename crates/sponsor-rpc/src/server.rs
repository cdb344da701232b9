//! HTTP surface: JSON-RPC at `/rpc`, REST under `/api`, and `/health`.

use axum::{
    Json, Router,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::dispatch::{DispatchError, Dispatcher, Method, Param};

pub fn router(dispatcher: Dispatcher) -> Router {
    Router::new()
        .route("/rpc", post(rpc))
        .route("/api/{namespace}/{method}", get(rest))
        .route("/health", get(health))
        .with_state(dispatcher)
}

async fn health() -> StatusCode {
    StatusCode::OK
}

#[derive(Debug, Deserialize)]
struct RpcRequest {
    method: String,
    params: Vec<Param>,
    id: serde_json::Number,
    jsonrpc: String,
}

impl RpcRequest {
    fn parse(body: Value) -> Result<Self, DispatchError> {
        let request: Self =
            serde_json::from_value(body).map_err(|e| DispatchError::Validation(e.to_string()))?;
        if request.jsonrpc != "2.0" {
            return Err(DispatchError::Validation(format!(
                "jsonrpc must be \"2.0\", got \"{}\"",
                request.jsonrpc
            )));
        }
        Ok(request)
    }

    /// `<namespace>_<method>`, with exactly one separator.
    fn split_method(&self) -> Result<(&str, &str), DispatchError> {
        let mut parts = self.method.split('_');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(namespace), Some(method), None) if !namespace.is_empty() && !method.is_empty() => {
                Ok((namespace, method))
            }
            _ => Err(DispatchError::Validation(format!(
                "method must be <namespace>_<method>, got \"{}\"",
                self.method
            ))),
        }
    }
}

fn rpc_error(id: Value, err: &DispatchError) -> Response {
    let body = json!({
        "id": id,
        "jsonrpc": "2.0",
        "error": { "code": err.code(), "message": err.to_string() },
    });
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}

async fn rpc(State(dispatcher): State<Dispatcher>, body: Result<Json<Value>, JsonRejection>) -> Response {
    let body = match body {
        Ok(Json(body)) => body,
        Err(rejection) => {
            return rpc_error(Value::Null, &DispatchError::Validation(rejection.body_text()));
        }
    };
    let raw_id = body.get("id").cloned().unwrap_or(Value::Null);

    let request = match RpcRequest::parse(body) {
        Ok(request) => request,
        Err(err) => {
            debug!(message = "rejected rpc request", error = %err);
            return rpc_error(raw_id, &err);
        }
    };
    let id = Value::Number(request.id.clone());
    let (namespace, method) = match request.split_method() {
        Ok(parts) => parts,
        Err(err) => return rpc_error(id, &err),
    };

    match dispatcher.dispatch(namespace, method, &request.params).await {
        Ok(result) => (StatusCode::OK, Json(json!({ "id": id, "jsonrpc": "2.0", "result": result })))
            .into_response(),
        Err(err) => rpc_error(id, &err),
    }
}

#[derive(Debug, Deserialize)]
struct RestQuery {
    /// JSON array of positional parameters.
    params: Option<String>,
}

async fn rest(
    State(dispatcher): State<Dispatcher>,
    Path((namespace, method)): Path<(String, String)>,
    Query(query): Query<RestQuery>,
) -> Response {
    if Method::resolve(&namespace, &method).is_none() {
        return StatusCode::NOT_FOUND.into_response();
    }

    let params = match query.params.as_deref().map(serde_json::from_str::<Vec<Param>>).transpose() {
        Ok(params) => params.unwrap_or_default(),
        Err(e) => {
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() }))).into_response();
        }
    };

    match dispatcher.dispatch(&namespace, &method, &params).await {
        Ok(result) => (StatusCode::OK, Json(json!({ "result": result }))).into_response(),
        Err(err @ DispatchError::Validation(_)) => {
            (StatusCode::BAD_REQUEST, Json(json!({ "error": err.to_string() }))).into_response()
        }
        Err(DispatchError::MethodNotFound(_)) => StatusCode::NOT_FOUND.into_response(),
        Err(err @ DispatchError::Internal(_)) => {
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": err.to_string() }))).into_response()
        }
    }
}
