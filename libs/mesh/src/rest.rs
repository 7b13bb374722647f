//! REST surface of local services
//!
//! | Verb | Path | Operation |
//! |------|------|-----------|
//! | GET | `/<path>` | `find` |
//! | POST | `/<path>` | `create` (201) |
//! | GET | `/<path>/<id>` | `get` |
//! | PUT | `/<path>/<id>` | `update` |
//! | PATCH | `/<path>/<id>` | `patch` |
//! | DELETE | `/<path>/<id>` | `remove` |
//!
//! Params come JSON-encoded in the internal request header when the caller
//! is another peer; otherwise the URL query becomes `params.query`. Errors
//! are rendered as taxonomy JSON with the matching status.

use crate::app::App;
use crate::error::ServiceError;
use crate::service::{dispatch, Method, Params, ServiceRequest};
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{self, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::{Json, Router};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
struct RestState {
    app: Arc<App>,
    header: String,
}

/// Router serving every service mounted on `app`
///
/// `header` names the internal request header carrying caller params.
pub fn router(app: Arc<App>, header: &str) -> Router {
    Router::new().route("/*rest", any(handle)).with_state(RestState {
        app,
        header: header.to_ascii_lowercase(),
    })
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}

async fn handle(
    State(state): State<RestState>,
    verb: http::Method,
    Path(rest): Path<String>,
    Query(query): Query<BTreeMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ServiceError> {
    let (method, path, id) = resolve(&state.app, &verb, &rest)?;
    let params = read_params(&headers, &state.header, query)?;

    let mut request = ServiceRequest::new(method, path.clone()).with_params(params);
    request.id = id.map(Value::String);
    if method.takes_data() {
        request.data = Some(decode_body(&body)?);
    }

    debug!(%verb, path = %path, %method, "REST call");
    let service = state
        .app
        .service(&path)
        .ok_or_else(|| ServiceError::not_found(format!("Can not find service '{}'", path)))?;
    let result = dispatch(service.as_ref(), request).await?;

    let status = if method == Method::Create {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(result)).into_response())
}

/// Split `rest` into a mounted service path and an optional id
fn resolve(app: &App, verb: &http::Method, rest: &str) -> Result<(Method, String, Option<String>), ServiceError> {
    let rest = rest.trim_matches('/');
    if app.service(rest).is_some() {
        let method = match *verb {
            http::Method::GET => Method::Find,
            http::Method::POST => Method::Create,
            _ => return Err(not_allowed(verb, rest)),
        };
        return Ok((method, rest.to_string(), None));
    }

    if let Some((path, id)) = rest.rsplit_once('/') {
        if app.service(path).is_some() {
            let method = match *verb {
                http::Method::GET => Method::Get,
                http::Method::PUT => Method::Update,
                http::Method::PATCH => Method::Patch,
                http::Method::DELETE => Method::Remove,
                _ => return Err(not_allowed(verb, path)),
            };
            return Ok((method, path.to_string(), Some(id.to_string())));
        }
    }

    Err(ServiceError::not_found(format!("Can not find service '{}'", rest)))
}

fn not_allowed(verb: &http::Method, path: &str) -> ServiceError {
    ServiceError::method_not_allowed(format!("{} is not supported on '{}'", verb, path))
}

fn read_params(headers: &HeaderMap, header: &str, query: BTreeMap<String, String>) -> Result<Params, ServiceError> {
    let mut params = match headers.get(header) {
        Some(value) => {
            let text = value
                .to_str()
                .map_err(|_| ServiceError::bad_request(format!("Header {} is not valid text", header)))?;
            match serde_json::from_str::<Value>(text) {
                Ok(Value::Object(map)) => map,
                _ => return Err(ServiceError::bad_request(format!("Header {} must be a JSON object", header))),
            }
        }
        None => Params::new(),
    };
    if !query.is_empty() && !params.contains_key("query") {
        let query = query.into_iter().map(|(k, v)| (k, Value::String(v))).collect();
        params.insert("query".to_string(), Value::Object(query));
    }
    params
        .entry("provider")
        .or_insert_with(|| Value::String("rest".to_string()));
    Ok(params)
}

fn decode_body(body: &[u8]) -> Result<Value, ServiceError> {
    if body.is_empty() {
        return Ok(Value::Object(Params::new()));
    }
    serde_json::from_slice(body).map_err(|e| ServiceError::bad_request(format!("Invalid JSON body: {}", e)))
}
