//! # RPC Request / Response Events
//!
//! Both directions share one payload shape, [`RpcCall`]:
//! `{id: string|null, data: object|null, params: object, path: string, type: string}`.
//! The correlation uuid travels as the envelope `id` and is generated only by
//! [`RpcRequestEvent::create`]; a response copies it from the request it
//! answers, so the caller can retire exactly one pending call.

use crate::constants::{RPC_REQUEST_EVENT, RPC_RESPONSE_EVENT};
use crate::envelope::{to_data, Envelope, Event};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Operation payload carried by both RPC directions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcCall {
    /// Record id, already stringified by the caller
    #[serde(default)]
    pub id: Option<String>,
    /// Request body on the way in, operation result on the way back
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub params: Map<String, Value>,
    pub path: String,
    /// Operation name (`find`, `get`, `create`, `update`, `patch`, `remove`)
    #[serde(rename = "type")]
    pub method: String,
}

/// Error payload a replier sends instead of a result
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteFailure {
    pub message: String,
    pub code: Option<u16>,
}

/// Correlated call into a remote service
#[derive(Debug, Clone, PartialEq)]
pub struct RpcRequestEvent {
    pub uuid: String,
    pub key: Option<String>,
    pub call: RpcCall,
}

impl RpcRequestEvent {
    /// Build a request with a fresh UUIDv4 correlation id
    pub fn create(
        key: Option<String>,
        method: impl Into<String>,
        path: impl Into<String>,
        id: Option<String>,
        data: Option<Value>,
        params: Map<String, Value>,
    ) -> Self {
        Self {
            uuid: Uuid::new_v4().to_string(),
            key,
            call: RpcCall {
                id,
                data,
                params,
                path: path.into(),
                method: method.into(),
            },
        }
    }

    pub fn correlation_id(&self) -> &str {
        &self.uuid
    }
}

impl Event for RpcRequestEvent {
    const NAME: &'static str = RPC_REQUEST_EVENT;

    fn to_envelope(&self) -> Envelope {
        Envelope::new(Self::NAME, &self.uuid, self.key.clone(), to_data(&self.call))
    }

    fn reconstruct(envelope: &Envelope) -> Result<Self> {
        envelope.expect_name(Self::NAME)?;
        Ok(Self {
            uuid: envelope.id.clone(),
            key: envelope.key.clone(),
            call: envelope.payload(Self::NAME)?,
        })
    }
}

/// Answer to an [`RpcRequestEvent`]
#[derive(Debug, Clone, PartialEq)]
pub struct RpcResponseEvent {
    pub uuid: String,
    pub key: Option<String>,
    pub call: RpcCall,
}

impl RpcResponseEvent {
    /// Answer `request` with `result`, echoing its correlation id
    pub fn reply_to(request: &RpcRequestEvent, key: Option<String>, result: Value) -> Self {
        Self {
            uuid: request.uuid.clone(),
            key,
            call: RpcCall {
                data: Some(result),
                ..request.call.clone()
            },
        }
    }

    /// Answer `request` with an `{error, code}` payload
    pub fn failure_to(request: &RpcRequestEvent, key: Option<String>, message: &str, code: u16) -> Self {
        let mut payload = Map::new();
        payload.insert("error".to_string(), Value::String(message.to_string()));
        payload.insert("code".to_string(), Value::from(code));
        Self::reply_to(request, key, Value::Object(payload))
    }

    pub fn correlation_id(&self) -> &str {
        &self.uuid
    }

    /// Operation result; a missing result reads as `null`
    pub fn result(&self) -> Value {
        self.call.data.clone().unwrap_or(Value::Null)
    }

    /// `Some` when the payload is exactly `{error, code?}`
    pub fn failure(&self) -> Option<RemoteFailure> {
        let object = self.call.data.as_ref()?.as_object()?;
        let message = object.get("error")?.as_str()?;
        if object.keys().any(|k| k != "error" && k != "code") {
            return None;
        }
        let code = object
            .get("code")
            .and_then(Value::as_u64)
            .and_then(|c| u16::try_from(c).ok());
        Some(RemoteFailure {
            message: message.to_string(),
            code,
        })
    }
}

impl Event for RpcResponseEvent {
    const NAME: &'static str = RPC_RESPONSE_EVENT;

    fn to_envelope(&self) -> Envelope {
        Envelope::new(Self::NAME, &self.uuid, self.key.clone(), to_data(&self.call))
    }

    fn reconstruct(envelope: &Envelope) -> Result<Self> {
        envelope.expect_name(Self::NAME)?;
        Ok(Self {
            uuid: envelope.id.clone(),
            key: envelope.key.clone(),
            call: envelope.payload(Self::NAME)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request() -> RpcRequestEvent {
        RpcRequestEvent::create(None, "get", "users", Some("0".into()), None, Map::new())
    }

    #[test]
    fn test_create_generates_unique_uuids() {
        assert_ne!(request().uuid, request().uuid);
    }

    #[test]
    fn test_request_wire_shape() {
        let json = request().to_json();
        assert_eq!(json["name"], "RPCRequestEvent");
        assert_eq!(json["data"]["type"], "get");
        assert_eq!(json["data"]["path"], "users");
        assert_eq!(json["data"]["id"], "0");
        assert_eq!(json["data"]["data"], Value::Null);
        assert_eq!(json["data"]["params"], json!({}));
        assert!(json.get("key").is_none());
    }

    #[test]
    fn test_reply_echoes_correlation_id() {
        let req = request();
        let res = RpcResponseEvent::reply_to(&req, Some("replier".into()), json!({"id": "0"}));
        assert_eq!(res.correlation_id(), req.correlation_id());
        assert_eq!(res.call.path, "users");
        assert_eq!(res.result(), json!({"id": "0"}));
        assert!(res.failure().is_none());
    }

    #[test]
    fn test_failure_payload() {
        let req = request();
        let res = RpcResponseEvent::failure_to(&req, None, "Can not find service 'users'", 404);
        let failure = res.failure().unwrap();
        assert_eq!(failure.message, "Can not find service 'users'");
        assert_eq!(failure.code, Some(404));
    }

    #[test]
    fn test_result_with_error_field_is_not_a_failure() {
        let req = request();
        let res = RpcResponseEvent::reply_to(&req, None, json!({"error": "x", "id": "1"}));
        assert!(res.failure().is_none());
    }

    #[test]
    fn test_response_rejected_as_request() {
        let req = request();
        let res = RpcResponseEvent::reply_to(&req, None, json!(null));
        assert!(RpcRequestEvent::reconstruct(&res.to_envelope()).unwrap_err().is_name_mismatch());
    }
}
