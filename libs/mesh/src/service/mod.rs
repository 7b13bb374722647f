//! # Service Surface
//!
//! The operation surface shared by local data services and remote facades:
//! `find(params)`, `get(id, params)`, `create(data, params)`,
//! `update(id, data, params)`, `patch(id, data, params)`, `remove(id, params)`.
//!
//! [`ServiceRequest`] is the transport-neutral form of one call, used by the
//! requesters, the replier and the REST adapter alike.

pub mod memory;
pub mod remote;

pub use memory::MemoryService;
pub use remote::RemoteService;

use crate::error::ServiceError;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Call parameters (`query`, `headers`, `provider`, ...)
pub type Params = Map<String, Value>;

/// Data service reachable through the mesh
///
/// Unimplemented operations answer `MethodNotAllowed`.
#[async_trait]
pub trait Service: Send + Sync {
    async fn find(&self, _params: Params) -> Result<Value, ServiceError> {
        Err(not_allowed(Method::Find))
    }

    async fn get(&self, _id: Value, _params: Params) -> Result<Value, ServiceError> {
        Err(not_allowed(Method::Get))
    }

    async fn create(&self, _data: Value, _params: Params) -> Result<Value, ServiceError> {
        Err(not_allowed(Method::Create))
    }

    async fn update(&self, _id: Value, _data: Value, _params: Params) -> Result<Value, ServiceError> {
        Err(not_allowed(Method::Update))
    }

    async fn patch(&self, _id: Value, _data: Value, _params: Params) -> Result<Value, ServiceError> {
        Err(not_allowed(Method::Patch))
    }

    async fn remove(&self, _id: Value, _params: Params) -> Result<Value, ServiceError> {
        Err(not_allowed(Method::Remove))
    }
}

fn not_allowed(method: Method) -> ServiceError {
    ServiceError::method_not_allowed(format!("Method `{}` is not supported by this endpoint.", method))
}

/// Service operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Find,
    Get,
    Create,
    Update,
    Patch,
    Remove,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Find => "find",
            Method::Get => "get",
            Method::Create => "create",
            Method::Update => "update",
            Method::Patch => "patch",
            Method::Remove => "remove",
        }
    }

    /// Event emitted after a successful call, if the operation mutates
    pub fn event(&self) -> Option<&'static str> {
        match self {
            Method::Create => Some("created"),
            Method::Update => Some("updated"),
            Method::Patch => Some("patched"),
            Method::Remove => Some("removed"),
            Method::Find | Method::Get => None,
        }
    }

    pub fn takes_data(&self) -> bool {
        matches!(self, Method::Create | Method::Update | Method::Patch)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "find" => Ok(Method::Find),
            "get" => Ok(Method::Get),
            "create" => Ok(Method::Create),
            "update" => Ok(Method::Update),
            "patch" => Ok(Method::Patch),
            "remove" => Ok(Method::Remove),
            other => Err(ServiceError::method_not_allowed(format!(
                "Method `{}` is not supported by this endpoint.",
                other
            ))),
        }
    }
}

/// One service call in transport-neutral form
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceRequest {
    pub method: Method,
    pub path: String,
    pub id: Option<Value>,
    pub data: Option<Value>,
    pub params: Params,
}

impl ServiceRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            id: None,
            data: None,
            params: Params::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<Value>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }
}

/// Invoke `request` on `service` with the argument shape its method expects
pub async fn dispatch(service: &dyn Service, request: ServiceRequest) -> Result<Value, ServiceError> {
    let ServiceRequest {
        method, id, data, params, ..
    } = request;
    let id = id.unwrap_or(Value::Null);
    let data = data.unwrap_or_else(|| Value::Object(Map::new()));

    match method {
        Method::Find => service.find(params).await,
        Method::Get => service.get(id, params).await,
        Method::Create => service.create(data, params).await,
        Method::Update => service.update(id, data, params).await,
        Method::Patch => service.patch(id, data, params).await,
        Method::Remove => service.remove(id, params).await,
    }
}

/// Record id as it appears in URLs and RPC payloads
///
/// Strings are kept verbatim, everything else is rendered as JSON.
pub fn id_to_string(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Normalize a service path by stripping surrounding slashes
pub fn strip_slashes(path: &str) -> &str {
    path.trim_matches('/')
}

/// State change raised by a service after a successful mutating call
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceChange {
    pub path: String,
    pub event: String,
    pub data: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    struct ReadOnly;

    #[async_trait]
    impl Service for ReadOnly {
        async fn get(&self, id: Value, _params: Params) -> Result<Value, ServiceError> {
            Ok(json!({ "id": id }))
        }
    }

    #[tokio::test]
    async fn test_unimplemented_methods_are_not_allowed() {
        let err = dispatch(&ReadOnly, ServiceRequest::new(Method::Create, "r")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MethodNotAllowed);

        let ok = dispatch(&ReadOnly, ServiceRequest::new(Method::Get, "r").with_id("1")).await.unwrap();
        assert_eq!(ok, json!({"id": "1"}));
    }

    #[test]
    fn test_method_parse() {
        for method in [Method::Find, Method::Get, Method::Create, Method::Update, Method::Patch, Method::Remove] {
            assert_eq!(method.as_str().parse::<Method>().unwrap(), method);
        }
        assert_eq!("options".parse::<Method>().unwrap_err().kind(), ErrorKind::MethodNotAllowed);
    }

    #[test]
    fn test_id_to_string() {
        assert_eq!(id_to_string(&json!("abc")), "abc");
        assert_eq!(id_to_string(&json!(42)), "42");
        assert_eq!(id_to_string(&json!({"a": 1})), r#"{"a":1}"#);
    }

    #[test]
    fn test_strip_slashes() {
        assert_eq!(strip_slashes("/users/"), "users");
        assert_eq!(strip_slashes("api/users"), "api/users");
    }
}
