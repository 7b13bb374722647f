//! # Mesh Error Types
//!
//! Three layers, matching where a failure is observed:
//!
//! - [`ServiceError`]: the common taxonomy callers of any service see, local
//!   or remote. Every variant maps to an HTTP status and renders as
//!   `{name, message, code, className, data?}`.
//! - [`RequestError`]: what a transport reports, passed through uninterpreted
//!   until the facade normalizes it (see [`crate::error_handler`]).
//! - [`MeshError`]: failures of `MicroService::init` and the publishers.

use codec::CodecError;
use network::TransportError;
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Class of a [`ServiceError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BadRequest,
    NotAuthenticated,
    Forbidden,
    NotFound,
    MethodNotAllowed,
    NotAcceptable,
    Timeout,
    Conflict,
    Unprocessable,
    GeneralError,
    NotImplemented,
    BadGateway,
    Unavailable,
    GatewayTimeout,
}

const ALL_KINDS: [ErrorKind; 14] = [
    ErrorKind::BadRequest,
    ErrorKind::NotAuthenticated,
    ErrorKind::Forbidden,
    ErrorKind::NotFound,
    ErrorKind::MethodNotAllowed,
    ErrorKind::NotAcceptable,
    ErrorKind::Timeout,
    ErrorKind::Conflict,
    ErrorKind::Unprocessable,
    ErrorKind::GeneralError,
    ErrorKind::NotImplemented,
    ErrorKind::BadGateway,
    ErrorKind::Unavailable,
    ErrorKind::GatewayTimeout,
];

impl ErrorKind {
    pub fn code(&self) -> u16 {
        match self {
            ErrorKind::BadRequest => 400,
            ErrorKind::NotAuthenticated => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::MethodNotAllowed => 405,
            ErrorKind::NotAcceptable => 406,
            ErrorKind::Timeout => 408,
            ErrorKind::Conflict => 409,
            ErrorKind::Unprocessable => 422,
            ErrorKind::GeneralError => 500,
            ErrorKind::NotImplemented => 501,
            ErrorKind::BadGateway => 502,
            ErrorKind::Unavailable => 503,
            ErrorKind::GatewayTimeout => 504,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "BadRequest",
            ErrorKind::NotAuthenticated => "NotAuthenticated",
            ErrorKind::Forbidden => "Forbidden",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::MethodNotAllowed => "MethodNotAllowed",
            ErrorKind::NotAcceptable => "NotAcceptable",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::Conflict => "Conflict",
            ErrorKind::Unprocessable => "Unprocessable",
            ErrorKind::GeneralError => "GeneralError",
            ErrorKind::NotImplemented => "NotImplemented",
            ErrorKind::BadGateway => "BadGateway",
            ErrorKind::Unavailable => "Unavailable",
            ErrorKind::GatewayTimeout => "GatewayTimeout",
        }
    }

    pub fn class_name(&self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "bad-request",
            ErrorKind::NotAuthenticated => "not-authenticated",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::NotFound => "not-found",
            ErrorKind::MethodNotAllowed => "method-not-allowed",
            ErrorKind::NotAcceptable => "not-acceptable",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Unprocessable => "unprocessable",
            ErrorKind::GeneralError => "general-error",
            ErrorKind::NotImplemented => "not-implemented",
            ErrorKind::BadGateway => "bad-gateway",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::GatewayTimeout => "gateway-timeout",
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        ALL_KINDS.into_iter().find(|k| k.code() == code)
    }

    /// Accepts both the name (`NotFound`) and the class name (`not-found`)
    pub fn from_name(name: &str) -> Option<Self> {
        ALL_KINDS
            .into_iter()
            .find(|k| k.name() == name || k.class_name() == name)
    }

    fn default_message(&self) -> &'static str {
        match self {
            ErrorKind::GeneralError => "Error",
            other => other.name(),
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error surfaced by services, local or remote
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}: {message}")]
pub struct ServiceError {
    kind: ErrorKind,
    message: String,
    data: Option<Value>,
}

impl ServiceError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn method_not_allowed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MethodNotAllowed, message)
    }

    pub fn not_acceptable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotAcceptable, message)
    }

    pub fn general(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::GeneralError, message)
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadGateway, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unavailable, message)
    }

    pub fn gateway_timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::GatewayTimeout, message)
    }

    /// Error of the class registered for `code`, `GeneralError` when none is
    pub fn from_code(code: u16, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::from_code(code).unwrap_or(ErrorKind::GeneralError), message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn code(&self) -> u16 {
        self.kind.code()
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn class_name(&self) -> &'static str {
        self.kind.class_name()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    /// Rebuild an error from its JSON rendering or any error-like object
    ///
    /// The class is taken from `name`/`className`, then `code`/`status`,
    /// falling back to `GeneralError`.
    pub fn convert(value: &Value) -> Self {
        Self::convert_with_status(value, None)
    }

    /// [`ServiceError::convert`] with a transport status as last resort class
    pub fn convert_with_status(value: &Value, status: Option<u16>) -> Self {
        let code_of = |field: &str| {
            value
                .get(field)
                .and_then(Value::as_u64)
                .and_then(|c| u16::try_from(c).ok())
                .and_then(ErrorKind::from_code)
        };

        let kind = ["name", "className"]
            .iter()
            .filter_map(|field| value.get(*field).and_then(Value::as_str))
            .find_map(ErrorKind::from_name)
            .or_else(|| code_of("code"))
            .or_else(|| code_of("status"))
            .or_else(|| status.and_then(ErrorKind::from_code))
            .unwrap_or(ErrorKind::GeneralError);

        let message = value
            .get("message")
            .or_else(|| value.get("error"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| value.as_str().map(str::to_string))
            .unwrap_or_else(|| kind.default_message().to_string());

        Self {
            kind,
            message,
            data: value.get("data").filter(|d| !d.is_null()).cloned(),
        }
    }

    pub fn to_json(&self) -> Value {
        let mut out = Map::new();
        out.insert("name".into(), Value::from(self.name()));
        out.insert("message".into(), Value::from(self.message.clone()));
        out.insert("code".into(), Value::from(self.code()));
        out.insert("className".into(), Value::from(self.class_name()));
        if let Some(data) = &self.data {
            out.insert("data".into(), data.clone());
        }
        Value::Object(out)
    }
}

/// Transport failure as reported by a requester
#[derive(Debug, Error)]
pub enum RequestError {
    /// The remote side answered with an error status
    #[error("Request failed with status code {status}")]
    Response { status: u16, data: Value },

    /// The request was cut short locally (`ECONNABORTED` on timeout)
    #[error("{code}: {message}")]
    Aborted { code: String, message: String },

    /// No response at all
    #[error("Network error: {message}")]
    Network { message: String },

    /// A replier answered with an `{error, code}` payload
    #[error("Remote service error: {message}")]
    Remote { message: String, code: Option<u16> },

    /// Rejected locally before anything was sent
    #[error(transparent)]
    Rejected(#[from] ServiceError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl RequestError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn aborted(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Aborted {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Status of the response, if one was received
    pub fn status(&self) -> Option<u16> {
        match self {
            RequestError::Response { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Failure to bring a peer up or to publish on its channel
#[derive(Debug, Error)]
pub enum MeshError {
    #[error("Connection error: {0}")]
    Connection(#[from] TransportError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl From<MeshError> for RequestError {
    fn from(error: MeshError) -> Self {
        match error {
            MeshError::Connection(e) => RequestError::Transport(e),
            MeshError::Codec(e) => RequestError::Codec(e),
            MeshError::Service(e) => RequestError::Rejected(e),
            MeshError::Configuration(message) => RequestError::Rejected(ServiceError::general(message)),
        }
    }
}
