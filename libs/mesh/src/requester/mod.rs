//! # Requesters
//!
//! A [`Requester`] carries one [`ServiceRequest`] to a remote peer and hands
//! back the raw result. Two transports exist: [`HttpRequester`] talks to the
//! peer's REST surface, [`RpcRequester`] goes through the broker and the
//! instance's correlation table. Failures are passed through as
//! [`RequestError`]; normalizing them is the facade's job.

pub mod correlation;
pub mod http;
pub mod rpc;

pub use correlation::{CallResult, PendingCalls};
pub use http::HttpRequester;
pub use rpc::{install_response_handler, RpcRequester};

use crate::error::{MeshError, RequestError};
use crate::presence::Publisher;
use crate::service::{Params, ServiceRequest};
use async_trait::async_trait;
use codec::TransportKind;
use mesh_config::HttpSettings;
use serde_json::Value;
use std::sync::Arc;

#[async_trait]
pub trait Requester: Send + Sync {
    fn kind(&self) -> TransportKind;

    async fn send(&self, request: ServiceRequest) -> Result<Value, RequestError>;
}

/// The calling peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentPeer {
    pub key: String,
    pub namespace: Option<String>,
    /// Private queue RPC responses are routed to
    pub queue: String,
}

/// The peer hosting the service being called
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    pub key: String,
    pub service: String,
    pub host: Option<String>,
    pub kind: TransportKind,
}

#[derive(Debug, Clone)]
pub struct RequesterOptions {
    pub current: CurrentPeer,
    pub remote: RemoteTarget,
    pub http: HttpSettings,
}

/// Broker-side collaborators an RPC requester cannot work without
#[derive(Clone)]
pub struct RpcLink {
    pub publisher: Arc<Publisher>,
    pub pending: Arc<PendingCalls>,
}

/// Build the requester for `options.remote.kind`
///
/// RPC needs `link`; asking for it without one is a configuration error.
pub fn create_requester(options: RequesterOptions, link: Option<RpcLink>) -> Result<Arc<dyn Requester>, MeshError> {
    match options.remote.kind {
        TransportKind::Http => Ok(Arc::new(HttpRequester::new(options)?)),
        TransportKind::Rpc => {
            let link = link.ok_or_else(|| {
                MeshError::Configuration("RPC requester needs a publisher and a correlation table".to_string())
            })?;
            Ok(Arc::new(RpcRequester::new(options, link)))
        }
    }
}

/// Params forwarded to a remote service: `provider` set to `remote`, then
/// every name in `exclude` removed
pub fn filter_params(params: &Params, exclude: &[String]) -> Params {
    let mut result = params.clone();
    result.insert("provider".to_string(), Value::String("remote".to_string()));
    for name in exclude {
        result.remove(name);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options(kind: TransportKind) -> RequesterOptions {
        RequesterOptions {
            current: CurrentPeer {
                key: "caller".to_string(),
                namespace: None,
                queue: "caller.0".to_string(),
            },
            remote: RemoteTarget {
                key: "callee".to_string(),
                service: "callee".to_string(),
                host: Some("localhost".to_string()),
                kind,
            },
            http: HttpSettings::default(),
        }
    }

    #[test]
    fn test_filter_params_drops_internal_fields() {
        let params = json!({"query": {"name": "One"}, "connection": {}, "resolve": true, "provider": "rest"});
        let exclude = HttpSettings::default().exclude_params;

        let filtered = filter_params(params.as_object().unwrap(), &exclude);

        assert_eq!(Value::Object(filtered), json!({"query": {"name": "One"}}));
    }

    #[test]
    fn test_filter_params_keeps_provider_when_not_excluded() {
        let filtered = filter_params(&Params::new(), &[]);
        assert_eq!(filtered.get("provider"), Some(&json!("remote")));
    }

    #[test]
    fn test_rpc_requester_requires_link() {
        let err = create_requester(options(TransportKind::Rpc), None).err().unwrap();
        assert!(matches!(err, MeshError::Configuration(_)));
    }

    #[test]
    fn test_http_requester_selected_by_kind() {
        let requester = create_requester(options(TransportKind::Http), None).unwrap();
        assert_eq!(requester.kind(), TransportKind::Http);
    }
}
