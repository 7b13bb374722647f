//! HTTP transport
//!
//! Calls the REST surface of the peer hosting the service. The target URL is
//! `<protocol>://<host><dns_suffix>[:<port>]/<path>[/<id>]`, each part
//! overridable per call through params of the same name. The caller's
//! filtered params travel JSON-encoded in the internal request header.

use super::{filter_params, Requester, RequesterOptions};
use crate::error::{MeshError, RequestError, ServiceError};
use crate::service::{id_to_string, Method, Params, ServiceRequest};
use async_trait::async_trait;
use codec::TransportKind;
use mesh_config::HttpSettings;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::redirect::Policy;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Hop-by-hop headers never copied from `params.headers`
const STRIPPED_HEADERS: [&str; 3] = ["content-length", "upgrade", "connection"];

pub struct HttpRequester {
    host: Option<String>,
    settings: HttpSettings,
    client: Client,
}

impl HttpRequester {
    pub fn new(options: RequesterOptions) -> Result<Self, MeshError> {
        let client = build_client(&options.http, options.http.proxy.as_deref())?;
        Ok(Self {
            host: options.remote.host,
            settings: options.http,
            client,
        })
    }

    /// Target URL for `request`, honoring per-call overrides
    pub fn url_for(&self, request: &ServiceRequest) -> Result<String, ServiceError> {
        let params = &request.params;
        let protocol = string_param(params, "protocol").unwrap_or_else(|| self.settings.protocol.clone());
        if protocol != "http" && protocol != "https" {
            return Err(ServiceError::bad_request(format!("Invalid protocol {}", protocol)));
        }

        let host = string_param(params, "host")
            .or_else(|| self.host.clone())
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ServiceError::bad_request("Missing host"))?;

        let port = match params.get("port") {
            Some(value) => parse_port(value)?,
            None => self
                .settings
                .port
                .unwrap_or(if protocol == "https" { 443 } else { 80 }),
        };

        let dns_suffix = string_param(params, "dnsSuffix")
            .or_else(|| self.settings.dns_suffix.clone())
            .unwrap_or_default();

        let mut url = format!("{}://{}{}", protocol, host, dns_suffix);
        let known_port = (protocol == "http" && port == 80) || (protocol == "https" && port == 443);
        if !known_port {
            url.push_str(&format!(":{}", port));
        }
        url.push('/');
        url.push_str(request.path.trim_start_matches('/'));
        if let Some(id) = request.id.as_ref().filter(|id| !id.is_null()) {
            url.push('/');
            url.push_str(&id_to_string(id));
        }
        Ok(url)
    }

    fn headers(&self, params: &Params) -> Result<HeaderMap, RequestError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let forwarded = filter_params(params, &self.settings.exclude_params);
        let name = HeaderName::from_bytes(self.settings.internal_request_header.as_bytes())
            .map_err(|e| ServiceError::general(format!("Invalid internal request header: {}", e)))?;
        let value = HeaderValue::from_str(&Value::Object(forwarded).to_string())
            .map_err(|e| ServiceError::bad_request(format!("Params cannot be sent as a header: {}", e)))?;
        headers.insert(name, value);

        if let Some(extra) = params.get("headers").and_then(Value::as_object) {
            for (name, value) in extra {
                if STRIPPED_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
                    continue;
                }
                let value = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(&value)) {
                    (Ok(name), Ok(value)) => {
                        headers.insert(name, value);
                    }
                    _ => debug!(header = %name, "Skipped header that is not valid HTTP"),
                }
            }
        }
        Ok(headers)
    }

    fn timeout(&self, params: &Params) -> Option<Duration> {
        match params.get("timeout").and_then(Value::as_u64) {
            Some(ms) => (ms > 0).then(|| Duration::from_millis(ms)),
            None => self.settings.timeout(),
        }
    }
}

#[async_trait]
impl Requester for HttpRequester {
    fn kind(&self) -> TransportKind {
        TransportKind::Http
    }

    async fn send(&self, request: ServiceRequest) -> Result<Value, RequestError> {
        let url = self.url_for(&request)?;
        let headers = self.headers(&request.params)?;

        // A per-call proxy needs its own client
        let client = match string_param(&request.params, "proxy") {
            Some(proxy) => build_client(&self.settings, Some(&proxy))?,
            None => self.client.clone(),
        };

        let mut builder = client.request(verb(request.method), &url).headers(headers);
        if let Some(timeout) = self.timeout(&request.params) {
            builder = builder.timeout(timeout);
        }
        if request.method.takes_data() {
            if let Some(data) = &request.data {
                builder = builder.json(data);
            }
        }

        debug!(method = %request.method, url = %url, "Sending HTTP request");
        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        let body = response.bytes().await.map_err(map_reqwest_error)?;
        let data = decode_body(&body);

        if status.as_u16() >= 400 {
            return Err(RequestError::Response {
                status: status.as_u16(),
                data,
            });
        }
        Ok(data)
    }
}

fn build_client(settings: &HttpSettings, proxy: Option<&str>) -> Result<Client, MeshError> {
    let mut builder = Client::builder();
    if let Some(proxy) = proxy {
        let proxy = reqwest::Proxy::all(proxy)
            .map_err(|e| MeshError::Configuration(format!("Invalid proxy {}: {}", proxy, e)))?;
        builder = builder.proxy(proxy);
    }
    if let Some(limit) = settings.max_redirects {
        builder = builder.redirect(if limit == 0 { Policy::none() } else { Policy::limited(limit) });
    }
    if !settings.keep_alive {
        builder = builder.pool_max_idle_per_host(0);
    }
    builder
        .build()
        .map_err(|e| MeshError::Configuration(format!("Failed to build HTTP client: {}", e)))
}

fn verb(method: Method) -> reqwest::Method {
    match method {
        Method::Find | Method::Get => reqwest::Method::GET,
        Method::Create => reqwest::Method::POST,
        Method::Update => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Remove => reqwest::Method::DELETE,
    }
}

fn map_reqwest_error(error: reqwest::Error) -> RequestError {
    if error.is_timeout() {
        warn!("HTTP request timed out: {}", error);
        return RequestError::aborted("ECONNABORTED", error.to_string());
    }
    RequestError::network(error.to_string())
}

/// Response body as JSON, or as a string when it is not JSON
fn decode_body(body: &[u8]) -> Value {
    if body.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(body).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
}

fn string_param(params: &Params, name: &str) -> Option<String> {
    params.get(name).and_then(Value::as_str).map(str::to_string)
}

fn parse_port(value: &Value) -> Result<u16, ServiceError> {
    let port = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse::<u64>().ok(),
        _ => None,
    };
    match port {
        Some(p) if (1..=65535).contains(&p) => Ok(p as u16),
        _ => Err(ServiceError::bad_request(format!("Invalid port {}", id_to_string(value)))),
    }
}
