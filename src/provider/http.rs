use std::any::Any;
use std::sync::Arc;
use std::sync::RwLock;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::header::HeaderName;
use reqwest::header::HeaderValue;
use reqwest::header::ACCEPT_ENCODING;
use reqwest::header::CONNECTION;
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use reqwest::StatusCode;
use tokio::sync::Semaphore;
use tracing::error;
use tracing::warn;

use super::location::LocationMatcher;
use super::resolver::build_query;
use super::resolver::resolve_request_target;
use super::resolver::SrvUrlMap;
use super::Provider;
use crate::constants::*;
use crate::errors::Error;
use crate::errors::Result;
use crate::rpc::Context;
use crate::rpc::DeserializeMode;
use crate::rpc::Exception;
use crate::rpc::RequestBody;
use crate::rpc::ResponseValue;
use crate::rpc::RpcRequest;
use crate::rpc::RpcResponse;
use crate::rpc::Serialization;
use crate::rpc::Url;

const SERVICE_UNAVAILABLE: u16 = 503;

/// Translates RPC calls into outbound HTTP requests.
///
/// Wiring order: construct, inject collaborators through the setters, then
/// `initialize()` once before serving calls.
pub struct HttpProvider {
    url: RwLock<Url>,
    context: Option<Arc<Context>>,
    serialization: Option<Arc<dyn Serialization>>,
    location_matcher: Option<Arc<dyn LocationMatcher>>,
    mix_vars: Vec<String>,
    srv_url_map: SrvUrlMap,
    proxy_address: String,
    proxy_schema: String,
    max_connections: usize,
    /// Bounded shared client for transparent proxying
    proxy_client: Option<reqwest::Client>,
    proxy_permits: Option<Arc<Semaphore>>,
    /// Shared pool for rewrite-mode calls; the deadline is per call
    rewrite_client: reqwest::Client,
}

impl HttpProvider {
    pub fn new(url: Url) -> Self {
        Self {
            url: RwLock::new(url),
            context: None,
            serialization: None,
            location_matcher: None,
            mix_vars: Vec::new(),
            srv_url_map: SrvUrlMap::new(),
            proxy_address: String::new(),
            proxy_schema: DEFAULT_PROXY_SCHEMA.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS as usize,
            proxy_client: None,
            proxy_permits: None,
            rewrite_client: reqwest::Client::new(),
        }
    }

    /// Expands the `http-service` section and builds the bounded proxy
    /// client from the provider URL's parameters.
    pub fn initialize(&mut self) {
        if let Some(context) = &self.context {
            self.srv_url_map = context.config.expanded_http_service();
        }
        let url = self.url.read().expect("provider url lock poisoned").clone();
        self.proxy_address = url.param_or(PROXY_ADDRESS_KEY, "");
        self.proxy_schema = url.param_or(PROXY_SCHEMA_KEY, DEFAULT_PROXY_SCHEMA);
        self.max_connections =
            url.positive_int_param(MAX_CONNECTIONS_KEY, DEFAULT_MAX_CONNECTIONS) as usize;
        self.proxy_permits = Some(Arc::new(Semaphore::new(self.max_connections)));

        let request_timeout = Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS);
        match reqwest::Client::builder()
            .connect_timeout(request_timeout)
            .timeout(request_timeout)
            .pool_max_idle_per_host(self.max_connections)
            .build()
        {
            Ok(client) => self.proxy_client = Some(client),
            Err(e) => error!("build proxy http client failed: {}", e),
        }
    }

    pub fn set_context(
        &mut self,
        context: Arc<Context>,
    ) {
        self.context = Some(context);
    }

    pub fn set_serialization(
        &mut self,
        serialization: Arc<dyn Serialization>,
    ) {
        self.serialization = Some(serialization);
    }

    pub fn set_location_matcher(
        &mut self,
        matcher: Arc<dyn LocationMatcher>,
    ) {
        self.location_matcher = Some(matcher);
    }

    pub fn mix_vars(&self) -> &[String] {
        &self.mix_vars
    }

    pub fn set_mix_vars(
        &mut self,
        mix_vars: Vec<String>,
    ) {
        self.mix_vars = mix_vars;
    }

    pub fn set_proxy(
        &mut self,
        _proxy: bool,
    ) {
    }

    pub fn set_service(
        &mut self,
        _service: Box<dyn Any + Send + Sync>,
    ) {
    }

    /// Transparent proxy: re-issue the raw request against the configured
    /// upstream with the location matcher's rewritten path.
    async fn call_transparent(
        &self,
        request: &RpcRequest,
        ip: &str,
        response: &mut RpcResponse,
    ) -> Result<()> {
        let (header_bytes, body_bytes) = match &request.body {
            RequestBody::Proxy { header, body } => (header.clone(), body.clone()),
            _ => (Bytes::new(), Bytes::new()),
        };
        let (upstream, rewrite_path) = self
            .location_matcher
            .as_ref()
            .and_then(|matcher| matcher.pick(&request.method, true))
            .ok_or(crate::ProviderError::ServiceNotFound)?;
        if upstream != self.path() {
            return Err(crate::ProviderError::ServiceNotFound.into());
        }

        let head = parse_request_head(&header_bytes)?;
        let client = self
            .proxy_client
            .as_ref()
            .ok_or_else(|| crate::ProviderError::Transport("provider not initialized".to_string()))?;
        let permits = self
            .proxy_permits
            .as_ref()
            .ok_or_else(|| crate::ProviderError::Transport("provider not initialized".to_string()))?;
        let _permit = permits
            .acquire()
            .await
            .map_err(|e| crate::ProviderError::Transport(e.to_string()))?;

        let method = Method::from_bytes(head.method.as_bytes())
            .map_err(|e| crate::ProviderError::HeaderParse(e.to_string()))?;
        let target = format!("{}://{}{}", self.proxy_schema, self.proxy_address, rewrite_path);
        let mut builder = client.request(method, target.as_str());
        for (name, value) in &head.headers {
            if name.eq_ignore_ascii_case("connection")
                || name.eq_ignore_ascii_case(FORWARDED_FOR_HEADER)
            {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = builder.header(FORWARDED_FOR_HEADER, ip);

        let upstream_response = builder
            .body(body_bytes)
            .send()
            .await
            .map_err(|e| crate::ProviderError::Transport(e.to_string()))?;
        let status = upstream_response.status();
        let headers = upstream_response.headers().clone();
        let body = upstream_response
            .bytes()
            .await
            .map_err(|e| crate::ProviderError::Transport(e.to_string()))?;

        let head_out = serialize_response_head(status, &headers);
        response.value = ResponseValue::ByteFrames(vec![Bytes::from(head_out), body]);
        Ok(())
    }

    /// Rewrite mode: resolve the target, rebuild the request from the call
    /// arguments and forward normalized headers.
    async fn call_rewrite(
        &self,
        request: &RpcRequest,
        ip: &str,
        response: &mut RpcResponse,
    ) -> Result<()> {
        let url = self.url();
        let (mut http_url, http_method) =
            resolve_request_target(request, &url, &self.srv_url_map)?;
        let query = build_query(request, &self.mix_vars);

        let mut form_body: Option<String> = None;
        if http_method == "GET" {
            http_url = format!("{http_url}?{query}");
        } else if http_method == "POST" {
            let mut serializer = url::form_urlencoded::Serializer::new(String::new());
            for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
                serializer.append_pair(&key, &value);
            }
            form_body = Some(serializer.finish());
        }

        let method = Method::from_bytes(http_method.as_bytes())
            .map_err(|e| crate::ProviderError::Transport(e.to_string()))?;
        let timeout = Duration::from_millis(
            url.positive_int_param(REQUEST_TIMEOUT_KEY, DEFAULT_REQUEST_TIMEOUT_MS),
        );

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/x-www-form-urlencoded"));
        request.attachments.for_each(|key, value| {
            let name = key.replace(MOTAN_HEADER_PREFIX, MOTAN_HEADER_REPLACEMENT);
            match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
                (Ok(name), Ok(value)) => {
                    headers.append(name, value);
                }
                _ => warn!("skip attachment not usable as header. key:{}", key),
            }
        });
        headers.append(FORWARDED_FOR_HEADER, HeaderValue::from_str(ip).unwrap_or(HeaderValue::from_static("")));
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static(""));

        let mut builder = self
            .rewrite_client
            .request(method, http_url.as_str())
            .headers(headers)
            .timeout(timeout);
        if let Some(body) = form_body {
            builder = builder.body(body);
        }

        let upstream_response = builder.send().await.map_err(|e| {
            error!("http call failed. url:{}, err:{}", http_url, e);
            crate::ProviderError::Transport(e.to_string())
        })?;
        let status = upstream_response.status();
        let headers = upstream_response.headers().clone();
        match upstream_response.bytes().await {
            Ok(body) => {
                if body.is_empty() {
                    warn!(
                        "empty http response body. status:{}, request id:{}, url:{}",
                        status, request.request_id, http_url
                    );
                }
                request.attachments.for_each(|key, value| response.attachments.set(key, value));
                for name in headers.keys() {
                    if let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) {
                        response.attachments.set(name.as_str(), value);
                    }
                }
                response.value = ResponseValue::Text(String::from_utf8_lossy(&body).into_owned());
            }
            Err(e) => {
                error!("read http response body failed: {}", e);
                response.exception = Some(Exception {
                    err_code: status.as_u16(),
                    err_type: SERVICE_UNAVAILABLE,
                    err_msg: e.to_string(),
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Provider for HttpProvider {
    fn name(&self) -> &'static str {
        "HTTPProvider"
    }

    fn url(&self) -> Url {
        self.url.read().expect("provider url lock poisoned").clone()
    }

    fn set_url(
        &self,
        url: Url,
    ) {
        *self.url.write().expect("provider url lock poisoned") = url;
    }

    fn path(&self) -> String {
        self.url.read().expect("provider url lock poisoned").path.clone()
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn call(
        &self,
        request: &mut RpcRequest,
    ) -> RpcResponse {
        let start = Instant::now();
        let mut response = RpcResponse::new(request.request_id);

        let proxy = request
            .attachment(HTTP_PROXY_ATTACHMENT)
            .map(|v| v.parse::<bool>().unwrap_or(false))
            .unwrap_or(false);
        let mode = if proxy { DeserializeMode::Proxy } else { DeserializeMode::Rewrite };
        if let Err(e) = request.process_deserializable(self.serialization.as_deref(), mode) {
            fill_exception(&mut response, start, &e);
            return response;
        }

        let ip = request
            .attachment(REMOTE_IP_ATTACHMENT)
            .or_else(|| request.attachment(HOST_ATTACHMENT))
            .unwrap_or_default();

        let outcome = if proxy {
            self.call_transparent(request, &ip, &mut response).await
        } else {
            self.call_rewrite(request, &ip, &mut response).await
        };
        match outcome {
            Ok(()) => response.process_time_ms = start.elapsed().as_millis() as i64,
            Err(e) => fill_exception(&mut response, start, &e),
        }
        response
    }

    fn destroy(&self) {}
}

/// Parsed request line and header lines of a raw HTTP/1.x head.
struct RequestHead {
    method: String,
    headers: Vec<(String, String)>,
}

fn parse_request_head(raw: &[u8]) -> Result<RequestHead> {
    let text = std::str::from_utf8(raw)
        .map_err(|e| crate::ProviderError::HeaderParse(e.to_string()))?;
    let mut lines = text.split("\r\n");
    let request_line = lines
        .next()
        .filter(|line| !line.is_empty())
        .ok_or_else(|| crate::ProviderError::HeaderParse("empty request head".to_string()))?;
    let method = request_line
        .split_whitespace()
        .next()
        .ok_or_else(|| crate::ProviderError::HeaderParse("missing method".to_string()))?;

    let mut headers = Vec::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        let (name, value) = line.split_once(':').ok_or_else(|| {
            crate::ProviderError::HeaderParse(format!("malformed header line: {line}"))
        })?;
        headers.push((name.trim().to_string(), value.trim().to_string()));
    }
    Ok(RequestHead {
        method: method.to_string(),
        headers,
    })
}

/// Serializes an upstream status line and headers back into raw bytes,
/// dropping hop-by-hop `Connection`.
fn serialize_response_head(
    status: StatusCode,
    headers: &HeaderMap,
) -> Vec<u8> {
    let mut head = format!(
        "HTTP/1.1 {} {}\r\n",
        status.as_u16(),
        status.canonical_reason().unwrap_or("")
    );
    for (name, value) in headers {
        if *name == CONNECTION {
            continue;
        }
        head.push_str(name.as_str());
        head.push_str(": ");
        head.push_str(value.to_str().unwrap_or(""));
        head.push_str("\r\n");
    }
    head.push_str("\r\n");
    head.into_bytes()
}

fn fill_exception(
    response: &mut RpcResponse,
    start: Instant,
    err: &Error,
) {
    response.process_time_ms = start.elapsed().as_millis() as i64;
    response.exception = Some(Exception {
        err_code: SERVICE_UNAVAILABLE,
        err_type: SERVICE_UNAVAILABLE,
        err_msg: err.to_string(),
    });
}
