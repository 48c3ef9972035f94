use std::fmt;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::stream::{self, BoxStream};
use futures_util::{StreamExt, TryStreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::headers::{default_headers, CONTENT_TYPE_EVENT_STREAM};
use crate::url::endpoint_url;

/// Response body chunks as they arrive from the network.
pub type ByteStream = BoxStream<'static, Result<Bytes, ApiError>>;

/// Sends fully described requests. The gateway retries by sending the same
/// [`ApiRequest`] twice, so implementations must not consume shared state
/// from the request.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError>;
}

/// One file attached to a multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    pub field: String,
    pub file_name: String,
    pub mime_type: String,
    pub content: Vec<u8>,
}

/// Request body kept as plain data so the same request can be rebuilt for a retry.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(Value),
    Multipart {
        files: Vec<FilePart>,
        fields: Vec<(String, String)>,
    },
}

#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: RequestBody,
    /// Long-lived responses (event streams) skip the configured timeout.
    pub streaming: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
            streaming: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    pub fn multipart(mut self, files: Vec<FilePart>, fields: Vec<(String, String)>) -> Self {
        self.body = RequestBody::Multipart { files, fields };
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Ask for `text/event-stream` and disable the request timeout.
    pub fn event_stream(mut self) -> Self {
        self.headers
            .insert(ACCEPT, HeaderValue::from_static(CONTENT_TYPE_EVENT_STREAM));
        self.streaming = true;
        self
    }
}

/// Status plus a lazily consumed body.
pub struct ApiResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: ByteStream,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: ByteStream) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body,
        }
    }

    /// Response whose whole body is already in memory.
    pub fn from_bytes(status: StatusCode, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        Self::new(status, stream::once(async move { Ok(body) }).boxed())
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub async fn bytes(self) -> Result<Bytes, ApiError> {
        let collected = self
            .body
            .try_fold(BytesMut::new(), |mut acc, chunk| async move {
                acc.extend_from_slice(&chunk);
                Ok(acc)
            })
            .await?;
        Ok(collected.freeze())
    }

    pub async fn text(self) -> Result<String, ApiError> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub async fn json<T: DeserializeOwned>(self) -> Result<T, ApiError> {
        let bytes = self.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn into_byte_stream(self) -> ByteStream {
        self.body
    }
}

impl fmt::Debug for ApiResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// [`Transport`] backed by `reqwest`, with a cookie jar for the refresh cookie.
#[derive(Debug)]
pub struct HttpTransport {
    http: Client,
    config: ApiConfig,
    default_headers: HeaderMap,
}

impl HttpTransport {
    pub fn new(config: ApiConfig) -> Result<Self, ApiError> {
        let default_headers = default_headers(&config)?;
        endpoint_url(&config.base_url, "/")?;
        let http = Client::builder()
            .cookie_store(true)
            .build()
            .map_err(ApiError::from)?;

        Ok(Self {
            http,
            config,
            default_headers,
        })
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    fn build(&self, request: ApiRequest) -> Result<reqwest::RequestBuilder, ApiError> {
        let url = endpoint_url(&self.config.base_url, &request.path)?;
        let mut headers = self.default_headers.clone();
        headers.extend(request.headers);

        let mut builder = self.http.request(request.method, url).headers(headers);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if !request.streaming {
            if let Some(timeout) = self.config.timeout {
                builder = builder.timeout(timeout);
            }
        }

        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(body) => builder.json(&body),
            RequestBody::Multipart { files, fields } => {
                builder.multipart(multipart_form(files, fields)?)
            }
        };

        Ok(builder)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let method = request.method.clone();
        let path = request.path.clone();
        let response = self.build(request)?.send().await?;
        debug!(%method, %path, status = response.status().as_u16(), "response received");

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes_stream().map_err(ApiError::from).boxed();
        Ok(ApiResponse::new(status, body).with_headers(headers))
    }
}

fn multipart_form(files: Vec<FilePart>, fields: Vec<(String, String)>) -> Result<Form, ApiError> {
    let mut form = Form::new();
    for file in files {
        let part = Part::bytes(file.content)
            .file_name(file.file_name)
            .mime_str(&file.mime_type)?;
        form = form.part(file.field, part);
    }
    for (name, value) in fields {
        form = form.text(name, value);
    }
    Ok(form)
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use futures_util::stream;
    use futures_util::StreamExt;
    use reqwest::StatusCode;

    use super::{ApiRequest, ApiResponse, HttpTransport};
    use crate::config::ApiConfig;
    use crate::error::ApiError;

    #[tokio::test]
    async fn response_text_joins_chunks() {
        let chunks: Vec<Result<Bytes, ApiError>> = vec![
            Ok(Bytes::from_static(b"hel")),
            Ok(Bytes::from_static(b"lo")),
        ];
        let response = ApiResponse::new(StatusCode::OK, stream::iter(chunks).boxed());
        assert_eq!(response.text().await.expect("text"), "hello");
    }

    #[tokio::test]
    async fn response_json_decodes_body() {
        let response = ApiResponse::from_bytes(StatusCode::OK, r#"{"job_id":"j1"}"#);
        let value: serde_json::Value = response.json().await.expect("json");
        assert_eq!(value["job_id"], "j1");
    }

    #[test]
    fn build_applies_base_url_and_query() {
        let transport =
            HttpTransport::new(ApiConfig::new("http://localhost:9/api")).expect("transport");
        let request = transport
            .build(ApiRequest::get("/memory").query("limit", 5).query("offset", 10))
            .expect("builder")
            .build()
            .expect("request");

        assert_eq!(
            request.url().as_str(),
            "http://localhost:9/api/memory?limit=5&offset=10"
        );
        assert_eq!(request.method(), "GET");
    }

    #[test]
    fn event_stream_requests_skip_timeout() {
        let config = ApiConfig::new("http://localhost:9")
            .with_timeout(std::time::Duration::from_secs(5));
        let transport = HttpTransport::new(config).expect("transport");

        let plain = transport
            .build(ApiRequest::get("/me"))
            .expect("builder")
            .build()
            .expect("request");
        assert!(plain.timeout().is_some());

        let streaming = transport
            .build(ApiRequest::post("/runs/stream").event_stream())
            .expect("builder")
            .build()
            .expect("request");
        assert!(streaming.timeout().is_none());
        assert_eq!(streaming.headers()["accept"], "text/event-stream");
    }

    #[test]
    fn new_rejects_invalid_base_url() {
        assert!(HttpTransport::new(ApiConfig::new("nope")).is_err());
    }
}
