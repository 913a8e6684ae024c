//! # Folio Net
//!
//! HTTP fetching for the offline cache worker and the page controller.
//!
//! ## Design Goals
//!
//! 1. **Async HTTP**: Non-blocking network requests through `reqwest`
//! 2. **Pluggable fetch**: everything above this crate talks to [`Fetch`], so
//!    the worker can be driven by a recording fetcher in tests
//! 3. **Response tainting**: every response is classified as same-origin,
//!    CORS or opaque relative to the requesting document

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, info, trace};
use url::{Origin, Url};

pub mod response_type;

pub use response_type::ResponseType;

/// Errors that can occur in networking.
#[derive(Error, Debug)]
pub enum NetError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

/// Unique identifier for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(u64);

impl RequestId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

/// Request payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    /// Raw bytes.
    Bytes(Bytes),
    /// Text fields sent as `multipart/form-data`.
    Form(Vec<(String, String)>),
}

/// HTTP request.
#[derive(Debug, Clone)]
pub struct Request {
    pub id: RequestId,
    pub url: Url,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<RequestBody>,
    pub timeout: Option<Duration>,
    pub credentials: CredentialsMode,
    pub referrer: Option<Url>,
    /// Origin of the document issuing the request.
    pub origin: Option<Origin>,
}

impl Request {
    fn with_method(method: Method, url: Url, body: Option<RequestBody>) -> Self {
        Self {
            id: RequestId::new(),
            url,
            method,
            headers: HeaderMap::new(),
            body,
            timeout: None,
            credentials: CredentialsMode::SameOrigin,
            referrer: None,
            origin: None,
        }
    }

    /// Create a GET request.
    pub fn get(url: Url) -> Self {
        Self::with_method(Method::GET, url, None)
    }

    /// Create a POST request.
    pub fn post(url: Url, body: Bytes) -> Self {
        Self::with_method(Method::POST, url, Some(RequestBody::Bytes(body)))
    }

    /// Create a POST request carrying multipart form fields.
    pub fn post_form(url: Url, fields: Vec<(String, String)>) -> Self {
        Self::with_method(Method::POST, url, Some(RequestBody::Form(fields)))
    }

    /// Add a header.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set timeout.
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Set referrer.
    pub fn referrer(mut self, referrer: Url) -> Self {
        self.referrer = Some(referrer);
        self
    }

    /// Set the origin of the requesting document.
    pub fn from_origin(mut self, origin: Origin) -> Self {
        self.origin = Some(origin);
        self
    }
}

/// Credentials mode for requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CredentialsMode {
    /// Never send cookies.
    Omit,
    /// Send cookies only for same-origin requests.
    #[default]
    SameOrigin,
    /// Always send cookies.
    Include,
}

/// HTTP response.
///
/// The body is fully buffered, so cloning a response is cheap and yields an
/// independent duplicate that can be stored while the original is returned.
#[derive(Debug, Clone)]
pub struct Response {
    pub request_id: RequestId,
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub response_type: ResponseType,
    pub redirected: bool,
    body: Bytes,
}

impl Response {
    /// Build a same-origin response.
    pub fn new(url: Url, status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            request_id: RequestId::new(),
            url,
            status,
            headers,
            response_type: ResponseType::Basic,
            redirected: false,
            body: body.into(),
        }
    }

    /// Override the response type.
    pub fn with_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }

    /// Check if request was successful (2xx).
    pub fn ok(&self) -> bool {
        self.status.is_success()
    }

    /// Borrow the body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Take the body.
    pub fn into_bytes(self) -> Bytes {
        self.body
    }

    /// Get the body as text.
    pub fn text(&self) -> Result<String, NetError> {
        String::from_utf8(self.body.to_vec()).map_err(|e| NetError::RequestFailed(e.to_string()))
    }

    /// Get the body as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, NetError> {
        serde_json::from_slice(&self.body).map_err(|e| NetError::RequestFailed(e.to_string()))
    }

    /// Value of the `Content-Type` header.
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get("content-type")
            .and_then(|v| v.to_str().ok())
    }
}

/// Anything able to perform a request.
pub trait Fetch: Send + Sync {
    fn fetch(&self, request: Request) -> BoxFuture<'_, Result<Response, NetError>>;
}

/// Resource loader configuration.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// User agent string.
    pub user_agent: String,
    /// Accept-Language header.
    pub accept_language: String,
    /// Client-wide timeout. `None` leaves it to the network stack.
    pub default_timeout: Option<Duration>,
    /// Maximum redirects.
    pub max_redirects: usize,
    /// Enable cookies.
    pub cookies_enabled: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("folio/", env!("CARGO_PKG_VERSION")).to_string(),
            accept_language: "en-US,en;q=0.9".to_string(),
            default_timeout: None,
            max_redirects: 10,
            cookies_enabled: true,
        }
    }
}

/// Resource loader for fetching URLs.
pub struct ResourceLoader {
    client: Client,
    config: LoaderConfig,
}

impl ResourceLoader {
    /// Create a new resource loader.
    pub fn new(config: LoaderConfig) -> Result<Self, NetError> {
        let mut builder = Client::builder()
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .cookie_store(config.cookies_enabled);

        if let Some(timeout) = config.default_timeout {
            builder = builder.timeout(timeout);
        }

        let client = builder
            .build()
            .map_err(|e| NetError::RequestFailed(e.to_string()))?;

        info!("ResourceLoader initialized");

        Ok(Self { client, config })
    }

    /// Fetch a URL.
    pub async fn fetch(&self, request: Request) -> Result<Response, NetError> {
        debug!(url = %request.url, method = %request.method, "Fetching resource");

        let mut req_builder = self
            .client
            .request(request.method.clone(), request.url.clone());

        for (name, value) in request.headers.iter() {
            req_builder = req_builder.header(name, value);
        }

        req_builder = req_builder.header("Accept-Language", &self.config.accept_language);

        if let Some(ref referrer) = request.referrer {
            req_builder = req_builder.header("Referer", referrer.as_str());
        }

        match request.body {
            Some(RequestBody::Bytes(body)) => {
                req_builder = req_builder.body(body);
            }
            Some(RequestBody::Form(fields)) => {
                let form = fields
                    .into_iter()
                    .fold(reqwest::multipart::Form::new(), |form, (name, value)| {
                        form.text(name, value)
                    });
                req_builder = req_builder.multipart(form);
            }
            None => {}
        }

        if let Some(timeout) = request.timeout {
            req_builder = req_builder.timeout(timeout);
        }

        let response = req_builder.send().await?;

        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let redirected = url != request.url;
        let response_type = ResponseType::classify(request.origin.as_ref(), &url, &headers);

        let body = response.bytes().await?;

        trace!(
            url = %url,
            status = %status,
            response_type = %response_type,
            redirected,
            body_len = body.len(),
            "Response received"
        );

        Ok(Response {
            request_id: request.id,
            url,
            status,
            headers,
            response_type,
            redirected,
            body,
        })
    }
}

impl Fetch for ResourceLoader {
    fn fetch(&self, request: Request) -> BoxFuture<'_, Result<Response, NetError>> {
        Box::pin(ResourceLoader::fetch(self, request))
    }
}
