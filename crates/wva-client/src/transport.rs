//! Web service transport.
//!
//! Configuration calls (subscriptions, alarms, endpoint listings, hardware)
//! go through the [`Transport`] trait so the rest of the client never sees
//! HTTP. The caller picks how the body is read with [`ResponseKind`]; the
//! transport does not guess from the payload.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::WvaError;

/// HTTP verb of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Put,
    Post,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }
}

/// How the response body should be returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// Parse the body as JSON.
    Json,
    /// Return the body text untouched.
    Raw,
}

/// A request against the device's web services.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    /// Path below `/ws/`, e.g. `vehicle/data/EngineSpeed`.
    pub path: String,
    pub body: Option<Value>,
    pub expect: ResponseKind,
}

impl Request {
    /// A `GET` whose body is read as JSON.
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: None,
            expect: ResponseKind::Json,
        }
    }

    /// A `PUT` with a JSON body; the response text is returned raw.
    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Put,
            path: path.into(),
            body: Some(body),
            expect: ResponseKind::Raw,
        }
    }

    /// A `DELETE`; the response text is returned raw.
    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            method: Method::Delete,
            path: path.into(),
            body: None,
            expect: ResponseKind::Raw,
        }
    }

    pub fn expect(mut self, kind: ResponseKind) -> Self {
        self.expect = kind;
        self
    }
}

/// Body of a successful response.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Json(Value),
    Raw(String),
}

/// Failure of a single web service call.
#[derive(Debug, Error)]
pub enum TransportError {
    #[cfg(feature = "http-transport")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The device answered with a non-success status.
    #[error("Device returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// A JSON response could not be parsed.
    #[error("Invalid JSON in response: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The transport cannot issue requests at all.
    #[error("Transport unavailable: {0}")]
    Unavailable(String),
}

/// Issues requests against one device.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(&self, request: Request) -> Result<Response, TransportError>;
}

/// Send a request, turning a transport failure into [`WvaError::ConfigurationFailed`].
pub(crate) async fn send(
    transport: &dyn Transport,
    request: Request,
) -> Result<Response, WvaError> {
    let method = request.method;
    let path = request.path.clone();
    debug!("{} {}", method.as_str(), path);

    transport.request(request).await.map_err(|source| {
        warn!("{} {} failed: {}", method.as_str(), path, source);
        WvaError::ConfigurationFailed {
            resource: path,
            source,
        }
    })
}

/// `GET` a resource and return its JSON body.
pub(crate) async fn get_json(transport: &dyn Transport, path: &str) -> Result<Value, WvaError> {
    match send(transport, Request::get(path)).await? {
        Response::Json(value) => Ok(value),
        Response::Raw(text) => {
            serde_json::from_str(&text).map_err(|e| WvaError::unexpected(path, e))
        }
    }
}

/// `PUT` a serializable body, discarding the response text.
pub(crate) async fn put<B: Serialize>(
    transport: &dyn Transport,
    path: &str,
    body: &B,
) -> Result<(), WvaError> {
    let body = serde_json::to_value(body).map_err(|e| WvaError::unexpected(path, e))?;
    send(transport, Request::put(path, body)).await?;
    Ok(())
}

/// `DELETE` a resource, discarding the response text.
pub(crate) async fn delete(transport: &dyn Transport, path: &str) -> Result<(), WvaError> {
    send(transport, Request::delete(path)).await?;
    Ok(())
}

#[cfg(feature = "http-transport")]
pub use http::HttpTransport;

#[cfg(feature = "http-transport")]
mod http {
    use super::*;
    use reqwest::header::ACCEPT;
    use wva_core::DeviceConfig;

    /// reqwest-backed transport for `http(s)://<host>/ws/...`.
    #[derive(Debug, Clone)]
    pub struct HttpTransport {
        client: reqwest::Client,
        base_url: String,
        credentials: Option<(String, Option<String>)>,
    }

    impl HttpTransport {
        pub fn new(config: &DeviceConfig) -> Result<Self, TransportError> {
            let scheme = if config.use_https { "https" } else { "http" };
            let client = reqwest::Client::builder()
                .danger_accept_invalid_certs(config.use_https && config.accept_invalid_certs)
                .build()?;

            Ok(Self {
                client,
                base_url: format!("{}://{}/ws/", scheme, config.hostname),
                credentials: config
                    .username
                    .clone()
                    .map(|user| (user, config.password.clone())),
            })
        }

        /// Full URL of a web service path.
        pub fn url(&self, path: &str) -> String {
            format!("{}{}", self.base_url, path.trim_start_matches('/'))
        }
    }

    #[async_trait]
    impl Transport for HttpTransport {
        async fn request(&self, request: Request) -> Result<Response, TransportError> {
            let method = match request.method {
                Method::Get => reqwest::Method::GET,
                Method::Put => reqwest::Method::PUT,
                Method::Post => reqwest::Method::POST,
                Method::Delete => reqwest::Method::DELETE,
            };

            let mut builder = self
                .client
                .request(method, self.url(&request.path))
                .header(ACCEPT, "application/json");
            if let Some((user, password)) = &self.credentials {
                builder = builder.basic_auth(user, password.as_ref());
            }
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }

            let response = builder.send().await?;
            let status = response.status();
            let text = response.text().await?;
            if !status.is_success() {
                return Err(TransportError::Status {
                    status: status.as_u16(),
                    body: text,
                });
            }

            match request.expect {
                ResponseKind::Json => Ok(Response::Json(serde_json::from_str(&text)?)),
                ResponseKind::Raw => Ok(Response::Raw(text)),
            }
        }
    }
}
