//! Rendering engine connectivity.
//!
//! `EngineTarget` is the parsed engine address used both for streamed
//! passthrough peers and for buffered exchanges. Buffered exchanges go through
//! the `Upstream` seam, implemented over a shared reqwest client.

use crate::config::{Config, OwsError, Result};
use crate::core::proxy::headers::strip_hop_by_hop;
use async_trait::async_trait;
use bytes::Bytes;
use http::HeaderMap;
use http::header::{CONTENT_LENGTH, HOST};
use pingora::http::RequestHeader;
use tracing::{debug, error};
use url::Url;

/// Engine address split into the parts the proxy needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineTarget {
    pub tls: bool,
    pub host: String,
    pub port: u16,
    /// Request path of the OWS endpoint on the engine.
    pub path: String,
    origin: String,
}

impl EngineTarget {
    /// # Errors
    ///
    /// Returns `OwsError::Config` if `engine_url` is not an absolute http(s) URL.
    pub fn parse(engine_url: &str) -> Result<Self> {
        let url = Url::parse(engine_url)
            .map_err(|e| OwsError::Config(format!("invalid ENGINE_URL: {e}")))?;
        let tls = match url.scheme() {
            "http" => false,
            "https" => true,
            other => {
                return Err(OwsError::Config(format!(
                    "unsupported ENGINE_URL scheme: {other}"
                )));
            }
        };
        let host = url
            .host_str()
            .ok_or_else(|| OwsError::Config("ENGINE_URL has no host".to_string()))?
            .to_string();
        let port = url
            .port_or_known_default()
            .ok_or_else(|| OwsError::Config("ENGINE_URL has no port".to_string()))?;

        Ok(Self {
            tls,
            host,
            port,
            path: url.path().to_string(),
            origin: url.origin().ascii_serialization(),
        })
    }

    /// `host:port`, suitable for DNS resolution.
    #[must_use]
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Absolute engine URL for an origin-form request target.
    #[must_use]
    pub fn url_for(&self, path_and_query: &str) -> String {
        format!("{}{}", self.origin, path_and_query)
    }

    /// TLS server name for the peer; empty for plain HTTP.
    #[must_use]
    pub fn sni(&self) -> String {
        if self.tls {
            self.host.clone()
        } else {
            String::new()
        }
    }
}

/// Fully buffered upstream response.
#[derive(Debug, Clone, Default)]
pub struct EngineResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Buffered HTTP exchanges with the engine and remote map services.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Sends a directed request (origin-form URI) to the engine.
    async fn exchange(&self, request: &RequestHeader, body: Bytes) -> Result<EngineResponse>;

    /// Fetches an absolute URL with the given headers.
    async fn fetch(&self, url: &str, headers: HeaderMap) -> Result<EngineResponse>;
}

/// Reqwest-backed `Upstream`, built once at startup.
#[derive(Debug, Clone)]
pub struct EngineClient {
    client: reqwest::Client,
    target: EngineTarget,
}

impl EngineClient {
    /// # Errors
    ///
    /// Returns `OwsError::Config` if the engine URL is invalid or the HTTP
    /// client cannot be built.
    pub fn new(config: &Config) -> Result<Self> {
        let target = EngineTarget::parse(&config.engine_url)?;
        let client = reqwest::Client::builder()
            .timeout(config.engine_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy()
            .build()
            .map_err(|e| OwsError::Config(format!("failed to build engine client: {e}")))?;
        Ok(Self { client, target })
    }

    #[must_use]
    pub const fn target(&self) -> &EngineTarget {
        &self.target
    }
}

fn upstream_error(err: &reqwest::Error) -> OwsError {
    if err.is_timeout() {
        OwsError::UpstreamTimeout
    } else {
        OwsError::Upstream(err.to_string())
    }
}

async fn read_response(response: reqwest::Response) -> Result<EngineResponse> {
    let status = response.status().as_u16();
    let headers = response.headers().clone();
    let body = response.bytes().await.map_err(|e| {
        error!(error = %e, "Failed to read upstream body");
        upstream_error(&e)
    })?;
    Ok(EngineResponse {
        status,
        headers,
        body,
    })
}

#[async_trait]
impl Upstream for EngineClient {
    async fn exchange(&self, request: &RequestHeader, body: Bytes) -> Result<EngineResponse> {
        let target = request
            .uri
            .path_and_query()
            .map_or("/", http::uri::PathAndQuery::as_str);
        let url = self.target.url_for(target);

        let mut headers = request.headers.clone();
        strip_hop_by_hop(&mut headers);
        headers.remove(CONTENT_LENGTH);

        debug!(method = %request.method, body_len = body.len(), "Engine exchange");
        let response = self
            .client
            .request(request.method.clone(), url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Engine request failed");
                upstream_error(&e)
            })?;
        read_response(response).await
    }

    async fn fetch(&self, url: &str, mut headers: HeaderMap) -> Result<EngineResponse> {
        strip_hop_by_hop(&mut headers);
        headers.remove(HOST);

        let response = self
            .client
            .get(url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Remote service request failed");
                upstream_error(&e)
            })?;
        read_response(response).await
    }
}
