//! Proxy service logic.
//!
//! Routes requests, answers the buffered OWS branches directly, and streams
//! body-less passthrough requests to the rendering engine through pingora.

use crate::config::{Config, OwsError};
use crate::core::ows::{Dispatch, OwsGateway, OwsRequest};
use crate::core::proxy::engine::{EngineResponse, EngineTarget};
use crate::core::proxy::headers::strip_engine_headers;
use crate::core::proxy::response::{serve_error, serve_response, serve_text};
use crate::core::proxy::router::{ProjectRoute, Route};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use pingora::http::{RequestHeader, ResponseHeader};
use pingora::proxy::{ProxyHttp, Session};
use pingora::upstreams::peer::HttpPeer;
use pingora::{Error, ErrorType, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Context for a single request.
#[derive(Debug, Default)]
pub struct OwsCtx {
    pub project: Option<String>,
    pub service: String,
    pub request: String,
    /// Set for streamed passthrough requests only.
    pub map_path: Option<String>,
}

/// Main proxy service implementing `ProxyHttp`.
pub struct OwsProxy {
    config: Arc<Config>,
    gateway: Arc<OwsGateway>,
    engine: EngineTarget,
}

/// Reads the whole request body, refusing anything above `limit` bytes.
async fn read_body(session: &mut Session, limit: usize) -> std::result::Result<Bytes, OwsError> {
    let declared = session
        .req_header()
        .headers
        .get(http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared.is_some_and(|len| len > limit) {
        return Err(OwsError::PayloadTooLarge { limit });
    }

    let mut body = BytesMut::new();
    loop {
        match session.read_request_body().await {
            Ok(Some(chunk)) => {
                if body.len() + chunk.len() > limit {
                    return Err(OwsError::PayloadTooLarge { limit });
                }
                body.extend_from_slice(&chunk);
            }
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Failed to read request body");
                return Err(OwsError::BadRequest("Failed to read request body".to_string()));
            }
        }
    }
    Ok(body.freeze())
}

fn carries_body(req: &RequestHeader) -> bool {
    !matches!(req.method, http::Method::GET | http::Method::HEAD)
}

fn is_loopback(session: &Session) -> bool {
    session.client_addr().is_some_and(|addr| {
        if let pingora::protocols::l4::socket::SocketAddr::Inet(inet) = addr {
            inet.ip().is_loopback()
        } else {
            false
        }
    })
}

impl OwsProxy {
    #[must_use]
    pub const fn new(config: Arc<Config>, gateway: Arc<OwsGateway>, engine: EngineTarget) -> Self {
        Self {
            config,
            gateway,
            engine,
        }
    }

    /// Resolves the engine address into a peer.
    ///
    /// # Errors
    ///
    /// Returns a 502 error if the engine host cannot be resolved.
    pub async fn engine_peer(&self) -> Result<Box<HttpPeer>> {
        let authority = self.engine.authority();
        let addr = tokio::net::lookup_host(authority.as_str())
            .await
            .map_err(|e| {
                warn!(engine = %authority, error = %e, "Engine address resolution failed");
                Error::explain(ErrorType::HTTPStatus(502), "engine address resolution failed")
            })?
            .next()
            .ok_or_else(|| {
                Error::explain(ErrorType::HTTPStatus(502), "engine address resolved to nothing")
            })?;

        let mut peer = HttpPeer::new(addr, self.engine.tls, self.engine.sni());
        peer.options.connection_timeout = Some(self.config.engine_timeout);
        peer.options.read_timeout = Some(self.config.engine_timeout);
        Ok(Box::new(peer))
    }

    async fn respond(
        session: &mut Session,
        result: std::result::Result<EngineResponse, OwsError>,
        realm: Option<&str>,
    ) -> Result<bool> {
        match result {
            Ok(response) => serve_response(session, response).await,
            Err(e) => serve_error(session, &e, realm).await,
        }
    }

    async fn buffered(
        &self,
        session: &mut Session,
        ows: &OwsRequest,
    ) -> std::result::Result<EngineResponse, OwsError> {
        let body = read_body(session, self.gateway.max_body_size()).await?;
        let req = session.req_header();
        match ows.dispatch {
            Dispatch::Capabilities => self.gateway.get_capabilities(ows, req, body).await,
            Dispatch::Transaction => self.gateway.submit_transaction(ows, req, body).await,
            Dispatch::Passthrough => self.gateway.forward(ows, req, body).await,
        }
    }

    async fn handle_ows(
        &self,
        session: &mut Session,
        ctx: &mut OwsCtx,
        route: &ProjectRoute,
    ) -> Result<bool> {
        let realm = Some(self.config.auth_realm.as_str());
        let ows = match self.gateway.open(route, session.req_header()).await {
            Ok(ows) => ows,
            Err(e) => return serve_error(session, &e, realm).await,
        };
        ctx.project = Some(ows.project.clone());
        ctx.service.clone_from(&ows.params.service);
        ctx.request.clone_from(&ows.params.request);

        // Request bodies may carry the operation themselves, so only
        // body-less passthrough requests are streamed.
        if ows.dispatch == Dispatch::Passthrough && !carries_body(session.req_header()) {
            ctx.map_path = Some(ows.map_path);
            return Ok(false);
        }

        let result = self.buffered(session, &ows).await;
        Self::respond(session, result, realm).await
    }

    async fn handle_layer_capabilities(
        &self,
        session: &mut Session,
        ctx: &mut OwsCtx,
        route: &ProjectRoute,
    ) -> Result<bool> {
        ctx.project = Some(route.name());
        let result = self
            .gateway
            .layer_capabilities(route, session.req_header())
            .await;
        Self::respond(session, result, None).await
    }
}

#[async_trait]
impl ProxyHttp for OwsProxy {
    type CTX = OwsCtx;

    fn new_ctx(&self) -> Self::CTX {
        OwsCtx::default()
    }

    async fn request_filter(&self, session: &mut Session, ctx: &mut Self::CTX) -> Result<bool> {
        match Route::resolve(session.req_header().uri.path()) {
            Route::Ows(route) => self.handle_ows(session, ctx, &route).await,
            Route::LayerCapabilities(route) => {
                self.handle_layer_capabilities(session, ctx, &route).await
            }
            Route::Health if is_loopback(session) => serve_text(session, 200, "OK").await,
            Route::Health | Route::NotFound => {
                let err = OwsError::NotFound(session.req_header().uri.path().to_string());
                serve_error(session, &err, None).await
            }
        }
    }

    async fn upstream_peer(
        &self,
        _session: &mut Session,
        _ctx: &mut Self::CTX,
    ) -> Result<Box<HttpPeer>> {
        self.engine_peer().await
    }

    async fn upstream_request_filter(
        &self,
        _session: &mut Session,
        upstream_request: &mut RequestHeader,
        ctx: &mut Self::CTX,
    ) -> Result<()> {
        let Some(map_path) = ctx.map_path.as_deref() else {
            return Err(Error::explain(
                ErrorType::HTTPStatus(500),
                "passthrough request without project context",
            ));
        };
        self.gateway.direct(map_path, upstream_request)?;
        debug!(uri = %upstream_request.uri, "Passthrough directed");
        Ok(())
    }

    async fn response_filter(
        &self,
        _session: &mut Session,
        upstream_response: &mut ResponseHeader,
        _ctx: &mut Self::CTX,
    ) -> Result<()> {
        strip_engine_headers(upstream_response);
        Ok(())
    }

    async fn logging(&self, session: &mut Session, e: Option<&Error>, ctx: &mut Self::CTX) {
        let status = session.response_written().map_or(0, |r| r.status.as_u16());
        let path = session.req_header().uri.path();
        let project = ctx.project.as_deref().unwrap_or("-");

        if let Some(err) = e {
            warn!(project, http_path = %path, error = %err, "Proxy error");
        }
        info!(
            project,
            service = %ctx.service,
            request = %ctx.request,
            status,
            http_path = %path,
            "Request completed"
        );
    }
}
