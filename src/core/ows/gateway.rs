//! OWS request orchestration.
//!
//! Resolves the project behind a request, applies the project access gate and
//! runs the branch picked by [`Dispatch`]: rewritten capabilities, authorized
//! transactions, or a directed passthrough. Nothing is kept between requests.

use crate::config::{Config, OwsError, Result};
use crate::core::ows::authorize::TransactionAuthorizer;
use crate::core::ows::capabilities::{CapabilityRewriter, ensure_identity_encoding};
use crate::core::ows::params::{Dispatch, OwsRequestParams};
use crate::core::ows::transaction;
use crate::core::proxy::director::{Director, OWS_URL_HEADER};
use crate::core::proxy::engine::{EngineResponse, EngineTarget, Upstream};
use crate::core::proxy::router::ProjectRoute;
use crate::features::projects::{ProjectSettings, ProjectStore, StoreError};
use crate::security::{AccessDecision, Identity, IdentityResolver, check_project_access};
use bytes::Bytes;
use http::HeaderMap;
use http::header::CONTENT_ENCODING;
use pingora::http::RequestHeader;
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{debug, error, warn};
use url::form_urlencoded;

/// Per-request state of an OWS call, produced by [`OwsGateway::open`].
#[derive(Debug, Clone)]
pub struct OwsRequest {
    /// Store key, `user/project`.
    pub project: String,
    pub params: OwsRequestParams,
    pub dispatch: Dispatch,
    pub identity: Identity,
    pub settings: ProjectSettings,
    /// Internal project file path sent to the engine as `MAP`.
    pub map_path: String,
}

/// Gateway service, constructed once at startup and shared by all requests.
pub struct OwsGateway {
    store: Arc<dyn ProjectStore>,
    identity: Arc<dyn IdentityResolver>,
    upstream: Arc<dyn Upstream>,
    director: Director,
    rewriter: CapabilityRewriter,
    max_body_size: usize,
}

fn store_error(project: &str, err: StoreError) -> OwsError {
    let err = OwsError::from(err);
    if matches!(err, OwsError::NotFound(_)) {
        warn!(project, "Project not found");
    } else {
        error!(project, error = %err, "Failed to load project metadata");
    }
    err
}

fn director_error(err: &pingora::Error) -> OwsError {
    warn!(error = %err, "Failed to direct request");
    OwsError::BadRequest("Invalid request".to_string())
}

impl OwsGateway {
    #[must_use]
    pub fn new(
        config: &Config,
        engine: &EngineTarget,
        store: Arc<dyn ProjectStore>,
        identity: Arc<dyn IdentityResolver>,
        upstream: Arc<dyn Upstream>,
    ) -> Self {
        let director = Director::new(
            engine,
            &config.publish_root,
            identity.header_name().cloned(),
        );
        Self {
            store,
            identity,
            upstream,
            director,
            rewriter: CapabilityRewriter::new(),
            max_body_size: config.max_transaction_body_size,
        }
    }

    /// Largest request body the gateway buffers.
    #[must_use]
    pub const fn max_body_size(&self) -> usize {
        self.max_body_size
    }

    /// Classifies the request and resolves its project and caller.
    ///
    /// # Errors
    ///
    /// `BadRequest` for conflicting parameters, `NotFound` for unknown projects,
    /// `Unauthorized`/`Forbidden` when the access gate refuses the caller.
    pub async fn open(&self, route: &ProjectRoute, req: &RequestHeader) -> Result<OwsRequest> {
        let params = OwsRequestParams::from_query(req.uri.query())?;
        let dispatch = params.dispatch();

        let project = route.name();
        let info = self
            .store
            .project_info(&project)
            .await
            .map_err(|e| store_error(&project, e))?;
        let settings = self
            .store
            .settings(&project)
            .await
            .map_err(|e| store_error(&project, e))?;

        let identity = self.identity.resolve(&req.headers);
        Self::check_access(&settings, route, &identity)?;

        debug!(
            project = %project,
            service = %params.service,
            request = %params.request,
            dispatch = ?dispatch,
            "OWS request classified"
        );

        let map_path = self.director.map_path(&project, &info.qgis_file);
        Ok(OwsRequest {
            project,
            params,
            dispatch,
            identity,
            settings,
            map_path,
        })
    }

    fn check_access(settings: &ProjectSettings, route: &ProjectRoute, identity: &Identity) -> Result<()> {
        match check_project_access(settings, &route.user, identity) {
            AccessDecision::Granted => Ok(()),
            AccessDecision::Unauthenticated => {
                warn!(project = %route.name(), "Project requires authentication");
                Err(OwsError::Unauthorized)
            }
            AccessDecision::Denied => {
                warn!(
                    project = %route.name(),
                    user = identity.username().unwrap_or_default(),
                    "Project access denied"
                );
                Err(OwsError::Forbidden("project access".to_string()))
            }
        }
    }

    /// Fetches the capability document and rewrites its service references
    /// onto the inbound path.
    ///
    /// # Errors
    ///
    /// Upstream failures, or `Rewrite` if the document cannot be rewritten.
    pub async fn get_capabilities(
        &self,
        ows: &OwsRequest,
        req: &RequestHeader,
        body: Bytes,
    ) -> Result<EngineResponse> {
        let mut outbound = req.clone();
        self.director
            .direct(&mut outbound, &ows.map_path)
            .map_err(|e| director_error(&e))?;
        Director::mark_capabilities(&mut outbound, req.uri.path()).map_err(|e| director_error(&e))?;

        let mut response = self.upstream.exchange(&outbound, body).await?;

        let ows_path = outbound
            .headers
            .get(OWS_URL_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_else(|| req.uri.path());
        let encoding = response
            .headers
            .get(CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok());
        ensure_identity_encoding(encoding).inspect_err(|e| {
            error!(project = %ows.project, error = %e, "Capabilities not rewritable");
        })?;

        let rewritten = match self
            .rewriter
            .rewrite(&response.body, ows_path)
            .inspect_err(|e| error!(project = %ows.project, error = %e, "Capabilities rewrite failed"))?
        {
            Cow::Borrowed(_) => None,
            Cow::Owned(body) => Some(Bytes::from(body)),
        };
        if let Some(body) = rewritten {
            response.body = body;
        }
        Ok(response)
    }

    /// Parses and authorizes a WFS transaction, then forwards the identical
    /// body. Nothing reaches the engine unless every operation is permitted.
    ///
    /// # Errors
    ///
    /// `PayloadTooLarge`, `BadRequest` for undecipherable bodies, `Forbidden`
    /// for the first denied operation, or upstream failures.
    pub async fn submit_transaction(
        &self,
        ows: &OwsRequest,
        req: &RequestHeader,
        body: Bytes,
    ) -> Result<EngineResponse> {
        if body.len() > self.max_body_size {
            return Err(OwsError::PayloadTooLarge {
                limit: self.max_body_size,
            });
        }

        let tx = transaction::parse(&body).map_err(|e| {
            warn!(project = %ows.project, error = %e, "Rejected WFS transaction");
            OwsError::from(e)
        })?;
        let layers = self
            .store
            .layers_data(&ows.project)
            .await
            .map_err(|e| store_error(&ows.project, e))?;
        TransactionAuthorizer::new(&ows.settings, &layers, &ows.identity).authorize(&tx)?;
        debug!(
            project = %ows.project,
            operations = tx.operations.len(),
            "WFS transaction authorized"
        );

        let mut outbound = req.clone();
        self.director
            .direct(&mut outbound, &ows.map_path)
            .map_err(|e| director_error(&e))?;
        self.upstream.exchange(&outbound, body).await
    }

    /// Forwards a buffered passthrough request. The engine also reads the
    /// operation from XML request bodies, so a body rooted at `Transaction`
    /// is authorized like any other transaction whatever the query says.
    ///
    /// # Errors
    ///
    /// Transaction errors as in [`Self::submit_transaction`], or upstream failures.
    pub async fn forward(
        &self,
        ows: &OwsRequest,
        req: &RequestHeader,
        body: Bytes,
    ) -> Result<EngineResponse> {
        if transaction::is_transaction(&body) {
            debug!(
                project = %ows.project,
                request = %ows.params.request,
                "Transaction body on passthrough request"
            );
            return self.submit_transaction(ows, req, body).await;
        }

        let mut outbound = req.clone();
        self.director
            .direct(&mut outbound, &ows.map_path)
            .map_err(|e| director_error(&e))?;
        self.upstream.exchange(&outbound, body).await
    }

    /// Directs a streamed passthrough request.
    ///
    /// # Errors
    ///
    /// Returns an error if the directed URI or headers are invalid.
    pub fn direct(&self, map_path: &str, req: &mut RequestHeader) -> pingora::Result<()> {
        self.director.direct(req, map_path)
    }

    /// Fetches the capabilities of a layer's remote source service.
    ///
    /// Only `Accept*` headers of the inbound request are forwarded.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown projects, `BadRequest` for a missing or unknown
    /// `LAYER`, access gate refusals, or upstream failures.
    pub async fn layer_capabilities(
        &self,
        route: &ProjectRoute,
        req: &RequestHeader,
    ) -> Result<EngineResponse> {
        let project = route.name();
        self.store
            .project_info(&project)
            .await
            .map_err(|e| store_error(&project, e))?;
        let settings = self
            .store
            .settings(&project)
            .await
            .map_err(|e| store_error(&project, e))?;
        let identity = self.identity.resolve(&req.headers);
        Self::check_access(&settings, route, &identity)?;

        let layers = self
            .store
            .layers_data(&project)
            .await
            .map_err(|e| store_error(&project, e))?;

        let layer_name = form_urlencoded::parse(req.uri.query().unwrap_or_default().as_bytes())
            .find(|(key, _)| key == "LAYER")
            .map(|(_, value)| value.into_owned())
            .unwrap_or_default();
        if layer_name.is_empty() {
            return Err(OwsError::BadRequest("Missing LAYER parameter".to_string()));
        }
        let meta = layers
            .find_by_name(&layer_name)
            .ok_or_else(|| OwsError::BadRequest("Unknown LAYER name".to_string()))?;
        let url = meta
            .source_url()
            .ok_or_else(|| OwsError::BadRequest("Layer has no remote source".to_string()))?;

        let mut headers = HeaderMap::new();
        for (name, value) in &req.headers {
            if name.as_str().starts_with("accept") {
                headers.append(name.clone(), value.clone());
            }
        }

        debug!(project = %project, layer = %layer_name, "Fetching remote layer capabilities");
        self.upstream.fetch(url, headers).await
    }
}
