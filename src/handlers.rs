use crate::config::Config;
use crate::errors::AppError;
use crate::models::*;
use crate::repository::LeadRepository;
use crate::routing::{Resolution, RouteError, RouteTable};
use crate::validation::validate_lead;
use axum::{
    body::Bytes,
    extract::{Query, Request, State},
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use uuid::Uuid;

/// Upper bound on request bodies read by the dispatcher.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

type HandlerFuture = Pin<Box<dyn Future<Output = Result<Response, AppError>> + Send>>;

/// A type-erased route handler stored in the [`RouteTable`].
pub type LeadHandler = Arc<dyn Fn(Arc<AppState>, RouteRequest) -> HandlerFuture + Send + Sync>;

/// What a handler gets to see of the incoming request.
#[derive(Debug)]
pub struct RouteRequest {
    pub uri: Uri,
    pub params: HashMap<String, String>,
    pub body: Bytes,
}

impl RouteRequest {
    fn param(&self, name: &str) -> Result<&str, AppError> {
        self.params
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| AppError::InternalError(format!("route has no `{}` parameter", name)))
    }

    /// The `{lead_id}` parameter. A value that is not a UUID addresses no lead.
    fn lead_id(&self) -> Result<Uuid, AppError> {
        let raw = self.param("lead_id")?;
        Uuid::parse_str(raw).map_err(|_| AppError::lead_not_found(raw))
    }

    fn query<T: DeserializeOwned>(&self) -> Result<T, AppError> {
        Query::<T>::try_from_uri(&self.uri)
            .map(|Query(q)| q)
            .map_err(|e| AppError::BadRequest(e.body_text()))
    }

    fn json<T: DeserializeOwned>(&self) -> Result<T, AppError> {
        serde_json::from_slice(&self.body)
            .map_err(|e| AppError::BadRequest(format!("Invalid JSON body: {}", e)))
    }
}

fn handler<F, Fut, R>(f: F) -> LeadHandler
where
    F: Fn(Arc<AppState>, RouteRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, AppError>> + Send + 'static,
    R: IntoResponse,
{
    Arc::new(move |state: Arc<AppState>, req: RouteRequest| -> HandlerFuture {
        let fut = f(state, req);
        Box::pin(async move { fut.await.map(IntoResponse::into_response) })
    })
}

/// Shared application state injected into handlers.
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Lead storage backend.
    pub repo: Arc<dyn LeadRepository>,
    /// Ranked route table consulted by [`dispatch`].
    pub routes: RouteTable<LeadHandler>,
}

impl AppState {
    pub fn new(config: Config, repo: Arc<dyn LeadRepository>) -> Result<Self, RouteError> {
        let routes = api_routes(config.debug)?;
        Ok(Self {
            config,
            repo,
            routes,
        })
    }
}

/// The full HTTP surface. Registration order has no effect on matching.
pub fn api_routes(debug: bool) -> Result<RouteTable<LeadHandler>, RouteError> {
    let mut table = RouteTable::new()
        .route(Method::GET, "/", handler(root))?
        .route(Method::GET, "/health", handler(health))?
        .route(Method::GET, "/api/v1/health", handler(api_health))?
        .route(Method::GET, "/api/v1/leads/", handler(list_leads))?
        .route(Method::POST, "/api/v1/leads/", handler(create_lead))?
        .route(Method::GET, "/api/v1/leads/{lead_id}", handler(get_lead))?
        .route(Method::PUT, "/api/v1/leads/{lead_id}", handler(update_lead))?
        .route(Method::DELETE, "/api/v1/leads/{lead_id}", handler(delete_lead))?
        .route(Method::GET, "/api/v1/leads/search/", handler(search_leads))?
        .route(
            Method::GET,
            "/api/v1/leads/{lead_id}/tracking",
            handler(get_lead_tracking),
        )?
        .route(
            Method::PATCH,
            "/api/v1/leads/{lead_id}/tracking",
            handler(update_lead_tracking),
        )?;

    if debug {
        table.insert(Method::GET, "/debug/routes", handler(debug_routes))?;
    }
    Ok(table)
}

/// Fallback service for the axum router: resolves every request through the
/// ranked [`RouteTable`] and runs the single handler it selects.
pub async fn dispatch(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let path = parts.uri.path().to_string();

    let (route_handler, params) = match state.routes.resolve(&parts.method, &path) {
        Resolution::Matched(m) => (Arc::clone(m.handler), m.params),
        Resolution::MethodNotAllowed { allowed } => {
            return AppError::MethodNotAllowed {
                method: parts.method,
                path,
                allowed,
            }
            .into_response();
        }
        Resolution::NotFound => return route_not_found(&parts.method, &path),
    };

    let body = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("Failed to read body for {} {}: {}", parts.method, path, e);
            return (
                StatusCode::PAYLOAD_TOO_LARGE,
                Json(json!({ "error": "Request body too large or unreadable" })),
            )
                .into_response();
        }
    };

    let request = RouteRequest {
        uri: parts.uri,
        params,
        body,
    };
    match (*route_handler)(state, request).await {
        Ok(response) => response,
        Err(err) => match err.not_found_detail() {
            Some(detail) => not_found(&parts.method, &path, detail),
            None => err.into_response(),
        },
    }
}

fn route_not_found(method: &Method, path: &str) -> Response {
    tracing::warn!("404 Not Found: {} {}", method, path);
    not_found(method, path, &format!("Endpoint not found: {} {}", method, path))
}

/// 404 body shared by unknown routes and missing records.
fn not_found(method: &Method, path: &str, detail: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "detail": detail,
            "method": method.as_str(),
            "path": path,
        })),
    )
        .into_response()
}

/// Parses listing criteria and fills in the page size.
fn read_criteria(req: &RouteRequest, default_limit: usize) -> Result<LeadQuery, AppError> {
    let mut criteria: LeadQuery = req.query()?;
    criteria.sql_paging(default_limit).map_err(AppError::BadRequest)?;
    criteria.limit = Some(criteria.limit_or(default_limit));
    Ok(criteria)
}

/// GET /
///
/// Service name, version and entry points.
pub async fn root(
    _state: Arc<AppState>,
    _req: RouteRequest,
) -> Result<Json<serde_json::Value>, AppError> {
    Ok(Json(json!({
        "service": "lead-api",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "endpoints": {
            "health": "/api/v1/health",
            "leads": "/api/v1/leads/",
            "search": "/api/v1/leads/search/",
            "lead": "/api/v1/leads/{lead_id}",
            "tracking": "/api/v1/leads/{lead_id}/tracking"
        }
    })))
}

/// GET /health
///
/// Liveness only; does not touch the store.
pub async fn health(
    _state: Arc<AppState>,
    _req: RouteRequest,
) -> Result<Json<serde_json::Value>, AppError> {
    Ok(Json(json!({
        "status": "healthy",
        "service": "lead-api",
        "version": env!("CARGO_PKG_VERSION")
    })))
}

/// GET /api/v1/health
///
/// Health including a store round-trip. Answers 503 when the store is down so
/// deploy checks fail.
pub async fn api_health(
    state: Arc<AppState>,
    _req: RouteRequest,
) -> Result<Response, AppError> {
    let timestamp = chrono::Utc::now().to_rfc3339();
    match state.repo.ping().await {
        Ok(()) => Ok((
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "database": "connected",
                "service": "lead-api",
                "timestamp": timestamp
            })),
        )
            .into_response()),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            Ok((
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "database": "unreachable",
                    "service": "lead-api",
                    "timestamp": timestamp
                })),
            )
                .into_response())
        }
    }
}

/// GET /api/v1/leads/
///
/// Lists leads, optionally filtered by the same criteria as search.
///
/// Results are ordered by `(created_at, id)` so `limit`/`skip` paging is
/// stable across calls. `limit` defaults to 100 and is capped at 500.
///
/// # Returns
/// - 200 with the page of leads
/// - 400 when a query parameter does not parse or `skip` is out of range
pub async fn list_leads(
    state: Arc<AppState>,
    req: RouteRequest,
) -> Result<Json<Vec<Lead>>, AppError> {
    let criteria = read_criteria(&req, DEFAULT_LIST_LIMIT)?;
    tracing::info!("GET /leads - criteria: {:?}", criteria);

    let leads = state.repo.search(&criteria).await?;
    tracing::debug!("Returning {} leads", leads.len());
    Ok(Json(leads))
}

/// GET /api/v1/leads/search/
///
/// Dedicated search. At least one of `q`, `query`, `name`, `industry` or
/// `stage` is required.
///
/// `q` matches name, website, industry and contact email; `name` and
/// `industry` match their own column. All text matching is a
/// case-insensitive substring match on the trimmed term. `limit` defaults
/// to 50.
///
/// # Returns
/// - 200 with matching leads, possibly empty
/// - 400 when no criterion is given or a parameter is invalid
pub async fn search_leads(
    state: Arc<AppState>,
    req: RouteRequest,
) -> Result<Json<Vec<Lead>>, AppError> {
    let criteria = read_criteria(&req, DEFAULT_SEARCH_LIMIT)?;
    if !criteria.has_criteria() {
        return Err(AppError::BadRequest(
            "At least one search criterion required (q, name, industry, or stage)".to_string(),
        ));
    }
    tracing::info!("GET /leads/search - criteria: {:?}", criteria);

    let leads = state.repo.search(&criteria).await?;
    tracing::info!("Search returned {} leads", leads.len());
    Ok(Json(leads))
}

/// POST /api/v1/leads/
///
/// Validates the payload, normalizes website and email, and stores a new
/// lead in stage `new`.
///
/// # Returns
/// - 201 with the stored lead, including its assigned `id`
/// - 400 on malformed JSON, unknown fields or failed validation
pub async fn create_lead(
    state: Arc<AppState>,
    req: RouteRequest,
) -> Result<(StatusCode, Json<Lead>), AppError> {
    let payload: LeadPayload = req.json()?;
    let new_lead = validate_lead(payload)?;

    let lead = state.repo.create(new_lead).await?;
    tracing::info!("Created lead {} ({})", lead.id, lead.name);
    Ok((StatusCode::CREATED, Json(lead)))
}

/// GET /api/v1/leads/{lead_id}
pub async fn get_lead(state: Arc<AppState>, req: RouteRequest) -> Result<Json<Lead>, AppError> {
    let id = req.lead_id()?;
    tracing::info!("GET /leads/{}", id);

    let lead = state.repo.get_by_id(id).await?;
    Ok(Json(lead))
}

/// PUT /api/v1/leads/{lead_id}
///
/// Replaces every descriptive attribute. Tracking is left untouched, as are
/// `id` and `created_at`. Omitted optional fields become null.
///
/// # Returns
/// - 200 with the updated lead
/// - 400 on failed validation
/// - 404 when no lead has this id
pub async fn update_lead(
    state: Arc<AppState>,
    req: RouteRequest,
) -> Result<Json<Lead>, AppError> {
    let id = req.lead_id()?;
    let payload: LeadPayload = req.json()?;
    let new_lead = validate_lead(payload)?;

    let lead = state.repo.update(id, new_lead).await?;
    tracing::info!("Updated lead {}", id);
    Ok(Json(lead))
}

/// DELETE /api/v1/leads/{lead_id}
pub async fn delete_lead(state: Arc<AppState>, req: RouteRequest) -> Result<StatusCode, AppError> {
    let id = req.lead_id()?;
    state.repo.delete(id).await?;
    tracing::info!("Deleted lead {}", id);
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/leads/{lead_id}/tracking
pub async fn get_lead_tracking(
    state: Arc<AppState>,
    req: RouteRequest,
) -> Result<Json<LeadTracking>, AppError> {
    let id = req.lead_id()?;
    let lead = state.repo.get_by_id(id).await?;
    Ok(Json(lead.tracking))
}

/// PATCH /api/v1/leads/{lead_id}/tracking
///
/// Partial update. An empty body is a no-op answered with `{"updated": false}`.
///
/// Absent fields keep their value and explicit `null` clears the nullable
/// ones. Without a `stage`, setting `proposal_sent` or `proposal_generated`
/// to true moves the lead to the matching stage.
///
/// # Returns
/// - 200 with the resulting tracking record
/// - 400 on unknown fields or an unknown stage
/// - 404 when no lead has this id
pub async fn update_lead_tracking(
    state: Arc<AppState>,
    req: RouteRequest,
) -> Result<Response, AppError> {
    let id = req.lead_id()?;
    let update: TrackingUpdate = req.json()?;
    if update.is_empty() {
        return Ok(Json(json!({ "updated": false })).into_response());
    }

    let lead = state
        .repo
        .update_tracking(id, update.with_derived_stage())
        .await?;
    tracing::info!("Lead {} moved to stage {}", id, lead.tracking.stage);
    Ok(Json(lead.tracking).into_response())
}

/// GET /debug/routes
///
/// The route table in resolution order. Registered only when `DEBUG` is on.
pub async fn debug_routes(
    state: Arc<AppState>,
    _req: RouteRequest,
) -> Result<Json<serde_json::Value>, AppError> {
    let routes: Vec<_> = state
        .routes
        .iter()
        .map(|(method, pattern)| json!({ "method": method.as_str(), "path": pattern.as_str() }))
        .collect();
    Ok(Json(json!({
        "total_routes": routes.len(),
        "routes": routes
    })))
}
