use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use navicue_catalog_api::{
    CatalogApi, FacetRequest, FacetResponse, QueryRequest, QueryResponse, RecommendRequest,
    RecommendResponse, API_CONTRACT_VERSION,
};
use navicue_catalog_core::{CatalogError, CatalogStats, ContentItem};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const SERVICE_CONTRACT_VERSION: &str = "service.v1";
const OPENAPI_YAML: &str = include_str!("../../../openapi/openapi.yaml");

#[derive(Debug, Clone)]
struct ServiceState {
    api: CatalogApi,
}

#[derive(Debug, Clone, Serialize)]
struct ServiceEnvelope<T>
where
    T: Serialize,
{
    service_contract_version: &'static str,
    api_contract_version: &'static str,
    data: T,
}

#[derive(Debug, Clone, Serialize)]
struct ServiceError {
    #[serde(skip)]
    status: StatusCode,
    service_contract_version: &'static str,
    error: String,
}

/// Either inline items or a server-side path; exactly one must be set.
#[derive(Debug, Clone, Default, Deserialize)]
struct LoadRequest {
    #[serde(default)]
    items: Option<Vec<ContentItem>>,
    #[serde(default)]
    path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    status: &'static str,
    total: usize,
}

#[derive(Debug, Parser)]
#[command(name = "navicue-catalog-service")]
#[command(about = "Local HTTP service for the NaviCue catalog")]
struct Args {
    /// Catalog to load at startup.
    #[arg(long, env = "NAVICUE_CATALOG")]
    catalog: Option<PathBuf>,
    #[arg(long, env = "NAVICUE_BIND", default_value = "127.0.0.1:4020")]
    bind: SocketAddr,
    /// Log filter directive; `RUST_LOG` wins when set.
    #[arg(long, env = "NAVICUE_LOG", default_value = "info")]
    log: String,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

impl ServiceState {
    fn error(message: impl Into<String>) -> ServiceError {
        ServiceError {
            status: StatusCode::BAD_REQUEST,
            service_contract_version: SERVICE_CONTRACT_VERSION,
            error: message.into(),
        }
    }

    fn api_error(err: &anyhow::Error) -> ServiceError {
        let status = match err.downcast_ref::<CatalogError>() {
            Some(CatalogError::NotFound(_)) => StatusCode::NOT_FOUND,
            _ => StatusCode::BAD_REQUEST,
        };
        warn!(status = status.as_u16(), error = %err, "request failed");
        ServiceError { status, ..Self::error(format!("{err:#}")) }
    }

    fn join_error(err: &tokio::task::JoinError) -> ServiceError {
        warn!(error = %err, "catalog load task failed");
        ServiceError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            ..Self::error("catalog load task failed")
        }
    }
}

fn envelope<T>(data: T) -> ServiceEnvelope<T>
where
    T: Serialize,
{
    ServiceEnvelope {
        service_contract_version: SERVICE_CONTRACT_VERSION,
        api_contract_version: API_CONTRACT_VERSION,
        data,
    }
}

fn app(state: ServiceState) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/openapi", get(openapi))
        .route("/v1/catalog/load", post(catalog_load))
        .route("/v1/catalog/stats", get(catalog_stats))
        .route("/v1/catalog/items/:id", get(catalog_item))
        .route("/v1/query", post(query))
        .route("/v1/facets", post(facets))
        .route("/v1/recommend", post(recommend))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let api = CatalogApi::new();
    if let Some(path) = &args.catalog {
        api.load_bundle(path)?;
    }

    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    info!(bind = %args.bind, "catalog service listening");
    axum::serve(listener, app(ServiceState { api })).await?;
    Ok(())
}

async fn health(State(state): State<ServiceState>) -> Json<ServiceEnvelope<HealthResponse>> {
    Json(envelope(HealthResponse { status: "ok", total: state.api.stats().total }))
}

async fn openapi() -> impl IntoResponse {
    (StatusCode::OK, [("content-type", "application/yaml; charset=utf-8")], OPENAPI_YAML)
}

async fn catalog_load(
    State(state): State<ServiceState>,
    Json(request): Json<LoadRequest>,
) -> Result<Json<ServiceEnvelope<CatalogStats>>, ServiceError> {
    let stats = match (request.items, request.path) {
        (Some(items), None) => state.api.load_items(items),
        (None, Some(path)) => {
            // File reads and digest checks stay off the async workers.
            let api = state.api.clone();
            tokio::task::spawn_blocking(move || api.load_bundle(&path))
                .await
                .map_err(|err| ServiceState::join_error(&err))?
        }
        _ => return Err(ServiceState::error("exactly one of `items` or `path` MUST be set")),
    }
    .map_err(|err| ServiceState::api_error(&err))?;
    Ok(Json(envelope(stats)))
}

async fn catalog_stats(State(state): State<ServiceState>) -> Json<ServiceEnvelope<CatalogStats>> {
    Json(envelope(state.api.stats()))
}

async fn catalog_item(
    State(state): State<ServiceState>,
    Path(id): Path<String>,
) -> Result<Json<ServiceEnvelope<ContentItem>>, ServiceError> {
    let item = state.api.get_item(&id).map_err(|err| ServiceState::api_error(&err))?;
    Ok(Json(envelope(item)))
}

async fn query(
    State(state): State<ServiceState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<ServiceEnvelope<QueryResponse>>, ServiceError> {
    let response = state.api.query(request).map_err(|err| ServiceState::api_error(&err))?;
    Ok(Json(envelope(response)))
}

async fn facets(
    State(state): State<ServiceState>,
    Json(request): Json<FacetRequest>,
) -> Result<Json<ServiceEnvelope<FacetResponse>>, ServiceError> {
    let response = state.api.facets(request).map_err(|err| ServiceState::api_error(&err))?;
    Ok(Json(envelope(response)))
}

async fn recommend(
    State(state): State<ServiceState>,
    Json(request): Json<RecommendRequest>,
) -> Result<Json<ServiceEnvelope<RecommendResponse>>, ServiceError> {
    let response = state.api.recommend(request).map_err(|err| ServiceState::api_error(&err))?;
    Ok(Json(envelope(response)))
}
