use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use server_api::{ApiContext, SyncHandle};
use shared::{
    domain::{ActionRecord, TriggerRecord},
    error::{ApiError, ErrorCode},
    protocol::{
        ActionTriggerRequest, ConfigState, MessageResponse, ObsState, SyncStatus,
        TriggerDescriptor, TriggerEnabledRequest, TriggerOrch,
    },
};
use storage::{Storage, TriggerStore};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use upstream::{ObsStateClient, OrchestratorClient};

mod app_state;
mod config;

use app_state::AppState;
use config::{load_settings, prepare_database_url};

const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

type ApiRejection = (StatusCode, Json<ApiError>);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = load_settings();
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;
    let store: Arc<dyn TriggerStore> = Arc::new(storage);

    let orchestrator_url = settings.orchestrator_url()?;
    let orchestrator = OrchestratorClient::new(orchestrator_url.clone(), settings.http_timeout())
        .context("failed to build orchestrator client")?;
    let obs = ObsStateClient::new(settings.obs_state_url()?, settings.http_timeout())
        .context("failed to build OBS state client")?
        .with_retry_delay(settings.obs_retry_delay());

    let sync = SyncHandle::spawn(store.clone(), Arc::new(orchestrator), settings.sync_debounce());
    if settings.sync_on_startup {
        let sync = sync.clone();
        tokio::spawn(async move {
            if let Err(error) = sync.request().await {
                warn!(%error, "initial configuration sync failed");
            }
        });
    }

    let api = ApiContext {
        store,
        sync,
        obs: Arc::new(obs),
    };
    let app = build_router(Arc::new(AppState { api }));

    let addr: SocketAddr = settings
        .server_bind
        .parse()
        .with_context(|| format!("invalid bind address '{}'", settings.server_bind))?;
    info!(%addr, %orchestrator_url, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        error!(%error, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/getConfigState", get(get_config_state))
        .route("/configState", post(post_config_state))
        .route("/triggers", post(create_trigger).delete(delete_trigger))
        .route("/triggers/enabled", post(set_trigger_enabled))
        .route("/actions", post(create_action).delete(delete_action))
        .route("/obsState", get(obs_state))
        .route("/orchestrator/payload", get(orchestrator_payload))
        .route("/sync", post(sync_now))
        .route("/sync/status", get(sync_status))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

fn reject(err: ApiError) -> ApiRejection {
    let status = match err.code {
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Conflict => StatusCode::CONFLICT,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::SyncFailure => StatusCode::BAD_GATEWAY,
        ErrorCode::UpstreamUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(err))
}

async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, &'static str) {
    match state.api.store.health_check().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(error) => {
            error!(%error, "health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
        }
    }
}

async fn get_config_state(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ConfigState>, ApiRejection> {
    let config = server_api::export_config(&state.api).await.map_err(reject)?;
    Ok(Json(config))
}

async fn post_config_state(
    State(state): State<Arc<AppState>>,
    Json(config): Json<ConfigState>,
) -> Result<Json<MessageResponse>, ApiRejection> {
    let imported = server_api::import_config(&state.api, config)
        .await
        .map_err(reject)?;
    Ok(Json(MessageResponse::new(format!(
        "Configuration saved ({imported} triggers)"
    ))))
}

async fn create_trigger(
    State(state): State<Arc<AppState>>,
    Json(descriptor): Json<TriggerDescriptor>,
) -> Result<(StatusCode, Json<TriggerRecord>), ApiRejection> {
    let trigger = server_api::add_trigger(&state.api, &descriptor)
        .await
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(trigger)))
}

async fn delete_trigger(
    State(state): State<Arc<AppState>>,
    Json(descriptor): Json<TriggerDescriptor>,
) -> Result<Json<MessageResponse>, ApiRejection> {
    let reply = server_api::remove_trigger(&state.api, &descriptor)
        .await
        .map_err(reject)?;
    Ok(Json(reply))
}

async fn set_trigger_enabled(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TriggerEnabledRequest>,
) -> Result<Json<TriggerRecord>, ApiRejection> {
    let trigger = server_api::set_trigger_enabled(&state.api, &request)
        .await
        .map_err(reject)?;
    Ok(Json(trigger))
}

async fn create_action(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ActionTriggerRequest>,
) -> Result<(StatusCode, Json<ActionRecord>), ApiRejection> {
    let action = server_api::add_action(&state.api, &request)
        .await
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(action)))
}

async fn delete_action(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ActionTriggerRequest>,
) -> Result<Json<MessageResponse>, ApiRejection> {
    let reply = server_api::remove_action(&state.api, &request)
        .await
        .map_err(reject)?;
    Ok(Json(reply))
}

/// Relays the OBS receiver's state. Failures answer 503 without a body.
async fn obs_state(State(state): State<Arc<AppState>>) -> Result<Json<ObsState>, StatusCode> {
    server_api::obs_state(&state.api)
        .await
        .map(Json)
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)
}

async fn orchestrator_payload(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<TriggerOrch>>, ApiRejection> {
    let payload = server_api::orchestrator_payload(&state.api)
        .await
        .map_err(reject)?;
    Ok(Json(payload))
}

async fn sync_now(State(state): State<Arc<AppState>>) -> Result<Json<SyncStatus>, ApiRejection> {
    let status = server_api::sync_now(&state.api).await.map_err(reject)?;
    Ok(Json(status))
}

async fn sync_status(State(state): State<Arc<AppState>>) -> Json<SyncStatus> {
    Json(server_api::sync_status(&state.api).await)
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
