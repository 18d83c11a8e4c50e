use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Router,
    extract::{DefaultBodyLimit, Query, State, WebSocketUpgrade},
    http::{
        HeaderValue, Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    response::IntoResponse,
    routing::get,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use duet_api::media::{DisabledMediaStore, HttpMediaStore, MediaStore};
use duet_api::{AppState, AppStateInner, SessionConfig};
use duet_db::Database;
use duet_gateway::Dispatcher;
use duet_gateway::connection::{self, GatewayQuery};

use crate::config::Config;

/// Open the database and wire up the shared state described by `config`.
pub fn build_state(config: &Config) -> Result<AppState> {
    let db = Database::open(&config.db_path)?;

    let media: Arc<dyn MediaStore> = match &config.media_upload_url {
        Some(url) => Arc::new(HttpMediaStore::new(url.clone(), config.media_api_key.clone())?),
        None => {
            info!("DUET_MEDIA_UPLOAD_URL unset, image uploads disabled");
            Arc::new(DisabledMediaStore)
        }
    };

    Ok(Arc::new(AppStateInner {
        db,
        dispatcher: Dispatcher::new(),
        media,
        jwt_secret: config.jwt_secret.clone(),
        session: SessionConfig {
            secure_cookies: !config.dev_mode,
            ..SessionConfig::default()
        },
    }))
}

/// REST routes, the realtime gateway at `/ws` and a `/health` probe.
pub fn build_app(state: AppState, config: &Config) -> Result<Router> {
    let ws_route = Router::new()
        .route("/ws", get(ws_upgrade))
        .with_state(state.dispatcher.clone());

    let cors = match &config.frontend_origin {
        Some(origin) => CorsLayer::new()
            .allow_origin(
                origin
                    .parse::<HeaderValue>()
                    .with_context(|| format!("invalid DUET_FRONTEND_ORIGIN '{}'", origin))?,
            )
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
            .allow_headers([AUTHORIZATION, CONTENT_TYPE])
            .allow_credentials(true),
        None => CorsLayer::permissive(),
    };

    Ok(Router::new()
        .merge(duet_api::router(state))
        .merge(ws_route)
        .route("/health", get(|| async { "ok" }))
        .layer(DefaultBodyLimit::max(config.body_limit_bytes()))
        .layer(cors)
        .layer(TraceLayer::new_for_http()))
}

async fn ws_upgrade(
    State(dispatcher): State<Dispatcher>,
    Query(query): Query<GatewayQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let user_id = query.user_id();
    ws.on_upgrade(move |socket| connection::handle_connection(socket, dispatcher, user_id))
}
