pub mod auth;
pub mod error;
pub mod media;
pub mod messages;
pub mod middleware;
pub mod routes;
pub mod users;

use tracing::error;

pub use auth::{AppState, AppStateInner, SessionConfig};
pub use error::ApiError;
pub use routes::router;

/// Run a blocking DB call off the async runtime.
pub(crate) async fn blocking<F, T>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(e.into())
        })?
        .map_err(ApiError::Internal)
}
