use axum::{Extension, Json, extract::State};
use tracing::warn;

use duet_types::models::UserProfile;

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;
use crate::middleware::AuthUser;

/// GET /api/messages/users: everyone the caller can chat with.
pub async fn get_users_for_sidebar(
    State(state): State<AppState>,
    Extension(AuthUser(me)): Extension<AuthUser>,
) -> Result<Json<Vec<UserProfile>>, ApiError> {
    let db = state.clone();
    let my_id = me.id.to_string();
    let rows = blocking(move || db.db.list_users_except(&my_id)).await?;

    let users = rows
        .iter()
        .filter_map(|row| match row.to_profile() {
            Ok(profile) => Some(profile),
            Err(e) => {
                warn!("Skipping corrupt user row '{}': {:#}", row.id, e);
                None
            }
        })
        .collect();

    Ok(Json(users))
}
