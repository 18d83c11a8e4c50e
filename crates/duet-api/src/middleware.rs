use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use jsonwebtoken::{DecodingKey, Validation, decode};

use duet_types::api::Claims;
use duet_types::models::UserProfile;

use crate::auth::{AppState, SESSION_COOKIE};
use crate::blocking;
use crate::error::ApiError;

/// The caller, resolved from their session token. Inserted into request
/// extensions by [`require_auth`].
#[derive(Debug, Clone)]
pub struct AuthUser(pub UserProfile);

/// Resolve the session from `Authorization: Bearer` or the `jwt` cookie and
/// load the user it belongs to.
pub async fn require_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(req.headers())
        .or_else(|| {
            jar.get(SESSION_COOKIE)
                .map(|c| c.value().to_string())
                .filter(|v| !v.is_empty())
        })
        .ok_or(ApiError::Unauthorized("Unauthorized - No token provided"))?;

    let claims = verify_token(&state.jwt_secret, &token)
        .map_err(|_| ApiError::Unauthorized("Unauthorized - Invalid token"))?;

    let db = state.clone();
    let user_id = claims.sub.to_string();
    let row = blocking(move || db.db.get_user_by_id(&user_id))
        .await?
        .ok_or(ApiError::NotFound("User not found"))?;

    req.extensions_mut().insert(AuthUser(row.to_profile()?));
    Ok(next.run(req).await)
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

pub fn verify_token(secret: &str, token: &str) -> jsonwebtoken::errors::Result<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}
