use axum::{
    Router, middleware,
    routing::{get, post, put},
};

use crate::auth::{self, AppState};
use crate::middleware::require_auth;
use crate::{messages, users};

/// All REST routes under `/api`. Everything except signup, login and logout
/// requires a session.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/api/auth/signup", post(auth::signup))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/logout", post(auth::logout));

    let protected_routes = Router::new()
        .route("/api/auth/check", get(auth::check_auth))
        .route("/api/auth/update-profile", put(auth::update_profile))
        .route("/api/messages/users", get(users::get_users_for_sidebar))
        .route("/api/messages/{user_id}", get(messages::get_messages))
        .route("/api/messages/send/{user_id}", post(messages::send_message))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    public_routes.merge(protected_routes).with_state(state)
}
