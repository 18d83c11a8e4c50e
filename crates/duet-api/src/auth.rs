use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Extension, Json, extract::State, http::StatusCode};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::info;
use uuid::Uuid;

use duet_db::Database;
use duet_gateway::Dispatcher;
use duet_types::api::{
    AuthResponse, Claims, LoginRequest, MessageBody, SignupRequest, UpdateProfileRequest,
};
use duet_types::models::UserProfile;

use crate::blocking;
use crate::error::ApiError;
use crate::media::MediaStore;
use crate::middleware::AuthUser;

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "jwt";

const MIN_PASSWORD_LEN: usize = 6;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub dispatcher: Dispatcher,
    pub media: Arc<dyn MediaStore>,
    pub jwt_secret: String,
    pub session: SessionConfig,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub token_ttl_days: i64,
    /// Off in development so the cookie works over plain http.
    pub secure_cookies: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            token_ttl_days: 7,
            secure_cookies: true,
        }
    }
}

pub async fn signup(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<SignupRequest>,
) -> Result<(StatusCode, CookieJar, Json<AuthResponse>), ApiError> {
    let fullname = req.fullname.trim().to_string();
    let email = req.email.trim().to_lowercase();

    if fullname.is_empty() || email.is_empty() || req.password.is_empty() {
        return Err(ApiError::bad_request("All fields are required"));
    }
    if !email.contains('@') {
        return Err(ApiError::bad_request("Invalid email"));
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }

    let db = state.clone();
    let password = req.password;
    let row = blocking(move || {
        if db.db.get_user_by_email(&email)?.is_some() {
            return Ok(None);
        }

        // Hash password with Argon2id
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
            .to_string();

        let user_id = Uuid::new_v4().to_string();
        db.db
            .create_user(&user_id, &fullname, &email, &password_hash)
            .map(Some)
    })
    .await?
    .ok_or_else(|| ApiError::bad_request("Email already exists"))?;

    let user = row.to_profile()?;
    info!("New user {} ({})", user.id, user.email);

    let (jar, token) = start_session(&state, jar, &user)?;
    Ok((StatusCode::CREATED, jar, Json(AuthResponse { user, token })))
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<(CookieJar, Json<AuthResponse>), ApiError> {
    let db = state.clone();
    let email = req.email.trim().to_lowercase();
    let password = req.password;

    let row = blocking(move || {
        let Some(user) = db.db.get_user_by_email(&email)? else {
            return Ok(None);
        };

        let parsed_hash = PasswordHash::new(&user.password)
            .map_err(|e| anyhow::anyhow!("corrupt password hash for {}: {}", user.id, e))?;

        // Verify password
        match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
            Ok(()) => Ok(Some(user)),
            Err(_) => Ok(None),
        }
    })
    .await?
    .ok_or_else(|| ApiError::bad_request("Invalid credentials"))?;

    let user = row.to_profile()?;
    let (jar, token) = start_session(&state, jar, &user)?;
    Ok((jar, Json(AuthResponse { user, token })))
}

pub async fn logout(jar: CookieJar) -> (CookieJar, Json<MessageBody>) {
    // Always send an expired cookie, even if the request carried none.
    let expired = Cookie::build((SESSION_COOKIE, ""))
        .path("/")
        .max_age(time::Duration::ZERO)
        .build();
    let jar = jar.add(expired);
    (
        jar,
        Json(MessageBody {
            message: "Logged out successfully".into(),
        }),
    )
}

pub async fn check_auth(Extension(AuthUser(user)): Extension<AuthUser>) -> Json<UserProfile> {
    Json(user)
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<UserProfile>, ApiError> {
    if req.profile_pic.trim().is_empty() {
        return Err(ApiError::bad_request("Profile pic is required"));
    }

    let url = state.media.upload(&req.profile_pic).await?;

    let db = state.clone();
    let user_id = user.id.to_string();
    let row = blocking(move || db.db.update_profile_pic(&user_id, &url))
        .await?
        .ok_or(ApiError::NotFound("User not found"))?;

    Ok(Json(row.to_profile()?))
}

fn start_session(
    state: &AppStateInner,
    jar: CookieJar,
    user: &UserProfile,
) -> Result<(CookieJar, String), ApiError> {
    let token = create_token(&state.jwt_secret, user, state.session.token_ttl_days)?;
    let cookie = Cookie::build((SESSION_COOKIE, token.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .secure(state.session.secure_cookies)
        .max_age(time::Duration::days(state.session.token_ttl_days))
        .build();
    Ok((jar.add(cookie), token))
}

pub fn create_token(secret: &str, user: &UserProfile, ttl_days: i64) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user.id,
        email: user.email.clone(),
        exp: (chrono::Utc::now() + chrono::Duration::days(ttl_days)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, header};
    use serde_json::json;

    use crate::test_support::{TestApp, body_json};

    #[tokio::test]
    async fn signup_sets_cookie_and_returns_profile() {
        let app = TestApp::new();

        let response = app
            .request(Method::POST, "/api/auth/signup", None)
            .json(json!({ "fullname": "Alice", "email": "Alice@Example.com", "password": "hunter22" }))
            .send()
            .await;

        assert_eq!(response.status(), 201);
        let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
        assert!(cookie.starts_with("jwt="));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Strict"));
        assert!(cookie.contains("Max-Age=604800"));

        let body = body_json(response).await;
        assert_eq!(body["email"], "alice@example.com");
        assert_eq!(body["fullname"], "Alice");
        assert_eq!(body["profilePic"], "");
        assert!(body.get("password").is_none());
        assert!(body["token"].as_str().unwrap().len() > 20);
    }

    #[tokio::test]
    async fn signup_validation() {
        let app = TestApp::new();
        app.signup("Alice", "alice@example.com").await;

        let cases = [
            (json!({ "fullname": "", "email": "a@b.c", "password": "hunter22" }), "All fields are required"),
            (json!({ "email": "a@b.c", "password": "hunter22" }), "All fields are required"),
            (json!({ "fullname": "A", "email": "a@b.c", "password": "short" }), "Password must be at least 6 characters"),
            (json!({ "fullname": "A", "email": "nope", "password": "hunter22" }), "Invalid email"),
            (json!({ "fullname": "A", "email": "alice@example.com", "password": "hunter22" }), "Email already exists"),
        ];

        for (payload, message) in cases {
            let response = app
                .request(Method::POST, "/api/auth/signup", None)
                .json(payload)
                .send()
                .await;
            assert_eq!(response.status(), 400);
            assert_eq!(body_json(response).await["message"], message);
        }
    }

    #[tokio::test]
    async fn login_checks_password() {
        let app = TestApp::new();
        let alice = app.signup("Alice", "alice@example.com").await;

        let ok = app
            .request(Method::POST, "/api/auth/login", None)
            .json(json!({ "email": "alice@example.com", "password": "hunter22" }))
            .send()
            .await;
        assert_eq!(ok.status(), 200);
        assert_eq!(body_json(ok).await["id"], alice.id.to_string());

        for (email, password) in [("alice@example.com", "wrong-pass"), ("bob@example.com", "hunter22")] {
            let bad = app
                .request(Method::POST, "/api/auth/login", None)
                .json(json!({ "email": email, "password": password }))
                .send()
                .await;
            assert_eq!(bad.status(), 400);
            assert_eq!(body_json(bad).await["message"], "Invalid credentials");
        }
    }

    #[tokio::test]
    async fn check_accepts_bearer_or_cookie() {
        let app = TestApp::new();
        let alice = app.signup("Alice", "alice@example.com").await;

        let by_bearer = app
            .request(Method::GET, "/api/auth/check", Some(alice.token.as_str()))
            .send()
            .await;
        assert_eq!(by_bearer.status(), 200);
        assert_eq!(body_json(by_bearer).await["email"], "alice@example.com");

        let by_cookie = app
            .request(Method::GET, "/api/auth/check", None)
            .header(header::COOKIE, &format!("jwt={}", alice.token))
            .send()
            .await;
        assert_eq!(by_cookie.status(), 200);
    }

    #[tokio::test]
    async fn check_rejects_missing_or_bad_token() {
        let app = TestApp::new();

        let missing = app.request(Method::GET, "/api/auth/check", None).send().await;
        assert_eq!(missing.status(), 401);
        assert_eq!(body_json(missing).await["message"], "Unauthorized - No token provided");

        let bad = app
            .request(Method::GET, "/api/auth/check", Some("not-a-jwt"))
            .send()
            .await;
        assert_eq!(bad.status(), 401);
        assert_eq!(body_json(bad).await["message"], "Unauthorized - Invalid token");
    }

    #[tokio::test]
    async fn logout_expires_cookie() {
        let app = TestApp::new();
        let response = app.request(Method::POST, "/api/auth/logout", None).send().await;

        assert_eq!(response.status(), 200);
        let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
        assert!(cookie.starts_with("jwt="));
        assert!(cookie.contains("Max-Age=0"));
        assert_eq!(body_json(response).await["message"], "Logged out successfully");
    }

    #[tokio::test]
    async fn update_profile_stores_uploaded_url() {
        let app = TestApp::new();
        let alice = app.signup("Alice", "alice@example.com").await;

        let response = app
            .request(Method::PUT, "/api/auth/update-profile", Some(alice.token.as_str()))
            .json(json!({ "profilePic": "data:image/png;base64,AAAA" }))
            .send()
            .await;
        assert_eq!(response.status(), 200);
        assert_eq!(body_json(response).await["profilePic"], "https://media.test/1.png");

        let empty = app
            .request(Method::PUT, "/api/auth/update-profile", Some(alice.token.as_str()))
            .json(json!({ "profilePic": "" }))
            .send()
            .await;
        assert_eq!(empty.status(), 400);
    }
}
