use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use rand::Rng;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use super::error::{ApiError, ValidationErrorBuilder};
use super::extract::Json;
use super::validation::{validate_athlete_name, validate_email, validate_password};
use crate::db::{
    Athlete, AuthResponse, AuthToken, LoginRequest, MeResponse, RegisterRequest, User,
    UserResponse,
};
use crate::AppState;

/// The caller behind a valid bearer token
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user: User,
    pub athlete: Option<Athlete>,
    pub token_hash: String,
}

impl AuthSession {
    /// The athlete profile every `/my/...` operation acts on
    pub fn athlete(&self) -> Result<&Athlete, ApiError> {
        self.athlete
            .as_ref()
            .ok_or_else(|| ApiError::not_found("No athlete profile for this account"))
    }

    pub fn athlete_id(&self) -> Result<i64, ApiError> {
        self.athlete().map(|a| a.id)
    }
}

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Generate a random token
fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();
    hex::encode(bytes)
}

/// Hash a token for storage
fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Expiry timestamp `ttl_days` after `now`, or None when it is out of range
fn token_expiry(now: chrono::DateTime<chrono::Utc>, ttl_days: i64) -> Option<String> {
    chrono::Duration::try_days(ttl_days)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .map(|at| at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
}

/// Issue a new token for a user and store its hash
async fn issue_token(state: &AppState, user_id: i64) -> Result<String, ApiError> {
    let token = generate_token();
    let ttl_days = state.config.auth.token_ttl_days;
    let expires_at = token_expiry(chrono::Utc::now(), ttl_days).ok_or_else(|| {
        tracing::error!(ttl_days, "Token lifetime is out of range");
        ApiError::internal("Failed to issue token")
    })?;

    AuthToken::create(&state.db, user_id, &hash_token(&token), &expires_at).await?;
    Ok(token)
}

/// Register endpoint: creates the account and its athlete profile
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors.check("email", validate_email(&request.email));
    errors.check(
        "password",
        validate_password(&request.password, state.config.auth.min_password_length),
    );
    errors.check("name", validate_athlete_name(&request.name));
    errors.finish()?;

    let email = request.email.trim();
    if User::find_by_email(&state.db, email).await?.is_some() {
        return Err(ApiError::conflict("An account with this email already exists"));
    }

    let password_hash = hash_password(&request.password)
        .map_err(|e| ApiError::internal(format!("Failed to hash password: {}", e)))?;

    let (user, athlete) =
        User::register(&state.db, email, &password_hash, request.name.trim()).await?;
    let token = issue_token(&state, user.id).await?;

    tracing::info!(user_id = user.id, athlete_id = athlete.id, "Registered new account");

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            user: UserResponse::from(user),
            athlete: Some(athlete),
        }),
    ))
}

/// Login endpoint
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let user = User::find_by_email(&state.db, request.email.trim())
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid credentials"))?;

    if !verify_password(&request.password, &user.password_hash) {
        tracing::debug!(user_id = user.id, "Rejected login with wrong password");
        return Err(ApiError::unauthorized("Invalid credentials"));
    }

    let token = issue_token(&state, user.id).await?;
    let athlete = Athlete::find_by_user(&state.db, user.id).await?;

    Ok(Json(AuthResponse {
        token,
        user: UserResponse::from(user),
        athlete,
    }))
}

/// Revoke the token used for this request
pub async fn logout(
    State(state): State<Arc<AppState>>,
    auth: AuthSession,
) -> Result<StatusCode, ApiError> {
    AuthToken::revoke(&state.db, &auth.token_hash).await?;
    tracing::info!(user_id = auth.user.id, "Logged out");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn me(auth: AuthSession) -> Json<MeResponse> {
    Json(MeResponse {
        user: UserResponse::from(auth.user),
        athlete: auth.athlete,
    })
}

/// Extract the bearer token from request headers
fn extract_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Resolve a bearer token to the user and athlete behind it
pub async fn resolve_session(state: &AppState, token: &str) -> Result<AuthSession, ApiError> {
    let token_hash = hash_token(token);
    let stored = AuthToken::find_valid(&state.db, &token_hash)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired token"))?;

    let user = User::get(&state.db, stored.user_id)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired token"))?;
    let athlete = Athlete::find_by_user(&state.db, user.id).await?;

    Ok(AuthSession {
        user,
        athlete,
        token_hash,
    })
}

/// Auth middleware: rejects requests without a valid token and stores the
/// resolved `AuthSession` in the request extensions
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_token(request.headers())
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?
        .to_string();

    let session = resolve_session(&state, &token).await?;
    request.extensions_mut().insert(session);

    Ok(next.run(request).await)
}

/// Extractor for the authenticated caller
#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthSession {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if let Some(session) = parts.extensions.get::<AuthSession>() {
            return Ok(session.clone());
        }

        let token = extract_token(&parts.headers)
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;
        resolve_session(state, token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::init_in_memory;

    #[test]
    fn test_token_expiry_bounds() {
        let now = chrono::DateTime::parse_from_rfc3339("2024-03-01T10:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        assert_eq!(
            token_expiry(now, 7).as_deref(),
            Some("2024-03-08T10:00:00.000Z")
        );
        assert_eq!(token_expiry(now, i64::MAX), None);
        assert_eq!(token_expiry(now, 400_000_000), None);
    }

    async fn test_state() -> AppState {
        AppState::new(Config::default(), init_in_memory().await.unwrap())
    }

    #[test]
    fn test_password_round_trip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
        assert!(!verify_password("correct horse", "not-a-hash"));
    }

    #[test]
    fn test_tokens_are_random_hex() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(hash_token(&a), a);
        assert_eq!(hash_token(&a), hash_token(&a));
    }

    #[test]
    fn test_extract_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_token(&headers), None);

        headers.insert(AUTHORIZATION, "Basic abc".parse().unwrap());
        assert_eq!(extract_token(&headers), None);

        headers.insert(AUTHORIZATION, "Bearer abc123".parse().unwrap());
        assert_eq!(extract_token(&headers), Some("abc123"));
    }

    #[tokio::test]
    async fn test_resolve_issued_token() {
        let state = test_state().await;
        let (user, athlete) = User::register(&state.db, "ana@example.com", "hash", "Ana")
            .await
            .unwrap();

        let token = issue_token(&state, user.id).await.unwrap();
        let session = resolve_session(&state, &token).await.unwrap();
        assert_eq!(session.user.id, user.id);
        assert_eq!(session.athlete_id().unwrap(), athlete.id);

        AuthToken::revoke(&state.db, &session.token_hash).await.unwrap();
        let err = resolve_session(&state, &token).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_expired_token_is_rejected() {
        let mut config = Config::default();
        config.auth.token_ttl_days = -1;
        let state = AppState::new(config, init_in_memory().await.unwrap());
        let (user, _) = User::register(&state.db, "bo@example.com", "hash", "Bo")
            .await
            .unwrap();

        let token = issue_token(&state, user.id).await.unwrap();
        assert!(resolve_session(&state, &token).await.is_err());
        assert_eq!(AuthToken::purge_expired(&state.db).await.unwrap(), 1);
    }
}
