//! Google sign-in flow and session endpoints.
//!
//! Implements the authorization code flow:
//! 1. GET /api/auth/login → Redirect to provider consent page
//! 2. User authorizes on the provider's site
//! 3. Provider redirects to /api/auth/callback
//! 4. Exchange code for tokens, fetch identity claims
//! 5. Encrypt + persist the refresh credential (best-effort)
//! 6. Lazily provision the per-user storage root folder
//! 7. Upsert the user record, mint the session cookie
//!
//! Subsequent requests carry the session token; materializing the session
//! view (GET /api/auth/session) performs no store writes.

mod exchange;
mod provider;
mod state_manager;

pub use exchange::{IdentityClaims, TokenSet};
pub use provider::ProviderConfig;
pub use state_manager::{run_state_cleanup, StateManager};

use crate::directory::DirectoryStore;
use crate::drive::DriveClient;
use crate::session::{session_cookie, Sessions};
use axum::{
    extract::{Query, State},
    http::{header::SET_COOKIE, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Redirect, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Application error types for auth endpoints
enum AppError {
    BadRequest(String),
    Unauthorized(String),
    ServerError(String),
    BadGateway(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::ServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
        };

        let body = Json(ErrorResponse {
            error: error_message,
        });

        (status, body).into_response()
    }
}

/// Shared application state for the auth API
#[derive(Clone)]
pub struct AuthAppState {
    pub directory: Arc<DirectoryStore>,
    pub drive: Arc<DriveClient>,
    pub sessions: Sessions,
    pub state_manager: StateManager,
    pub provider: ProviderConfig,
    pub public_base_url: String,
    pub root_folder_name: String,
}

/// OAuth callback query parameters
#[derive(Deserialize)]
pub struct OAuthCallback {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Sign-in success response
#[derive(Serialize)]
pub struct SignInResponse {
    success: bool,
    sub: String,
    message: String,
}

/// Session view response
#[derive(Serialize)]
pub struct SessionResponse {
    sub: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(rename = "accessToken")]
    access_token: String,
}

/// Create auth API router
pub fn create_auth_router(state: AuthAppState) -> Router {
    Router::new()
        .route("/api/auth/login", get(oauth_login))
        .route("/api/auth/callback", get(oauth_callback))
        .route("/api/auth/session", get(session_view))
        .with_state(Arc::new(state))
}

/// GET /api/auth/login
///
/// Initiates the flow by redirecting to the provider's consent page.
///
/// # Security
/// - Generates a single-use CSRF state parameter with a bounded lifetime
/// - Requests offline access and forces re-consent so a refresh credential
///   is reliably issued
async fn oauth_login(State(state): State<Arc<AuthAppState>>) -> Redirect {
    let csrf_state = state.state_manager.create_state();
    let redirect_uri = callback_uri(&state.public_base_url);
    let auth_url = state.provider.build_auth_url(&csrf_state, &redirect_uri);

    info!("Redirecting to identity provider");
    Redirect::temporary(&auth_url)
}

/// GET /api/auth/callback
///
/// Completes sign-in: exchanges the code, persists credentials, provisions
/// the storage root on first sign-in, and sets the session cookie.
///
/// # Security
/// - Validates and consumes the CSRF state (single-use)
/// - The refresh credential is encrypted before it reaches the store and
///   never enters the session cookie
async fn oauth_callback(
    State(state): State<Arc<AuthAppState>>,
    Query(callback): Query<OAuthCallback>,
) -> Result<Response, AppError> {
    debug!("OAuth callback received");

    // Check for provider-reported errors
    if let Some(error) = callback.error {
        let description = callback
            .error_description
            .unwrap_or_else(|| "Unknown error".to_string());
        warn!(error = %error, description = %description, "OAuth authorization failed");
        return Err(AppError::BadRequest(format!(
            "OAuth authorization failed: {} - {}",
            error, description
        )));
    }

    let code = callback
        .code
        .ok_or_else(|| AppError::BadRequest("Missing 'code' parameter".to_string()))?;
    let csrf_state = callback
        .state
        .ok_or_else(|| AppError::BadRequest("Missing 'state' parameter".to_string()))?;

    if !state.state_manager.validate_and_consume(&csrf_state) {
        warn!("Invalid or expired OAuth state");
        return Err(AppError::Unauthorized(
            "Invalid or expired OAuth state (possible CSRF attack)".to_string(),
        ));
    }

    // Exchange authorization code for tokens
    let redirect_uri = callback_uri(&state.public_base_url);
    let tokens = exchange::exchange_code_for_token(
        &state.provider.token_url,
        &code,
        &redirect_uri,
        &state.provider.client_id,
        &state.provider.client_secret,
    )
    .await
    .map_err(|e| {
        error!(error = %e, "Token exchange failed");
        AppError::BadGateway(format!("Failed to exchange authorization code: {}", e))
    })?;

    // Fetch identity claims for the new access token
    let claims = exchange::fetch_userinfo(&state.provider.userinfo_url, &tokens.access_token)
        .await
        .map_err(|e| {
            error!(error = %e, "Userinfo fetch failed");
            AppError::BadGateway(format!("Failed to fetch identity claims: {}", e))
        })?;

    // No user can be provisioned without a stable subject id
    let sub = match claims.sub.as_deref() {
        Some(sub) if !sub.is_empty() => sub.to_string(),
        _ => {
            error!("Identity claims carry no subject id");
            return Err(AppError::BadGateway(
                "Identity provider returned no subject id".to_string(),
            ));
        }
    };

    complete_sign_in(&state, &sub, &claims, &tokens).await?;

    // Mint the session token. The refresh credential stays out of it.
    let token = state
        .sessions
        .mint(
            &sub,
            &tokens.access_token,
            claims.email.clone(),
            claims.name.clone(),
        )
        .map_err(|e| AppError::ServerError(format!("Failed to mint session token: {}", e)))?;

    let cookie = session_cookie(&token, state.sessions.ttl_seconds());
    let cookie = HeaderValue::from_str(&cookie)
        .map_err(|e| AppError::ServerError(format!("Failed to build session cookie: {}", e)))?;

    info!(sub = %sub, "Sign-in completed");

    let mut response = Json(SignInResponse {
        success: true,
        sub,
        message: "Signed in".to_string(),
    })
    .into_response();
    response.headers_mut().insert(SET_COOKIE, cookie);

    Ok(response)
}

/// Persist what the provider handed us and provision the storage root.
///
/// The secret write is best-effort: its failure is logged and never blocks
/// sign-in. The user upsert is part of the primary outcome and propagates.
async fn complete_sign_in(
    state: &AuthAppState,
    sub: &str,
    claims: &IdentityClaims,
    tokens: &TokenSet,
) -> Result<(), AppError> {
    // Refresh credential: only guaranteed on first consent or re-consent
    if let Some(refresh_token) = &tokens.refresh_token {
        if let Err(e) = state.directory.upsert_secret(sub, refresh_token) {
            error!(sub = %sub, error = %e, "Failed to store refresh credential, sign-in continues");
        }
    } else {
        debug!(sub = %sub, "No refresh credential in token response");
    }

    // Profile fields are overwritten on every sign-in; the storage root and
    // created_at are untouched for an existing record
    state
        .directory
        .upsert_user(sub, claims.email.as_deref(), claims.name.as_deref())
        .map_err(|e| {
            error!(sub = %sub, error = %e, "Failed to upsert user record");
            AppError::ServerError(format!("Failed to store user: {}", e))
        })?;

    // Provision the storage root only while none is recorded
    let needs_root = state
        .directory
        .get_user(sub)
        .map_err(|e| AppError::ServerError(format!("Failed to read user: {}", e)))?
        .map(|user| user.drive.is_default())
        .unwrap_or(true);

    if needs_root {
        provision_drive_root(state, sub, &tokens.access_token).await;
    }

    Ok(())
}

/// Create the per-user root folder and claim it.
///
/// Failure leaves the root unset; the next sign-in retries with a fresh
/// access credential, so sign-in itself is never aborted here.
async fn provision_drive_root(state: &AuthAppState, sub: &str, access_token: &str) {
    let name = if state.root_folder_name.is_empty() {
        crate::config::DEFAULT_ROOT_FOLDER_NAME
    } else {
        &state.root_folder_name
    };

    match state.drive.create_folder(access_token, name, "root").await {
        Ok(folder) => {
            let path = format!("/{}", folder.name);
            match state.directory.claim_drive_root(sub, &folder.id, &path) {
                Ok(true) => {
                    info!(sub = %sub, folder_id = %folder.id, "Provisioned storage root");
                }
                Ok(false) => {
                    // Lost a concurrent sign-in race; the created folder is orphaned
                    warn!(sub = %sub, folder_id = %folder.id, "Storage root already claimed");
                }
                Err(e) => {
                    error!(sub = %sub, error = %e, "Failed to record storage root");
                }
            }
        }
        Err(e) => {
            warn!(sub = %sub, error = %e, "Storage root provisioning failed, will retry on next sign-in");
        }
    }
}

/// GET /api/auth/session
///
/// Materializes the session view from the signed token. No store access.
async fn session_view(
    State(state): State<Arc<AuthAppState>>,
    headers: HeaderMap,
) -> Result<Json<SessionResponse>, AppError> {
    let session = state
        .sessions
        .from_headers(&headers)
        .map_err(|e| AppError::Unauthorized(e.to_string()))?;

    Ok(Json(SessionResponse {
        sub: session.sub,
        email: session.email,
        name: session.name,
        access_token: session.access_token,
    }))
}

fn callback_uri(public_base_url: &str) -> String {
    format!("{}/api/auth/callback", public_base_url)
}
