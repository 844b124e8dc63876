//! Signed session tokens.
//!
//! A session is never persisted: it is reconstructed per request from an
//! HS256-signed JWT carried in an HttpOnly cookie (or an Authorization
//! bearer header, for non-browser callers). The token carries the subject
//! id and the short-lived access credential. The long-lived refresh
//! credential never enters a token and is never exposed to the browser.

use axum::http::HeaderMap;
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "shelf_session";

/// JWT claims payload for a signed-in user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject: provider-issued user id.
    pub sub: String,
    /// Short-lived provider access credential.
    pub access_token: String,
    /// Email as reported at sign-in, for display.
    #[serde(default)]
    pub email: Option<String>,
    /// Display name as reported at sign-in.
    #[serde(default)]
    pub name: Option<String>,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Expiration (unix timestamp).
    pub exp: i64,
}

/// The per-request session view handed to API handlers.
#[derive(Debug, Clone)]
pub struct Session {
    pub sub: String,
    pub access_token: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

impl From<SessionClaims> for Session {
    fn from(claims: SessionClaims) -> Self {
        Self {
            sub: claims.sub,
            access_token: claims.access_token,
            email: claims.email,
            name: claims.name,
        }
    }
}

/// Session token errors.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    /// No cookie or bearer token on the request.
    Missing,
    /// Token expired.
    Expired,
    /// Signature mismatch, malformed token, or malformed header.
    Invalid(String),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Missing => write!(f, "Session token not provided"),
            SessionError::Expired => write!(f, "Session expired"),
            SessionError::Invalid(e) => write!(f, "Invalid session token: {}", e),
        }
    }
}

impl std::error::Error for SessionError {}

/// Mints and verifies session tokens under a process-wide secret.
#[derive(Clone)]
pub struct Sessions {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl_seconds: i64,
}

impl Sessions {
    pub fn new(secret: &str, ttl_seconds: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::default(),
            ttl_seconds,
        }
    }

    /// Mint a token for a freshly signed-in user.
    pub fn mint(
        &self,
        sub: &str,
        access_token: &str,
        email: Option<String>,
        name: Option<String>,
    ) -> Result<String, SessionError> {
        let now = Utc::now().timestamp();
        let claims = SessionClaims {
            sub: sub.to_string(),
            access_token: access_token.to_string(),
            email,
            name,
            iat: now,
            exp: now + self.ttl_seconds,
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| SessionError::Invalid(e.to_string()))
    }

    /// Verify a token and materialize the session view. No store access.
    pub fn verify(&self, token: &str) -> Result<Session, SessionError> {
        let data = decode::<SessionClaims>(token, &self.decoding_key, &self.validation).map_err(
            |e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => SessionError::Expired,
                _ => SessionError::Invalid(e.to_string()),
            },
        )?;

        Ok(data.claims.into())
    }

    /// Extract and verify the session from request headers.
    pub fn from_headers(&self, headers: &HeaderMap) -> Result<Session, SessionError> {
        let token = extract_session_token(headers)?;
        self.verify(&token)
    }

    /// Max-Age used for the session cookie, matching the token TTL.
    pub fn ttl_seconds(&self) -> i64 {
        self.ttl_seconds
    }
}

/// Build the Set-Cookie value for a freshly minted session token.
pub fn session_cookie(token: &str, max_age_seconds: i64) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE, token, max_age_seconds
    )
}

/// Extract the raw session token from a request.
///
/// `Authorization: Bearer <token>` wins over the session cookie.
pub fn extract_session_token(headers: &HeaderMap) -> Result<String, SessionError> {
    if let Some(value) = headers.get("authorization") {
        let value = value
            .to_str()
            .map_err(|_| SessionError::Invalid("non-ASCII authorization header".to_string()))?;
        return parse_bearer_token(value);
    }

    if let Some(value) = headers.get("cookie") {
        let value = value
            .to_str()
            .map_err(|_| SessionError::Invalid("non-ASCII cookie header".to_string()))?;
        if let Some(token) = cookie_value(value, SESSION_COOKIE) {
            if token.is_empty() {
                return Err(SessionError::Missing);
            }
            return Ok(token.to_string());
        }
    }

    Err(SessionError::Missing)
}

/// Parse "Bearer <token>" from an Authorization header value.
fn parse_bearer_token(header_value: &str) -> Result<String, SessionError> {
    let parts: Vec<&str> = header_value.splitn(2, ' ').collect();

    if parts.len() != 2 || !parts[0].eq_ignore_ascii_case("bearer") {
        return Err(SessionError::Invalid(
            "expected 'Bearer <token>'".to_string(),
        ));
    }

    let token = parts[1].trim();
    if token.is_empty() {
        return Err(SessionError::Missing);
    }

    Ok(token.to_string())
}

/// Find a cookie value by name in a Cookie header.
fn cookie_value<'a>(header_value: &'a str, name: &str) -> Option<&'a str> {
    header_value.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then_some(value)
    })
}
