//! Identity provider configuration.
//!
//! Google is the only provider. The scope list pairs the profile claims with
//! the narrow per-file Drive scope; offline access plus forced consent make
//! the provider reliably issue a refresh credential on sign-in.

use crate::config::Secrets;
use serde::{Deserialize, Serialize};

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

/// OAuth provider configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// OAuth authorization endpoint URL
    pub auth_url: String,

    /// OAuth token exchange endpoint URL
    pub token_url: String,

    /// OpenID Connect userinfo endpoint URL
    pub userinfo_url: String,

    /// Required OAuth scopes
    pub scopes: Vec<String>,

    /// Client ID (from environment variable)
    pub client_id: String,

    /// Client secret (from environment variable)
    pub client_secret: String,
}

impl ProviderConfig {
    /// Google configuration from the validated process secrets.
    pub fn google(secrets: &Secrets) -> Self {
        Self {
            auth_url: AUTH_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
            userinfo_url: USERINFO_URL.to_string(),
            scopes: [
                "openid",
                "email",
                "profile",
                "https://www.googleapis.com/auth/drive.file",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            client_id: secrets.google_client_id.clone(),
            client_secret: secrets.google_client_secret.clone(),
        }
    }

    /// Build the authorization URL with state and redirect_uri.
    ///
    /// `access_type=offline` and `prompt=consent` force the provider to
    /// issue a refresh credential rather than only on first consent.
    pub fn build_auth_url(&self, state: &str, redirect_uri: &str) -> String {
        let scopes = self.scopes.join(" ");
        format!(
            "{}?client_id={}&redirect_uri={}&scope={}&state={}&response_type=code&access_type=offline&prompt=consent",
            self.auth_url,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&scopes),
            urlencoding::encode(state)
        )
    }
}
