//! Provider round-trips: token exchange and identity claims.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;

/// Tokens returned by the provider for one authentication attempt.
///
/// Transient: the access token goes into the session token, the refresh
/// token (present on first consent or re-consent) is encrypted and
/// persisted, and nothing else is kept.
#[derive(Debug, Clone)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
}

/// OAuth token response (standard OAuth 2.0)
#[derive(Deserialize, Debug)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Identity claims from the OpenID Connect userinfo endpoint.
#[derive(Deserialize, Debug, Clone)]
pub struct IdentityClaims {
    /// Stable subject identifier. Checked by the caller: no user can be
    /// provisioned without it.
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Exchange an authorization code for tokens.
pub async fn exchange_code_for_token(
    token_url: &str,
    code: &str,
    redirect_uri: &str,
    client_id: &str,
    client_secret: &str,
) -> Result<TokenSet> {
    let client = reqwest::Client::new();

    let mut form_data = HashMap::new();
    form_data.insert("grant_type", "authorization_code");
    form_data.insert("code", code);
    form_data.insert("redirect_uri", redirect_uri);
    form_data.insert("client_id", client_id);
    form_data.insert("client_secret", client_secret);

    tracing::debug!("Exchanging authorization code for token at {}", token_url);

    let response = client
        .post(token_url)
        .header("Accept", "application/json")
        .form(&form_data)
        .send()
        .await
        .context("Failed to send token exchange request")?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(anyhow!(
            "Token exchange failed with status {}: {}",
            status,
            body
        ));
    }

    let token_response: TokenResponse = response
        .json()
        .await
        .context("Failed to parse token response")?;

    tracing::debug!(
        "Token exchange successful, has_refresh_token={}, expires_in={:?}",
        token_response.refresh_token.is_some(),
        token_response.expires_in
    );

    Ok(TokenSet {
        access_token: token_response.access_token,
        refresh_token: token_response.refresh_token,
        expires_in: token_response.expires_in,
    })
}

/// Fetch identity claims for a freshly exchanged access token.
pub async fn fetch_userinfo(userinfo_url: &str, access_token: &str) -> Result<IdentityClaims> {
    let client = reqwest::Client::new();

    let response = client
        .get(userinfo_url)
        .bearer_auth(access_token)
        .send()
        .await
        .context("Failed to send userinfo request")?;

    if !response.status().is_success() {
        return Err(anyhow!("Userinfo request failed with status {}", response.status()));
    }

    response
        .json::<IdentityClaims>()
        .await
        .context("Failed to parse userinfo response")
}
