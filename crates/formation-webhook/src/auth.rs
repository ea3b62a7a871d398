// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Auth flow selection and OAuth2 client-credentials tokens.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Deserialize;
use tracing::debug;

use crate::error::WebhookError;
use crate::model::{MTLS_ACCESS_STRATEGY, WebhookAuth};

/// Tokens are refreshed this long before the server-reported expiry.
const EXPIRY_LEEWAY: Duration = Duration::from_secs(30);

/// Used when the token endpoint omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(300);

/// How a single call authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFlow<'a> {
    /// Default client, no credentials.
    Anonymous,
    Basic {
        username: &'a str,
        password: &'a str,
    },
    OAuth {
        client_id: &'a str,
        client_secret: &'a str,
        token_url: &'a str,
    },
    /// Mutual TLS client.
    Mtls,
}

impl<'a> AuthFlow<'a> {
    /// Selects the flow for a webhook's auth configuration.
    pub fn select(auth: Option<&'a WebhookAuth>) -> Result<Self, WebhookError> {
        match auth {
            None => Ok(Self::Anonymous),
            Some(WebhookAuth::Mtls) => Ok(Self::Mtls),
            Some(WebhookAuth::AccessStrategy { strategy }) if strategy == MTLS_ACCESS_STRATEGY => {
                Ok(Self::Mtls)
            }
            Some(WebhookAuth::AccessStrategy { .. }) => Err(WebhookError::UnknownAuthFlow),
            Some(WebhookAuth::Basic { username, password }) => Ok(Self::Basic {
                username,
                password,
            }),
            Some(WebhookAuth::OAuth {
                client_id,
                client_secret,
                token_url,
            }) => Ok(Self::OAuth {
                client_id,
                client_secret,
                token_url,
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    refresh_at: Instant,
}

/// Client-credentials tokens keyed by token URL and client ID.
#[derive(Debug, Default)]
pub struct TokenCache {
    tokens: DashMap<(String, String), CachedToken>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a valid access token, fetching a new one when the cached token
    /// is missing or about to expire.
    pub async fn access_token(
        &self,
        http: &reqwest::Client,
        client_id: &str,
        client_secret: &str,
        token_url: &str,
    ) -> Result<String, WebhookError> {
        let key = (token_url.to_string(), client_id.to_string());

        if let Some(cached) = self.tokens.get(&key)
            && cached.refresh_at > Instant::now()
        {
            return Ok(cached.access_token.clone());
        }

        let token = fetch_token(http, client_id, client_secret, token_url).await?;
        let lifetime = token
            .expires_in
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TOKEN_LIFETIME);

        debug!(
            token_url = %token_url,
            client_id = %client_id,
            expires_in_secs = lifetime.as_secs(),
            "Fetched OAuth token"
        );

        let access_token = token.access_token;
        self.tokens.insert(
            key,
            CachedToken {
                access_token: access_token.clone(),
                refresh_at: Instant::now() + lifetime.saturating_sub(EXPIRY_LEEWAY),
            },
        );

        Ok(access_token)
    }

    /// Drops a cached token, e.g. after the remote side rejected it.
    pub fn invalidate(&self, client_id: &str, token_url: &str) {
        self.tokens
            .remove(&(token_url.to_string(), client_id.to_string()));
    }
}

async fn fetch_token(
    http: &reqwest::Client,
    client_id: &str,
    client_secret: &str,
    token_url: &str,
) -> Result<TokenResponse, WebhookError> {
    let token_error = |reason: String| WebhookError::TokenRequest {
        token_url: token_url.to_string(),
        reason,
    };

    let response = http
        .post(token_url)
        .basic_auth(client_id, Some(client_secret))
        .form(&[
            ("grant_type", "client_credentials"),
            ("client_id", client_id),
        ])
        .send()
        .await
        .map_err(|e| token_error(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(token_error(format!(
            "token endpoint returned {}: {}",
            status.as_u16(),
            body
        )));
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| token_error(format!("invalid token response: {}", e)))
}
