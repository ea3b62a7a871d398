// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Webhook execution over HTTP.
//!
//! [`WebhookClient::execute`] renders and sends one request and interprets the
//! response through the webhook's output template. [`WebhookClient::poll`]
//! follows up on an async webhook by calling the returned location and reading
//! it through the status template.
//!
//! Dropping the returned future aborts the in-flight HTTP call.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, info, warn};

use crate::auth::{AuthFlow, TokenCache};
use crate::error::WebhookError;
use crate::model::Webhook;
use crate::response::{Response, ResponseData, ResponseStatus, canonical_header_key};
use crate::template::{JinjaRenderer, Renderer, TemplateInput};

/// A request the client can execute.
pub trait WebhookRequest: Send + Sync {
    fn webhook(&self) -> &Webhook;

    /// Object the request templates are rendered against.
    fn object(&self) -> &dyn TemplateInput;

    /// Correlation ID sent with the call; empty means none.
    fn correlation_id(&self) -> &str;
}

/// A follow-up call against the location returned by an async webhook.
pub struct PollRequest<'a> {
    pub request: &'a dyn WebhookRequest,
    pub poll_url: String,
}

/// Executes webhook requests.
#[async_trait]
pub trait WebhookExecutor: Send + Sync {
    async fn execute(&self, request: &dyn WebhookRequest) -> Result<Response, WebhookError>;

    async fn poll(&self, request: &PollRequest<'_>) -> Result<ResponseStatus, WebhookError>;
}

/// Client construction settings.
#[derive(Debug, Clone)]
pub struct WebhookClientConfig {
    /// Applied to every outbound call.
    pub timeout: Duration,
    /// PEM certificate chain and private key for mutual TLS.
    pub mtls_identity_pem: Option<Vec<u8>>,
}

impl Default for WebhookClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            mtls_identity_pem: None,
        }
    }
}

/// HTTP webhook client with a default and an optional mutual TLS transport.
#[derive(Clone)]
pub struct WebhookClient {
    http: reqwest::Client,
    mtls: Option<reqwest::Client>,
    renderer: Arc<dyn Renderer>,
    tokens: Arc<TokenCache>,
}

impl WebhookClient {
    /// Create a client from prepared transports.
    pub fn new(http: reqwest::Client, mtls: Option<reqwest::Client>) -> Self {
        Self {
            http,
            mtls,
            renderer: Arc::new(JinjaRenderer::new()),
            tokens: Arc::new(TokenCache::new()),
        }
    }

    /// Build both transports from configuration.
    pub fn from_config(config: &WebhookClientConfig) -> Result<Self, WebhookError> {
        let build_error = |e: reqwest::Error| WebhookError::ClientBuild(e.to_string());

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(build_error)?;

        let mtls = match &config.mtls_identity_pem {
            Some(pem) => {
                let identity = reqwest::Identity::from_pem(pem).map_err(build_error)?;
                Some(
                    reqwest::Client::builder()
                        .timeout(config.timeout)
                        .identity(identity)
                        .build()
                        .map_err(build_error)?,
                )
            }
            None => None,
        };

        Ok(Self::new(http, mtls))
    }

    /// Replace the template renderer.
    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn renderer(&self) -> Arc<dyn Renderer> {
        self.renderer.clone()
    }

    async fn send(
        &self,
        webhook: &Webhook,
        correlation_id: &str,
        method: reqwest::Method,
        url: &str,
        headers: Vec<(String, String)>,
        body: Option<String>,
    ) -> Result<(u16, ResponseData), WebhookError> {
        let flow = AuthFlow::select(webhook.auth.as_ref())?;
        let client = match flow {
            AuthFlow::Mtls => self.mtls.as_ref().ok_or(WebhookError::MtlsNotConfigured)?,
            _ => &self.http,
        };

        let mut request = client.request(method.clone(), url);

        let mut has_content_type = false;
        for (name, value) in &headers {
            has_content_type |= name.eq_ignore_ascii_case(CONTENT_TYPE.as_str());
            request = request.header(name.as_str(), value.as_str());
        }

        if !correlation_id.is_empty() {
            request = request.header(webhook.correlation_header(), correlation_id);
        }

        match flow {
            AuthFlow::Basic { username, password } => {
                request = request.basic_auth(username, Some(password));
            }
            AuthFlow::OAuth {
                client_id,
                client_secret,
                token_url,
            } => {
                let token = self
                    .tokens
                    .access_token(&self.http, client_id, client_secret, token_url)
                    .await?;
                request = request.bearer_auth(token);
            }
            AuthFlow::Anonymous | AuthFlow::Mtls => {}
        }

        if let Some(body) = body {
            if !has_content_type {
                request = request.header(CONTENT_TYPE, "application/json");
            }
            request = request.body(body);
        }

        debug!(
            webhook_id = %webhook.id,
            method = %method,
            url = %url,
            correlation_id = %correlation_id,
            "Sending webhook request"
        );

        let response = request.send().await.map_err(|e| WebhookError::Transport {
            url: url.to_string(),
            source: e,
        })?;

        let status = response.status().as_u16();

        if status == reqwest::StatusCode::UNAUTHORIZED.as_u16()
            && let AuthFlow::OAuth {
                client_id,
                token_url,
                ..
            } = flow
        {
            self.tokens.invalidate(client_id, token_url);
        }

        let mut response_headers = BTreeMap::new();
        for (name, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                response_headers
                    .entry(canonical_header_key(name.as_str()))
                    .or_insert_with(|| v.to_string());
            }
        }

        let text = response
            .text()
            .await
            .map_err(|e| WebhookError::InvalidResponse {
                url: url.to_string(),
                reason: format!("failed to read response body: {}", e),
            })?;

        let body = if text.trim().is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_str(&text).map_err(|e| WebhookError::InvalidResponse {
                url: url.to_string(),
                reason: format!("response body is not valid JSON: {}", e),
            })?
        };

        info!(
            webhook_id = %webhook.id,
            method = %method,
            url = %url,
            status = status,
            correlation_id = %correlation_id,
            "Webhook call completed"
        );

        Ok((
            status,
            ResponseData {
                headers: response_headers,
                body,
            },
        ))
    }
}

#[async_trait]
impl WebhookExecutor for WebhookClient {
    async fn execute(&self, request: &dyn WebhookRequest) -> Result<Response, WebhookError> {
        let webhook = request.webhook();
        let object = request.object();
        let renderer = self.renderer.as_ref();

        let (method, url) = match (&webhook.url_template, &webhook.url) {
            (Some(template), _) => {
                let resolved = object.parse_url_template(renderer, template)?;
                let method = reqwest::Method::from_bytes(resolved.method.as_bytes())
                    .map_err(|e| WebhookError::UrlTemplate(e.to_string()))?;
                (method, resolved.path)
            }
            (None, Some(url)) => (reqwest::Method::GET, url.clone()),
            (None, None) => return Err(WebhookError::MissingUrl),
        };

        let output_template = webhook
            .output_template
            .as_deref()
            .ok_or(WebhookError::MissingOutputTemplate)?;

        let body = object.parse_input_template(renderer, webhook.input_template.as_deref())?;
        let headers = object.parse_headers_template(renderer, webhook.header_template.as_deref())?;

        let (status, data) = self
            .send(
                webhook,
                request.correlation_id(),
                method,
                &url,
                headers,
                Some(body),
            )
            .await?;

        let mut response = object.parse_output_template(renderer, output_template, &data)?;
        response.actual_status_code = status;

        if response.gone_status_code == Some(status) {
            warn!(webhook_id = %webhook.id, status = status, "Webhook reported resource gone");
            return Err(WebhookError::Gone {
                status_code: status,
                response: Box::new(response),
            });
        }

        if webhook.is_async() && response.poll_location().is_none() {
            return Err(WebhookError::MissingLocation);
        }

        let incomplete = response.incomplete_status_code;
        match check_for_err(
            status,
            response.success_status_code,
            incomplete,
            response.error_message(),
        ) {
            Some(message) => Err(WebhookError::Rejected {
                message,
                response: Box::new(response),
            }),
            None => Ok(response),
        }
    }

    async fn poll(&self, request: &PollRequest<'_>) -> Result<ResponseStatus, WebhookError> {
        let webhook = request.request.webhook();
        let object = request.request.object();
        let renderer = self.renderer.as_ref();

        let status_template = webhook
            .status_template
            .as_deref()
            .ok_or(WebhookError::MissingStatusTemplate)?;

        let headers = object.parse_headers_template(renderer, webhook.header_template.as_deref())?;

        let (status_code, data) = self
            .send(
                webhook,
                request.request.correlation_id(),
                reqwest::Method::GET,
                &request.poll_url,
                headers,
                None,
            )
            .await?;

        let mut status = object.parse_status_template(renderer, status_template, &data)?;
        status.actual_status_code = status_code;

        match check_for_err(
            status_code,
            status.success_status_code,
            None,
            status.error_message(),
        ) {
            Some(message) => Err(WebhookError::StatusRejected {
                message,
                status: Box::new(status),
            }),
            None => Ok(status),
        }
    }
}

/// Describes why a completed call counts as failed, if it does.
fn check_for_err(
    actual: u16,
    success: Option<u16>,
    incomplete: Option<u16>,
    error: Option<&str>,
) -> Option<String> {
    let mut message = String::new();

    if success != Some(actual) && incomplete != Some(actual) {
        let expected = success.map(|c| c.to_string()).unwrap_or_default();
        message.push_str(&format!(
            "response success status code was not met - expected {}, got {}; ",
            expected, actual
        ));
    }

    if let Some(error) = error {
        message.push_str(&format!(
            "received error while polling external system: {}",
            error
        ));
    }

    if message.is_empty() {
        None
    } else {
        Some(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_for_err() {
        assert_eq!(check_for_err(200, Some(200), None, None), None);
        assert_eq!(check_for_err(204, Some(200), Some(204), None), None);

        let message = check_for_err(500, Some(200), None, None).unwrap();
        assert!(message.contains("response success status code was not met"));
        assert!(message.contains("expected 200, got 500"));

        let message = check_for_err(200, Some(200), None, Some("boom")).unwrap();
        assert_eq!(message, "received error while polling external system: boom");

        let message = check_for_err(400, Some(200), None, Some("bad input")).unwrap();
        assert!(message.contains("expected 200, got 400"));
        assert!(message.contains("bad input"));
    }
}
