// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Webhook configuration as owned by formation templates, applications and runtimes.

use serde::{Deserialize, Serialize};

/// Header used for the correlation ID when the webhook does not name one.
pub const DEFAULT_CORRELATION_ID_KEY: &str = "X-Correlation-Id";

/// Access strategy value that selects the mutual TLS client.
pub const MTLS_ACCESS_STRATEGY: &str = "sap:cmp-mtls:v1";

/// What a webhook is called for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WebhookType {
    /// Sent to a participant when another participant joins or leaves its formation.
    #[default]
    ConfigurationChanged,
    /// Sent between two applications sharing a formation.
    ApplicationTenantMapping,
    /// Sent for formation create/delete.
    FormationLifecycle,
}

/// Completion semantics of a webhook.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WebhookMode {
    /// The HTTP response carries the final outcome.
    #[default]
    Sync,
    /// The HTTP response carries a location to poll for the outcome.
    Async,
}

/// The entity a webhook is registered on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WebhookOwner {
    Application(String),
    ApplicationTemplate(String),
    Runtime(String),
    FormationTemplate(String),
}

impl WebhookOwner {
    /// ID of the owning entity.
    pub fn id(&self) -> &str {
        match self {
            Self::Application(id)
            | Self::ApplicationTemplate(id)
            | Self::Runtime(id)
            | Self::FormationTemplate(id) => id,
        }
    }
}

/// How outbound calls of a webhook authenticate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WebhookAuth {
    /// HTTP Basic credentials.
    Basic { username: String, password: String },
    /// OAuth2 client-credentials grant against `token_url`.
    #[serde(rename = "oauth")]
    OAuth {
        client_id: String,
        client_secret: String,
        token_url: String,
    },
    /// Mutual TLS with the client identity configured on the [`crate::WebhookClient`].
    Mtls,
    /// A named access strategy; only [`MTLS_ACCESS_STRATEGY`] is understood.
    AccessStrategy { strategy: String },
}

/// A configured outbound HTTP callback.
///
/// All templates are optional at the type level; the client reports which one
/// is missing when a call needs it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Webhook {
    pub id: String,
    #[serde(rename = "type")]
    pub webhook_type: WebhookType,
    #[serde(default)]
    pub owner: Option<WebhookOwner>,
    #[serde(default)]
    pub mode: Option<WebhookMode>,
    /// Literal target URL, used when no URL template is set.
    #[serde(default)]
    pub url: Option<String>,
    /// Renders to `{"method": ..., "path": ...}`.
    #[serde(default)]
    pub url_template: Option<String>,
    #[serde(default)]
    pub input_template: Option<String>,
    #[serde(default)]
    pub header_template: Option<String>,
    #[serde(default)]
    pub output_template: Option<String>,
    #[serde(default)]
    pub status_template: Option<String>,
    #[serde(default)]
    pub auth: Option<WebhookAuth>,
    #[serde(default)]
    pub correlation_id_key: Option<String>,
}

impl Webhook {
    pub fn is_async(&self) -> bool {
        self.mode == Some(WebhookMode::Async)
    }

    /// Header name that carries the correlation ID.
    pub fn correlation_header(&self) -> &str {
        self.correlation_id_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .unwrap_or(DEFAULT_CORRELATION_ID_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_serialization_is_tagged() {
        let auth = WebhookAuth::OAuth {
            client_id: "id".into(),
            client_secret: "secret".into(),
            token_url: "https://auth/token".into(),
        };
        let json = serde_json::to_value(&auth).unwrap();
        assert_eq!(json["kind"], "oauth");
        assert_eq!(json["token_url"], "https://auth/token");

        let parsed: WebhookAuth =
            serde_json::from_value(serde_json::json!({"kind": "access_strategy", "strategy": "x"}))
                .unwrap();
        assert_eq!(
            parsed,
            WebhookAuth::AccessStrategy {
                strategy: "x".into()
            }
        );
    }

    #[test]
    fn test_correlation_header_defaults() {
        let mut webhook = Webhook::default();
        assert_eq!(webhook.correlation_header(), "X-Correlation-Id");

        webhook.correlation_id_key = Some(String::new());
        assert_eq!(webhook.correlation_header(), "X-Correlation-Id");

        webhook.correlation_id_key = Some("X-Request-Id".into());
        assert_eq!(webhook.correlation_header(), "X-Request-Id");
    }

    #[test]
    fn test_webhook_deserializes_with_defaults() {
        let webhook: Webhook = serde_json::from_value(serde_json::json!({
            "id": "wh-1",
            "type": "APPLICATION_TENANT_MAPPING",
            "mode": "ASYNC",
            "owner": {"type": "APPLICATION_TEMPLATE", "id": "tpl-1"}
        }))
        .unwrap();

        assert_eq!(webhook.webhook_type, WebhookType::ApplicationTenantMapping);
        assert!(webhook.is_async());
        assert_eq!(webhook.owner.as_ref().map(WebhookOwner::id), Some("tpl-1"));
        assert!(webhook.output_template.is_none());
    }
}
