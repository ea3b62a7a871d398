// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for webhook rendering and execution.

use crate::response::{Response, ResponseStatus};

/// Errors raised while rendering, sending or interpreting a webhook call.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// The URL template could not be rendered or did not yield a valid method/path.
    #[error("unable to parse webhook URL: {0}")]
    UrlTemplate(String),

    /// The input template could not be rendered or did not yield valid JSON.
    #[error("unable to parse webhook input body: {0}")]
    InputTemplate(String),

    /// The header template could not be rendered or did not yield a header map.
    #[error("unable to parse webhook headers: {0}")]
    HeadersTemplate(String),

    /// The output template could not be applied to the HTTP response.
    #[error("unable to parse response into webhook output response: {0}")]
    OutputTemplate(String),

    /// The status template could not be applied to the poll response.
    #[error("unable to parse response into webhook status response: {0}")]
    StatusTemplate(String),

    /// Neither a literal URL nor a URL template is configured.
    #[error("missing webhook url")]
    MissingUrl,

    #[error("missing output template")]
    MissingOutputTemplate,

    #[error("missing status template")]
    MissingStatusTemplate,

    /// The webhook auth does not map to any supported flow.
    #[error("could not determine auth flow")]
    UnknownAuthFlow,

    /// The webhook requires mutual TLS but no client identity was configured.
    #[error("mutual TLS client is not configured")]
    MtlsNotConfigured,

    /// The OAuth2 client-credentials exchange failed.
    #[error("failed to obtain OAuth token from {token_url}: {reason}")]
    TokenRequest {
        /// Token endpoint that was called.
        token_url: String,
        /// What went wrong.
        reason: String,
    },

    /// An HTTP transport could not be constructed (e.g. unusable mTLS identity).
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(String),

    /// The HTTP call itself failed (connection, TLS, timeout).
    #[error("request to {url} failed: {source}")]
    Transport {
        /// Target URL.
        url: String,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// The response body could not be read or decoded.
    #[error("invalid response from {url}: {reason}")]
    InvalidResponse {
        /// Target URL.
        url: String,
        /// What went wrong.
        reason: String,
    },

    /// The remote system answered with the configured gone status code.
    #[error("gone response status {status_code} was met while calling webhook")]
    Gone {
        /// HTTP status that matched `gone_status_code`.
        status_code: u16,
        /// Parsed output of the call.
        response: Box<Response>,
    },

    /// An async webhook accepted the call without telling where to poll.
    #[error("missing location url after executing async webhook")]
    MissingLocation,

    /// The call completed but the remote system reported a failure.
    #[error("{message}")]
    Rejected {
        /// Combined status/body error description.
        message: String,
        /// Parsed output of the call.
        response: Box<Response>,
    },

    /// The poll completed but the remote system reported a failure.
    #[error("{message}")]
    StatusRejected {
        /// Combined status/body error description.
        message: String,
        /// Parsed status of the operation.
        status: Box<ResponseStatus>,
    },
}

impl WebhookError {
    /// True when the remote resource is reported as already absent.
    pub fn is_gone(&self) -> bool {
        matches!(self, Self::Gone { .. })
    }

    /// True for failures that happened before or while talking to the remote
    /// system and may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::TokenRequest { .. })
    }

    /// True when the remote system answered and reported a failure.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::Rejected { .. } | Self::StatusRejected { .. } | Self::Gone { .. }
        )
    }

    /// True for rendering and response-parsing failures.
    pub fn is_template_error(&self) -> bool {
        matches!(
            self,
            Self::UrlTemplate(_)
                | Self::InputTemplate(_)
                | Self::HeadersTemplate(_)
                | Self::OutputTemplate(_)
                | Self::StatusTemplate(_)
        )
    }

    /// The parsed response attached to a rejected or gone call.
    pub fn response(&self) -> Option<&Response> {
        match self {
            Self::Rejected { response, .. } | Self::Gone { response, .. } => Some(response),
            _ => None,
        }
    }
}
