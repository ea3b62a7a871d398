// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Formation Webhook - templated outbound HTTP notifications
//!
//! A [`Webhook`] describes a remote endpoint purely through templates: the URL
//! and method, request body and headers are rendered from a domain snapshot
//! ([`TemplateInput`]), and the remote answer is normalized into a
//! [`Response`] or [`ResponseStatus`] by the output and status templates. The
//! same client therefore serves arbitrarily shaped downstream APIs.
//!
//! # Call flow
//!
//! ```text
//!   TemplateInput ──► URL / input / header templates ──► HTTP request
//!                                                            │
//!                               auth: none | Basic | OAuth2 | mTLS
//!                                                            ▼
//!   Response ◄── output template ◄── {Headers, Body} ◄── HTTP response
//! ```
//!
//! Async webhooks return a location; [`WebhookExecutor::poll`] fetches it and
//! parses the status template into a three-way [`PollOutcome`].

pub mod auth;
pub mod client;
pub mod error;
pub mod model;
pub mod response;
pub mod template;

pub use client::{PollRequest, WebhookClient, WebhookClientConfig, WebhookExecutor, WebhookRequest};
pub use error::WebhookError;
pub use model::{
    DEFAULT_CORRELATION_ID_KEY, MTLS_ACCESS_STRATEGY, Webhook, WebhookAuth, WebhookMode,
    WebhookOwner, WebhookType,
};
pub use response::{PollOutcome, Response, ResponseData, ResponseStatus};
pub use template::{JinjaRenderer, RenderError, RenderMode, Renderer, RequestUrl, TemplateInput};
