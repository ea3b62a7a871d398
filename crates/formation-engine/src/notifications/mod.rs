// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Formation notifications: building, generating and sending webhook requests.
//!
//! ```text
//!   FormationAssignment ──► NotificationsGenerator ──► NotificationBuilder
//!                           (webhook selection)        (template pre-render)
//!                                                             │
//!                                                   NotificationRequest
//!                                                             │
//!                           NotificationsService ──► WebhookExecutor
//! ```

pub mod builder;
pub mod generator;
pub mod service;

pub use builder::NotificationBuilder;
pub use generator::NotificationsGenerator;
pub use service::NotificationsService;

use formation_webhook::{TemplateInput, Webhook, WebhookRequest};

use crate::template_input::FormationTemplateInput;

/// A rendered-once, ready to send formation notification.
///
/// Each request owns its template input; the two directions of one pair
/// never share one.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationRequest {
    pub webhook: Webhook,
    pub object: FormationTemplateInput,
    pub correlation_id: String,
}

impl NotificationRequest {
    /// ID of the application, template or runtime owning the webhook.
    pub fn owner_id(&self) -> Option<&str> {
        self.webhook.owner.as_ref().map(|owner| owner.id())
    }
}

impl WebhookRequest for NotificationRequest {
    fn webhook(&self) -> &Webhook {
        &self.webhook
    }

    fn object(&self) -> &dyn TemplateInput {
        &self.object
    }

    fn correlation_id(&self) -> &str {
        &self.correlation_id
    }
}
