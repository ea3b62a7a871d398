// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Single execution path for formation notifications.

use std::sync::Arc;

use formation_webhook::{
    PollRequest, Response, ResponseStatus, WebhookError, WebhookExecutor, WebhookRequest,
};

use crate::error::Result;
use crate::model::{
    Formation, FormationAssignment, FormationOperation, ObjectType, RequestContext,
};

use super::{NotificationRequest, NotificationsGenerator};

/// Generates formation notifications and sends them through a [`WebhookExecutor`].
#[derive(Clone)]
pub struct NotificationsService {
    generator: NotificationsGenerator,
    executor: Arc<dyn WebhookExecutor>,
}

impl NotificationsService {
    pub fn new(generator: NotificationsGenerator, executor: Arc<dyn WebhookExecutor>) -> Self {
        Self {
            generator,
            executor,
        }
    }

    pub fn generator(&self) -> &NotificationsGenerator {
        &self.generator
    }

    pub async fn generate_formation_assignment_notifications(
        &self,
        ctx: &RequestContext,
        tenant_id: &str,
        object_id: &str,
        formation: &Formation,
        operation: FormationOperation,
        object_type: ObjectType,
    ) -> Result<Vec<NotificationRequest>> {
        self.generator
            .generate_formation_assignment_notifications(
                ctx,
                tenant_id,
                object_id,
                formation,
                operation,
                object_type,
            )
            .await
    }

    pub async fn generate_notification(
        &self,
        ctx: &RequestContext,
        formation: &Formation,
        fa: &FormationAssignment,
        operation: FormationOperation,
    ) -> Result<Option<NotificationRequest>> {
        self.generator
            .generate_notification(ctx, formation, fa, operation)
            .await
    }

    pub async fn generate_formation_notifications(
        &self,
        ctx: &RequestContext,
        tenant_id: &str,
        formation: &Formation,
        operation: FormationOperation,
    ) -> Result<Vec<NotificationRequest>> {
        self.generator
            .generate_formation_notifications(ctx, tenant_id, formation, operation)
            .await
    }

    /// Sends one notification. Errors stay unclassified so callers can tell
    /// transport failures, rejections and gone responses apart.
    pub async fn send_notification(
        &self,
        request: &dyn WebhookRequest,
    ) -> std::result::Result<Response, WebhookError> {
        self.executor.execute(request).await
    }

    /// Polls the location returned by an accepted async notification.
    pub async fn poll_notification(
        &self,
        request: &dyn WebhookRequest,
        poll_url: &str,
    ) -> std::result::Result<ResponseStatus, WebhookError> {
        self.executor
            .poll(&PollRequest {
                request,
                poll_url: poll_url.to_string(),
            })
            .await
    }
}
