// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Picks the webhook for each formation assignment and builds its request.
//!
//! | Target          | Source                       | Webhook                                   |
//! |-----------------|------------------------------|-------------------------------------------|
//! | application     | application                  | target's application-tenant-mapping       |
//! | application     | runtime / runtime context    | target's configuration-changed            |
//! | runtime         | application                  | runtime's configuration-changed           |
//! | runtime context | application                  | parent runtime's configuration-changed    |
//!
//! Application webhooks fall back to the application template's webhook.
//! Every other pair gets no notification.

use std::sync::Arc;

use formation_webhook::{Webhook, WebhookOwner, WebhookType};
use tracing::{debug, info};

use crate::directory::FormationDirectory;
use crate::error::{FormationError, Result};
use crate::model::{
    Application, ApplicationTemplate, Formation, FormationAssignment, FormationOperation,
    ObjectType, RequestContext, Runtime, RuntimeContext,
};
use crate::persistence::AssignmentRepository;

use super::{NotificationBuilder, NotificationRequest};

/// Generates notification requests for assignments and formations.
#[derive(Clone)]
pub struct NotificationsGenerator {
    directory: Arc<dyn FormationDirectory>,
    assignments: Arc<dyn AssignmentRepository>,
    builder: NotificationBuilder,
}

impl NotificationsGenerator {
    pub fn new(
        directory: Arc<dyn FormationDirectory>,
        assignments: Arc<dyn AssignmentRepository>,
        builder: NotificationBuilder,
    ) -> Self {
        Self {
            directory,
            assignments,
            builder,
        }
    }

    /// One request per assignment of `object_id` in `formation` that has an
    /// applicable webhook, with the assignment and its reverse attached.
    pub async fn generate_formation_assignment_notifications(
        &self,
        ctx: &RequestContext,
        tenant_id: &str,
        object_id: &str,
        formation: &Formation,
        operation: FormationOperation,
        object_type: ObjectType,
    ) -> Result<Vec<NotificationRequest>> {
        let assignments = self
            .assignments
            .list_for_object(tenant_id, &formation.id, object_id)
            .await?;

        info!(
            tenant_id = %tenant_id,
            formation_id = %formation.id,
            object_id = %object_id,
            object_type = %object_type,
            operation = %operation,
            assignments = assignments.len(),
            "Generating formation assignment notifications"
        );

        let mut requests = Vec::with_capacity(assignments.len());
        for fa in &assignments {
            if let Some(request) = self
                .generate_notification(ctx, formation, fa, operation)
                .await?
            {
                requests.push(request);
            }
        }

        Ok(requests)
    }

    /// The request notifying `fa.target` about `fa.source`, or `None` when the
    /// target has no applicable webhook.
    pub async fn generate_notification(
        &self,
        ctx: &RequestContext,
        formation: &Formation,
        fa: &FormationAssignment,
        operation: FormationOperation,
    ) -> Result<Option<NotificationRequest>> {
        let tenant_id = fa.tenant_id.as_str();
        let reverse = self
            .assignments
            .get_by_source_and_target(tenant_id, &fa.formation_id, &fa.target, &fa.source)
            .await?;
        let reverse = reverse.as_ref();

        let selected = match (fa.target_type, fa.source_type) {
            (ObjectType::Application, ObjectType::Application) => {
                let (target_app, target_template) =
                    self.application_with_template(tenant_id, &fa.target).await?;
                let Some(webhook) = self
                    .application_webhook(
                        tenant_id,
                        &target_app,
                        WebhookType::ApplicationTenantMapping,
                    )
                    .await?
                else {
                    return Ok(self.no_webhook(fa));
                };
                let (source_app, source_template) =
                    self.application_with_template(tenant_id, &fa.source).await?;

                let input = self.builder.prepare_details_for_application_tenant_mapping(
                    operation,
                    &fa.formation_id,
                    source_template,
                    source_app,
                    target_template,
                    target_app,
                    Some(fa),
                    reverse,
                );
                (webhook, input)
            }
            (ObjectType::Application, source_type @ (ObjectType::Runtime | ObjectType::RuntimeContext)) => {
                let (app, app_template) =
                    self.application_with_template(tenant_id, &fa.target).await?;
                let Some(webhook) = self
                    .application_webhook(tenant_id, &app, WebhookType::ConfigurationChanged)
                    .await?
                else {
                    return Ok(self.no_webhook(fa));
                };
                let (runtime, runtime_context) = self
                    .runtime_side(tenant_id, &fa.source, source_type)
                    .await?;

                let input = self.builder.prepare_details_for_configuration_change(
                    operation,
                    &fa.formation_id,
                    app_template,
                    Some(app),
                    Some(runtime),
                    runtime_context,
                    Some(fa),
                    reverse,
                );
                (webhook, input)
            }
            (target_type @ (ObjectType::Runtime | ObjectType::RuntimeContext), ObjectType::Application) => {
                let (runtime, runtime_context) =
                    self.runtime_side(tenant_id, &fa.target, target_type).await?;
                let Some(webhook) = self
                    .directory
                    .get_webhook(
                        tenant_id,
                        &WebhookOwner::Runtime(runtime.id.clone()),
                        WebhookType::ConfigurationChanged,
                    )
                    .await?
                else {
                    return Ok(self.no_webhook(fa));
                };
                let (app, app_template) =
                    self.application_with_template(tenant_id, &fa.source).await?;

                let input = self.builder.prepare_details_for_configuration_change(
                    operation,
                    &fa.formation_id,
                    app_template,
                    Some(app),
                    Some(runtime),
                    runtime_context,
                    Some(fa),
                    reverse,
                );
                (webhook, input)
            }
            (target_type, source_type) => {
                debug!(
                    assignment_id = %fa.id,
                    source_type = %source_type,
                    target_type = %target_type,
                    "No notifications between these participant types"
                );
                return Ok(None);
            }
        };

        let (webhook, input) = selected;
        debug!(
            assignment_id = %fa.id,
            formation_template_id = %formation.formation_template_id,
            webhook_id = %webhook.id,
            "Selected webhook for formation assignment"
        );

        self.builder
            .build_notification_request(&webhook, input, ctx)
            .map(Some)
    }

    /// One request per formation-lifecycle webhook of the formation's template.
    pub async fn generate_formation_notifications(
        &self,
        ctx: &RequestContext,
        tenant_id: &str,
        formation: &Formation,
        operation: FormationOperation,
    ) -> Result<Vec<NotificationRequest>> {
        let webhooks = self
            .directory
            .list_formation_template_webhooks(tenant_id, &formation.formation_template_id)
            .await?;

        webhooks
            .iter()
            .filter(|w| w.webhook_type == WebhookType::FormationLifecycle)
            .map(|webhook| {
                let input = self
                    .builder
                    .prepare_details_for_formation_lifecycle(operation, formation);
                self.builder.build_notification_request(webhook, input, ctx)
            })
            .collect()
    }

    fn no_webhook(&self, fa: &FormationAssignment) -> Option<NotificationRequest> {
        info!(
            assignment_id = %fa.id,
            target = %fa.target,
            target_type = %fa.target_type,
            "No webhook configured for target, there are no notifications to be generated"
        );
        None
    }

    async fn application_with_template(
        &self,
        tenant_id: &str,
        app_id: &str,
    ) -> Result<(Application, Option<ApplicationTemplate>)> {
        let app = self
            .directory
            .get_application(tenant_id, app_id)
            .await?
            .ok_or_else(|| FormationError::object_not_found("Application", app_id))?;

        let template = match &app.application_template_id {
            Some(template_id) => Some(
                self.directory
                    .get_application_template(template_id)
                    .await?
                    .ok_or_else(|| {
                        FormationError::object_not_found("Application template", template_id)
                    })?,
            ),
            None => None,
        };

        Ok((app, template))
    }

    async fn application_webhook(
        &self,
        tenant_id: &str,
        app: &Application,
        webhook_type: WebhookType,
    ) -> Result<Option<Webhook>> {
        let own = self
            .directory
            .get_webhook(
                tenant_id,
                &WebhookOwner::Application(app.id.clone()),
                webhook_type,
            )
            .await?;
        if own.is_some() {
            return Ok(own);
        }

        match &app.application_template_id {
            Some(template_id) => {
                self.directory
                    .get_webhook(
                        tenant_id,
                        &WebhookOwner::ApplicationTemplate(template_id.clone()),
                        webhook_type,
                    )
                    .await
            }
            None => Ok(None),
        }
    }

    /// Resolves a runtime or runtime context participant to its runtime and,
    /// for contexts, the context itself.
    async fn runtime_side(
        &self,
        tenant_id: &str,
        id: &str,
        object_type: ObjectType,
    ) -> Result<(Runtime, Option<RuntimeContext>)> {
        let (runtime_id, runtime_context) = match object_type {
            ObjectType::RuntimeContext => {
                let rc = self
                    .directory
                    .get_runtime_context(tenant_id, id)
                    .await?
                    .ok_or_else(|| FormationError::object_not_found("Runtime context", id))?;
                (rc.runtime_id.clone(), Some(rc))
            }
            _ => (id.to_string(), None),
        };

        let runtime = self
            .directory
            .get_runtime(tenant_id, &runtime_id)
            .await?
            .ok_or_else(|| FormationError::object_not_found("Runtime", &runtime_id))?;

        Ok((runtime, runtime_context))
    }
}
