// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Builds notification requests and the template inputs behind them.

use std::sync::Arc;

use formation_webhook::{JinjaRenderer, Renderer, TemplateInput, Webhook, WebhookError};
use tracing::debug;

use crate::error::{FormationError, Result};
use crate::model::{
    Application, ApplicationTemplate, Formation, FormationAssignment, FormationOperation,
    RequestContext, Runtime, RuntimeContext,
};
use crate::template_input::{
    ApplicationTenantMappingInput, AssignmentSnapshot, ConfigurationChangeInput,
    FormationLifecycleInput, FormationTemplateInput,
};

use super::NotificationRequest;

/// Validates webhooks and turns template inputs into [`NotificationRequest`]s.
#[derive(Clone)]
pub struct NotificationBuilder {
    renderer: Arc<dyn Renderer>,
}

impl Default for NotificationBuilder {
    fn default() -> Self {
        Self::new(Arc::new(JinjaRenderer::new()))
    }
}

impl NotificationBuilder {
    pub fn new(renderer: Arc<dyn Renderer>) -> Self {
        Self { renderer }
    }

    /// Builds a request after rendering its URL, body and header templates
    /// once, so broken templates fail here rather than on send.
    pub fn build_notification_request(
        &self,
        webhook: &Webhook,
        object: FormationTemplateInput,
        ctx: &RequestContext,
    ) -> Result<NotificationRequest> {
        let failed = |err: WebhookError| FormationError::NotificationBuildFailed {
            webhook_id: webhook.id.clone(),
            reason: err.to_string(),
        };

        if webhook.url.is_none() && webhook.url_template.is_none() {
            return Err(failed(WebhookError::MissingUrl));
        }
        if webhook.output_template.is_none() {
            return Err(failed(WebhookError::MissingOutputTemplate));
        }

        let renderer = self.renderer.as_ref();
        if let Some(template) = &webhook.url_template {
            object
                .parse_url_template(renderer, template)
                .map_err(failed)?;
        }
        object
            .parse_input_template(renderer, webhook.input_template.as_deref())
            .map_err(failed)?;
        object
            .parse_headers_template(renderer, webhook.header_template.as_deref())
            .map_err(failed)?;

        debug!(
            webhook_id = %webhook.id,
            webhook_type = ?webhook.webhook_type,
            operation = %object.operation(),
            correlation_id = %ctx.correlation_id,
            "Built notification request"
        );

        Ok(NotificationRequest {
            webhook: webhook.clone(),
            object,
            correlation_id: ctx.correlation_id.clone(),
        })
    }

    /// Input for a configuration-changed notification between an application
    /// and a runtime or runtime context.
    #[allow(clippy::too_many_arguments)]
    pub fn prepare_details_for_configuration_change(
        &self,
        operation: FormationOperation,
        formation_id: &str,
        application_template: Option<ApplicationTemplate>,
        application: Option<Application>,
        runtime: Option<Runtime>,
        runtime_context: Option<RuntimeContext>,
        assignment: Option<&FormationAssignment>,
        reverse_assignment: Option<&FormationAssignment>,
    ) -> FormationTemplateInput {
        FormationTemplateInput::ConfigurationChange(ConfigurationChangeInput {
            operation,
            formation_id: formation_id.to_string(),
            application_template,
            application,
            runtime,
            runtime_context,
            assignment: assignment.map(AssignmentSnapshot::from),
            reverse_assignment: reverse_assignment.map(AssignmentSnapshot::from),
        })
    }

    /// Input for an application-tenant-mapping notification sent to `target_application`.
    #[allow(clippy::too_many_arguments)]
    pub fn prepare_details_for_application_tenant_mapping(
        &self,
        operation: FormationOperation,
        formation_id: &str,
        source_application_template: Option<ApplicationTemplate>,
        source_application: Application,
        target_application_template: Option<ApplicationTemplate>,
        target_application: Application,
        assignment: Option<&FormationAssignment>,
        reverse_assignment: Option<&FormationAssignment>,
    ) -> FormationTemplateInput {
        FormationTemplateInput::ApplicationTenantMapping(ApplicationTenantMappingInput {
            operation,
            formation_id: formation_id.to_string(),
            source_application_template,
            source_application,
            target_application_template,
            target_application,
            assignment: assignment.map(AssignmentSnapshot::from),
            reverse_assignment: reverse_assignment.map(AssignmentSnapshot::from),
        })
    }

    pub fn prepare_details_for_formation_lifecycle(
        &self,
        operation: FormationOperation,
        formation: &Formation,
    ) -> FormationTemplateInput {
        FormationTemplateInput::FormationLifecycle(FormationLifecycleInput {
            operation,
            formation_id: formation.id.clone(),
            formation: formation.clone(),
        })
    }
}
