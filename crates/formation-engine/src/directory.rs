// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Read access to formations, their participants and webhooks.
//!
//! The engine does not own these objects; deployments back the trait with
//! whatever stores the labels, applications and runtimes.

use async_trait::async_trait;
use formation_webhook::{Webhook, WebhookOwner, WebhookType};

use crate::error::Result;
use crate::model::{Application, ApplicationTemplate, Formation, Runtime, RuntimeContext};

/// Lookups of formation participants and their webhooks, scoped by tenant.
///
/// `get_*` methods return `Ok(None)` for unknown IDs.
#[allow(missing_docs)]
#[async_trait]
pub trait FormationDirectory: Send + Sync {
    /// Applications labeled with `scenario`.
    async fn list_applications_in_scenario(
        &self,
        tenant_id: &str,
        scenario: &str,
    ) -> Result<Vec<Application>>;

    async fn list_runtimes_in_scenario(&self, tenant_id: &str, scenario: &str)
    -> Result<Vec<Runtime>>;

    async fn list_runtime_contexts_in_scenario(
        &self,
        tenant_id: &str,
        scenario: &str,
    ) -> Result<Vec<RuntimeContext>>;

    async fn get_application(&self, tenant_id: &str, id: &str) -> Result<Option<Application>>;

    async fn get_application_template(&self, id: &str) -> Result<Option<ApplicationTemplate>>;

    async fn get_runtime(&self, tenant_id: &str, id: &str) -> Result<Option<Runtime>>;

    async fn get_runtime_context(&self, tenant_id: &str, id: &str)
    -> Result<Option<RuntimeContext>>;

    async fn get_formation(&self, tenant_id: &str, id: &str) -> Result<Option<Formation>>;

    async fn get_formation_by_name(&self, tenant_id: &str, name: &str)
    -> Result<Option<Formation>>;

    /// The webhook of `webhook_type` registered on `owner`, if any.
    async fn get_webhook(
        &self,
        tenant_id: &str,
        owner: &WebhookOwner,
        webhook_type: WebhookType,
    ) -> Result<Option<Webhook>>;

    /// Webhooks registered on a formation template.
    async fn list_formation_template_webhooks(
        &self,
        tenant_id: &str,
        formation_template_id: &str,
    ) -> Result<Vec<Webhook>>;
}
