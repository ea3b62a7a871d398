// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Snapshots that formation webhook templates are rendered against.
//!
//! Field names are PascalCase so templates read `{{.Application.ID}}`,
//! `{{.ReverseAssignment.Value}}` and so on.

use formation_webhook::TemplateInput;
use serde::Serialize;
use serde_json::Value;

use crate::model::{
    Application, ApplicationTemplate, Formation, FormationAssignment, FormationOperation, Runtime,
    RuntimeContext,
};

/// Template view of a formation assignment.
///
/// `Value` and `Error` carry the raw JSON text (`""` when unset) so a template
/// can embed them unquoted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AssignmentSnapshot {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "FormationID")]
    pub formation_id: String,
    pub source: String,
    pub source_type: String,
    pub target: String,
    pub target_type: String,
    pub state: String,
    pub value: String,
    pub error: String,
}

impl From<&FormationAssignment> for AssignmentSnapshot {
    fn from(fa: &FormationAssignment) -> Self {
        let raw = |v: &Option<Value>| v.as_ref().map(Value::to_string).unwrap_or_default();
        Self {
            id: fa.id.clone(),
            formation_id: fa.formation_id.clone(),
            source: fa.source.clone(),
            source_type: fa.source_type.to_string(),
            target: fa.target.clone(),
            target_type: fa.target_type.to_string(),
            state: fa.state.to_string(),
            value: raw(&fa.value),
            error: raw(&fa.error),
        }
    }
}

/// Input for configuration-changed webhooks between an application and a
/// runtime or runtime context.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConfigurationChangeInput {
    pub operation: FormationOperation,
    #[serde(rename = "FormationID")]
    pub formation_id: String,
    pub application_template: Option<ApplicationTemplate>,
    pub application: Option<Application>,
    pub runtime: Option<Runtime>,
    pub runtime_context: Option<RuntimeContext>,
    pub assignment: Option<AssignmentSnapshot>,
    pub reverse_assignment: Option<AssignmentSnapshot>,
}

/// Input for application-tenant-mapping webhooks between two applications.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ApplicationTenantMappingInput {
    pub operation: FormationOperation,
    #[serde(rename = "FormationID")]
    pub formation_id: String,
    pub source_application_template: Option<ApplicationTemplate>,
    pub source_application: Application,
    pub target_application_template: Option<ApplicationTemplate>,
    pub target_application: Application,
    pub assignment: Option<AssignmentSnapshot>,
    pub reverse_assignment: Option<AssignmentSnapshot>,
}

/// Input for formation-lifecycle webhooks.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct FormationLifecycleInput {
    pub operation: FormationOperation,
    #[serde(rename = "FormationID")]
    pub formation_id: String,
    pub formation: Formation,
}

/// The snapshot a formation notification is rendered from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FormationTemplateInput {
    ConfigurationChange(ConfigurationChangeInput),
    ApplicationTenantMapping(ApplicationTenantMappingInput),
    FormationLifecycle(FormationLifecycleInput),
}

impl FormationTemplateInput {
    /// IDs of the objects this notification is about.
    pub fn participants(&self) -> Vec<&str> {
        match self {
            Self::ConfigurationChange(input) => input
                .application
                .as_ref()
                .map(|a| a.id.as_str())
                .into_iter()
                .chain(input.runtime.as_ref().map(|r| r.id.as_str()))
                .chain(input.runtime_context.as_ref().map(|rc| rc.id.as_str()))
                .collect(),
            Self::ApplicationTenantMapping(input) => vec![
                input.source_application.id.as_str(),
                input.target_application.id.as_str(),
            ],
            Self::FormationLifecycle(_) => Vec::new(),
        }
    }

    /// The assignment this notification was generated for, if any.
    pub fn assignment(&self) -> Option<&AssignmentSnapshot> {
        match self {
            Self::ConfigurationChange(input) => input.assignment.as_ref(),
            Self::ApplicationTenantMapping(input) => input.assignment.as_ref(),
            Self::FormationLifecycle(_) => None,
        }
    }

    pub fn reverse_assignment(&self) -> Option<&AssignmentSnapshot> {
        match self {
            Self::ConfigurationChange(input) => input.reverse_assignment.as_ref(),
            Self::ApplicationTenantMapping(input) => input.reverse_assignment.as_ref(),
            Self::FormationLifecycle(_) => None,
        }
    }

    pub fn set_assignment(&mut self, fa: &FormationAssignment) {
        let snapshot = Some(AssignmentSnapshot::from(fa));
        match self {
            Self::ConfigurationChange(input) => input.assignment = snapshot,
            Self::ApplicationTenantMapping(input) => input.assignment = snapshot,
            Self::FormationLifecycle(_) => {}
        }
    }

    pub fn set_reverse_assignment(&mut self, fa: &FormationAssignment) {
        let snapshot = Some(AssignmentSnapshot::from(fa));
        match self {
            Self::ConfigurationChange(input) => input.reverse_assignment = snapshot,
            Self::ApplicationTenantMapping(input) => input.reverse_assignment = snapshot,
            Self::FormationLifecycle(_) => {}
        }
    }

    pub fn operation(&self) -> FormationOperation {
        match self {
            Self::ConfigurationChange(input) => input.operation,
            Self::ApplicationTenantMapping(input) => input.operation,
            Self::FormationLifecycle(input) => input.operation,
        }
    }
}

impl TemplateInput for FormationTemplateInput {
    fn template_data(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}
