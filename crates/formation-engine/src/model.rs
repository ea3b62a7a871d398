// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Domain model: formations, their participants and formation assignments.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FormationError;

/// Kind of a formation participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObjectType {
    Application,
    Runtime,
    RuntimeContext,
}

impl ObjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Application => "APPLICATION",
            Self::Runtime => "RUNTIME",
            Self::RuntimeContext => "RUNTIME_CONTEXT",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectType {
    type Err = FormationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "APPLICATION" => Ok(Self::Application),
            "RUNTIME" => Ok(Self::Runtime),
            "RUNTIME_CONTEXT" => Ok(Self::RuntimeContext),
            other => Err(FormationError::ValidationError {
                field: "object_type".to_string(),
                message: format!("unknown object type '{}'", other),
            }),
        }
    }
}

/// Delivery state of a formation assignment.
///
/// ```text
///   INITIAL ──► CREATING ──poll──► READY
///      │            └──────poll──► CREATE_ERROR
///      ├──────────────────────────► READY | CONFIG_PENDING | CREATE_ERROR
///   READY ──► DELETING ──poll──► (deleted) | DELETE_ERROR
///      └─────────────────────────► (deleted) | DELETE_ERROR
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentState {
    Initial,
    Creating,
    CreateError,
    Ready,
    Deleting,
    DeleteError,
    ConfigPending,
    InstanceCreatorDeleting,
    InstanceCreatorDeleteError,
}

impl AssignmentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initial => "INITIAL",
            Self::Creating => "CREATING",
            Self::CreateError => "CREATE_ERROR",
            Self::Ready => "READY",
            Self::Deleting => "DELETING",
            Self::DeleteError => "DELETE_ERROR",
            Self::ConfigPending => "CONFIG_PENDING",
            Self::InstanceCreatorDeleting => "INSTANCE_CREATOR_DELETING",
            Self::InstanceCreatorDeleteError => "INSTANCE_CREATOR_DELETE_ERROR",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Self::CreateError | Self::DeleteError | Self::InstanceCreatorDeleteError
        )
    }

    /// An async notification was accepted and awaits polling.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            Self::Creating | Self::Deleting | Self::InstanceCreatorDeleting
        )
    }
}

impl fmt::Display for AssignmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssignmentState {
    type Err = FormationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let state = match s {
            "INITIAL" => Self::Initial,
            "CREATING" => Self::Creating,
            "CREATE_ERROR" => Self::CreateError,
            "READY" => Self::Ready,
            "DELETING" => Self::Deleting,
            "DELETE_ERROR" => Self::DeleteError,
            "CONFIG_PENDING" => Self::ConfigPending,
            "INSTANCE_CREATOR_DELETING" => Self::InstanceCreatorDeleting,
            "INSTANCE_CREATOR_DELETE_ERROR" => Self::InstanceCreatorDeleteError,
            other => {
                return Err(FormationError::ValidationError {
                    field: "state".to_string(),
                    message: format!("unknown assignment state '{}'", other),
                });
            }
        };
        Ok(state)
    }
}

/// Category of a failure recorded on an assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum AssignmentErrorCode {
    /// Transport, template or persistence failure on our side.
    TechnicalError = 1,
    /// Failure reported by the remote system.
    ClientError = 2,
}

impl From<AssignmentErrorCode> for u8 {
    fn from(code: AssignmentErrorCode) -> Self {
        code as u8
    }
}

impl TryFrom<u8> for AssignmentErrorCode {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::TechnicalError),
            2 => Ok(Self::ClientError),
            other => Err(format!("unknown assignment error code {}", other)),
        }
    }
}

/// Failure detail stored in [`FormationAssignment::error`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentError {
    pub message: String,
    #[serde(rename = "errorCode")]
    pub error_code: AssignmentErrorCode,
}

impl AssignmentError {
    pub fn technical(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error_code: AssignmentErrorCode::TechnicalError,
        }
    }

    pub fn client(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error_code: AssignmentErrorCode::ClientError,
        }
    }

    /// Stored form: `{"error": {"message": ..., "errorCode": n}}`.
    pub fn to_value(&self) -> Value {
        serde_json::json!({ "error": self })
    }

    /// Reads the stored form back.
    pub fn from_value(value: &Value) -> Option<Self> {
        serde_json::from_value(value.get("error")?.clone()).ok()
    }
}

/// One directional notification relationship between two formation participants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormationAssignment {
    pub id: String,
    pub formation_id: String,
    pub tenant_id: String,
    pub source: String,
    pub source_type: ObjectType,
    pub target: String,
    pub target_type: ObjectType,
    pub state: AssignmentState,
    /// Last configuration received from the target.
    pub value: Option<Value>,
    /// Last failure, see [`AssignmentError::to_value`].
    pub error: Option<Value>,
    /// Location returned by an accepted async notification.
    pub poll_url: Option<String>,
    pub last_state_change_timestamp: Option<DateTime<Utc>>,
    pub last_notification_sent_timestamp: Option<DateTime<Utc>>,
}

impl FormationAssignment {
    /// New assignment in [`AssignmentState::Initial`] with a fresh ID.
    pub fn new(
        tenant_id: &str,
        formation_id: &str,
        source: (&str, ObjectType),
        target: (&str, ObjectType),
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            formation_id: formation_id.to_string(),
            tenant_id: tenant_id.to_string(),
            source: source.0.to_string(),
            source_type: source.1,
            target: target.0.to_string(),
            target_type: target.1,
            state: AssignmentState::Initial,
            value: None,
            error: None,
            poll_url: None,
            last_state_change_timestamp: None,
            last_notification_sent_timestamp: None,
        }
    }

    /// Whether `other` is the mirror of this assignment.
    pub fn is_reverse_of(&self, other: &FormationAssignment) -> bool {
        self.formation_id == other.formation_id
            && self.source == other.target
            && self.target == other.source
    }

    /// Moves to `state`, stamping the change time when the state differs.
    pub fn set_state(&mut self, state: AssignmentState) {
        if self.state != state {
            self.state = state;
            self.last_state_change_timestamp = Some(Utc::now());
        }
    }

    pub fn set_error(&mut self, error: AssignmentError) {
        self.error = Some(error.to_value());
    }

    pub fn assignment_error(&self) -> Option<AssignmentError> {
        self.error.as_ref().and_then(AssignmentError::from_value)
    }
}

/// Formation operation a notification is generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormationOperation {
    #[serde(rename = "assign")]
    Assign,
    #[serde(rename = "unassign")]
    Unassign,
    #[serde(rename = "createFormation")]
    CreateFormation,
    #[serde(rename = "deleteFormation")]
    DeleteFormation,
}

impl FormationOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Assign => "assign",
            Self::Unassign => "unassign",
            Self::CreateFormation => "createFormation",
            Self::DeleteFormation => "deleteFormation",
        }
    }
}

impl fmt::Display for FormationOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type Labels = BTreeMap<String, Value>;

/// A named formation. The name doubles as the scenario label of its members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Formation {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "TenantID")]
    pub tenant_id: String,
    pub name: String,
    #[serde(rename = "FormationTemplateID")]
    pub formation_template_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Application {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
    #[serde(default, rename = "ApplicationTemplateID")]
    pub application_template_id: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub labels: Labels,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ApplicationTemplate {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub labels: Labels,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Runtime {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub labels: Labels,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RuntimeContext {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "RuntimeID")]
    pub runtime_id: String,
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub labels: Labels,
}

/// Automatic scenario assignment: enrolls every object of a tenant that
/// matches the rule into the scenario (formation) named `scenario_name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomaticScenarioAssignment {
    pub scenario_name: String,
    pub tenant_id: String,
    pub target_tenant_id: String,
}

/// Request-scoped metadata threaded through every outbound call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub correlation_id: String,
}

impl RequestContext {
    /// Uses `correlation_id` when supplied, otherwise a fresh UUID.
    pub fn new(correlation_id: Option<String>) -> Self {
        Self {
            correlation_id: correlation_id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new(None)
    }
}
