// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Formation membership orchestration.
//!
//! Joins and leaves of formation participants flow through here:
//!
//! ```text
//! assign_object:   generate assignments ─► generate notifications ─► process pairs
//! unassign_object: (ASA check) ─► generate notifications ─► cleanup pairs
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use crate::asa::{AsaEngine, ScenarioProcessor};
use crate::assignment::{
    AssignmentMappingPair, AssignmentRequestMapping, FormationAssignmentService, PairOperation,
    PairReport, ProcessingReport,
};
use crate::directory::FormationDirectory;
use crate::error::{FormationError, Result};
use crate::model::{
    AssignmentState, AutomaticScenarioAssignment, Formation, FormationAssignment,
    FormationOperation, ObjectType, RequestContext,
};
use crate::notifications::NotificationsService;

/// Assigns and unassigns formation participants.
#[derive(Clone)]
pub struct FormationMembershipService {
    directory: Arc<dyn FormationDirectory>,
    assignments: FormationAssignmentService,
    asa_engine: Arc<dyn AsaEngine>,
}

impl FormationMembershipService {
    pub fn new(
        directory: Arc<dyn FormationDirectory>,
        assignments: FormationAssignmentService,
        asa_engine: Arc<dyn AsaEngine>,
    ) -> Self {
        Self {
            directory,
            assignments,
            asa_engine,
        }
    }

    pub fn assignments(&self) -> &FormationAssignmentService {
        &self.assignments
    }

    fn notifications(&self) -> &NotificationsService {
        self.assignments.notifications()
    }

    /// Adds `object_id` to the formation named `formation_name` and notifies
    /// every pair it forms with the existing members.
    #[instrument(skip(self, ctx), fields(correlation_id = %ctx.correlation_id))]
    pub async fn assign_object(
        &self,
        ctx: &RequestContext,
        tenant_id: &str,
        object_id: &str,
        object_type: ObjectType,
        formation_name: &str,
    ) -> Result<ProcessingReport> {
        let formation = self.formation_by_name(tenant_id, formation_name).await?;

        let assignments = self
            .assignments
            .generate_assignments(ctx, tenant_id, object_id, object_type, &formation)
            .await?;
        let requests = self
            .notifications()
            .generate_formation_assignment_notifications(
                ctx,
                tenant_id,
                object_id,
                &formation,
                FormationOperation::Assign,
                object_type,
            )
            .await?;

        let (runtime_context_to_runtime, application_to_template) =
            self.resolution_maps(tenant_id, &assignments).await?;

        let report = self
            .assignments
            .process_formation_assignments_with_report(
                ctx,
                &assignments,
                &runtime_context_to_runtime,
                &application_to_template,
                &requests,
                PairOperation::ProcessPair,
            )
            .await;

        info!(
            formation_id = %formation.id,
            pairs = report.pairs.len(),
            failures = report.failures().count(),
            "Object assigned to formation"
        );
        Ok(report)
    }

    /// Removes `object_id` from the formation named `formation_name`.
    ///
    /// Memberships that stem from an automatic scenario assignment are left
    /// untouched and yield an empty report.
    #[instrument(skip(self, ctx), fields(correlation_id = %ctx.correlation_id))]
    pub async fn unassign_object(
        &self,
        ctx: &RequestContext,
        tenant_id: &str,
        object_id: &str,
        object_type: ObjectType,
        formation_name: &str,
    ) -> Result<ProcessingReport> {
        if self
            .asa_engine
            .is_formation_coming_from_asa(ctx, object_id, formation_name, object_type)
            .await?
        {
            info!(
                object_id = %object_id,
                formation_name = %formation_name,
                "Formation membership comes from an automatic scenario assignment, skipping unassign"
            );
            return Ok(ProcessingReport::default());
        }

        self.unassign(ctx, tenant_id, object_id, object_type, formation_name)
            .await
    }

    async fn unassign(
        &self,
        ctx: &RequestContext,
        tenant_id: &str,
        object_id: &str,
        object_type: ObjectType,
        formation_name: &str,
    ) -> Result<ProcessingReport> {
        let formation = self.formation_by_name(tenant_id, formation_name).await?;

        let requests = self
            .notifications()
            .generate_formation_assignment_notifications(
                ctx,
                tenant_id,
                object_id,
                &formation,
                FormationOperation::Unassign,
                object_type,
            )
            .await?;
        let assignments = self
            .assignments
            .list_formation_assignments_for_object_id(tenant_id, &formation.id, object_id)
            .await?;

        let (runtime_context_to_runtime, application_to_template) =
            self.resolution_maps(tenant_id, &assignments).await?;

        let report = self
            .assignments
            .process_formation_assignments_with_report(
                ctx,
                &assignments,
                &runtime_context_to_runtime,
                &application_to_template,
                &requests,
                PairOperation::Cleanup,
            )
            .await;

        info!(
            formation_id = %formation.id,
            pairs = report.pairs.len(),
            failures = report.failures().count(),
            "Object unassigned from formation"
        );
        Ok(report)
    }

    /// Registers an ASA and enrolls every object it matches.
    pub async fn create_automatic_scenario_assignment(
        &self,
        ctx: &RequestContext,
        asa: &AutomaticScenarioAssignment,
    ) -> Result<()> {
        self.formation_by_name(&asa.tenant_id, &asa.scenario_name)
            .await?;
        self.asa_engine
            .ensure_scenario_assigned(ctx, asa, self)
            .await
    }

    /// Removes every object the ASA enrolled.
    pub async fn delete_automatic_scenario_assignment(
        &self,
        ctx: &RequestContext,
        asa: &AutomaticScenarioAssignment,
    ) -> Result<()> {
        self.asa_engine
            .unassign_formation_coming_from_asa(ctx, asa, self)
            .await
    }

    pub async fn scenarios_for_object(
        &self,
        ctx: &RequestContext,
        object_id: &str,
        object_type: ObjectType,
    ) -> Result<Vec<String>> {
        self.asa_engine
            .get_scenarios_from_matching_asas(ctx, object_id, object_type)
            .await
    }

    /// Sends the formation-lifecycle notifications of `formation`.
    ///
    /// Returns how many webhooks acknowledged. A gone response counts as
    /// acknowledged when the formation is being deleted.
    #[instrument(skip(self, ctx, formation), fields(formation_id = %formation.id, correlation_id = %ctx.correlation_id))]
    pub async fn notify_formation_lifecycle(
        &self,
        ctx: &RequestContext,
        tenant_id: &str,
        formation: &Formation,
        operation: FormationOperation,
    ) -> Result<usize> {
        if !matches!(
            operation,
            FormationOperation::CreateFormation | FormationOperation::DeleteFormation
        ) {
            return Err(FormationError::ValidationError {
                field: "operation".to_string(),
                message: format!("{} is not a formation lifecycle operation", operation),
            });
        }

        let requests = self
            .notifications()
            .generate_formation_notifications(ctx, tenant_id, formation, operation)
            .await?;

        let mut sent = 0;
        for request in &requests {
            match self.notifications().send_notification(request).await {
                Ok(_) => sent += 1,
                Err(err) if err.is_gone() && operation == FormationOperation::DeleteFormation => {
                    sent += 1
                }
                Err(err) => {
                    warn!(webhook_id = %request.webhook.id, error = %err, "Formation lifecycle notification failed");
                    return Err(FormationError::notification_failed(&formation.id, &err));
                }
            }
        }

        info!(operation = %operation, sent, "Formation lifecycle notifications sent");
        Ok(sent)
    }

    /// Re-sends notifications for every assignment of the formation stuck in
    /// an error or initial state.
    #[instrument(skip(self, ctx), fields(correlation_id = %ctx.correlation_id))]
    pub async fn resynchronize_formation_notifications(
        &self,
        ctx: &RequestContext,
        tenant_id: &str,
        formation_id: &str,
    ) -> Result<ProcessingReport> {
        let formation = self
            .directory
            .get_formation(tenant_id, formation_id)
            .await?
            .ok_or_else(|| FormationError::object_not_found("Formation", formation_id))?;

        let all = self
            .assignments
            .list_by_formation_ids_no_paging(tenant_id, &[formation.id.clone()])
            .await?
            .into_iter()
            .flatten()
            .collect::<Vec<_>>();

        let mut consumed: HashSet<&str> = HashSet::new();
        let mut report = ProcessingReport::default();
        for fa in all.iter().filter(|fa| needs_resync(fa.state)) {
            if !consumed.insert(fa.id.as_str()) {
                continue;
            }
            let reverse = all
                .iter()
                .find(|other| other.is_reverse_of(fa) && !consumed.contains(other.id.as_str()));
            if let Some(reverse) = reverse {
                consumed.insert(reverse.id.as_str());
            }

            let (notification_op, pair_op) = if fa.state == AssignmentState::DeleteError {
                (FormationOperation::Unassign, PairOperation::Cleanup)
            } else {
                (FormationOperation::Assign, PairOperation::ProcessPair)
            };

            let result = self
                .resync_pair(ctx, &formation, fa, reverse, notification_op, pair_op)
                .await;
            report.pairs.push(PairReport {
                assignment_id: fa.id.clone(),
                reverse_assignment_id: reverse.map(|r| r.id.clone()),
                result,
            });
        }

        info!(
            formation_id = %formation.id,
            pairs = report.pairs.len(),
            failures = report.failures().count(),
            "Formation notifications resynchronized"
        );
        Ok(report)
    }

    async fn resync_pair(
        &self,
        ctx: &RequestContext,
        formation: &Formation,
        fa: &FormationAssignment,
        reverse: Option<&FormationAssignment>,
        notification_op: FormationOperation,
        pair_op: PairOperation,
    ) -> Result<bool> {
        let forward = self.mapping(ctx, formation, fa, notification_op).await?;
        let reverse = match reverse {
            Some(reverse) => Some(self.mapping(ctx, formation, reverse, notification_op).await?),
            None => None,
        };
        let pair = AssignmentMappingPair {
            assignment: forward,
            reverse,
        };

        match pair_op {
            PairOperation::ProcessPair => {
                self.assignments
                    .process_formation_assignment_pair(ctx, pair)
                    .await
            }
            PairOperation::Cleanup => self.assignments.cleanup_formation_assignment(ctx, pair).await,
        }
    }

    async fn mapping(
        &self,
        ctx: &RequestContext,
        formation: &Formation,
        fa: &FormationAssignment,
        operation: FormationOperation,
    ) -> Result<AssignmentRequestMapping> {
        Ok(AssignmentRequestMapping {
            request: self
                .notifications()
                .generate_notification(ctx, formation, fa, operation)
                .await?,
            assignment: fa.clone(),
        })
    }

    async fn formation_by_name(&self, tenant_id: &str, name: &str) -> Result<Formation> {
        self.directory
            .get_formation_by_name(tenant_id, name)
            .await?
            .ok_or_else(|| FormationError::object_not_found("Formation", name))
    }

    /// Runtime context to runtime and application to application template
    /// lookups for every assignment target.
    async fn resolution_maps(
        &self,
        tenant_id: &str,
        assignments: &[FormationAssignment],
    ) -> Result<(HashMap<String, String>, HashMap<String, String>)> {
        let mut runtime_context_to_runtime = HashMap::new();
        let mut application_to_template = HashMap::new();

        for fa in assignments {
            match fa.target_type {
                ObjectType::RuntimeContext
                    if !runtime_context_to_runtime.contains_key(&fa.target) =>
                {
                    if let Some(rc) = self
                        .directory
                        .get_runtime_context(tenant_id, &fa.target)
                        .await?
                    {
                        runtime_context_to_runtime.insert(rc.id, rc.runtime_id);
                    }
                }
                ObjectType::Application if !application_to_template.contains_key(&fa.target) => {
                    if let Some(template_id) = self
                        .directory
                        .get_application(tenant_id, &fa.target)
                        .await?
                        .and_then(|app| app.application_template_id)
                    {
                        application_to_template.insert(fa.target.clone(), template_id);
                    }
                }
                _ => {}
            }
        }

        Ok((runtime_context_to_runtime, application_to_template))
    }
}

fn needs_resync(state: AssignmentState) -> bool {
    matches!(
        state,
        AssignmentState::Initial | AssignmentState::CreateError | AssignmentState::DeleteError
    )
}

#[async_trait]
impl ScenarioProcessor for FormationMembershipService {
    async fn process_scenario(
        &self,
        ctx: &RequestContext,
        tenant_id: &str,
        object_id: &str,
        object_type: ObjectType,
        formation_name: &str,
        operation: FormationOperation,
    ) -> Result<ProcessingReport> {
        match operation {
            FormationOperation::Assign => {
                self.assign_object(ctx, tenant_id, object_id, object_type, formation_name)
                    .await
            }
            // The ASA itself is being removed, so its memberships must go too.
            FormationOperation::Unassign => {
                self.unassign(ctx, tenant_id, object_id, object_type, formation_name)
                    .await
            }
            other => Err(FormationError::ValidationError {
                field: "operation".to_string(),
                message: format!("{} cannot be applied to a scenario participant", other),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_resync() {
        assert!(needs_resync(AssignmentState::Initial));
        assert!(needs_resync(AssignmentState::CreateError));
        assert!(needs_resync(AssignmentState::DeleteError));
        assert!(!needs_resync(AssignmentState::Ready));
        assert!(!needs_resync(AssignmentState::Creating));
        assert!(!needs_resync(AssignmentState::ConfigPending));
    }
}
