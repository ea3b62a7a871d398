// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Formation assignment service.
//!
//! Generates assignment rows, applies notification outcomes to them and serves
//! the read paths used by reconciliation tooling.

use std::collections::HashMap;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use formation_webhook::{PollOutcome, Response, WebhookError};
use futures::StreamExt;
use tracing::{debug, info, instrument, warn};

use crate::directory::FormationDirectory;
use crate::error::{FormationError, Result};
use crate::model::{
    AssignmentError, AssignmentState, Formation, FormationAssignment, ObjectType, RequestContext,
};
use crate::notifications::{NotificationRequest, NotificationsService};
use crate::persistence::AssignmentRepository;

use super::{
    AssignmentMappingPair, AssignmentRequestMapping, KeyedLocks, MAX_PAGE_SIZE, Page, PageInfo,
    PairOperation, PairReport, ProcessingReport, match_assignments_with_requests,
};

const UNASSIGN_CONFIG_NOT_SUPPORTED: &str =
    "Error while deleting assignment: config propagation is not supported on unassign notifications";

/// Owns the formation assignment state machine.
#[derive(Clone)]
pub struct FormationAssignmentService {
    repository: Arc<dyn AssignmentRepository>,
    directory: Arc<dyn FormationDirectory>,
    notifications: NotificationsService,
    locks: KeyedLocks,
    max_concurrent_pairs: usize,
}

/// Where a single side of a pair ended up.
struct SideOutcome {
    assignment: FormationAssignment,
    terminal: bool,
}

impl FormationAssignmentService {
    pub fn new(
        repository: Arc<dyn AssignmentRepository>,
        directory: Arc<dyn FormationDirectory>,
        notifications: NotificationsService,
    ) -> Self {
        Self {
            repository,
            directory,
            notifications,
            locks: KeyedLocks::new(),
            max_concurrent_pairs: 1,
        }
    }

    /// Number of pairs a bulk run drives at once (at least one).
    pub fn with_max_concurrent_pairs(mut self, max_concurrent_pairs: usize) -> Self {
        self.max_concurrent_pairs = max_concurrent_pairs.max(1);
        self
    }

    pub fn notifications(&self) -> &NotificationsService {
        &self.notifications
    }

    // ========================================================================
    // Generation
    // ========================================================================

    /// Creates both directions between `object_id` and every other member of
    /// `formation`, in `INITIAL` state. Existing rows are returned unchanged.
    #[instrument(skip(self, ctx, formation), fields(formation_id = %formation.id, correlation_id = %ctx.correlation_id))]
    pub async fn generate_assignments(
        &self,
        ctx: &RequestContext,
        tenant_id: &str,
        object_id: &str,
        object_type: ObjectType,
        formation: &Formation,
    ) -> Result<Vec<FormationAssignment>> {
        let scenario = formation.name.as_str();
        let applications = self
            .directory
            .list_applications_in_scenario(tenant_id, scenario)
            .await?;
        let runtimes = self
            .directory
            .list_runtimes_in_scenario(tenant_id, scenario)
            .await?;
        let runtime_contexts = self
            .directory
            .list_runtime_contexts_in_scenario(tenant_id, scenario)
            .await?;

        let members = applications
            .into_iter()
            .map(|a| (a.id, ObjectType::Application))
            .chain(runtimes.into_iter().map(|r| (r.id, ObjectType::Runtime)))
            .chain(
                runtime_contexts
                    .into_iter()
                    .map(|rc| (rc.id, ObjectType::RuntimeContext)),
            )
            .filter(|(id, _)| id != object_id);

        let mut assignments = Vec::new();
        for (member_id, member_type) in members {
            let outgoing = FormationAssignment::new(
                tenant_id,
                &formation.id,
                (object_id, object_type),
                (&member_id, member_type),
            );
            let incoming = FormationAssignment::new(
                tenant_id,
                &formation.id,
                (&member_id, member_type),
                (object_id, object_type),
            );
            let (outgoing, incoming) = self.repository.create_pair(&outgoing, &incoming).await?;
            assignments.push(outgoing);
            assignments.push(incoming);
        }

        info!(
            object_id = %object_id,
            object_type = %object_type,
            assignments = assignments.len(),
            "Generated formation assignments"
        );

        Ok(assignments)
    }

    // ========================================================================
    // Pair processing
    // ========================================================================

    /// Notifies the forward side, then the reverse side, and records each
    /// outcome. Returns `Ok(true)` only when both sides are `READY`
    /// (or, for cleanup, deleted).
    ///
    /// Protocol failures are recorded on the row and yield `Ok(false)`;
    /// transport and template failures are recorded and returned as errors.
    pub async fn process_formation_assignment_pair(
        &self,
        ctx: &RequestContext,
        pair: AssignmentMappingPair,
    ) -> Result<bool> {
        self.run_pair(ctx, pair, PairOperation::ProcessPair).await
    }

    /// Unassign variant of [`Self::process_formation_assignment_pair`]. Rows
    /// are deleted once their target acknowledged or reported them gone.
    pub async fn cleanup_formation_assignment(
        &self,
        ctx: &RequestContext,
        pair: AssignmentMappingPair,
    ) -> Result<bool> {
        self.run_pair(ctx, pair, PairOperation::Cleanup).await
    }

    async fn run_pair(
        &self,
        ctx: &RequestContext,
        pair: AssignmentMappingPair,
        operation: PairOperation,
    ) -> Result<bool> {
        let _guard = self.locks.lock_all(pair.assignment_ids()).await;
        let AssignmentMappingPair {
            assignment: forward,
            reverse,
        } = pair;

        let reverse_current = match &reverse {
            Some(mapping) => self.current(&mapping.assignment).await?,
            None => None,
        };

        let forward = self
            .process_side(ctx, forward, reverse_current.as_ref(), operation)
            .await?;

        let Some(reverse) = reverse else {
            return Ok(forward.terminal);
        };
        let reverse = self
            .process_side(ctx, reverse, Some(&forward.assignment), operation)
            .await?;

        Ok(forward.terminal && reverse.terminal)
    }

    /// Latest persisted copy of `fa`, if it still exists.
    async fn current(&self, fa: &FormationAssignment) -> Result<Option<FormationAssignment>> {
        self.repository.get(&fa.tenant_id, &fa.id).await
    }

    async fn process_side(
        &self,
        ctx: &RequestContext,
        mapping: AssignmentRequestMapping,
        counterpart: Option<&FormationAssignment>,
        operation: PairOperation,
    ) -> Result<SideOutcome> {
        let AssignmentRequestMapping {
            request,
            assignment,
        } = mapping;

        let Some(mut fa) = self.current(&assignment).await? else {
            return match operation {
                PairOperation::Cleanup => Ok(SideOutcome {
                    assignment,
                    terminal: true,
                }),
                PairOperation::ProcessPair => Err(FormationError::AssignmentNotFound {
                    assignment_id: assignment.id,
                }),
            };
        };

        if fa.state.is_in_flight() {
            debug!(
                assignment_id = %fa.id,
                state = %fa.state,
                "Notification already in flight, waiting for poll"
            );
            return Ok(SideOutcome {
                assignment: fa,
                terminal: false,
            });
        }
        if operation == PairOperation::ProcessPair && fa.state == AssignmentState::Ready {
            return Ok(SideOutcome {
                assignment: fa,
                terminal: true,
            });
        }

        let Some(mut request) = request else {
            return self.complete_without_notification(fa, operation).await;
        };

        request.object.set_assignment(&fa);
        if let Some(counterpart) = counterpart {
            request.object.set_reverse_assignment(counterpart);
        }

        fa.last_notification_sent_timestamp = Some(Utc::now());
        debug!(
            assignment_id = %fa.id,
            webhook_id = %request.webhook.id,
            correlation_id = %ctx.correlation_id,
            operation = %request.object.operation(),
            "Sending formation assignment notification"
        );
        let result = self.notifications.send_notification(&request).await;

        match operation {
            PairOperation::ProcessPair => self.apply_assign_outcome(fa, &request, result).await,
            PairOperation::Cleanup => self.apply_unassign_outcome(fa, &request, result).await,
        }
    }

    async fn complete_without_notification(
        &self,
        mut fa: FormationAssignment,
        operation: PairOperation,
    ) -> Result<SideOutcome> {
        match operation {
            PairOperation::ProcessPair => {
                fa.set_state(AssignmentState::Ready);
                fa.error = None;
                fa.poll_url = None;
                self.repository.update(&fa).await?;
            }
            PairOperation::Cleanup => {
                self.repository.delete(&fa.tenant_id, &fa.id).await?;
            }
        }

        debug!(assignment_id = %fa.id, "No notification for assignment");
        Ok(SideOutcome {
            assignment: fa,
            terminal: true,
        })
    }

    async fn apply_assign_outcome(
        &self,
        mut fa: FormationAssignment,
        request: &NotificationRequest,
        result: std::result::Result<Response, WebhookError>,
    ) -> Result<SideOutcome> {
        let terminal = match result {
            Ok(response) if request.webhook.is_async() => {
                fa.set_state(AssignmentState::Creating);
                fa.poll_url = response.poll_location().map(str::to_string);
                fa.error = None;
                false
            }
            Ok(response) if response.is_incomplete() => {
                fa.set_state(AssignmentState::ConfigPending);
                fa.value = response.config_value();
                fa.error = None;
                fa.poll_url = None;
                false
            }
            Ok(response) => {
                fa.set_state(AssignmentState::Ready);
                fa.value = response.config_value();
                fa.error = None;
                fa.poll_url = None;
                true
            }
            Err(err) if err.is_rejection() => {
                warn!(assignment_id = %fa.id, error = %err, "Assign notification rejected");
                fa.set_state(AssignmentState::CreateError);
                fa.set_error(AssignmentError::client(err.to_string()));
                fa.poll_url = None;
                false
            }
            Err(err) => {
                return Err(self
                    .fail_technically(fa, AssignmentState::CreateError, &err)
                    .await);
            }
        };

        self.repository.update(&fa).await?;
        info!(assignment_id = %fa.id, state = %fa.state, "Formation assignment updated");
        Ok(SideOutcome {
            assignment: fa,
            terminal,
        })
    }

    async fn apply_unassign_outcome(
        &self,
        mut fa: FormationAssignment,
        request: &NotificationRequest,
        result: std::result::Result<Response, WebhookError>,
    ) -> Result<SideOutcome> {
        match result {
            Ok(response) if request.webhook.is_async() => {
                fa.set_state(AssignmentState::Deleting);
                fa.poll_url = response.poll_location().map(str::to_string);
                fa.error = None;
            }
            Ok(response) if response.is_incomplete() => {
                fa.set_state(AssignmentState::DeleteError);
                fa.set_error(AssignmentError::client(UNASSIGN_CONFIG_NOT_SUPPORTED));
            }
            Ok(_) => return self.remove(fa).await,
            Err(err) if err.is_gone() => {
                info!(assignment_id = %fa.id, "Target reported assignment gone");
                return self.remove(fa).await;
            }
            Err(err) if err.is_rejection() => {
                warn!(assignment_id = %fa.id, error = %err, "Unassign notification rejected");
                fa.set_state(AssignmentState::DeleteError);
                fa.set_error(AssignmentError::client(err.to_string()));
            }
            Err(err) => {
                return Err(self
                    .fail_technically(fa, AssignmentState::DeleteError, &err)
                    .await);
            }
        }

        self.repository.update(&fa).await?;
        info!(assignment_id = %fa.id, state = %fa.state, "Formation assignment updated");
        Ok(SideOutcome {
            assignment: fa,
            terminal: false,
        })
    }

    async fn remove(&self, fa: FormationAssignment) -> Result<SideOutcome> {
        self.repository.delete(&fa.tenant_id, &fa.id).await?;
        info!(assignment_id = %fa.id, "Formation assignment deleted");
        Ok(SideOutcome {
            assignment: fa,
            terminal: true,
        })
    }

    /// Records a transport or template failure and returns the error to surface.
    async fn fail_technically(
        &self,
        mut fa: FormationAssignment,
        state: AssignmentState,
        err: &WebhookError,
    ) -> FormationError {
        warn!(
            assignment_id = %fa.id,
            error = %err,
            retryable = err.is_retryable(),
            "Formation assignment notification failed"
        );
        fa.set_state(state);
        fa.set_error(AssignmentError::technical(err.to_string()));
        fa.poll_url = None;
        if let Err(update_err) = self.repository.update(&fa).await {
            return update_err;
        }

        FormationError::notification_failed(&fa.id, err)
    }

    // ========================================================================
    // Polling
    // ========================================================================

    /// Polls the location stored on an in-flight assignment and applies the
    /// reported status. A pending status leaves the row untouched.
    #[instrument(skip(self, ctx, request), fields(correlation_id = %ctx.correlation_id))]
    pub async fn poll_formation_assignment(
        &self,
        ctx: &RequestContext,
        tenant_id: &str,
        assignment_id: &str,
        request: &NotificationRequest,
    ) -> Result<PollOutcome> {
        let _guard = self.locks.lock_all([assignment_id]).await;

        let mut fa = self.get(tenant_id, assignment_id).await?;
        let poll_url = match (&fa.poll_url, fa.state.is_in_flight()) {
            (Some(url), true) => url.clone(),
            _ => {
                return Err(FormationError::InvalidAssignmentState {
                    assignment_id: fa.id,
                    expected: "CREATING, DELETING or INSTANCE_CREATOR_DELETING with a poll URL"
                        .to_string(),
                    actual: fa.state.to_string(),
                });
            }
        };

        let (error_state, deleting) = match fa.state {
            AssignmentState::Creating => (AssignmentState::CreateError, false),
            AssignmentState::InstanceCreatorDeleting => {
                (AssignmentState::InstanceCreatorDeleteError, true)
            }
            _ => (AssignmentState::DeleteError, true),
        };

        let outcome = match self.notifications.poll_notification(request, &poll_url).await {
            Ok(status) => match status.outcome() {
                PollOutcome::Success if deleting => {
                    self.remove(fa).await?;
                    return Ok(PollOutcome::Success);
                }
                PollOutcome::Success => {
                    fa.set_state(AssignmentState::Ready);
                    fa.error = None;
                    fa.poll_url = None;
                    PollOutcome::Success
                }
                PollOutcome::Pending => {
                    debug!(assignment_id = %fa.id, "Operation still in progress");
                    return Ok(PollOutcome::Pending);
                }
                PollOutcome::Failed => {
                    let message = status
                        .error_message()
                        .unwrap_or("operation reported failed status")
                        .to_string();
                    fa.set_state(error_state);
                    fa.set_error(AssignmentError::client(message));
                    fa.poll_url = None;
                    PollOutcome::Failed
                }
            },
            Err(err) if err.is_rejection() => {
                fa.set_state(error_state);
                fa.set_error(AssignmentError::client(err.to_string()));
                fa.poll_url = None;
                PollOutcome::Failed
            }
            Err(err) if err.is_retryable() => {
                warn!(assignment_id = %fa.id, error = %err, "Poll failed, will retry");
                return Err(FormationError::notification_failed(&fa.id, &err));
            }
            Err(err) => return Err(self.fail_technically(fa, error_state, &err).await),
        };

        self.repository.update(&fa).await?;
        info!(assignment_id = %fa.id, state = %fa.state, outcome = ?outcome, "Poll applied");
        Ok(outcome)
    }

    // ========================================================================
    // Bulk processing
    // ========================================================================

    /// Matches assignments with requests and applies `operation` to every
    /// pair. One failing pair never stops the others.
    #[allow(clippy::too_many_arguments)]
    pub async fn process_formation_assignments_with_report(
        &self,
        ctx: &RequestContext,
        assignments: &[FormationAssignment],
        runtime_context_to_runtime: &HashMap<String, String>,
        application_to_template: &HashMap<String, String>,
        requests: &[NotificationRequest],
        operation: PairOperation,
    ) -> ProcessingReport {
        let pairs = match_assignments_with_requests(
            assignments,
            runtime_context_to_runtime,
            application_to_template,
            requests,
        );

        info!(
            pairs = pairs.len(),
            requests = requests.len(),
            operation = ?operation,
            max_concurrent_pairs = self.max_concurrent_pairs,
            "Processing formation assignments"
        );

        let reports = futures::stream::iter(pairs.into_iter().map(|pair| async move {
            let assignment_id = pair.assignment.assignment.id.clone();
            let reverse_assignment_id = pair.reverse.as_ref().map(|r| r.assignment.id.clone());
            let result = self.run_pair(ctx, pair, operation).await;
            if let Err(err) = &result {
                warn!(assignment_id = %assignment_id, error = %err, "Formation assignment pair failed");
            }
            PairReport {
                assignment_id,
                reverse_assignment_id,
                result,
            }
        }))
        .buffered(self.max_concurrent_pairs)
        .collect::<Vec<_>>()
        .await;

        ProcessingReport { pairs: reports }
    }

    /// Like [`Self::process_formation_assignments_with_report`], returning the
    /// first error in input order.
    pub async fn process_formation_assignments(
        &self,
        ctx: &RequestContext,
        assignments: &[FormationAssignment],
        runtime_context_to_runtime: &HashMap<String, String>,
        application_to_template: &HashMap<String, String>,
        requests: &[NotificationRequest],
        operation: PairOperation,
    ) -> Result<()> {
        self.process_formation_assignments_with_report(
            ctx,
            assignments,
            runtime_context_to_runtime,
            application_to_template,
            requests,
            operation,
        )
        .await
        .into_result()
    }

    // ========================================================================
    // Read paths
    // ========================================================================

    /// One page per formation, all starting at `cursor`.
    pub async fn list_by_formation_ids(
        &self,
        tenant_id: &str,
        formation_ids: &[String],
        page_size: i64,
        cursor: Option<&str>,
    ) -> Result<Vec<Page>> {
        if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(FormationError::ValidationError {
                field: "page_size".to_string(),
                message: format!("page size must be between 1 and {}", MAX_PAGE_SIZE),
            });
        }
        let offset = match cursor.filter(|c| !c.is_empty()) {
            Some(cursor) => decode_cursor(cursor)?,
            None => 0,
        };

        let mut pages = Vec::with_capacity(formation_ids.len());
        for formation_id in formation_ids {
            let total_count = self
                .repository
                .count_for_formation(tenant_id, formation_id)
                .await?;
            let data = self
                .repository
                .list_for_formation(tenant_id, formation_id, page_size, offset)
                .await?;

            let next_offset = offset + data.len() as i64;
            let has_next_page = next_offset < total_count;
            pages.push(Page {
                formation_id: formation_id.clone(),
                data,
                total_count,
                page_info: PageInfo {
                    start_cursor: cursor.unwrap_or_default().to_string(),
                    end_cursor: if has_next_page {
                        encode_cursor(next_offset)
                    } else {
                        String::new()
                    },
                    has_next_page,
                },
            });
        }

        Ok(pages)
    }

    /// Every assignment of each formation, in the order of `formation_ids`.
    pub async fn list_by_formation_ids_no_paging(
        &self,
        tenant_id: &str,
        formation_ids: &[String],
    ) -> Result<Vec<Vec<FormationAssignment>>> {
        let mut result = Vec::with_capacity(formation_ids.len());
        for formation_id in formation_ids {
            result.push(
                self.repository
                    .list_all_for_formation(tenant_id, formation_id)
                    .await?,
            );
        }
        Ok(result)
    }

    /// Assignments in `formation_id` with `object_id` as source or target.
    pub async fn list_formation_assignments_for_object_id(
        &self,
        tenant_id: &str,
        formation_id: &str,
        object_id: &str,
    ) -> Result<Vec<FormationAssignment>> {
        self.repository
            .list_for_object(tenant_id, formation_id, object_id)
            .await
    }

    pub async fn get_for_formation(
        &self,
        tenant_id: &str,
        id: &str,
        formation_id: &str,
    ) -> Result<FormationAssignment> {
        self.repository
            .get_for_formation(tenant_id, id, formation_id)
            .await?
            .ok_or_else(|| FormationError::AssignmentNotFound {
                assignment_id: id.to_string(),
            })
    }

    pub async fn get(&self, tenant_id: &str, id: &str) -> Result<FormationAssignment> {
        self.repository
            .get(tenant_id, id)
            .await?
            .ok_or_else(|| FormationError::AssignmentNotFound {
                assignment_id: id.to_string(),
            })
    }

    pub async fn exists(&self, tenant_id: &str, id: &str) -> Result<bool> {
        self.repository.exists(tenant_id, id).await
    }
}

fn encode_cursor(offset: i64) -> String {
    BASE64.encode(offset.to_string())
}

fn decode_cursor(cursor: &str) -> Result<i64> {
    let invalid = || FormationError::ValidationError {
        field: "cursor".to_string(),
        message: "cursor is not valid".to_string(),
    };

    let decoded = BASE64.decode(cursor).map_err(|_| invalid())?;
    let offset: i64 = String::from_utf8(decoded)
        .map_err(|_| invalid())?
        .parse()
        .map_err(|_| invalid())?;

    if offset < 0 {
        return Err(invalid());
    }
    Ok(offset)
}
