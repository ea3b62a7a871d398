// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Pairing formation assignments with the notification requests meant for them.

use std::collections::{HashMap, HashSet};

use crate::model::{FormationAssignment, ObjectType};
use crate::notifications::NotificationRequest;

/// An assignment and the request notifying its target, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentRequestMapping {
    pub request: Option<NotificationRequest>,
    pub assignment: FormationAssignment,
}

/// One directional exchange plus its mirror.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentMappingPair {
    pub assignment: AssignmentRequestMapping,
    pub reverse: Option<AssignmentRequestMapping>,
}

impl AssignmentMappingPair {
    /// IDs of every assignment the pair touches.
    pub fn assignment_ids(&self) -> Vec<String> {
        std::iter::once(self.assignment.assignment.id.clone())
            .chain(self.reverse.as_ref().map(|r| r.assignment.id.clone()))
            .collect()
    }
}

/// Builds one pair per unordered participant pair.
///
/// A request belongs to an assignment when it was generated for that very
/// assignment, or when its webhook owner is the assignment target (runtime
/// contexts resolved to their runtime, applications to their template) and
/// the assignment source is one of its participants.
pub fn match_assignments_with_requests(
    assignments: &[FormationAssignment],
    runtime_context_to_runtime: &HashMap<String, String>,
    application_to_template: &HashMap<String, String>,
    requests: &[NotificationRequest],
) -> Vec<AssignmentMappingPair> {
    let mapping = |fa: &FormationAssignment| AssignmentRequestMapping {
        request: find_request(
            fa,
            runtime_context_to_runtime,
            application_to_template,
            requests,
        )
        .cloned(),
        assignment: fa.clone(),
    };

    let mut consumed: HashSet<&str> = HashSet::new();
    let mut pairs = Vec::new();

    for fa in assignments {
        if consumed.contains(fa.id.as_str()) {
            continue;
        }
        consumed.insert(fa.id.as_str());

        let reverse = assignments
            .iter()
            .find(|other| other.id != fa.id && other.is_reverse_of(fa))
            .filter(|other| !consumed.contains(other.id.as_str()));
        if let Some(reverse) = reverse {
            consumed.insert(reverse.id.as_str());
        }

        pairs.push(AssignmentMappingPair {
            assignment: mapping(fa),
            reverse: reverse.map(&mapping),
        });
    }

    pairs
}

fn find_request<'a>(
    fa: &FormationAssignment,
    runtime_context_to_runtime: &HashMap<String, String>,
    application_to_template: &HashMap<String, String>,
    requests: &'a [NotificationRequest],
) -> Option<&'a NotificationRequest> {
    let generated_for = requests.iter().find(|request| {
        request
            .object
            .assignment()
            .is_some_and(|snapshot| snapshot.id == fa.id)
    });
    if generated_for.is_some() {
        return generated_for;
    }

    let resolved_target = match fa.target_type {
        ObjectType::RuntimeContext => runtime_context_to_runtime.get(&fa.target),
        ObjectType::Application => application_to_template.get(&fa.target),
        ObjectType::Runtime => None,
    };

    requests.iter().find(|request| {
        let Some(owner) = request.owner_id() else {
            return false;
        };
        let owned_by_target =
            owner == fa.target || resolved_target.is_some_and(|resolved| resolved == owner);

        owned_by_target
            && request
                .object
                .participants()
                .contains(&fa.source.as_str())
    })
}
