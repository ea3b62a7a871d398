// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Formation assignment lifecycle.
//!
//! [`FormationAssignmentService`] drives every assignment row through its
//! state machine in response to notification outcomes. Pairs are matched with
//! their requests in [`matching`] and serialized per row by [`KeyedLocks`].

pub mod locks;
pub mod matching;
pub mod service;

pub use locks::KeyedLocks;
pub use matching::{AssignmentMappingPair, AssignmentRequestMapping, match_assignments_with_requests};
pub use service::FormationAssignmentService;

use serde::Serialize;

use crate::error::{FormationError, Result};
use crate::model::FormationAssignment;

/// Largest page [`FormationAssignmentService::list_by_formation_ids`] serves.
pub const MAX_PAGE_SIZE: i64 = 200;

/// What to do with each matched pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairOperation {
    /// Notify both sides and record the outcome (assign).
    ProcessPair,
    /// Notify both sides and remove the rows (unassign).
    Cleanup,
}

/// Outcome of one pair in a bulk run.
#[derive(Debug, Clone)]
pub struct PairReport {
    pub assignment_id: String,
    pub reverse_assignment_id: Option<String>,
    /// `Ok(true)` when both sides reached a terminal state.
    pub result: Result<bool>,
}

/// Per-pair outcomes of a bulk run, in input order.
#[derive(Debug, Clone, Default)]
pub struct ProcessingReport {
    pub pairs: Vec<PairReport>,
}

impl ProcessingReport {
    pub fn first_error(&self) -> Option<&FormationError> {
        self.pairs.iter().find_map(|pair| pair.result.as_ref().err())
    }

    /// Pairs that failed outright.
    pub fn failures(&self) -> impl Iterator<Item = &PairReport> {
        self.pairs.iter().filter(|pair| pair.result.is_err())
    }

    /// True when every pair completed.
    pub fn all_terminal(&self) -> bool {
        self.pairs.iter().all(|pair| matches!(pair.result, Ok(true)))
    }

    pub fn into_result(self) -> Result<()> {
        match self.pairs.into_iter().find_map(|pair| pair.result.err()) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Cursor information for one page of assignments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PageInfo {
    pub start_cursor: String,
    pub end_cursor: String,
    pub has_next_page: bool,
}

/// One page of a formation's assignments.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    pub formation_id: String,
    pub data: Vec<FormationAssignment>,
    pub total_count: i64,
    pub page_info: PageInfo,
}
