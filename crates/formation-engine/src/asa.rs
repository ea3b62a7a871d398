// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Automatic scenario assignment (ASA) collaborator interfaces.
//!
//! Rule matching lives outside the engine. The engine only learns which
//! objects an ASA enrolls and gets called back, through [`ScenarioProcessor`],
//! for every object the ASA (un)assigns.

use async_trait::async_trait;

use crate::assignment::ProcessingReport;
use crate::error::Result;
use crate::model::{AutomaticScenarioAssignment, FormationOperation, ObjectType, RequestContext};

/// Applies formation membership changes for a single object.
#[async_trait]
pub trait ScenarioProcessor: Send + Sync {
    async fn process_scenario(
        &self,
        ctx: &RequestContext,
        tenant_id: &str,
        object_id: &str,
        object_type: ObjectType,
        formation_name: &str,
        operation: FormationOperation,
    ) -> Result<ProcessingReport>;
}

/// Evaluates automatic scenario assignments.
#[async_trait]
pub trait AsaEngine: Send + Sync {
    /// Enrolls every object matching `asa` through `processor`.
    async fn ensure_scenario_assigned(
        &self,
        ctx: &RequestContext,
        asa: &AutomaticScenarioAssignment,
        processor: &dyn ScenarioProcessor,
    ) -> Result<()>;

    /// Scenario names of all ASAs matching the object.
    async fn get_scenarios_from_matching_asas(
        &self,
        ctx: &RequestContext,
        object_id: &str,
        object_type: ObjectType,
    ) -> Result<Vec<String>>;

    /// Whether the object's membership in `formation_name` stems from an ASA.
    async fn is_formation_coming_from_asa(
        &self,
        ctx: &RequestContext,
        object_id: &str,
        formation_name: &str,
        object_type: ObjectType,
    ) -> Result<bool>;

    /// Removes every object `asa` enrolled, through `processor`.
    async fn unassign_formation_coming_from_asa(
        &self,
        ctx: &RequestContext,
        asa: &AutomaticScenarioAssignment,
        processor: &dyn ScenarioProcessor,
    ) -> Result<()>;
}
