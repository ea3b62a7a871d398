// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Formation assignment storage.

pub mod sqlite;

pub use self::sqlite::SqliteAssignmentRepository;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::FormationAssignment;

/// Tenant-scoped access to formation assignments.
///
/// At most one row exists per `(formation_id, source, target)`.
#[allow(missing_docs)]
#[async_trait]
pub trait AssignmentRepository: Send + Sync {
    /// Inserts `assignment` unless its pair already exists, and returns the
    /// stored row either way.
    async fn create(&self, assignment: &FormationAssignment) -> Result<FormationAssignment>;

    /// Creates both directions of one pair atomically.
    async fn create_pair(
        &self,
        forward: &FormationAssignment,
        reverse: &FormationAssignment,
    ) -> Result<(FormationAssignment, FormationAssignment)>;

    async fn get(&self, tenant_id: &str, id: &str) -> Result<Option<FormationAssignment>>;

    async fn get_for_formation(
        &self,
        tenant_id: &str,
        id: &str,
        formation_id: &str,
    ) -> Result<Option<FormationAssignment>>;

    async fn get_by_source_and_target(
        &self,
        tenant_id: &str,
        formation_id: &str,
        source: &str,
        target: &str,
    ) -> Result<Option<FormationAssignment>>;

    /// Page of a formation's assignments, oldest first.
    async fn list_for_formation(
        &self,
        tenant_id: &str,
        formation_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<FormationAssignment>>;

    async fn list_all_for_formation(
        &self,
        tenant_id: &str,
        formation_id: &str,
    ) -> Result<Vec<FormationAssignment>>;

    async fn count_for_formation(&self, tenant_id: &str, formation_id: &str) -> Result<i64>;

    /// Assignments of a formation where `object_id` is source or target.
    async fn list_for_object(
        &self,
        tenant_id: &str,
        formation_id: &str,
        object_id: &str,
    ) -> Result<Vec<FormationAssignment>>;

    /// Writes all mutable columns; fails with `AssignmentNotFound` when the row is gone.
    async fn update(&self, assignment: &FormationAssignment) -> Result<()>;

    /// Returns whether a row was removed.
    async fn delete(&self, tenant_id: &str, id: &str) -> Result<bool>;

    async fn exists(&self, tenant_id: &str, id: &str) -> Result<bool>;
}
