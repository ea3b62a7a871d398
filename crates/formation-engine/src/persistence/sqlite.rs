// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SQLite-backed formation assignment storage.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{SqliteConnection, SqlitePool};

use crate::error::{FormationError, Result};
use crate::migrations;
use crate::model::FormationAssignment;

use super::AssignmentRepository;

const COLUMNS: &str = "id, formation_id, tenant_id, source, source_type, target, target_type, \
     state, value, error, poll_url, last_state_change_timestamp, last_notification_sent_timestamp";

#[derive(Debug, sqlx::FromRow)]
struct AssignmentRow {
    id: String,
    formation_id: String,
    tenant_id: String,
    source: String,
    source_type: String,
    target: String,
    target_type: String,
    state: String,
    value: Option<String>,
    error: Option<String>,
    poll_url: Option<String>,
    last_state_change_timestamp: Option<DateTime<Utc>>,
    last_notification_sent_timestamp: Option<DateTime<Utc>>,
}

impl TryFrom<AssignmentRow> for FormationAssignment {
    type Error = FormationError;

    fn try_from(row: AssignmentRow) -> Result<Self> {
        let json = |raw: Option<String>| -> Result<Option<serde_json::Value>> {
            raw.map(|s| serde_json::from_str(&s)).transpose().map_err(Into::into)
        };

        Ok(Self {
            source_type: row.source_type.parse()?,
            target_type: row.target_type.parse()?,
            state: row.state.parse()?,
            value: json(row.value)?,
            error: json(row.error)?,
            id: row.id,
            formation_id: row.formation_id,
            tenant_id: row.tenant_id,
            source: row.source,
            target: row.target,
            poll_url: row.poll_url,
            last_state_change_timestamp: row.last_state_change_timestamp,
            last_notification_sent_timestamp: row.last_notification_sent_timestamp,
        })
    }
}

fn convert(rows: Vec<AssignmentRow>) -> Result<Vec<FormationAssignment>> {
    rows.into_iter().map(FormationAssignment::try_from).collect()
}

/// SQLite-backed [`AssignmentRepository`].
#[derive(Clone)]
pub struct SqliteAssignmentRepository {
    pool: SqlitePool,
}

impl SqliteAssignmentRepository {
    /// Create a repository from an existing, migrated pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database at `path` and run migrations.
    ///
    /// ```ignore
    /// let repo = SqliteAssignmentRepository::from_path(".data/formations.db").await?;
    /// ```
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| FormationError::DatabaseError {
                operation: "create_dir".to_string(),
                details: format!("Failed to create directory {:?}: {}", parent, e),
            })?;
        }

        let url = format!("sqlite:{}?mode=rwc", path.to_string_lossy());

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .map_err(|e| FormationError::DatabaseError {
                operation: "connect".to_string(),
                details: format!("Failed to connect to SQLite at {:?}: {}", path, e),
            })?;

        migrations::run_sqlite(&pool)
            .await
            .map_err(|e| FormationError::DatabaseError {
                operation: "migrate".to_string(),
                details: format!("Failed to run migrations: {}", e),
            })?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn insert_ignoring_duplicate(
    conn: &mut SqliteConnection,
    fa: &FormationAssignment,
) -> Result<()> {
    let value = fa.value.as_ref().map(|v| v.to_string());
    let error = fa.error.as_ref().map(|v| v.to_string());

    sqlx::query(
        r#"
        INSERT INTO formation_assignments (
            id, formation_id, tenant_id, source, source_type, target, target_type,
            state, value, error, poll_url, last_state_change_timestamp,
            last_notification_sent_timestamp
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (formation_id, source, target) DO NOTHING
        "#,
    )
    .bind(&fa.id)
    .bind(&fa.formation_id)
    .bind(&fa.tenant_id)
    .bind(&fa.source)
    .bind(fa.source_type.as_str())
    .bind(&fa.target)
    .bind(fa.target_type.as_str())
    .bind(fa.state.as_str())
    .bind(value)
    .bind(error)
    .bind(&fa.poll_url)
    .bind(fa.last_state_change_timestamp)
    .bind(fa.last_notification_sent_timestamp)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn select_by_pair(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    formation_id: &str,
    source: &str,
    target: &str,
) -> Result<Option<FormationAssignment>> {
    let sql = format!(
        "SELECT {} FROM formation_assignments \
         WHERE tenant_id = ? AND formation_id = ? AND source = ? AND target = ?",
        COLUMNS
    );

    sqlx::query_as::<_, AssignmentRow>(&sql)
        .bind(tenant_id)
        .bind(formation_id)
        .bind(source)
        .bind(target)
        .fetch_optional(&mut *conn)
        .await?
        .map(FormationAssignment::try_from)
        .transpose()
}

async fn create_on(
    conn: &mut SqliteConnection,
    fa: &FormationAssignment,
) -> Result<FormationAssignment> {
    insert_ignoring_duplicate(conn, fa).await?;

    select_by_pair(conn, &fa.tenant_id, &fa.formation_id, &fa.source, &fa.target)
        .await?
        .ok_or_else(|| FormationError::DatabaseError {
            operation: "create".to_string(),
            details: format!(
                "assignment {} -> {} in formation {} belongs to another tenant",
                fa.source, fa.target, fa.formation_id
            ),
        })
}

#[async_trait]
impl AssignmentRepository for SqliteAssignmentRepository {
    async fn create(&self, assignment: &FormationAssignment) -> Result<FormationAssignment> {
        let mut conn = self.pool.acquire().await?;
        create_on(&mut conn, assignment).await
    }

    async fn create_pair(
        &self,
        forward: &FormationAssignment,
        reverse: &FormationAssignment,
    ) -> Result<(FormationAssignment, FormationAssignment)> {
        let mut tx = self.pool.begin().await?;
        let forward = create_on(&mut tx, forward).await?;
        let reverse = create_on(&mut tx, reverse).await?;
        tx.commit().await?;

        Ok((forward, reverse))
    }

    async fn get(&self, tenant_id: &str, id: &str) -> Result<Option<FormationAssignment>> {
        let sql = format!(
            "SELECT {} FROM formation_assignments WHERE tenant_id = ? AND id = ?",
            COLUMNS
        );

        sqlx::query_as::<_, AssignmentRow>(&sql)
            .bind(tenant_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(FormationAssignment::try_from)
            .transpose()
    }

    async fn get_for_formation(
        &self,
        tenant_id: &str,
        id: &str,
        formation_id: &str,
    ) -> Result<Option<FormationAssignment>> {
        let sql = format!(
            "SELECT {} FROM formation_assignments \
             WHERE tenant_id = ? AND id = ? AND formation_id = ?",
            COLUMNS
        );

        sqlx::query_as::<_, AssignmentRow>(&sql)
            .bind(tenant_id)
            .bind(id)
            .bind(formation_id)
            .fetch_optional(&self.pool)
            .await?
            .map(FormationAssignment::try_from)
            .transpose()
    }

    async fn get_by_source_and_target(
        &self,
        tenant_id: &str,
        formation_id: &str,
        source: &str,
        target: &str,
    ) -> Result<Option<FormationAssignment>> {
        let mut conn = self.pool.acquire().await?;
        select_by_pair(&mut conn, tenant_id, formation_id, source, target).await
    }

    async fn list_for_formation(
        &self,
        tenant_id: &str,
        formation_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<FormationAssignment>> {
        let sql = format!(
            "SELECT {} FROM formation_assignments \
             WHERE tenant_id = ? AND formation_id = ? \
             ORDER BY created_at ASC, id ASC \
             LIMIT ? OFFSET ?",
            COLUMNS
        );

        let rows = sqlx::query_as::<_, AssignmentRow>(&sql)
            .bind(tenant_id)
            .bind(formation_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        convert(rows)
    }

    async fn list_all_for_formation(
        &self,
        tenant_id: &str,
        formation_id: &str,
    ) -> Result<Vec<FormationAssignment>> {
        let sql = format!(
            "SELECT {} FROM formation_assignments \
             WHERE tenant_id = ? AND formation_id = ? \
             ORDER BY created_at ASC, id ASC",
            COLUMNS
        );

        let rows = sqlx::query_as::<_, AssignmentRow>(&sql)
            .bind(tenant_id)
            .bind(formation_id)
            .fetch_all(&self.pool)
            .await?;

        convert(rows)
    }

    async fn count_for_formation(&self, tenant_id: &str, formation_id: &str) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM formation_assignments
            WHERE tenant_id = ? AND formation_id = ?
            "#,
        )
        .bind(tenant_id)
        .bind(formation_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn list_for_object(
        &self,
        tenant_id: &str,
        formation_id: &str,
        object_id: &str,
    ) -> Result<Vec<FormationAssignment>> {
        let sql = format!(
            "SELECT {} FROM formation_assignments \
             WHERE tenant_id = ? AND formation_id = ? AND (source = ? OR target = ?) \
             ORDER BY created_at ASC, id ASC",
            COLUMNS
        );

        let rows = sqlx::query_as::<_, AssignmentRow>(&sql)
            .bind(tenant_id)
            .bind(formation_id)
            .bind(object_id)
            .bind(object_id)
            .fetch_all(&self.pool)
            .await?;

        convert(rows)
    }

    async fn update(&self, assignment: &FormationAssignment) -> Result<()> {
        let value = assignment.value.as_ref().map(|v| v.to_string());
        let error = assignment.error.as_ref().map(|v| v.to_string());

        let result = sqlx::query(
            r#"
            UPDATE formation_assignments
            SET state = ?, value = ?, error = ?, poll_url = ?,
                last_state_change_timestamp = ?, last_notification_sent_timestamp = ?
            WHERE tenant_id = ? AND id = ?
            "#,
        )
        .bind(assignment.state.as_str())
        .bind(value)
        .bind(error)
        .bind(&assignment.poll_url)
        .bind(assignment.last_state_change_timestamp)
        .bind(assignment.last_notification_sent_timestamp)
        .bind(&assignment.tenant_id)
        .bind(&assignment.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(FormationError::AssignmentNotFound {
                assignment_id: assignment.id.clone(),
            });
        }

        Ok(())
    }

    async fn delete(&self, tenant_id: &str, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM formation_assignments WHERE tenant_id = ? AND id = ?")
            .bind(tenant_id)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn exists(&self, tenant_id: &str, id: &str) -> Result<bool> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM formation_assignments WHERE tenant_id = ? AND id = ?")
                .bind(tenant_id)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.is_some())
    }
}
