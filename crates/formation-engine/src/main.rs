// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Formation Engine - reconciliation report
//!
//! Prints, for each formation given on the command line, its assignments
//! grouped by state together with the recorded errors:
//!
//! ```text
//! formation-engine <tenant-id> <formation-id>...
//! ```

use std::collections::BTreeMap;

use anyhow::{Result, bail};
use serde_json::{Value, json};
use tracing::{error, info};

use formation_engine::config::Config;
use formation_engine::model::FormationAssignment;
use formation_engine::persistence::{AssignmentRepository, SqliteAssignmentRepository};
use formation_engine::telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    telemetry::init_subscriber();

    let mut args = std::env::args().skip(1);
    let Some(tenant_id) = args.next() else {
        bail!("usage: formation-engine <tenant-id> <formation-id>...");
    };
    let formation_ids: Vec<String> = args.collect();
    if formation_ids.is_empty() {
        bail!("at least one formation ID is required");
    }

    // The report only reads storage; webhook settings are not loaded.
    let database_path = Config::database_path_from_env();

    info!(
        database_path = %database_path.display(),
        formations = formation_ids.len(),
        "Building reconciliation report"
    );

    let repository = SqliteAssignmentRepository::from_path(&database_path)
        .await
        .map_err(|e| {
            error!("Failed to open database: {}", e);
            e
        })?;

    let mut formations = Vec::with_capacity(formation_ids.len());
    for formation_id in &formation_ids {
        let assignments = repository
            .list_all_for_formation(&tenant_id, formation_id)
            .await?;
        formations.push(formation_report(formation_id, &assignments));
    }

    let report = json!({
        "tenant_id": tenant_id,
        "formations": formations,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    repository.pool().close().await;
    Ok(())
}

fn formation_report(formation_id: &str, assignments: &[FormationAssignment]) -> Value {
    let mut states: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    let mut errors = Vec::new();

    for fa in assignments {
        states.entry(fa.state.as_str()).or_default().push(&fa.id);

        if let Some(err) = fa.assignment_error() {
            errors.push(json!({
                "assignment_id": fa.id,
                "source": fa.source,
                "target": fa.target,
                "state": fa.state.as_str(),
                "message": err.message,
                "error_code": u8::from(err.error_code),
            }));
        }
    }

    json!({
        "formation_id": formation_id,
        "total": assignments.len(),
        "states": states,
        "errors": errors,
    })
}
