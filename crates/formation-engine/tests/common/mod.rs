// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared fixtures for formation engine integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use formation_engine::asa::{AsaEngine, ScenarioProcessor};
use formation_engine::assignment::FormationAssignmentService;
use formation_engine::directory::FormationDirectory;
use formation_engine::model::{
    Application, ApplicationTemplate, AutomaticScenarioAssignment, Formation, FormationOperation,
    Labels, ObjectType, RequestContext, Runtime, RuntimeContext,
};
use formation_engine::notifications::{
    NotificationBuilder, NotificationsGenerator, NotificationsService,
};
use formation_engine::persistence::SqliteAssignmentRepository;
use formation_engine::{FormationMembershipService, Result};
use formation_webhook::{Webhook, WebhookClient, WebhookClientConfig, WebhookOwner, WebhookType};
use tempfile::TempDir;

pub const TENANT: &str = "tenant-1";
pub const FORMATION_ID: &str = "formation-1";
pub const FORMATION_NAME: &str = "orders-scenario";

#[derive(Default)]
struct DirectoryState {
    formations: Vec<Formation>,
    applications: HashMap<String, (Application, Vec<String>)>,
    application_templates: HashMap<String, ApplicationTemplate>,
    runtimes: HashMap<String, (Runtime, Vec<String>)>,
    runtime_contexts: HashMap<String, (RuntimeContext, Vec<String>)>,
    webhooks: Vec<Webhook>,
    formation_template_webhooks: HashMap<String, Vec<Webhook>>,
}

/// Single-tenant directory kept in memory.
#[derive(Default)]
pub struct InMemoryDirectory {
    state: Mutex<DirectoryState>,
}

impl InMemoryDirectory {
    pub fn add_formation(&self, formation: Formation) {
        self.state.lock().unwrap().formations.push(formation);
    }

    pub fn add_application(&self, application: Application, scenarios: &[&str]) {
        let scenarios = scenarios.iter().map(|s| s.to_string()).collect();
        self.state
            .lock()
            .unwrap()
            .applications
            .insert(application.id.clone(), (application, scenarios));
    }

    pub fn add_application_template(&self, template: ApplicationTemplate) {
        self.state
            .lock()
            .unwrap()
            .application_templates
            .insert(template.id.clone(), template);
    }

    pub fn add_runtime(&self, runtime: Runtime, scenarios: &[&str]) {
        let scenarios = scenarios.iter().map(|s| s.to_string()).collect();
        self.state
            .lock()
            .unwrap()
            .runtimes
            .insert(runtime.id.clone(), (runtime, scenarios));
    }

    pub fn add_runtime_context(&self, runtime_context: RuntimeContext, scenarios: &[&str]) {
        let scenarios = scenarios.iter().map(|s| s.to_string()).collect();
        self.state
            .lock()
            .unwrap()
            .runtime_contexts
            .insert(runtime_context.id.clone(), (runtime_context, scenarios));
    }

    /// Registers a webhook on the owner set in `webhook.owner`.
    pub fn add_webhook(&self, webhook: Webhook) {
        self.state.lock().unwrap().webhooks.push(webhook);
    }

    pub fn add_formation_template_webhook(&self, formation_template_id: &str, webhook: Webhook) {
        self.state
            .lock()
            .unwrap()
            .formation_template_webhooks
            .entry(formation_template_id.to_string())
            .or_default()
            .push(webhook);
    }
}

fn in_scenario<T: Clone>(entries: &HashMap<String, (T, Vec<String>)>, scenario: &str) -> Vec<T> {
    let mut matching: Vec<(&String, &T)> = entries
        .iter()
        .filter(|(_, (_, scenarios))| scenarios.iter().any(|s| s == scenario))
        .map(|(id, (item, _))| (id, item))
        .collect();
    matching.sort_by(|a, b| a.0.cmp(b.0));
    matching.into_iter().map(|(_, item)| item.clone()).collect()
}

#[async_trait]
impl FormationDirectory for InMemoryDirectory {
    async fn list_applications_in_scenario(
        &self,
        _tenant_id: &str,
        scenario: &str,
    ) -> Result<Vec<Application>> {
        Ok(in_scenario(&self.state.lock().unwrap().applications, scenario))
    }

    async fn list_runtimes_in_scenario(
        &self,
        _tenant_id: &str,
        scenario: &str,
    ) -> Result<Vec<Runtime>> {
        Ok(in_scenario(&self.state.lock().unwrap().runtimes, scenario))
    }

    async fn list_runtime_contexts_in_scenario(
        &self,
        _tenant_id: &str,
        scenario: &str,
    ) -> Result<Vec<RuntimeContext>> {
        Ok(in_scenario(
            &self.state.lock().unwrap().runtime_contexts,
            scenario,
        ))
    }

    async fn get_application(&self, _tenant_id: &str, id: &str) -> Result<Option<Application>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .applications
            .get(id)
            .map(|(app, _)| app.clone()))
    }

    async fn get_application_template(&self, id: &str) -> Result<Option<ApplicationTemplate>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .application_templates
            .get(id)
            .cloned())
    }

    async fn get_runtime(&self, _tenant_id: &str, id: &str) -> Result<Option<Runtime>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .runtimes
            .get(id)
            .map(|(rt, _)| rt.clone()))
    }

    async fn get_runtime_context(
        &self,
        _tenant_id: &str,
        id: &str,
    ) -> Result<Option<RuntimeContext>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .runtime_contexts
            .get(id)
            .map(|(rc, _)| rc.clone()))
    }

    async fn get_formation(&self, _tenant_id: &str, id: &str) -> Result<Option<Formation>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .formations
            .iter()
            .find(|f| f.id == id)
            .cloned())
    }

    async fn get_formation_by_name(
        &self,
        _tenant_id: &str,
        name: &str,
    ) -> Result<Option<Formation>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .formations
            .iter()
            .find(|f| f.name == name)
            .cloned())
    }

    async fn get_webhook(
        &self,
        _tenant_id: &str,
        owner: &WebhookOwner,
        webhook_type: WebhookType,
    ) -> Result<Option<Webhook>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .webhooks
            .iter()
            .find(|w| w.owner.as_ref() == Some(owner) && w.webhook_type == webhook_type)
            .cloned())
    }

    async fn list_formation_template_webhooks(
        &self,
        _tenant_id: &str,
        formation_template_id: &str,
    ) -> Result<Vec<Webhook>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .formation_template_webhooks
            .get(formation_template_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// ASA engine enrolling a fixed set of objects per scenario.
#[derive(Default)]
pub struct StaticAsaEngine {
    matches: Mutex<HashMap<String, Vec<(String, ObjectType)>>>,
    enrolled: Mutex<HashSet<(String, String)>>,
}

impl StaticAsaEngine {
    pub fn add_match(&self, scenario: &str, object_id: &str, object_type: ObjectType) {
        self.matches
            .lock()
            .unwrap()
            .entry(scenario.to_string())
            .or_default()
            .push((object_id.to_string(), object_type));
    }

    fn matching(&self, scenario: &str) -> Vec<(String, ObjectType)> {
        self.matches
            .lock()
            .unwrap()
            .get(scenario)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl AsaEngine for StaticAsaEngine {
    async fn ensure_scenario_assigned(
        &self,
        ctx: &RequestContext,
        asa: &AutomaticScenarioAssignment,
        processor: &dyn ScenarioProcessor,
    ) -> Result<()> {
        for (object_id, object_type) in self.matching(&asa.scenario_name) {
            processor
                .process_scenario(
                    ctx,
                    &asa.tenant_id,
                    &object_id,
                    object_type,
                    &asa.scenario_name,
                    FormationOperation::Assign,
                )
                .await?;
            self.enrolled
                .lock()
                .unwrap()
                .insert((object_id, asa.scenario_name.clone()));
        }
        Ok(())
    }

    async fn get_scenarios_from_matching_asas(
        &self,
        _ctx: &RequestContext,
        object_id: &str,
        _object_type: ObjectType,
    ) -> Result<Vec<String>> {
        let mut scenarios: Vec<String> = self
            .matches
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, objects)| objects.iter().any(|(id, _)| id == object_id))
            .map(|(scenario, _)| scenario.clone())
            .collect();
        scenarios.sort();
        Ok(scenarios)
    }

    async fn is_formation_coming_from_asa(
        &self,
        _ctx: &RequestContext,
        object_id: &str,
        formation_name: &str,
        _object_type: ObjectType,
    ) -> Result<bool> {
        Ok(self
            .enrolled
            .lock()
            .unwrap()
            .contains(&(object_id.to_string(), formation_name.to_string())))
    }

    async fn unassign_formation_coming_from_asa(
        &self,
        ctx: &RequestContext,
        asa: &AutomaticScenarioAssignment,
        processor: &dyn ScenarioProcessor,
    ) -> Result<()> {
        for (object_id, object_type) in self.matching(&asa.scenario_name) {
            processor
                .process_scenario(
                    ctx,
                    &asa.tenant_id,
                    &object_id,
                    object_type,
                    &asa.scenario_name,
                    FormationOperation::Unassign,
                )
                .await?;
            self.enrolled
                .lock()
                .unwrap()
                .remove(&(object_id, asa.scenario_name.clone()));
        }
        Ok(())
    }
}

pub fn application(id: &str, template_id: Option<&str>) -> Application {
    Application {
        id: id.to_string(),
        name: format!("{}-name", id),
        application_template_id: template_id.map(str::to_string),
        base_url: None,
        labels: Labels::new(),
    }
}

pub fn runtime(id: &str) -> Runtime {
    Runtime {
        id: id.to_string(),
        name: format!("{}-name", id),
        labels: Labels::new(),
    }
}

pub fn runtime_context(id: &str, runtime_id: &str) -> RuntimeContext {
    RuntimeContext {
        id: id.to_string(),
        runtime_id: runtime_id.to_string(),
        key: "subaccount".to_string(),
        value: format!("{}-value", id),
        labels: Labels::new(),
    }
}

pub fn formation() -> Formation {
    Formation {
        id: FORMATION_ID.to_string(),
        tenant_id: TENANT.to_string(),
        name: FORMATION_NAME.to_string(),
        formation_template_id: "ft-1".to_string(),
    }
}

/// Everything needed to drive the engine end to end.
pub struct Harness {
    pub directory: Arc<InMemoryDirectory>,
    pub repository: Arc<SqliteAssignmentRepository>,
    pub asa: Arc<StaticAsaEngine>,
    pub assignments: FormationAssignmentService,
    pub membership: FormationMembershipService,
    _dir: TempDir,
}

pub async fn harness() -> Harness {
    harness_with_concurrency(1).await
}

pub async fn harness_with_concurrency(max_concurrent_pairs: usize) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let repository = Arc::new(
        SqliteAssignmentRepository::from_path(dir.path().join("formations.db"))
            .await
            .unwrap(),
    );
    let directory = Arc::new(InMemoryDirectory::default());
    directory.add_formation(formation());
    let asa = Arc::new(StaticAsaEngine::default());

    let client = WebhookClient::from_config(&WebhookClientConfig::default()).unwrap();
    let generator = NotificationsGenerator::new(
        directory.clone(),
        repository.clone(),
        NotificationBuilder::default(),
    );
    let notifications = NotificationsService::new(generator, Arc::new(client));
    let assignments =
        FormationAssignmentService::new(repository.clone(), directory.clone(), notifications)
            .with_max_concurrent_pairs(max_concurrent_pairs);
    let membership =
        FormationMembershipService::new(directory.clone(), assignments.clone(), asa.clone());

    Harness {
        directory,
        repository,
        asa,
        assignments,
        membership,
        _dir: dir,
    }
}

pub fn ctx() -> RequestContext {
    RequestContext::new(Some("corr-test".to_string()))
}
