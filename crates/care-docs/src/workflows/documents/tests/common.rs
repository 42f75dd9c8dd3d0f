use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;

use crate::config::SchedulingConfig;
use crate::workflows::documents::calendar::FixedClock;
use crate::workflows::documents::domain::{
    BillingRecord, CareClient, ClientId, DocType, DocumentSchedule, GoalKind, GoalPeriod,
    GoalPeriodId, Helper, MonitoringItemId, MonitoringScheduleItem, ScheduleStatus,
};
use crate::workflows::documents::repository::{
    DocumentGenerator, GeneratedDocument, GenerationContext, GenerationError, GenerationTarget,
    RepositoryError, ScheduleRepository,
};
use crate::workflows::documents::schedule::ScheduleActionType;
use crate::workflows::documents::service::ComplianceService;
use crate::workflows::documents::validation::ValidationResult;

pub(super) fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

pub(super) fn at_noon(day: NaiveDate) -> DateTime<Utc> {
    day.and_hms_opt(12, 0, 0).expect("valid time").and_utc()
}

pub(super) fn policy() -> SchedulingConfig {
    SchedulingConfig::default()
}

pub(super) fn client(id: &str, contract_start: Option<NaiveDate>) -> CareClient {
    CareClient {
        id: ClientId(id.to_string()),
        name: format!("Client {id}"),
        contract_start,
        care_level: Some("care_2".to_string()),
        service_types: vec!["physical".to_string(), "household".to_string()],
        deleted: false,
    }
}

/// Row that was last generated on `generated_on` and is otherwise untouched.
pub(super) fn generated_schedule(
    client_id: &str,
    doc_type: DocType,
    generated_on: NaiveDate,
) -> DocumentSchedule {
    let created = at_noon(generated_on);
    DocumentSchedule {
        status: ScheduleStatus::Active,
        last_generated_at: Some(created),
        last_document_id: Some(format!("doc-{client_id}-{}", doc_type.key())),
        version: 1,
        ..DocumentSchedule::pending(&ClientId(client_id.to_string()), doc_type, 6, 14, created)
    }
}

pub(super) fn goal(
    id: &str,
    client_id: &str,
    kind: GoalKind,
    goal_index: u8,
    start: NaiveDate,
    end: NaiveDate,
) -> GoalPeriod {
    GoalPeriod {
        id: GoalPeriodId(id.to_string()),
        care_client_id: ClientId(client_id.to_string()),
        kind,
        goal_index,
        start_date: start,
        end_date: end,
        goal_text: format!("goal {id}"),
        is_active: true,
        supersedes_id: None,
    }
}

pub(super) fn helper(name: &str, hire_date: Option<NaiveDate>) -> Helper {
    Helper {
        id: format!("h-{}", name.to_lowercase().replace(' ', "-")),
        name: name.to_string(),
        hire_date,
    }
}

pub(super) fn billing(client_id: &str, helper: &str, on: NaiveDate, code: &str) -> BillingRecord {
    BillingRecord {
        client_id: ClientId(client_id.to_string()),
        helper_name: helper.to_string(),
        service_date: on,
        service_code: code.to_string(),
    }
}

#[derive(Default)]
struct MemoryState {
    clients: Vec<CareClient>,
    helpers: Vec<Helper>,
    billing: Vec<BillingRecord>,
    schedules: BTreeMap<String, DocumentSchedule>,
    goals: BTreeMap<String, GoalPeriod>,
    monitoring: BTreeMap<String, MonitoringScheduleItem>,
    validations: Vec<ValidationResult>,
    reject_schedule_writes: bool,
    reject_validation_writes: bool,
    rejected_goal_id: Option<String>,
}

/// In-memory repository with compare-and-swap versioning on schedule rows and
/// monitoring items.
#[derive(Default, Clone)]
pub(super) struct MemoryRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryRepository {
    pub(super) fn with_clients(clients: Vec<CareClient>) -> Self {
        let repository = Self::default();
        repository.state().clients = clients;
        repository
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().expect("repository mutex poisoned")
    }

    pub(super) fn add_helpers(&self, helpers: Vec<Helper>) {
        self.state().helpers.extend(helpers);
    }

    pub(super) fn add_billing(&self, records: Vec<BillingRecord>) {
        self.state().billing.extend(records);
    }

    /// Store rows as-is, bypassing version checks.
    pub(super) fn seed_schedules(&self, schedules: Vec<DocumentSchedule>) {
        let mut state = self.state();
        for row in schedules {
            state.schedules.insert(row.id.0.clone(), row);
        }
    }

    pub(super) fn seed_goals(&self, goals: Vec<GoalPeriod>) {
        let mut state = self.state();
        for goal in goals {
            state.goals.insert(goal.id.0.clone(), goal);
        }
    }

    pub(super) fn seed_monitoring(&self, items: Vec<MonitoringScheduleItem>) {
        let mut state = self.state();
        for item in items {
            state.monitoring.insert(item.id.0.clone(), item);
        }
    }

    pub(super) fn reject_schedule_writes(&self, reject: bool) {
        self.state().reject_schedule_writes = reject;
    }

    pub(super) fn reject_validation_writes(&self, reject: bool) {
        self.state().reject_validation_writes = reject;
    }

    /// Fail every save of the goal period with this id.
    pub(super) fn reject_goal_writes_for(&self, goal_id: &str) {
        self.state().rejected_goal_id = Some(goal_id.to_string());
    }

    pub(super) fn schedule(&self, client_id: &str, doc_type: DocType) -> Option<DocumentSchedule> {
        self.state()
            .schedules
            .values()
            .find(|row| row.care_client_id.0 == client_id && row.doc_type == doc_type)
            .cloned()
    }

    pub(super) fn schedules(&self) -> Vec<DocumentSchedule> {
        self.state().schedules.values().cloned().collect()
    }

    pub(super) fn goals(&self) -> Vec<GoalPeriod> {
        self.state().goals.values().cloned().collect()
    }

    pub(super) fn monitoring_item(&self, id: &MonitoringItemId) -> Option<MonitoringScheduleItem> {
        self.state().monitoring.get(&id.0).cloned()
    }

    pub(super) fn monitoring_items(&self) -> Vec<MonitoringScheduleItem> {
        self.state().monitoring.values().cloned().collect()
    }

    pub(super) fn validations(&self) -> Vec<ValidationResult> {
        self.state().validations.clone()
    }
}

fn owned_by(filter: Option<&ClientId>, owner: &ClientId) -> bool {
    filter.map_or(true, |id| id == owner)
}

impl ScheduleRepository for MemoryRepository {
    fn load_clients(&self) -> Result<Vec<CareClient>, RepositoryError> {
        Ok(self.state().clients.clone())
    }

    fn load_helpers(&self) -> Result<Vec<Helper>, RepositoryError> {
        Ok(self.state().helpers.clone())
    }

    fn load_billing_records_for_month(
        &self,
        year: i32,
        month: u32,
    ) -> Result<Vec<BillingRecord>, RepositoryError> {
        use chrono::Datelike;
        Ok(self
            .state()
            .billing
            .iter()
            .filter(|record| {
                record.service_date.year() == year && record.service_date.month() == month
            })
            .cloned()
            .collect())
    }

    fn load_schedules(
        &self,
        client: Option<&ClientId>,
    ) -> Result<Vec<DocumentSchedule>, RepositoryError> {
        Ok(self
            .state()
            .schedules
            .values()
            .filter(|row| owned_by(client, &row.care_client_id))
            .cloned()
            .collect())
    }

    fn save_schedule(
        &self,
        schedule: DocumentSchedule,
    ) -> Result<DocumentSchedule, RepositoryError> {
        let mut state = self.state();
        if state.reject_schedule_writes {
            return Err(RepositoryError::Unavailable("schedule table locked".to_string()));
        }
        let stored_version = state.schedules.get(&schedule.id.0).map(|row| row.version);
        match stored_version {
            Some(version) if version != schedule.version => Err(RepositoryError::Conflict),
            None if schedule.version != 0 => Err(RepositoryError::NotFound),
            _ => {
                let saved = DocumentSchedule {
                    version: schedule.version + 1,
                    ..schedule
                };
                state.schedules.insert(saved.id.0.clone(), saved.clone());
                Ok(saved)
            }
        }
    }

    fn load_goal_periods(
        &self,
        client: Option<&ClientId>,
    ) -> Result<Vec<GoalPeriod>, RepositoryError> {
        Ok(self
            .state()
            .goals
            .values()
            .filter(|goal| owned_by(client, &goal.care_client_id))
            .cloned()
            .collect())
    }

    fn save_goal_period(&self, goal: GoalPeriod) -> Result<GoalPeriod, RepositoryError> {
        let mut state = self.state();
        if state.rejected_goal_id.as_deref() == Some(goal.id.0.as_str()) {
            return Err(RepositoryError::Unavailable("goal table locked".to_string()));
        }
        state.goals.insert(goal.id.0.clone(), goal.clone());
        Ok(goal)
    }

    fn delete_goal_period(&self, id: &GoalPeriodId) -> Result<(), RepositoryError> {
        self.state()
            .goals
            .remove(&id.0)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    fn load_monitoring_schedules(
        &self,
        client: Option<&ClientId>,
    ) -> Result<Vec<MonitoringScheduleItem>, RepositoryError> {
        Ok(self
            .state()
            .monitoring
            .values()
            .filter(|item| owned_by(client, &item.care_client_id))
            .cloned()
            .collect())
    }

    fn save_monitoring_schedule(
        &self,
        item: MonitoringScheduleItem,
    ) -> Result<MonitoringScheduleItem, RepositoryError> {
        let mut state = self.state();
        let stored_version = state.monitoring.get(&item.id.0).map(|row| row.version);
        match stored_version {
            Some(version) if version != item.version => Err(RepositoryError::Conflict),
            None if item.version != 0 => Err(RepositoryError::NotFound),
            _ => {
                let saved = MonitoringScheduleItem {
                    version: item.version + 1,
                    ..item
                };
                state.monitoring.insert(saved.id.0.clone(), saved.clone());
                Ok(saved)
            }
        }
    }

    fn insert_monitoring_schedule(
        &self,
        item: MonitoringScheduleItem,
    ) -> Result<MonitoringScheduleItem, RepositoryError> {
        let mut state = self.state();
        if state.monitoring.contains_key(&item.id.0) {
            return Err(RepositoryError::Conflict);
        }
        let saved = MonitoringScheduleItem { version: 1, ..item };
        state.monitoring.insert(saved.id.0.clone(), saved.clone());
        Ok(saved)
    }

    fn delete_monitoring_schedule(&self, id: &MonitoringItemId) -> Result<(), RepositoryError> {
        self.state()
            .monitoring
            .remove(&id.0)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    fn load_validations(&self) -> Result<Vec<ValidationResult>, RepositoryError> {
        Ok(self.state().validations.clone())
    }

    fn save_validation(&self, result: ValidationResult) -> Result<(), RepositoryError> {
        let mut state = self.state();
        if state.reject_validation_writes {
            return Err(RepositoryError::Unavailable("cache offline".to_string()));
        }
        state
            .validations
            .retain(|cached| cached.care_client_id != result.care_client_id);
        state.validations.push(result);
        Ok(())
    }
}

pub(super) struct UnavailableRepository;

impl ScheduleRepository for UnavailableRepository {
    fn load_clients(&self) -> Result<Vec<CareClient>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn load_helpers(&self) -> Result<Vec<Helper>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn load_billing_records_for_month(
        &self,
        _year: i32,
        _month: u32,
    ) -> Result<Vec<BillingRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn load_schedules(
        &self,
        _client: Option<&ClientId>,
    ) -> Result<Vec<DocumentSchedule>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn save_schedule(
        &self,
        _schedule: DocumentSchedule,
    ) -> Result<DocumentSchedule, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn load_goal_periods(
        &self,
        _client: Option<&ClientId>,
    ) -> Result<Vec<GoalPeriod>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn save_goal_period(&self, _goal: GoalPeriod) -> Result<GoalPeriod, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn delete_goal_period(&self, _id: &GoalPeriodId) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn load_monitoring_schedules(
        &self,
        _client: Option<&ClientId>,
    ) -> Result<Vec<MonitoringScheduleItem>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn save_monitoring_schedule(
        &self,
        _item: MonitoringScheduleItem,
    ) -> Result<MonitoringScheduleItem, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn insert_monitoring_schedule(
        &self,
        _item: MonitoringScheduleItem,
    ) -> Result<MonitoringScheduleItem, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn delete_monitoring_schedule(&self, _id: &MonitoringItemId) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn load_validations(&self) -> Result<Vec<ValidationResult>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn save_validation(&self, _result: ValidationResult) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

/// One call the generator received.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct GeneratorCall {
    pub(super) target: GenerationTarget,
    pub(super) client_id: ClientId,
    pub(super) action_type: ScheduleActionType,
}

/// Generator that replays queued outcomes, succeeding once the queue is empty.
#[derive(Default)]
pub(super) struct ScriptedGenerator {
    script: Mutex<VecDeque<Result<GeneratedDocument, GenerationError>>>,
    calls: Mutex<Vec<GeneratorCall>>,
}

impl ScriptedGenerator {
    pub(super) fn failing_with(error: GenerationError) -> Self {
        let generator = Self::default();
        generator.push(Err(error));
        generator
    }

    pub(super) fn push(&self, outcome: Result<GeneratedDocument, GenerationError>) {
        self.script
            .lock()
            .expect("script mutex poisoned")
            .push_back(outcome);
    }

    pub(super) fn calls(&self) -> Vec<GeneratorCall> {
        self.calls.lock().expect("calls mutex poisoned").clone()
    }
}

impl DocumentGenerator for ScriptedGenerator {
    fn generate(
        &self,
        target: GenerationTarget,
        client: &CareClient,
        context: &GenerationContext,
        progress: &mut dyn FnMut(&str),
    ) -> Result<GeneratedDocument, GenerationError> {
        let mut calls = self.calls.lock().expect("calls mutex poisoned");
        calls.push(GeneratorCall {
            target,
            client_id: client.id.clone(),
            action_type: context.action_type,
        });
        let sequence = calls.len();
        drop(calls);

        progress("rendering");
        let scripted = self
            .script
            .lock()
            .expect("script mutex poisoned")
            .pop_front();
        scripted.unwrap_or_else(|| {
            Ok(GeneratedDocument {
                document_id: format!("doc-{sequence}"),
                file_url: format!("https://files.example/doc-{sequence}.pdf"),
                plan_revision: None,
            })
        })
    }
}

pub(super) fn build_service(
    repository: Arc<MemoryRepository>,
    generator: Arc<ScriptedGenerator>,
    today: NaiveDate,
) -> ComplianceService<MemoryRepository, ScriptedGenerator> {
    ComplianceService::new(
        repository,
        generator,
        Arc::new(FixedClock::on(today)),
        policy(),
    )
}

pub(super) fn no_progress() -> impl FnMut(&str) {
    |_message: &str| {}
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
