use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

use super::calendar::{previous_month, Clock};
use super::domain::{
    CareClient, ClientId, DocType, DocumentSchedule, GoalKind, GoalPeriod, GoalPeriodId,
    MonitoringItemId, MonitoringScheduleItem, MAX_SHORT_TERM_GOALS,
};
use super::execution::{
    BatchReport, DocumentExecution, ExecutionError, MonitoringExecution, ScheduleExecutor,
};
use super::monitoring::{
    check_monitoring_schedules, generate_monitoring_schedules_from_goals, new_emergency_item,
    supersede_goals, MonitoringAction,
};
use super::repository::{DocumentGenerator, RenderFormat, RepositoryError, ScheduleRepository};
use super::schedule::{
    check_contract_date_alerts, check_document_schedules, status_transitions, ContractDateAlert,
    ScheduleAction, ScheduleConfigIssue,
};
use super::validation::{validate_client_documents, ValidationInput, ValidationResult};
use crate::config::SchedulingConfig;

/// Everything one evaluation pass found, plus the bookkeeping of its
/// best-effort writes.
#[derive(Debug, Clone, Serialize)]
pub struct CheckPassReport {
    pub today: NaiveDate,
    pub actions: Vec<ScheduleAction>,
    pub alerts: Vec<ScheduleAction>,
    pub monitoring_actions: Vec<MonitoringAction>,
    pub monitoring_alerts: Vec<MonitoringAction>,
    pub contract_alerts: Vec<ContractDateAlert>,
    pub config_issues: Vec<ScheduleConfigIssue>,
    pub created_schedules: usize,
    pub status_updates: usize,
    pub sync_failures: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkExecutionReport {
    pub check: CheckPassReport,
    pub documents: BatchReport,
    pub monitoring: BatchReport,
}

/// Staff request for an emergency monitoring review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyRequest {
    pub trigger_event: String,
    #[serde(default)]
    pub trigger_notes: Option<String>,
    pub due_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize)]
pub struct GoalReplacement {
    pub retired: Vec<GoalPeriod>,
    pub installed: Vec<GoalPeriod>,
    pub monitoring_items: Vec<MonitoringScheduleItem>,
}

#[derive(Debug, thiserror::Error)]
pub enum ComplianceServiceError {
    #[error("client {0} not found")]
    ClientNotFound(ClientId),
    #[error("invalid goal set: {0}")]
    InvalidGoals(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

/// Service composing the repository, checker, validator and executor.
pub struct ComplianceService<R, G> {
    repository: Arc<R>,
    executor: ScheduleExecutor<R, G>,
    clock: Arc<dyn Clock>,
    policy: SchedulingConfig,
}

impl<R, G> ComplianceService<R, G>
where
    R: ScheduleRepository + 'static,
    G: DocumentGenerator + 'static,
{
    pub fn new(
        repository: Arc<R>,
        generator: Arc<G>,
        clock: Arc<dyn Clock>,
        policy: SchedulingConfig,
    ) -> Self {
        let executor =
            ScheduleExecutor::new(repository.clone(), generator, clock.clone(), policy.clone());
        Self {
            repository,
            executor,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> &SchedulingConfig {
        &self.policy
    }

    /// Evaluate schedules for every client, or a single one, and sync the
    /// persisted statuses. Status writes are best-effort: a failed write is
    /// logged and counted, and the pass carries on.
    pub fn run_check(
        &self,
        client_id: Option<&ClientId>,
    ) -> Result<CheckPassReport, ComplianceServiceError> {
        let clients = self.clients_in_scope(client_id)?;
        let mut schedules = self.repository.load_schedules(client_id)?;
        let today = self.clock.today();

        let mut sync_failures = 0;
        let created = self.create_missing_schedules(&clients, &schedules, &mut sync_failures);
        let created_schedules = created.len();
        schedules.extend(created);

        let check = check_document_schedules(&schedules, &clients, today, &self.policy);

        let mut status_updates = 0;
        for transition in status_transitions(&check) {
            let client_id = transition.schedule.care_client_id.clone();
            let doc_type = transition.schedule.doc_type;
            let updated = DocumentSchedule {
                status: transition.to,
                next_due_date: Some(transition.next_due_date),
                alert_date: Some(transition.alert_date),
                updated_at: self.clock.now(),
                ..transition.schedule
            };
            match self.repository.save_schedule(updated) {
                Ok(_) => status_updates += 1,
                Err(err) => {
                    sync_failures += 1;
                    warn!(
                        client_id = %client_id,
                        doc_type = doc_type.key(),
                        from = transition.from.label(),
                        to = transition.to.label(),
                        error = %err,
                        "schedule status sync failed"
                    );
                }
            }
        }

        let contract_alerts = check_contract_date_alerts(
            &schedules,
            &clients,
            today,
            self.policy.contract_alert_days,
        );
        let items = self.repository.load_monitoring_schedules(client_id)?;
        let monitoring = check_monitoring_schedules(&items, &clients, today);

        info!(
            %today,
            overdue = check.actions.len(),
            due_soon = check.alerts.len(),
            monitoring_overdue = monitoring.actions.len(),
            status_updates,
            sync_failures,
            "schedule check finished"
        );

        Ok(CheckPassReport {
            today,
            actions: check.actions,
            alerts: check.alerts,
            monitoring_actions: monitoring.actions,
            monitoring_alerts: monitoring.alerts,
            contract_alerts,
            config_issues: check.config_issues,
            created_schedules,
            status_updates,
            sync_failures,
        })
    }

    /// Check pass followed by a sequential run over every overdue document and
    /// monitoring review flagged for automatic generation.
    pub fn bulk_execute(
        &self,
        render: RenderFormat,
        progress: &mut dyn FnMut(&str),
    ) -> Result<BulkExecutionReport, ComplianceServiceError> {
        let check = self.run_check(None)?;
        let clients = self.repository.load_clients()?;

        let documents: Vec<ScheduleAction> = check
            .actions
            .iter()
            .filter(|action| action.auto_generate)
            .cloned()
            .collect();
        let mut document_report = self
            .executor
            .execute_batch(&documents, &clients, render, progress);
        document_report.skipped += check.actions.len() - documents.len();

        let reviews: Vec<MonitoringAction> = check
            .monitoring_actions
            .iter()
            .filter(|action| action.auto_generate)
            .cloned()
            .collect();
        let mut monitoring_report = self
            .executor
            .execute_monitoring_batch(&reviews, &clients, render, progress);
        monitoring_report.skipped += check.monitoring_actions.len() - reviews.len();

        Ok(BulkExecutionReport {
            check,
            documents: document_report,
            monitoring: monitoring_report,
        })
    }

    pub fn execute_document(
        &self,
        client_id: &ClientId,
        doc_type: DocType,
        render: RenderFormat,
        progress: &mut dyn FnMut(&str),
    ) -> Result<DocumentExecution, ComplianceServiceError> {
        let client = self.client(client_id)?;
        Ok(self
            .executor
            .execute_document(&client, doc_type, render, progress)?)
    }

    pub fn execute_monitoring(
        &self,
        item_id: &MonitoringItemId,
        render: RenderFormat,
        progress: &mut dyn FnMut(&str),
    ) -> Result<MonitoringExecution, ComplianceServiceError> {
        let item = self
            .repository
            .load_monitoring_schedules(None)?
            .into_iter()
            .find(|item| &item.id == item_id)
            .ok_or_else(|| ExecutionError::ItemNotFound(item_id.clone()))?;
        let client = self.client(&item.care_client_id)?;
        Ok(self
            .executor
            .execute_monitoring_schedule_action(item_id, &client, render, progress)?)
    }

    /// Run the rule set for one client against this month's and last month's
    /// billing. The stored copy is a display cache, so a failed save is only
    /// logged.
    pub fn validate_client(
        &self,
        client_id: &ClientId,
    ) -> Result<ValidationResult, ComplianceServiceError> {
        let client = self.client(client_id)?;
        let mut results = self.validate(&[client])?;
        results
            .pop()
            .ok_or_else(|| ComplianceServiceError::ClientNotFound(client_id.clone()))
    }

    pub fn validate_all(&self) -> Result<Vec<ValidationResult>, ComplianceServiceError> {
        let clients: Vec<CareClient> = self
            .repository
            .load_clients()?
            .into_iter()
            .filter(|client| !client.deleted)
            .collect();
        self.validate(&clients)
    }

    /// Persist review items for active goals that do not have one yet.
    pub fn reconcile_monitoring(
        &self,
        client_id: Option<&ClientId>,
    ) -> Result<Vec<MonitoringScheduleItem>, ComplianceServiceError> {
        let goals = self.repository.load_goal_periods(client_id)?;
        let existing = self.repository.load_monitoring_schedules(client_id)?;
        let created = generate_monitoring_schedules_from_goals(
            &goals,
            &existing,
            self.clock.today(),
            self.policy.monitoring_lead_days,
        );

        let mut saved = Vec::with_capacity(created.len());
        for item in created {
            saved.push(self.repository.insert_monitoring_schedule(item)?);
        }
        if !saved.is_empty() {
            info!(created = saved.len(), "monitoring reviews scheduled");
        }
        Ok(saved)
    }

    /// Install a new goal set. Previous goals are retired, not deleted, so
    /// review items keep a valid goal reference.
    pub fn replace_goals(
        &self,
        client_id: &ClientId,
        goals: Vec<GoalPeriod>,
    ) -> Result<GoalReplacement, ComplianceServiceError> {
        self.client(client_id)?;
        let current = self.repository.load_goal_periods(Some(client_id))?;
        validate_goal_set(client_id, &current, &goals)?;

        let (retired, installed) = supersede_goals(&current, goals);

        // Installed goals are written first; a partial failure leaves both
        // sets active, never neither.
        let mut installed_saved = Vec::with_capacity(installed.len());
        for goal in installed {
            installed_saved.push(self.repository.save_goal_period(goal)?);
        }
        let mut retired_saved = Vec::with_capacity(retired.len());
        for goal in retired {
            retired_saved.push(self.repository.save_goal_period(goal)?);
        }

        let monitoring_items = self.reconcile_monitoring(Some(client_id))?;
        Ok(GoalReplacement {
            retired: retired_saved,
            installed: installed_saved,
            monitoring_items,
        })
    }

    /// Remove every goal of a client together with its open review items.
    /// Completed reviews stay as history.
    pub fn reset_goals(&self, client_id: &ClientId) -> Result<usize, ComplianceServiceError> {
        let goals = self.repository.load_goal_periods(Some(client_id))?;
        let goal_ids: HashSet<_> = goals.iter().map(|goal| goal.id.clone()).collect();

        for item in self.repository.load_monitoring_schedules(Some(client_id))? {
            let tied_to_goal = item
                .goal_period_id
                .as_ref()
                .is_some_and(|id| goal_ids.contains(id));
            if tied_to_goal && !item.is_completed() {
                self.repository.delete_monitoring_schedule(&item.id)?;
            }
        }
        for goal in &goals {
            self.repository.delete_goal_period(&goal.id)?;
        }

        warn!(client_id = %client_id, removed = goals.len(), "goal periods reset");
        Ok(goals.len())
    }

    pub fn record_emergency(
        &self,
        client_id: &ClientId,
        request: EmergencyRequest,
    ) -> Result<MonitoringScheduleItem, ComplianceServiceError> {
        self.client(client_id)?;
        let item = new_emergency_item(
            client_id,
            request.trigger_event,
            request.trigger_notes,
            request.due_date,
            self.policy.monitoring_lead_days,
        );
        Ok(self.repository.insert_monitoring_schedule(item)?)
    }

    fn validate(
        &self,
        clients: &[CareClient],
    ) -> Result<Vec<ValidationResult>, ComplianceServiceError> {
        let today = self.clock.today();
        let checked_at = self.clock.now();
        let single = match clients {
            [client] => Some(&client.id),
            _ => None,
        };
        let schedules = self.repository.load_schedules(single)?;
        let helpers = self.repository.load_helpers()?;

        let (year, month) = previous_month(today);
        let mut billing_records = self.repository.load_billing_records_for_month(year, month)?;
        billing_records.extend(
            self.repository
                .load_billing_records_for_month(today.year(), today.month())?,
        );

        let input = ValidationInput {
            schedules: &schedules,
            helpers: &helpers,
            billing_records: &billing_records,
        };

        let mut results = Vec::with_capacity(clients.len());
        for client in clients {
            let result = validate_client_documents(client, input, today, checked_at);
            if let Err(err) = self.repository.save_validation(result.clone()) {
                warn!(client_id = %client.id, error = %err, "validation cache write failed");
            }
            results.push(result);
        }
        Ok(results)
    }

    fn client(&self, client_id: &ClientId) -> Result<CareClient, ComplianceServiceError> {
        self.repository
            .load_clients()?
            .into_iter()
            .find(|client| &client.id == client_id && !client.deleted)
            .ok_or_else(|| ComplianceServiceError::ClientNotFound(client_id.clone()))
    }

    fn clients_in_scope(
        &self,
        client_id: Option<&ClientId>,
    ) -> Result<Vec<CareClient>, ComplianceServiceError> {
        match client_id {
            Some(id) => Ok(vec![self.client(id)?]),
            None => Ok(self.repository.load_clients()?),
        }
    }

    fn create_missing_schedules(
        &self,
        clients: &[CareClient],
        schedules: &[DocumentSchedule],
        failures: &mut usize,
    ) -> Vec<DocumentSchedule> {
        let present: HashSet<(&ClientId, DocType)> = schedules
            .iter()
            .map(|row| (&row.care_client_id, row.doc_type))
            .collect();
        let now = self.clock.now();

        let mut created = Vec::new();
        for client in clients.iter().filter(|client| !client.deleted) {
            for doc_type in DocType::ordered() {
                if present.contains(&(&client.id, doc_type)) {
                    continue;
                }
                let row = DocumentSchedule::pending(
                    &client.id,
                    doc_type,
                    self.policy.cycle_months_for(doc_type),
                    self.policy.alert_days_before,
                    now,
                );
                match self.repository.save_schedule(row) {
                    Ok(saved) => created.push(saved),
                    Err(err) => {
                        *failures += 1;
                        warn!(
                            client_id = %client.id,
                            doc_type = doc_type.key(),
                            error = %err,
                            "failed to create pending schedule"
                        );
                    }
                }
            }
        }
        created
    }
}

fn validate_goal_set(
    client_id: &ClientId,
    current: &[GoalPeriod],
    goals: &[GoalPeriod],
) -> Result<(), ComplianceServiceError> {
    let invalid = |reason: String| Err(ComplianceServiceError::InvalidGoals(reason));

    let long_term = goals
        .iter()
        .filter(|goal| goal.kind == GoalKind::LongTerm)
        .count();
    if long_term > 1 {
        return invalid(format!("{long_term} long-term goals supplied; at most one is allowed"));
    }

    let existing: HashSet<&GoalPeriodId> = current.iter().map(|goal| &goal.id).collect();
    let mut ids = HashSet::new();
    let mut slots = HashSet::new();
    for goal in goals {
        if &goal.care_client_id != client_id {
            return invalid(format!("goal {} belongs to another client", goal.id.0));
        }
        if existing.contains(&goal.id) {
            return invalid(format!("goal id {} is already in use", goal.id.0));
        }
        if !ids.insert(&goal.id) {
            return invalid(format!("goal id {} supplied twice", goal.id.0));
        }
        if goal.end_date < goal.start_date {
            return invalid(format!("goal {} ends before it starts", goal.id.0));
        }
        if goal.kind == GoalKind::ShortTerm {
            if goal.goal_index >= MAX_SHORT_TERM_GOALS {
                return invalid(format!(
                    "short-term goal index {} out of range 0..{}",
                    goal.goal_index, MAX_SHORT_TERM_GOALS
                ));
            }
            if !slots.insert(goal.goal_index) {
                return invalid(format!("short-term goal index {} used twice", goal.goal_index));
            }
        }
    }

    Ok(())
}
