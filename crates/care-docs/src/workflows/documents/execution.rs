//! Drives document (re)generation through the external generator.
//!
//! Every execution walks the same state machine: lock the row as
//! `generating`, call the generator, then either persist the new renewal
//! state or put the previous status back so the row stays eligible for retry.

use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use super::calendar::{compute_next_dates, Clock, ScheduleConfigError};
use super::domain::{
    AlreadyCompleted, CareClient, ClientId, DocType, DocumentSchedule, MonitoringItemId,
    MonitoringScheduleItem, MonitoringStatus, ScheduleStatus,
};
use super::monitoring::MonitoringAction;
use super::repository::{
    DocumentGenerator, GeneratedDocument, GenerationContext, GenerationError, GenerationTarget,
    RenderFormat, RepositoryError, ScheduleRepository,
};
use super::schedule::{expected_status, ScheduleAction, ScheduleActionType};
use crate::config::SchedulingConfig;

#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("{0} is already generating")]
    InFlight(String),
    #[error(transparent)]
    AlreadyCompleted(#[from] AlreadyCompleted),
    #[error("{} is an alert and cannot be executed", .0.label())]
    NotExecutable(ScheduleActionType),
    #[error("client {0} not found")]
    ClientNotFound(ClientId),
    #[error("monitoring item {0} not found")]
    ItemNotFound(MonitoringItemId),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Persistence(#[from] RepositoryError),
    #[error(transparent)]
    Configuration(#[from] ScheduleConfigError),
}

impl ExecutionError {
    /// Whether the same request may succeed later without operator changes.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::InFlight(_)
                | Self::Generation(_)
                | Self::Persistence(RepositoryError::Conflict)
                | Self::Persistence(RepositoryError::Unavailable(_))
        )
    }
}

/// Result of a successful document execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentExecution {
    pub schedule: DocumentSchedule,
    pub document: GeneratedDocument,
}

/// Result of a successful monitoring execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitoringExecution {
    pub item: MonitoringScheduleItem,
    pub document: GeneratedDocument,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchItemResult {
    pub client_id: ClientId,
    pub target: GenerationTarget,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-item accounting for a sequential batch run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub items: Vec<BatchItemResult>,
}

impl BatchReport {
    fn record<T>(
        &mut self,
        client_id: &ClientId,
        target: GenerationTarget,
        outcome: Result<T, ExecutionError>,
        document_id: impl FnOnce(&T) -> String,
    ) {
        let item = match outcome {
            Ok(value) => {
                self.succeeded += 1;
                BatchItemResult {
                    client_id: client_id.clone(),
                    target,
                    success: true,
                    document_id: Some(document_id(&value)),
                    error: None,
                }
            }
            Err(err) => {
                self.failed += 1;
                BatchItemResult {
                    client_id: client_id.clone(),
                    target,
                    success: false,
                    document_id: None,
                    error: Some(err.to_string()),
                }
            }
        };
        self.items.push(item);
    }

    pub fn merge(&mut self, other: BatchReport) {
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.items.extend(other.items);
    }
}

pub struct ScheduleExecutor<R, G> {
    repository: Arc<R>,
    generator: Arc<G>,
    clock: Arc<dyn Clock>,
    policy: SchedulingConfig,
}

impl<R, G> ScheduleExecutor<R, G>
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
        Self {
            repository,
            generator,
            clock,
            policy,
        }
    }

    /// Execute an overdue action computed by the checker.
    ///
    /// The action only identifies the row; its current state is re-read so a
    /// concurrent execution that already holds the row is seen.
    pub fn execute_schedule_action(
        &self,
        action: &ScheduleAction,
        client: &CareClient,
        render: RenderFormat,
        progress: &mut dyn FnMut(&str),
    ) -> Result<DocumentExecution, ExecutionError> {
        if !action.action_type.is_executable() {
            return Err(ExecutionError::NotExecutable(action.action_type));
        }
        let schedule = self.current_schedule(client, action.doc_type)?;
        self.run_document(schedule, action.action_type, client, render, progress)
    }

    /// Generate a document on demand regardless of its due state.
    pub fn execute_document(
        &self,
        client: &CareClient,
        doc_type: DocType,
        render: RenderFormat,
        progress: &mut dyn FnMut(&str),
    ) -> Result<DocumentExecution, ExecutionError> {
        let schedule = self.current_schedule(client, doc_type)?;
        let action_type = ScheduleActionType::overdue(doc_type, schedule.has_been_generated());
        self.run_document(schedule, action_type, client, render, progress)
    }

    pub fn execute_monitoring_schedule_action(
        &self,
        item_id: &MonitoringItemId,
        client: &CareClient,
        render: RenderFormat,
        progress: &mut dyn FnMut(&str),
    ) -> Result<MonitoringExecution, ExecutionError> {
        let item = self
            .repository
            .load_monitoring_schedules(Some(&client.id))?
            .into_iter()
            .find(|item| &item.id == item_id)
            .ok_or_else(|| ExecutionError::ItemNotFound(item_id.clone()))?;

        match item.status {
            MonitoringStatus::Completed => {
                return Err(AlreadyCompleted(item.id.clone()).into());
            }
            MonitoringStatus::Generating => {
                return Err(ExecutionError::InFlight(format!("monitoring item {}", item.id)));
            }
            MonitoringStatus::Pending | MonitoringStatus::Scheduled => {}
        }

        let previous_status = item.status;
        let locked = self.repository.save_monitoring_schedule(MonitoringScheduleItem {
            status: MonitoringStatus::Generating,
            ..item
        })?;
        let target = GenerationTarget::Monitoring(locked.monitoring_type);
        progress(&format!("Generating {} for {}", target.label(), client.name));

        let context = GenerationContext {
            action_type: ScheduleActionType::GenerateMonitoring,
            due_date: locked.due_date,
            render,
            goal_period_id: locked.goal_period_id.clone(),
            trigger_event: locked.trigger_event.clone(),
            previous_document_id: locked.last_document_id.clone(),
        };

        let document = match self.generator.generate(target, client, &context, progress) {
            Ok(document) => document,
            Err(err) => {
                warn!(
                    client_id = %client.id,
                    item_id = %locked.id,
                    error = %err,
                    "monitoring generation failed"
                );
                self.release_monitoring(locked, previous_status);
                return Err(err.into());
            }
        };

        let mut finished = locked.clone();
        finished.complete(self.clock.now())?;
        finished.last_document_id = Some(document.document_id.clone());
        finished.last_file_url = Some(document.file_url.clone());
        finished.plan_revision_needed = document.plan_revision.is_some();

        match self.repository.save_monitoring_schedule(finished) {
            Ok(item) => {
                progress(&format!("{} completed", target.label()));
                info!(
                    client_id = %client.id,
                    item_id = %item.id,
                    document_id = %document.document_id,
                    "monitoring review generated"
                );
                Ok(MonitoringExecution { item, document })
            }
            Err(err) => {
                self.release_monitoring(locked, previous_status);
                Err(err.into())
            }
        }
    }

    /// Execute overdue actions one after another. A failed item is recorded
    /// and the run moves on.
    pub fn execute_batch(
        &self,
        actions: &[ScheduleAction],
        clients: &[CareClient],
        render: RenderFormat,
        progress: &mut dyn FnMut(&str),
    ) -> BatchReport {
        let mut report = BatchReport::default();

        for action in actions {
            if !action.action_type.is_executable() {
                report.skipped += 1;
                continue;
            }
            let target = GenerationTarget::Document(action.doc_type);
            let outcome = match find_client(clients, &action.client_id) {
                Some(client) => {
                    let mut scoped =
                        |message: &str| progress(&format!("[{}] {message}", client.name));
                    self.execute_schedule_action(action, client, render, &mut scoped)
                }
                None => Err(ExecutionError::ClientNotFound(action.client_id.clone())),
            };
            report.record(&action.client_id, target, outcome, |done| {
                done.document.document_id.clone()
            });
        }

        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.skipped,
            "document batch finished"
        );
        report
    }

    pub fn execute_monitoring_batch(
        &self,
        actions: &[MonitoringAction],
        clients: &[CareClient],
        render: RenderFormat,
        progress: &mut dyn FnMut(&str),
    ) -> BatchReport {
        let mut report = BatchReport::default();

        for action in actions {
            if !action.action_type.is_executable() {
                report.skipped += 1;
                continue;
            }
            let target = GenerationTarget::Monitoring(action.monitoring_type);
            let outcome = match find_client(clients, &action.client_id) {
                Some(client) => {
                    let mut scoped =
                        |message: &str| progress(&format!("[{}] {message}", client.name));
                    self.execute_monitoring_schedule_action(
                        &action.schedule_item.id,
                        client,
                        render,
                        &mut scoped,
                    )
                }
                None => Err(ExecutionError::ClientNotFound(action.client_id.clone())),
            };
            report.record(&action.client_id, target, outcome, |done| {
                done.document.document_id.clone()
            });
        }

        report
    }

    fn current_schedule(
        &self,
        client: &CareClient,
        doc_type: DocType,
    ) -> Result<DocumentSchedule, ExecutionError> {
        let existing = self
            .repository
            .load_schedules(Some(&client.id))?
            .into_iter()
            .find(|row| row.doc_type == doc_type);

        match existing {
            Some(row) => Ok(row),
            None => {
                let row = DocumentSchedule::pending(
                    &client.id,
                    doc_type,
                    self.policy.cycle_months_for(doc_type),
                    self.policy.alert_days_before,
                    self.clock.now(),
                );
                Ok(self.repository.save_schedule(row)?)
            }
        }
    }

    fn run_document(
        &self,
        schedule: DocumentSchedule,
        action_type: ScheduleActionType,
        client: &CareClient,
        render: RenderFormat,
        progress: &mut dyn FnMut(&str),
    ) -> Result<DocumentExecution, ExecutionError> {
        let doc_type = schedule.doc_type;
        if schedule.status == ScheduleStatus::Generating {
            return Err(ExecutionError::InFlight(format!(
                "{} for client {}",
                doc_type.label(),
                client.id
            )));
        }

        let today = self.clock.today();
        compute_next_dates(schedule.cycle_months, schedule.alert_days_before, today)?;

        let previous_status = schedule.status;
        let due_date = schedule.next_due_date.unwrap_or(today);
        let locked = self.repository.save_schedule(DocumentSchedule {
            status: ScheduleStatus::Generating,
            updated_at: self.clock.now(),
            ..schedule
        })?;

        let target = GenerationTarget::Document(doc_type);
        info!(
            client_id = %client.id,
            doc_type = doc_type.key(),
            action = action_type.label(),
            "document generation started"
        );
        progress(&format!("Generating {} for {}", doc_type.label(), client.name));

        let context = GenerationContext {
            action_type,
            due_date,
            render,
            goal_period_id: None,
            trigger_event: None,
            previous_document_id: locked.last_document_id.clone(),
        };

        let document = match self.generator.generate(target, client, &context, progress) {
            Ok(document) => document,
            Err(err) => {
                warn!(
                    client_id = %client.id,
                    doc_type = doc_type.key(),
                    error = %err,
                    "document generation failed"
                );
                self.release_schedule(locked, previous_status);
                return Err(err.into());
            }
        };

        match self.finish_schedule(locked.clone(), &document) {
            Ok(schedule) => {
                progress(&format!("{} saved", doc_type.label()));
                info!(
                    client_id = %client.id,
                    doc_type = doc_type.key(),
                    document_id = %document.document_id,
                    "document generated"
                );
                Ok(DocumentExecution { schedule, document })
            }
            Err(err) => {
                self.release_schedule(locked, previous_status);
                Err(err)
            }
        }
    }

    fn finish_schedule(
        &self,
        locked: DocumentSchedule,
        document: &GeneratedDocument,
    ) -> Result<DocumentSchedule, ExecutionError> {
        let now = self.clock.now();
        let today = self.clock.today();
        let dates = compute_next_dates(locked.cycle_months, locked.alert_days_before, today)?;

        let mut updated = DocumentSchedule {
            last_generated_at: Some(now),
            next_due_date: Some(dates.next_due_date),
            alert_date: Some(dates.alert_date),
            expiry_date: Some(dates.next_due_date),
            last_document_id: Some(document.document_id.clone()),
            last_file_url: Some(document.file_url.clone()),
            plan_revision_needed: Some(document.plan_revision.is_some()),
            plan_revision_reason: document.plan_revision.clone(),
            updated_at: now,
            ..locked
        };
        updated.status = expected_status(&updated, dates, today);

        Ok(self.repository.save_schedule(updated)?)
    }

    /// Put the pre-execution status back. Failure here leaves the row
    /// `generating`; it is logged for operators.
    fn release_schedule(&self, locked: DocumentSchedule, previous: ScheduleStatus) {
        let client_id = locked.care_client_id.clone();
        let doc_type = locked.doc_type;
        let restored = DocumentSchedule {
            status: previous,
            updated_at: self.clock.now(),
            ..locked
        };
        if let Err(err) = self.repository.save_schedule(restored) {
            warn!(
                client_id = %client_id,
                doc_type = doc_type.key(),
                error = %err,
                "failed to release generating lock"
            );
        }
    }

    fn release_monitoring(&self, locked: MonitoringScheduleItem, previous: MonitoringStatus) {
        let item_id = locked.id.clone();
        let restored = MonitoringScheduleItem {
            status: previous,
            ..locked
        };
        if let Err(err) = self.repository.save_monitoring_schedule(restored) {
            warn!(item_id = %item_id, error = %err, "failed to release monitoring lock");
        }
    }
}

fn find_client<'a>(clients: &'a [CareClient], id: &ClientId) -> Option<&'a CareClient> {
    clients.iter().find(|client| &client.id == id && !client.deleted)
}
