use std::sync::{Arc, Mutex};

use super::common::*;
use crate::workflows::documents::calendar::FixedClock;
use crate::workflows::documents::domain::{
    CareClient, ClientId, DocType, DocumentSchedule, MonitoringStatus, ScheduleStatus,
};
use crate::workflows::documents::execution::{ExecutionError, ScheduleExecutor};
use crate::workflows::documents::monitoring::new_emergency_item;
use crate::workflows::documents::repository::{
    DocumentGenerator, GeneratedDocument, GenerationContext, GenerationError, GenerationTarget,
    RenderFormat, ScheduleRepository,
};
use crate::workflows::documents::schedule::{check_document_schedules, ScheduleActionType};

fn today() -> chrono::NaiveDate {
    date(2025, 7, 20)
}

fn executor<G: DocumentGenerator + 'static>(
    repository: &Arc<MemoryRepository>,
    generator: &Arc<G>,
) -> ScheduleExecutor<MemoryRepository, G> {
    ScheduleExecutor::new(
        repository.clone(),
        generator.clone(),
        Arc::new(FixedClock::on(today())),
        policy(),
    )
}

fn overdue_plan(client_id: &str) -> DocumentSchedule {
    DocumentSchedule {
        status: ScheduleStatus::Overdue,
        ..generated_schedule(client_id, DocType::CarePlan, date(2025, 1, 10))
    }
}

fn seeded(clients: &[CareClient]) -> Arc<MemoryRepository> {
    let repository = Arc::new(MemoryRepository::with_clients(clients.to_vec()));
    repository.seed_schedules(
        clients
            .iter()
            .map(|client| overdue_plan(&client.id.0))
            .collect(),
    );
    repository
}

#[test]
fn successful_generation_renews_the_schedule() {
    let clients = vec![client("c-1", Some(date(2024, 12, 1)))];
    let repository = seeded(&clients);
    let generator = Arc::new(ScriptedGenerator::default());
    let executor = executor(&repository, &generator);

    let mut messages = Vec::new();
    let mut progress = |message: &str| messages.push(message.to_string());
    let execution = executor
        .execute_document(&clients[0], DocType::CarePlan, RenderFormat::Pdf, &mut progress)
        .expect("generation succeeds");

    let row = execution.schedule;
    assert_eq!(row.status, ScheduleStatus::Active);
    assert_eq!(row.last_generated_at, Some(at_noon(today())));
    assert_eq!(row.next_due_date, Some(date(2026, 1, 20)));
    assert_eq!(row.alert_date, Some(date(2026, 1, 6)));
    assert_eq!(row.expiry_date, Some(date(2026, 1, 20)));
    assert_eq!(row.last_document_id.as_deref(), Some("doc-1"));
    assert_eq!(row.plan_revision_needed, Some(false));
    assert_eq!(row.version, 3);
    assert_eq!(
        repository.schedule("c-1", DocType::CarePlan),
        Some(row.clone())
    );

    assert_eq!(
        generator.calls()[0].action_type,
        ScheduleActionType::PlanRevision
    );
    assert_eq!(
        messages.first().map(String::as_str),
        Some("Generating Care Plan for Client c-1")
    );
    assert_eq!(messages.last().map(String::as_str), Some("Care Plan saved"));
}

#[test]
fn plan_revision_signal_is_recorded() {
    let clients = vec![client("c-1", None)];
    let repository = seeded(&clients);
    let generator = Arc::new(ScriptedGenerator::default());
    generator.push(Ok(GeneratedDocument {
        document_id: "doc-rev".to_string(),
        file_url: "https://files.example/doc-rev.pdf".to_string(),
        plan_revision: Some("mobility declined".to_string()),
    }));
    let executor = executor(&repository, &generator);

    let execution = executor
        .execute_document(
            &clients[0],
            DocType::CarePlan,
            RenderFormat::Html,
            &mut no_progress(),
        )
        .expect("generation succeeds");

    assert_eq!(execution.schedule.plan_revision_needed, Some(true));
    assert_eq!(
        execution.schedule.plan_revision_reason.as_deref(),
        Some("mobility declined")
    );
}

#[test]
fn failed_generation_restores_the_previous_status() {
    let clients = vec![client("c-1", None)];
    let repository = seeded(&clients);
    let generator = Arc::new(ScriptedGenerator::failing_with(GenerationError::Timeout));
    let executor = executor(&repository, &generator);

    let err = executor
        .execute_document(
            &clients[0],
            DocType::CarePlan,
            RenderFormat::Pdf,
            &mut no_progress(),
        )
        .expect_err("generation fails");

    assert!(matches!(err, ExecutionError::Generation(GenerationError::Timeout)));
    assert!(err.is_retryable());
    let row = repository.schedule("c-1", DocType::CarePlan).expect("row");
    assert_eq!(row.status, ScheduleStatus::Overdue);
    assert_eq!(row.last_generated_at, Some(at_noon(date(2025, 1, 10))));
    assert_eq!(row.last_document_id.as_deref(), Some("doc-c-1-care_plan"));
}

#[test]
fn batch_counts_failures_and_continues_with_the_next_client() {
    let clients = vec![client("c-1", None), client("c-2", None)];
    let repository = seeded(&clients);
    let generator = Arc::new(ScriptedGenerator::failing_with(GenerationError::Quota));
    let executor = executor(&repository, &generator);

    let schedules = repository.schedules();
    let check = check_document_schedules(&schedules, &clients, today(), &policy());
    let plans: Vec<_> = check
        .actions
        .into_iter()
        .filter(|action| action.doc_type == DocType::CarePlan)
        .collect();
    assert_eq!(plans[0].action_type, ScheduleActionType::PlanRevision);

    let mut messages = Vec::new();
    let mut progress = |message: &str| messages.push(message.to_string());
    let report = executor.execute_batch(&plans, &clients, RenderFormat::Pdf, &mut progress);

    assert_eq!(report.failed, 1);
    assert_eq!(report.succeeded, 1);
    assert!(!report.items[0].success);
    assert!(report.items[0].error.is_some());
    assert_eq!(report.items[1].client_id, ClientId("c-2".to_string()));
    assert_eq!(
        repository.schedule("c-1", DocType::CarePlan).map(|row| row.status),
        Some(ScheduleStatus::Overdue)
    );
    assert_eq!(
        repository.schedule("c-2", DocType::CarePlan).map(|row| row.status),
        Some(ScheduleStatus::Active)
    );
    assert!(messages.iter().any(|m| m.starts_with("[Client c-2] ")));
}

#[test]
fn alerts_are_skipped_by_the_batch_and_rejected_individually() {
    let clients = vec![client("c-1", None)];
    let repository = seeded(&clients);
    let generator = Arc::new(ScriptedGenerator::default());
    let executor = executor(&repository, &generator);

    let schedules = repository.schedules();
    let check = check_document_schedules(&schedules, &clients, date(2025, 7, 1), &policy());
    let alert = check.alerts[0].clone();
    assert_eq!(alert.action_type, ScheduleActionType::AlertPlanExpiring);

    let report = executor.execute_batch(
        std::slice::from_ref(&alert),
        &clients,
        RenderFormat::Pdf,
        &mut no_progress(),
    );
    let single = executor.execute_schedule_action(
        &alert,
        &clients[0],
        RenderFormat::Pdf,
        &mut no_progress(),
    );

    assert_eq!(report.skipped, 1);
    assert!(matches!(single, Err(ExecutionError::NotExecutable(_))));
    assert!(generator.calls().is_empty());
}

#[test]
fn in_flight_schedule_is_refused() {
    let clients = vec![client("c-1", None)];
    let repository = Arc::new(MemoryRepository::with_clients(clients.clone()));
    repository.seed_schedules(vec![DocumentSchedule {
        status: ScheduleStatus::Generating,
        ..overdue_plan("c-1")
    }]);
    let generator = Arc::new(ScriptedGenerator::default());
    let executor = executor(&repository, &generator);

    let err = executor
        .execute_document(
            &clients[0],
            DocType::CarePlan,
            RenderFormat::Pdf,
            &mut no_progress(),
        )
        .expect_err("row is locked");

    assert!(matches!(err, ExecutionError::InFlight(_)));
    assert!(err.is_retryable());
    assert!(generator.calls().is_empty());
}

#[test]
fn missing_schedule_is_created_before_first_issuance() {
    let clients = vec![client("c-1", Some(date(2025, 1, 1)))];
    let repository = Arc::new(MemoryRepository::with_clients(clients.clone()));
    let generator = Arc::new(ScriptedGenerator::default());
    let executor = executor(&repository, &generator);

    let execution = executor
        .execute_document(
            &clients[0],
            DocType::Tejunsho,
            RenderFormat::Excel,
            &mut no_progress(),
        )
        .expect("generation succeeds");

    assert_eq!(execution.schedule.status, ScheduleStatus::Active);
    assert_eq!(
        generator.calls()[0].action_type,
        ScheduleActionType::GeneratePlan
    );
    assert_eq!(repository.schedules().len(), 1);
}

/// Generator that records the persisted status it observes mid-generation.
struct LockProbe {
    repository: Arc<MemoryRepository>,
    seen: Mutex<Vec<ScheduleStatus>>,
}

impl DocumentGenerator for LockProbe {
    fn generate(
        &self,
        target: GenerationTarget,
        client: &CareClient,
        _context: &GenerationContext,
        _progress: &mut dyn FnMut(&str),
    ) -> Result<GeneratedDocument, GenerationError> {
        if let GenerationTarget::Document(doc_type) = target {
            if let Some(row) = self.repository.schedule(&client.id.0, doc_type) {
                self.seen.lock().expect("probe mutex poisoned").push(row.status);
            }
        }
        Ok(GeneratedDocument {
            document_id: "doc-probe".to_string(),
            file_url: "https://files.example/doc-probe.pdf".to_string(),
            plan_revision: None,
        })
    }
}

#[test]
fn schedule_is_locked_while_generating() {
    let clients = vec![client("c-1", None)];
    let repository = seeded(&clients);
    let probe = Arc::new(LockProbe {
        repository: repository.clone(),
        seen: Mutex::new(Vec::new()),
    });
    let executor = executor(&repository, &probe);

    executor
        .execute_document(
            &clients[0],
            DocType::CarePlan,
            RenderFormat::Pdf,
            &mut no_progress(),
        )
        .expect("generation succeeds");

    let seen = probe.seen.lock().expect("probe mutex poisoned").clone();
    assert_eq!(seen, vec![ScheduleStatus::Generating]);
}

#[test]
fn monitoring_review_completes_once() {
    let clients = vec![client("c-1", None)];
    let repository = Arc::new(MemoryRepository::with_clients(clients.clone()));
    let item = repository
        .save_monitoring_schedule(new_emergency_item(
            &clients[0].id,
            "hospital discharge",
            Some("returned home 2025-07-18".to_string()),
            date(2025, 7, 25),
            14,
        ))
        .expect("seed item");
    let generator = Arc::new(ScriptedGenerator::default());
    let executor = executor(&repository, &generator);

    let execution = executor
        .execute_monitoring_schedule_action(
            &item.id,
            &clients[0],
            RenderFormat::Pdf,
            &mut no_progress(),
        )
        .expect("review generated");

    assert_eq!(execution.item.status, MonitoringStatus::Completed);
    assert_eq!(execution.item.completed_at, Some(at_noon(today())));
    assert_eq!(execution.item.last_document_id.as_deref(), Some("doc-1"));

    let again = executor.execute_monitoring_schedule_action(
        &item.id,
        &clients[0],
        RenderFormat::Pdf,
        &mut no_progress(),
    );
    assert!(matches!(again, Err(ExecutionError::AlreadyCompleted(_))));
    assert_eq!(generator.calls().len(), 1);
}

#[test]
fn failed_monitoring_review_stays_open() {
    let clients = vec![client("c-1", None)];
    let repository = Arc::new(MemoryRepository::with_clients(clients.clone()));
    let item = repository
        .save_monitoring_schedule(new_emergency_item(
            &clients[0].id,
            "fall at home",
            None,
            date(2025, 7, 25),
            14,
        ))
        .expect("seed item");
    let generator = Arc::new(ScriptedGenerator::failing_with(GenerationError::Malformed(
        "empty body".to_string(),
    )));
    let executor = executor(&repository, &generator);

    let result = executor.execute_monitoring_schedule_action(
        &item.id,
        &clients[0],
        RenderFormat::Pdf,
        &mut no_progress(),
    );

    assert!(matches!(result, Err(ExecutionError::Generation(_))));
    let stored = repository.monitoring_item(&item.id).expect("item");
    assert_eq!(stored.status, MonitoringStatus::Scheduled);
    assert!(stored.completed_at.is_none());
}
