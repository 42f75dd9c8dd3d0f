//! Evaluates every (client, document type) pair against "today".
//!
//! The checker is pure: it never writes. Callers apply the resulting status
//! transitions through [`status_transitions`] and a repository.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

use super::calendar::{
    baseline_date, classify, compute_next_dates, days_before, days_until, DueWindow,
    ScheduleConfigError, ScheduleDates,
};
use super::domain::{CareClient, ClientId, DocType, DocumentSchedule, ScheduleStatus};
use crate::config::SchedulingConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleActionType {
    GeneratePlan,
    PlanRevision,
    GenerateMonitoring,
    AlertPlanExpiring,
    AlertMonitoringUpcoming,
}

impl ScheduleActionType {
    /// Overdue action for a document type. Only a care plan that has been
    /// issued before is a revision; every other overdue document is a fresh
    /// generation.
    pub const fn overdue(doc_type: DocType, previously_generated: bool) -> Self {
        match doc_type {
            DocType::CarePlan if previously_generated => Self::PlanRevision,
            DocType::CarePlan | DocType::Tejunsho => Self::GeneratePlan,
            DocType::Monitoring => Self::GenerateMonitoring,
        }
    }

    pub const fn due_soon(doc_type: DocType) -> Self {
        match doc_type {
            DocType::CarePlan | DocType::Tejunsho => Self::AlertPlanExpiring,
            DocType::Monitoring => Self::AlertMonitoringUpcoming,
        }
    }

    /// Alerts are informational; only generation types are executed.
    pub const fn is_executable(self) -> bool {
        matches!(
            self,
            Self::GeneratePlan | Self::PlanRevision | Self::GenerateMonitoring
        )
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::GeneratePlan => "generate_plan",
            Self::PlanRevision => "plan_revision",
            Self::GenerateMonitoring => "generate_monitoring",
            Self::AlertPlanExpiring => "alert_plan_expiring",
            Self::AlertMonitoringUpcoming => "alert_monitoring_upcoming",
        }
    }
}

/// One computed action for a single evaluation pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleAction {
    #[serde(rename = "type")]
    pub action_type: ScheduleActionType,
    pub client_id: ClientId,
    pub client_name: String,
    pub doc_type: DocType,
    /// Row the action was computed from; `None` when the client has no row yet.
    pub schedule: Option<DocumentSchedule>,
    pub due_date: NaiveDate,
    pub days_until_due: i64,
    pub auto_generate: bool,
}

/// A schedule the checker could not evaluate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleConfigIssue {
    pub client_id: ClientId,
    pub doc_type: DocType,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScheduleCheck {
    /// Overdue documents, in client order then document order.
    pub actions: Vec<ScheduleAction>,
    /// Due-soon documents.
    pub alerts: Vec<ScheduleAction>,
    pub config_issues: Vec<ScheduleConfigIssue>,
    /// Rows currently locked by an in-flight generation.
    pub in_flight: Vec<(ClientId, DocType)>,
}

pub(crate) type ScheduleIndex<'a> = HashMap<(&'a ClientId, DocType), &'a DocumentSchedule>;

pub(crate) fn index_schedules(schedules: &[DocumentSchedule]) -> ScheduleIndex<'_> {
    schedules
        .iter()
        .map(|row| ((&row.care_client_id, row.doc_type), row))
        .collect()
}

/// Derived dates for a schedule row (or a missing row) as of `today`.
pub fn effective_dates(
    schedule: Option<&DocumentSchedule>,
    client: &CareClient,
    policy: &SchedulingConfig,
    doc_type: DocType,
    today: NaiveDate,
) -> Result<ScheduleDates, ScheduleConfigError> {
    let (cycle_months, alert_days_before) = match schedule {
        Some(row) => (row.cycle_months, row.alert_days_before),
        None => (policy.cycle_months_for(doc_type), policy.alert_days_before),
    };
    let base = baseline_date(schedule, client, today);
    compute_next_dates(cycle_months, alert_days_before, base)
}

/// Classify every active client's three documents against `today`.
pub fn check_document_schedules(
    schedules: &[DocumentSchedule],
    clients: &[CareClient],
    today: NaiveDate,
    policy: &SchedulingConfig,
) -> ScheduleCheck {
    let index = index_schedules(schedules);
    let mut check = ScheduleCheck::default();

    for client in clients.iter().filter(|client| !client.deleted) {
        for doc_type in DocType::ordered() {
            let schedule = index.get(&(&client.id, doc_type)).copied();

            if let Some(row) = schedule {
                if row.status == ScheduleStatus::Generating {
                    debug!(
                        client_id = %client.id,
                        doc_type = doc_type.key(),
                        "schedule in flight; skipping"
                    );
                    check.in_flight.push((client.id.clone(), doc_type));
                    continue;
                }
            }

            let dates = match effective_dates(schedule, client, policy, doc_type, today) {
                Ok(dates) => dates,
                Err(err) => {
                    check.config_issues.push(ScheduleConfigIssue {
                        client_id: client.id.clone(),
                        doc_type,
                        reason: err.to_string(),
                    });
                    continue;
                }
            };

            let window = classify(dates.next_due_date, dates.alert_date, today);
            let previously_generated = schedule.is_some_and(DocumentSchedule::has_been_generated);
            let action_type = match window {
                DueWindow::Overdue => ScheduleActionType::overdue(doc_type, previously_generated),
                DueWindow::DueSoon => ScheduleActionType::due_soon(doc_type),
                DueWindow::Current => continue,
            };

            let action = ScheduleAction {
                action_type,
                client_id: client.id.clone(),
                client_name: client.name.clone(),
                doc_type,
                schedule: schedule.cloned(),
                due_date: dates.next_due_date,
                days_until_due: days_until(dates.next_due_date, today),
                auto_generate: schedule.map_or(true, |row| row.auto_generate),
            };

            if window == DueWindow::Overdue {
                check.actions.push(action);
            } else {
                check.alerts.push(action);
            }
        }
    }

    check
}

/// Status a schedule row should hold for `today`, given its derived dates.
pub fn expected_status(
    schedule: &DocumentSchedule,
    dates: ScheduleDates,
    today: NaiveDate,
) -> ScheduleStatus {
    match classify(dates.next_due_date, dates.alert_date, today) {
        DueWindow::Overdue => ScheduleStatus::Overdue,
        DueWindow::DueSoon => ScheduleStatus::DueSoon,
        DueWindow::Current if schedule.has_been_generated() => ScheduleStatus::Active,
        DueWindow::Current => ScheduleStatus::Pending,
    }
}

/// A conditional status write derived from a check pass.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusTransition {
    pub schedule: DocumentSchedule,
    pub from: ScheduleStatus,
    pub to: ScheduleStatus,
    pub next_due_date: NaiveDate,
    pub alert_date: NaiveDate,
}

/// Rows whose persisted status must move to `overdue` or `due_soon`.
///
/// A row already in the target status, or locked by `generating`, is left
/// alone so an in-flight execution is never clobbered.
pub fn status_transitions(check: &ScheduleCheck) -> Vec<StatusTransition> {
    let overdue = check
        .actions
        .iter()
        .map(|action| (action, ScheduleStatus::Overdue));
    let due_soon = check
        .alerts
        .iter()
        .map(|action| (action, ScheduleStatus::DueSoon));

    overdue
        .chain(due_soon)
        .filter_map(|(action, to)| {
            let schedule = action.schedule.as_ref()?;
            if schedule.status == to || schedule.status == ScheduleStatus::Generating {
                return None;
            }
            let alert_date = days_before(action.due_date, schedule.alert_days_before)?;
            Some(StatusTransition {
                schedule: schedule.clone(),
                from: schedule.status,
                to,
                next_due_date: action.due_date,
                alert_date,
            })
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractAlertKind {
    Upcoming,
    Overdue,
}

/// Intake paperwork still outstanding around a client's contract start.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContractDateAlert {
    pub kind: ContractAlertKind,
    pub client_id: ClientId,
    pub client_name: String,
    pub contract_start: NaiveDate,
    pub alert_date: NaiveDate,
    pub days_until_start: i64,
}

/// Apply the due/alert windowing to each client's contract start date.
///
/// Only clients whose care plan has never been issued are reported; once the
/// first plan exists the intake paperwork is considered done.
pub fn check_contract_date_alerts(
    schedules: &[DocumentSchedule],
    clients: &[CareClient],
    today: NaiveDate,
    alert_days_before: u32,
) -> Vec<ContractDateAlert> {
    let index = index_schedules(schedules);

    clients
        .iter()
        .filter(|client| !client.deleted)
        .filter_map(|client| {
            let contract_start = client.contract_start?;
            let plan_issued = index
                .get(&(&client.id, DocType::CarePlan))
                .is_some_and(|row| row.has_been_generated());
            if plan_issued {
                return None;
            }

            let alert_date = days_before(contract_start, alert_days_before)?;
            let kind = match classify(contract_start, alert_date, today) {
                DueWindow::Overdue => ContractAlertKind::Overdue,
                DueWindow::DueSoon => ContractAlertKind::Upcoming,
                DueWindow::Current => return None,
            };

            Some(ContractDateAlert {
                kind,
                client_id: client.id.clone(),
                client_name: client.name.clone(),
                contract_start,
                alert_date,
                days_until_start: days_until(contract_start, today),
            })
        })
        .collect()
}
