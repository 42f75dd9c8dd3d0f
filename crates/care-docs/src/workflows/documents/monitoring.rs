//! Monitoring reviews derived from care-goal periods.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use super::calendar::{classify, days_before, days_until, DueWindow};
use super::domain::{
    CareClient, ClientId, GoalPeriod, GoalPeriodId, MonitoringItemId, MonitoringScheduleItem,
    MonitoringStatus, MonitoringType,
};
use super::schedule::ScheduleActionType;

/// Emergency ids are random v4 uuids, unique across processes and restarts.
fn next_emergency_id() -> MonitoringItemId {
    MonitoringItemId(format!("emg-{}", Uuid::new_v4()))
}

/// Item id for the review of a goal period. Deterministic so repeated
/// reconciliation of the same goal addresses the same row.
pub fn goal_item_id(goal_id: &GoalPeriodId) -> MonitoringItemId {
    MonitoringItemId(format!("mon-{}", goal_id.0))
}

/// New review items for active goals that do not have one yet.
///
/// Any existing item for the same (goal period, monitoring type) pair blocks
/// creation, completed or not: a completed review stays as history and only a
/// superseding goal period (a new id) gets a fresh item. Emergency items are
/// never produced here.
pub fn generate_monitoring_schedules_from_goals(
    goal_periods: &[GoalPeriod],
    existing_items: &[MonitoringScheduleItem],
    today: NaiveDate,
    lead_days: u32,
) -> Vec<MonitoringScheduleItem> {
    let mut covered: HashSet<(&GoalPeriodId, MonitoringType)> = existing_items
        .iter()
        .filter_map(|item| {
            item.goal_period_id
                .as_ref()
                .map(|goal_id| (goal_id, item.monitoring_type))
        })
        .collect();

    let mut created = Vec::new();
    for goal in goal_periods.iter().filter(|goal| goal.is_active) {
        let monitoring_type = goal.monitoring_type();
        if !covered.insert((&goal.id, monitoring_type)) {
            continue;
        }

        let alert_date = days_before(goal.end_date, lead_days);
        let status = match alert_date {
            Some(alert) if today < alert => MonitoringStatus::Scheduled,
            _ => MonitoringStatus::Pending,
        };

        created.push(MonitoringScheduleItem {
            id: goal_item_id(&goal.id),
            care_client_id: goal.care_client_id.clone(),
            goal_period_id: Some(goal.id.clone()),
            monitoring_type,
            status,
            due_date: goal.end_date,
            alert_date,
            trigger_event: None,
            trigger_notes: None,
            auto_generate: true,
            completed_at: None,
            plan_revision_needed: false,
            last_document_id: None,
            last_file_url: None,
            version: 0,
        });
    }

    created
}

/// Emergency review raised by staff for one triggering event (hospital
/// discharge, sudden change in condition, ...).
pub fn new_emergency_item(
    client_id: &ClientId,
    trigger_event: impl Into<String>,
    trigger_notes: Option<String>,
    due_date: NaiveDate,
    lead_days: u32,
) -> MonitoringScheduleItem {
    MonitoringScheduleItem {
        id: next_emergency_id(),
        care_client_id: client_id.clone(),
        goal_period_id: None,
        monitoring_type: MonitoringType::Emergency,
        status: MonitoringStatus::Scheduled,
        due_date,
        alert_date: days_before(due_date, lead_days),
        trigger_event: Some(trigger_event.into()),
        trigger_notes,
        auto_generate: false,
        completed_at: None,
        plan_revision_needed: false,
        last_document_id: None,
        last_file_url: None,
        version: 0,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitoringAction {
    #[serde(rename = "type")]
    pub action_type: ScheduleActionType,
    pub client_id: ClientId,
    pub client_name: String,
    pub monitoring_type: MonitoringType,
    pub schedule_item: MonitoringScheduleItem,
    pub due_date: NaiveDate,
    pub days_until_due: i64,
    pub auto_generate: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MonitoringCheck {
    pub actions: Vec<MonitoringAction>,
    pub alerts: Vec<MonitoringAction>,
}

/// Due/alert windowing over open monitoring items of active clients.
pub fn check_monitoring_schedules(
    items: &[MonitoringScheduleItem],
    clients: &[CareClient],
    today: NaiveDate,
) -> MonitoringCheck {
    let clients: HashMap<&ClientId, &CareClient> = clients
        .iter()
        .filter(|client| !client.deleted)
        .map(|client| (&client.id, client))
        .collect();

    let mut check = MonitoringCheck::default();
    for item in items {
        if matches!(
            item.status,
            MonitoringStatus::Completed | MonitoringStatus::Generating
        ) {
            continue;
        }
        let Some(client) = clients.get(&item.care_client_id) else {
            continue;
        };

        let alert_date = item.alert_date.unwrap_or(item.due_date);
        let window = classify(item.due_date, alert_date, today);
        let action_type = match window {
            DueWindow::Overdue => ScheduleActionType::GenerateMonitoring,
            DueWindow::DueSoon => ScheduleActionType::AlertMonitoringUpcoming,
            DueWindow::Current => continue,
        };

        let action = MonitoringAction {
            action_type,
            client_id: client.id.clone(),
            client_name: client.name.clone(),
            monitoring_type: item.monitoring_type,
            schedule_item: item.clone(),
            due_date: item.due_date,
            days_until_due: days_until(item.due_date, today),
            auto_generate: item.auto_generate,
        };

        match window {
            DueWindow::Overdue => check.actions.push(action),
            _ => check.alerts.push(action),
        }
    }

    check
}

/// Replacement set for a client's goals: current active goals are retired and
/// each new goal points back at the goal that held its slot.
pub fn supersede_goals(
    current: &[GoalPeriod],
    replacements: Vec<GoalPeriod>,
) -> (Vec<GoalPeriod>, Vec<GoalPeriod>) {
    let active: HashMap<_, &GoalPeriod> = current
        .iter()
        .filter(|goal| goal.is_active)
        .map(|goal| (goal.slot(), goal))
        .collect();

    let mut retired: Vec<GoalPeriod> = active
        .values()
        .map(|goal| GoalPeriod {
            is_active: false,
            ..(*goal).clone()
        })
        .collect();
    retired.sort_by(|a, b| a.id.cmp(&b.id));

    let installed = replacements
        .into_iter()
        .map(|goal| {
            let supersedes_id = active.get(&goal.slot()).map(|previous| previous.id.clone());
            GoalPeriod {
                is_active: true,
                supersedes_id: goal.supersedes_id.or(supersedes_id),
                ..goal
            }
        })
        .collect();

    (retired, installed)
}
