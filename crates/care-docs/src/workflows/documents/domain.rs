use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for care clients.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub String);

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScheduleId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GoalPeriodId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MonitoringItemId(pub String);

impl std::fmt::Display for MonitoringItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The three regulatory documents tracked for every client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocType {
    CarePlan,
    Tejunsho,
    Monitoring,
}

impl DocType {
    pub const fn ordered() -> [Self; 3] {
        [Self::CarePlan, Self::Tejunsho, Self::Monitoring]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::CarePlan => "Care Plan",
            Self::Tejunsho => "Procedure Document",
            Self::Monitoring => "Monitoring Review",
        }
    }

    pub const fn key(self) -> &'static str {
        match self {
            Self::CarePlan => "care_plan",
            Self::Tejunsho => "tejunsho",
            Self::Monitoring => "monitoring",
        }
    }

    pub fn from_key(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "care_plan" | "care-plan" => Some(Self::CarePlan),
            "tejunsho" => Some(Self::Tejunsho),
            "monitoring" => Some(Self::Monitoring),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Pending,
    Active,
    DueSoon,
    Overdue,
    Generating,
}

impl ScheduleStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::DueSoon => "due_soon",
            Self::Overdue => "overdue",
            Self::Generating => "generating",
        }
    }
}

/// Renewal state for one (client, document type) pair.
///
/// `next_due_date` and `alert_date` are derived from `last_generated_at`,
/// `cycle_months` and `alert_days_before`; they are only ever written by the
/// checker and executor. `version` is bumped by the repository on every save
/// and used to reject stale writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSchedule {
    pub id: ScheduleId,
    pub care_client_id: ClientId,
    pub doc_type: DocType,
    pub status: ScheduleStatus,
    pub last_generated_at: Option<DateTime<Utc>>,
    pub next_due_date: Option<NaiveDate>,
    pub alert_date: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
    pub cycle_months: u32,
    pub alert_days_before: u32,
    /// Explicit authoring date of the plan, when staff recorded one.
    #[serde(default)]
    pub plan_created_on: Option<NaiveDate>,
    #[serde(default)]
    pub plan_revision_needed: Option<bool>,
    #[serde(default)]
    pub plan_revision_reason: Option<String>,
    #[serde(default)]
    pub last_document_id: Option<String>,
    #[serde(default)]
    pub last_file_url: Option<String>,
    pub auto_generate: bool,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DocumentSchedule {
    /// Lazily created row for a client observed without one.
    pub fn pending(
        client_id: &ClientId,
        doc_type: DocType,
        cycle_months: u32,
        alert_days_before: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ScheduleId(format!("sched-{}-{}", client_id.0, doc_type.key())),
            care_client_id: client_id.clone(),
            doc_type,
            status: ScheduleStatus::Pending,
            last_generated_at: None,
            next_due_date: None,
            alert_date: None,
            expiry_date: None,
            cycle_months,
            alert_days_before,
            plan_created_on: None,
            plan_revision_needed: None,
            plan_revision_reason: None,
            last_document_id: None,
            last_file_url: None,
            auto_generate: true,
            notes: String::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_been_generated(&self) -> bool {
        self.last_generated_at.is_some()
    }

    /// Authoring date of the document: the explicit creation date when set,
    /// otherwise the date portion of the last generation.
    pub fn authored_on(&self) -> Option<NaiveDate> {
        self.plan_created_on
            .or_else(|| self.last_generated_at.map(|at| at.date_naive()))
    }
}

/// Client record as far as the engine needs it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CareClient {
    pub id: ClientId,
    pub name: String,
    #[serde(default)]
    pub contract_start: Option<NaiveDate>,
    #[serde(default)]
    pub care_level: Option<String>,
    /// Service codes the client is configured to receive.
    #[serde(default)]
    pub service_types: Vec<String>,
    #[serde(default)]
    pub deleted: bool,
}

/// Care worker employment record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Helper {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub hire_date: Option<NaiveDate>,
}

/// One billed visit attributed to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingRecord {
    pub client_id: ClientId,
    pub helper_name: String,
    pub service_date: NaiveDate,
    pub service_code: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalKind {
    LongTerm,
    ShortTerm,
}

/// Maximum number of simultaneously active short-term goals.
pub const MAX_SHORT_TERM_GOALS: u8 = 3;

/// A client's long-term goal or one of its short-term goals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalPeriod {
    pub id: GoalPeriodId,
    pub care_client_id: ClientId,
    pub kind: GoalKind,
    /// Slot of a short-term goal (0..3); always 0 for the long-term goal.
    #[serde(default)]
    pub goal_index: u8,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub goal_text: String,
    pub is_active: bool,
    #[serde(default)]
    pub supersedes_id: Option<GoalPeriodId>,
}

impl GoalPeriod {
    pub fn monitoring_type(&self) -> MonitoringType {
        match self.kind {
            GoalKind::LongTerm => MonitoringType::LongTerm,
            GoalKind::ShortTerm => MonitoringType::ShortTerm,
        }
    }

    /// Kind and slot pair that a replacement goal takes over.
    pub fn slot(&self) -> (GoalKind, u8) {
        (self.kind, self.goal_index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitoringType {
    ShortTerm,
    LongTerm,
    Emergency,
}

impl MonitoringType {
    pub const fn label(self) -> &'static str {
        match self {
            Self::ShortTerm => "Short-term Monitoring",
            Self::LongTerm => "Long-term Monitoring",
            Self::Emergency => "Emergency Monitoring",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitoringStatus {
    Pending,
    Scheduled,
    Generating,
    Completed,
}

impl MonitoringStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Scheduled => "scheduled",
            Self::Generating => "generating",
            Self::Completed => "completed",
        }
    }
}

/// A scheduled review tied to a goal period, or an emergency review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringScheduleItem {
    pub id: MonitoringItemId,
    pub care_client_id: ClientId,
    pub goal_period_id: Option<GoalPeriodId>,
    pub monitoring_type: MonitoringType,
    pub status: MonitoringStatus,
    pub due_date: NaiveDate,
    pub alert_date: Option<NaiveDate>,
    #[serde(default)]
    pub trigger_event: Option<String>,
    #[serde(default)]
    pub trigger_notes: Option<String>,
    pub auto_generate: bool,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub plan_revision_needed: bool,
    #[serde(default)]
    pub last_document_id: Option<String>,
    #[serde(default)]
    pub last_file_url: Option<String>,
    #[serde(default)]
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("monitoring item {0} is already completed")]
pub struct AlreadyCompleted(pub MonitoringItemId);

impl MonitoringScheduleItem {
    pub fn is_completed(&self) -> bool {
        self.status == MonitoringStatus::Completed
    }

    /// Set the terminal fields. A completed item never changes again.
    pub fn complete(&mut self, at: DateTime<Utc>) -> Result<(), AlreadyCompleted> {
        if self.is_completed() {
            return Err(AlreadyCompleted(self.id.clone()));
        }
        self.status = MonitoringStatus::Completed;
        self.completed_at = Some(at);
        Ok(())
    }
}
