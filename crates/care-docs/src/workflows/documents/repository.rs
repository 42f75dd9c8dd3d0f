use serde::{Deserialize, Serialize};

use super::domain::{
    BillingRecord, CareClient, ClientId, DocType, DocumentSchedule, GoalPeriod, GoalPeriodId,
    Helper, MonitoringItemId, MonitoringScheduleItem, MonitoringType,
};
use super::schedule::ScheduleActionType;
use super::validation::ValidationResult;

/// Storage abstraction for everything the engine reads and writes.
///
/// `save_schedule` and `save_monitoring_schedule` are compare-and-swap: an
/// implementation rejects a row whose `version` differs from the stored one
/// with [`RepositoryError::Conflict`] and returns the stored row with its
/// version bumped. A row with version 0 that does not exist yet is inserted.
///
/// `insert_monitoring_schedule` only creates: an item whose id is already
/// stored fails with [`RepositoryError::Conflict`] and leaves the stored row
/// untouched. New items are stored at version 1.
pub trait ScheduleRepository: Send + Sync {
    fn load_clients(&self) -> Result<Vec<CareClient>, RepositoryError>;
    fn load_helpers(&self) -> Result<Vec<Helper>, RepositoryError>;
    fn load_billing_records_for_month(
        &self,
        year: i32,
        month: u32,
    ) -> Result<Vec<BillingRecord>, RepositoryError>;

    fn load_schedules(
        &self,
        client: Option<&ClientId>,
    ) -> Result<Vec<DocumentSchedule>, RepositoryError>;
    fn save_schedule(&self, schedule: DocumentSchedule)
        -> Result<DocumentSchedule, RepositoryError>;

    fn load_goal_periods(
        &self,
        client: Option<&ClientId>,
    ) -> Result<Vec<GoalPeriod>, RepositoryError>;
    fn save_goal_period(&self, goal: GoalPeriod) -> Result<GoalPeriod, RepositoryError>;
    fn delete_goal_period(&self, id: &GoalPeriodId) -> Result<(), RepositoryError>;

    fn load_monitoring_schedules(
        &self,
        client: Option<&ClientId>,
    ) -> Result<Vec<MonitoringScheduleItem>, RepositoryError>;
    fn save_monitoring_schedule(
        &self,
        item: MonitoringScheduleItem,
    ) -> Result<MonitoringScheduleItem, RepositoryError>;
    fn insert_monitoring_schedule(
        &self,
        item: MonitoringScheduleItem,
    ) -> Result<MonitoringScheduleItem, RepositoryError>;
    fn delete_monitoring_schedule(&self, id: &MonitoringItemId) -> Result<(), RepositoryError>;

    fn load_validations(&self) -> Result<Vec<ValidationResult>, RepositoryError>;
    fn save_validation(&self, result: ValidationResult) -> Result<(), RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record was modified concurrently")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// What a generation run produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum GenerationTarget {
    Document(DocType),
    Monitoring(MonitoringType),
}

impl GenerationTarget {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Document(doc_type) => doc_type.label(),
            Self::Monitoring(monitoring_type) => monitoring_type.label(),
        }
    }
}

/// Output format requested from the renderer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderFormat {
    Html,
    #[default]
    Pdf,
    Excel,
}

/// Facts the generator needs beyond the client record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationContext {
    pub action_type: ScheduleActionType,
    pub due_date: chrono::NaiveDate,
    pub render: RenderFormat,
    pub goal_period_id: Option<GoalPeriodId>,
    pub trigger_event: Option<String>,
    pub previous_document_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedDocument {
    pub document_id: String,
    pub file_url: String,
    /// Set when the generator concluded the underlying plan must change.
    #[serde(default)]
    pub plan_revision: Option<String>,
}

/// External document-generation collaborator (content assembly and rendering).
pub trait DocumentGenerator: Send + Sync {
    fn generate(
        &self,
        target: GenerationTarget,
        client: &CareClient,
        context: &GenerationContext,
        progress: &mut dyn FnMut(&str),
    ) -> Result<GeneratedDocument, GenerationError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("document generation timed out")]
    Timeout,
    #[error("generator returned malformed output: {0}")]
    Malformed(String),
    #[error("generation quota exhausted")]
    Quota,
    #[error("document generation failed: {0}")]
    Failed(String),
}
