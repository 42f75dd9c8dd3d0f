//! Compliance document lifecycle: due-date scheduling for care plans,
//! procedure manuals (tejunsho) and monitoring reviews, pre-audit validation,
//! and guarded execution against a document generator.

pub mod calendar;
pub mod domain;
pub mod execution;
pub mod import;
pub mod monitoring;
pub mod repository;
pub mod router;
pub mod schedule;
pub mod service;
pub mod validation;

#[cfg(test)]
mod tests;

pub use calendar::{Clock, FixedClock, ScheduleConfigError, SystemClock};
pub use domain::{
    BillingRecord, CareClient, ClientId, DocType, DocumentSchedule, GoalKind, GoalPeriod,
    GoalPeriodId, Helper, MonitoringItemId, MonitoringScheduleItem, MonitoringStatus,
    MonitoringType, ScheduleId, ScheduleStatus,
};
pub use execution::{
    BatchItemResult, BatchReport, DocumentExecution, ExecutionError, MonitoringExecution,
    ScheduleExecutor,
};
pub use import::{BillingCsvImporter, BillingImportError};
pub use monitoring::{
    check_monitoring_schedules, generate_monitoring_schedules_from_goals, MonitoringAction,
    MonitoringCheck,
};
pub use repository::{
    DocumentGenerator, GeneratedDocument, GenerationContext, GenerationError, GenerationTarget,
    RenderFormat, RepositoryError, ScheduleRepository,
};
pub use router::compliance_router;
pub use schedule::{
    check_contract_date_alerts, check_document_schedules, ContractAlertKind, ContractDateAlert,
    ScheduleAction, ScheduleActionType, ScheduleCheck,
};
pub use service::{
    BulkExecutionReport, CheckPassReport, ComplianceService, ComplianceServiceError,
    EmergencyRequest, GoalReplacement,
};
pub use validation::{
    client_validation_status, validate_all_clients, validate_client_documents, CheckName,
    CheckStatus, ClientValidationStatus, Severity, ValidationCheck, ValidationInput,
    ValidationResult,
};
