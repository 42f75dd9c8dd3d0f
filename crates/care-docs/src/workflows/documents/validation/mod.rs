mod rules;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{BillingRecord, CareClient, ClientId, DocumentSchedule, Helper};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckName {
    PlanBeforeContract,
    HelperEmployment,
    ServiceConsistency,
    CareLevelMatch,
    DocumentFreshness,
}

impl CheckName {
    pub const fn label(self) -> &'static str {
        match self {
            Self::PlanBeforeContract => "plan_before_contract",
            Self::HelperEmployment => "helper_employment",
            Self::ServiceConsistency => "service_consistency",
            Self::CareLevelMatch => "care_level_match",
            Self::DocumentFreshness => "document_freshness",
        }
    }

    /// Severity is fixed per rule, independent of the outcome.
    pub const fn severity(self) -> Severity {
        match self {
            Self::PlanBeforeContract | Self::HelperEmployment | Self::DocumentFreshness => {
                Severity::Critical
            }
            Self::ServiceConsistency | Self::CareLevelMatch => Severity::Warning,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Warning,
}

/// Outcome of one regulatory-consistency rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationCheck {
    pub check: CheckName,
    pub status: CheckStatus,
    pub message: String,
    pub severity: Severity,
}

impl ValidationCheck {
    pub(crate) fn new(check: CheckName, status: CheckStatus, message: impl Into<String>) -> Self {
        Self {
            check,
            status,
            message: message.into(),
            severity: check.severity(),
        }
    }
}

/// Snapshot of every rule for one client. Recomputed on demand; a stored copy
/// is only a cache for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub care_client_id: ClientId,
    pub is_valid: bool,
    pub checks: Vec<ValidationCheck>,
    pub checked_at: DateTime<Utc>,
}

impl ValidationResult {
    pub fn check(&self, name: CheckName) -> Option<&ValidationCheck> {
        self.checks.iter().find(|check| check.check == name)
    }
}

/// Three-bucket signal for the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientValidationStatus {
    Ok,
    Warning,
    Critical,
}

impl ClientValidationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Warning => "Warning",
            Self::Critical => "Critical",
        }
    }
}

/// Entities a validation pass reads for one client.
#[derive(Debug, Clone, Copy)]
pub struct ValidationInput<'a> {
    pub schedules: &'a [DocumentSchedule],
    pub helpers: &'a [Helper],
    pub billing_records: &'a [BillingRecord],
}

/// Run every rule for `client`. Never fails; inconsistencies are reported as
/// `warn`/`fail` checks.
pub fn validate_client_documents(
    client: &CareClient,
    input: ValidationInput<'_>,
    today: NaiveDate,
    checked_at: DateTime<Utc>,
) -> ValidationResult {
    let client_schedules: Vec<&DocumentSchedule> = input
        .schedules
        .iter()
        .filter(|row| row.care_client_id == client.id)
        .collect();
    let client_billing: Vec<&BillingRecord> = input
        .billing_records
        .iter()
        .filter(|record| record.client_id == client.id)
        .collect();

    let checks = vec![
        rules::plan_before_contract(client, &client_schedules, today),
        rules::helper_employment(&client_billing, input.helpers),
        rules::service_consistency(client, &client_billing),
        rules::care_level_match(client),
        rules::document_freshness(client, &client_schedules, today),
    ];

    let is_valid = checks.iter().all(|check| check.status == CheckStatus::Pass);

    ValidationResult {
        care_client_id: client.id.clone(),
        is_valid,
        checks,
        checked_at,
    }
}

/// Validate every client that has not been deleted, in input order.
pub fn validate_all_clients(
    clients: &[CareClient],
    input: ValidationInput<'_>,
    today: NaiveDate,
    checked_at: DateTime<Utc>,
) -> Vec<ValidationResult> {
    clients
        .iter()
        .filter(|client| !client.deleted)
        .map(|client| validate_client_documents(client, input, today, checked_at))
        .collect()
}

pub fn client_validation_status(result: &ValidationResult) -> ClientValidationStatus {
    let critical = result.checks.iter().any(|check| {
        check.status == CheckStatus::Fail && check.severity == Severity::Critical
    });
    if critical {
        return ClientValidationStatus::Critical;
    }

    if result
        .checks
        .iter()
        .any(|check| check.status != CheckStatus::Pass)
    {
        ClientValidationStatus::Warning
    } else {
        ClientValidationStatus::Ok
    }
}
