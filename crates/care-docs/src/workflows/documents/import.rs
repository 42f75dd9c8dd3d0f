use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Deserializer};
use std::io::Read;
use std::path::Path;

use super::domain::{BillingRecord, ClientId};

#[derive(Debug)]
pub enum BillingImportError {
    Io(std::io::Error),
    Csv(csv::Error),
    MissingField { line: u64, field: &'static str },
    InvalidDate { line: u64, value: String },
}

impl std::fmt::Display for BillingImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BillingImportError::Io(err) => write!(f, "failed to read billing export: {}", err),
            BillingImportError::Csv(err) => write!(f, "invalid billing CSV data: {}", err),
            BillingImportError::MissingField { line, field } => {
                write!(f, "billing row {} is missing `{}`", line, field)
            }
            BillingImportError::InvalidDate { line, value } => {
                write!(f, "billing row {} has an unreadable service date `{}`", line, value)
            }
        }
    }
}

impl std::error::Error for BillingImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BillingImportError::Io(err) => Some(err),
            BillingImportError::Csv(err) => Some(err),
            BillingImportError::MissingField { .. } | BillingImportError::InvalidDate { .. } => {
                None
            }
        }
    }
}

impl From<std::io::Error> for BillingImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for BillingImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

/// Reads the monthly billing export used by the service-consistency and
/// helper-employment rules.
pub struct BillingCsvImporter;

impl BillingCsvImporter {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Vec<BillingRecord>, BillingImportError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Vec<BillingRecord>, BillingImportError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut records = Vec::new();

        for (index, row) in csv_reader.deserialize::<BillingRow>().enumerate() {
            // Header is line 1.
            let line = index as u64 + 2;
            records.push(row?.into_record(line)?);
        }

        Ok(records)
    }
}

#[derive(Debug, Deserialize)]
struct BillingRow {
    #[serde(default, deserialize_with = "empty_string_as_none")]
    client_id: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    helper_name: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    service_date: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    service_code: Option<String>,
}

impl BillingRow {
    fn into_record(self, line: u64) -> Result<BillingRecord, BillingImportError> {
        let missing = |field| BillingImportError::MissingField { line, field };

        let client_id = self.client_id.ok_or_else(|| missing("client_id"))?;
        let helper_name = self.helper_name.ok_or_else(|| missing("helper_name"))?;
        let raw_date = self.service_date.ok_or_else(|| missing("service_date"))?;
        let service_code = self.service_code.ok_or_else(|| missing("service_code"))?;
        let service_date =
            parse_service_date(&raw_date).ok_or(BillingImportError::InvalidDate {
                line,
                value: raw_date,
            })?;

        Ok(BillingRecord {
            client_id: ClientId(client_id),
            helper_name,
            service_date,
            service_code,
        })
    }
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

fn parse_service_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Some(date);
    }
    DateTime::parse_from_rfc3339(trimmed)
        .ok()
        .map(|dt| dt.date_naive())
}
