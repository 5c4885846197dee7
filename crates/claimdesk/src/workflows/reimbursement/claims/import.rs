use std::io::Read;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Deserializer};

use super::domain::{Claim, ClaimDetails, ClaimNumber, ClaimStatus, RecordId, User};
use super::identifier::next_claim_number;

#[derive(Debug)]
pub enum ClaimImportError {
    Io(std::io::Error),
    Csv(csv::Error),
    InvalidAmount { line: usize, value: String },
    InvalidStatus { line: usize, value: String },
}

impl std::fmt::Display for ClaimImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClaimImportError::Io(err) => write!(f, "failed to read claim export: {}", err),
            ClaimImportError::Csv(err) => write!(f, "invalid claim CSV data: {}", err),
            ClaimImportError::InvalidAmount { line, value } => {
                write!(f, "line {line}: '{value}' is not a valid amount")
            }
            ClaimImportError::InvalidStatus { line, value } => {
                write!(f, "line {line}: unknown claim status '{value}'")
            }
        }
    }
}

impl std::error::Error for ClaimImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClaimImportError::Io(err) => Some(err),
            ClaimImportError::Csv(err) => Some(err),
            ClaimImportError::InvalidAmount { .. } | ClaimImportError::InvalidStatus { .. } => {
                None
            }
        }
    }
}

impl From<std::io::Error> for ClaimImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for ClaimImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

#[derive(Debug, Deserialize)]
struct ClaimRow {
    #[serde(rename = "Claim ID", default, deserialize_with = "empty_string_as_none")]
    claim_number: Option<String>,
    #[serde(rename = "Store", default)]
    store_name: String,
    #[serde(rename = "SKU", default)]
    sku: String,
    #[serde(rename = "Model", default)]
    model: String,
    #[serde(rename = "Order ID", default)]
    order_id: String,
    #[serde(rename = "Amount USD", default, deserialize_with = "empty_string_as_none")]
    amount_usd: Option<String>,
    #[serde(rename = "Amount CNY", default, deserialize_with = "empty_string_as_none")]
    amount_cny: Option<String>,
    #[serde(rename = "Payment Method", default)]
    payment_method: String,
    #[serde(rename = "Item Reason", default)]
    item_reason: String,
    #[serde(rename = "Client Email", default)]
    client_email: String,
    #[serde(rename = "Note", default)]
    note: String,
    #[serde(rename = "Status", default, deserialize_with = "empty_string_as_none")]
    status: Option<String>,
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

fn parse_amount(raw: Option<String>, line: usize) -> Result<Option<f64>, ClaimImportError> {
    raw.map(|value| {
        value
            .trim()
            .trim_start_matches(['$', '¥'])
            .replace(',', "")
            .parse::<f64>()
            .map_err(|_| ClaimImportError::InvalidAmount { line, value })
    })
    .transpose()
}

/// Parse a claim export into claims owned by `owner`.
///
/// Rows without a claim id are numbered against `existing` plus the rows already parsed.
/// Rows are not screened for duplicates.
pub fn parse_claims<R: Read>(
    reader: R,
    owner: &User,
    existing: &[Claim],
    now: DateTime<Local>,
) -> Result<Vec<Claim>, ClaimImportError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let today = now.date_naive();
    let created_at: DateTime<Utc> = now.with_timezone(&Utc);
    let mut imported: Vec<Claim> = Vec::new();

    for (index, record) in csv_reader.deserialize::<ClaimRow>().enumerate() {
        let row = record?;
        // Header is line 1.
        let line = index + 2;

        let status = match row.status {
            Some(value) => ClaimStatus::parse(&value)
                .ok_or(ClaimImportError::InvalidStatus { line, value })?,
            None => ClaimStatus::Pending,
        };

        let claim_number = match row.claim_number {
            Some(number) => ClaimNumber(number),
            None => next_claim_number(owner, existing.iter().chain(imported.iter()), today),
        };

        let details = ClaimDetails {
            store_name: row.store_name,
            sku: row.sku,
            model: row.model,
            order_id: row.order_id,
            amount_usd: parse_amount(row.amount_usd, line)?,
            amount_cny: parse_amount(row.amount_cny, line)?,
            payment_method: row.payment_method,
            item_reason: row.item_reason,
            client_email: row.client_email,
            note: row.note,
        };

        imported.push(Claim {
            id: RecordId::generate(),
            user_id: owner.id.clone(),
            user_name: owner.label().to_string(),
            claim_number,
            details,
            evidence: Default::default(),
            extra: Default::default(),
            status,
            audit: None,
            created_at,
            updated_at: None,
        });
    }

    Ok(imported)
}
