use serde_json::Value;

use super::super::domain::{BusinessAttribute, ClaimDraft};
use super::field::{FieldDefinition, FieldKind, FieldSet};

/// Every required field left unset, reported by label in form order.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("missing required fields: {}", .labels.join(", "))]
pub struct MissingRequiredFields {
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIssue {
    pub label: String,
    pub problem: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid field values: {}", describe(.issues))]
pub struct InvalidFieldValues {
    pub issues: Vec<FieldIssue>,
}

fn describe(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(|issue| format!("{} ({})", issue.label, issue.problem))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaViolation {
    #[error(transparent)]
    Missing(#[from] MissingRequiredFields),
    #[error(transparent)]
    Invalid(#[from] InvalidFieldValues),
}

/// Borrowed view of a field's current value.
#[derive(Debug, Clone, Copy, PartialEq)]
enum FieldValue<'a> {
    Absent,
    Text(&'a str),
    Number(f64),
    Attachment,
    Json(&'a Value),
}

impl FieldValue<'_> {
    fn is_missing(&self) -> bool {
        match self {
            FieldValue::Absent => true,
            FieldValue::Text(text) => text.is_empty(),
            FieldValue::Json(Value::Null) => true,
            FieldValue::Json(Value::String(text)) => text.is_empty(),
            FieldValue::Number(_) | FieldValue::Attachment | FieldValue::Json(_) => false,
        }
    }
}

fn resolve<'a>(field: &FieldDefinition, draft: &'a ClaimDraft) -> FieldValue<'a> {
    let details = &draft.details;
    match field.binding {
        Some(BusinessAttribute::StoreName) => FieldValue::Text(&details.store_name),
        Some(BusinessAttribute::Sku) => FieldValue::Text(&details.sku),
        Some(BusinessAttribute::Model) => FieldValue::Text(&details.model),
        Some(BusinessAttribute::OrderId) => FieldValue::Text(&details.order_id),
        Some(BusinessAttribute::AmountUsd) => number_or_absent(details.amount_usd),
        Some(BusinessAttribute::AmountCny) => number_or_absent(details.amount_cny),
        Some(BusinessAttribute::PaymentMethod) => FieldValue::Text(&details.payment_method),
        Some(BusinessAttribute::ItemReason) => FieldValue::Text(&details.item_reason),
        Some(BusinessAttribute::ClientEmail) => FieldValue::Text(&details.client_email),
        Some(BusinessAttribute::Note) => FieldValue::Text(&details.note),
        Some(BusinessAttribute::Evidence(slot)) => {
            if draft.evidence.contains_key(&slot) {
                FieldValue::Attachment
            } else {
                FieldValue::Absent
            }
        }
        None => draft
            .extra
            .get(&field.id)
            .map(FieldValue::Json)
            .unwrap_or(FieldValue::Absent),
    }
}

fn number_or_absent(value: Option<f64>) -> FieldValue<'static> {
    value.map(FieldValue::Number).unwrap_or(FieldValue::Absent)
}

/// Labels of required fields without a value. Zero counts as a value.
pub fn missing_required(fields: &FieldSet, draft: &ClaimDraft) -> Vec<String> {
    fields
        .required()
        .filter(|field| resolve(field, draft).is_missing())
        .map(|field| field.label.clone())
        .collect()
}

fn format_problem(field: &FieldDefinition, value: FieldValue<'_>) -> Option<String> {
    let text = match value {
        FieldValue::Text(text) => text,
        FieldValue::Json(Value::String(text)) => text.as_str(),
        FieldValue::Json(Value::Number(_)) | FieldValue::Number(_) => {
            return None;
        }
        FieldValue::Json(Value::Null) | FieldValue::Absent | FieldValue::Attachment => {
            return None;
        }
        FieldValue::Json(_) => {
            return match field.kind {
                FieldKind::Number => Some("expected a number".to_string()),
                FieldKind::Email => Some("expected an email address".to_string()),
                _ => None,
            };
        }
    };

    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    match field.kind {
        FieldKind::Number if text.parse::<f64>().is_err() => Some("expected a number".to_string()),
        FieldKind::Email if !looks_like_email(text) => {
            Some("expected an email address".to_string())
        }
        _ => None,
    }
}

fn looks_like_email(text: &str) -> bool {
    match text.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !domain.contains('@'),
        None => false,
    }
}

/// Check the draft against the configured form.
///
/// Missing required fields are reported first and in full; format problems on number and
/// email fields are only reported once nothing required is missing.
pub fn validate(fields: &FieldSet, draft: &ClaimDraft) -> Result<(), SchemaViolation> {
    let labels = missing_required(fields, draft);
    if !labels.is_empty() {
        return Err(MissingRequiredFields { labels }.into());
    }

    let issues: Vec<FieldIssue> = fields
        .fields()
        .iter()
        .filter_map(|field| {
            format_problem(field, resolve(field, draft)).map(|problem| FieldIssue {
                label: field.label.clone(),
                problem,
            })
        })
        .collect();

    if issues.is_empty() {
        Ok(())
    } else {
        Err(InvalidFieldValues { issues }.into())
    }
}
