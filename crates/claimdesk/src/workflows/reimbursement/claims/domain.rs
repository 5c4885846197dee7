use std::collections::BTreeMap;
use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Internal storage identifier for a claim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub String);

impl RecordId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Human-readable claim number shown to submitters, e.g. `ZS20240315001`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClaimNumber(pub String);

impl ClaimNumber {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClaimNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    User,
}

/// Account record. Passwords are kept in plain text; hardening lives outside this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Name recorded on claims: the localized display name when set, otherwise the login name.
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.username)
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

/// High level status tracked throughout the claim lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl ClaimStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ClaimStatus::Pending => "pending",
            ClaimStatus::Approved => "approved",
            ClaimStatus::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// Named screenshot slots a claim can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceSlot {
    /// Transfer receipt for the USD principal.
    UsdTransfer,
    /// Transfer receipt for the CNY amount.
    CnyTransfer,
    /// Order page showing the order id.
    OrderId,
    Conversation,
    ProductReview,
    Other,
}

impl EvidenceSlot {
    pub const fn key(self) -> &'static str {
        match self {
            Self::UsdTransfer => "usd_transfer",
            Self::CnyTransfer => "cny_transfer",
            Self::OrderId => "order_id",
            Self::Conversation => "conversation",
            Self::ProductReview => "product_review",
            Self::Other => "other",
        }
    }
}

/// Embedded screenshot payload.
///
/// Serialized as a `data:<mime>;base64,<payload>` URL so claims round-trip through JSON
/// stores and form posts unchanged.
#[derive(Clone, PartialEq, Eq)]
pub struct EvidenceImage {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl EvidenceImage {
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data,
        }
    }

    pub fn from_data_url(raw: &str) -> Result<Self, EvidenceDecodeError> {
        let rest = raw
            .trim()
            .strip_prefix("data:")
            .ok_or(EvidenceDecodeError::NotADataUrl)?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or(EvidenceDecodeError::NotADataUrl)?;
        let mime_type = header
            .strip_suffix(";base64")
            .ok_or(EvidenceDecodeError::NotBase64)?;

        let parsed: mime::Mime = mime_type
            .parse()
            .map_err(|_| EvidenceDecodeError::UnsupportedMime(mime_type.to_string()))?;
        if parsed.type_() != mime::IMAGE {
            return Err(EvidenceDecodeError::UnsupportedMime(mime_type.to_string()));
        }

        let data = STANDARD
            .decode(payload.trim())
            .map_err(|err| EvidenceDecodeError::Payload(err.to_string()))?;
        if data.is_empty() {
            return Err(EvidenceDecodeError::Empty);
        }

        Ok(Self {
            mime_type: parsed.essence_str().to_string(),
            data,
        })
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, STANDARD.encode(&self.data))
    }
}

impl fmt::Debug for EvidenceImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvidenceImage")
            .field("mime_type", &self.mime_type)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl Serialize for EvidenceImage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_data_url())
    }
}

impl<'de> Deserialize<'de> for EvidenceImage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        EvidenceImage::from_data_url(&raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvidenceDecodeError {
    #[error("evidence must be a data: URL")]
    NotADataUrl,
    #[error("evidence data URL must be base64 encoded")]
    NotBase64,
    #[error("unsupported evidence type '{0}', expected an image")]
    UnsupportedMime(String),
    #[error("evidence payload is not valid base64: {0}")]
    Payload(String),
    #[error("evidence payload is empty")]
    Empty,
}

/// Fixed business attributes present on every claim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClaimDetails {
    #[serde(default)]
    pub store_name: String,
    #[serde(default)]
    pub sku: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub order_id: String,
    #[serde(default)]
    pub amount_usd: Option<f64>,
    #[serde(default)]
    pub amount_cny: Option<f64>,
    #[serde(default)]
    pub payment_method: String,
    /// Expense attribute such as principal or commission; half of the duplicate key.
    #[serde(default)]
    pub item_reason: String,
    #[serde(default)]
    pub client_email: String,
    #[serde(default)]
    pub note: String,
}

/// Names of the fixed attributes a configurable field can bind to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusinessAttribute {
    StoreName,
    Sku,
    Model,
    OrderId,
    AmountUsd,
    AmountCny,
    PaymentMethod,
    ItemReason,
    ClientEmail,
    Note,
    Evidence(EvidenceSlot),
}

/// Everything a submitter provides; the service turns it into a [`Claim`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClaimDraft {
    #[serde(default)]
    pub details: ClaimDetails,
    #[serde(default)]
    pub evidence: BTreeMap<EvidenceSlot, EvidenceImage>,
    /// Values for configurable fields that are not bound to a fixed attribute.
    #[serde(default)]
    pub extra: BTreeMap<String, Value>,
}

/// Stored reimbursement request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub id: RecordId,
    pub user_id: UserId,
    pub user_name: String,
    pub claim_number: ClaimNumber,
    pub details: ClaimDetails,
    #[serde(default)]
    pub evidence: BTreeMap<EvidenceSlot, EvidenceImage>,
    #[serde(default)]
    pub extra: BTreeMap<String, Value>,
    pub status: ClaimStatus,
    #[serde(default)]
    pub audit: Option<AuditResult>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Claim {
    pub fn evidence(&self, slot: EvidenceSlot) -> Option<&EvidenceImage> {
        self.evidence.get(&slot)
    }

    /// Replace the submitter-controlled content while keeping identity and timestamps.
    pub fn apply_draft(&mut self, draft: ClaimDraft) {
        self.details = draft.details;
        self.evidence = draft.evidence;
        self.extra = draft.extra;
    }

    pub fn summary_view(&self) -> ClaimSummaryView {
        ClaimSummaryView {
            id: self.id.clone(),
            claim_number: self.claim_number.clone(),
            user_name: self.user_name.clone(),
            order_id: self.details.order_id.clone(),
            item_reason: self.details.item_reason.clone(),
            amount_usd: self.details.amount_usd,
            status: self.status.label(),
            audit_summary: self.audit.as_ref().map(AuditResult::summary),
            evidence_slots: self.evidence.keys().map(|slot| slot.key()).collect(),
            created_at: self.created_at,
        }
    }
}

/// Listing representation without image payloads.
#[derive(Debug, Clone, Serialize)]
pub struct ClaimSummaryView {
    pub id: RecordId,
    pub claim_number: ClaimNumber,
    pub user_name: String,
    pub order_id: String,
    pub item_reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_usd: Option<f64>,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_summary: Option<String>,
    pub evidence_slots: Vec<&'static str>,
    pub created_at: DateTime<Utc>,
}

/// Outcome of one automated comparison against one screenshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleCheck {
    pub verified: bool,
    #[serde(default)]
    pub extracted_amount: Option<f64>,
    #[serde(default)]
    pub extracted_text: Option<String>,
    pub reason: String,
}

impl SingleCheck {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            verified: false,
            extracted_amount: None,
            extracted_text: None,
            reason: reason.into(),
        }
    }

    /// Something was read from the screenshot, so a non-match is a real mismatch.
    pub fn found_amount(&self) -> bool {
        self.extracted_amount.is_some()
    }

    pub fn found_text(&self) -> bool {
        self.extracted_text
            .as_deref()
            .map(|text| !text.trim().is_empty())
            .unwrap_or(false)
    }
}

/// Bundle of the three checks run during one audit pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditResult {
    pub usd: SingleCheck,
    pub cny: SingleCheck,
    pub order_id: SingleCheck,
    pub audited_at: DateTime<Utc>,
}

impl AuditResult {
    pub fn summary(&self) -> String {
        let mark = |check: &SingleCheck| if check.verified { "ok" } else { "x" };
        format!(
            "usd {} / cny {} / order {}",
            mark(&self.usd),
            mark(&self.cny),
            mark(&self.order_id)
        )
    }
}
