use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::super::domain::{EvidenceImage, SingleCheck};

/// Absolute difference under which an extracted amount matches the claimed one.
pub const AMOUNT_TOLERANCE: f64 = 0.05;

pub fn amounts_match(claimed: f64, extracted: f64) -> bool {
    // Slack for binary rounding of values such as 50.05 - 50.00.
    (claimed - extracted).abs() <= AMOUNT_TOLERANCE + 1e-9
}

/// Order ids match when the screenshot text contains the claimed id, ignoring case and
/// surrounding whitespace.
pub fn text_matches(claimed: &str, extracted: &str) -> bool {
    let claimed = claimed.trim().to_lowercase();
    if claimed.is_empty() {
        return false;
    }
    extracted.trim().to_lowercase().contains(&claimed)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmountCheck {
    pub verified: bool,
    pub extracted_amount: Option<f64>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextCheck {
    pub verified: bool,
    pub extracted_text: Option<String>,
    pub reason: String,
}

impl From<AmountCheck> for SingleCheck {
    fn from(check: AmountCheck) -> Self {
        SingleCheck {
            verified: check.verified,
            extracted_amount: check.extracted_amount,
            extracted_text: None,
            reason: check.reason,
        }
    }
}

impl From<TextCheck> for SingleCheck {
    fn from(check: TextCheck) -> Self {
        SingleCheck {
            verified: check.verified,
            extracted_amount: None,
            extracted_text: check.extracted_text,
            reason: check.reason,
        }
    }
}

/// Failure talking to the image verification model.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerificationError {
    #[error("verification service not configured: {0}")]
    NotConfigured(String),
    #[error("verification request failed: {0}")]
    Transport(String),
    #[error("verification service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("could not parse verification response: {0}")]
    Parse(String),
}

/// Image-analysis collaborator used by the audit resolver.
#[async_trait]
pub trait ImageVerifier: Send + Sync {
    async fn check_amount(
        &self,
        target: f64,
        image: &EvidenceImage,
        currency_label: &str,
    ) -> Result<AmountCheck, VerificationError>;

    async fn check_text(
        &self,
        target: &str,
        image: &EvidenceImage,
        context_label: &str,
    ) -> Result<TextCheck, VerificationError>;
}
