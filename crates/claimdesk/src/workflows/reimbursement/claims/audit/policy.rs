use serde::{Deserialize, Serialize};

use super::super::domain::{ClaimStatus, SingleCheck};

/// Which confirmed mismatch caused a rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MismatchKind {
    UsdAmount,
    OrderId,
    CnyAmount,
}

/// Adjudication derived from the three checks of an audit pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditVerdict {
    Approved,
    Rejected(MismatchKind),
    /// Nothing readable to compare against; left for a human.
    Inconclusive,
}

impl AuditVerdict {
    pub const fn status(self) -> ClaimStatus {
        match self {
            AuditVerdict::Approved => ClaimStatus::Approved,
            AuditVerdict::Rejected(_) => ClaimStatus::Rejected,
            AuditVerdict::Inconclusive => ClaimStatus::Pending,
        }
    }

    pub fn summary(self) -> String {
        match self {
            AuditVerdict::Approved => "all evidence verified".to_string(),
            AuditVerdict::Rejected(MismatchKind::UsdAmount) => {
                "rejected: USD amount does not match the transfer screenshot".to_string()
            }
            AuditVerdict::Rejected(MismatchKind::OrderId) => {
                "rejected: order id does not match the order screenshot".to_string()
            }
            AuditVerdict::Rejected(MismatchKind::CnyAmount) => {
                "rejected: CNY amount does not match the transfer screenshot".to_string()
            }
            AuditVerdict::Inconclusive => "inconclusive: evidence could not be read".to_string(),
        }
    }
}

/// Combine the checks; the first matching rule wins.
///
/// A failed check that still extracted something is a confirmed mismatch and rejects the
/// claim. A failed check that extracted nothing only keeps the claim pending.
pub fn decide(
    usd: &SingleCheck,
    cny: &SingleCheck,
    order_id: &SingleCheck,
    cny_supplied: bool,
) -> AuditVerdict {
    if usd.found_amount() && !usd.verified {
        return AuditVerdict::Rejected(MismatchKind::UsdAmount);
    }

    if order_id.found_text() && !order_id.verified {
        return AuditVerdict::Rejected(MismatchKind::OrderId);
    }

    if cny_supplied && cny.found_amount() && !cny.verified {
        return AuditVerdict::Rejected(MismatchKind::CnyAmount);
    }

    if usd.verified && order_id.verified && (!cny_supplied || cny.verified) {
        return AuditVerdict::Approved;
    }

    AuditVerdict::Inconclusive
}
