use super::domain::{Claim, ClaimDetails, RecordId};

/// Raised when another claim already covers the same order and expense attribute.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("a claim for order '{order_id}' with attribute '{item_reason}' already exists")]
pub struct DuplicateClaim {
    pub order_id: String,
    pub item_reason: String,
}

/// Comparison key; whitespace is trimmed but case is preserved.
fn duplicate_key(details: &ClaimDetails) -> Option<(&str, &str)> {
    let order_id = details.order_id.trim();
    let item_reason = details.item_reason.trim();
    if order_id.is_empty() || item_reason.is_empty() {
        None
    } else {
        Some((order_id, item_reason))
    }
}

/// Reject `candidate` when any other claim shares its (order id, item reason) pair.
///
/// `editing` names the claim being edited so it does not conflict with itself. Candidates
/// with a blank order id or item reason are never flagged.
pub fn ensure_unique<'a, I>(
    candidate: &ClaimDetails,
    editing: Option<&RecordId>,
    existing: I,
) -> Result<(), DuplicateClaim>
where
    I: IntoIterator<Item = &'a Claim>,
{
    let Some(key) = duplicate_key(candidate) else {
        return Ok(());
    };

    let conflict = existing
        .into_iter()
        .filter(|claim| Some(&claim.id) != editing)
        .any(|claim| duplicate_key(&claim.details) == Some(key));

    if conflict {
        Err(DuplicateClaim {
            order_id: key.0.to_string(),
            item_reason: key.1.to_string(),
        })
    } else {
        Ok(())
    }
}
