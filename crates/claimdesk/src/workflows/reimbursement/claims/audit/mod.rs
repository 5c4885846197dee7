//! Evidence audit: three independent screenshot checks folded into one claim status.

mod batch;
mod policy;
mod verifier;

pub use batch::{run_sequential, BatchAuditReport, BatchItemOutcome};
pub use policy::{decide, AuditVerdict, MismatchKind};
pub use verifier::{
    amounts_match, text_matches, AmountCheck, ImageVerifier, TextCheck, VerificationError,
    AMOUNT_TOLERANCE,
};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::domain::{AuditResult, Claim, EvidenceImage, EvidenceSlot, SingleCheck};

/// Raised when a claim has neither a USD transfer nor an order-id screenshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("claim has no USD transfer or order id screenshot to audit")]
pub struct NoEvidence;

/// What one audit pass looks at.
#[derive(Debug, Clone, Copy)]
pub struct AuditInputs<'a> {
    pub amount_usd: Option<f64>,
    pub amount_cny: Option<f64>,
    pub order_id: &'a str,
    pub usd_image: Option<&'a EvidenceImage>,
    pub cny_image: Option<&'a EvidenceImage>,
    /// Falls back to the USD screenshot when no dedicated order screenshot exists.
    pub order_image: Option<&'a EvidenceImage>,
}

impl<'a> AuditInputs<'a> {
    pub fn from_claim(claim: &'a Claim) -> Self {
        let usd_image = claim.evidence(EvidenceSlot::UsdTransfer);
        Self {
            amount_usd: claim.details.amount_usd,
            amount_cny: claim.details.amount_cny,
            order_id: claim.details.order_id.trim(),
            usd_image,
            cny_image: claim.evidence(EvidenceSlot::CnyTransfer),
            order_image: claim.evidence(EvidenceSlot::OrderId).or(usd_image),
        }
    }
}

/// Outcome of one audit pass before it is written back.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditOutcome {
    pub result: AuditResult,
    pub verdict: AuditVerdict,
}

/// Runs the checks against an [`ImageVerifier`] and derives the verdict.
pub struct AuditResolver<V> {
    verifier: Arc<V>,
    check_timeout: Duration,
}

impl<V> AuditResolver<V>
where
    V: ImageVerifier + 'static,
{
    pub fn new(verifier: Arc<V>, check_timeout: Duration) -> Self {
        Self {
            verifier,
            check_timeout,
        }
    }

    /// Run the three checks concurrently. Collaborator failures and timeouts degrade the
    /// affected check only.
    ///
    /// A check with no claimed value to compare is recorded as failed without calling the
    /// verifier, so it can keep the claim pending but never reject it.
    pub async fn evaluate(
        &self,
        inputs: AuditInputs<'_>,
        audited_at: DateTime<Utc>,
    ) -> Result<AuditOutcome, NoEvidence> {
        if inputs.usd_image.is_none() && inputs.order_image.is_none() {
            return Err(NoEvidence);
        }

        let usd = async {
            match (inputs.usd_image, inputs.amount_usd) {
                (Some(image), Some(target)) => {
                    self.guarded("usd", self.verifier.check_amount(target, image, "USD"))
                        .await
                }
                (None, _) => SingleCheck::failed("no USD transfer screenshot supplied"),
                (Some(_), None) => SingleCheck::failed("no claimed USD amount"),
            }
        };
        let cny = async {
            match (inputs.cny_image, inputs.amount_cny) {
                (Some(image), Some(target)) => {
                    self.guarded("cny", self.verifier.check_amount(target, image, "CNY"))
                        .await
                }
                (None, _) => SingleCheck::failed("no CNY transfer screenshot supplied"),
                (Some(_), None) => SingleCheck::failed("no claimed CNY amount"),
            }
        };
        let order_id = async {
            match inputs.order_image {
                Some(_) if inputs.order_id.is_empty() => SingleCheck::failed("no claimed order id"),
                Some(image) => {
                    self.guarded(
                        "order_id",
                        self.verifier.check_text(inputs.order_id, image, "order id"),
                    )
                    .await
                }
                None => SingleCheck::failed("no order id screenshot supplied"),
            }
        };

        let (usd, cny, order_id) = tokio::join!(usd, cny, order_id);
        let cny_supplied = inputs.cny_image.is_some() && inputs.amount_cny.is_some();
        let verdict = decide(&usd, &cny, &order_id, cny_supplied);

        Ok(AuditOutcome {
            result: AuditResult {
                usd,
                cny,
                order_id,
                audited_at,
            },
            verdict,
        })
    }

    /// Audit a claim and return the updated copy with its verdict; the input is never modified.
    pub async fn resolve(
        &self,
        claim: &Claim,
        audited_at: DateTime<Utc>,
    ) -> Result<(Claim, AuditVerdict), NoEvidence> {
        let outcome = self.evaluate(AuditInputs::from_claim(claim), audited_at).await?;

        let mut updated = claim.clone();
        updated.status = outcome.verdict.status();
        updated.audit = Some(outcome.result);
        updated.updated_at = Some(audited_at);
        Ok((updated, outcome.verdict))
    }

    async fn guarded<F, T>(&self, check: &'static str, call: F) -> SingleCheck
    where
        F: Future<Output = Result<T, VerificationError>>,
        T: Into<SingleCheck>,
    {
        match tokio::time::timeout(self.check_timeout, call).await {
            Ok(Ok(result)) => {
                let result: SingleCheck = result.into();
                debug!(check, verified = result.verified, "verification check finished");
                result
            }
            Ok(Err(err)) => {
                debug!(check, error = %err, "verification check failed");
                SingleCheck::failed(err.to_string())
            }
            Err(_) => {
                debug!(check, timeout = ?self.check_timeout, "verification check timed out");
                SingleCheck::failed(format!(
                    "verification timed out after {}s",
                    self.check_timeout.as_secs_f32()
                ))
            }
        }
    }
}
