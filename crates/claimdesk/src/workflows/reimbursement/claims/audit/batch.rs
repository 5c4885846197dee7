use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use super::super::domain::{Claim, ClaimStatus, RecordId};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchItemOutcome {
    pub id: RecordId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ClaimStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Running tally of a batch audit.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchAuditReport {
    pub succeeded: usize,
    pub failed: usize,
    pub items: Vec<BatchItemOutcome>,
}

impl BatchAuditReport {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }
}

/// Audit `ids` one at a time, pausing `delay` between items to respect the verifier's
/// rate limits. A failing item is counted and the run moves on.
pub async fn run_sequential<F, Fut, E>(
    ids: Vec<RecordId>,
    delay: Duration,
    mut audit: F,
) -> BatchAuditReport
where
    F: FnMut(RecordId) -> Fut,
    Fut: Future<Output = Result<Claim, E>>,
    E: Display,
{
    let mut report = BatchAuditReport::default();
    let total = ids.len();

    for (index, id) in ids.into_iter().enumerate() {
        if index > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match audit(id.clone()).await {
            Ok(claim) => {
                report.succeeded += 1;
                report.items.push(BatchItemOutcome {
                    id,
                    status: Some(claim.status),
                    error: None,
                });
            }
            Err(err) => {
                warn!(claim = %id, error = %err, "batch audit item failed");
                report.failed += 1;
                report.items.push(BatchItemOutcome {
                    id,
                    status: None,
                    error: Some(err.to_string()),
                });
            }
        }
    }

    info!(
        total,
        succeeded = report.succeeded,
        failed = report.failed,
        "batch audit finished"
    );
    report
}
