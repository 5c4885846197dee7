use std::io::Read;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use tracing::{info, warn};

use super::audit::{
    run_sequential, AuditResolver, AuditVerdict, BatchAuditReport, ImageVerifier, NoEvidence,
};
use super::domain::{Claim, ClaimDraft, ClaimStatus, RecordId, User};
use super::duplicate::{ensure_unique, DuplicateClaim};
use super::identifier::next_claim_number;
use super::import::{parse_claims, ClaimImportError};
use super::repository::{ClaimScope, ClaimStore, FieldSettingsStore, StoreError};
use super::schema::{validate, FieldConfigError, FieldSet, RemovalConfirmation, SchemaViolation};
use crate::config::AuditConfig;

/// Attempts at allocating a claim number before giving up on store conflicts.
const NUMBER_ATTEMPTS: usize = 3;

/// Service composing the field schema, duplicate guard, numbering, store, and auditor.
pub struct ClaimService<S, V> {
    store: Arc<S>,
    resolver: AuditResolver<V>,
    fields: RwLock<FieldSet>,
    batch_delay: Duration,
}

impl<S, V> ClaimService<S, V>
where
    S: ClaimStore + 'static,
    V: ImageVerifier + 'static,
{
    pub fn new(store: Arc<S>, verifier: Arc<V>, fields: FieldSet, config: AuditConfig) -> Self {
        Self {
            store,
            resolver: AuditResolver::new(verifier, config.check_timeout),
            fields: RwLock::new(fields),
            batch_delay: config.batch_delay,
        }
    }

    /// Active form configuration for this session.
    pub fn fields(&self) -> FieldSet {
        self.fields
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub async fn list(&self, scope: ClaimScope) -> Result<Vec<Claim>, ClaimServiceError> {
        Ok(self.store.list_claims(scope).await?)
    }

    pub async fn get(&self, id: &RecordId) -> Result<Claim, ClaimServiceError> {
        self.store
            .list_claims(ClaimScope::All)
            .await?
            .into_iter()
            .find(|claim| &claim.id == id)
            .ok_or_else(|| ClaimServiceError::ClaimNotFound(id.clone()))
    }

    /// Submit a new claim for `user`, numbered against today's local date.
    pub async fn submit(&self, user: &User, draft: ClaimDraft) -> Result<Claim, ClaimServiceError> {
        self.submit_at(user, draft, Local::now()).await
    }

    pub async fn submit_at(
        &self,
        user: &User,
        draft: ClaimDraft,
        now: DateTime<Local>,
    ) -> Result<Claim, ClaimServiceError> {
        validate(&self.fields(), &draft)?;

        let today = now.date_naive();
        let mut existing = self.store.list_claims(ClaimScope::All).await?;
        ensure_unique(&draft.details, None, &existing)?;

        let mut claim = Claim {
            id: RecordId::generate(),
            user_id: user.id.clone(),
            user_name: user.label().to_string(),
            claim_number: next_claim_number(user, &existing, today),
            details: draft.details,
            evidence: draft.evidence,
            extra: draft.extra,
            status: ClaimStatus::Pending,
            audit: None,
            created_at: now.with_timezone(&Utc),
            updated_at: None,
        };

        for attempt in 1..=NUMBER_ATTEMPTS {
            match self.store.insert_claim(claim.clone()).await {
                Ok(stored) => {
                    info!(
                        claim = %stored.claim_number,
                        user = %stored.user_name,
                        "claim submitted"
                    );
                    return Ok(stored);
                }
                Err(StoreError::Conflict) => {
                    if attempt == NUMBER_ATTEMPTS {
                        break;
                    }
                    warn!(
                        claim = %claim.claim_number,
                        attempt,
                        "claim number taken, renumbering"
                    );
                    existing = self.store.list_claims(ClaimScope::All).await?;
                    ensure_unique(&claim.details, None, &existing)?;
                    claim.claim_number = next_claim_number(user, &existing, today);
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(ClaimServiceError::NumberUnavailable(NUMBER_ATTEMPTS))
    }

    /// Replace a claim's content. Edited claims go back to pending and lose any earlier audit.
    pub async fn edit(&self, id: &RecordId, draft: ClaimDraft) -> Result<Claim, ClaimServiceError> {
        validate(&self.fields(), &draft)?;

        let existing = self.store.list_claims(ClaimScope::All).await?;
        let mut claim = existing
            .iter()
            .find(|claim| &claim.id == id)
            .cloned()
            .ok_or_else(|| ClaimServiceError::ClaimNotFound(id.clone()))?;
        ensure_unique(&draft.details, Some(id), &existing)?;

        claim.apply_draft(draft);
        claim.status = ClaimStatus::Pending;
        claim.audit = None;
        claim.updated_at = Some(Utc::now());

        self.store.update_claim(claim.clone()).await?;
        info!(claim = %claim.claim_number, "claim edited");
        Ok(claim)
    }

    /// Manual approve/reject (or reopen) by a reviewer.
    pub async fn review(
        &self,
        id: &RecordId,
        status: ClaimStatus,
    ) -> Result<Claim, ClaimServiceError> {
        let mut claim = self.get(id).await?;
        claim.status = status;
        claim.updated_at = Some(Utc::now());

        self.store.update_claim(claim.clone()).await?;
        info!(claim = %claim.claim_number, status = status.label(), "claim reviewed");
        Ok(claim)
    }

    /// Run the evidence audit for one claim and persist the verdict.
    pub async fn audit(&self, id: &RecordId) -> Result<Claim, ClaimServiceError> {
        Ok(self.audit_with_verdict(id).await?.0)
    }

    pub async fn audit_with_verdict(
        &self,
        id: &RecordId,
    ) -> Result<(Claim, AuditVerdict), ClaimServiceError> {
        let claim = self.get(id).await?;
        let (updated, verdict) = self.resolver.resolve(&claim, Utc::now()).await?;

        self.store.update_claim(updated.clone()).await?;
        info!(
            claim = %updated.claim_number,
            status = updated.status.label(),
            verdict = %verdict.summary(),
            "claim audited"
        );
        Ok((updated, verdict))
    }

    /// Audit the selected claims sequentially with the configured pause between items.
    pub async fn audit_batch(&self, ids: Vec<RecordId>) -> BatchAuditReport {
        run_sequential(ids, self.batch_delay, |id| async move { self.audit(&id).await }).await
    }

    /// Store claims as given. Duplicate screening is not applied to imports.
    pub async fn import(&self, claims: Vec<Claim>) -> Result<usize, ClaimServiceError> {
        let count = self.store.insert_claims(claims).await?;
        warn!(count, "claims imported without duplicate screening");
        Ok(count)
    }

    /// Parse a CSV export and import it for `owner`.
    pub async fn import_csv<R: Read>(
        &self,
        owner: &User,
        reader: R,
    ) -> Result<usize, ClaimServiceError> {
        let existing = self.store.list_claims(ClaimScope::All).await?;
        let claims = parse_claims(reader, owner, &existing, Local::now())?;
        self.import(claims).await
    }
}

impl<S, V> ClaimService<S, V>
where
    S: ClaimStore + FieldSettingsStore + 'static,
    V: ImageVerifier + 'static,
{
    /// Build a service with the saved form configuration, or the standard one if none exists.
    pub async fn load(
        store: Arc<S>,
        verifier: Arc<V>,
        config: AuditConfig,
    ) -> Result<Self, ClaimServiceError> {
        let fields = store.load_fields().await?.unwrap_or_else(FieldSet::standard);
        Ok(Self::new(store, verifier, fields, config))
    }

    /// Persist a new form configuration and make it active.
    ///
    /// The replacement is reconciled against the active form first, so system fields keep their
    /// id, type, and binding, and are only dropped with `Confirmed`.
    pub async fn save_fields(
        &self,
        fields: FieldSet,
        confirmation: RemovalConfirmation,
    ) -> Result<FieldSet, ClaimServiceError> {
        let fields = self.fields().reconcile(fields, confirmation)?;
        self.store.save_fields(fields.clone()).await?;
        *self
            .fields
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = fields.clone();
        info!("claim form configuration saved");
        Ok(fields)
    }
}

/// Error raised by the claim service.
#[derive(Debug, thiserror::Error)]
pub enum ClaimServiceError {
    #[error(transparent)]
    Schema(#[from] SchemaViolation),
    #[error(transparent)]
    FieldConfig(#[from] FieldConfigError),
    #[error(transparent)]
    Duplicate(#[from] DuplicateClaim),
    #[error(transparent)]
    NoEvidence(#[from] NoEvidence),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Import(#[from] ClaimImportError),
    #[error("claim {0} not found")]
    ClaimNotFound(RecordId),
    #[error("no free claim number after {0} attempts")]
    NumberUnavailable(usize),
}
