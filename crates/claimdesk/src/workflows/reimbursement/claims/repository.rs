use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::domain::{Claim, User, UserId};
use super::schema::FieldSet;

/// Which claims a listing covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimScope {
    All,
    Owner(UserId),
}

impl ClaimScope {
    /// Admins see every claim; everyone else sees their own.
    pub fn visible_to(user: &User) -> Self {
        if user.is_admin() {
            ClaimScope::All
        } else {
            ClaimScope::Owner(user.id.clone())
        }
    }

    pub fn includes(&self, claim: &Claim) -> bool {
        match self {
            ClaimScope::All => true,
            ClaimScope::Owner(user_id) => &claim.user_id == user_id,
        }
    }
}

/// Storage abstraction for claims so the service can be exercised in isolation.
///
/// Listings are ordered newest first by creation time. Bulk inserts are written as given;
/// callers are responsible for duplicate screening.
#[async_trait]
pub trait ClaimStore: Send + Sync {
    async fn list_claims(&self, scope: ClaimScope) -> Result<Vec<Claim>, StoreError>;
    async fn insert_claim(&self, claim: Claim) -> Result<Claim, StoreError>;
    async fn insert_claims(&self, claims: Vec<Claim>) -> Result<usize, StoreError>;
    async fn update_claim(&self, claim: Claim) -> Result<(), StoreError>;
}

/// Persistence for the claim form configuration, saved and loaded as one unit.
#[async_trait]
pub trait FieldSettingsStore: Send + Sync {
    async fn load_fields(&self) -> Result<Option<FieldSet>, StoreError>;
    async fn save_fields(&self, fields: FieldSet) -> Result<(), StoreError>;
}

/// Error enumeration for store failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Process-local store used by the CLI, the demo server, and tests.
///
/// Enforces unique record ids and claim numbers so concurrent submissions that computed
/// the same claim number surface as [`StoreError::Conflict`].
#[derive(Debug, Default, Clone)]
pub struct InMemoryClaimStore {
    claims: Arc<Mutex<Vec<Claim>>>,
    fields: Arc<Mutex<Option<FieldSet>>>,
}

impl InMemoryClaimStore {
    fn lock_claims(&self) -> Result<std::sync::MutexGuard<'_, Vec<Claim>>, StoreError> {
        self.claims
            .lock()
            .map_err(|_| StoreError::Unavailable("claim store lock poisoned".to_string()))
    }

    fn conflicts(existing: &[Claim], claim: &Claim) -> bool {
        existing
            .iter()
            .any(|stored| stored.id == claim.id || stored.claim_number == claim.claim_number)
    }
}

#[async_trait]
impl ClaimStore for InMemoryClaimStore {
    async fn list_claims(&self, scope: ClaimScope) -> Result<Vec<Claim>, StoreError> {
        let guard = self.lock_claims()?;
        // Reverse insertion order first so equal timestamps still list newest first.
        let mut claims: Vec<Claim> = guard
            .iter()
            .rev()
            .filter(|claim| scope.includes(claim))
            .cloned()
            .collect();
        claims.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(claims)
    }

    async fn insert_claim(&self, claim: Claim) -> Result<Claim, StoreError> {
        let mut guard = self.lock_claims()?;
        if Self::conflicts(&guard, &claim) {
            return Err(StoreError::Conflict);
        }
        guard.push(claim.clone());
        Ok(claim)
    }

    async fn insert_claims(&self, claims: Vec<Claim>) -> Result<usize, StoreError> {
        let mut guard = self.lock_claims()?;
        for (index, claim) in claims.iter().enumerate() {
            if Self::conflicts(&guard, claim) || Self::conflicts(&claims[..index], claim) {
                return Err(StoreError::Conflict);
            }
        }
        let count = claims.len();
        guard.extend(claims);
        Ok(count)
    }

    async fn update_claim(&self, claim: Claim) -> Result<(), StoreError> {
        let mut guard = self.lock_claims()?;
        match guard.iter_mut().find(|stored| stored.id == claim.id) {
            Some(stored) => {
                *stored = claim;
                Ok(())
            }
            None => Err(StoreError::NotFound),
        }
    }
}

#[async_trait]
impl FieldSettingsStore for InMemoryClaimStore {
    async fn load_fields(&self) -> Result<Option<FieldSet>, StoreError> {
        let guard = self
            .fields
            .lock()
            .map_err(|_| StoreError::Unavailable("settings lock poisoned".to_string()))?;
        Ok(guard.clone())
    }

    async fn save_fields(&self, fields: FieldSet) -> Result<(), StoreError> {
        let mut guard = self
            .fields
            .lock()
            .map_err(|_| StoreError::Unavailable("settings lock poisoned".to_string()))?;
        *guard = Some(fields);
        Ok(())
    }
}
