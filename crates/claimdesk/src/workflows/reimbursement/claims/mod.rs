//! Reimbursement claim intake, duplicate screening, numbering, and evidence audit.

pub mod audit;
pub mod domain;
pub mod duplicate;
pub mod identifier;
pub(crate) mod import;
pub mod repository;
pub mod router;
pub mod schema;
pub mod service;

#[cfg(test)]
mod tests;

pub use audit::{
    AuditResolver, AuditVerdict, BatchAuditReport, ImageVerifier, NoEvidence, VerificationError,
};
pub use domain::{
    AuditResult, BusinessAttribute, Claim, ClaimDetails, ClaimDraft, ClaimNumber, ClaimStatus,
    ClaimSummaryView, EvidenceImage, EvidenceSlot, RecordId, SingleCheck, User, UserId, UserRole,
};
pub use duplicate::DuplicateClaim;
pub use import::ClaimImportError;
pub use repository::{ClaimScope, ClaimStore, FieldSettingsStore, InMemoryClaimStore, StoreError};
pub use router::claim_router;
pub use schema::{
    FieldConfigError, FieldDefinition, FieldKind, FieldSection, FieldSet, MissingRequiredFields,
    RemovalConfirmation, SchemaViolation,
};
pub use service::{ClaimService, ClaimServiceError};
