use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use chrono::{DateTime, Local, TimeZone, Utc};
use serde_json::Value;

use crate::config::AuditConfig;
use crate::workflows::reimbursement::claims::audit::{
    amounts_match, text_matches, AmountCheck, ImageVerifier, TextCheck, VerificationError,
};
use crate::workflows::reimbursement::claims::domain::{
    Claim, ClaimDetails, ClaimDraft, ClaimNumber, ClaimStatus, EvidenceImage, EvidenceSlot,
    RecordId, User, UserId, UserRole,
};
use crate::workflows::reimbursement::claims::repository::{
    ClaimScope, ClaimStore, InMemoryClaimStore, StoreError,
};
use crate::workflows::reimbursement::claims::schema::FieldSet;
use crate::workflows::reimbursement::claims::service::ClaimService;

pub(crate) fn user(username: &str, display_name: Option<&str>) -> User {
    User {
        id: UserId(format!("u-{username}")),
        username: username.to_string(),
        password: "secret".to_string(),
        display_name: display_name.map(str::to_string),
        role: UserRole::User,
        created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().expect("valid"),
    }
}

pub(crate) fn local_time(year: i32, month: u32, day: u32) -> DateTime<Local> {
    Local
        .with_ymd_and_hms(year, month, day, 10, 30, 0)
        .single()
        .expect("unambiguous local time")
}

pub(crate) fn png(marker: u8) -> EvidenceImage {
    EvidenceImage::new("image/png", vec![marker])
}

fn base_claim(id: &str, number: &str, created_at: DateTime<Utc>) -> Claim {
    Claim {
        id: RecordId(id.to_string()),
        user_id: UserId("u-zhangsan".to_string()),
        user_name: "张三".to_string(),
        claim_number: ClaimNumber(number.to_string()),
        details: ClaimDetails::default(),
        evidence: BTreeMap::new(),
        extra: BTreeMap::new(),
        status: ClaimStatus::Pending,
        audit: None,
        created_at,
        updated_at: None,
    }
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 15, 2, 0, 0)
        .single()
        .expect("valid")
}

pub(crate) fn claim_numbered(number: &str) -> Claim {
    base_claim(&format!("rec-{number}"), number, base_time())
}

pub(crate) fn claim_created_at(id: &str, minutes: i64) -> Claim {
    base_claim(
        id,
        &format!("TS20240315{minutes:03}-{id}"),
        base_time() + chrono::Duration::minutes(minutes),
    )
}

pub(crate) fn claim_for_order(id: &str, order_id: &str, item_reason: &str) -> Claim {
    let mut claim = base_claim(id, &format!("ZS20240315-{id}"), base_time());
    claim.details.order_id = order_id.to_string();
    claim.details.item_reason = item_reason.to_string();
    claim
}

/// Draft satisfying every required field of the standard form.
pub(crate) fn complete_draft() -> ClaimDraft {
    let mut evidence = BTreeMap::new();
    evidence.insert(EvidenceSlot::UsdTransfer, png(1));
    evidence.insert(EvidenceSlot::CnyTransfer, png(2));

    ClaimDraft {
        details: ClaimDetails {
            store_name: "Anker Official".to_string(),
            sku: "A2633".to_string(),
            model: "PowerCore 10000".to_string(),
            order_id: "ORD100".to_string(),
            amount_usd: Some(50.0),
            amount_cny: Some(360.0),
            payment_method: "PayPal".to_string(),
            item_reason: "本金".to_string(),
            client_email: "buyer@example.com".to_string(),
            note: String::new(),
        },
        evidence,
        extra: BTreeMap::new(),
    }
}

/// Claim shaped for audit tests: USD 50, CNY 880, order `ORD100`, with the chosen
/// screenshots attached as `png(1)`, `png(2)` and `png(3)`.
pub(crate) fn audit_claim(usd: bool, cny: bool, order: bool) -> Claim {
    let mut claim = claim_for_order("audit-1", "ORD100", "本金");
    claim.details.amount_usd = Some(50.0);
    claim.details.amount_cny = Some(880.0);
    if usd {
        claim.evidence.insert(EvidenceSlot::UsdTransfer, png(1));
    }
    if cny {
        claim.evidence.insert(EvidenceSlot::CnyTransfer, png(2));
    }
    if order {
        claim.evidence.insert(EvidenceSlot::OrderId, png(3));
    }
    claim
}

/// Verifier returning fixed readings for every screenshot.
#[derive(Clone, Default)]
pub(crate) struct ScriptedVerifier {
    usd: Option<f64>,
    cny: Option<f64>,
    text: Option<String>,
    text_failure: Option<String>,
    delay: Duration,
    calls: Arc<AtomicUsize>,
    text_images: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl ScriptedVerifier {
    pub(crate) fn reading(usd: Option<f64>, cny: Option<f64>, text: Option<&str>) -> Self {
        Self {
            usd,
            cny,
            text: text.map(str::to_string),
            ..Self::default()
        }
    }

    pub(crate) fn failing_text(mut self, message: &str) -> Self {
        self.text_failure = Some(message.to_string());
        self
    }

    pub(crate) fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }

    pub(crate) fn seen_text_images(&self) -> Arc<Mutex<Vec<Vec<u8>>>> {
        self.text_images.clone()
    }

    async fn pause(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[async_trait]
impl ImageVerifier for ScriptedVerifier {
    async fn check_amount(
        &self,
        target: f64,
        _image: &EvidenceImage,
        currency_label: &str,
    ) -> Result<AmountCheck, VerificationError> {
        self.pause().await;
        let extracted_amount = if currency_label == "USD" {
            self.usd
        } else {
            self.cny
        };
        let verified = extracted_amount
            .map(|found| amounts_match(target, found))
            .unwrap_or(false);
        Ok(AmountCheck {
            verified,
            extracted_amount,
            reason: format!("scripted {currency_label} reading"),
        })
    }

    async fn check_text(
        &self,
        target: &str,
        image: &EvidenceImage,
        _context_label: &str,
    ) -> Result<TextCheck, VerificationError> {
        self.pause().await;
        self.text_images
            .lock()
            .expect("seen images lock")
            .push(image.data.clone());
        if let Some(message) = &self.text_failure {
            return Err(VerificationError::Transport(message.clone()));
        }
        let verified = self
            .text
            .as_deref()
            .map(|found| text_matches(target, found))
            .unwrap_or(false);
        Ok(TextCheck {
            verified,
            extracted_text: self.text.clone(),
            reason: "scripted text reading".to_string(),
        })
    }
}

pub(crate) fn audit_config() -> AuditConfig {
    AuditConfig {
        check_timeout: Duration::from_secs(5),
        batch_delay: Duration::ZERO,
    }
}

pub(crate) fn build_service(
    verifier: ScriptedVerifier,
) -> (
    ClaimService<InMemoryClaimStore, ScriptedVerifier>,
    Arc<InMemoryClaimStore>,
) {
    let store = Arc::new(InMemoryClaimStore::default());
    let service = ClaimService::new(
        store.clone(),
        Arc::new(verifier),
        FieldSet::standard(),
        audit_config(),
    );
    (service, store)
}

/// Store that loses the first insert race: a rival claim takes the number first.
#[derive(Default)]
pub(crate) struct RacingStore {
    pub(crate) inner: InMemoryClaimStore,
    raced: AtomicBool,
}

#[async_trait]
impl ClaimStore for RacingStore {
    async fn list_claims(&self, scope: ClaimScope) -> Result<Vec<Claim>, StoreError> {
        self.inner.list_claims(scope).await
    }

    async fn insert_claim(&self, claim: Claim) -> Result<Claim, StoreError> {
        if !self.raced.swap(true, Ordering::SeqCst) {
            let mut rival = claim_for_order("rival", "ORD999", "佣金");
            rival.claim_number = claim.claim_number.clone();
            self.inner.insert_claim(rival).await?;
            return Err(StoreError::Conflict);
        }
        self.inner.insert_claim(claim).await
    }

    async fn insert_claims(&self, claims: Vec<Claim>) -> Result<usize, StoreError> {
        self.inner.insert_claims(claims).await
    }

    async fn update_claim(&self, claim: Claim) -> Result<(), StoreError> {
        self.inner.update_claim(claim).await
    }
}

/// Store that always reports a taken claim number.
pub(crate) struct SaturatedStore;

#[async_trait]
impl ClaimStore for SaturatedStore {
    async fn list_claims(&self, _scope: ClaimScope) -> Result<Vec<Claim>, StoreError> {
        Ok(Vec::new())
    }

    async fn insert_claim(&self, _claim: Claim) -> Result<Claim, StoreError> {
        Err(StoreError::Conflict)
    }

    async fn insert_claims(&self, _claims: Vec<Claim>) -> Result<usize, StoreError> {
        Err(StoreError::Conflict)
    }

    async fn update_claim(&self, _claim: Claim) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("read only".to_string()))
    }
}

pub(crate) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
