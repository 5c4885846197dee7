use super::common::*;
use std::io::Cursor;
use std::sync::Arc;

use crate::workflows::reimbursement::claims::domain::{ClaimStatus, RecordId};
use crate::workflows::reimbursement::claims::repository::{ClaimScope, ClaimStore};
use crate::workflows::reimbursement::claims::schema::{
    FieldConfigError, FieldDefinition, FieldKind, FieldSet, RemovalConfirmation, SchemaViolation,
};
use crate::workflows::reimbursement::claims::service::{ClaimService, ClaimServiceError};

fn matching_verifier() -> ScriptedVerifier {
    ScriptedVerifier::reading(Some(50.0), Some(360.0), Some("Order #ORD100"))
}

#[tokio::test]
async fn numbers_claims_per_user_and_day() {
    let (service, _) = build_service(matching_verifier());
    let zhang = user("zhangsan", Some("张三"));

    let first = service
        .submit_at(&zhang, complete_draft(), local_time(2024, 3, 15))
        .await
        .expect("first claim accepted");
    assert_eq!(first.claim_number.as_str(), "ZS20240315001");
    assert_eq!(first.user_name, "张三");
    assert_eq!(first.status, ClaimStatus::Pending);

    let mut commission = complete_draft();
    commission.details.item_reason = "佣金".to_string();
    let second = service
        .submit_at(&zhang, commission, local_time(2024, 3, 15))
        .await
        .expect("second claim accepted");
    assert_eq!(second.claim_number.as_str(), "ZS20240315002");

    let mut next_day = complete_draft();
    next_day.details.order_id = "ORD200".to_string();
    let third = service
        .submit_at(&zhang, next_day, local_time(2024, 3, 16))
        .await
        .expect("next day claim accepted");
    assert_eq!(third.claim_number.as_str(), "ZS20240316001");
}

#[tokio::test]
async fn duplicate_order_and_reason_is_rejected_before_storing() {
    let (service, store) = build_service(matching_verifier());
    let zhang = user("zhangsan", Some("张三"));
    let li = user("lisi", Some("李四"));

    service
        .submit_at(&zhang, complete_draft(), local_time(2024, 3, 15))
        .await
        .expect("first claim accepted");

    let err = service
        .submit_at(&li, complete_draft(), local_time(2024, 3, 15))
        .await
        .expect_err("duplicate rejected across users");
    match err {
        ClaimServiceError::Duplicate(duplicate) => {
            assert_eq!(duplicate.order_id, "ORD100");
            assert_eq!(duplicate.item_reason, "本金");
        }
        other => panic!("expected duplicate, got {other:?}"),
    }

    let stored = store.list_claims(ClaimScope::All).await.expect("list");
    assert_eq!(stored.len(), 1);
}

#[tokio::test]
async fn incomplete_drafts_are_not_stored() {
    let (service, store) = build_service(matching_verifier());
    let mut draft = complete_draft();
    draft.details.store_name.clear();
    draft.details.amount_usd = None;

    let err = service
        .submit(&user("zhangsan", None), draft)
        .await
        .expect_err("missing fields");
    match err {
        ClaimServiceError::Schema(SchemaViolation::Missing(missing)) => {
            assert_eq!(missing.labels, vec!["Store", "Amount (USD)"]);
        }
        other => panic!("expected missing fields, got {other:?}"),
    }
    assert!(store
        .list_claims(ClaimScope::All)
        .await
        .expect("list")
        .is_empty());
}

#[tokio::test]
async fn renumbers_after_losing_an_insert_race() {
    let store = Arc::new(RacingStore::default());
    let service = ClaimService::new(
        store.clone(),
        Arc::new(matching_verifier()),
        FieldSet::standard(),
        audit_config(),
    );

    let claim = service
        .submit_at(
            &user("zhangsan", Some("张三")),
            complete_draft(),
            local_time(2024, 3, 15),
        )
        .await
        .expect("claim accepted on retry");

    assert_eq!(claim.claim_number.as_str(), "ZS20240315002");
    let stored = store.inner.list_claims(ClaimScope::All).await.expect("list");
    assert_eq!(stored.len(), 2);
}

#[tokio::test]
async fn gives_up_when_numbers_keep_conflicting() {
    let service = ClaimService::new(
        Arc::new(SaturatedStore),
        Arc::new(matching_verifier()),
        FieldSet::standard(),
        audit_config(),
    );

    let err = service
        .submit(&user("zhangsan", None), complete_draft())
        .await
        .expect_err("no number available");
    assert!(matches!(err, ClaimServiceError::NumberUnavailable(3)));
}

#[tokio::test]
async fn audit_persists_verdict_and_edit_resets_it() {
    let (service, _) = build_service(matching_verifier());
    let zhang = user("zhangsan", Some("张三"));
    let claim = service
        .submit(&zhang, complete_draft())
        .await
        .expect("claim accepted");

    let audited = service.audit(&claim.id).await.expect("audit runs");
    assert_eq!(audited.status, ClaimStatus::Approved);
    assert!(audited.audit.is_some());

    let stored = service.get(&claim.id).await.expect("stored");
    assert_eq!(stored.status, ClaimStatus::Approved);

    let mut changed = complete_draft();
    changed.details.note = "corrected store name".to_string();
    let edited = service.edit(&claim.id, changed).await.expect("edit accepted");
    assert_eq!(edited.status, ClaimStatus::Pending);
    assert!(edited.audit.is_none());
    assert!(edited.updated_at.is_some());
    assert_eq!(edited.claim_number, claim.claim_number);
    assert_eq!(edited.details.note, "corrected store name");
}

#[tokio::test]
async fn edit_cannot_collide_with_another_claim() {
    let (service, _) = build_service(matching_verifier());
    let zhang = user("zhangsan", Some("张三"));
    service
        .submit(&zhang, complete_draft())
        .await
        .expect("principal claim");
    let mut commission = complete_draft();
    commission.details.item_reason = "佣金".to_string();
    let second = service
        .submit(&zhang, commission)
        .await
        .expect("commission claim");

    let err = service
        .edit(&second.id, complete_draft())
        .await
        .expect_err("edit would duplicate");
    assert!(matches!(err, ClaimServiceError::Duplicate(_)));

    let unchanged = service.get(&second.id).await.expect("stored");
    assert_eq!(unchanged.details.item_reason, "佣金");
}

#[tokio::test]
async fn audit_without_evidence_leaves_claim_untouched() {
    let (service, store) = build_service(matching_verifier());
    let bare = claim_for_order("c-bare", "ORD300", "本金");
    store.insert_claim(bare.clone()).await.expect("insert");

    let err = service.audit(&bare.id).await.expect_err("no evidence");
    assert!(matches!(err, ClaimServiceError::NoEvidence(_)));

    let stored = service.get(&bare.id).await.expect("stored");
    assert_eq!(stored.status, ClaimStatus::Pending);
    assert!(stored.audit.is_none());
    assert!(stored.updated_at.is_none());
}

#[tokio::test]
async fn batch_audit_counts_failures_and_continues() {
    let (service, store) = build_service(matching_verifier());
    let claim = service
        .submit(&user("zhangsan", None), complete_draft())
        .await
        .expect("claim accepted");
    let bare = claim_for_order("c-bare", "ORD300", "本金");
    store.insert_claim(bare.clone()).await.expect("insert");

    let report = service
        .audit_batch(vec![
            bare.id.clone(),
            RecordId("missing".to_string()),
            claim.id.clone(),
        ])
        .await;

    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 2);
    assert_eq!(report.items[2].status, Some(ClaimStatus::Approved));
    assert!(report.items[1]
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("not found"));
}

#[tokio::test]
async fn manual_review_overrides_status() {
    let (service, _) = build_service(matching_verifier());
    let claim = service
        .submit(&user("zhangsan", None), complete_draft())
        .await
        .expect("claim accepted");

    let reviewed = service
        .review(&claim.id, ClaimStatus::Rejected)
        .await
        .expect("review stored");
    assert_eq!(reviewed.status, ClaimStatus::Rejected);

    let err = service
        .review(&RecordId("missing".to_string()), ClaimStatus::Approved)
        .await
        .expect_err("unknown claim");
    assert!(matches!(err, ClaimServiceError::ClaimNotFound(_)));
}

#[tokio::test]
async fn saved_field_configuration_drives_validation() {
    let store = Arc::new(crate::workflows::reimbursement::claims::InMemoryClaimStore::default());
    let service = ClaimService::load(store.clone(), Arc::new(matching_verifier()), audit_config())
        .await
        .expect("service loads");
    assert_eq!(service.fields(), FieldSet::standard());

    let mut fields = service.fields();
    let mut tracking = FieldDefinition::custom("tracking", "Tracking number", FieldKind::Text);
    tracking.required = true;
    fields.add(tracking).expect("field added");
    service
        .save_fields(fields.clone(), RemovalConfirmation::Unconfirmed)
        .await
        .expect("saved");

    let err = service
        .submit(&user("zhangsan", None), complete_draft())
        .await
        .expect_err("new required field");
    assert!(matches!(
        err,
        ClaimServiceError::Schema(SchemaViolation::Missing(_))
    ));

    let reloaded = ClaimService::load(store, Arc::new(matching_verifier()), audit_config())
        .await
        .expect("service reloads");
    assert_eq!(reloaded.fields(), fields);
}

fn without_field(fields: &FieldSet, id: &str) -> FieldSet {
    let kept = fields
        .fields()
        .iter()
        .filter(|field| field.id != id)
        .cloned()
        .collect();
    FieldSet::new(kept).expect("valid set")
}

#[tokio::test]
async fn saving_fields_guards_system_fields() {
    let (service, _) = build_service(matching_verifier());

    let err = service
        .save_fields(
            without_field(&service.fields(), "order_id"),
            RemovalConfirmation::Unconfirmed,
        )
        .await
        .expect_err("drop needs confirmation");
    match err {
        ClaimServiceError::FieldConfig(FieldConfigError::ConfirmationRequired(id)) => {
            assert_eq!(id, "order_id");
        }
        other => panic!("expected a confirmation error, got {other:?}"),
    }

    let retyped: Vec<FieldDefinition> = service
        .fields()
        .fields()
        .iter()
        .cloned()
        .map(|mut field| {
            if field.id == "amount_usd" {
                field.kind = FieldKind::Text;
            }
            field
        })
        .collect();
    let err = service
        .save_fields(
            FieldSet::new(retyped).expect("valid set"),
            RemovalConfirmation::Confirmed,
        )
        .await
        .expect_err("retype rejected");
    assert!(matches!(
        err,
        ClaimServiceError::FieldConfig(FieldConfigError::SystemFieldImmutable(_))
    ));

    let demoted: Vec<FieldDefinition> = service
        .fields()
        .fields()
        .iter()
        .cloned()
        .map(|mut field| {
            field.system = false;
            field
        })
        .collect();
    let err = service
        .save_fields(
            FieldSet::new(demoted).expect("valid set"),
            RemovalConfirmation::Confirmed,
        )
        .await
        .expect_err("demotion rejected");
    assert!(matches!(
        err,
        ClaimServiceError::FieldConfig(FieldConfigError::SystemFieldImmutable(_))
    ));
    assert_eq!(service.fields(), FieldSet::standard());

    let saved = service
        .save_fields(
            without_field(&service.fields(), "order_id"),
            RemovalConfirmation::Confirmed,
        )
        .await
        .expect("confirmed drop");
    assert!(saved.get("order_id").is_none());
    assert_eq!(service.fields(), saved);
}

#[tokio::test]
async fn csv_import_skips_duplicate_screening() {
    let (service, store) = build_service(matching_verifier());
    let zhang = user("zhangsan", Some("张三"));
    service
        .submit(&zhang, complete_draft())
        .await
        .expect("claim accepted");

    let csv = "Order ID,Item Reason,Amount USD\nORD100,本金,50\nORD101,本金,12.5\n";
    let imported = service
        .import_csv(&zhang, Cursor::new(csv))
        .await
        .expect("import succeeds");

    assert_eq!(imported, 2);
    let all = store.list_claims(ClaimScope::All).await.expect("list");
    let principal_for_ord100 = all
        .iter()
        .filter(|claim| claim.details.order_id == "ORD100" && claim.details.item_reason == "本金")
        .count();
    assert_eq!(principal_for_ord100, 2);
}
