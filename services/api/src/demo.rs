use crate::infra::{receipt, ReceiptTextVerifier};
use chrono::Utc;
use clap::Args;
use claimdesk::config::AuditConfig;
use claimdesk::error::AppError;
use claimdesk::workflows::reimbursement::claims::{
    BatchAuditReport, Claim, ClaimDetails, ClaimDraft, ClaimScope, ClaimService,
    ClaimServiceError, EvidenceSlot, FieldSet, InMemoryClaimStore, User, UserId, UserRole,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Login name of the demo submitter
    #[arg(long, default_value = "zhangsan")]
    pub(crate) username: String,
    /// Display name used for claim number initials
    #[arg(long, default_value = "张三")]
    pub(crate) display_name: String,
    /// Pause between claims during the batch audit, in milliseconds
    #[arg(long, default_value_t = 0)]
    pub(crate) batch_delay_ms: u64,
}

struct DemoClaim {
    order_id: &'static str,
    item_reason: &'static str,
    amount_usd: f64,
    amount_cny: Option<f64>,
    usd_receipt: &'static [&'static str],
    cny_receipt: Option<&'static [&'static str]>,
}

const DEMO_CLAIMS: &[DemoClaim] = &[
    DemoClaim {
        order_id: "112-4410021",
        item_reason: "本金",
        amount_usd: 39.99,
        amount_cny: Some(288.0),
        usd_receipt: &["PayPal", "USD 39.99", "ORDER 112-4410021"],
        cny_receipt: Some(&["Alipay", "CNY 288.00"]),
    },
    DemoClaim {
        order_id: "112-4410021",
        item_reason: "佣金",
        amount_usd: 5.0,
        amount_cny: None,
        usd_receipt: &["PayPal", "USD 5.00", "ORDER 112-4410021"],
        cny_receipt: None,
    },
    DemoClaim {
        order_id: "112-9930188",
        item_reason: "本金",
        amount_usd: 64.5,
        amount_cny: None,
        usd_receipt: &["PayPal", "USD 46.50", "ORDER 112-9930188"],
        cny_receipt: None,
    },
    DemoClaim {
        order_id: "112-5500017",
        item_reason: "本金",
        amount_usd: 18.0,
        amount_cny: None,
        usd_receipt: &["blurred capture"],
        cny_receipt: None,
    },
];

fn draft_for(claim: &DemoClaim) -> ClaimDraft {
    let mut evidence = BTreeMap::new();
    evidence.insert(EvidenceSlot::UsdTransfer, receipt(claim.usd_receipt));
    if let Some(lines) = claim.cny_receipt {
        evidence.insert(EvidenceSlot::CnyTransfer, receipt(lines));
    }

    ClaimDraft {
        details: ClaimDetails {
            store_name: "Demo Store".to_string(),
            order_id: claim.order_id.to_string(),
            item_reason: claim.item_reason.to_string(),
            amount_usd: Some(claim.amount_usd),
            amount_cny: claim.amount_cny,
            payment_method: "PayPal".to_string(),
            ..ClaimDetails::default()
        },
        evidence,
        extra: BTreeMap::new(),
    }
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        username,
        display_name,
        batch_delay_ms,
    } = args;

    let submitter = User {
        id: UserId(format!("demo-{username}")),
        username,
        password: String::new(),
        display_name: Some(display_name),
        role: UserRole::User,
        created_at: Utc::now(),
    };

    let service = ClaimService::new(
        Arc::new(InMemoryClaimStore::default()),
        Arc::new(ReceiptTextVerifier),
        FieldSet::standard(),
        AuditConfig {
            batch_delay: Duration::from_millis(batch_delay_ms),
            ..AuditConfig::default()
        },
    );

    println!("Claim desk demo");
    println!("Submitting as {}", submitter.label());
    for demo in DEMO_CLAIMS {
        let claim = service.submit(&submitter, draft_for(demo)).await?;
        println!(
            "- {} accepted for order {} ({})",
            claim.claim_number, demo.order_id, demo.item_reason
        );
    }

    match service.submit(&submitter, draft_for(&DEMO_CLAIMS[0])).await {
        Err(ClaimServiceError::Duplicate(duplicate)) => {
            println!("- resubmission blocked: {duplicate}");
        }
        Err(other) => return Err(other.into()),
        Ok(claim) => println!("- unexpected duplicate accepted as {}", claim.claim_number),
    }

    let scope = ClaimScope::visible_to(&submitter);
    let claims = service.list(scope.clone()).await?;
    let ids = claims.iter().map(|claim| claim.id.clone()).collect();
    let report = service.audit_batch(ids).await;
    render_audit(&report, &service.list(scope).await?);

    Ok(())
}

fn render_audit(report: &BatchAuditReport, claims: &[Claim]) {
    println!(
        "\nBatch audit: {} audited, {} failed",
        report.succeeded, report.failed
    );
    for claim in claims {
        let view = claim.summary_view();
        println!(
            "  {:<16} {:<14} {:<6} {:>8} {:<9} {}",
            view.claim_number,
            view.order_id,
            view.item_reason,
            view.amount_usd
                .map(|amount| format!("{amount:.2}"))
                .unwrap_or_default(),
            view.status,
            view.audit_summary.unwrap_or_default()
        );
    }
}
