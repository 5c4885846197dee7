use async_trait::async_trait;
use claimdesk::workflows::reimbursement::claims::audit::{
    amounts_match, text_matches, AmountCheck, ImageVerifier, TextCheck, VerificationError,
};
use claimdesk::workflows::reimbursement::claims::EvidenceImage;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Offline verifier for demos: "screenshots" carry their receipt text as UTF-8 lines such
/// as `USD 50.00` or `ORDER ORD100`.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct ReceiptTextVerifier;

impl ReceiptTextVerifier {
    fn lines(image: &EvidenceImage) -> Result<Vec<String>, VerificationError> {
        let text = std::str::from_utf8(&image.data)
            .map_err(|_| VerificationError::Parse("screenshot has no readable text".to_string()))?;
        Ok(text.lines().map(|line| line.trim().to_string()).collect())
    }
}

#[async_trait]
impl ImageVerifier for ReceiptTextVerifier {
    async fn check_amount(
        &self,
        target: f64,
        image: &EvidenceImage,
        currency_label: &str,
    ) -> Result<AmountCheck, VerificationError> {
        let extracted_amount = Self::lines(image)?.iter().find_map(|line| {
            line.strip_prefix(currency_label)
                .and_then(|rest| rest.trim().replace(',', "").parse::<f64>().ok())
        });
        let verified = extracted_amount
            .map(|found| amounts_match(target, found))
            .unwrap_or(false);
        let reason = match extracted_amount {
            Some(found) => format!("receipt shows {currency_label} {found:.2}"),
            None => format!("receipt has no {currency_label} line"),
        };
        Ok(AmountCheck {
            verified,
            extracted_amount,
            reason,
        })
    }

    async fn check_text(
        &self,
        target: &str,
        image: &EvidenceImage,
        context_label: &str,
    ) -> Result<TextCheck, VerificationError> {
        let extracted_text = Self::lines(image)?
            .into_iter()
            .find_map(|line| line.strip_prefix("ORDER").map(|rest| rest.trim().to_string()))
            .filter(|text| !text.is_empty());
        let verified = extracted_text
            .as_deref()
            .map(|found| text_matches(target, found))
            .unwrap_or(false);
        let reason = match extracted_text.as_deref() {
            Some(found) => format!("{context_label} reads '{found}'"),
            None => format!("no {context_label} on receipt"),
        };
        Ok(TextCheck {
            verified,
            extracted_text,
            reason,
        })
    }
}

pub(crate) fn receipt(lines: &[&str]) -> EvidenceImage {
    EvidenceImage::new("image/png", lines.join("\n").into_bytes())
}
