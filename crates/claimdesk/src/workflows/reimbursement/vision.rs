//! Image verification backed by an OpenAI-compatible chat completions endpoint.
//!
//! The model only reads the screenshot; the match decision is made locally with the same
//! tolerance rules the audit resolver documents.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::claims::audit::{
    amounts_match, text_matches, AmountCheck, ImageVerifier, TextCheck, VerificationError,
};
use super::claims::domain::EvidenceImage;
use crate::config::VisionConfig;

const SYSTEM_PROMPT: &str = "You read payment and order screenshots for an expense audit. \
Reply with a single JSON object and nothing else.";

pub struct VisionClient {
    http: reqwest::Client,
    config: VisionConfig,
}

impl VisionClient {
    pub fn new(config: VisionConfig, timeout: Duration) -> Result<Self, VerificationError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| VerificationError::Transport(err.to_string()))?;
        Ok(Self { http, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.api_base.trim_end_matches('/')
        )
    }

    async fn ask(&self, prompt: String, image: &EvidenceImage) -> Result<Value, VerificationError> {
        let key = self.config.api_key.as_deref().ok_or_else(|| {
            VerificationError::NotConfigured("VISION_API_KEY is not set".to_string())
        })?;

        let body = json!({
            "model": self.config.model,
            "temperature": 0,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                {
                    "role": "user",
                    "content": [
                        { "type": "text", "text": prompt },
                        { "type": "image_url", "image_url": { "url": image.to_data_url() } }
                    ]
                }
            ]
        });

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(key)
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() || err.is_connect() {
                    VerificationError::Transport(
                        "verification service unreachable, check the connection".to_string(),
                    )
                } else {
                    VerificationError::Transport(err.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VerificationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|err| VerificationError::Parse(err.to_string()))?;
        let content = payload
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                VerificationError::Parse("response has no message content".to_string())
            })?;

        debug!(bytes = content.len(), "verification model replied");
        parse_reply(content)
    }
}

#[derive(Debug, Deserialize)]
struct ModelReading {
    #[serde(default)]
    amount: Option<Value>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

/// Models occasionally wrap JSON in markdown fences.
fn parse_reply(content: &str) -> Result<Value, VerificationError> {
    let trimmed = content.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed);
    serde_json::from_str(unfenced.trim()).map_err(|err| VerificationError::Parse(err.to_string()))
}

fn reading_from(value: Value) -> Result<ModelReading, VerificationError> {
    serde_json::from_value(value).map_err(|err| VerificationError::Parse(err.to_string()))
}

fn amount_from(value: Option<Value>) -> Option<f64> {
    match value? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text
            .trim()
            .trim_start_matches(['$', '¥', '￥'])
            .replace(',', "")
            .parse::<f64>()
            .ok(),
        _ => None,
    }
}

pub(crate) fn amount_check(
    target: f64,
    currency_label: &str,
    value: Value,
) -> Result<AmountCheck, VerificationError> {
    let reading = reading_from(value)?;
    let extracted_amount = amount_from(reading.amount);
    let model_reason = reading.reason.unwrap_or_default();

    let (verified, reason) = match extracted_amount {
        Some(found) if amounts_match(target, found) => (
            true,
            format!("{currency_label} {found:.2} matches claimed {target:.2}. {model_reason}"),
        ),
        Some(found) => (
            false,
            format!("{currency_label} {found:.2} differs from claimed {target:.2}. {model_reason}"),
        ),
        None => (
            false,
            format!("no {currency_label} amount found. {model_reason}"),
        ),
    };

    Ok(AmountCheck {
        verified,
        extracted_amount,
        reason: reason.trim().to_string(),
    })
}

pub(crate) fn text_check(
    target: &str,
    context_label: &str,
    value: Value,
) -> Result<TextCheck, VerificationError> {
    let reading = reading_from(value)?;
    let extracted_text = reading
        .text
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty());
    let model_reason = reading.reason.unwrap_or_default();

    let (verified, reason) = match extracted_text.as_deref() {
        Some(found) if text_matches(target, found) => (
            true,
            format!("{context_label} '{found}' matches '{target}'. {model_reason}"),
        ),
        Some(found) => (
            false,
            format!("{context_label} '{found}' does not match '{target}'. {model_reason}"),
        ),
        None => (false, format!("no {context_label} found. {model_reason}")),
    };

    Ok(TextCheck {
        verified,
        extracted_text,
        reason: reason.trim().to_string(),
    })
}

#[async_trait]
impl ImageVerifier for VisionClient {
    async fn check_amount(
        &self,
        target: f64,
        image: &EvidenceImage,
        currency_label: &str,
    ) -> Result<AmountCheck, VerificationError> {
        let prompt = format!(
            "Find the {currency_label} amount that was paid or transferred in this screenshot. \
The claimant says it is {target:.2}. Respond as {{\"amount\": number or null, \"reason\": string}}."
        );
        let reply = self.ask(prompt, image).await?;
        amount_check(target, currency_label, reply)
    }

    async fn check_text(
        &self,
        target: &str,
        image: &EvidenceImage,
        context_label: &str,
    ) -> Result<TextCheck, VerificationError> {
        let prompt = format!(
            "Find the {context_label} shown in this screenshot. The claimant says it is \
'{target}'. Respond as {{\"text\": string or null, \"reason\": string}}."
        );
        let reply = self.ask(prompt, image).await?;
        text_check(target, context_label, reply)
    }
}
