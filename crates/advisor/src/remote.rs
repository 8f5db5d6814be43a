use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use cassie_core::advisor::{Advisor, AdvisorVerdict};
use cassie_core::config::BrandConfig;
use cassie_core::intent::Intent;

use crate::client::ChatClient;
use crate::manual::MANUAL_SYSTEM_PROMPT;

const CLASSIFY_SYSTEM_PROMPT: &str = "\
You classify online-shopping support messages.
Return STRICT JSON with keys:
intent: one of [defect, wrong_item, missing_item, faq, human, bye, fallback]
order_id: string like ORDL12345 or null
issue_label: short snake_case label (e.g., payment_issues, address_change) or null
confidence: number 0..1
Do not include extra text - JSON ONLY.";

const REWRITE_SYSTEM_PROMPT: &str = "\
You are a helpful ecommerce support assistant.
You will receive:
- user_text: customer's words
- base_answer: factual answer from our KB/policies

Rewrite base_answer so it is warm, clear, and concise. Do NOT invent new facts.
Keep any uncertainty that exists. Return plain text only with a short friendly close.";

const WELCOME_SYSTEM_PROMPT: &str = "\
Write a short, upbeat welcome for an online store support chat.
Tone: friendly and capable (2-4 short sentences).
Explain you can help with orders, returns/exchanges, delivery/tracking, payments/invoices.
Ask for Order ID (ORDL...) if it's order-specific. No promos. Plain text only.";

/// Remote model behind the `Advisor` seam. Every call degrades to a safe
/// fallback instead of surfacing an error.
pub struct RemoteAdvisor {
    client: ChatClient,
    brand: BrandConfig,
}

impl RemoteAdvisor {
    pub fn new(client: ChatClient, brand: BrandConfig) -> Self {
        Self { client, brand }
    }
}

#[async_trait]
impl Advisor for RemoteAdvisor {
    async fn classify(&self, text: &str) -> AdvisorVerdict {
        let raw = match self.client.complete(CLASSIFY_SYSTEM_PROMPT, text, 0.0).await {
            Ok(raw) => raw,
            Err(error) => {
                debug!(
                    event_name = "advisor.classify_unavailable",
                    error = %error,
                    "falling back to zero confidence"
                );
                return AdvisorVerdict::fallback();
            }
        };
        parse_verdict(&raw).unwrap_or_else(AdvisorVerdict::fallback)
    }

    async fn rewrite(&self, user_text: &str, base_answer: &str) -> Option<String> {
        let prompt = format!("user_text:\n{user_text}\n\nbase_answer:\n{base_answer}");
        self.client.complete(REWRITE_SYSTEM_PROMPT, &prompt, 0.5).await.ok()
    }

    async fn welcome_message(&self) -> Option<String> {
        let prompt =
            format!("Brand: {}. Hours: {}.", self.brand.name, self.brand.support_hours);
        self.client.complete(WELCOME_SYSTEM_PROMPT, &prompt, 0.6).await.ok()
    }

    async fn generate_manual(&self, product: &str, facts: &Value) -> Option<String> {
        let payload = serde_json::json!({ "product": product, "facts": facts });
        self.client
            .complete(MANUAL_SYSTEM_PROMPT, &payload.to_string(), 0.4)
            .await
            .ok()
    }
}

/// Pulls the first `{...}` span out of a possibly prose-wrapped response
/// and maps it onto a verdict. `None` on anything unparseable.
pub(crate) fn parse_verdict(raw: &str) -> Option<AdvisorVerdict> {
    let value = extract_json(raw)?;
    let intent = value
        .get("intent")
        .and_then(Value::as_str)
        .and_then(Intent::parse)
        .unwrap_or(Intent::Fallback);
    let order_id = value
        .get("order_id")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|order_id| !order_id.is_empty())
        .map(str::to_string);
    let issue_label = value
        .get("issue_label")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|label| !label.is_empty())
        .map(str::to_string);
    let confidence = value
        .get("confidence")
        .and_then(Value::as_f64)
        .unwrap_or(0.0)
        .clamp(0.0, 1.0) as f32;

    Some(AdvisorVerdict { intent, order_id, issue_label, confidence })
}

fn extract_json(raw: &str) -> Option<Value> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&raw[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use cassie_core::intent::Intent;

    use super::parse_verdict;

    #[test]
    fn strict_json_parses_into_a_verdict() {
        let verdict = parse_verdict(
            r#"{"intent": "defect", "order_id": "ORDL12345", "issue_label": null, "confidence": 0.92}"#,
        )
        .expect("verdict");

        assert_eq!(verdict.intent, Intent::Defect);
        assert_eq!(verdict.order_id.as_deref(), Some("ORDL12345"));
        assert_eq!(verdict.issue_label, None);
        assert!((verdict.confidence - 0.92).abs() < f32::EPSILON);
    }

    #[test]
    fn prose_wrapped_json_is_still_extracted() {
        let verdict = parse_verdict(
            "Sure! Here is the JSON you asked for:\n{\"intent\": \"faq\", \"order_id\": null, \
             \"issue_label\": \"payment_issues\", \"confidence\": 0.7}\nHope that helps!",
        )
        .expect("verdict");

        assert_eq!(verdict.intent, Intent::Faq);
        assert_eq!(verdict.issue_label.as_deref(), Some("payment_issues"));
    }

    #[test]
    fn unknown_intents_and_missing_fields_degrade_safely() {
        let verdict = parse_verdict(r#"{"intent": "weird", "confidence": 2.5}"#).expect("verdict");
        assert_eq!(verdict.intent, Intent::Fallback);
        assert_eq!(verdict.order_id, None);
        assert!((verdict.confidence - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn garbage_yields_no_verdict() {
        assert!(parse_verdict("no json here").is_none());
        assert!(parse_verdict("}{").is_none());
        assert!(parse_verdict("{not valid json}").is_none());
    }
}
