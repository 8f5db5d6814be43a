use async_trait::async_trait;

use crate::intent::Intent;

/// What the external classifier reported for one message. `confidence`
/// is 0.0 whenever the remote call failed or returned garbage, so the
/// controller's thresholds reject it without special-casing.
#[derive(Clone, Debug, PartialEq)]
pub struct AdvisorVerdict {
    pub intent: Intent,
    pub order_id: Option<String>,
    pub issue_label: Option<String>,
    pub confidence: f32,
}

impl AdvisorVerdict {
    pub fn fallback() -> Self {
        Self { intent: Intent::Fallback, order_id: None, issue_label: None, confidence: 0.0 }
    }
}

/// Optional external model. Every method is best-effort by contract:
/// `classify` never fails (it degrades to the zero-confidence fallback)
/// and the text helpers return `None` when the model is unavailable.
#[async_trait]
pub trait Advisor: Send + Sync {
    async fn classify(&self, text: &str) -> AdvisorVerdict;

    async fn rewrite(&self, user_text: &str, base_answer: &str) -> Option<String>;

    async fn welcome_message(&self) -> Option<String>;

    async fn generate_manual(&self, product: &str, facts: &serde_json::Value) -> Option<String>;
}

/// Stands in when no advisor credentials are configured; also the test
/// double for controller paths that must not depend on the model.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopAdvisor;

#[async_trait]
impl Advisor for NoopAdvisor {
    async fn classify(&self, _text: &str) -> AdvisorVerdict {
        AdvisorVerdict::fallback()
    }

    async fn rewrite(&self, _user_text: &str, _base_answer: &str) -> Option<String> {
        None
    }

    async fn welcome_message(&self) -> Option<String> {
        None
    }

    async fn generate_manual(&self, _product: &str, _facts: &serde_json::Value) -> Option<String> {
        None
    }
}

#[async_trait]
impl<A> Advisor for std::sync::Arc<A>
where
    A: Advisor + ?Sized,
{
    async fn classify(&self, text: &str) -> AdvisorVerdict {
        (**self).classify(text).await
    }

    async fn rewrite(&self, user_text: &str, base_answer: &str) -> Option<String> {
        (**self).rewrite(user_text, base_answer).await
    }

    async fn welcome_message(&self) -> Option<String> {
        (**self).welcome_message().await
    }

    async fn generate_manual(&self, product: &str, facts: &serde_json::Value) -> Option<String> {
        (**self).generate_manual(product, facts).await
    }
}
