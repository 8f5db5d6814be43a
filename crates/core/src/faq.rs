use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::domain::faq::FaqEntry;
use crate::errors::GatewayError;
use crate::gateway::FaqSource;

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "to", "for", "of", "in", "on", "is", "are", "i", "my", "me",
    "it", "this", "that", "with", "was", "had", "have", "has", "please", "hi", "hello", "hey",
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FaqMatch {
    pub answer: String,
    pub label: String,
}

/// Keyword-scored best match over the knowledge base. Multi-word keywords
/// must appear verbatim in the query (+2.0); single-word keywords must be
/// in the token set (+1.0). Ties keep the first entry; scores below 1.0
/// are treated as "no confident match", not "no answer exists".
#[derive(Clone, Debug, Default)]
pub struct FaqMatcher {
    entries: Vec<FaqEntry>,
}

impl FaqMatcher {
    pub fn new(entries: Vec<FaqEntry>) -> Self {
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn best_match(&self, query: &str) -> Option<FaqMatch> {
        let q = query.to_lowercase();
        let tokens: HashSet<String> = tokenize(query).into_iter().collect();

        let mut best: Option<&FaqEntry> = None;
        let mut best_score = 0.0f32;
        for entry in &self.entries {
            let mut score = 0.0f32;
            for keyword in &entry.keywords {
                if keyword.is_empty() {
                    continue;
                }
                if keyword.contains(' ') {
                    if q.contains(keyword.as_str()) {
                        score += 2.0;
                    }
                } else if tokens.contains(keyword.as_str()) {
                    score += 1.0;
                }
            }
            if score > best_score {
                best = Some(entry);
                best_score = score;
            }
        }

        match best {
            Some(entry) if best_score >= 1.0 => Some(FaqMatch {
                answer: entry.answer.clone(),
                // the question doubles as the issue label
                label: entry.question.clone(),
            }),
            _ => None,
        }
    }
}

/// Lowercase alphanumeric tokens minus the stop-word set.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for character in text.chars() {
        if character.is_ascii_alphanumeric() {
            current.push(character.to_ascii_lowercase());
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens.retain(|token| !STOP_WORDS.contains(&token.as_str()));
    tokens
}

/// Lazily built matcher over an external FAQ source, with an invalidation
/// hook for when entries are edited outside the conversation path.
pub struct FaqCache<F> {
    source: F,
    cached: Mutex<Option<Arc<FaqMatcher>>>,
}

impl<F> FaqCache<F>
where
    F: FaqSource,
{
    pub fn new(source: F) -> Self {
        Self { source, cached: Mutex::new(None) }
    }

    pub async fn matcher(&self) -> Result<Arc<FaqMatcher>, GatewayError> {
        if let Some(matcher) = self.lock().clone() {
            return Ok(matcher);
        }
        let entries = self.source.list_faqs().await?;
        let matcher = Arc::new(FaqMatcher::new(entries));
        *self.lock() = Some(matcher.clone());
        Ok(matcher)
    }

    pub fn invalidate(&self) {
        *self.lock() = None;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Arc<FaqMatcher>>> {
        self.cached.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Rule-based backup answers used when the knowledge base has no confident
/// match but the message still looks like an FAQ.
pub fn builtin_answer(question: &str) -> String {
    let t = question.to_lowercase();

    if t.contains("return") || t.contains("exchange") {
        return "Returns: 30 days if unused and in original packaging. Exchanges are subject \
                to stock availability. Start from Orders -> Return/Exchange."
            .to_string();
    }
    if t.contains("refund") {
        return "Refunds: issued to your original payment method within 5-7 business days \
                after we receive and inspect the item."
            .to_string();
    }
    if t.contains("delivery") || t.contains("shipping") {
        return "Shipping: we dispatch in 24-48 hours; delivery is usually 2-5 business days \
                depending on your location. You'll get a tracking link by email/SMS."
            .to_string();
    }
    if t.contains("track") {
        return "Tracking: use the tracking link in your email/SMS. If you don't have it, \
                share your Order ID (starts with ORDL) and we'll fetch it for you."
            .to_string();
    }
    if t.contains("cancel") {
        return "Cancellation: allowed until the order is packed/shipped. If it's already \
                shipped, please refuse delivery or create a return after it arrives."
            .to_string();
    }
    if t.contains("address") {
        return "Address change: possible before dispatch. Share your Order ID (ORDL...) and \
                the new address; we'll try to update if the shipment hasn't left."
            .to_string();
    }
    if t.contains("cod") || t.contains("cash on delivery") {
        return "Cash on Delivery: available on eligible pin codes and order totals under the \
                COD limit."
            .to_string();
    }
    if t.contains("payment") || t.contains("paid") || t.contains("failed") || t.contains("debited")
        || t.contains("charged")
    {
        return "Payment issues: if your payment was debited but the order isn't visible, it \
                will auto-refund in 5-7 business days. Share your Order ID or transaction \
                reference for checks."
            .to_string();
    }
    if t.contains("invoice") || t.contains("gst") || t.contains("bill") {
        return "Invoice: you can download it from the Orders page after the item ships. For \
                a GST invoice, ensure GST details are added before placing the order."
            .to_string();
    }
    if t.contains("warranty") {
        return "Warranty: covered as per brand policy. Keep your invoice; brand service \
                centers may ask for it."
            .to_string();
    }
    if t.contains("size") || t.contains("fit") {
        return "Sizing: refer to the Size Chart on the product page. If it doesn't fit, you \
                can request an exchange or return within 30 days."
            .to_string();
    }
    if t.contains("missing") || t.contains("not received") || t.contains("partial") {
        return "Missing items: sometimes multi-item orders arrive in separate boxes. If \
                something is still missing after the expected date, raise a ticket with your \
                ORDL order ID."
            .to_string();
    }
    if t.contains("damaged") || t.contains("broken") {
        return "Damaged item: sorry about that! Please share photos and your ORDL order ID; \
                we'll create a replacement/return right away."
            .to_string();
    }

    "Thanks! I've noted this. For order-specific help, please share your Order ID (starts \
     with ORDL), e.g., ORDL12345."
        .to_string()
}

/// Canonical knowledge-base rows used by the seeder and store tests.
pub fn seed_entries() -> Vec<(&'static str, &'static str, Vec<&'static str>)> {
    vec![
        (
            "return policy",
            "Returns: 30 days if unused and in original packaging. Exchanges subject to stock.",
            vec!["return", "returns", "exchange", "replace", "replacement", "exchange policy"],
        ),
        (
            "refund timelines",
            "Refunds go back to your original payment method within 5-7 business days after \
             inspection.",
            vec!["refund", "refund status", "when refund", "money back", "reversed", "reversal"],
        ),
        (
            "delivery time & shipping",
            "We dispatch in 24-48 hours; delivery is usually 2-5 business days. You'll get a \
             tracking link.",
            vec!["delivery", "shipping", "when arrive", "eta", "courier", "timeline"],
        ),
        (
            "order tracking",
            "Use the tracking link in your email/SMS. If missing, share your ORDL order ID and \
             we'll fetch it.",
            vec!["track", "tracking", "shipment status", "where is my order"],
        ),
        (
            "cancellation",
            "You can cancel until the order is packed/shipped. If shipped, refuse delivery or \
             create a return.",
            vec!["cancel", "cancellation", "stop order"],
        ),
        (
            "address change",
            "We can update the address before dispatch. Share your ORDL order ID and new address.",
            vec!["change address", "wrong address", "update address"],
        ),
        (
            "cash on delivery",
            "COD is available on eligible pin codes and order totals under the limit.",
            vec!["cod", "cash on delivery", "pay on delivery"],
        ),
        (
            "payment issues",
            "If payment was debited but the order isn't visible, it auto-refunds in 5-7 business \
             days. Share your ORDL order ID or transaction reference.",
            vec![
                "payment failed",
                "money debited",
                "charged",
                "double charged",
                "transaction failed",
                "paid but no order",
                "billing",
            ],
        ),
        (
            "invoice / gst",
            "Download the invoice from Orders after shipment. Add GST details before placing the \
             order for a GST invoice.",
            vec!["invoice", "gst", "bill", "billing"],
        ),
        (
            "warranty",
            "Warranty is as per brand policy. Keep your invoice; service centers may ask for it.",
            vec!["warranty", "guarantee", "manufacturer warranty"],
        ),
        (
            "size & fit",
            "Check the Size Chart on the product page. If it doesn't fit, request an \
             exchange/return within 30 days.",
            vec!["size", "fit", "size chart", "too big", "too small"],
        ),
        (
            "missing / partial delivery",
            "Multi-item orders may arrive separately. If still missing after the expected date, \
             raise a ticket with your ORDL order ID.",
            vec!["missing", "not received", "partial", "short", "one item missing"],
        ),
        (
            "damaged in transit",
            "Sorry! Please share photos and your ORDL order ID; we'll arrange a \
             replacement/return immediately.",
            vec!["damaged", "broken", "dented", "cracked", "bad condition"],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::{builtin_answer, seed_entries, tokenize, FaqCache, FaqMatcher};
    use crate::domain::faq::FaqEntry;
    use crate::errors::GatewayError;
    use crate::gateway::FaqSource;

    fn entry(id: i64, question: &str, answer: &str, keywords: &[&str]) -> FaqEntry {
        FaqEntry {
            id,
            question: question.to_string(),
            answer: answer.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }

    #[test]
    fn tokenize_lowercases_and_drops_stop_words() {
        assert_eq!(
            tokenize("Please track MY order, it is Late!"),
            vec!["track", "order", "late"]
        );
    }

    #[test]
    fn multi_word_phrase_outscores_single_word() {
        let matcher = FaqMatcher::new(vec![
            entry(1, "payment issues", "payment answer", &["charged"]),
            entry(2, "double charge", "double answer", &["double charged"]),
        ]);

        let matched = matcher.best_match("I was double charged today").expect("should match");
        assert_eq!(matched.label, "double charge");
    }

    #[test]
    fn below_threshold_scores_return_none() {
        let matcher = FaqMatcher::new(vec![entry(1, "warranty", "answer", &["warranty"])]);
        assert!(matcher.best_match("where is my parcel").is_none());
    }

    #[test]
    fn ties_keep_the_first_entry() {
        let matcher = FaqMatcher::new(vec![
            entry(1, "first", "first answer", &["refund"]),
            entry(2, "second", "second answer", &["refund"]),
        ]);

        let matched = matcher.best_match("refund please").expect("should match");
        assert_eq!(matched.label, "first");
    }

    #[test]
    fn seed_dataset_answers_its_own_keywords() {
        let entries = seed_entries()
            .into_iter()
            .enumerate()
            .map(|(index, (question, answer, keywords))| {
                entry(index as i64 + 1, question, answer, &keywords)
            })
            .collect::<Vec<_>>();
        let matcher = FaqMatcher::new(entries);

        let matched = matcher.best_match("when refund will I get").expect("should match");
        assert_eq!(matched.label, "refund timelines");
        let matched = matcher.best_match("is cash on delivery available").expect("should match");
        assert_eq!(matched.label, "cash on delivery");
    }

    #[test]
    fn builtin_answers_cover_the_faq_topics() {
        assert!(builtin_answer("how do returns work").contains("30 days"));
        assert!(builtin_answer("track my parcel").contains("tracking link"));
        assert!(builtin_answer("something else entirely").contains("ORDL12345"));
    }

    struct CountingSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl FaqSource for CountingSource {
        async fn list_faqs(&self) -> Result<Vec<FaqEntry>, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![entry(1, "warranty", "warranty answer", &["warranty"])])
        }
    }

    #[tokio::test]
    async fn cache_loads_once_until_invalidated() {
        let cache = FaqCache::new(CountingSource { calls: AtomicUsize::new(0) });

        let first = cache.matcher().await.expect("load");
        let second = cache.matcher().await.expect("load");
        assert!(first.best_match("warranty claim").is_some());
        assert!(second.best_match("warranty claim").is_some());
        assert_eq!(cache.source.calls.load(Ordering::SeqCst), 1);

        cache.invalidate();
        let _ = cache.matcher().await.expect("reload");
        assert_eq!(cache.source.calls.load(Ordering::SeqCst), 2);
    }
}
