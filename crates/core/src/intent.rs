use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Defect,
    WrongItem,
    MissingItem,
    Human,
    Bye,
    Greet,
    Faq,
    Fallback,
}

impl Intent {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "defect" => Some(Self::Defect),
            "wrong_item" => Some(Self::WrongItem),
            "missing_item" => Some(Self::MissingItem),
            "human" => Some(Self::Human),
            "bye" => Some(Self::Bye),
            "greet" => Some(Self::Greet),
            "faq" => Some(Self::Faq),
            "fallback" => Some(Self::Fallback),
            _ => None,
        }
    }
}

/// One turn's classification. Produced fresh per message, never mutated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DetectedIntent {
    pub intent: Intent,
    pub order_id: Option<String>,
    pub issue_summary: Option<&'static str>,
}

const DEFECT_KEYWORDS: &[&str] = &["defect", "defective", "broken", "damage", "damaged"];

const WRONG_ITEM_PHRASES: &[&str] = &[
    "wrong item",
    "wrong product",
    "not what i ordered",
    "received different",
    "received a different",
    "different brand",
    "mismatch",
    "mismatched",
    "incorrect item",
    "wrong ",
];

const MISSING_PHRASES: &[&str] = &[
    "missing item",
    "item missing",
    "one item missing",
    "not received",
    "not delivered",
    "partial delivery",
];

const HUMAN_PHRASES: &[&str] = &[
    "talk to a human",
    "talk to human",
    "speak to a human",
    "customer care",
    "customer service",
    "escalate",
    "call me",
    "real person",
    "live agent",
];
const HUMAN_SUBJECTS: &[&str] = &["human", "agent", "representative"];
const HUMAN_VERBS: &[&str] = &["help", "assist", "support", "talk", "speak", "connect", "call"];

const BYE_PHRASES: &[&str] =
    &["bye", "goodbye", "end chat", "stop", "exit", "quit", "see you", "that's all"];

const GREET_WORDS: &[&str] = &["hi", "hello", "hey", "hiya", "namaste"];
const GREET_PHRASES: &[&str] = &["good morning", "good afternoon", "good evening"];

const FAQ_TRIGGERS: &[&str] = &[
    "return policy",
    "return",
    "exchange",
    "refund",
    "delivery time",
    "shipping",
    "track",
    "tracking",
    "cancel",
    "cancellation",
    "address change",
    "address",
    "cod",
    "cash on delivery",
    "payment",
    "payment failed",
    "failed payment",
    "money debited",
    "debited",
    "charged",
    "double charged",
    "transaction",
    "paid",
    "invoice",
    "gst",
    "bill",
    "billing",
    "warranty",
    "size",
    "fit",
    "size chart",
    "missing",
    "not received",
    "partial",
];

const YES_TOKENS: &[&str] = &["yes", "y", "yeah", "yep", "sure", "ok", "okay", "please"];
const YES_PHRASES: &[&str] =
    &["raise ticket", "open ticket", "create ticket", "register complaint", "register ticket"];
const NO_TOKENS: &[&str] = &["no", "n", "nope", "dont", "don't"];
const NO_PHRASES: &[&str] = &["not now", "later", "do not"];

const GOODBYE_WORDS: &[&str] = &["bye", "goodbye"];
const THANKS_WORDS: &[&str] = &["thanks", "thankyou"];

const TICKET_REQUEST_PHRASES: &[&str] = &[
    "open a ticket",
    "raise a ticket",
    "create a ticket",
    "open ticket",
    "raise ticket",
    "create ticket",
    "register complaint",
    "register a complaint",
    "file a complaint",
    "register ticket",
];

const ISSUE_HINT_WORDS: &[&str] = &[
    "defect",
    "wrong",
    "broken",
    "damage",
    "damaged",
    "payment",
    "paid",
    "debited",
    "charged",
    "refund",
    "transaction",
    "failed",
    "missing",
    "not received",
    "not delivered",
    "partial",
];

/// Rule-first classification. The priority order is load-bearing: defect
/// beats wrong-item beats missing-item beats human/bye/greet/FAQ, and the
/// first match wins. Pure function over the text.
pub fn detect(text: &str) -> DetectedIntent {
    let t = text.to_lowercase();
    let order_id = extract_order_id(text);

    if DEFECT_KEYWORDS.iter().any(|k| t.contains(k)) {
        return DetectedIntent {
            intent: Intent::Defect,
            order_id,
            issue_summary: Some("Defective item"),
        };
    }

    if WRONG_ITEM_PHRASES.iter().any(|p| t.contains(p)) {
        return DetectedIntent {
            intent: Intent::WrongItem,
            order_id,
            issue_summary: Some("Received wrong item"),
        };
    }

    if MISSING_PHRASES.iter().any(|p| t.contains(p))
        || (t.contains("missing") && t.contains("item"))
    {
        return DetectedIntent {
            intent: Intent::MissingItem,
            order_id,
            issue_summary: Some("Missing/partial delivery"),
        };
    }

    if HUMAN_PHRASES.iter().any(|p| t.contains(p))
        || (HUMAN_SUBJECTS.iter().any(|s| t.contains(s))
            && HUMAN_VERBS.iter().any(|v| t.contains(v)))
    {
        return DetectedIntent { intent: Intent::Human, order_id, issue_summary: None };
    }

    if BYE_PHRASES.iter().any(|p| t.contains(p)) {
        return DetectedIntent { intent: Intent::Bye, order_id, issue_summary: None };
    }

    if GREET_WORDS.iter().any(|w| contains_word(&t, w))
        || GREET_PHRASES.iter().any(|p| t.contains(p))
    {
        return DetectedIntent { intent: Intent::Greet, order_id, issue_summary: None };
    }

    if FAQ_TRIGGERS.iter().any(|k| t.contains(k)) {
        return DetectedIntent { intent: Intent::Faq, order_id, issue_summary: None };
    }

    DetectedIntent { intent: Intent::Fallback, order_id, issue_summary: None }
}

/// Order-id extraction: a labelled `order id: ORDL...` pattern wins over
/// the first bare `ORDL` token found at a word boundary. The token is
/// returned with the caller's casing preserved. Never fails the turn.
pub fn extract_order_id(text: &str) -> Option<String> {
    find_labeled_order_id(text).or_else(|| find_bare_order_token(text))
}

fn find_labeled_order_id(text: &str) -> Option<String> {
    let lower = text.to_ascii_lowercase();
    let bytes = lower.as_bytes();
    let mut search = 0;
    while let Some(found) = lower[search..].find("order") {
        let label_start = search + found;
        let mut cursor = label_start + "order".len();
        if cursor < bytes.len() && matches!(bytes[cursor], b' ' | b'_' | b'-') {
            cursor += 1;
        }
        if lower[cursor..].starts_with("id") {
            cursor += 2;
            while cursor < bytes.len() && matches!(bytes[cursor], b':' | b' ') {
                cursor += 1;
            }
            if lower[cursor..].starts_with("ordl") {
                if let Some(token) = order_token_at(text, cursor) {
                    return Some(token);
                }
            }
        }
        search = label_start + 1;
    }
    None
}

fn find_bare_order_token(text: &str) -> Option<String> {
    let lower = text.to_ascii_lowercase();
    let bytes = lower.as_bytes();
    let mut search = 0;
    while let Some(found) = lower[search..].find("ordl") {
        let start = search + found;
        let at_boundary = start == 0 || {
            let prev = bytes[start - 1];
            !(prev.is_ascii_alphanumeric() || prev == b'_')
        };
        if at_boundary {
            if let Some(token) = order_token_at(text, start) {
                return Some(token);
            }
        }
        search = start + "ordl".len();
    }
    None
}

fn order_token_at(text: &str, start: usize) -> Option<String> {
    let tail = &text.as_bytes()[start + 4..];
    let mut len = 0;
    while len < tail.len() && (tail[len].is_ascii_alphanumeric() || tail[len] == b'-') {
        len += 1;
    }
    (len >= 3).then(|| text[start..start + 4 + len].to_string())
}

/// Whether the whole trimmed message is exactly one order-id token.
pub fn is_bare_order_id(text: &str) -> bool {
    let trimmed = text.trim();
    trimmed.len() >= 4
        && trimmed.as_bytes()[..4].eq_ignore_ascii_case(b"ordl")
        && order_token_at(trimmed, 0).is_some_and(|token| token.len() == trimmed.len())
}

pub fn is_yes(text: &str) -> bool {
    let t = text.to_lowercase();
    YES_TOKENS.iter().any(|w| contains_word(&t, w)) || YES_PHRASES.iter().any(|p| t.contains(p))
}

pub fn is_no(text: &str) -> bool {
    let t = text.to_lowercase();
    NO_TOKENS.iter().any(|w| contains_word(&t, w)) || NO_PHRASES.iter().any(|p| t.contains(p))
}

pub fn contains_goodbye_token(text: &str) -> bool {
    let t = text.to_lowercase();
    GOODBYE_WORDS.iter().any(|w| contains_word(&t, w)) || t.contains("end chat")
}

pub fn contains_thanks_token(text: &str) -> bool {
    let t = text.to_lowercase();
    THANKS_WORDS.iter().any(|w| contains_word(&t, w)) || t.contains("thank you")
}

pub fn wants_ticket(text: &str) -> bool {
    let t = text.to_lowercase();
    TICKET_REQUEST_PHRASES.iter().any(|p| t.contains(p))
}

pub fn has_issue_hint(text: &str) -> bool {
    let t = text.to_lowercase();
    ISSUE_HINT_WORDS.iter().any(|w| t.contains(w))
}

/// First whitespace-separated token that parses as an email address.
pub fn extract_email(text: &str) -> Option<String> {
    for raw in text.split(|c: char| c.is_whitespace() || c == ',' || c == ';') {
        let token = raw.trim_matches(|c: char| !(c.is_ascii_alphanumeric() || c == '@'));
        let Some(at) = token.find('@') else { continue };
        let (local, domain) = token.split_at(at);
        let domain = &domain[1..];
        if !local.is_empty()
            && domain.contains('.')
            && !domain.starts_with('.')
            && !domain.ends_with('.')
            && !domain.contains('@')
        {
            return Some(token.to_string());
        }
    }
    None
}

fn contains_word(haystack: &str, word: &str) -> bool {
    let mut search = 0;
    while let Some(found) = haystack[search..].find(word) {
        let start = search + found;
        let end = start + word.len();
        let left_ok = start == 0
            || !haystack.as_bytes()[start - 1].is_ascii_alphanumeric();
        let right_ok = end == haystack.len()
            || !haystack.as_bytes()[end].is_ascii_alphanumeric();
        if left_ok && right_ok {
            return true;
        }
        search = start + 1;
    }
    false
}
