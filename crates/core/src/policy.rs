use serde::{Deserialize, Serialize};

use crate::domain::order::OrderStatus;

pub const DEFECTIVE_ITEM: &str = "DEFECTIVE_ITEM";
pub const WRONG_ITEM: &str = "WRONG_ITEM";
pub const MISSING_ITEM: &str = "MISSING_ITEM";
pub const DAMAGED_IN_TRANSIT: &str = "DAMAGED_IN_TRANSIT";
pub const PAYMENT_ISSUES: &str = "PAYMENT_ISSUES";
pub const REFUND_TIMELINES: &str = "REFUND_TIMELINES";
pub const RETURN_POLICY: &str = "RETURN_POLICY";
pub const TRACKING: &str = "TRACKING";
pub const DELIVERY_SHIPPING: &str = "DELIVERY_SHIPPING";
pub const CANCELLATION: &str = "CANCELLATION";
pub const ADDRESS_CHANGE: &str = "ADDRESS_CHANGE";
pub const COD: &str = "COD";
pub const INVOICE: &str = "INVOICE";
pub const WARRANTY: &str = "WARRANTY";
pub const SIZE_FIT: &str = "SIZE_FIT";
pub const HUMAN_ASSISTANCE: &str = "HUMAN_ASSISTANCE";
pub const OTHER: &str = "OTHER";

/// Canonical issue label joining free-text complaints to the eligibility
/// rules. The vocabulary above is closed; labels that already look like a
/// code pass through `normalize_issue` unchanged.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IssueCode(pub String);

impl IssueCode {
    pub fn other() -> Self {
        Self(OTHER.to_string())
    }

    pub fn human_assistance() -> Self {
        Self(HUMAN_ASSISTANCE.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercase, space-separated rendering for customer-facing replies.
    pub fn describe(&self) -> String {
        self.0.replace('_', " ").to_lowercase()
    }
}

impl std::fmt::Display for IssueCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn normalize_issue(label: &str) -> IssueCode {
    let trimmed = label.trim();
    let code = match trimmed.to_ascii_lowercase().as_str() {
        "defect" | "defective_item" | "defective item" => DEFECTIVE_ITEM,
        "wrong_item" | "wrong item" => WRONG_ITEM,
        "missing_item" | "missing item" | "missing / partial delivery" => MISSING_ITEM,
        "damaged in transit" | "damaged_in_transit" => DAMAGED_IN_TRANSIT,
        "payment issues" | "payment_issues" | "payment issue" => PAYMENT_ISSUES,
        "refund timelines" | "refund_timelines" | "refund" => REFUND_TIMELINES,
        "return policy" | "return_policy" | "return" => RETURN_POLICY,
        "order tracking" | "tracking" => TRACKING,
        "delivery time & shipping" | "delivery_shipping" | "delivery" | "shipping" => {
            DELIVERY_SHIPPING
        }
        "cancellation" | "cancel_order" | "cancel" => CANCELLATION,
        "address change" | "address_change" => ADDRESS_CHANGE,
        "cash on delivery" | "cod" => COD,
        "invoice / gst" | "invoice_gst" | "invoice" => INVOICE,
        "warranty" => WARRANTY,
        "size & fit" | "size_fit" | "sizing" => SIZE_FIT,
        "human" | "human assistance" | "human_assistance" => HUMAN_ASSISTANCE,
        "other" => OTHER,
        _ => {
            if looks_like_code(trimmed) {
                return IssueCode(trimmed.to_string());
            }
            OTHER
        }
    };
    IssueCode(code.to_string())
}

fn looks_like_code(label: &str) -> bool {
    !label.is_empty()
        && label
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

/// Whether an issue may be acted on at the order's current lifecycle stage.
/// Pure and total: every `(code, status)` pair yields a boolean.
///
/// A cancelled order vetoes every code. Codes with no stage restriction
/// (payments, refunds, policy questions, human assistance, ...) are always
/// allowed, as are unknown codes. The restricted classes fail when the
/// status is missing or unparseable.
pub fn is_allowed(code: &IssueCode, status: Option<OrderStatus>) -> bool {
    use OrderStatus::{
        Cancelled, Confirmed, Delivered, OrderPlaced, OutForDelivery, Packing, PaymentPending,
        Shipped,
    };

    if status == Some(Cancelled) {
        return false;
    }

    match code.as_str() {
        ADDRESS_CHANGE | CANCELLATION => {
            matches!(status, Some(OrderPlaced | PaymentPending | Confirmed | Packing))
        }
        DEFECTIVE_ITEM | WRONG_ITEM => matches!(status, Some(Delivered)),
        MISSING_ITEM | DAMAGED_IN_TRANSIT => {
            matches!(status, Some(Shipped | OutForDelivery | Delivered))
        }
        _ => true,
    }
}

/// Best-effort human label for a message that matched no FAQ entry; the
/// label feeds `normalize_issue` when a ticket offer is accepted.
pub fn infer_issue_label(text: &str) -> &'static str {
    let t = text.to_lowercase();
    if t.contains("payment") || t.contains("debited") || t.contains("charged")
        || t.contains("transaction")
    {
        return "payment issues";
    }
    if t.contains("refund") {
        return "refund timelines";
    }
    if t.contains("return") || t.contains("exchange") {
        return "return policy";
    }
    if t.contains("delivery") || t.contains("shipping") {
        return "delivery time & shipping";
    }
    if t.contains("track") {
        return "order tracking";
    }
    if t.contains("cancel") {
        return "cancellation";
    }
    if t.contains("address") {
        return "address change";
    }
    if t.contains("cod") || t.contains("cash on delivery") {
        return "cash on delivery";
    }
    if t.contains("invoice") || t.contains("gst") || t.contains("bill") {
        return "invoice / gst";
    }
    if t.contains("warranty") {
        return "warranty";
    }
    if t.contains("size") || t.contains("fit") {
        return "size & fit";
    }
    if t.contains("missing") || t.contains("not received") || t.contains("partial") {
        return "missing / partial delivery";
    }
    if t.contains("damaged") || t.contains("broken") {
        return "damaged in transit";
    }
    "other"
}
