use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    OrderPlaced,
    PaymentPending,
    Confirmed,
    Packing,
    Shipped,
    OutForDelivery,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// Permissive parser: unrecognized strings yield `None` rather than an
    /// error, so the eligibility policy can apply its unknown-status rule.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ORDER_PLACED" | "NEW" => Some(Self::OrderPlaced),
            "PAYMENT_PENDING" => Some(Self::PaymentPending),
            "CONFIRMED" => Some(Self::Confirmed),
            "PACKING" => Some(Self::Packing),
            "SHIPPED" => Some(Self::Shipped),
            "OUT_FOR_DELIVERY" => Some(Self::OutForDelivery),
            "DELIVERED" => Some(Self::Delivered),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrderPlaced => "ORDER_PLACED",
            Self::PaymentPending => "PAYMENT_PENDING",
            Self::Confirmed => "CONFIRMED",
            Self::Packing => "PACKING",
            Self::Shipped => "SHIPPED",
            Self::OutForDelivery => "OUT_FOR_DELIVERY",
            Self::Delivered => "DELIVERED",
            Self::Cancelled => "CANCELLED",
        }
    }
}
