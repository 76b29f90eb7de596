//! Shared domain enums for order and payment state.
//!
//! Entities store these as strings; services parse and format through the
//! `strum` implementations so the persisted spelling stays in one place.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;

/// Fulfillment lifecycle of an order, driven by store staff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema)]
pub enum FulfillmentStatus {
    Pending,
    Preparing,
    Ready,
    Completed,
}

/// Settlement state of an order. Only the reconciliation engine may move it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
}

impl PaymentStatus {
    /// Parses the persisted spelling, defaulting to `Pending` for rows
    /// written before the status column was constrained.
    pub fn from_column(value: &str) -> Self {
        value.parse().unwrap_or(PaymentStatus::Pending)
    }
}

impl FulfillmentStatus {
    pub fn from_column(value: &str) -> Self {
        value.parse().unwrap_or(FulfillmentStatus::Pending)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum PaymentMethod {
    CashOnDelivery,
    WalletTransfer,
    Card,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_status_round_trips_through_column_spelling() {
        assert_eq!(PaymentStatus::Paid.to_string(), "paid");
        assert_eq!(PaymentStatus::from_column("paid"), PaymentStatus::Paid);
        assert_eq!(PaymentStatus::from_column("failed"), PaymentStatus::Failed);
        assert_eq!(PaymentStatus::from_column("garbage"), PaymentStatus::Pending);
    }

    #[test]
    fn fulfillment_status_uses_capitalized_spelling() {
        assert_eq!(FulfillmentStatus::Preparing.to_string(), "Preparing");
        assert_eq!(
            FulfillmentStatus::from_column("Ready"),
            FulfillmentStatus::Ready
        );
    }

    #[test]
    fn payment_method_serializes_kebab_case() {
        assert_eq!(PaymentMethod::CashOnDelivery.to_string(), "cash-on-delivery");
        let json = serde_json::to_string(&PaymentMethod::WalletTransfer).unwrap();
        assert_eq!(json, "\"wallet-transfer\"");
    }
}
