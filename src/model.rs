//! Core domain types for the settlement engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::Amount;

/// Offer identifier.
pub type OfferId = Uuid;

/// Order identifier.
pub type OrderId = Uuid;

/// Payment identifier.
pub type PaymentId = Uuid;

/// Payout identifier.
pub type PayoutId = Uuid;

/// Buyer or creator identifier, owned by the identity system.
pub type UserId = String;

/// Campaign identifier, owned by campaign tooling.
pub type CampaignId = String;

/// Brand identifier, owned by brand tooling.
pub type BrandId = String;

macro_rules! status_str {
    ($ty:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

/// Lifecycle of an offer. Only `Active -> Successful` and `Active -> Failed` exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OfferStatus {
    #[default]
    Active,
    Successful,
    Failed,
}

status_str!(OfferStatus {
    Active => "ACTIVE",
    Successful => "SUCCESSFUL",
    Failed => "FAILED",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Paid,
    /// Refunded because the offer failed or through a direct refund.
    Refunded,
    /// Refunded on the buyer's request before the cancellation cutoff.
    Cancelled,
}

status_str!(OrderStatus {
    Paid => "PAID",
    Refunded => "REFUNDED",
    Cancelled => "CANCELLED",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Succeeded,
    Refunded,
}

status_str!(PaymentStatus {
    Succeeded => "SUCCEEDED",
    Refunded => "REFUNDED",
});

/// Payout and reward status. Transfer states past `Pending` belong to the finalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayoutStatus {
    #[default]
    Pending,
}

status_str!(PayoutStatus { Pending => "PENDING" });

/// A time-boxed commitment to sell `goal_quantity` units at a fixed price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub id: OfferId,
    pub campaign_id: CampaignId,
    pub brand_id: BrandId,
    /// Creator of the campaign, receives the [`CreatorReward`].
    pub creator_user_id: UserId,
    pub price: Amount,
    pub currency: String,
    pub goal_quantity: u32,
    pub deadline: DateTime<Utc>,
    pub status: OfferStatus,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Offer {
    pub fn is_active(&self) -> bool {
        self.status == OfferStatus::Active
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.deadline
    }
}

/// Delivery details captured at checkout and carried through the intent metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingDetails {
    pub name: String,
    pub address: String,
}

/// One buyer's paid commitment against an offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub offer_id: OfferId,
    pub user_id: UserId,
    pub amount: Amount,
    pub currency: String,
    pub status: OrderStatus,
    pub shipping: Option<ShippingDetails>,
    pub created_at: DateTime<Utc>,
}

/// External charge backing exactly one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub provider: String,
    /// Idempotency key: unique across the whole ledger.
    pub provider_payment_intent_id: String,
    pub status: PaymentStatus,
    pub amount: Amount,
    pub currency: String,
}

/// Settlement outcome of a successful offer, owned by the brand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub id: PayoutId,
    pub offer_id: OfferId,
    pub brand_id: BrandId,
    pub currency: String,
    pub gross_amount: Amount,
    pub platform_fee: Amount,
    pub creator_share: Amount,
    pub net_to_brand: Amount,
    pub status: PayoutStatus,
    pub created_at: DateTime<Utc>,
}

/// The campaign creator's share of the platform fee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatorReward {
    pub id: Uuid,
    pub campaign_id: CampaignId,
    pub creator_user_id: UserId,
    pub payout_id: PayoutId,
    pub amount: Amount,
    pub status: PayoutStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconciliationReason {
    /// Payment confirmed after the offer closed; the charge is still held.
    LateConfirmation,
    /// Payment confirmed after the offer closed and was refunded automatically.
    LateConfirmationRefunded,
    /// Charged amount or currency does not match the offer.
    AmountMismatch,
    /// A provider refund failed and the order is still PAID.
    RefundFailed,
}

status_str!(ReconciliationReason {
    LateConfirmation => "LATE_CONFIRMATION",
    LateConfirmationRefunded => "LATE_CONFIRMATION_REFUNDED",
    AmountMismatch => "AMOUNT_MISMATCH",
    RefundFailed => "REFUND_FAILED",
});

/// Money movement the engine could not complete on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationFlag {
    pub id: Uuid,
    pub offer_id: OfferId,
    pub order_id: Option<OrderId>,
    pub provider_payment_intent_id: Option<String>,
    pub reason: ReconciliationReason,
    pub detail: String,
    pub flagged_at: DateTime<Utc>,
}

/// Payout arithmetic, computed once at settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayoutBreakdown {
    pub gross_amount: Amount,
    pub platform_fee: Amount,
    pub creator_share: Amount,
    pub net_to_brand: Amount,
}

impl PayoutBreakdown {
    /// - `platform_fee = gross * platform_fee_rate`
    /// - `creator_share = platform_fee * creator_share_rate`
    /// - `net_to_brand = gross - platform_fee`
    pub fn compute(
        gross_amount: Amount,
        platform_fee_rate: crate::Rate,
        creator_share_rate: crate::Rate,
    ) -> Self {
        let platform_fee = gross_amount.apply_rate(platform_fee_rate);
        let creator_share = platform_fee.apply_rate(creator_share_rate);
        Self {
            gross_amount,
            platform_fee,
            creator_share,
            net_to_brand: gross_amount - platform_fee,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Rate;

    fn amount(s: &str) -> Amount {
        s.parse().unwrap()
    }

    #[test]
    fn payout_breakdown_matches_reference_numbers() {
        let breakdown = PayoutBreakdown::compute(
            "1000".parse().unwrap(),
            "0.03".parse::<Rate>().unwrap(),
            "0.10".parse::<Rate>().unwrap(),
        );
        assert_eq!(breakdown.platform_fee, amount("30"));
        assert_eq!(breakdown.creator_share, amount("3"));
        assert_eq!(breakdown.net_to_brand, amount("970"));
    }

    #[test]
    fn net_and_fee_always_sum_to_gross() {
        let gross = amount("333.33");
        let breakdown =
            PayoutBreakdown::compute(gross, "0.07".parse().unwrap(), "0.5".parse().unwrap());
        assert_eq!(breakdown.net_to_brand + breakdown.platform_fee, gross);
        assert_eq!(breakdown.platform_fee, amount("23.33"));
        assert_eq!(breakdown.creator_share, amount("11.67"));
    }

    #[test]
    fn offer_status_default_is_active() {
        assert_eq!(OfferStatus::default(), OfferStatus::Active);
    }

    #[test]
    fn statuses_render_in_ledger_form() {
        assert_eq!(OrderStatus::Cancelled.to_string(), "CANCELLED");
        assert_eq!(OfferStatus::Successful.to_string(), "SUCCESSFUL");
        assert_eq!(ReconciliationReason::RefundFailed.as_str(), "REFUND_FAILED");
    }
}
