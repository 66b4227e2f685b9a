//! Error types for engine operations.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::gateway::{GatewayError, IntentStatus};
use crate::ledger::LedgerError;
use crate::model::{OfferId, OfferStatus, OrderId, OrderStatus, UserId};
use crate::Amount;

/// Top-level error wrapping every operation's error.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("checkout failed: {0}")]
    Checkout(#[from] CheckoutError),

    #[error("confirmation failed: {0}")]
    Confirmation(#[from] ConfirmationError),

    #[error("settlement failed: {0}")]
    Settlement(#[from] SettlementError),

    #[error("refund failed: {0}")]
    Refund(#[from] RefundError),

    #[error("cancellation failed: {0}")]
    Cancellation(#[from] CancellationError),

    #[error("{0}")]
    Ledger(#[from] LedgerError),
}

/// Error starting a checkout. Every variant maps to a stable client-facing [`code`](Self::code).
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("offer {0} not found")]
    OfferNotFound(OfferId),

    #[error("offer {0} is {1}")]
    OfferNotActive(OfferId, OfferStatus),

    #[error("offer {0} has expired")]
    OfferExpired(OfferId),

    #[error("user {1} already holds a paid order on offer {0}")]
    AlreadyPurchased(OfferId, UserId),

    #[error("offer {0} price {1} cannot be charged in minor units")]
    InvalidPrice(OfferId, Amount),

    #[error("{0}")]
    Gateway(#[from] GatewayError),

    #[error("{0}")]
    Ledger(#[from] LedgerError),
}

impl CheckoutError {
    pub fn code(&self) -> &'static str {
        match self {
            CheckoutError::OfferNotFound(_) => "offer_not_found",
            CheckoutError::OfferNotActive(..) => "offer_not_active",
            CheckoutError::OfferExpired(_) => "offer_expired",
            CheckoutError::AlreadyPurchased(..) => "already_purchased",
            CheckoutError::Gateway(GatewayError::Declined(_)) => "payment_declined",
            CheckoutError::Gateway(GatewayError::Unavailable(_)) => "provider_unavailable",
            CheckoutError::InvalidPrice(..)
            | CheckoutError::Gateway(_)
            | CheckoutError::Ledger(_) => "internal_error",
        }
    }
}

/// Error handling a payment confirmation.
#[derive(Debug, Error)]
pub enum ConfirmationError {
    /// Provider reported a confirmation for an intent that did not succeed.
    #[error("intent {0} is {1}, expected succeeded")]
    IntentNotSucceeded(String, IntentStatus),

    #[error("offer {0} not found")]
    OfferNotFound(OfferId),

    #[error("intent {intent} charged {charged}, offer expects {expected}")]
    AmountMismatch {
        intent: String,
        charged: String,
        expected: String,
    },

    #[error("{0}")]
    Gateway(#[from] GatewayError),

    #[error("{0}")]
    Ledger(#[from] LedgerError),
}

/// Error settling an offer.
#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("offer {0} not found")]
    OfferNotFound(OfferId),

    #[error("offer {0} is already {1}")]
    OfferNotActive(OfferId, OfferStatus),

    #[error("offer {0} is already being settled")]
    InProgress(OfferId),

    #[error("offer {0} deadline {1} has not passed")]
    DeadlineNotReached(OfferId, DateTime<Utc>),

    #[error("offer {0} gross amount overflows")]
    GrossOverflow(OfferId),

    #[error("{0}")]
    Ledger(LedgerError),
}

impl From<LedgerError> for SettlementError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::OfferNotFound(offer) => SettlementError::OfferNotFound(offer),
            LedgerError::OfferNotActive(offer, status) => {
                SettlementError::OfferNotActive(offer, status)
            }
            LedgerError::SettlementInProgress(offer) => SettlementError::InProgress(offer),
            other => SettlementError::Ledger(other),
        }
    }
}

/// Error refunding an order.
#[derive(Debug, Error)]
pub enum RefundError {
    #[error("order {0} not found")]
    OrderNotFound(OrderId),

    #[error("order {0} cannot be refunded: {1}")]
    OrderNotRefundable(OrderId, String),

    #[error("{0}")]
    Gateway(#[from] GatewayError),

    #[error("{0}")]
    Ledger(#[from] LedgerError),
}

/// Error cancelling an order on the buyer's request.
#[derive(Debug, Error)]
pub enum CancellationError {
    #[error("order {0} not found")]
    OrderNotFound(OrderId),

    #[error("user {1} does not own order {0}")]
    Unauthorized(OrderId, UserId),

    #[error("order {0} is {1}, only PAID orders can be cancelled")]
    OrderNotCancellable(OrderId, OrderStatus),

    #[error("offer {0} not found")]
    OfferNotFound(OfferId),

    #[error("offer {0} is {1}, orders can only be cancelled while it is ACTIVE")]
    OfferNotActive(OfferId, OfferStatus),

    #[error("cancellation window for order {0} closed at {1}")]
    WindowClosed(OrderId, DateTime<Utc>),

    #[error("{0}")]
    Refund(#[from] RefundError),

    #[error("{0}")]
    Ledger(#[from] LedgerError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn checkout_codes_distinguish_client_outcomes() {
        let offer = Uuid::new_v4();
        assert_eq!(CheckoutError::OfferExpired(offer).code(), "offer_expired");
        assert_eq!(
            CheckoutError::AlreadyPurchased(offer, "u".into()).code(),
            "already_purchased"
        );
        assert_eq!(
            CheckoutError::Gateway(GatewayError::Declined("nsf".into())).code(),
            "payment_declined"
        );
        assert_eq!(
            CheckoutError::Gateway(GatewayError::Rejected("bad".into())).code(),
            "internal_error"
        );
    }

    #[test]
    fn ledger_claim_errors_become_settlement_errors() {
        let offer = Uuid::new_v4();
        assert!(matches!(
            SettlementError::from(LedgerError::OfferNotActive(offer, OfferStatus::Failed)),
            SettlementError::OfferNotActive(_, OfferStatus::Failed)
        ));
        assert!(matches!(
            SettlementError::from(LedgerError::SettlementInProgress(offer)),
            SettlementError::InProgress(_)
        ));
        assert!(matches!(
            SettlementError::from(LedgerError::ClaimNotHeld(offer)),
            SettlementError::Ledger(LedgerError::ClaimNotHeld(_))
        ));
    }
}
