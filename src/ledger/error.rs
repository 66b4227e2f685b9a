use thiserror::Error;

use crate::model::{OfferId, OfferStatus, OrderId, OrderStatus, PaymentStatus};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("offer {0} not found")]
    OfferNotFound(OfferId),

    #[error("offer {0} already exists")]
    DuplicateOffer(OfferId),

    #[error("offer {0} is {1}")]
    OfferNotActive(OfferId, OfferStatus),

    #[error("offer {0} is being settled")]
    SettlementInProgress(OfferId),

    #[error("no settlement claim held for offer {0}")]
    ClaimNotHeld(OfferId),

    #[error("payout already recorded for offer {0}")]
    PayoutExists(OfferId),

    #[error("order {0} not found")]
    OrderNotFound(OrderId),

    #[error("payment for order {0} not found")]
    PaymentNotFound(OrderId),

    #[error("payment intent {intent} already recorded for order {order}")]
    DuplicateIntent { intent: String, order: OrderId },

    #[error("order {0} is {1}, expected PAID")]
    OrderNotPaid(OrderId, OrderStatus),

    #[error("payment for order {0} is {1}, expected SUCCEEDED")]
    PaymentNotSucceeded(OrderId, PaymentStatus),

    #[error("{0} is not a refund outcome")]
    InvalidRefundStatus(OrderStatus),
}
