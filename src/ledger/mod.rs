//! Ledger store.
//!
//! Every method is one transaction: paired writes (order + payment, offer +
//! payout + reward, order + payment refund) either land together or not at all.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::model::{
    CreatorReward, Offer, OfferId, Order, OrderId, OrderStatus, Payment, Payout, PayoutId,
    ReconciliationFlag, UserId,
};

mod error;
pub use error::LedgerError;

mod memory;
pub use memory::InMemoryLedger;

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn insert_offer(&self, offer: Offer) -> Result<(), LedgerError>;

    async fn offer(&self, offer_id: OfferId) -> Result<Option<Offer>, LedgerError>;

    async fn order(&self, order_id: OrderId) -> Result<Option<Order>, LedgerError>;

    async fn payment_for_order(&self, order_id: OrderId) -> Result<Option<Payment>, LedgerError>;

    /// Order whose payment carries `intent_id`, if any.
    async fn order_by_intent(&self, intent_id: &str) -> Result<Option<Order>, LedgerError>;

    /// The user's PAID order on the offer, if any.
    async fn paid_order_for_user(
        &self,
        offer_id: OfferId,
        user_id: &UserId,
    ) -> Result<Option<Order>, LedgerError>;

    /// All orders of an offer, oldest first.
    async fn orders_for_offer(&self, offer_id: OfferId) -> Result<Vec<Order>, LedgerError>;

    /// PAID orders of an offer, oldest first.
    async fn paid_orders(&self, offer_id: OfferId) -> Result<Vec<Order>, LedgerError> {
        let mut orders = self.orders_for_offer(offer_id).await?;
        orders.retain(|order| order.status == OrderStatus::Paid);
        Ok(orders)
    }

    /// Insert a PAID order with its SUCCEEDED payment.
    ///
    /// Fails with [`LedgerError::DuplicateIntent`] if the payment intent is
    /// already recorded, and refuses offers that are closed or being settled.
    async fn insert_paid_order(&self, order: Order, payment: Payment) -> Result<(), LedgerError>;

    /// Take the exclusive settlement claim for an ACTIVE offer.
    ///
    /// While the claim is held no order can be inserted for the offer and no
    /// other claim can be taken.
    async fn claim_settlement(
        &self,
        offer_id: OfferId,
        claimed_at: DateTime<Utc>,
    ) -> Result<Offer, LedgerError>;

    async fn release_settlement_claim(&self, offer_id: OfferId) -> Result<(), LedgerError>;

    /// Close a claimed offer as SUCCESSFUL and record its payout and reward.
    /// Releases the claim.
    async fn close_offer_successful(
        &self,
        offer_id: OfferId,
        closed_at: DateTime<Utc>,
        payout: Payout,
        reward: CreatorReward,
    ) -> Result<(), LedgerError>;

    /// Close a claimed offer as FAILED. Releases the claim.
    async fn close_offer_failed(
        &self,
        offer_id: OfferId,
        closed_at: DateTime<Utc>,
    ) -> Result<(), LedgerError>;

    /// Move a PAID order to `outcome` (REFUNDED or CANCELLED) and its payment to REFUNDED.
    async fn refund_order(&self, order_id: OrderId, outcome: OrderStatus)
    -> Result<Order, LedgerError>;

    async fn payout_for_offer(&self, offer_id: OfferId) -> Result<Option<Payout>, LedgerError>;

    async fn reward_for_payout(
        &self,
        payout_id: PayoutId,
    ) -> Result<Option<CreatorReward>, LedgerError>;

    /// Record a flag. Returns `false` when a flag with the same offer, order,
    /// intent and reason already exists.
    async fn flag_for_reconciliation(&self, flag: ReconciliationFlag) -> Result<bool, LedgerError>;

    async fn reconciliation_flags(&self) -> Result<Vec<ReconciliationFlag>, LedgerError>;
}
