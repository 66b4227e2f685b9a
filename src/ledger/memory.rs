use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

use super::{LedgerError, LedgerStore};
use crate::model::{
    CreatorReward, Offer, OfferId, OfferStatus, Order, OrderId, OrderStatus, Payment,
    PaymentStatus, Payout, PayoutId, ReconciliationFlag, UserId,
};

#[derive(Debug, Default)]
struct LedgerState {
    offers: HashMap<OfferId, Offer>,
    orders: HashMap<OrderId, Order>,
    /// Payments keyed by their order (1:1).
    payments: HashMap<OrderId, Payment>,
    /// Unique index on `provider_payment_intent_id`.
    intents: HashMap<String, OrderId>,
    payouts: HashMap<OfferId, Payout>,
    rewards: HashMap<PayoutId, CreatorReward>,
    /// Settlement claims held, with the time they were taken.
    claims: HashMap<OfferId, DateTime<Utc>>,
    flags: Vec<ReconciliationFlag>,
}

impl LedgerState {
    fn offer(&self, offer_id: OfferId) -> Result<&Offer, LedgerError> {
        self.offers
            .get(&offer_id)
            .ok_or(LedgerError::OfferNotFound(offer_id))
    }

    /// Offer ready to be closed by the claim holder.
    fn claimed_offer(&mut self, offer_id: OfferId) -> Result<&mut Offer, LedgerError> {
        if !self.claims.contains_key(&offer_id) {
            return Err(LedgerError::ClaimNotHeld(offer_id));
        }
        let offer = self
            .offers
            .get_mut(&offer_id)
            .ok_or(LedgerError::OfferNotFound(offer_id))?;
        if offer.status != OfferStatus::Active {
            return Err(LedgerError::OfferNotActive(offer_id, offer.status));
        }
        Ok(offer)
    }

    fn sorted_orders<'a>(orders: impl Iterator<Item = &'a Order>) -> Vec<Order> {
        let mut orders: Vec<Order> = orders.cloned().collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        orders
    }
}

/// Ledger held in process memory.
///
/// A single lock guards the whole state, so each trait method runs as one
/// serializable transaction.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedger {
    async fn insert_offer(&self, offer: Offer) -> Result<(), LedgerError> {
        let mut state = self.state.lock().await;
        if state.offers.contains_key(&offer.id) {
            return Err(LedgerError::DuplicateOffer(offer.id));
        }
        state.offers.insert(offer.id, offer);
        Ok(())
    }

    async fn offer(&self, offer_id: OfferId) -> Result<Option<Offer>, LedgerError> {
        Ok(self.state.lock().await.offers.get(&offer_id).cloned())
    }

    async fn order(&self, order_id: OrderId) -> Result<Option<Order>, LedgerError> {
        Ok(self.state.lock().await.orders.get(&order_id).cloned())
    }

    async fn payment_for_order(&self, order_id: OrderId) -> Result<Option<Payment>, LedgerError> {
        Ok(self.state.lock().await.payments.get(&order_id).cloned())
    }

    async fn order_by_intent(&self, intent_id: &str) -> Result<Option<Order>, LedgerError> {
        let state = self.state.lock().await;
        Ok(state
            .intents
            .get(intent_id)
            .and_then(|order_id| state.orders.get(order_id))
            .cloned())
    }

    async fn paid_order_for_user(
        &self,
        offer_id: OfferId,
        user_id: &UserId,
    ) -> Result<Option<Order>, LedgerError> {
        let state = self.state.lock().await;
        Ok(state
            .orders
            .values()
            .find(|order| {
                order.offer_id == offer_id
                    && &order.user_id == user_id
                    && order.status == OrderStatus::Paid
            })
            .cloned())
    }

    async fn orders_for_offer(&self, offer_id: OfferId) -> Result<Vec<Order>, LedgerError> {
        let state = self.state.lock().await;
        Ok(LedgerState::sorted_orders(
            state.orders.values().filter(|order| order.offer_id == offer_id),
        ))
    }

    async fn insert_paid_order(&self, order: Order, payment: Payment) -> Result<(), LedgerError> {
        let mut state = self.state.lock().await;

        if let Some(existing) = state.intents.get(&payment.provider_payment_intent_id) {
            return Err(LedgerError::DuplicateIntent {
                intent: payment.provider_payment_intent_id.clone(),
                order: *existing,
            });
        }

        let offer = state.offer(order.offer_id)?;
        if offer.status != OfferStatus::Active {
            return Err(LedgerError::OfferNotActive(offer.id, offer.status));
        }
        if state.claims.contains_key(&order.offer_id) {
            return Err(LedgerError::SettlementInProgress(order.offer_id));
        }

        state
            .intents
            .insert(payment.provider_payment_intent_id.clone(), order.id);
        state.payments.insert(order.id, payment);
        state.orders.insert(order.id, order);
        Ok(())
    }

    async fn claim_settlement(
        &self,
        offer_id: OfferId,
        claimed_at: DateTime<Utc>,
    ) -> Result<Offer, LedgerError> {
        let mut state = self.state.lock().await;

        let offer = state.offer(offer_id)?.clone();
        if offer.status != OfferStatus::Active {
            return Err(LedgerError::OfferNotActive(offer_id, offer.status));
        }
        if state.claims.contains_key(&offer_id) {
            return Err(LedgerError::SettlementInProgress(offer_id));
        }

        state.claims.insert(offer_id, claimed_at);
        Ok(offer)
    }

    async fn release_settlement_claim(&self, offer_id: OfferId) -> Result<(), LedgerError> {
        self.state
            .lock()
            .await
            .claims
            .remove(&offer_id)
            .map(|_| ())
            .ok_or(LedgerError::ClaimNotHeld(offer_id))
    }

    async fn close_offer_successful(
        &self,
        offer_id: OfferId,
        closed_at: DateTime<Utc>,
        payout: Payout,
        reward: CreatorReward,
    ) -> Result<(), LedgerError> {
        let mut state = self.state.lock().await;

        state.claimed_offer(offer_id)?;
        if state.payouts.contains_key(&offer_id) {
            return Err(LedgerError::PayoutExists(offer_id));
        }

        let offer = state.claimed_offer(offer_id)?;
        offer.status = OfferStatus::Successful;
        offer.closed_at = Some(closed_at);

        state.rewards.insert(payout.id, reward);
        state.payouts.insert(offer_id, payout);
        state.claims.remove(&offer_id);
        Ok(())
    }

    async fn close_offer_failed(
        &self,
        offer_id: OfferId,
        closed_at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        let mut state = self.state.lock().await;

        let offer = state.claimed_offer(offer_id)?;
        offer.status = OfferStatus::Failed;
        offer.closed_at = Some(closed_at);

        state.claims.remove(&offer_id);
        Ok(())
    }

    async fn refund_order(
        &self,
        order_id: OrderId,
        outcome: OrderStatus,
    ) -> Result<Order, LedgerError> {
        if outcome == OrderStatus::Paid {
            return Err(LedgerError::InvalidRefundStatus(outcome));
        }

        let mut state = self.state.lock().await;

        let order = state
            .orders
            .get(&order_id)
            .ok_or(LedgerError::OrderNotFound(order_id))?;
        if order.status != OrderStatus::Paid {
            return Err(LedgerError::OrderNotPaid(order_id, order.status));
        }
        let payment = state
            .payments
            .get(&order_id)
            .ok_or(LedgerError::PaymentNotFound(order_id))?;
        if payment.status != PaymentStatus::Succeeded {
            return Err(LedgerError::PaymentNotSucceeded(order_id, payment.status));
        }

        if let Some(payment) = state.payments.get_mut(&order_id) {
            payment.status = PaymentStatus::Refunded;
        }
        let order = state
            .orders
            .get_mut(&order_id)
            .ok_or(LedgerError::OrderNotFound(order_id))?;
        order.status = outcome;
        Ok(order.clone())
    }

    async fn payout_for_offer(&self, offer_id: OfferId) -> Result<Option<Payout>, LedgerError> {
        Ok(self.state.lock().await.payouts.get(&offer_id).cloned())
    }

    async fn reward_for_payout(
        &self,
        payout_id: PayoutId,
    ) -> Result<Option<CreatorReward>, LedgerError> {
        Ok(self.state.lock().await.rewards.get(&payout_id).cloned())
    }

    async fn flag_for_reconciliation(&self, flag: ReconciliationFlag) -> Result<bool, LedgerError> {
        let mut state = self.state.lock().await;
        let exists = state.flags.iter().any(|f| {
            f.offer_id == flag.offer_id
                && f.order_id == flag.order_id
                && f.provider_payment_intent_id == flag.provider_payment_intent_id
                && f.reason == flag.reason
        });
        if exists {
            return Ok(false);
        }
        state.flags.push(flag);
        Ok(true)
    }

    async fn reconciliation_flags(&self) -> Result<Vec<ReconciliationFlag>, LedgerError> {
        Ok(self.state.lock().await.flags.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Amount;
    use crate::model::PayoutStatus;
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn offer() -> Offer {
        Offer {
            id: Uuid::new_v4(),
            campaign_id: "campaign".to_string(),
            brand_id: "brand".to_string(),
            creator_user_id: "creator".to_string(),
            price: Amount::from_minor(2500),
            currency: "usd".to_string(),
            goal_quantity: 2,
            deadline: now() + Duration::days(7),
            status: OfferStatus::Active,
            closed_at: None,
        }
    }

    fn paid(offer_id: OfferId, user: &str, intent: &str) -> (Order, Payment) {
        let order = Order {
            id: Uuid::new_v4(),
            offer_id,
            user_id: user.to_string(),
            amount: Amount::from_minor(2500),
            currency: "usd".to_string(),
            status: OrderStatus::Paid,
            shipping: None,
            created_at: now(),
        };
        let payment = Payment {
            id: Uuid::new_v4(),
            order_id: order.id,
            provider: "simulated".to_string(),
            provider_payment_intent_id: intent.to_string(),
            status: PaymentStatus::Succeeded,
            amount: order.amount,
            currency: order.currency.clone(),
        };
        (order, payment)
    }

    fn payout_for(offer: &Offer) -> (Payout, CreatorReward) {
        let payout = Payout {
            id: Uuid::new_v4(),
            offer_id: offer.id,
            brand_id: offer.brand_id.clone(),
            currency: offer.currency.clone(),
            gross_amount: Amount::from_minor(5000),
            platform_fee: Amount::from_minor(150),
            creator_share: Amount::from_minor(15),
            net_to_brand: Amount::from_minor(4850),
            status: PayoutStatus::Pending,
            created_at: now(),
        };
        let reward = CreatorReward {
            id: Uuid::new_v4(),
            campaign_id: offer.campaign_id.clone(),
            creator_user_id: offer.creator_user_id.clone(),
            payout_id: payout.id,
            amount: payout.creator_share,
            status: PayoutStatus::Pending,
        };
        (payout, reward)
    }

    #[tokio::test]
    async fn insert_and_lookup_by_intent() {
        let ledger = InMemoryLedger::new();
        let offer = offer();
        ledger.insert_offer(offer.clone()).await.unwrap();

        let (order, payment) = paid(offer.id, "alice", "pi_1");
        ledger.insert_paid_order(order.clone(), payment).await.unwrap();

        let found = ledger.order_by_intent("pi_1").await.unwrap().unwrap();
        assert_eq!(found.id, order.id);
        assert!(ledger.order_by_intent("pi_2").await.unwrap().is_none());
        assert_eq!(
            ledger.payment_for_order(order.id).await.unwrap().unwrap().status,
            PaymentStatus::Succeeded
        );
    }

    #[tokio::test]
    async fn duplicate_intent_is_rejected_without_writing() {
        let ledger = InMemoryLedger::new();
        let offer = offer();
        ledger.insert_offer(offer.clone()).await.unwrap();

        let (first, payment) = paid(offer.id, "alice", "pi_1");
        ledger.insert_paid_order(first.clone(), payment).await.unwrap();

        let (second, payment) = paid(offer.id, "alice", "pi_1");
        let result = ledger.insert_paid_order(second.clone(), payment).await;
        assert_eq!(
            result,
            Err(LedgerError::DuplicateIntent {
                intent: "pi_1".to_string(),
                order: first.id
            })
        );
        assert!(ledger.order(second.id).await.unwrap().is_none());
        assert_eq!(ledger.orders_for_offer(offer.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn claim_is_exclusive_and_blocks_inserts() {
        let ledger = InMemoryLedger::new();
        let offer = offer();
        ledger.insert_offer(offer.clone()).await.unwrap();

        ledger.claim_settlement(offer.id, now()).await.unwrap();
        assert_eq!(
            ledger.claim_settlement(offer.id, now()).await,
            Err(LedgerError::SettlementInProgress(offer.id))
        );

        let (order, payment) = paid(offer.id, "alice", "pi_1");
        assert_eq!(
            ledger.insert_paid_order(order, payment).await,
            Err(LedgerError::SettlementInProgress(offer.id))
        );

        ledger.release_settlement_claim(offer.id).await.unwrap();
        ledger.claim_settlement(offer.id, now()).await.unwrap();
    }

    #[tokio::test]
    async fn successful_close_writes_offer_payout_and_reward() {
        let ledger = InMemoryLedger::new();
        let offer = offer();
        ledger.insert_offer(offer.clone()).await.unwrap();
        let (payout, reward) = payout_for(&offer);

        ledger.claim_settlement(offer.id, now()).await.unwrap();
        ledger
            .close_offer_successful(offer.id, now(), payout.clone(), reward.clone())
            .await
            .unwrap();

        let stored = ledger.offer(offer.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OfferStatus::Successful);
        assert_eq!(stored.closed_at, Some(now()));
        assert_eq!(ledger.payout_for_offer(offer.id).await.unwrap(), Some(payout.clone()));
        assert_eq!(ledger.reward_for_payout(payout.id).await.unwrap(), Some(reward));

        // claim released, offer closed
        assert_eq!(
            ledger.claim_settlement(offer.id, now()).await,
            Err(LedgerError::OfferNotActive(offer.id, OfferStatus::Successful))
        );
    }

    #[tokio::test]
    async fn close_requires_claim() {
        let ledger = InMemoryLedger::new();
        let offer = offer();
        ledger.insert_offer(offer.clone()).await.unwrap();
        let (payout, reward) = payout_for(&offer);

        assert_eq!(
            ledger.close_offer_successful(offer.id, now(), payout, reward).await,
            Err(LedgerError::ClaimNotHeld(offer.id))
        );
        assert_eq!(
            ledger.close_offer_failed(offer.id, now()).await,
            Err(LedgerError::ClaimNotHeld(offer.id))
        );
        assert!(ledger.payout_for_offer(offer.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn closed_offer_refuses_orders() {
        let ledger = InMemoryLedger::new();
        let offer = offer();
        ledger.insert_offer(offer.clone()).await.unwrap();
        ledger.claim_settlement(offer.id, now()).await.unwrap();
        ledger.close_offer_failed(offer.id, now()).await.unwrap();

        let (order, payment) = paid(offer.id, "alice", "pi_late");
        assert_eq!(
            ledger.insert_paid_order(order, payment).await,
            Err(LedgerError::OfferNotActive(offer.id, OfferStatus::Failed))
        );
    }

    #[tokio::test]
    async fn refund_moves_order_and_payment_together() {
        let ledger = InMemoryLedger::new();
        let offer = offer();
        ledger.insert_offer(offer.clone()).await.unwrap();
        let (order, payment) = paid(offer.id, "alice", "pi_1");
        ledger.insert_paid_order(order.clone(), payment).await.unwrap();

        let refunded = ledger
            .refund_order(order.id, OrderStatus::Cancelled)
            .await
            .unwrap();
        assert_eq!(refunded.status, OrderStatus::Cancelled);
        assert_eq!(
            ledger.payment_for_order(order.id).await.unwrap().unwrap().status,
            PaymentStatus::Refunded
        );
        assert!(ledger.paid_orders(offer.id).await.unwrap().is_empty());

        assert_eq!(
            ledger.refund_order(order.id, OrderStatus::Refunded).await,
            Err(LedgerError::OrderNotPaid(order.id, OrderStatus::Cancelled))
        );
    }

    #[tokio::test]
    async fn repeated_flags_are_stored_once() {
        let ledger = InMemoryLedger::new();
        let flag = ReconciliationFlag {
            id: Uuid::new_v4(),
            offer_id: Uuid::new_v4(),
            order_id: None,
            provider_payment_intent_id: Some("pi_late".to_string()),
            reason: crate::model::ReconciliationReason::LateConfirmation,
            detail: "offer closed".to_string(),
            flagged_at: now(),
        };

        assert!(ledger.flag_for_reconciliation(flag.clone()).await.unwrap());
        let again = ReconciliationFlag {
            id: Uuid::new_v4(),
            ..flag
        };
        assert!(!ledger.flag_for_reconciliation(again).await.unwrap());
        assert_eq!(ledger.reconciliation_flags().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn refund_to_paid_is_rejected() {
        let ledger = InMemoryLedger::new();
        assert_eq!(
            ledger.refund_order(Uuid::new_v4(), OrderStatus::Paid).await,
            Err(LedgerError::InvalidRefundStatus(OrderStatus::Paid))
        );
    }
}
