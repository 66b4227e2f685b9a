use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use super::{Engine, RefundError, SettlementError};
use crate::gateway::PaymentGateway;
use crate::ledger::{LedgerError, LedgerStore};
use crate::model::{
    CreatorReward, Offer, OfferId, Order, OrderId, OrderStatus, Payout, PayoutBreakdown, PayoutStatus,
    ReconciliationReason,
};
use crate::Amount;

/// How an offer closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementOutcome {
    Successful { payout: Payout, reward: CreatorReward },
    Failed(RefundReport),
}

impl SettlementOutcome {
    pub fn is_successful(&self) -> bool {
        matches!(self, SettlementOutcome::Successful { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementOutcome::Successful { .. } => "successful",
            SettlementOutcome::Failed(_) => "failed",
        }
    }
}

/// Per-order result of refunding a failed offer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefundReport {
    pub refunded: Vec<OrderId>,
    /// Orders that stopped being PAID between reading and refunding them.
    pub skipped: Vec<OrderId>,
    pub failed: Vec<RefundFailure>,
}

impl RefundReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundFailure {
    pub order_id: OrderId,
    pub reason: String,
}

enum Decision {
    Successful(SettlementOutcome),
    /// Closed as FAILED; these PAID orders still need refunds.
    Failed(Vec<Order>),
}

impl<L: LedgerStore, G: PaymentGateway> Engine<L, G> {
    /// Decide an offer once its deadline passed.
    ///
    /// Goal reached: the offer becomes SUCCESSFUL with its payout and creator
    /// reward. Otherwise it becomes FAILED and every PAID order is refunded;
    /// a refund failure is reported and flagged, it does not stop the batch.
    pub async fn settle_offer(
        &self,
        offer_id: OfferId,
    ) -> Result<SettlementOutcome, SettlementError> {
        let result = self.apply_settlement(offer_id).await;
        match &result {
            Ok(SettlementOutcome::Successful { payout, .. }) => info!(
                offer = %offer_id,
                gross = %payout.gross_amount,
                fee = %payout.platform_fee,
                net = %payout.net_to_brand,
                "offer settled successful"
            ),
            Ok(SettlementOutcome::Failed(report)) => info!(
                offer = %offer_id,
                refunded = report.refunded.len(),
                skipped = report.skipped.len(),
                failed = report.failed.len(),
                "offer settled failed"
            ),
            Err(e) => warn!(offer = %offer_id, reason = %e, "settlement rejected"),
        }
        result
    }

    async fn apply_settlement(
        &self,
        offer_id: OfferId,
    ) -> Result<SettlementOutcome, SettlementError> {
        let now = self.now();
        let offer = self
            .ledger
            .offer(offer_id)
            .await?
            .ok_or(SettlementError::OfferNotFound(offer_id))?;
        if !offer.is_active() {
            return Err(SettlementError::OfferNotActive(offer_id, offer.status));
        }
        // checked before claiming: a held claim turns confirmations away
        if !offer.is_expired_at(now) {
            return Err(SettlementError::DeadlineNotReached(offer_id, offer.deadline));
        }

        let offer = self.ledger.claim_settlement(offer_id, now).await?;

        match self.close(&offer, now).await {
            Ok(Decision::Successful(outcome)) => Ok(outcome),
            Ok(Decision::Failed(paid_orders)) => Ok(SettlementOutcome::Failed(
                self.refund_all(&offer, paid_orders).await,
            )),
            Err(e) => {
                if let Err(release) = self.ledger.release_settlement_claim(offer_id).await {
                    warn!(offer = %offer_id, reason = %release, "failed to release settlement claim");
                }
                Err(e)
            }
        }
    }

    /// Close the claimed, expired offer as SUCCESSFUL or FAILED. Any error
    /// leaves the offer ACTIVE with the claim still held.
    async fn close(&self, offer: &Offer, now: DateTime<Utc>) -> Result<Decision, SettlementError> {
        let paid_orders = self.ledger.paid_orders(offer.id).await?;
        let paid = paid_orders.len() as u64;

        if paid < u64::from(offer.goal_quantity) {
            self.ledger.close_offer_failed(offer.id, now).await?;
            info!(
                offer = %offer.id,
                paid,
                goal = offer.goal_quantity,
                "goal missed, refunding orders"
            );
            return Ok(Decision::Failed(paid_orders));
        }

        let gross = Amount::checked_sum(paid_orders.iter().map(|order| order.amount))
            .ok_or(SettlementError::GrossOverflow(offer.id))?;
        let breakdown = PayoutBreakdown::compute(
            gross,
            self.config.platform_fee_rate,
            self.config.creator_share_rate,
        );

        let payout = Payout {
            id: Uuid::new_v4(),
            offer_id: offer.id,
            brand_id: offer.brand_id.clone(),
            currency: offer.currency.clone(),
            gross_amount: breakdown.gross_amount,
            platform_fee: breakdown.platform_fee,
            creator_share: breakdown.creator_share,
            net_to_brand: breakdown.net_to_brand,
            status: PayoutStatus::Pending,
            created_at: now,
        };
        let reward = CreatorReward {
            id: Uuid::new_v4(),
            campaign_id: offer.campaign_id.clone(),
            creator_user_id: offer.creator_user_id.clone(),
            payout_id: payout.id,
            amount: breakdown.creator_share,
            status: PayoutStatus::Pending,
        };

        self.ledger
            .close_offer_successful(offer.id, now, payout.clone(), reward.clone())
            .await?;
        Ok(Decision::Successful(SettlementOutcome::Successful {
            payout,
            reward,
        }))
    }

    async fn refund_all(&self, offer: &Offer, orders: Vec<Order>) -> RefundReport {
        let mut report = RefundReport::default();

        for order in orders {
            match self
                .refund_with_outcome(order.id, OrderStatus::Refunded)
                .await
            {
                Ok(_) => report.refunded.push(order.id),
                // refunded or cancelled elsewhere, before our read or after the provider call
                Err(
                    RefundError::OrderNotRefundable(..)
                    | RefundError::Ledger(LedgerError::OrderNotPaid(..)),
                ) => report.skipped.push(order.id),
                Err(e) => {
                    let intent = self
                        .ledger
                        .payment_for_order(order.id)
                        .await
                        .ok()
                        .flatten()
                        .map(|payment| payment.provider_payment_intent_id);
                    self.flag(
                        offer.id,
                        Some(order.id),
                        intent.as_deref(),
                        ReconciliationReason::RefundFailed,
                        e.to_string(),
                    )
                    .await;
                    report.failed.push(RefundFailure {
                        order_id: order.id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        report
    }
}
