//! Offer settlement engine.
//!
//! The engine drives an offer from checkout to its financial outcome:
//! checkout creates provider intents, confirmations turn succeeded intents
//! into paid orders, settlement decides success (payout) or failure (refund
//! every paid order) once the deadline passed, and buyers may cancel before
//! the cutoff. The ledger is the only shared state; every operation is an
//! independent unit of work against it.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::gateway::{GatewayError, PaymentGateway};
use crate::ledger::{LedgerError, LedgerStore};
use crate::model::{
    CreatorReward, Offer, OfferId, OrderId, OrderStatus, Payout, ReconciliationFlag,
    ReconciliationReason,
};
use crate::Amount;

mod cancellation;
mod checkout;
mod confirmation;
mod refund;
mod settlement;

#[cfg(test)]
mod testing;

mod error;
pub use error::{
    CancellationError, CheckoutError, ConfirmationError, EngineError, RefundError,
    SettlementError,
};

pub use checkout::CheckoutSession;
pub use confirmation::Confirmation;
pub use settlement::{RefundFailure, RefundReport, SettlementOutcome};

/// The settlement engine.
pub struct Engine<L, G> {
    ledger: Arc<L>,
    gateway: Arc<G>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

/// Read-only view of an offer for reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferSummary {
    pub offer: Offer,
    pub paid_orders: usize,
    pub paid_gross: Amount,
    pub refunded_orders: usize,
    pub cancelled_orders: usize,
    pub payout: Option<Payout>,
    pub reward: Option<CreatorReward>,
}

/// Public API
impl<L: LedgerStore, G: PaymentGateway> Engine<L, G> {
    pub fn new(ledger: Arc<L>, gateway: Arc<G>, clock: Arc<dyn Clock>, config: EngineConfig) -> Self {
        Self {
            ledger,
            gateway,
            clock,
            config,
        }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Offer status, order counts and payout, straight from the ledger.
    pub async fn offer_summary(&self, offer_id: OfferId) -> Result<Option<OfferSummary>, LedgerError> {
        let Some(offer) = self.ledger.offer(offer_id).await? else {
            return Ok(None);
        };

        let orders = self.ledger.orders_for_offer(offer_id).await?;
        let count = |status: OrderStatus| orders.iter().filter(|o| o.status == status).count();
        let paid_gross: Amount = orders
            .iter()
            .filter(|o| o.status == OrderStatus::Paid)
            .map(|o| o.amount)
            .sum();

        let payout = self.ledger.payout_for_offer(offer_id).await?;
        let reward = match &payout {
            Some(payout) => self.ledger.reward_for_payout(payout.id).await?,
            None => None,
        };

        Ok(Some(OfferSummary {
            paid_orders: count(OrderStatus::Paid),
            refunded_orders: count(OrderStatus::Refunded),
            cancelled_orders: count(OrderStatus::Cancelled),
            paid_gross,
            offer,
            payout,
            reward,
        }))
    }

    pub async fn reconciliation_flags(&self) -> Result<Vec<ReconciliationFlag>, LedgerError> {
        self.ledger.reconciliation_flags().await
    }
}

/// Private API
impl<L: LedgerStore, G: PaymentGateway> Engine<L, G> {
    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Refund a charge at the provider, retrying transient failures.
    ///
    /// An intent the provider already refunded counts as refunded, so a retry
    /// after a crash between provider call and ledger write completes cleanly.
    async fn provider_refund(&self, intent_id: &str) -> Result<(), GatewayError> {
        let gateway = &*self.gateway;
        match self
            .config
            .retry
            .run("refund", move || gateway.refund(intent_id))
            .await
        {
            Err(GatewayError::AlreadyRefunded(_)) => {
                warn!(intent = %intent_id, "intent already refunded at provider");
                Ok(())
            }
            other => other,
        }
    }

    /// Record a reconciliation flag. Failing to store it is logged, not returned.
    async fn flag(
        &self,
        offer_id: OfferId,
        order_id: Option<OrderId>,
        intent_id: Option<&str>,
        reason: ReconciliationReason,
        detail: String,
    ) -> ReconciliationFlag {
        let flag = ReconciliationFlag {
            id: Uuid::new_v4(),
            offer_id,
            order_id,
            provider_payment_intent_id: intent_id.map(str::to_string),
            reason,
            detail,
            flagged_at: self.now(),
        };

        error!(
            offer = %offer_id,
            order = ?order_id,
            intent = ?intent_id,
            reason = %reason,
            detail = %flag.detail,
            "flagged for reconciliation"
        );

        if let Err(e) = self.ledger.flag_for_reconciliation(flag.clone()).await {
            error!(offer = %offer_id, reason = %e, "failed to store reconciliation flag");
        }
        flag
    }
}
