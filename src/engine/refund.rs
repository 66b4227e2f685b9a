use tracing::{info, warn};

use super::{Engine, RefundError};
use crate::gateway::PaymentGateway;
use crate::ledger::LedgerStore;
use crate::model::{Order, OrderId, OrderStatus, PaymentStatus};

impl<L: LedgerStore, G: PaymentGateway> Engine<L, G> {
    /// Refund one PAID order: provider first, then ledger.
    ///
    /// A provider failure leaves the ledger untouched so the call can simply
    /// be retried.
    pub async fn refund_order(&self, order_id: OrderId) -> Result<Order, RefundError> {
        self.refund_with_outcome(order_id, OrderStatus::Refunded).await
    }

    /// Refund `order_id` and move it to `outcome` (REFUNDED or CANCELLED).
    pub(super) async fn refund_with_outcome(
        &self,
        order_id: OrderId,
        outcome: OrderStatus,
    ) -> Result<Order, RefundError> {
        let result = self.apply_refund(order_id, outcome).await;
        match &result {
            Ok(order) => info!(
                order = %order_id,
                offer = %order.offer_id,
                amount = %order.amount,
                status = %order.status,
                "order refunded"
            ),
            Err(e) => warn!(order = %order_id, reason = %e, "refund failed"),
        }
        result
    }

    async fn apply_refund(
        &self,
        order_id: OrderId,
        outcome: OrderStatus,
    ) -> Result<Order, RefundError> {
        let order = self
            .ledger
            .order(order_id)
            .await?
            .ok_or(RefundError::OrderNotFound(order_id))?;
        if order.status != OrderStatus::Paid {
            return Err(RefundError::OrderNotRefundable(
                order_id,
                format!("order is {}", order.status),
            ));
        }

        let payment = self
            .ledger
            .payment_for_order(order_id)
            .await?
            .ok_or_else(|| RefundError::OrderNotRefundable(order_id, "no payment".to_string()))?;
        if payment.status != PaymentStatus::Succeeded {
            return Err(RefundError::OrderNotRefundable(
                order_id,
                format!("payment is {}", payment.status),
            ));
        }

        self.provider_refund(&payment.provider_payment_intent_id)
            .await?;

        Ok(self.ledger.refund_order(order_id, outcome).await?)
    }
}
