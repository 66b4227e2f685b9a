use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::{CancellationError, Engine};
use crate::gateway::PaymentGateway;
use crate::ledger::LedgerStore;
use crate::model::{Order, OrderId, OrderStatus};

impl<L: LedgerStore, G: PaymentGateway> Engine<L, G> {
    /// Cancel a PAID order on its owner's request and refund it.
    ///
    /// Allowed up to and including `deadline - cancellation_cutoff`, and only
    /// while the offer is ACTIVE.
    pub async fn cancel_order(
        &self,
        order_id: OrderId,
        user_id: &str,
    ) -> Result<Order, CancellationError> {
        let result = self.apply_cancellation(order_id, user_id).await;
        match &result {
            Ok(order) => info!(
                order = %order_id,
                offer = %order.offer_id,
                user = user_id,
                "order cancelled"
            ),
            Err(e) => warn!(order = %order_id, user = user_id, reason = %e, "cancellation rejected"),
        }
        result
    }

    async fn apply_cancellation(
        &self,
        order_id: OrderId,
        user_id: &str,
    ) -> Result<Order, CancellationError> {
        let order = self
            .ledger
            .order(order_id)
            .await?
            .ok_or(CancellationError::OrderNotFound(order_id))?;

        if order.user_id != user_id {
            return Err(CancellationError::Unauthorized(order_id, user_id.to_string()));
        }
        if order.status != OrderStatus::Paid {
            return Err(CancellationError::OrderNotCancellable(order_id, order.status));
        }

        let offer = self
            .ledger
            .offer(order.offer_id)
            .await?
            .ok_or(CancellationError::OfferNotFound(order.offer_id))?;

        if !offer.is_active() {
            return Err(CancellationError::OfferNotActive(offer.id, offer.status));
        }

        // a cutoff reaching past the calendar closes the window for good
        let cutoff = offer
            .deadline
            .checked_sub_signed(self.config.cancellation_cutoff)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        if self.now() > cutoff {
            return Err(CancellationError::WindowClosed(order_id, cutoff));
        }

        Ok(self
            .refund_with_outcome(order_id, OrderStatus::Cancelled)
            .await?)
    }
}
