use tracing::{error, info};
use uuid::Uuid;

use super::{ConfirmationError, Engine};
use crate::config::LateConfirmationPolicy;
use crate::gateway::{IntentStatus, PaymentGateway, RetrievedIntent};
use crate::ledger::{LedgerError, LedgerStore};
use crate::model::{
    Offer, Order, OrderStatus, Payment, PaymentStatus, ReconciliationFlag, ReconciliationReason,
};

/// Result of handling a payment confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    /// A new PAID order was recorded.
    Recorded(Order),
    /// The intent was already recorded; nothing changed.
    AlreadyRecorded(Order),
    /// The offer had closed; the charge is kept and flagged.
    LateRejected(ReconciliationFlag),
    /// The offer had closed; the charge was refunded and flagged.
    LateRefunded(ReconciliationFlag),
}

impl<L: LedgerStore, G: PaymentGateway> Engine<L, G> {
    /// Handle a provider confirmation for `intent_id`.
    ///
    /// Safe under at-least-once and concurrent delivery: a given intent yields
    /// at most one order, however often it is confirmed.
    pub async fn on_payment_confirmed(
        &self,
        intent_id: &str,
    ) -> Result<Confirmation, ConfirmationError> {
        let result = self.apply_confirmation(intent_id).await;
        match &result {
            Ok(Confirmation::Recorded(order)) => info!(
                intent = intent_id,
                offer = %order.offer_id,
                order = %order.id,
                amount = %order.amount,
                "payment recorded"
            ),
            Ok(Confirmation::AlreadyRecorded(order)) => info!(
                intent = intent_id,
                order = %order.id,
                "duplicate confirmation ignored"
            ),
            Ok(Confirmation::LateRejected(_) | Confirmation::LateRefunded(_)) => info!(
                intent = intent_id,
                "late confirmation handled"
            ),
            Err(ConfirmationError::IntentNotSucceeded(_, status)) => error!(
                intent = intent_id,
                status = %status,
                "confirmation for an intent that did not succeed"
            ),
            Err(e) => error!(intent = intent_id, reason = %e, "confirmation failed"),
        }
        result
    }

    /// - Retrieve the intent and require it succeeded
    /// - Return the existing order if the intent is already recorded
    /// - Apply the late policy if the offer is no longer open
    /// - Insert order and payment in one transaction
    async fn apply_confirmation(&self, intent_id: &str) -> Result<Confirmation, ConfirmationError> {
        let gateway = &*self.gateway;
        let intent = self
            .config
            .retry
            .run("retrieve_intent", move || gateway.retrieve_intent(intent_id))
            .await?;

        if intent.status != IntentStatus::Succeeded {
            return Err(ConfirmationError::IntentNotSucceeded(
                intent_id.to_string(),
                intent.status,
            ));
        }

        if let Some(order) = self.ledger.order_by_intent(intent_id).await? {
            return Ok(Confirmation::AlreadyRecorded(order));
        }

        let offer_id = intent.metadata.offer_id;
        let offer = self
            .ledger
            .offer(offer_id)
            .await?
            .ok_or(ConfirmationError::OfferNotFound(offer_id))?;

        if !offer.is_active() {
            return self.late_confirmation(&offer, &intent).await;
        }

        self.check_amount(&offer, &intent).await?;

        let now = self.now();
        let order = Order {
            id: Uuid::new_v4(),
            offer_id,
            user_id: intent.metadata.user_id.clone(),
            amount: offer.price,
            currency: offer.currency.clone(),
            status: OrderStatus::Paid,
            shipping: intent.metadata.shipping.clone(),
            created_at: now,
        };
        let payment = Payment {
            id: Uuid::new_v4(),
            order_id: order.id,
            provider: self.gateway.provider().to_string(),
            provider_payment_intent_id: intent_id.to_string(),
            status: PaymentStatus::Succeeded,
            amount: order.amount,
            currency: order.currency.clone(),
        };

        match self.ledger.insert_paid_order(order.clone(), payment).await {
            Ok(()) => Ok(Confirmation::Recorded(order)),
            // Lost a race with a concurrent delivery of the same intent
            Err(LedgerError::DuplicateIntent { order: existing, .. }) => {
                let existing = self
                    .ledger
                    .order(existing)
                    .await?
                    .ok_or(LedgerError::OrderNotFound(existing))?;
                Ok(Confirmation::AlreadyRecorded(existing))
            }
            // Offer closed or started settling since we read it
            Err(LedgerError::OfferNotActive(..) | LedgerError::SettlementInProgress(_)) => {
                self.late_confirmation(&offer, &intent).await
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn check_amount(
        &self,
        offer: &Offer,
        intent: &RetrievedIntent,
    ) -> Result<(), ConfirmationError> {
        let expected_minor = offer.price.to_minor();
        if expected_minor == Some(intent.amount_minor)
            && intent.currency.eq_ignore_ascii_case(&offer.currency)
        {
            return Ok(());
        }

        let charged = format!("{} {} minor units", intent.amount_minor, intent.currency);
        let expected = format!("{} {}", offer.price, offer.currency);
        self.flag(
            offer.id,
            None,
            Some(intent.intent_id.as_str()),
            ReconciliationReason::AmountMismatch,
            format!("charged {charged}, expected {expected}"),
        )
        .await;

        Err(ConfirmationError::AmountMismatch {
            intent: intent.intent_id.clone(),
            charged,
            expected,
        })
    }

    /// A succeeded payment for an offer that no longer takes orders.
    async fn late_confirmation(
        &self,
        offer: &Offer,
        intent: &RetrievedIntent,
    ) -> Result<Confirmation, ConfirmationError> {
        let intent_id = intent.intent_id.as_str();
        match self.config.late_confirmation {
            LateConfirmationPolicy::RejectAndFlag => {
                let flag = self
                    .flag(
                        offer.id,
                        None,
                        Some(intent_id),
                        ReconciliationReason::LateConfirmation,
                        format!("payment confirmed after offer stopped taking orders ({})", offer.status),
                    )
                    .await;
                Ok(Confirmation::LateRejected(flag))
            }
            LateConfirmationPolicy::RefundAndFlag => {
                if let Err(e) = self.provider_refund(intent_id).await {
                    self.flag(
                        offer.id,
                        None,
                        Some(intent_id),
                        ReconciliationReason::LateConfirmation,
                        format!("late payment could not be refunded: {e}"),
                    )
                    .await;
                    return Err(e.into());
                }
                let flag = self
                    .flag(
                        offer.id,
                        None,
                        Some(intent_id),
                        ReconciliationReason::LateConfirmationRefunded,
                        format!("payment confirmed after offer stopped taking orders ({}), refunded", offer.status),
                    )
                    .await;
                Ok(Confirmation::LateRefunded(flag))
            }
        }
    }
}
