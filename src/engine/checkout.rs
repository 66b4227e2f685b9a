use tracing::{info, warn};

use super::{CheckoutError, Engine};
use crate::gateway::{IntentMetadata, PaymentGateway};
use crate::ledger::LedgerStore;
use crate::model::{OfferId, ShippingDetails};

/// What the buyer's client needs to complete payment with the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub client_secret: String,
    pub payment_intent_id: String,
}

impl<L: LedgerStore, G: PaymentGateway> Engine<L, G> {
    /// Start a checkout for `user_id` on an active, unexpired offer.
    ///
    /// No order is created here: orders only exist for confirmed payments
    /// (see [`Engine::on_payment_confirmed`]).
    pub async fn initiate_checkout(
        &self,
        offer_id: OfferId,
        user_id: &str,
        shipping: Option<ShippingDetails>,
    ) -> Result<CheckoutSession, CheckoutError> {
        let result = self.apply_checkout(offer_id, user_id, shipping).await;
        match &result {
            Ok(session) => info!(
                offer = %offer_id,
                user = user_id,
                intent = %session.payment_intent_id,
                "checkout started"
            ),
            Err(e) => warn!(
                offer = %offer_id,
                user = user_id,
                code = e.code(),
                reason = %e,
                "checkout rejected"
            ),
        }
        result
    }

    /// - Ensure the offer exists, has not expired and is still active
    /// - Ensure the user has no paid order on it yet
    /// - Create a provider intent carrying the full checkout context
    async fn apply_checkout(
        &self,
        offer_id: OfferId,
        user_id: &str,
        shipping: Option<ShippingDetails>,
    ) -> Result<CheckoutSession, CheckoutError> {
        let offer = self
            .ledger
            .offer(offer_id)
            .await?
            .ok_or(CheckoutError::OfferNotFound(offer_id))?;

        // Expiry wins over status: a late checkout is always "expired"
        if offer.is_expired_at(self.now()) {
            return Err(CheckoutError::OfferExpired(offer_id));
        }
        if !offer.is_active() {
            return Err(CheckoutError::OfferNotActive(offer_id, offer.status));
        }

        let user_id = user_id.to_string();
        if self
            .ledger
            .paid_order_for_user(offer_id, &user_id)
            .await?
            .is_some()
        {
            return Err(CheckoutError::AlreadyPurchased(offer_id, user_id));
        }

        let amount_minor = offer
            .price
            .to_minor()
            .filter(|minor| *minor > 0)
            .ok_or(CheckoutError::InvalidPrice(offer_id, offer.price))?;

        let metadata = IntentMetadata {
            offer_id,
            user_id,
            campaign_id: offer.campaign_id,
            brand_id: offer.brand_id,
            creator_user_id: offer.creator_user_id,
            shipping,
        };

        let gateway = &*self.gateway;
        let currency = offer.currency.as_str();
        let metadata = &metadata;
        let created = self
            .config
            .retry
            .run("create_intent", move || {
                gateway.create_intent(amount_minor, currency, metadata)
            })
            .await?;

        Ok(CheckoutSession {
            client_secret: created.client_secret,
            payment_intent_id: created.intent_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::Harness;
    use super::*;
    use crate::gateway::{GatewayError, IntentStatus};
    use chrono::Duration;

    #[tokio::test]
    async fn checkout_creates_intent_with_context_and_no_order() {
        let h = Harness::new();
        let offer = h.offer(3, "49.99").await;
        let shipping = ShippingDetails {
            name: "Alice".to_string(),
            address: "1 Main St".to_string(),
        };

        let session = h
            .engine
            .initiate_checkout(offer.id, "alice", Some(shipping.clone()))
            .await
            .unwrap();
        assert!(session.client_secret.starts_with(&session.payment_intent_id));

        let intent = h
            .gateway
            .retrieve_intent(&session.payment_intent_id)
            .await
            .unwrap();
        assert_eq!(intent.status, IntentStatus::RequiresPayment);
        assert_eq!(intent.amount_minor, 4999);
        assert_eq!(intent.metadata.offer_id, offer.id);
        assert_eq!(intent.metadata.user_id, "alice");
        assert_eq!(intent.metadata.brand_id, offer.brand_id);
        assert_eq!(intent.metadata.campaign_id, offer.campaign_id);
        assert_eq!(intent.metadata.creator_user_id, offer.creator_user_id);
        assert_eq!(intent.metadata.shipping, Some(shipping));

        assert!(h.ledger.orders_for_offer(offer.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_offer() {
        let h = Harness::new();
        let missing = uuid::Uuid::new_v4();
        let result = h.engine.initiate_checkout(missing, "alice", None).await;
        assert!(matches!(result, Err(CheckoutError::OfferNotFound(id)) if id == missing));
    }

    #[tokio::test]
    async fn checkout_at_deadline_is_expired() {
        let h = Harness::new();
        let offer = h.offer(3, "10").await;
        h.clock.set(offer.deadline);

        let result = h.engine.initiate_checkout(offer.id, "alice", None).await;
        assert!(matches!(result, Err(CheckoutError::OfferExpired(_))));
    }

    #[tokio::test]
    async fn checkout_just_before_deadline_is_accepted() {
        let h = Harness::new();
        let offer = h.offer(3, "10").await;
        h.clock.set(offer.deadline - Duration::seconds(1));

        assert!(h.engine.initiate_checkout(offer.id, "alice", None).await.is_ok());
    }

    #[tokio::test]
    async fn late_checkout_is_expired_even_on_settled_offer() {
        let h = Harness::new();
        let offer = h.offer(1, "10").await;
        h.paid_order(&offer, "alice").await;
        h.pass_deadline(&offer);
        h.engine.settle_offer(offer.id).await.unwrap();

        let result = h.engine.initiate_checkout(offer.id, "bob", None).await;
        let err = result.unwrap_err();
        assert!(matches!(err, CheckoutError::OfferExpired(_)));
        assert_eq!(err.code(), "offer_expired");
    }

    #[tokio::test]
    async fn second_purchase_by_same_user_is_rejected() {
        let h = Harness::new();
        let offer = h.offer(3, "10").await;
        h.paid_order(&offer, "alice").await;

        let err = h
            .engine
            .initiate_checkout(offer.id, "alice", None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "already_purchased");

        // others are unaffected
        assert!(h.engine.initiate_checkout(offer.id, "bob", None).await.is_ok());
    }

    #[tokio::test]
    async fn user_may_buy_again_after_cancelling() {
        let h = Harness::new();
        let offer = h.offer(3, "10").await;
        let order = h.paid_order(&offer, "alice").await;
        h.engine.cancel_order(order.id, "alice").await.unwrap();

        assert!(h.engine.initiate_checkout(offer.id, "alice", None).await.is_ok());
    }

    #[tokio::test]
    async fn declined_payment_has_its_own_code() {
        let h = Harness::new();
        let offer = h.offer(3, "10").await;
        h.gateway.decline_creates(true).await;

        let err = h
            .engine
            .initiate_checkout(offer.id, "alice", None)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::Gateway(GatewayError::Declined(_))));
        assert_eq!(err.code(), "payment_declined");
    }

    #[tokio::test]
    async fn transient_provider_failures_are_retried() {
        let h = Harness::new();
        let offer = h.offer(3, "10").await;
        h.gateway.fail_next(2).await;

        assert!(h.engine.initiate_checkout(offer.id, "alice", None).await.is_ok());
    }

    #[tokio::test]
    async fn persistent_outage_surfaces_as_provider_unavailable() {
        let h = Harness::new();
        let offer = h.offer(3, "10").await;
        h.gateway.fail_next(3).await;

        let err = h
            .engine
            .initiate_checkout(offer.id, "alice", None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "provider_unavailable");
    }

    #[tokio::test]
    async fn sub_cent_price_cannot_be_charged() {
        let h = Harness::new();
        let offer = h.offer(3, "10.005").await;

        let err = h
            .engine
            .initiate_checkout(offer.id, "alice", None)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidPrice(..)));
    }

    #[tokio::test]
    async fn price_beyond_minor_unit_range_cannot_be_charged() {
        let h = Harness::new();
        let offer = h.offer(3, "79228162514264337593543950335").await;

        let err = h
            .engine
            .initiate_checkout(offer.id, "alice", None)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidPrice(..)));
        assert_eq!(err.code(), "internal_error");
    }
}
