use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use uuid::Uuid;

use super::{Confirmation, Engine};
use crate::clock::{Clock, ManualClock};
use crate::config::EngineConfig;
use crate::gateway::SimulatedGateway;
use crate::ledger::{InMemoryLedger, LedgerStore};
use crate::model::{Offer, OfferStatus, Order};
use crate::retry::RetryPolicy;

/// Engine wired to an in-memory ledger, a simulated provider and a manual clock.
pub(crate) struct Harness {
    pub engine: Engine<InMemoryLedger, SimulatedGateway>,
    pub ledger: Arc<InMemoryLedger>,
    pub gateway: Arc<SimulatedGateway>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let config = EngineConfig {
            retry: RetryPolicy {
                max_attempts: 3,
                initial_delay: StdDuration::ZERO,
                max_delay: StdDuration::ZERO,
                multiplier: 1,
            },
            ..config
        };
        let ledger = Arc::new(InMemoryLedger::new());
        let gateway = Arc::new(SimulatedGateway::new());
        let clock = Arc::new(ManualClock::new(Self::start()));
        let engine = Engine::new(
            ledger.clone(),
            gateway.clone(),
            clock.clone() as Arc<dyn Clock>,
            config,
        );
        Self {
            engine,
            ledger,
            gateway,
            clock,
        }
    }

    pub fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap()
    }

    /// Active offer with a deadline seven days after [`Harness::start`].
    pub async fn offer(&self, goal_quantity: u32, price: &str) -> Offer {
        let offer = Offer {
            id: Uuid::new_v4(),
            campaign_id: "campaign-1".to_string(),
            brand_id: "brand-1".to_string(),
            creator_user_id: "creator-1".to_string(),
            price: price.parse().unwrap(),
            currency: "usd".to_string(),
            goal_quantity,
            deadline: Self::start() + Duration::days(7),
            status: OfferStatus::Active,
            closed_at: None,
        };
        self.ledger.insert_offer(offer.clone()).await.unwrap();
        offer
    }

    /// Checkout and have the buyer pay; returns the intent id without confirming.
    pub async fn checkout_and_pay(&self, offer: &Offer, user: &str) -> String {
        let session = self
            .engine
            .initiate_checkout(offer.id, user, None)
            .await
            .unwrap();
        self.gateway.confirm(&session.payment_intent_id).await.unwrap();
        session.payment_intent_id
    }

    /// Full happy path: checkout, payment, confirmation.
    pub async fn paid_order(&self, offer: &Offer, user: &str) -> Order {
        let intent = self.checkout_and_pay(offer, user).await;
        match self.engine.on_payment_confirmed(&intent).await.unwrap() {
            Confirmation::Recorded(order) => order,
            other => panic!("expected a new order, got {other:?}"),
        }
    }

    pub fn pass_deadline(&self, offer: &Offer) {
        self.clock.set(offer.deadline + Duration::seconds(1));
    }
}
