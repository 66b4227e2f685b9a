//! Scenario replay.
//!
//! Drives an [`Engine`] over the in-memory ledger and the simulated provider
//! from a stream of timestamped events. Buyers are addressed by `(offer, user)`;
//! the scenario remembers which intent and order belong to each pair.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio_stream::{Stream, StreamExt};
use tracing::{info, warn};

use crate::clock::{Clock, ManualClock};
use crate::config::EngineConfig;
use crate::engine::{Confirmation, EngineError, OfferSummary};
use crate::gateway::{GatewayError, IntentStatus, PaymentGateway, SimulatedGateway};
use crate::ledger::{InMemoryLedger, LedgerError, LedgerStore};
use crate::model::{Offer, OfferId, OrderId, UserId};
use crate::Engine;

/// One replayed action, applied at `at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Checkout { at: DateTime<Utc>, offer: OfferId, user: UserId },
    /// The buyer pays and the provider delivers its confirmation.
    /// Repeating it redelivers the confirmation.
    Confirm { at: DateTime<Utc>, offer: OfferId, user: UserId },
    Cancel { at: DateTime<Utc>, offer: OfferId, user: UserId },
    Settle { at: DateTime<Utc>, offer: OfferId },
}

impl Event {
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Event::Checkout { at, .. }
            | Event::Confirm { at, .. }
            | Event::Cancel { at, .. }
            | Event::Settle { at, .. } => *at,
        }
    }
}

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("user {user} has no checkout on offer {offer}")]
    NoCheckout { offer: OfferId, user: UserId },

    #[error("user {user} has no order on offer {offer}")]
    NoOrder { offer: OfferId, user: UserId },

    #[error("{0}")]
    Engine(#[from] EngineError),

    #[error("{0}")]
    Gateway(#[from] GatewayError),
}

pub struct Scenario {
    engine: Engine<InMemoryLedger, SimulatedGateway>,
    gateway: Arc<SimulatedGateway>,
    clock: Arc<ManualClock>,
    offers: Vec<OfferId>,
    intents: HashMap<(OfferId, UserId), String>,
    orders: HashMap<(OfferId, UserId), OrderId>,
}

impl Scenario {
    pub fn new(config: EngineConfig, start: DateTime<Utc>) -> Self {
        let ledger = Arc::new(InMemoryLedger::new());
        let gateway = Arc::new(SimulatedGateway::new());
        let clock = Arc::new(ManualClock::new(start));
        let engine = Engine::new(ledger, gateway.clone(), clock.clone() as Arc<dyn Clock>, config);
        Self {
            engine,
            gateway,
            clock,
            offers: Vec::new(),
            intents: HashMap::new(),
            orders: HashMap::new(),
        }
    }

    pub fn engine(&self) -> &Engine<InMemoryLedger, SimulatedGateway> {
        &self.engine
    }

    pub async fn add_offer(&mut self, offer: Offer) -> Result<(), LedgerError> {
        let id = offer.id;
        self.engine.ledger().insert_offer(offer).await?;
        self.offers.push(id);
        Ok(())
    }

    /// Apply every event in order. A failing event is logged and skipped.
    pub async fn run(&mut self, mut stream: impl Stream<Item = Event> + Unpin) {
        while let Some(event) = stream.next().await {
            if let Err(e) = self.apply(event.clone()).await {
                warn!(at = %event.at(), reason = %e, "event skipped");
            }
        }
    }

    /// Summaries of every added offer, in the order they were added.
    pub async fn summaries(&self) -> Result<Vec<OfferSummary>, LedgerError> {
        let mut summaries = Vec::with_capacity(self.offers.len());
        for offer_id in &self.offers {
            if let Some(summary) = self.engine.offer_summary(*offer_id).await? {
                summaries.push(summary);
            }
        }
        Ok(summaries)
    }

    async fn apply(&mut self, event: Event) -> Result<(), ScenarioError> {
        self.clock.set(event.at());

        match event {
            Event::Checkout { offer, user, .. } => {
                let session = self
                    .engine
                    .initiate_checkout(offer, &user, None)
                    .await
                    .map_err(EngineError::from)?;
                self.intents.insert((offer, user), session.payment_intent_id);
            }
            Event::Confirm { offer, user, .. } => {
                let intent = self
                    .intents
                    .get(&(offer, user.clone()))
                    .cloned()
                    .ok_or_else(|| ScenarioError::NoCheckout {
                        offer,
                        user: user.clone(),
                    })?;

                // only the first delivery is preceded by the buyer paying
                if self.gateway.retrieve_intent(&intent).await?.status
                    == IntentStatus::RequiresPayment
                {
                    self.gateway.confirm(&intent).await?;
                }

                match self
                    .engine
                    .on_payment_confirmed(&intent)
                    .await
                    .map_err(EngineError::from)?
                {
                    Confirmation::Recorded(order) | Confirmation::AlreadyRecorded(order) => {
                        self.orders.insert((offer, user), order.id);
                    }
                    Confirmation::LateRejected(flag) | Confirmation::LateRefunded(flag) => {
                        info!(offer = %offer, user = %user, reason = %flag.reason, "late payment flagged");
                    }
                }
            }
            Event::Cancel { offer, user, .. } => {
                let order_id = self
                    .orders
                    .get(&(offer, user.clone()))
                    .copied()
                    .ok_or_else(|| ScenarioError::NoOrder {
                        offer,
                        user: user.clone(),
                    })?;
                self.engine
                    .cancel_order(order_id, &user)
                    .await
                    .map_err(EngineError::from)?;
            }
            Event::Settle { offer, .. } => {
                self.engine
                    .settle_offer(offer)
                    .await
                    .map_err(EngineError::from)?;
            }
        }
        Ok(())
    }
}
