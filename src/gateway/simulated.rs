use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::{CreatedIntent, GatewayError, IntentMetadata, IntentStatus, PaymentGateway, RetrievedIntent};

#[derive(Debug, Clone)]
struct SimulatedIntent {
    status: IntentStatus,
    amount_minor: i64,
    currency: String,
    metadata: IntentMetadata,
    refunds: u32,
}

#[derive(Debug, Default)]
struct SimulatedState {
    intents: HashMap<String, SimulatedIntent>,
    /// Refunds for these intents fail with the stored error.
    refund_failures: HashMap<String, GatewayError>,
    /// Number of upcoming calls that fail as unavailable.
    outages: u32,
    decline_creates: bool,
}

/// In-process payment provider.
///
/// Intents start in `requires_payment`; [`SimulatedGateway::confirm`] plays the
/// buyer completing payment. Failure knobs let callers exercise provider
/// outages, declines and refusing refunds.
#[derive(Debug, Default)]
pub struct SimulatedGateway {
    state: Mutex<SimulatedState>,
}

impl SimulatedGateway {
    pub const PROVIDER: &'static str = "simulated";

    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an intent as paid by the buyer.
    pub async fn confirm(&self, intent_id: &str) -> Result<(), GatewayError> {
        let mut state = self.state.lock().await;
        let intent = state
            .intents
            .get_mut(intent_id)
            .ok_or_else(|| GatewayError::IntentNotFound(intent_id.to_string()))?;
        intent.status = IntentStatus::Succeeded;
        Ok(())
    }

    /// Change what the provider reports as charged for `intent_id`.
    pub async fn override_charge(
        &self,
        intent_id: &str,
        amount_minor: i64,
        currency: &str,
    ) -> Result<(), GatewayError> {
        let mut state = self.state.lock().await;
        let intent = state
            .intents
            .get_mut(intent_id)
            .ok_or_else(|| GatewayError::IntentNotFound(intent_id.to_string()))?;
        intent.amount_minor = amount_minor;
        intent.currency = currency.to_string();
        Ok(())
    }

    /// Make every refund of `intent_id` fail with `error`.
    pub async fn fail_refunds(&self, intent_id: &str, error: GatewayError) {
        self.state
            .lock()
            .await
            .refund_failures
            .insert(intent_id.to_string(), error);
    }

    /// Make the next `calls` provider calls fail as unavailable.
    pub async fn fail_next(&self, calls: u32) {
        self.state.lock().await.outages = calls;
    }

    pub async fn decline_creates(&self, decline: bool) {
        self.state.lock().await.decline_creates = decline;
    }

    /// How many refunds the provider accepted for `intent_id`.
    pub async fn refund_count(&self, intent_id: &str) -> u32 {
        self.state
            .lock()
            .await
            .intents
            .get(intent_id)
            .map_or(0, |intent| intent.refunds)
    }

    fn take_outage(state: &mut SimulatedState) -> Result<(), GatewayError> {
        if state.outages > 0 {
            state.outages -= 1;
            return Err(GatewayError::Unavailable("simulated outage".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    fn provider(&self) -> &str {
        Self::PROVIDER
    }

    async fn create_intent(
        &self,
        amount_minor: i64,
        currency: &str,
        metadata: &IntentMetadata,
    ) -> Result<CreatedIntent, GatewayError> {
        let mut state = self.state.lock().await;
        Self::take_outage(&mut state)?;

        if state.decline_creates {
            return Err(GatewayError::Declined("card declined".to_string()));
        }
        if amount_minor <= 0 {
            return Err(GatewayError::Rejected(format!(
                "amount must be positive, got {amount_minor}"
            )));
        }

        let intent_id = format!("pi_{}", Uuid::new_v4().simple());
        let client_secret = format!("{intent_id}_secret_{}", Uuid::new_v4().simple());
        state.intents.insert(
            intent_id.clone(),
            SimulatedIntent {
                status: IntentStatus::RequiresPayment,
                amount_minor,
                currency: currency.to_string(),
                metadata: metadata.clone(),
                refunds: 0,
            },
        );
        debug!(intent = %intent_id, amount_minor, currency, "intent created");

        Ok(CreatedIntent {
            intent_id,
            client_secret,
        })
    }

    async fn retrieve_intent(&self, intent_id: &str) -> Result<RetrievedIntent, GatewayError> {
        let mut state = self.state.lock().await;
        Self::take_outage(&mut state)?;

        let intent = state
            .intents
            .get(intent_id)
            .ok_or_else(|| GatewayError::IntentNotFound(intent_id.to_string()))?;

        Ok(RetrievedIntent {
            intent_id: intent_id.to_string(),
            status: intent.status,
            amount_minor: intent.amount_minor,
            currency: intent.currency.clone(),
            metadata: intent.metadata.clone(),
        })
    }

    async fn refund(&self, intent_id: &str) -> Result<(), GatewayError> {
        let mut state = self.state.lock().await;
        Self::take_outage(&mut state)?;

        if let Some(error) = state.refund_failures.get(intent_id) {
            return Err(error.clone());
        }

        let intent = state
            .intents
            .get_mut(intent_id)
            .ok_or_else(|| GatewayError::IntentNotFound(intent_id.to_string()))?;

        match intent.status {
            IntentStatus::Succeeded => {
                intent.status = IntentStatus::Refunded;
                intent.refunds += 1;
                debug!(intent = %intent_id, "intent refunded");
                Ok(())
            }
            IntentStatus::Refunded => Err(GatewayError::AlreadyRefunded(intent_id.to_string())),
            other => Err(GatewayError::Rejected(format!(
                "intent {intent_id} is {other}, nothing to refund"
            ))),
        }
    }
}
