//! Payment provider boundary.
//!
//! The provider is treated as an opaque remote service that creates charge
//! intents, reports their status and issues refunds. Confirmation of a charge
//! arrives out of band, so everything needed to rebuild the checkout context
//! travels in the intent metadata.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::{BrandId, CampaignId, OfferId, ShippingDetails, UserId};

mod error;
pub use error::GatewayError;

mod simulated;
pub use simulated::SimulatedGateway;

/// Checkout context attached to a payment intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentMetadata {
    pub offer_id: OfferId,
    pub user_id: UserId,
    pub campaign_id: CampaignId,
    pub brand_id: BrandId,
    pub creator_user_id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipping: Option<ShippingDetails>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    RequiresPayment,
    Processing,
    Succeeded,
    Canceled,
    Refunded,
}

impl fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IntentStatus::RequiresPayment => "requires_payment",
            IntentStatus::Processing => "processing",
            IntentStatus::Succeeded => "succeeded",
            IntentStatus::Canceled => "canceled",
            IntentStatus::Refunded => "refunded",
        };
        f.write_str(s)
    }
}

/// Result of creating an intent; the client secret goes back to the buyer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedIntent {
    pub intent_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievedIntent {
    pub intent_id: String,
    pub status: IntentStatus,
    pub amount_minor: i64,
    pub currency: String,
    pub metadata: IntentMetadata,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Provider name stored on every [`Payment`](crate::model::Payment).
    fn provider(&self) -> &str;

    async fn create_intent(
        &self,
        amount_minor: i64,
        currency: &str,
        metadata: &IntentMetadata,
    ) -> Result<CreatedIntent, GatewayError>;

    async fn retrieve_intent(&self, intent_id: &str) -> Result<RetrievedIntent, GatewayError>;

    /// Refund the full amount of a succeeded intent.
    async fn refund(&self, intent_id: &str) -> Result<(), GatewayError>;
}
