use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use thiserror::Error;
use uuid::Uuid;

use crate::engine::OfferSummary;
use crate::model::{Offer, OfferStatus};
use crate::scenario::Event;
use crate::Amount;

/// Errors that can occur when reading or writing csv files
#[derive(Debug, Error)]
pub enum CsvError {
    #[error("failed to open {path}: {source}")]
    Open { path: String, source: csv::Error },

    #[error("line {line}: failed to parse row: {source}")]
    Parse { line: usize, source: csv::Error },

    #[error("line {line}: unrecognized event type '{event_type}'")]
    UnrecognizedType { line: usize, event_type: String },

    #[error("line {line}: {event_type} missing user")]
    MissingUser { line: usize, event_type: String },

    #[error("line {line}: invalid offer: {reason}")]
    InvalidOffer { line: usize, reason: String },

    #[error("failed to write row: {0}")]
    Write(#[from] csv::Error),

    #[error("failed to flush output: {0}")]
    Flush(#[from] io::Error),
}

#[derive(Debug, Deserialize)]
struct OfferRow {
    id: Uuid,
    campaign: String,
    brand: String,
    creator: String,
    price: String,
    currency: String,
    goal: u32,
    deadline: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct EventRow {
    r#type: String,
    at: DateTime<Utc>,
    offer: Uuid,
    user: Option<String>,
}

#[derive(Debug, Serialize)]
struct SummaryRow {
    offer: Uuid,
    status: OfferStatus,
    paid_orders: usize,
    paid_gross: String,
    refunded_orders: usize,
    cancelled_orders: usize,
    platform_fee: Option<String>,
    creator_share: Option<String>,
    net_to_brand: Option<String>,
}

fn reader(path: &Path) -> Result<csv::Reader<std::fs::File>, CsvError> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|source| CsvError::Open {
            path: path.display().to_string(),
            source,
        })
}

/// Read offers from a csv file
pub fn read_offers(
    path: impl AsRef<Path>,
) -> Result<impl Iterator<Item = Result<Offer, CsvError>>, CsvError> {
    let reader = reader(path.as_ref())?;

    Ok(reader
        .into_deserialize::<OfferRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2; // 1-indexed, skip header
            let row = result.map_err(|source| CsvError::Parse { line, source })?;

            let price: Amount = row.price.parse().map_err(|_| CsvError::InvalidOffer {
                line,
                reason: format!("price '{}' is not a decimal", row.price),
            })?;
            if !price.is_positive() {
                return Err(CsvError::InvalidOffer {
                    line,
                    reason: format!("price must be positive, got {price}"),
                });
            }
            if price.to_minor().is_none() {
                return Err(CsvError::InvalidOffer {
                    line,
                    reason: format!("price {} cannot be charged in whole cents", row.price),
                });
            }
            if row.goal == 0 {
                return Err(CsvError::InvalidOffer {
                    line,
                    reason: "goal must be at least 1".to_string(),
                });
            }

            Ok(Offer {
                id: row.id,
                campaign_id: row.campaign,
                brand_id: row.brand,
                creator_user_id: row.creator,
                price,
                currency: row.currency.to_lowercase(),
                goal_quantity: row.goal,
                deadline: row.deadline,
                status: OfferStatus::Active,
                closed_at: None,
            })
        }))
}

/// Read scenario events from a csv file
pub fn read_events(
    path: impl AsRef<Path>,
) -> Result<impl Iterator<Item = Result<Event, CsvError>>, CsvError> {
    let reader = reader(path.as_ref())?;

    Ok(reader
        .into_deserialize::<EventRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2; // 1-indexed, skip header
            let row = result.map_err(|source| CsvError::Parse { line, source })?;
            let (at, offer) = (row.at, row.offer);

            let user = |event_type: &str| {
                row.user.clone().ok_or_else(|| CsvError::MissingUser {
                    line,
                    event_type: event_type.to_string(),
                })
            };

            match row.r#type.as_str() {
                "checkout" => Ok(Event::Checkout {
                    at,
                    offer,
                    user: user("checkout")?,
                }),
                "confirm" => Ok(Event::Confirm {
                    at,
                    offer,
                    user: user("confirm")?,
                }),
                "cancel" => Ok(Event::Cancel {
                    at,
                    offer,
                    user: user("cancel")?,
                }),
                "settle" => Ok(Event::Settle { at, offer }),
                other => Err(CsvError::UnrecognizedType {
                    line,
                    event_type: other.to_string(),
                }),
            }
        }))
}

/// Write offer summaries in csv format
pub fn write_summaries<'a>(
    writer: impl io::Write,
    summaries: impl IntoIterator<Item = &'a OfferSummary>,
) -> Result<(), CsvError> {
    let mut writer = csv::Writer::from_writer(writer);

    for summary in summaries {
        let payout = summary.payout.as_ref();
        let row = SummaryRow {
            offer: summary.offer.id,
            status: summary.offer.status,
            paid_orders: summary.paid_orders,
            paid_gross: summary.paid_gross.to_string(),
            refunded_orders: summary.refunded_orders,
            cancelled_orders: summary.cancelled_orders,
            platform_fee: payout.map(|p| p.platform_fee.to_string()),
            creator_share: payout.map(|p| p.creator_share.to_string()),
            net_to_brand: payout.map(|p| p.net_to_brand.to_string()),
        };
        writer.serialize(&row)?;
    }

    writer.flush()?;
    Ok(())
}
