use crate::models::{Offer, OfferSearchResponse};
use crate::price_engine::client::{PriceEngineError, post_json};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum OfferSearchRequest {
    ById {
        offer_ids: Vec<String>,
    },
    BySku {
        skus: Vec<String>,
        filter_current_offers: bool,
    },
}

impl OfferSearchRequest {
    pub fn by_id(offer_id: &str) -> Self {
        Self::ById {
            offer_ids: vec![offer_id.to_string()],
        }
    }

    /// Only offers current at request time are returned.
    pub fn by_sku(sku: &str) -> Self {
        Self::BySku {
            skus: vec![sku.to_string()],
            filter_current_offers: true,
        }
    }
}

pub async fn search_offers(
    client: &Client,
    url: &str,
    request: &OfferSearchRequest,
) -> Result<Vec<Offer>, PriceEngineError> {
    let payload: OfferSearchResponse = post_json(client, url, request).await?;
    Ok(decode_offers(payload.offers))
}

/// Entries that do not decode as an offer are logged and dropped.
pub fn decode_offers(entries: Vec<Value>) -> Vec<Offer> {
    entries
        .into_iter()
        .filter_map(|entry| {
            let offer_id = entry.get("offer_id").cloned().unwrap_or(Value::Null);
            match serde_json::from_value::<Offer>(entry) {
                Ok(offer) => Some(offer),
                Err(err) => {
                    warn!(
                        target = "deep_discount.price_engine",
                        offer_id = %offer_id,
                        error = %err,
                        "offer_skipped"
                    );
                    None
                }
            }
        })
        .collect()
}
