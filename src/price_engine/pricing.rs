use crate::price_engine::client::{PriceEngineError, post_json};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize)]
pub struct FetchPriceRequest<'a> {
    pub sku: &'a [String],
    pub store_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_id: Option<&'a str>,
}

pub async fn fetch_current_price(
    client: &Client,
    url: &str,
    request: &FetchPriceRequest<'_>,
) -> Result<Value, PriceEngineError> {
    post_json(client, url, request).await
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PricePayload {
    Bare(Vec<Value>),
    Wrapped {
        #[serde(default)]
        result: Option<Vec<Value>>,
    },
}

/// Entries of a price payload, which is either `{"result": [...]}` or a bare
/// list. Entries are returned untouched; callers skip the ones they cannot
/// read.
pub fn price_entries(payload: Value) -> Result<Vec<Value>, PriceEngineError> {
    match serde_json::from_value::<PricePayload>(payload) {
        Ok(PricePayload::Bare(entries)) => Ok(entries),
        Ok(PricePayload::Wrapped { result }) => Ok(result.unwrap_or_default()),
        Err(_) => Err(PriceEngineError::Decode(
            "price payload is neither a list nor a result wrapper".into(),
        )),
    }
}
