use crate::config::AppConfig;
use crate::http::build_client;
use crate::models::Offer;
use crate::price_engine::{offers, pricing};
use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum PriceEngineError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },
    #[error("invalid response: {0}")]
    Decode(String),
}

impl PriceEngineError {
    pub fn is_malformed(&self) -> bool {
        matches!(self, PriceEngineError::Decode(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Staging,
    Production,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Staging => f.write_str("staging"),
            Environment::Production => f.write_str("production"),
        }
    }
}

/// Offer search and price lookup against the price engine.
///
/// Calls are issued one at a time by the pipeline; implementations need not
/// be safe for concurrent use.
#[allow(async_fn_in_trait)]
pub trait PriceEngine {
    async fn search_offers_by_id(
        &self,
        offer_id: &str,
        env: Environment,
    ) -> Result<Vec<Offer>, PriceEngineError>;

    async fn search_offers_by_sku(
        &self,
        sku: &str,
        env: Environment,
    ) -> Result<Vec<Offer>, PriceEngineError>;

    /// Raw `_fetch-current-price` payload; see [`pricing::price_entries`] for
    /// the accepted shapes.
    async fn fetch_current_price(
        &self,
        skus: &[String],
        site_id: Option<&str>,
    ) -> Result<Value, PriceEngineError>;
}

#[derive(Clone)]
pub struct HttpPriceEngine {
    http: Client,
    config: Arc<AppConfig>,
}

impl HttpPriceEngine {
    pub fn new(config: Arc<AppConfig>) -> Self {
        let http = build_client(&config.http);
        Self { http, config }
    }

    fn offer_search_url(&self, env: Environment) -> &str {
        match env {
            Environment::Staging => &self.config.endpoints.stage_offer_search,
            Environment::Production => &self.config.endpoints.prod_offer_search,
        }
    }
}

impl PriceEngine for HttpPriceEngine {
    async fn search_offers_by_id(
        &self,
        offer_id: &str,
        env: Environment,
    ) -> Result<Vec<Offer>, PriceEngineError> {
        let body = offers::OfferSearchRequest::by_id(offer_id);
        offers::search_offers(&self.http, self.offer_search_url(env), &body).await
    }

    async fn search_offers_by_sku(
        &self,
        sku: &str,
        env: Environment,
    ) -> Result<Vec<Offer>, PriceEngineError> {
        let body = offers::OfferSearchRequest::by_sku(sku);
        offers::search_offers(&self.http, self.offer_search_url(env), &body).await
    }

    async fn fetch_current_price(
        &self,
        skus: &[String],
        site_id: Option<&str>,
    ) -> Result<Value, PriceEngineError> {
        let body = pricing::FetchPriceRequest {
            sku: skus,
            store_type: &self.config.store_type,
            site_id,
        };
        pricing::fetch_current_price(&self.http, &self.config.endpoints.fetch_price, &body).await
    }
}

pub(crate) async fn post_json<B, T>(client: &Client, url: &str, body: &B) -> Result<T, PriceEngineError>
where
    B: Serialize + ?Sized,
    T: DeserializeOwned,
{
    let response = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|err| PriceEngineError::Request(err.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        debug!(
            target = "deep_discount.price_engine",
            url = %url,
            status = status.as_u16(),
            body = %text.chars().take(512).collect::<String>(),
            "price_engine_error_body"
        );
        return Err(PriceEngineError::Status {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }
    let bytes = response
        .bytes()
        .await
        .map_err(|err| PriceEngineError::Request(err.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|err| PriceEngineError::Decode(err.to_string()))
}
