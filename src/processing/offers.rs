use crate::models::Offer;
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::str::FromStr;
use tracing::debug;

/// Which offers survive the staging/production comparison.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Staging is the source of truth; production-only ids are only reported.
    #[default]
    PassThrough,
    /// Keep only production offers missing from staging.
    ProdExclusive,
}

impl FromStr for DuplicatePolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "pass-through" | "passthrough" => Ok(Self::PassThrough),
            "prod-exclusive" => Ok(Self::ProdExclusive),
            other => Err(format!(
                "unsupported duplicate policy `{other}` (expected pass-through|prod-exclusive)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateResolution {
    pub working: Vec<Offer>,
    pub not_in_stage: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterOutcome {
    pub offers: Vec<Offer>,
    pub not_in_stage: BTreeSet<String>,
}

/// Filters candidate offers for the SKUs a primary offer discounts.
#[derive(Debug, Clone)]
pub struct OfferProcessor {
    primary: Offer,
    policy: DuplicatePolicy,
}

impl OfferProcessor {
    pub fn new(primary: Offer, policy: DuplicatePolicy) -> Self {
        Self { primary, policy }
    }

    /// Every SKU the primary offer discounts, deduplicated and sorted.
    pub fn discounted_skus(&self) -> BTreeSet<String> {
        self.primary.discounted_skus.all_skus()
    }

    pub fn filter_duplicate_offers(
        &self,
        staging: Vec<Offer>,
        production: Vec<Offer>,
    ) -> DuplicateResolution {
        let staging_ids: HashSet<&str> = staging.iter().map(|o| o.offer_id.as_str()).collect();
        let not_in_stage: BTreeSet<String> = production
            .iter()
            .filter(|offer| !staging_ids.contains(offer.offer_id.as_str()))
            .map(|offer| offer.offer_id.clone())
            .collect();

        let working = match self.policy {
            DuplicatePolicy::PassThrough => staging,
            DuplicatePolicy::ProdExclusive => production
                .into_iter()
                .filter(|offer| not_in_stage.contains(&offer.offer_id))
                .collect(),
        };

        DuplicateResolution {
            working,
            not_in_stage,
        }
    }

    /// Offers without coverage data never match.
    pub fn filter_by_sku(&self, offers: Vec<Offer>, sku: &str) -> Vec<Offer> {
        offers.into_iter().filter(|offer| offer.covers(sku)).collect()
    }

    /// Drops an offer when either side lists the other as non-stackable.
    pub fn filter_non_stackable(&self, offers: Vec<Offer>) -> Vec<Offer> {
        let primary_id = self.primary.offer_id.as_str();
        let primary_vetoes: HashSet<&str> = self
            .primary
            .non_stackable_ids()
            .iter()
            .map(String::as_str)
            .collect();

        offers
            .into_iter()
            .filter(|offer| {
                let vetoes_primary = offer.non_stackable_ids().iter().any(|id| id == primary_id);
                let vetoed = primary_vetoes.contains(offer.offer_id.as_str());
                if vetoes_primary || vetoed {
                    debug!(
                        target = "deep_discount.filter",
                        offer_id = %offer.offer_id,
                        vetoes_primary,
                        vetoed,
                        "offer_not_stackable"
                    );
                }
                !(vetoes_primary || vetoed)
            })
            .collect()
    }

    pub fn apply(&self, staging: Vec<Offer>, production: Vec<Offer>, sku: &str) -> FilterOutcome {
        let (staging_count, production_count) = (staging.len(), production.len());
        let resolution = self.filter_duplicate_offers(staging, production);
        let working_count = resolution.working.len();
        let by_sku = self.filter_by_sku(resolution.working, sku);
        let by_sku_count = by_sku.len();
        let offers = self.filter_non_stackable(by_sku);
        debug!(
            target = "deep_discount.filter",
            sku = %sku,
            staging = staging_count,
            production = production_count,
            working = working_count,
            covering_sku = by_sku_count,
            stackable = offers.len(),
            not_in_stage = resolution.not_in_stage.len(),
            "offers_filtered"
        );
        FilterOutcome {
            offers,
            not_in_stage: resolution.not_in_stage,
        }
    }
}
