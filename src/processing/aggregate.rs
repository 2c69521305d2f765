use crate::config::EppProgram;
use crate::models::{
    AggregatedRow, EppDiscount, Offer, OfferDiscount, PriceEntry, PriceRecord, ProgramDiscount,
};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::trace;

/// Price entries for one price scope, concatenated across request chunks.
#[derive(Debug, Default)]
pub struct PriceBook {
    entries: Vec<Value>,
}

impl PriceBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, entries: Vec<Value>) {
        self.entries.extend(entries);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Decodable entries for `sku` in book order; entries that are not
    /// mappings or do not decode are skipped.
    fn entries_for<'a>(&'a self, sku: &'a str) -> impl Iterator<Item = PriceEntry> + 'a {
        self.entries
            .iter()
            .filter(|entry| entry.is_object())
            .filter(move |entry| entry_sku_matches(entry, sku))
            .filter_map(move |entry| match serde_json::from_value::<PriceEntry>(entry.clone()) {
                Ok(parsed) => Some(parsed),
                Err(err) => {
                    trace!(target = "deep_discount.aggregate", sku = %sku, error = %err, "price_entry_skipped");
                    None
                }
            })
    }

    pub fn price_for(&self, sku: &str) -> PriceRecord {
        self.entries_for(sku)
            .next()
            .map(|entry| entry.to_record())
            .unwrap_or_else(|| PriceRecord::empty(sku))
    }

    /// First discount found across every entry for `sku`.
    pub fn epp_discount_for(&self, sku: &str) -> Option<EppDiscount> {
        self.entries_for(sku)
            .find_map(|entry| entry.first_epp_discount())
    }
}

impl FromIterator<Value> for PriceBook {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

fn entry_sku_matches(entry: &Value, sku: &str) -> bool {
    match entry.get("sku") {
        Some(Value::String(value)) => value == sku,
        Some(Value::Number(value)) => value.to_string() == sku,
        _ => false,
    }
}

/// Discount an offer grants `sku`: the first description listing the SKU.
pub fn sku_discount(offer: &Offer, sku: &str) -> OfferDiscount {
    let description = offer
        .discount_description
        .iter()
        .find(|description| description.skus.iter().any(|candidate| candidate == sku));
    OfferDiscount {
        offer_id: offer.offer_id.clone(),
        value: description.and_then(|d| d.value),
        kind: description.and_then(|d| d.kind.clone()),
    }
}

/// One row per SKU in `skus` order. SKUs missing from `offers_by_sku` had
/// their offer searches fail; their rows are flagged and carry no offers.
pub fn build_rows(
    skus: &BTreeSet<String>,
    offers_by_sku: &BTreeMap<String, Vec<Offer>>,
    general: &PriceBook,
    programs: &[(EppProgram, PriceBook)],
) -> Vec<AggregatedRow> {
    skus.iter()
        .map(|sku| AggregatedRow {
            sku: sku.clone(),
            price: general.price_for(sku),
            epp: programs
                .iter()
                .map(|(program, book)| ProgramDiscount {
                    program: program.name.clone(),
                    discount: book.epp_discount_for(sku),
                })
                .collect(),
            search_failed: !offers_by_sku.contains_key(sku),
            offers: offers_by_sku
                .get(sku)
                .map(|offers| offers.iter().map(|offer| sku_discount(offer, sku)).collect())
                .unwrap_or_default(),
        })
        .collect()
}
