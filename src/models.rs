use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;
use std::collections::BTreeSet;
use std::path::PathBuf;
use uuid::Uuid;

/// A promotional offer as returned by the offer search endpoint.
///
/// Deserialization goes through [`OfferRecord`], which accepts both the flat
/// and the nested `discounted_skus` shapes and both locations of the
/// non-stackable list. The fields here are the canonical view.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "OfferRecord")]
pub struct Offer {
    pub offer_id: String,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub channel: Option<String>,
    pub exclude_ir: Option<bool>,
    pub exclude_epp: Option<bool>,
    pub coupon_code_triggered: Option<bool>,
    pub concurrent: Option<bool>,
    pub apply_mode: Option<String>,
    pub applicable_sites: Vec<String>,
    pub restricted_skus: Vec<String>,
    pub trigger_tags: Vec<String>,
    pub discount_description: Vec<DiscountDescription>,
    pub discounted_skus: DiscountedSkus,
    pub offer_id_restriction: OfferIdRestriction,
}

impl Offer {
    pub fn non_stackable_ids(&self) -> &[String] {
        &self.offer_id_restriction.non_stackable_offer_ids
    }

    pub fn covers(&self, sku: &str) -> bool {
        self.discounted_skus.contains(sku)
    }
}

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscountDescription {
    #[serde(default, deserialize_with = "de::ids")]
    pub skus: Vec<String>,
    #[serde(default, deserialize_with = "de::integral")]
    pub value: Option<i64>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

/// SKU coverage of an offer: discount groups, each holding SKU groups.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "DiscountedSkusRecord")]
pub struct DiscountedSkus(pub Vec<DiscountGroup>);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscountGroup {
    #[serde(default, deserialize_with = "de::nullable")]
    pub groups: Vec<SkuGroup>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkuGroup {
    #[serde(default, deserialize_with = "de::ids")]
    pub skus: Vec<String>,
    #[serde(default, deserialize_with = "de::integral")]
    pub quantity: Option<i64>,
}

impl DiscountedSkus {
    /// A flat SKU list is a single discount group with a single SKU group.
    pub fn from_flat(skus: Vec<String>) -> Self {
        Self(vec![DiscountGroup {
            groups: vec![SkuGroup {
                skus,
                quantity: None,
            }],
        }])
    }

    pub fn iter_skus(&self) -> impl Iterator<Item = &str> {
        self.0
            .iter()
            .flat_map(|discount_group| discount_group.groups.iter())
            .flat_map(|group| group.skus.iter())
            .map(String::as_str)
    }

    pub fn all_skus(&self) -> BTreeSet<String> {
        self.iter_skus().map(str::to_string).collect()
    }

    pub fn contains(&self, sku: &str) -> bool {
        self.iter_skus().any(|candidate| candidate == sku)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DiscountedSkusRecord {
    Nested(Vec<DiscountGroup>),
    Single(DiscountGroup),
    Flat(#[serde(deserialize_with = "de::ids")] Vec<String>),
}

impl From<DiscountedSkusRecord> for DiscountedSkus {
    fn from(record: DiscountedSkusRecord) -> Self {
        match record {
            DiscountedSkusRecord::Nested(groups) => Self(groups),
            DiscountedSkusRecord::Single(group) => Self(vec![group]),
            DiscountedSkusRecord::Flat(skus) => Self::from_flat(skus),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OfferIdRestriction {
    #[serde(default, deserialize_with = "de::ids")]
    pub non_stackable_offer_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct OfferRecord {
    #[serde(deserialize_with = "de::id")]
    offer_id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    exclude_ir: Option<bool>,
    #[serde(default)]
    exclude_epp: Option<bool>,
    #[serde(default)]
    coupon_code_triggered: Option<bool>,
    #[serde(default)]
    concurrent: Option<bool>,
    #[serde(default)]
    apply_mode: Option<String>,
    #[serde(default, deserialize_with = "de::ids")]
    applicable_sites: Vec<String>,
    #[serde(default, deserialize_with = "de::ids")]
    restricted_skus: Vec<String>,
    #[serde(default, deserialize_with = "de::ids")]
    trigger_tags: Vec<String>,
    #[serde(default, deserialize_with = "de::nullable")]
    discount_description: Vec<DiscountDescription>,
    #[serde(default)]
    discounted_skus: Option<DiscountedSkus>,
    #[serde(default)]
    offer_id_restriction: Option<OfferIdRestriction>,
    // older payloads carry the list at the top level
    #[serde(default, deserialize_with = "de::ids")]
    non_stackable_offer_ids: Vec<String>,
}

impl From<OfferRecord> for Offer {
    fn from(record: OfferRecord) -> Self {
        let mut restriction = record.offer_id_restriction.unwrap_or_default();
        for id in record.non_stackable_offer_ids {
            if !restriction.non_stackable_offer_ids.contains(&id) {
                restriction.non_stackable_offer_ids.push(id);
            }
        }
        Self {
            offer_id: record.offer_id,
            name: record.name,
            kind: record.kind,
            channel: record.channel,
            exclude_ir: record.exclude_ir,
            exclude_epp: record.exclude_epp,
            coupon_code_triggered: record.coupon_code_triggered,
            concurrent: record.concurrent,
            apply_mode: record.apply_mode,
            applicable_sites: record.applicable_sites,
            restricted_skus: record.restricted_skus,
            trigger_tags: record.trigger_tags,
            discount_description: record.discount_description,
            discounted_skus: record.discounted_skus.unwrap_or_default(),
            offer_id_restriction: restriction,
        }
    }
}

/// Offers stay raw here so one undecodable offer does not sink the rest.
#[derive(Debug, Default, Deserialize)]
pub struct OfferSearchResponse {
    #[serde(default, deserialize_with = "de::nullable")]
    pub offers: Vec<Value>,
}

/// Prices quoted for one SKU. Every field is absent when not quoted.
#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PriceRecord {
    pub sku: String,
    pub msrp_price: Option<f64>,
    pub sale_price: Option<f64>,
    pub min_price: Option<f64>,
    pub min_epp_price: Option<f64>,
    pub list_price: Option<f64>,
}

impl PriceRecord {
    pub fn empty(sku: &str) -> Self {
        Self {
            sku: sku.to_string(),
            ..Self::default()
        }
    }
}

/// One entry of a `_fetch-current-price` response.
#[derive(Debug, Deserialize)]
pub struct PriceEntry {
    #[serde(deserialize_with = "de::id")]
    pub sku: String,
    #[serde(default)]
    pub msrp_price: Option<Amount>,
    #[serde(default)]
    pub sale_price: Option<Amount>,
    #[serde(default)]
    pub min_price: Option<Amount>,
    #[serde(default)]
    pub min_epp_price: Option<Amount>,
    #[serde(default)]
    pub list_price: Option<Amount>,
    #[serde(default, deserialize_with = "de::nullable")]
    pub entity_discounts: Vec<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Amount {
    Bare(f64),
    Quoted {
        #[serde(default)]
        value: Option<f64>,
    },
}

impl Amount {
    pub fn value(&self) -> Option<f64> {
        match self {
            Amount::Bare(value) => Some(*value),
            Amount::Quoted { value } => *value,
        }
    }
}

impl PriceEntry {
    pub fn to_record(&self) -> PriceRecord {
        let value = |amount: &Option<Amount>| amount.as_ref().and_then(Amount::value);
        PriceRecord {
            sku: self.sku.clone(),
            msrp_price: value(&self.msrp_price),
            sale_price: value(&self.sale_price),
            min_price: value(&self.min_price),
            min_epp_price: value(&self.min_epp_price),
            list_price: value(&self.list_price),
        }
    }

    /// First mapping entry of `entity_discounts`; other entries are skipped.
    pub fn first_epp_discount(&self) -> Option<EppDiscount> {
        self.entity_discounts
            .iter()
            .filter(|entry| entry.is_object())
            .find_map(|entry| serde_json::from_value::<EntityDiscount>(entry.clone()).ok())
            .map(EntityDiscount::into_discount)
    }
}

#[derive(Debug, Deserialize)]
struct EntityDiscount {
    #[serde(default)]
    discount: Option<DiscountTerms>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    value: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct DiscountTerms {
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    value: Option<f64>,
}

impl EntityDiscount {
    fn into_discount(self) -> EppDiscount {
        match self.discount {
            Some(terms) => EppDiscount {
                kind: terms.kind,
                value: terms.value,
            },
            None => EppDiscount {
                kind: self.kind,
                value: self.value,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EppDiscount {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgramDiscount {
    pub program: String,
    pub discount: Option<EppDiscount>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OfferDiscount {
    pub offer_id: String,
    pub value: Option<i64>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedRow {
    pub sku: String,
    pub price: PriceRecord,
    pub epp: Vec<ProgramDiscount>,
    /// Offer searches for the SKU failed, so `offers` is unknown rather than empty.
    pub search_failed: bool,
    pub offers: Vec<OfferDiscount>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StageReport {
    pub name: String,
    pub elapsed_ms: u128,
    pub timestamp: DateTime<Utc>,
    pub output: Value,
}

impl StageReport {
    pub fn new(name: &str, elapsed_ms: u128, output: Value) -> Self {
        Self {
            name: name.to_string(),
            elapsed_ms,
            timestamp: Utc::now(),
            output,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub primary_offer_id: String,
    pub skus: Vec<String>,
    pub rows: Vec<AggregatedRow>,
    pub not_in_stage: BTreeSet<String>,
    pub failed_skus: Vec<String>,
    pub stages: Vec<StageReport>,
    pub report_path: PathBuf,
}

mod de {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Unsigned(u64),
        Signed(i64),
        Float(f64),
    }

    impl Id {
        fn into_string(self) -> String {
            match self {
                Id::Text(value) => value,
                Id::Unsigned(value) => value.to_string(),
                Id::Signed(value) => value.to_string(),
                Id::Float(value) => value.to_string(),
            }
        }
    }

    /// Identifier that may be encoded as a JSON string or number.
    pub fn id<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        Id::deserialize(deserializer).map(Id::into_string)
    }

    pub fn ids<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let values = Option::<Vec<Id>>::deserialize(deserializer)?;
        Ok(values
            .unwrap_or_default()
            .into_iter()
            .map(Id::into_string)
            .collect())
    }

    pub fn nullable<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
    }

    /// Integral value; fractional numbers are truncated, numeric strings parsed.
    pub fn integral<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<Value>::deserialize(deserializer)? {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(number)) => number
                .as_i64()
                .or_else(|| number.as_f64().map(|value| value.trunc() as i64))
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("number out of range: {number}"))),
            Some(Value::String(text)) => {
                let trimmed = text.trim();
                trimmed
                    .parse::<i64>()
                    .ok()
                    .or_else(|| trimmed.parse::<f64>().ok().map(|value| value.trunc() as i64))
                    .map(Some)
                    .ok_or_else(|| D::Error::custom(format!("not an integral value: `{text}`")))
            }
            Some(other) => Err(D::Error::custom(format!(
                "expected an integral value, found {other}"
            ))),
        }
    }
}
