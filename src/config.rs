use crate::processing::offers::DuplicatePolicy;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

const STAGE_OFFER_SEARCH_URL: &str = "https://us.ecom-stg.samsung.com/v4/price-engine/offers/_search";
const PROD_OFFER_SEARCH_URL: &str = "https://us.ecom.samsung.com/v4/price-engine/offers/_search";
const STAGE_FETCH_PRICE_URL: &str =
    "https://us.ecom-stg.samsung.com/v4/price-engine/product-pricing/_fetch-current-price";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for `{key}`: `{value}`")]
    InvalidValue { key: &'static str, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub endpoints: Endpoints,
    pub http: HttpSettings,
    pub store_type: String,
    pub batch_size: usize,
    pub epp_programs: Vec<EppProgram>,
    pub duplicate_policy: DuplicatePolicy,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Endpoints {
    pub stage_offer_search: String,
    pub prod_offer_search: String,
    pub fetch_price: String,
}

#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub cookie: Option<String>,
}

/// A price program whose site id scopes the EPP discount lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EppProgram {
    pub name: String,
    pub site_id: String,
}

impl EppProgram {
    pub fn new(name: impl Into<String>, site_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            site_id: site_id.into(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            endpoints: Endpoints {
                stage_offer_search: STAGE_OFFER_SEARCH_URL.to_string(),
                prod_offer_search: PROD_OFFER_SEARCH_URL.to_string(),
                fetch_price: STAGE_FETCH_PRICE_URL.to_string(),
            },
            http: HttpSettings {
                timeout_secs: 15,
                connect_timeout_secs: 5,
                cookie: None,
            },
            store_type: "B2C".to_string(),
            batch_size: 50,
            epp_programs: vec![
                EppProgram::new("SEA EPP", "3155000"),
                EppProgram::new("General EPP", "4789760940"),
            ],
            duplicate_policy: DuplicatePolicy::PassThrough,
            output_dir: PathBuf::from("."),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let mut config = Self::default();
        if let Some(value) = read("DD_STAGE_OFFER_SEARCH_URL") {
            config.endpoints.stage_offer_search = value;
        }
        if let Some(value) = read("DD_PROD_OFFER_SEARCH_URL") {
            config.endpoints.prod_offer_search = value;
        }
        if let Some(value) = read("DD_FETCH_PRICE_URL") {
            config.endpoints.fetch_price = value;
        }
        if let Some(value) = read("DD_STORE_TYPE") {
            config.store_type = value;
        }
        if let Some(value) = read("DD_BATCH_SIZE") {
            config.batch_size = parse_number("DD_BATCH_SIZE", &value)?;
        }
        if let Some(value) = read("DD_EPP_PROGRAMS") {
            config.epp_programs = parse_programs(&value)?;
        }
        if let Some(value) = read("DD_DUPLICATE_POLICY") {
            config.duplicate_policy =
                value
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue {
                        key: "DD_DUPLICATE_POLICY",
                        value: value.clone(),
                    })?;
        }
        if let Some(value) = read("DD_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(value);
        }
        if let Some(value) = read("DD_COOKIE") {
            config.http.cookie = Some(value);
        }
        if let Some(value) = read("HTTP_TIMEOUT_SECS") {
            config.http.timeout_secs = parse_number("HTTP_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read("HTTP_CONNECT_TIMEOUT_SECS") {
            config.http.connect_timeout_secs = parse_number("HTTP_CONNECT_TIMEOUT_SECS", &value)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Validation(
                "batch size must be at least 1".into(),
            ));
        }
        for (label, url) in [
            ("stage offer search", &self.endpoints.stage_offer_search),
            ("prod offer search", &self.endpoints.prod_offer_search),
            ("fetch price", &self.endpoints.fetch_price),
        ] {
            if reqwest::Url::parse(url).is_err() {
                return Err(ConfigError::Validation(format!(
                    "{label} url is not valid: `{url}`"
                )));
            }
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.parse::<T>().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}

/// Parses `Name=site_id` pairs separated by commas.
fn parse_programs(raw: &str) -> Result<Vec<EppProgram>, ConfigError> {
    let mut programs = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let Some((name, site_id)) = entry.split_once('=') else {
            return Err(ConfigError::InvalidValue {
                key: "DD_EPP_PROGRAMS",
                value: entry.to_string(),
            });
        };
        let (name, site_id) = (name.trim(), site_id.trim());
        if name.is_empty() || site_id.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "DD_EPP_PROGRAMS",
                value: entry.to_string(),
            });
        }
        programs.push(EppProgram::new(name, site_id));
    }
    Ok(programs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_price_engine_constants() {
        let config = AppConfig::from_lookup(|_| None).expect("config");
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.store_type, "B2C");
        assert_eq!(config.duplicate_policy, DuplicatePolicy::PassThrough);
        assert_eq!(
            config.epp_programs,
            parse_programs("SEA EPP=3155000,General EPP=4789760940").unwrap()
        );
        assert!(config.endpoints.prod_offer_search.contains("us.ecom.samsung.com"));
    }

    #[test]
    fn env_overrides_are_applied() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("DD_BATCH_SIZE", "10"),
            ("DD_DUPLICATE_POLICY", "prod-exclusive"),
            ("DD_EPP_PROGRAMS", "Corp=42"),
            ("DD_COOKIE", "ecom_session=1"),
            ("HTTP_TIMEOUT_SECS", "30"),
        ]))
        .expect("config");
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.duplicate_policy, DuplicatePolicy::ProdExclusive);
        assert_eq!(config.epp_programs, vec![EppProgram::new("Corp", "42")]);
        assert_eq!(config.http.cookie.as_deref(), Some("ecom_session=1"));
        assert_eq!(config.http.timeout_secs, 30);
    }

    #[test]
    fn rejects_zero_batch_size() {
        let err = AppConfig::from_lookup(lookup_from(&[("DD_BATCH_SIZE", "0")]))
            .expect_err("zero batch");
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn rejects_malformed_program_list() {
        let err = AppConfig::from_lookup(lookup_from(&[("DD_EPP_PROGRAMS", "SEA EPP")]))
            .expect_err("missing site id");
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "DD_EPP_PROGRAMS",
                ..
            }
        ));
    }

    #[test]
    fn rejects_unknown_duplicate_policy() {
        let err = AppConfig::from_lookup(lookup_from(&[("DD_DUPLICATE_POLICY", "merge")]))
            .expect_err("unknown policy");
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
