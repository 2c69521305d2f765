use crate::config::{AppConfig, EppProgram};
use crate::metrics;
use crate::models::{Offer, RunSummary, StageReport};
use crate::price_engine::pricing::price_entries;
use crate::price_engine::{Environment, HttpPriceEngine, PriceEngine, PriceEngineError};
use crate::processing::{OfferProcessor, PriceBook, build_rows};
use crate::report::{ReportError, ReportWriter};
use serde_json::{Value, json};
use std::{
    collections::{BTreeMap, BTreeSet},
    future::Future,
    sync::Arc,
    time::Instant,
};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

pub struct Pipeline<E> {
    pub config: Arc<AppConfig>,
    engine: E,
}

impl Pipeline<HttpPriceEngine> {
    pub fn from_config(config: AppConfig) -> Self {
        let config = Arc::new(config);
        let engine = HttpPriceEngine::new(config.clone());
        Self { config, engine }
    }
}

#[derive(Debug, Default)]
struct SkuResults {
    offers_by_sku: BTreeMap<String, Vec<Offer>>,
    not_in_stage: BTreeSet<String>,
    failed: Vec<String>,
}

struct PriceBooks {
    general: PriceBook,
    programs: Vec<(EppProgram, PriceBook)>,
}

impl<E: PriceEngine> Pipeline<E> {
    pub fn new(config: Arc<AppConfig>, engine: E) -> Self {
        Self { config, engine }
    }

    /// Audits every SKU the primary offer discounts and writes the report.
    ///
    /// Only a missing or unreadable primary offer and report failures abort
    /// the run; per-SKU and per-chunk failures are logged and skipped.
    pub async fn run<R: ReportWriter>(
        &self,
        primary_offer_id: &str,
        report: &mut R,
    ) -> Result<RunSummary, PipelineError> {
        let run_id = Uuid::new_v4();
        let mut stages = Vec::new();
        info!(
            target = "deep_discount.pipeline",
            %run_id,
            primary_offer_id = %primary_offer_id,
            policy = ?self.config.duplicate_policy,
            "run_started"
        );

        let primary = self
            .capture_stage(
                "fetch_primary_offer",
                &mut stages,
                self.fetch_primary_offer(primary_offer_id),
            )
            .await?;

        let processor = OfferProcessor::new(primary, self.config.duplicate_policy);
        let skus = self
            .capture_stage("extract_skus", &mut stages, async {
                let skus = processor.discounted_skus();
                if skus.is_empty() {
                    warn!(
                        target = "deep_discount.pipeline",
                        primary_offer_id = %primary_offer_id,
                        "primary_offer_has_no_skus"
                    );
                }
                let output = json!({ "skus": skus });
                Ok(StageOutcome::new(skus, output))
            })
            .await?;

        let results = self
            .capture_stage(
                "process_skus",
                &mut stages,
                self.process_skus(&processor, &skus, report),
            )
            .await?;

        let books = self
            .capture_stage("fetch_prices", &mut stages, self.fetch_prices(&skus))
            .await?;

        let rows = build_rows(
            &skus,
            &results.offers_by_sku,
            &books.general,
            &books.programs,
        );
        let programs: Vec<EppProgram> = books
            .programs
            .into_iter()
            .map(|(program, _)| program)
            .collect();
        let report_path = self
            .capture_stage("write_report", &mut stages, async {
                report
                    .create_aggregation_sheet(&rows, &programs)
                    .map_err(|err| PipelineError::report("write_report", err))?;
                report
                    .create_gap_sheet(&results.not_in_stage)
                    .map_err(|err| PipelineError::report("write_report", err))?;
                let path = report
                    .save()
                    .map_err(|err| PipelineError::report("write_report", err))?;
                let output = json!({ "rows": rows.len(), "path": path });
                Ok(StageOutcome::new(path, output))
            })
            .await?;

        info!(
            target = "deep_discount.pipeline",
            %run_id,
            skus = skus.len(),
            failed = results.failed.len(),
            not_in_stage = results.not_in_stage.len(),
            path = %report_path.display(),
            "run_finished"
        );

        Ok(RunSummary {
            run_id,
            primary_offer_id: primary_offer_id.to_string(),
            skus: skus.into_iter().collect(),
            rows,
            not_in_stage: results.not_in_stage,
            failed_skus: results.failed,
            stages,
            report_path,
        })
    }

    async fn fetch_primary_offer(
        &self,
        primary_offer_id: &str,
    ) -> Result<StageOutcome<Offer>, PipelineError> {
        const STAGE: &str = "fetch_primary_offer";
        let offers = self
            .engine
            .search_offers_by_id(primary_offer_id, Environment::Staging)
            .await
            .map_err(|err| PipelineError::from_engine(STAGE, err))?;
        // the search may return related offers; prefer the exact id
        let position = offers
            .iter()
            .position(|offer| offer.offer_id == primary_offer_id)
            .unwrap_or(0);
        let offer = offers
            .into_iter()
            .nth(position)
            .ok_or_else(|| PipelineError::not_found(STAGE, primary_offer_id))?;
        let output = json!({
            "offer_id": offer.offer_id,
            "name": offer.name,
            "non_stackable_offer_ids": offer.non_stackable_ids(),
        });
        Ok(StageOutcome::new(offer, output))
    }

    async fn process_skus<R: ReportWriter>(
        &self,
        processor: &OfferProcessor,
        skus: &BTreeSet<String>,
        report: &mut R,
    ) -> Result<StageOutcome<SkuResults>, PipelineError> {
        let mut results = SkuResults::default();
        for sku in skus {
            let candidates = match self.search_sku(sku, Environment::Staging).await {
                Ok(staging) => self
                    .search_sku(sku, Environment::Production)
                    .await
                    .map(|production| (staging, production)),
                Err(err) => Err(err),
            };
            let (staging, production) = match candidates {
                Ok(pair) => pair,
                Err(err) => {
                    error!(
                        target = "deep_discount.pipeline",
                        sku = %sku,
                        error = %err,
                        "sku_search_failed"
                    );
                    metrics::sku_processed("failed");
                    results.failed.push(sku.clone());
                    continue;
                }
            };

            let outcome = processor.apply(staging, production, sku);
            report
                .create_sku_sheet(sku, &outcome.offers)
                .map_err(|err| PipelineError::report("process_skus", err))?;
            metrics::sku_processed("ok");
            results.not_in_stage.extend(outcome.not_in_stage);
            results.offers_by_sku.insert(sku.clone(), outcome.offers);
        }

        let output = json!({
            "processed": results.offers_by_sku.len(),
            "failed_skus": results.failed,
            "not_in_stage": results.not_in_stage,
        });
        Ok(StageOutcome::new(results, output))
    }

    /// Undecodable search responses count as "no offers".
    async fn search_sku(&self, sku: &str, env: Environment) -> Result<Vec<Offer>, PriceEngineError> {
        let result = self.engine.search_offers_by_sku(sku, env).await;
        metrics::engine_call("offer_search", result.is_ok());
        match result {
            Err(err) if err.is_malformed() => {
                warn!(
                    target = "deep_discount.pipeline",
                    sku = %sku,
                    env = %env,
                    error = %err,
                    "offer_search_malformed"
                );
                Ok(Vec::new())
            }
            other => other,
        }
    }

    async fn fetch_prices(
        &self,
        skus: &BTreeSet<String>,
    ) -> Result<StageOutcome<PriceBooks>, PipelineError> {
        let skus: Vec<String> = skus.iter().cloned().collect();
        let mut general = PriceBook::new();
        let mut programs: Vec<(EppProgram, PriceBook)> = self
            .config
            .epp_programs
            .iter()
            .map(|program| (program.clone(), PriceBook::new()))
            .collect();

        let mut chunks = 0usize;
        for chunk in skus.chunks(self.config.batch_size.max(1)) {
            chunks += 1;
            general.extend(self.fetch_chunk(chunk, None, "general").await);
            for (program, book) in programs.iter_mut() {
                book.extend(
                    self.fetch_chunk(chunk, Some(program.site_id.as_str()), &program.name)
                        .await,
                );
            }
        }

        let program_entries: serde_json::Map<String, Value> = programs
            .iter()
            .map(|(program, book)| (program.name.clone(), Value::from(book.len())))
            .collect();
        let output = json!({
            "chunks": chunks,
            "general_entries": general.len(),
            "program_entries": program_entries,
        });
        Ok(StageOutcome::new(PriceBooks { general, programs }, output))
    }

    /// One price call. Failures are logged and contribute no entries.
    async fn fetch_chunk(&self, chunk: &[String], site_id: Option<&str>, scope: &str) -> Vec<Value> {
        let payload = self.engine.fetch_current_price(chunk, site_id).await;
        metrics::engine_call("fetch_price", payload.is_ok());
        match payload.and_then(price_entries) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(
                    target = "deep_discount.pipeline",
                    scope = %scope,
                    skus = chunk.len(),
                    error = %err,
                    "price_chunk_failed"
                );
                Vec::new()
            }
        }
    }

    async fn capture_stage<T, Fut>(
        &self,
        name: &'static str,
        stages: &mut Vec<StageReport>,
        fut: Fut,
    ) -> Result<T, PipelineError>
    where
        Fut: Future<Output = Result<StageOutcome<T>, PipelineError>>,
    {
        let started = Instant::now();
        let outcome = fut.await?;
        let elapsed_ms = started.elapsed().as_millis();
        metrics::stage_elapsed(name, elapsed_ms);
        stages.push(StageReport::new(name, elapsed_ms, outcome.output));
        Ok(outcome.value)
    }
}

#[derive(Debug, Error)]
#[error("stage `{stage}` failed: {message}")]
pub struct PipelineError {
    stage: &'static str,
    message: String,
    kind: PipelineErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineErrorKind {
    NotFound,
    Transport,
    MalformedData,
    Report,
}

impl PipelineError {
    pub fn not_found(stage: &'static str, offer_id: &str) -> Self {
        Self {
            stage,
            message: format!("offer `{offer_id}` not found"),
            kind: PipelineErrorKind::NotFound,
        }
    }

    pub fn from_engine(stage: &'static str, err: PriceEngineError) -> Self {
        let kind = if err.is_malformed() {
            PipelineErrorKind::MalformedData
        } else {
            PipelineErrorKind::Transport
        };
        Self {
            stage,
            message: err.to_string(),
            kind,
        }
    }

    pub fn report(stage: &'static str, err: ReportError) -> Self {
        Self {
            stage,
            message: err.to_string(),
            kind: PipelineErrorKind::Report,
        }
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn kind(&self) -> PipelineErrorKind {
        self.kind
    }

    pub fn detail(&self) -> &str {
        &self.message
    }
}

#[derive(Debug)]
pub struct StageOutcome<T> {
    pub value: T,
    pub output: Value,
}

impl<T> StageOutcome<T> {
    fn new(value: T, output: Value) -> Self {
        Self { value, output }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::DuplicatePolicy;
    use crate::report::{Cell, MemoryReport};
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeEngine {
        primary: HashMap<String, Vec<Offer>>,
        by_sku: HashMap<String, Vec<Offer>>,
        unreachable: HashSet<String>,
        malformed: HashSet<String>,
        general_prices: Vec<Value>,
        program_prices: HashMap<String, Vec<Value>>,
        garbled_sites: HashSet<String>,
        price_calls: Mutex<Vec<(Vec<String>, Option<String>)>>,
    }

    fn key(env: Environment, sku: &str) -> String {
        format!("{env}:{sku}")
    }

    impl FakeEngine {
        fn offers(mut self, env: Environment, sku: &str, offers: Vec<Offer>) -> Self {
            self.by_sku.insert(key(env, sku), offers);
            self
        }

        fn price_calls(&self) -> Vec<(Vec<String>, Option<String>)> {
            self.price_calls.lock().expect("lock").clone()
        }
    }

    impl PriceEngine for FakeEngine {
        async fn search_offers_by_id(
            &self,
            offer_id: &str,
            env: Environment,
        ) -> Result<Vec<Offer>, PriceEngineError> {
            assert_eq!(env, Environment::Staging);
            if self.unreachable.contains(offer_id) {
                return Err(PriceEngineError::Request("connection refused".into()));
            }
            Ok(self.primary.get(offer_id).cloned().unwrap_or_default())
        }

        async fn search_offers_by_sku(
            &self,
            sku: &str,
            env: Environment,
        ) -> Result<Vec<Offer>, PriceEngineError> {
            let key = key(env, sku);
            if self.unreachable.contains(&key) {
                return Err(PriceEngineError::Status {
                    status: 502,
                    url: "http://engine/offers/_search".into(),
                });
            }
            if self.malformed.contains(&key) {
                return Err(PriceEngineError::Decode("expected value".into()));
            }
            Ok(self.by_sku.get(&key).cloned().unwrap_or_default())
        }

        async fn fetch_current_price(
            &self,
            skus: &[String],
            site_id: Option<&str>,
        ) -> Result<Value, PriceEngineError> {
            self.price_calls
                .lock()
                .expect("lock")
                .push((skus.to_vec(), site_id.map(str::to_string)));
            let entries = match site_id {
                None => self.general_prices.clone(),
                Some(site) if self.garbled_sites.contains(site) => return Ok(json!("oops")),
                Some(site) => self.program_prices.get(site).cloned().unwrap_or_default(),
            };
            let scoped: Vec<Value> = entries
                .into_iter()
                .filter(|entry| {
                    entry
                        .get("sku")
                        .and_then(Value::as_str)
                        .is_some_and(|sku| skus.iter().any(|s| s == sku))
                })
                .collect();
            Ok(json!({ "result": scoped }))
        }
    }

    fn offer(value: Value) -> Offer {
        serde_json::from_value(value).expect("offer")
    }

    fn covering(id: &str, skus: &[&str]) -> Offer {
        offer(json!({
            "offer_id": id,
            "discounted_skus": skus,
            "discount_description": [{"skus": skus, "value": 50, "type": "AMOUNT"}],
        }))
    }

    /// Primary P discounts S1 and S2 and refuses to stack with O3.
    fn two_sku_engine() -> FakeEngine {
        let primary = offer(json!({
            "offer_id": "P",
            "discounted_skus": [{"groups": [{"skus": ["S2", "S1"], "quantity": 1}]}],
            "offer_id_restriction": {"non_stackable_offer_ids": ["O3"]},
        }));
        let o1 = covering("O1", &["S1", "S2"]);
        let o4 = offer(json!({
            "offer_id": "O4",
            "discounted_skus": ["S2"],
            "offer_id_restriction": {"non_stackable_offer_ids": ["P"]},
        }));
        let mut engine = FakeEngine::default()
            .offers(
                Environment::Staging,
                "S1",
                vec![o1.clone(), covering("O3", &["S1"])],
            )
            .offers(Environment::Production, "S1", vec![o1.clone()])
            .offers(Environment::Staging, "S2", vec![o1.clone(), o4])
            .offers(
                Environment::Production,
                "S2",
                vec![o1, covering("O2", &["S2"])],
            );
        engine.primary.insert("P".into(), vec![primary]);
        engine.general_prices = vec![json!({
            "sku": "S1",
            "msrp_price": {"value": 500.0},
            "sale_price": {"value": 450.0}
        })];
        engine.program_prices.insert(
            "3155000".into(),
            vec![json!({
                "sku": "S2",
                "entity_discounts": [{"discount": {"type": "PERCENT", "value": 10}}]
            })],
        );
        engine
    }

    fn pipeline(engine: FakeEngine) -> Pipeline<FakeEngine> {
        Pipeline::new(Arc::new(AppConfig::default()), engine)
    }

    fn offer_ids(summary: &RunSummary, row: usize) -> Vec<&str> {
        summary.rows[row]
            .offers
            .iter()
            .map(|o| o.offer_id.as_str())
            .collect()
    }

    #[tokio::test]
    async fn audits_two_skus_end_to_end() {
        let pipeline = pipeline(two_sku_engine());
        let mut report = MemoryReport::default();
        let summary = pipeline.run("P", &mut report).await.expect("run");

        assert_eq!(summary.skus, vec!["S1", "S2"]);
        assert_eq!(summary.rows.len(), 2);
        assert_eq!(offer_ids(&summary, 0), vec!["O1"]);
        assert_eq!(offer_ids(&summary, 1), vec!["O1"]);
        assert_eq!(summary.rows[0].offers[0].value, Some(50));
        assert_eq!(summary.rows[0].price.msrp_price, Some(500.0));
        assert_eq!(summary.rows[1].price.msrp_price, None);
        assert_eq!(
            summary.rows[1].epp[0].discount.as_ref().and_then(|d| d.value),
            Some(10.0)
        );
        assert_eq!(summary.not_in_stage, BTreeSet::from(["O2".to_string()]));
        assert!(summary.failed_skus.is_empty());

        let sheets: Vec<&str> = report.sheets.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(sheets, vec!["S1", "S2", "Aggregation", "Not In Stage"]);
        assert!(report.saved);
        let gap = report.sheet("Not In Stage").expect("gap sheet");
        assert_eq!(gap.rows, vec![vec![Cell::Text("O2".into())]]);

        let names: Vec<&str> = summary.stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "fetch_primary_offer",
                "extract_skus",
                "process_skus",
                "fetch_prices",
                "write_report"
            ]
        );
    }

    #[tokio::test]
    async fn production_only_offer_for_second_sku_lands_in_gap() {
        let primary = offer(json!({"offer_id": "P", "discounted_skus": ["S1", "S2"]}));
        let o1 = covering("O1", &["S1"]);
        let mut engine = FakeEngine::default()
            .offers(Environment::Staging, "S1", vec![o1.clone()])
            .offers(Environment::Production, "S1", vec![o1])
            .offers(Environment::Production, "S2", vec![covering("O2", &["S2"])]);
        engine.primary.insert("P".into(), vec![primary]);
        let mut report = MemoryReport::default();
        let summary = pipeline(engine).run("P", &mut report).await.expect("run");

        let s1 = report.sheet("S1").expect("S1 sheet");
        assert_eq!(s1.rows.len(), 1);
        assert_eq!(s1.rows[0][0], Cell::Text("O1".into()));
        assert!(report.sheet("S2").expect("S2 sheet").rows.is_empty());
        assert_eq!(summary.rows.len(), 2);
        assert_eq!(offer_ids(&summary, 0), vec!["O1"]);
        assert!(summary.rows[1].offers.is_empty());
        assert_eq!(summary.not_in_stage, BTreeSet::from(["O2".to_string()]));
    }

    #[tokio::test]
    async fn prod_exclusive_policy_keeps_only_production_offers() {
        let mut config = AppConfig::default();
        config.duplicate_policy = DuplicatePolicy::ProdExclusive;
        let pipeline = Pipeline::new(Arc::new(config), two_sku_engine());
        let mut report = MemoryReport::default();
        let summary = pipeline.run("P", &mut report).await.expect("run");

        assert!(summary.rows[0].offers.is_empty());
        assert_eq!(offer_ids(&summary, 1), vec!["O2"]);
        assert_eq!(summary.not_in_stage, BTreeSet::from(["O2".to_string()]));
    }

    #[tokio::test]
    async fn repeated_runs_produce_identical_rows() {
        let pipeline = pipeline(two_sku_engine());
        let first = pipeline
            .run("P", &mut MemoryReport::default())
            .await
            .expect("first");
        let second = pipeline
            .run("P", &mut MemoryReport::default())
            .await
            .expect("second");
        assert_eq!(
            serde_json::to_value(&first.rows).expect("rows"),
            serde_json::to_value(&second.rows).expect("rows")
        );
        assert_eq!(first.not_in_stage, second.not_in_stage);
        assert_ne!(first.run_id, second.run_id);
    }

    #[tokio::test]
    async fn missing_primary_offer_is_fatal() {
        let pipeline = pipeline(two_sku_engine());
        let mut report = MemoryReport::default();
        let err = pipeline.run("NOPE", &mut report).await.expect_err("missing");
        assert_eq!(err.kind(), PipelineErrorKind::NotFound);
        assert_eq!(err.stage(), "fetch_primary_offer");
        assert!(err.detail().contains("NOPE"));
        assert!(report.sheets.is_empty());
        assert!(!report.saved);
    }

    #[tokio::test]
    async fn primary_lookup_prefers_the_requested_id() {
        let mut engine = two_sku_engine();
        let primary = engine.primary.remove("P").expect("primary");
        let mut listed = vec![offer(json!({"offer_id": "OTHER", "discounted_skus": ["S9"]}))];
        listed.extend(primary);
        engine.primary.insert("P".into(), listed);
        let summary = pipeline(engine)
            .run("P", &mut MemoryReport::default())
            .await
            .expect("run");
        assert_eq!(summary.skus, vec!["S1", "S2"]);
        assert_eq!(summary.stages[0].output["offer_id"], json!("P"));
    }

    #[tokio::test]
    async fn primary_lookup_falls_back_to_first_offer() {
        let mut engine = two_sku_engine();
        engine.primary.insert(
            "ALIAS".into(),
            vec![offer(json!({"offer_id": "P-7", "discounted_skus": ["S1"]}))],
        );
        let summary = pipeline(engine)
            .run("ALIAS", &mut MemoryReport::default())
            .await
            .expect("run");
        assert_eq!(summary.skus, vec!["S1"]);
    }

    #[tokio::test]
    async fn unreachable_primary_is_a_transport_error() {
        let mut engine = two_sku_engine();
        engine.unreachable.insert("P".into());
        let err = pipeline(engine)
            .run("P", &mut MemoryReport::default())
            .await
            .expect_err("unreachable");
        assert_eq!(err.kind(), PipelineErrorKind::Transport);
    }

    #[tokio::test]
    async fn failed_sku_keeps_its_row_but_not_its_sheet() {
        let mut engine = two_sku_engine();
        engine.unreachable.insert(key(Environment::Staging, "S2"));
        let mut report = MemoryReport::default();
        let summary = pipeline(engine).run("P", &mut report).await.expect("run");

        assert_eq!(summary.failed_skus, vec!["S2"]);
        assert_eq!(summary.rows.len(), 2);
        assert_eq!(summary.rows[1].sku, "S2");
        assert!(summary.rows[1].offers.is_empty());
        assert!(summary.rows[1].search_failed);
        assert!(!summary.rows[0].search_failed);
        assert!(summary.not_in_stage.is_empty());
        assert!(report.sheet("S2").is_none());
        assert!(report.sheet("S1").is_some());
    }

    #[tokio::test]
    async fn malformed_search_counts_as_no_offers() {
        let mut engine = two_sku_engine();
        engine.malformed.insert(key(Environment::Production, "S2"));
        let summary = pipeline(engine)
            .run("P", &mut MemoryReport::default())
            .await
            .expect("run");
        assert!(summary.failed_skus.is_empty());
        assert!(summary.not_in_stage.is_empty());
        assert_eq!(offer_ids(&summary, 1), vec!["O1"]);
    }

    #[tokio::test]
    async fn garbled_price_payload_leaves_fields_empty() {
        let mut engine = two_sku_engine();
        engine.garbled_sites.insert("3155000".into());
        let summary = pipeline(engine)
            .run("P", &mut MemoryReport::default())
            .await
            .expect("run");
        assert_eq!(summary.rows[1].epp[0].discount, None);
        assert_eq!(summary.rows[0].price.msrp_price, Some(500.0));
    }

    #[tokio::test]
    async fn prices_are_fetched_per_chunk_and_scope() {
        let mut config = AppConfig::default();
        config.batch_size = 1;
        let pipeline = Pipeline::new(Arc::new(config), two_sku_engine());
        pipeline
            .run("P", &mut MemoryReport::default())
            .await
            .expect("run");

        let calls = pipeline.engine.price_calls();
        assert_eq!(calls.len(), 6);
        assert_eq!(calls[0], (vec!["S1".to_string()], None));
        assert_eq!(calls[1], (vec!["S1".to_string()], Some("3155000".to_string())));
        assert_eq!(
            calls[2],
            (vec!["S1".to_string()], Some("4789760940".to_string()))
        );
        assert_eq!(calls[3], (vec!["S2".to_string()], None));
    }

    #[tokio::test]
    async fn primary_without_skus_writes_empty_report() {
        let mut engine = FakeEngine::default();
        engine
            .primary
            .insert("P".into(), vec![offer(json!({"offer_id": "P"}))]);
        let mut report = MemoryReport::default();
        let summary = pipeline(engine).run("P", &mut report).await.expect("run");

        assert!(summary.rows.is_empty());
        assert!(aggregation_is_empty(&report));
        assert!(report.saved);
    }

    fn aggregation_is_empty(report: &MemoryReport) -> bool {
        report
            .sheet("Aggregation")
            .is_some_and(|table| table.rows.is_empty())
    }
}
