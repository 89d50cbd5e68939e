//! The recommendation state machine: extraction, context, optional
//! preference merge, model advice or keyword fallback, validation, catalog
//! query and reasons.

pub mod fallback;
pub mod merge;

use std::{fmt, fmt::Write as _, panic::AssertUnwindSafe, sync::Arc};

use anyhow::{Context as _, Result};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument};

use self::{fallback::keyword_fallback, merge::merge_preference};
use crate::{
    catalog::{arrange, Catalog, Dish},
    context::{ContextSnapshot, ContextSource},
    criteria::{validate, FilterCriteria, RawCriteria},
    extractor::{extract, ExtractionResult},
    llm::{Advice, ModelAdvisor},
    reason::{compose, yuan},
};

const UNAVAILABLE_TEXT: &str =
    "Sorry, recommendations are unavailable right now. Please try again later.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    Recommendation,
    ChatReply,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    ModelEnhanced,
    KeywordFallback,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationResult {
    pub kind: ResultKind,
    pub text: String,
    pub dishes: Vec<Dish>,
    /// One entry per dish, same order.
    pub reasons: Vec<String>,
    pub processing_mode: ProcessingMode,
    pub context_snapshot: Option<ContextSnapshot>,
    pub applied_criteria: Option<FilterCriteria>,
    pub extraction: Option<ExtractionResult>,
}

impl RecommendationResult {
    fn failure() -> Self {
        Self {
            kind: ResultKind::Error,
            text: UNAVAILABLE_TEXT.to_string(),
            dishes: Vec::new(),
            reasons: Vec::new(),
            processing_mode: ProcessingMode::Error,
            context_snapshot: None,
            applied_criteria: None,
            extraction: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Extract,
    Context,
    MergePreference,
    ModelAdvise,
    KeywordFallback,
    Validate,
    CatalogQuery,
    Compose,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Extract => "extract",
            Stage::Context => "context",
            Stage::MergePreference => "merge_preference",
            Stage::ModelAdvise => "model_advise",
            Stage::KeywordFallback => "keyword_fallback",
            Stage::Validate => "validate",
            Stage::CatalogQuery => "catalog_query",
            Stage::Compose => "compose",
        })
    }
}

fn enter(stage: Stage) {
    debug!(%stage, "Entering stage");
}

pub struct RecommendationOrchestrator {
    catalog: Arc<dyn Catalog>,
    context: Arc<dyn ContextSource>,
    advisor: ModelAdvisor,
}

impl RecommendationOrchestrator {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        context: Arc<dyn ContextSource>,
        advisor: ModelAdvisor,
    ) -> Self {
        Self {
            catalog,
            context,
            advisor,
        }
    }

    /// Always returns a well-formed result. Unexpected failures, panics
    /// included, become a `kind = error` result here and go no further.
    #[instrument(name = "recommend", skip(self, query), fields(query_len = query.len()))]
    pub async fn recommend(
        &self,
        query: &str,
        user_id: Option<u64>,
        merge_preference: bool,
    ) -> RecommendationResult {
        match AssertUnwindSafe(self.run(query, user_id, merge_preference))
            .catch_unwind()
            .await
        {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                error!(error = ?e, "Recommendation failed");
                RecommendationResult::failure()
            }
            Err(_) => {
                error!("Recommendation panicked");
                RecommendationResult::failure()
            }
        }
    }

    async fn run(
        &self,
        query: &str,
        user_id: Option<u64>,
        merge_requested: bool,
    ) -> Result<RecommendationResult> {
        enter(Stage::Extract);
        let extraction = extract(query);

        enter(Stage::Context);
        let context = self.context.snapshot(user_id).await;

        let mut baseline = extraction.criteria.clone();
        if merge_requested && user_id.is_some() {
            match context.stored_preference.as_ref().filter(|p| !p.is_empty()) {
                Some(stored) => {
                    enter(Stage::MergePreference);
                    baseline = merge_preference(&baseline, stored);
                }
                None => debug!("Nothing stored to merge"),
            }
        }

        let mut justification = None;
        let mut mode = ProcessingMode::KeywordFallback;
        let mut raw = None;
        if self.advisor.is_available() {
            enter(Stage::ModelAdvise);
            let advised = ExtractionResult {
                criteria: baseline.clone(),
                confidence: extraction.confidence,
            };
            match self.advisor.advise(query, &advised, &context).await {
                Advice::ToolCall {
                    args,
                    justification: why,
                } => {
                    raw = Some(args);
                    justification = why;
                    mode = ProcessingMode::ModelEnhanced;
                }
                Advice::TextReply { text } if !baseline.has_constraints() => {
                    info!("Model answered small talk");
                    return Ok(RecommendationResult {
                        kind: ResultKind::ChatReply,
                        text,
                        dishes: Vec::new(),
                        reasons: Vec::new(),
                        processing_mode: ProcessingMode::ModelEnhanced,
                        context_snapshot: Some(context),
                        applied_criteria: None,
                        extraction: Some(extraction),
                    });
                }
                Advice::TextReply { .. } => {
                    info!("Model replied in text to a dish request, falling back");
                }
                Advice::Unavailable => info!("Model unavailable, falling back"),
            }
        }
        let raw = match raw {
            Some(raw) => raw,
            None => {
                enter(Stage::KeywordFallback);
                RawCriteria::from(&keyword_fallback(&baseline, &context))
            }
        };

        enter(Stage::Validate);
        let criteria = validate(&raw);

        enter(Stage::CatalogQuery);
        let dishes = self
            .catalog
            .query_dishes(&criteria)
            .await
            .with_context(|| format!("{} stage failed", Stage::CatalogQuery))?;
        let dishes = arrange(dishes, &criteria);

        enter(Stage::Compose);
        let reasons: Vec<String> = dishes
            .iter()
            .map(|dish| compose(dish, query, &context, &criteria))
            .collect();
        let text = render(query, &dishes, &reasons, justification.as_deref());
        info!(dishes = dishes.len(), mode = ?mode, "Recommendation ready");

        Ok(RecommendationResult {
            kind: ResultKind::Recommendation,
            text,
            dishes,
            reasons,
            processing_mode: mode,
            context_snapshot: Some(context),
            applied_criteria: Some(criteria),
            extraction: Some(extraction),
        })
    }
}

fn render(query: &str, dishes: &[Dish], reasons: &[String], justification: Option<&str>) -> String {
    if dishes.is_empty() {
        return format!("No dishes matched \"{}\". Try relaxing your filters.", query.trim());
    }
    let mut text = String::new();
    if let Some(justification) = justification {
        let _ = writeln!(text, "{justification}");
    }
    text.push_str("Recommended for you:");
    for (i, (dish, reason)) in dishes.iter().zip(reasons).enumerate() {
        let _ = write!(
            text,
            "\n{}. {} ({}) - {}: {}",
            i + 1,
            dish.name,
            dish.hall_name,
            yuan(dish.price),
            reason
        );
    }
    text
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::*;
    use crate::{
        catalog::{admits, tests::dish},
        context::tests::snapshot,
        criteria::{Category, CrowdLevel, Taste},
        llm::{
            transport::{ModelReply, ModelTransport, ToolSpec, TransportError},
            TOOL_NAME,
        },
        preference::{PriceRange, StoredPreference},
    };

    struct FixedContext(ContextSnapshot);

    #[async_trait]
    impl ContextSource for FixedContext {
        async fn snapshot(&self, _user_id: Option<u64>) -> ContextSnapshot {
            self.0.clone()
        }
    }

    #[derive(Default)]
    struct RecordingCatalog {
        dishes: Vec<Dish>,
        seen: Mutex<Vec<FilterCriteria>>,
    }

    #[async_trait]
    impl Catalog for RecordingCatalog {
        async fn query_dishes(&self, criteria: &FilterCriteria) -> Result<Vec<Dish>> {
            self.seen.lock().unwrap().push(criteria.clone());
            Ok(self
                .dishes
                .iter()
                .filter(|d| admits(criteria, d))
                .cloned()
                .collect())
        }
    }

    struct BrokenCatalog {
        panics: bool,
    }

    #[async_trait]
    impl Catalog for BrokenCatalog {
        async fn query_dishes(&self, _criteria: &FilterCriteria) -> Result<Vec<Dish>> {
            if self.panics {
                panic!("catalog exploded");
            }
            anyhow::bail!("connection reset")
        }
    }

    enum Model {
        Offline,
        Failing,
        Tool(Value),
        Text(&'static str),
    }

    #[async_trait]
    impl ModelTransport for Model {
        fn is_configured(&self) -> bool {
            !matches!(self, Model::Offline)
        }

        async fn invoke_with_tool(
            &self,
            _system_prompt: &str,
            _user_text: &str,
            _tool: &ToolSpec,
        ) -> std::result::Result<ModelReply, TransportError> {
            match self {
                Model::Offline | Model::Failing => {
                    Err(TransportError::Malformed("no model".to_string()))
                }
                Model::Tool(arguments) => Ok(ModelReply::ToolCall {
                    name: TOOL_NAME.to_string(),
                    arguments: arguments.clone(),
                }),
                Model::Text(text) => Ok(ModelReply::TextReply {
                    text: (*text).to_string(),
                }),
            }
        }
    }

    fn menu() -> Vec<Dish> {
        let mut noodles = dish(1, "Chongqing Noodles", 16.0, Category::Noodle, Taste::Spicy);
        noodles.rating = 4.8;
        noodles.spice_level = 3;
        let mut mapo = dish(2, "Mapo Tofu Rice", 19.0, Category::Staple, Taste::Spicy);
        mapo.rating = 4.6;
        mapo.spice_level = 5;
        let mut dumplings = dish(3, "Pork Dumplings", 14.0, Category::Dumpling, Taste::Salty);
        dumplings.prep_minutes = Some(10);
        let congee = dish(4, "Millet Congee", 6.0, Category::Other, Taste::Mild);
        vec![noodles, mapo, dumplings, congee]
    }

    fn orchestrator(
        catalog: Arc<dyn Catalog>,
        context: ContextSnapshot,
        model: Model,
    ) -> RecommendationOrchestrator {
        RecommendationOrchestrator::new(
            catalog,
            Arc::new(FixedContext(context)),
            ModelAdvisor::new(Arc::new(model)).unwrap(),
        )
    }

    fn recording(dishes: Vec<Dish>) -> Arc<RecordingCatalog> {
        Arc::new(RecordingCatalog {
            dishes,
            ..RecordingCatalog::default()
        })
    }

    #[tokio::test]
    async fn spicy_around_twenty_yuan() {
        let catalog = recording(menu());
        let pipeline = orchestrator(
            catalog.clone(),
            snapshot(20.0, CrowdLevel::Medium),
            Model::Offline,
        );
        let result = pipeline
            .recommend("something spicy around 20 yuan", None, false)
            .await;

        assert_eq!(result.kind, ResultKind::Recommendation);
        assert_eq!(result.processing_mode, ProcessingMode::KeywordFallback);
        let expected = FilterCriteria {
            taste: Some(Taste::Spicy),
            spice_level: Some(5),
            max_price: Some(20.0),
            result_limit: Some(5),
            ..FilterCriteria::default()
        };
        assert_eq!(*catalog.seen.lock().unwrap(), vec![expected.clone()]);
        assert_eq!(result.applied_criteria, Some(expected));
        assert_eq!(result.dishes.len(), 2);
        assert_eq!(result.reasons.len(), result.dishes.len());
        assert!(result.reasons[0].starts_with("spicy, as you asked"));
        assert!(result.text.contains("1. Chongqing Noodles (North Hall) - ¥16"));
    }

    #[tokio::test]
    async fn cold_rush_hour_fallback() {
        let catalog = recording(menu());
        let pipeline = orchestrator(catalog.clone(), snapshot(8.0, CrowdLevel::High), Model::Offline);
        let result = pipeline.recommend("what's for lunch", None, false).await;

        let seen = catalog.seen.lock().unwrap()[0].clone();
        assert_eq!(seen.taste, Some(Taste::Spicy));
        assert_eq!(seen.spice_level, Some(3));
        assert_eq!(seen.max_wait_minutes, Some(15));
        assert_eq!(result.processing_mode, ProcessingMode::KeywordFallback);
        let names: Vec<_> = result.dishes.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["Chongqing Noodles"]);
        assert!(result.reasons[0].starts_with("warms you up at 8°C"));
    }

    #[tokio::test]
    async fn failing_model_still_recommends() {
        for query in ["cheap dumplings", "noodles under 20元", "very spicy rice"] {
            let pipeline = orchestrator(
                recording(menu()),
                snapshot(20.0, CrowdLevel::Low),
                Model::Failing,
            );
            let result = pipeline.recommend(query, None, false).await;
            assert_eq!(result.kind, ResultKind::Recommendation, "{query}");
            assert_eq!(result.processing_mode, ProcessingMode::KeywordFallback);
        }
    }

    #[tokio::test]
    async fn empty_catalog_is_not_an_error() {
        let pipeline = orchestrator(
            recording(Vec::new()),
            snapshot(20.0, CrowdLevel::Low),
            Model::Offline,
        );
        let result = pipeline.recommend("fried rice", None, false).await;
        assert_eq!(result.kind, ResultKind::Recommendation);
        assert!(result.dishes.is_empty());
        assert_eq!(result.text, "No dishes matched \"fried rice\". Try relaxing your filters.");
        assert_eq!(result.processing_mode, ProcessingMode::KeywordFallback);

        let pipeline = orchestrator(
            recording(Vec::new()),
            snapshot(20.0, CrowdLevel::Low),
            Model::Tool(json!({"category": "noodle"})),
        );
        let result = pipeline.recommend("fried rice", None, false).await;
        assert!(result.dishes.is_empty());
        assert_eq!(result.processing_mode, ProcessingMode::ModelEnhanced);
    }

    #[tokio::test]
    async fn model_arguments_are_validated() {
        let catalog = recording(menu());
        let pipeline = orchestrator(
            catalog.clone(),
            snapshot(20.0, CrowdLevel::Low),
            Model::Tool(json!({
                "min_price": 5000,
                "max_price": 10,
                "taste": "umami",
                "limit": 80,
                "sort_by": "price_asc",
                "justification": "Cheap eats, cheapest first."
            })),
        );
        let result = pipeline.recommend("anything good", None, false).await;

        let seen = catalog.seen.lock().unwrap()[0].clone();
        assert_eq!(seen.min_price, Some(10.0));
        assert_eq!(seen.max_price, Some(1000.0));
        assert_eq!(seen.taste, None);
        assert_eq!(seen.result_limit, Some(50));
        assert_eq!(result.processing_mode, ProcessingMode::ModelEnhanced);
        assert!(result.text.starts_with("Cheap eats, cheapest first.\nRecommended for you:"));
        let prices: Vec<_> = result.dishes.iter().map(|d| d.price).collect();
        assert_eq!(prices, [14.0, 16.0, 19.0]);
    }

    #[tokio::test]
    async fn model_keeps_baseline_fields() {
        let catalog = recording(menu());
        let pipeline = orchestrator(
            catalog.clone(),
            snapshot(20.0, CrowdLevel::Low),
            Model::Tool(json!({"sort_by": "rating"})),
        );
        pipeline.recommend("spicy food", None, false).await;
        let seen = catalog.seen.lock().unwrap()[0].clone();
        assert_eq!(seen.taste, Some(Taste::Spicy));
        assert_eq!(seen.spice_level, Some(5));
        assert_eq!(seen.sort_by, Some(crate::criteria::SortOrder::Rating));
    }

    #[tokio::test]
    async fn small_talk_becomes_chat_reply() {
        let pipeline = orchestrator(
            recording(menu()),
            snapshot(20.0, CrowdLevel::Low),
            Model::Text("Hi! Ask me about today's dishes."),
        );
        let result = pipeline.recommend("hello there", None, false).await;
        assert_eq!(result.kind, ResultKind::ChatReply);
        assert_eq!(result.processing_mode, ProcessingMode::ModelEnhanced);
        assert_eq!(result.text, "Hi! Ask me about today's dishes.");
        assert!(result.dishes.is_empty());
    }

    #[tokio::test]
    async fn blank_reply_falls_back() {
        let catalog = recording(menu());
        let pipeline = orchestrator(
            catalog.clone(),
            snapshot(20.0, CrowdLevel::Low),
            Model::Text("  "),
        );
        let result = pipeline.recommend("what's for lunch", None, false).await;
        assert_eq!(result.kind, ResultKind::Recommendation);
        assert_eq!(result.processing_mode, ProcessingMode::KeywordFallback);
        assert!(!result.text.trim().is_empty());
        assert_eq!(catalog.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn text_reply_to_dish_request_falls_back() {
        let catalog = recording(menu());
        let pipeline = orchestrator(
            catalog.clone(),
            snapshot(20.0, CrowdLevel::Low),
            Model::Text("Noodles are great!"),
        );
        let result = pipeline.recommend("noodles", None, false).await;
        assert_eq!(result.kind, ResultKind::Recommendation);
        assert_eq!(result.processing_mode, ProcessingMode::KeywordFallback);
        assert_eq!(catalog.seen.lock().unwrap()[0].category, Some(Category::Noodle));
    }

    #[tokio::test]
    async fn stored_preference_merges_on_request() {
        let mut context = snapshot(20.0, CrowdLevel::Low);
        context.stored_preference = Some(StoredPreference {
            preferred_tastes: vec![Taste::Mild],
            preferred_categories: vec![Category::Dumpling],
            price_range: PriceRange {
                min: 20.0,
                max: 50.0,
            },
            ..StoredPreference::default()
        });

        let catalog = recording(menu());
        let pipeline = orchestrator(catalog.clone(), context.clone(), Model::Offline);
        pipeline.recommend("spicy, 10-30 yuan", Some(7), true).await;
        let seen = catalog.seen.lock().unwrap()[0].clone();
        assert_eq!(seen.taste, Some(Taste::Spicy));
        assert_eq!(seen.category, Some(Category::Dumpling));
        assert_eq!((seen.min_price, seen.max_price), (Some(20.0), Some(30.0)));

        // Not requested, or anonymous: nothing is merged.
        let catalog = recording(menu());
        let pipeline = orchestrator(catalog.clone(), context, Model::Offline);
        pipeline.recommend("spicy, 10-30 yuan", Some(7), false).await;
        pipeline.recommend("spicy, 10-30 yuan", None, true).await;
        for seen in catalog.seen.lock().unwrap().iter() {
            assert_eq!(seen.category, None);
            assert_eq!(seen.min_price, Some(10.0));
        }
    }

    #[tokio::test]
    async fn catalog_failures_become_error_results() {
        for panics in [false, true] {
            let pipeline = orchestrator(
                Arc::new(BrokenCatalog { panics }),
                snapshot(20.0, CrowdLevel::Low),
                Model::Offline,
            );
            let result = pipeline.recommend("noodles", None, false).await;
            assert_eq!(result.kind, ResultKind::Error);
            assert_eq!(result.processing_mode, ProcessingMode::Error);
            assert_eq!(result.text, UNAVAILABLE_TEXT);
            assert!(result.dishes.is_empty());
        }
    }
}
