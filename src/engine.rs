//! End-to-end discovery: strategy, fan-out, merge, enrich, score.

use std::sync::Arc;
use std::time::Duration;

use crate::ai::OpenAiSummarizer;
use crate::config::Config;
use crate::context::DiscoveryContext;
use crate::dedup;
use crate::enrichment::EnrichmentPipeline;
use crate::errors::AppError;
use crate::models::{DiscoveryOutcome, DiscoveryRequest, Strategy, StrategyOverrides};
use crate::orchestrator::Orchestrator;
use crate::scoring::{OutcomeHistory, ScoringEngine, WeightsStore};
use crate::sources::SourceRegistry;
use crate::strategy::select_strategy;
use crate::website::WebsiteFetcher;

pub struct DiscoveryEngine {
    orchestrator: Orchestrator,
    enrichment: EnrichmentPipeline,
    scoring: ScoringEngine,
    location_delay: Duration,
}

impl DiscoveryEngine {
    pub fn new(
        orchestrator: Orchestrator,
        enrichment: EnrichmentPipeline,
        scoring: ScoringEngine,
        location_delay: Duration,
    ) -> Self {
        Self {
            orchestrator,
            enrichment,
            scoring,
            location_delay,
        }
    }

    /// Wire every concrete adapter and provider from configuration.
    pub fn from_config(
        config: &Config,
        client: reqwest::Client,
        weights: Arc<WeightsStore>,
        history: Arc<dyn OutcomeHistory>,
    ) -> Self {
        let registry = SourceRegistry::from_config(config, client.clone());
        let pages = WebsiteFetcher::new(client.clone());
        let enrichment = EnrichmentPipeline::from_config(config, client.clone(), pages);
        let scoring = ScoringEngine::new(weights, history)
            .with_summarizer(Arc::new(OpenAiSummarizer::new(client, config)));

        let configured = registry.configured();
        if configured.is_empty() {
            tracing::warn!("No discovery sources configured; discovery will return no leads");
        } else {
            tracing::info!("Configured sources: {:?}", configured);
        }

        Self::new(
            Orchestrator::new(registry, config.source_timeout()),
            enrichment,
            scoring,
            config.location_delay(),
        )
    }

    pub fn scoring(&self) -> &ScoringEngine {
        &self.scoring
    }

    pub fn registry(&self) -> &SourceRegistry {
        self.orchestrator.registry()
    }

    /// Strategy a discovery call would use; `max_results` becomes the lead cap
    /// unless the overrides set one.
    pub fn strategy_for(
        industry: &str,
        location: &str,
        max_results: Option<usize>,
        overrides: &StrategyOverrides,
    ) -> Strategy {
        let mut overrides = overrides.clone();
        if overrides.max_leads.is_none() {
            overrides.max_leads = max_results;
        }
        select_strategy(industry, location, Some(&overrides))
    }

    /// Validate and run a request, per location when `multi_location` is set.
    pub async fn discover(
        &self,
        ctx: &DiscoveryContext,
        request: &DiscoveryRequest,
    ) -> Result<DiscoveryOutcome, AppError> {
        let industry = request.industry.trim();
        if industry.is_empty() {
            return Err(AppError::BadRequest("industry is required".to_string()));
        }
        if request.max_results == Some(0) {
            return Err(AppError::BadRequest("max_results must be at least 1".to_string()));
        }

        match request.multi_location {
            Some(ref locations) if !locations.is_empty() => {
                let locations: Vec<String> = locations
                    .iter()
                    .map(|l| l.trim().to_string())
                    .filter(|l| !l.is_empty())
                    .collect();
                if locations.is_empty() {
                    return Err(AppError::BadRequest("multi_location has no usable locations".to_string()));
                }
                Ok(self
                    .discover_many(ctx, industry, &locations, request.max_results, &request.overrides)
                    .await)
            }
            _ => {
                let location = request.location.trim();
                if location.is_empty() {
                    return Err(AppError::BadRequest("location is required".to_string()));
                }
                Ok(self
                    .discover_location(ctx, industry, location, request.max_results, &request.overrides)
                    .await)
            }
        }
    }

    /// One full pipeline pass for a single location. Never fails; source
    /// problems are reported in the outcome.
    pub async fn discover_location(
        &self,
        ctx: &DiscoveryContext,
        industry: &str,
        location: &str,
        max_results: Option<usize>,
        overrides: &StrategyOverrides,
    ) -> DiscoveryOutcome {
        let strategy = Self::strategy_for(industry, location, max_results, overrides);
        tracing::info!(
            "=== Discovery: '{}' in '{}' via {:?} (max {}, tenant {}) ===",
            industry,
            location,
            strategy.sources,
            strategy.max_leads,
            ctx.tenant_id.as_deref().unwrap_or("-")
        );

        let results = self.orchestrator.discover(ctx, industry, location, &strategy).await;
        let all_sources_failed = results.all_sources_failed();

        let leads = dedup::merge(results.candidates, &strategy.dedup_keys, location);
        let (leads, stats) = self.enrichment.enrich(ctx, leads, &strategy).await;
        tracing::debug!("Enrichment stats: {:?}", stats);

        let mut leads = self.scoring.score_all(ctx, leads, strategy.sort_by).await;
        leads.truncate(strategy.max_leads);

        tracing::info!(
            "Discovery '{}' in '{}' finished: {} leads, {} source errors",
            industry,
            location,
            leads.len(),
            results.errors.len()
        );

        DiscoveryOutcome {
            leads,
            sources_used: results.sources_used,
            errors: results.errors,
            all_sources_failed,
            skipped_locations: Vec::new(),
        }
    }

    /// Run each location in turn with a pause between them and concatenate
    /// the results. Leads are not deduplicated across locations. Locations
    /// never started before the deadline are listed in `skipped_locations`.
    pub async fn discover_many(
        &self,
        ctx: &DiscoveryContext,
        industry: &str,
        locations: &[String],
        max_per_location: Option<usize>,
        overrides: &StrategyOverrides,
    ) -> DiscoveryOutcome {
        let mut outcomes = Vec::with_capacity(locations.len());
        let mut skipped = Vec::new();

        for (i, location) in locations.iter().enumerate() {
            let mut stopped = ctx.is_done();
            if !stopped && i > 0 && !self.location_delay.is_zero() {
                stopped = ctx
                    .bounded(None, tokio::time::sleep(self.location_delay))
                    .await
                    .is_err();
            }
            if stopped {
                skipped = locations[i..].to_vec();
                tracing::warn!(
                    "Multi-location discovery stopped after {} of {} locations; skipped {:?}",
                    i,
                    locations.len(),
                    skipped
                );
                break;
            }
            outcomes.push(
                self.discover_location(ctx, industry, location, max_per_location, overrides)
                    .await,
            );
        }

        let mut outcome = DiscoveryOutcome::concat(outcomes);
        outcome.skipped_locations = skipped;
        outcome
    }
}
