//! Concurrent fan-out to the strategy's sources.
//!
//! One unit of work per selected source, all bounded by the caller's
//! [`DiscoveryContext`]. A failing source is recorded and skipped; the call
//! itself never fails.

use futures::future::join_all;
use std::time::Duration;

use crate::context::{DiscoveryContext, Interrupted};
use crate::errors::SourceError;
use crate::models::{Candidate, SourceName, Strategy};
use crate::sources::SourceRegistry;

/// Everything one fan-out produced.
#[derive(Debug, Clone, Default)]
pub struct SourceResults {
    /// In strategy source order, then each source's own order.
    pub candidates: Vec<Candidate>,
    /// Sources that answered, even with zero results.
    pub sources_used: Vec<SourceName>,
    pub errors: Vec<SourceError>,
}

impl SourceResults {
    /// True when at least one source was attempted and none answered.
    pub fn all_sources_failed(&self) -> bool {
        self.sources_used.is_empty() && !self.errors.is_empty()
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    registry: SourceRegistry,
    source_timeout: Duration,
}

impl Orchestrator {
    pub fn new(registry: SourceRegistry, source_timeout: Duration) -> Self {
        Self {
            registry,
            source_timeout,
        }
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Query every source in `strategy` concurrently and collect what comes back.
    pub async fn discover(
        &self,
        ctx: &DiscoveryContext,
        industry: &str,
        location: &str,
        strategy: &Strategy,
    ) -> SourceResults {
        let cap = strategy.per_source_limit();
        let mut results = SourceResults::default();

        if cap == 0 {
            tracing::warn!("Strategy for '{}' selects no sources", industry);
            return results;
        }

        let mut pending = Vec::with_capacity(strategy.sources.len());
        for &source in &strategy.sources {
            let Some(adapter) = self.registry.get(source) else {
                tracing::warn!("Source {} not configured: no adapter registered", source);
                results.errors.push(SourceError::not_configured(source));
                continue;
            };
            if !adapter.is_configured() {
                tracing::warn!("Source {} not configured, skipping", source);
                results.errors.push(SourceError::not_configured(source));
                continue;
            }

            let timeout = self.source_timeout;
            pending.push(async move {
                tracing::info!("Querying source {} (limit {})", source, cap);
                let outcome = ctx
                    .bounded(Some(timeout), adapter.search(ctx, industry, location, cap))
                    .await;
                (source, outcome)
            });
        }

        for (source, outcome) in join_all(pending).await {
            match outcome {
                Ok(Ok(mut candidates)) => {
                    if candidates.len() > cap {
                        tracing::debug!(
                            "Source {} returned {} candidates, truncating to {}",
                            source,
                            candidates.len(),
                            cap
                        );
                        candidates.truncate(cap);
                    }
                    candidates.retain(|c| {
                        let keep = !c.name.trim().is_empty();
                        if !keep {
                            tracing::debug!("Dropping nameless candidate from {}", source);
                        }
                        keep
                    });
                    tracing::info!("Source {} returned {} candidates", source, candidates.len());
                    results.sources_used.push(source);
                    results.candidates.extend(candidates);
                }
                Ok(Err(e)) => {
                    tracing::warn!("Source {} failed: {}", source, e);
                    results.errors.push(SourceError::unavailable(source, e.to_string()));
                }
                Err(Interrupted::Timeout) => {
                    tracing::warn!("Source {} failed: deadline exceeded", source);
                    results.errors.push(SourceError::timeout(source));
                }
                Err(Interrupted::Cancelled) => {
                    tracing::warn!("Source {} abandoned: discovery cancelled", source);
                    results.errors.push(SourceError::cancelled(source));
                }
            }
        }

        if results.all_sources_failed() {
            tracing::error!(
                "All {} sources failed for '{}' in '{}'",
                results.errors.len(),
                industry,
                location
            );
            results.candidates.clear();
        }

        results
    }
}
