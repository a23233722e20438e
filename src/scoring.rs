//! Opportunity and predictive scoring.
//!
//! The opportunity score rewards *weak* digital presence: fewer reviews,
//! lower ratings and a missing website all mean more room to sell
//! improvement services. It is capped at 95 so hand-verified leads can sit
//! above anything computed here.

use arc_swap::ArcSwap;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::ai::SummaryProvider;
use crate::context::DiscoveryContext;
use crate::models::{
    Channel, Lead, Outcome, PredictiveScore, ResponseTime, ScoringWeights, SimilarLeadsStats,
    SortBy, WeightSet,
};
use crate::strategy::{classify_industry, IndustryCategory};

pub const OPPORTUNITY_BASE: i32 = 50;
pub const OPPORTUNITY_CEILING: i32 = 95;

/// Conversion rate assumed when an industry has no history.
pub const DEFAULT_CONVERSION_RATE: f64 = 0.15;

/// Outcomes within this many points of a lead's score count as similar.
pub const SIMILAR_SCORE_BAND: u8 = 20;

/// Industries need this many outcomes before weights move off the defaults.
pub const MIN_OUTCOMES_FOR_WEIGHTS: usize = 10;

const LOW_QUALITY_WEBSITE: u8 = 50;

/// Heuristic 0-95 opportunity score.
pub fn opportunity_score(lead: &Lead) -> u8 {
    let mut score = OPPORTUNITY_BASE;
    let reviews = lead.review_count.unwrap_or(0);

    score += match reviews {
        r if r > 200 => 15,
        r if r > 100 => 10,
        r if r > 50 => 5,
        _ => 20,
    };

    // Unknown rating earns no rating bonus
    if let Some(rating) = lead.rating {
        score += if rating < 4.0 && reviews > 20 {
            20
        } else if rating < 4.5 && reviews > 50 {
            15
        } else if rating < 4.7 {
            10
        } else {
            0
        };
    }

    if !lead.has_website() {
        score += 15;
    }

    score.clamp(0, OPPORTUNITY_CEILING) as u8
}

/// Pain points and the matching services, in a fixed order.
pub fn pain_points(lead: &Lead) -> (Vec<String>, Vec<String>) {
    let mut points = Vec::new();
    let mut services: Vec<String> = Vec::new();
    let mut add = |point: &str, service: &str| {
        points.push(point.to_string());
        if !services.iter().any(|s| s == service) {
            services.push(service.to_string());
        }
    };

    if !lead.has_website() {
        add("No website", "Website design");
    } else if lead
        .website_analysis
        .as_ref()
        .is_some_and(|a| a.quality_score < LOW_QUALITY_WEBSITE)
    {
        add("Outdated or low-quality website", "Website redesign");
    }
    if lead.rating.is_some_and(|r| r < 4.0) {
        add("Low average rating", "Reputation management");
    }
    if lead.review_count.unwrap_or(0) < 20 {
        add("Few online reviews", "Review generation");
    }
    if !lead.has_social() {
        add("No social media presence", "Social media management");
    }
    if lead.has_ads != Some(true) {
        add("No online advertising detected", "Paid ads management");
    }
    if !lead.has_email() {
        add("No public email address", "Email marketing setup");
    }

    (points, services)
}

/// Scale applied to weights so that uniform weights leave base points unchanged.
fn weight_scale(weight: f64) -> f64 {
    (weight * WeightSet::SIGNALS as f64).max(0.0)
}

/// Conversion, engagement, channel, response time and confidence for one lead.
pub fn predictive_score(
    lead: &Lead,
    opportunity: u8,
    weights: &WeightSet,
    stats: &SimilarLeadsStats,
) -> PredictiveScore {
    let mut reasoning = Vec::new();
    let reviews = lead.review_count.unwrap_or(0);
    let high_rating = lead.rating.is_some_and(|r| r >= 4.5);

    // Conversion probability
    let base_rate = match stats.conversion_rate {
        Some(rate) => {
            reasoning.push(format!(
                "{:.0}% of {} similar {} leads converted",
                rate * 100.0,
                stats.sample_size,
                lead.industry
            ));
            rate.clamp(0.0, 1.0) * 100.0
        }
        None => {
            reasoning.push(format!(
                "No outcome history for {}; assuming {:.0}% baseline",
                lead.industry,
                DEFAULT_CONVERSION_RATE * 100.0
            ));
            DEFAULT_CONVERSION_RATE * 100.0
        }
    };

    let mut boost = 0.0;
    if lead.has_website() {
        boost += 20.0 * weight_scale(weights.website_quality);
        reasoning.push("Has a website".to_string());
    }
    if lead.has_email() {
        boost += 15.0 * weight_scale(weights.contact_availability);
        reasoning.push("Email address available".to_string());
    }
    if lead.has_phone() {
        boost += 10.0 * weight_scale(weights.contact_availability);
    }
    if high_rating {
        boost += 15.0 * weight_scale(weights.rating);
        reasoning.push("Highly rated".to_string());
    }
    if reviews > 100 {
        boost += 10.0 * weight_scale(weights.review_count);
    }
    if lead.has_social() {
        boost += 15.0 * weight_scale(weights.social_presence);
    }
    if lead.pain_points.len() >= 3 {
        boost += 15.0;
        reasoning.push(format!("{} pain points to address", lead.pain_points.len()));
    }
    let conversion_probability = (base_rate + boost / 10.0).round().clamp(0.0, 100.0) as u8;

    // Engagement
    let mut engagement: u32 = 50;
    if lead.has_email() {
        engagement += 10;
    }
    if lead.has_phone() {
        engagement += 10;
    }
    if lead.has_website() {
        engagement += 5;
    }
    engagement += 5 * lead.social_links.len() as u32;
    if reviews > 50 {
        engagement += 10;
    } else if reviews > 10 {
        engagement += 5;
    }
    if stats.conversion_rate.is_some_and(|r| r > 0.2) {
        engagement += 15;
    }
    let engagement_score = engagement.min(100) as u8;

    let recommended_channel = recommend_channel(lead, stats);
    reasoning.push(format!("Recommended channel: {:?}", recommended_channel).to_lowercase());

    // Response time
    let mut hours = stats.avg_response_hours.unwrap_or(48.0).max(0.0);
    if lead.has_social() {
        hours *= 0.8;
    }
    if reviews > 100 {
        hours *= 0.85;
    }
    if opportunity >= 80 {
        hours *= 0.75;
    }
    let response_time_prediction = if hours < 24.0 {
        ResponseTime::Fast
    } else if hours < 72.0 {
        ResponseTime::Medium
    } else {
        ResponseTime::Slow
    };

    // Confidence
    let mut confidence: f64 = 50.0;
    confidence += match stats.sample_size {
        n if n > 50 => 25.0,
        n if n > 20 => 15.0,
        n if n > 10 => 10.0,
        _ => 0.0,
    };
    let present = [
        lead.has_email(),
        lead.has_phone(),
        lead.has_website(),
        lead.has_social(),
    ]
    .iter()
    .filter(|p| **p)
    .count();
    confidence += 20.0 * present as f64 / 4.0;
    if reviews > 50 {
        confidence += 10.0;
    }
    let confidence = confidence.round().clamp(0.0, 100.0) as u8;

    PredictiveScore {
        conversion_probability,
        engagement_score,
        response_time_prediction,
        recommended_channel,
        reasoning,
        confidence,
    }
}

/// Channel cascade: contact gaps first, then LinkedIn, then industry and history.
pub fn recommend_channel(lead: &Lead, stats: &SimilarLeadsStats) -> Channel {
    let email = lead.has_email();
    let phone = lead.has_phone();

    if !email && phone {
        return Channel::Sms;
    }
    if !phone && email {
        return Channel::Email;
    }
    if lead.has_linkedin() {
        return Channel::Linkedin;
    }

    match classify_industry(&lead.industry) {
        IndustryCategory::B2b if email => Channel::Email,
        IndustryCategory::B2b => Channel::Linkedin,
        IndustryCategory::LocalService if phone => Channel::Sms,
        IndustryCategory::LocalService => Channel::Email,
        IndustryCategory::General => stats.best_channel.unwrap_or(Channel::Email),
    }
}

/// Stable descending sort; ties keep their current order.
pub fn sort_leads(leads: &mut [Lead], sort_by: SortBy) {
    let key = |lead: &Lead| -> f64 {
        match sort_by {
            SortBy::OpportunityScore => lead.opportunity_score as f64,
            SortBy::Rating => lead.rating.unwrap_or(-1.0),
            SortBy::ReviewCount => lead.review_count.map(f64::from).unwrap_or(-1.0),
        }
    };
    leads.sort_by(|a, b| key(b).total_cmp(&key(a)));
}

// ============ Outcome history ============

#[async_trait]
pub trait OutcomeHistory: Send + Sync {
    /// Stats for outcomes in `industry` within the similar-score band of `opportunity_score`.
    async fn similar(&self, industry: &str, opportunity_score: u8) -> SimilarLeadsStats;

    async fn record(&self, outcome: Outcome);

    async fn outcomes(&self) -> Vec<Outcome>;
}

/// Summarise outcomes similar to a lead.
pub fn similar_stats(outcomes: &[Outcome], industry: &str, opportunity_score: u8) -> SimilarLeadsStats {
    let similar: Vec<&Outcome> = outcomes
        .iter()
        .filter(|o| o.industry.eq_ignore_ascii_case(industry))
        .filter(|o| o.opportunity_score.abs_diff(opportunity_score) <= SIMILAR_SCORE_BAND)
        .collect();

    if similar.is_empty() {
        return SimilarLeadsStats::default();
    }

    let converted = similar.iter().filter(|o| o.converted).count();
    let hours: Vec<f64> = similar.iter().filter_map(|o| o.response_hours).collect();
    let avg_response_hours = (!hours.is_empty()).then(|| hours.iter().sum::<f64>() / hours.len() as f64);

    let mut wins: Vec<(Channel, usize)> = Vec::new();
    for outcome in similar.iter().filter(|o| o.converted) {
        let Some(channel) = outcome.channel else { continue };
        match wins.iter_mut().find(|(c, _)| *c == channel) {
            Some((_, n)) => *n += 1,
            None => wins.push((channel, 1)),
        }
    }
    // First channel to reach the top count wins ties
    let best_channel = wins
        .iter()
        .fold(None::<(Channel, usize)>, |best, &(c, n)| match best {
            Some((_, top)) if top >= n => best,
            _ => Some((c, n)),
        })
        .map(|(c, _)| c);

    SimilarLeadsStats {
        sample_size: similar.len() as u32,
        conversion_rate: Some(converted as f64 / similar.len() as f64),
        avg_response_hours,
        best_channel,
    }
}

#[derive(Default)]
pub struct InMemoryOutcomeLog {
    outcomes: RwLock<Vec<Outcome>>,
}

impl InMemoryOutcomeLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OutcomeHistory for InMemoryOutcomeLog {
    async fn similar(&self, industry: &str, opportunity_score: u8) -> SimilarLeadsStats {
        let outcomes = self.outcomes.read().await;
        similar_stats(&outcomes, industry, opportunity_score)
    }

    async fn record(&self, outcome: Outcome) {
        self.outcomes.write().await.push(outcome);
    }

    async fn outcomes(&self) -> Vec<Outcome> {
        self.outcomes.read().await.clone()
    }
}

// ============ Adaptive weights ============

/// Per-industry weights, replaced as a whole so readers never see a partial update.
pub struct WeightsStore {
    inner: ArcSwap<HashMap<String, Arc<ScoringWeights>>>,
}

impl Default for WeightsStore {
    fn default() -> Self {
        Self::new()
    }
}

impl WeightsStore {
    pub fn new() -> Self {
        Self {
            inner: ArcSwap::new(Arc::new(HashMap::new())),
        }
    }

    fn key(industry: &str) -> String {
        industry.trim().to_lowercase()
    }

    /// Current weights for `industry`, or uniform defaults.
    pub fn get(&self, industry: &str) -> Arc<ScoringWeights> {
        self.inner
            .load()
            .get(&Self::key(industry))
            .cloned()
            .unwrap_or_else(|| Arc::new(ScoringWeights::defaults_for(industry)))
    }

    /// Swap in a new snapshot containing `updates` on top of the current map.
    /// Concurrent callers retry on top of each other, so no update is lost.
    pub fn apply(&self, updates: Vec<ScoringWeights>) {
        let updates: Vec<(String, Arc<ScoringWeights>)> = updates
            .into_iter()
            .map(|w| (Self::key(&w.industry), Arc::new(w)))
            .collect();
        let mut count = 0;
        self.inner.rcu(|current| {
            let mut next = HashMap::clone(current);
            for (key, weights) in &updates {
                next.insert(key.clone(), Arc::clone(weights));
            }
            count = next.len();
            Arc::new(next)
        });
        tracing::info!("Scoring weights updated ({} industries)", count);
    }

    pub fn snapshot(&self) -> Vec<ScoringWeights> {
        let mut all: Vec<ScoringWeights> = self.inner.load().values().map(|w| (**w).clone()).collect();
        all.sort_by(|a, b| a.industry.cmp(&b.industry));
        all
    }
}

/// Recompute per-industry weights from outcomes.
///
/// Each signal's weight is proportional to the Laplace-smoothed conversion
/// rate among outcomes that had the signal, normalised to sum to 1.0.
/// Industries with too few outcomes get uniform defaults.
pub fn recalculate_weights(outcomes: &[Outcome], now: DateTime<Utc>) -> Vec<ScoringWeights> {
    let mut by_industry: Vec<(String, Vec<&Outcome>)> = Vec::new();
    for outcome in outcomes {
        let key = outcome.industry.trim().to_lowercase();
        match by_industry.iter_mut().find(|(k, _)| *k == key) {
            Some((_, group)) => group.push(outcome),
            None => by_industry.push((key, vec![outcome])),
        }
    }

    by_industry
        .into_iter()
        .map(|(industry, group)| {
            let sample_size = group.len() as u32;
            if group.len() < MIN_OUTCOMES_FOR_WEIGHTS {
                return ScoringWeights {
                    sample_size,
                    updated_at: Some(now),
                    ..ScoringWeights::defaults_for(&industry)
                };
            }

            let rate = |has: fn(&Outcome) -> bool| -> f64 {
                let with: Vec<&&Outcome> = group.iter().filter(|o| has(o)).collect();
                let converted = with.iter().filter(|o| o.converted).count();
                (converted as f64 + 1.0) / (with.len() as f64 + 2.0)
            };

            let raw = WeightSet {
                website_quality: rate(|o| o.had_website),
                social_presence: rate(|o| o.had_social),
                review_count: rate(|o| o.had_reviews),
                rating: rate(|o| o.had_good_rating),
                contact_availability: rate(|o| o.had_contact),
                ad_presence: rate(|o| o.had_ads),
            };
            let total = raw.sum();
            let weights = WeightSet {
                website_quality: raw.website_quality / total,
                social_presence: raw.social_presence / total,
                review_count: raw.review_count / total,
                rating: raw.rating / total,
                contact_availability: raw.contact_availability / total,
                ad_presence: raw.ad_presence / total,
            };

            ScoringWeights {
                industry,
                weights,
                sample_size,
                updated_at: Some(now),
            }
        })
        .collect()
}

// ============ Engine ============

pub struct ScoringEngine {
    weights: Arc<WeightsStore>,
    history: Arc<dyn OutcomeHistory>,
    summarizer: Option<Arc<dyn SummaryProvider>>,
}

impl ScoringEngine {
    pub fn new(weights: Arc<WeightsStore>, history: Arc<dyn OutcomeHistory>) -> Self {
        Self {
            weights,
            history,
            summarizer: None,
        }
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn SummaryProvider>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn weights(&self) -> &Arc<WeightsStore> {
        &self.weights
    }

    pub fn history(&self) -> &Arc<dyn OutcomeHistory> {
        &self.history
    }

    /// Score one lead in place.
    pub async fn score(&self, lead: &mut Lead) {
        let (points, services) = pain_points(lead);
        lead.pain_points = points;
        lead.recommended_services = services;
        lead.opportunity_score = opportunity_score(lead);

        let weights = self.weights.get(&lead.industry);
        let stats = self.history.similar(&lead.industry, lead.opportunity_score).await;
        lead.predictive = Some(predictive_score(
            lead,
            lead.opportunity_score,
            &weights.weights,
            &stats,
        ));
        lead.scored_at = Some(Utc::now());
    }

    /// Score every lead, add AI summaries while time allows, then sort.
    pub async fn score_all(
        &self,
        ctx: &DiscoveryContext,
        mut leads: Vec<Lead>,
        sort_by: SortBy,
    ) -> Vec<Lead> {
        for lead in leads.iter_mut() {
            self.score(lead).await;

            let Some(ref summarizer) = self.summarizer else { continue };
            if !summarizer.is_configured() || ctx.is_done() {
                continue;
            }
            match ctx.bounded(None, summarizer.summarize(lead)).await {
                Ok(Ok(summary)) => lead.ai_summary = summary,
                Ok(Err(e)) => tracing::warn!("AI summary failed for '{}': {}", lead.name, e),
                Err(_) => tracing::debug!("AI summary skipped for '{}': deadline", lead.name),
            }
        }

        sort_leads(&mut leads, sort_by);
        tracing::info!("Scored {} leads", leads.len());
        leads
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Candidate, SocialPlatform, SourceName};

    fn lead(rating: Option<f64>, reviews: Option<u32>, website: Option<&str>) -> Lead {
        let mut c = Candidate::new("Test Biz", "Plumbing", SourceName::Maps, 90);
        c.rating = rating;
        c.review_count = reviews;
        c.website = website.map(String::from);
        Lead::from_candidate(c, "Austin, TX")
    }

    fn outcome(industry: &str, score: u8, converted: bool, website: bool) -> Outcome {
        Outcome {
            industry: industry.to_string(),
            opportunity_score: score,
            had_website: website,
            had_social: false,
            had_reviews: true,
            had_good_rating: false,
            had_contact: true,
            had_ads: false,
            converted,
            channel: Some(Channel::Email),
            response_hours: Some(10.0),
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn test_review_bands() {
        assert_eq!(opportunity_score(&lead(None, Some(250), Some("https://a.com"))), 65);
        assert_eq!(opportunity_score(&lead(None, Some(150), Some("https://a.com"))), 60);
        assert_eq!(opportunity_score(&lead(None, Some(60), Some("https://a.com"))), 55);
        assert_eq!(opportunity_score(&lead(None, Some(5), Some("https://a.com"))), 70);
    }

    #[test]
    fn test_rating_bands() {
        // < 4.0 with > 20 reviews
        assert_eq!(opportunity_score(&lead(Some(3.5), Some(30), Some("https://a.com"))), 90);
        // < 4.5 with > 50 reviews
        assert_eq!(opportunity_score(&lead(Some(4.2), Some(60), Some("https://a.com"))), 70);
        // < 4.7 otherwise
        assert_eq!(opportunity_score(&lead(Some(4.6), Some(300), Some("https://a.com"))), 75);
        assert_eq!(opportunity_score(&lead(Some(4.8), Some(300), Some("https://a.com"))), 65);
    }

    #[test]
    fn test_pain_points_map_to_services() {
        let l = lead(Some(3.2), Some(3), None);
        let (points, services) = pain_points(&l);
        assert_eq!(points[0], "No website");
        assert!(points.contains(&"Low average rating".to_string()));
        assert_eq!(points.len(), services.len());
    }

    #[test]
    fn test_channel_cascade() {
        let stats = SimilarLeadsStats::default();
        let mut l = lead(None, None, None);
        l.phone = Some("+15125550199".to_string());
        assert_eq!(recommend_channel(&l, &stats), Channel::Sms);

        l.phone = None;
        l.email = Some("a@b.com".to_string());
        assert_eq!(recommend_channel(&l, &stats), Channel::Email);

        l.phone = Some("+15125550199".to_string());
        l.social_links.insert(SocialPlatform::Linkedin, "https://linkedin.com/company/x".into());
        assert_eq!(recommend_channel(&l, &stats), Channel::Linkedin);
    }

    #[test]
    fn test_similar_stats_band_and_industry() {
        let outcomes = vec![
            outcome("Plumbing", 80, true, true),
            outcome("plumbing", 70, false, true),
            outcome("Plumbing", 30, true, true),
            outcome("Dentist", 80, true, true),
        ];
        let stats = similar_stats(&outcomes, "Plumbing", 75);
        assert_eq!(stats.sample_size, 2);
        assert_eq!(stats.conversion_rate, Some(0.5));
        assert_eq!(stats.best_channel, Some(Channel::Email));
    }

    #[test]
    fn test_recalculate_requires_minimum_sample() {
        let few: Vec<Outcome> = (0..5).map(|i| outcome("Plumbing", 70, i % 2 == 0, true)).collect();
        let weights = recalculate_weights(&few, Utc::now());
        assert_eq!(weights.len(), 1);
        assert_eq!(weights[0].weights, WeightSet::uniform());
        assert_eq!(weights[0].sample_size, 5);
    }

    #[test]
    fn test_recalculate_favors_converting_signal() {
        let mut outcomes = Vec::new();
        for i in 0..20 {
            // Website leads convert, the rest don't
            let website = i % 2 == 0;
            outcomes.push(outcome("Plumbing", 70, website, website));
        }
        let now = Utc::now();
        let first = recalculate_weights(&outcomes, now);
        let w = first[0].weights;
        assert!((w.sum() - 1.0).abs() < 1e-9);
        assert!(w.website_quality > w.social_presence);
        // Idempotent
        assert_eq!(first, recalculate_weights(&outcomes, now));
    }

    #[test]
    fn test_weights_store_swaps_snapshot() {
        let store = WeightsStore::new();
        assert_eq!(store.get("Plumbing").sample_size, 0);
        let before = store.get("Plumbing");

        let mut updated = ScoringWeights::defaults_for("plumbing");
        updated.sample_size = 42;
        store.apply(vec![updated]);

        assert_eq!(store.get("PLUMBING").sample_size, 42);
        assert_eq!(before.sample_size, 0);
    }

    #[test]
    fn test_concurrent_weight_updates_are_all_kept() {
        let store = WeightsStore::new();
        let industries: Vec<String> = (0..16).map(|i| format!("industry {}", i)).collect();

        std::thread::scope(|scope| {
            for industry in &industries {
                let store = &store;
                scope.spawn(move || {
                    for _ in 0..50 {
                        let mut weights = ScoringWeights::defaults_for(industry);
                        weights.sample_size = 7;
                        store.apply(vec![weights]);
                    }
                });
            }
        });

        assert_eq!(store.snapshot().len(), industries.len());
        assert!(industries.iter().all(|i| store.get(i).sample_size == 7));
    }

    #[test]
    fn test_sort_is_stable_descending() {
        let mut leads: Vec<Lead> = ["a", "b", "c"]
            .iter()
            .map(|n| Lead::from_candidate(Candidate::new(*n, "x", SourceName::Maps, 50), "here"))
            .collect();
        leads[0].opportunity_score = 60;
        leads[1].opportunity_score = 90;
        leads[2].opportunity_score = 60;
        sort_leads(&mut leads, SortBy::OpportunityScore);
        let names: Vec<&str> = leads.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }
}
