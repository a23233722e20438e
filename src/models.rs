use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::errors::SourceError;

// ============ Sources & strategy ============

/// External data source a candidate can come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceName {
    /// Maps / places search.
    Maps,
    /// Reviews directory.
    Reviews,
    /// B2B organization directory.
    OrgDirectory,
    /// Email-finder service.
    EmailFinder,
    /// Raw website / directory page fetch.
    Website,
}

impl SourceName {
    pub const ALL: [SourceName; 5] = [
        SourceName::Maps,
        SourceName::Reviews,
        SourceName::OrgDirectory,
        SourceName::EmailFinder,
        SourceName::Website,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceName::Maps => "maps",
            SourceName::Reviews => "reviews",
            SourceName::OrgDirectory => "org_directory",
            SourceName::EmailFinder => "email_finder",
            SourceName::Website => "website",
        }
    }
}

impl fmt::Display for SourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Field used to match candidates during dedup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyKind {
    Name,
    Website,
    Phone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    #[default]
    OpportunityScore,
    Rating,
    ReviewCount,
}

/// How one discovery call should query and process sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Strategy {
    /// Sources to query, in priority order.
    pub sources: Vec<SourceName>,
    pub enrich_emails: bool,
    pub enrich_websites: bool,
    pub max_leads: usize,
    pub dedup_keys: Vec<KeyKind>,
    pub sort_by: SortBy,
}

impl Strategy {
    /// Per-source result cap: ceil(max_leads / sources).
    pub fn per_source_limit(&self) -> usize {
        if self.sources.is_empty() {
            return 0;
        }
        self.max_leads.div_ceil(self.sources.len())
    }
}

/// Caller-supplied overrides applied on top of the selected strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyOverrides {
    pub sources: Option<Vec<SourceName>>,
    pub enrich_emails: Option<bool>,
    pub enrich_websites: Option<bool>,
    pub max_leads: Option<usize>,
    pub dedup_keys: Option<Vec<KeyKind>>,
    pub sort_by: Option<SortBy>,
}

// ============ Candidates & leads ============

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// One source's view of a business.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub name: String,
    pub industry: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    /// 0-5 stars.
    pub rating: Option<f64>,
    pub review_count: Option<u32>,
    pub coordinates: Option<Coordinates>,
    pub source_name: SourceName,
    /// 0-100.
    pub source_confidence: u8,
}

impl Candidate {
    /// Bare candidate with only the required fields set.
    pub fn new(
        name: impl Into<String>,
        industry: impl Into<String>,
        source_name: SourceName,
        source_confidence: u8,
    ) -> Self {
        Self {
            name: name.into(),
            industry: industry.into(),
            phone: None,
            email: None,
            website: None,
            address: None,
            city: None,
            state: None,
            rating: None,
            review_count: None,
            coordinates: None,
            source_name,
            source_confidence: source_confidence.min(100),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SocialPlatform {
    Facebook,
    Instagram,
    Linkedin,
    Twitter,
    Youtube,
    Tiktok,
}

impl SocialPlatform {
    pub fn as_str(&self) -> &'static str {
        match self {
            SocialPlatform::Facebook => "facebook",
            SocialPlatform::Instagram => "instagram",
            SocialPlatform::Linkedin => "linkedin",
            SocialPlatform::Twitter => "twitter",
            SocialPlatform::Youtube => "youtube",
            SocialPlatform::Tiktok => "tiktok",
        }
    }
}

/// Result of fetching and assessing a lead's website.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebsiteAnalysis {
    pub exists: bool,
    /// Whether the page could actually be fetched.
    pub reachable: bool,
    /// 0-100.
    pub quality_score: u8,
    pub issues: Vec<String>,
    pub analyzed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseTime {
    Fast,
    Medium,
    Slow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Sms,
    Call,
    Linkedin,
}

/// Ranking snapshot computed fresh on every scoring pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictiveScore {
    pub conversion_probability: u8,
    pub engagement_score: u8,
    pub response_time_prediction: ResponseTime,
    pub recommended_channel: Channel,
    pub reasoning: Vec<String>,
    pub confidence: u8,
}

/// The resolved, merged, enriched and scored business.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    pub name: String,
    pub industry: String,
    /// Location of the discovery call that produced this lead.
    pub location: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub rating: Option<f64>,
    pub review_count: Option<u32>,
    pub coordinates: Option<Coordinates>,
    pub social_links: BTreeMap<SocialPlatform, String>,
    /// `None` until the ad stage has looked.
    pub has_ads: Option<bool>,
    pub website_analysis: Option<WebsiteAnalysis>,
    pub pain_points: Vec<String>,
    pub recommended_services: Vec<String>,
    /// 0-95.
    pub opportunity_score: u8,
    pub predictive: Option<PredictiveScore>,
    pub ai_summary: Option<String>,
    /// One entry per contributing candidate.
    pub sources_merged: Vec<SourceName>,
    pub enriched_at: Option<DateTime<Utc>>,
    pub scored_at: Option<DateTime<Utc>>,
}

impl Lead {
    /// Starts a lead from its first contributing candidate.
    pub fn from_candidate(candidate: Candidate, location: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: candidate.name.trim().to_string(),
            industry: candidate.industry,
            location: location.to_string(),
            phone: non_blank(candidate.phone),
            email: non_blank(candidate.email),
            website: non_blank(candidate.website),
            address: non_blank(candidate.address),
            city: non_blank(candidate.city),
            state: non_blank(candidate.state),
            rating: candidate.rating,
            review_count: candidate.review_count,
            coordinates: candidate.coordinates,
            social_links: BTreeMap::new(),
            has_ads: None,
            website_analysis: None,
            pain_points: Vec::new(),
            recommended_services: Vec::new(),
            opportunity_score: 0,
            predictive: None,
            ai_summary: None,
            sources_merged: vec![candidate.source_name],
            enriched_at: None,
            scored_at: None,
        }
    }

    pub fn has_website(&self) -> bool {
        is_filled(&self.website)
    }

    pub fn has_email(&self) -> bool {
        is_filled(&self.email)
    }

    pub fn has_phone(&self) -> bool {
        is_filled(&self.phone)
    }

    pub fn has_social(&self) -> bool {
        !self.social_links.is_empty()
    }

    pub fn has_linkedin(&self) -> bool {
        self.social_links.contains_key(&SocialPlatform::Linkedin)
    }
}

/// True for `Some` with non-whitespace content.
pub fn is_filled(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ============ Scoring inputs ============

/// Per-signal weights; each in [0,1], summing to about 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightSet {
    pub website_quality: f64,
    pub social_presence: f64,
    pub review_count: f64,
    pub rating: f64,
    pub contact_availability: f64,
    pub ad_presence: f64,
}

impl WeightSet {
    pub const SIGNALS: usize = 6;

    pub fn uniform() -> Self {
        let w = 1.0 / Self::SIGNALS as f64;
        Self {
            website_quality: w,
            social_presence: w,
            review_count: w,
            rating: w,
            contact_availability: w,
            ad_presence: w,
        }
    }

    pub fn sum(&self) -> f64 {
        self.website_quality
            + self.social_presence
            + self.review_count
            + self.rating
            + self.contact_availability
            + self.ad_presence
    }
}

impl Default for WeightSet {
    fn default() -> Self {
        Self::uniform()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub industry: String,
    pub weights: WeightSet,
    /// Number of outcomes the weights were derived from (0 for defaults).
    pub sample_size: u32,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ScoringWeights {
    pub fn defaults_for(industry: &str) -> Self {
        Self {
            industry: industry.to_string(),
            weights: WeightSet::uniform(),
            sample_size: 0,
            updated_at: None,
        }
    }
}

/// Historical outcomes of leads similar to the one being scored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimilarLeadsStats {
    pub sample_size: u32,
    /// Fraction in [0,1]; `None` when there is no history.
    pub conversion_rate: Option<f64>,
    pub avg_response_hours: Option<f64>,
    pub best_channel: Option<Channel>,
}

/// A recorded outreach result, fed back into history and weight recalculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub industry: String,
    pub opportunity_score: u8,
    pub had_website: bool,
    pub had_social: bool,
    pub had_reviews: bool,
    pub had_good_rating: bool,
    pub had_contact: bool,
    pub had_ads: bool,
    pub converted: bool,
    pub channel: Option<Channel>,
    pub response_hours: Option<f64>,
    #[serde(default = "Utc::now")]
    pub recorded_at: DateTime<Utc>,
}

// ============ Discovery requests & results ============

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoveryRequest {
    pub industry: String,
    #[serde(default)]
    pub location: String,
    pub max_results: Option<usize>,
    /// When set, the pipeline runs once per location instead of `location`.
    pub multi_location: Option<Vec<String>>,
    #[serde(default)]
    pub overrides: StrategyOverrides,
}

/// Result of one discovery call; always returned, even when empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoveryOutcome {
    pub leads: Vec<Lead>,
    pub sources_used: Vec<SourceName>,
    pub errors: Vec<SourceError>,
    pub all_sources_failed: bool,
    /// Locations of a multi-location run that the deadline cut off.
    #[serde(default)]
    pub skipped_locations: Vec<String>,
}

impl DiscoveryOutcome {
    /// Concatenates per-location outcomes in order (no cross-location dedup).
    /// The result only counts as "all sources failed" when every location did.
    pub fn concat(outcomes: Vec<DiscoveryOutcome>) -> DiscoveryOutcome {
        let all_failed = !outcomes.is_empty() && outcomes.iter().all(|o| o.all_sources_failed);
        let mut merged = DiscoveryOutcome {
            all_sources_failed: all_failed,
            ..Default::default()
        };
        for outcome in outcomes {
            merged.leads.extend(outcome.leads);
            for source in outcome.sources_used {
                if !merged.sources_used.contains(&source) {
                    merged.sources_used.push(source);
                }
            }
            merged.errors.extend(outcome.errors);
            merged.skipped_locations.extend(outcome.skipped_locations);
        }
        merged
    }
}

// ============ Scheduler ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Hourly,
    Daily,
    Weekly,
}

impl Frequency {
    pub fn interval(&self) -> chrono::Duration {
        match self {
            Frequency::Hourly => chrono::Duration::hours(1),
            Frequency::Daily => chrono::Duration::days(1),
            Frequency::Weekly => chrono::Duration::weeks(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Idle,
    Running,
    IdleWithErrors,
}

/// A saved, recurring discovery definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryJob {
    pub id: Uuid,
    pub industry: String,
    pub location: String,
    pub frequency: Frequency,
    pub max_leads_per_run: usize,
    pub min_opportunity_score: u8,
    pub enabled: bool,
    pub status: JobStatus,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: DateTime<Utc>,
}

impl DiscoveryJob {
    pub fn new(
        industry: impl Into<String>,
        location: impl Into<String>,
        frequency: Frequency,
        max_leads_per_run: usize,
        min_opportunity_score: u8,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            industry: industry.into(),
            location: location.into(),
            frequency,
            max_leads_per_run,
            min_opportunity_score: min_opportunity_score.min(100),
            enabled: true,
            status: JobStatus::Idle,
            last_run_at: None,
            next_run_at: now,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.enabled && self.status != JobStatus::Running && now >= self.next_run_at
    }
}
