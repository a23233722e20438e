/// Enrichment pipeline: fills missing lead fields from prioritized provider chains.
///
/// Leads are processed one at a time with a fixed delay between them. For each
/// missing field the chain for that field is walked in priority order and stops
/// at the first provider whose value passes validation:
/// 1. Website (org directory lookup, then domain guess)
/// 2. Email (email finder domain search, then website contact scrape)
/// 3. Social links (homepage scan)
/// 4. Ad presence (homepage tag scan)
/// 5. Website quality analysis
///
/// Provider failures never abort the batch; the field just stays empty.
use async_trait::async_trait;
use chrono::Utc;
use failsafe::futures::CircuitBreaker;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::circuit_breaker::{create_provider_circuit_breaker, ProviderBreaker};
use crate::config::Config;
use crate::context::DiscoveryContext;
use crate::dedup::{normalize_domain, normalize_name};
use crate::errors::ProviderError;
use crate::models::{Lead, SocialPlatform, Strategy};
use crate::sources::OrgDirectoryClient;
use crate::validation::is_valid_email;
use crate::website::{
    detect_ad_pixels, extract_emails, extract_social_links, normalize_url, unreachable_analysis,
    WebsiteFetcher,
};

/// Lead field an enrichment provider can fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichField {
    Website,
    Email,
    Social,
    Ads,
}

impl EnrichField {
    /// Stage order within one lead.
    pub const STAGES: [EnrichField; 4] = [
        EnrichField::Website,
        EnrichField::Email,
        EnrichField::Social,
        EnrichField::Ads,
    ];
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilledValue {
    Website(String),
    Email(String),
    Social(BTreeMap<SocialPlatform, String>),
    Ads(bool),
}

impl FilledValue {
    pub fn field(&self) -> EnrichField {
        match self {
            FilledValue::Website(_) => EnrichField::Website,
            FilledValue::Email(_) => EnrichField::Email,
            FilledValue::Social(_) => EnrichField::Social,
            FilledValue::Ads(_) => EnrichField::Ads,
        }
    }

    /// Sanity check before a value may be written to a lead.
    fn is_acceptable(&self) -> bool {
        match self {
            FilledValue::Website(url) => normalize_url(url).is_some(),
            FilledValue::Email(email) => is_valid_email(email),
            FilledValue::Social(links) => !links.is_empty(),
            FilledValue::Ads(_) => true,
        }
    }
}

/// A provider's answer for one lead.
#[derive(Debug, Clone, PartialEq)]
pub struct Fill {
    pub value: FilledValue,
    /// 0-100.
    pub confidence: u8,
}

impl Fill {
    pub fn new(value: FilledValue, confidence: u8) -> Self {
        Self {
            value,
            confidence: confidence.min(100),
        }
    }
}

#[async_trait]
pub trait EnrichmentProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn field(&self) -> EnrichField;

    fn is_configured(&self) -> bool {
        true
    }

    /// `Ok(None)` means the provider had nothing for this lead.
    async fn fill(&self, ctx: &DiscoveryContext, lead: &Lead) -> Result<Option<Fill>, ProviderError>;
}

/// What happened to one field of one lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillOutcome {
    Filled,
    Miss,
    Rejected,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentStats {
    pub processed: usize,
    pub filled: BTreeMap<EnrichField, usize>,
    pub misses: usize,
    pub rejected: usize,
    pub provider_errors: usize,
    /// Leads returned untouched because the deadline passed or the call was cancelled.
    pub skipped: usize,
}

impl EnrichmentStats {
    fn record(&mut self, field: EnrichField, outcome: FillOutcome) {
        match outcome {
            FillOutcome::Filled => *self.filled.entry(field).or_insert(0) += 1,
            FillOutcome::Miss => self.misses += 1,
            FillOutcome::Rejected => self.rejected += 1,
        }
    }
}

struct ProviderSlot {
    provider: Arc<dyn EnrichmentProvider>,
    breaker: ProviderBreaker,
}

pub struct EnrichmentPipeline {
    providers: Vec<ProviderSlot>,
    pages: Option<WebsiteFetcher>,
    call_timeout: Duration,
    lead_delay: Duration,
}

impl EnrichmentPipeline {
    /// Empty pipeline; providers run in the order they are added.
    pub fn new(call_timeout: Duration, lead_delay: Duration) -> Self {
        Self {
            providers: Vec::new(),
            pages: None,
            call_timeout,
            lead_delay,
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn EnrichmentProvider>) -> Self {
        self.providers.push(ProviderSlot {
            provider,
            breaker: create_provider_circuit_breaker(),
        });
        self
    }

    /// Enables website quality analysis using `pages`.
    pub fn with_website_analysis(mut self, pages: WebsiteFetcher) -> Self {
        self.pages = Some(pages);
        self
    }

    /// The full provider set wired from configuration.
    pub fn from_config(config: &Config, client: Client, pages: WebsiteFetcher) -> Self {
        let directory = OrgDirectoryClient::new(client.clone(), config);
        Self::new(config.enrichment_timeout(), config.enrichment_delay())
            .with_provider(Arc::new(OrgDirectoryLookup::new(directory)))
            .with_provider(Arc::new(DomainGuess::new(pages.clone())))
            .with_provider(Arc::new(EmailFinderDomainSearch::new(client, config)))
            .with_provider(Arc::new(WebsiteContactScrape::new(pages.clone())))
            .with_provider(Arc::new(WebsiteSocialLinks::new(pages.clone())))
            .with_provider(Arc::new(WebsiteAdPixels::new(pages.clone())))
            .with_website_analysis(pages)
    }

    /// Enrich `leads` in order, one at a time.
    ///
    /// Once `ctx` expires or is cancelled the remaining leads are returned
    /// unchanged. Fields that were filled on entry are never cleared.
    pub async fn enrich(
        &self,
        ctx: &DiscoveryContext,
        leads: Vec<Lead>,
        strategy: &Strategy,
    ) -> (Vec<Lead>, EnrichmentStats) {
        let mut stats = EnrichmentStats::default();
        let mut enriched = Vec::with_capacity(leads.len());
        let mut remaining = leads.into_iter();

        tracing::info!("Enriching {} leads", remaining.len());

        while let Some(mut lead) = remaining.next() {
            let mut stopped = ctx.is_done();
            if !stopped && !enriched.is_empty() && !self.lead_delay.is_zero() {
                stopped = ctx
                    .bounded(None, tokio::time::sleep(self.lead_delay))
                    .await
                    .is_err();
            }
            if stopped {
                stats.skipped += 1 + remaining.len();
                tracing::warn!(
                    "Enrichment stopped at deadline; {} leads left unenriched",
                    stats.skipped
                );
                enriched.push(lead);
                enriched.extend(remaining);
                break;
            }

            self.enrich_lead(ctx, &mut lead, strategy, &mut stats).await;
            stats.processed += 1;
            enriched.push(lead);
        }

        tracing::info!(
            "Enrichment done: {} processed, {} skipped, {} misses",
            stats.processed,
            stats.skipped,
            stats.misses
        );
        (enriched, stats)
    }

    async fn enrich_lead(
        &self,
        ctx: &DiscoveryContext,
        lead: &mut Lead,
        strategy: &Strategy,
        stats: &mut EnrichmentStats,
    ) {
        for field in EnrichField::STAGES {
            let wanted = match field {
                EnrichField::Website => strategy.enrich_websites && !lead.has_website(),
                EnrichField::Email => strategy.enrich_emails && !lead.has_email(),
                EnrichField::Social => !lead.has_social(),
                EnrichField::Ads => lead.has_ads.is_none(),
            };
            if !wanted || ctx.is_done() {
                continue;
            }
            let outcome = self.run_chain(ctx, lead, field, stats).await;
            tracing::debug!("Lead '{}' {:?}: {:?}", lead.name, field, outcome);
            stats.record(field, outcome);
        }

        if strategy.enrich_websites && lead.website_analysis.is_none() && !ctx.is_done() {
            if let (Some(pages), Some(website)) = (&self.pages, lead.website.clone()) {
                let analysis = match ctx
                    .bounded(Some(self.call_timeout), pages.analyze(&website))
                    .await
                {
                    Ok(analysis) => analysis,
                    Err(_) => unreachable_analysis(),
                };
                tracing::debug!(
                    "Lead '{}' website quality {}",
                    lead.name,
                    analysis.quality_score
                );
                lead.website_analysis = Some(analysis);
            }
        }

        lead.enriched_at = Some(Utc::now());
    }

    /// Walk the chain for `field`, stopping at the first accepted value.
    async fn run_chain(
        &self,
        ctx: &DiscoveryContext,
        lead: &mut Lead,
        field: EnrichField,
        stats: &mut EnrichmentStats,
    ) -> FillOutcome {
        let mut outcome = FillOutcome::Miss;

        for slot in self.providers.iter().filter(|s| s.provider.field() == field) {
            let name = slot.provider.name();
            if !slot.provider.is_configured() {
                tracing::debug!("Provider {} not configured, skipping", name);
                continue;
            }
            if ctx.is_done() {
                break;
            }

            let current: &Lead = lead;
            let call = async {
                match ctx
                    .bounded(Some(self.call_timeout), slot.provider.fill(ctx, current))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::Timeout),
                }
            };

            match slot.breaker.call(call).await {
                Ok(Some(fill)) => {
                    if fill.value.field() == field && fill.value.is_acceptable() {
                        tracing::debug!(
                            "Provider {} filled {:?} for '{}' (confidence {})",
                            name,
                            field,
                            lead.name,
                            fill.confidence
                        );
                        apply(lead, fill.value);
                        return FillOutcome::Filled;
                    }
                    tracing::debug!("Provider {} value rejected for '{}'", name, lead.name);
                    outcome = FillOutcome::Rejected;
                }
                Ok(None) => {}
                Err(failsafe::Error::Rejected) => {
                    tracing::debug!("Provider {} circuit open, skipping", name);
                    stats.provider_errors += 1;
                }
                Err(failsafe::Error::Inner(e)) => {
                    tracing::warn!("Provider {} failed for '{}': {}", name, lead.name, e);
                    stats.provider_errors += 1;
                }
            }
        }

        outcome
    }
}

/// Writes a value into an empty field. Filled fields are left alone.
fn apply(lead: &mut Lead, value: FilledValue) {
    match value {
        FilledValue::Website(url) => {
            if !lead.has_website() {
                lead.website = Some(url);
            }
        }
        FilledValue::Email(email) => {
            if !lead.has_email() {
                lead.email = Some(email.trim().to_lowercase());
            }
        }
        FilledValue::Social(links) => {
            for (platform, link) in links {
                lead.social_links.entry(platform).or_insert(link);
            }
        }
        FilledValue::Ads(found) => {
            if lead.has_ads.is_none() {
                lead.has_ads = Some(found);
            }
        }
    }
}

// ============ Website providers ============

/// Looks the business up by name in the B2B org directory.
pub struct OrgDirectoryLookup {
    directory: OrgDirectoryClient,
}

impl OrgDirectoryLookup {
    pub fn new(directory: OrgDirectoryClient) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl EnrichmentProvider for OrgDirectoryLookup {
    fn name(&self) -> &'static str {
        "org_directory_lookup"
    }

    fn field(&self) -> EnrichField {
        EnrichField::Website
    }

    fn is_configured(&self) -> bool {
        self.directory.is_configured()
    }

    async fn fill(&self, _ctx: &DiscoveryContext, lead: &Lead) -> Result<Option<Fill>, ProviderError> {
        let place = lead.city.clone().unwrap_or_else(|| lead.location.clone());
        let organizations = self
            .directory
            .search_organizations(json!({
                "q_organization_name": lead.name,
                "organization_locations": [place],
                "page": 1,
                "per_page": 5,
            }))
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        let wanted = normalize_name(&lead.name);
        let website = organizations.into_iter().find_map(|org| {
            let found = normalize_name(&org.name);
            let same = found == wanted || found.contains(&wanted) || wanted.contains(&found);
            if same && !found.is_empty() {
                org.website_url.filter(|w| !w.trim().is_empty())
            } else {
                None
            }
        });

        Ok(website.map(|w| Fill::new(FilledValue::Website(w), 75)))
    }
}

/// Tries `https://{business-name}.com` and keeps it when the page mentions the business.
pub struct DomainGuess {
    pages: WebsiteFetcher,
}

const NAME_SUFFIXES: &[&str] = &["llc", "inc", "inc.", "co", "co.", "ltd", "corp", "company", "the", "&", "and"];

impl DomainGuess {
    pub fn new(pages: WebsiteFetcher) -> Self {
        Self { pages }
    }

    /// "The Ace Plumbing LLC" -> "aceplumbing"
    pub fn slug(name: &str) -> Option<String> {
        let normalized = normalize_name(name);
        let slug: String = normalized
            .split_whitespace()
            .filter(|w| !NAME_SUFFIXES.contains(w))
            .flat_map(|w| w.chars().filter(|c| c.is_ascii_alphanumeric()))
            .collect();
        (slug.len() >= 3).then_some(slug)
    }
}

#[async_trait]
impl EnrichmentProvider for DomainGuess {
    fn name(&self) -> &'static str {
        "domain_guess"
    }

    fn field(&self) -> EnrichField {
        EnrichField::Website
    }

    async fn fill(&self, _ctx: &DiscoveryContext, lead: &Lead) -> Result<Option<Fill>, ProviderError> {
        let Some(slug) = Self::slug(&lead.name) else {
            return Ok(None);
        };
        let guess = format!("https://{}.com", slug);
        let Some(page) = self.pages.fetch(&guess).await else {
            return Ok(None);
        };

        let marker = normalize_name(&lead.name)
            .split_whitespace()
            .find(|w| w.len() >= 3 && !NAME_SUFFIXES.contains(w))
            .map(str::to_string)
            .unwrap_or(slug);
        if page.html.to_lowercase().contains(&marker) {
            Ok(Some(Fill::new(FilledValue::Website(guess), 40)))
        } else {
            tracing::debug!("Guessed domain {} does not mention '{}'", guess, lead.name);
            Ok(None)
        }
    }
}

// ============ Email providers ============

#[derive(Debug, Deserialize)]
struct DomainSearchResponse {
    data: DomainSearchData,
}

#[derive(Debug, Deserialize)]
struct DomainSearchData {
    #[serde(default)]
    emails: Vec<DomainSearchEmail>,
}

#[derive(Debug, Deserialize)]
struct DomainSearchEmail {
    value: String,
    #[serde(default)]
    confidence: u8,
}

/// Highest-confidence address the email finder knows for the lead's domain.
pub struct EmailFinderDomainSearch {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl EmailFinderDomainSearch {
    pub fn new(client: Client, config: &Config) -> Self {
        Self {
            client,
            base_url: config.hunter_base_url.clone(),
            api_key: config.hunter_api_key.clone(),
        }
    }
}

#[async_trait]
impl EnrichmentProvider for EmailFinderDomainSearch {
    fn name(&self) -> &'static str {
        "hunter_domain_search"
    }

    fn field(&self) -> EnrichField {
        EnrichField::Email
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn fill(&self, _ctx: &DiscoveryContext, lead: &Lead) -> Result<Option<Fill>, ProviderError> {
        let Some(ref key) = self.api_key else {
            return Ok(None);
        };
        let domain = lead.website.as_deref().map(normalize_domain).unwrap_or_default();
        if domain.is_empty() {
            return Ok(None);
        }

        let url = reqwest::Url::parse_with_params(
            &format!("{}/v2/domain-search", self.base_url),
            &[("domain", domain.as_str()), ("api_key", key.as_str())],
        )
        .map_err(|e| ProviderError::Request(format!("Failed to build URL: {}", e)))?;

        tracing::info!("Searching emails for domain {}", domain);
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(ProviderError::Request(format!(
                "domain search returned status {}",
                response.status()
            )));
        }
        let body: DomainSearchResponse = response.json().await?;

        let best = body
            .data
            .emails
            .into_iter()
            .filter(|e| is_valid_email(&e.value))
            .max_by_key(|e| e.confidence);

        Ok(best.map(|e| Fill::new(FilledValue::Email(e.value), e.confidence)))
    }
}

/// Emails published on the homepage or the `/contact` page.
pub struct WebsiteContactScrape {
    pages: WebsiteFetcher,
}

impl WebsiteContactScrape {
    pub fn new(pages: WebsiteFetcher) -> Self {
        Self { pages }
    }

    /// Prefers addresses on the site's own domain.
    fn pick(emails: Vec<String>, domain: &str) -> Option<String> {
        let own = emails
            .iter()
            .find(|e| e.rsplit_once('@').is_some_and(|(_, d)| normalize_domain(d) == domain))
            .cloned();
        own.or_else(|| emails.into_iter().next())
    }
}

#[async_trait]
impl EnrichmentProvider for WebsiteContactScrape {
    fn name(&self) -> &'static str {
        "website_contact_scrape"
    }

    fn field(&self) -> EnrichField {
        EnrichField::Email
    }

    async fn fill(&self, _ctx: &DiscoveryContext, lead: &Lead) -> Result<Option<Fill>, ProviderError> {
        let Some(website) = lead.website.as_deref() else {
            return Ok(None);
        };
        let domain = normalize_domain(website);

        for path in ["/", "/contact"] {
            let Some(page) = self.pages.fetch_path(website, path).await else {
                continue;
            };
            if let Some(email) = Self::pick(extract_emails(&page.html), &domain) {
                return Ok(Some(Fill::new(FilledValue::Email(email), 50)));
            }
        }
        Ok(None)
    }
}

// ============ Presence providers ============

pub struct WebsiteSocialLinks {
    pages: WebsiteFetcher,
}

impl WebsiteSocialLinks {
    pub fn new(pages: WebsiteFetcher) -> Self {
        Self { pages }
    }
}

#[async_trait]
impl EnrichmentProvider for WebsiteSocialLinks {
    fn name(&self) -> &'static str {
        "website_social_links"
    }

    fn field(&self) -> EnrichField {
        EnrichField::Social
    }

    async fn fill(&self, _ctx: &DiscoveryContext, lead: &Lead) -> Result<Option<Fill>, ProviderError> {
        let Some(website) = lead.website.as_deref() else {
            return Ok(None);
        };
        let Some(page) = self.pages.fetch(website).await else {
            return Ok(None);
        };
        let links = extract_social_links(&page.html);
        if links.is_empty() {
            return Ok(None);
        }
        Ok(Some(Fill::new(FilledValue::Social(links), 70)))
    }
}

pub struct WebsiteAdPixels {
    pages: WebsiteFetcher,
}

impl WebsiteAdPixels {
    pub fn new(pages: WebsiteFetcher) -> Self {
        Self { pages }
    }
}

#[async_trait]
impl EnrichmentProvider for WebsiteAdPixels {
    fn name(&self) -> &'static str {
        "website_ad_pixels"
    }

    fn field(&self) -> EnrichField {
        EnrichField::Ads
    }

    async fn fill(&self, _ctx: &DiscoveryContext, lead: &Lead) -> Result<Option<Fill>, ProviderError> {
        let Some(website) = lead.website.as_deref() else {
            return Ok(None);
        };
        let Some(page) = self.pages.fetch(website).await else {
            return Ok(None);
        };
        Ok(Some(Fill::new(FilledValue::Ads(detect_ad_pixels(&page.html)), 60)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Candidate, SourceName};

    fn lead(name: &str) -> Lead {
        Lead::from_candidate(Candidate::new(name, "Plumbing", SourceName::Maps, 90), "Austin, TX")
    }

    #[test]
    fn test_slug_strips_company_suffixes() {
        assert_eq!(DomainGuess::slug("The Ace Plumbing LLC").as_deref(), Some("aceplumbing"));
        assert_eq!(DomainGuess::slug("A&B"), None);
    }

    #[test]
    fn test_apply_never_overwrites() {
        let mut l = lead("Ace");
        l.email = Some("owner@ace.com".to_string());
        apply(&mut l, FilledValue::Email("other@ace.com".to_string()));
        assert_eq!(l.email.as_deref(), Some("owner@ace.com"));

        l.has_ads = Some(true);
        apply(&mut l, FilledValue::Ads(false));
        assert_eq!(l.has_ads, Some(true));
    }

    #[test]
    fn test_placeholder_email_not_acceptable() {
        assert!(!FilledValue::Email("info@example.com".to_string()).is_acceptable());
        assert!(FilledValue::Email("info@ace.com".to_string()).is_acceptable());
        assert!(!FilledValue::Social(BTreeMap::new()).is_acceptable());
    }

    #[test]
    fn test_contact_scrape_prefers_own_domain() {
        let picked = WebsiteContactScrape::pick(
            vec!["agency@webbuilder.io".to_string(), "hello@ace.com".to_string()],
            "ace.com",
        );
        assert_eq!(picked.as_deref(), Some("hello@ace.com"));
    }
}
