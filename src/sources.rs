//! Source adapters: one per external data provider.
//!
//! Each adapter maps its provider's response shape into [`Candidate`]s and
//! reports failure independently. The orchestrator only sees the
//! [`SourceAdapter`] trait.

use async_trait::async_trait;
use phonenumber::country::Id as CountryId;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use crate::config::Config;
use crate::context::DiscoveryContext;
use crate::errors::AppError;
use crate::models::{Candidate, Coordinates, SourceName};
use crate::validation::{canonical_phone, is_valid_email, phone_region};

const USER_AGENT: &str = "rust-lead-discovery/0.1 (+https://github.com)";

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn name(&self) -> SourceName;

    /// False when a required credential or endpoint is missing.
    fn is_configured(&self) -> bool {
        true
    }

    async fn search(
        &self,
        ctx: &DiscoveryContext,
        industry: &str,
        location: &str,
        limit: usize,
    ) -> Result<Vec<Candidate>, AppError>;
}

/// Builds the shared outbound HTTP client.
pub fn build_http_client(timeout: Duration) -> Result<Client, AppError> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| AppError::ExternalApiError(format!("Failed to create HTTP client: {}", e)))
}

async fn error_for_status(
    provider: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, AppError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(AppError::ExternalApiError(format!(
        "{} returned status {}: {}",
        provider,
        status,
        truncate(&error_text, 200)
    )))
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Split "123 Main St, Austin, TX 78701, USA" into (street, city, state).
pub fn split_address(formatted: &str) -> (Option<String>, Option<String>, Option<String>) {
    let mut parts: Vec<&str> = formatted
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    // Drop a trailing country
    if parts.len() >= 3 {
        let last = parts[parts.len() - 1];
        if !last.chars().any(|c| c.is_ascii_digit()) && last.split_whitespace().count() <= 3 {
            let looks_like_region = last
                .split_whitespace()
                .next()
                .is_some_and(|w| w.len() == 2 && w.chars().all(|c| c.is_ascii_uppercase()));
            if !looks_like_region {
                parts.pop();
            }
        }
    }

    match parts.len() {
        0 => (None, None, None),
        1 => (Some(parts[0].to_string()), None, None),
        2 => (
            None,
            Some(parts[0].to_string()),
            parts[1].split_whitespace().next().map(String::from),
        ),
        n => (
            Some(parts[..n - 2].join(", ")),
            Some(parts[n - 2].to_string()),
            parts[n - 1].split_whitespace().next().map(String::from),
        ),
    }
}

// ============ Maps (Google Places text search) ============

#[derive(Debug, Deserialize)]
struct PlacesResponse {
    status: String,
    #[serde(default)]
    results: Vec<PlaceResult>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaceResult {
    name: String,
    formatted_address: Option<String>,
    rating: Option<f64>,
    user_ratings_total: Option<u32>,
    geometry: Option<PlaceGeometry>,
}

#[derive(Debug, Deserialize)]
struct PlaceGeometry {
    location: PlaceLocation,
}

#[derive(Debug, Deserialize)]
struct PlaceLocation {
    lat: f64,
    lng: f64,
}

pub struct MapsSource {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl MapsSource {
    pub const CONFIDENCE: u8 = 90;

    pub fn new(client: Client, config: &Config) -> Self {
        Self {
            client,
            base_url: config.google_places_base_url.clone(),
            api_key: config.google_places_api_key.clone(),
        }
    }
}

#[async_trait]
impl SourceAdapter for MapsSource {
    fn name(&self) -> SourceName {
        SourceName::Maps
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn search(
        &self,
        _ctx: &DiscoveryContext,
        industry: &str,
        location: &str,
        limit: usize,
    ) -> Result<Vec<Candidate>, AppError> {
        let Some(ref key) = self.api_key else {
            return Ok(Vec::new());
        };

        let query = format!("{} in {}", industry, location);
        let url = reqwest::Url::parse_with_params(
            &format!("{}/maps/api/place/textsearch/json", self.base_url),
            &[("query", query.as_str()), ("key", key.as_str())],
        )
        .map_err(|e| AppError::ExternalApiError(format!("Failed to build URL: {}", e)))?;

        tracing::info!("Searching maps for '{}'", query);
        // Redact key from logs
        tracing::debug!("Maps URL: {}/maps/api/place/textsearch/json?query={}&key=[REDACTED]", self.base_url, query);

        let response = self.client.get(url).send().await?;
        let response = error_for_status("Maps", response).await?;
        let body: PlacesResponse = response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse maps response: {}", e))
        })?;

        match body.status.as_str() {
            "OK" | "ZERO_RESULTS" => {}
            other => {
                return Err(AppError::ExternalApiError(format!(
                    "Maps search status {}: {}",
                    other,
                    body.error_message.unwrap_or_default()
                )))
            }
        }

        let candidates: Vec<Candidate> = body
            .results
            .into_iter()
            .take(limit)
            .map(|place| {
                let mut c = Candidate::new(place.name, industry, SourceName::Maps, Self::CONFIDENCE);
                if let Some(ref formatted) = place.formatted_address {
                    let (street, city, state) = split_address(formatted);
                    c.address = street.or_else(|| Some(formatted.clone()));
                    c.city = city;
                    c.state = state;
                }
                c.rating = place.rating.map(|r| r.clamp(0.0, 5.0));
                c.review_count = place.user_ratings_total;
                c.coordinates = place.geometry.map(|g| Coordinates {
                    lat: g.location.lat,
                    lng: g.location.lng,
                });
                c
            })
            .collect();

        tracing::info!("Maps returned {} candidates", candidates.len());
        Ok(candidates)
    }
}

// ============ Reviews directory (Yelp) ============

#[derive(Debug, Deserialize)]
struct YelpResponse {
    #[serde(default)]
    businesses: Vec<YelpBusiness>,
}

#[derive(Debug, Deserialize)]
struct YelpBusiness {
    name: String,
    phone: Option<String>,
    display_phone: Option<String>,
    rating: Option<f64>,
    review_count: Option<u32>,
    coordinates: Option<YelpCoordinates>,
    location: Option<YelpLocation>,
}

#[derive(Debug, Deserialize)]
struct YelpCoordinates {
    latitude: Option<f64>,
    longitude: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct YelpLocation {
    address1: Option<String>,
    city: Option<String>,
    state: Option<String>,
}

pub struct ReviewsSource {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    region: CountryId,
}

impl ReviewsSource {
    pub const CONFIDENCE: u8 = 80;
    /// Provider's page-size ceiling.
    const MAX_PAGE: usize = 50;

    pub fn new(client: Client, config: &Config) -> Self {
        Self {
            client,
            base_url: config.yelp_base_url.clone(),
            api_key: config.yelp_api_key.clone(),
            region: phone_region(&config.default_phone_region),
        }
    }
}

#[async_trait]
impl SourceAdapter for ReviewsSource {
    fn name(&self) -> SourceName {
        SourceName::Reviews
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn search(
        &self,
        _ctx: &DiscoveryContext,
        industry: &str,
        location: &str,
        limit: usize,
    ) -> Result<Vec<Candidate>, AppError> {
        let Some(ref key) = self.api_key else {
            return Ok(Vec::new());
        };

        let page = limit.clamp(1, Self::MAX_PAGE).to_string();
        let url = reqwest::Url::parse_with_params(
            &format!("{}/v3/businesses/search", self.base_url),
            &[("term", industry), ("location", location), ("limit", page.as_str())],
        )
        .map_err(|e| AppError::ExternalApiError(format!("Failed to build URL: {}", e)))?;

        tracing::info!("Searching reviews directory for '{}' in '{}'", industry, location);

        let response = self
            .client
            .get(url)
            .header("Authorization", format!("Bearer {}", key))
            .send()
            .await?;
        let response = error_for_status("Reviews", response).await?;
        let body: YelpResponse = response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse reviews response: {}", e))
        })?;

        let candidates: Vec<Candidate> = body
            .businesses
            .into_iter()
            .take(limit)
            .map(|biz| {
                let mut c = Candidate::new(biz.name, industry, SourceName::Reviews, Self::CONFIDENCE);
                c.phone = biz
                    .phone
                    .filter(|p| !p.trim().is_empty())
                    .or(biz.display_phone)
                    .and_then(|p| canonical_phone(&p, self.region));
                c.rating = biz.rating.map(|r| r.clamp(0.0, 5.0));
                c.review_count = biz.review_count;
                c.coordinates = biz.coordinates.and_then(|co| match (co.latitude, co.longitude) {
                    (Some(lat), Some(lng)) => Some(Coordinates { lat, lng }),
                    _ => None,
                });
                if let Some(loc) = biz.location {
                    c.address = loc.address1;
                    c.city = loc.city;
                    c.state = loc.state;
                }
                c
            })
            .collect();

        tracing::info!("Reviews directory returned {} candidates", candidates.len());
        Ok(candidates)
    }
}

// ============ B2B org directory (Apollo) ============

#[derive(Debug, Deserialize)]
struct OrgSearchResponse {
    #[serde(default)]
    organizations: Vec<Organization>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Organization {
    pub(crate) name: String,
    pub(crate) website_url: Option<String>,
    pub(crate) phone: Option<String>,
    pub(crate) street_address: Option<String>,
    pub(crate) city: Option<String>,
    pub(crate) state: Option<String>,
}

/// Organization search shared by the org-directory source and the website
/// enrichment provider.
#[derive(Clone)]
pub struct OrgDirectoryClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl OrgDirectoryClient {
    pub fn new(client: Client, config: &Config) -> Self {
        Self {
            client,
            base_url: config.apollo_base_url.clone(),
            api_key: config.apollo_api_key.clone(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    pub(crate) async fn search_organizations(
        &self,
        payload: Value,
    ) -> Result<Vec<Organization>, AppError> {
        let Some(ref key) = self.api_key else {
            return Ok(Vec::new());
        };

        let url = format!("{}/v1/mixed_companies/search", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("X-Api-Key", key)
            .header("Cache-Control", "no-cache")
            .json(&payload)
            .send()
            .await?;
        let response = error_for_status("Org directory", response).await?;
        let body: OrgSearchResponse = response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse org directory response: {}", e))
        })?;
        Ok(body.organizations)
    }
}

pub struct OrgDirectorySource {
    directory: OrgDirectoryClient,
    region: CountryId,
}

impl OrgDirectorySource {
    pub const CONFIDENCE: u8 = 75;

    pub fn new(directory: OrgDirectoryClient, config: &Config) -> Self {
        Self {
            directory,
            region: phone_region(&config.default_phone_region),
        }
    }
}

#[async_trait]
impl SourceAdapter for OrgDirectorySource {
    fn name(&self) -> SourceName {
        SourceName::OrgDirectory
    }

    fn is_configured(&self) -> bool {
        self.directory.is_configured()
    }

    async fn search(
        &self,
        _ctx: &DiscoveryContext,
        industry: &str,
        location: &str,
        limit: usize,
    ) -> Result<Vec<Candidate>, AppError> {
        tracing::info!("Searching org directory for '{}' in '{}'", industry, location);

        let organizations = self
            .directory
            .search_organizations(json!({
                "q_organization_keyword_tags": [industry],
                "organization_locations": [location],
                "page": 1,
                "per_page": limit.clamp(1, 100),
            }))
            .await?;

        let candidates: Vec<Candidate> = organizations
            .into_iter()
            .take(limit)
            .map(|org| {
                let mut c = Candidate::new(org.name, industry, SourceName::OrgDirectory, Self::CONFIDENCE);
                c.website = org.website_url;
                c.phone = org.phone.and_then(|p| canonical_phone(&p, self.region));
                c.address = org.street_address;
                c.city = org.city;
                c.state = org.state;
                c
            })
            .collect();

        tracing::info!("Org directory returned {} candidates", candidates.len());
        Ok(candidates)
    }
}

// ============ Email finder (Hunter discover) ============

#[derive(Debug, Deserialize)]
struct DiscoverResponse {
    #[serde(default)]
    data: Vec<DiscoveredCompany>,
}

#[derive(Debug, Deserialize)]
struct DiscoveredCompany {
    domain: Option<String>,
    organization: Option<String>,
}

pub struct EmailFinderSource {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl EmailFinderSource {
    pub const CONFIDENCE: u8 = 60;

    pub fn new(client: Client, config: &Config) -> Self {
        Self {
            client,
            base_url: config.hunter_base_url.clone(),
            api_key: config.hunter_api_key.clone(),
        }
    }
}

#[async_trait]
impl SourceAdapter for EmailFinderSource {
    fn name(&self) -> SourceName {
        SourceName::EmailFinder
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn search(
        &self,
        _ctx: &DiscoveryContext,
        industry: &str,
        location: &str,
        limit: usize,
    ) -> Result<Vec<Candidate>, AppError> {
        let Some(ref key) = self.api_key else {
            return Ok(Vec::new());
        };

        let url = reqwest::Url::parse_with_params(
            &format!("{}/v2/discover", self.base_url),
            &[("api_key", key.as_str())],
        )
        .map_err(|e| AppError::ExternalApiError(format!("Failed to build URL: {}", e)))?;

        let query = format!("{} companies in {}", industry, location);
        tracing::info!("Searching email finder for '{}'", query);

        let response = self
            .client
            .post(url)
            .json(&json!({ "query": query, "limit": limit.clamp(1, 100) }))
            .send()
            .await?;
        let response = error_for_status("Email finder", response).await?;
        let body: DiscoverResponse = response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse email finder response: {}", e))
        })?;

        let candidates: Vec<Candidate> = body
            .data
            .into_iter()
            .filter_map(|company| {
                let domain = company.domain.filter(|d| !d.trim().is_empty());
                let name = company
                    .organization
                    .filter(|o| !o.trim().is_empty())
                    .or_else(|| domain.clone())?;
                let mut c = Candidate::new(name, industry, SourceName::EmailFinder, Self::CONFIDENCE);
                c.website = domain.map(|d| format!("https://{}", d.trim()));
                Some(c)
            })
            .take(limit)
            .collect();

        tracing::info!("Email finder returned {} candidates", candidates.len());
        Ok(candidates)
    }
}

// ============ Raw website / directory page ============

fn json_ld_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?is)<script[^>]*type\s*=\s*["']application/ld\+json["'][^>]*>(.*?)</script>"#)
            .unwrap()
    })
}

/// schema.org types that describe a business listing.
fn is_business_type(value: &Value) -> bool {
    const TYPES: &[&str] = &[
        "LocalBusiness",
        "Organization",
        "Corporation",
        "Store",
        "Plumber",
        "Electrician",
        "Locksmith",
        "Dentist",
        "Attorney",
        "Restaurant",
    ];
    let matches = |t: &str| {
        TYPES.contains(&t)
            || t.ends_with("Business")
            || t.ends_with("Service")
            || t.ends_with("Contractor")
    };
    match value.get("@type") {
        Some(Value::String(t)) => matches(t),
        Some(Value::Array(types)) => types.iter().filter_map(Value::as_str).any(matches),
        _ => false,
    }
}

fn as_f64(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_string(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Extract business listings from schema.org JSON-LD blocks in a page.
pub fn extract_json_ld_businesses(
    html: &str,
    industry: &str,
    region: CountryId,
) -> Vec<Candidate> {
    let mut nodes: Vec<Value> = Vec::new();
    for capture in json_ld_regex().captures_iter(html) {
        let Some(raw) = capture.get(1) else { continue };
        let Ok(parsed) = serde_json::from_str::<Value>(raw.as_str().trim()) else {
            tracing::debug!("Skipping unparseable JSON-LD block");
            continue;
        };
        collect_nodes(parsed, &mut nodes);
    }

    nodes
        .iter()
        .filter(|node| is_business_type(node))
        .filter_map(|node| {
            let name = as_string(node.get("name"))?;
            let mut c = Candidate::new(name, industry, SourceName::Website, WebsiteSource::CONFIDENCE);
            c.phone = as_string(node.get("telephone")).and_then(|p| canonical_phone(&p, region));
            c.email = as_string(node.get("email"))
                .map(|e| e.trim_start_matches("mailto:").to_string())
                .filter(|e| is_valid_email(e));
            c.website = as_string(node.get("url"));
            if let Some(address) = node.get("address") {
                match address {
                    Value::String(s) => c.address = Some(s.clone()),
                    other => {
                        c.address = as_string(other.get("streetAddress"));
                        c.city = as_string(other.get("addressLocality"));
                        c.state = as_string(other.get("addressRegion"));
                    }
                }
            }
            if let Some(rating) = node.get("aggregateRating") {
                c.rating = as_f64(rating.get("ratingValue")).map(|r| r.clamp(0.0, 5.0));
                c.review_count = as_f64(rating.get("reviewCount"))
                    .or_else(|| as_f64(rating.get("ratingCount")))
                    .filter(|n| *n >= 0.0)
                    .map(|n| n as u32);
            }
            if let Some(geo) = node.get("geo") {
                if let (Some(lat), Some(lng)) = (as_f64(geo.get("latitude")), as_f64(geo.get("longitude"))) {
                    c.coordinates = Some(Coordinates { lat, lng });
                }
            }
            Some(c)
        })
        .collect()
}

fn collect_nodes(value: Value, out: &mut Vec<Value>) {
    match value {
        Value::Array(items) => items.into_iter().for_each(|v| collect_nodes(v, out)),
        Value::Object(mut map) => {
            if let Some(graph) = map.remove("@graph") {
                collect_nodes(graph, out);
            }
            if let Some(Value::Array(items)) = map.get("itemListElement").cloned() {
                for item in items {
                    match item.get("item").cloned() {
                        Some(inner) => collect_nodes(inner, out),
                        None => collect_nodes(item, out),
                    }
                }
            }
            out.push(Value::Object(map));
        }
        _ => {}
    }
}

pub struct WebsiteSource {
    client: Client,
    url_template: Option<String>,
    region: CountryId,
}

impl WebsiteSource {
    pub const CONFIDENCE: u8 = 50;

    pub fn new(client: Client, config: &Config) -> Self {
        Self {
            client,
            url_template: config.directory_url_template.clone(),
            region: phone_region(&config.default_phone_region),
        }
    }

    fn render_url(template: &str, industry: &str, location: &str) -> String {
        let encode = |s: &str| url::form_urlencoded::byte_serialize(s.as_bytes()).collect::<String>();
        template
            .replace("{industry}", &encode(industry))
            .replace("{location}", &encode(location))
    }
}

#[async_trait]
impl SourceAdapter for WebsiteSource {
    fn name(&self) -> SourceName {
        SourceName::Website
    }

    fn is_configured(&self) -> bool {
        self.url_template.is_some()
    }

    async fn search(
        &self,
        _ctx: &DiscoveryContext,
        industry: &str,
        location: &str,
        limit: usize,
    ) -> Result<Vec<Candidate>, AppError> {
        let Some(ref template) = self.url_template else {
            return Ok(Vec::new());
        };

        let url = Self::render_url(template, industry, location);
        tracing::info!("Fetching directory page: {}", url);

        let response = self.client.get(&url).send().await?;
        let response = error_for_status("Directory page", response).await?;
        let html = response.text().await?;

        let mut candidates = extract_json_ld_businesses(&html, industry, self.region);
        candidates.truncate(limit);

        tracing::info!("Directory page yielded {} candidates", candidates.len());
        Ok(candidates)
    }
}

// ============ Registry ============

/// Adapters by source name. Strategies name sources; the registry resolves them.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    adapters: HashMap<SourceName, Arc<dyn SourceAdapter>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// All five concrete adapters wired from configuration.
    pub fn from_config(config: &Config, client: Client) -> Self {
        let directory = OrgDirectoryClient::new(client.clone(), config);
        let mut registry = Self::new();
        registry.register(Arc::new(MapsSource::new(client.clone(), config)));
        registry.register(Arc::new(ReviewsSource::new(client.clone(), config)));
        registry.register(Arc::new(OrgDirectorySource::new(directory, config)));
        registry.register(Arc::new(EmailFinderSource::new(client.clone(), config)));
        registry.register(Arc::new(WebsiteSource::new(client, config)));
        registry
    }

    /// Adds or replaces the adapter for its source name.
    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) -> &mut Self {
        self.adapters.insert(adapter.name(), adapter);
        self
    }

    pub fn get(&self, name: SourceName) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters.get(&name).cloned()
    }

    pub fn configured(&self) -> Vec<SourceName> {
        let mut names: Vec<SourceName> = self
            .adapters
            .iter()
            .filter(|(_, a)| a.is_configured())
            .map(|(n, _)| *n)
            .collect();
        names.sort();
        names
    }
}
