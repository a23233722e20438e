use serde::Deserialize;
use std::time::Duration;

/// Runtime configuration.
///
/// Every provider credential is optional: a missing key disables that
/// adapter or provider instead of failing startup.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    pub database_url: Option<String>,

    // Source adapters
    pub google_places_api_key: Option<String>,
    pub google_places_base_url: String,
    pub yelp_api_key: Option<String>,
    pub yelp_base_url: String,
    pub apollo_api_key: Option<String>,
    pub apollo_base_url: String,
    pub hunter_api_key: Option<String>,
    pub hunter_base_url: String,
    /// Directory page to scrape, with `{industry}` and `{location}` placeholders.
    pub directory_url_template: Option<String>,

    // AI summary
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_model: String,

    // Notification sink
    pub alert_webhook_url: Option<String>,

    // Tunables
    pub discovery_deadline_secs: u64,
    pub source_timeout_secs: u64,
    pub enrichment_timeout_secs: u64,
    pub enrichment_delay_ms: u64,
    pub location_delay_ms: u64,
    pub default_phone_region: String,
    pub scheduler_poll_secs: u64,
    pub high_value_threshold: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            database_url: None,
            google_places_api_key: None,
            google_places_base_url: "https://maps.googleapis.com".to_string(),
            yelp_api_key: None,
            yelp_base_url: "https://api.yelp.com".to_string(),
            apollo_api_key: None,
            apollo_base_url: "https://api.apollo.io".to_string(),
            hunter_api_key: None,
            hunter_base_url: "https://api.hunter.io".to_string(),
            directory_url_template: None,
            openai_api_key: None,
            openai_base_url: "https://api.openai.com".to_string(),
            openai_model: "gpt-4o-mini".to_string(),
            alert_webhook_url: None,
            discovery_deadline_secs: 60,
            source_timeout_secs: 20,
            enrichment_timeout_secs: 10,
            enrichment_delay_ms: 1000,
            location_delay_ms: 2000,
            default_phone_region: "US".to_string(),
            scheduler_poll_secs: 60,
            high_value_threshold: 80,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let config = Self {
            port: std::env::var("PORT")
                .unwrap_or_else(|_| defaults.port.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            database_url: optional_env("DATABASE_URL")
                .or_else(|| optional_env("DB_URL"))
                .map(|url| {
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DATABASE_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })
                .transpose()?,
            google_places_api_key: optional_env("GOOGLE_PLACES_API_KEY"),
            google_places_base_url: base_url_env(
                "GOOGLE_PLACES_BASE_URL",
                defaults.google_places_base_url,
            )?,
            yelp_api_key: optional_env("YELP_API_KEY"),
            yelp_base_url: base_url_env("YELP_BASE_URL", defaults.yelp_base_url)?,
            apollo_api_key: optional_env("APOLLO_API_KEY"),
            apollo_base_url: base_url_env("APOLLO_BASE_URL", defaults.apollo_base_url)?,
            hunter_api_key: optional_env("HUNTER_API_KEY"),
            hunter_base_url: base_url_env("HUNTER_BASE_URL", defaults.hunter_base_url)?,
            directory_url_template: optional_env("DIRECTORY_URL_TEMPLATE")
                .map(|template| {
                    if !template.starts_with("http://") && !template.starts_with("https://") {
                        anyhow::bail!("DIRECTORY_URL_TEMPLATE must start with http:// or https://");
                    }
                    Ok(template)
                })
                .transpose()?,
            openai_api_key: optional_env("OPENAI_API_KEY"),
            openai_base_url: base_url_env("OPENAI_BASE_URL", defaults.openai_base_url)?,
            openai_model: optional_env("OPENAI_MODEL").unwrap_or(defaults.openai_model),
            alert_webhook_url: optional_env("ALERT_WEBHOOK_URL"),
            discovery_deadline_secs: numeric_env(
                "DISCOVERY_DEADLINE_SECS",
                defaults.discovery_deadline_secs,
            )?,
            source_timeout_secs: numeric_env("SOURCE_TIMEOUT_SECS", defaults.source_timeout_secs)?,
            enrichment_timeout_secs: numeric_env(
                "ENRICHMENT_TIMEOUT_SECS",
                defaults.enrichment_timeout_secs,
            )?,
            enrichment_delay_ms: numeric_env("ENRICHMENT_DELAY_MS", defaults.enrichment_delay_ms)?,
            location_delay_ms: numeric_env("LOCATION_DELAY_MS", defaults.location_delay_ms)?,
            default_phone_region: optional_env("DEFAULT_PHONE_REGION")
                .map(|r| r.to_uppercase())
                .unwrap_or(defaults.default_phone_region),
            scheduler_poll_secs: numeric_env("SCHEDULER_POLL_SECS", defaults.scheduler_poll_secs)?,
            high_value_threshold: numeric_env(
                "HIGH_VALUE_THRESHOLD",
                defaults.high_value_threshold as u64,
            )?
            .min(100) as u8,
        };

        // Log which sources are live (never the keys themselves)
        tracing::debug!(
            "Sources configured: maps={}, reviews={}, org_directory={}, email_finder={}, website={}",
            config.google_places_api_key.is_some(),
            config.yelp_api_key.is_some(),
            config.apollo_api_key.is_some(),
            config.hunter_api_key.is_some(),
            config.directory_url_template.is_some(),
        );
        tracing::debug!("AI summary configured: {}", config.openai_api_key.is_some());
        tracing::debug!("Database configured: {}", config.database_url.is_some());
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }

    pub fn discovery_deadline(&self) -> Duration {
        Duration::from_secs(self.discovery_deadline_secs)
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.source_timeout_secs)
    }

    pub fn enrichment_timeout(&self) -> Duration {
        Duration::from_secs(self.enrichment_timeout_secs)
    }

    pub fn enrichment_delay(&self) -> Duration {
        Duration::from_millis(self.enrichment_delay_ms)
    }

    pub fn location_delay(&self) -> Duration {
        Duration::from_millis(self.location_delay_ms)
    }

    /// Never zero; a zero-period interval would spin.
    pub fn scheduler_poll_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler_poll_secs.max(1))
    }
}

/// Reads an env var, treating blank values as absent.
fn optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn base_url_env(key: &str, default: String) -> anyhow::Result<String> {
    match optional_env(key) {
        Some(url) => {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("{} must start with http:// or https://", key);
            }
            Ok(url.trim_end_matches('/').to_string())
        }
        None => Ok(default),
    }
}

fn numeric_env(key: &str, default: u64) -> anyhow::Result<u64> {
    match optional_env(key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be a non-negative integer", key)),
        None => Ok(default),
    }
}
