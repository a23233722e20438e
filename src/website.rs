//! Fetching and reading business websites.
//!
//! [`WebsiteFetcher`] keeps one cached copy of each page so the email,
//! social, ad and analysis stages share a single request per site.

use chrono::{Datelike, Utc};
use moka::future::Cache;
use regex::Regex;
use reqwest::Client;
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use crate::models::{SocialPlatform, WebsiteAnalysis};
use crate::validation::is_valid_email;

/// Score given to a site that exists but could not be loaded.
pub const UNREACHABLE_QUALITY_SCORE: u8 = 40;

/// A fetched HTML page.
#[derive(Debug, Clone)]
pub struct Page {
    /// Final URL after redirects.
    pub url: String,
    pub html: String,
}

impl Page {
    pub fn is_https(&self) -> bool {
        self.url.starts_with("https://")
    }
}

/// Adds a scheme to bare domains like `aceplumbing.com`.
pub fn normalize_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let with_scheme = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed.trim_start_matches("//"))
    };
    let parsed = url::Url::parse(&with_scheme).ok()?;
    parsed.host_str()?;
    Some(parsed.to_string())
}

#[derive(Clone)]
pub struct WebsiteFetcher {
    client: Client,
    /// `None` marks a page that failed to load.
    cache: Cache<String, Option<Arc<Page>>>,
}

impl WebsiteFetcher {
    pub fn new(client: Client) -> Self {
        let cache = Cache::builder()
            .time_to_live(Duration::from_secs(3600)) // 1 hour
            .max_capacity(5_000)
            .build();
        Self { client, cache }
    }

    /// Homepage (or any page) for `website`; `None` when unreachable.
    pub async fn fetch(&self, website: &str) -> Option<Arc<Page>> {
        let url = normalize_url(website)?;

        if let Some(cached) = self.cache.get(&url).await {
            tracing::debug!("Page cache hit: {}", url);
            return cached;
        }

        let page = match self.load(&url).await {
            Ok(page) => Some(Arc::new(page)),
            Err(e) => {
                tracing::warn!("Website fetch failed for {}: {}", url, e);
                None
            }
        };
        self.cache.insert(url, page.clone()).await;
        page
    }

    /// A page relative to the site root, such as `/contact`.
    pub async fn fetch_path(&self, website: &str, path: &str) -> Option<Arc<Page>> {
        let base = url::Url::parse(&normalize_url(website)?).ok()?;
        let joined = base.join(path).ok()?;
        self.fetch(joined.as_str()).await
    }

    async fn load(&self, url: &str) -> Result<Page, reqwest::Error> {
        tracing::info!("Fetching website: {}", url);
        let response = self.client.get(url).send().await?.error_for_status()?;
        let final_url = response.url().to_string();
        let html = response.text().await?;
        Ok(Page {
            url: final_url,
            html,
        })
    }

    /// Full quality assessment. An unreachable site still counts as existing.
    pub async fn analyze(&self, website: &str) -> WebsiteAnalysis {
        match self.fetch(website).await {
            Some(page) => analyze_page(&page),
            None => unreachable_analysis(),
        }
    }
}

/// Assessment for a site that is listed but could not be loaded.
pub fn unreachable_analysis() -> WebsiteAnalysis {
    WebsiteAnalysis {
        exists: true,
        reachable: false,
        quality_score: UNREACHABLE_QUALITY_SCORE,
        issues: vec!["Website could not be loaded".to_string()],
        analyzed_at: Utc::now(),
    }
}

// ============ Page assessment ============

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).unwrap())
}

fn viewport_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r#"(?i)<meta[^>]+name\s*=\s*["']viewport["']"#)
}

fn title_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"(?is)<title[^>]*>\s*([^<\s][^<]*)</title>")
}

fn description_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r#"(?i)<meta[^>]+name\s*=\s*["']description["'][^>]+content\s*=\s*["'][^"']{10,}"#)
}

fn h1_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"(?i)<h1[\s>]")
}

fn contact_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r#"(?i)(<form[\s>]|href\s*=\s*["'](?:mailto:|[^"']*contact))"#)
}

fn copyright_year_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"(?i)(?:©|&copy;|copyright)\s*(?:\d{4}\s*[-–]\s*)?((?:19|20)\d{2})")
}

/// Quality score 0-100 from structural and freshness checks.
pub fn analyze_page(page: &Page) -> WebsiteAnalysis {
    let html = page.html.as_str();
    let lower = html.to_lowercase();
    let mut score: u32 = 0;
    let mut issues = Vec::new();

    let mut check = |passed: bool, points: u32, issue: &str| {
        if passed {
            score += points;
        } else {
            issues.push(issue.to_string());
        }
    };

    check(page.is_https(), 15, "No HTTPS");
    check(viewport_re().is_match(html), 15, "Not mobile friendly");
    check(title_re().is_match(html), 10, "Missing page title");
    check(description_re().is_match(html), 10, "Missing meta description");
    check(h1_re().is_match(html), 10, "No main heading");
    check(contact_re().is_match(html), 10, "No contact form or link");
    check(lower.contains("application/ld+json"), 10, "No structured data");
    check(lower.contains("href=\"tel:") || lower.contains("href='tel:"), 5, "No click-to-call");
    check(
        lower.contains("googletagmanager.com") || lower.contains("gtag(") || lower.contains("google-analytics.com"),
        5,
        "No analytics",
    );

    let current_year = Utc::now().year();
    let newest_year = copyright_year_re()
        .captures_iter(html)
        .filter_map(|c| c.get(1)?.as_str().parse::<i32>().ok())
        .max();
    check(
        newest_year.is_some_and(|y| y >= current_year - 1),
        10,
        "Outdated copyright year",
    );

    WebsiteAnalysis {
        exists: true,
        reachable: true,
        quality_score: score.min(100) as u8,
        issues,
        analyzed_at: Utc::now(),
    }
}

// ============ Extraction ============

fn social_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(
        &RE,
        r#"(?i)https?://(?:www\.|m\.)?(facebook\.com|fb\.com|instagram\.com|linkedin\.com|twitter\.com|x\.com|youtube\.com|tiktok\.com)/[^\s"'<>)]+"#,
    )
}

fn mailto_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r#"(?i)mailto:([^"'?>\s]+)"#)
}

fn plain_email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}")
}

fn ads_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"AW-\d{6,}")
}

/// Share widgets and intents are not profiles.
fn is_share_link(link: &str) -> bool {
    const MARKERS: &[&str] = &["sharer", "/share", "intent/", "/plugins/", "/dialog/", "/tr?"];
    MARKERS.iter().any(|m| link.contains(m))
}

/// First profile link per platform, in page order.
pub fn extract_social_links(html: &str) -> BTreeMap<SocialPlatform, String> {
    let mut links = BTreeMap::new();
    for capture in social_re().captures_iter(html) {
        let (Some(full), Some(host)) = (capture.get(0), capture.get(1)) else {
            continue;
        };
        let link = full.as_str().trim_end_matches(['.', ',', ';']);
        if is_share_link(&link.to_lowercase()) {
            continue;
        }
        let platform = match host.as_str().to_lowercase().as_str() {
            "facebook.com" | "fb.com" => SocialPlatform::Facebook,
            "instagram.com" => SocialPlatform::Instagram,
            "linkedin.com" => SocialPlatform::Linkedin,
            "twitter.com" | "x.com" => SocialPlatform::Twitter,
            "youtube.com" => SocialPlatform::Youtube,
            "tiktok.com" => SocialPlatform::Tiktok,
            _ => continue,
        };
        links.entry(platform).or_insert_with(|| link.to_string());
    }
    links
}

/// Google Ads, Meta or TikTok ad tags on the page.
pub fn detect_ad_pixels(html: &str) -> bool {
    let lower = html.to_lowercase();
    ads_tag_re().is_match(html)
        || lower.contains("googleadservices.com")
        || lower.contains("fbq(")
        || lower.contains("connect.facebook.net/en_us/fbevents.js")
        || lower.contains("analytics.tiktok.com")
}

/// Valid emails on a page: `mailto:` links first, then plain text.
pub fn extract_emails(html: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    let mailto = mailto_re()
        .captures_iter(html)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()));
    let plain = plain_email_re()
        .find_iter(html)
        .map(|m| m.as_str().to_string());

    for email in mailto.chain(plain) {
        let email = email.trim().to_lowercase();
        if is_valid_email(&email) && !found.contains(&email) {
            found.push(email);
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(url: &str, html: &str) -> Page {
        Page {
            url: url.to_string(),
            html: html.to_string(),
        }
    }

    #[test]
    fn test_normalize_url_adds_scheme() {
        assert_eq!(normalize_url("aceplumbing.com").as_deref(), Some("https://aceplumbing.com/"));
        assert_eq!(normalize_url("http://ace.com/x").as_deref(), Some("http://ace.com/x"));
        assert_eq!(normalize_url("  "), None);
    }

    #[test]
    fn test_bare_page_scores_low() {
        let analysis = analyze_page(&page("http://old.biz/", "<html><body>hello</body></html>"));
        assert!(analysis.reachable);
        assert_eq!(analysis.quality_score, 0);
        assert!(analysis.issues.contains(&"No HTTPS".to_string()));
    }

    #[test]
    fn test_complete_page_scores_full() {
        let year = Utc::now().year();
        let html = format!(
            r#"<html><head><title>Ace Plumbing</title>
            <meta name="viewport" content="width=device-width">
            <meta name="description" content="Licensed plumbers serving Austin since 1990">
            <script type="application/ld+json">{{}}</script>
            <script async src="https://www.googletagmanager.com/gtag/js"></script>
            </head><body><h1>Ace</h1><a href="/contact">Contact</a>
            <a href="tel:+15125550199">Call</a><footer>© {}</footer></body></html>"#,
            year
        );
        let analysis = analyze_page(&page("https://ace.com/", &html));
        assert_eq!(analysis.quality_score, 100, "issues: {:?}", analysis.issues);
    }

    #[test]
    fn test_extract_social_links_skips_share_widgets() {
        let html = r#"
            <a href="https://www.facebook.com/sharer/sharer.php?u=x">share</a>
            <a href="https://www.facebook.com/aceplumbing">fb</a>
            <a href="https://x.com/aceplumbing">x</a>
            <a href="https://www.linkedin.com/company/ace-plumbing/">in</a>"#;
        let links = extract_social_links(html);
        assert_eq!(links.len(), 3);
        assert_eq!(links[&SocialPlatform::Facebook], "https://www.facebook.com/aceplumbing");
        assert!(links.contains_key(&SocialPlatform::Twitter));
        assert!(links.contains_key(&SocialPlatform::Linkedin));
    }

    #[test]
    fn test_detect_ad_pixels() {
        assert!(detect_ad_pixels("<script>gtag('config', 'AW-123456789');</script>"));
        assert!(detect_ad_pixels("<script>fbq('init', '1');</script>"));
        assert!(!detect_ad_pixels("<script>console.log('hi')</script>"));
    }

    #[test]
    fn test_extract_emails_filters_placeholders() {
        let html = r#"<a href="mailto:Owner@AcePlumbing.com?subject=hi">mail</a>
            write to noreply@aceplumbing.com or info@example.com or sales@aceplumbing.com"#;
        assert_eq!(
            extract_emails(html),
            vec!["owner@aceplumbing.com".to_string(), "sales@aceplumbing.com".to_string()]
        );
    }
}
