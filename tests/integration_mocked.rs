/// Integration tests with mocked external APIs
/// Exercises every source adapter, website provider and outbound sink against wiremock
use std::collections::BTreeMap;
use std::time::Duration;

use rust_lead_discovery::ai::{OpenAiSummarizer, SummaryProvider};
use rust_lead_discovery::config::Config;
use rust_lead_discovery::context::DiscoveryContext;
use rust_lead_discovery::enrichment::{
    EmailFinderDomainSearch, EnrichmentPipeline, EnrichmentProvider, FilledValue,
    OrgDirectoryLookup, WebsiteAdPixels, WebsiteContactScrape, WebsiteSocialLinks,
};
use rust_lead_discovery::models::{Candidate, Lead, SocialPlatform, SourceName};
use rust_lead_discovery::notifier::{Notifier, WebhookNotifier};
use rust_lead_discovery::sources::{
    build_http_client, EmailFinderSource, MapsSource, OrgDirectoryClient, OrgDirectorySource,
    ReviewsSource, SourceAdapter, WebsiteSource,
};
use rust_lead_discovery::strategy::select_strategy;
use rust_lead_discovery::website::{WebsiteFetcher, UNREACHABLE_QUALITY_SCORE};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client() -> reqwest::Client {
    build_http_client(Duration::from_secs(5)).unwrap()
}

fn ctx() -> DiscoveryContext {
    DiscoveryContext::with_timeout(Duration::from_secs(30))
}

fn lead_with_website(name: &str, website: &str) -> Lead {
    let mut c = Candidate::new(name, "Marketing agency", SourceName::Maps, 90);
    c.website = Some(website.to_string());
    Lead::from_candidate(c, "Austin, TX")
}

// ============ Source adapters ============

#[tokio::test]
async fn test_maps_source_maps_places() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/maps/api/place/textsearch/json"))
        .and(query_param("query", "Plumbing in Austin, TX"))
        .and(query_param("key", "places-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "OK",
            "results": [
                {
                    "name": "Ace Plumbing",
                    "formatted_address": "1 Main St, Austin, TX 78701, USA",
                    "rating": 3.8,
                    "user_ratings_total": 12,
                    "geometry": { "location": { "lat": 30.27, "lng": -97.74 } }
                },
                { "name": "Bolt Plumbing Co" },
                { "name": "Third Plumbing" }
            ]
        })))
        .mount(&mock_server)
        .await;

    let config = Config {
        google_places_api_key: Some("places-key".to_string()),
        google_places_base_url: mock_server.uri(),
        ..Config::default()
    };
    let source = MapsSource::new(client(), &config);
    assert!(source.is_configured());

    let candidates = source
        .search(&ctx(), "Plumbing", "Austin, TX", 2)
        .await
        .expect("maps search should succeed");

    assert_eq!(candidates.len(), 2);
    let ace = &candidates[0];
    assert_eq!(ace.name, "Ace Plumbing");
    assert_eq!(ace.source_name, SourceName::Maps);
    assert_eq!(ace.source_confidence, MapsSource::CONFIDENCE);
    assert_eq!(ace.address.as_deref(), Some("1 Main St"));
    assert_eq!(ace.city.as_deref(), Some("Austin"));
    assert_eq!(ace.state.as_deref(), Some("TX"));
    assert_eq!(ace.rating, Some(3.8));
    assert_eq!(ace.review_count, Some(12));
    assert!(ace.coordinates.is_some());
    assert!(candidates[1].rating.is_none());
}

#[tokio::test]
async fn test_maps_source_zero_results_is_empty_not_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/maps/api/place/textsearch/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "ZERO_RESULTS",
            "results": []
        })))
        .mount(&mock_server)
        .await;

    let config = Config {
        google_places_api_key: Some("places-key".to_string()),
        google_places_base_url: mock_server.uri(),
        ..Config::default()
    };
    let candidates = MapsSource::new(client(), &config)
        .search(&ctx(), "Plumbing", "Nowhere", 10)
        .await
        .unwrap();
    assert!(candidates.is_empty());
}

#[tokio::test]
async fn test_maps_source_denied_status_is_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/maps/api/place/textsearch/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "REQUEST_DENIED",
            "error_message": "The provided API key is invalid."
        })))
        .mount(&mock_server)
        .await;

    let config = Config {
        google_places_api_key: Some("bad-key".to_string()),
        google_places_base_url: mock_server.uri(),
        ..Config::default()
    };
    let result = MapsSource::new(client(), &config)
        .search(&ctx(), "Plumbing", "Austin, TX", 10)
        .await;

    let err = result.expect_err("denied status should fail");
    assert!(err.to_string().contains("REQUEST_DENIED"));
}

#[tokio::test]
async fn test_reviews_source_sends_bearer_token() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v3/businesses/search"))
        .and(header("Authorization", "Bearer yelp-key"))
        .and(query_param("term", "hvac"))
        .and(query_param("location", "Denver, CO"))
        .and(query_param("limit", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "businesses": [
                {
                    "name": "Cool Air HVAC",
                    "phone": "",
                    "display_phone": "(303) 555-0142",
                    "rating": 4.5,
                    "review_count": 88,
                    "coordinates": { "latitude": 39.74, "longitude": -104.99 },
                    "location": { "address1": "9 Elm Rd", "city": "Denver", "state": "CO" }
                }
            ]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = Config {
        yelp_api_key: Some("yelp-key".to_string()),
        yelp_base_url: mock_server.uri(),
        ..Config::default()
    };
    let candidates = ReviewsSource::new(client(), &config)
        .search(&ctx(), "hvac", "Denver, CO", 5)
        .await
        .unwrap();

    assert_eq!(candidates.len(), 1);
    let c = &candidates[0];
    assert_eq!(c.name, "Cool Air HVAC");
    assert_eq!(c.source_name, SourceName::Reviews);
    assert!(c.phone.is_some());
    assert_eq!(c.review_count, Some(88));
    assert_eq!(c.city.as_deref(), Some("Denver"));
    assert_eq!(c.address.as_deref(), Some("9 Elm Rd"));
}

#[tokio::test]
async fn test_reviews_source_server_error_propagates() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v3/businesses/search"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&mock_server)
        .await;

    let config = Config {
        yelp_api_key: Some("yelp-key".to_string()),
        yelp_base_url: mock_server.uri(),
        ..Config::default()
    };
    let err = ReviewsSource::new(client(), &config)
        .search(&ctx(), "hvac", "Denver, CO", 5)
        .await
        .expect_err("500 should fail");
    assert!(err.to_string().contains("500"));
}

#[tokio::test]
async fn test_org_directory_source_posts_search() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/mixed_companies/search"))
        .and(header("X-Api-Key", "apollo-key"))
        .and(body_partial_json(json!({
            "q_organization_keyword_tags": ["software"],
            "organization_locations": ["Austin, TX"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "organizations": [
                {
                    "name": "Byteworks",
                    "website_url": "https://byteworks.io",
                    "phone": null,
                    "street_address": "500 Congress Ave",
                    "city": "Austin",
                    "state": "Texas"
                }
            ]
        })))
        .mount(&mock_server)
        .await;

    let config = Config {
        apollo_api_key: Some("apollo-key".to_string()),
        apollo_base_url: mock_server.uri(),
        ..Config::default()
    };
    let source = OrgDirectorySource::new(OrgDirectoryClient::new(client(), &config), &config);
    let candidates = source
        .search(&ctx(), "software", "Austin, TX", 10)
        .await
        .unwrap();

    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].website.as_deref(), Some("https://byteworks.io"));
    assert_eq!(candidates[0].source_confidence, OrgDirectorySource::CONFIDENCE);
    assert!(candidates[0].phone.is_none());
}

#[tokio::test]
async fn test_email_finder_source_builds_websites_from_domains() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v2/discover"))
        .and(query_param("api_key", "hunter-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                { "domain": "ledgerly.com", "organization": "Ledgerly" },
                { "domain": "countwise.com", "organization": null },
                { "domain": null, "organization": null }
            ]
        })))
        .mount(&mock_server)
        .await;

    let config = Config {
        hunter_api_key: Some("hunter-key".to_string()),
        hunter_base_url: mock_server.uri(),
        ..Config::default()
    };
    let candidates = EmailFinderSource::new(client(), &config)
        .search(&ctx(), "accounting", "Boston, MA", 10)
        .await
        .unwrap();

    assert_eq!(candidates.len(), 2);
    assert_eq!(candidates[0].name, "Ledgerly");
    assert_eq!(candidates[0].website.as_deref(), Some("https://ledgerly.com"));
    assert_eq!(candidates[1].name, "countwise.com");
}

#[tokio::test]
async fn test_website_source_reads_json_ld_listings() {
    let mock_server = MockServer::start().await;

    let html = r#"<html><head>
        <script type="application/ld+json">
        {"@type":"ItemList","itemListElement":[
            {"@type":"ListItem","position":1,"item":{"@type":"HVACBusiness","name":"Cool Air HVAC","telephone":"303-555-0142","url":"https://coolair.example"}},
            {"@type":"ListItem","position":2,"item":{"@type":"HVACBusiness","name":"Heat Pros"}}
        ]}
        </script></head><body>listing</body></html>"#;

    Mock::given(method("GET"))
        .and(path("/directory"))
        .and(query_param("q", "hvac repair"))
        .and(query_param("near", "Denver, CO"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string(html),
        )
        .mount(&mock_server)
        .await;

    let config = Config {
        directory_url_template: Some(format!(
            "{}/directory?q={{industry}}&near={{location}}",
            mock_server.uri()
        )),
        ..Config::default()
    };
    let candidates = WebsiteSource::new(client(), &config)
        .search(&ctx(), "hvac repair", "Denver, CO", 10)
        .await
        .unwrap();

    let names: Vec<&str> = candidates.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["Cool Air HVAC", "Heat Pros"]);
    assert_eq!(candidates[0].source_name, SourceName::Website);
    assert_eq!(candidates[0].website.as_deref(), Some("https://coolair.example"));
}

// ============ Website fetching & analysis ============

#[tokio::test]
async fn test_website_analysis_scores_structure() {
    let mock_server = MockServer::start().await;

    let html = r#"<html><head>
        <title>Bright Agency</title>
        <meta name="viewport" content="width=device-width">
        <meta name="description" content="Full-service marketing for local brands">
        </head><body>
        <h1>We grow brands</h1>
        <a href="/contact">Contact us</a>
        <a href="tel:+15125550100">Call</a>
        </body></html>"#;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string(html),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let pages = WebsiteFetcher::new(client());
    let analysis = pages.analyze(&mock_server.uri()).await;

    assert!(analysis.exists);
    assert!(analysis.reachable);
    // viewport 15 + title 10 + description 10 + h1 10 + contact 10 + tel 5
    assert_eq!(analysis.quality_score, 60);
    assert!(analysis.issues.contains(&"No HTTPS".to_string()));
    assert!(analysis.issues.contains(&"No structured data".to_string()));

    // Second read comes from the page cache
    let again = pages.analyze(&mock_server.uri()).await;
    assert_eq!(again.quality_score, 60);
}

#[tokio::test]
async fn test_unreachable_website_still_exists() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let analysis = WebsiteFetcher::new(client()).analyze(&mock_server.uri()).await;

    assert!(analysis.exists);
    assert!(!analysis.reachable);
    assert_eq!(analysis.quality_score, UNREACHABLE_QUALITY_SCORE);
}

// ============ Enrichment providers ============

#[tokio::test]
async fn test_domain_search_picks_most_confident_valid_email() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/domain-search"))
        .and(query_param("domain", "aceplumbing.com"))
        .and(query_param("api_key", "hunter-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "emails": [
                    { "value": "office@aceplumbing.com", "confidence": 70 },
                    { "value": "noreply@aceplumbing.com", "confidence": 99 },
                    { "value": "owner@aceplumbing.com", "confidence": 92 }
                ]
            }
        })))
        .mount(&mock_server)
        .await;

    let config = Config {
        hunter_api_key: Some("hunter-key".to_string()),
        hunter_base_url: mock_server.uri(),
        ..Config::default()
    };
    let provider = EmailFinderDomainSearch::new(client(), &config);
    let lead = lead_with_website("Ace Plumbing", "https://www.aceplumbing.com/about");

    let fill = provider.fill(&ctx(), &lead).await.unwrap().expect("an email");
    assert_eq!(fill.value, FilledValue::Email("owner@aceplumbing.com".to_string()));
    assert_eq!(fill.confidence, 92);
}

#[tokio::test]
async fn test_domain_search_skips_leads_without_website() {
    let config = Config {
        hunter_api_key: Some("hunter-key".to_string()),
        hunter_base_url: "http://127.0.0.1:9".to_string(),
        ..Config::default()
    };
    let provider = EmailFinderDomainSearch::new(client(), &config);
    let lead = Lead::from_candidate(
        Candidate::new("Ace Plumbing", "Plumbing", SourceName::Maps, 90),
        "Austin, TX",
    );
    assert_eq!(provider.fill(&ctx(), &lead).await.unwrap(), None);
}

#[tokio::test]
async fn test_org_lookup_requires_matching_name() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/mixed_companies/search"))
        .and(body_partial_json(json!({ "q_organization_name": "Bright Agency" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "organizations": [
                { "name": "Unrelated Holdings", "website_url": "https://unrelated.com" },
                { "name": "Bright Agency LLC", "website_url": "https://brightagency.com" }
            ]
        })))
        .mount(&mock_server)
        .await;

    let config = Config {
        apollo_api_key: Some("apollo-key".to_string()),
        apollo_base_url: mock_server.uri(),
        ..Config::default()
    };
    let provider = OrgDirectoryLookup::new(OrgDirectoryClient::new(client(), &config));
    let lead = Lead::from_candidate(
        Candidate::new("Bright Agency", "Marketing agency", SourceName::Reviews, 80),
        "Austin, TX",
    );

    let fill = provider.fill(&ctx(), &lead).await.unwrap().expect("a website");
    assert_eq!(fill.value, FilledValue::Website("https://brightagency.com".to_string()));
}

#[tokio::test]
async fn test_website_providers_share_one_fetch() {
    let mock_server = MockServer::start().await;

    let homepage = r#"<html><head><title>Bright Agency</title>
        <script async src="https://www.googletagmanager.com/gtag/js?id=AW-123456789"></script>
        </head><body>
        <a href="https://www.facebook.com/sharer/sharer.php?u=x">Share</a>
        <a href="https://www.facebook.com/brightagency">Facebook</a>
        <a href="https://www.linkedin.com/company/brightagency">LinkedIn</a>
        </body></html>"#;
    let contact = r#"<html><body><a href="mailto:Hello@BrightAgency.com">Email us</a></body></html>"#;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(homepage))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/contact"))
        .respond_with(ResponseTemplate::new(200).set_body_string(contact))
        .expect(1)
        .mount(&mock_server)
        .await;

    let pages = WebsiteFetcher::new(client());
    let pipeline = EnrichmentPipeline::new(Duration::from_secs(5), Duration::ZERO)
        .with_provider(std::sync::Arc::new(WebsiteContactScrape::new(pages.clone())))
        .with_provider(std::sync::Arc::new(WebsiteSocialLinks::new(pages.clone())))
        .with_provider(std::sync::Arc::new(WebsiteAdPixels::new(pages.clone())))
        .with_website_analysis(pages);

    let strategy = select_strategy("Marketing agency", "Austin, TX", None);
    let lead = lead_with_website("Bright Agency", &mock_server.uri());
    let (leads, stats) = pipeline.enrich(&ctx(), vec![lead], &strategy).await;
    let lead = &leads[0];

    assert_eq!(lead.email.as_deref(), Some("hello@brightagency.com"));
    let mut expected = BTreeMap::new();
    expected.insert(
        SocialPlatform::Facebook,
        "https://www.facebook.com/brightagency".to_string(),
    );
    expected.insert(
        SocialPlatform::Linkedin,
        "https://www.linkedin.com/company/brightagency".to_string(),
    );
    assert_eq!(lead.social_links, expected);
    assert_eq!(lead.has_ads, Some(true));
    let analysis = lead.website_analysis.as_ref().expect("analysis");
    assert!(analysis.reachable);
    assert_eq!(stats.provider_errors, 0);
}

// ============ Outbound sinks ============

#[tokio::test]
async fn test_webhook_notifier_posts_alert() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/hooks/leads"))
        .and(body_partial_json(json!({
            "type": "high_value_leads",
            "high_value_count": 3
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let notifier = WebhookNotifier::new(format!("{}/hooks/leads", mock_server.uri()), client());
    notifier
        .alert(Uuid::new_v4(), 3, "Plumbing in Austin: Ace Plumbing (95)")
        .await
        .expect("alert should be delivered");
}

#[tokio::test]
async fn test_webhook_notifier_reports_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let notifier = WebhookNotifier::new(mock_server.uri(), client());
    assert!(notifier.alert(Uuid::new_v4(), 1, "x").await.is_err());
}

#[tokio::test]
async fn test_summarizer_reads_first_choice() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("Authorization", "Bearer openai-key"))
        .and(body_partial_json(json!({ "model": "gpt-4o-mini" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [
                { "message": { "role": "assistant", "content": "  No website and few reviews. Lead with a site build.  " } }
            ]
        })))
        .mount(&mock_server)
        .await;

    let config = Config {
        openai_api_key: Some("openai-key".to_string()),
        openai_base_url: mock_server.uri(),
        ..Config::default()
    };
    let summarizer = OpenAiSummarizer::new(client(), &config);
    let lead = Lead::from_candidate(
        Candidate::new("Ace Plumbing", "Plumbing", SourceName::Maps, 90),
        "Austin, TX",
    );

    let summary = summarizer.summarize(&lead).await.unwrap();
    assert_eq!(
        summary.as_deref(),
        Some("No website and few reviews. Lead with a site build.")
    );
}

#[tokio::test]
async fn test_unconfigured_summarizer_returns_nothing() {
    let summarizer = OpenAiSummarizer::new(client(), &Config::default());
    assert!(!summarizer.is_configured());
    let lead = Lead::from_candidate(
        Candidate::new("Ace Plumbing", "Plumbing", SourceName::Maps, 90),
        "Austin, TX",
    );
    assert_eq!(summarizer.summarize(&lead).await.unwrap(), None);
}
