use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::config::Config;
use crate::errors::AppError;
use crate::models::Lead;

/// Writes a short outreach summary for a scored lead.
#[async_trait]
pub trait SummaryProvider: Send + Sync {
    fn is_configured(&self) -> bool {
        true
    }

    async fn summarize(&self, lead: &Lead) -> Result<Option<String>, AppError>;
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// OpenAI-compatible chat completions client.
pub struct OpenAiSummarizer {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiSummarizer {
    pub fn new(client: Client, config: &Config) -> Self {
        Self {
            client,
            base_url: config.openai_base_url.clone(),
            api_key: config.openai_api_key.clone(),
            model: config.openai_model.clone(),
        }
    }

    fn prompt(lead: &Lead) -> String {
        let mut facts = vec![format!("Business: {} ({})", lead.name, lead.industry)];
        facts.push(format!("Location: {}", lead.city.as_deref().unwrap_or(&lead.location)));
        if let Some(rating) = lead.rating {
            facts.push(format!(
                "Rating: {:.1} from {} reviews",
                rating,
                lead.review_count.unwrap_or(0)
            ));
        }
        facts.push(format!("Website: {}", lead.website.as_deref().unwrap_or("none")));
        if let Some(ref analysis) = lead.website_analysis {
            facts.push(format!("Website quality: {}/100", analysis.quality_score));
        }
        facts.push(format!("Opportunity score: {}/95", lead.opportunity_score));
        if !lead.pain_points.is_empty() {
            facts.push(format!("Pain points: {}", lead.pain_points.join("; ")));
        }
        facts.join("\n")
    }
}

#[async_trait]
impl SummaryProvider for OpenAiSummarizer {
    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn summarize(&self, lead: &Lead) -> Result<Option<String>, AppError> {
        let Some(ref key) = self.api_key else {
            return Ok(None);
        };

        let url = format!("{}/v1/chat/completions", self.base_url);
        let payload = json!({
            "model": self.model,
            "temperature": 0.3,
            "max_tokens": 200,
            "messages": [
                {
                    "role": "system",
                    "content": "You write two-sentence sales briefs for a digital marketing agency. Name the strongest opportunity and the best opening angle."
                },
                { "role": "user", "content": Self::prompt(lead) }
            ]
        });

        tracing::debug!("Requesting AI summary for '{}'", lead.name);
        let response = self
            .client
            .post(&url)
            .bearer_auth(key)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ExternalApiError(format!(
                "Summary API returned status {}: {}",
                status, error_text
            )));
        }

        let body: ChatResponse = response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse summary response: {}", e))
        })?;

        Ok(body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()))
    }
}
