//! Tavily search client: the company-research provider.

use super::client::RateLimitedClient;
use crate::extract;
use crate::CompanyResearchProvider;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use vantage_core::{
    ExternalService, FundingData, NewsArticle, NewsData, ProfileData, ProviderError, TeamData,
};

const TAVILY_BASE_URL: &str = "https://api.tavily.com";
const DESCRIPTION_MAX_CHARS: usize = 600;

// ============================================================================
// WIRE TYPES
// ============================================================================

#[derive(Debug, Clone, Serialize)]
struct SearchRequest<'a> {
    api_key: &'a str,
    query: String,
    search_depth: &'static str,
    topic: &'static str,
    max_results: u32,
    include_answer: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    days: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    include_domains: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Clone, Deserialize)]
struct SearchResult {
    title: String,
    url: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    published_date: Option<String>,
}

impl SearchResponse {
    /// Answer plus every result snippet, one per line.
    fn corpus(&self) -> String {
        let mut text = self.answer.clone().unwrap_or_default();
        for result in &self.results {
            text.push('\n');
            text.push_str(&result.content);
        }
        text
    }
}

// ============================================================================
// CLIENT
// ============================================================================

/// Company research over the Tavily search API.
pub struct TavilyClient {
    http: RateLimitedClient,
    api_key: String,
    max_results: u32,
}

impl TavilyClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, TAVILY_BASE_URL)
    }

    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http: RateLimitedClient::new(
                ExternalService::Tavily,
                base_url,
                60,
                Duration::from_secs(30),
            ),
            api_key: api_key.into(),
            max_results: 5,
        }
    }

    async fn search(
        &self,
        query: String,
        topic: &'static str,
        website: Option<&str>,
    ) -> Result<SearchResponse, ProviderError> {
        let request = SearchRequest {
            api_key: &self.api_key,
            query,
            search_depth: "basic",
            topic,
            max_results: self.max_results,
            include_answer: topic == "general",
            days: (topic == "news").then_some(30),
            include_domains: Vec::new(),
        };
        let response: SearchResponse = self.http.post_json("search", &request).await?;

        if response.results.is_empty() && response.answer.is_none() {
            return Err(ProviderError::NotFound {
                service: ExternalService::Tavily,
                subject: website.map_or_else(|| request.query.clone(), str::to_string),
            });
        }
        Ok(response)
    }
}

fn subject(name: &str, website: Option<&str>) -> String {
    match website.filter(|w| !w.trim().is_empty()) {
        Some(site) => format!("\"{}\" ({})", name, site),
        None => format!("\"{}\"", name),
    }
}

fn clip(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", text[..idx].trim_end()),
        None => text.trim().to_string(),
    }
}

#[async_trait]
impl CompanyResearchProvider for TavilyClient {
    async fn fetch_profile(
        &self,
        name: &str,
        website: Option<&str>,
    ) -> Result<ProfileData, ProviderError> {
        let query = format!(
            "{} company overview: what it does, year founded, headquarters, number of employees",
            subject(name, website)
        );
        let response = self.search(query, "general", website).await?;
        let text = response.corpus();

        let description = response
            .answer
            .clone()
            .or_else(|| response.results.first().map(|r| r.content.clone()))
            .filter(|d| !d.trim().is_empty())
            .map(|d| clip(&d, DESCRIPTION_MAX_CHARS));
        let founded_year = extract::founded_year(&text);
        let headquarters = extract::headquarters(&text);
        let employee_count = extract::employee_count(&text);

        let fields = [
            description.is_some(),
            founded_year.is_some(),
            headquarters.is_some(),
            employee_count.is_some(),
        ]
        .iter()
        .filter(|f| **f)
        .count();

        Ok(ProfileData {
            description,
            founded_year,
            headquarters,
            employee_count,
            confidence_score: extract::section_confidence(response.results.len(), fields, 4),
        })
    }

    async fn fetch_funding(
        &self,
        name: &str,
        website: Option<&str>,
    ) -> Result<FundingData, ProviderError> {
        let query = format!(
            "{} total funding raised, latest funding round and investors",
            subject(name, website)
        );
        let response = self.search(query, "general", website).await?;
        let text = response.corpus();

        let total_funding = extract::funding_amount_usd(&text);
        let last_round = extract::funding_round(&text);
        let investors = extract::investors(&text);
        let fields = usize::from(total_funding.is_some())
            + usize::from(last_round.is_some())
            + usize::from(!investors.is_empty());

        Ok(FundingData {
            total_funding,
            last_round,
            investors,
            confidence_score: extract::section_confidence(response.results.len(), fields, 3),
        })
    }

    async fn fetch_team(&self, name: &str) -> Result<TeamData, ProviderError> {
        let query = format!("{} founders, CEO and leadership team", subject(name, None));
        let response = self.search(query, "general", None).await?;
        let text = response.corpus();

        let founders = extract::founders(&text);
        let executives = extract::executives(&text);
        let fields = usize::from(!founders.is_empty()) + usize::from(!executives.is_empty());

        Ok(TeamData {
            founders,
            executives,
            confidence_score: extract::section_confidence(response.results.len(), fields, 2),
        })
    }

    async fn fetch_news(&self, name: &str) -> Result<NewsData, ProviderError> {
        let query = format!("{} latest news", subject(name, None));
        let response = self.search(query, "news", None).await?;

        let articles: Vec<NewsArticle> = response
            .results
            .into_iter()
            .map(|r| NewsArticle {
                title: r.title,
                url: r.url,
                published_at: r.published_date,
                snippet: Some(clip(&r.content, 280)).filter(|s| !s.is_empty()),
            })
            .collect();
        let confidence_score = extract::section_confidence(articles.len(), articles.len(), 5);

        Ok(NewsData {
            articles,
            confidence_score,
        })
    }
}

impl std::fmt::Debug for TavilyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TavilyClient")
            .field("base_url", &self.http.base_url())
            .field("api_key", &"[REDACTED]")
            .field("max_results", &self.max_results)
            .finish()
    }
}
