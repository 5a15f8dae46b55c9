//! Typed company-data payload sections.
//!
//! A cache row stores its payload as opaque JSON; these types are what that
//! JSON holds. Each section is optional so that partial fetches round-trip
//! without inventing data.

use crate::{CompanyIdentifier, CompanyType, DataType, ExternalService, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ============================================================================
// SECTIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ProfileData {
    pub description: Option<String>,
    pub founded_year: Option<i32>,
    pub headquarters: Option<String>,
    pub employee_count: Option<u32>,
    pub confidence_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct FundingData {
    /// Total disclosed funding in USD
    pub total_funding: Option<f64>,
    pub last_round: Option<String>,
    #[serde(default)]
    pub investors: Vec<String>,
    pub confidence_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct TeamData {
    #[serde(default)]
    pub founders: Vec<String>,
    #[serde(default)]
    pub executives: Vec<String>,
    pub confidence_score: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct NewsArticle {
    pub title: String,
    pub url: String,
    pub published_at: Option<String>,
    pub snippet: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct NewsData {
    #[serde(default)]
    pub articles: Vec<NewsArticle>,
    pub confidence_score: f64,
}

/// Market quote and fundamentals. Serves both `price` and `metrics`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct PriceData {
    pub symbol: String,
    pub current_price: Option<f64>,
    pub market_cap: Option<f64>,
    pub volume_24h: Option<f64>,
    pub price_change_24h: Option<f64>,
    pub pe_ratio: Option<f64>,
    pub eps: Option<f64>,
    pub revenue_ttm: Option<f64>,
    pub currency: Option<String>,
    /// Provider that supplied the primary quote
    pub provider: ExternalService,
}

impl PriceData {
    pub fn new(symbol: impl Into<String>, provider: ExternalService) -> Self {
        Self {
            symbol: symbol.into(),
            current_price: None,
            market_cap: None,
            volume_24h: None,
            price_change_24h: None,
            pe_ratio: None,
            eps: None,
            revenue_ttm: None,
            currency: None,
            provider,
        }
    }

    /// Fill fields this quote lacks from a lower-precedence quote.
    ///
    /// Fields already present are never overwritten.
    pub fn fill_gaps(&mut self, other: &PriceData) {
        fn fill<T: Clone>(slot: &mut Option<T>, from: &Option<T>) {
            if slot.is_none() {
                slot.clone_from(from);
            }
        }
        fill(&mut self.current_price, &other.current_price);
        fill(&mut self.market_cap, &other.market_cap);
        fill(&mut self.volume_24h, &other.volume_24h);
        fill(&mut self.price_change_24h, &other.price_change_24h);
        fill(&mut self.pe_ratio, &other.pe_ratio);
        fill(&mut self.eps, &other.eps);
        fill(&mut self.revenue_ttm, &other.revenue_ttm);
        fill(&mut self.currency, &other.currency);
    }

    pub fn has_quote(&self) -> bool {
        self.current_price.is_some()
    }
}

// ============================================================================
// MERGED PAYLOAD
// ============================================================================

/// Merged company data as cached and returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CompanyData {
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub identifier: CompanyIdentifier,
    pub name: String,
    pub company_type: CompanyType,
    pub profile: Option<ProfileData>,
    pub funding: Option<FundingData>,
    pub team: Option<TeamData>,
    pub news: Option<NewsData>,
    pub price: Option<PriceData>,
    /// When each section was last fetched
    #[serde(default)]
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub fetched_at: BTreeMap<DataType, Timestamp>,
    /// Providers that contributed at least one section
    #[serde(default)]
    pub sources: BTreeSet<ExternalService>,
    pub confidence_score: f64,
}

impl CompanyData {
    pub fn new(identifier: CompanyIdentifier, name: impl Into<String>, company_type: CompanyType) -> Self {
        Self {
            identifier,
            name: name.into(),
            company_type,
            profile: None,
            funding: None,
            team: None,
            news: None,
            price: None,
            fetched_at: BTreeMap::new(),
            sources: BTreeSet::new(),
            confidence_score: 0.0,
        }
    }

    pub fn has(&self, data_type: DataType) -> bool {
        match data_type {
            DataType::Profile => self.profile.is_some(),
            DataType::Funding => self.funding.is_some(),
            DataType::Team => self.team.is_some(),
            DataType::News => self.news.is_some(),
            DataType::Price | DataType::Metrics => self.price.is_some(),
        }
    }

    /// Number of distinct sections present.
    pub fn section_count(&self) -> usize {
        [
            self.profile.is_some(),
            self.funding.is_some(),
            self.team.is_some(),
            self.news.is_some(),
            self.price.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count()
    }

    pub fn is_empty(&self) -> bool {
        self.section_count() == 0
    }

    pub fn section_fetched_at(&self, data_type: DataType) -> Option<Timestamp> {
        self.fetched_at.get(&data_type).copied()
    }

    /// Record a section's fetch time. Price and metrics share a section.
    pub fn mark_fetched(&mut self, data_type: DataType, at: Timestamp) {
        match data_type {
            DataType::Price | DataType::Metrics => {
                self.fetched_at.insert(DataType::Price, at);
                self.fetched_at.insert(DataType::Metrics, at);
            }
            other => {
                self.fetched_at.insert(other, at);
            }
        }
    }

    /// Whether `data_type` is present and was fetched at or after `cutoff`.
    pub fn has_since(&self, data_type: DataType, cutoff: Timestamp) -> bool {
        self.has(data_type)
            && self
                .section_fetched_at(data_type)
                .is_some_and(|at| at >= cutoff)
    }

    /// Drop every section fetched before `cutoff`, returning how many went.
    ///
    /// A section with no recorded fetch time counts as expired.
    pub fn retain_sections_since(&mut self, cutoff: Timestamp) -> usize {
        let expired = |data_type: DataType, fetched_at: &BTreeMap<DataType, Timestamp>| {
            fetched_at.get(&data_type).map_or(true, |at| *at < cutoff)
        };
        let mut removed = 0;
        if self.profile.is_some() && expired(DataType::Profile, &self.fetched_at) {
            self.profile = None;
            removed += 1;
        }
        if self.funding.is_some() && expired(DataType::Funding, &self.fetched_at) {
            self.funding = None;
            removed += 1;
        }
        if self.team.is_some() && expired(DataType::Team, &self.fetched_at) {
            self.team = None;
            removed += 1;
        }
        if self.news.is_some() && expired(DataType::News, &self.fetched_at) {
            self.news = None;
            removed += 1;
        }
        if self.price.is_some() && expired(DataType::Price, &self.fetched_at) {
            self.price = None;
            removed += 1;
        }
        self.fetched_at.retain(|_, at| *at >= cutoff);
        removed
    }

    /// Overlay every section present in `newer` onto `self`.
    ///
    /// Sections absent from `newer` keep their existing value and timestamp.
    /// Confidence takes the newer value when `newer` carried any section.
    pub fn absorb(&mut self, newer: CompanyData) {
        if newer.is_empty() {
            return;
        }
        if newer.profile.is_some() {
            self.profile = newer.profile;
        }
        if newer.funding.is_some() {
            self.funding = newer.funding;
        }
        if newer.team.is_some() {
            self.team = newer.team;
        }
        if newer.news.is_some() {
            self.news = newer.news;
        }
        if newer.price.is_some() {
            self.price = newer.price;
        }
        self.fetched_at.extend(newer.fetched_at);
        self.sources.extend(newer.sources);
        self.confidence_score = newer.confidence_score;
        self.company_type = newer.company_type;
        if !newer.name.is_empty() {
            self.name = newer.name;
        }
    }

    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    pub fn from_payload(value: &serde_json::Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(value)
    }
}
