//! Company references passed into the fetch services.

use crate::{normalize, CompanyIdentifier, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Broad company class; decides which market-data providers are consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum CompanyType {
    Crypto,
    Public,
    #[default]
    Private,
}

impl fmt::Display for CompanyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompanyType::Crypto => write!(f, "crypto"),
            CompanyType::Public => write!(f, "public"),
            CompanyType::Private => write!(f, "private"),
        }
    }
}

impl FromStr for CompanyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "crypto" | "web3" => Ok(CompanyType::Crypto),
            "public" | "traditional" => Ok(CompanyType::Public),
            "private" | "other" => Ok(CompanyType::Private),
            _ => Err(format!("Invalid CompanyType: {}", s)),
        }
    }
}

/// A company as supplied by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CompanyRef {
    pub name: String,
    pub website: Option<String>,
    #[serde(default)]
    pub company_type: CompanyType,
    /// Known token symbol for crypto companies.
    pub token_symbol: Option<String>,
    /// Explicit equity ticker; inferred from the name when absent.
    pub ticker: Option<String>,
}

impl CompanyRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            website: None,
            company_type: CompanyType::Private,
            token_symbol: None,
            ticker: None,
        }
    }

    pub fn with_website(mut self, website: impl Into<String>) -> Self {
        self.website = Some(website.into());
        self
    }

    pub fn with_type(mut self, company_type: CompanyType) -> Self {
        self.company_type = company_type;
        self
    }

    pub fn with_token_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.token_symbol = Some(symbol.into());
        self
    }

    pub fn with_ticker(mut self, ticker: impl Into<String>) -> Self {
        self.ticker = Some(ticker.into());
        self
    }

    pub fn identifier(&self) -> CompanyIdentifier {
        normalize(&self.name, self.website.as_deref())
    }

    /// Identifier, rejecting inputs that normalize to nothing.
    pub fn checked_identifier(&self) -> Result<CompanyIdentifier, ValidationError> {
        let identifier = self.identifier();
        if identifier.is_empty() {
            return Err(ValidationError::EmptyIdentifier {
                name: self.name.clone(),
            });
        }
        Ok(identifier)
    }

    /// Explicit ticker, or a best-effort lookup by name.
    pub fn resolved_ticker(&self) -> Option<String> {
        self.ticker
            .as_ref()
            .map(|t| t.trim().to_uppercase())
            .filter(|t| !t.is_empty())
            .or_else(|| lookup_ticker(&self.name).map(str::to_string))
    }
}

/// Well-known public companies, keyed by normalized name.
const KNOWN_TICKERS: &[(&str, &str)] = &[
    ("apple", "AAPL"),
    ("microsoft", "MSFT"),
    ("google", "GOOGL"),
    ("alphabet", "GOOGL"),
    ("amazon", "AMZN"),
    ("meta", "META"),
    ("facebook", "META"),
    ("nvidia", "NVDA"),
    ("tesla", "TSLA"),
    ("netflix", "NFLX"),
    ("salesforce", "CRM"),
    ("oracle", "ORCL"),
    ("adobe", "ADBE"),
    ("intel", "INTC"),
    ("amd", "AMD"),
    ("ibm", "IBM"),
    ("palantir", "PLTR"),
    ("snowflake", "SNOW"),
    ("shopify", "SHOP"),
    ("uber", "UBER"),
    ("airbnb", "ABNB"),
    ("coinbase", "COIN"),
    ("robinhood", "HOOD"),
    ("block", "SQ"),
    ("paypal", "PYPL"),
];

/// Best-effort ticker inference from a company name.
///
/// No match is not an error; the caller simply skips equity data.
pub fn lookup_ticker(name: &str) -> Option<&'static str> {
    let key = normalize(name, None);
    KNOWN_TICKERS
        .iter()
        .find(|(known, _)| *known == key.as_str())
        .map(|(_, ticker)| *ticker)
}
