//! Canonical company identifiers.
//!
//! Every cache row and usage record joins on a [`CompanyIdentifier`]. The
//! identifier is derived once by [`normalize`] and never regenerated for a
//! row that already exists, so readers must derive keys with the same
//! function the writer used.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Corporate suffixes stripped from names, longest first so that
/// " technologies" wins over " tech".
const CORPORATE_SUFFIXES: &[&str] = &[
    " technologies",
    " systems",
    " labs",
    " tech",
    " corp.",
    " corp",
    " inc.",
    " inc",
    " ltd.",
    " ltd",
    " llc.",
    " llc",
];

static NON_ALPHANUMERIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("Invalid slug regex"));

/// Normalized canonical key for a company.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CompanyIdentifier(String);

impl CompanyIdentifier {
    /// Derive the identifier for a company.
    pub fn derive(name: &str, website: Option<&str>) -> Self {
        normalize(name, website)
    }

    /// Wrap an identifier that was already assigned to a cached record.
    pub fn from_assigned(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Degenerate inputs can produce an empty identifier.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for CompanyIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CompanyIdentifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Normalize a company into its canonical identifier.
///
/// A usable website always wins: the protocol and a leading `www.` are
/// stripped, everything from the first `/` on is dropped, and the rest is
/// lowercased. Without a website the name is lowercased, one trailing
/// corporate suffix is removed and runs of non-alphanumerics collapse to a
/// single hyphen.
pub fn normalize(name: &str, website: Option<&str>) -> CompanyIdentifier {
    if let Some(domain) = website.and_then(domain_from_website) {
        return CompanyIdentifier(domain);
    }
    CompanyIdentifier(slug_from_name(name))
}

fn domain_from_website(website: &str) -> Option<String> {
    let lowered = website.trim().to_lowercase();
    let without_scheme = match lowered.find("://") {
        Some(idx) => &lowered[idx + 3..],
        None => lowered.as_str(),
    };
    let without_www = without_scheme.strip_prefix("www.").unwrap_or(without_scheme);
    let host = without_www
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default()
        .trim();

    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

fn slug_from_name(name: &str) -> String {
    let mut cleaned = name.trim().to_lowercase();
    if let Some(suffix) = CORPORATE_SUFFIXES
        .iter()
        .find(|suffix| cleaned.ends_with(*suffix))
    {
        cleaned.truncate(cleaned.len() - suffix.len());
    }

    NON_ALPHANUMERIC
        .replace_all(&cleaned, "-")
        .trim_matches('-')
        .to_string()
}
