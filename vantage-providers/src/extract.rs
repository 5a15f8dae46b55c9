//! Text extraction from research search results.
//!
//! Research providers return prose. These helpers pull the few structured
//! facts the profile, funding and team sections carry. Every helper returns
//! `None` or an empty list rather than guessing.

use chrono::Datelike;
use once_cell::sync::Lazy;
use regex::Regex;

static FOUNDED_YEAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:founded|established|launched|started)\b[^.]{0,40}?\b((?:19|20)\d{2})\b")
        .expect("Invalid founded-year regex")
});

static EMPLOYEES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d{1,3}(?:,\d{3})*|\d+)\+?\s*(?:full-time\s+)?(?:employees|staff|people|team members)\b")
        .expect("Invalid employee-count regex")
});

static HEADQUARTERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:headquartered|based|headquarters)\s+(?:is\s+)?in\s+([A-Z][A-Za-z .'-]+?(?:,\s*[A-Z][A-Za-z .'-]+?)?)(?:[.;()]|\s+(?:and|with|since|where)\b|$)")
        .expect("Invalid headquarters regex")
});

static FUNDING_AMOUNT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\$\s?(\d+(?:\.\d+)?)\s*(billion|bn|b|million|mm|m)\b")
        .expect("Invalid funding-amount regex")
});

static FUNDING_ROUND: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(pre-seed|seed|series\s+[a-h]\+?|ico|token sale|strategic round)\b")
        .expect("Invalid funding-round regex")
});

static INVESTORS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:led by|backed by|investors include|participation from|participation of)\s+([^.;]+)")
        .expect("Invalid investors regex")
});

static FOUNDERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:founded|co-founded)\s+(?:in\s+\d{4}\s+)?by\s+([^.;]+)")
        .expect("Invalid founders regex")
});

static EXECUTIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(CEO|CTO|CFO|COO|CMO|Chief [A-Z][a-z]+ Officer|President)\s*,?\s+([A-Z][a-z]+(?:\s+[A-Z][a-z]+){1,2})")
        .expect("Invalid executive regex")
});

static PERSON_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Z][a-zA-Z'-]+(?:\s+[A-Z][a-zA-Z'.-]+){1,3}$").expect("Invalid person-name regex")
});

/// First plausible founding year mentioned.
pub fn founded_year(text: &str) -> Option<i32> {
    let max_year = chrono::Utc::now().year();
    FOUNDED_YEAR
        .captures_iter(text)
        .filter_map(|c| c.get(1)?.as_str().parse::<i32>().ok())
        .find(|year| (1800..=max_year).contains(year))
}

/// First employee headcount mentioned.
pub fn employee_count(text: &str) -> Option<u32> {
    EMPLOYEES
        .captures_iter(text)
        .filter_map(|c| c.get(1)?.as_str().replace(',', "").parse::<u32>().ok())
        .find(|n| *n > 0)
}

pub fn headquarters(text: &str) -> Option<String> {
    HEADQUARTERS
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().trim_end_matches(',').to_string())
        .filter(|s| !s.is_empty())
}

/// Largest dollar amount mentioned, in USD.
///
/// The largest figure is usually the cumulative total rather than a
/// single round.
pub fn funding_amount_usd(text: &str) -> Option<f64> {
    FUNDING_AMOUNT
        .captures_iter(text)
        .filter_map(|c| {
            let amount: f64 = c.get(1)?.as_str().parse().ok()?;
            let multiplier = match c.get(2)?.as_str().to_lowercase().as_str() {
                "billion" | "bn" | "b" => 1e9,
                _ => 1e6,
            };
            Some(amount * multiplier)
        })
        .fold(None, |max: Option<f64>, v| Some(max.map_or(v, |m| m.max(v))))
}

/// First funding round named, in title case ("Series B", "Seed").
pub fn funding_round(text: &str) -> Option<String> {
    let raw = FUNDING_ROUND.captures(text)?.get(1)?.as_str().to_lowercase();
    let words: Vec<String> = raw
        .split_whitespace()
        .map(|w| {
            if w == "ico" {
                return "ICO".to_string();
            }
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect();
    Some(words.join(" "))
}

/// Investor names following "led by", "backed by" and similar phrases.
pub fn investors(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for caps in INVESTORS.captures_iter(text) {
        if let Some(list) = caps.get(1) {
            push_unique(&mut out, split_name_list(list.as_str()));
        }
    }
    out
}

/// Founder names following "founded by".
pub fn founders(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for caps in FOUNDERS.captures_iter(text) {
        if let Some(list) = caps.get(1) {
            let names = split_name_list(list.as_str())
                .into_iter()
                .filter(|n| PERSON_NAME.is_match(n))
                .collect();
            push_unique(&mut out, names);
        }
    }
    out
}

/// Executives as "Name (Title)".
pub fn executives(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for caps in EXECUTIVE.captures_iter(text) {
        if let (Some(title), Some(name)) = (caps.get(1), caps.get(2)) {
            push_unique(
                &mut out,
                vec![format!("{} ({})", name.as_str(), title.as_str())],
            );
        }
    }
    out
}

/// Confidence for a section built from `hits` results with `fields` of
/// `possible` fields filled.
pub fn section_confidence(hits: usize, fields: usize, possible: usize) -> f64 {
    if hits == 0 || possible == 0 {
        return 0.0;
    }
    let coverage = fields.min(possible) as f64 / possible as f64;
    let corroboration = (hits.min(5) as f64) / 5.0;
    (0.3 + 0.5 * coverage + 0.2 * corroboration).min(1.0)
}

fn split_name_list(list: &str) -> Vec<String> {
    list.split([',', '&'])
        .flat_map(|part| part.split(" and "))
        .map(|s| {
            s.trim()
                .trim_start_matches("and ")
                .trim_start_matches("others including ")
                .trim()
                .to_string()
        })
        .filter(|s| !s.is_empty() && s.len() <= 60 && !s.eq_ignore_ascii_case("others"))
        .collect()
}

fn push_unique(out: &mut Vec<String>, names: Vec<String>) {
    for name in names {
        if !out.iter().any(|n| n.eq_ignore_ascii_case(&name)) {
            out.push(name);
        }
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_confidence_in_unit_interval(hits in 0usize..50, fields in 0usize..10, possible in 0usize..10) {
            let c = section_confidence(hits, fields, possible);
            prop_assert!((0.0..=1.0).contains(&c));
        }

        #[test]
        fn prop_extractors_never_panic(text in ".{0,200}") {
            let _ = founded_year(&text);
            let _ = employee_count(&text);
            let _ = headquarters(&text);
            let _ = funding_amount_usd(&text);
            let _ = funding_round(&text);
            let _ = investors(&text);
            let _ = founders(&text);
            let _ = executives(&text);
        }
    }
}
