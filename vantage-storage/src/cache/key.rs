//! Binary cache keys.
//!
//! A `CacheKey` can only be built from a normalized [`CompanyIdentifier`]
//! and a [`DataCategory`], so rows are always addressed by the same join key
//! the writer used.

use vantage_core::{CompanyIdentifier, DataCategory};

/// Separator byte between the identifier and the category.
///
/// 0xFF never occurs in UTF-8, so it cannot collide with identifier bytes.
const SEPARATOR: u8 = 0xFF;

/// Key of one cache row.
///
/// # Binary Format
///
/// - Bytes 0..n: identifier (UTF-8)
/// - Byte n: separator (0xFF)
/// - Byte n+1: category discriminant
///
/// Keys sort by identifier first, so all categories of one company are
/// contiguous and can be scanned by [`CacheKey::company_prefix`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    inner: CacheKeyInner,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct CacheKeyInner {
    identifier: CompanyIdentifier,
    category: DataCategory,
}

impl CacheKey {
    pub fn new(identifier: CompanyIdentifier, category: DataCategory) -> Self {
        Self {
            inner: CacheKeyInner {
                identifier,
                category,
            },
        }
    }

    pub fn identifier(&self) -> &CompanyIdentifier {
        &self.inner.identifier
    }

    pub fn category(&self) -> DataCategory {
        self.inner.category
    }

    pub fn encode(&self) -> Vec<u8> {
        let id = self.inner.identifier.as_str().as_bytes();
        let mut bytes = Vec::with_capacity(id.len() + 2);
        bytes.extend_from_slice(id);
        bytes.push(SEPARATOR);
        bytes.push(self.inner.category.as_byte());
        bytes
    }

    /// Decode a key. Returns `None` for anything `encode` could not produce.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let len = bytes.len();
        if len < 2 || bytes[len - 2] != SEPARATOR {
            return None;
        }
        let category = DataCategory::from_byte(bytes[len - 1])?;
        let identifier = std::str::from_utf8(&bytes[..len - 2]).ok()?;
        Some(Self::new(CompanyIdentifier::from_assigned(identifier), category))
    }

    /// Prefix covering every category of one company.
    pub fn company_prefix(identifier: &CompanyIdentifier) -> Vec<u8> {
        let id = identifier.as_str().as_bytes();
        let mut bytes = Vec::with_capacity(id.len() + 1);
        bytes.extend_from_slice(id);
        bytes.push(SEPARATOR);
        bytes
    }

    pub fn matches_prefix(bytes: &[u8], prefix: &[u8]) -> bool {
        bytes.len() >= prefix.len() && &bytes[..prefix.len()] == prefix
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.inner.identifier, self.inner.category)
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_category() -> impl Strategy<Value = DataCategory> {
        prop_oneof![
            Just(DataCategory::Static),
            Just(DataCategory::Live),
            Just(DataCategory::Mixed),
        ]
    }

    proptest! {
        /// Property: decode inverts encode for every identifier
        #[test]
        fn prop_encode_decode(identifier in "\\PC{0,40}", category in arb_category()) {
            let key = CacheKey::new(CompanyIdentifier::from_assigned(identifier), category);
            let decoded = CacheKey::decode(&key.encode());
            prop_assert_eq!(decoded, Some(key));
        }

        /// Property: a company prefix matches exactly that company's keys
        #[test]
        fn prop_prefix_isolates_companies(
            a in "[a-z0-9.-]{1,20}",
            b in "[a-z0-9.-]{1,20}",
            category in arb_category(),
        ) {
            let prefix = CacheKey::company_prefix(&CompanyIdentifier::from_assigned(a.clone()));
            let key = CacheKey::new(CompanyIdentifier::from_assigned(b.clone()), category).encode();
            prop_assert_eq!(CacheKey::matches_prefix(&key, &prefix), a == b);
        }
    }
}
