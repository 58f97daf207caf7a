//! Text filter matching over layer-selected attribute fields.
//!
//! A query is trimmed and case-folded once; a feature matches when any field of
//! the layer's [`FieldPolicy`] contains the folded query as a substring. An
//! empty (or whitespace-only) query matches everything.

use geodata::FeatureRecord;
use serde::{Deserialize, Serialize};

/// Ordered attribute names tested when matching. Owned by the layer, never by
/// the feature, so that dataset filtering and per-feature styling always
/// search the same fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldPolicy(Vec<String>);

impl FieldPolicy {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(fields.into_iter().map(Into::into).collect())
    }

    #[inline]
    pub fn fields(&self) -> &[String] {
        &self.0
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A normalized filter query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    needle: String,
}

impl Query {
    pub fn parse(raw: &str) -> Self {
        Self {
            needle: raw.trim().to_lowercase(),
        }
    }

    /// True when the query filters nothing out.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.needle.is_empty()
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.needle
    }

    pub fn matches(&self, feature: &FeatureRecord, policy: &FieldPolicy) -> bool {
        if self.is_empty() {
            return true;
        }

        policy
            .fields()
            .iter()
            .any(|field| feature.attribute(field).to_lowercase().contains(&self.needle))
    }

    /// Features of `features` that match, in load order.
    pub fn filter<'a>(
        &'a self,
        features: &'a [FeatureRecord],
        policy: &'a FieldPolicy,
    ) -> impl Iterator<Item = &'a FeatureRecord> + 'a {
        features.iter().filter(move |f| self.matches(f, policy))
    }
}

/// One-shot form of [`Query::matches`].
pub fn matches(feature: &FeatureRecord, policy: &FieldPolicy, query: &str) -> bool {
    Query::parse(query).matches(feature, policy)
}
