//! Field matching and name bonuses.
//!
//! The per-field weights live on [`MatchField::weight`]; the bonus constants
//! below are tunable and were picked against hand-labelled plant queries.

use canary_core::{MatchField, MatchedKeywords};

use crate::text::{field_terms, Keyword};

/// Bonus when the whole description equals the candidate's leaf name.
pub const EXACT_NAME_BONUS: f64 = 4.0;
/// Bonus when the description is a leading run of the leaf name.
pub const PREFIX_NAME_BONUS: f64 = 2.0;

/// Normalized terms for each matchable field of one tag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldTerms {
    pub name: Vec<String>,
    pub path: Vec<String>,
    pub description: Vec<String>,
    pub unit: Vec<String>,
}

impl FieldTerms {
    /// Terms for a bare path, e.g. a remote search hit with no metadata yet.
    pub fn from_path(path: &str) -> Self {
        Self {
            name: field_terms(canary_core::leaf_name(path)),
            path: field_terms(path),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = field_terms(description);
        self
    }

    /// Units are indexed both split (`deg`, `c`) and compact (`degc`).
    pub fn with_unit(mut self, unit: &str) -> Self {
        self.unit = unit_terms(unit);
        self
    }

    /// Extra location terms (plant, equipment) count as path terms.
    pub fn with_location(mut self, location: &str) -> Self {
        for term in field_terms(location) {
            if !self.path.contains(&term) {
                self.path.push(term);
            }
        }
        self
    }

    /// Every distinct term across all fields.
    pub fn all_terms(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for t in self
            .name
            .iter()
            .chain(&self.path)
            .chain(&self.description)
            .chain(&self.unit)
        {
            if !out.contains(&t.as_str()) {
                out.push(t);
            }
        }
        out
    }
}

pub fn unit_terms(unit: &str) -> Vec<String> {
    let mut terms = field_terms(unit);
    let compact: String = unit
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect::<String>()
        .to_lowercase();
    if !compact.is_empty() && !terms.contains(&compact) {
        terms.push(compact);
    }
    terms
}

/// Keywords that hit a set of terms, in query order.
pub fn matching_keywords(keywords: &[Keyword], terms: &[String]) -> Vec<String> {
    keywords
        .iter()
        .filter(|k| terms.iter().any(|t| k.matches(t)))
        .map(|k| k.term.clone())
        .collect()
}

/// Per-field keyword hits. Fields with no hit are omitted.
pub fn match_fields(keywords: &[Keyword], fields: &FieldTerms) -> MatchedKeywords {
    let mut matched = MatchedKeywords::new();
    for (field, terms) in [
        (MatchField::Name, &fields.name),
        (MatchField::Path, &fields.path),
        (MatchField::Description, &fields.description),
        (MatchField::Unit, &fields.unit),
    ] {
        let hits = matching_keywords(keywords, terms);
        if !hits.is_empty() {
            matched.insert(field, hits);
        }
    }
    matched
}

/// Exact or prefix match of the whole description against the leaf name.
pub fn name_bonus(keywords: &[Keyword], name_terms: &[String]) -> f64 {
    if keywords.is_empty() || keywords.len() > name_terms.len() {
        return 0.0;
    }
    let leading = keywords
        .iter()
        .zip(name_terms)
        .all(|(k, t)| k.matches(t));
    if !leading {
        0.0
    } else if keywords.len() == name_terms.len() {
        EXACT_NAME_BONUS
    } else {
        PREFIX_NAME_BONUS
    }
}
