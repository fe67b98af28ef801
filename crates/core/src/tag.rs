use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Which part of a tag record a keyword matched.
///
/// Ordered from most to least specific; the weight follows that order because
/// a hit on the leaf name is the least ambiguous signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchField {
    Name,
    Path,
    Description,
    Unit,
    Metadata,
}

impl MatchField {
    pub fn weight(self) -> f64 {
        match self {
            MatchField::Name => 3.0,
            MatchField::Path => 2.0,
            MatchField::Description => 1.5,
            MatchField::Unit | MatchField::Metadata => 1.0,
        }
    }
}

impl std::fmt::Display for MatchField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchField::Name => write!(f, "name"),
            MatchField::Path => write!(f, "path"),
            MatchField::Description => write!(f, "description"),
            MatchField::Unit => write!(f, "unit"),
            MatchField::Metadata => write!(f, "metadata"),
        }
    }
}

/// Where a candidate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    Catalog,
    RemoteSearch,
    MetadataEnrichment,
}

pub type MatchedKeywords = BTreeMap<MatchField, Vec<String>>;

/// One scored match produced during resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagCandidate {
    pub path: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub matched_keywords: MatchedKeywords,
    /// Exact/prefix name bonus folded into `score`.
    #[serde(default)]
    pub bonus: f64,
    pub score: f64,
    pub source: CandidateSource,
}

impl TagCandidate {
    /// Build a candidate and derive its score from the matched keywords.
    pub fn scored(
        path: impl Into<String>,
        description: impl Into<String>,
        unit: Option<String>,
        matched_keywords: MatchedKeywords,
        bonus: f64,
        source: CandidateSource,
    ) -> Self {
        let path = path.into();
        let name = leaf_name(&path).to_string();
        let score = score_of(&matched_keywords, bonus);
        Self {
            path,
            name,
            description: description.into(),
            unit,
            matched_keywords,
            bonus,
            score,
            source,
        }
    }

    /// Fold metadata fetched from the historian into a new, rescored candidate.
    ///
    /// Empty `description`/`unit` fields are filled from the metadata; existing
    /// values win.
    pub fn enriched(
        &self,
        metadata_matches: Vec<String>,
        description: Option<String>,
        unit: Option<String>,
    ) -> Self {
        let mut matched = self.matched_keywords.clone();
        let contributed = !metadata_matches.is_empty();
        if contributed {
            matched.insert(MatchField::Metadata, metadata_matches);
        }
        let description = if self.description.is_empty() {
            description.unwrap_or_default()
        } else {
            self.description.clone()
        };
        let source = if contributed {
            CandidateSource::MetadataEnrichment
        } else {
            self.source
        };
        Self::scored(
            self.path.clone(),
            description,
            self.unit.clone().or(unit),
            matched,
            self.bonus,
            source,
        )
    }

    pub fn has_matches(&self) -> bool {
        self.matched_keywords.values().any(|v| !v.is_empty())
    }
}

/// Leaf segment of a dotted (or slash-separated) tag path.
pub fn leaf_name(path: &str) -> &str {
    path.rsplit(['.', '/']).next().unwrap_or(path)
}

fn score_of(matched: &MatchedKeywords, bonus: f64) -> f64 {
    matched
        .iter()
        .map(|(field, tokens)| field.weight() * tokens.len() as f64)
        .sum::<f64>()
        + bonus
}

/// Coarse confidence bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLabel {
    High,
    Medium,
    Low,
    NoMatch,
}

impl ConfidenceLabel {
    pub const HIGH_THRESHOLD: f64 = 0.80;
    pub const MEDIUM_THRESHOLD: f64 = 0.70;

    /// Deterministic bucket for a confidence value.
    pub fn from_confidence(confidence: f64, candidate_count: usize) -> Self {
        if candidate_count == 0 {
            ConfidenceLabel::NoMatch
        } else if confidence >= Self::HIGH_THRESHOLD {
            ConfidenceLabel::High
        } else if confidence >= Self::MEDIUM_THRESHOLD {
            ConfidenceLabel::Medium
        } else {
            ConfidenceLabel::Low
        }
    }

    pub fn next_step(self) -> NextStep {
        match self {
            ConfidenceLabel::High => NextStep::ReturnPath,
            ConfidenceLabel::Medium => NextStep::DoubleCheck,
            ConfidenceLabel::Low | ConfidenceLabel::NoMatch => NextStep::Clarify,
        }
    }

    pub fn needs_clarification(self) -> bool {
        matches!(self, ConfidenceLabel::Low | ConfidenceLabel::NoMatch)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextStep {
    ReturnPath,
    DoubleCheck,
    Clarify,
}

/// Outcome of resolving one natural-language description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub query: String,
    /// Normalized keywords the description reduced to.
    pub keywords: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub most_likely_path: Option<String>,
    pub candidates: Vec<TagCandidate>,
    pub confidence: f64,
    pub confidence_label: ConfidenceLabel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clarifying_question: Option<String>,
    pub next_step: NextStep,
    /// Degradations that did not fail the resolution (e.g. remote search down).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}
