use std::sync::Arc;

use canary_catalog::scoring::{match_fields, matching_keywords};
use canary_catalog::text::field_terms;
use canary_catalog::{name_bonus, normalize_query, FieldTerms, Keyword, TagCatalogIndex};
use canary_core::config::ResolverConfig;
use canary_core::{
    CandidateSource, CanaryError, ConfidenceLabel, ResolutionResult, TagCandidate,
};
use canary_historian::{cache_key, CacheCategory, CanaryClient};
use futures::future::join_all;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::confidence::{clarifying_question, confidence_of};

/// Maps free-text descriptions to ranked historian tag paths.
///
/// Catalog first; one remote search when the catalog is thin; metadata
/// enrichment for the leading candidates; then the confidence decision.
pub struct TagResolver {
    catalog: Arc<TagCatalogIndex>,
    client: CanaryClient,
    config: ResolverConfig,
}

impl TagResolver {
    pub fn new(catalog: Arc<TagCatalogIndex>, client: CanaryClient, config: ResolverConfig) -> Self {
        Self {
            catalog,
            client,
            config,
        }
    }

    pub fn catalog(&self) -> &TagCatalogIndex {
        &self.catalog
    }

    pub fn client(&self) -> &CanaryClient {
        &self.client
    }

    /// Resolve one description. Empty input fails before any I/O.
    ///
    /// Clean results are cached under the normalized keywords; results that
    /// needed a degraded path (warnings) are not.
    pub async fn resolve(
        &self,
        description: &str,
        bypass_cache: bool,
    ) -> Result<ResolutionResult, CanaryError> {
        if description.trim().is_empty() {
            return Err(CanaryError::invalid_query(
                "description is empty",
                "Describe the signal, e.g. 'kiln 6 shell temperature'",
            ));
        }
        let keywords = normalize_query(description);
        if keywords.is_empty() {
            return Err(CanaryError::invalid_query(
                format!("'{}' has no searchable words", description.trim()),
                "Name the equipment and the measurement, e.g. 'mill 2 motor current'",
            ));
        }

        let terms: Vec<&str> = keywords.iter().map(|k| k.term.as_str()).collect();
        let key = cache_key("resolve_tag", &json!({ "keywords": terms }));
        let mut result = self
            .client
            .cache()
            .get_or_compute_if(
                &key,
                CacheCategory::Metadata,
                bypass_cache,
                || self.compute(description, &keywords, bypass_cache),
                |result: &ResolutionResult| result.warnings.is_empty(),
            )
            .await?;
        // Cached under keywords, so another phrasing may have produced it.
        result.query = description.trim().to_string();
        Ok(result)
    }

    async fn compute(
        &self,
        description: &str,
        keywords: &[Keyword],
        bypass_cache: bool,
    ) -> Result<ResolutionResult, CanaryError> {
        let mut warnings = Vec::new();
        let mut candidates = self.catalog.lookup(keywords, self.config.candidate_limit);
        debug!(catalog_hits = candidates.len(), "Catalog candidates");
        let has_catalog_hits = !candidates.is_empty();

        if candidates.len() < self.config.min_candidates {
            match self.remote_candidates(keywords, bypass_cache).await {
                Ok((remote, truncated)) => {
                    if truncated {
                        warnings.push("remote search results were too large and were skipped".to_string());
                    }
                    for c in remote {
                        if !candidates.iter().any(|existing| existing.path == c.path) {
                            candidates.push(c);
                        }
                    }
                }
                Err(e) if !candidates.is_empty() => {
                    warn!(error = %e, "Remote search failed, using catalog candidates only");
                    warnings.push(format!("remote search unavailable: {}", e));
                }
                Err(e) => return Err(e),
            }
        }

        sort_candidates(&mut candidates);
        candidates.truncate(self.config.candidate_limit);
        self.enrich(keywords, &mut candidates, &mut warnings, has_catalog_hits, bypass_cache)
            .await?;
        sort_candidates(&mut candidates);

        let confidence = confidence_of(&candidates);
        let label = ConfidenceLabel::from_confidence(confidence, candidates.len());
        let most_likely_path = if label.needs_clarification() {
            None
        } else {
            candidates.first().map(|c| c.path.clone())
        };
        let clarifying = label.needs_clarification().then(|| {
            clarifying_question(description, keywords, &candidates, &self.catalog.plants())
        });

        info!(
            candidates = candidates.len(),
            confidence = %format!("{:.3}", confidence),
            label = ?label,
            "Resolved description"
        );

        Ok(ResolutionResult {
            query: description.trim().to_string(),
            keywords: keywords.iter().map(|k| k.term.clone()).collect(),
            most_likely_path,
            candidates,
            confidence,
            confidence_label: label,
            clarifying_question: clarifying,
            next_step: label.next_step(),
            warnings,
        })
    }

    /// One remote search on the strongest literal keyword.
    async fn remote_candidates(
        &self,
        keywords: &[Keyword],
        bypass_cache: bool,
    ) -> Result<(Vec<TagCandidate>, bool), CanaryError> {
        let Some(term) = strongest_literal(keywords) else {
            return Ok((Vec::new(), false));
        };
        debug!(search = %term, "Remote tag search");
        let fetched = self
            .client
            .browse_tags(None, Some(&term), true, bypass_cache)
            .await?;
        let truncated = fetched.is_truncated();

        let candidates = fetched
            .value
            .iter()
            .filter_map(|path| {
                let fields = FieldTerms::from_path(path);
                let matched = match_fields(keywords, &fields);
                if matched.is_empty() {
                    return None;
                }
                Some(TagCandidate::scored(
                    path.clone(),
                    "",
                    None,
                    matched,
                    name_bonus(keywords, &fields.name),
                    CandidateSource::RemoteSearch,
                ))
            })
            .collect();
        Ok((candidates, truncated))
    }

    /// Fold remote metadata into the leading candidates.
    ///
    /// A failed lookup only warns when the catalog contributed candidates;
    /// with remote candidates alone the first failure is returned.
    async fn enrich(
        &self,
        keywords: &[Keyword],
        candidates: &mut [TagCandidate],
        warnings: &mut Vec<String>,
        has_catalog_hits: bool,
        bypass_cache: bool,
    ) -> Result<(), CanaryError> {
        let limit = self.config.enrich_limit.min(candidates.len());
        if limit == 0 {
            return Ok(());
        }
        let lookups = candidates[..limit].iter().map(|c| {
            let paths = vec![c.path.clone()];
            async move { self.client.get_tag_properties(&paths, bypass_cache).await }
        });
        let results = join_all(lookups).await;

        let mut failed = 0usize;
        let mut first_error = None;
        for (candidate, result) in candidates[..limit].iter_mut().zip(results) {
            match result {
                Ok(fetched) => {
                    let Some(props) = fetched.value.get(&candidate.path) else {
                        continue;
                    };
                    let matches = matching_keywords(keywords, &field_terms(&props.text()));
                    *candidate =
                        candidate.enriched(matches, props.description.clone(), props.unit.clone());
                }
                Err(e) => {
                    debug!(path = %candidate.path, error = %e, "Metadata lookup failed");
                    failed += 1;
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            if !has_catalog_hits {
                return Err(e);
            }
            warn!(failed, error = %e, "Metadata enrichment degraded");
            warnings.push(format!("metadata unavailable for {} candidate(s)", failed));
        }
        Ok(())
    }
}

fn sort_candidates(candidates: &mut [TagCandidate]) {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.path.cmp(&b.path)));
}

/// The longest non-numeric literal, stripped of wildcard characters.
fn strongest_literal(keywords: &[Keyword]) -> Option<String> {
    keywords
        .iter()
        .filter(|k| !k.is_numeric())
        .map(|k| {
            k.literal
                .chars()
                .filter(|c| !matches!(c, '*' | '?' | '%'))
                .collect::<String>()
        })
        .filter(|s| !s.is_empty())
        .max_by(|a, b| a.len().cmp(&b.len()).then_with(|| b.cmp(a)))
}
