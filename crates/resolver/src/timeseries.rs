use std::collections::BTreeMap;
use std::sync::Arc;

use canary_core::config::QueryConfig;
use canary_core::{CanaryError, ConfidenceLabel, Quality, TimeseriesSample, Truncation};
use canary_historian::resilience::validate_path;
use canary_historian::{Aggregate, DataRequest};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::resolution::TagResolver;
use crate::time_expr::TimeWindow;

/// How the caller named a tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagRef {
    Path(String),
    Description(String),
}

impl TagRef {
    /// Dotted strings without spaces are paths; anything else is a description.
    pub fn infer(raw: &str) -> Self {
        let raw = raw.trim();
        if !raw.contains(char::is_whitespace) && (raw.contains('.') || raw.contains('/')) {
            TagRef::Path(raw.to_string())
        } else {
            TagRef::Description(raw.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TagRef::Path(s) | TagRef::Description(s) => s,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TimeseriesQuery {
    pub tags: Vec<TagRef>,
    pub window: TimeWindow,
    pub aggregate: Option<Aggregate>,
    /// Overrides the configured page size.
    pub page_size: Option<u32>,
    pub bypass_cache: bool,
}

/// A requested tag and the path it resolved to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedTag {
    pub requested: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    History,
    LastKnown,
}

/// Per-tag statistics over the returned samples.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TagStats {
    pub count: usize,
    pub numeric_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean: Option<f64>,
    pub good: usize,
    pub bad: usize,
    pub uncertain: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last: Option<DateTime<Utc>>,
}

impl TagStats {
    pub fn of(samples: &[TimeseriesSample]) -> Self {
        let mut stats = TagStats {
            count: samples.len(),
            first: samples.first().map(|s| s.timestamp),
            last: samples.last().map(|s| s.timestamp),
            ..Default::default()
        };
        let mut sum = 0.0;
        for s in samples {
            match s.quality {
                Quality::Good => stats.good += 1,
                Quality::Bad => stats.bad += 1,
                Quality::Uncertain => stats.uncertain += 1,
            }
            if let Some(v) = s.value.as_f64().filter(|v| v.is_finite()) {
                stats.numeric_count += 1;
                sum += v;
                stats.min = Some(stats.min.map_or(v, |m| m.min(v)));
                stats.max = Some(stats.max.map_or(v, |m| m.max(v)));
            }
        }
        if stats.numeric_count > 0 {
            stats.mean = Some(sum / stats.numeric_count as f64);
        }
        stats
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuerySummary {
    pub total_samples: usize,
    pub samples_per_tag: BTreeMap<String, usize>,
    pub time_range: TimeWindow,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_hint: Option<String>,
    pub pages: u32,
    pub stats: BTreeMap<String, TagStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeseriesResult {
    pub tags: Vec<ResolvedTag>,
    /// Per-tag samples, each ascending by timestamp.
    pub samples: BTreeMap<String, Vec<TimeseriesSample>>,
    pub summary: QuerySummary,
    pub source: DataSource,
    /// False when the page cap stopped the read early.
    pub complete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truncation: Option<Truncation>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Resolves tags, pages through history and assembles the result.
pub struct TimeseriesOrchestrator {
    resolver: Arc<TagResolver>,
    config: QueryConfig,
}

impl TimeseriesOrchestrator {
    pub fn new(resolver: Arc<TagResolver>, config: QueryConfig) -> Self {
        Self { resolver, config }
    }

    pub fn resolver(&self) -> &TagResolver {
        &self.resolver
    }

    /// Resolve each reference to a path, or fail with `TagNotFound`.
    pub async fn resolve_tags(
        &self,
        tags: &[TagRef],
        bypass_cache: bool,
    ) -> Result<(Vec<ResolvedTag>, Vec<String>), CanaryError> {
        if tags.is_empty() {
            return Err(CanaryError::invalid_query(
                "no tags given",
                "Pass at least one tag path or description",
            ));
        }
        if tags.len() > self.config.max_tags {
            return Err(CanaryError::invalid_query(
                format!("{} tags requested, at most {} allowed", tags.len(), self.config.max_tags),
                "Split the query into smaller batches",
            ));
        }

        let mut resolved: Vec<ResolvedTag> = Vec::with_capacity(tags.len());
        let mut warnings = Vec::new();
        for tag in tags {
            let entry = match tag {
                TagRef::Path(path) => self.check_path(path, bypass_cache).await?,
                TagRef::Description(text) => {
                    let result = self.resolver.resolve(text, bypass_cache).await?;
                    let Some(path) = result.most_likely_path.clone() else {
                        return Err(CanaryError::tag_not_found(
                            text.clone(),
                            result.clarifying_question.unwrap_or_else(|| {
                                "Use resolve_tag or browse_tags to find the exact path".to_string()
                            }),
                        ));
                    };
                    if result.confidence_label == ConfidenceLabel::Medium {
                        warnings.push(format!(
                            "'{}' resolved to {} with medium confidence; double-check it",
                            text, path
                        ));
                    }
                    warnings.extend(result.warnings);
                    ResolvedTag {
                        requested: text.clone(),
                        path,
                        confidence: Some(result.confidence),
                    }
                }
            };
            if !resolved.iter().any(|r| r.path == entry.path) {
                resolved.push(entry);
            }
        }
        Ok((resolved, warnings))
    }

    /// A path must be in the catalog or known to the historian.
    async fn check_path(&self, path: &str, bypass_cache: bool) -> Result<ResolvedTag, CanaryError> {
        validate_path(path)?;
        let known = self.resolver.catalog().contains(path) || {
            let fetched = self
                .resolver
                .client()
                .get_tag_properties(&[path.to_string()], bypass_cache)
                .await?;
            fetched.is_truncated() || fetched.value.contains_key(path)
        };
        if !known {
            return Err(CanaryError::tag_not_found(
                path,
                "Check the path with browse_tags, or describe the signal with resolve_tag",
            ));
        }
        Ok(ResolvedTag {
            requested: path.to_string(),
            path: path.to_string(),
            confidence: None,
        })
    }

    pub async fn query(&self, query: &TimeseriesQuery) -> Result<TimeseriesResult, CanaryError> {
        let (tags, mut warnings) = self.resolve_tags(&query.tags, query.bypass_cache).await?;
        let paths: Vec<String> = tags.iter().map(|t| t.path.clone()).collect();
        let client = self.resolver.client();
        let page_size = query.page_size.unwrap_or(self.config.page_size).max(1);

        let mut request = DataRequest::new(paths.clone(), query.window.start, query.window.end, page_size)
            .with_aggregate(query.aggregate.clone());
        let mut samples: BTreeMap<String, Vec<TimeseriesSample>> =
            paths.iter().map(|p| (p.clone(), Vec::new())).collect();
        let mut pages = 0u32;
        let mut complete = true;
        let mut truncation = None;
        let max_pages = self.config.max_pages.max(1);

        loop {
            let fetched = client.get_tag_data(&request, query.bypass_cache).await?;
            pages += 1;
            if let Some(t) = fetched.truncation {
                warn!(pages, "Data page truncated, stopping pagination");
                truncation = Some(t);
                complete = false;
                break;
            }
            let page = fetched.value;
            debug!(page = pages, samples = page.sample_count(), "Data page received");
            if page.skipped > 0 {
                warnings.push(format!("{} undecodable samples skipped", page.skipped));
            }
            for (path, mut batch) in page.samples {
                samples.entry(path).or_default().append(&mut batch);
            }
            match page.continuation {
                Some(cursor) if pages < max_pages => request = request.next_page(cursor),
                Some(_) => {
                    complete = false;
                    break;
                }
                None => break,
            }
        }

        for series in samples.values_mut() {
            series.sort_by_key(|s| s.timestamp);
        }

        let mut source = DataSource::History;
        let total: usize = samples.values().map(Vec::len).sum();
        if total == 0 && truncation.is_none() {
            match client.get_current_values(&paths, query.bypass_cache).await {
                Ok(fetched) => {
                    source = DataSource::LastKnown;
                    for sample in fetched.value {
                        samples.entry(sample.tag_path.clone()).or_default().push(sample);
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Last-known fallback failed");
                    warnings.push(format!("no samples in range and last-known lookup failed: {}", e));
                }
            }
        }

        let hint = (!complete && truncation.is_none()).then(|| {
            format!(
                "Stopped after {} pages; narrow the time range or use an aggregate to see the rest",
                pages
            )
        });
        let summary = summarize(&samples, query.window, pages);
        info!(
            tags = tags.len(),
            total_samples = summary.total_samples,
            pages,
            complete,
            source = ?source,
            "Timeseries query finished"
        );

        Ok(TimeseriesResult {
            tags,
            samples,
            summary,
            source,
            complete,
            hint,
            truncation,
            warnings,
        })
    }
}

fn summarize(
    samples: &BTreeMap<String, Vec<TimeseriesSample>>,
    window: TimeWindow,
    pages: u32,
) -> QuerySummary {
    let samples_per_tag: BTreeMap<String, usize> =
        samples.iter().map(|(p, s)| (p.clone(), s.len())).collect();
    QuerySummary {
        total_samples: samples_per_tag.values().sum(),
        samples_per_tag,
        time_range: window,
        site_hint: site_hint(samples.keys().map(String::as_str)),
        pages,
        stats: samples.iter().map(|(p, s)| (p.clone(), TagStats::of(s))).collect(),
    }
}

/// Longest common segment prefix of the paths, leaf excluded.
pub fn site_hint<'a>(paths: impl IntoIterator<Item = &'a str>) -> Option<String> {
    let mut common: Option<Vec<&str>> = None;
    for path in paths {
        let segments: Vec<&str> = path.split('.').collect();
        let parent = &segments[..segments.len().saturating_sub(1)];
        common = Some(match common {
            None => parent.to_vec(),
            Some(prev) => prev
                .iter()
                .zip(parent)
                .take_while(|(a, b)| a == b)
                .map(|(a, _)| *a)
                .collect(),
        });
    }
    common.filter(|c| !c.is_empty()).map(|c| c.join("."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use canary_core::SampleValue;
    use chrono::TimeZone;

    fn sample(minute: u32, value: SampleValue, quality: Quality) -> TimeseriesSample {
        TimeseriesSample {
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 0, minute, 0).unwrap(),
            value,
            quality,
            tag_path: "A.B".into(),
        }
    }

    #[test]
    fn infer_tag_refs() {
        assert_eq!(TagRef::infer("Plant.Kiln6.ShellTemp"), TagRef::Path("Plant.Kiln6.ShellTemp".into()));
        assert_eq!(
            TagRef::infer("kiln 6 shell temp"),
            TagRef::Description("kiln 6 shell temp".into())
        );
        assert_eq!(TagRef::infer("ShellTemp").as_str(), "ShellTemp");
    }

    #[test]
    fn stats_cover_numbers_and_quality() {
        let s = TagStats::of(&[
            sample(0, SampleValue::Number(1.0), Quality::Good),
            sample(1, SampleValue::Number(3.0), Quality::Uncertain),
            sample(2, SampleValue::Text("RUN".into()), Quality::Good),
            sample(3, SampleValue::Empty, Quality::Bad),
        ]);
        assert_eq!(s.count, 4);
        assert_eq!(s.numeric_count, 2);
        assert_eq!((s.min, s.max, s.mean), (Some(1.0), Some(3.0), Some(2.0)));
        assert_eq!((s.good, s.bad, s.uncertain), (2, 1, 1));
        assert!(s.first < s.last);
    }

    #[test]
    fn site_hint_is_common_parent() {
        assert_eq!(
            site_hint(["Plant.Kiln6.Section15.ShellTemp", "Plant.Kiln6.Inlet.O2"]),
            Some("Plant.Kiln6".to_string())
        );
        assert_eq!(
            site_hint(["Plant.Kiln6.Section15.ShellTemp"]),
            Some("Plant.Kiln6.Section15".to_string())
        );
        assert_eq!(site_hint(["A.B", "C.D"]), None);
        assert_eq!(site_hint(Vec::<&str>::new()), None);
    }
}
