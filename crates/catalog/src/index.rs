use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use canary_core::{CandidateSource, TagCandidate};
use tracing::{debug, info, warn};

use crate::error::CatalogError;
use crate::record::{CatalogFile, CatalogRecord};
use crate::scoring::{match_fields, name_bonus, FieldTerms};
use crate::text::Keyword;

/// Inverted index (term → record ids) over a static tag catalog.
///
/// Built once at startup; lookups are pure and never touch disk or network.
#[derive(Debug, Default)]
pub struct TagCatalogIndex {
    records: Vec<CatalogRecord>,
    terms: Vec<FieldTerms>,
    postings: HashMap<String, BTreeSet<usize>>,
    by_path: HashMap<String, usize>,
}

impl TagCatalogIndex {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Index a record collection. Later duplicates of a path are dropped.
    pub fn build(records: impl IntoIterator<Item = CatalogRecord>) -> Self {
        let mut index = Self::default();
        for record in records {
            if index.by_path.contains_key(&record.path) {
                debug!(path = %record.path, "Duplicate catalog path, keeping first");
                continue;
            }
            let id = index.records.len();
            let mut fields = FieldTerms::from_path(&record.path).with_description(&record.description);
            if let Some(unit) = &record.unit {
                fields = fields.with_unit(unit);
            }
            for location in [&record.plant, &record.equipment].into_iter().flatten() {
                fields = fields.with_location(location);
            }
            for term in fields.all_terms() {
                index.postings.entry(term.to_string()).or_default().insert(id);
            }
            index.by_path.insert(record.path.clone(), id);
            index.terms.push(fields);
            index.records.push(record);
        }
        index
    }

    /// Load a catalog JSON file.
    ///
    /// A missing file is not an error: it logs a warning and yields an empty index.
    /// A file that exists but cannot be read or parsed is a [`CatalogError`].
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let shown = path.display().to_string();
        if !path.exists() {
            warn!(path = %shown, "Catalog file not found, starting with an empty catalog");
            return Ok(Self::empty());
        }
        let json = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: shown.clone(),
            source,
        })?;
        let file: CatalogFile = serde_json::from_str(&json).map_err(|source| CatalogError::Parse {
            path: shown.clone(),
            source,
        })?;
        let records = file.into_records();
        for (i, record) in records.iter().enumerate() {
            if record.path.trim().is_empty() {
                return Err(CatalogError::InvalidRecord {
                    path: shown,
                    index: i,
                    reason: "empty path".to_string(),
                });
            }
        }
        let index = Self::build(records);
        info!(path = %shown, records = index.len(), terms = index.postings.len(), "Catalog loaded");
        Ok(index)
    }

    /// Like [`load`](Self::load), but a malformed file degrades to an empty
    /// index after logging the error. Startup never fails on the catalog.
    pub fn load_or_empty(path: &Path) -> Self {
        match Self::load(path) {
            Ok(index) => index,
            Err(e) => {
                tracing::error!(error = %e, "Catalog unusable, continuing with an empty catalog");
                Self::empty()
            }
        }
    }

    /// Up to `limit` candidates sharing at least one term with `keywords`,
    /// best first. Ties break on path so results are deterministic.
    pub fn lookup(&self, keywords: &[Keyword], limit: usize) -> Vec<TagCandidate> {
        if limit == 0 || keywords.is_empty() {
            return Vec::new();
        }

        let mut hits: BTreeSet<usize> = BTreeSet::new();
        for keyword in keywords {
            for form in keyword.forms() {
                if let Some(ids) = self.postings.get(form) {
                    hits.extend(ids.iter().copied());
                }
            }
        }

        let mut candidates: Vec<TagCandidate> = hits
            .into_iter()
            .filter_map(|id| self.candidate_for(id, keywords))
            .collect();
        candidates.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.path.cmp(&b.path))
        });
        candidates.truncate(limit);

        debug!(
            keywords = keywords.len(),
            returned = candidates.len(),
            "Catalog lookup"
        );
        candidates
    }

    fn candidate_for(&self, id: usize, keywords: &[Keyword]) -> Option<TagCandidate> {
        let record = &self.records[id];
        let fields = &self.terms[id];
        let matched = match_fields(keywords, fields);
        if matched.is_empty() {
            return None;
        }
        Some(TagCandidate::scored(
            record.path.clone(),
            record.description.clone(),
            record.unit.clone(),
            matched,
            name_bonus(keywords, &fields.name),
            CandidateSource::Catalog,
        ))
    }

    pub fn get(&self, path: &str) -> Option<&CatalogRecord> {
        self.by_path.get(path).map(|&id| &self.records[id])
    }

    pub fn contains(&self, path: &str) -> bool {
        self.by_path.contains_key(path)
    }

    pub fn records(&self) -> &[CatalogRecord] {
        &self.records
    }

    /// Distinct plant names, used when asking which site a query means.
    pub fn plants(&self) -> Vec<&str> {
        let mut plants: Vec<&str> = self
            .records
            .iter()
            .filter_map(|r| r.plant.as_deref())
            .collect();
        plants.sort_unstable();
        plants.dedup();
        plants
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::normalize_query;
    use canary_core::MatchField;

    fn sample_index() -> TagCatalogIndex {
        TagCatalogIndex::build(vec![
            CatalogRecord::new("Plant.Kiln6.Section15.ShellTemp")
                .with_unit("degC")
                .with_plant("Plant")
                .with_equipment("Kiln6"),
            CatalogRecord::new("Plant.Kiln6.Section16.ShellTemp").with_unit("degC"),
            CatalogRecord::new("Plant.Kiln6.MainDrive.Speed")
                .with_description("Kiln main drive motor speed")
                .with_unit("rpm"),
            CatalogRecord::new("Plant.Mill2.Motor.Current").with_unit("A"),
        ])
    }

    #[test]
    fn lookup_ranks_most_specific_record_first() {
        let index = sample_index();
        let results = index.lookup(&normalize_query("kiln 6 shell temperature section 15"), 10);
        assert_eq!(results[0].path, "Plant.Kiln6.Section15.ShellTemp");
        assert!(results[0].score > results[1].score);
        assert!(results.iter().all(|c| c.has_matches()));
    }

    #[test]
    fn lookup_respects_limit() {
        let index = sample_index();
        let results = index.lookup(&normalize_query("plant"), 2);
        assert_eq!(results.len(), 2);
        assert!(index.lookup(&normalize_query("plant"), 0).is_empty());
    }

    #[test]
    fn synonyms_reach_unit_and_description() {
        let index = sample_index();
        let results = index.lookup(&normalize_query("kiln rpm"), 5);
        assert_eq!(results[0].path, "Plant.Kiln6.MainDrive.Speed");
        assert!(results[0].matched_keywords.contains_key(&MatchField::Name));
        assert!(results[0].matched_keywords.contains_key(&MatchField::Unit));
    }

    #[test]
    fn short_leaf_names_do_not_borrow_synonyms() {
        let index = TagCatalogIndex::build(vec![
            CatalogRecord::new("Plant.Kiln6.Cas1"),
            CatalogRecord::new("Plant.Kiln6.Casing.Temp"),
        ]);
        let results = index.lookup(&normalize_query("shell"), 10);
        let paths: Vec<&str> = results.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, vec!["Plant.Kiln6.Casing.Temp"]);
    }

    #[test]
    fn unrelated_keywords_find_nothing() {
        let index = sample_index();
        assert!(index.lookup(&normalize_query("boiler feedwater"), 10).is_empty());
    }

    #[test]
    fn duplicates_are_dropped_and_paths_are_addressable() {
        let index = TagCatalogIndex::build(vec![
            CatalogRecord::new("A.B").with_description("first"),
            CatalogRecord::new("A.B").with_description("second"),
        ]);
        assert_eq!(index.len(), 1);
        assert_eq!(index.get("A.B").unwrap().description, "first");
        assert!(index.contains("A.B"));
        assert!(!index.contains("A.C"));
    }

    #[test]
    fn plants_are_distinct() {
        let index = sample_index();
        assert_eq!(index.plants(), vec!["Plant"]);
    }
}
