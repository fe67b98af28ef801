//! Turning a score distribution into a decision.
//!
//! The share of the top score against the runner-up measures ambiguity; the
//! top score against [`SCALE`] measures how much evidence there is at all.
//! Both constants are tunable.

use canary_catalog::text::field_terms;
use canary_catalog::Keyword;
use canary_core::{MatchField, TagCandidate};

/// Score at which a lone candidate counts as fully evidenced.
pub const SCALE: f64 = 12.0;
pub const EPSILON: f64 = 1e-9;

/// Confidence in `[0, 1]` for candidates sorted best first.
pub fn confidence_of(candidates: &[TagCandidate]) -> f64 {
    let Some(top) = candidates.first().map(|c| c.score) else {
        return 0.0;
    };
    if top <= 0.0 {
        return 0.0;
    }
    let second = candidates.get(1).map_or(0.0, |c| c.score.max(0.0));
    let separation = top / (top + second + EPSILON);
    let evidence = (top / SCALE).min(1.0);
    (separation * evidence).clamp(0.0, 1.0)
}

/// What the description did not pin down, judged against the best candidate.
fn missing_dimensions(
    keywords: &[Keyword],
    top: Option<&TagCandidate>,
    plants: &[&str],
) -> Vec<&'static str> {
    let Some(top) = top else {
        return vec!["site", "equipment", "unit"];
    };
    let hits = |terms: &[String]| keywords.iter().any(|k| terms.iter().any(|t| k.matches(t)));

    let segments: Vec<&str> = top.path.split(['.', '/']).filter(|s| !s.is_empty()).collect();
    let mut site_terms: Vec<String> = plants.iter().flat_map(|p| field_terms(p)).collect();
    if let Some(first) = segments.first() {
        site_terms.extend(field_terms(first));
    }
    let equipment_terms: Vec<String> = if segments.len() > 2 {
        segments[1..segments.len() - 1]
            .iter()
            .flat_map(|s| field_terms(s))
            .collect()
    } else {
        Vec::new()
    };

    let mut missing = Vec::new();
    if !hits(&site_terms) {
        missing.push("site");
    }
    if !hits(&equipment_terms) {
        missing.push("equipment");
    }
    if !top.matched_keywords.contains_key(&MatchField::Unit) {
        missing.push("unit");
    }
    missing
}

fn join_dimensions(dims: &[&str]) -> String {
    match dims {
        [] => String::new(),
        [one] => (*one).to_string(),
        [rest @ .., last] => format!("{} and {}", rest.join(", "), last),
    }
}

/// A question that would disambiguate the description.
pub fn clarifying_question(
    query: &str,
    keywords: &[Keyword],
    candidates: &[TagCandidate],
    plants: &[&str],
) -> String {
    let missing = missing_dimensions(keywords, candidates.first(), plants);
    if candidates.is_empty() {
        return format!(
            "No tag matched \"{}\". Which {} is this signal on?",
            query.trim(),
            join_dimensions(&missing)
        );
    }

    let options: Vec<&str> = candidates.iter().take(3).map(|c| c.path.as_str()).collect();
    if missing.is_empty() {
        format!("Did you mean {}?", options.join(" or "))
    } else {
        format!(
            "Please specify the {} for \"{}\". Closest matches: {}.",
            join_dimensions(&missing),
            query.trim(),
            options.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canary_catalog::normalize_query;
    use canary_core::{CandidateSource, ConfidenceLabel, MatchedKeywords};

    fn candidate(path: &str, score_fields: &[(MatchField, &[&str])]) -> TagCandidate {
        let matched: MatchedKeywords = score_fields
            .iter()
            .map(|(f, t)| (*f, t.iter().map(|s| s.to_string()).collect()))
            .collect();
        TagCandidate::scored(path, "", None, matched, 0.0, CandidateSource::Catalog)
    }

    #[test]
    fn lone_well_evidenced_candidate_is_high() {
        let c = candidate(
            "Plant.Kiln6.Section15.ShellTemp",
            &[
                (MatchField::Name, &["shell", "temperature"]),
                (MatchField::Path, &["kiln", "6", "shell", "temperature"]),
            ],
        );
        let conf = confidence_of(&[c]);
        assert!(conf > 0.99);
        assert_eq!(ConfidenceLabel::from_confidence(conf, 1), ConfidenceLabel::High);
    }

    #[test]
    fn near_ties_are_ambiguous() {
        let a = candidate("A.X.Temp", &[(MatchField::Name, &["temp"]), (MatchField::Path, &["x", "a"])]);
        let b = candidate("A.Y.Temp", &[(MatchField::Name, &["temp"]), (MatchField::Path, &["a"])]);
        let conf = confidence_of(&[a, b]);
        assert!(conf < 0.70);
    }

    #[test]
    fn weak_evidence_lowers_confidence() {
        let c = candidate("A.B.Temp", &[(MatchField::Name, &["temp"])]);
        assert!((confidence_of(&[c]) - 0.25).abs() < 1e-6);
        assert_eq!(confidence_of(&[]), 0.0);
    }

    #[test]
    fn question_names_missing_dimensions() {
        let kws = normalize_query("temperature");
        let c = candidate("Plant.Kiln6.ShellTemp", &[(MatchField::Name, &["temperature"])]);
        let q = clarifying_question("temperature", &kws, &[c], &[]);
        assert!(q.contains("site, equipment and unit"), "{}", q);
        assert!(q.contains("Plant.Kiln6.ShellTemp"));
    }

    #[test]
    fn matched_unit_is_not_asked_for() {
        let kws = normalize_query("plant kiln6 shell degC");
        let c = candidate(
            "Plant.Kiln6.Shell",
            &[(MatchField::Name, &["shell"]), (MatchField::Unit, &["degc"])],
        );
        assert!(missing_dimensions(&kws, Some(&c), &[]).is_empty());
        let c = candidate("Plant.Kiln6.Shell", &[(MatchField::Name, &["shell"])]);
        assert_eq!(missing_dimensions(&kws, Some(&c), &[]), vec!["unit"]);
    }

    #[test]
    fn question_without_candidates() {
        let kws = normalize_query("boiler feedwater");
        let q = clarifying_question("boiler feedwater", &kws, &[], &[]);
        assert!(q.contains("site, equipment and unit"));
    }

    #[test]
    fn question_offers_choice_when_nothing_is_missing() {
        let kws = normalize_query("plant kiln6 shell temp degC");
        let a = candidate(
            "Plant.Kiln6.ShellTemp",
            &[(MatchField::Name, &["shell", "temp"]), (MatchField::Unit, &["degc"])],
        );
        let b = candidate("Plant.Kiln6.ShellTempAvg", &[(MatchField::Name, &["shell", "temp"])]);
        let q = clarifying_question("plant kiln6 shell temp degC", &kws, &[a, b], &[]);
        assert!(q.starts_with("Did you mean Plant.Kiln6.ShellTemp or"));
    }
}
