//! Tokenization and normalization shared by the index and the resolver.
//!
//! Both sides of a comparison go through the same pipeline (split, lowercase,
//! stop-word filter, stem), so a term indexed from `ShellTemp` and a term typed
//! as "shell temps" land on identical strings.

/// Words that never identify a signal.
const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "of", "for", "in", "on", "at", "and", "or", "to", "is", "are", "be",
    "what", "whats", "which", "show", "me", "get", "give", "find", "tell", "please", "my",
    "this", "that", "it", "its", "tag", "tags", "value", "values", "reading", "readings",
    "from", "with", "by", "about", "de", "del", "la", "el", "los", "las", "y",
];

/// Equivalent terms, including site-local Spanish vocabulary.
/// Entries are compared after stemming.
const SYNONYM_GROUPS: &[&[&str]] = &[
    &["temperature", "temp", "tmp", "temperatura"],
    &["speed", "rpm", "velocity", "velocidad"],
    &["shell", "casing", "carcasa"],
    &["pressure", "press", "pres", "presion"],
    &["vibration", "vib", "vibracion"],
    &["current", "amp", "ampere", "amperage", "corriente"],
    &["power", "kw", "potencia"],
    &["flow", "flowrate", "caudal", "flujo"],
    &["level", "lvl", "nivel"],
    &["kiln", "horno"],
    &["fan", "ventilador"],
    &["motor", "mtr"],
    &["position", "pos", "posicion"],
    &["degc", "celsius", "deg"],
];

/// Split on separators, camelCase humps and letter/digit boundaries, then lowercase.
///
/// `Plant.Kiln6.ShellTemp` → `plant kiln 6 shell temp`.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for chunk in text.split(|c: char| !c.is_alphanumeric()) {
        if chunk.is_empty() {
            continue;
        }
        let chars: Vec<char> = chunk.chars().collect();
        let mut current = String::new();
        for (i, &c) in chars.iter().enumerate() {
            if i > 0 && is_boundary(chars[i - 1], c, chars.get(i + 1).copied()) {
                tokens.push(current.to_lowercase());
                current.clear();
            }
            current.push(c);
        }
        if !current.is_empty() {
            tokens.push(current.to_lowercase());
        }
    }
    tokens
}

fn is_boundary(prev: char, cur: char, next: Option<char>) -> bool {
    if prev.is_ascii_digit() != cur.is_ascii_digit() {
        return true;
    }
    if prev.is_lowercase() && cur.is_uppercase() {
        return true;
    }
    // "PVTemp": split before the last capital of an acronym run.
    prev.is_uppercase() && cur.is_uppercase() && next.is_some_and(|n| n.is_lowercase())
}

pub fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.contains(&token)
}

/// Light suffix stripping: plurals and gerunds. Tokens containing digits are
/// returned unchanged, and a gerund keeps its suffix unless at least four
/// characters remain.
pub fn stem(token: &str) -> String {
    if token.chars().any(|c| c.is_ascii_digit()) {
        return token.to_string();
    }
    let len = token.chars().count();
    if len >= 7 && token.ends_with("ing") {
        return token[..token.len() - 3].to_string();
    }
    if len >= 5 && token.ends_with("ies") {
        return format!("{}y", &token[..token.len() - 3]);
    }
    if len >= 4 && token.ends_with('s') && !token.ends_with("ss") {
        return token[..token.len() - 1].to_string();
    }
    token.to_string()
}

/// Terms used to index a field: tokenized, stop-word filtered, stemmed, deduped.
pub fn field_terms(text: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tok in tokenize(text) {
        if is_stop_word(&tok) {
            continue;
        }
        let term = stem(&tok);
        if !out.contains(&term) {
            out.push(term);
        }
    }
    out
}

/// All stemmed equivalents of a stemmed term, excluding the term itself.
pub fn synonyms_of(term: &str) -> Vec<String> {
    let mut out = Vec::new();
    for group in SYNONYM_GROUPS {
        let stemmed: Vec<String> = group.iter().map(|w| stem(w)).collect();
        if stemmed.iter().any(|w| w == term) {
            for w in stemmed {
                if w != term && !out.contains(&w) {
                    out.push(w);
                }
            }
        }
    }
    out
}

/// One normalized query keyword together with its synonym expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyword {
    /// Stemmed, lowercased form.
    pub term: String,
    /// The token as typed (lowercased, unstemmed), used for remote search.
    pub literal: String,
    pub alternates: Vec<String>,
}

impl Keyword {
    pub fn matches(&self, token: &str) -> bool {
        self.term == token || self.alternates.iter().any(|a| a == token)
    }

    /// Every form this keyword can match, the term first.
    pub fn forms(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.term.as_str()).chain(self.alternates.iter().map(String::as_str))
    }

    pub fn is_numeric(&self) -> bool {
        self.term.chars().all(|c| c.is_ascii_digit())
    }
}

/// Normalize a free-text description into ordered, deduplicated keywords.
pub fn normalize_query(text: &str) -> Vec<Keyword> {
    let mut keywords: Vec<Keyword> = Vec::new();
    for tok in tokenize(text) {
        if is_stop_word(&tok) {
            continue;
        }
        let term = stem(&tok);
        if keywords.iter().any(|k| k.term == term) {
            continue;
        }
        keywords.push(Keyword {
            alternates: synonyms_of(&term),
            term,
            literal: tok,
        });
    }
    keywords
}
