//! Category and subcategory extraction from free text
//!
//! Category cells are either comma separated tag lists
//! (`"Deep Learning, Neural Networks, Vision"`) or prose
//! (`"This term falls under the main category of Machine Learning within AI"`).

use once_cell::sync::Lazy;
use regex::Regex;

/// Longest category name stored before truncation
const MAX_CATEGORY_LEN: usize = 100;

static CATEGORY_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)main category of\s+([^,\n.]+)",
        r"(?i)falls under(?:\s+the)?\s+(?:main\s+category\s+of\s+)?([^,\n.]+)",
        r"(?i)belongs to(?:\s+the)?\s+(?:main\s+category\s+of\s+)?([^,\n.]+)",
        r"(?i)category of\s+([^,\n.]+)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static category pattern"))
    .collect()
});

static MAIN_CATEGORY_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Main Category:\s*([^;,\n]+)").expect("static pattern"));

static SUBCATEGORY_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Sub-category:\s*([^;,\n]+)").expect("static pattern"));

static SUBCATEGORY_OF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)sub-category of\s+([^,\n.]+)").expect("static pattern"));

static QUOTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"['"]([^'"]+)['"]"#).expect("static pattern"));

static TRAILING_CLAUSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s+(within|in|and|or)\s+.*$").expect("static pattern"));

static CLEANUP_CLAUSES: Lazy<Vec<Regex>> = Lazy::new(|| {
    ["within", "in", "and", "or"]
        .iter()
        .map(|word| Regex::new(&format!(r"(?i)\s+{}\s+.*$", word)).expect("static pattern"))
        .collect()
});

fn strip_trailing_clause(text: &str) -> String {
    TRAILING_CLAUSE.replace(text.trim(), "").into_owned()
}

/// Main category named in a prose cell, or `""`
pub fn extract_category_from_text(text: &str) -> String {
    let text = text.trim();
    if text.is_empty() {
        return String::new();
    }

    if let Some(caps) = MAIN_CATEGORY_LABEL.captures(text) {
        return caps[1].trim().to_string();
    }

    for pattern in CATEGORY_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(text) {
            return strip_trailing_clause(&caps[1]);
        }
    }

    QUOTED
        .captures(text)
        .map(|caps| caps[1].trim().to_string())
        .unwrap_or_default()
}

/// Subcategories named in a prose cell, in order of appearance by rule
pub fn extract_subcategories_from_text(text: &str) -> Vec<String> {
    let text = text.trim();
    let mut found = Vec::new();
    if text.is_empty() {
        return found;
    }

    if let Some(caps) = SUBCATEGORY_LABEL.captures(text) {
        found.push(caps[1].trim().to_string());
    }
    if let Some(caps) = SUBCATEGORY_OF.captures(text) {
        found.push(strip_trailing_clause(&caps[1]));
    }
    for caps in QUOTED.captures_iter(text) {
        let phrase = caps[1].trim();
        if phrase.chars().count() > 3 {
            found.push(phrase.to_string());
        }
    }

    found
}

/// Normalise a category or subcategory name for storage
pub fn clean_category_name(name: &str) -> String {
    let mut cleaned = name.trim().to_string();
    for clause in CLEANUP_CLAUSES.iter() {
        cleaned = clause.replace(&cleaned, "").into_owned();
    }

    let cleaned = title_case(&cleaned);
    if cleaned.chars().count() > MAX_CATEGORY_LEN {
        let mut truncated: String = cleaned.chars().take(MAX_CATEGORY_LEN - 3).collect();
        truncated.push_str("...");
        truncated
    } else {
        cleaned
    }
}

/// Uppercase the first letter of every alphabetic run, lowercase the rest
fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_word = false;
    for c in text.chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }
    out
}

/// Comma separated list with at least three entries
pub fn is_tag_list(text: &str) -> bool {
    text.contains(',') && text.split(',').count() > 2
}
