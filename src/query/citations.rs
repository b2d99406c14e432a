// Component citations in generated answers

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// `[Name.java]`, `[Name]` or `[com.pkg.Name]`; a trailing `(` marks a markdown link
static CITATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[((?:[a-z_][A-Za-z0-9_]*\.)*)([A-Z][A-Za-z0-9_]*)(\.java)?\](\()?")
        .expect("citation regex")
});

/// Simple class name of a match, unless it is a link or an all-caps token like `[GET]`
fn cited_name<'t>(caps: &Captures<'t>) -> Option<&'t str> {
    if caps.get(4).is_some() {
        return None;
    }
    caps.get(2)
        .map(|m| m.as_str())
        .filter(|name| name.chars().any(|c| c.is_ascii_lowercase()))
}

/// Cited component names in order of first appearance
pub fn extract_citations(text: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for name in CITATION.captures_iter(text).filter_map(|caps| cited_name(&caps)) {
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Cited names that do not appear in `known`
pub fn unverified_citations(text: &str, known: &BTreeSet<String>) -> Vec<String> {
    extract_citations(text)
        .into_iter()
        .filter(|name| !known.contains(name))
        .collect()
}

/// Rewrite every citation of an unknown name as `[Name (unverified)]`
pub fn flag_unverified(text: &str, known: &BTreeSet<String>) -> (String, Vec<String>) {
    let flagged = unverified_citations(text, known);
    if flagged.is_empty() {
        return (text.to_string(), flagged);
    }

    let rewritten = CITATION.replace_all(text, |caps: &Captures| match cited_name(caps) {
        Some(name) if !known.contains(name) => format!("[{}{} (unverified)]", &caps[1], name),
        _ => caps[0].to_string(),
    });
    (rewritten.into_owned(), flagged)
}
