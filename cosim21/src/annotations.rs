//!
//! # Name-Annotation Module
//!
//! Generated structural source carries comment lines mapping the internal
//! wrapper signal names back to the caller's original port names:
//!
//! ```text
//! <comment_prefix> <name_annotation> <internal_name> <external_name>
//! ```
//!
//! The mapping exists purely to make downstream diagnostics readable; it is
//! never consulted for values.
//!

// Std-Lib
use std::collections::BTreeMap;

// Local imports
use super::data::{HdlLanguage, NAME_ANNOTATION};

/// Scan generated source `text` for line-initial name-annotation comments
/// under `comment_prefix`, returning the internal-name to external-name
/// mapping. Source with no annotations yields an empty mapping.
pub fn resolve_names(text: &str, comment_prefix: &str) -> BTreeMap<String, String> {
    let mut names = BTreeMap::new();
    for line in text.lines() {
        if !line.starts_with(comment_prefix) {
            continue;
        }
        let toks: Vec<&str> = line.split_whitespace().collect();
        if toks.len() < 4 || toks[0] != comment_prefix || toks[1] != NAME_ANNOTATION {
            continue;
        }
        names.insert(toks[2].to_string(), toks[3].to_string());
    }
    log::debug!("resolved {} annotated signal names", names.len());
    names
}

/// Rewrite internal signal names appearing in the diagnostic `msg` to their
/// caller-side names, keeping the internal name parenthesized for reference.
pub fn rewrite_diagnostic(
    msg: &str,
    names: &BTreeMap<String, String>,
    lang: HdlLanguage,
) -> String {
    let mut msg = msg.to_string();
    for (internal, external) in names.iter() {
        if msg.contains(internal.as_str()) {
            msg = msg.replace(
                internal.as_str(),
                &format!("{} (internally to {}: {})", external, lang, internal),
            );
        }
    }
    msg
}
