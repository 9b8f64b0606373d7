//! Query expansion: turns raw user text into retrieval input.
//!
//! Pipeline, in fixed order: lowercase + whitespace collapse, possessive
//! removal, punctuation normalization, abbreviation expansion (skipping a
//! stop-list of short words that collide with acronyms), compound-term
//! expansion (unordered pair detection), single-term expansion (only
//! when no compound matched), short-query context padding. The result
//! is truncated so that `words(expanded) <= max(6, 2 * words(original))`.
//!
//! The canonical cache key is derived from the *original* query only
//! (lowercased, depunctuated, sorted tokens) — expansion never affects it.

use policyrag_config::PatternTables;
use policyrag_core::{ExpandedQuery, ExpandedTerm, ExpansionRule};

/// Expands queries against a compiled pattern bundle.
pub struct QueryExpander<'a> {
    tables: &'a PatternTables,
}

impl<'a> QueryExpander<'a> {
    pub fn new(tables: &'a PatternTables) -> Self {
        Self { tables }
    }

    /// Canonicalize the *original* query into a cache key: lowercased,
    /// depunctuated, tokens sorted.
    pub fn canonical_key(query: &str) -> String {
        let mut tokens: Vec<String> = normalize_punctuation(&strip_possessives(&collapse(query)))
            .split_whitespace()
            .map(|w| w.to_string())
            .collect();
        tokens.sort();
        tokens.join(" ")
    }

    /// Run the full expansion pipeline.
    pub fn expand(&self, query: &str) -> ExpandedQuery {
        let original_word_count = query.split_whitespace().count();
        let canonical_key = Self::canonical_key(query);

        let collapsed = collapse(query);
        let depossessed = strip_possessives(&collapsed);
        let normalized = normalize_punctuation(&depossessed);

        let mut words: Vec<String> = normalized.split_whitespace().map(|w| w.to_string()).collect();
        let mut fired = Vec::new();

        // Abbreviation expansion, skipping the stop-list.
        for word in words.iter_mut() {
            let stripped = word.trim_matches(|c: char| !c.is_alphanumeric());
            if self.tables.abbreviation_stop_list.iter().any(|s| s == stripped) {
                continue;
            }
            if let Some(expansion) = self.tables.abbreviations.get(stripped) {
                fired.push(ExpandedTerm {
                    term: expansion.clone(),
                    rule: ExpansionRule::Abbreviation,
                });
                *word = format!("{} {}", word, expansion);
            }
        }
        let mut expanded_text = words.join(" ");

        // Compound-term expansion: unordered pair detection.
        let mut compound_matched = false;
        let token_set: std::collections::HashSet<&str> =
            normalized.split_whitespace().collect();
        for (pair, expansion) in &self.tables.compound_terms {
            if pair.iter().all(|term| token_set.contains(term.as_str())) {
                compound_matched = true;
                fired.push(ExpandedTerm {
                    term: expansion.clone(),
                    rule: ExpansionRule::Compound,
                });
                expanded_text = format!("{} {}", expanded_text, expansion);
            }
        }

        // Single-term expansion: only when no compound fired.
        if !compound_matched {
            for (term, expansion) in &self.tables.single_terms {
                if token_set.contains(term.as_str()) {
                    fired.push(ExpandedTerm {
                        term: expansion.clone(),
                        rule: ExpansionRule::SingleTerm,
                    });
                    expanded_text = format!("{} {}", expanded_text, expansion);
                }
            }
        }

        // Short-query context padding: queries of <=2 words matching a
        // curated acronym context map.
        if original_word_count <= policyrag_config::constants::expansion::SHORT_QUERY_WORD_LIMIT {
            for (term, context) in &self.tables.short_query_context {
                if token_set.contains(term.as_str()) {
                    fired.push(ExpandedTerm {
                        term: context.clone(),
                        rule: ExpansionRule::ContextPad,
                    });
                    expanded_text = format!("{} {}", expanded_text, context);
                }
            }
        }

        // Enforce the expansion-ratio cap.
        let bound = std::cmp::max(
            policyrag_config::constants::expansion::MIN_EXPANDED_WORDS,
            policyrag_config::constants::expansion::MAX_EXPANSION_RATIO * original_word_count,
        );
        let mut expanded_words: Vec<&str> = expanded_text.split_whitespace().collect();
        let truncated = expanded_words.len() > bound;
        if truncated {
            expanded_words.truncate(bound);
        }
        let expanded = expanded_words.join(" ");

        ExpandedQuery {
            original: query.to_string(),
            canonical_key,
            expanded,
            fired_rules: fired,
            truncated,
        }
    }
}

fn collapse(query: &str) -> String {
    query.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip_possessives(query: &str) -> String {
    query.replace("'s", "").replace('\u{2019}', "")
}

fn normalize_punctuation(query: &str) -> String {
    query
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_key_ignores_case_and_order() {
        assert_eq!(
            QueryExpander::canonical_key("NPO status?"),
            QueryExpander::canonical_key("status, npo")
        );
    }

    #[test]
    fn expansion_respects_word_bound() {
        let tables = PatternTables::default_tables();
        let expander = QueryExpander::new(&tables);
        let expanded = expander.expand("npo");
        let bound = std::cmp::max(6, 2 * 1);
        assert!(expanded.expanded.split_whitespace().count() <= bound);
    }

    #[test]
    fn abbreviation_expansion_fires() {
        let tables = PatternTables::default_tables();
        let expander = QueryExpander::new(&tables);
        let expanded = expander.expand("npo orders");
        assert!(expanded.expanded.contains("nothing by mouth"));
    }

    #[test]
    fn stop_listed_abbreviation_is_not_expanded() {
        let tables = PatternTables::default_tables();
        let expander = QueryExpander::new(&tables);
        let expanded = expander.expand("book an or slot");
        assert!(!expanded.expanded.contains("operating room"));
    }

    #[test]
    fn compound_term_suppresses_single_term() {
        let tables = PatternTables::default_tables();
        let expander = QueryExpander::new(&tables);
        let expanded = expander.expand("verbal order policy");
        assert!(expanded
            .fired_rules
            .iter()
            .any(|t| t.rule == ExpansionRule::Compound));
    }

    #[test]
    fn short_query_gets_context_padding() {
        let tables = PatternTables::default_tables();
        let expander = QueryExpander::new(&tables);
        let expanded = expander.expand("npo");
        assert!(expanded
            .fired_rules
            .iter()
            .any(|t| t.rule == ExpansionRule::ContextPad));
    }
}
