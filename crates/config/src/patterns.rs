//! Compiled pattern bundles: ambiguity map, adversarial patterns,
//! out-of-scope topics, topic-hint table, and phrase catalogs.
//!
//! Regex-heavy pattern tables are reframed as compiled bundles loaded
//! once and shared read-only, with a builder that validates each table
//! at startup. The rule *sets* are configuration, not contract: ship
//! sensible defaults, but let deployments override via YAML.

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// A term with ambiguous meaning (e.g. "central line") that must be
/// clarified before retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmbiguityEntry {
    pub term: String,
    pub message: String,
    pub options: Vec<String>,
}

/// A topic → {policy query, reference} rule for the Policy-Hint
/// Injector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HintRule {
    pub topic_keywords: Vec<String>,
    pub hint: String,
    pub reference_number: String,
}

/// Raw, serializable form of the pattern tables, as loaded from YAML.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PatternTablesSource {
    #[serde(default)]
    pub out_of_scope_topics: Vec<String>,
    #[serde(default)]
    pub ambiguity_map: Vec<AmbiguityEntry>,
    #[serde(default)]
    pub adversarial_patterns: Vec<String>,
    #[serde(default)]
    pub unclear_query_patterns: Vec<String>,
    #[serde(default)]
    pub hint_rules: Vec<HintRule>,
    #[serde(default)]
    pub not_found_phrases: Vec<String>,
    #[serde(default)]
    pub refusal_phrases: Vec<String>,
    #[serde(default)]
    pub surge_title_patterns: Vec<String>,
    #[serde(default)]
    pub pediatric_keywords: Vec<String>,
    #[serde(default)]
    pub abbreviations: HashMap<String, String>,
    #[serde(default)]
    pub compound_terms: Vec<(Vec<String>, String)>,
    #[serde(default)]
    pub single_terms: HashMap<String, String>,
    #[serde(default)]
    pub short_query_context: HashMap<String, String>,
    #[serde(default)]
    pub abbreviation_stop_list: Vec<String>,
    #[serde(default)]
    pub instance_search_pattern: Option<String>,
}

/// Compiled, validated pattern tables, safe for concurrent read.
pub struct PatternTables {
    pub out_of_scope_topics: Vec<String>,
    pub ambiguity_map: HashMap<String, AmbiguityEntry>,
    pub adversarial_patterns: Vec<Regex>,
    pub unclear_query_patterns: Vec<Regex>,
    pub hint_rules: Vec<HintRule>,
    pub not_found_phrases: Vec<String>,
    pub refusal_phrases: Vec<String>,
    pub surge_title_patterns: Vec<Regex>,
    pub pediatric_keywords: Vec<String>,
    pub abbreviations: HashMap<String, String>,
    pub compound_terms: Vec<(Vec<String>, String)>,
    pub single_terms: HashMap<String, String>,
    pub short_query_context: HashMap<String, String>,
    pub abbreviation_stop_list: Vec<String>,
    pub instance_search_pattern: Regex,
}

impl PatternTables {
    /// Build and validate from the source form, failing fast if any
    /// configured regex does not compile.
    pub fn build(source: PatternTablesSource) -> Result<Self, ConfigError> {
        let compile = |patterns: &[String]| -> Result<Vec<Regex>, ConfigError> {
            patterns
                .iter()
                .map(|p| {
                    Regex::new(&format!("(?i){}", p)).map_err(|e| ConfigError::InvalidValue {
                        field: "patterns".to_string(),
                        message: format!("invalid regex '{}': {}", p, e),
                    })
                })
                .collect()
        };

        let ambiguity_map = source
            .ambiguity_map
            .into_iter()
            .map(|e| (e.term.to_lowercase(), e))
            .collect();

        let instance_search_pattern = source
            .instance_search_pattern
            .unwrap_or_else(default_instance_search_pattern);
        let instance_search_pattern =
            Regex::new(&instance_search_pattern).map_err(|e| ConfigError::InvalidValue {
                field: "instance_search_pattern".to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            adversarial_patterns: compile(&source.adversarial_patterns)?,
            unclear_query_patterns: compile(&source.unclear_query_patterns)?,
            surge_title_patterns: compile(&source.surge_title_patterns)?,
            out_of_scope_topics: source.out_of_scope_topics,
            ambiguity_map,
            hint_rules: source.hint_rules,
            not_found_phrases: source.not_found_phrases,
            refusal_phrases: source.refusal_phrases,
            pediatric_keywords: source.pediatric_keywords,
            abbreviations: source.abbreviations,
            compound_terms: source.compound_terms,
            single_terms: source.single_terms,
            short_query_context: source.short_query_context,
            abbreviation_stop_list: source.abbreviation_stop_list,
            instance_search_pattern,
        })
    }

    /// Load from a YAML file, falling back to defaults for anything the
    /// file omits.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let source = match std::fs::read_to_string(path) {
            Ok(text) => serde_yaml::from_str(&text).map_err(|e| ConfigError::ParseError(e.to_string()))?,
            Err(_) => {
                tracing::warn!(path, "pattern table file not found, using built-in defaults");
                default_source()
            }
        };
        Self::build(source)
    }

    pub fn default_tables() -> Self {
        Self::build(default_source()).expect("built-in default pattern tables must compile")
    }
}

fn default_instance_search_pattern() -> String {
    r"(?i)find\s+(.+?)\s+in\s+(?:the\s+)?(?:policy\s+)?(.+)".to_string()
}

fn default_source() -> PatternTablesSource {
    PatternTablesSource {
        out_of_scope_topics: vec![
            "cafeteria".into(),
            "parking".into(),
            "menu".into(),
            "payroll".into(),
            "vacation request".into(),
        ],
        ambiguity_map: vec![AmbiguityEntry {
            term: "central line".into(),
            message: "Which central line policy do you mean?".into(),
            options: vec![
                "Central line insertion and maintenance".into(),
                "Central line-associated bloodstream infection (CLABSI) prevention".into(),
            ],
        }],
        adversarial_patterns: vec![
            r"ignore (all |any )?(previous|prior|the above) instructions".into(),
            r"you are now".into(),
            r"act as (an?|the)".into(),
            r"disregard (your|the) (rules|instructions|guidelines)".into(),
            r"pretend (you are|to be)".into(),
            r"bypass (the |any )?(policy|restriction|filter)".into(),
        ],
        unclear_query_patterns: vec![
            r"^\s*$".into(),
            r"^[[:punct:]]+$".into(),
            r"^.$".into(),
            r"^(hi|hello|hey|test|help)\W*$".into(),
        ],
        hint_rules: vec![HintRule {
            topic_keywords: vec!["verbal order".into(), "verbal orders".into()],
            hint: "verbal order authorization".into(),
            reference_number: "486".into(),
        }],
        not_found_phrases: vec![
            "could not find".into(),
            "i don't have information".into(),
            "no policy found".into(),
            "i do not have information".into(),
            "unable to find".into(),
        ],
        refusal_phrases: vec![
            "i can only answer questions about".into(),
            "i'm not able to help with that".into(),
            "that is outside the scope of".into(),
            "i only answer policy-related".into(),
        ],
        surge_title_patterns: vec![r"surge\s+capacity".into(), r"overflow\s+(unit|protocol)".into()],
        pediatric_keywords: vec!["pediatric".into(), "child".into(), "infant".into(), "neonatal".into(), "newborn".into()],
        abbreviations: HashMap::from([
            ("npo".into(), "nothing by mouth".into()),
            ("dnr".into(), "do not resuscitate".into()),
            ("picc".into(), "peripherally inserted central catheter".into()),
            ("icu".into(), "intensive care unit".into()),
            ("ed".into(), "emergency department".into()),
            ("or".into(), "operating room".into()),
        ]),
        compound_terms: vec![
            (vec!["verbal".into(), "order".into()], "telephone order authorization".into()),
            (vec!["central".into(), "line".into()], "central venous catheter".into()),
        ],
        single_terms: HashMap::from([
            ("sepsis".into(), "sepsis bundle early recognition".into()),
            ("restraint".into(), "restraint and seclusion".into()),
        ]),
        short_query_context: HashMap::from([
            ("npo".into(), "nothing by mouth preoperative fasting".into()),
            ("dnr".into(), "do not resuscitate code status".into()),
        ]),
        abbreviation_stop_list: vec!["or".into(), "icu".into(), "ed".into(), "a".into(), "an".into(), "the".into()],
        instance_search_pattern: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tables_compile() {
        let tables = PatternTables::default_tables();
        assert!(!tables.adversarial_patterns.is_empty());
        assert!(tables.ambiguity_map.contains_key("central line"));
    }

    #[test]
    fn invalid_regex_fails_fast() {
        let mut source = default_source();
        source.adversarial_patterns.push("(unterminated".into());
        assert!(PatternTables::build(source).is_err());
    }

    #[test]
    fn instance_search_pattern_matches_find_in_policy() {
        let tables = PatternTables::default_tables();
        let caps = tables
            .instance_search_pattern
            .captures("find hand hygiene in policy 214")
            .expect("should match");
        assert_eq!(&caps[1], "hand hygiene");
        assert_eq!(&caps[2], "214");
    }
}
