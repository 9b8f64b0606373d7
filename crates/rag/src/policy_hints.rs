//! Policy-Hint Injector: scans expanded text against a
//! `topic -> {policy query, reference}` table, injecting any matched
//! reference as a `ForcedReference` and appending a short hint string to
//! the retrieval query. Matches preserve first-seen order.

use policyrag_config::PatternTables;
use policyrag_core::ForcedReference;

pub struct PolicyHintInjector<'a> {
    tables: &'a PatternTables,
}

pub struct InjectedHints {
    pub retrieval_text: String,
    pub forced_references: Vec<ForcedReference>,
}

impl<'a> PolicyHintInjector<'a> {
    pub fn new(tables: &'a PatternTables) -> Self {
        Self { tables }
    }

    pub fn inject(&self, expanded_text: &str) -> InjectedHints {
        let lower = expanded_text.to_lowercase();
        let mut retrieval_text = expanded_text.to_string();
        let mut forced_references = Vec::new();

        for rule in &self.tables.hint_rules {
            let matched = rule.topic_keywords.iter().any(|kw| lower.contains(kw.as_str()));
            if !matched {
                continue;
            }
            if forced_references
                .iter()
                .any(|f: &ForcedReference| f.reference_number == rule.reference_number)
            {
                continue;
            }
            let rank = forced_references.len();
            forced_references.push(ForcedReference {
                reference_number: rule.reference_number.clone(),
                rank,
                hint: rule.hint.clone(),
            });
            retrieval_text = format!("{} {}", retrieval_text, rule.hint);
        }

        InjectedHints {
            retrieval_text,
            forced_references,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbal_order_query_forces_reference_486() {
        let tables = PatternTables::default_tables();
        let injector = PolicyHintInjector::new(&tables);
        let hints = injector.inject("what is the verbal order process for nurses");
        assert_eq!(hints.forced_references.len(), 1);
        assert_eq!(hints.forced_references[0].reference_number, "486");
        assert!(hints.retrieval_text.contains("verbal order authorization"));
    }

    #[test]
    fn non_matching_query_has_no_forced_references() {
        let tables = PatternTables::default_tables();
        let injector = PolicyHintInjector::new(&tables);
        let hints = injector.inject("hand hygiene compliance rates");
        assert!(hints.forced_references.is_empty());
    }

    #[test]
    fn duplicate_matches_preserve_first_seen_order_without_duplication() {
        let tables = PatternTables::default_tables();
        let injector = PolicyHintInjector::new(&tables);
        let hints = injector.inject("verbal orders and verbal order documentation");
        assert_eq!(hints.forced_references.len(), 1);
    }
}
