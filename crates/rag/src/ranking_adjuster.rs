//! Ranking Adjuster: applied after reranking, in fixed order —
//! forced-reference recovery/boost, surge-policy penalty, population
//! boost, location boost, MMR diversification, score-window filter.
//!
//! Ordering constraint: after all adjustments, the prefix of the final
//! list honors ForcedReference order before other results of equal or
//! lower score.

use policyrag_config::PatternTables;
use policyrag_core::{ForcedReference, RerankResult, SearchResult};

pub struct RankingAdjusterConfig {
    pub forced_boost_multiplier: f64,
    pub forced_score_floor: f64,
    pub forced_recovery_floor: f64,
    pub surge_penalty: f64,
    pub pediatric_boost: f64,
    pub adult_boost: f64,
    pub location_boost: f64,
    pub mmr_lambda: f64,
    pub score_window: f64,
}

pub struct RankingAdjuster<'a> {
    config: RankingAdjusterConfig,
    tables: &'a PatternTables,
}

impl<'a> RankingAdjuster<'a> {
    pub fn new(config: RankingAdjusterConfig, tables: &'a PatternTables) -> Self {
        Self { config, tables }
    }

    pub fn adjust(
        &self,
        mut results: Vec<RerankResult>,
        original_candidates: &[SearchResult],
        forced: &[ForcedReference],
        query_text: &str,
        is_multi_policy: bool,
    ) -> Vec<RerankResult> {
        results = self.recover_and_boost_forced(results, original_candidates, forced);
        results = self.surge_penalty(results, query_text);
        results = self.population_boost(results, query_text);
        results = self.location_boost(results, query_text);

        if is_multi_policy && results.len() > 3 {
            results = self.mmr_diversify(results, forced);
        }
        if !is_multi_policy && results.len() > 3 {
            results = self.score_window_filter(results, forced);
        }

        self.enforce_forced_precedence(results, forced)
    }

    fn recover_and_boost_forced(
        &self,
        mut results: Vec<RerankResult>,
        original_candidates: &[SearchResult],
        forced: &[ForcedReference],
    ) -> Vec<RerankResult> {
        for f in forced {
            if let Some(existing) = results
                .iter_mut()
                .find(|r| r.result.reference_number == f.reference_number)
            {
                existing.relevance_score =
                    (existing.relevance_score * self.config.forced_boost_multiplier)
                        .max(self.config.forced_score_floor);
            } else if let Some(candidate) = original_candidates
                .iter()
                .find(|c| c.reference_number == f.reference_number)
            {
                results.push(RerankResult {
                    result: candidate.clone(),
                    relevance_score: self.config.forced_recovery_floor,
                    original_index: results.len(),
                });
            }
        }
        results.sort_by(|a, b| b.relevance_score.partial_cmp(&a.relevance_score).unwrap());
        results
    }

    fn surge_penalty(&self, mut results: Vec<RerankResult>, query_text: &str) -> Vec<RerankResult> {
        let query_mentions_surge = query_text.to_lowercase().contains("surge")
            || query_text.to_lowercase().contains("overflow");
        if query_mentions_surge {
            return results;
        }
        for r in results.iter_mut() {
            if self
                .tables
                .surge_title_patterns
                .iter()
                .any(|p| p.is_match(&r.result.title))
            {
                r.relevance_score *= self.config.surge_penalty;
            }
        }
        results.sort_by(|a, b| b.relevance_score.partial_cmp(&a.relevance_score).unwrap());
        results
    }

    fn population_boost(&self, mut results: Vec<RerankResult>, query_text: &str) -> Vec<RerankResult> {
        let lower = query_text.to_lowercase();
        let is_pediatric = self
            .tables
            .pediatric_keywords
            .iter()
            .any(|kw| lower.contains(kw.as_str()));

        for r in results.iter_mut() {
            let title_lower = r.result.title.to_lowercase();
            let content_lower = r.result.content.to_lowercase();
            let result_is_pediatric = self
                .tables
                .pediatric_keywords
                .iter()
                .any(|kw| title_lower.contains(kw.as_str()) || content_lower.contains(kw.as_str()));

            if is_pediatric && result_is_pediatric {
                r.relevance_score *= self.config.pediatric_boost;
            } else if !is_pediatric && !result_is_pediatric {
                r.relevance_score *= self.config.adult_boost;
            }
        }
        results.sort_by(|a, b| b.relevance_score.partial_cmp(&a.relevance_score).unwrap());
        results
    }

    fn location_boost(&self, mut results: Vec<RerankResult>, query_text: &str) -> Vec<RerankResult> {
        let upper = query_text.to_uppercase();
        let mentioned: Vec<&str> = upper
            .split_whitespace()
            .filter(|w| w.len() <= 4 && w.chars().all(|c| c.is_ascii_alphabetic()))
            .collect();
        if mentioned.is_empty() {
            return results;
        }
        for r in results.iter_mut() {
            if r.result
                .applies_to
                .iter()
                .any(|code| mentioned.contains(&code.as_str()))
            {
                r.relevance_score *= self.config.location_boost;
            }
        }
        results.sort_by(|a, b| b.relevance_score.partial_cmp(&a.relevance_score).unwrap());
        results
    }

    /// Maximal Marginal Relevance: greedily picks results maximizing
    /// `lambda * relevance - (1 - lambda) * max_similarity_to_selected`,
    /// using distinct-policy membership as the diversity signal.
    fn mmr_diversify(&self, results: Vec<RerankResult>, forced: &[ForcedReference]) -> Vec<RerankResult> {
        let lambda = self.config.mmr_lambda;
        let mut remaining = results;
        let mut selected: Vec<RerankResult> = Vec::new();
        let forced_refs: std::collections::HashSet<&str> =
            forced.iter().map(|f| f.reference_number.as_str()).collect();

        while !remaining.is_empty() && selected.len() < 10 {
            let (best_idx, _) = remaining
                .iter()
                .enumerate()
                .map(|(i, candidate)| {
                    let is_forced = forced_refs.contains(candidate.result.reference_number.as_str());
                    let diversity_penalty = if selected
                        .iter()
                        .any(|s| s.result.reference_number == candidate.result.reference_number)
                    {
                        1.0
                    } else {
                        0.0
                    };
                    let mmr_score = if is_forced {
                        f64::MAX
                    } else {
                        lambda * candidate.relevance_score - (1.0 - lambda) * diversity_penalty
                    };
                    (i, mmr_score)
                })
                .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap())
                .unwrap();
            selected.push(remaining.remove(best_idx));
        }
        selected
    }

    /// Drops results scoring below `score_window * top_score` as
    /// tangential. Forced references are exempt — P4 requires that any
    /// forced reference surviving retrieval also survives adjustment, and
    /// a reference recovered at the floor score would otherwise sit below
    /// the window on any strong top hit.
    fn score_window_filter(&self, results: Vec<RerankResult>, forced: &[ForcedReference]) -> Vec<RerankResult> {
        let forced_refs: std::collections::HashSet<&str> =
            forced.iter().map(|f| f.reference_number.as_str()).collect();
        let top_score = results
            .iter()
            .map(|r| r.relevance_score)
            .fold(0.0f64, f64::max);
        let threshold = self.config.score_window * top_score;
        results
            .into_iter()
            .filter(|r| r.relevance_score >= threshold || forced_refs.contains(r.result.reference_number.as_str()))
            .collect()
    }

    fn enforce_forced_precedence(
        &self,
        mut results: Vec<RerankResult>,
        forced: &[ForcedReference],
    ) -> Vec<RerankResult> {
        if forced.is_empty() {
            return results;
        }
        let rank_of = |r: &RerankResult| -> Option<usize> {
            forced
                .iter()
                .find(|f| f.reference_number == r.result.reference_number)
                .map(|f| f.rank)
        };
        results.sort_by(|a, b| {
            match (rank_of(a), rank_of(b)) {
                (Some(ra), Some(rb)) => ra.cmp(&rb),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => b.relevance_score.partial_cmp(&a.relevance_score).unwrap(),
            }
        });
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use policyrag_core::EntitySet;

    fn config() -> RankingAdjusterConfig {
        RankingAdjusterConfig {
            forced_boost_multiplier: 1.5,
            forced_score_floor: 0.5,
            forced_recovery_floor: 0.35,
            surge_penalty: 0.2,
            pediatric_boost: 1.3,
            adult_boost: 1.2,
            location_boost: 1.25,
            mmr_lambda: 0.6,
            score_window: 0.6,
        }
    }

    fn result(score: f64, reference_number: &str, title: &str) -> RerankResult {
        RerankResult {
            result: SearchResult {
                id: format!("c-{}", reference_number),
                content: "content".into(),
                title: title.into(),
                reference_number: reference_number.into(),
                section: "1".into(),
                source_file: "f".into(),
                page_number: None,
                applies_to: EntitySet::new(),
                score,
            },
            relevance_score: score,
            original_index: 0,
        }
    }

    #[test]
    fn forced_reference_recovered_when_missing() {
        let tables = PatternTables::default_tables();
        let adjuster = RankingAdjuster::new(config(), &tables);
        let original = vec![result(0.1, "486", "Verbal Orders").result];
        let forced = vec![ForcedReference {
            reference_number: "486".into(),
            rank: 0,
            hint: "verbal order authorization".into(),
        }];
        let adjusted = adjuster.adjust(vec![], &original, &forced, "verbal order policy", false);
        assert!(adjusted.iter().any(|r| r.result.reference_number == "486"));
        assert!(adjusted[0].relevance_score >= 0.35);
    }

    #[test]
    fn forced_reference_boosted_when_present() {
        let tables = PatternTables::default_tables();
        let adjuster = RankingAdjuster::new(config(), &tables);
        let reranked = vec![result(0.3, "486", "Verbal Orders"), result(0.9, "900", "Other")];
        let forced = vec![ForcedReference {
            reference_number: "486".into(),
            rank: 0,
            hint: "hint".into(),
        }];
        let adjusted = adjuster.adjust(reranked, &[], &forced, "verbal order", false);
        let forced_result = adjusted.iter().find(|r| r.result.reference_number == "486").unwrap();
        assert!(forced_result.relevance_score >= 0.5);
    }

    #[test]
    fn forced_reference_precedes_higher_scoring_non_forced() {
        let tables = PatternTables::default_tables();
        let adjuster = RankingAdjuster::new(config(), &tables);
        let reranked = vec![result(0.95, "900", "Other"), result(0.4, "486", "Verbal Orders")];
        let forced = vec![ForcedReference {
            reference_number: "486".into(),
            rank: 0,
            hint: "hint".into(),
        }];
        let adjusted = adjuster.adjust(reranked, &[], &forced, "verbal order", false);
        assert_eq!(adjusted[0].result.reference_number, "486");
    }

    #[test]
    fn surge_penalty_applies_unless_query_mentions_surge() {
        let tables = PatternTables::default_tables();
        let adjuster = RankingAdjuster::new(config(), &tables);
        let reranked = vec![result(0.8, "1", "Surge Capacity Protocol")];
        let adjusted = adjuster.adjust(reranked.clone(), &[], &[], "bed availability", false);
        let adjusted_surge = adjuster.adjust(reranked, &[], &[], "surge overflow plan", false);
        assert!(adjusted[0].relevance_score < adjusted_surge[0].relevance_score);
    }

    #[test]
    fn score_window_filters_tangential_single_intent_results() {
        let tables = PatternTables::default_tables();
        let adjuster = RankingAdjuster::new(config(), &tables);
        let reranked = vec![result(1.0, "1", "Top"), result(0.5, "2", "Mid"), result(0.1, "3", "Low"), result(0.05, "4", "Lowest")];
        let adjusted = adjuster.adjust(reranked, &[], &[], "policy question", false);
        assert!(!adjusted.iter().any(|r| r.result.reference_number == "4"));
    }

    #[test]
    fn score_window_does_not_drop_a_forced_reference() {
        let tables = PatternTables::default_tables();
        let adjuster = RankingAdjuster::new(config(), &tables);
        // "486" only survives reranking at the recovery floor (0.35), well
        // below 0.6 * 1.0 — the window would otherwise drop it.
        let reranked = vec![result(1.0, "1", "Top"), result(0.9, "2", "High"), result(0.8, "3", "Also High"), result(0.35, "486", "Verbal Orders")];
        let forced = vec![ForcedReference {
            reference_number: "486".into(),
            rank: 0,
            hint: "hint".into(),
        }];
        let adjusted = adjuster.adjust(reranked, &[], &forced, "verbal order policy", false);
        assert!(adjusted.iter().any(|r| r.result.reference_number == "486"));
    }
}
