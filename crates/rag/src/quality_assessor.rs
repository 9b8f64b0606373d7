//! Quality Assessor / Corrective Retrieval.
//!
//! Scores the retrieved set and produces a `CorrectiveAction`. Failure of
//! this stage is non-fatal: callers that hit an internal error should log
//! and fall back to `CorrectiveAction::Proceed` rather than propagate.

use policyrag_core::{CorrectiveAction, ForcedReference, SearchResult};

pub struct QualityAssessor {
    min_results: usize,
    min_avg_score: f64,
    low_quality_floor: f64,
}

impl Default for QualityAssessor {
    fn default() -> Self {
        Self {
            min_results: 1,
            min_avg_score: 0.3,
            low_quality_floor: 0.15,
        }
    }
}

impl QualityAssessor {
    pub fn with_thresholds(min_results: usize, min_avg_score: f64, low_quality_floor: f64) -> Self {
        Self {
            min_results,
            min_avg_score,
            low_quality_floor,
        }
    }

    /// Score the top candidates' aggregate quality, in `[0, 1]`.
    pub fn score(&self, results: &[SearchResult]) -> f64 {
        if results.is_empty() {
            return 0.0;
        }
        let top: Vec<&SearchResult> = results.iter().take(3).collect();
        if top.len() < self.min_results {
            return 0.0;
        }
        let avg: f64 = top.iter().map(|r| r.score).sum::<f64>() / top.len() as f64;
        if avg < self.min_avg_score {
            return (avg / self.min_avg_score * 0.5).min(1.0);
        }
        let max = top.iter().map(|r| r.score).fold(0.0f64, f64::max);
        let min = top.iter().map(|r| r.score).fold(f64::MAX, f64::min);
        let consistency_bonus = if max - min < 0.2 { 0.1 } else { 0.0 };
        (avg.min(1.0) + consistency_bonus).min(1.0)
    }

    /// Decide the corrective action for a retrieved set, given any forced
    /// references that must survive.
    pub fn assess(&self, results: &[SearchResult], forced: &[ForcedReference]) -> CorrectiveAction {
        if results.is_empty() {
            if forced.is_empty() {
                return CorrectiveAction::Refuse;
            }
            return CorrectiveAction::Retry(
                forced.iter().map(|f| f.reference_number.clone()).collect(),
            );
        }

        let quality = self.score(results);
        if quality >= self.min_avg_score {
            return CorrectiveAction::Proceed;
        }

        let missing_forced: Vec<String> = forced
            .iter()
            .filter(|f| {
                !results
                    .iter()
                    .any(|r| r.reference_number == f.reference_number)
            })
            .map(|f| f.reference_number.clone())
            .collect();
        if !missing_forced.is_empty() {
            return CorrectiveAction::Retry(missing_forced);
        }

        if quality < self.low_quality_floor {
            return CorrectiveAction::Refuse;
        }

        let keep: Vec<usize> = results
            .iter()
            .enumerate()
            .filter(|(_, r)| r.score >= self.low_quality_floor)
            .map(|(i, _)| i)
            .collect();
        if keep.is_empty() || keep.len() == results.len() {
            CorrectiveAction::Refuse
        } else {
            CorrectiveAction::Filter(keep)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use policyrag_core::EntitySet;

    fn result(score: f64, reference_number: &str) -> SearchResult {
        SearchResult {
            id: format!("c-{}", reference_number),
            content: "content".into(),
            title: "Policy".into(),
            reference_number: reference_number.into(),
            section: "1".into(),
            source_file: "f".into(),
            page_number: None,
            applies_to: EntitySet::new(),
            score,
        }
    }

    #[test]
    fn empty_results_without_forced_refs_refuses() {
        let assessor = QualityAssessor::default();
        assert!(matches!(assessor.assess(&[], &[]), CorrectiveAction::Refuse));
    }

    #[test]
    fn empty_results_with_forced_refs_retries() {
        let assessor = QualityAssessor::default();
        let forced = vec![ForcedReference {
            reference_number: "486".into(),
            rank: 0,
            hint: "verbal order authorization".into(),
        }];
        assert!(matches!(
            assessor.assess(&[], &forced),
            CorrectiveAction::Retry(_)
        ));
    }

    #[test]
    fn high_quality_results_proceed() {
        let assessor = QualityAssessor::default();
        let results = vec![result(0.9, "1"), result(0.85, "2"), result(0.8, "3")];
        assert!(matches!(assessor.assess(&results, &[]), CorrectiveAction::Proceed));
    }

    #[test]
    fn missing_forced_reference_triggers_retry() {
        let assessor = QualityAssessor::default();
        let results = vec![result(0.2, "1")];
        let forced = vec![ForcedReference {
            reference_number: "486".into(),
            rank: 0,
            hint: "hint".into(),
        }];
        assert!(matches!(
            assessor.assess(&results, &forced),
            CorrectiveAction::Retry(_)
        ));
    }

    #[test]
    fn assessor_failure_is_non_fatal_by_construction() {
        // score() never panics or errors even on pathological input.
        let assessor = QualityAssessor::default();
        assert_eq!(assessor.score(&[]), 0.0);
    }
}
