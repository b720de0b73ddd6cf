//! Evaluation metrics: reciprocal rank and Mean Reciprocal Rank (MRR@K).

use crate::eval::{Outcome, ResultSet};
use serde::Serialize;

/// Reciprocal rank at cutoff K: 1/rank for a match within the top K, else 0.
/// Ranks are 1-based; a rank of 0 is treated as no match.
pub fn reciprocal_rank(matched_rank: Option<usize>, k: usize) -> f64 {
    match matched_rank {
        Some(rank) if rank >= 1 && rank <= k => 1.0 / rank as f64,
        _ => 0.0,
    }
}

/// Arithmetic mean of per-question reciprocal ranks. Returns 0.0 for no questions.
pub fn mean_reciprocal_rank(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    scores.iter().sum::<f64>() / scores.len() as f64
}

/// Report label for MRR at cutoff `k`, e.g. `MRR@5`.
pub fn metric_name(k: usize) -> String {
    format!("MRR@{}", k)
}

/// MRR at one cutoff
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MrrAtK {
    pub metric: String,
    pub k: usize,
    pub value: f64,
}

/// Aggregate metrics for one backend run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSummary {
    pub backend: String,
    pub mrr: Vec<MrrAtK>,
    /// Questions evaluated (every outcome).
    pub questions: usize,
    /// Answerable questions the backend served.
    pub scored: usize,
    /// Scored questions with a match inside the retrieval window.
    pub matched: usize,
    /// Scored questions with no match.
    pub zero_score: usize,
    pub unanswerable: usize,
    /// Retrieval failures, excluded from every MRR denominator.
    pub errored: usize,
    pub interrupted: bool,
}

impl MetricSummary {
    /// Questions in the MRR denominator.
    pub fn denominator(&self) -> usize {
        self.scored + self.unanswerable
    }

    pub fn mrr_at(&self, k: usize) -> Option<f64> {
        self.mrr.iter().find(|m| m.k == k).map(|m| m.value)
    }

    /// `(name, value)` pairs in report order: MRR per K, then counts.
    pub fn rows(&self) -> Vec<(String, String)> {
        let mut rows: Vec<(String, String)> = self
            .mrr
            .iter()
            .map(|m| (m.metric.clone(), format!("{:.4}", m.value)))
            .collect();

        for (name, count) in [
            ("questions", self.questions),
            ("scored", self.scored),
            ("matched", self.matched),
            ("zero_score", self.zero_score),
            ("unanswerable", self.unanswerable),
            ("errored", self.errored),
        ] {
            rows.push((name.to_string(), count.to_string()));
        }

        rows
    }
}

/// Recompute the summary from every result in `results`.
pub fn summarize(results: &ResultSet) -> MetricSummary {
    let mut scored = 0;
    let mut matched = 0;
    let mut unanswerable = 0;
    let mut errored = 0;

    for result in &results.results {
        match &result.outcome {
            Outcome::Scored { matched_rank, .. } => {
                scored += 1;
                if matched_rank.is_some() {
                    matched += 1;
                }
            }
            Outcome::Unanswerable => unanswerable += 1,
            Outcome::Errored(_) => errored += 1,
        }
    }

    let mrr = results
        .ks
        .iter()
        .enumerate()
        .map(|(idx, &k)| {
            let scores: Vec<f64> = results
                .results
                .iter()
                .filter_map(|r| r.outcome.score_at(idx))
                .collect();
            MrrAtK {
                metric: metric_name(k),
                k,
                value: mean_reciprocal_rank(&scores),
            }
        })
        .collect();

    MetricSummary {
        backend: results.backend.clone(),
        mrr,
        questions: results.results.len(),
        scored,
        matched,
        zero_score: scored - matched,
        unanswerable,
        errored,
        interrupted: results.interrupted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RetrievalError;
    use crate::eval::EvaluationResult;
    use crate::questions::Question;

    fn result(outcome: Outcome) -> EvaluationResult {
        EvaluationResult {
            question: Question {
                id: "1".to_string(),
                text: "q".to_string(),
                expected_answer: "a".to_string(),
                expected_source: None,
                line: 2,
            },
            passages: Vec::new(),
            outcome,
            context: String::new(),
        }
    }

    fn scored(rank: Option<usize>, ks: &[usize]) -> Outcome {
        Outcome::Scored {
            matched_rank: rank,
            reciprocal_ranks: ks.iter().map(|&k| reciprocal_rank(rank, k)).collect(),
        }
    }

    #[test]
    fn reciprocal_rank_within_cutoff() {
        assert!((reciprocal_rank(Some(1), 3) - 1.0).abs() < 1e-9);
        assert!((reciprocal_rank(Some(2), 3) - 0.5).abs() < 1e-9);
        assert!((reciprocal_rank(Some(3), 3) - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn reciprocal_rank_outside_cutoff() {
        assert_eq!(reciprocal_rank(Some(4), 3), 0.0);
        assert!((reciprocal_rank(Some(4), 5) - 0.25).abs() < 1e-9);
        assert_eq!(reciprocal_rank(None, 5), 0.0);
        assert_eq!(reciprocal_rank(Some(0), 5), 0.0);
    }

    #[test]
    fn mrr_empty_is_zero() {
        assert_eq!(mean_reciprocal_rank(&[]), 0.0);
    }

    #[test]
    fn mrr_mean_of_scores() {
        assert!((mean_reciprocal_rank(&[1.0, 0.5, 0.0]) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn summarize_excludes_errored_from_denominator() {
        let ks = vec![3, 5];
        let set = ResultSet {
            backend: "cloud-search".to_string(),
            ks: ks.clone(),
            results: vec![
                result(scored(Some(1), &ks)),
                result(Outcome::Errored(RetrievalError::new("cloud-search", "HTTP 503"))),
                result(scored(None, &ks)),
            ],
            interrupted: false,
        };

        let summary = summarize(&set);
        assert_eq!(summary.questions, 3);
        assert_eq!(summary.errored, 1);
        assert_eq!(summary.denominator(), 2);
        assert_eq!(summary.matched, 1);
        assert_eq!(summary.zero_score, 1);
        assert!((summary.mrr_at(3).unwrap() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn summarize_counts_unanswerable_as_zero() {
        let ks = vec![5];
        let set = ResultSet {
            backend: "vector-index".to_string(),
            ks: ks.clone(),
            results: vec![result(scored(Some(2), &ks)), result(Outcome::Unanswerable)],
            interrupted: false,
        };

        let summary = summarize(&set);
        assert_eq!(summary.unanswerable, 1);
        assert_eq!(summary.denominator(), 2);
        assert!((summary.mrr_at(5).unwrap() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn summarize_all_errored_is_zero() {
        let set = ResultSet {
            backend: "semantic-filter".to_string(),
            ks: vec![3],
            results: vec![result(Outcome::Errored(RetrievalError::new("semantic-filter", "timeout")))],
            interrupted: true,
        };
        let summary = summarize(&set);
        assert_eq!(summary.mrr_at(3), Some(0.0));
        assert!(summary.interrupted);
    }

    #[test]
    fn summary_rows_order() {
        let set = ResultSet {
            backend: "cloud-search".to_string(),
            ks: vec![3, 5],
            results: vec![],
            interrupted: false,
        };
        let names: Vec<String> = summarize(&set).rows().into_iter().map(|(n, _)| n).collect();
        assert_eq!(
            names,
            vec!["MRR@3", "MRR@5", "questions", "scored", "matched", "zero_score", "unanswerable", "errored"]
        );
    }
}
