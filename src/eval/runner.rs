//! Sequential evaluation loop over a question set.

use crate::backends::{Passage, Retriever};
use crate::context::{answer_prompt, ContextBuilder};
use crate::error::{RagbenchError, Result, RetrievalError};
use crate::eval::matcher::{find_match, is_answerable, MatchStrategy};
use crate::eval::metrics::reciprocal_rank;
use crate::questions::Question;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

const PROGRESS_EVERY: usize = 10;

/// Terminal state of one question
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The backend answered. `reciprocal_ranks` is aligned with the run's cutoffs.
    Scored {
        matched_rank: Option<usize>,
        reciprocal_ranks: Vec<f64>,
    },
    /// No expectation to match against; scores 0 at every cutoff.
    Unanswerable,
    Errored(RetrievalError),
}

impl Outcome {
    /// Score at the `idx`-th cutoff; `None` when the question is excluded.
    pub fn score_at(&self, idx: usize) -> Option<f64> {
        match self {
            Outcome::Scored {
                reciprocal_ranks, ..
            } => Some(reciprocal_ranks.get(idx).copied().unwrap_or(0.0)),
            Outcome::Unanswerable => Some(0.0),
            Outcome::Errored(_) => None,
        }
    }

    pub fn matched_rank(&self) -> Option<usize> {
        match self {
            Outcome::Scored { matched_rank, .. } => *matched_rank,
            _ => None,
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            Outcome::Scored { .. } => "scored",
            Outcome::Unanswerable => "unanswerable",
            Outcome::Errored(_) => "errored",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationResult {
    pub question: Question,
    /// Passages as ranked by the backend (empty when errored).
    pub passages: Vec<Passage>,
    pub outcome: Outcome,
    /// Context built from the retrieved passages, or the full answer prompt
    /// when enabled (empty when errored).
    pub context: String,
}

/// All results of one backend run, in question order
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSet {
    pub backend: String,
    /// Cutoffs, ascending and unique.
    pub ks: Vec<usize>,
    pub results: Vec<EvaluationResult>,
    /// The run was stopped before every question was evaluated.
    pub interrupted: bool,
}

/// Runs questions one at a time against a single retriever.
pub struct Evaluator<'a> {
    retriever: &'a dyn Retriever,
    ks: Vec<usize>,
    strategy: MatchStrategy,
    context: ContextBuilder,
    max_questions: usize,
    start_index: usize,
    answer_prompt: bool,
    interrupt: Option<Arc<AtomicBool>>,
}

impl<'a> Evaluator<'a> {
    pub fn new(retriever: &'a dyn Retriever, ks: &[usize]) -> Result<Self> {
        let mut ks = ks.to_vec();
        ks.sort_unstable();
        ks.dedup();

        if ks.is_empty() || ks[0] == 0 {
            return Err(RagbenchError::InvalidInput(
                "cutoffs must be non-empty and greater than 0".to_string(),
            ));
        }

        Ok(Self {
            retriever,
            ks,
            strategy: MatchStrategy::default(),
            context: ContextBuilder::default(),
            max_questions: usize::MAX,
            start_index: 0,
            answer_prompt: false,
            interrupt: None,
        })
    }

    pub fn with_strategy(mut self, strategy: MatchStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_context_builder(mut self, context: ContextBuilder) -> Self {
        self.context = context;
        self
    }

    pub fn with_max_questions(mut self, max_questions: usize) -> Self {
        self.max_questions = max_questions;
        self
    }

    /// Skip the first `start_index` questions (resume a partial run).
    pub fn with_start_index(mut self, start_index: usize) -> Self {
        self.start_index = start_index;
        self
    }

    /// Record the answer-generation prompt instead of the bare context.
    pub fn with_answer_prompt(mut self, enabled: bool) -> Self {
        self.answer_prompt = enabled;
        self
    }

    /// Stop before the next question once `flag` is set.
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }

    pub fn ks(&self) -> &[usize] {
        &self.ks
    }

    /// Retrieval depth: the largest cutoff.
    pub fn depth(&self) -> usize {
        self.ks.last().copied().unwrap_or(1)
    }

    fn interrupted(&self) -> bool {
        self.interrupt
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    /// Evaluate a single question.
    pub async fn evaluate(&self, question: &Question) -> EvaluationResult {
        let passages = match self.retriever.retrieve(&question.text, self.depth()).await {
            Ok(passages) => passages,
            Err(err) => {
                log::warn!("Question {} errored: {}", question.id, err);
                return EvaluationResult {
                    question: question.clone(),
                    passages: Vec::new(),
                    outcome: Outcome::Errored(err),
                    context: String::new(),
                };
            }
        };

        let mut context = self.context.build(&passages);
        if self.answer_prompt {
            context = answer_prompt(&question.text, &context);
        }

        let outcome = if is_answerable(question, self.strategy) {
            let matched_rank = find_match(question, &passages, self.strategy);
            Outcome::Scored {
                matched_rank,
                reciprocal_ranks: self
                    .ks
                    .iter()
                    .map(|&k| reciprocal_rank(matched_rank, k))
                    .collect(),
            }
        } else {
            log::warn!(
                "Question {} (line {}) has no expectation for {} matching; scoring 0",
                question.id,
                question.line,
                self.strategy.as_str()
            );
            Outcome::Unanswerable
        };

        EvaluationResult {
            question: question.clone(),
            passages,
            outcome,
            context,
        }
    }

    /// Evaluate `questions` in order, honoring the start index, the question
    /// cap and the interrupt flag.
    pub async fn run(&self, questions: &[Question]) -> ResultSet {
        let selected: Vec<&Question> = questions
            .iter()
            .skip(self.start_index)
            .take(self.max_questions)
            .collect();

        log::info!(
            "Evaluating {} questions against {} (K = {:?}, match = {})",
            selected.len(),
            self.retriever.name(),
            self.ks,
            self.strategy.as_str()
        );

        let start = Instant::now();
        let mut results = Vec::with_capacity(selected.len());
        let mut interrupted = false;

        for (idx, question) in selected.iter().enumerate() {
            if self.interrupted() {
                log::warn!(
                    "Interrupted after {} of {} questions",
                    results.len(),
                    selected.len()
                );
                interrupted = true;
                break;
            }

            results.push(self.evaluate(question).await);

            if (idx + 1) % PROGRESS_EVERY == 0 {
                log::info!(
                    "{}: {} / {} questions ({:.1}s)",
                    self.retriever.name(),
                    idx + 1,
                    selected.len(),
                    start.elapsed().as_secs_f64()
                );
            }
        }

        log::info!(
            "{} finished {} questions in {:.1}s",
            self.retriever.name(),
            results.len(),
            start.elapsed().as_secs_f64()
        );

        ResultSet {
            backend: self.retriever.name().to_string(),
            ks: self.ks.clone(),
            results,
            interrupted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::rank_passages;
    use crate::eval::summarize;
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// Canned responses keyed by question text; unknown questions fail.
    struct MockRetriever {
        responses: HashMap<String, Vec<Passage>>,
    }

    impl MockRetriever {
        fn new() -> Self {
            Self {
                responses: HashMap::new(),
            }
        }

        fn respond(mut self, query: &str, texts: &[&str]) -> Self {
            let passages = texts
                .iter()
                .enumerate()
                .map(|(i, t)| Passage::new(*t, format!("Episode {}", i), None))
                .collect();
            self.responses.insert(query.to_string(), passages);
            self
        }
    }

    #[async_trait]
    impl Retriever for MockRetriever {
        fn name(&self) -> &str {
            "mock"
        }

        async fn retrieve(&self, query: &str, k: usize) -> std::result::Result<Vec<Passage>, RetrievalError> {
            self.responses
                .get(query)
                .cloned()
                .map(|p| rank_passages(p, k))
                .ok_or_else(|| RetrievalError::new("mock", "HTTP 503: unavailable"))
        }
    }

    fn question(id: &str, text: &str, answer: &str) -> Question {
        Question {
            id: id.to_string(),
            text: text.to_string(),
            expected_answer: answer.to_string(),
            expected_source: None,
            line: 2,
        }
    }

    const Q: &str = "What grocery chain did Amazon acquire?";

    #[tokio::test]
    async fn test_match_at_rank_one() {
        let retriever = MockRetriever::new().respond(Q, &["...Whole Foods Market...", "AWS"]);
        let evaluator = Evaluator::new(&retriever, &[3, 5]).unwrap();

        let result = evaluator.evaluate(&question("1", Q, "Whole Foods")).await;
        assert_eq!(result.outcome.matched_rank(), Some(1));
        assert_eq!(result.outcome.score_at(0), Some(1.0));
        assert!(result.context.contains("Whole Foods Market"));
    }

    #[tokio::test]
    async fn test_match_at_rank_two() {
        let retriever = MockRetriever::new().respond(Q, &["AWS", "...Whole Foods...", "Zappos"]);
        let evaluator = Evaluator::new(&retriever, &[3, 5]).unwrap();

        let result = evaluator.evaluate(&question("1", Q, "Whole Foods")).await;
        assert_eq!(result.outcome.matched_rank(), Some(2));
        assert_eq!(result.outcome.score_at(0), Some(0.5));
    }

    #[tokio::test]
    async fn test_match_at_rank_four_depends_on_cutoff() {
        let retriever = MockRetriever::new().respond(Q, &["a", "b", "c", "whole foods", "e"]);
        let evaluator = Evaluator::new(&retriever, &[5, 3]).unwrap();
        assert_eq!(evaluator.ks(), &[3, 5]);

        let result = evaluator.evaluate(&question("1", Q, "Whole Foods")).await;
        assert_eq!(result.outcome.matched_rank(), Some(4));
        assert_eq!(result.outcome.score_at(0), Some(0.0));
        assert_eq!(result.outcome.score_at(1), Some(0.25));
    }

    #[tokio::test]
    async fn test_case_insensitive_matching() {
        let retriever = MockRetriever::new().respond("q", &["the acquisition closed in 2017"]);
        let evaluator = Evaluator::new(&retriever, &[3]).unwrap();

        let result = evaluator.evaluate(&question("1", "q", "ACQUISITION")).await;
        assert_eq!(result.outcome.matched_rank(), Some(1));
    }

    #[tokio::test]
    async fn test_answer_prompt_recorded_when_enabled() {
        let retriever = MockRetriever::new().respond(Q, &["...Whole Foods Market..."]);
        let q = question("1", Q, "Whole Foods");

        let plain = Evaluator::new(&retriever, &[3]).unwrap().evaluate(&q).await;
        assert!(plain.context.starts_with("\n\n----------"));

        let prompted = Evaluator::new(&retriever, &[3])
            .unwrap()
            .with_answer_prompt(true)
            .evaluate(&q)
            .await;
        assert!(prompted.context.starts_with("Please use ONLY the sources"));
        assert!(prompted.context.contains(&format!("Question: \"{}\"", Q)));
        assert!(prompted.context.ends_with(&plain.context));
        assert_eq!(prompted.outcome, plain.outcome);
    }

    #[tokio::test]
    async fn test_errored_question_excluded_from_denominator() {
        let retriever = MockRetriever::new()
            .respond("q1", &["Whole Foods"])
            .respond("q3", &["nothing here"]);
        let evaluator = Evaluator::new(&retriever, &[3, 5]).unwrap();

        let questions = vec![
            question("1", "q1", "Whole Foods"),
            question("2", "q2", "Costco"),
            question("3", "q3", "Zappos"),
        ];
        let set = evaluator.run(&questions).await;

        assert_eq!(set.results.len(), 3);
        assert_eq!(set.results[1].outcome.status(), "errored");
        assert_eq!(set.results[1].question.id, "2");

        let summary = summarize(&set);
        assert_eq!(summary.errored, 1);
        assert_eq!(summary.denominator(), 2);
        assert!((summary.mrr_at(3).unwrap() - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_unanswerable_flagged_and_scored_zero() {
        let retriever = MockRetriever::new().respond("q", &["anything"]);
        let evaluator = Evaluator::new(&retriever, &[3]).unwrap();

        let result = evaluator.evaluate(&question("1", "q", "  ")).await;
        assert_eq!(result.outcome, Outcome::Unanswerable);
        assert_eq!(result.outcome.score_at(0), Some(0.0));
    }

    #[tokio::test]
    async fn test_mrr_at_3_never_exceeds_mrr_at_5() {
        let retriever = MockRetriever::new()
            .respond("q1", &["x", "x2", "x3", "hit"])
            .respond("q2", &["hit"])
            .respond("q3", &["a", "b", "c", "d", "hit"])
            .respond("q4", &["none"]);
        let evaluator = Evaluator::new(&retriever, &[3, 5]).unwrap();

        let questions: Vec<Question> = (1..=4)
            .map(|i| question(&i.to_string(), &format!("q{}", i), "hit"))
            .collect();
        let summary = summarize(&evaluator.run(&questions).await);

        assert!(summary.mrr_at(3).unwrap() <= summary.mrr_at(5).unwrap());
        assert!((summary.mrr_at(5).unwrap() - (0.25 + 1.0 + 0.2) / 4.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_start_index_and_max_questions() {
        let retriever = MockRetriever::new()
            .respond("q1", &["hit"])
            .respond("q2", &["hit"])
            .respond("q3", &["hit"]);
        let evaluator = Evaluator::new(&retriever, &[3])
            .unwrap()
            .with_start_index(1)
            .with_max_questions(1);

        let questions: Vec<Question> = (1..=3)
            .map(|i| question(&i.to_string(), &format!("q{}", i), "hit"))
            .collect();
        let set = evaluator.run(&questions).await;

        assert_eq!(set.results.len(), 1);
        assert_eq!(set.results[0].question.id, "2");
    }

    #[tokio::test]
    async fn test_interrupt_stops_before_next_question() {
        let retriever = MockRetriever::new().respond("q1", &["hit"]);
        let flag = Arc::new(AtomicBool::new(true));
        let evaluator = Evaluator::new(&retriever, &[3])
            .unwrap()
            .with_interrupt(flag.clone());

        let set = evaluator.run(&[question("1", "q1", "hit")]).await;
        assert!(set.interrupted);
        assert!(set.results.is_empty());
    }

    #[test]
    fn test_rejects_invalid_cutoffs() {
        let retriever = MockRetriever::new();
        assert!(Evaluator::new(&retriever, &[]).is_err());
        assert!(Evaluator::new(&retriever, &[0, 3]).is_err());
    }
}
