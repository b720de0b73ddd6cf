//! Evaluation: answer matching, MRR@K metrics and the question loop.

pub mod matcher;
pub mod metrics;
pub mod runner;

pub use matcher::{find_match, is_answerable, MatchStrategy};
pub use metrics::{mean_reciprocal_rank, metric_name, reciprocal_rank, summarize, MetricSummary, MrrAtK};
pub use runner::{EvaluationResult, Evaluator, Outcome, ResultSet};
