pub mod config;
pub mod error;
pub mod questions;
pub mod backends;
pub mod embeddings;
pub mod ingest;
pub mod context;
pub mod eval;
pub mod report;

pub use config::Config;
pub use error::{RagbenchError, Result};
pub use backends::{BackendKind, Passage, Retriever, Uploader};
pub use eval::{Evaluator, MatchStrategy, MetricSummary, ResultSet};
