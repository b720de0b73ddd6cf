//! Locating the expected passage in a ranked result list.

use crate::backends::Passage;
use crate::questions::Question;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// How a passage is judged to contain the expected answer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MatchStrategy {
    /// Case-insensitive containment of the expected answer in the passage text
    #[default]
    Substring,
    /// Case-insensitive equality of the expected source and the passage source
    Source,
    /// Either of the above
    Either,
}

impl MatchStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStrategy::Substring => "substring",
            MatchStrategy::Source => "source",
            MatchStrategy::Either => "either",
        }
    }
}

/// Whether `question` carries the expectation `strategy` needs.
pub fn is_answerable(question: &Question, strategy: MatchStrategy) -> bool {
    match strategy {
        MatchStrategy::Substring => question.answer().is_some(),
        MatchStrategy::Source => question.source().is_some(),
        MatchStrategy::Either => question.answer().is_some() || question.source().is_some(),
    }
}

/// Rank of the first passage matching `question`, or `None`.
///
/// Passages are scanned in the order given. Only the first passage from each
/// source is eligible: a source seen at an earlier rank is skipped, and the
/// skipped passage keeps its backend rank. Passages without a source are
/// keyed on their text instead.
pub fn find_match(question: &Question, passages: &[Passage], strategy: MatchStrategy) -> Option<usize> {
    let answer = question.answer().map(str::to_lowercase);
    let source = question.source().map(str::to_lowercase);
    let mut seen: HashSet<String> = HashSet::new();

    for passage in passages {
        if !seen.insert(duplicate_key(passage)) {
            log::debug!(
                "Skipping repeated source '{}' at rank {}",
                passage.source,
                passage.rank
            );
            continue;
        }

        let text_hit = || {
            answer
                .as_deref()
                .is_some_and(|a| passage.text.to_lowercase().contains(a))
        };
        let source_hit = || {
            source
                .as_deref()
                .is_some_and(|s| passage.source.trim().to_lowercase() == s)
        };

        let hit = match strategy {
            MatchStrategy::Substring => text_hit(),
            MatchStrategy::Source => source_hit(),
            MatchStrategy::Either => text_hit() || source_hit(),
        };

        if hit {
            return Some(passage.rank);
        }
    }

    None
}

fn duplicate_key(passage: &Passage) -> String {
    let source = passage.source.trim();
    if source.is_empty() {
        format!("text:{}", passage.text)
    } else {
        format!("source:{}", source.to_lowercase())
    }
}
