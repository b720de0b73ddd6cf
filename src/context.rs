//! Prompt-ready context assembled from ranked passages.

use crate::backends::Passage;

const SEPARATOR: &str = "\n\n----------\n\n";

/// Concatenates passages into a bounded context string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextBuilder {
    /// Upper bound on the context length, in chars.
    pub max_chars: usize,
    /// Upper bound on the number of passages included.
    pub max_sources: Option<usize>,
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self {
            max_chars: 10_000,
            max_sources: None,
        }
    }
}

impl ContextBuilder {
    pub fn new(max_chars: usize, max_sources: Option<usize>) -> Self {
        Self {
            max_chars,
            max_sources,
        }
    }

    /// Build the context from passages in rank order.
    ///
    /// Stops at the first passage whose block would exceed either bound, so
    /// the lowest-ranked passages are the ones dropped.
    pub fn build(&self, passages: &[Passage]) -> String {
        let mut context = String::new();
        let mut used_chars = 0;

        for (idx, passage) in passages.iter().enumerate() {
            if self.max_sources.is_some_and(|max| idx >= max) {
                break;
            }

            let block = source_block(idx + 1, passage);
            let block_chars = block.chars().count();
            if used_chars + block_chars > self.max_chars {
                break;
            }

            context.push_str(&block);
            used_chars += block_chars;
        }

        context
    }
}

fn source_block(n: usize, passage: &Passage) -> String {
    let source = passage.source.trim();
    if source.is_empty() {
        format!("{}Source #{}: \n\"{}\"", SEPARATOR, n, passage.text)
    } else {
        format!("{}Source #{} ({}): \n\"{}\"", SEPARATOR, n, source, passage.text)
    }
}

/// Render the answer-generation prompt for `question` over `context`.
pub fn answer_prompt(question: &str, context: &str) -> String {
    format!(
        "Please use ONLY the sources at the bottom of this prompt to give a short, concise answer the following question.\n\nQuestion: \"{}\"{}",
        question, context
    )
}
