//! Question set loading from CSV.
//!
//! The file must have a header row with a `question` column and at least one
//! expectation column (`answer`/`expected_answer`/`true_answer` and/or
//! `expected_source`). An `id`/`question_id` column is optional; without it
//! questions are numbered by data row.

use crate::error::{LoadError, RagbenchError, Result};
use csv::{ReaderBuilder, StringRecord};
use serde::Serialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;

const QUESTION_COLUMNS: &[&str] = &["question"];
const ANSWER_COLUMNS: &[&str] = &["answer", "expected_answer", "true_answer"];
const SOURCE_COLUMNS: &[&str] = &["expected_source", "source"];
const ID_COLUMNS: &[&str] = &["id", "question_id"];

/// One benchmark question. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Question {
    pub id: String,
    pub text: String,
    /// Expected answer span; may be empty (the record is then flagged).
    pub expected_answer: String,
    pub expected_source: Option<String>,
    /// 1-based line in the input file.
    pub line: u64,
}

impl Question {
    /// Expected answer, if it is non-blank.
    pub fn answer(&self) -> Option<&str> {
        let answer = self.expected_answer.trim();
        (!answer.is_empty()).then_some(answer)
    }

    /// Expected source identifier, if it is non-blank.
    pub fn source(&self) -> Option<&str> {
        self.expected_source
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Whether the record carries any expectation to match against.
    pub fn is_answerable(&self) -> bool {
        self.answer().is_some() || self.source().is_some()
    }
}

/// Loaded questions plus the rows that were skipped.
#[derive(Debug, Clone, Default)]
pub struct QuestionSet {
    pub questions: Vec<Question>,
    pub skipped: Vec<LoadError>,
}

impl QuestionSet {
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

/// Column positions resolved from the header row.
struct Columns {
    question: usize,
    answer: Option<usize>,
    source: Option<usize>,
    id: Option<usize>,
}

impl Columns {
    fn resolve(headers: &StringRecord) -> Result<Self> {
        let find = |names: &[&str]| {
            headers
                .iter()
                .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
        };

        let question = find(QUESTION_COLUMNS).ok_or_else(|| {
            RagbenchError::InvalidInput("question set has no 'question' column".to_string())
        })?;
        let answer = find(ANSWER_COLUMNS);
        let source = find(SOURCE_COLUMNS);

        if answer.is_none() && source.is_none() {
            return Err(RagbenchError::InvalidInput(
                "question set needs an 'answer' or 'expected_source' column".to_string(),
            ));
        }

        Ok(Self {
            question,
            answer,
            source,
            id: find(ID_COLUMNS),
        })
    }
}

/// Load a question set from a CSV file.
pub fn load_questions(path: &Path) -> Result<QuestionSet> {
    let file = File::open(path)?;
    let set = read_questions(file)?;
    log::info!(
        "Loaded {} questions from {} ({} rows skipped)",
        set.len(),
        path.display(),
        set.skipped.len()
    );
    Ok(set)
}

/// Load a question set from any CSV reader.
///
/// Malformed rows are logged and collected in [`QuestionSet::skipped`]; a
/// missing header column is an error for the whole file.
pub fn read_questions<R: Read>(reader: R) -> Result<QuestionSet> {
    let mut csv_reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    let columns = Columns::resolve(&headers)?;

    let mut set = QuestionSet::default();

    for (row_idx, record) in csv_reader.records().enumerate() {
        let ordinal = row_idx + 1;
        match record {
            Ok(record) => match parse_record(&record, &columns, ordinal) {
                Ok(question) => {
                    if !question.is_answerable() {
                        log::warn!(
                            "Question {} (line {}) has no expected answer; it will score 0",
                            question.id,
                            question.line
                        );
                    }
                    set.questions.push(question)
                }
                Err(e) => {
                    log::warn!("Skipping question row: {}", e);
                    set.skipped.push(e);
                }
            },
            Err(e) => {
                let err = LoadError::Malformed {
                    line: e.position().map(|p| p.line()).unwrap_or(0),
                    message: e.to_string(),
                };
                log::warn!("Skipping question row: {}", err);
                set.skipped.push(err);
            }
        }
    }

    Ok(set)
}

fn parse_record(
    record: &StringRecord,
    columns: &Columns,
    ordinal: usize,
) -> std::result::Result<Question, LoadError> {
    let line = record.position().map(|p| p.line()).unwrap_or(0);

    let text = record
        .get(columns.question)
        .ok_or_else(|| LoadError::MissingColumn {
            line,
            column: "question".to_string(),
        })?
        .trim()
        .to_string();

    if text.is_empty() {
        return Err(LoadError::EmptyQuestion { line });
    }

    // Short rows lose their trailing cells; an absent expectation cell is
    // treated as empty and flagged at evaluation time.
    let expected_answer = columns
        .answer
        .and_then(|idx| record.get(idx))
        .unwrap_or("")
        .to_string();
    let expected_source = columns
        .source
        .and_then(|idx| record.get(idx))
        .map(str::to_string);

    let id = columns
        .id
        .and_then(|idx| record.get(idx))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| ordinal.to_string());

    Ok(Question {
        id,
        text,
        expected_answer,
        expected_source,
        line,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_read_questions_basic() {
        let csv = "question,answer\n\
                   What did Amazon acquire?,Whole Foods\n\
                   Who founded Nvidia?,Jensen Huang\n";
        let set = read_questions(csv.as_bytes()).unwrap();

        assert_eq!(set.len(), 2);
        assert!(set.skipped.is_empty());
        assert_eq!(set.questions[0].id, "1");
        assert_eq!(set.questions[0].text, "What did Amazon acquire?");
        assert_eq!(set.questions[0].answer(), Some("Whole Foods"));
        assert_eq!(set.questions[1].id, "2");
        assert_eq!(set.questions[1].line, 3);
    }

    #[test]
    fn test_read_questions_with_id_and_source() {
        let csv = "id,question,expected_answer,expected_source\n\
                   q-7,\"Who bought Zappos, and when?\",Amazon,amazon-part-1\n";
        let set = read_questions(csv.as_bytes()).unwrap();

        let q = &set.questions[0];
        assert_eq!(q.id, "q-7");
        assert_eq!(q.text, "Who bought Zappos, and when?");
        assert_eq!(q.source(), Some("amazon-part-1"));
    }

    #[test]
    fn test_empty_question_is_skipped() {
        let csv = "question,answer\n,orphan answer\nReal question?,yes\n";
        let set = read_questions(csv.as_bytes()).unwrap();

        assert_eq!(set.len(), 1);
        assert_eq!(set.skipped.len(), 1);
        assert!(matches!(set.skipped[0], LoadError::EmptyQuestion { line: 2 }));
        // Ids follow data rows, so the surviving question keeps its position.
        assert_eq!(set.questions[0].id, "2");
    }

    #[test]
    fn test_short_row_is_kept_with_empty_expectation() {
        let csv = "question,answer\nNo answer here?\n";
        let set = read_questions(csv.as_bytes()).unwrap();

        assert_eq!(set.len(), 1);
        assert_eq!(set.questions[0].answer(), None);
        assert!(!set.questions[0].is_answerable());
    }

    #[test]
    fn test_missing_question_column() {
        let csv = "prompt,answer\nhello,world\n";
        let err = read_questions(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, RagbenchError::InvalidInput(_)));
    }

    #[test]
    fn test_missing_expectation_columns() {
        let csv = "question,notes\nhello,world\n";
        assert!(read_questions(csv.as_bytes()).is_err());
    }

    #[test]
    fn test_header_matching_is_case_insensitive() {
        let csv = "Question, Answer \nWhat?,That\n";
        let set = read_questions(csv.as_bytes()).unwrap();
        assert_eq!(set.questions[0].answer(), Some("That"));
    }

    #[test]
    fn test_load_questions_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("questions.csv");
        fs::write(&path, "question,answer\nA?,a\nB?,b\nC?,c\n").unwrap();

        let set = load_questions(&path).unwrap();
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_load_questions_missing_file() {
        let result = load_questions(Path::new("does-not-exist.csv"));
        assert!(matches!(result, Err(RagbenchError::Io(_))));
    }
}
