//! Result writer: per-backend CSV reports and the JSON run summary.

use crate::error::Result;
use crate::eval::{metric_name, summarize, MatchStrategy, MetricSummary, Outcome, ResultSet};
use chrono::{DateTime, Utc};
use csv::WriterBuilder;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// `{results_dir}/{backend}-benchmark-results.csv` for a full run.
///
/// A run resumed at `start_index > 0` gets its own
/// `{backend}-benchmark-results.from-{start_index}.csv` so earlier rows survive.
pub fn results_path(results_dir: &Path, backend: &str, start_index: usize) -> PathBuf {
    if start_index == 0 {
        results_dir.join(format!("{}-benchmark-results.csv", backend))
    } else {
        results_dir.join(format!(
            "{}-benchmark-results.from-{}.csv",
            backend, start_index
        ))
    }
}

/// Write question rows in order, then `[metric, value]` summary rows.
pub fn write_results<W: Write>(writer: W, results: &ResultSet) -> Result<MetricSummary> {
    let mut csv = WriterBuilder::new().flexible(true).from_writer(writer);

    let mut header = vec![
        "question_id".to_string(),
        "question".to_string(),
        "expected_answer".to_string(),
        "status".to_string(),
        "matched_rank".to_string(),
    ];
    header.extend(results.ks.iter().map(|k| format!("reciprocal_rank@{}", k)));
    header.push("retrieved_context".to_string());
    csv.write_record(&header)?;

    for result in &results.results {
        let question = &result.question;
        let mut row = vec![
            question.id.clone(),
            question.text.clone(),
            question.expected_answer.clone(),
            result.outcome.status().to_string(),
        ];

        match &result.outcome {
            Outcome::Errored(err) => {
                row.push(String::new());
                row.extend(results.ks.iter().map(|_| String::new()));
                row.push(err.to_string());
            }
            outcome => {
                row.push(
                    outcome
                        .matched_rank()
                        .map_or_else(|| "none".to_string(), |rank| rank.to_string()),
                );
                row.extend(
                    (0..results.ks.len())
                        .map(|idx| format!("{:.4}", outcome.score_at(idx).unwrap_or(0.0))),
                );
                row.push(result.context.clone());
            }
        }

        csv.write_record(&row)?;
    }

    let summary = summarize(results);
    for (name, value) in summary.rows() {
        csv.write_record([name, value])?;
    }

    csv.flush()?;
    Ok(summary)
}

/// Write the CSV report for one backend under `results_dir`.
pub fn write_results_file(
    results_dir: &Path,
    results: &ResultSet,
    start_index: usize,
) -> Result<(PathBuf, MetricSummary)> {
    fs::create_dir_all(results_dir)?;
    let path = results_path(results_dir, &results.backend, start_index);
    let file = fs::File::create(&path)?;
    let summary = write_results(file, results)?;
    log::info!("Wrote {} results to {}", results.results.len(), path.display());
    Ok((path, summary))
}

/// Summary of a multi-backend run
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkSummary {
    pub generated_at: DateTime<Utc>,
    pub questions_path: PathBuf,
    pub match_strategy: MatchStrategy,
    pub ks: Vec<usize>,
    pub backends: Vec<MetricSummary>,
}

impl BenchmarkSummary {
    pub fn new(
        questions_path: &Path,
        match_strategy: MatchStrategy,
        ks: &[usize],
        backends: Vec<MetricSummary>,
    ) -> Self {
        Self {
            generated_at: Utc::now(),
            questions_path: questions_path.to_path_buf(),
            match_strategy,
            ks: ks.to_vec(),
            backends,
        }
    }

    /// Side-by-side comparison table for the terminal.
    pub fn comparison_table(&self) -> String {
        let mut out = format!("{:<18}", "backend");
        for &k in &self.ks {
            out.push_str(&format!("{:>9}", metric_name(k)));
        }
        out.push_str(&format!("{:>8}{:>9}{:>9}\n", "scored", "matched", "errored"));

        for summary in &self.backends {
            out.push_str(&format!("{:<18}", summary.backend));
            for &k in &self.ks {
                out.push_str(&format!("{:>9.4}", summary.mrr_at(k).unwrap_or(0.0)));
            }
            out.push_str(&format!(
                "{:>8}{:>9}{:>9}\n",
                summary.scored, summary.matched, summary.errored
            ));
        }

        out
    }
}

pub fn write_json_summary(path: &Path, summary: &BenchmarkSummary) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(summary)?;
    fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RetrievalError;
    use crate::eval::EvaluationResult;
    use crate::questions::Question;
    use tempfile::TempDir;

    fn result(id: &str, outcome: Outcome, context: &str) -> EvaluationResult {
        EvaluationResult {
            question: Question {
                id: id.to_string(),
                text: format!("question {}", id),
                expected_answer: "Whole Foods".to_string(),
                expected_source: None,
                line: 1,
            },
            passages: Vec::new(),
            outcome,
            context: context.to_string(),
        }
    }

    fn sample_set() -> ResultSet {
        ResultSet {
            backend: "cloud-search".to_string(),
            ks: vec![3, 5],
            results: vec![
                result(
                    "1",
                    Outcome::Scored {
                        matched_rank: Some(2),
                        reciprocal_ranks: vec![0.5, 0.5],
                    },
                    "Source #1: ...",
                ),
                result("2", Outcome::Errored(RetrievalError::new("cloud-search", "HTTP 503: busy")), ""),
                result(
                    "3",
                    Outcome::Scored {
                        matched_rank: None,
                        reciprocal_ranks: vec![0.0, 0.0],
                    },
                    "",
                ),
            ],
            interrupted: false,
        }
    }

    fn read_rows(bytes: &[u8]) -> Vec<Vec<String>> {
        csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(bytes)
            .records()
            .map(|r| r.unwrap().iter().map(str::to_string).collect())
            .collect()
    }

    #[test]
    fn test_write_results_rows_then_summary() {
        let mut buf = Vec::new();
        let summary = write_results(&mut buf, &sample_set()).unwrap();
        let rows = read_rows(&buf);

        assert_eq!(
            rows[0],
            vec![
                "question_id",
                "question",
                "expected_answer",
                "status",
                "matched_rank",
                "reciprocal_rank@3",
                "reciprocal_rank@5",
                "retrieved_context"
            ]
        );
        assert_eq!(rows[1][0], "1");
        assert_eq!(rows[1][4], "2");
        assert_eq!(rows[1][5], "0.5000");

        assert_eq!(rows[2][3], "errored");
        assert_eq!(rows[2][5], "");
        assert!(rows[2][7].contains("HTTP 503"));

        assert_eq!(rows[3][4], "none");

        assert_eq!(rows[4], vec!["MRR@3", "0.2500"]);
        assert_eq!(rows[5], vec!["MRR@5", "0.2500"]);
        assert_eq!(rows[6], vec!["questions", "3"]);
        assert_eq!(rows.last().unwrap(), &vec!["errored".to_string(), "1".to_string()]);
        assert_eq!(summary.errored, 1);
    }

    #[test]
    fn test_write_results_file_path() {
        let temp_dir = TempDir::new().unwrap();
        let out_dir = temp_dir.path().join("results");

        let (path, _) = write_results_file(&out_dir, &sample_set(), 0).unwrap();
        assert_eq!(path, out_dir.join("cloud-search-benchmark-results.csv"));
        assert!(path.exists());
    }

    #[test]
    fn test_resumed_run_keeps_earlier_results() {
        let temp_dir = TempDir::new().unwrap();
        let first = sample_set();
        let mut resumed = sample_set();
        resumed.results = vec![result(
            "4",
            Outcome::Scored {
                matched_rank: Some(1),
                reciprocal_ranks: vec![1.0, 1.0],
            },
            "",
        )];

        let (first_path, _) = write_results_file(temp_dir.path(), &first, 0).unwrap();
        let (resumed_path, summary) = write_results_file(temp_dir.path(), &resumed, 3).unwrap();

        assert_ne!(first_path, resumed_path);
        assert_eq!(
            resumed_path,
            temp_dir.path().join("cloud-search-benchmark-results.from-3.csv")
        );
        assert_eq!(summary.questions, 1);

        let rows = read_rows(&fs::read(&first_path).unwrap());
        let ids: Vec<&str> = rows[1..4].iter().map(|r| r[0].as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
        assert!(rows.contains(&vec!["questions".to_string(), "3".to_string()]));

        let rows = read_rows(&fs::read(&resumed_path).unwrap());
        assert_eq!(rows[1][0], "4");
    }

    #[test]
    fn test_json_summary() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("summary.json");
        let summary = BenchmarkSummary::new(
            Path::new("questions.csv"),
            MatchStrategy::Substring,
            &[3, 5],
            vec![summarize(&sample_set())],
        );

        write_json_summary(&path, &summary).unwrap();
        let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["match_strategy"], "substring");
        assert_eq!(value["backends"][0]["backend"], "cloud-search");
        assert_eq!(value["backends"][0]["mrr"][0]["metric"], "MRR@3");
        assert!(value["generated_at"].is_string());

        assert!(summary.comparison_table().contains("cloud-search"));
    }
}
