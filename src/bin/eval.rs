//! Benchmark CLI: run the question set against each backend and report MRR@K.

use clap::Parser;
use ragbench::{
    backends::{build_retriever, BackendKind, Retriever},
    context::ContextBuilder,
    eval::{Evaluator, MatchStrategy},
    questions::load_questions,
    report::{write_json_summary, write_results_file, BenchmarkSummary},
    Config,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "eval")]
#[command(about = "Benchmark retrieval backends on a question set (MRR@K)")]
struct Args {
    /// Backend to evaluate (repeatable). Defaults to every configured backend.
    #[arg(long = "backend", value_enum)]
    backends: Vec<BackendKind>,

    /// Question set CSV (overrides bench.questions_path).
    #[arg(long)]
    questions: Option<PathBuf>,

    /// Output directory for result CSVs (overrides bench.results_dir).
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Cutoff to report MRR at (repeatable; overrides eval.ks).
    #[arg(long = "k")]
    ks: Vec<usize>,

    /// Answer matching strategy (overrides eval.match_strategy).
    #[arg(long, value_enum)]
    match_strategy: Option<MatchStrategy>,

    /// Maximum number of questions to evaluate.
    #[arg(long)]
    max_questions: Option<usize>,

    /// Skip the first N questions (resume a partial run).
    #[arg(long, default_value_t = 0)]
    start_index: usize,

    /// Record the full answer-generation prompt in `retrieved_context`
    /// instead of the bare context (also set by eval.answer_prompt).
    #[arg(long)]
    answer_prompt: bool,

    /// Also write a JSON summary of all backends to this path.
    #[arg(long)]
    json_summary: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::load()?;

    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", config.bench.log_level.as_str()),
    )
    .init();

    let ks = if args.ks.is_empty() {
        config.eval.ks.clone()
    } else {
        args.ks.clone()
    };
    if ks.iter().any(|&k| k == 0) {
        anyhow::bail!("--k values must be greater than 0");
    }
    let strategy = args.match_strategy.unwrap_or(config.eval.match_strategy);
    let max_questions = args.max_questions.unwrap_or(config.eval.max_questions);
    let questions_path = args
        .questions
        .clone()
        .unwrap_or_else(|| config.questions_path().to_path_buf());
    let out_dir = args
        .out_dir
        .clone()
        .unwrap_or_else(|| config.results_dir().to_path_buf());

    let kinds = if args.backends.is_empty() {
        BackendKind::configured(&config)
    } else {
        args.backends.clone()
    };
    if kinds.is_empty() {
        anyhow::bail!("No backend configured. Add a backend section to config.toml or pass --backend.");
    }

    // Build every retriever up front: a missing credential fails the run
    // before any question is sent.
    let mut retrievers: Vec<Box<dyn Retriever>> = Vec::with_capacity(kinds.len());
    for kind in &kinds {
        retrievers.push(build_retriever(*kind, &config)?);
    }

    let question_set = load_questions(&questions_path)?;
    if question_set.is_empty() {
        anyhow::bail!("No usable questions in {}", questions_path.display());
    }
    if !question_set.skipped.is_empty() {
        log::warn!(
            "Skipped {} malformed rows in {}",
            question_set.skipped.len(),
            questions_path.display()
        );
    }

    let interrupt = Arc::new(AtomicBool::new(false));
    {
        let interrupt = interrupt.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::warn!("Ctrl-C received; stopping after the current question");
                interrupt.store(true, Ordering::SeqCst);
            }
        });
    }

    let context = ContextBuilder::new(config.eval.max_context_chars, config.eval.max_sources);

    println!(
        "Running evaluation on {} questions ({} backends)\n",
        question_set.len(),
        retrievers.len()
    );

    let mut summaries = Vec::with_capacity(retrievers.len());
    for retriever in &retrievers {
        let evaluator = Evaluator::new(retriever.as_ref(), &ks)?
            .with_strategy(strategy)
            .with_context_builder(context)
            .with_max_questions(max_questions)
            .with_start_index(args.start_index)
            .with_answer_prompt(args.answer_prompt || config.eval.answer_prompt)
            .with_interrupt(interrupt.clone());

        let results = evaluator.run(&question_set.questions).await;
        let (path, summary) = write_results_file(&out_dir, &results, args.start_index)?;

        println!("=== {} ===", summary.backend);
        for (name, value) in summary.rows() {
            println!("{:<14} {}", name, value);
        }
        println!("Results:       {}\n", path.display());

        summaries.push(summary);

        if interrupt.load(Ordering::SeqCst) {
            log::warn!("Run interrupted; remaining backends skipped");
            break;
        }
    }

    let mut ks_sorted = ks.clone();
    ks_sorted.sort_unstable();
    ks_sorted.dedup();
    let summary = BenchmarkSummary::new(&questions_path, strategy, &ks_sorted, summaries);

    println!("=== Comparison ===");
    print!("{}", summary.comparison_table());

    if let Some(path) = &args.json_summary {
        write_json_summary(path, &summary)?;
        println!("\nSummary written to {}", path.display());
    }

    Ok(())
}
