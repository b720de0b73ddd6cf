use ragbench::backends::{build_retriever, BackendKind};
use ragbench::ingest::{discover_transcripts, total_size};
use ragbench::questions::load_questions;
use ragbench::Config;
use anyhow::Result;

fn init_logger(config: &Config) {
    let level = config.bench.log_level.as_str();
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("RUST_LOG", level)).init();
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("verify");

    let config = Config::load()?;
    init_logger(&config);

    match command {
        "backends" => list_backends(&config),
        "verify" | _ => verify(&config)?,
    }

    Ok(())
}

/// Print every backend and whether it is configured.
fn list_backends(config: &Config) {
    for kind in BackendKind::ALL {
        let state = if kind.is_configured(config) {
            "configured"
        } else {
            "not configured"
        };
        println!("{:<18} {}", kind.name(), state);
    }
}

/// Check the config, credentials and inputs an `eval` run needs.
fn verify(config: &Config) -> Result<()> {
    println!("\n=== RAGBench configuration ===\n");

    let questions = load_questions(config.questions_path())?;
    println!(
        "Questions:   {} loaded, {} skipped ({})",
        questions.len(),
        questions.skipped.len(),
        config.questions_path().display()
    );
    for skipped in &questions.skipped {
        println!("  - {}", skipped);
    }

    match discover_transcripts(config.transcripts_dir()) {
        Ok(files) => println!(
            "Transcripts: {} files, {:.1} MB ({})",
            files.len(),
            total_size(&files) as f64 / (1024.0 * 1024.0),
            config.transcripts_dir().display()
        ),
        Err(e) => println!("Transcripts: unavailable ({})", e),
    }

    println!("Cutoffs:     {:?}", config.eval.ks);
    println!("Matching:    {}\n", config.eval.match_strategy.as_str());

    let configured = BackendKind::configured(config);
    if configured.is_empty() {
        anyhow::bail!("No backend configured. Add a [vector_index], [semantic_filter] or [cloud_search] section to config.toml.");
    }

    let mut failures = 0;
    for kind in configured {
        match build_retriever(kind, config) {
            Ok(_) if kind == BackendKind::VectorIndex && vector_index_host_missing(config) => {
                failures += 1;
                println!("  ✗ {}: index_host not set (run `upload --create-index` first)", kind);
            }
            Ok(_) => println!("  ✓ {}", kind),
            Err(e) => {
                failures += 1;
                println!("  ✗ {}: {}", kind, e);
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} backend(s) failed verification", failures);
    }

    println!("\nAll configured backends are ready.");
    Ok(())
}

fn vector_index_host_missing(config: &Config) -> bool {
    config
        .vector_index
        .as_ref()
        .is_some_and(|section| section.index_host.trim().is_empty())
}
