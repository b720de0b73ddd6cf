use clap::Parser;
use ragbench::ingest::{discover_transcripts, split_by_lines};
use ragbench::Config;
use std::path::PathBuf;
use anyhow::{Context, Result};

#[derive(Parser, Debug)]
#[command(name = "chunk")]
#[command(about = "Split podcast transcripts into line-budget chunk files")]
struct Args {
    /// Transcripts directory (overrides bench.transcripts_dir)
    #[arg(long)]
    input: Option<PathBuf>,

    /// Output directory; chunks land in `{out}/chunks/`
    #[arg(long, default_value = ".")]
    out: PathBuf,

    /// Approximate characters per chunk (overrides chunking.line_chunk_chars)
    #[arg(long)]
    chars: Option<usize>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load()?;

    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", config.bench.log_level.as_str()),
    )
    .init();

    let input = args
        .input
        .unwrap_or_else(|| config.transcripts_dir().to_path_buf());
    let approx_chars = args.chars.unwrap_or(config.chunking.line_chunk_chars);
    if approx_chars == 0 {
        anyhow::bail!("--chars must be greater than 0");
    }

    let files = discover_transcripts(&input)?;
    if files.is_empty() {
        log::warn!("No transcripts found in {}", input.display());
        return Ok(());
    }

    let chunks_dir = args.out.join("chunks");
    std::fs::create_dir_all(&chunks_dir)
        .with_context(|| format!("Failed to create {}", chunks_dir.display()))?;

    let mut total = 0;
    for file in &files {
        let text = std::fs::read_to_string(&file.absolute_path)
            .with_context(|| format!("Failed to read {}", file.absolute_path.display()))?;

        let chunks = split_by_lines(&file.title, &text, approx_chars);
        for (idx, chunk) in chunks.iter().enumerate() {
            let path = chunks_dir.join(format!("{}-{}.txt", file.title, idx));
            std::fs::write(&path, chunk)
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }

        log::info!("{}: {} chunks", file.title, chunks.len());
        total += chunks.len();
    }

    println!(
        "Wrote {} chunks from {} transcripts to {}",
        total,
        files.len(),
        chunks_dir.display()
    );
    Ok(())
}
