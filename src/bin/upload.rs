use clap::Parser;
use ragbench::backends::{
    build_uploader, http_client, BackendKind, SemanticFilterClient, Uploader, VectorIndexClient,
};
use ragbench::ingest::prepare_corpus;
use ragbench::Config;
use std::path::PathBuf;
use std::time::Instant;
use anyhow::Result;

#[derive(Parser, Debug)]
#[command(name = "upload")]
#[command(about = "Upload the transcript corpus to one retrieval backend")]
struct Args {
    /// Backend to upload to
    #[arg(long, value_enum)]
    backend: BackendKind,

    /// Transcripts directory (overrides bench.transcripts_dir)
    #[arg(long)]
    input: Option<PathBuf>,

    /// Create a new semantic-filter sub-organization and upload into it
    #[arg(long)]
    create_sub_org: Option<String>,

    /// Create the vector index (dimension from embeddings.dimensions) before uploading
    #[arg(long)]
    create_index: bool,

    /// Prepare and count documents without uploading
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load()?;

    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", config.bench.log_level.as_str()),
    )
    .init();

    if args.create_sub_org.is_some() && args.backend != BackendKind::SemanticFilter {
        anyhow::bail!("--create-sub-org only applies to --backend semantic-filter");
    }
    if args.create_index && args.backend != BackendKind::VectorIndex {
        anyhow::bail!("--create-index only applies to --backend vector-index");
    }

    let input = args
        .input
        .clone()
        .unwrap_or_else(|| config.transcripts_dir().to_path_buf());

    let corpus = prepare_corpus(args.backend, &input, &config.chunking)?;
    if corpus.is_empty() {
        log::warn!("No documents to upload from {}", input.display());
        return Ok(());
    }

    if args.dry_run {
        println!("{} documents prepared for {} (dry run)", corpus.len(), args.backend);
        return Ok(());
    }

    let uploader: Box<dyn Uploader> = match &args.create_sub_org {
        None if args.create_index => {
            let section = config
                .vector_index
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("No [vector_index] section in config.toml"))?;
            let client = VectorIndexClient::from_config(&config, http_client(&config)?)?;
            let host = client
                .create_index(section, config.embeddings.dimensions)
                .await?;
            println!("Index {} ready at {}", section.index_name, host);
            println!("Set vector_index.index_host = \"{}\" in config.toml", host);
            Box::new(client.with_index_host(&host))
        }
        Some(name) => {
            let client = SemanticFilterClient::from_config(&config, http_client(&config)?)?;
            let sub_org_id = client.create_sub_org(name).await?;
            println!("Created sub-organization {} ({})", name, sub_org_id);
            println!("Set semantic_filter.sub_org_namespace = \"{}\" in config.toml", sub_org_id);
            Box::new(client.with_sub_org(sub_org_id))
        }
        None => build_uploader(args.backend, &config)?,
    };

    let start = Instant::now();
    log::info!("Uploading {} documents to {}", corpus.len(), uploader.name());
    let accepted = uploader.upload(&corpus).await?;

    println!(
        "Uploaded {} / {} documents to {} in {:.1}s",
        accepted,
        corpus.len(),
        args.backend,
        start.elapsed().as_secs_f64()
    );
    Ok(())
}
