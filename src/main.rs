use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use dongyo::{
    ConfigDb,
    CorpusIndex,
    DataDir,
    EmbeddingConfig,
    EmbeddingStore,
    RemoteEmbedder,
    Retriever,
    config::{EmbeddingOverrides, settings},
    corpus,
    error::{self, Error},
    indexer,
    mcp,
    retrieval::{self, RetrievalParams},
};
use serde_json::json;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Cli, Command, ModelAction};

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("DONGYO_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

/// Resolved artifact locations and settings shared by every command.
struct Context {
    data_dir: DataDir,
    config_db: ConfigDb,
    metadata: PathBuf,
    index: PathBuf,
    overrides: EmbeddingOverrides,
}

impl Context {
    fn embedding_config(&self) -> error::Result<EmbeddingConfig> {
        EmbeddingConfig::resolve(&self.overrides, Some(&self.config_db))
    }

    fn open_index(&self) -> error::Result<CorpusIndex> {
        CorpusIndex::open(&self.metadata, &self.index)
    }
}

fn main() -> error::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let config_db = ConfigDb::open(&data_dir.config_db())?;
    let ctx = Context {
        metadata: cli.metadata.unwrap_or_else(|| data_dir.corpus_metadata()),
        index: cli.index_path.unwrap_or_else(|| data_dir.embeddings_db()),
        overrides: EmbeddingOverrides {
            base_url: cli.embedding_url,
            model: cli.model,
            timeout: cli.embedding_timeout,
        },
        data_dir,
        config_db,
    };

    match cli.command {
        Command::Search(args) => cmd_search(&ctx, &args)?,
        Command::Get(args) => cmd_get(&ctx, &args)?,
        Command::Status(args) => cmd_status(&ctx, args.json)?,
        Command::BuildIndex(args) => cmd_build_index(&ctx, &args)?,
        Command::Model { action } => match action {
            ModelAction::Show { json } => model_show(&ctx, json)?,
            ModelAction::Set { name, url } => {
                model_set(&ctx.config_db, &name, url.as_deref())?;
            }
            ModelAction::Clear => model_clear(&ctx.config_db)?,
        },
        Command::Mcp => {
            let config = ctx.embedding_config()?;
            let timeout = config.timeout;
            let index = ctx.open_index()?;
            mcp::run_mcp(index, RemoteEmbedder::new(config)?, timeout)?;
        }
        Command::Completions(args) => args.generate(),
    }

    Ok(())
}

fn runtime() -> error::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| {
            Error::Config(format!("failed to start tokio runtime: {e}"))
        })
}

fn cmd_search(ctx: &Context, args: &cli::SearchArgs) -> error::Result<()> {
    let config = ctx.embedding_config()?;
    let timeout = config.timeout;
    let index = ctx.open_index()?;
    let retriever =
        Retriever::new(Arc::new(index), RemoteEmbedder::new(config)?, timeout);

    let params = RetrievalParams {
        query: args.query.clone(),
        top_k: args.count,
        categories: args.category_map(),
        use_hybrid: !args.vector_only,
        allow_keyword_fallback: args.keyword_fallback,
    };
    let outcome = runtime()?.block_on(retriever.retrieve(&params))?;

    if args.json {
        retrieval::format_json(&outcome, &args.query)?;
    } else {
        retrieval::format_human(&outcome);
    }
    Ok(())
}

fn cmd_get(ctx: &Context, args: &cli::GetArgs) -> error::Result<()> {
    let documents = corpus::read_metadata(&ctx.metadata)?;
    let doc = documents.get(args.document).ok_or(Error::OutOfRange {
        index: args.document,
        len: documents.len(),
    })?;

    if args.json {
        let value = if args.meta {
            json!({
                "index": doc.index,
                "title": doc.title,
                "featureSummary": doc.feature_summary,
            })
        } else {
            json!({
                "index": doc.index,
                "title": doc.title,
                "featureSummary": doc.feature_summary,
                "lyrics": doc.lyrics,
            })
        };
        println!("{value}");
    } else {
        println!("#{} {}", doc.index, doc.title);
        if !doc.feature_summary.is_empty() {
            println!("{}", doc.feature_summary);
        }
        if !args.meta {
            println!();
            println!("{}", doc.lyrics);
        }
    }
    Ok(())
}

fn cmd_status(ctx: &Context, json: bool) -> error::Result<()> {
    let config = ctx.embedding_config()?;
    let index = match ctx.open_index() {
        Ok(index) => Some(index),
        Err(e) => {
            tracing::warn!("corpus not loadable: {e}");
            None
        }
    };
    let documents = index.as_ref().map(|i| i.store().len());
    let dimension = index.as_ref().map(|i| i.store().dimension());
    let keywords = index.as_ref().map(|i| i.keyword_index().token_count());

    if json {
        let value = json!({
            "dataDir": ctx.data_dir.root(),
            "metadata": ctx.metadata,
            "index": ctx.index,
            "documents": documents,
            "dimension": dimension,
            "keywords": keywords,
            "model": config.model,
            "embeddingUrl": config.base_url,
        });
        println!("{value}");
    } else {
        println!("Data directory: {}", ctx.data_dir.root().display());
        println!("Metadata: {}", ctx.metadata.display());
        println!("Index: {}", ctx.index.display());
        match (documents, dimension, keywords) {
            (Some(documents), Some(dimension), Some(keywords)) => {
                println!("Documents: {documents}");
                println!("Dimension: {dimension}");
                println!("Keywords: {keywords}");
            }
            _ => println!("Corpus: not loaded (run `dongyo build-index`)"),
        }
        println!("Model: {}", config.model);
        println!("Embedding URL: {}", config.base_url);
    }
    Ok(())
}

fn cmd_build_index(
    ctx: &Context,
    args: &cli::BuildIndexArgs,
) -> error::Result<()> {
    let documents = corpus::read_metadata(&ctx.metadata)?;
    let embedder = RemoteEmbedder::new(ctx.embedding_config()?)?;
    let store = EmbeddingStore::open(&ctx.index)?;

    eprintln!(
        "Embedding {} songs with {}...",
        documents.len(),
        embedder.config().model
    );
    let report = runtime()?.block_on(indexer::build_index(
        &documents,
        &embedder,
        &store,
        args.batch_size,
        !args.no_progress,
    ))?;

    eprintln!(
        "Stored {} embeddings ({} dimensions) in {}",
        report.embedded,
        report.dimension,
        ctx.index.display()
    );
    if report.removed > 0 {
        eprintln!("Removed {} stale entries", report.removed);
    }
    Ok(())
}

fn model_show(ctx: &Context, json: bool) -> error::Result<()> {
    let config = ctx.embedding_config()?;
    let stored_model = ctx.config_db.get_setting(settings::EMBEDDING_MODEL)?;
    let stored_url = ctx.config_db.get_setting(settings::EMBEDDING_URL)?;

    if json {
        let value = json!({
            "model": config.model,
            "embeddingUrl": config.base_url,
            "storedModel": stored_model,
            "storedUrl": stored_url,
            "timeoutSecs": config.timeout.as_secs_f64(),
            "apiKey": config.api_key.is_some(),
        });
        println!("{value}");
    } else {
        println!("Model: {}", config.model);
        println!("Embedding URL: {}", config.base_url);
        println!("Timeout: {:?}", config.timeout);
        if let Some(model) = stored_model {
            println!("Stored model: {model}");
        }
        if let Some(url) = stored_url {
            println!("Stored URL: {url}");
        }
        let key = if config.api_key.is_some() { "set" } else { "not set" };
        println!("API key: {key}");
    }
    Ok(())
}

fn model_set(
    config_db: &ConfigDb,
    model: &str,
    url: Option<&str>,
) -> error::Result<()> {
    config_db.set_setting(settings::EMBEDDING_MODEL, model)?;
    println!("Stored embedding model '{model}'");
    if let Some(url) = url {
        config_db.set_setting(settings::EMBEDDING_URL, url)?;
        println!("Stored embedding URL '{url}'");
    }
    Ok(())
}

fn model_clear(config_db: &ConfigDb) -> error::Result<()> {
    let mut removed = false;
    for key in [settings::EMBEDDING_MODEL, settings::EMBEDDING_URL] {
        removed |= config_db.remove_setting(key)?;
    }
    if removed {
        println!("Cleared stored embedding settings");
    } else {
        println!("No stored embedding settings");
    }
    Ok(())
}
