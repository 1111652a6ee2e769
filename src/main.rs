use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

mod cli;
mod config;
mod faq;
mod semantic;
#[cfg(test)]
mod tests;
mod web;

use config::{Config, EncoderKind, QueryCacheKind};
use faq::{ExactMatchDictionary, FaqConfig};
use semantic::{
    ApiEncoder, EmbeddingStore, FastEmbedEncoder, FaqHandler, MemoryStore, RocksDbStore,
    SeededRandom, VectorEncoder,
};

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_encoder(config: &Config) -> anyhow::Result<Arc<dyn VectorEncoder>> {
    let encoder: Arc<dyn VectorEncoder> = match config.encoder.kind {
        EncoderKind::Fastembed => Arc::new(
            FastEmbedEncoder::new(
                &config.encoder.model,
                config.base_path().to_path_buf(),
                Some(Duration::from_secs(config.encoder.download_timeout_secs)),
            )
            .with_context(|| format!("failed to load model {}", config.encoder.model))?,
        ),
        EncoderKind::Api => Arc::new(
            ApiEncoder::new(&config.encoder.api_uri)
                .with_context(|| format!("failed to reach encoder at {}", config.encoder.api_uri))?,
        ),
    };

    log::info!(
        "Encoder ready ({:?}, {} dimensions)",
        config.encoder.kind,
        encoder.dimension()
    );

    Ok(encoder)
}

fn open_store(config: &Config, fingerprint: &str) -> anyhow::Result<Option<Arc<dyn EmbeddingStore>>> {
    if !config.embedding_store.enabled {
        return Ok(None);
    }

    let path = config.resolve(&config.embedding_store.path);
    let store = RocksDbStore::open(&path, fingerprint)
        .with_context(|| format!("failed to open embedding store at {}", path.display()))?;
    Ok(Some(Arc::new(store)))
}

fn open_query_cache(
    config: &Config,
    fingerprint: &str,
) -> anyhow::Result<Option<Arc<dyn EmbeddingStore>>> {
    let cache: Arc<dyn EmbeddingStore> = match config.query_cache.kind {
        QueryCacheKind::None => return Ok(None),
        QueryCacheKind::Memory => Arc::new(MemoryStore::new()),
        QueryCacheKind::Rocksdb => {
            let path = config.resolve(&config.query_cache.path);
            let cache = RocksDbStore::open(&path, fingerprint)
                .with_context(|| format!("failed to open query cache at {}", path.display()))?;
            Arc::new(cache)
        }
    };
    Ok(Some(cache))
}

fn build_handler(config: &Config, faq_config: &FaqConfig) -> anyhow::Result<FaqHandler> {
    let encoder = build_encoder(config)?;
    let fingerprint = encoder.fingerprint();

    let store = open_store(config, &fingerprint)?;
    let cache = open_query_cache(config, &fingerprint)?;

    let mut handler = FaqHandler::new(
        encoder,
        store,
        cache,
        config.hnsw.params(),
        config.hnsw.distance.distance_fn(),
        SeededRandom::new(config.hnsw.seed),
        config.ingest_mode(),
    );

    if let Some(threads) = config.encoder.parallelism()? {
        handler = handler.with_parallelism(threads)?;
    }

    if config.exact_match {
        let dictionary =
            ExactMatchDictionary::from_entries(faq_config.dict_entries(), config.strip_non_letters);
        log::info!("Exact match dictionary holds {} keys", dictionary.len());
        handler = handler.with_dictionary(dictionary);
    }

    handler
        .add_config(faq_config)
        .context("failed to index FAQ corpus")?;

    Ok(handler)
}

fn main() -> anyhow::Result<()> {
    init_logging();

    let args = cli::Args::parse();

    let config = Config::load_with(&args.config_dir)
        .with_context(|| format!("failed to load config from {}", args.config_dir.display()))?;
    let faq_config = faq::config_file::load(&config.faq_config_path())?;

    match args.command {
        cli::Command::Serve { listen } => {
            let handler = build_handler(&config, &faq_config)?;
            let listen_addr = listen.unwrap_or_else(|| config.listen_addr.clone());
            let state = web::SharedState::new(Arc::new(handler), Arc::new(faq_config));
            web::start_daemon(&listen_addr, state)
        }

        cli::Command::Search { question, count } => {
            let handler = build_handler(&config, &faq_config)?;
            let results = handler.search(&question, count)?;
            println!("{}", serde_json::to_string_pretty(&results)?);
            Ok(())
        }

        cli::Command::Config => {
            println!("{}", serde_json::to_string_pretty(&faq_config)?);
            Ok(())
        }
    }
}
