use std::path::PathBuf;
use trilane::cli::{Cli, Commands, ConfigAction};
use trilane::config::{Config, ConfigValidator};
use trilane::context::{connect_store, AppContext};
use trilane::error::{Result, TrilaneError};
use trilane::indexing::read_corpus;
use trilane::retrieval::{SearchQuery, TenantFilter};
use trilane::service::{shutdown_signal, RetrievalService};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose);

    match cli.command {
        Commands::Index {
            corpus,
            max_documents,
        } => {
            cmd_index(cli.config, corpus, max_documents).await?;
        }
        Commands::Serve { listen } => {
            cmd_serve(cli.config, listen).await?;
        }
        Commands::Search {
            query,
            user_id,
            limit,
            json,
        } => {
            cmd_search(cli.config, query, user_id, limit, json).await?;
        }
        Commands::Health => {
            cmd_health(cli.config).await?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "trilane=debug" } else { "trilane=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt().with_env_filter(filter).with_target(false).init();
}

async fn cmd_index(
    config_path: Option<PathBuf>,
    corpus: Option<PathBuf>,
    max_documents: Option<usize>,
) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(corpus) = corpus {
        config.indexing.corpus_path = corpus;
    }
    if max_documents.is_some() {
        config.indexing.max_documents = max_documents;
    }

    let documents = read_corpus(&config.indexing.corpus_path, config.indexing.max_documents)?;

    let context = AppContext::from_config(config)?;
    let mut indexer = context.indexer();
    let report = indexer.run(documents).await?;

    println!("✓ Indexed {} documents", report.documents);
    println!("  Collection: {}", context.config.collection.name);
    println!("  Batches: {}", report.batches);
    println!("  Tenants: {}", report.tenants);
    println!("  Duration: {}ms", report.duration_ms);

    Ok(())
}

async fn cmd_serve(config_path: Option<PathBuf>, listen: Option<String>) -> Result<()> {
    let config = load_config(config_path)?;
    let listen_addr = listen.unwrap_or_else(|| config.service.listen_addr.clone());

    let context = AppContext::from_config(config)?;
    let service = RetrievalService::new(&context);
    service.run(&listen_addr, shutdown_signal()).await
}

async fn cmd_search(
    config_path: Option<PathBuf>,
    query: String,
    user_id: Option<String>,
    limit: Option<u64>,
    json: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let context = AppContext::from_config(config)?;
    let searcher = context.searcher();

    let query = SearchQuery {
        text: query,
        tenant: TenantFilter::from_option(user_id),
        prefetch_limit: None,
        final_limit: limit,
    };
    let result = searcher.search(&query).await?;

    if json {
        let output = serde_json::to_string_pretty(&result).map_err(|e| TrilaneError::Json {
            source: e,
            context: "Failed to serialize search results".to_string(),
        })?;
        println!("{}", output);
        return Ok(());
    }

    if result.is_empty() {
        println!("No results found for '{}'", query.text);
        return Ok(());
    }

    for (i, hit) in result.results.iter().enumerate() {
        let field = |name: &str| {
            hit.payload
                .get(name)
                .and_then(|v| v.as_str())
                .unwrap_or("N/A")
                .to_string()
        };
        println!("{}. ID: {}, Score: {:.4}", i + 1, hit.id, hit.score);
        println!("   Title: {}", field("title"));
        println!("   User ID: {}", field(&context.config.collection.tenant_field));
        println!("   Text: {}", field("text"));
    }

    Ok(())
}

async fn cmd_health(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;
    let store = connect_store(&config)?;

    match store.health().await {
        Ok(()) => {
            println!("✓ Storage engine reachable at {}", config.storage.url);
            Ok(())
        }
        Err(e) => {
            println!("✗ Storage engine unavailable: {}", e);
            Err(e)
        }
    }
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path)?;
            let output = toml::to_string_pretty(&config)?;
            println!("{}", output);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
            println!("  Collection: {}", config.collection.name);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| TrilaneError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'trilane config init' to create one."
        );
        let mut config = Config::default();
        config.apply_env_overrides()?;
        ConfigValidator::validate(&config)?;
        return Ok(config);
    }

    Config::load(&path)
}
