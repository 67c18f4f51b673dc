use flowscope::analyzer::{AnalysisRequest, Analyzer};
use flowscope::assembler::AnalysisResponse;
use flowscope::cli::{Cli, Commands, ConfigAction};
use flowscope::config::{expand_tilde, Config};
use flowscope::error::{FlowscopeError, Result};
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    init_logging(cli.verbose);

    match cli.command {
        Commands::Ask {
            question,
            analysis_type,
            sources,
            limit,
            user,
            json,
        } => {
            let request = AnalysisRequest::new(question, user)
                .with_type(analysis_type.into())
                .with_sources(sources)
                .with_max_results(limit);
            cmd_ask(cli.config, request, json).await?;
        }
        Commands::Classify { question } => {
            cmd_classify(cli.config, &question).await?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "flowscope=debug" } else { "flowscope=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn cmd_ask(config_path: Option<PathBuf>, request: AnalysisRequest, json: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let analyzer = Analyzer::from_config(&config)?;

    let response = analyzer.analyze(request).await;

    if json {
        let body = serde_json::to_string_pretty(&response).map_err(|e| FlowscopeError::Json {
            source: e,
            context: "Failed to serialize response".to_string(),
        })?;
        println!("{}", body);
    } else {
        print_response(&response);
    }

    if !response.success {
        std::process::exit(1);
    }
    Ok(())
}

fn print_response(response: &AnalysisResponse) {
    match &response.error {
        Some(error) => println!("✗ {}", error),
        None => println!("{}", response.result_text),
    }

    println!();
    println!(
        "  Type: {}  Adapters: {}  Time: {:.3}s",
        response.query_type,
        if response.adapters_used.is_empty() {
            "-".to_string()
        } else {
            response.adapters_used.join(", ")
        },
        response.processing_time
    );
    if let Some(tier) = &response.cache_hit {
        println!("  Cache: {}", tier);
    }
    if let Some(collections) = &response.collections_used {
        println!("  Collections: {}", collections.join(", "));
    }

    if let Some(sources) = &response.source_documents {
        println!("\nSources:");
        for (i, doc) in sources.iter().enumerate() {
            let origin = match &doc.collection {
                Some(collection) => format!("{}/{}", doc.source, collection),
                None => doc.source.clone(),
            };
            println!("  [{}] {} ({}): {}", i + 1, origin, doc.data_type, doc.content);
        }
    }
}

async fn cmd_classify(config_path: Option<PathBuf>, question: &str) -> Result<()> {
    let config = load_config(config_path)?;
    let analyzer = Analyzer::from_config(&config)?;

    println!("{}", analyzer.classify(question).await);
    Ok(())
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path)?;
            let rendered = toml::to_string_pretty(&config)?;
            println!("{}", rendered);
        }
        ConfigAction::Validate { file } => {
            let path = resolve_path(file.or(config_path))?;
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
            println!("  Patterns: {}", config.patterns.len());
        }
        ConfigAction::Init { force } => {
            let path = resolve_path(config_path)?;

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| FlowscopeError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
        ConfigAction::Path => {
            println!("{}", resolve_path(config_path)?.display());
        }
    }

    Ok(())
}

fn resolve_path(config_path: Option<PathBuf>) -> Result<PathBuf> {
    match config_path {
        Some(path) => Ok(expand_tilde(&path)),
        None => Config::default_path(),
    }
}

fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    let path = resolve_path(config_path)?;

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'flowscope config init' to create one."
        );
        let mut config = Config::default();
        config.apply_env_overrides();
        return Ok(config);
    }

    Config::load(&path)
}
