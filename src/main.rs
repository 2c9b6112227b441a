//! Docspace - revision and generation-lifecycle engine
//!
//! Command-line access to a project's module revisions: list, inspect,
//! generate, rename, duplicate, delete and save content as revisions.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docspace::{
    config::{DocspaceConfig, StorageBackend},
    Content, FilePersistence, GenerationOptions, GenerationScope, HttpGeneratorClient,
    InMemoryPersistence, ModuleKind, ModuleRegistry, PersistenceGateway,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "docspace")]
#[command(author = "Docspace Team")]
#[command(version)]
#[command(about = "Revision and generation-lifecycle engine for study modules")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "DOCSPACE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List module kinds
    Modules,

    /// List a module's revisions
    List {
        #[arg(short, long)]
        module: ModuleKind,
    },

    /// Print a revision's content (baseline when no revision is given)
    Show {
        #[arg(short, long)]
        module: ModuleKind,

        #[arg(short, long)]
        revision: Option<String>,
    },

    /// Generate new content for a module
    Generate {
        #[arg(short, long)]
        module: ModuleKind,

        /// `all`, `pages:<start>-<end>` or `topics:<id>,<id>`
        #[arg(short, long, default_value = "all")]
        scope: GenerationScope,
    },

    /// Rename a revision
    Rename {
        #[arg(short, long)]
        module: ModuleKind,

        #[arg(short, long)]
        revision: String,

        #[arg(short, long)]
        label: String,
    },

    /// Delete a revision
    Delete {
        #[arg(short, long)]
        module: ModuleKind,

        #[arg(short, long)]
        revision: String,
    },

    /// Copy a revision into a new one
    Duplicate {
        #[arg(short, long)]
        module: ModuleKind,

        #[arg(short, long)]
        revision: String,
    },

    /// Save a JSON file as a new manual revision
    Save {
        #[arg(short, long)]
        module: ModuleKind,

        #[arg(short, long)]
        label: String,

        /// JSON file holding the content
        #[arg(long)]
        content_file: PathBuf,
    },

    /// Show configuration
    Config {
        /// Show default configuration
        #[arg(long)]
        default: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match &cli.config {
        Some(path) => DocspaceConfig::from_file(path)?,
        None => DocspaceConfig::default(),
    };

    init_logging(&config, cli.verbose);

    match cli.command {
        Commands::Modules => {
            list_modules();
        }
        Commands::Config { default } => {
            show_config(if default { None } else { Some(&config) })?;
        }
        command => {
            let registry = build_registry(&config).await?;
            run_command(&registry, command).await?;
        }
    }

    Ok(())
}

fn init_logging(config: &DocspaceConfig, verbose: bool) {
    let log_level = if verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("docspace={}", log_level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn build_registry(config: &DocspaceConfig) -> Result<ModuleRegistry> {
    let persistence: Arc<dyn PersistenceGateway> = match config.storage.backend {
        StorageBackend::Memory => Arc::new(InMemoryPersistence::new()),
        StorageBackend::File => {
            let dir = config.storage.resolved_dir();
            tracing::debug!(dir = %dir.display(), "Using file storage");
            Arc::new(FilePersistence::new(dir).await?)
        }
    };

    let mut client = HttpGeneratorClient::new(config.generation.endpoint.clone());
    if let Some(file_id) = &config.generation.file_id {
        client = client.with_file_id(file_id.clone());
    }

    let options = GenerationOptions {
        timeout: config.generation.timeout(),
        label_prefix: config.generation.label_prefix.clone(),
    };
    Ok(ModuleRegistry::with_options(
        persistence,
        Arc::new(client),
        options,
    ))
}

async fn run_command(registry: &ModuleRegistry, command: Commands) -> Result<()> {
    match command {
        Commands::List { module } => {
            registry.hydrate(module).await?;
            let revisions = registry.list_revisions(module).await?;
            if revisions.is_empty() {
                println!("No revisions for {}", module);
            }
            for revision in revisions {
                let created = chrono::DateTime::from_timestamp_millis(revision.created_at)
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default();
                println!(
                    "{}  {:<11} {}  {}",
                    revision.id,
                    revision.origin.to_string(),
                    created,
                    revision.label
                );
            }
        }
        Commands::Show { module, revision } => {
            registry.hydrate(module).await?;
            match registry.switch_revision(module, revision.as_deref()).await? {
                Some(content) => print_content(&content)?,
                None => println!("No baseline content for {}", module),
            }
        }
        Commands::Generate { module, scope } => {
            registry.hydrate(module).await?;
            let task = registry.spawn_generate(module, scope)?;
            tokio::select! {
                result = task => {
                    let revision = result.context("generation task failed")??;
                    println!("Created {} ({})", revision.label, revision.id);
                }
                _ = tokio::signal::ctrl_c() => {
                    registry.teardown_all().await?;
                    println!("Generation cancelled");
                }
            }
        }
        Commands::Rename {
            module,
            revision,
            label,
        } => {
            registry.hydrate(module).await?;
            let renamed = registry.rename_revision(module, &revision, &label).await?;
            println!("Renamed {} to {}", renamed.id, renamed.label);
        }
        Commands::Delete { module, revision } => {
            registry.hydrate(module).await?;
            registry.delete_revision(module, &revision).await?;
            println!("Deleted {}", revision);
        }
        Commands::Duplicate { module, revision } => {
            registry.hydrate(module).await?;
            let copy = registry.duplicate_revision(module, &revision).await?;
            println!("Created {} ({})", copy.label, copy.id);
        }
        Commands::Save {
            module,
            label,
            content_file,
        } => {
            let raw = tokio::fs::read_to_string(&content_file)
                .await
                .with_context(|| format!("failed to read {}", content_file.display()))?;
            let content: Content = serde_json::from_str(&raw)
                .with_context(|| format!("{} is not valid JSON", content_file.display()))?;

            registry.hydrate(module).await?;
            registry.record_edit(module, content).await?;
            let revision = registry.promote_draft(module, &label).await?;
            println!("Saved {} ({})", revision.label, revision.id);
        }
        Commands::Modules | Commands::Config { .. } => {}
    }
    Ok(())
}

fn list_modules() {
    for module in ModuleKind::ALL {
        let kind = if module.is_generated() {
            "generated"
        } else {
            "manual"
        };
        println!("{:<11} {:<11} {}", module.to_string(), kind, module.title());
    }
}

fn print_content(content: &Content) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(content)?);
    Ok(())
}

fn show_config(config: Option<&DocspaceConfig>) -> Result<()> {
    let config = config.cloned().unwrap_or_default();
    println!("{}", config.to_toml()?);
    Ok(())
}
