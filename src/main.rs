//! Command-line front end of the entity cloner.
//!
//! # Usage
//!
//! ```bash
//! # Duplicate post #1 with its files and relations
//! cargo run -- duplicate post 1
//!
//! # Duplicate onto another configured connection, without prompting
//! cargo run -- duplicate post 1 --to archive -y
//!
//! # Inspect a record and its cloneable relations
//! cargo run -- show post 1
//!
//! # Database operations on every configured connection
//! cargo run -- db check
//! cargo run -- db migrate
//! ```
//!
//! See [`entity_cloner::config`] for environment variables and
//! [`entity_cloner::manifest`] for the model manifest format.

use entity_cloner::application::services::ClonerService;
use entity_cloner::config::{self, Config};
use entity_cloner::domain::cloneable::ModelRegistry;
use entity_cloner::domain::entities::{ClonePhase, Record};
use entity_cloner::domain::repositories::{EntityStore, FileDuplicator};
use entity_cloner::error::CloneError;
use entity_cloner::infrastructure::events::BroadcastEventPublisher;
use entity_cloner::infrastructure::files::{LocalFileDuplicator, NullFileDuplicator};
use entity_cloner::infrastructure::persistence::{PgEntityStore, RelationCatalog};
use entity_cloner::manifest::Manifest;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use dialoguer::Confirm;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

/// Deep-copies persisted entities with their files and relations.
#[derive(Parser)]
#[command(name = "entity-cloner")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Duplicate an entity with its files and cloneable relations
    Duplicate {
        /// Entity type as declared in the model manifest
        entity_type: String,

        /// Identifier of the source entity
        id: i64,

        /// Save the whole clone tree on this connection
        #[arg(long)]
        to: Option<String>,

        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Show an entity and its cloneable relations
    Show {
        entity_type: String,

        id: i64,

        /// Connection to read from (default connection if omitted)
        #[arg(short, long)]
        connection: Option<String>,
    },

    /// Database operations
    Db {
        #[command(subcommand)]
        action: DbAction,
    },
}

#[derive(Subcommand)]
enum DbAction {
    /// Check every configured connection
    Check,

    /// Apply schema migrations on every configured connection
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = config::load_from_env().context("Invalid configuration")?;
    init_tracing(&config);
    config.print_summary();

    match cli.command {
        Commands::Duplicate {
            entity_type,
            id,
            to,
            yes,
        } => handle_duplicate(&config, &entity_type, id, to, yes).await?,
        Commands::Show {
            entity_type,
            id,
            connection,
        } => handle_show(&config, &entity_type, id, connection).await?,
        Commands::Db { action } => handle_db_action(&config, action).await?,
    }

    Ok(())
}

/// Logs go to stderr so command output stays clean on stdout.
fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if config.log_format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

async fn connect(name: &str, url: &str, config: &Config) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(config.db_connect_timeout))
        .connect(url)
        .await
        .with_context(|| format!("Failed to connect to '{}'", name))
}

/// Opens a pool for every configured connection.
async fn connect_store(config: &Config, catalog: RelationCatalog) -> Result<PgEntityStore> {
    let pool = connect(&config.default_connection, &config.database_url, config).await?;
    let mut store = PgEntityStore::new(pool, Arc::new(catalog))
        .with_default_connection(&config.default_connection);

    for (name, url) in &config.connections {
        let pool = connect(name, url, config).await?;
        store = store.with_connection(name, pool);
    }

    tracing::info!("Connected to {} connection(s)", config.connection_names().len());
    Ok(store)
}

async fn find_source(
    store: &PgEntityStore,
    entity_type: &str,
    id: i64,
    connection: Option<String>,
) -> Result<Record> {
    store
        .find(entity_type, id, connection)
        .await?
        .with_context(|| format!("{} #{} not found", entity_type, id))
}

/// Duplicates one entity with interactive confirmation.
///
/// # Flow
///
/// 1. Load the model manifest and connect every connection
/// 2. Load the source record and show what will be duplicated
/// 3. Confirm (unless `--yes` flag)
/// 4. Duplicate, counting `cloned:*` notifications
async fn handle_duplicate(
    config: &Config,
    entity_type: &str,
    id: i64,
    to: Option<String>,
    skip_confirm: bool,
) -> Result<()> {
    println!("{}", "Duplicate Entity".bright_blue().bold());
    println!();

    let models = Manifest::load(&config.models_path)?.build();
    let registry = Arc::new(models.registry);
    let model = registry.get(entity_type)?;

    if let Some(destination) = &to
        && !config.connection_names().contains(&destination.as_str())
    {
        anyhow::bail!("Unknown connection '{}'", destination);
    }

    let store = Arc::new(connect_store(config, models.catalog).await?);
    let source = find_source(&store, entity_type, id, None).await?;

    println!("  Source:    {}", source.label().cyan());
    println!(
        "  Target:    {}",
        to.as_deref()
            .unwrap_or(&config.default_connection)
            .bright_white()
    );
    println!(
        "  Relations: {}",
        model.cloneable_relations().names().join(", ").bright_black()
    );
    if to.is_some() {
        println!(
            "{}",
            "  Link-style relations are not copied across connections".yellow()
        );
    }
    println!();

    if !skip_confirm {
        let confirmed = Confirm::new()
            .with_prompt("Duplicate this entity?")
            .default(true)
            .interact()?;

        if !confirmed {
            println!("{}", "Cancelled".red());
            return Ok(());
        }
    }

    let events = Arc::new(BroadcastEventPublisher::new(config.event_channel_capacity));
    let mut receiver = events.subscribe();
    let counter = tokio::spawn(async move {
        let mut cloned = 0usize;
        loop {
            match receiver.recv().await {
                Ok(event) if event.phase == ClonePhase::Cloned => {
                    tracing::debug!("{} {}", event.name, event.clone.label());
                    cloned += 1;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Missed {} clone notifications", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
        cloned
    });

    let result = if config.files_enabled {
        let files = LocalFileDuplicator::new(&config.storage_root, &config.file_copy_suffix);
        run_duplicate(store, Arc::new(files), events, registry, &source, to.as_deref()).await
    } else {
        run_duplicate(
            store,
            Arc::new(NullFileDuplicator::new()),
            events,
            registry,
            &source,
            to.as_deref(),
        )
        .await
    };

    let entities = counter.await.unwrap_or_default();

    match result {
        Ok(clone) => {
            println!("{}", "Duplicated successfully!".green().bold());
            println!();
            println!("  Clone:    {}", clone.label().bright_yellow().bold());
            println!("  Entities: {}", entities.to_string().bright_white().bold());
            println!();
            Ok(())
        }
        Err(e) => {
            tracing::error!(code = e.code(), details = %e.details(), "Duplication failed: {}", e);
            println!("{}", "Duplication failed".red().bold());
            println!("  Reason:  {}", e.to_string().red());
            println!("  Details: {}", e.details().to_string().bright_black());
            println!(
                "  {}",
                format!("{} entities were saved before the failure", entities).yellow()
            );
            Err(e.into())
        }
    }
}

/// Builds the engine for one file duplicator and runs a single duplication.
///
/// The publisher is moved in so the notification channel closes when the
/// engine is dropped.
async fn run_duplicate<F: FileDuplicator>(
    store: Arc<PgEntityStore>,
    files: Arc<F>,
    events: Arc<BroadcastEventPublisher>,
    registry: Arc<ModelRegistry>,
    source: &Record,
    destination: Option<&str>,
) -> Result<Record, CloneError> {
    let cloner = ClonerService::new(store, files, events, registry);

    match destination {
        Some(destination) => cloner.duplicate_to(source, destination).await,
        None => cloner.duplicate(source).await,
    }
}

/// Prints a record's attributes and the size of each cloneable relation.
async fn handle_show(
    config: &Config,
    entity_type: &str,
    id: i64,
    connection: Option<String>,
) -> Result<()> {
    let models = Manifest::load(&config.models_path)?.build();
    let store = connect_store(config, models.catalog).await?;
    let record = find_source(&store, entity_type, id, connection).await?;

    println!("{}", record.label().bright_blue().bold());
    println!();

    if let Some(created_at) = record.created_at {
        println!(
            "  {:<20} {}",
            "created_at".bright_white(),
            created_at.format("%Y-%m-%d %H:%M").to_string().bright_black()
        );
    }
    for (name, value) in &record.attributes {
        println!("  {:<20} {}", name.bright_white(), value);
    }
    println!();

    let Ok(model) = models.registry.get(entity_type) else {
        println!("{}", "  Not declared in the model manifest".yellow());
        return Ok(());
    };

    for relation in model.cloneable_relations().names() {
        let loaded = store.load_relation(&record, &relation).await?;
        println!(
            "  {:<20} {:<6} {} member(s)",
            relation.cyan(),
            loaded.kind.as_str().bright_black(),
            loaded.members.len().to_string().bright_white().bold()
        );
    }
    println!();

    Ok(())
}

/// Handles database commands across every configured connection.
async fn handle_db_action(config: &Config, action: DbAction) -> Result<()> {
    let store = connect_store(config, RelationCatalog::new()).await?;

    match action {
        DbAction::Check => {
            println!("{}", "Checking connections...".bright_blue());

            let mut failed = 0;
            for (name, result) in store.check_connections().await {
                match result {
                    Ok(()) => println!("  {} {}", name.cyan(), "OK".green().bold()),
                    Err(e) => {
                        failed += 1;
                        println!("  {} {}", name.cyan(), e.to_string().red());
                    }
                }
            }

            if failed > 0 {
                anyhow::bail!("{} connection(s) failed", failed);
            }
            println!("{}", "All connections OK".green().bold());
        }
        DbAction::Migrate => {
            println!("{}", "Applying migrations...".bright_blue());

            store.migrate().await?;

            println!("{}", "Migrations applied".green().bold());
        }
    }

    Ok(())
}
