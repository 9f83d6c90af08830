//! studyplan-sync CLI entry point

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::path::PathBuf;
use studyplan_sync::{
    commands::{
        cmd_apply, cmd_init, cmd_list_items, cmd_list_plans, cmd_list_tasks, cmd_load_catalog,
        cmd_resync, cmd_status, print_catalog_stats, print_init, print_items, print_plans,
        print_run, print_status, print_tasks, read_event, InitOptions,
    },
    config::Config,
    error::{Error, Result},
    meta::Store,
};
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "studyplan-sync")]
#[command(version, about = "Propagates learning content into master and copy study plans", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration and database
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Manage the content catalog
    Catalog {
        #[command(subcommand)]
        action: CatalogAction,
    },

    /// Apply an event (content_units_created or schedule_import) from a JSON file
    Apply {
        /// Path to the event file, or '-' for stdin
        path: PathBuf,
    },

    /// Re-propagate every learning objective and assignment of a book
    Resync {
        /// Book ID
        book_id: String,
    },

    /// List study plans
    Plans,

    /// List the items of a study plan in reading order
    Items {
        /// Study plan ID
        study_plan_id: String,
    },

    /// Show recent sync tasks
    Tasks {
        /// Maximum number of tasks
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },

    /// Show system status
    Status,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum CatalogAction {
    /// Load books, content units and study plans from a JSON fixture
    Load {
        /// Path to the fixture file
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let (json_layer, text_layer) = if cli.log_json {
        (Some(fmt::layer().json().with_writer(std::io::stderr)), None)
    } else {
        (None, Some(fmt::layer().with_writer(std::io::stderr)))
    };

    tracing_subscriber::registry()
        .with(json_layer)
        .with(text_layer)
        .with(filter)
        .init();

    // Handle init command specially (doesn't need existing config)
    if matches!(cli.command, Commands::Init { .. }) {
        return handle_init(cli).await;
    }

    // Handle completions command (doesn't need config/db)
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "studyplan-sync", &mut std::io::stdout());
        return Ok(());
    }

    let config = load_config(cli.config.as_deref())?;
    let store = Store::connect(&config).await?;
    if !store.is_initialized().await? {
        return Err(Error::NotInitialized);
    }

    match cli.command {
        Commands::Init { .. } | Commands::Completions { .. } => unreachable!(),

        Commands::Catalog {
            action: CatalogAction::Load { path },
        } => {
            let stats = cmd_load_catalog(&store, &path).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print_catalog_stats(&stats);
            }
        }

        Commands::Apply { path } => {
            let event = read_event(&path)?;
            let run = cmd_apply(&config, &store, &event).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&run)?);
            } else {
                print_run(&run);
            }
        }

        Commands::Resync { book_id } => {
            let run = cmd_resync(&config, &store, &book_id).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&run)?);
            } else {
                print_run(&run);
            }
        }

        Commands::Plans => {
            let plans = cmd_list_plans(&store).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&plans)?);
            } else {
                print_plans(&plans);
            }
        }

        Commands::Items { study_plan_id } => {
            let listing = cmd_list_items(&store, &study_plan_id).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&listing)?);
            } else {
                print_items(&listing);
            }
        }

        Commands::Tasks { limit } => {
            let tasks = cmd_list_tasks(&store, limit).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&tasks)?);
            } else {
                print_tasks(&tasks);
            }
        }

        Commands::Status => {
            let status = cmd_status(&config, &store).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
        }
    }

    Ok(())
}

async fn handle_init(cli: Cli) -> Result<()> {
    let Commands::Init { force } = cli.command else {
        unreachable!()
    };

    // A .toml path names the config file itself; any other path is a directory
    let (base_dir, config_path) = match cli.config {
        Some(path) if path.extension().is_some_and(|e| e == "toml") => {
            let base = path
                .parent()
                .map(PathBuf::from)
                .unwrap_or_else(Config::default_base_dir);
            (base, path)
        }
        Some(dir) => (dir.clone(), dir.join("config.toml")),
        None => {
            let base = Config::default_base_dir();
            (base.clone(), base.join("config.toml"))
        }
    };

    let outcome = cmd_init(InitOptions {
        base_dir,
        config_path,
        force,
    })
    .await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_init(&outcome);
    }

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let config_path = path
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_config_path);

    if !config_path.exists() {
        return Err(Error::NotInitialized);
    }

    Config::load(&config_path)
}
