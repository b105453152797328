//! Quest map CLI
//!
//! Drives the quest backend headlessly through `GraphStore`.
//!
//! Usage:
//!   cargo run --features cli --bin quest_cli -- plan --goal "Ship v1" --situation "Prototype works"
//!   cargo run --features cli --bin quest_cli -- consult "What should I do first?"
//!   cargo run --features cli --bin quest_cli -- quests --refresh
//!
//! Configuration comes from `QUEST_*` environment variables (a `.env` file is
//! loaded if present).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use quest_map::{GraphStore, QuestMapConfig};

#[derive(Parser)]
#[command(name = "quest_cli")]
#[command(version = "0.1.0")]
#[command(about = "Create, plan and inspect quests against the quest backend")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Backend base URL (overrides QUEST_API_BASE_URL)
    #[arg(long, global = true, env = "QUEST_API_BASE_URL")]
    api_url: Option<String>,

    /// Compact JSON instead of pretty-printed
    #[arg(long, global = true)]
    compact: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a quest, generate its first nodes and print the graph
    Plan {
        #[arg(long)]
        goal: String,

        #[arg(long)]
        situation: String,

        /// Break the first CHOICE node down into sub-tasks as well
        #[arg(long)]
        breakdown: bool,
    },

    /// Ask the AI for advice
    Consult { question: String },

    /// List known quests
    Quests {
        /// Fetch the list from the backend instead of local state
        #[arg(long)]
        refresh: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = QuestMapConfig::from_env().context("invalid QUEST_* configuration")?;
    if let Some(url) = cli.api_url {
        config.api_base_url = url;
    }
    let store = GraphStore::from_config(&config).context("failed to initialise quest store")?;

    let output = match cli.command {
        Commands::Plan {
            goal,
            situation,
            breakdown,
        } => {
            let summary = store.create_quest(&goal, &situation).await?;
            store.generate_nodes().await?;
            if breakdown {
                let first_choice = store
                    .graph()
                    .nodes_of_type(quest_map::NodeType::Choice)
                    .next()
                    .map(|n| n.id.clone());
                if let Some(node_id) = first_choice {
                    store.breakdown_node(&node_id, None).await?;
                }
            }
            let engine = store.engine();
            let quest = engine
                .to_quest()
                .with_context(|| format!("quest {} has no session", summary.id))?;
            serde_json::to_value(&quest)?
        }
        Commands::Consult { question } => {
            let resp = store.consult_ai(&question).await?;
            serde_json::to_value(&resp)?
        }
        Commands::Quests { refresh } => {
            let quests = if refresh {
                store.list_quests().await?
            } else {
                store.quests()
            };
            serde_json::to_value(&quests)?
        }
    };

    let text = if cli.compact {
        serde_json::to_string(&output)?
    } else {
        serde_json::to_string_pretty(&output)?
    };
    println!("{}", text);
    Ok(())
}
