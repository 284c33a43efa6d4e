use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use server_api::{build_payload, resolve_snapshot};
use shared::{
    flags::{CueColor, Deck, FlagUniverse, HotcueType},
    protocol::ConfigState,
};
use storage::{Storage, TriggerStore};
use tracing_subscriber::EnvFilter;

/// Offline maintenance for the mapping database. Nothing here contacts the
/// orchestrator; run `POST /sync` on the server after an import.
#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/mappings.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every trigger with its actions.
    List,
    /// Write the configuration as JSON.
    Export {
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Replace the whole configuration with the contents of a JSON file.
    Import { file: PathBuf },
    /// Print the payload the orchestrator would receive.
    Payload,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url)
        .await
        .with_context(|| format!("failed to open '{}'", cli.database_url))?;

    match cli.command {
        Command::List => {
            for trigger in storage.list_triggers_with_actions().await? {
                println!(
                    "#{} {:?} match={} colors=[{}] types=[{}] decks=[{}] enabled={}",
                    trigger.id.0,
                    trigger.cue_name,
                    trigger.cue_match_type,
                    names::<CueColor>(trigger.cue_color),
                    names::<HotcueType>(trigger.hotcue_type),
                    names::<Deck>(trigger.decks),
                    trigger.enabled,
                );
                for action in &trigger.actions {
                    println!(
                        "    #{} {} {} {}",
                        action.id.0, action.app_id, action.action_type, action.action_args
                    );
                }
            }
        }
        Command::Export { out } => {
            let triggers = storage.list_triggers_with_actions().await?;
            let json = serde_json::to_string_pretty(&ConfigState::from_records(&triggers))?;
            match out {
                Some(path) => {
                    fs::write(&path, json)
                        .with_context(|| format!("failed to write '{}'", path.display()))?;
                    println!("exported {} triggers to {}", triggers.len(), path.display());
                }
                None => println!("{json}"),
            }
        }
        Command::Import { file } => {
            let raw = fs::read_to_string(&file)
                .with_context(|| format!("failed to read '{}'", file.display()))?;
            let state: ConfigState = serde_json::from_str(&raw)
                .with_context(|| format!("'{}' is not a configuration document", file.display()))?;
            let imported = storage.replace_all(resolve_snapshot(&state)?).await?;
            println!("{}", import_summary(imported));
        }
        Command::Payload => {
            let triggers = storage.list_triggers_with_actions().await?;
            println!("{}", serde_json::to_string_pretty(&build_payload(&triggers))?);
        }
    }

    Ok(())
}

fn names<F: FlagUniverse>(mask: u32) -> String {
    F::decode(mask)
        .into_iter()
        .map(F::name)
        .collect::<Vec<_>>()
        .join(",")
}

fn import_summary(imported: usize) -> String {
    format!(
        "imported {imported} triggers\n\
         the orchestrator was not updated; run POST /sync on the server to push this configuration"
    )
}
