use std::{fs, path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use persistence::{PersistenceCoordinator, PersistenceDeps, SessionAction};
use shared::{
    domain::{EventId, GameId},
    snapshot::GameSnapshot,
    store::GameStore,
};
use storage::Storage;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;

use config::{load_settings, normalize_database_url};

#[derive(Parser, Debug)]
#[command(name = "coach-tools", about = "Inspect and edit saved coaching games")]
struct Cli {
    /// Overrides the configured database url.
    #[arg(long)]
    database_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List saved game ids with team and score.
    List,
    /// Print one saved game as JSON.
    Show { id: String },
    /// Quick-save a snapshot file, as a new game unless `--id` names one.
    Save {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        id: Option<String>,
    },
    Delete { id: String },
    DeleteEvent { game_id: String, event_id: String },
    /// Print the id of the most recently created game.
    Latest,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut settings = load_settings();
    if let Some(url) = cli.database_url {
        settings.database_url = url;
    }
    let database_url = normalize_database_url(&settings.database_url);
    info!(%database_url, "opening game store");

    let storage = Storage::new(&database_url)
        .await
        .with_context(|| format!("failed to open database '{database_url}'"))?;
    let store = Arc::new(storage.clone());
    let deps = PersistenceDeps::new(store.clone(), store);
    let current_game_id = Arc::clone(&deps.current_game_id);
    let coordinator = PersistenceCoordinator::new(deps, settings.autosave);
    coordinator.initialize().await?;
    // One-shot commands save explicitly.
    coordinator.set_autosave_enabled(false).await;

    match cli.command {
        Command::List => {
            let table = coordinator.saved_games();
            for (id, game) in table.read().await.iter() {
                println!(
                    "{id}\t{} {}-{} {}",
                    game.team_name, game.home_score, game.away_score, game.opponent_name
                );
            }
        }
        Command::Show { id } => {
            let Some(game) = storage.load_game(&GameId::new(id.as_str())).await? else {
                bail!("no saved game with id '{id}'");
            };
            println!("{}", serde_json::to_string_pretty(&game)?);
        }
        Command::Save { file, id } => {
            let raw = fs::read_to_string(&file)
                .with_context(|| format!("failed to read '{}'", file.display()))?;
            let snapshot: GameSnapshot = serde_json::from_str(&raw)
                .with_context(|| format!("'{}' is not a game snapshot", file.display()))?;
            match id {
                // Unknown ids are reported as not found rather than created.
                Some(id) => coordinator.load_game(&GameId::from(id)).await?,
                None => *current_game_id.write().await = GameId::default_game(),
            }
            coordinator
                .dispatch(SessionAction::LoadPersistedState(Box::new(snapshot)))
                .await;
            let saved = coordinator.quick_save(true).await?;
            println!("saved {saved}");
        }
        Command::Delete { id } => {
            let deleted = coordinator.delete_game(&GameId::from(id)).await?;
            println!("deleted {deleted}");
        }
        Command::DeleteEvent { game_id, event_id } => {
            coordinator.load_game(&GameId::from(game_id)).await?;
            if !coordinator.delete_game_event(&EventId::from(event_id.as_str())).await {
                bail!("event '{event_id}' could not be removed");
            }
            println!("removed event {event_id}");
        }
        Command::Latest => {
            let table = coordinator.saved_games();
            match storage.latest_id(&*table.read().await) {
                Some(id) => println!("{id}"),
                None => println!("no saved games"),
            };
        }
    }

    coordinator.shutdown();
    Ok(())
}
