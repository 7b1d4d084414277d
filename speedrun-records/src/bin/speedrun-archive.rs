//! speedrun-archive: inspect archived speedrun records
//!
//! Reads the `speedrun-records/` tree of a world directory and the gzip
//! save-data blobs written for each player.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;
use uuid::Uuid;

use speedrun_records::codec;
use speedrun_records::{
    CoopRecordManager, DifficultyRegistry, FileArchive, RecordArchive, RecordSnapshot,
    SpeedrunConfig,
};

#[derive(Parser)]
#[command(name = "speedrun-archive")]
#[command(about = "Inspect archived item speedrun records")]
struct Cli {
    /// World directory holding `speedrun-records/`
    #[arg(short, long, env = "SPEEDRUN_WORLD_DIR", default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List a player's archived records
    List {
        /// Player UUID
        player: Uuid,
    },
    /// Print one archived record
    Show {
        /// Player UUID
        player: Uuid,
        /// Record UUID
        record: Uuid,
    },
    /// List coop records
    Coop,
    /// Decode a gzip save-data blob
    InspectBlob {
        /// Blob file
        path: PathBuf,
    },
    /// Validate a YAML config file
    CheckConfig {
        /// Config file
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("speedrun_records=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let archive = FileArchive::new(&cli.root);
    let difficulties = DifficultyRegistry::new();
    difficulties.finalize();

    match cli.command {
        Command::List { player } => {
            let snapshots = archive.snapshots(player).await?;
            if snapshots.is_empty() {
                println!("No archived records for {player}");
            }
            for snapshot in snapshots {
                println!("{snapshot}");
            }
        }
        Command::Show { player, record } => {
            let document = archive.read(player, record).await?;
            println!("{}", RecordSnapshot::from_json(&document)?);
            println!("{}", serde_json::to_string_pretty(&document)?);
        }
        Command::Coop => {
            let coops = CoopRecordManager::new();
            let dir = archive.coop_dir();
            let loaded = coops.load_dir(&dir, &difficulties).await?;
            info!(dir = %dir.display(), loaded, "Coop records read");
            let mut ids = coops.ids();
            ids.sort();
            for id in ids {
                if let Some(coop) = coops.get(&id) {
                    let snapshot = RecordSnapshot::from_json(&codec::coop_to_json(&coop)?)?;
                    println!("{snapshot} operators={}", coop.operators().len());
                }
            }
        }
        Command::InspectBlob { path } => {
            let bytes = tokio::fs::read(&path).await?;
            let value = codec::decode_blob(&bytes)?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Command::CheckConfig { path } => {
            let yaml = tokio::fs::read_to_string(&path).await?;
            let config = SpeedrunConfig::from_yaml(&yaml)?;
            println!("{}", config.to_yaml()?);
        }
    }

    Ok(())
}
