use std::{fs, path::PathBuf, sync::Arc};

use anyhow::{anyhow, bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::{Parser, Subcommand};
use shared::domain::{SessionId, WalkthroughSession};
use storage::{SessionCatalog, SqliteBackend, WalkthroughStore};

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/walkthrough.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the stored catalog as JSON.
    Dump {
        #[arg(long)]
        pretty: bool,
    },
    Stats,
    /// Replace the catalog with the contents of a JSON dump.
    Import {
        path: PathBuf,
    },
    PruneUploaded,
    /// Write every frame of a walkthrough to `out_dir` as an image file.
    ExportFrames {
        id: String,
        out_dir: PathBuf,
    },
    Reset {
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    let database_url = storage::prepare_database_url(&cli.database_url)?;
    let backend = SqliteBackend::new(&database_url).await?;
    backend.health_check().await?;
    let store = WalkthroughStore::open(Arc::new(backend)).await;

    match cli.command {
        Command::Dump { pretty } => {
            let catalog = SessionCatalog::new(store.sessions().await);
            let raw = if pretty {
                serde_json::to_string_pretty(&catalog)?
            } else {
                serde_json::to_string(&catalog)?
            };
            println!("{raw}");
        }
        Command::Stats => {
            let sessions = store.sessions().await;
            let uploaded = sessions.iter().filter(|s| s.is_uploaded).count();
            let frames: usize = sessions.iter().map(WalkthroughSession::frame_count).sum();
            let bytes: u64 = sessions.iter().map(|s| s.metadata.total_size).sum();
            println!(
                "walkthroughs={} uploaded={uploaded} frames={frames} bytes={bytes}",
                sessions.len()
            );
        }
        Command::Import { path } => {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let catalog: SessionCatalog = serde_json::from_str(&raw)
                .with_context(|| format!("{} is not a walkthrough catalog", path.display()))?;
            let count = catalog.sessions.len();
            store.replace_all(catalog.sessions).await;
            store.flush().await?;
            println!("imported {count} walkthroughs ({} kept)", store.len().await);
        }
        Command::PruneUploaded => {
            let mut pruned = 0;
            for session in store.sessions().await {
                if session.is_uploaded && store.delete_session(&session.id).await {
                    pruned += 1;
                }
            }
            store.flush().await?;
            println!("pruned {pruned} uploaded walkthroughs");
        }
        Command::ExportFrames { id, out_dir } => {
            let id = SessionId::from(id);
            let session = store
                .get_session(&id)
                .await
                .ok_or_else(|| anyhow!("walkthrough {id} not found"))?;
            fs::create_dir_all(&out_dir)
                .with_context(|| format!("failed to create {}", out_dir.display()))?;
            for (index, frame) in session.frames.iter().enumerate() {
                let (extension, bytes) = decode_data_uri(&frame.image_data)
                    .with_context(|| format!("frame {} has an unreadable payload", frame.id))?;
                let path = out_dir.join(format!("{index:02}-{}.{extension}", frame.id));
                fs::write(&path, bytes)
                    .with_context(|| format!("failed to write {}", path.display()))?;
            }
            println!("exported {} frames to {}", session.frame_count(), out_dir.display());
        }
        Command::Reset { yes } => {
            if !yes {
                bail!("refusing to wipe the store without --yes");
            }
            store.clear().await;
            println!("store cleared");
        }
    }

    Ok(())
}

/// Splits `data:<mime>;base64,<payload>` into a file extension and raw bytes.
fn decode_data_uri(uri: &str) -> Result<(&'static str, Vec<u8>)> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| anyhow!("not a data uri"))?;
    let (mime, payload) = rest
        .split_once(";base64,")
        .ok_or_else(|| anyhow!("data uri is not base64 encoded"))?;
    let extension = match mime {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/svg+xml" => "svg",
        _ => "bin",
    };
    let bytes = STANDARD
        .decode(payload)
        .map_err(|e| anyhow!("invalid base64 payload: {e}"))?;
    Ok((extension, bytes))
}
