use std::{path::PathBuf, sync::Arc};

use anyhow::{anyhow, bail, Context, Result};
use capture_core::{
    build_camera, device_info, finalize_session, AutoCapture, CaptureSessionManager,
    ConnectivityProbe, HttpProbe, LogHaptics, Navigator, NetworkStatusObserver, PlaybackSession,
    PlaybackSpeed, Screen, SessionDetails, StaticProbe, Uploader, DEFAULT_PROBE_TIMEOUT,
};
use clap::{Parser, Subcommand};
use shared::{
    domain::{NetworkStatus, SessionId, SessionPatch, WalkthroughSession},
    error::Notice,
    events::{CaptureEvent, UploadEvent},
};
use storage::{SqliteBackend, WalkthroughStore};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_stream::{wrappers::WatchStream, StreamExt};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::{load_settings, prepare_database_url, Settings};

#[derive(Parser, Debug)]
#[command(name = "walkthrough", about = "Capture and review frame-by-frame walkthroughs")]
struct Cli {
    /// Path to a walkthrough.toml; defaults to ./walkthrough.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    database_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record a new walkthrough; ctrl-c stops early and keeps what was captured.
    Capture {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        cadence_ms: Option<u64>,
    },
    List,
    Show {
        id: String,
    },
    Play {
        id: String,
        #[arg(long, default_value_t = 1_000)]
        speed_ms: u64,
        #[arg(long, default_value_t = 0)]
        start: usize,
    },
    Upload {
        id: String,
    },
    Rename {
        id: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: Option<String>,
    },
    Delete {
        id: String,
    },
    Network {
        #[arg(long)]
        watch: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut settings = load_settings(cli.config.as_deref());
    if let Some(database_url) = cli.database_url {
        settings.database_url = database_url;
    }

    match cli.command {
        Command::Capture {
            title,
            description,
            cadence_ms,
        } => {
            if let Some(cadence_ms) = cadence_ms {
                settings.capture_cadence_ms = cadence_ms;
            }
            let store = open_store(&settings).await?;
            run_capture(&settings, &store, title, description).await?;
        }
        Command::List => {
            let store = open_store(&settings).await?;
            let sessions = store.sessions().await;
            if sessions.is_empty() {
                println!("no walkthroughs yet");
            }
            for session in &sessions {
                println!(
                    "{}\t{}\t{} frames\t{}",
                    session.id,
                    session.title,
                    session.frame_count(),
                    upload_status(session)
                );
            }
        }
        Command::Show { id } => {
            let store = open_store(&settings).await?;
            let session = find_session(&store, &SessionId::from(id)).await?;
            print_session(&session);
        }
        Command::Play {
            id,
            speed_ms,
            start,
        } => {
            let speed = PlaybackSpeed::try_from(speed_ms)?;
            let store = open_store(&settings).await?;
            let session = find_session(&store, &SessionId::from(id)).await?;
            run_playback(session, speed, start).await?;
        }
        Command::Upload { id } => {
            let store = open_store(&settings).await?;
            run_upload(&settings, &store, SessionId::from(id)).await?;
        }
        Command::Rename {
            id,
            title,
            description,
        } => {
            let store = open_store(&settings).await?;
            let id = SessionId::from(id);
            let patch = SessionPatch {
                title: Some(title),
                description,
                ..SessionPatch::default()
            };
            if !store.update_session(&id, patch).await {
                bail!("walkthrough {id} not found");
            }
            store.flush().await?;
            println!("updated {id}");
        }
        Command::Delete { id } => {
            let store = open_store(&settings).await?;
            let id = SessionId::from(id);
            if !store.delete_session(&id).await {
                bail!("walkthrough {id} not found");
            }
            store.flush().await?;
            println!("deleted {id}");
        }
        Command::Network { watch } => run_network(&settings, watch).await?,
    }

    Ok(())
}

async fn open_store(settings: &Settings) -> Result<WalkthroughStore> {
    let database_url = prepare_database_url(&settings.database_url)?;
    let backend = SqliteBackend::new(&database_url).await?;
    info!("store: using {database_url}");
    Ok(WalkthroughStore::open(Arc::new(backend)).await)
}

async fn find_session(store: &WalkthroughStore, id: &SessionId) -> Result<WalkthroughSession> {
    store
        .get_session(id)
        .await
        .ok_or_else(|| anyhow!("walkthrough {id} not found"))
}

async fn run_capture(
    settings: &Settings,
    store: &WalkthroughStore,
    title: String,
    description: String,
) -> Result<()> {
    let mut nav = Navigator::default();
    let camera = build_camera(&settings.camera);
    let device = device_info(camera.as_ref());
    let mut manager = CaptureSessionManager::new(camera, Arc::new(LogHaptics));
    let id = manager.start_capture_session()?;
    nav.start_capture()?;
    let manager = Arc::new(Mutex::new(manager));

    let (tx, mut rx) = mpsc::unbounded_channel();
    let ticker = AutoCapture::start(
        Arc::clone(&manager),
        id.clone(),
        settings.capture_cadence(),
        tx,
    );
    println!(
        "capturing {id} every {} ms, ctrl-c to stop early",
        settings.capture_cadence_ms
    );

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let completed = loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(CaptureEvent::FrameCaptured { frame_id, current_step, total_steps, .. }) => {
                    println!("frame {current_step}/{total_steps} {frame_id}");
                }
                Some(CaptureEvent::CaptureFailed { notice, .. }) => {
                    eprintln!("capture failed, retrying: {}", notice.message);
                }
                Some(CaptureEvent::Completed { session }) => break Some(session),
                None => break None,
            },
            _ = &mut ctrl_c => {
                info!("capture: interrupted id={id}");
                break None;
            }
        }
    };
    let capture = match completed {
        Some(session) => session,
        None => ticker
            .finish(&manager, &mut rx)
            .await
            .ok_or_else(|| anyhow!("capture session {id} was lost"))?,
    };

    nav.capture_finished(capture.frames.len())?;
    if nav.current() != &Screen::Description {
        println!("no frames captured, discarding {id}");
        return Ok(());
    }

    match finalize_session(capture, SessionDetails::new(title, description), &device) {
        Ok(session) => {
            let frames = session.frame_count();
            store.add_session(session).await;
            store.flush().await?;
            nav.description_saved()?;
            println!("saved {id} ({frames} frames)");
        }
        Err(err) => {
            nav.description_cancelled()?;
            println!("discarded {id}: {}", Notice::from(&err).message);
        }
    }
    Ok(())
}

async fn run_playback(session: WalkthroughSession, speed: PlaybackSpeed, start: usize) -> Result<()> {
    let mut playback = PlaybackSession::new(session);
    playback.seek(start).await;
    playback.set_speed(speed).await;
    let mut updates = playback.subscribe();
    if !playback.set_playing(true).await {
        println!("nothing to play");
        return Ok(());
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        let snapshot = *updates.borrow_and_update();
        if let Some(frame) = playback.current_frame().await {
            println!(
                "frame {}/{} ({:.0}%) {}",
                snapshot.frame_index + 1,
                snapshot.frame_count,
                snapshot.progress,
                frame.id
            );
        }
        if !snapshot.is_playing {
            break;
        }
        tokio::select! {
            changed = updates.changed() => changed.context("playback ended unexpectedly")?,
            _ = &mut ctrl_c => {
                playback.stop().await;
                break;
            }
        }
    }
    Ok(())
}

async fn run_upload(settings: &Settings, store: &WalkthroughStore, id: SessionId) -> Result<()> {
    let probe = connectivity_probe(settings)?;
    let network = NetworkStatusObserver::default();
    network.refresh(probe.as_ref()).await;
    let _poller = network.start_polling(probe, settings.network_poll_period());
    let _offline_warning = network.add_listener(|status| {
        if !status.is_connected {
            warn!("upload: connection lost while uploading");
        }
    });

    let uploader = Uploader::new(store.clone(), network, settings.upload_delay());
    let mut events = uploader.subscribe_events();
    let mut handle = uploader.upload(&id).await?;

    loop {
        tokio::select! {
            biased;
            event = events.recv() => match event {
                Ok(UploadEvent::Progress { percent, .. }) => println!("uploading {id}: {percent}%"),
                Ok(UploadEvent::Finished { .. }) => println!("uploaded {id}"),
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            },
            result = &mut handle => {
                result.context("upload task failed")?;
                break;
            }
        }
    }
    store.flush().await
}

async fn run_network(settings: &Settings, watch: bool) -> Result<()> {
    let probe = connectivity_probe(settings)?;
    let network = NetworkStatusObserver::default();
    let status = network.refresh(probe.as_ref()).await;
    if !watch {
        println!("{}", describe_network(status));
        return Ok(());
    }

    let _poller = network.start_polling(probe, settings.network_poll_period());
    let mut statuses = WatchStream::new(network.subscribe());
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            Some(status) = statuses.next() => println!("{}", describe_network(status)),
            _ = &mut ctrl_c => break,
        }
    }
    Ok(())
}

fn connectivity_probe(settings: &Settings) -> Result<Arc<dyn ConnectivityProbe>> {
    match &settings.network_probe_url {
        Some(url) => Ok(Arc::new(HttpProbe::parse(url, DEFAULT_PROBE_TIMEOUT)?)),
        None => Ok(Arc::new(StaticProbe(NetworkStatus::default()))),
    }
}

fn describe_network(status: NetworkStatus) -> String {
    if status.is_connected {
        format!("online ({:?})", status.connection_type).to_lowercase()
    } else {
        "offline".into()
    }
}

fn upload_status(session: &WalkthroughSession) -> String {
    match (session.is_uploaded, session.upload_progress) {
        (true, _) => "uploaded".into(),
        (false, Some(progress)) => format!("uploading {progress}%"),
        (false, None) => "local".into(),
    }
}

fn print_session(session: &WalkthroughSession) {
    println!("id:          {}", session.id);
    println!("title:       {}", session.title);
    if !session.description.is_empty() {
        println!("description: {}", session.description);
    }
    println!("created:     {}", session.created_at.to_rfc3339());
    println!("updated:     {}", session.updated_at.to_rfc3339());
    println!("status:      {}", upload_status(session));
    println!(
        "frames:      {} over {} ms, {} bytes",
        session.metadata.total_frames, session.metadata.duration_ms, session.metadata.total_size
    );
    println!("device:      {}", session.metadata.device_info);
    if let Some(location) = &session.location {
        println!("location:    {}, {}", location.latitude, location.longitude);
    }
    for (index, frame) in session.frames.iter().enumerate() {
        println!(
            "  #{index:<2} {}  t={}  {} bytes",
            frame.id,
            frame.timestamp,
            frame.payload_size()
        );
    }
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
