use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use music_player_core::{
    format_time,
    media::sim::{SimulatedMedia, SimulatedPlatform},
    AppConfig, MediaElementId, MusicPlayer, Playlist, RecordingCanvas, UserAction,
};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

/// Virtual time step of the simulated host loop.
const STEP_MS: f64 = 10.0;
const SIMULATED_TRACK_SECONDS: f64 = 12.0;

#[tokio::main(flavor = "current_thread")]
async fn main() -> music_player_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Catalog => {
            print_catalog();
            Ok(())
        }
        Commands::Simulate {
            script,
            config,
            output,
            seconds,
        } => run_simulation(script.as_deref(), config.as_deref(), output.as_deref(), seconds).await,
    }
}

fn print_catalog() {
    for (index, song) in Playlist::catalog().songs().iter().enumerate() {
        println!("{:>2}. {} / {} ({})", index + 1, song.title, song.artist, song.source_url);
    }
}

/// One timed entry of a session script.
#[derive(Debug, Deserialize)]
struct ScriptStep {
    at_ms: f64,
    #[serde(flatten)]
    action: UserAction,
}

async fn run_simulation(
    script: Option<&Path>,
    config: Option<&Path>,
    output: Option<&Path>,
    seconds: f64,
) -> music_player_core::Result<()> {
    let config = match config {
        Some(path) => AppConfig::from_json_file(path)?,
        None => AppConfig::default(),
    };
    let mut steps = match script {
        Some(path) => serde_json::from_str::<Vec<ScriptStep>>(&std::fs::read_to_string(path)?)?,
        None => demo_script(),
    };
    steps.sort_by(|a, b| a.at_ms.total_cmp(&b.at_ms));
    tracing::info!(steps = steps.len(), seconds, "starting simulated session");

    let playlist = Playlist::catalog();
    let media = playlist.songs().iter().fold(
        SimulatedMedia::new(MediaElementId(1)),
        |media, song| media.with_duration(&song.source_url, SIMULATED_TRACK_SECONDS),
    );
    let mut platform = SimulatedPlatform::new().with_gesture_policy(true);
    platform.attach(&media);
    let canvas = RecordingCanvas::new(
        config.visualizer.canvas_width,
        config.visualizer.canvas_height,
    )
    .with_capacity_limit(2_000);

    let mut player =
        MusicPlayer::mount(config, playlist, media.clone(), Box::new(platform), canvas);

    let end_ms = seconds.max(0.0) * 1000.0;
    let mut pending = steps.into_iter().peekable();
    let mut last = player.snapshot();
    let mut now_ms = 0.0;

    while now_ms <= end_ms {
        while let Some(step) = pending.next_if(|step| step.at_ms <= now_ms) {
            tracing::info!(at_ms = step.at_ms, action = ?step.action, "dispatching");
            if let Err(err) = player.dispatch(step.action).await {
                tracing::warn!(error = %err, "action rejected");
            }
        }

        media.advance(STEP_MS / 1000.0);
        player.tick(now_ms).await;

        let snapshot = player.snapshot();
        if snapshot.playback.current_index != last.playback.current_index
            || snapshot.playback.is_playing != last.playback.is_playing
            || snapshot.view != last.view
            || snapshot.visualizing != last.visualizing
        {
            tracing::info!(
                title = %snapshot.title,
                playing = snapshot.playback.is_playing,
                mode = snapshot.playback.play_mode.label(),
                position = %format_time(snapshot.playback.current_time),
                expanded = snapshot.view.is_expanded,
                fullscreen = snapshot.view.is_fully_expanded,
                visualizing = snapshot.visualizing,
                "state changed"
            );
        }
        last = snapshot;
        now_ms += STEP_MS;
    }

    player.unmount().await;

    let frames = player.canvas().frame_count();
    tracing::info!(frames, "session finished");
    if let Some(path) = output {
        player.canvas().write_json(path)?;
        tracing::info!(?path, "wrote recorded frames");
    }
    Ok(())
}

fn demo_script() -> Vec<ScriptStep> {
    let step = |at_ms: f64, action: UserAction| ScriptStep { at_ms, action };
    vec![
        step(100.0, UserAction::ToggleExpanded),
        step(200.0, UserAction::TogglePlay),
        step(1_000.0, UserAction::OpenFullscreen),
        step(2_000.0, UserAction::KeyDown { code: "ArrowUp".into() }),
        step(3_000.0, UserAction::KeyDown { code: "ArrowRight".into() }),
        step(4_000.0, UserAction::CyclePlayMode),
        step(5_000.0, UserAction::Seek { seconds: 11.0 }),
        step(8_000.0, UserAction::CloseFullscreen),
        step(8_500.0, UserAction::Shake),
        step(9_000.0, UserAction::SelectTrack { index: 5 }),
    ]
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Music widget playback core", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the compiled-in playlist.
    Catalog,
    /// Run a scripted session against the simulated media platform.
    Simulate {
        /// JSON array of `{ "at_ms": .., "action": .. }` steps. A built-in
        /// demo runs when omitted.
        #[arg(short, long)]
        script: Option<PathBuf>,
        /// JSON configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Where to write the recorded visualisation frames.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Length of the session in virtual seconds.
        #[arg(long, default_value_t = 10.0)]
        seconds: f64,
    },
}
