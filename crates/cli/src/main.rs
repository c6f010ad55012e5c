//! Terminal front end for the multitrack stem player.
//!
//! Usage:
//!   multitrack                       - use the user config file
//!   multitrack --content-dir ./song  - play stems from a local directory
//!   multitrack --origin <url>        - fetch missing stems from <url>/<file>

mod command;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use multitrack_assets::{
    AssetProvisioner, HttpFetcher, ProvisioningPolicy, ProvisioningState, StemSet,
};
use multitrack_core::{Config, LoopRegion, Player, PlayerSnapshot};
use multitrack_engine::{EngineFacade, NativeEngine};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::command::{Command, HELP};

#[derive(Parser)]
#[command(name = "multitrack", about = "Synchronized multitrack stem player")]
struct Cli {
    /// Config file to use instead of the one in the user config directory
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding the stem files
    #[arg(long)]
    content_dir: Option<PathBuf>,

    /// Base URL the stems are fetched from
    #[arg(long)]
    origin: Option<String>,

    /// Play without the click stem if it is missing
    #[arg(long)]
    click_optional: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG=debug for poller and loop-wrap output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    let config = resolve_config(&cli)?;

    let stems = StemSet::standard(&config.remote_base_url);
    let content_dir = config.content_dir();
    log::info!("Stems in {}", content_dir.display());

    let mut provisioner = AssetProvisioner::new(
        content_dir,
        stems.clone(),
        config.provisioning_policy,
        Arc::new(HttpFetcher::new()),
    );

    let mut player = Player::new(NativeEngine::new(), &stems, config.output_channels)
        .context("failed to open audio output")?;

    provision(&player, &mut provisioner).await;
    let outcome = match player.start_polling(config.poll_interval()) {
        Ok(()) => run_repl(&player, &mut provisioner).await,
        Err(e) => Err(e.into()),
    };

    player.teardown().await;
    outcome
}

fn resolve_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load(),
    };
    if let Some(dir) = &cli.content_dir {
        config.content_dir = Some(dir.clone());
    }
    if let Some(origin) = &cli.origin {
        config.remote_base_url = origin.clone();
    }
    if cli.click_optional {
        config.provisioning_policy = ProvisioningPolicy::ClickOptional;
    }
    Ok(config)
}

async fn run_repl<E>(player: &Player<E>, provisioner: &mut AssetProvisioner) -> Result<()>
where
    E: EngineFacade + Send + 'static,
{
    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let command = match line.parse::<Command>() {
            Ok(command) => command,
            Err(e) => {
                println!("{e} (type 'help')");
                continue;
            }
        };

        let result = match command {
            Command::PlayPause => player.play_pause(),
            Command::Volume(index, value) => player.set_channel_volume(index, value),
            Command::Pan(index, pan) => player.set_channel_pan(index, pan),
            Command::Tempo(direction) => player.tempo_delta(direction),
            Command::Pitch(direction) => player.pitch_delta(direction),
            Command::Seek(time) => player.seek(time),
            Command::DragStart => player.on_seek_start(),
            Command::DragTo(time) => player.seek(time),
            Command::DragEnd => player.on_seek_end(),
            Command::Loop => player.toggle_loop(),
            Command::Rewind => player.rewind(),
            Command::Status => player.snapshot().map(|s| print_status(&s)),
            Command::Retry => {
                provision(player, provisioner).await;
                Ok(())
            }
            Command::Help => {
                println!("{HELP}");
                Ok(())
            }
            Command::Quit => break,
        };

        if let Err(e) = result {
            log::warn!("{e}");
        }
    }
    Ok(())
}

/// Failures are reported and left for `retry`.
async fn provision<E>(player: &Player<E>, provisioner: &mut AssetProvisioner)
where
    E: EngineFacade + Send + 'static,
{
    match player.provision(provisioner).await {
        Ok(state) => report_provisioning(&state),
        Err(e) => {
            log::warn!("Provisioning did not complete: {e}");
            println!("Stems unavailable. Type 'retry' to try again.");
        }
    }
}

fn report_provisioning(state: &ProvisioningState) {
    match state {
        ProvisioningState::Ready => println!("Stems ready"),
        ProvisioningState::Failed(reason) => {
            println!("Stems unavailable: {reason}. Type 'retry' to try again.")
        }
        other => println!("Provisioning: {other:?}"),
    }
}

fn print_status(snapshot: &PlayerSnapshot) {
    println!(
        "{} {:>7.2}s / {:.2}s{}  tempo {:.2}  pitch {:+.0}",
        if snapshot.is_playing { "playing" } else { "stopped" },
        snapshot.current_time_seconds,
        snapshot.total_length_seconds,
        if snapshot.is_dragging { " (dragging)" } else { "" },
        snapshot.tempo_ratio,
        snapshot.pitch_semitones,
    );
    match snapshot.loop_region {
        LoopRegion::Inactive => println!("loop off"),
        LoopRegion::Pending { loop_in } => println!("loop in {loop_in:.2}s"),
        LoopRegion::Active { loop_in, loop_out } => {
            println!("loop {loop_in:.2}s -> {loop_out:.2}s")
        }
    }
    for (index, channel) in snapshot.channels.iter().enumerate() {
        println!(
            "  {index} {:<8} vol {:.2} pan {:+.2}",
            channel.name, channel.volume, channel.pan
        );
    }
}
