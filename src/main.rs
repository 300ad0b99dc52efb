use anyhow::Context;
use log::info;
use scenetune::config::{self, FileStateStore, IntegrationMode, SceneConfig};
use scenetune::events::PlayerEvent;
use scenetune::model::PlaybackMode;
use scenetune::narrative::{ChatMessage, MemoryChat, Role, SnapshotSource, StaticSnapshots, TextTagScanner};
use scenetune::transport::SimulatedTransport;
use scenetune::{Collaborators, Player, ReconcileEvent, SessionContext};
use serde::Deserialize;
use serde_json::Value;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;
use tokio::sync::broadcast;

#[derive(Debug, Default)]
struct CliArgs {
    scene: Option<PathBuf>,
    script: Option<PathBuf>,
    state_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
enum ScriptCommand {
    Start {
        #[serde(default)]
        context_id: Option<u64>,
        #[serde(default)]
        snapshot: Option<Value>,
        #[serde(default)]
        anchored: bool,
        #[serde(default)]
        base: Option<String>,
        #[serde(default)]
        autoplay: bool,
    },
    Toggle,
    Next,
    Prev,
    Play {
        index: usize,
    },
    Ended,
    Mode {
        mode: PlaybackMode,
    },
    CycleMode,
    Volume {
        value: f32,
    },
    Progress {
        current: f64,
        duration: f64,
    },
    Reconcile {
        #[serde(default)]
        snapshot: Option<Value>,
        #[serde(default)]
        hard: bool,
    },
    Say {
        id: u64,
        role: Role,
        text: String,
    },
    Wait {
        ms: u64,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = parse_args(std::env::args().skip(1).collect())?;
    let Some(scene_path) = args.scene else {
        print_help();
        anyhow::bail!("--scene is required");
    };

    let scene = SceneConfig::load(&scene_path)?.into_scene()?;
    let state_dir = match args.state_dir {
        Some(dir) => dir,
        None => config::config_root()?,
    };
    let settings = config::load_settings(&state_dir)?;
    let script = args.script;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("failed to start runtime")?;

    runtime.block_on(async move {
        let chat = Rc::new(TextTagScanner::new(MemoryChat::new(), settings.scan_window));
        let snapshots: Rc<dyn SnapshotSource> = match scene.mode {
            IntegrationMode::TextTags => chat.clone() as Rc<dyn SnapshotSource>,
            IntegrationMode::Variables => Rc::new(StaticSnapshots::new(None)),
        };
        let parts = Collaborators {
            transport: Rc::new(SimulatedTransport::new(&settings)),
            store: Rc::new(FileStateStore::new(&state_dir)),
            snapshots,
        };
        let player = Player::new(scene, &settings, parts);
        let mut events = player.subscribe();

        let input: Box<dyn BufRead> = match &script {
            Some(path) => Box::new(BufReader::new(
                std::fs::File::open(path)
                    .with_context(|| format!("failed to open script {}", path.display()))?,
            )),
            None => Box::new(BufReader::new(std::io::stdin())),
        };

        for (number, line) in input.lines().enumerate() {
            let line = line.context("failed to read script")?;
            if line.trim().is_empty() || line.trim_start().starts_with('#') {
                continue;
            }
            let command: ScriptCommand = serde_json::from_str(&line)
                .with_context(|| format!("invalid command on line {}", number + 1))?;
            info!("line {}: {command:?}", number + 1);
            run_command(&player, chat.history(), command).await;
            drain_events(&mut events)?;
        }
        Ok::<(), anyhow::Error>(())
    })
}

async fn run_command(player: &Player, chat: &MemoryChat, command: ScriptCommand) {
    match command {
        ScriptCommand::Start {
            context_id,
            snapshot,
            anchored,
            base,
            autoplay,
        } => {
            player
                .start_session(SessionContext {
                    context_id,
                    genesis_snapshot: snapshot,
                    anchored_at_genesis: anchored,
                    base_playlist_id: base,
                    autoplay,
                })
                .await
        }
        ScriptCommand::Toggle => {
            player.toggle_play_pause().await;
        }
        ScriptCommand::Next => {
            player.play_next().await;
        }
        ScriptCommand::Prev => {
            player.play_prev().await;
        }
        ScriptCommand::Play { index } => {
            player.play_at(index).await;
        }
        ScriptCommand::Ended => {
            player.track_ended().await;
        }
        ScriptCommand::Mode { mode } => {
            player.set_mode(mode);
        }
        ScriptCommand::CycleMode => {
            player.cycle_mode();
        }
        ScriptCommand::Volume { value } => {
            player.set_volume(value);
        }
        ScriptCommand::Progress { current, duration } => player.report_progress(current, duration),
        ScriptCommand::Reconcile { snapshot, hard } => {
            let mut event = ReconcileEvent {
                snapshot,
                ..ReconcileEvent::default()
            };
            if hard {
                event = event.hard();
            }
            let outcome = player.reconcile(event).await;
            info!("reconcile: {outcome:?}");
        }
        ScriptCommand::Say { id, role, text } => chat.push(ChatMessage::new(id, role, text)),
        ScriptCommand::Wait { ms } => tokio::time::sleep(Duration::from_millis(ms)).await,
    }
}

fn drain_events(events: &mut broadcast::Receiver<PlayerEvent>) -> anyhow::Result<()> {
    loop {
        match events.try_recv() {
            Ok(event) => println!("{}", serde_json::to_string(&event)?),
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                log::warn!("{skipped} events dropped");
            }
            Err(_) => return Ok(()),
        }
    }
}

fn parse_args(args: Vec<String>) -> anyhow::Result<CliArgs> {
    let mut out = CliArgs::default();
    let mut index = 0;
    while index < args.len() {
        match args[index].as_str() {
            flag @ ("--scene" | "--script" | "--state-dir") => {
                index += 1;
                let Some(value) = args.get(index) else {
                    anyhow::bail!("{flag} requires a path");
                };
                if value.trim().is_empty() {
                    anyhow::bail!("{flag} cannot be empty");
                }
                let path = PathBuf::from(value.trim());
                match flag {
                    "--scene" => out.scene = Some(path),
                    "--script" => out.script = Some(path),
                    _ => out.state_dir = Some(path),
                }
            }
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            other => anyhow::bail!("unknown argument {other}"),
        }
        index += 1;
    }
    Ok(out)
}

fn print_help() {
    println!("scenetune");
    println!("  --scene path        Scene file with playlists and triggers");
    println!("  --script path       JSON-lines command script (default: stdin)");
    println!("  --state-dir path    Where state and baseline are kept");
}
