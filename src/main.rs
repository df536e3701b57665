//! whodunit — a murder mystery played against AI investigators
//!
//! Usage:
//!   whodunit                          → play with the default config
//!   whodunit play --seed 7            → play a specific mansion
//!   whodunit config                   → print the effective config
//!   whodunit version                  → show version

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};
use whodunit_agent::parse_action;
use whodunit_core::{Action, Participant, ParticipantId, ParticipantRole, WorldState};
use whodunit_engine::{EngineConfig, EventKind, GameEngine, GameHandle, SubmitOutcome};

#[derive(Parser)]
#[command(
    name = "whodunit",
    about = "Turn-based murder mystery against AI investigators",
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to config file (TOML), or set WHODUNIT_CONFIG
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// World seed (overrides the config file)
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Write logs to a file (in addition to stderr)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Agent channel base url, or set WHODUNIT_CHANNEL_URL
    #[arg(long, global = true)]
    channel_url: Option<String>,

    /// Narrative oracle url, or set WHODUNIT_ORACLE_URL
    #[arg(long, global = true)]
    oracle_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Play an interactive game in the terminal
    Play,
    /// Print the effective configuration as TOML
    Config,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("whodunit v{}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Config) => {
            print!("{}", effective_config(&cli).to_toml());
        }
        Some(Commands::Play) | None => {
            let _guard = init_tracing(cli.log_file.as_deref())?;
            play(effective_config(&cli)).await?;
        }
    }

    Ok(())
}

fn init_tracing(log_file: Option<&std::path::Path>) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "whodunit=info,whodunit_engine=info,whodunit_agent=info,whodunit_channel=info".into()
        })
    };
    let stderr = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(filter());

    let Some(path) = log_file else {
        tracing_subscriber::registry().with(stderr).init();
        return Ok(None);
    };

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let name = path
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("--log-file needs a file name: {}", path.display()))?;
    std::fs::create_dir_all(&dir)?;
    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
    let file = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_filter(filter());

    tracing_subscriber::registry().with(stderr).with(file).init();
    Ok(Some(guard))
}

/// Config file, then environment, then flags.
fn effective_config(cli: &Cli) -> EngineConfig {
    let path = EngineConfig::resolve_path(cli.config.as_deref());
    let mut config = EngineConfig::load(&path);

    if let Some(seed) = cli.seed {
        config.world.seed = seed;
    }
    if let Some(url) = cli
        .channel_url
        .clone()
        .or_else(|| std::env::var("WHODUNIT_CHANNEL_URL").ok())
    {
        config.channel.url = Some(url);
    }
    if let Some(url) = cli
        .oracle_url
        .clone()
        .or_else(|| std::env::var("WHODUNIT_ORACLE_URL").ok())
    {
        config.oracle.url = Some(url);
    }
    config
}

const HELP: &str = "\
Each turn: say something, then do one thing.
  say <text>                       talk to the others
  north | south | east | west      walk
  search                           search the room
  examine <id>                     look at an item or person
  take <id> | drop <id> | use <id> handle items
  accuse <suspect> with the <weapon> in <room id>
  look                             describe your surroundings
  state                            dump the world as JSON
  quit";

async fn play(config: EngineConfig) -> anyhow::Result<()> {
    let game = GameEngine::from_config(config)?.start().await?;
    let world = game.snapshot();
    let me = world
        .participants
        .iter()
        .find(|p| p.role == ParticipantRole::Human)
        .map(|p| p.id.clone())
        .ok_or_else(|| anyhow::anyhow!("no human participant in this game"))?;

    for line in world.event_log.iter() {
        println!("{}", line);
    }
    println!("\n{}\n", HELP);
    let printer = spawn_printer(&game);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let Some(world) = game
            .wait_until(|w| w.is_concluded() || w.current_turn == me, Duration::from_secs(3600))
            .await
        else {
            println!("The others are taking too long. Goodbye.");
            break;
        };
        if world.is_concluded() {
            break;
        }

        print!("> ");
        let _ = std::io::Write::flush(&mut std::io::stdout());
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "quit" | "exit" => break,
            "help" | "?" => println!("{}", HELP),
            "look" => {
                if let Some(p) = world.participant_by_id(&me) {
                    println!("{}", describe(p, &world));
                }
            }
            "state" => println!("{}", world.to_json()?),
            _ => {
                let action = to_action(&me, line);
                match game.submit(action).await? {
                    SubmitOutcome::Rejected(reason) => println!("({})", reason),
                    SubmitOutcome::Applied(_) => {}
                }
            }
        }
    }

    let world = game.snapshot();
    game.shutdown().await;
    printer.abort();

    println!("\nFinal scores:");
    for p in &world.participants {
        println!("  {:<14} {}", p.name, world.score(&p.id));
    }
    Ok(())
}

fn to_action(me: &ParticipantId, line: &str) -> Action {
    if let Some(text) = line.strip_prefix("say ") {
        return Action::chat(me.clone(), text.trim());
    }
    let line = match line {
        "n" | "north" | "s" | "south" | "e" | "east" | "w" | "west" => format!("go {}", expand(line)),
        other => other.to_string(),
    };
    parse_action(me, &line).action
}

fn expand(dir: &str) -> &str {
    match dir {
        "n" => "north",
        "s" => "south",
        "e" => "east",
        "w" => "west",
        other => other,
    }
}

fn describe(me: &Participant, world: &WorldState) -> String {
    let Some(room) = world.room_at(me.position) else {
        return "You are nowhere at all.".to_string();
    };
    let mut out = format!("You are in the {} [{}]. {}", room.name, room.id, room.description);
    if !room.items.is_empty() {
        let items: Vec<String> = room.items.iter().map(|i| format!("{} [{}]", i.name, i.id)).collect();
        out.push_str(&format!("\nYou see: {}", items.join(", ")));
    }
    let others: Vec<String> = world
        .co_located(&me.id)
        .iter()
        .map(|p| format!("{} [{}]", p.name, p.id))
        .collect();
    if !others.is_empty() {
        out.push_str(&format!("\nWith you: {}", others.join(", ")));
    }
    if !me.inventory.is_empty() {
        let carried: Vec<&str> = me.inventory.iter().map(|i| i.name.as_str()).collect();
        out.push_str(&format!("\nYou carry: {}", carried.join(", ")));
    }
    out.push_str(&format!(
        "\nClues: {} known, {} of {} found overall. Phase: {}.",
        me.known_clues.len(),
        world.discovered_clues(),
        world.clues.len(),
        world.phase
    ));
    out
}

fn spawn_printer(game: &GameHandle) -> tokio::task::JoinHandle<()> {
    let mut events = game.watch();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match &event.kind {
                    EventKind::StateUpdated { .. } | EventKind::GameStarted { .. } => {}
                    EventKind::ActionRejected { .. } => {}
                    EventKind::OracleApplied { narrative, .. } if narrative.is_empty() => {}
                    _ => println!("{}", event.summary()),
                },
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "event printer fell behind");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
