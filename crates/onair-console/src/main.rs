use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::info;

use onair_proto::config::Config;
use onair_proto::platform::{self, now_ms};
use onair_proto::store::{FileStore, SharedStore};

use onair_console::engine::{ConsoleCommand, ConsoleCore, ConsoleEvent};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let data_dir = platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("console.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,onair_console=debug".to_string()),
        )
        .with_ansi(false)
        .init();

    eprintln!("onair-console log: {}", log_path.display());
    info!("onair-console starting…");

    let config = Config::load()?;
    info!("config loaded from {}", Config::config_path().display());

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    // ── Operator gate (trivial shared secret; empty PIN = dev bypass) ────────
    if config.console.pin.is_empty() {
        tracing::warn!("operator gate: dev bypass (no PIN configured)");
    } else {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(b"PIN: ").await?;
        stdout.flush().await?;
        let entered = stdin.next_line().await?.unwrap_or_default();
        if entered.trim() != config.console.pin {
            anyhow::bail!("wrong PIN");
        }
    }

    let shared: Arc<dyn SharedStore> = Arc::new(FileStore::open(&config.storage.dir)?);
    info!("shared store at {}", config.storage.dir.display());

    // ── ConsoleCore ──────────────────────────────────────────────────────────
    let (event_tx, event_rx) = mpsc::channel::<ConsoleEvent>(256);
    let mut core = ConsoleCore::new(shared, config.console.playlist_seed.clone(), event_tx.clone());
    core.init_session(now_ms());

    let core_handle = tokio::spawn(async move {
        if let Err(e) = core.run(event_rx).await {
            tracing::error!("ConsoleCore exited with error: {}", e);
        }
    });

    // ── Operator command surface ─────────────────────────────────────────────
    println!("onair console — type 'help' for commands");
    while let Ok(Some(line)) = stdin.next_line().await {
        let line = line.trim();
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };
        let command = match verb {
            "" => continue,
            "help" => {
                print_help();
                continue;
            }
            "q" | "quit" => {
                let _ = event_tx.send(ConsoleEvent::Shutdown).await;
                break;
            }
            "play" | "p" => match rest.parse::<usize>() {
                Ok(index) => Some(ConsoleCommand::PlayIndex(index)),
                Err(_) => {
                    println!("usage: play <index>");
                    None
                }
            },
            "next" | "n" => Some(ConsoleCommand::Advance),
            "stop" | "s" => Some(ConsoleCommand::Stop),
            "kill" | "k" => Some(ConsoleCommand::KillSwitch),
            "random" | "r" => Some(ConsoleCommand::ToggleRandom),
            "shuffle" => Some(ConsoleCommand::Shuffle),
            "up" => rest.parse().ok().map(ConsoleCommand::MoveUp),
            "down" => rest.parse().ok().map(ConsoleCommand::MoveDown),
            "del" => rest.parse().ok().map(ConsoleCommand::Delete),
            "add" => {
                if rest.is_empty() {
                    println!("usage: add <url>");
                    None
                } else {
                    Some(ConsoleCommand::AddUrl(rest.to_string()))
                }
            }
            "undo" | "u" => Some(ConsoleCommand::Undo),
            "import" => Some(ConsoleCommand::Import(PathBuf::from(rest))),
            "export" => Some(ConsoleCommand::Export(PathBuf::from(rest))),
            "reset" => Some(ConsoleCommand::Reset),
            "list" | "l" => Some(ConsoleCommand::List),
            "status" | "st" => Some(ConsoleCommand::Status),
            other => {
                println!("unknown command {:?} — type 'help'", other);
                None
            }
        };
        if let Some(command) = command {
            if event_tx.send(ConsoleEvent::Command(command)).await.is_err() {
                break;
            }
        }
    }

    let _ = core_handle.await;
    Ok(())
}

fn print_help() {
    println!(
        "  play <n>        go live with playlist entry n
  next            advance to the next track
  stop            emergency stop (off air)
  kill            kill switch (stop, refuses mid-transition)
  random          toggle random advance order
  shuffle         shuffle the playlist
  up/down <n>     move entry n
  del <n>         delete entry n
  add <url>       add a track by URL
  undo            undo the last playlist edit
  import <path>   replace playlist from a JSON file
  export <path>   write playlist to a JSON file
  reset           reseed the playlist from the canonical file
  list / status   show playlist / broadcast status
  quit            exit (broadcast rides out the lease)"
    );
}
