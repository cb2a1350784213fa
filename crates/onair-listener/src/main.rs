use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::info;

use onair_proto::config::Config;
use onair_proto::platform;
use onair_proto::store::{FileStore, SharedStore};

use onair_listener::engine::{ListenerEvent, SyncEngine, UserIntent};
use onair_listener::ui;
use onair_listener::widget::SimWidget;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let data_dir = platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("listener.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,onair_listener=debug".to_string()),
        )
        .with_ansi(false)
        .init();

    eprintln!("onair-listener log: {}", log_path.display());
    info!("onair-listener starting…");

    let config = Config::load().unwrap_or_default();
    let shared: Arc<dyn SharedStore> = Arc::new(FileStore::open(&config.storage.dir)?);
    info!("shared store at {}", config.storage.dir.display());

    // ── Engine event channel ─────────────────────────────────────────────────
    let (event_tx, event_rx) = mpsc::channel::<ListenerEvent>(256);

    // ── Transport (simulated) → engine event forwarding ──────────────────────
    let (widget_tx, mut widget_rx) = mpsc::channel(16);
    let widget = SimWidget::new(widget_tx);
    {
        let event_tx = event_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = widget_rx.recv().await {
                if event_tx.send(ListenerEvent::Widget(event)).await.is_err() {
                    break;
                }
            }
        });
    }

    // ── Storage change events (best-effort; polling is the fallback) ─────────
    {
        let mut store_rx = shared.subscribe();
        let event_tx = event_tx.clone();
        tokio::spawn(async move {
            loop {
                match store_rx.recv().await {
                    Ok(change) => {
                        if event_tx
                            .send(ListenerEvent::StoreChanged(change.key))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    // ── Engine + reflector ───────────────────────────────────────────────────
    let engine = SyncEngine::new(
        shared,
        Box::new(widget),
        event_tx.clone(),
        config.listener.volume,
        config.listener.assume_gesture,
    );
    let updates = engine.subscribe();
    tokio::spawn(ui::run_reflector(updates));

    let engine_handle = tokio::spawn(async move {
        if let Err(e) = engine.run(event_rx).await {
            tracing::error!("SyncEngine exited with error: {}", e);
        }
    });

    // ── User intents from stdin ──────────────────────────────────────────────
    println!("onair listener — m: mute/unmute, g: confirm playback, q: quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        match line.trim() {
            "m" | "mute" => {
                let _ = event_tx.send(ListenerEvent::Intent(UserIntent::ToggleMute)).await;
            }
            "g" | "play" => {
                let _ = event_tx
                    .send(ListenerEvent::Intent(UserIntent::ConfirmGesture))
                    .await;
            }
            "q" | "quit" => {
                let _ = event_tx.send(ListenerEvent::Shutdown).await;
                break;
            }
            "" => {}
            other => println!("unknown command {:?} — m, g, or q", other),
        }
    }

    let _ = engine_handle.await;
    Ok(())
}
