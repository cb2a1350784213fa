//! Terminal reflector for the sync engine's update stream.
//!
//! Render only: reads [`ListenerUpdate`]s and prints status lines.  It never
//! decides state and never talks to the transport.

use tokio::sync::broadcast;
use tracing::debug;

use crate::engine::{ListenerPhase, ListenerUpdate};

pub async fn run_reflector(mut updates: broadcast::Receiver<ListenerUpdate>) {
    let mut phase = ListenerPhase::Offair;
    loop {
        match updates.recv().await {
            Ok(ListenerUpdate::Phase(next)) => {
                phase = next;
                println!("◉ {}", phase.label());
            }
            Ok(ListenerUpdate::NowPlaying {
                title,
                artist,
                contributor,
                ..
            }) => {
                let title = title.unwrap_or_else(|| "—".to_string());
                let artist = artist.unwrap_or_else(|| "—".to_string());
                match contributor {
                    Some(contributor) => {
                        println!("  {} — {} (via {})", artist, title, contributor)
                    }
                    None => println!("  {} — {}", artist, title),
                }
            }
            Ok(ListenerUpdate::Notice(notice)) => println!("  [{}]", notice),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                // Render-only consumer: dropping stale updates is fine, the
                // next one carries current state.
                debug!("reflector lagged, skipped {} updates", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    debug!("reflector: update stream closed ({})", phase.label());
}
