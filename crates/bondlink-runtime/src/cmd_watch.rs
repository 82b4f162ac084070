//! `bondlink watch`: keep the channel open, ingest frames, print changes.
//!
//! Reconnects with exponential backoff. The backoff resets once the
//! Socket.IO handshake completes. After many consecutive failures the
//! retry log drops from warn to debug.

use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use bondlink_engine::{StateVersion, SyncEngine};

use crate::backend::AgentBackend;
use crate::config::ReconnectConfig;
use crate::connection::{ChannelEvent, ConnectionManager};
use crate::display;
use crate::session::Session;

const DEBUG_LOG_THRESHOLD: u32 = 10;

// ─── Backoff ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    initial_secs: u64,
    max_secs: u64,
    current_secs: u64,
}

impl Backoff {
    pub fn new(config: &ReconnectConfig) -> Self {
        let initial_secs = config.initial_backoff_secs.max(1);
        Self {
            initial_secs,
            max_secs: config.max_backoff_secs.max(initial_secs),
            current_secs: initial_secs,
        }
    }

    /// Delay to wait now; doubles the next one, capped.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current_secs;
        self.current_secs = (self.current_secs * 2).min(self.max_secs);
        Duration::from_secs(delay)
    }

    pub fn reset(&mut self) {
        self.current_secs = self.initial_secs;
    }
}

// ─── Change Output ────────────────────────────────────────────────

/// Prints engine changes past a cursor, then trims them.
#[derive(Debug, Default)]
pub struct ChangePrinter {
    json: bool,
    cursor: StateVersion,
}

impl ChangePrinter {
    pub fn new(json: bool) -> Self {
        Self { json, cursor: 0 }
    }

    /// Lines for everything that changed since the last call.
    pub fn drain(&mut self, engine: &mut SyncEngine) -> Vec<String> {
        let changes = engine.changes_since(self.cursor);
        if changes.is_empty() {
            return Vec::new();
        }

        let lines = if self.json {
            match serde_json::to_string(&engine.snapshot(Utc::now())) {
                Ok(line) => vec![line],
                Err(e) => {
                    tracing::warn!("snapshot serialization failed: {e}");
                    Vec::new()
                }
            }
        } else {
            changes.iter().map(display::format_change).collect()
        };

        self.cursor = engine.version();
        engine.trim_changes_before(self.cursor);
        lines
    }
}

// ─── Command ──────────────────────────────────────────────────────

/// Why a channel ended.
enum ChannelEnd {
    Cancelled,
    Lost { reason: String, handshaken: bool },
}

/// Entry point for `bondlink watch`.
pub async fn cmd_watch<B: AgentBackend>(
    session: &Session<B>,
    socket_url: &str,
    reconnect: &ReconnectConfig,
    json: bool,
) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    session.bootstrap(Utc::now()).await;
    let mut printer = ChangePrinter::new(json);
    flush(session, &mut printer).await;

    let mut manager = ConnectionManager::new(socket_url);
    let mut backoff = Backoff::new(reconnect);
    let mut consecutive_failures: u32 = 0;

    loop {
        match run_channel(session, &mut manager, &mut printer, &cancel).await {
            Ok(ChannelEnd::Cancelled) => break,
            Ok(ChannelEnd::Lost { reason, handshaken }) => {
                if handshaken {
                    backoff.reset();
                    consecutive_failures = 0;
                } else {
                    consecutive_failures = consecutive_failures.saturating_add(1);
                }
                tracing::warn!(%reason, "channel lost");
            }
            Err(e) => {
                consecutive_failures = consecutive_failures.saturating_add(1);
                if consecutive_failures >= DEBUG_LOG_THRESHOLD {
                    tracing::debug!(consecutive_failures, "connect failed: {e}");
                } else {
                    tracing::warn!("connect failed: {e}");
                }
            }
        }

        let delay = backoff.next_delay();
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {
                tracing::info!(
                    url = %socket_url,
                    backoff_secs = delay.as_secs(),
                    consecutive_failures,
                    "reconnecting"
                );
            }
        }
    }

    if manager.is_connected() {
        manager.disconnect();
    }
    tracing::info!("watch stopped");
    Ok(())
}

async fn run_channel<B: AgentBackend>(
    session: &Session<B>,
    manager: &mut ConnectionManager,
    printer: &mut ChangePrinter,
    cancel: &CancellationToken,
) -> anyhow::Result<ChannelEnd> {
    let mut events = tokio::select! {
        _ = cancel.cancelled() => return Ok(ChannelEnd::Cancelled),
        result = manager.connect() => result?,
    };
    let mut handshaken = false;

    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => return Ok(ChannelEnd::Cancelled),
            event = events.recv() => event,
        };
        match event {
            Some(ChannelEvent::Connected) => {
                handshaken = true;
                // Pick up agents created while we were away.
                if let Err(e) = session.refresh_agents(Utc::now()).await {
                    tracing::warn!("refreshing agents failed: {e}");
                }
            }
            Some(ChannelEvent::Frame(frame)) => {
                session.ingest_frame(&frame, Utc::now()).await;
            }
            Some(ChannelEvent::Disconnected { reason }) => {
                return Ok(ChannelEnd::Lost { reason, handshaken });
            }
            None => {
                return Ok(ChannelEnd::Lost {
                    reason: "event stream ended".to_string(),
                    handshaken,
                });
            }
        }
        flush(session, printer).await;
    }
}

async fn flush<B: AgentBackend>(session: &Session<B>, printer: &mut ChangePrinter) {
    let lines = {
        let mut engine = session.engine().lock().await;
        printer.drain(&mut engine)
    };
    for line in lines {
        println!("{line}");
    }
}
