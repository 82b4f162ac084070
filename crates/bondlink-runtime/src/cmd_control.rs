//! One-shot control commands: `start`, `stop`, `send`, `clear`.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::Instant;

use bondlink_core::types::AgentId;

use crate::backend::{AgentBackend, StartRequest};
use crate::connection::{ChannelEvent, ConnectionManager};
use crate::display;
use crate::session::Session;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Entry point for `bondlink start`.
pub async fn cmd_start<B: AgentBackend>(
    session: &Session<B>,
    agent: &AgentId,
    request: &StartRequest,
) -> anyhow::Result<()> {
    let state = session.start(agent, request, Utc::now()).await?;
    println!("{agent} {state}");
    Ok(())
}

/// Entry point for `bondlink stop`.
pub async fn cmd_stop<B: AgentBackend>(session: &Session<B>, agent: &AgentId) -> anyhow::Result<()> {
    let state = session.stop(agent, Utc::now()).await?;
    println!("{agent} {state}");
    Ok(())
}

/// Entry point for `bondlink clear`.
pub async fn cmd_clear<B: AgentBackend>(session: &Session<B>, agent: &AgentId) -> anyhow::Result<()> {
    match session.clear(agent, Utc::now()).await {
        Some(removed) => println!("{agent} cleared ({removed} stored events removed)"),
        None => anyhow::bail!("{agent}: stored conversation could not be removed"),
    }
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Send even if stored history says the agent is still working.
    pub force: bool,
    /// Keep listening up to this long for the agent to finish.
    pub wait: Option<Duration>,
}

/// Entry point for `bondlink send`.
///
/// Loads the agent's stored history, connects, emits the message and records
/// it locally once the channel accepted it. With `wait`, keeps ingesting
/// frames until the agent is no longer working, printing each new event.
pub async fn cmd_send<B: AgentBackend>(
    session: &Session<B>,
    manager: &mut ConnectionManager,
    agent: &AgentId,
    message: &str,
    opts: &SendOptions,
) -> anyhow::Result<()> {
    if let Err(e) = session.engine().lock().await.load_history(agent, Utc::now()) {
        tracing::warn!(agent = %agent, "stored history unavailable: {e}");
    }

    tracing::debug!(url = manager.url(), "connecting");
    let mut events = manager.connect().await?;
    wait_connected(session, &mut events).await?;

    let outcome = session
        .send_user_message(&*manager, agent, message, opts.force, Utc::now())
        .await?;
    tracing::info!(agent = %agent, recorded = outcome.is_applied(), "user message sent");

    let mut printed = session.engine().lock().await.agent_log(agent).len();
    if let Some(wait) = opts.wait {
        let deadline = Instant::now() + wait;
        loop {
            printed = print_new_records(session, agent, printed).await;
            if !session.engine().lock().await.is_working(agent) {
                break;
            }
            let event = match tokio::time::timeout_at(deadline, events.recv()).await {
                Ok(event) => event,
                Err(_) => {
                    manager.disconnect();
                    anyhow::bail!("{agent} still working after {}s", wait.as_secs());
                }
            };
            match event {
                Some(ChannelEvent::Frame(frame)) => {
                    session.ingest_frame(&frame, Utc::now()).await;
                }
                Some(ChannelEvent::Connected) => {}
                Some(ChannelEvent::Disconnected { reason }) => {
                    anyhow::bail!("channel lost while waiting: {reason}");
                }
                None => anyhow::bail!("channel closed while waiting"),
            }
        }
    }

    manager.disconnect();
    let engine = session.engine().lock().await;
    let state = engine.agent_state(agent);
    println!("{agent} {state}");
    Ok(())
}

/// Ingest frames until the Socket.IO handshake completes.
async fn wait_connected<B: AgentBackend>(
    session: &Session<B>,
    events: &mut mpsc::Receiver<ChannelEvent>,
) -> anyhow::Result<()> {
    let deadline = Instant::now() + CONNECT_TIMEOUT;
    loop {
        let event = tokio::time::timeout_at(deadline, events.recv())
            .await
            .map_err(|_| anyhow::anyhow!("no handshake within {}s", CONNECT_TIMEOUT.as_secs()))?;
        match event {
            Some(ChannelEvent::Connected) => return Ok(()),
            Some(ChannelEvent::Frame(frame)) => {
                session.ingest_frame(&frame, Utc::now()).await;
            }
            Some(ChannelEvent::Disconnected { reason }) => {
                anyhow::bail!("channel closed before handshake: {reason}")
            }
            None => anyhow::bail!("channel closed before handshake"),
        }
    }
}

/// Print records past `printed` for `agent`; returns the new count.
async fn print_new_records<B: AgentBackend>(
    session: &Session<B>,
    agent: &AgentId,
    printed: usize,
) -> usize {
    let engine = session.engine().lock().await;
    let log = engine.agent_log(agent);
    for record in log.iter().skip(printed) {
        println!("{}", display::format_record(record));
    }
    log.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::mock::{MockBackend, RecordingSink, session, t0};
    use crate::socketio::ChannelFrame;

    #[tokio::test]
    async fn wait_connected_ingests_early_frames() {
        let s = session(MockBackend::default());
        let (tx, mut rx) = mpsc::channel(4);
        tx.send(ChannelEvent::Frame(ChannelFrame {
            name: "message".into(),
            payload: r#"{"event":"agent_message","data":{"agent_id":"A1","message":"hi"}}"#.into(),
        }))
        .await
        .expect("send");
        tx.send(ChannelEvent::Connected).await.expect("send");

        wait_connected(&s, &mut rx).await.expect("connected");
        assert_eq!(s.engine().lock().await.agent_log(&AgentId::new("A1")).len(), 1);
    }

    #[tokio::test]
    async fn wait_connected_fails_on_early_disconnect() {
        let s = session(MockBackend::default());
        let (tx, mut rx) = mpsc::channel(4);
        tx.send(ChannelEvent::Disconnected {
            reason: "connect error: bad auth".into(),
        })
        .await
        .expect("send");

        let err = wait_connected(&s, &mut rx).await.expect_err("closed");
        assert!(err.to_string().contains("bad auth"));
    }

    #[tokio::test]
    async fn stop_reports_backend_success() {
        let s = session(MockBackend::with_agents(&["A1"]));
        cmd_stop(&s, &AgentId::new("A1")).await.expect("stop");
        assert_eq!(s.backend().calls(), vec!["stop A1"]);
    }

    #[tokio::test]
    async fn rejected_start_is_an_error() {
        let backend = MockBackend {
            reject_start: true,
            ..MockBackend::with_agents(&["A1"])
        };
        let s = session(backend);
        assert!(cmd_start(&s, &AgentId::new("A1"), &StartRequest::default()).await.is_err());
    }

    #[tokio::test]
    async fn print_new_records_advances_count() {
        let s = session(MockBackend::default());
        let a1 = AgentId::new("A1");
        s.send_user_message(&RecordingSink::default(), &a1, "hello", false, t0())
            .await
            .expect("send");
        assert_eq!(print_new_records(&s, &a1, 0).await, 1);
        assert_eq!(print_new_records(&s, &a1, 1).await, 1);
    }

    #[tokio::test]
    async fn send_without_channel_fails_and_keeps_history_clean() {
        let s = session(MockBackend::with_agents(&["A1"]));
        let mut manager = ConnectionManager::new("ws://127.0.0.1:9/socket.io/?EIO=4&transport=websocket");
        let a1 = AgentId::new("A1");

        let result = cmd_send(&s, &mut manager, &a1, "hello", &SendOptions::default()).await;

        assert!(result.is_err());
        let engine = s.engine().lock().await;
        assert!(engine.agent_log(&a1).is_empty());
        assert!(!engine.is_working(&a1));
    }
}
