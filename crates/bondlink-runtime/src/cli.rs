//! CLI definition using clap derive.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use bondlink_core::types::AgentId;

use crate::backend::StartRequest;

#[derive(Parser)]
#[command(
    name = "bondlink",
    version,
    about = "Conversation sync client for a multi-agent backend"
)]
pub struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/bondlink/config.toml)
    #[arg(long, global = true, env = "BONDLINK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Backend base URL, overrides `backend_url`
    #[arg(long, global = true, env = "BONDLINK_BACKEND_URL")]
    pub backend_url: Option<String>,

    /// Directory holding the conversation store, overrides `data_dir`
    #[arg(long, global = true, env = "BONDLINK_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Keep conversations in memory only
    #[arg(long, global = true)]
    pub ephemeral: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Follow all agents live, reconnecting as needed
    Watch(JsonOpts),
    /// List backend agents with their local conversation state
    Agents(AgentsOpts),
    /// Create a new agent
    Create(JsonOpts),
    /// Start an agent, optionally with a task
    Start(StartOpts),
    /// Stop a running agent
    Stop(AgentArg),
    /// Send a message to an agent
    Send(SendOpts),
    /// Print an agent's stored conversation
    History(HistoryOpts),
    /// Delete an agent's stored conversation
    Clear(AgentArg),
}

#[derive(clap::Args, Default)]
pub struct JsonOpts {
    /// Machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(clap::Args)]
pub struct AgentsOpts {
    /// Show a single agent
    pub agent_id: Option<String>,

    /// Machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

impl AgentsOpts {
    pub fn agent(&self) -> Option<AgentId> {
        self.agent_id.as_deref().map(|id| AgentId::new(id.trim()))
    }
}

#[derive(clap::Args)]
pub struct AgentArg {
    pub agent_id: String,
}

impl AgentArg {
    pub fn agent(&self) -> AgentId {
        AgentId::new(self.agent_id.trim())
    }
}

#[derive(clap::Args)]
pub struct StartOpts {
    pub agent_id: String,

    /// Task description handed to the agent
    #[arg(long)]
    pub task: Option<String>,

    /// Spending budget for the task
    #[arg(long)]
    pub budget: Option<f64>,

    /// Step limit for the task
    #[arg(long)]
    pub max_steps: Option<u32>,
}

impl StartOpts {
    pub fn agent(&self) -> AgentId {
        AgentId::new(self.agent_id.trim())
    }

    pub fn request(&self) -> StartRequest {
        StartRequest {
            task: self.task.clone().filter(|t| !t.trim().is_empty()),
            task_budget: self.budget,
            max_steps: self.max_steps,
        }
    }
}

#[derive(clap::Args)]
pub struct SendOpts {
    pub agent_id: String,

    /// Message text
    pub message: String,

    /// Send even if the stored conversation shows the agent still working
    #[arg(long)]
    pub force: bool,

    /// Wait up to this many seconds for the agent to finish, printing events
    #[arg(long, value_name = "SECS")]
    pub wait: Option<u64>,
}

impl SendOpts {
    pub fn agent(&self) -> AgentId {
        AgentId::new(self.agent_id.trim())
    }
}

#[derive(clap::Args)]
pub struct HistoryOpts {
    pub agent_id: String,

    /// Machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

impl HistoryOpts {
    pub fn agent(&self) -> AgentId {
        AgentId::new(self.agent_id.trim())
    }
}
