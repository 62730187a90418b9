//! Command-line interface definition using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use team_agent::Provider;
use team_orchestrator::{OrchestratorConfig, ReturnPolicy};

/// Smart Team - a coordinator agent routing work to specialised workers
#[derive(Parser, Debug)]
#[command(name = "smart-team")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Run every agent on one backend family (openai, anthropic, openrouter, ollama)
    #[arg(short, long, env = "SMART_TEAM_PROVIDER", global = true)]
    pub provider: Option<Provider>,

    /// Use one model for every agent
    #[arg(short, long, env = "SMART_TEAM_MODEL", global = true)]
    pub model: Option<String>,

    /// Keep a worker active until it transfers back on its own
    #[arg(long, global = true)]
    pub wait_for_transfer: bool,

    /// Number of memory entries included in completion requests
    #[arg(long, env = "SMART_TEAM_MEMORY_WINDOW", global = true)]
    pub memory_window: Option<usize>,

    /// Backend rounds allowed per input before the loop yields
    #[arg(long, default_value_t = 25, global = true)]
    pub max_rounds: usize,

    /// Directory for tool artefacts (virtual environments, generated code)
    #[arg(short, long, env = "SMART_TEAM_WORKDIR", global = true)]
    pub workdir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the interactive REPL (default)
    Repl,

    /// Handle a single request and print what happened
    Ask {
        /// Request text
        #[arg(required = true)]
        message: String,
    },

    /// List the agents of the default team
    Agents,
}

impl Cli {
    /// Returns the log level based on verbosity.
    pub fn log_level(&self) -> tracing::Level {
        match self.verbose {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }

    /// Returns the tool working directory.
    pub fn workdir(&self) -> PathBuf {
        self.workdir.clone().unwrap_or_else(|| state_dir().join("workspace"))
    }

    /// Orchestration settings derived from the flags.
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        let policy = if self.wait_for_transfer {
            ReturnPolicy::WaitForTransfer
        } else {
            ReturnPolicy::AutoReturn
        };
        let config = OrchestratorConfig::default()
            .with_return_policy(policy)
            .with_max_rounds(self.max_rounds);
        match self.memory_window {
            Some(window) => config.with_memory_window(window),
            None => config,
        }
    }
}

/// `~/.smart-team`, or the current directory when no home is known.
pub fn state_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".smart-team"))
        .unwrap_or_else(|| PathBuf::from(".smart-team"))
}
