//! Smart Team entry point.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use smart_team::cli::{self, Cli, Commands};
use smart_team::repl::{print_report, Repl};
use smart_team::team::{build_orchestrator, build_team_with, TeamOptions};
use team_agent::{CompletionBackend, ScriptedBackend};
use team_orchestrator::TurnOutcome;

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

fn main() {
    // API keys may live in .env.local or .env
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level().to_string()));

    fmt().with_env_filter(filter).with_target(false).init();

    let result = match cli.command {
        Some(Commands::Agents) => list_agents(&cli),
        Some(Commands::Ask { ref message }) => ask(&cli, message),
        Some(Commands::Repl) | None => run_repl(&cli),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn team_options(cli: &Cli) -> TeamOptions {
    TeamOptions {
        provider: cli.provider,
        model: cli.model.clone(),
        workdir: cli.workdir(),
    }
}

fn run_repl(cli: &Cli) -> Result<()> {
    let orchestrator = build_orchestrator(&team_options(cli), cli.orchestrator_config())?;
    let mut repl = Repl::new(orchestrator, cli::state_dir())?;
    repl.run()?;
    Ok(())
}

fn ask(cli: &Cli, message: &str) -> Result<()> {
    let mut orchestrator = build_orchestrator(&team_options(cli), cli.orchestrator_config())?;
    let runtime = tokio::runtime::Runtime::new()?;

    match runtime.block_on(orchestrator.handle_input(message))? {
        TurnOutcome::Report(report) => print_report(&report),
        TurnOutcome::Exit => {}
    }
    Ok(())
}

fn list_agents(cli: &Cli) -> Result<()> {
    // Inspecting the layout needs no API keys
    let agents = build_team_with(&team_options(cli), |_| {
        let backend: Arc<dyn CompletionBackend> = Arc::new(ScriptedBackend::new());
        Ok(backend)
    })?;
    for agent in &agents {
        println!("{} ({})", agent.name(), agent.role());
        for capability in agent.capabilities().iter() {
            match capability.transfer_target() {
                Some(target) => println!("  {} -> {}", capability.name(), target),
                None => println!("  {}", capability.name()),
            }
        }
    }
    Ok(())
}
