//! The default team: a coordinator routing to weather, search and code workers.

use std::path::PathBuf;
use std::sync::Arc;

use team_agent::backend::from_config;
use team_agent::{Agent, CompletionBackend, ModelConfig, Provider, Result as AgentResult};
use team_orchestrator::{AgentRegistry, Orchestrator, OrchestratorConfig, Result};
use team_tools::{FetchPage, GetWeather, PythonWorkspace};
use tracing::info;

/// Coordinator name.
pub const ORCHESTRATOR: &str = "OrchestratorBot";
/// Weather worker name.
pub const WEATHER: &str = "WeatherBot";
/// Search worker name.
pub const SEARCH: &str = "SearchBot";
/// Code worker name.
pub const CODE: &str = "CodeBot";

const ORCHESTRATOR_INSTRUCTIONS: &str = "You are the orchestrator bot. Your role is to:
1. Analyze each request and transfer control to the bot that should handle it, passing the task,
   for example transfer_to_weather(task=\"Get temperature in New York\")
2. When an agent finishes a task it transfers back to you; decide which agent handles the next step
3. Always summarize what has been done and which errors occurred
4. When a lot of information is retrieved, structure it with bullet points";

const WEATHER_INSTRUCTIONS: &str = "You are the weather bot. Your role is to:
1. Get weather information for the requested locations
2. Call several functions in the same response when more than one location is needed
3. Do not suggest additional weather checks unless asked
4. After completing the task, return control to the orchestrator";

const SEARCH_INSTRUCTIONS: &str = "You are the search bot. Your role is to:
1. Retrieve the requested information with fetch_page
2. Call fetch_page once per page when several sources are needed
3. After completing the task, return control to the orchestrator";

const CODE_INSTRUCTIONS: &str = "You are the coding assistant. Your role is to:
1. Help with coding tasks and questions
2. Create the environment (keep the name python_env), install packages, then write and debug code
3. Call several functions in the same response when the steps are known
   (create_virtualenv, install_package, execute_code, transfer_to_orchestrator)
4. Do not suggest additional coding tasks unless asked
5. When the task is done, transfer control back with transfer_to_orchestrator";

/// Knobs for building the default team.
#[derive(Debug, Clone, Default)]
pub struct TeamOptions {
    /// Run every agent on this backend family.
    pub provider: Option<Provider>,
    /// Use this model for every agent.
    pub model: Option<String>,
    /// Directory for tool artefacts.
    pub workdir: PathBuf,
}

impl TeamOptions {
    /// Options with a tool directory and default models.
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            ..Self::default()
        }
    }

    /// Apply the provider and model overrides to an agent's default model.
    pub fn model_for(&self, default: ModelConfig) -> ModelConfig {
        let mut config = match self.provider {
            Some(provider) if provider != default.provider => {
                ModelConfig::new(default_model(provider)).with_provider(provider)
            }
            _ => default,
        };
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        config
    }
}

fn default_model(provider: Provider) -> &'static str {
    match provider {
        Provider::OpenAI => "gpt-4o-mini",
        Provider::OpenRouter => "openai/gpt-4o-mini",
        Provider::Anthropic => "claude-3-5-sonnet-20241022",
        Provider::Ollama => "llama3.1",
    }
}

/// Build the default team, creating each backend with `backend_for`.
pub fn build_team_with<F>(options: &TeamOptions, backend_for: F) -> Result<Vec<Agent>>
where
    F: Fn(&ModelConfig) -> AgentResult<Arc<dyn CompletionBackend>>,
{
    let standard = options.model_for(ModelConfig::openai("gpt-4o-mini"));
    let coding = options.model_for(ModelConfig::anthropic("claude-3-5-sonnet-20241022"));
    let workspace = PythonWorkspace::new(&options.workdir);

    let orchestrator = Agent::coordinator(ORCHESTRATOR, ORCHESTRATOR_INSTRUCTIONS, backend_for(&standard)?)
        .with_transfer("transfer_to_weather", "Transfer control to the weather bot", WEATHER)?
        .with_transfer("transfer_to_search", "Transfer control to the search bot", SEARCH)?
        .with_transfer("transfer_to_code", "Transfer control to the code bot", CODE)?;

    let weather = with_return(Agent::worker(WEATHER, WEATHER_INSTRUCTIONS, backend_for(&standard)?))?
        .with_tool(Arc::new(GetWeather::new()))?;

    let search = with_return(Agent::worker(SEARCH, SEARCH_INSTRUCTIONS, backend_for(&standard)?))?
        .with_tool(Arc::new(FetchPage::new()))?;

    let mut code = Agent::worker(CODE, CODE_INSTRUCTIONS, backend_for(&coding)?);
    for capability in workspace.capabilities() {
        code.register_tool(capability)?;
    }
    let code = with_return(code)?;

    Ok(vec![orchestrator, weather, search, code])
}

fn with_return(agent: Agent) -> AgentResult<Agent> {
    agent.with_transfer(
        "transfer_to_orchestrator",
        "Transfer control back to the orchestrator when the assigned task is done or needs support. \
         Use task to report what was done and which errors occurred.",
        ORCHESTRATOR,
    )
}

/// Build the default team against real backends.
pub fn build_team(options: &TeamOptions) -> Result<Vec<Agent>> {
    build_team_with(options, from_config)
}

/// Build the default team and wrap it in an orchestrator.
pub fn build_orchestrator(options: &TeamOptions, config: OrchestratorConfig) -> Result<Orchestrator> {
    let registry = AgentRegistry::new(build_team(options)?)?;
    info!(
        agents = registry.len(),
        coordinator = %registry.coordinator(),
        workdir = %options.workdir.display(),
        "Team ready"
    );
    Ok(Orchestrator::new(registry, config))
}
