//! Interactive REPL (Read-Eval-Print Loop) for the team.

use std::path::PathBuf;

use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{Context, Editor, Helper};
use team_orchestrator::{is_exit, LoopEvent, Orchestrator, TurnOutcome, TurnReport};
use tracing::{debug, warn};

/// Default number of entries shown by `/memory`.
const MEMORY_TAIL: usize = 20;

/// Tab completion for slash commands.
struct CommandCompleter;

impl CommandCompleter {
    const COMMANDS: &'static [&'static str] = &["/agents", "/help", "/memory", "/quit", "/reset"];
}

impl Completer for CommandCompleter {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        if !line.starts_with('/') {
            return Ok((0, vec![]));
        }

        let prefix = &line[..pos];
        let matches: Vec<Pair> = Self::COMMANDS
            .iter()
            .filter(|cmd| cmd.starts_with(prefix))
            .map(|cmd| Pair {
                display: cmd.to_string(),
                replacement: cmd.to_string(),
            })
            .collect();

        Ok((0, matches))
    }
}

impl Hinter for CommandCompleter {
    type Hint = String;
}

impl Highlighter for CommandCompleter {}
impl Validator for CommandCompleter {}
impl Helper for CommandCompleter {}

/// Session commands available in the REPL.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    /// List agents with role and state
    Agents,
    /// Print the last n memory entries
    Memory(usize),
    /// Reset every agent and clear memory
    Reset,
    /// Show help
    Help,
    /// Quit the REPL
    Quit,
    /// Unknown command
    Unknown(String),
    /// A request for the team
    Input(String),
}

impl ReplCommand {
    /// Parses a line into a REPL command.
    pub fn parse(input: &str) -> Self {
        let input = input.trim();

        if is_exit(input) {
            return ReplCommand::Quit;
        }

        let Some(stripped) = input.strip_prefix('/') else {
            return ReplCommand::Input(input.to_string());
        };

        let parts: Vec<&str> = stripped.splitn(2, ' ').collect();
        let cmd = parts[0].to_lowercase();
        let arg = parts.get(1).map(|s| s.trim()).filter(|s| !s.is_empty());

        match cmd.as_str() {
            "agents" | "a" => ReplCommand::Agents,
            "memory" | "m" => match arg.map(str::parse::<usize>) {
                None => ReplCommand::Memory(MEMORY_TAIL),
                Some(Ok(n)) => ReplCommand::Memory(n),
                Some(Err(_)) => ReplCommand::Unknown("memory expects a number".to_string()),
            },
            "reset" => ReplCommand::Reset,
            "help" | "h" | "?" => ReplCommand::Help,
            "quit" | "q" | "exit" => ReplCommand::Quit,
            _ => ReplCommand::Unknown(cmd),
        }
    }
}

/// REPL state
pub struct Repl {
    editor: Editor<CommandCompleter, DefaultHistory>,
    orchestrator: Orchestrator,
    runtime: tokio::runtime::Runtime,
    history_path: PathBuf,
}

impl Repl {
    /// Creates a new REPL over an orchestrator.
    pub fn new(orchestrator: Orchestrator, state_dir: PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let config = rustyline::Config::builder()
            .completion_type(rustyline::CompletionType::List)
            .build();
        let mut editor = Editor::with_config(config)?;
        editor.set_helper(Some(CommandCompleter));

        let runtime = tokio::runtime::Runtime::new()?;

        if let Err(e) = std::fs::create_dir_all(&state_dir) {
            debug!("cannot create {}: {}", state_dir.display(), e);
        }
        let history_path = state_dir.join("history");
        if history_path.exists() {
            let _ = editor.load_history(&history_path);
        }

        Ok(Self {
            editor,
            orchestrator,
            runtime,
            history_path,
        })
    }

    /// Runs the REPL loop.
    pub fn run(&mut self) -> rustyline::Result<()> {
        println!("Smart Team v{}", env!("CARGO_PKG_VERSION"));
        println!("Type a request, /help for commands, exit to quit");
        println!();

        loop {
            let prompt = format!("{}> ", self.orchestrator.active());

            match self.editor.readline(&prompt) {
                Ok(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    self.editor.add_history_entry(&line)?;

                    let cmd = ReplCommand::parse(&line);
                    debug!(?cmd, "Parsed command");

                    if self.handle_command(cmd) {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                }
                Err(ReadlineError::Eof) => {
                    println!("^D");
                    break;
                }
                Err(err) => {
                    eprintln!("Error: {:?}", err);
                    break;
                }
            }
        }

        let _ = self.editor.save_history(&self.history_path);

        println!("Goodbye!");
        Ok(())
    }

    /// Handles a REPL command. Returns true if the REPL should quit.
    fn handle_command(&mut self, cmd: ReplCommand) -> bool {
        match cmd {
            ReplCommand::Agents => {
                let active = self.orchestrator.active();
                for agent in self.orchestrator.registry().iter() {
                    let marker = if agent.name() == active { "*" } else { " " };
                    println!(
                        "{} {:<16} {:<12} {:<12} {} capabilities, {} completed",
                        marker,
                        agent.name(),
                        agent.role().to_string(),
                        agent.state().to_string(),
                        agent.capabilities().len(),
                        agent.completed().len()
                    );
                }
            }
            ReplCommand::Memory(n) => {
                let memory = self.orchestrator.memory();
                if memory.is_empty() {
                    println!("Memory is empty.");
                }
                for entry in memory.tail(n) {
                    println!("[{}] {}", entry.timestamp.format("%H:%M:%S"), entry);
                }
            }
            ReplCommand::Reset => {
                self.orchestrator.reset();
                println!("All agents reset; memory cleared.");
            }
            ReplCommand::Help => print_help(),
            ReplCommand::Quit => return true,
            ReplCommand::Unknown(cmd) => {
                println!("Unknown command: {}. Type /help for available commands.", cmd);
            }
            ReplCommand::Input(text) => return self.handle_input(&text),
        }
        false
    }

    /// Runs one request; Ctrl-C abandons it without leaving the REPL.
    fn handle_input(&mut self, text: &str) -> bool {
        let orchestrator = &mut self.orchestrator;
        let outcome = self.runtime.block_on(async {
            tokio::select! {
                outcome = orchestrator.handle_input(text) => Some(outcome),
                _ = tokio::signal::ctrl_c() => None,
            }
        });

        match outcome {
            Some(Ok(TurnOutcome::Exit)) => true,
            Some(Ok(TurnOutcome::Report(report))) => {
                print_report(&report);
                false
            }
            Some(Err(e)) => {
                eprintln!("Error: {}", e);
                false
            }
            None => {
                warn!(active = %self.orchestrator.active(), "Turn interrupted");
                println!("Turn abandoned.");
                false
            }
        }
    }
}

/// Print every event of a turn.
pub fn print_report(report: &TurnReport) {
    for event in &report.events {
        match event {
            LoopEvent::AssistantText { agent, text } => println!("\n{}: {}\n", agent, text),
            _ => println!("  {}", event),
        }
    }
}

fn print_help() {
    println!("Smart Team REPL");
    println!();
    println!("Anything that is not a command is sent to the active agent.");
    println!();
    println!("COMMANDS:");
    println!("  /agents        List agents with role, state and completed calls");
    println!("  /memory [n]    Show the last n memory entries (default {})", MEMORY_TAIL);
    println!("  /reset         Reset every agent and clear memory");
    println!("  /help          Show this help");
    println!("  /quit, exit    Leave the REPL");
    println!();
    println!("Ctrl-C while a request runs abandons that request.");
}
