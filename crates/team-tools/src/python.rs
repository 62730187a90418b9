//! Python virtual environments, package installation and code execution.
//!
//! All three capabilities share one [`PythonWorkspace`]: a directory holding
//! the virtual environments and a `code/` folder where every executed
//! program is kept.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use tokio::process::Command;
use tracing::{debug, info, trace};

use team_agent::{AgentError, Capability, CapabilitySpec, Invocation, ParamSpec, ParamType, Result};

/// Environment used when the caller does not name one.
pub const DEFAULT_ENV: &str = "python_env";

/// Directory plus interpreter settings shared by the Python capabilities.
#[derive(Debug, Clone)]
pub struct PythonWorkspace {
    root: PathBuf,
    interpreter: String,
    timeout: Duration,
}

impl PythonWorkspace {
    /// Workspace rooted at `root`, using `python3` and a two minute timeout.
    ///
    /// A relative `root` is resolved against the current directory once, so
    /// subprocesses running inside it see the same paths.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            root: std::path::absolute(&root).unwrap_or(root),
            interpreter: "python3".to_string(),
            timeout: Duration::from_secs(120),
        }
    }

    /// Use a different base interpreter.
    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    /// Limit each subprocess to `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Workspace directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of a named environment.
    pub fn env_dir(&self, env_name: &str) -> PathBuf {
        self.root.join(env_name)
    }

    /// Interpreter inside a named environment.
    pub fn env_python(&self, env_name: &str) -> PathBuf {
        if cfg!(windows) {
            self.env_dir(env_name).join("Scripts").join("python.exe")
        } else {
            self.env_dir(env_name).join("bin").join("python")
        }
    }

    /// Directory where executed programs are saved.
    pub fn code_dir(&self) -> PathBuf {
        self.root.join("code")
    }

    /// Write `code` to `code/generated_code_<timestamp>.py`.
    pub async fn save_program(&self, code: &str) -> Result<PathBuf> {
        let dir = self.code_dir();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| AgentError::tool("execute_code", format!("cannot create {}: {}", dir.display(), e)))?;

        let stamp = Utc::now().format("%Y%m%d_%H%M%S_%3f");
        let path = dir.join(format!("generated_code_{}.py", stamp));
        tokio::fs::write(&path, code)
            .await
            .map_err(|e| AgentError::tool("execute_code", format!("cannot write {}: {}", path.display(), e)))?;
        Ok(path)
    }

    /// Build the three Python capabilities over this workspace.
    pub fn capabilities(&self) -> Vec<Arc<dyn Capability>> {
        vec![
            Arc::new(CreateVirtualenv::new(self.clone())),
            Arc::new(InstallPackage::new(self.clone())),
            Arc::new(ExecuteCode::new(self.clone())),
        ]
    }

    async fn ensure_env(&self, tool: &str, env_name: &str) -> Result<bool> {
        if self.env_python(env_name).exists() {
            return Ok(false);
        }
        info!(env = %env_name, "Creating virtual environment");
        let output = self
            .run(tool, &self.interpreter, [OsStr::new("-m"), OsStr::new("venv"), self.env_dir(env_name).as_os_str()])
            .await?;
        check(tool, output)?;
        Ok(true)
    }

    async fn run<P, I, S>(&self, tool: &str, program: P, args: I) -> Result<Output>
    where
        P: AsRef<OsStr>,
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| AgentError::tool(tool, format!("cannot create {}: {}", self.root.display(), e)))?;

        let mut command = Command::new(program.as_ref());
        command.args(args).current_dir(&self.root).kill_on_drop(true);
        trace!(tool = %tool, command = ?command, "Spawning subprocess");

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| {
                AgentError::tool(tool, format!("timed out after {}s", self.timeout.as_secs()))
            })?
            .map_err(|e| {
                AgentError::tool(
                    tool,
                    format!("failed to start {}: {}", program.as_ref().to_string_lossy(), e),
                )
            })?;

        trace!(
            status = %output.status,
            stdout_len = output.stdout.len(),
            stderr_len = output.stderr.len(),
            "Subprocess completed"
        );
        Ok(output)
    }
}

/// Fail with the process's stderr when it exited unsuccessfully.
fn check(tool: &str, output: Output) -> Result<String> {
    if output.status.success() {
        return Ok(String::from_utf8_lossy(&output.stdout).trim().to_string());
    }
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let message = if stderr.is_empty() {
        format!("process exited with {}", output.status)
    } else {
        stderr
    };
    Err(AgentError::tool(tool, message))
}

/// Environment names are plain directory names.
pub fn validate_env_name(tool: &str, env_name: &str) -> Result<()> {
    let valid = !env_name.is_empty()
        && !env_name.starts_with(['-', '.'])
        && env_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.');
    if valid {
        Ok(())
    } else {
        Err(AgentError::arguments(
            tool,
            format!("invalid environment name: {:?}", env_name),
        ))
    }
}

fn package_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(
                r"^[A-Za-z0-9][A-Za-z0-9._-]*(\[[A-Za-z0-9._,-]+\])?((==|>=|<=|~=|!=|>|<)[A-Za-z0-9.*+!-]+)?$",
            )
            .ok()
        })
        .as_ref()
}

/// Accept a pip requirement of the form `name[extras]<op>version`.
pub fn validate_package_name(package: &str) -> Result<()> {
    match package_pattern() {
        Some(pattern) if pattern.is_match(package) => Ok(()),
        _ => Err(AgentError::tool(
            "install_package",
            format!("bad package name: {:?}", package),
        )),
    }
}

fn env_name_arg<'a>(tool: &str, invocation: &'a Invocation) -> Result<&'a str> {
    let env_name = invocation.string_arg_or("env_name", DEFAULT_ENV);
    validate_env_name(tool, env_name)?;
    Ok(env_name)
}

/// `create_virtualenv(env_name="python_env")`.
pub struct CreateVirtualenv {
    workspace: PythonWorkspace,
    spec: CapabilitySpec,
}

impl CreateVirtualenv {
    /// Create the capability.
    pub fn new(workspace: PythonWorkspace) -> Self {
        Self {
            workspace,
            spec: CapabilitySpec::new(
                "create_virtualenv",
                "Create a Python virtual environment for installing packages and running code",
            )
            .param(ParamSpec::optional("env_name", ParamType::Text, DEFAULT_ENV)),
        }
    }
}

#[async_trait]
impl Capability for CreateVirtualenv {
    fn spec(&self) -> &CapabilitySpec {
        &self.spec
    }

    async fn call(&self, invocation: &Invocation) -> Result<String> {
        let env_name = env_name_arg(&self.spec.name, invocation)?;
        let created = self.workspace.ensure_env(&self.spec.name, env_name).await?;
        let path = self.workspace.env_dir(env_name);
        Ok(if created {
            format!("Virtual environment '{}' created at {}", env_name, path.display())
        } else {
            format!("Virtual environment '{}' already exists at {}", env_name, path.display())
        })
    }
}

/// `install_package(package, env_name="python_env")`.
pub struct InstallPackage {
    workspace: PythonWorkspace,
    spec: CapabilitySpec,
}

impl InstallPackage {
    /// Create the capability.
    pub fn new(workspace: PythonWorkspace) -> Self {
        Self {
            workspace,
            spec: CapabilitySpec::new(
                "install_package",
                "Install a Python package into a virtual environment with pip",
            )
            .param(
                ParamSpec::required("package", ParamType::Text)
                    .with_description("Package name, optionally with a version specifier"),
            )
            .param(ParamSpec::optional("env_name", ParamType::Text, DEFAULT_ENV)),
        }
    }
}

#[async_trait]
impl Capability for InstallPackage {
    fn spec(&self) -> &CapabilitySpec {
        &self.spec
    }

    async fn call(&self, invocation: &Invocation) -> Result<String> {
        let tool = self.spec.name.as_str();
        let package = invocation
            .get_string_arg("package")
            .map_err(|e| AgentError::arguments(tool, e))?
            .trim();
        validate_package_name(package)?;
        let env_name = env_name_arg(tool, invocation)?;

        self.workspace.ensure_env(tool, env_name).await?;
        debug!(package = %package, env = %env_name, "Installing package");
        let python = self.workspace.env_python(env_name);
        let output = self
            .workspace
            .run(tool, &python, ["-m", "pip", "install", "--disable-pip-version-check", package])
            .await?;
        check(tool, output)?;

        Ok(format!("Successfully installed {} in '{}'", package, env_name))
    }
}

/// `execute_code(code, env_name="python_env")`.
pub struct ExecuteCode {
    workspace: PythonWorkspace,
    spec: CapabilitySpec,
}

impl ExecuteCode {
    /// Create the capability.
    pub fn new(workspace: PythonWorkspace) -> Self {
        Self {
            workspace,
            spec: CapabilitySpec::new(
                "execute_code",
                "Save a Python program to a file and run it, returning its output",
            )
            .param(
                ParamSpec::required("code", ParamType::Text)
                    .with_description("Complete Python source code to run"),
            )
            .param(ParamSpec::optional("env_name", ParamType::Text, DEFAULT_ENV)),
        }
    }
}

#[async_trait]
impl Capability for ExecuteCode {
    fn spec(&self) -> &CapabilitySpec {
        &self.spec
    }

    async fn call(&self, invocation: &Invocation) -> Result<String> {
        let tool = self.spec.name.as_str();
        let code = invocation
            .get_string_arg("code")
            .map_err(|e| AgentError::arguments(tool, e))?;
        let env_name = env_name_arg(tool, invocation)?;

        let path = self.workspace.save_program(code).await?;
        let env_python = self.workspace.env_python(env_name);
        let interpreter: &OsStr = if env_python.exists() {
            env_python.as_os_str()
        } else {
            OsStr::new(&self.workspace.interpreter)
        };

        info!(path = %path.display(), "Executing generated code");
        let output = self.workspace.run(tool, interpreter, [path.as_os_str()]).await?;
        let stdout = check(tool, output)?;

        Ok(if stdout.is_empty() {
            format!("Code executed successfully with no output (saved to {})", path.display())
        } else {
            stdout
        })
    }
}
