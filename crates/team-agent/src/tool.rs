//! Capability and invocation types.
//!
//! A capability is anything an agent may ask its backend to call. Ordinary
//! tools implement [`Capability`]; transfers carry only the registry key of
//! the agent they activate. The tag is fixed at registration time, so the
//! orchestration loop never has to guess from a function's name.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

/// Argument name to value mapping for one invocation.
pub type Parameters = Map<String, Value>;

/// Declared type of a capability parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    /// Whole number.
    Integer,
    /// Floating point number.
    Real,
    /// True/false flag.
    Boolean,
    /// Free text.
    Text,
    /// List of values.
    List,
    /// No declared type.
    Untyped,
}

impl ParamType {
    /// JSON schema type name for this parameter type.
    pub fn json_type(&self) -> &'static str {
        match self {
            Self::Integer | Self::Real => "number",
            Self::Boolean => "boolean",
            Self::List => "array",
            Self::Text | Self::Untyped => "string",
        }
    }
}

/// One declared parameter of a capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    /// Argument name.
    pub name: String,
    /// Declared type.
    pub param_type: ParamType,
    /// Default value; parameters without one are required.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub default: Option<Value>,
    /// Optional human readable description.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,
}

impl ParamSpec {
    /// A parameter the caller must supply.
    pub fn required(name: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            name: name.into(),
            param_type,
            default: None,
            description: None,
        }
    }

    /// A parameter with a default value.
    pub fn optional(name: impl Into<String>, param_type: ParamType, default: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            param_type,
            default: Some(default.into()),
            description: None,
        }
    }

    /// Attach a description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Whether the parameter has no default.
    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

/// Name, documentation and parameter list of a capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilitySpec {
    /// Stable name the backend uses to request the capability.
    pub name: String,
    /// Documentation string shown to the model.
    pub description: String,
    /// Declared parameters in signature order.
    #[serde(default)]
    pub params: Vec<ParamSpec>,
}

impl CapabilitySpec {
    /// Create a spec with no parameters.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params: Vec::new(),
        }
    }

    /// Append a parameter.
    pub fn param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }

    /// Spec for a transfer: a single required `task` argument.
    pub fn transfer(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, description).param(
            ParamSpec::required("task", ParamType::Text)
                .with_description("What the receiving agent should do, or what has been done"),
        )
    }
}

/// A backend-proposed call to a named capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    /// Identifier assigned by the backend (or generated locally).
    pub id: String,
    /// Capability name.
    pub name: String,
    /// Arguments keyed by parameter name.
    #[serde(default)]
    pub parameters: Parameters,
}

impl Invocation {
    /// Create an invocation with a generated id.
    pub fn new(name: impl Into<String>, parameters: Parameters) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), name, parameters)
    }

    /// Create an invocation with a specific id.
    pub fn with_id(id: impl Into<String>, name: impl Into<String>, parameters: Parameters) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            parameters,
        }
    }

    /// Create an invocation from a JSON value; non-objects become empty parameters.
    pub fn from_value(name: impl Into<String>, value: Value) -> Self {
        let parameters = match value {
            Value::Object(map) => map,
            _ => Parameters::new(),
        };
        Self::new(name, parameters)
    }

    /// Get a raw argument.
    pub fn get_arg(&self, key: &str) -> Option<&Value> {
        self.parameters.get(key)
    }

    /// Get a string argument, failing if it is missing or not a string.
    pub fn get_string_arg(&self, key: &str) -> std::result::Result<&str, String> {
        match self.parameters.get(key) {
            Some(Value::String(s)) => Ok(s),
            Some(other) => Err(format!("argument '{}' must be a string, got {}", key, other)),
            None => Err(format!("missing required argument '{}'", key)),
        }
    }

    /// Get a string argument or fall back to a default.
    pub fn string_arg_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.parameters
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or(default)
    }

    /// Get an integer argument, accepting numeric strings.
    pub fn u64_arg(&self, key: &str) -> Option<u64> {
        match self.parameters.get(key)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Name plus parameter snapshot, as stored in the completed set.
    pub fn record(&self) -> InvocationRecord {
        InvocationRecord {
            name: self.name.clone(),
            parameters: self.parameters.clone(),
        }
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_call(f, &self.name, &self.parameters)
    }
}

/// (name, parameters) pair of an invocation that has already run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationRecord {
    /// Capability name.
    pub name: String,
    /// Parameters it ran with.
    pub parameters: Parameters,
}

impl InvocationRecord {
    /// Whether `invocation` has the same name and parameters.
    pub fn matches(&self, invocation: &Invocation) -> bool {
        self.name == invocation.name && self.parameters == invocation.parameters
    }
}

impl fmt::Display for InvocationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_call(f, &self.name, &self.parameters)
    }
}

fn write_call(f: &mut fmt::Formatter<'_>, name: &str, parameters: &Parameters) -> fmt::Result {
    write!(f, "{}(", name)?;
    for (i, (key, value)) in parameters.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        match value {
            Value::String(s) => write!(f, "{}={}", key, s)?,
            other => write!(f, "{}={}", key, other)?,
        }
    }
    write!(f, ")")
}

/// Outcome of executing one invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationResult {
    /// Id of the invocation this answers.
    pub call_id: String,
    /// Capability name.
    pub name: String,
    /// Output text, or the failure message.
    pub content: String,
    /// Whether the capability failed.
    #[serde(default)]
    pub is_error: bool,
}

impl InvocationResult {
    /// A successful result.
    pub fn success(invocation: &Invocation, content: impl Into<String>) -> Self {
        Self {
            call_id: invocation.id.clone(),
            name: invocation.name.clone(),
            content: content.into(),
            is_error: false,
        }
    }

    /// A failed result.
    pub fn failure(invocation: &Invocation, message: impl Into<String>) -> Self {
        Self {
            call_id: invocation.id.clone(),
            name: invocation.name.clone(),
            content: message.into(),
            is_error: true,
        }
    }
}

impl fmt::Display for InvocationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_error {
            write!(f, "Function {} failed. Error: {}", self.name, self.content)
        } else {
            write!(f, "Function {} finished. Result: {}", self.name, self.content)
        }
    }
}

/// An external callable exposed to agents.
///
/// Implementations run to completion; the loop applies no timeout of its own.
#[async_trait]
pub trait Capability: Send + Sync {
    /// Name, description and parameters.
    fn spec(&self) -> &CapabilitySpec;

    /// Execute with the invocation's parameters.
    async fn call(&self, invocation: &Invocation) -> Result<String>;
}

/// A capability backed by a plain closure.
pub struct FnCapability<F> {
    spec: CapabilitySpec,
    handler: F,
}

impl<F> FnCapability<F>
where
    F: Fn(&Invocation) -> Result<String> + Send + Sync + 'static,
{
    /// Wrap `handler` under `spec`.
    pub fn new(spec: CapabilitySpec, handler: F) -> Self {
        Self { spec, handler }
    }
}

#[async_trait]
impl<F> Capability for FnCapability<F>
where
    F: Fn(&Invocation) -> Result<String> + Send + Sync + 'static,
{
    fn spec(&self) -> &CapabilitySpec {
        &self.spec
    }

    async fn call(&self, invocation: &Invocation) -> Result<String> {
        (self.handler)(invocation)
    }
}

/// What happens when a registered capability is invoked.
#[derive(Clone)]
pub enum CapabilityKind {
    /// Run an external callable.
    Tool(Arc<dyn Capability>),
    /// Activate the agent registered under `target`.
    Transfer {
        /// Registry key of the agent to activate.
        target: String,
    },
}

impl fmt::Debug for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tool(cap) => f.debug_tuple("Tool").field(&cap.spec().name).finish(),
            Self::Transfer { target } => f.debug_struct("Transfer").field("target", target).finish(),
        }
    }
}

/// A capability as registered on an agent: its spec plus its tag.
#[derive(Debug, Clone)]
pub struct RegisteredCapability {
    /// Name, description and parameters.
    pub spec: CapabilitySpec,
    /// Tool or transfer.
    pub kind: CapabilityKind,
}

impl RegisteredCapability {
    /// Register an ordinary tool.
    pub fn tool(capability: Arc<dyn Capability>) -> Self {
        Self {
            spec: capability.spec().clone(),
            kind: CapabilityKind::Tool(capability),
        }
    }

    /// Register a transfer to `target`.
    pub fn transfer(spec: CapabilitySpec, target: impl Into<String>) -> Self {
        Self {
            spec,
            kind: CapabilityKind::Transfer {
                target: target.into(),
            },
        }
    }

    /// Capability name.
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Whether this is a transfer.
    pub fn is_transfer(&self) -> bool {
        matches!(self.kind, CapabilityKind::Transfer { .. })
    }

    /// Target agent key if this is a transfer.
    pub fn transfer_target(&self) -> Option<&str> {
        match &self.kind {
            CapabilityKind::Transfer { target } => Some(target),
            CapabilityKind::Tool(_) => None,
        }
    }
}

/// Ordered capability table, unique by name, with O(1) lookup.
#[derive(Debug, Clone, Default)]
pub struct CapabilitySet {
    entries: Vec<RegisteredCapability>,
    index: HashMap<String, usize>,
}

impl CapabilitySet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a capability; hands it back if the name is taken.
    pub fn insert(
        &mut self,
        capability: RegisteredCapability,
    ) -> std::result::Result<(), RegisteredCapability> {
        if self.index.contains_key(capability.name()) {
            return Err(capability);
        }
        self.index
            .insert(capability.name().to_string(), self.entries.len());
        self.entries.push(capability);
        Ok(())
    }

    /// Look up by name.
    pub fn get(&self, name: &str) -> Option<&RegisteredCapability> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    /// The first transfer capability targeting `target`.
    pub fn transfer_to(&self, target: &str) -> Option<&RegisteredCapability> {
        self.entries
            .iter()
            .find(|c| c.transfer_target() == Some(target))
    }

    /// Capabilities in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &RegisteredCapability> {
        self.entries.iter()
    }

    /// Number of capabilities.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no capabilities are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
