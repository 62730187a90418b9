//! Capability schema builder.
//!
//! Turns a [`CapabilitySpec`] into the call descriptor a completion backend
//! expects. The parameter block is identical for every family; only the
//! wrapping differs.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::tool::CapabilitySpec;

/// Descriptor shape expected by a backend family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaFormat {
    /// `{"type": "function", "function": {name, description, parameters}}`.
    OpenAi,
    /// `{name, description, input_schema}`.
    Anthropic,
    /// Same shape as [`SchemaFormat::OpenAi`].
    Ollama,
    /// `{name, description, parameters}`.
    #[default]
    Baseline,
}

/// Build the parameter object schema for a capability.
///
/// Every parameter without a default is listed in `required`, in declaration
/// order. A parameter named `self` is never exposed.
pub fn parameter_schema(spec: &CapabilitySpec) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for param in spec.params.iter().filter(|p| p.name != "self") {
        let description = param
            .description
            .clone()
            .unwrap_or_else(|| format!("Parameter: {}", param.name));
        properties.insert(
            param.name.clone(),
            json!({
                "type": param.param_type.json_type(),
                "description": description,
            }),
        );
        if param.is_required() {
            required.push(Value::String(param.name.clone()));
        }
    }

    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

/// Build the full call descriptor for `spec` in the given format.
pub fn build_schema(spec: &CapabilitySpec, format: SchemaFormat) -> Value {
    let parameters = parameter_schema(spec);
    match format {
        SchemaFormat::OpenAi | SchemaFormat::Ollama => json!({
            "type": "function",
            "function": {
                "name": spec.name,
                "description": spec.description,
                "parameters": parameters,
            }
        }),
        SchemaFormat::Anthropic => json!({
            "name": spec.name,
            "description": spec.description,
            "input_schema": parameters,
        }),
        SchemaFormat::Baseline => json!({
            "name": spec.name,
            "description": spec.description,
            "parameters": parameters,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::{ParamSpec, ParamType};

    fn install_package() -> CapabilitySpec {
        CapabilitySpec::new("install_package", "Install a package into a virtual environment")
            .param(ParamSpec::required("self", ParamType::Untyped))
            .param(ParamSpec::required("package", ParamType::Text))
            .param(ParamSpec::optional("env_name", ParamType::Text, "python_env"))
            .param(ParamSpec::optional("upgrade", ParamType::Boolean, false))
            .param(ParamSpec::required("retries", ParamType::Integer))
    }

    #[test]
    fn test_parameter_schema() {
        let schema = parameter_schema(&install_package());

        assert_eq!(schema["type"], "object");
        assert!(schema["properties"].get("self").is_none());
        assert_eq!(schema["properties"]["package"]["type"], "string");
        assert_eq!(
            schema["properties"]["package"]["description"],
            "Parameter: package"
        );
        assert_eq!(schema["properties"]["upgrade"]["type"], "boolean");
        assert_eq!(schema["properties"]["retries"]["type"], "number");
        assert_eq!(schema["required"], json!(["package", "retries"]));
    }

    #[test]
    fn test_explicit_description_and_list() {
        let spec = CapabilitySpec::new("tag", "Tag things")
            .param(ParamSpec::required("labels", ParamType::List).with_description("Labels"));
        let schema = parameter_schema(&spec);
        assert_eq!(schema["properties"]["labels"]["type"], "array");
        assert_eq!(schema["properties"]["labels"]["description"], "Labels");
    }

    #[test]
    fn test_no_params() {
        let spec = CapabilitySpec::new("ping", "Ping");
        let schema = parameter_schema(&spec);
        assert_eq!(schema["properties"], json!({}));
        assert_eq!(schema["required"], json!([]));
    }

    #[test]
    fn test_formats() {
        let spec = install_package();

        let openai = build_schema(&spec, SchemaFormat::OpenAi);
        assert_eq!(openai["type"], "function");
        assert_eq!(openai["function"]["name"], "install_package");
        assert_eq!(openai["function"]["parameters"]["type"], "object");
        assert_eq!(openai, build_schema(&spec, SchemaFormat::Ollama));

        let anthropic = build_schema(&spec, SchemaFormat::Anthropic);
        assert_eq!(anthropic["name"], "install_package");
        assert!(anthropic.get("parameters").is_none());
        assert_eq!(anthropic["input_schema"]["required"], json!(["package", "retries"]));

        let baseline = build_schema(&spec, SchemaFormat::Baseline);
        assert_eq!(
            baseline["description"],
            "Install a package into a virtual environment"
        );
        assert_eq!(baseline["parameters"], parameter_schema(&spec));
    }

    #[test]
    fn test_deterministic() {
        let spec = install_package();
        for format in [
            SchemaFormat::OpenAi,
            SchemaFormat::Anthropic,
            SchemaFormat::Ollama,
            SchemaFormat::Baseline,
        ] {
            assert_eq!(build_schema(&spec, format), build_schema(&spec, format));
        }
    }
}
