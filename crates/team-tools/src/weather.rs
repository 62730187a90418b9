//! Current temperature lookup via wttr.in.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use team_agent::{AgentError, Capability, CapabilitySpec, Invocation, ParamSpec, ParamType, Result};

/// Public wttr.in endpoint.
pub const WTTR_URL: &str = "https://wttr.in";

const TOOL_NAME: &str = "get_weather";

/// `get_weather(city)`: current temperature for a city.
pub struct GetWeather {
    client: reqwest::Client,
    base_url: String,
    spec: CapabilitySpec,
}

impl Default for GetWeather {
    fn default() -> Self {
        Self::new()
    }
}

impl GetWeather {
    /// Query the public wttr.in service.
    pub fn new() -> Self {
        Self::with_base_url(WTTR_URL)
    }

    /// Query a different wttr.in-compatible endpoint.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            spec: CapabilitySpec::new(TOOL_NAME, "Get the current temperature for a city")
                .param(
                    ParamSpec::required("city", ParamType::Text)
                        .with_description("City name, e.g. Paris"),
                ),
        }
    }
}

/// Render the tool's answer.
pub fn format_temperature(city: &str, raw: &str) -> String {
    format!("Temperature in {}: {}", city, raw.trim())
}

#[async_trait]
impl Capability for GetWeather {
    fn spec(&self) -> &CapabilitySpec {
        &self.spec
    }

    async fn call(&self, invocation: &Invocation) -> Result<String> {
        let city = invocation
            .get_string_arg("city")
            .map_err(|e| AgentError::arguments(TOOL_NAME, e))?
            .trim();
        if city.is_empty() {
            return Err(AgentError::arguments(TOOL_NAME, "city must not be empty"));
        }

        debug!(city = %city, "Fetching weather");
        let response = self
            .client
            .get(format!("{}/{}", self.base_url, city))
            .query(&[("format", "%t")])
            .send()
            .await
            .map_err(|e| AgentError::tool(TOOL_NAME, format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AgentError::tool(
                TOOL_NAME,
                format!("weather service returned {}", status),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AgentError::tool(TOOL_NAME, format!("failed to read response: {}", e)))?;
        Ok(format_temperature(city, &body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_spec() {
        let tool = GetWeather::new();
        assert_eq!(tool.spec().name, "get_weather");
        assert!(tool.spec().params[0].is_required());
    }

    #[test]
    fn test_format_temperature() {
        assert_eq!(format_temperature("Paris", "+18°C\n"), "Temperature in Paris: +18°C");
    }

    #[tokio::test]
    async fn test_missing_city() {
        let tool = GetWeather::with_base_url("http://127.0.0.1:9");
        let err = tool
            .call(&Invocation::from_value("get_weather", json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidArguments { .. }));

        let err = tool
            .call(&Invocation::from_value("get_weather", json!({"city": "  "})))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidArguments { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_service_is_tool_error() {
        let tool = GetWeather::with_base_url("http://127.0.0.1:9");
        let err = tool
            .call(&Invocation::from_value("get_weather", json!({"city": "Paris"})))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ToolExecution { .. }));
    }
}
