//! Web page fetching with paragraph extraction.

use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::debug;

use team_agent::{AgentError, Capability, CapabilitySpec, Invocation, ParamSpec, ParamType, Result};

const TOOL_NAME: &str = "fetch_page";

/// Words returned when the caller does not choose a limit.
pub const DEFAULT_MAX_WORDS: u64 = 200;

const USER_AGENT: &str = concat!("smart-team/", env!("CARGO_PKG_VERSION"));

/// `fetch_page(url, max_words=200)`: readable paragraph text of a web page.
pub struct FetchPage {
    client: reqwest::Client,
    spec: CapabilitySpec,
}

impl Default for FetchPage {
    fn default() -> Self {
        Self::new()
    }
}

impl FetchPage {
    /// Create the capability.
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            spec: CapabilitySpec::new(
                TOOL_NAME,
                "Fetch a web page and return the text of its paragraphs",
            )
            .param(
                ParamSpec::required("url", ParamType::Text)
                    .with_description("Absolute http or https URL"),
            )
            .param(
                ParamSpec::optional("max_words", ParamType::Integer, DEFAULT_MAX_WORDS)
                    .with_description("Maximum number of words to return"),
            ),
        }
    }
}

/// Join the text of every `<p>` element, keeping at most `max_words` words.
pub fn extract_paragraphs(html: &str, max_words: usize) -> Result<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("p")
        .map_err(|e| AgentError::tool(TOOL_NAME, format!("invalid selector: {:?}", e)))?;

    let words: Vec<&str> = document
        .select(&selector)
        .flat_map(|p| p.text())
        .flat_map(str::split_whitespace)
        .take(max_words)
        .collect();
    Ok(words.join(" "))
}

#[async_trait]
impl Capability for FetchPage {
    fn spec(&self) -> &CapabilitySpec {
        &self.spec
    }

    async fn call(&self, invocation: &Invocation) -> Result<String> {
        let url = invocation
            .get_string_arg("url")
            .map_err(|e| AgentError::arguments(TOOL_NAME, e))?
            .trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(AgentError::arguments(
                TOOL_NAME,
                format!("unsupported URL: {:?}", url),
            ));
        }
        let max_words = invocation.u64_arg("max_words").unwrap_or(DEFAULT_MAX_WORDS) as usize;

        debug!(url = %url, max_words, "Fetching page");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AgentError::tool(TOOL_NAME, format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AgentError::tool(TOOL_NAME, format!("{} returned {}", url, status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AgentError::tool(TOOL_NAME, format!("failed to read response: {}", e)))?;
        let text = extract_paragraphs(&body, max_words)?;
        if text.is_empty() {
            Ok(format!("No paragraph text found at {}", url))
        } else {
            Ok(text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PAGE: &str = r#"<html><head><title>Ignored</title></head>
        <body><h1>Heading</h1>
        <p>Rust is a   systems
        programming language.</p>
        <div>not a paragraph</div>
        <p>It has <b>ownership</b> and borrowing.</p></body></html>"#;

    #[test]
    fn test_extract_paragraphs() {
        let text = extract_paragraphs(PAGE, 200).unwrap();
        assert_eq!(
            text,
            "Rust is a systems programming language. It has ownership and borrowing."
        );
    }

    #[test]
    fn test_extract_truncates() {
        assert_eq!(extract_paragraphs(PAGE, 4).unwrap(), "Rust is a systems");
        assert_eq!(extract_paragraphs(PAGE, 0).unwrap(), "");
    }

    #[test]
    fn test_extract_without_paragraphs() {
        assert_eq!(extract_paragraphs("<div>only</div>", 10).unwrap(), "");
    }

    #[tokio::test]
    async fn test_rejects_non_http_urls() {
        let tool = FetchPage::new();
        for url in ["file:///etc/passwd", "ftp://example.com", ""] {
            let err = tool
                .call(&Invocation::from_value("fetch_page", json!({ "url": url })))
                .await
                .unwrap_err();
            assert!(matches!(err, AgentError::InvalidArguments { .. }), "{}", url);
        }
    }

    #[test]
    fn test_spec_defaults() {
        let tool = FetchPage::new();
        let max_words = &tool.spec().params[1];
        assert!(!max_words.is_required());
        assert_eq!(max_words.default, Some(json!(200)));
    }
}
