//! Benchmark and scenario configuration

use crate::error::{BenchError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which kind of endpoint the requests target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointKind {
    /// Ollama-style `generate`: NDJSON stream with `done` framing
    #[default]
    Generate,
    /// OpenAI-style `completions`
    Completions,
    /// OpenAI-style `embeddings`
    Embeddings,
}

impl EndpointKind {
    /// Path segment appended to the base URL.
    pub fn path(&self) -> &'static str {
        match self {
            EndpointKind::Generate => "generate",
            EndpointKind::Completions => "completions",
            EndpointKind::Embeddings => "embeddings",
        }
    }

    /// Whether responses can be streamed as NDJSON chunks.
    pub fn supports_streaming(&self) -> bool {
        matches!(self, EndpointKind::Generate)
    }

    /// Full request URL for this endpoint under `base_url`.
    pub fn url(&self, base_url: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), self.path())
    }
}

impl std::str::FromStr for EndpointKind {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "generate" => Ok(EndpointKind::Generate),
            "completions" => Ok(EndpointKind::Completions),
            "embeddings" => Ok(EndpointKind::Embeddings),
            other => Err(BenchError::Config(format!(
                "invalid endpoint kind '{}', expected generate, completions or embeddings",
                other
            ))),
        }
    }
}

/// Configuration for a single benchmark run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    /// Name/identifier for this benchmark
    #[serde(default)]
    pub name: Option<String>,
    /// Base URL the endpoint path is appended to
    pub base_url: String,
    /// Bearer token; omitted from requests when empty
    #[serde(default)]
    pub api_token: String,
    /// Candidate model names
    pub models: Vec<String>,
    /// Pick a random model per request instead of the first one
    #[serde(default)]
    pub randomize_models: bool,
    /// Seed for random model selection
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub endpoint: EndpointKind,
    /// Ask for a streamed response (only honored by `generate`)
    #[serde(default = "default_stream")]
    pub stream: bool,
    /// Per-socket connect/read timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Draw a progress bar while requests are in flight
    #[serde(default = "default_show_progress")]
    pub show_progress: bool,
}

fn default_stream() -> bool {
    true
}
fn default_timeout() -> u64 {
    300
}
fn default_show_progress() -> bool {
    true
}

impl BenchmarkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Streaming actually requested on the wire.
    pub fn streaming(&self) -> bool {
        self.stream && self.endpoint.supports_streaming()
    }

    pub fn validate(&self) -> Result<()> {
        if self.models.is_empty() {
            return Err(BenchError::Config(
                "at least one model name is required".to_string(),
            ));
        }
        if self.base_url.trim().is_empty() {
            return Err(BenchError::Config("base URL is required".to_string()));
        }
        Ok(())
    }
}

/// A provider entry in a scenario file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Name of the provider
    pub name: String,
    /// Base URL of the API
    pub base_url: String,
    #[serde(default)]
    pub api_token: String,
    /// Optional model override for this provider
    #[serde(default)]
    pub models: Option<Vec<String>>,
}

/// Where a scenario's prompts come from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptSource {
    /// Prompts file, one per line
    pub path: String,
    /// Number of requests to send (default: one per prompt)
    #[serde(default)]
    pub num_requests: Option<usize>,
    /// File whose content is prepended to every prompt
    #[serde(default)]
    pub system_prompt_path: Option<String>,
}

/// A complete scenario configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub models: Vec<String>,
    #[serde(default)]
    pub randomize_models: bool,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub endpoint: EndpointKind,
    #[serde(default = "default_stream")]
    pub stream: bool,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    pub prompts: PromptSource,
    /// Providers benchmarked one after another
    pub providers: Vec<ProviderConfig>,
}

impl Scenario {
    /// Run configuration for one provider of this scenario.
    pub fn config_for(&self, provider: &ProviderConfig) -> BenchmarkConfig {
        BenchmarkConfig {
            name: Some(provider.name.clone()),
            base_url: provider.base_url.clone(),
            api_token: provider.api_token.clone(),
            models: provider
                .models
                .clone()
                .unwrap_or_else(|| self.models.clone()),
            randomize_models: self.randomize_models,
            seed: self.seed,
            endpoint: self.endpoint,
            stream: self.stream,
            timeout_secs: self.timeout_secs,
            show_progress: true,
        }
    }
}

/// Replace every `${VAR_NAME}` with the value of that environment variable.
/// All unset variables are reported together.
fn expand_env_vars(s: &str) -> Result<String> {
    let re = regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .map_err(|e| BenchError::Config(format!("invalid env var pattern: {}", e)))?;
    let mut missing_vars = Vec::new();

    let expanded = re.replace_all(s, |caps: &regex::Captures<'_>| {
        std::env::var(&caps[1]).unwrap_or_else(|_| {
            missing_vars.push(caps[1].to_string());
            String::new()
        })
    });

    if !missing_vars.is_empty() {
        return Err(BenchError::Config(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }
    Ok(expanded.into_owned())
}

/// Expand environment variables in a scenario's provider credentials
pub fn expand_scenario_env_vars(mut scenario: Scenario) -> Result<Scenario> {
    for provider in &mut scenario.providers {
        provider.api_token = expand_env_vars(&provider.api_token)?;
        provider.base_url = expand_env_vars(&provider.base_url)?;
    }
    Ok(scenario)
}

pub fn parse_scenario(content: &str) -> Result<Scenario> {
    let scenario: Scenario = serde_yaml::from_str(content)?;
    if scenario.providers.is_empty() {
        return Err(BenchError::Config(format!(
            "scenario '{}' lists no providers",
            scenario.name
        )));
    }
    expand_scenario_env_vars(scenario)
}

/// Load a scenario from a YAML file
pub fn load_scenario_from_file(path: &str) -> Result<Scenario> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| BenchError::Config(format!("Failed to read scenario file {}: {}", path, e)))?;
    parse_scenario(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = r#"
name: ollama-vs-vllm
models: [llama3]
prompts:
  path: prompts.txt
  num_requests: 20
providers:
  - name: local
    base_url: http://localhost:11434/api
  - name: remote
    base_url: ${LOADGEN_TEST_REMOTE_URL}
    api_token: ${LOADGEN_TEST_REMOTE_TOKEN}
    models: [mistral, llama3]
"#;

    #[test]
    fn test_endpoint_kind_url_and_parse() {
        assert_eq!(
            EndpointKind::Generate.url("http://localhost:11434/api/"),
            "http://localhost:11434/api/generate"
        );
        assert_eq!(
            "Embeddings".parse::<EndpointKind>().unwrap(),
            EndpointKind::Embeddings
        );
        assert!("chat".parse::<EndpointKind>().is_err());
    }

    #[test]
    fn test_parse_scenario_expands_env_and_defaults() {
        std::env::set_var("LOADGEN_TEST_REMOTE_URL", "https://remote.example/v1");
        std::env::set_var("LOADGEN_TEST_REMOTE_TOKEN", "secret");

        let scenario = parse_scenario(SCENARIO).unwrap();
        assert_eq!(scenario.endpoint, EndpointKind::Generate);
        assert!(scenario.stream);
        assert_eq!(scenario.timeout_secs, 300);
        assert_eq!(scenario.prompts.num_requests, Some(20));

        let remote = &scenario.providers[1];
        assert_eq!(remote.base_url, "https://remote.example/v1");
        assert_eq!(remote.api_token, "secret");

        let local_cfg = scenario.config_for(&scenario.providers[0]);
        assert_eq!(local_cfg.models, vec!["llama3"]);
        let remote_cfg = scenario.config_for(remote);
        assert_eq!(remote_cfg.models, vec!["mistral", "llama3"]);
        assert_eq!(remote_cfg.name.as_deref(), Some("remote"));
    }

    #[test]
    fn test_missing_env_var_is_config_error() {
        let err = expand_env_vars("${LOADGEN_TEST_SURELY_UNSET_VAR}").unwrap_err();
        assert!(matches!(err, BenchError::Config(msg) if msg.contains("LOADGEN_TEST_SURELY_UNSET_VAR")));
    }

    #[test]
    fn test_env_vars_expand_in_place_and_missing_ones_are_listed() {
        std::env::set_var("LOADGEN_TEST_HOST", "gpu-01");
        let url = expand_env_vars("http://${LOADGEN_TEST_HOST}:8000/${LOADGEN_TEST_HOST}").unwrap();
        assert_eq!(url, "http://gpu-01:8000/gpu-01");
        assert_eq!(expand_env_vars("plain").unwrap(), "plain");

        let err = expand_env_vars("${LOADGEN_TEST_UNSET_A}/${LOADGEN_TEST_UNSET_B}").unwrap_err();
        assert!(matches!(
            err,
            BenchError::Config(msg) if msg.contains("LOADGEN_TEST_UNSET_A, LOADGEN_TEST_UNSET_B")
        ));
    }

    #[test]
    fn test_streaming_only_for_generate() {
        let mut cfg = BenchmarkConfig {
            name: None,
            base_url: "http://localhost".to_string(),
            api_token: String::new(),
            models: vec!["m".to_string()],
            randomize_models: false,
            seed: None,
            endpoint: EndpointKind::Completions,
            stream: true,
            timeout_secs: 300,
            show_progress: false,
        };
        assert!(!cfg.streaming());
        cfg.endpoint = EndpointKind::Generate;
        assert!(cfg.streaming());
        cfg.models.clear();
        assert!(cfg.validate().is_err());
    }
}
