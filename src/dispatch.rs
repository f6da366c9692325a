//! Concurrent request dispatch
//!
//! Every request runs in its own task against one shared [`Client`]. The
//! handles are awaited in submission order, so outcome `i` always belongs to
//! spec `i` no matter which request finishes first.

use crate::config::{BenchmarkConfig, EndpointKind};
use crate::error::{RequestError, Result};
use crate::prompts::choose_model;
use futures::StreamExt;
use indicatif::ProgressBar;
use rand::Rng;
use reqwest::Client;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Build the shared, pooled HTTP client.
///
/// The timeout bounds connecting and each individual socket read; there is
/// no deadline on a request as a whole, so long streams are fine as long as
/// bytes keep arriving.
pub fn build_http_client(timeout: Duration) -> Result<Client> {
    let client = Client::builder()
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_nodelay(true)
        .tcp_keepalive(Duration::from_secs(60))
        .connect_timeout(timeout)
        .read_timeout(timeout)
        .build()?;
    Ok(client)
}

/// Everything needed to send one request. Built once, never modified.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub prompt: String,
    pub model: String,
    /// Full URL the request is POSTed to
    pub endpoint: String,
    pub headers: BTreeMap<String, String>,
    pub streaming: bool,
    pub kind: EndpointKind,
}

impl RequestSpec {
    fn body(&self) -> RequestBody<'_> {
        match self.kind {
            EndpointKind::Generate | EndpointKind::Completions => RequestBody::Prompt {
                model: &self.model,
                prompt: &self.prompt,
                stream: self.streaming,
            },
            EndpointKind::Embeddings => RequestBody::Input {
                model: &self.model,
                input: &self.prompt,
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RequestBody<'a> {
    Prompt {
        model: &'a str,
        prompt: &'a str,
        stream: bool,
    },
    Input {
        model: &'a str,
        input: &'a str,
    },
}

/// A successfully transported response body with client-side timings.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub body: Vec<u8>,
    pub latency: Duration,
    pub time_to_first_byte: Option<Duration>,
}

/// Result of one dispatched request.
#[derive(Debug)]
pub enum RawOutcome {
    Success(RawResponse),
    Failure(RequestError),
}

impl RawOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RawOutcome::Success(_))
    }
}

/// Resolve one [`RequestSpec`] per prompt, choosing each request's model.
pub fn build_request_specs<R: Rng + ?Sized>(
    config: &BenchmarkConfig,
    prompts: &[String],
    rng: &mut R,
) -> Result<Vec<RequestSpec>> {
    let endpoint = config.endpoint.url(&config.base_url);
    let streaming = config.streaming();

    let mut headers = BTreeMap::new();
    headers.insert("Content-Type".to_string(), "application/json".to_string());
    if !config.api_token.is_empty() {
        headers.insert(
            "Authorization".to_string(),
            format!("Bearer {}", config.api_token),
        );
    }

    prompts
        .iter()
        .map(|prompt| {
            let model = choose_model(&config.models, config.randomize_models, &mut *rng)?;
            Ok(RequestSpec {
                prompt: prompt.clone(),
                model: model.to_string(),
                endpoint: endpoint.clone(),
                headers: headers.clone(),
                streaming,
                kind: config.endpoint,
            })
        })
        .collect()
}

async fn send_request(
    client: &Client,
    spec: &RequestSpec,
) -> std::result::Result<RawResponse, RequestError> {
    let start_time = Instant::now();

    let mut req_builder = client.post(&spec.endpoint);
    for (name, value) in &spec.headers {
        req_builder = req_builder.header(name.as_str(), value.as_str());
    }

    let response = req_builder.json(&spec.body()).send().await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(RequestError::Status {
            status: status.as_u16(),
            body,
        });
    }

    let mut body = Vec::new();
    let mut first_byte: Option<Duration> = None;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if first_byte.is_none() && !chunk.is_empty() {
            first_byte = Some(start_time.elapsed());
        }
        body.extend_from_slice(&chunk);
    }

    Ok(RawResponse {
        body,
        latency: start_time.elapsed(),
        time_to_first_byte: first_byte,
    })
}

/// Send every spec concurrently and wait for all of them.
///
/// The returned vector has one outcome per spec, in the same order. A failed
/// request only affects its own slot.
pub async fn dispatch_all(
    client: &Client,
    specs: Vec<RequestSpec>,
    progress: &ProgressBar,
) -> Vec<RawOutcome> {
    let mut handles = Vec::with_capacity(specs.len());

    for (index, spec) in specs.into_iter().enumerate() {
        let client = client.clone();
        let progress = progress.clone();

        handles.push(tokio::spawn(async move {
            let result = send_request(&client, &spec).await;
            progress.inc(1);

            match result {
                Ok(response) => {
                    debug!(
                        index,
                        model = %spec.model,
                        bytes = response.body.len(),
                        latency_ms = response.latency.as_millis() as u64,
                        "request completed"
                    );
                    RawOutcome::Success(response)
                }
                Err(e) => {
                    warn!(index, model = %spec.model, "Request failed: {}", e);
                    RawOutcome::Failure(e)
                }
            }
        }));
    }

    let mut outcomes = Vec::with_capacity(handles.len());
    for handle in handles {
        let outcome = handle
            .await
            .unwrap_or_else(|e| RawOutcome::Failure(RequestError::Task(e.to_string())));
        outcomes.push(outcome);
    }
    outcomes
}
