//! LLM Loadgen - concurrent load generator for text-generation endpoints
//!
//! A run takes a prompt set, fires one request per prompt at the same time,
//! decodes each response (NDJSON streams or single documents) and reduces the
//! results into throughput and latency statistics.

pub mod config;
pub mod decode;
pub mod dispatch;
pub mod error;
pub mod prompts;
pub mod report;
pub mod stats;

pub use config::{
    load_scenario_from_file, parse_scenario, BenchmarkConfig, EndpointKind, PromptSource,
    ProviderConfig, Scenario,
};
pub use decode::{decode_document, decode_outcome, decode_stream, DecodedRecord, StreamDecoder};
pub use dispatch::{
    build_http_client, build_request_specs, dispatch_all, RawOutcome, RawResponse, RequestSpec,
};
pub use error::{BenchError, DecodeError, InsufficientData, RequestError, Result};
pub use prompts::{
    build_prompt_set, choose_model, generate_n, load_prompts_file, load_system_prompt,
    with_system_prompt,
};
pub use report::{print_comparison, print_result, write_comparison, write_responses, write_result};
pub use stats::{aggregate, mean, median, percentile, AggregateStats, SampleSummary, Stat};

use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::SeedableRng;
use reqwest::Client;
use std::time::Instant;
use tracing::{info, warn};

/// Everything a finished batch produced, in submission order.
#[derive(Debug)]
pub struct BenchmarkRun {
    pub prompts: Vec<String>,
    pub outcomes: Vec<std::result::Result<DecodedRecord, RequestError>>,
    pub stats: AggregateStats,
}

fn progress_bar(len: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let progress = ProgressBar::new(len as u64);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    progress.set_style(style);
    progress
}

/// Load prompts from disk and shape them for a run.
///
/// The system prompt, if any, is prepended before cycling to `num_requests`.
pub async fn load_prompt_set(
    path: &str,
    num_requests: Option<usize>,
    system_prompt_path: Option<&str>,
) -> Result<Vec<String>> {
    let mut prompts = load_prompts_file(path).await?;
    if let Some(system_path) = system_prompt_path {
        let system = load_system_prompt(system_path).await?;
        prompts = with_system_prompt(prompts, &system);
    }
    build_prompt_set(prompts, num_requests)
}

/// Run one batch on an existing client.
pub async fn run_batch(
    client: &Client,
    config: &BenchmarkConfig,
    prompts: Vec<String>,
) -> Result<BenchmarkRun> {
    config.validate()?;

    let mut rng = match config.seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };
    let specs = build_request_specs(config, &prompts, &mut rng)?;

    info!(
        "Dispatching {} requests to {} (streaming: {})",
        specs.len(),
        config.endpoint.url(&config.base_url),
        config.streaming()
    );

    let progress = progress_bar(specs.len(), config.show_progress);
    let start_time = Instant::now();
    let raw = dispatch_all(client, specs, &progress).await;
    progress.finish_with_message("Batch complete");
    info!(
        "All {} requests finished in {:.2}s",
        raw.len(),
        start_time.elapsed().as_secs_f64()
    );

    let streaming = config.streaming();
    let outcomes: Vec<_> = raw
        .into_iter()
        .enumerate()
        .map(|(index, outcome)| {
            let transported = outcome.is_success();
            let decoded = decode_outcome(config.endpoint, streaming, outcome);
            if let (true, Err(e)) = (transported, &decoded) {
                warn!(index, "Could not decode response: {}", e);
            }
            decoded
        })
        .collect();

    let stats = aggregate(&outcomes).with_name(config.name.clone());
    if stats.num_errors > 0 {
        warn!(
            "{}/{} requests produced no timing data",
            stats.num_errors, stats.num_requests
        );
    }

    Ok(BenchmarkRun {
        prompts,
        outcomes,
        stats,
    })
}

/// Run a benchmark with the given configuration on a fresh client.
pub async fn run_benchmark(config: &BenchmarkConfig, prompts: Vec<String>) -> Result<BenchmarkRun> {
    let client = build_http_client(config.timeout())?;
    run_batch(&client, config, prompts).await
}

/// Run a complete scenario: the same prompt set against each provider in turn.
pub async fn run_scenario(scenario: &Scenario) -> Result<Vec<BenchmarkRun>> {
    info!("Running scenario: {}", scenario.name);
    if let Some(desc) = &scenario.description {
        info!("Description: {}", desc);
    }

    // Load prompts once for all providers
    let prompts = load_prompt_set(
        &scenario.prompts.path,
        scenario.prompts.num_requests,
        scenario.prompts.system_prompt_path.as_deref(),
    )
    .await?;

    let mut runs = Vec::with_capacity(scenario.providers.len());
    for provider in &scenario.providers {
        let config = scenario.config_for(provider);
        config.validate()?;
        info!(
            "Testing provider: {} ({}) with models: {}",
            provider.name,
            provider.base_url,
            config.models.join(", ")
        );
        runs.push(run_benchmark(&config, prompts.clone()).await?);
    }

    Ok(runs)
}
