use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use llm_loadgen::{
    load_prompt_set, load_scenario_from_file, print_comparison, print_result, run_benchmark,
    run_scenario, write_responses, BenchmarkConfig, BenchmarkRun, EndpointKind,
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "llm-loadgen")]
#[command(about = "Send a batch of prompts concurrently to a text-generation API and report throughput")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Input filename, one prompt per line
    #[arg(long, global = true)]
    filename: Option<String>,

    /// Number of prompt requests to send (default: all prompts)
    #[arg(long, short, global = true)]
    num_requests: Option<usize>,

    /// Name of model(s) to use, comma separated or repeated
    #[arg(long, short, value_delimiter = ',', env = "LOADGEN_MODELS", global = true)]
    models: Vec<String>,

    /// Use a random model for each request
    #[arg(long, global = true)]
    randomize_models: bool,

    /// Seed for random model selection
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Base URL to send API requests to
    #[arg(long, env = "LOADGEN_BASE_URL", global = true)]
    base_url: Option<String>,

    /// API token for authorization
    #[arg(long, env = "LOADGEN_API_TOKEN", default_value = "", hide_env_values = true, global = true)]
    api_token: String,

    /// Endpoint kind
    #[arg(long, value_enum, default_value = "generate", global = true)]
    endpoint: EndpointArg,

    /// Request non-streamed responses
    #[arg(long, global = true)]
    no_stream: bool,

    /// File whose content is prepended to every prompt
    #[arg(long, global = true)]
    system_prompt_file: Option<String>,

    /// Socket connect/read timeout in seconds
    #[arg(long, default_value = "300", global = true)]
    timeout: u64,

    /// Print every generated response
    #[arg(long, global = true)]
    show_responses: bool,

    /// Enable verbose logging
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Benchmark several providers from a YAML scenario file
    Scenario {
        /// Path to the YAML scenario file
        #[arg(required = true)]
        file: String,
    },
    /// Run a single batch (default behavior)
    Run,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EndpointArg {
    Generate,
    Completions,
    Embeddings,
}

impl From<EndpointArg> for EndpointKind {
    fn from(arg: EndpointArg) -> Self {
        match arg {
            EndpointArg::Generate => EndpointKind::Generate,
            EndpointArg::Completions => EndpointKind::Completions,
            EndpointArg::Embeddings => EndpointKind::Embeddings,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Use RUST_LOG env var if set, otherwise use --verbose flag or default to "warn"
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if args.verbose {
            "debug".to_string()
        } else {
            "warn".to_string()
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(&filter)
        .with_writer(std::io::stderr)
        .init();

    match &args.command {
        Some(Commands::Scenario { file }) => run_scenario_command(file, args.show_responses).await,
        Some(Commands::Run) | None => run_single_benchmark(&args).await,
    }
}

fn show(run: &BenchmarkRun, show_responses: bool) -> Result<()> {
    if show_responses {
        write_responses(&mut std::io::stdout().lock(), &run.prompts, &run.outcomes)?;
    }
    print_result(&run.stats)?;
    Ok(())
}

async fn run_scenario_command(file: &str, show_responses: bool) -> Result<()> {
    info!("Loading scenario from: {}", file);
    let scenario = load_scenario_from_file(file)?;

    let runs = run_scenario(&scenario).await?;
    for run in &runs {
        show(run, show_responses)?;
    }

    if runs.len() > 1 {
        let stats: Vec<_> = runs.into_iter().map(|r| r.stats).collect();
        print_comparison(&stats)?;
    }
    Ok(())
}

async fn run_single_benchmark(args: &Args) -> Result<()> {
    let filename = args
        .filename
        .as_deref()
        .ok_or_else(|| anyhow!("--filename is required"))?;
    let base_url = args
        .base_url
        .clone()
        .ok_or_else(|| anyhow!("--base-url is required"))?;

    let config = BenchmarkConfig {
        name: None,
        base_url,
        api_token: args.api_token.clone(),
        models: args.models.clone(),
        randomize_models: args.randomize_models,
        seed: args.seed,
        endpoint: args.endpoint.into(),
        stream: !args.no_stream,
        timeout_secs: args.timeout,
        show_progress: true,
    };
    config.validate()?;

    let prompts =
        load_prompt_set(filename, args.num_requests, args.system_prompt_file.as_deref()).await?;
    info!(
        "Loaded {} prompts, models: {}",
        prompts.len(),
        config.models.join(", ")
    );

    let run = run_benchmark(&config, prompts).await?;
    show(&run, args.show_responses)
}
