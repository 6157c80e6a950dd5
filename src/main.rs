//! newsquery - CLI entry point

use anyhow::{Context, Result};
use clap::Parser;
use futures_util::stream::{self, StreamExt};
use std::io::{BufRead, Write};
use std::process::ExitCode;
use std::sync::Arc;

use newsquery::{
    cli::{Args, Commands, SearchArgs},
    config::QueryConf,
    doctor::Doctor,
    errors::{ErrorClass, QueryError},
    pipeline::build_pipeline,
    telemetry::init_tracing,
    QueryPipeline, SearchRequest,
};

const EXIT_SERVICE_FAILURE: u8 = 1;
const EXIT_INPUT_ERROR: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.log_format, args.verbosity().filter_directive());

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "fatal");
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_code_for(&e))
        }
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    let config = QueryConf::load(args.config.clone()).context("Failed to load configuration")?;

    match args.command {
        Commands::Search(search) => run_search(&config, &search).await,
        Commands::Batch { limit } => run_batch(&config, limit).await,
        Commands::Doctor => {
            let checks = Doctor::new(config).run_diagnostics().await;
            Doctor::display_results(&checks);
            Ok(if Doctor::overall_status(&checks) {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(EXIT_SERVICE_FAILURE)
            })
        }
        Commands::Config => {
            println!("{}", config.to_redacted_toml()?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run_search(config: &QueryConf, search: &SearchArgs) -> Result<ExitCode> {
    let request = search.to_request()?;
    let pipeline = build_pipeline(config).context("Failed to start query pipeline")?;

    let response = pipeline.execute(request).await?;
    println!("{}", serde_json::to_string(&response)?);
    Ok(ExitCode::SUCCESS)
}

/// Queries run concurrently on one pipeline; output keeps input order
async fn run_batch(config: &QueryConf, limit: Option<usize>) -> Result<ExitCode> {
    let pipeline = Arc::new(build_pipeline(config).context("Failed to start query pipeline")?);

    let lines: Vec<String> = std::io::stdin()
        .lock()
        .lines()
        .collect::<std::io::Result<_>>()
        .context("Failed to read queries from stdin")?;

    let requests: Vec<SearchRequest> = lines
        .into_iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let request = SearchRequest::new(line);
            match limit {
                Some(limit) => request.with_limit(limit),
                None => request,
            }
        })
        .collect();

    let outputs: Vec<(String, bool)> = stream::iter(requests)
        .map(|request| run_one(Arc::clone(&pipeline), request))
        .buffered(num_cpus::get().max(1))
        .collect()
        .await;

    let failures = outputs.iter().filter(|(_, ok)| !ok).count();

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for (line, _) in &outputs {
        writeln!(out, "{}", line)?;
    }

    tracing::info!(queries = outputs.len(), failures, "batch complete");
    Ok(ExitCode::from(batch_exit_code(failures)))
}

/// Any failed query fails the batch, matching a failed `search`
fn batch_exit_code(failures: usize) -> u8 {
    if failures == 0 {
        0
    } else {
        EXIT_SERVICE_FAILURE
    }
}

/// One JSON line per query; failures become `{"query", "error"}` objects
async fn run_one(pipeline: Arc<QueryPipeline>, request: SearchRequest) -> (String, bool) {
    let text = request.text.clone();
    let outcome = match pipeline.execute(request).await {
        Ok(response) => serde_json::to_value(&response).map_err(QueryError::from),
        Err(e) => Err(e),
    };

    match outcome {
        Ok(value) => (value.to_string(), true),
        Err(e) => (
            serde_json::json!({ "query": text, "error": e.to_string() }).to_string(),
            false,
        ),
    }
}

fn exit_code_for(error: &anyhow::Error) -> u8 {
    match error.downcast_ref::<QueryError>().map(QueryError::class) {
        Some(ErrorClass::Client) => EXIT_INPUT_ERROR,
        _ => EXIT_SERVICE_FAILURE,
    }
}
