// SPDX-License-Identifier: Apache-2.0

//! Headless runner
//!
//! ```bash
//! # Run a job and print the output records
//! fabricsql-node run job.json
//!
//! # Check the job's credentials only
//! fabricsql-node test-connection job.json
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::error;

use fabricsql_node::engine::configure_connection;
use fabricsql_node::node::expression::JsonPathResolver;
use fabricsql_node::node::job::Job;
use fabricsql_node::node::{self, ConnectionStatus};
use fabricsql_node::observability::init_tracing;
use fabricsql_node::EngineResult;

#[derive(Parser)]
#[command(name = "fabricsql-node")]
#[command(author, version, about = "Run SQL Server / Fabric SQL node jobs outside a workflow host")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a job file and print the output records as JSON
    Run {
        /// Path to the job file
        job: PathBuf,
    },

    /// Connect with the job's credentials and report the result
    TestConnection {
        /// Path to the job file
        job: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run { job } => run(job).await,
        Commands::TestConnection { job } => check(job).await,
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!(error = %e, kind = e.kind(), "Job failed");
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(path: PathBuf) -> EngineResult<bool> {
    let job = Job::load(&path)?;
    let items = job.input_items();
    let parameters = job.item_parameters()?;
    let mut connection = configure_connection(job.credentials()?, job.options.max_connections);

    let output = node::execute(
        connection.as_mut(),
        job.operation,
        &items,
        &parameters,
        &job.options,
        &JsonPathResolver,
    )
    .await?;

    print_json(&output)?;
    Ok(true)
}

async fn check(path: PathBuf) -> EngineResult<bool> {
    let job = Job::load(&path)?;
    let mut connection = configure_connection(job.credentials()?, job.options.max_connections);
    let result = node::test_connection(connection.as_mut()).await;
    print_json(&result)?;
    Ok(result.status == ConnectionStatus::Ok)
}

fn print_json<T: serde::Serialize>(value: &T) -> EngineResult<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| fabricsql_node::EngineError::internal(e.to_string()))?;
    println!("{}", text);
    Ok(())
}
