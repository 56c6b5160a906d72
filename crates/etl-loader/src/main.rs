//! ETL Loader - staged CSV ingestion

use anyhow::Result;
use clap::{Parser, Subcommand};
use etl_common::logging::{init_logging, LogConfig, LogLevel};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use etl_loader::{
    api, build_pipeline,
    config::Config,
    db,
    ingest::{
        mapping::{confirm_column, pass_column_as_null},
        LoadLog, RunRequest,
    },
    mapping_repository,
};

#[derive(Parser, Debug)]
#[command(name = "etl-loader")]
#[command(author, version, about = "Load CSV exports into PostgreSQL staging tables")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load exports for a month range into staging tables
    Run {
        /// Comma-separated entities (products, prices, contracts)
        #[arg(short, long)]
        entity: String,

        /// First month, YYYYMM (defaults to the end month)
        #[arg(long)]
        start: Option<String>,

        /// Last month, YYYYMM
        #[arg(long)]
        end: String,

        /// Load id; generated from the current time when omitted
        #[arg(long)]
        load_id: Option<String>,

        /// Check connectivity first and consolidate views afterwards
        #[arg(long)]
        batch: bool,
    },

    /// Create or replace the staging views of a load
    Consolidate {
        load_id: String,
    },

    /// Probe the bucket and the database
    Check,

    /// Start the HTTP trigger API
    Serve,

    /// Inspect and confirm matching rules
    #[command(subcommand)]
    Mapping(MappingCommand),

    /// Print the load log of a load
    Log {
        load_id: String,
    },
}

#[derive(Subcommand, Debug)]
enum MappingCommand {
    /// List source files with a stored rule
    List,

    /// Print the rule of a source file
    Show { file: String },

    /// Confirm the suggested column for an expected column
    Confirm {
        file: String,
        column: String,

        /// Use this actual column instead of the stored suggestion
        #[arg(long)]
        actual: Option<String>,
    },

    /// Load an absent column as the `no_data` sentinel
    PassNull { file: String, column: String },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over the defaults below
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("etl-loader")
        .filter_directives("tower_http=info,sqlx=warn,aws_config=warn,aws_smithy_runtime=warn")
        .build()
        .merge_env()?;

    let _guard = init_logging(&log_config)?;

    let config = Config::load()?;

    match cli.command {
        Command::Run {
            entity,
            start,
            end,
            load_id,
            batch,
        } => {
            let pipeline = build_pipeline(&config).await?;
            let request = RunRequest {
                entities: entity,
                start_month: start,
                end_month: end,
                load_id,
            };

            if batch {
                print_json(&pipeline.run_batch(&request).await?)?;
            } else {
                print_json(&pipeline.run(&request).await?)?;
            }
        }
        Command::Consolidate { load_id } => {
            let pipeline = build_pipeline(&config).await?;
            print_json(&pipeline.consolidate(&load_id).await?)?;
        }
        Command::Check => {
            let pipeline = build_pipeline(&config).await?;
            pipeline.check_connectivity().await?;
            println!("Bucket '{}' and database are reachable", pipeline.bucket());
        }
        Command::Serve => {
            let pipeline = build_pipeline(&config).await?;
            api::serve(&config.server, Arc::new(pipeline)).await?;
        }
        Command::Mapping(command) => {
            let repository = mapping_repository(&config, None).await?;

            match command {
                MappingCommand::List => {
                    for file in repository.list().await? {
                        println!("{}", file);
                    }
                }
                MappingCommand::Show { file } => match repository.get(&file).await? {
                    Some(rule) => print_json(&rule)?,
                    None => anyhow::bail!("No matching rule stored for {}", file),
                },
                MappingCommand::Confirm {
                    file,
                    column,
                    actual,
                } => {
                    let rule =
                        confirm_column(repository.as_ref(), &file, &column, actual.as_deref())
                            .await?;
                    print_json(&rule)?;
                }
                MappingCommand::PassNull { file, column } => {
                    let rule = pass_column_as_null(repository.as_ref(), &file, &column).await?;
                    print_json(&rule)?;
                }
            }
        }
        Command::Log { load_id } => {
            let pool = db::create_pool(&config.database).await?;
            print_json(&LoadLog::new(pool).entries_for(&load_id).await?)?;
        }
    }

    info!("Done");
    Ok(())
}
