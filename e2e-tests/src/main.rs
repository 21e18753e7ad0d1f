use camino::Utf8PathBuf;
use clap::Parser;
use eyre::{Result as EyreResult, WrapErr};
use tokio::fs::{create_dir_all, read};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::driver::Driver;
use crate::output::{OutputFormat, OutputWriter};

mod auth;
mod config;
mod connection;
mod driver;
mod engine;
mod errors;
mod listener;
mod model;
mod output;
mod protocol;
mod steps;
mod verify;

#[derive(Debug, Parser)]
#[command(about = "Conformance and stress test harness for the foobox document-sync service")]
pub struct Args {
    /// Host to run service discovery against, e.g. `localhost:3000`.
    pub host: String,

    /// Path to the service's sqlite database, used to mint the admin token.
    #[arg(long, value_name = "PATH", default_value = "test.sqlite")]
    pub db: Utf8PathBuf,

    /// Path to the scenario file describing the steps to run.
    #[arg(long, value_name = "PATH", default_value = "config/test.json")]
    pub config: Utf8PathBuf,

    /// Directory to write the run report into.
    #[arg(long, value_name = "PATH", default_value = "output")]
    pub output_dir: Utf8PathBuf,

    #[arg(long, value_name = "FORMAT", value_enum, default_value = "plain-text")]
    pub output_format: OutputFormat,
}

#[derive(Debug)]
pub struct TestEnvironment {
    pub host: String,
    pub db_path: Utf8PathBuf,
    pub output_dir: Utf8PathBuf,
    pub output_writer: OutputWriter,
}

impl From<&Args> for TestEnvironment {
    fn from(args: &Args) -> Self {
        Self {
            host: args.host.clone(),
            db_path: args.db.clone(),
            output_dir: args.output_dir.clone(),
            output_writer: OutputWriter::new(args.output_format),
        }
    }
}

#[tokio::main]
async fn main() -> EyreResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let environment = TestEnvironment::from(&args);

    let config_raw = read(&args.config)
        .await
        .wrap_err_with(|| format!("failed to read scenario file {}", args.config))?;
    let config: Config = serde_json::from_slice(&config_raw)
        .wrap_err_with(|| format!("invalid scenario file {}", args.config))?;

    create_dir_all(&environment.output_dir).await?;

    Driver::new(environment, config).run().await
}
