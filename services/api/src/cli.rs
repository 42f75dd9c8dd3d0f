use crate::demo::{
    run_check_report, run_demo, run_validation_report, CheckArgs, DemoArgs, ValidateArgs,
};
use crate::server;
use care_docs::error::AppError;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "Care Document Compliance",
    about = "Schedule, validate and regenerate home-visit care compliance documents",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Evaluate every client's document schedules from a JSON snapshot
    Check(CheckArgs),
    /// Run the pre-audit validation rules from a JSON snapshot
    Validate(ValidateArgs),
    /// Walk through check, execute and validate against seeded sample clients
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Seed the in-memory store from a JSON snapshot
    #[arg(long)]
    pub(crate) snapshot: Option<PathBuf>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Check(args) => run_check_report(args),
        Command::Validate(args) => run_validation_report(args),
        Command::Demo(args) => run_demo(args),
    }
}
