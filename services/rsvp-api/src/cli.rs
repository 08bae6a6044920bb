use crate::demo::{print_forms, run_demo, DemoArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use lodge_rsvp::error::AppError;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "Lodge RSVP",
    about = "Serve and demonstrate the lodge event RSVP forms from the command line",
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
    /// List the configured forms and their fields
    Forms,
    /// Run a scripted RSVP walkthrough against in-memory collaborators
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
    /// JSON form catalog replacing the built-in event presets
    #[arg(long)]
    pub(crate) forms: Option<PathBuf>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Forms => print_forms(),
        Command::Demo(args) => run_demo(args).await,
    }
}
