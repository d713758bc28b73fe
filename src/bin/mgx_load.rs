use std::process::ExitCode;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use mgx_loader::app::HttpApp;
use mgx_loader::config::ConfigLoader;
use mgx_loader::error::LoaderError;
use mgx_loader::output::JsonOutput;

const SUPPORT_URL: &str = "https://www.ebi.ac.uk/ena/browser/support";

#[derive(Parser)]
#[command(name = "mgx-load")]
#[command(
    about = "Downloads INSDC ID to source ID mappings and loads datasets into the Metagenome Exchange Registry"
)]
#[command(version)]
struct Cli {}

fn main() -> ExitCode {
    let _cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(report) = run() {
        error!("something unexpected went wrong, please try again");
        error!("if the problem persists, please contact us at {SUPPORT_URL} for assistance");
        eprintln!("{report:?}");
        if let Some(loader) = report.downcast_ref::<LoaderError>() {
            return ExitCode::from(map_exit_code(loader));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &LoaderError) -> u8 {
    match error {
        err if err.is_config() => 2,
        LoaderError::DownloadHttp(_) | LoaderError::DownloadStatus { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    let settings = ConfigLoader::from_env()?;
    let app = HttpApp::connect(settings)?;
    let summary = app.run()?;
    if let Err(err) = JsonOutput::print_summary(&summary) {
        error!(error = %err, "could not write run summary");
    }
    Ok(())
}
