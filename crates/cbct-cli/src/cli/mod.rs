mod commands;

use cbct_core::domain::{CbctError, codes};
use clap::Parser;

pub fn run_from_env() -> i32 {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(args) {
        Ok(code) => code,
        Err(error) => {
            let error = error.as_cbct_error();
            eprintln!("{}", error.diagnostic_line());
            if let Some(summary_line) = error.fatal_exit_line() {
                eprintln!("{}", summary_line);
            }
            error.exit_code()
        }
    }
}

pub fn run<I, S>(args: I) -> Result<i32, CliError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let full_args = std::iter::once("egs-cbct-rs".to_string())
        .chain(args.into_iter().map(Into::into))
        .collect::<Vec<_>>();
    parse_and_dispatch(full_args)
}

fn parse_and_dispatch(args: Vec<String>) -> Result<i32, CliError> {
    match Cli::try_parse_from(&args) {
        Ok(cli) => dispatch_parsed(cli.command),
        Err(err) => match err.kind() {
            clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                print!("{}", err);
                Ok(0)
            }
            _ => Err(CliError::Usage(err.to_string())),
        },
    }
}

#[derive(Parser)]
#[command(
    name = "egs-cbct-rs",
    version,
    about = "Cone-beam CT scatter simulation with variance reduction"
)]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(clap::Subcommand)]
enum CliCommand {
    /// Run one job of a scan simulation
    Run(commands::RunArgs),
    /// Validate a configuration and build its geometry without simulating
    Check(commands::CheckArgs),
}

fn dispatch_parsed(command: CliCommand) -> Result<i32, CliError> {
    match command {
        CliCommand::Run(args) => commands::run_scan_command(args),
        CliCommand::Check(args) => commands::run_check_command(args),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error("{0}")]
    Compute(CbctError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<CbctError> for CliError {
    fn from(error: CbctError) -> Self {
        Self::Compute(error)
    }
}

impl CliError {
    fn as_cbct_error(&self) -> CbctError {
        match self {
            Self::Usage(message) => CbctError::input_validation(codes::INPUT_CLI_USAGE, message.clone()),
            Self::Compute(error) => error.clone(),
            Self::Internal(error) => CbctError::internal(codes::SYS_CLI, format!("{error:#}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CliError, run};

    #[test]
    fn help_is_not_an_error() {
        assert_eq!(run(["--help"]).expect("help should print"), 0);
        assert_eq!(run(["run", "--help"]).expect("help should print"), 0);
    }

    #[test]
    fn unknown_arguments_are_usage_errors() {
        let error = run(["run"]).expect_err("config path is required");
        assert!(matches!(error, CliError::Usage(_)));
        assert_eq!(error.as_cbct_error().exit_code(), 2);
    }

    #[test]
    fn missing_config_maps_to_an_io_error() {
        let error = run(["check", "/nonexistent/scan.json"]).expect_err("config is missing");
        let error = error.as_cbct_error();
        assert_eq!(error.code(), "IO.CONFIG_READ");
        assert_eq!(error.exit_code(), 3);
    }
}
