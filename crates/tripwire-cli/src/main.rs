use tracing::error;
use tripwire_cli::run_cli;

#[tokio::main]
async fn main() {
    if let Err(e) = run_cli().await {
        error!("CLI error: {}", e);

        let exit_code = match e {
            tripwire_cli::CliError::Store(_) => 1,
            tripwire_cli::CliError::Service(_) => 2,
            tripwire_cli::CliError::Engine(_) => 3,
            tripwire_cli::CliError::Notify(_) => 4,
            tripwire_cli::CliError::Task { .. } => 5,
        };

        std::process::exit(exit_code);
    }
}
