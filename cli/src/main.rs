use clap::{Parser, Subcommand};
use std::process;

mod commands;
mod error;
mod output;

use commands::{config, demo};
use error::{exit_codes, CliError};

/// supervisorctl - operator CLI for the fleet supervisor control plane
#[derive(Parser)]
#[command(name = "supervisorctl")]
#[command(author = "Fleet Supervisor Contributors")]
#[command(version)]
#[command(about = "Operator CLI for the fleet supervisor control plane", long_about = None)]
#[command(propagate_version = true)]
#[command(arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration management commands
    #[command(subcommand)]
    Config(config::ConfigCommands),

    /// Run an in-process rehearsal of the supervisor against simulated
    /// workers, to validate a configuration before wiring up real ones
    #[command(visible_alias = "d")]
    Demo(demo::DemoArgs),

    /// Generate shell completions
    Completions {
        /// The shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let result = match cli.command {
        Commands::Config(cmd) => config::execute(cmd, cli.verbose).await,
        Commands::Demo(args) => demo::execute(args, cli.verbose).await,
        Commands::Completions { shell } => {
            generate_completions(shell);
            Ok(())
        }
    };

    if let Err(e) = result {
        match e.downcast_ref::<CliError>() {
            Some(cli_err) => {
                cli_err.print_error();
                let code = match cli_err {
                    CliError::ConfigAlreadyExists { .. } | CliError::Configuration { .. } => exit_codes::CONFIG_ERROR,
                    CliError::InvalidInput { .. } => exit_codes::INVALID_INPUT,
                    CliError::Supervisor(_) => exit_codes::ERROR,
                };
                if cli.verbose {
                    eprintln!("\nCaused by:");
                    for cause in e.chain().skip(1) {
                        eprintln!("  {cause}");
                    }
                }
                process::exit(code);
            }
            None => {
                eprintln!("Error: {e}");
                if cli.verbose {
                    eprintln!("\nCaused by:");
                    for cause in e.chain().skip(1) {
                        eprintln!("  {cause}");
                    }
                }
                process::exit(exit_codes::ERROR);
            }
        }
    }
}

fn generate_completions(shell: clap_complete::Shell) {
    use clap::CommandFactory;
    use clap_complete::generate;
    use std::io;

    let mut cmd = Cli::command();
    let bin_name = cmd.get_name().to_string();
    generate(shell, &mut cmd, bin_name, &mut io::stdout());
}
