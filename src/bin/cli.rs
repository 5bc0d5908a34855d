use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tfbridge::interop::python::PythonInterop;
use tfbridge::{binding, Binding, BindingConfig, GpuStatus};
use tracing_subscriber::EnvFilter;

/// Inspect the TensorFlow installation seen from Rust.
#[derive(Parser)]
#[command(name = "tfbridge", version = tfbridge::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Show where TensorFlow and its interpreter were found.
    Config {
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print the installed TensorFlow version (major.minor).
    Version,

    /// Check whether TensorFlow can see a GPU.
    Gpu {
        /// Also print the CUDA build flag and device name.
        #[arg(short, long)]
        verbose: bool,
    },

    /// Print the documentation URL for a symbol such as `tf.nn.relu`.
    Help {
        topic: String,
    },
}

fn run(cli: Cli) -> tfbridge::Result<ExitCode> {
    let config = BindingConfig::from_env()?;
    let binding = binding::install(Binding::new(Arc::new(PythonInterop::new()), config))?;

    match cli.command {
        Command::Config { json } => {
            let report = binding.report()?;
            if json {
                println!("{}", report.to_json()?);
            } else {
                println!("{report}");
            }
            Ok(if report.available() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Version => match binding.version()? {
            Some(version) => {
                println!("{version}");
                Ok(ExitCode::SUCCESS)
            }
            None => {
                eprintln!("TensorFlow is not installed");
                Ok(ExitCode::FAILURE)
            }
        },
        Command::Gpu { verbose } => {
            let status = binding.gpu_available(verbose);
            println!("GPU: {status}");
            Ok(match status {
                GpuStatus::Available => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            })
        }
        Command::Help { topic } => match binding.help_url(&topic)? {
            Some(url) => {
                println!("{url}");
                Ok(ExitCode::SUCCESS)
            }
            None => {
                eprintln!("no TensorFlow documentation for '{topic}'");
                Ok(ExitCode::FAILURE)
            }
        },
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
