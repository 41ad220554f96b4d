//! CLI tool to resolve, explain and validate `.env` files.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use envfile_rs::{CancellationToken, CompositeLookup, EnvFile, Lookup, NoLookup, OsEnv};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Debug, Parser)]
#[command(
    name = "envfile",
    about = "Resolve and explain .env environment files",
    version,
    after_help = "Examples:\n  envfile resolve .env\n  envfile resolve --host-env .env .env.local\n  envfile explain .env DATABASE_URL\n  envfile validate .env\n"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print every variable as NAME=value after expansion
    Resolve {
        /// Fall back to the host environment for undeclared names
        #[arg(long)]
        host_env: bool,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Show where a variable's value came from
    Explain {
        /// Fall back to the host environment for undeclared names
        #[arg(long)]
        host_env: bool,
        file: PathBuf,
        name: String,
    },
    /// Check that files parse and resolve
    Validate {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

fn main() -> ExitCode {
    // respects RUST_LOG
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cancel = CancellationToken::new();

    let mut had_error = false;

    match cli.command {
        Command::Resolve { host_env, files } => {
            let lookup = external(host_env);
            for path in &files {
                match load(path, &cancel, &*lookup) {
                    Ok(env) => {
                        for variable in &env {
                            println!("{}={}", variable.name, variable.value);
                        }
                    }
                    Err(e) => {
                        eprintln!("{}: {e}", path.display());
                        had_error = true;
                    }
                }
            }
        }
        Command::Explain {
            host_env,
            file,
            name,
        } => match load(&file, &cancel, &*external(host_env)) {
            Ok(env) => print!("{}", env.explain(&name)),
            Err(e) => {
                eprintln!("{}: {e}", file.display());
                had_error = true;
            }
        },
        Command::Validate { files } => {
            for path in &files {
                match load(path, &cancel, &NoLookup) {
                    Ok(env) => eprintln!("{}: valid ({} variable(s))", path.display(), env.len()),
                    Err(e) => {
                        eprintln!("{}: {e}", path.display());
                        had_error = true;
                    }
                }
            }
        }
    }

    if had_error {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn external(host_env: bool) -> Box<dyn Lookup> {
    if host_env {
        Box::new(CompositeLookup::new(vec![envfile_rs::with_priority(
            OsEnv, 0,
        )]))
    } else {
        Box::new(NoLookup)
    }
}

fn load(
    path: &Path,
    cancel: &CancellationToken,
    external: &dyn Lookup,
) -> Result<EnvFile, envfile_rs::Error> {
    let reader = BufReader::new(File::open(path)?);
    let mut env = envfile_rs::Parser::new()
        .source(path.display().to_string())
        .parse(reader, cancel)?;
    env.resolve_with(external)?;
    Ok(env)
}
