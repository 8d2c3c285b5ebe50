use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use envbind::{global, BindError};
use log::{debug, info};
use std::process;

const ENV_PREFIX: &str = "ENVFS_";

/// Example service whose flags can also be set from ENVFS_* variables
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Set logging level
    #[arg(long, value_enum, default_value_t = LogLevel::Error)]
    log_level: LogLevel,

    /// Address to listen on
    #[arg(long, default_value = "localhost")]
    service_addr: String,

    /// Port to listen on
    #[arg(long, default_value_t = 8080)]
    service_port: u16,

    /// Enable debug output
    #[arg(long)]
    debug: bool,

    /// Shorthand for --debug
    #[arg(short)]
    d: bool,

    /// Print the environment variable bound to each flag and exit
    #[arg(long)]
    list_env: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Debug, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

fn main() -> Result<()> {
    envbind::set_prefix(ENV_PREFIX).context("Failed to configure environment prefix")?;

    let cli: Cli = match envbind::parse() {
        Ok(cli) => cli,
        // help, version and usage errors are printed by clap itself
        Err(BindError::Parse(err)) => err.exit(),
        Err(err) => {
            eprintln!("error: {}", err);
            process::exit(2);
        }
    };

    // Initialize logger
    env_logger::Builder::new()
        .filter_level(cli.log_level.to_filter())
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false)
        .init();

    debug!("CLI arguments: {:#?}", cli);

    if cli.list_env {
        for (flag, env) in global::default_binder::<Cli>().bindings() {
            println!("--{:<16} {}", flag, env);
        }
        return Ok(());
    }

    info!("Resolved configuration from environment and arguments");

    println!("service-addr: {}", cli.service_addr);
    println!("service-port: {}", cli.service_port);
    println!("debug: {}", cli.debug || cli.d);

    Ok(())
}
