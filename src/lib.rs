//! Environment variable overrides for command-line flags.
//!
//! Every flag `service-port` can be set from `PREFIX_SERVICE_PORT` (or an
//! explicitly mapped variable). Values are applied before the command line
//! is parsed, so explicit arguments always win.
//!
//! ```no_run
//! use clap::Parser;
//!
//! #[derive(Parser)]
//! struct Cli {
//!     #[arg(long, default_value_t = 8080)]
//!     service_port: u16,
//! }
//!
//! envbind::set_prefix("APP_").unwrap();
//! let cli: Cli = envbind::parse().unwrap_or_else(|err| {
//!     eprintln!("{}", err);
//!     std::process::exit(2);
//! });
//! ```

mod binder;
mod env;
mod error;
mod naming;
mod registry;

pub mod global;

pub use binder::{Binder, DEFAULT_MIN_LENGTH};
pub use env::{EnvLookup, ProcessEnv};
pub use error::{BindError, DefaultsInUse, EnvErrors, FlagError};
pub use global::{parse, parse_from, set_prefix};
pub use naming::env_name;
pub use registry::{CommandRegistry, Flag, FlagRegistry};
