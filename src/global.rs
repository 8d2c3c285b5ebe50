//! Process-wide default binder.
//!
//! Mirrors the zero-configuration path: set a prefix once at startup, then
//! call [`parse`] to read the derived `clap` type from the environment and
//! `std::env::args_os()`. The configuration freezes on first use.

use crate::binder::{Binder, DEFAULT_MIN_LENGTH};
use crate::error::{BindError, DefaultsInUse};
use crate::registry::CommandRegistry;
use clap::{CommandFactory, FromArgMatches, Parser};
use once_cell::sync::Lazy;
use std::ffi::OsString;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
struct Defaults {
    prefix: String,
    in_use: bool,
}

static DEFAULTS: Lazy<Mutex<Defaults>> = Lazy::new(|| {
    Mutex::new(Defaults {
        prefix: String::new(),
        in_use: false,
    })
});

fn defaults() -> MutexGuard<'static, Defaults> {
    DEFAULTS.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Set the prefix of the default binder.
///
/// Only allowed before the first [`parse`] or [`parse_from`].
pub fn set_prefix(prefix: impl Into<String>) -> Result<(), DefaultsInUse> {
    let mut defaults = defaults();
    if defaults.in_use {
        return Err(DefaultsInUse);
    }
    defaults.prefix = prefix.into();
    Ok(())
}

/// Prefix the default binder uses.
pub fn prefix() -> String {
    defaults().prefix.clone()
}

/// Parse `P` from the environment and the process arguments.
pub fn parse<P: Parser>() -> Result<P, BindError<clap::Error>> {
    parse_from(std::env::args_os())
}

/// Parse `P` from the environment and `args` (first item is the binary name).
pub fn parse_from<P, I, T>(args: I) -> Result<P, BindError<clap::Error>>
where
    P: Parser,
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let mut binder = default_binder::<P>();
    let matches = binder.parse(args)?;
    <P as FromArgMatches>::from_arg_matches(&matches).map_err(BindError::Parse)
}

/// Binder over `P`'s command carrying the default configuration.
pub fn default_binder<P: Parser>() -> Binder<CommandRegistry> {
    let prefix = {
        let mut defaults = defaults();
        defaults.in_use = true;
        defaults.prefix.clone()
    };
    Binder::new(CommandRegistry::new(<P as CommandFactory>::command()))
        .prefix(prefix)
        .min_length(DEFAULT_MIN_LENGTH)
        .update_usage(true)
}
