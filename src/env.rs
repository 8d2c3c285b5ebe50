use std::collections::{BTreeMap, HashMap};
use std::env;
use std::ffi::OsString;

/// Source of environment variable values.
///
/// The binder only ever asks for one variable at a time, so any key/value
/// store can stand in for the process environment. Values are raw
/// `OsString`s, exactly as a command-line argument would arrive.
pub trait EnvLookup: Send + Sync {
    /// Return the value of `name`, or `None` if it is not set.
    fn get_env(&self, name: &str) -> Option<OsString>;
}

/// Reads the real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvLookup for ProcessEnv {
    fn get_env(&self, name: &str) -> Option<OsString> {
        env::var_os(name)
    }
}

impl EnvLookup for HashMap<String, String> {
    fn get_env(&self, name: &str) -> Option<OsString> {
        self.get(name).map(OsString::from)
    }
}

impl EnvLookup for HashMap<String, OsString> {
    fn get_env(&self, name: &str) -> Option<OsString> {
        self.get(name).cloned()
    }
}

impl EnvLookup for BTreeMap<String, String> {
    fn get_env(&self, name: &str) -> Option<OsString> {
        self.get(name).map(OsString::from)
    }
}
