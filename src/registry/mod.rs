mod command;

pub use command::CommandRegistry;

use std::ffi::{OsStr, OsString};

/// A registered flag as seen by the binder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flag {
    pub name: String,
    pub usage: String,
}

/// The flag set the binder drives.
///
/// Implementations own flag storage, value coercion and argument parsing;
/// the binder only names flags, hands them strings and rewrites help text.
pub trait FlagRegistry {
    type Error: std::error::Error + Send + Sync + 'static;
    type Output;

    /// All registered flags, in a stable order.
    fn flags(&self) -> Vec<Flag>;

    /// Replace the help text of `name`.
    fn set_usage(&mut self, name: &str, usage: String);

    /// Assign `value` to `name` the same way a command-line value would be.
    fn set_value(&mut self, name: &str, value: &OsStr) -> Result<(), Self::Error>;

    /// Whether the argument vector has already been consumed.
    fn is_parsed(&self) -> bool;

    fn parse<I, T>(&mut self, args: I) -> Result<Self::Output, Self::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone;
}
