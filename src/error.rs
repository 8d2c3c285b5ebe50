use std::fmt;
use thiserror::Error;

/// Failure of a bind-then-parse call.
///
/// `E` is the flag registry's own error type; parse failures are passed
/// through untouched.
#[derive(Error, Debug)]
pub enum BindError<E>
where
    E: std::error::Error + 'static,
{
    #[error("flag set has already been parsed")]
    AlreadyParsed,

    #[error(transparent)]
    Env(#[from] EnvErrors<E>),

    #[error(transparent)]
    Parse(E),
}

/// A single environment value the registry refused.
#[derive(Error, Debug)]
#[error("flag {flag} from {env}: {source}")]
pub struct FlagError<E>
where
    E: std::error::Error + 'static,
{
    pub flag: String,
    pub env: String,
    #[source]
    pub source: E,
}

/// Every injection failure of one pass, in registry order.
#[derive(Debug)]
pub struct EnvErrors<E>
where
    E: std::error::Error + 'static,
{
    errors: Vec<FlagError<E>>,
}

impl<E> EnvErrors<E>
where
    E: std::error::Error + 'static,
{
    pub(crate) fn new(errors: Vec<FlagError<E>>) -> Self {
        Self { errors }
    }

    pub fn errors(&self) -> &[FlagError<E>] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<FlagError<E>> {
        self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Names of the flags that failed.
    pub fn flags(&self) -> impl Iterator<Item = &str> {
        self.errors.iter().map(|e| e.flag.as_str())
    }
}

impl<E> fmt::Display for EnvErrors<E>
where
    E: std::error::Error + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errors.len() {
            1 => write!(f, "1 error occurred:")?,
            n => write!(f, "{} errors occurred:", n)?,
        }
        for err in &self.errors {
            // clap errors carry their own trailing newlines and hints
            let first = err.to_string();
            let first = first.lines().next().unwrap_or_default();
            write!(f, "\n\t* {}", first)?;
        }
        Ok(())
    }
}

impl<E> std::error::Error for EnvErrors<E> where E: std::error::Error + 'static {}

/// The default instance was already used, so its configuration is frozen.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("default binder is already in use, configure it before the first parse")]
pub struct DefaultsInUse;
