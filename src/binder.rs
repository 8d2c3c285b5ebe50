use crate::env::{EnvLookup, ProcessEnv};
use crate::error::{BindError, EnvErrors, FlagError};
use crate::naming;
use crate::registry::FlagRegistry;
use log::{debug, info};
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::ffi::OsString;
use std::fmt;
use std::sync::Arc;

/// Flags with names shorter than this are left alone unless configured otherwise.
pub const DEFAULT_MIN_LENGTH: usize = 3;

/// Applies environment variables to a [`FlagRegistry`] before it parses.
///
/// Each flag `name` is read from `PREFIX + NAME` (upper-cased, `-` and `.`
/// turned into `_`) unless an explicit variable is mapped for it. Values
/// are installed before the command line is parsed, so arguments given on
/// the command line win.
pub struct Binder<R> {
    registry: R,
    prefix: String,
    min_length: usize,
    names: HashMap<String, String>,
    update_usage: bool,
    env: OnceCell<Arc<dyn EnvLookup>>,
}

impl<R: FlagRegistry> Binder<R> {
    pub fn new(registry: R) -> Self {
        Self {
            registry,
            prefix: String::new(),
            min_length: DEFAULT_MIN_LENGTH,
            names: HashMap::new(),
            update_usage: true,
            env: OnceCell::new(),
        }
    }

    /// Prefix prepended to every derived variable name.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Flags whose names are shorter than `min_length` are neither
    /// rewritten nor read from the environment.
    pub fn min_length(mut self, min_length: usize) -> Self {
        self.min_length = min_length;
        self
    }

    /// Read `flag` from exactly `env`, ignoring the prefix.
    pub fn name(mut self, flag: impl Into<String>, env: impl Into<String>) -> Self {
        self.names.insert(flag.into(), env.into());
        self
    }

    pub fn names<I, K, V>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.names
            .extend(names.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Prepend `[VAR] ` to the help text of every bound flag.
    pub fn update_usage(mut self, update_usage: bool) -> Self {
        self.update_usage = update_usage;
        self
    }

    /// Look variables up in `env` instead of the process environment.
    pub fn env<E>(mut self, env: E) -> Self
    where
        E: EnvLookup + 'static,
    {
        let env: Arc<dyn EnvLookup> = Arc::new(env);
        self.env = OnceCell::from(env);
        self
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut R {
        &mut self.registry
    }

    pub fn into_registry(self) -> R {
        self.registry
    }

    /// Environment variable consulted for `flag`.
    pub fn env_name(&self, flag: &str) -> String {
        naming::env_name(flag, &self.prefix, &self.names)
    }

    /// `(flag, variable)` for every flag the binder reads, in registry order.
    pub fn bindings(&self) -> Vec<(String, String)> {
        self.registry
            .flags()
            .into_iter()
            .filter(|flag| self.is_bound(&flag.name))
            .map(|flag| {
                let env = self.env_name(&flag.name);
                (flag.name, env)
            })
            .collect()
    }

    fn lookup(&self) -> &dyn EnvLookup {
        self.env
            .get_or_init(|| Arc::new(ProcessEnv) as Arc<dyn EnvLookup>)
            .as_ref()
    }

    fn is_bound(&self, flag: &str) -> bool {
        flag.len() >= self.min_length
    }

    /// Rewrite the help text of every bound flag to advertise its variable.
    ///
    /// Not idempotent: a second call prefixes the text again.
    pub fn apply_usage(&mut self) {
        for flag in self.registry.flags() {
            if !self.is_bound(&flag.name) {
                continue;
            }
            let usage = format!("[{}] {}", self.env_name(&flag.name), flag.usage);
            self.registry.set_usage(&flag.name, usage);
        }
    }

    /// Copy set environment variables into the registry.
    ///
    /// Every flag is tried; all rejected values are returned together.
    pub fn apply_env(&mut self) -> Result<(), EnvErrors<R::Error>> {
        let mut errors = Vec::new();
        let mut applied = 0;

        for flag in self.registry.flags() {
            if !self.is_bound(&flag.name) {
                debug!("Skipping {}: name shorter than {}", flag.name, self.min_length);
                continue;
            }

            let env = self.env_name(&flag.name);
            let Some(value) = self.lookup().get_env(&env) else {
                continue;
            };

            debug!("Applying {} to {}", env, flag.name);
            match self.registry.set_value(&flag.name, &value) {
                Ok(()) => applied += 1,
                Err(source) => errors.push(FlagError {
                    flag: flag.name,
                    env,
                    source,
                }),
            }
        }

        info!(
            "Applied {} environment value(s), {} rejected",
            applied,
            errors.len()
        );
        if errors.is_empty() {
            Ok(())
        } else {
            Err(EnvErrors::new(errors))
        }
    }

    /// Apply the environment without parsing.
    ///
    /// Fails without touching anything if the registry was already parsed.
    pub fn process(&mut self) -> Result<(), BindError<R::Error>> {
        if self.registry.is_parsed() {
            return Err(BindError::AlreadyParsed);
        }
        if self.update_usage {
            self.apply_usage();
        }
        self.apply_env()?;
        Ok(())
    }

    /// Apply the environment, then parse `args`.
    pub fn parse<I, T>(&mut self, args: I) -> Result<R::Output, BindError<R::Error>>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        self.process()?;
        self.registry.parse(args).map_err(BindError::Parse)
    }
}

impl<R: fmt::Debug> fmt::Debug for Binder<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binder")
            .field("registry", &self.registry)
            .field("prefix", &self.prefix)
            .field("min_length", &self.min_length)
            .field("names", &self.names)
            .field("update_usage", &self.update_usage)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::CommandRegistry;
    use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};

    fn service_command() -> Command {
        Command::new("testing")
            .arg(
                Arg::new("service-addr")
                    .long("service-addr")
                    .default_value("localhost")
                    .help("address"),
            )
            .arg(
                Arg::new("service-port")
                    .long("service-port")
                    .value_parser(value_parser!(u16))
                    .default_value("8080")
                    .help("port"),
            )
            .arg(
                Arg::new("debug")
                    .long("debug")
                    .action(ArgAction::SetTrue)
                    .help("debug"),
            )
            .arg(
                Arg::new("v")
                    .short('v')
                    .action(ArgAction::SetTrue)
                    .help("alias for debug"),
            )
    }

    fn environ(vars: &[(&str, &str)]) -> HashMap<String, String> {
        vars.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn test_env() -> HashMap<String, String> {
        environ(&[
            ("TEST_SERVICE_ADDR", "example.com"),
            ("TEST_SERVICE_PORT", "9090"),
            ("TEST_DEBUG", "true"),
            // ignored, "v" is below the minimum length
            ("TEST_V", "true"),
        ])
    }

    fn addr(matches: &ArgMatches) -> &str {
        matches
            .get_one::<String>("service-addr")
            .map(String::as_str)
            .unwrap()
    }

    #[test]
    fn test_parse() {
        let mut binder = Binder::new(CommandRegistry::new(service_command()))
            .min_length(3)
            .prefix("TEST_")
            .env(test_env());

        let matches = binder.parse(["testing"]).unwrap();

        assert_eq!(addr(&matches), "example.com");
        assert_eq!(matches.get_one::<u16>("service-port"), Some(&9090));
        assert!(matches.get_flag("debug"));
        assert!(!matches.get_flag("v"));
    }

    #[test]
    fn test_usage() {
        let mut binder = Binder::new(CommandRegistry::new(service_command()))
            .update_usage(true)
            .prefix("TEST_")
            .min_length(3)
            .env(HashMap::<String, String>::new());

        binder.process().unwrap();
        let help = binder.registry().render_help();

        assert!(help.contains("[TEST_SERVICE_ADDR]"));
        assert!(help.contains("[TEST_SERVICE_PORT]"));
        assert!(help.contains("[TEST_DEBUG]"));
        assert!(!help.contains("[TEST_V]"));
    }

    #[test]
    fn test_usage_disabled() {
        let mut binder = Binder::new(CommandRegistry::new(service_command()))
            .update_usage(false)
            .prefix("TEST_")
            .env(HashMap::<String, String>::new());

        binder.process().unwrap();

        assert!(!binder.registry().render_help().contains("[TEST_"));
    }

    #[test]
    fn test_command_line_wins() {
        let mut binder = Binder::new(CommandRegistry::new(service_command()))
            .prefix("TEST_")
            .env(test_env());

        let matches = binder
            .parse(["testing", "--service-addr", "cli.example.com", "--service-port", "7070"])
            .unwrap();

        assert_eq!(addr(&matches), "cli.example.com");
        assert_eq!(matches.get_one::<u16>("service-port"), Some(&7070));
        assert!(matches.get_flag("debug"));
    }

    #[test]
    fn test_absent_variables_keep_defaults() {
        let mut binder = Binder::new(CommandRegistry::new(service_command()))
            .prefix("TEST_")
            .env(environ(&[("OTHER_SERVICE_ADDR", "nope")]));

        let matches = binder.parse(["testing"]).unwrap();

        assert_eq!(addr(&matches), "localhost");
        assert_eq!(matches.get_one::<u16>("service-port"), Some(&8080));
        assert!(!matches.get_flag("debug"));
    }

    #[test]
    fn test_already_parsed() {
        let mut registry = CommandRegistry::new(service_command());
        registry.parse(["testing"]).unwrap();

        let mut binder = Binder::new(registry).prefix("TEST_").env(test_env());

        let err = binder.parse(["testing"]).unwrap_err();
        assert!(matches!(err, BindError::AlreadyParsed));

        // nothing was applied
        assert!(matches!(binder.process(), Err(BindError::AlreadyParsed)));
        let flags = binder.registry().flags();
        assert!(flags.iter().all(|f| !f.usage.starts_with('[')));
        assert_eq!(addr(binder.registry().matches().unwrap()), "localhost");
    }

    #[test]
    fn test_second_parse_rejected() {
        let mut binder = Binder::new(CommandRegistry::new(service_command())).env(HashMap::<String, String>::new());

        binder.parse(["testing"]).unwrap();

        assert!(matches!(binder.parse(["testing"]), Err(BindError::AlreadyParsed)));
    }

    #[test]
    fn test_errors_are_aggregated() {
        let command = service_command().arg(
            Arg::new("workers")
                .long("workers")
                .value_parser(value_parser!(u32)),
        );
        let mut binder = Binder::new(CommandRegistry::new(command))
            .prefix("TEST_")
            .env(environ(&[
                ("TEST_SERVICE_PORT", "lots"),
                ("TEST_SERVICE_ADDR", "example.com"),
                ("TEST_WORKERS", "many"),
            ]));

        let err = binder.parse(["testing"]).unwrap_err();

        let BindError::Env(errors) = &err else {
            panic!("expected env errors, got {:?}", err);
        };
        assert_eq!(
            errors.flags().collect::<Vec<_>>(),
            vec!["service-port", "workers"]
        );
        assert_eq!(errors.errors()[1].env, "TEST_WORKERS");

        let text = err.to_string();
        assert!(text.contains("service-port"));
        assert!(text.contains("workers"));

        // the pass stopped before parsing
        assert!(!binder.registry().is_parsed());
    }

    #[test]
    fn test_valid_values_applied_despite_errors() {
        let mut binder = Binder::new(CommandRegistry::new(service_command()))
            .prefix("TEST_")
            .env(environ(&[
                ("TEST_SERVICE_PORT", "lots"),
                ("TEST_SERVICE_ADDR", "example.com"),
            ]));

        assert!(binder.apply_env().is_err());

        let matches = binder.registry_mut().parse(["testing"]).unwrap();
        assert_eq!(addr(&matches), "example.com");
        assert_eq!(matches.get_one::<u16>("service-port"), Some(&8080));
    }

    #[test]
    fn test_explicit_names() {
        let mut binder = Binder::new(CommandRegistry::new(service_command()))
            .prefix("TEST_")
            .name("service-addr", "LISTEN_ADDR")
            .names([("v", "VERBOSE")])
            .env(environ(&[
                ("LISTEN_ADDR", "mapped.example.com"),
                ("TEST_SERVICE_ADDR", "prefixed.example.com"),
                ("VERBOSE", "true"),
            ]));

        let matches = binder.parse(["testing"]).unwrap();

        assert_eq!(addr(&matches), "mapped.example.com");
        // mapped but still below the minimum length
        assert!(!matches.get_flag("v"));
        assert_eq!(binder.env_name("service-addr"), "LISTEN_ADDR");
        assert_eq!(binder.env_name("service-port"), "TEST_SERVICE_PORT");
    }

    #[test]
    fn test_min_length_zero_binds_everything() {
        let mut binder = Binder::new(CommandRegistry::new(service_command()))
            .prefix("TEST_")
            .min_length(0)
            .env(test_env());

        let matches = binder.parse(["testing"]).unwrap();

        assert!(matches.get_flag("v"));
        assert!(binder.registry().render_help().contains("[TEST_V]"));
    }

    #[test]
    fn test_bindings() {
        let binder = Binder::new(CommandRegistry::new(service_command())).prefix("APP_");

        assert_eq!(
            binder.bindings(),
            vec![
                ("service-addr".to_string(), "APP_SERVICE_ADDR".to_string()),
                ("service-port".to_string(), "APP_SERVICE_PORT".to_string()),
                ("debug".to_string(), "APP_DEBUG".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_error_passes_through() {
        let mut binder = Binder::new(CommandRegistry::new(service_command())).env(HashMap::<String, String>::new());

        let err = binder.parse(["testing", "--no-such-flag"]).unwrap_err();

        let BindError::Parse(err) = err else {
            panic!("expected parse error");
        };
        assert_eq!(err.kind(), clap::error::ErrorKind::UnknownArgument);
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_value_matches_command_line() {
        use std::os::unix::ffi::OsStringExt;
        use std::path::PathBuf;

        let command = || {
            Command::new("testing").arg(
                Arg::new("data-dir")
                    .long("data-dir")
                    .value_parser(value_parser!(PathBuf)),
            )
        };
        let raw = OsString::from_vec(b"/t\xFFx".to_vec());

        let mut vars = HashMap::new();
        vars.insert("TEST_DATA_DIR".to_string(), raw.clone());
        let mut from_env = Binder::new(CommandRegistry::new(command()))
            .prefix("TEST_")
            .env(vars);
        let env_matches = from_env.parse(["testing"]).unwrap();

        let mut from_cli = Binder::new(CommandRegistry::new(command())).env(HashMap::<String, String>::new());
        let mut given = OsString::from("--data-dir=");
        given.push(&raw);
        let cli_matches = from_cli.parse([OsString::from("testing"), given]).unwrap();

        let expected = PathBuf::from(raw);
        assert_eq!(env_matches.get_one::<PathBuf>("data-dir"), Some(&expected));
        assert_eq!(
            env_matches.get_one::<PathBuf>("data-dir"),
            cli_matches.get_one::<PathBuf>("data-dir")
        );
    }

    struct CaptureLogger {
        lines: std::sync::Mutex<Vec<String>>,
    }

    impl log::Log for CaptureLogger {
        fn enabled(&self, _: &log::Metadata<'_>) -> bool {
            true
        }

        fn log(&self, record: &log::Record<'_>) {
            if let Ok(mut lines) = self.lines.lock() {
                lines.push(record.args().to_string());
            }
        }

        fn flush(&self) {}
    }

    static LOGGER: CaptureLogger = CaptureLogger {
        lines: std::sync::Mutex::new(Vec::new()),
    };

    #[test]
    fn test_values_are_not_logged() {
        let _ = log::set_logger(&LOGGER);
        log::set_max_level(log::LevelFilter::Trace);

        let mut binder = Binder::new(CommandRegistry::new(service_command()))
            .prefix("TEST_")
            .env(environ(&[
                ("TEST_SERVICE_ADDR", "s3cr3t-token.example.com"),
                ("TEST_SERVICE_PORT", "31337"),
            ]));
        let matches = binder.parse(["testing"]).unwrap();
        assert_eq!(addr(&matches), "s3cr3t-token.example.com");

        let lines = LOGGER.lines.lock().unwrap();
        assert!(lines.iter().any(|l| l.contains("TEST_SERVICE_ADDR")));
        assert!(lines.iter().all(|l| !l.contains("s3cr3t") && !l.contains("31337")));
    }
}
