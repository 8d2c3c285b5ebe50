use super::{Flag, FlagRegistry};
use clap::error::ErrorKind;
use clap::{Arg, ArgAction, ArgMatches, Command};
use log::debug;
use std::ffi::{OsStr, OsString};

/// [`FlagRegistry`] backed by a clap [`Command`].
///
/// Every non-positional argument is a flag, named by its long name or, if it
/// has none, by its id. Environment values become the argument's default
/// value, so anything given on the command line still takes precedence, and
/// a required flag set this way no longer has to be given.
#[derive(Debug, Clone)]
pub struct CommandRegistry {
    command: Command,
    // built copy, only used to reach the final value parsers
    built: Command,
    order: Vec<String>,
    matches: Option<ArgMatches>,
}

impl CommandRegistry {
    pub fn new(command: Command) -> Self {
        let mut built = command.clone();
        built.build();
        let order = command
            .get_arguments()
            .filter(|arg| is_flag(arg))
            .map(|arg| arg.get_id().to_string())
            .collect();
        Self {
            command,
            built,
            order,
            matches: None,
        }
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    /// Matches from the last successful parse.
    pub fn matches(&self) -> Option<&ArgMatches> {
        self.matches.as_ref()
    }

    pub fn render_help(&self) -> String {
        self.command.clone().render_help().to_string()
    }

    fn args(&self) -> impl Iterator<Item = &Arg> + '_ {
        self.order.iter().filter_map(|id| {
            self.command
                .get_arguments()
                .find(|arg| arg.get_id().as_str() == id.as_str())
        })
    }

    fn find(&self, name: &str) -> Option<&Arg> {
        self.args().find(|arg| flag_name(arg) == name)
    }

    // clap moves a mutated argument to the end of its list; `order` keeps
    // the registration order.
    fn update<F>(&mut self, id: &str, f: F)
    where
        F: FnOnce(Arg) -> Arg,
    {
        let command = std::mem::replace(&mut self.command, Command::new(""));
        self.command = command.mut_arg(id, f);
    }

    // Runs the value through the argument's final value parser on a
    // throwaway command, so nothing else about the argument interferes.
    fn check_value(&self, id: &str, name: &str, value: &OsStr) -> Result<(), clap::Error> {
        let arg = self
            .built
            .get_arguments()
            .find(|arg| arg.get_id().as_str() == id)
            .ok_or_else(|| unknown_flag(name))?;

        let mut given = OsString::from(format!("--{}=", name));
        given.push(value);

        let probe = Arg::new(id.to_owned())
            .long(name.to_owned())
            .action(ArgAction::Set)
            .value_parser(arg.get_value_parser().clone())
            .ignore_case(arg.is_ignore_case_set());
        Command::new(self.command.get_name().to_owned())
            .no_binary_name(true)
            .disable_help_flag(true)
            .arg(probe)
            .try_get_matches_from([given])
            .map(|_| ())
    }
}

impl From<Command> for CommandRegistry {
    fn from(command: Command) -> Self {
        Self::new(command)
    }
}

impl FlagRegistry for CommandRegistry {
    type Error = clap::Error;
    type Output = ArgMatches;

    fn flags(&self) -> Vec<Flag> {
        self.args()
            .map(|arg| Flag {
                name: flag_name(arg).to_string(),
                usage: arg.get_help().map(|h| h.to_string()).unwrap_or_default(),
            })
            .collect()
    }

    fn set_usage(&mut self, name: &str, usage: String) {
        let Some(arg) = self.find(name) else {
            return;
        };
        let id = arg.get_id().to_string();
        self.update(&id, |arg| arg.help(usage));
    }

    fn set_value(&mut self, name: &str, value: &OsStr) -> Result<(), clap::Error> {
        let id = self
            .find(name)
            .map(|arg| arg.get_id().to_string())
            .ok_or_else(|| unknown_flag(name))?;

        self.check_value(&id, name, value)?;

        debug!("Setting default for {}", name);
        let value = value.to_os_string();
        self.update(&id, |arg| arg.default_value(value).required(false));
        Ok(())
    }

    fn is_parsed(&self) -> bool {
        self.matches.is_some()
    }

    fn parse<I, T>(&mut self, args: I) -> Result<ArgMatches, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = self.command.try_get_matches_from_mut(args)?;
        self.matches = Some(matches.clone());
        Ok(matches)
    }
}

fn unknown_flag(name: &str) -> clap::Error {
    clap::Error::raw(
        ErrorKind::UnknownArgument,
        format!("no such flag: {}\n", name),
    )
}

fn is_flag(arg: &Arg) -> bool {
    !arg.is_positional()
        && !matches!(
            arg.get_action(),
            ArgAction::Help | ArgAction::HelpShort | ArgAction::HelpLong | ArgAction::Version
        )
}

fn flag_name(arg: &Arg) -> &str {
    arg.get_long().unwrap_or_else(|| arg.get_id().as_str())
}
