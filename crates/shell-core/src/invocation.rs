//! The fixed command vocabulary of the shell.

use clap::Parser;
use tracing::debug;

use crate::error::ShellError;

/// What the process was asked to do, fixed once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// No arguments: run under the OS service framework
    Service,
    /// `--install`: register, then start
    Install,
    /// `--uninstall`: stop, then unregister
    Uninstall,
    /// `--console`: run in the foreground; `args` is the full argument list
    Console { args: Vec<String> },
}

/// The mode flag in first position. Clap only ever sees that one argument;
/// whatever follows `--console` belongs to the agent.
#[derive(Parser, Debug)]
#[command(
    name = "agent-shell",
    no_binary_name = true,
    disable_help_flag = true,
    disable_version_flag = true
)]
struct ModeArgs {
    #[arg(long)]
    install: bool,

    #[arg(long)]
    uninstall: bool,

    #[arg(long)]
    console: bool,
}

impl Invocation {
    /// Parse the argument list, program name excluded.
    pub fn parse<I, T>(args: I) -> Result<Self, ShellError>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        let Some((first, rest)) = args.split_first() else {
            return Ok(Invocation::Service);
        };

        let mode = match ModeArgs::try_parse_from([first]) {
            Ok(mode) => mode,
            Err(e) => {
                debug!("argument parsing failed: {}", e);
                return Err(ShellError::UnsupportedInvocation(args));
            }
        };

        if mode.console {
            debug!("console passthrough arguments: {:?}", rest);
            return Ok(Invocation::Console { args });
        }
        if !rest.is_empty() {
            return Err(ShellError::UnsupportedInvocation(args));
        }

        if mode.install {
            Ok(Invocation::Install)
        } else if mode.uninstall {
            Ok(Invocation::Uninstall)
        } else {
            // `--` parses cleanly but names no mode
            Err(ShellError::UnsupportedInvocation(args))
        }
    }

    /// Parse the arguments this process was launched with
    pub fn from_env() -> Result<Self, ShellError> {
        Self::parse(std::env::args_os().skip(1).map(|a| a.to_string_lossy().into_owned()))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Invocation::Service => "service",
            Invocation::Install => "install",
            Invocation::Uninstall => "uninstall",
            Invocation::Console { .. } => "console",
        }
    }
}
