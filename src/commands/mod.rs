//! Text command dispatcher
//!
//! Commands arrive on the `cmd` channel as `<name> <arg> <arg> ...`. The
//! registry is fixed after startup; each command declares the types of its
//! parameters and is only invoked with fully decoded arguments. Every input,
//! however malformed, produces a reply string.

use thiserror::Error;
use tracing::{debug, warn};

pub mod builtin;
pub mod parser;

pub use parser::{decode_argument, tokenize, ArgType, Argument};

use crate::command_span;

/// Upper bound for a reply, in bytes
pub const MAX_RESPONSE_SIZE: usize = 64;
/// Longest accepted command name, in bytes
pub const MAX_COMMAND_NAME_LEN: usize = 32;
/// Most parameters a single command may declare
pub const MAX_COMMAND_PARAMS: usize = 4;

/// Side effect requested by a command, applied by the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceAction {
    Reboot,
}

/// Outcome of one dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub action: Option<DeviceAction>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            action: None,
        }
    }

    pub fn with_action(text: impl Into<String>, action: DeviceAction) -> Self {
        Self {
            text: text.into(),
            action: Some(action),
        }
    }
}

/// Name and parameter signature of a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDescription {
    pub name: String,
    pub params: Vec<ArgType>,
}

/// A registered command
pub trait Command: Send + Sync {
    fn describe(&self) -> CommandDescription;

    /// Called only with arguments matching `describe().params`
    fn execute(&self, args: &[Argument]) -> Reply;
}

/// Errors surfaced to the remote operator; `Display` is the canonical reply
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    #[error("parse error: empty command")]
    EmptyCommand,
    #[error("parse error: unknown command")]
    UnknownCommand(String),
    #[error("parse error: missing argument")]
    MissingArgument { command: String, expected: usize },
    #[error("parse error: invalid argument")]
    InvalidArgument { token: String, expected: ArgType },
    #[error("parse error: too many arguments")]
    TooManyArguments { command: String, expected: usize },
    #[error("parse error: unterminated string")]
    UnterminatedString,
}

/// Errors while building the registry at startup
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Command name must not be empty")]
    EmptyName,
    #[error("Command name too long: {name} (max {max} bytes)")]
    NameTooLong { name: String, max: usize },
    #[error("Command name must be a single lowercase word: {0}")]
    InvalidName(String),
    #[error("Command {name} declares {count} parameters (max {max})")]
    TooManyParams {
        name: String,
        count: usize,
        max: usize,
    },
    #[error("Duplicate command: {0}")]
    DuplicateCommand(String),
}

/// Fixed set of commands, looked up by name
pub struct CommandRegistry {
    commands: Vec<(CommandDescription, Box<dyn Command>)>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
        }
    }

    /// Registry with `hello`, `helloadd`, `helloecho` and `reset`
    pub fn with_builtins(reboot_delay: std::time::Duration) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        builtin::register_all(&mut registry, reboot_delay)?;
        Ok(registry)
    }

    pub fn register(&mut self, command: Box<dyn Command>) -> Result<(), RegistryError> {
        let description = command.describe();
        validate_description(&description)?;
        if self.lookup(&description.name).is_some() {
            return Err(RegistryError::DuplicateCommand(description.name));
        }
        debug!(
            command = %description.name,
            params = description.params.len(),
            "Registered command"
        );
        self.commands.push((description, command));
        Ok(())
    }

    pub fn list_commands(&self) -> Vec<String> {
        self.commands.iter().map(|(d, _)| d.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    fn lookup(&self, name: &str) -> Option<&(CommandDescription, Box<dyn Command>)> {
        self.commands.iter().find(|(d, _)| d.name == name)
    }

    /// Parse and run one command line
    pub fn dispatch(&self, line: &str) -> Reply {
        let span = command_span!(line = %line);
        let _enter = span.enter();

        let reply = match self.try_dispatch(line) {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = ?e, "Command rejected");
                Reply::text(e.to_string())
            }
        };

        Reply {
            text: cap_response(reply.text),
            action: reply.action,
        }
    }

    fn try_dispatch(&self, line: &str) -> Result<Reply, CommandError> {
        let tokens = tokenize(line)?;
        let (name, raw_args) = tokens.split_first().ok_or(CommandError::EmptyCommand)?;

        let (description, command) = self
            .lookup(name)
            .ok_or_else(|| CommandError::UnknownCommand(name.clone()))?;

        let expected = description.params.len();
        if raw_args.len() < expected {
            return Err(CommandError::MissingArgument {
                command: name.clone(),
                expected,
            });
        }
        if raw_args.len() > expected {
            return Err(CommandError::TooManyArguments {
                command: name.clone(),
                expected,
            });
        }

        let args = raw_args
            .iter()
            .zip(&description.params)
            .map(|(token, kind)| decode_argument(token, *kind))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(command = %name, "Executing command");
        Ok(command.execute(&args))
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("commands", &self.list_commands())
            .finish()
    }
}

fn validate_description(description: &CommandDescription) -> Result<(), RegistryError> {
    let name = &description.name;
    if name.is_empty() {
        return Err(RegistryError::EmptyName);
    }
    if name.len() > MAX_COMMAND_NAME_LEN {
        return Err(RegistryError::NameTooLong {
            name: name.clone(),
            max: MAX_COMMAND_NAME_LEN,
        });
    }
    // Inbound text is lower-cased before lookup
    if name
        .chars()
        .any(|c| c.is_whitespace() || c == '"' || c.is_uppercase())
    {
        return Err(RegistryError::InvalidName(name.clone()));
    }
    if description.params.len() > MAX_COMMAND_PARAMS {
        return Err(RegistryError::TooManyParams {
            name: name.clone(),
            count: description.params.len(),
            max: MAX_COMMAND_PARAMS,
        });
    }
    Ok(())
}

/// Decode an inbound payload into command text
///
/// Lossy UTF-8, cut at the first NUL byte, lower-cased.
pub fn normalize_payload(payload: &[u8]) -> String {
    let end = payload
        .iter()
        .position(|b| *b == 0)
        .unwrap_or(payload.len());
    String::from_utf8_lossy(&payload[..end]).to_lowercase()
}

/// Truncate to `MAX_RESPONSE_SIZE` bytes without splitting a character
pub fn cap_response(mut text: String) -> String {
    if text.len() > MAX_RESPONSE_SIZE {
        let mut cut = MAX_RESPONSE_SIZE;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
    }
    text
}
