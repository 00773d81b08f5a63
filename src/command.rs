//! Command descriptors, the command table, and wire encoding.
//!
//! Every command the module understands is described once, up front, by a
//! [`CommandDescriptor`]: the literal text to transmit, the substring(s)
//! whose appearance in a response line signals completion, and the overall
//! deadline for the exchange. Descriptors live in a [`CommandTable`], built
//! either in code through [`CommandTableBuilder`] or from a TOML file, and
//! immutable from then on. The transport looks commands up by identifier
//! and never mutates the table, so one table can be shared read-only across
//! transports without locking.
//!
//! # Table file format
//!
//! ```toml
//! [ping]
//! literal = "AT"
//! pattern = "+AT: OK"
//! timeout = "2s 500ms"
//!
//! [send]
//! literal = "AT+MSG"
//! pattern = ["+MSG: Done", "+MSG: PORT"]
//! timeout = "20s"
//!
//! [wake]           # no pattern: fire-and-forget
//! literal = "0"
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AtError, AtResult};

/// Bytes appended to every outgoing command.
pub const LINE_TERMINATOR: &[u8] = b"\r\n";

/// Deadline applied when a descriptor does not specify its own.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_millis(2500);

/// The substring(s) whose appearance in a response line completes a command.
///
/// Deserializes untagged, so a TOML `pattern` field accepts either a single
/// string or a list of alternatives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponsePattern {
    /// One substring that must appear.
    Single(String),
    /// Ordered alternatives; the first one present in a line wins.
    AnyOf(Vec<String>),
}

impl ResponsePattern {
    /// The alternatives in declared order (a single pattern is one
    /// alternative).
    pub fn alternatives(&self) -> &[String] {
        match self {
            ResponsePattern::Single(s) => std::slice::from_ref(s),
            ResponsePattern::AnyOf(list) => list,
        }
    }
}

/// One positional command parameter.
///
/// Integers and floats render in their standard decimal form; strings pass
/// through unchanged. Use [`CommandParam::quoted`] for arguments the module
/// syntax requires in double quotes.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandParam {
    /// Signed integer argument.
    Int(i64),
    /// Floating-point argument.
    Float(f64),
    /// String argument, transmitted verbatim.
    Str(String),
}

impl CommandParam {
    /// Wrap `value` in double quotes unless it already carries one.
    ///
    /// Quoted-string arguments are never escaped by the module's dialect;
    /// a value that brings its own quote character is passed through
    /// untouched.
    pub fn quoted(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.contains('"') {
            CommandParam::Str(value)
        } else {
            CommandParam::Str(format!("\"{value}\""))
        }
    }
}

impl fmt::Display for CommandParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandParam::Int(v) => write!(f, "{v}"),
            CommandParam::Float(v) => write!(f, "{v}"),
            CommandParam::Str(v) => f.write_str(v),
        }
    }
}

impl From<i64> for CommandParam {
    fn from(v: i64) -> Self {
        CommandParam::Int(v)
    }
}

impl From<i32> for CommandParam {
    fn from(v: i32) -> Self {
        CommandParam::Int(v.into())
    }
}

impl From<u8> for CommandParam {
    fn from(v: u8) -> Self {
        CommandParam::Int(v.into())
    }
}

impl From<u16> for CommandParam {
    fn from(v: u16) -> Self {
        CommandParam::Int(v.into())
    }
}

impl From<u32> for CommandParam {
    fn from(v: u32) -> Self {
        CommandParam::Int(v.into())
    }
}

impl From<f64> for CommandParam {
    fn from(v: f64) -> Self {
        CommandParam::Float(v)
    }
}

impl From<&str> for CommandParam {
    fn from(v: &str) -> Self {
        CommandParam::Str(v.to_string())
    }
}

impl From<String> for CommandParam {
    fn from(v: String) -> Self {
        CommandParam::Str(v)
    }
}

/// Immutable description of one command the module understands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandDescriptor {
    /// Identifier callers use to select this command.
    pub id: String,
    /// Literal command text, without parameters or terminator.
    pub literal: String,
    /// Success pattern; `None` declares a fire-and-forget command.
    #[serde(default)]
    pub pattern: Option<ResponsePattern>,
    /// Overall deadline for the exchange.
    #[serde(with = "humantime_serde", default = "default_command_timeout")]
    pub timeout: Duration,
}

fn default_command_timeout() -> Duration {
    DEFAULT_COMMAND_TIMEOUT
}

impl CommandDescriptor {
    /// Descriptor for a command that expects one success substring.
    pub fn expect(
        id: impl Into<String>,
        literal: impl Into<String>,
        pattern: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            literal: literal.into(),
            pattern: Some(ResponsePattern::Single(pattern.into())),
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Descriptor for a command completed by any one of several substrings.
    pub fn expect_any<I, S>(id: impl Into<String>, literal: impl Into<String>, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            literal: literal.into(),
            pattern: Some(ResponsePattern::AnyOf(
                patterns.into_iter().map(Into::into).collect(),
            )),
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Descriptor for a command that expects no reply at all.
    pub fn fire_and_forget(id: impl Into<String>, literal: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            literal: literal.into(),
            pattern: None,
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Replace the overall deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn validate(&self) -> AtResult<()> {
        if self.literal.is_empty() {
            return Err(AtError::InvalidDescriptor {
                id: self.id.clone(),
                reason: "literal is empty".into(),
            });
        }
        if self.pattern.is_some() && self.timeout.is_zero() {
            return Err(AtError::InvalidDescriptor {
                id: self.id.clone(),
                reason: "timeout must be positive for commands that expect a response".into(),
            });
        }
        if let Some(ResponsePattern::AnyOf(alts)) = &self.pattern {
            // An empty alternative list can never match, so the command
            // could only ever time out.
            if alts.is_empty() {
                return Err(AtError::InvalidDescriptor {
                    id: self.id.clone(),
                    reason: "alternative list is empty".into(),
                });
            }
        }
        Ok(())
    }
}

/// Immutable identifier-to-descriptor mapping.
///
/// Built once at startup and shared read-only from then on; the transport
/// holds it behind an `Arc` with no interior mutability.
#[derive(Debug, Clone, Default)]
pub struct CommandTable {
    entries: HashMap<String, CommandDescriptor>,
}

impl CommandTable {
    /// Start building a table in code.
    pub fn builder() -> CommandTableBuilder {
        CommandTableBuilder { entries: Vec::new() }
    }

    /// Resolve `id`, failing with [`AtError::UnknownCommand`] if absent.
    pub fn lookup(&self, id: &str) -> AtResult<&CommandDescriptor> {
        self.entries
            .get(id)
            .ok_or_else(|| AtError::UnknownCommand(id.to_string()))
    }

    /// True if `id` is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Number of registered commands.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no commands are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse a table from TOML text (see the module docs for the format).
    pub fn from_toml_str(text: &str) -> AtResult<Self> {
        let entries: HashMap<String, TableEntry> = toml::from_str(text)?;
        let mut builder = Self::builder();
        for (id, entry) in entries {
            builder = builder.command(CommandDescriptor {
                id,
                literal: entry.literal,
                pattern: entry.pattern,
                timeout: entry.timeout,
            });
        }
        builder.build()
    }

    /// Load a table from a TOML file.
    pub fn from_toml_path(path: impl AsRef<Path>) -> AtResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

/// One `[id]` section in a table file.
#[derive(Deserialize)]
struct TableEntry {
    literal: String,
    #[serde(default)]
    pattern: Option<ResponsePattern>,
    #[serde(with = "humantime_serde", default = "default_command_timeout")]
    timeout: Duration,
}

/// Accumulates descriptors, then validates them all at [`build`].
///
/// [`build`]: CommandTableBuilder::build
#[derive(Debug)]
pub struct CommandTableBuilder {
    entries: Vec<CommandDescriptor>,
}

impl CommandTableBuilder {
    /// Add one descriptor.
    pub fn command(mut self, descriptor: CommandDescriptor) -> Self {
        self.entries.push(descriptor);
        self
    }

    /// Validate every descriptor and freeze the table.
    pub fn build(self) -> AtResult<CommandTable> {
        let mut entries = HashMap::with_capacity(self.entries.len());
        for descriptor in self.entries {
            descriptor.validate()?;
            let id = descriptor.id.clone();
            if entries.insert(id.clone(), descriptor).is_some() {
                return Err(AtError::InvalidDescriptor {
                    id,
                    reason: "duplicate identifier".into(),
                });
            }
        }
        Ok(CommandTable { entries })
    }
}

/// A command rendered for transmission: literal, parameters, optional query
/// marker, terminator. Built per call and discarded after the write.
#[derive(Debug)]
pub struct OutgoingCommand<'a> {
    descriptor: &'a CommandDescriptor,
    params: &'a [CommandParam],
    query: bool,
}

impl<'a> OutgoingCommand<'a> {
    /// Write form: `<literal>[=<p1>, <p2>, ...]\r\n`.
    pub fn new(descriptor: &'a CommandDescriptor, params: &'a [CommandParam]) -> Self {
        Self {
            descriptor,
            params,
            query: false,
        }
    }

    /// Read form: `?` appended after the parameters.
    pub fn query(descriptor: &'a CommandDescriptor, params: &'a [CommandParam]) -> Self {
        Self {
            descriptor,
            params,
            query: true,
        }
    }

    /// Render the full wire bytes, terminator included.
    pub fn encode(&self) -> Vec<u8> {
        let mut text = self.descriptor.literal.clone();
        for (i, param) in self.params.iter().enumerate() {
            if i == 0 {
                text.push('=');
            } else {
                text.push_str(", ");
            }
            text.push_str(&param.to_string());
        }
        if self.query {
            text.push('?');
        }
        let mut bytes = text.into_bytes();
        bytes.extend_from_slice(LINE_TERMINATOR);
        bytes
    }
}
