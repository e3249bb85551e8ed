//! Command engine: expands, parses and dispatches command lines.
//!
//! A line is expanded against the [`Environment`], then:
//! - empty lines and `#` comments do nothing,
//! - a line starting with a tab extends the command matched by the previous
//!   line (appending a line to a script),
//! - anything else is dispatched to the command whose name is the leading
//!   word (or leading words, for names with spaces) of the line.
//!
//! The engine is single-threaded; whoever owns it runs lines to completion,
//! nested scripts included, before handing it the next line.

mod builtin;
mod command;

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use log::{debug, error, info, warn};

use crate::channel::{Message, MessageSender};
use crate::collaborators::Collaborators;
use crate::device::DeviceSettings;
use crate::env::Environment;
use crate::error::CommandError;

pub use command::{Builtin, Command, Script};

/// Scripts calling scripts deeper than this fail.
pub const MAX_DEPTH: usize = 32;

/// Script file lines are cut to this many bytes.
pub const MAX_SCRIPT_LINE: usize = 255;

/// Result of a successfully executed line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    /// The `exit` command ran; the caller should shut down.
    Exit,
}

impl Outcome {
    pub fn code(self) -> i32 {
        match self {
            Outcome::Continue => 0,
            Outcome::Exit => 1,
        }
    }
}

/// Script files executed by [`CommandEngine::initialize`].
#[derive(Debug, Clone, Default)]
pub struct ScriptPaths {
    pub system: Option<PathBuf>,
    /// Skipped when no usable home directory was found.
    pub user: Option<PathBuf>,
}

pub struct CommandEngine {
    commands: HashMap<String, Command>,
    /// Command names containing spaces, longest first.
    phrases: Vec<String>,
    env: Environment,
    /// Command receiving tab-prefixed lines.
    extend_target: Option<String>,
    events: MessageSender<Message>,
    devices: DeviceSettings,
    collaborators: Collaborators,
    depth: usize,
}

fn split_first_word(line: &str) -> (&str, &str) {
    line.split_once(' ').unwrap_or((line, ""))
}

/// Arguments after `name` if `line` is `name` or starts with `name `.
fn strip_name<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(name)?;
    if rest.is_empty() {
        Some(rest)
    } else {
        rest.strip_prefix(' ')
    }
}

impl CommandEngine {
    /// Create an engine with the built-in commands registered.
    ///
    /// `events` is handed to device clients for their outward events.
    pub fn new(events: MessageSender<Message>, devices: DeviceSettings) -> Self {
        let mut engine = Self {
            commands: HashMap::new(),
            phrases: Vec::new(),
            env: Environment::new(),
            extend_target: None,
            events,
            devices,
            collaborators: Collaborators::default(),
            depth: 0,
        };
        for builtin in Builtin::ALL {
            engine
                .commands
                .insert(builtin.name().to_string(), Command::Builtin(builtin));
        }
        engine
    }

    pub fn with_collaborators(mut self, collaborators: Collaborators) -> Self {
        self.collaborators = collaborators;
        self
    }

    /// Run the system script, then the user script if one is given.
    ///
    /// Missing files are skipped. An error in either file is returned.
    pub fn initialize(&mut self, scripts: &ScriptPaths) -> Result<(), CommandError> {
        for path in [&scripts.system, &scripts.user].into_iter().flatten() {
            self.load_script(path)?;
        }
        Ok(())
    }

    /// Execute every line of a script file.
    ///
    /// Stops at the first error (returned) or at `exit`.
    pub fn load_script(&mut self, path: &Path) -> Result<Outcome, CommandError> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) => {
                warn!(target: "engine", "Script file \"{}\" not present: {}", path.display(), e);
                return Ok(Outcome::Continue);
            }
        };
        info!(target: "engine", "Executing script file \"{}\"", path.display());

        self.extend_target = None;
        let mut reader = BufReader::new(file);
        let mut raw = Vec::new();
        loop {
            raw.clear();
            if reader.read_until(b'\n', &mut raw)? == 0 {
                break;
            }
            while matches!(raw.last(), Some(b'\n') | Some(b'\r')) {
                raw.pop();
            }
            if raw.is_empty() {
                continue;
            }
            if raw.len() > MAX_SCRIPT_LINE {
                warn!(target: "engine", "{}: truncating line of {} bytes", path.display(), raw.len());
                raw.truncate(MAX_SCRIPT_LINE);
            }
            let line = String::from_utf8_lossy(&raw).into_owned();
            info!(target: "engine", "Command \"{}\"", line);
            match self.execute(&line) {
                Ok(Outcome::Continue) => {}
                Ok(Outcome::Exit) => return Ok(Outcome::Exit),
                Err(e) => {
                    error!(target: "engine", "{}: \"{}\": {}", path.display(), line, e);
                    return Err(e);
                }
            }
        }
        Ok(Outcome::Continue)
    }

    /// Execute one command line. Failures are returned, not logged.
    pub fn execute(&mut self, line: &str) -> Result<Outcome, CommandError> {
        self.execute_line(line)
    }

    fn execute_line(&mut self, line: &str) -> Result<Outcome, CommandError> {
        let line = self.env.substitute(line)?;
        if line.is_empty() || line.starts_with('#') {
            return Ok(Outcome::Continue);
        }
        if let Some(text) = line.strip_prefix('\t') {
            self.extend(text)?;
            return Ok(Outcome::Continue);
        }
        self.extend_target = None;

        let (name, args) = self
            .lookup(&line)
            .ok_or_else(|| CommandError::UnknownCommand(line.clone()))?;
        self.dispatch(&name, args)
    }

    fn lookup<'a>(&self, line: &'a str) -> Option<(String, &'a str)> {
        for phrase in &self.phrases {
            if let Some(args) = strip_name(line, phrase) {
                return Some((phrase.clone(), args));
            }
        }
        let (word, args) = split_first_word(line);
        self.commands
            .contains_key(word)
            .then(|| (word.to_string(), args))
    }

    fn dispatch(&mut self, name: &str, args: &str) -> Result<Outcome, CommandError> {
        let lines = match self.commands.get(name) {
            Some(Command::Builtin(builtin)) => {
                let builtin = *builtin;
                return self.run_builtin(builtin, args);
            }
            Some(Command::Device(device)) => {
                device.execute(args)?;
                return Ok(Outcome::Continue);
            }
            Some(Command::Script(script)) => script.lines().to_vec(),
            None => return Err(CommandError::UnknownCommand(name.to_string())),
        };
        if !args.is_empty() {
            debug!(target: "engine", "{}: ignoring arguments \"{}\"", name, args);
        }
        let result = self.run_script(name, &lines);
        self.extend_target = Some(name.to_string());
        result
    }

    fn run_script(&mut self, name: &str, lines: &[String]) -> Result<Outcome, CommandError> {
        if self.depth >= MAX_DEPTH {
            return Err(CommandError::RecursionLimit(MAX_DEPTH));
        }
        self.depth += 1;
        let result = self.replay(name, lines);
        self.depth -= 1;
        result
    }

    fn replay(&mut self, name: &str, lines: &[String]) -> Result<Outcome, CommandError> {
        for line in lines {
            info!(target: "engine", "Subcommand \"{}\"", line);
            match self.execute(line) {
                Ok(Outcome::Continue) => {}
                Ok(Outcome::Exit) => return Ok(Outcome::Exit),
                Err(e) => {
                    debug!(target: "engine", "{}: error in subcommand \"{}\": {}", name, line, e);
                    return Err(e);
                }
            }
        }
        Ok(Outcome::Continue)
    }

    fn extend(&mut self, text: &str) -> Result<(), CommandError> {
        let target = self.extend_target.as_deref().ok_or(CommandError::NotExtendable)?;
        match self.commands.get_mut(target) {
            Some(Command::Script(script)) => {
                script.push(text);
                Ok(())
            }
            _ => Err(CommandError::NotExtendable),
        }
    }

    fn register(&mut self, name: &str, command: Command) -> Result<(), CommandError> {
        if name.is_empty() || name != name.trim() || name.starts_with('#') {
            return Err(CommandError::invalid(
                "init",
                format!("invalid command name \"{}\"", name),
            ));
        }
        if self.commands.contains_key(name) {
            return Err(CommandError::Duplicate(name.to_string()));
        }
        if name.contains(' ') {
            self.phrases.push(name.to_string());
            self.phrases.sort_by(|a, b| b.len().cmp(&a.len()));
        }
        debug!(target: "engine", "cmd: add \"{}\"", name);
        self.commands.insert(name.to_string(), command);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    pub fn set_variable(&mut self, name: &str, value: &str) -> Result<(), CommandError> {
        let replaced = self.env.set(name, value)?;
        info!(
            target: "engine",
            "Variable {} = \"{}\" ({})",
            name,
            value,
            if replaced { "replaced value" } else { "new value" }
        );
        Ok(())
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    pub fn environment_as_csv(&self) -> String {
        self.env.to_csv()
    }

    /// Release every command (stopping device clients) and clear the
    /// environment.
    pub fn teardown(&mut self) {
        for (name, command) in self.commands.drain() {
            debug!(target: "engine", "cmd: release \"{}\"", name);
            command.release();
        }
        self.phrases.clear();
        self.extend_target = None;
        self.env.clear();
    }
}
