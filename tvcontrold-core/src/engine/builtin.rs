use std::process;

use log::info;

use super::{split_first_word, Builtin, Command, CommandEngine, Outcome, Script};
use crate::collaborators::{CecAction, OsdImage};
use crate::device;
use crate::error::CommandError;

impl CommandEngine {
    pub(super) fn run_builtin(&mut self, builtin: Builtin, args: &str) -> Result<Outcome, CommandError> {
        match builtin {
            Builtin::Exit => exit(args),
            Builtin::Set => {
                let (name, value) = split_first_word(args);
                self.set_variable(name, value)?;
                Ok(Outcome::Continue)
            }
            Builtin::Exec => exec(args),
            Builtin::Init => self.init(args),
            Builtin::Cec => {
                let action = CecAction::parse(args)
                    .ok_or_else(|| CommandError::invalid("cec", format!("unknown action \"{}\"", args)))?;
                self.collaborators.remote.send(action)?;
                Ok(Outcome::Continue)
            }
            Builtin::Osd => {
                let image = OsdImage::parse(args)
                    .ok_or_else(|| CommandError::invalid("osd", "expected svg|png <path>"))?;
                self.collaborators.osd.show(&image)?;
                Ok(Outcome::Continue)
            }
        }
    }

    fn init(&mut self, args: &str) -> Result<Outcome, CommandError> {
        let (kind, rest) = split_first_word(args);
        match kind {
            "script" => {
                self.register(rest, Command::Script(Script::default()))?;
                self.extend_target = Some(rest.to_string());
            }
            // "pioneer" is the only device type so far
            "device" | "pioneer" => self.init_device(rest)?,
            _ => {
                return Err(CommandError::invalid(
                    "init",
                    format!("unknown object type \"{}\"", kind),
                ))
            }
        }
        Ok(Outcome::Continue)
    }

    fn init_device(&mut self, args: &str) -> Result<(), CommandError> {
        let (name, address) = split_first_word(args);
        if name.is_empty() || address.is_empty() || address.contains(char::is_whitespace) {
            return Err(CommandError::invalid("init device", "expected <name> <host[:port]>"));
        }
        if self.contains(name) {
            return Err(CommandError::Duplicate(name.to_string()));
        }
        let client = device::spawn_pioneer(name, address, &self.devices, self.events.clone())?;
        self.register(name, Command::Device(client))
    }
}

fn exit(args: &str) -> Result<Outcome, CommandError> {
    if !args.is_empty() {
        return Err(CommandError::invalid("exit", "takes no arguments"));
    }
    Ok(Outcome::Exit)
}

fn exec(args: &str) -> Result<Outcome, CommandError> {
    if args.trim().is_empty() {
        return Err(CommandError::invalid("exec", "missing command"));
    }
    info!(target: "engine", "exec \"{}\"", args);
    let status = process::Command::new("sh").arg("-c").arg(args).status()?;
    if status.success() {
        Ok(Outcome::Continue)
    } else {
        Err(CommandError::Exec {
            command: args.to_string(),
            status: status.to_string(),
        })
    }
}
