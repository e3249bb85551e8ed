use crate::device::DeviceClient;

/// Commands compiled into the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Exit,
    Set,
    Exec,
    Init,
    Cec,
    Osd,
}

impl Builtin {
    pub const ALL: [Builtin; 6] = [
        Builtin::Exit,
        Builtin::Set,
        Builtin::Exec,
        Builtin::Init,
        Builtin::Cec,
        Builtin::Osd,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Exit => "exit",
            Builtin::Set => "set",
            Builtin::Exec => "exec",
            Builtin::Init => "init",
            Builtin::Cec => "cec",
            Builtin::Osd => "osd",
        }
    }
}

/// Named list of command lines replayed in order.
#[derive(Debug, Default, Clone)]
pub struct Script {
    lines: Vec<String>,
}

impl Script {
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn push(&mut self, line: &str) {
        self.lines.push(line.to_string());
    }
}

/// Entry of the command table.
pub enum Command {
    Builtin(Builtin),
    Script(Script),
    Device(Box<dyn DeviceClient>),
}

impl Command {
    /// Free whatever the command owns; device clients are stopped.
    pub fn release(self) {
        if let Command::Device(device) = self {
            log::debug!(target: "engine", "releasing device \"{}\"", device.name());
            device.release();
        }
    }
}
