//! Pioneer AVR network protocol.
//!
//! The receiver accepts short ASCII commands (`PO`, `042VL`, `04FN`, ...)
//! and reports state changes with unsolicited status lines (`PWR0`,
//! `VOL042`, `FN04`, `MUT1`, `FL...`, `MC1`).

use std::time::{Duration, Instant};

use log::debug;

use super::{DeviceProtocol, ProtocolError, Reaction};

/// Highest volume step the receiver accepts.
pub const MAX_VOLUME: u32 = 185;

/// Largest magnitude of the accelerated volume step.
pub const MAX_ACCEL: i32 = 8;

/// Volume requests closer than this grow the step.
const ACCEL_WINDOW: Duration = Duration::from_millis(300);

/// Volume requests further apart than this restart from a single step.
const ACCEL_RESET: Duration = Duration::from_millis(800);

const REFRESH: &str = "?P\r\n?V\r\n?M\r\n?MC\r\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenMode {
    Stereo,
    ExtStereo,
    Direct,
    Alc,
    Expanded,
}

impl ListenMode {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "stereo" => Some(ListenMode::Stereo),
            "extstereo" => Some(ListenMode::ExtStereo),
            "direct" => Some(ListenMode::Direct),
            "alc" => Some(ListenMode::Alc),
            "expanded" => Some(ListenMode::Expanded),
            _ => None,
        }
    }

    fn wire(self) -> &'static str {
        match self {
            ListenMode::Stereo => "0001SR\r\n",
            ListenMode::ExtStereo => "0112SR\r\n",
            ListenMode::Direct => "0007SR\r\n",
            ListenMode::Alc => "0151SR\r\n",
            ListenMode::Expanded => "0106SR\r\n",
        }
    }
}

/// Input selectors with a symbolic name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    Tuner,
    Dvd,
    Tv,
    Sat,
}

impl Input {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "tuner" => Some(Input::Tuner),
            "dvd" => Some(Input::Dvd),
            "tv" => Some(Input::Tv),
            "sat" => Some(Input::Sat),
            _ => None,
        }
    }

    pub fn code(self) -> u32 {
        match self {
            Input::Tuner => 2,
            Input::Dvd => 4,
            Input::Tv => 5,
            Input::Sat => 6,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        [Input::Tuner, Input::Dvd, Input::Tv, Input::Sat]
            .into_iter()
            .find(|i| i.code() == code)
    }

    pub fn name(self) -> &'static str {
        match self {
            Input::Tuner => "tuner",
            Input::Dvd => "dvd",
            Input::Tv => "tv",
            Input::Sat => "sat",
        }
    }
}

/// Abstract receiver commands, one per opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PioneerCommand {
    /// Ask for power, volume, mute and MCACC state.
    Query,
    PowerOn,
    Standby,
    VolumeUp,
    VolumeDown,
    MuteOn,
    MuteOff,
    /// Toggle based on the last reported mute state.
    Mute,
    /// MCACC memory 1-6.
    Mcacc(u8),
    ListenMode(ListenMode),
    Input(Input),
}

impl PioneerCommand {
    /// Parse the arguments of `<device> <args>`.
    pub fn parse(args: &str) -> Option<Self> {
        let (word, rest) = match args.split_once(' ') {
            Some((word, rest)) => (word, Some(rest)),
            None => (args, None),
        };
        match (word, rest) {
            ("poweron", None) => Some(PioneerCommand::PowerOn),
            ("standby", None) => Some(PioneerCommand::Standby),
            ("volumeup", None) => Some(PioneerCommand::VolumeUp),
            ("volumedown", None) => Some(PioneerCommand::VolumeDown),
            ("muteon", None) => Some(PioneerCommand::MuteOn),
            ("muteoff", None) => Some(PioneerCommand::MuteOff),
            ("mute", None) => Some(PioneerCommand::Mute),
            ("mcacc", Some(n)) => match n.as_bytes() {
                [d @ b'1'..=b'6'] => Some(PioneerCommand::Mcacc(d - b'0')),
                _ => None,
            },
            ("listenmode", Some(mode)) => ListenMode::parse(mode).map(PioneerCommand::ListenMode),
            ("input", Some(input)) => Input::parse(input).map(PioneerCommand::Input),
            _ => None,
        }
    }

    fn is_volume(self) -> bool {
        matches!(self, PioneerCommand::VolumeUp | PioneerCommand::VolumeDown)
    }
}

/// Last known receiver state, owned by the device's worker thread.
#[derive(Debug, Clone, Default)]
pub struct PioneerState {
    pub power: bool,
    pub volume: u32,
    /// Front display text.
    pub display: String,
    /// Raw input selector code.
    pub input: Option<u32>,
    pub mute: bool,
    /// False until a mute report arrives after the last refresh.
    pub mute_known: bool,
    pub mcacc: u8,
    /// Signed step of the last volume change.
    pub accel: i32,
    pub last_tx: Option<Instant>,
    pub last_command: Option<PioneerCommand>,
}

#[derive(Debug)]
pub struct Pioneer {
    name: String,
    state: PioneerState,
}

impl Pioneer {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: PioneerState::default(),
        }
    }

    pub fn state(&self) -> &PioneerState {
        &self.state
    }

    fn event(&self, what: &str) -> String {
        format!("on_{}_{}", self.name, what)
    }

    /// Compute the accelerated volume and return the new absolute level.
    fn step_volume(&mut self, up: bool, elapsed: Duration) -> u32 {
        let s = &mut self.state;
        if elapsed > ACCEL_RESET {
            s.accel = 0;
        }
        if elapsed < ACCEL_WINDOW {
            s.accel += if up { 1 } else { -1 };
        }
        // a direction change starts again from a single step
        if up {
            s.accel = s.accel.max(1);
        } else {
            s.accel = s.accel.min(-1);
        }
        s.accel = s.accel.clamp(-MAX_ACCEL, MAX_ACCEL);
        let volume = (s.volume as i64 + s.accel as i64).clamp(0, MAX_VOLUME as i64) as u32;
        s.volume = volume;
        volume
    }
}

/// `'0'` means on, `'1'` means off.
fn parse_flag(b: u8) -> Option<bool> {
    match b {
        b'0' => Some(true),
        b'1' => Some(false),
        _ => None,
    }
}

fn parse_decimal(digits: &str) -> Option<u32> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn parse_hex_bytes(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
        .collect()
}

impl DeviceProtocol for Pioneer {
    type Command = PioneerCommand;

    fn parse_command(args: &str) -> Option<PioneerCommand> {
        PioneerCommand::parse(args)
    }

    fn refresh_command() -> PioneerCommand {
        PioneerCommand::Query
    }

    fn on_line(&mut self, line: &str) -> Result<Reaction<PioneerCommand>, ProtocolError> {
        let unknown = || ProtocolError::Unrecognized(line.to_string());
        let bytes = line.as_bytes();
        let mut reaction = Reaction::default();

        match (bytes.len(), line.get(..2), line.get(..3)) {
            (4, _, Some("PWR")) => {
                self.state.power = parse_flag(bytes[3]).ok_or_else(unknown)?;
                debug!(target: "device", "{}: power {}", self.name, self.state.power);
                // power changes arrive unprompted; refresh everything else
                if self.state.last_command != Some(PioneerCommand::Query) {
                    reaction.follow_up = Some(PioneerCommand::Query);
                }
            }
            (6, _, Some("VOL")) => {
                self.state.volume = parse_decimal(&line[3..]).ok_or_else(unknown)?;
                debug!(target: "device", "{}: volume {}", self.name, self.state.volume);
            }
            (32, Some("FL"), _) => {
                let raw = parse_hex_bytes(&line[2..]).ok_or_else(unknown)?;
                // first byte carries display flags
                self.state.display = String::from_utf8_lossy(&raw[1..]).into_owned();
                debug!(target: "device", "{}: display \"{}\"", self.name, self.state.display);
            }
            (4, Some("FN"), _) => {
                let code = parse_decimal(&line[2..]).ok_or_else(unknown)?;
                self.state.input = Some(code);
                let input = Input::from_code(code).map_or("unknown", Input::name);
                debug!(target: "device", "{}: input {} ({})", self.name, code, input);
                reaction.events.push(self.event(&format!("input_{}", input)));
            }
            (4, _, Some("MUT")) => {
                let mute = parse_flag(bytes[3]).ok_or_else(unknown)?;
                if mute != self.state.mute {
                    self.state.mute = mute;
                    if self.state.mute_known {
                        reaction
                            .events
                            .push(self.event(if mute { "mute" } else { "unmute" }));
                    }
                }
                self.state.mute_known = true;
            }
            (3, Some("MC"), _) => {
                self.state.mcacc = parse_decimal(&line[2..]).ok_or_else(unknown)? as u8;
                debug!(target: "device", "{}: mcacc {}", self.name, self.state.mcacc);
            }
            _ => return Err(unknown()),
        }
        Ok(reaction)
    }

    fn encode(&mut self, cmd: PioneerCommand, now: Instant) -> Vec<u8> {
        let elapsed = match self.state.last_tx {
            Some(prev) => now.saturating_duration_since(prev),
            None => Duration::from_secs(1),
        };
        self.state.last_tx = Some(now);
        self.state.last_command = Some(cmd);
        if !cmd.is_volume() {
            self.state.accel = 0;
        }

        let wire: &str = match cmd {
            PioneerCommand::Query => {
                self.state.mute_known = false;
                REFRESH
            }
            PioneerCommand::PowerOn => "PO\r\n",
            PioneerCommand::Standby => "PF\r\n",
            PioneerCommand::VolumeUp | PioneerCommand::VolumeDown => {
                let volume = self.step_volume(cmd == PioneerCommand::VolumeUp, elapsed);
                return format!("{:03}VL\r\n", volume).into_bytes();
            }
            PioneerCommand::MuteOn => "MO\r\n",
            PioneerCommand::MuteOff => "MF\r\n",
            PioneerCommand::Mute => {
                if self.state.mute {
                    "MF\r\n"
                } else {
                    "MO\r\n"
                }
            }
            PioneerCommand::Mcacc(n) => return format!("{}MC\r\n", n).into_bytes(),
            PioneerCommand::ListenMode(mode) => mode.wire(),
            PioneerCommand::Input(input) => {
                return format!("{:02}FN\r\n", input.code()).into_bytes();
            }
        };
        wire.as_bytes().to_vec()
    }
}
