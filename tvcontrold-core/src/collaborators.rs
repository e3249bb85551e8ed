//! Narrow interfaces to the HDMI-CEC adapter and the on-screen display.
//!
//! Both live outside this crate. The daemon ships [`Unavailable`], which
//! reports every call as failed without terminating anything.

use log::warn;

use crate::error::CommandError;

/// Actions of the `cec` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CecAction {
    PowerOnAll,
    StandbyAll,
    SetActive,
    VolumeUp,
    VolumeDown,
    Mute,
}

impl CecAction {
    /// Parse the arguments of `cec <args>`.
    pub fn parse(args: &str) -> Option<Self> {
        match args {
            "poweron all" => Some(CecAction::PowerOnAll),
            "standby all" => Some(CecAction::StandbyAll),
            "setactive" => Some(CecAction::SetActive),
            "volumeup" => Some(CecAction::VolumeUp),
            "volumedown" => Some(CecAction::VolumeDown),
            "mute" => Some(CecAction::Mute),
            _ => None,
        }
    }
}

/// Image shown by the `osd` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OsdImage {
    Svg(String),
    Png(String),
}

impl OsdImage {
    pub fn parse(args: &str) -> Option<Self> {
        let (kind, path) = args.split_once(' ')?;
        if path.is_empty() {
            return None;
        }
        match kind {
            "svg" => Some(OsdImage::Svg(path.to_string())),
            "png" => Some(OsdImage::Png(path.to_string())),
            _ => None,
        }
    }
}

pub trait RemoteControl: Send {
    fn send(&mut self, action: CecAction) -> Result<(), CommandError>;
}

pub trait OnScreenDisplay: Send {
    fn show(&mut self, image: &OsdImage) -> Result<(), CommandError>;
}

/// Stand-in for a collaborator that is not present on this host.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unavailable;

impl RemoteControl for Unavailable {
    fn send(&mut self, action: CecAction) -> Result<(), CommandError> {
        warn!(target: "cec", "dropping {:?}: no CEC adapter", action);
        Err(CommandError::Collaborator("CEC adapter".into()))
    }
}

impl OnScreenDisplay for Unavailable {
    fn show(&mut self, image: &OsdImage) -> Result<(), CommandError> {
        warn!(target: "osd", "dropping {:?}: no display", image);
        Err(CommandError::Collaborator("on-screen display".into()))
    }
}

/// Collaborators handed to the command engine.
pub struct Collaborators {
    pub remote: Box<dyn RemoteControl>,
    pub osd: Box<dyn OnScreenDisplay>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            remote: Box::new(Unavailable),
            osd: Box::new(Unavailable),
        }
    }
}
