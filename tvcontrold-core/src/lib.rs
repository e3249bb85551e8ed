//! Command engine and device protocol clients for the tvcontrold daemon.
//!
//! Command lines arrive from the event server (or from device clients as
//! outward events), are expanded against the environment and dispatched to
//! built-in, script or device commands.

pub mod channel;
pub mod collaborators;
pub mod config;
pub mod device;
pub mod engine;
pub mod env;
pub mod error;

pub use channel::{Message, MessageReceiver, MessageSender};
pub use collaborators::{CecAction, Collaborators, OnScreenDisplay, OsdImage, RemoteControl};
pub use config::DaemonConfig;
pub use device::{DeviceClient, DeviceSettings};
pub use engine::{CommandEngine, Outcome, ScriptPaths};
pub use env::Environment;
pub use error::{ChannelError, CommandError, DeviceError};
