//! Device protocol clients.
//!
//! Each configured device runs on its own worker thread which owns the
//! connection and the device state. The rest of the daemon talks to it only
//! through [`DeviceHandle`]: commands go in over the intake channel, outward
//! events come back on the server's event channel.

mod lines;
pub mod pioneer;
mod worker;

use std::fmt;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{info, warn};
use thiserror::Error;

use crate::channel::{self, Message, MessageSender};
use crate::error::{ChannelError, CommandError, DeviceError};

pub use lines::LineBuffer;
pub use pioneer::{Pioneer, PioneerCommand};
use worker::DeviceWorker;

/// Commands waiting for a device beyond this are rejected.
const INTAKE_CAPACITY: usize = 64;

/// Connection settings shared by every device client.
#[derive(Debug, Clone)]
pub struct DeviceSettings {
    /// Port used when the device address carries none.
    pub default_port: u16,
    /// Wait after a failed connection attempt.
    pub reconnect_delay: Duration,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            default_port: 23,
            reconnect_delay: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("unrecognized status line \"{0}\"")]
    Unrecognized(String),
}

/// What a received status line asks the worker to do.
#[derive(Debug, PartialEq, Eq)]
pub struct Reaction<C> {
    /// Command lines to inject into the engine.
    pub events: Vec<String>,
    /// Command to queue ahead of the intake channel.
    pub follow_up: Option<C>,
}

impl<C> Default for Reaction<C> {
    fn default() -> Self {
        Self {
            events: Vec::new(),
            follow_up: None,
        }
    }
}

/// A device's line protocol: command vocabulary, status parsing, encoding.
pub trait DeviceProtocol: Send + 'static {
    type Command: Copy + fmt::Debug + Send + 'static;

    fn parse_command(args: &str) -> Option<Self::Command>;

    /// Command that makes the device report its whole state.
    fn refresh_command() -> Self::Command;

    fn on_line(&mut self, line: &str) -> Result<Reaction<Self::Command>, ProtocolError>;

    /// Bytes to transmit for `cmd`, issued at `now`.
    fn encode(&mut self, cmd: Self::Command, now: Instant) -> Vec<u8>;
}

/// Engine-facing side of a running device client.
pub trait DeviceClient: Send {
    fn name(&self) -> &str;

    /// Parse `args` and enqueue the resulting command.
    fn execute(&self, args: &str) -> Result<(), CommandError>;

    /// Stop the worker and wait for it to finish.
    fn release(self: Box<Self>);
}

pub struct DeviceHandle<P: DeviceProtocol> {
    name: String,
    intake: Option<MessageSender<P::Command>>,
    stop: Option<crossbeam_channel::Sender<()>>,
    join_handle: Option<JoinHandle<()>>,
}

impl<P: DeviceProtocol> DeviceHandle<P> {
    /// Start a worker thread for `protocol` talking to `address`.
    ///
    /// The worker sends the refresh command after every successful connect.
    pub fn spawn(
        name: &str,
        address: &str,
        protocol: P,
        settings: &DeviceSettings,
        events: MessageSender<Message>,
    ) -> Result<Self, DeviceError> {
        let address = with_default_port(address, settings.default_port);
        let (intake_tx, intake_rx) = channel::channel(INTAKE_CAPACITY);
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(0);

        let worker = DeviceWorker::new(
            name,
            &address,
            protocol,
            intake_rx,
            stop_rx,
            events,
            settings.reconnect_delay,
        );
        let join_handle = thread::Builder::new()
            .name(format!("device-{}", name))
            .spawn(move || worker.run())?;

        info!(target: "device", "{}: client started for {}", name, address);
        Ok(Self {
            name: name.to_string(),
            intake: Some(intake_tx),
            stop: Some(stop_tx),
            join_handle: Some(join_handle),
        })
    }

    pub fn send(&self, cmd: P::Command) -> Result<(), DeviceError> {
        let intake = self
            .intake
            .as_ref()
            .ok_or_else(|| DeviceError::Stopped(self.name.clone()))?;
        intake.try_send(cmd).map_err(|e| match e {
            ChannelError::Full => DeviceError::QueueFull(self.name.clone()),
            _ => DeviceError::Stopped(self.name.clone()),
        })
    }

    fn stop(&mut self) {
        // dropping both senders wakes the worker wherever it waits
        self.intake.take();
        self.stop.take();
        if let Some(handle) = self.join_handle.take() {
            if handle.join().is_err() {
                warn!(target: "device", "{}: worker thread panicked", self.name);
            }
        }
    }
}

impl<P: DeviceProtocol> DeviceClient for DeviceHandle<P> {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, args: &str) -> Result<(), CommandError> {
        let cmd = P::parse_command(args)
            .ok_or_else(|| CommandError::invalid(&self.name, format!("unknown device command \"{}\"", args)))?;
        self.send(cmd)?;
        Ok(())
    }

    fn release(mut self: Box<Self>) {
        self.stop();
        info!(target: "device", "{}: client released", self.name);
    }
}

impl<P: DeviceProtocol> Drop for DeviceHandle<P> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Start a Pioneer receiver client.
pub fn spawn_pioneer(
    name: &str,
    address: &str,
    settings: &DeviceSettings,
    events: MessageSender<Message>,
) -> Result<Box<dyn DeviceClient>, DeviceError> {
    let handle = DeviceHandle::spawn(name, address, Pioneer::new(name), settings, events)?;
    Ok(Box::new(handle))
}

/// Append `port` unless `address` already names one.
fn with_default_port(address: &str, port: u16) -> String {
    let has_port = match address.rsplit_once(':') {
        Some((host, p)) => !host.is_empty() && !host.ends_with(':') && p.parse::<u16>().is_ok(),
        None => false,
    };
    if has_port {
        address.to_string()
    } else {
        format!("{}:{}", address, port)
    }
}
