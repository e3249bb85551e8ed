//! Worker thread owning one device connection.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{select, Receiver, Sender};
use log::{debug, error, info, warn};

use super::lines::LineBuffer;
use super::DeviceProtocol;
use crate::channel::{Message, MessageReceiver, MessageSender};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// A device that accepts no bytes for this long is treated as lost.
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Socket output forwarded by the reader thread.
enum ReadEvent {
    Data(Vec<u8>),
    Closed,
    Failed(io::Error),
}

/// Why a connection ended.
enum Exit {
    /// The handle was released.
    Stop,
    /// Transport error or peer close; reconnect.
    Lost,
}

pub(super) struct DeviceWorker<P: DeviceProtocol> {
    name: String,
    address: String,
    protocol: P,
    intake: MessageReceiver<P::Command>,
    stop: Receiver<()>,
    events: MessageSender<Message>,
    reconnect_delay: Duration,
    /// Commands generated by the device itself, sent before new intake.
    queued: VecDeque<P::Command>,
}

impl<P: DeviceProtocol> DeviceWorker<P> {
    pub(super) fn new(
        name: &str,
        address: &str,
        protocol: P,
        intake: MessageReceiver<P::Command>,
        stop: Receiver<()>,
        events: MessageSender<Message>,
        reconnect_delay: Duration,
    ) -> Self {
        Self {
            name: name.to_string(),
            address: address.to_string(),
            protocol,
            intake,
            stop,
            events,
            reconnect_delay,
            queued: VecDeque::new(),
        }
    }

    pub(super) fn run(mut self) {
        info!(target: "device", "{}: worker thread started", self.name);
        loop {
            let stream = match self.connect() {
                Some(stream) => stream,
                None => {
                    if self.backoff() {
                        break;
                    }
                    continue;
                }
            };
            // state may have changed while disconnected
            self.queued.clear();
            self.queued.push_back(P::refresh_command());
            match self.serve(stream) {
                Exit::Stop => break,
                Exit::Lost => {}
            }
        }
        info!(target: "device", "{}: worker thread finished", self.name);
    }

    fn connect(&self) -> Option<TcpStream> {
        info!(target: "device", "{}: connecting to \"{}\"", self.name, self.address);
        let addrs = match self.address.to_socket_addrs() {
            Ok(addrs) => addrs,
            Err(e) => {
                error!(target: "device", "{}: unknown host \"{}\": {}", self.name, self.address, e);
                return None;
            }
        };
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
                Ok(stream) => {
                    info!(target: "device", "{}: connected to \"{}\"", self.name, self.address);
                    return Some(stream);
                }
                Err(e) => {
                    error!(target: "device", "{}: connection error to {}: {}", self.name, addr, e);
                }
            }
        }
        None
    }

    /// Sleep before the next attempt. Returns true when asked to stop.
    fn backoff(&self) -> bool {
        select! {
            recv(self.stop) -> _ => true,
            default(self.reconnect_delay) => false,
        }
    }

    fn serve(&mut self, mut stream: TcpStream) -> Exit {
        if let Err(e) = configure(&stream) {
            error!(target: "device", "{}: cannot set write timeout: {}", self.name, e);
            return Exit::Lost;
        }
        let reader_stream = match stream.try_clone() {
            Ok(s) => s,
            Err(e) => {
                error!(target: "device", "{}: cannot clone socket: {}", self.name, e);
                return Exit::Lost;
            }
        };
        let (rx_tx, rx_rx) = crossbeam_channel::bounded(16);
        let reader = thread::Builder::new()
            .name(format!("device-{}-rx", self.name))
            .spawn(move || read_loop(reader_stream, rx_tx));
        let reader = match reader {
            Ok(handle) => handle,
            Err(e) => {
                error!(target: "device", "{}: cannot start reader: {}", self.name, e);
                return Exit::Lost;
            }
        };

        let exit = self.exchange(&mut stream, &rx_rx);

        // unblocks the reader if it is still waiting on the socket
        let _ = stream.shutdown(Shutdown::Both);
        drop(rx_rx);
        let _ = reader.join();
        exit
    }

    fn exchange(&mut self, stream: &mut TcpStream, rx: &Receiver<ReadEvent>) -> Exit {
        let mut lines = LineBuffer::new();
        loop {
            while let Some(cmd) = self.queued.pop_front() {
                if let Err(e) = self.transmit(stream, cmd) {
                    error!(target: "device", "{}: transmission error: {}", self.name, e);
                    return Exit::Lost;
                }
            }

            select! {
                recv(self.stop) -> _ => return Exit::Stop,
                recv(rx) -> event => match event {
                    Ok(ReadEvent::Data(bytes)) => {
                        for line in lines.push(&bytes) {
                            self.receive(&line);
                        }
                    }
                    Ok(ReadEvent::Failed(e)) => {
                        error!(target: "device", "{}: reception error: {}", self.name, e);
                        return Exit::Lost;
                    }
                    Ok(ReadEvent::Closed) | Err(_) => {
                        error!(target: "device", "{}: socket closed", self.name);
                        return Exit::Lost;
                    }
                },
                recv(self.intake.receiver()) -> cmd => match cmd {
                    Ok(cmd) => {
                        if let Err(e) = self.transmit(stream, cmd) {
                            error!(target: "device", "{}: transmission error: {}", self.name, e);
                            return Exit::Lost;
                        }
                    }
                    Err(_) => return Exit::Stop,
                },
            }
        }
    }

    fn transmit(&mut self, stream: &mut TcpStream, cmd: P::Command) -> io::Result<()> {
        let bytes = self.protocol.encode(cmd, Instant::now());
        debug!(
            target: "device",
            "{}: tx {:?}: \"{}\"",
            self.name,
            cmd,
            String::from_utf8_lossy(&bytes).escape_debug()
        );
        stream.write_all(&bytes)?;
        stream.flush()
    }

    fn receive(&mut self, line: &str) {
        debug!(target: "device", "{}: rx \"{}\"", self.name, line);
        match self.protocol.on_line(line) {
            Ok(reaction) => {
                for event in reaction.events {
                    self.emit(&event);
                }
                if let Some(cmd) = reaction.follow_up {
                    self.queued.push_back(cmd);
                }
            }
            Err(e) => warn!(target: "device", "{}: {}", self.name, e),
        }
    }

    /// Queue `event` for the engine, waiting while the queue is full.
    /// Gives up only when the handle is released.
    fn emit(&self, event: &str) {
        info!(target: "device", "{}: event \"{}\"", self.name, event);
        let msg = match Message::try_from(event) {
            Ok(msg) => msg,
            Err(e) => {
                error!(target: "device", "{}: error enqueuing event \"{}\": {}", self.name, event, e);
                return;
            }
        };
        select! {
            send(self.events.sender(), msg) -> res => {
                if res.is_err() {
                    error!(target: "device", "{}: event queue closed, dropping \"{}\"", self.name, event);
                }
            }
            recv(self.stop) -> _ => {
                debug!(target: "device", "{}: stopping, dropping \"{}\"", self.name, event);
            }
        }
    }
}

/// Writes to a device that stopped reading fail instead of blocking.
fn configure(stream: &TcpStream) -> io::Result<()> {
    stream.set_write_timeout(Some(WRITE_TIMEOUT))
}

fn read_loop(mut stream: TcpStream, tx: Sender<ReadEvent>) {
    let mut buf = [0u8; 256];
    loop {
        let event = match stream.read(&mut buf) {
            Ok(0) => ReadEvent::Closed,
            Ok(n) => ReadEvent::Data(buf[..n].to_vec()),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => ReadEvent::Failed(e),
        };
        let done = !matches!(event, ReadEvent::Data(_));
        if tx.send(event).is_err() || done {
            break;
        }
    }
}
