//! One-directional FIFO message channel.
//!
//! Used for the event queue drained by the server (short text messages) and
//! for each device client's command intake. Both ends are cheap handles over
//! a bounded crossbeam channel; the receiving end exposes the underlying
//! receiver so it can take part in a `Select` alongside sockets' channels.

use std::borrow::Cow;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};

use crate::error::ChannelError;

/// Largest payload a [`Message`] may carry (fits a one-byte length).
pub const MAX_MESSAGE_LEN: usize = u8::MAX as usize;

/// Default queue depth for channels created with [`message_channel`].
pub const DEFAULT_CAPACITY: usize = 64;

/// Opaque byte payload of at most [`MAX_MESSAGE_LEN`] bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message(Vec<u8>);

impl Message {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, ChannelError> {
        let bytes = bytes.into();
        if bytes.len() > MAX_MESSAGE_LEN {
            return Err(ChannelError::TooLong(bytes.len()));
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Payload as text, replacing invalid UTF-8.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }
}

impl TryFrom<&str> for Message {
    type Error = ChannelError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Message::new(s.as_bytes())
    }
}

/// Sending end. Cloning yields another producer on the same queue.
#[derive(Debug)]
pub struct MessageSender<T> {
    tx: Sender<T>,
}

impl<T> Clone for MessageSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

/// Receiving end.
#[derive(Debug)]
pub struct MessageReceiver<T> {
    rx: Receiver<T>,
}

/// Create a bounded channel holding at most `capacity` queued items.
pub fn channel<T>(capacity: usize) -> (MessageSender<T>, MessageReceiver<T>) {
    let (tx, rx) = crossbeam_channel::bounded(capacity);
    (MessageSender { tx }, MessageReceiver { rx })
}

/// Create the text-message channel used for events.
pub fn message_channel() -> (MessageSender<Message>, MessageReceiver<Message>) {
    channel(DEFAULT_CAPACITY)
}

impl<T> MessageSender<T> {
    /// Enqueue, waiting while the queue is full.
    pub fn send(&self, item: T) -> Result<(), ChannelError> {
        self.tx.send(item).map_err(|_| ChannelError::Disconnected)
    }

    /// Enqueue without waiting.
    pub fn try_send(&self, item: T) -> Result<(), ChannelError> {
        self.tx.try_send(item).map_err(|e| match e {
            TrySendError::Full(_) => ChannelError::Full,
            TrySendError::Disconnected(_) => ChannelError::Disconnected,
        })
    }

    /// Handle for `crossbeam_channel::select!` send arms.
    pub fn sender(&self) -> &Sender<T> {
        &self.tx
    }
}

impl MessageSender<Message> {
    /// Enqueue a text message, waiting while the queue is full.
    pub fn send_text(&self, text: &str) -> Result<(), ChannelError> {
        self.send(Message::try_from(text)?)
    }
}

impl<T> MessageReceiver<T> {
    /// Wait for the next item.
    pub fn recv(&self) -> Result<T, ChannelError> {
        self.rx.recv().map_err(|_| ChannelError::Disconnected)
    }

    /// Take the next item if one is ready.
    pub fn try_recv(&self) -> Result<Option<T>, ChannelError> {
        match self.rx.try_recv() {
            Ok(item) => Ok(Some(item)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(ChannelError::Disconnected),
        }
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<T>, ChannelError> {
        match self.rx.recv_timeout(timeout) {
            Ok(item) => Ok(Some(item)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(ChannelError::Disconnected),
        }
    }

    /// Readiness handle for `crossbeam_channel::Select` / `select!`.
    pub fn receiver(&self) -> &Receiver<T> {
        &self.rx
    }
}
