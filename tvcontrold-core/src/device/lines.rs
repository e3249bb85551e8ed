//! Receive buffer splitting device output into CR/LF terminated lines.

/// Receive buffer size; a line that does not fit is dropped.
pub const RX_BUFFER_LEN: usize = 256;

#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(RX_BUFFER_LEN),
        }
    }

    /// Append received bytes and return every completed, non-empty line.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &b in bytes {
            if b == b'\r' || b == b'\n' {
                if !self.buf.is_empty() {
                    lines.push(String::from_utf8_lossy(&self.buf).into_owned());
                    self.buf.clear();
                }
                continue;
            }
            if self.buf.len() == RX_BUFFER_LEN {
                log::warn!(target: "device", "receive buffer overflow, discarding {} bytes", self.buf.len());
                self.buf.clear();
            }
            self.buf.push(b);
        }
        lines
    }

    #[cfg(test)]
    fn pending(&self) -> usize {
        self.buf.len()
    }
}
