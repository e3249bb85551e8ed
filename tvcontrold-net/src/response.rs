use std::io::{self, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    BadRequest,
    InternalError,
}

impl Status {
    pub fn code(self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::BadRequest => 400,
            Status::InternalError => 500,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::BadRequest => "Bad Request",
            Status::InternalError => "Internal Server Error",
        }
    }
}

/// A response being written to the client: status line, headers and body,
/// with a cursor into them.
#[derive(Debug)]
pub struct PendingResponse {
    status: Status,
    chunks: [Vec<u8>; 3],
    index: usize,
    offset: usize,
}

impl PendingResponse {
    pub fn new(status: Status, content_type: &str, body: String) -> Self {
        let status_line = format!("HTTP/1.0 {} {}\r\n", status.code(), status.reason());
        let headers = format!(
            "Content-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            content_type,
            body.len()
        );
        Self {
            status,
            chunks: [status_line.into_bytes(), headers.into_bytes(), body.into_bytes()],
            index: 0,
            offset: 0,
        }
    }

    /// Environment dump.
    pub fn csv(status: Status, body: String) -> Self {
        Self::new(status, "text/csv", body)
    }

    pub fn empty() -> Self {
        Self::new(Status::Ok, "text/plain", String::new())
    }

    pub fn bad_request(reason: &str) -> Self {
        Self::new(Status::BadRequest, "text/plain", format!("{}\n", reason))
    }

    pub fn status(&self) -> Status {
        self.status
    }

    #[cfg(test)]
    fn is_done(&self) -> bool {
        self.index == self.chunks.len()
    }

    /// Write as much as `out` accepts.
    ///
    /// Returns `Ok(true)` once everything is written and `Ok(false)` when
    /// `out` would block.
    pub fn write_to<W: Write>(&mut self, out: &mut W) -> io::Result<bool> {
        while let Some(chunk) = self.chunks.get(self.index) {
            let rest = &chunk[self.offset..];
            if rest.is_empty() {
                self.index += 1;
                self.offset = 0;
                continue;
            }
            match out.write(rest) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => self.offset += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) => return Err(e),
            }
        }
        out.flush()?;
        Ok(true)
    }
}
