use super::ack::AckError;
use super::version::{ProtocolVersion, GREETING_PREFIX};

/// Buffered bytes above this size without a complete frame are treated as garbage
const MAX_BUFFER_SIZE: usize = 64 * 1024 * 1024;

const BINARY_PREFIX: &[u8] = b"binary: ";

/// A complete reply to one command (or command list)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Response {
    /// Text lines without the terminating `OK`
    pub body: String,
    /// Raw payload following a `binary: N` line
    pub binary: Option<Vec<u8>>,
}

impl Response {
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            binary: None,
        }
    }
}

/// One unit decoded from the server byte stream
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// `OK MPD x.y.z` sent once after connecting
    Greeting(ProtocolVersion),
    Response(Response),
    Error(AckError),
}

/// Incremental decoder for the MPD response stream
///
/// Bytes are pushed as they arrive from the socket. Frames are only
/// produced once complete; binary payloads are consumed by length so
/// their content never ends a frame early.
#[derive(Debug, Default)]
pub struct ResponseDecoder {
    buffer: Vec<u8>,
}

impl ResponseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append received bytes
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Number of bytes waiting for a complete frame
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Take the next complete frame, if any
    ///
    /// On error the buffer is discarded so the stream can resynchronise on
    /// the next reply.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, String> {
        match self.scan() {
            Ok(Some((frame, consumed))) => {
                self.buffer.drain(..consumed);
                Ok(Some(frame))
            }
            Ok(None) => {
                if self.buffer.len() > MAX_BUFFER_SIZE {
                    self.buffer.clear();
                    return Err("response exceeded maximum buffer size".to_string());
                }
                Ok(None)
            }
            Err(e) => {
                self.buffer.clear();
                Err(e)
            }
        }
    }

    /// Drain every complete frame currently buffered
    pub fn frames(&mut self) -> Result<Vec<Frame>, String> {
        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    fn scan(&self) -> Result<Option<(Frame, usize)>, String> {
        let mut pos = 0;
        let mut text: Vec<u8> = Vec::new();
        let mut binary: Option<Vec<u8>> = None;

        loop {
            let Some(offset) = self.buffer[pos..].iter().position(|&b| b == b'\n') else {
                return Ok(None);
            };
            let next = pos + offset + 1;
            let mut line = &self.buffer[pos..pos + offset];
            if line.last() == Some(&b'\r') {
                line = &line[..line.len() - 1];
            }

            if pos == 0 && line.starts_with(GREETING_PREFIX.as_bytes()) {
                let greeting = String::from_utf8_lossy(line);
                let version = ProtocolVersion::parse(&greeting)
                    .ok_or_else(|| format!("malformed greeting: {:?}", greeting))?;
                return Ok(Some((Frame::Greeting(version), next)));
            }

            if line == b"OK" {
                let response = Response {
                    body: String::from_utf8_lossy(&text).into_owned(),
                    binary,
                };
                return Ok(Some((Frame::Response(response), next)));
            }

            if line.starts_with(b"ACK ") {
                let ack = AckError::parse(&String::from_utf8_lossy(line));
                return Ok(Some((Frame::Error(ack), next)));
            }

            if let Some(size) = line.strip_prefix(BINARY_PREFIX) {
                let size: usize = std::str::from_utf8(size)
                    .ok()
                    .and_then(|s| s.trim().parse().ok())
                    .ok_or_else(|| {
                        format!("malformed binary length: {:?}", String::from_utf8_lossy(size))
                    })?;

                // payload plus its trailing newline
                if self.buffer.len() < next + size + 1 {
                    return Ok(None);
                }
                if self.buffer[next + size] != b'\n' {
                    return Err("binary payload not followed by newline".to_string());
                }

                text.extend_from_slice(line);
                text.push(b'\n');
                binary = Some(self.buffer[next..next + size].to_vec());
                pos = next + size + 1;
                continue;
            }

            text.extend_from_slice(line);
            text.push(b'\n');
            pos = next;
        }
    }
}
