//! Blocking client for the bridge socket.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;

use serde_json::{json, Value};

use super::contract::{ARG_PAYLOAD, ARG_REQUEST_ID, METHOD_REQUEST_DATA, METHOD_SUBMIT_RESULT};
use super::wire::{WireReply, WireRequest};
use crate::error::{BridgeError, Result};

/// One connection to a running gateway.
///
/// Calls are sent one at a time; the connection can be reused until the
/// server answers with `security_denied`, after which it is closed.
pub struct BridgeClient {
    reader: BufReader<UnixStream>,
    writer: UnixStream,
}

impl BridgeClient {
    pub fn connect(socket: impl AsRef<Path>) -> Result<Self> {
        let stream = UnixStream::connect(socket.as_ref())?;
        Self::from_stream(stream)
    }

    /// Wrap an already connected stream.
    pub fn from_stream(stream: UnixStream) -> Result<Self> {
        let writer = stream.try_clone()?;
        Ok(Self {
            reader: BufReader::new(stream),
            writer,
        })
    }

    /// Bound how long a call may wait for its reply.
    pub fn set_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.writer.set_read_timeout(timeout)?;
        self.writer.set_write_timeout(timeout)?;
        Ok(())
    }

    /// Send a raw call and wait for the reply.
    pub fn call(&mut self, method: &str, arguments: Value) -> Result<WireReply> {
        let mut line = WireRequest::new(method, arguments).encode()?;
        line.push('\n');
        self.writer.write_all(line.as_bytes())?;
        self.writer.flush()?;

        let mut reply = String::new();
        if self.reader.read_line(&mut reply)? == 0 {
            return Err(BridgeError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "gateway closed the connection without replying",
            )));
        }
        WireReply::decode(reply.trim_end())
    }

    pub fn request_data(&mut self, request_id: Option<&str>) -> Result<WireReply> {
        let mut arguments = json!({});
        if let Some(id) = request_id {
            arguments[ARG_REQUEST_ID] = json!(id);
        }
        self.call(METHOD_REQUEST_DATA, arguments)
    }

    pub fn submit_result(&mut self, request_id: Option<&str>, payload: &str) -> Result<WireReply> {
        let mut arguments = json!({});
        arguments[ARG_PAYLOAD] = json!(payload);
        if let Some(id) = request_id {
            arguments[ARG_REQUEST_ID] = json!(id);
        }
        self.call(METHOD_SUBMIT_RESULT, arguments)
    }
}

impl std::fmt::Debug for BridgeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeClient")
            .field("peer", &self.writer.peer_addr().ok())
            .finish()
    }
}
