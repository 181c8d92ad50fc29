//! An upgraded, frame-ready channel to the hub.
//!
//! The connection owns the byte stream for its whole life. Dropping it sends
//! a close frame and shuts the stream down; failures there are logged and
//! never override the outcome of the exchange.

use std::io::{self, BufReader, Read, Write};

use frames::Frame;
use serde::Serialize;

use crate::error::Error;
use crate::transport::Transport;

pub struct Connection<S: Transport> {
    // Buffered so bytes that arrived with the handshake response are not lost.
    stream: BufReader<S>,
}

impl<S: Transport> Connection<S> {
    pub(crate) fn new(stream: BufReader<S>) -> Self {
        Self { stream }
    }

    /// Read the next data message as text; pings are answered inline.
    ///
    /// # Errors
    ///
    /// [`Error::Codec`] on transport failure or when the hub closes.
    pub fn recv_text(&mut self) -> Result<String, Error> {
        let text = frames::read_text(self)?;
        tracing::trace!(len = text.len(), "received text message");
        Ok(text)
    }

    /// Serialize `message` as JSON and send it as one text frame.
    ///
    /// # Errors
    ///
    /// [`Error::Json`] when serialization fails, [`Error::Codec`] when the write fails.
    pub fn send_json<T: Serialize>(&mut self, message: &T) -> Result<(), Error> {
        let text = serde_json::to_string(message)?;
        tracing::trace!(len = text.len(), "sending text message");
        frames::write_frame(self, &Frame::text(text))?;
        Ok(())
    }

    fn close_quietly(&mut self) {
        if let Err(error) = frames::write_frame(self, &Frame::close()) {
            tracing::debug!(%error, "close frame not sent");
        }
        if let Err(error) = self.stream.get_mut().shutdown() {
            tracing::debug!(%error, "stream shutdown failed");
        }
    }
}

impl<S: Transport> Read for Connection<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl<S: Transport> Write for Connection<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.get_mut().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.get_mut().flush()
    }
}

impl<S: Transport> Drop for Connection<S> {
    fn drop(&mut self) {
        tracing::debug!("closing connection");
        self.close_quietly();
    }
}
