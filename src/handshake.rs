//! HTTP/1.1 upgrade that turns a raw stream into a WebSocket channel.

use std::io::{BufRead, BufReader, Read, Write};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha1::{Digest, Sha1};

use crate::config::Endpoint;
use crate::connection::Connection;
use crate::error::Error;
use crate::transport::Transport;

/// Path of the hub's WebSocket API.
pub const WEBSOCKET_PATH: &str = "/api/websocket";

/// RFC 6455 magic suffix for the accept key.
const ACCEPT_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

const MAX_RESPONSE_HEAD_BYTES: usize = 16 * 1024;

/// Send the upgrade request on `stream` and wait for `101 Switching Protocols`.
///
/// Bytes that follow the response head are kept for the frame decoder.
///
/// # Errors
///
/// [`Error::Handshake`] with the raw response when the status is not `101` or
/// the response never completes; [`Error::AcceptMismatch`] when the server's
/// accept key is wrong; [`Error::Codec`] when the stream fails.
pub fn upgrade<S: Transport>(mut stream: S, endpoint: &Endpoint) -> Result<Connection<S>, Error> {
    let key = generate_key();
    let request = build_request(endpoint, &key);
    stream
        .write_all(request.as_bytes())
        .and_then(|()| stream.flush())
        .map_err(frames::CodecError::from)?;
    tracing::debug!(host = %endpoint.authority(), path = WEBSOCKET_PATH, "upgrade request sent");

    let mut reader = BufReader::new(stream);
    let response = read_response_head(&mut reader)?;

    if !is_switching_protocols(&response) {
        return Err(Error::Handshake {
            response: response.trim_end().to_owned(),
        });
    }

    let expected = accept_key(&key);
    match header_value(&response, "sec-websocket-accept") {
        Some(actual) if actual == expected => {}
        Some(actual) => {
            return Err(Error::AcceptMismatch {
                expected,
                actual: actual.to_owned(),
            });
        }
        None => tracing::warn!("upgrade response carried no Sec-WebSocket-Accept header"),
    }

    tracing::debug!("websocket upgrade complete");
    Ok(Connection::new(reader))
}

/// Base64 of 16 random bytes.
fn generate_key() -> String {
    STANDARD.encode(rand::random::<[u8; 16]>())
}

/// Expected `Sec-WebSocket-Accept` for a request key.
fn accept_key(key: &str) -> String {
    let digest = Sha1::digest(format!("{key}{ACCEPT_GUID}").as_bytes());
    STANDARD.encode(digest)
}

fn build_request(endpoint: &Endpoint, key: &str) -> String {
    format!(
        "GET {WEBSOCKET_PATH} HTTP/1.1\r\n\
         Host: {}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {key}\r\n\
         Sec-WebSocket-Version: 13\r\n\
         \r\n",
        endpoint.authority()
    )
}

/// Read through the blank line that ends the response head.
fn read_response_head<R: BufRead>(reader: &mut R) -> Result<String, Error> {
    let mut head = Vec::new();
    loop {
        // One byte past the cap is enough to tell an oversize head apart.
        let budget = (MAX_RESPONSE_HEAD_BYTES + 1).saturating_sub(head.len());
        let read = reader
            .by_ref()
            .take(u64::try_from(budget).unwrap_or(u64::MAX))
            .read_until(b'\n', &mut head)
            .map_err(frames::CodecError::from)?;
        if head.len() > MAX_RESPONSE_HEAD_BYTES {
            return Err(Error::Handshake {
                response: format!(
                    "response head exceeds {MAX_RESPONSE_HEAD_BYTES} bytes: {}",
                    String::from_utf8_lossy(&head[..256])
                ),
            });
        }
        if head.ends_with(b"\r\n\r\n") {
            return Ok(String::from_utf8_lossy(&head).into_owned());
        }
        if read == 0 {
            return Err(Error::Handshake {
                response: format!(
                    "connection closed before response completed: {}",
                    String::from_utf8_lossy(&head).trim_end()
                ),
            });
        }
    }
}

/// True when the status line's code token is `101`.
fn is_switching_protocols(response: &str) -> bool {
    response
        .lines()
        .next()
        .and_then(|status_line| status_line.split_whitespace().nth(1))
        == Some("101")
}

/// First value of a header, matched case-insensitively.
fn header_value<'a>(response: &'a str, name: &str) -> Option<&'a str> {
    response
        .lines()
        .skip(1)
        .filter_map(|line| line.split_once(':'))
        .find(|(header, _)| header.trim().eq_ignore_ascii_case(name))
        .map(|(_, value)| value.trim())
}

#[cfg(test)]
#[path = "handshake_test.rs"]
mod tests;
